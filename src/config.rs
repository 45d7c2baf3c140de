use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_BASE_URL: &str = "https://9anime.org.lv";
pub const DEFAULT_CATALOG_URL: &str = "https://api.jikan.moe/v4";
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

const UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub ajax_url: String,
    pub catalog_url: String,
    pub user_agent: String,
    pub cookie: Option<String>,
    pub proxy: Option<String>,
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let base_url = get("ANIMEX_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let timeout_secs = match get("ANIMEX_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("ANIMEX_TIMEOUT_SECS is not a number: {raw}"))?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let mut config = Config {
            ajax_url: String::new(),
            catalog_url: get("ANIMEX_CATALOG_URL").unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string()),
            user_agent: get("ANIMEX_USER_AGENT").unwrap_or_else(|| UA.to_string()),
            cookie: get("ANIMEX_COOKIE"),
            proxy: get("ANIMEX_HTTP_PROXY"),
            timeout: Duration::from_secs(timeout_secs),
            base_url: String::new(),
        };
        config.set_base_url(&base_url);
        if let Some(ajax) = get("ANIMEX_AJAX_URL") {
            config.ajax_url = ajax;
        }
        Ok(config)
    }

    /// Points the mirror (and its AJAX endpoint) at another host.
    pub fn set_base_url(&mut self, base: &str) {
        self.base_url = base.trim_end_matches('/').to_string();
        self.ajax_url = format!("{}/wp-admin/admin-ajax.php", self.base_url);
    }

    pub fn referer(&self) -> String {
        format!("{}/", self.base_url)
    }

    #[cfg(test)]
    pub fn for_test(base: &str) -> Self {
        let mut config = Self::from_lookup(|_| None).expect("default config");
        config.set_base_url(base);
        config.catalog_url = base.trim_end_matches('/').to_string();
        config.timeout = Duration::from_secs(5);
        config
    }
}
