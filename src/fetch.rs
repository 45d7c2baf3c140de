use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::{Client, RequestBuilder, Response};

use crate::config::Config;
use crate::error::ResolveError;
use crate::types::{ensure_http_url, ResolvedUrl};
use crate::util;

const MAX_REDIRECTS: usize = 10;

fn default_headers(config: &Config) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&config.user_agent).context("invalid user agent")?,
    );
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    if let Ok(hv) = HeaderValue::from_str(&config.referer()) {
        headers.insert(REFERER, hv);
    }
    if let Some(cookie) = &config.cookie {
        let name = HeaderName::from_static("cookie");
        let val = HeaderValue::from_str(cookie).context("ANIMEX_COOKIE is not a valid header value")?;
        headers.insert(name, val);
    }
    Ok(headers)
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else {
            util::debug(format!("redirect -> {}", attempt.url()));
            attempt.follow()
        }
    })
}

/// Thin HTTP layer shared by both strategies and the catalog.
///
/// Statuses outside 2xx surface as [`ResolveError::HttpStatus`], everything
/// below HTTP (DNS, connect, timeout) as [`ResolveError::Transport`].
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = Client::builder()
            .default_headers(default_headers(config)?)
            .redirect(redirect_policy())
            .timeout(config.timeout)
            .connect_timeout(config.timeout);
        if let Some(proxy) = &config.proxy {
            let px = reqwest::Proxy::all(proxy).with_context(|| format!("invalid proxy {proxy}"))?;
            builder = builder.proxy(px);
        }
        let client = builder.build().context("failed to build http client")?;
        Ok(Fetcher { client })
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> Result<Response, ResolveError> {
        let resp = request
            .send()
            .await
            .map_err(|e| ResolveError::transport(url, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ResolveError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(resp)
    }

    /// GET `url` and return the body as text. `referer` replaces the default one.
    pub async fn get_text(&self, url: &str, referer: Option<&str>) -> Result<String, ResolveError> {
        util::debug(format!("GET {url}"));
        let mut request = self.client.get(url);
        if let Some(r) = referer {
            request = request.header(REFERER, r);
        }
        self.send(url, request)
            .await?
            .text()
            .await
            .map_err(|e| ResolveError::transport(url, e))
    }

    /// GET `url` with query parameters, sent as an XHR from `referer`.
    pub async fn get_ajax(
        &self,
        url: &str,
        query: &[(&str, String)],
        referer: &str,
    ) -> Result<String, ResolveError> {
        util::debug(format!("GET {url} (ajax)"));
        let request = self
            .client
            .get(url)
            .query(query)
            .header(REFERER, referer)
            .header("X-Requested-With", "XMLHttpRequest")
            .header(ACCEPT, "application/json, text/javascript, */*; q=0.01");
        self.send(url, request)
            .await?
            .text()
            .await
            .map_err(|e| ResolveError::transport(url, e))
    }

    /// Follows the redirect chain from `url` and returns where it ends.
    ///
    /// The final body is never read. No retry: a failed hop ends the attempt.
    pub async fn follow_redirects(&self, url: &str, referer: Option<&str>) -> Result<ResolvedUrl, ResolveError> {
        ensure_http_url(url)?;
        util::debug(format!("following redirects from {url}"));
        let mut request = self.client.get(url);
        if let Some(r) = referer {
            request = request.header(REFERER, r);
        }
        let resp = self.send(url, request).await?;
        let final_url = resp.url().to_string();
        util::debug(format!("resolved to {final_url}"));
        Ok(ResolvedUrl { url: final_url })
    }
}
