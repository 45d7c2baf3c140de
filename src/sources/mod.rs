pub mod gated;
pub mod player;

use anyhow::Result;

use crate::config::Config;
use crate::error::ResolveError;
use crate::fetch::Fetcher;
use crate::types::{EpisodePage, ResolvedUrl};

pub use gated::GatedRequest;

/// The two ways an episode page can be turned into a direct URL. The caller
/// picks one; there is no implicit fallback between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Unpack the player script behind the episode's iframe.
    PlayerSource,
    /// Trade the page nonce for download links, then follow redirects.
    GatedDownload(GatedRequest),
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::PlayerSource => "player-source",
            Strategy::GatedDownload(_) => "gated-download",
        }
    }
}

pub struct Resolver {
    config: Config,
    fetcher: Fetcher,
}

impl Resolver {
    pub fn new(config: Config) -> Result<Self> {
        let fetcher = Fetcher::new(&config)?;
        Ok(Resolver { config, fetcher })
    }

    pub async fn resolve(&self, page: &EpisodePage, strategy: &Strategy) -> Result<ResolvedUrl, ResolveError> {
        crate::util::debug(format!(
            "resolving {} via {}",
            page.url(&self.config.base_url),
            strategy.name()
        ));
        match strategy {
            Strategy::PlayerSource => player::resolve(&self.fetcher, &self.config, page).await.map(ResolvedUrl::from),
            Strategy::GatedDownload(request) => gated::resolve(&self.fetcher, &self.config, page, request).await,
        }
    }

    pub async fn resolve_player(&self, player_url: &str) -> Result<ResolvedUrl, ResolveError> {
        crate::types::ensure_http_url(player_url)?;
        player::resolve_player(&self.fetcher, player_url, None)
            .await
            .map(ResolvedUrl::from)
    }

    pub async fn follow(&self, url: &str) -> Result<ResolvedUrl, ResolveError> {
        self.fetcher.follow_redirects(url, None).await
    }
}
