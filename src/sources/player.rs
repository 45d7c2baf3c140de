//! Public player page: episode page -> player iframe -> packed script ->
//! `source:` url.

use crate::config::Config;
use crate::error::ResolveError;
use crate::extract;
use crate::fetch::Fetcher;
use crate::packer;
use crate::types::{EpisodePage, VideoSource};
use crate::util;

pub async fn resolve(fetcher: &Fetcher, config: &Config, page: &EpisodePage) -> Result<VideoSource, ResolveError> {
    let page_url = page.url(&config.base_url);
    let html = fetcher.get_text(&page_url, None).await?;
    let player_url = extract::player_frame(&html, &page_url)?;
    util::debug(format!("player iframe: {player_url}"));
    resolve_player(fetcher, &player_url, Some(&page_url)).await
}

/// Resolves a player page directly. Without `referer` the mirror root is sent.
pub async fn resolve_player(
    fetcher: &Fetcher,
    player_url: &str,
    referer: Option<&str>,
) -> Result<VideoSource, ResolveError> {
    let html = fetcher.get_text(player_url, referer).await?;
    let decoded = packer::unpack(&html)?;
    util::debug(format!("unpacked script: {} bytes", decoded.len()));
    extract::video_source(&decoded, &html)
}
