//! Nonce-gated download links: episode page -> nonce -> AJAX fragment ->
//! quality link -> redirects.

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use crate::config::Config;
use crate::error::ResolveError;
use crate::extract;
use crate::fetch::Fetcher;
use crate::types::{DownloadSection, EpisodePage, ResolvedUrl};
use crate::util;

pub const ACTION: &str = "fetch_download_links";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatedRequest {
    pub mal_id: u64,
    pub quality: String,
}

/// What the download endpoint said, once its envelope is unwrapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointReply {
    /// Status 200 with the links fragment.
    Links(String),
    /// Status 500: nothing published for this episode yet.
    NotPublished,
}

/// Accepts both `{status, result}` and `{data: {status, result}}`.
pub fn parse_endpoint_reply(body: &str) -> Result<EndpointReply, ResolveError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ResolveError::MalformedEndpointPayload(e.to_string()))?;
    let envelope = match value.get("data") {
        Some(data) if data.get("status").is_some() => data,
        _ => &value,
    };

    let status = match envelope.get("status") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
        None => "missing".to_string(),
    };
    util::debug(format!("download endpoint status: {status}"));

    match status.as_str() {
        "200" => envelope
            .get("result")
            .and_then(Value::as_str)
            .map(|html| EndpointReply::Links(html.to_string()))
            .ok_or_else(|| ResolveError::MalformedEndpointPayload("status 200 without a result fragment".to_string())),
        "500" => Ok(EndpointReply::NotPublished),
        _ => Err(ResolveError::UnexpectedEndpointStatus { status }),
    }
}

/// Finds the block whose text is exactly `label` and reads the anchors of
/// the element right after it.
pub fn download_section(fragment: &str, label: &str) -> Result<DownloadSection, ResolveError> {
    let doc = Html::parse_fragment(fragment);
    let any = Selector::parse("*").unwrap();
    let labels: Vec<ElementRef> = doc
        .select(&any)
        .filter(|el| extract::visible_text(el) == label)
        .collect();
    if labels.is_empty() {
        return Err(ResolveError::SectionNotFound {
            label: label.to_string(),
        });
    }
    let container = labels
        .iter()
        .find_map(|el| extract::next_sibling_element(el))
        .ok_or_else(|| ResolveError::LinksContainerNotFound {
            label: label.to_string(),
        })?;

    let anchor = Selector::parse("a[href]").unwrap();
    let mut section = DownloadSection::new(label);
    for a in container.select(&anchor) {
        let quality = extract::visible_text(&a);
        if let Some(href) = a.value().attr("href") {
            if !quality.is_empty() {
                section.insert(&quality, href.trim());
            }
        }
    }
    util::debug(format!("{label} section qualities: {}", section.order.join(", ")));
    Ok(section)
}

pub async fn resolve(
    fetcher: &Fetcher,
    config: &Config,
    page: &EpisodePage,
    request: &GatedRequest,
) -> Result<ResolvedUrl, ResolveError> {
    let page_url = page.url(&config.base_url);
    let html = fetcher.get_text(&page_url, None).await?;
    let nonce = extract::nonce(&html, &page_url)?;
    util::debug(format!("nonce: {nonce}"));

    let query = [
        ("action", ACTION.to_string()),
        ("mal_id", request.mal_id.to_string()),
        ("ep", page.episode.to_string()),
        ("nonce", nonce),
    ];
    let body = fetcher.get_ajax(&config.ajax_url, &query, &page_url).await?;
    let fragment = match parse_endpoint_reply(&body)? {
        EndpointReply::Links(fragment) => fragment,
        EndpointReply::NotPublished => {
            return Err(ResolveError::LinksNotPublished {
                mal_id: request.mal_id,
                episode: page.episode,
            })
        }
    };

    let section = download_section(&fragment, page.section_label())?;
    let href = section.select(&request.quality)?;
    let link = extract::absolutize(href, &config.ajax_url).ok_or_else(|| ResolveError::InvalidUrl {
        url: href.to_string(),
    })?;
    util::debug(format!("{} link: {link}", request.quality));
    fetcher.follow_redirects(&link, Some(&page_url)).await
}
