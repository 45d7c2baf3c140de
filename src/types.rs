use std::collections::BTreeMap;
use std::fmt;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ResolveError;
use crate::slug;

/// One episode on the mirror, refetched on every resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodePage {
    pub title: String,
    pub episode: u32,
    pub dub: bool,
}

impl EpisodePage {
    pub fn new(title: &str, episode: u32, dub: bool) -> Self {
        EpisodePage {
            title: title.to_string(),
            episode,
            dub,
        }
    }

    pub fn slug(&self) -> String {
        slug::episode_slug(&self.title, self.episode, self.dub)
    }

    pub fn url(&self, base: &str) -> String {
        slug::episode_url(base, &self.title, self.episode, self.dub)
    }

    /// Visible label of the download section for this audio track.
    pub fn section_label(&self) -> &'static str {
        if self.dub {
            "Dub"
        } else {
            "Sub"
        }
    }
}

/// Playable link recovered from a player script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSource {
    pub url: String,
    pub filename: Option<String>,
}

impl VideoSource {
    pub fn new(url: &str) -> Result<Self, ResolveError> {
        ensure_http_url(url)?;
        Ok(VideoSource {
            url: url.to_string(),
            filename: None,
        })
    }

    /// Adds the `file=` parameter some players need to name the download.
    pub fn with_filename(mut self, filename: &str) -> Self {
        let sep = if self.url.contains('?') { '&' } else { '?' };
        self.url = format!("{}{}file={}", self.url, sep, filename);
        self.filename = Some(filename.to_string());
        self
    }

    pub fn has_filename_param(&self) -> bool {
        self.url.contains("file=")
    }
}

/// Links of one "Sub" or "Dub" block, keyed by their visible quality label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadSection {
    pub label: String,
    pub links: BTreeMap<String, String>,
    /// Quality labels in page order.
    pub order: Vec<String>,
}

impl DownloadSection {
    pub fn new(label: &str) -> Self {
        DownloadSection {
            label: label.to_string(),
            ..Default::default()
        }
    }

    pub fn insert(&mut self, quality: &str, href: &str) {
        if self.links.insert(quality.to_string(), href.to_string()).is_none() {
            self.order.push(quality.to_string());
        }
    }

    /// Case-insensitive exact match on the quality label.
    pub fn select(&self, quality: &str) -> Result<&str, ResolveError> {
        self.order
            .iter()
            .find(|q| q.eq_ignore_ascii_case(quality.trim()))
            .and_then(|q| self.links.get(q))
            .map(String::as_str)
            .ok_or_else(|| ResolveError::QualityNotAvailable {
                requested: quality.to_string(),
                available: self.order.clone(),
            })
    }
}

/// Terminal artifact of a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedUrl {
    pub url: String,
}

impl fmt::Display for ResolvedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

impl From<VideoSource> for ResolvedUrl {
    fn from(source: VideoSource) -> Self {
        ResolvedUrl { url: source.url }
    }
}

pub fn ensure_http_url(url: &str) -> Result<Url, ResolveError> {
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => Ok(parsed),
        _ => Err(ResolveError::InvalidUrl {
            url: url.to_string(),
        }),
    }
}

/// Catalog entry, as stored by the curation tooling: `{id, name, image}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: u64,
    pub name: String,
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
}
