//! Jikan (MyAnimeList) lookups that supply the ids and canonical titles the
//! resolvers consume.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Deserialize;
use urlencoding::encode;

use crate::config::Config;
use crate::fetch::Fetcher;
use crate::types::CatalogEntry;
use crate::util;

const REQUESTS_PER_WINDOW: usize = 3;
const WINDOW: Duration = Duration::from_secs(1);
const WAIT_BUFFER: Duration = Duration::from_millis(50);
const LISTING_LIMIT: usize = 15;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// At most `limit` requests per rolling `window`.
pub struct RateLimiter<C: Clock = SystemClock> {
    limit: usize,
    window: Duration,
    clock: C,
    sent: Mutex<VecDeque<Instant>>,
}

impl RateLimiter<SystemClock> {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self::with_clock(limit, window, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(limit: usize, window: Duration, clock: C) -> Self {
        RateLimiter {
            limit: limit.max(1),
            window,
            clock,
            sent: Mutex::new(VecDeque::new()),
        }
    }

    /// Takes a slot if one is free, otherwise says how long to wait.
    pub fn reserve(&self) -> Option<Duration> {
        let now = self.clock.now();
        let mut sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        while let Some(&oldest) = sent.front() {
            if now.duration_since(oldest) >= self.window {
                sent.pop_front();
            } else {
                break;
            }
        }
        if sent.len() < self.limit {
            sent.push_back(now);
            return None;
        }
        let oldest = *sent.front()?;
        Some(self.window.saturating_sub(now.duration_since(oldest)) + WAIT_BUFFER)
    }

    pub async fn acquire(&self) {
        while let Some(wait) = self.reserve() {
            util::debug(format!("catalog rate limit reached, waiting {}ms", wait.as_millis()));
            tokio::time::sleep(wait).await;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Listing {
    /// Top anime by popularity
    Popular,
    /// Top airing anime
    Airing,
    /// Upcoming season
    Upcoming,
}

impl Listing {
    fn path(self) -> String {
        match self {
            Listing::Popular => format!("/top/anime?filter=bypopularity&limit={LISTING_LIMIT}"),
            Listing::Airing => format!("/top/anime?filter=airing&limit={LISTING_LIMIT}"),
            Listing::Upcoming => format!("/seasons/upcoming?limit={LISTING_LIMIT}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    data: Vec<JikanAnime>,
}

#[derive(Debug, Deserialize)]
struct JikanAnime {
    mal_id: u64,
    title: String,
    title_english: Option<String>,
    images: Option<JikanImages>,
    #[serde(rename = "type")]
    kind: Option<String>,
    year: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct JikanImages {
    jpg: Option<JikanImage>,
}

#[derive(Debug, Deserialize)]
struct JikanImage {
    large_image_url: Option<String>,
}

impl From<JikanAnime> for CatalogEntry {
    fn from(anime: JikanAnime) -> Self {
        let name = anime
            .title_english
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(anime.title);
        CatalogEntry {
            id: anime.mal_id,
            name,
            image: anime.images.and_then(|i| i.jpg).and_then(|j| j.large_image_url),
            kind: anime.kind,
            year: anime.year,
        }
    }
}

pub struct CatalogClient {
    fetcher: Fetcher,
    base: String,
    limiter: Arc<RateLimiter>,
}

impl CatalogClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(CatalogClient {
            fetcher: Fetcher::new(config)?,
            base: config.catalog_url.trim_end_matches('/').to_string(),
            limiter: Arc::new(RateLimiter::new(REQUESTS_PER_WINDOW, WINDOW)),
        })
    }

    async fn list(&self, path: &str) -> Result<Vec<CatalogEntry>> {
        self.limiter.acquire().await;
        let url = format!("{}{}", self.base, path);
        util::debug(format!("catalog request: {url}"));
        let body = self.fetcher.get_text(&url, None).await?;
        let resp: ListResponse = serde_json::from_str(&body).context("catalog returned unexpected json")?;
        Ok(resp.data.into_iter().map(CatalogEntry::from).collect())
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<CatalogEntry>> {
        self.list(&format!("/anime?q={}&limit={}", encode(query.trim()), limit))
            .await
            .with_context(|| format!("catalog search for \"{query}\" failed"))
    }

    pub async fn listing(&self, listing: Listing) -> Result<Vec<CatalogEntry>> {
        self.list(&listing.path()).await
    }
}
