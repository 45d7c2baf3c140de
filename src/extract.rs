use std::sync::OnceLock;

use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use crate::error::ResolveError;
use crate::types::VideoSource;
use crate::util;

fn source_field() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\bsource["']?\s*:\s*["'](https?://[^"']+)["']"#).unwrap())
}

fn sources_list() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\bsources["']?\s*:\s*\["#).unwrap())
}

fn nonce_field() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"["']?\bnonce["']?\s*[:=]\s*["']([0-9a-fA-F]{10,})["']"#).unwrap())
}

/// Pulls the single `source: '<url>'` entry out of an unpacked player script.
///
/// When the URL carries no `file=` parameter and `page_html` has an
/// `<h1 class="title">`, its trimmed text is appended as `file=<title>`.
pub fn video_source(decoded: &str, page_html: &str) -> Result<VideoSource, ResolveError> {
    let Some(caps) = source_field().captures(decoded) else {
        if sources_list().is_match(decoded) {
            return Err(ResolveError::UnsupportedSourceFormat {
                decoded: decoded.to_string(),
            });
        }
        return Err(ResolveError::SourceFieldNotFound {
            decoded: decoded.to_string(),
        });
    };
    let source = VideoSource::new(&caps[1])?;
    util::debug(format!("source field: {}", source.url));

    if source.has_filename_param() {
        return Ok(source);
    }
    match page_title(page_html) {
        Some(title) => Ok(source.with_filename(&title)),
        None => Ok(source),
    }
}

fn page_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let sel = Selector::parse("h1.title").unwrap();
    doc.select(&sel)
        .next()
        .map(|h| visible_text(&h))
        .filter(|t| !t.is_empty())
}

/// Hex token the page hands to the download endpoint.
pub fn nonce(html: &str, url: &str) -> Result<String, ResolveError> {
    nonce_field()
        .captures(html)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| ResolveError::NonceNotFound {
            url: url.to_string(),
        })
}

/// `src` of the first player iframe, made absolute against the page URL.
pub fn player_frame(html: &str, page_url: &str) -> Result<String, ResolveError> {
    let not_found = || ResolveError::PlayerFrameNotFound {
        url: page_url.to_string(),
    };
    let src = first_attr(html, "iframe", "src").ok_or_else(not_found)?;
    absolutize(&src, page_url).ok_or_else(not_found)
}

/// Attribute of the first `tag` element carrying it.
pub fn first_attr(html: &str, tag: &str, attr: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let sel = Selector::parse(&format!("{tag}[{attr}]")).ok()?;
    doc.select(&sel)
        .filter_map(|el| el.value().attr(attr))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn absolutize(href: &str, base: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    Url::parse(base).ok()?.join(href).ok().map(String::from)
}

/// Text content with surrounding whitespace trimmed.
pub fn visible_text(el: &ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// The element directly following `el`, skipping text and comment nodes.
pub fn next_sibling_element<'a>(el: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    el.next_siblings().find_map(ElementRef::wrap)
}
