use std::sync::OnceLock;

use regex::Regex;

fn separators() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").unwrap())
}

/// Lower-cased, hyphen-joined form of a display title.
pub fn slugify(title: &str) -> String {
    let lower = title.to_lowercase();
    separators()
        .replace_all(&lower, "-")
        .trim_matches('-')
        .to_string()
}

/// Path segment of an episode page on the mirror, e.g. `one-piece-dub-episode-3`.
pub fn episode_slug(title: &str, episode: u32, dub: bool) -> String {
    let base = slugify(title);
    if dub {
        format!("{base}-dub-episode-{episode}")
    } else {
        format!("{base}-episode-{episode}")
    }
}

/// Full mirror URL for an episode: `{base}/{slug}/`.
pub fn episode_url(base: &str, title: &str, episode: u32, dub: bool) -> String {
    format!(
        "{}/{}/",
        base.trim_end_matches('/'),
        episode_slug(title, episode, dub)
    )
}
