use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;

use crate::types::CatalogEntry;

use std::sync::atomic::{AtomicBool, Ordering};

static DEBUG: AtomicBool = AtomicBool::new(false);

pub fn set_debug(on: bool) {
    DEBUG.store(on, Ordering::Relaxed);
}

pub fn is_debug() -> bool {
    DEBUG.load(Ordering::Relaxed)
}

pub fn debug<S: AsRef<str>>(msg: S) {
    if is_debug() {
        eprintln!("[DEBUG] {}", msg.as_ref());
    }
}

fn to_json<T: Serialize + std::fmt::Debug>(value: &T) -> String {
    match serde_json::to_string_pretty(value) {
        Ok(s) => s,
        Err(_) => format!("{:?}", value),
    }
}

pub fn print_json<T: Serialize + std::fmt::Debug>(value: &T) {
    println!("{}", to_json(value));
}

/// Stderr spinner for the network phase. Hidden in debug mode so it does not
/// interleave with `[DEBUG]` lines.
pub fn spinner(msg: &str) -> ProgressBar {
    if is_debug() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub fn print_catalog_table(entries: &[CatalogEntry]) {
    println!("{} {}", "Total".bold(), entries.len());

    let index_header = "#";
    let id_header = "MAL";
    let name_header = "Title";
    let extra_header = "Type / Year";

    let index_width = std::cmp::max(index_header.len(), format!("{}", entries.len()).len());
    let id_width = std::cmp::max(
        id_header.len(),
        entries.iter().map(|e| e.id.to_string().len()).max().unwrap_or(0),
    );
    let name_width = std::cmp::max(
        name_header.len(),
        entries.iter().map(|e| e.name.chars().count()).max().unwrap_or(0),
    );

    println!(
        "{:<iw$}  {:<dw$}  {:<nw$}  {}",
        index_header.bold(),
        id_header.bold(),
        name_header.bold(),
        extra_header.bold(),
        iw = index_width,
        dw = id_width,
        nw = name_width
    );
    println!(
        "{:<iw$}  {:<dw$}  {:<nw$}  {}",
        "-".repeat(index_width),
        "-".repeat(id_width),
        "-".repeat(name_width),
        "-".repeat(extra_header.len()),
        iw = index_width,
        dw = id_width,
        nw = name_width
    );

    for (idx, entry) in entries.iter().enumerate() {
        let kind = entry.kind.as_deref().unwrap_or("?");
        let extra = match entry.year {
            Some(year) => format!("{} / {}", kind, year),
            None => kind.to_string(),
        };
        println!(
            "{:<iw$}  {:<dw$}  {:<nw$}  {}",
            idx + 1,
            entry.id,
            entry.name,
            extra.dimmed(),
            iw = index_width,
            dw = id_width,
            nw = name_width
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_json_omits_missing_kind_and_year() {
        let entries = vec![CatalogEntry {
            id: 21,
            name: "One Piece".to_string(),
            image: None,
            kind: None,
            year: None,
        }];
        let out = to_json(&entries);
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, serde_json::json!([{"id": 21, "name": "One Piece", "image": null}]));
        assert!(out.contains('\n'));
    }
}
