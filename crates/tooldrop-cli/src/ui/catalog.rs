//! Release table and asset listing for `tooldrop install --list`.

use crossterm::style::Stylize;
use tooldrop_schema::{CatalogEntry, Release};

const INDEX_WIDTH: usize = 4;
const DATE_WIDTH: usize = 10;
const STATUS_WIDTH: usize = 13;

/// Column width for tags: the longest tag, at least the header.
fn tag_width(entries: &[&CatalogEntry]) -> usize {
    entries
        .iter()
        .map(|e| e.tag.len())
        .max()
        .unwrap_or(0)
        .max("tag".len())
}

/// Unstyled rows, numbered from 1.
pub fn release_rows(entries: &[&CatalogEntry]) -> Vec<String> {
    let tw = tag_width(entries);
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let status = if entry.prerelease { "(pre-release)" } else { "" };
            format!(
                "{:>INDEX_WIDTH$}  {:<tw$}  {:<DATE_WIDTH$}  {:<STATUS_WIDTH$}  {}",
                i + 1,
                entry.tag,
                entry.date(),
                status,
                entry.sources.join(", "),
            )
            .trim_end()
            .to_string()
        })
        .collect()
}

/// Print a numbered release table.
pub fn print_releases(entries: &[&CatalogEntry]) {
    if entries.is_empty() {
        println!("  {}", "no releases".dark_grey());
        return;
    }
    let tw = tag_width(entries);
    let header = format!(
        "{:>INDEX_WIDTH$}  {:<tw$}  {:<DATE_WIDTH$}  {:<STATUS_WIDTH$}  {}",
        "#", "tag", "date", "status", "sources",
    );

    println!();
    println!("  {}", header.dark_grey());
    for (row, entry) in release_rows(entries).into_iter().zip(entries) {
        if entry.prerelease {
            println!("  {}", row.yellow());
        } else {
            println!("  {row}");
        }
    }
    println!();
}

/// Unstyled asset lines for one tag, grouped by source.
pub fn asset_lines(releases: &[&Release]) -> Vec<String> {
    let mut lines = Vec::new();
    for release in releases {
        lines.push(format!("{}:", release.source_id));
        if release.assets.is_empty() {
            lines.push("  (no assets)".to_string());
        }
        for asset in &release.assets {
            lines.push(format!("  {:<60} {:>8.1} MB", asset.name, asset.size_mb()));
        }
    }
    lines
}

/// Print the assets backing `tag`.
pub fn print_assets(tag: &str, releases: &[&Release]) {
    println!("  {} {}", "assets for".dark_grey(), tag.white().bold());
    for line in asset_lines(releases) {
        println!("  {line}");
    }
    println!();
}
