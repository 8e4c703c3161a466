//! Asset resolution: pick the one downloadable file that fits the platform.
//!
//! Sources are tried in effective priority order and the first source with a
//! matching asset wins. Later sources are never consulted, even if they also
//! publish a match.

use thiserror::Error;
use tooldrop_schema::{Asset, PlatformSelector, Release};

use crate::priority::SourcePriority;
use crate::tools::{SourceSpec, ToolSpec};

/// Asset names published by one source, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAssets {
    pub source_id: String,
    pub assets: Vec<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("release '{tag}' is not published by any source")]
    UnknownTag { tag: String },

    #[error("no asset for platform '{platform}' in release '{tag}'")]
    NoMatchingAsset {
        tag: String,
        platform: String,
        /// Every asset actually present, grouped by source.
        available: Vec<SourceAssets>,
    },
}

impl ResolveError {
    /// Multi-line listing of what was available, for the error stream.
    pub fn diagnostic(&self) -> Option<String> {
        let Self::NoMatchingAsset { available, .. } = self else {
            return None;
        };
        let mut out = String::from("Available assets:");
        for group in available {
            out.push_str(&format!("\n  {}:", group.source_id));
            if group.assets.is_empty() {
                out.push_str("\n    (none)");
            }
            for name in &group.assets {
                out.push_str(&format!("\n    - {name}"));
            }
        }
        Some(out)
    }
}

/// Whether `name` is a platform match for `source`.
///
/// Containment, not equality: published names carry qualifiers (libc
/// version, compiler variant) that the platform string does not pin down.
pub fn asset_matches(name: &str, pattern: &str, source: &SourceSpec) -> bool {
    let lower = name.to_lowercase();
    let pattern = pattern.to_lowercase();

    lower.contains(&pattern)
        && source.extensions.iter().any(|ext| lower.ends_with(ext.as_str()))
        && source
            .prefix
            .as_ref()
            .is_none_or(|p| lower.starts_with(&p.to_lowercase()))
}

/// Resolve the asset to install for `tag`.
///
/// `releases` are the per-source records backing the tag (see
/// [`crate::catalog::Catalog::releases_for`]).
pub fn resolve(
    tool: &ToolSpec,
    tag: &str,
    selector: &PlatformSelector,
    releases: &[&Release],
    priority: &SourcePriority,
) -> Result<Asset, ResolveError> {
    if releases.is_empty() {
        return Err(ResolveError::UnknownTag {
            tag: tag.to_string(),
        });
    }

    let namings: Vec<_> = tool.sources.iter().map(|s| s.naming).collect();
    let order = priority.order_for_keys(tag, &selector.override_keys(&namings));
    tracing::debug!(%tag, platform = %selector, ?order, "resolving asset");

    for source_id in &order {
        let Some(release) = releases.iter().find(|r| &r.source_id == source_id) else {
            continue;
        };
        let Some(source) = tool.source(source_id) else {
            tracing::debug!(source = %source_id, "no naming rules for source, skipping");
            continue;
        };
        let Some(pattern) = selector.render(source.naming) else {
            tracing::debug!(source = %source_id, "source publishes nothing for this platform");
            continue;
        };

        if let Some(asset) = release
            .assets
            .iter()
            .find(|a| asset_matches(&a.name, &pattern, source))
        {
            tracing::info!(source = %source_id, asset = %asset.name, "matched asset");
            return Ok(asset.clone());
        }
    }

    Err(ResolveError::NoMatchingAsset {
        tag: tag.to_string(),
        platform: selector.to_string(),
        available: releases
            .iter()
            .map(|r| SourceAssets {
                source_id: r.source_id.clone(),
                assets: r.assets.iter().map(|a| a.name.clone()).collect(),
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::OverrideRule;
    use crate::tools;
    use chrono::Utc;
    use tooldrop_schema::PlatformPattern;

    fn asset(name: &str, source: &str) -> Asset {
        Asset {
            name: name.to_string(),
            size_bytes: 1024,
            download_url: format!("https://example.com/{source}/{name}"),
            source_id: source.to_string(),
        }
    }

    fn release(tag: &str, source: &str, names: &[&str]) -> Release {
        Release {
            tag: tag.to_string(),
            published_at: Utc::now(),
            prerelease: false,
            source_id: source.to_string(),
            assets: names.iter().map(|n| asset(n, source)).collect(),
        }
    }

    fn host(key: &str) -> PlatformSelector {
        PlatformSelector::Host(key.parse::<PlatformPattern>().unwrap())
    }

    const UPSTREAM: &str = "Z3Prover/z3";
    const MIRROR: &str = "Beneficial-AI-Foundation/z3";

    #[test]
    fn test_first_source_with_match_wins() {
        let z3 = tools::lookup("z3").unwrap();
        let a = release("z3-4.13.0", UPSTREAM, &["z3-4.13.0-x64-glibc-2.35.zip"]);
        let b = release("z3-4.13.0", MIRROR, &["z3-4.13.0-x64-glibc-2.39.zip"]);

        let got = resolve(&z3, "z3-4.13.0", &host("linux-x86_64"), &[&a, &b], &z3.priority())
            .unwrap();
        assert_eq!(got.source_id, UPSTREAM);
    }

    #[test]
    fn test_override_flips_priority_for_exact_pair() {
        let z3 = tools::lookup("z3").unwrap();
        let a = release("v9", UPSTREAM, &["z3-v9-arm64-glibc-2.34.zip"]);
        let b = release("v9", MIRROR, &["z3-v9-arm64-glibc-2.38.zip"]);

        let mut priority = z3.priority();
        let before = resolve(&z3, "v9", &host("linux-aarch64"), &[&a, &b], &priority).unwrap();
        assert_eq!(before.source_id, UPSTREAM);

        priority.set_override(OverrideRule {
            tag: "v9".to_string(),
            platform: "linux-aarch64".to_string(),
            prefer: vec![MIRROR.to_string()],
        });
        let after = resolve(&z3, "v9", &host("linux-aarch64"), &[&a, &b], &priority).unwrap();
        assert_eq!(after.source_id, MIRROR);
    }

    #[test]
    fn test_builtin_override_applies_to_explicit_spelling() {
        let z3 = tools::lookup("z3").unwrap();
        let tag = "z3-4.12.5";
        let a = release(tag, UPSTREAM, &["z3-4.12.5-arm64-glibc-2.35.zip"]);
        let b = release(tag, MIRROR, &["z3-4.12.5-arm64-glibc-2.31.zip"]);
        let priority = z3.priority();

        let by_host = resolve(&z3, tag, &host("linux-aarch64"), &[&a, &b], &priority).unwrap();
        assert_eq!(by_host.source_id, MIRROR);

        let literal = PlatformSelector::Explicit("arm64-glibc".to_string());
        let by_literal = resolve(&z3, tag, &literal, &[&a, &b], &priority).unwrap();
        assert_eq!(by_literal.source_id, MIRROR);

        // Other platforms keep the default order for the same tag
        let x64 = release(tag, UPSTREAM, &["z3-4.12.5-x64-glibc-2.35.zip"]);
        let x64_mirror = release(tag, MIRROR, &["z3-4.12.5-x64-glibc-2.31.zip"]);
        let literal = PlatformSelector::Explicit("x64-glibc".to_string());
        let other = resolve(&z3, tag, &literal, &[&x64, &x64_mirror], &priority).unwrap();
        assert_eq!(other.source_id, UPSTREAM);
    }

    #[test]
    fn test_falls_back_to_later_source() {
        let z3 = tools::lookup("z3").unwrap();
        let a = release("v1", UPSTREAM, &["z3-v1-x64-win.zip"]);
        let b = release("v1", MIRROR, &["z3-v1-arm64-osx-13.0.zip"]);

        let got = resolve(&z3, "v1", &host("macos-aarch64"), &[&a, &b], &z3.priority()).unwrap();
        assert_eq!(got.source_id, MIRROR);
    }

    #[test]
    fn test_no_match_lists_every_asset() {
        let z3 = tools::lookup("z3").unwrap();
        let a = release("v1", UPSTREAM, &["z3-v1-x64-win.zip", "z3-v1-x64-glibc.tar.bz2"]);
        let b = release("v1", MIRROR, &["z3-v1-x64-osx.zip"]);

        let err = resolve(&z3, "v1", &host("linux-x86_64"), &[&a, &b], &z3.priority())
            .unwrap_err();

        let ResolveError::NoMatchingAsset { ref available, .. } = err else {
            panic!("expected NoMatchingAsset, got {err:?}");
        };
        assert_eq!(available.len(), 2);
        assert_eq!(available[0].assets.len(), 2);
        let text = err.diagnostic().unwrap();
        assert!(text.contains("z3-v1-x64-glibc.tar.bz2"));
        assert!(text.contains(MIRROR));
    }

    #[test]
    fn test_matching_is_case_insensitive_and_checks_extension() {
        let ra = tools::lookup("rust-analyzer").unwrap();
        let source = &ra.sources[0];
        assert!(asset_matches(
            "rust-analyzer-X86_64-unknown-linux-gnu.gz",
            "x86_64-unknown-linux-gnu",
            source
        ));
        assert!(!asset_matches(
            "rust-analyzer-x86_64-unknown-linux-gnu.zip",
            "x86_64-unknown-linux-gnu",
            source
        ));
        // Required prefix
        assert!(!asset_matches(
            "ra-x86_64-unknown-linux-gnu.gz",
            "x86_64-unknown-linux-gnu",
            source
        ));
    }

    #[test]
    fn test_unrenderable_platform_is_no_match() {
        let verus = tools::lookup("verus").unwrap();
        let r = release("0.1", "verus-lang/verus", &["verus-0.1-x86-linux.zip"]);
        let err = resolve(&verus, "0.1", &host("linux-aarch64"), &[&r], &verus.priority())
            .unwrap_err();
        assert!(matches!(err, ResolveError::NoMatchingAsset { .. }));
    }

    #[test]
    fn test_explicit_platform_literal() {
        let verus = tools::lookup("verus").unwrap();
        let r = release("0.1", "verus-lang/verus", &["verus-0.1-x86-linux.zip"]);
        let sel = PlatformSelector::Explicit("X86-Linux".to_string());
        let got = resolve(&verus, "0.1", &sel, &[&r], &verus.priority()).unwrap();
        assert_eq!(got.name, "verus-0.1-x86-linux.zip");
    }

    #[test]
    fn test_unknown_tag() {
        let z3 = tools::lookup("z3").unwrap();
        let err = resolve(&z3, "nope", &host("linux-x86_64"), &[], &z3.priority()).unwrap_err();
        assert_eq!(
            err,
            ResolveError::UnknownTag {
                tag: "nope".to_string()
            }
        );
    }
}
