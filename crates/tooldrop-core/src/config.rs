//! User-supplied source priority overrides.
//!
//! ```toml
//! [[override]]
//! tool = "z3"
//! tag = "z3-4.12.5"
//! platform = "linux-aarch64"
//! prefer = ["Beneficial-AI-Foundation/z3"]
//! ```
//!
//! File rows replace a built-in exception for the same `(tag, platform)`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::priority::{OverrideRule, SourcePriority, platform_key};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid override table {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("duplicate override for {tool} {tag} on {platform}: only one may apply")]
    Duplicate {
        tool: String,
        tag: String,
        platform: String,
    },

    #[error("override for {tool} {tag} on {platform} prefers no sources")]
    EmptyPreference {
        tool: String,
        tag: String,
        platform: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OverrideEntry {
    pub tool: String,
    pub tag: String,
    pub platform: String,
    pub prefer: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OverrideFile {
    #[serde(default, rename = "override")]
    overrides: Vec<OverrideEntry>,
}

/// Validated rows from an override file.
#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    entries: Vec<OverrideEntry>,
}

impl OverrideTable {
    /// Parse and validate TOML text. `origin` names the source in errors.
    pub fn parse(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let file: OverrideFile = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;

        let mut seen = HashSet::new();
        for entry in &file.overrides {
            let platform = platform_key(&entry.platform);
            if entry.prefer.is_empty() {
                return Err(ConfigError::EmptyPreference {
                    tool: entry.tool.clone(),
                    tag: entry.tag.clone(),
                    platform,
                });
            }
            if !seen.insert((entry.tool.to_lowercase(), entry.tag.clone(), platform.clone())) {
                return Err(ConfigError::Duplicate {
                    tool: entry.tool.clone(),
                    tag: entry.tag.clone(),
                    platform,
                });
            }
        }

        Ok(Self {
            entries: file.overrides,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Like [`Self::load`], but a missing file is an empty table.
    pub fn load_optional(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rules that apply to `tool`.
    pub fn rules_for<'a>(&'a self, tool: &'a str) -> impl Iterator<Item = OverrideRule> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.tool.eq_ignore_ascii_case(tool))
            .map(|e| OverrideRule {
                tag: e.tag.clone(),
                platform: e.platform.clone(),
                prefer: e.prefer.clone(),
            })
    }

    /// Layer this table over `priority`, returning how many rules applied.
    pub fn apply(&self, tool: &str, priority: &mut SourcePriority) -> usize {
        let mut applied = 0;
        for rule in self.rules_for(tool) {
            if let Some(previous) = priority.set_override(rule) {
                tracing::debug!(?previous, "file override replaced built-in exception");
            }
            applied += 1;
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TABLE: &str = r#"
[[override]]
tool = "z3"
tag = "z3-4.13.0"
platform = "macos-arm64"
prefer = ["Beneficial-AI-Foundation/z3"]

[[override]]
tool = "z3"
tag = "z3-4.12.5"
platform = "linux-aarch64"
prefer = ["Z3Prover/z3"]

[[override]]
tool = "verus"
tag = "0.1"
platform = "linux-x86_64"
prefer = ["verus-lang/verus"]
"#;

    #[test]
    fn test_apply_layers_over_builtin() {
        let table = OverrideTable::parse(TABLE, Path::new("test.toml")).unwrap();
        let z3 = crate::tools::lookup("z3").unwrap();
        let mut priority = z3.priority();

        assert_eq!(table.apply("z3", &mut priority), 2);
        assert_eq!(
            priority.order_for("z3-4.13.0", "macos-aarch64"),
            vec!["Beneficial-AI-Foundation/z3", "Z3Prover/z3"]
        );
        // Built-in exception replaced by the file row
        assert_eq!(
            priority.order_for("z3-4.12.5", "linux-aarch64"),
            vec!["Z3Prover/z3", "Beneficial-AI-Foundation/z3"]
        );
    }

    #[test]
    fn test_duplicate_pair_is_rejected() {
        let text = r#"
[[override]]
tool = "z3"
tag = "v1"
platform = "linux-arm64"
prefer = ["A"]

[[override]]
tool = "Z3"
tag = "v1"
platform = "linux-aarch64"
prefer = ["B"]
"#;
        let err = OverrideTable::parse(text, Path::new("dup.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Duplicate { ref platform, .. } if platform == "linux-aarch64"));
    }

    #[test]
    fn test_empty_prefer_is_rejected() {
        let text = "[[override]]\ntool = \"z3\"\ntag = \"v1\"\nplatform = \"linux-x86_64\"\nprefer = []\n";
        assert!(matches!(
            OverrideTable::parse(text, Path::new("x.toml")),
            Err(ConfigError::EmptyPreference { .. })
        ));
    }

    #[test]
    fn test_missing_optional_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let table = OverrideTable::load_optional(&tmp.path().join("overrides.toml")).unwrap();
        assert!(table.is_empty());

        assert!(matches!(
            OverrideTable::load(&tmp.path().join("overrides.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = OverrideTable::parse("[[override]]\ntool = 3\n", Path::new("bad.toml")).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }
}
