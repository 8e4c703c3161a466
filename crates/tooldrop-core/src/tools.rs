//! Built-in tool registry.
//!
//! Every installable tool is the same engine driven by a [`ToolSpec`]: its
//! release sources with their platform spelling, the binaries that make up
//! an install, and optionally a recipe for building from source when no
//! prebuilt binary fits the host.

use tooldrop_schema::PlatformNaming;

use crate::priority::{OverrideRule, SourcePriority};

/// A release source and the asset naming it uses.
#[derive(Debug, Clone)]
pub struct SourceSpec {
    /// `owner/repo` on the release API.
    pub id: String,
    pub naming: PlatformNaming,
    /// Accepted archive suffixes, lowercase (`.zip`, `.tar.gz`, ...).
    pub extensions: Vec<String>,
    /// Asset names must start with this, when set.
    pub prefix: Option<String>,
}

impl SourceSpec {
    fn new(id: &str, naming: PlatformNaming, extensions: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            naming,
            extensions: extensions.iter().map(|e| (*e).to_string()).collect(),
            prefix: None,
        }
    }

    fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }
}

/// A helper binary the project builds for itself before the real build.
#[derive(Debug, Clone)]
pub struct HelperSpec {
    pub name: String,
    /// Helper source tree, relative to the checkout root.
    pub source_dir: String,
    /// Where the bootstrap leaves the helper, relative to the checkout root.
    pub binary: String,
    /// Command that builds the helper inside `source_dir`.
    pub bootstrap: Vec<String>,
}

/// An external binary the build needs, located via env var then `PATH`.
#[derive(Debug, Clone)]
pub struct DependencySpec {
    pub name: String,
    pub env_var: String,
}

/// How to produce the tool from a tagged source checkout.
#[derive(Debug, Clone)]
pub struct SourceBuildSpec {
    pub repo_url: String,
    /// Programs that must be on `PATH` before anything is attempted.
    pub prerequisites: Vec<String>,
    pub helper: Option<HelperSpec>,
    /// Arguments passed to the helper (release mode).
    pub build_args: Vec<String>,
    /// Directory the helper runs in, relative to the checkout root.
    pub workdir: String,
    /// Candidate output directories, probed in order.
    pub output_candidates: Vec<String>,
    pub dependencies: Vec<DependencySpec>,
}

/// Everything the engine needs to know about one tool.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// Sources in default priority order.
    pub sources: Vec<SourceSpec>,
    pub main_binary: String,
    pub aux_binaries: Vec<String>,
    /// Basenames always marked executable. A trailing `*` matches a prefix.
    pub executable_allowlist: Vec<String>,
    /// Flags tried in order to verify the installed binary.
    pub version_flags: Vec<String>,
    pub overrides: Vec<OverrideRule>,
    pub source_build: Option<SourceBuildSpec>,
}

impl ToolSpec {
    pub fn source(&self, id: &str) -> Option<&SourceSpec> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.id.clone()).collect()
    }

    /// Default priority with the built-in exceptions applied.
    pub fn priority(&self) -> SourcePriority {
        let mut priority = SourcePriority::new(self.source_ids());
        for rule in &self.overrides {
            priority.set_override(rule.clone());
        }
        priority
    }

    /// Whether a basename is on the executable allowlist.
    pub fn is_allowlisted(&self, basename: &str) -> bool {
        self.executable_allowlist
            .iter()
            .any(|pattern| match pattern.strip_suffix('*') {
                Some(prefix) => basename.starts_with(prefix),
                None => basename == pattern,
            })
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn z3() -> ToolSpec {
    ToolSpec {
        name: "z3".to_string(),
        description: "Z3 SMT solver".to_string(),
        sources: vec![
            SourceSpec::new("Z3Prover/z3", PlatformNaming::Z3, &[".zip"]),
            SourceSpec::new("Beneficial-AI-Foundation/z3", PlatformNaming::Z3, &[".zip"]),
        ],
        main_binary: "z3".to_string(),
        aux_binaries: Vec::new(),
        executable_allowlist: strings(&["z3"]),
        version_flags: strings(&["--version"]),
        // Upstream's linux arm64 build of this tag does not run; the mirror's does.
        overrides: vec![OverrideRule {
            tag: "z3-4.12.5".to_string(),
            platform: "linux-aarch64".to_string(),
            prefer: strings(&["Beneficial-AI-Foundation/z3"]),
        }],
        source_build: None,
    }
}

fn verus() -> ToolSpec {
    ToolSpec {
        name: "verus".to_string(),
        description: "Verus verifier for Rust".to_string(),
        sources: vec![SourceSpec::new(
            "verus-lang/verus",
            PlatformNaming::Verus,
            &[".zip", ".tar.gz"],
        )],
        main_binary: "verus".to_string(),
        aux_binaries: strings(&["cargo-verus"]),
        executable_allowlist: strings(&["verus*", "rust_*", "cargo-verus", "z3"]),
        version_flags: strings(&["--version"]),
        overrides: Vec::new(),
        source_build: Some(SourceBuildSpec {
            repo_url: "https://github.com/verus-lang/verus.git".to_string(),
            prerequisites: strings(&["git", "rustup", "cargo"]),
            helper: Some(HelperSpec {
                name: "vargo".to_string(),
                source_dir: "tools/vargo".to_string(),
                binary: "tools/vargo/target/release/vargo".to_string(),
                bootstrap: strings(&["cargo", "build", "--release"]),
            }),
            build_args: strings(&["build", "--release"]),
            workdir: "source".to_string(),
            output_candidates: strings(&[
                "source/target-verus/release",
                "source/target/release",
                "target-verus/release",
                "target/release",
            ]),
            dependencies: vec![DependencySpec {
                name: "z3".to_string(),
                env_var: "VERUS_Z3_PATH".to_string(),
            }],
        }),
    }
}

fn rust_analyzer() -> ToolSpec {
    ToolSpec {
        name: "rust-analyzer".to_string(),
        description: "Rust language server".to_string(),
        sources: vec![
            SourceSpec::new(
                "rust-lang/rust-analyzer",
                PlatformNaming::RustTarget,
                &[".gz"],
            )
            .with_prefix("rust-analyzer-"),
        ],
        main_binary: "rust-analyzer".to_string(),
        aux_binaries: Vec::new(),
        executable_allowlist: strings(&["rust-analyzer"]),
        version_flags: strings(&["--version"]),
        overrides: Vec::new(),
        source_build: None,
    }
}

fn scip() -> ToolSpec {
    ToolSpec {
        name: "scip".to_string(),
        description: "SCIP code intelligence CLI".to_string(),
        sources: vec![
            SourceSpec::new("sourcegraph/scip", PlatformNaming::Go, &[".tar.gz"])
                .with_prefix("scip-"),
        ],
        main_binary: "scip".to_string(),
        aux_binaries: Vec::new(),
        executable_allowlist: strings(&["scip"]),
        version_flags: strings(&["--version", "--help"]),
        overrides: Vec::new(),
        source_build: None,
    }
}

/// All built-in tools, in display order.
pub fn builtin() -> Vec<ToolSpec> {
    vec![z3(), verus(), rust_analyzer(), scip()]
}

/// Look up a built-in tool by name (case-insensitive).
pub fn lookup(name: &str) -> Option<ToolSpec> {
    let name = name.to_lowercase();
    builtin().into_iter().find(|t| t.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert!(lookup("Z3").is_some());
        assert!(lookup("rust-analyzer").is_some());
        assert!(lookup("emacs").is_none());
    }

    #[test]
    fn test_allowlist_patterns() {
        let verus = lookup("verus").unwrap();
        assert!(verus.is_allowlisted("verus"));
        assert!(verus.is_allowlisted("verus-root"));
        assert!(verus.is_allowlisted("rust_verify"));
        assert!(verus.is_allowlisted("z3"));
        assert!(!verus.is_allowlisted("z3.txt"));
        assert!(!verus.is_allowlisted("README.md"));
    }

    #[test]
    fn test_z3_builtin_exception() {
        let z3 = lookup("z3").unwrap();
        let priority = z3.priority();
        assert_eq!(
            priority.order_for("z3-4.12.5", "linux-aarch64"),
            vec!["Beneficial-AI-Foundation/z3", "Z3Prover/z3"]
        );
        assert_eq!(
            priority.order_for("z3-4.12.5", "linux-x86_64"),
            vec!["Z3Prover/z3", "Beneficial-AI-Foundation/z3"]
        );
    }

    #[test]
    fn test_only_verus_builds_from_source() {
        let buildable: Vec<String> = builtin()
            .into_iter()
            .filter(|t| t.source_build.is_some())
            .map(|t| t.name)
            .collect();
        assert_eq!(buildable, vec!["verus"]);
    }
}
