//! Host platform normalization and per-source asset naming.
//!
//! Release sources are inconsistent about how they spell a platform
//! (`x64-glibc`, `x86-linux`, `x86_64-unknown-linux-gnu`, `linux-amd64` all
//! describe the same machine). The host is normalized exactly once into a
//! [`PlatformPattern`] and rendered on demand through a [`PlatformNaming`]
//! convention, so no source-specific strings travel through the resolver.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when the host cannot be mapped onto a known OS or CPU family.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// Either the operating system or the machine architecture is unknown.
    #[error("Unsupported platform: {os}/{arch} (pass --platform to override)")]
    Unsupported {
        /// Raw operating system name as reported by the host.
        os: String,
        /// Raw machine architecture as reported by the host.
        arch: String,
    },
}

/// Operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    /// Linux (glibc-based distributions).
    Linux,
    /// macOS, also spelled `darwin` or `osx` by vendors.
    MacOS,
    /// Microsoft Windows.
    Windows,
}

impl OsFamily {
    /// Every supported family.
    pub const ALL: [Self; 3] = [Self::Linux, Self::MacOS, Self::Windows];

    /// Normalize a host or vendor OS name. Case-insensitive.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "linux" => Some(Self::Linux),
            "macos" | "darwin" | "osx" => Some(Self::MacOS),
            "windows" | "win" | "win32" => Some(Self::Windows),
            _ => None,
        }
    }

    /// Canonical lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::MacOS => "macos",
            Self::Windows => "windows",
        }
    }
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// CPU architecture family.
///
/// `amd64` is treated as `x86_64` and `arm64` as `aarch64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchFamily {
    /// Intel/AMD 64-bit.
    #[serde(rename = "x86_64")]
    X86_64,
    /// ARM 64-bit.
    #[serde(rename = "aarch64")]
    Aarch64,
    /// 32-bit ARM with hardware float.
    #[serde(rename = "armv7")]
    Armv7,
    /// 32-bit Intel.
    #[serde(rename = "i686")]
    I686,
}

impl ArchFamily {
    /// Every supported family.
    pub const ALL: [Self; 4] = [Self::X86_64, Self::Aarch64, Self::Armv7, Self::I686];

    /// Normalize a host or vendor architecture name. Case-insensitive.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "x86_64" | "amd64" | "x64" => Some(Self::X86_64),
            "aarch64" | "arm64" => Some(Self::Aarch64),
            "armv7l" | "armv7" | "arm" => Some(Self::Armv7),
            "i686" | "i386" | "x86" => Some(Self::I686),
            _ => None,
        }
    }

    /// Canonical lowercase name (Rust target naming).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
            Self::Armv7 => "armv7",
            Self::I686 => "i686",
        }
    }
}

impl std::fmt::Display for ArchFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalized (OS family, CPU family) pair identifying a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformPattern {
    /// Operating system family.
    pub os: OsFamily,
    /// CPU architecture family.
    pub arch: ArchFamily,
}

impl PlatformPattern {
    /// Build a pattern from raw OS and machine names, normalizing aliases.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Unsupported`] if either axis is unrecognized.
    pub fn from_names(os: &str, arch: &str) -> Result<Self, PlatformError> {
        match (OsFamily::parse(os), ArchFamily::parse(arch)) {
            (Some(os), Some(arch)) => Ok(Self { os, arch }),
            _ => Err(PlatformError::Unsupported {
                os: os.to_string(),
                arch: arch.to_string(),
            }),
        }
    }

    /// Every supported (OS, architecture) combination.
    pub fn all() -> impl Iterator<Item = Self> {
        OsFamily::ALL
            .into_iter()
            .flat_map(|os| ArchFamily::ALL.into_iter().map(move |arch| Self { os, arch }))
    }

    /// Stable `os-arch` key (e.g. `linux-aarch64`), used by override tables.
    pub fn key(&self) -> String {
        format!("{}-{}", self.os, self.arch)
    }

    /// Whether executables on this platform carry an `.exe` suffix.
    pub fn uses_exe_suffix(self) -> bool {
        self.os == OsFamily::Windows
    }
}

impl std::fmt::Display for PlatformPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl std::str::FromStr for PlatformPattern {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (os, arch) = s.split_once('-').unwrap_or((s, ""));
        Self::from_names(os, arch)
    }
}

/// Asset naming convention used by a release source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlatformNaming {
    /// `{x64|arm64}-{glibc|osx|win}`, e.g. `arm64-glibc`.
    Z3,
    /// Coarse `x86-linux`, `x86-macos`, `arm64-macos`, `x86-win`.
    Verus,
    /// Full Rust target triple, e.g. `aarch64-apple-darwin`.
    RustTarget,
    /// Go `GOOS-GOARCH` spelling, e.g. `darwin-arm64`.
    Go,
}

impl PlatformNaming {
    /// Render a platform in this convention.
    ///
    /// Returns `None` when the convention has no spelling for the platform,
    /// meaning the source never publishes a binary for it.
    pub fn render(self, platform: &PlatformPattern) -> Option<String> {
        use ArchFamily as A;
        use OsFamily as O;

        match self {
            Self::Z3 => {
                let arch = match platform.arch {
                    A::X86_64 => "x64",
                    A::Aarch64 => "arm64",
                    A::Armv7 | A::I686 => return None,
                };
                let os = match platform.os {
                    O::Linux => "glibc",
                    O::MacOS => "osx",
                    O::Windows => "win",
                };
                Some(format!("{arch}-{os}"))
            }
            Self::Verus => match (platform.os, platform.arch) {
                (O::Linux, A::X86_64) => Some("x86-linux".to_string()),
                (O::MacOS, A::X86_64) => Some("x86-macos".to_string()),
                (O::MacOS, A::Aarch64) => Some("arm64-macos".to_string()),
                (O::Windows, A::X86_64) => Some("x86-win".to_string()),
                _ => None,
            },
            Self::RustTarget => {
                let triple = match (platform.os, platform.arch) {
                    (O::Linux, A::X86_64) => "x86_64-unknown-linux-gnu",
                    (O::Linux, A::Aarch64) => "aarch64-unknown-linux-gnu",
                    (O::Linux, A::Armv7) => "arm-unknown-linux-gnueabihf",
                    (O::MacOS, A::X86_64) => "x86_64-apple-darwin",
                    (O::MacOS, A::Aarch64) => "aarch64-apple-darwin",
                    (O::Windows, A::X86_64) => "x86_64-pc-windows-msvc",
                    (O::Windows, A::Aarch64) => "aarch64-pc-windows-msvc",
                    (O::Windows, A::I686) => "i686-pc-windows-msvc",
                    _ => return None,
                };
                Some(triple.to_string())
            }
            Self::Go => {
                let os = match platform.os {
                    O::Linux => "linux",
                    O::MacOS => "darwin",
                    O::Windows => "windows",
                };
                let arch = match platform.arch {
                    A::X86_64 => "amd64",
                    A::Aarch64 => "arm64",
                    A::Armv7 => "arm",
                    A::I686 => "386",
                };
                Some(format!("{os}-{arch}"))
            }
        }
    }
}

/// The platform an asset search is performed for.
///
/// Normally the detected host; a caller may bypass detection with a literal
/// pattern that is matched as-is against every source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformSelector {
    /// Detected (or parsed) host platform, rendered per source.
    Host(PlatformPattern),
    /// Caller-supplied literal, used verbatim for every source.
    Explicit(String),
}

impl PlatformSelector {
    /// The string an asset name must contain for a source using `naming`.
    pub fn render(&self, naming: PlatformNaming) -> Option<String> {
        match self {
            Self::Host(platform) => naming.render(platform),
            Self::Explicit(literal) => Some(literal.to_lowercase()),
        }
    }

    /// Keys to look up per-platform priority overrides with, most specific first.
    ///
    /// A host has exactly its own key. An explicit literal has itself, then
    /// the key of every host that one of `namings` spells as that literal, so
    /// `arm64-glibc` picks up exceptions registered for `linux-aarch64`.
    pub fn override_keys(&self, namings: &[PlatformNaming]) -> Vec<String> {
        match self {
            Self::Host(platform) => vec![platform.key()],
            Self::Explicit(literal) => {
                let literal = literal.to_lowercase();
                let mut keys = vec![literal.clone()];
                for platform in PlatformPattern::all() {
                    let spelled = namings
                        .iter()
                        .any(|n| n.render(&platform).is_some_and(|r| r.eq_ignore_ascii_case(&literal)));
                    let key = platform.key();
                    if spelled && !keys.contains(&key) {
                        keys.push(key);
                    }
                }
                keys
            }
        }
    }
}

impl std::fmt::Display for PlatformSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host(platform) => write!(f, "{platform}"),
            Self::Explicit(literal) => write!(f, "{literal}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_normalize() {
        let a = PlatformPattern::from_names("Linux", "amd64").unwrap();
        let b = PlatformPattern::from_names("linux", "x86_64").unwrap();
        assert_eq!(a, b);

        let mac = PlatformPattern::from_names("Darwin", "arm64").unwrap();
        assert_eq!(mac.os, OsFamily::MacOS);
        assert_eq!(mac.arch, ArchFamily::Aarch64);
        assert_eq!(mac.key(), "macos-aarch64");
    }

    #[test]
    fn test_unknown_axis_is_unsupported() {
        let err = PlatformPattern::from_names("plan9", "x86_64").unwrap_err();
        assert!(matches!(err, PlatformError::Unsupported { ref os, .. } if os == "plan9"));
        assert!(PlatformPattern::from_names("linux", "riscv64").is_err());
    }

    #[test]
    fn test_from_str_round_trips_key() {
        let p: PlatformPattern = "linux-aarch64".parse().unwrap();
        assert_eq!(p.key(), "linux-aarch64");
        assert!("nonsense".parse::<PlatformPattern>().is_err());
    }

    #[test]
    fn test_same_host_renders_per_convention() {
        let p = PlatformPattern::from_names("linux", "aarch64").unwrap();
        assert_eq!(PlatformNaming::Z3.render(&p).as_deref(), Some("arm64-glibc"));
        assert_eq!(
            PlatformNaming::RustTarget.render(&p).as_deref(),
            Some("aarch64-unknown-linux-gnu")
        );
        assert_eq!(PlatformNaming::Go.render(&p).as_deref(), Some("linux-arm64"));
        // No published binaries for this host
        assert_eq!(PlatformNaming::Verus.render(&p), None);
    }

    #[test]
    fn test_explicit_selector_is_verbatim() {
        let sel = PlatformSelector::Explicit("X64-Glibc".to_string());
        assert_eq!(sel.render(PlatformNaming::Verus).as_deref(), Some("x64-glibc"));
        assert_eq!(sel.override_keys(&[]), vec!["x64-glibc"]);
    }

    #[test]
    fn test_explicit_literal_maps_back_to_host_keys() {
        let sel = PlatformSelector::Explicit("ARM64-glibc".to_string());
        assert_eq!(
            sel.override_keys(&[PlatformNaming::Z3]),
            vec!["arm64-glibc", "linux-aarch64"]
        );
        // Not a spelling any of these conventions produce
        assert_eq!(sel.override_keys(&[PlatformNaming::Go]), vec!["arm64-glibc"]);

        let go = PlatformSelector::Explicit("darwin-arm64".to_string());
        assert_eq!(
            go.override_keys(&[PlatformNaming::Go, PlatformNaming::Z3]),
            vec!["darwin-arm64", "macos-aarch64"]
        );

        let host = PlatformSelector::Host(PlatformPattern::from_names("linux", "x86_64").unwrap());
        assert_eq!(host.override_keys(&[PlatformNaming::Z3]), vec!["linux-x86_64"]);
    }

    #[test]
    fn test_all_covers_every_combination() {
        assert_eq!(PlatformPattern::all().count(), 12);
    }

    #[test]
    fn test_naming_deserializes_kebab_case() {
        let n: PlatformNaming = serde_json::from_str("\"rust-target\"").unwrap();
        assert_eq!(n, PlatformNaming::RustTarget);
    }
}
