use dirs::home_dir;
use std::path::{Path, PathBuf};

/// Returns the tooldrop home directory, or None if the user's home cannot be resolved.
pub fn try_tooldrop_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("TOOLDROP_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".tooldrop"))
}

/// Shared directory that receives one symlink per installed binary.
///
/// `TOOLDROP_BIN_DIR` overrides the default `~/.local/bin`.
pub fn try_bin_dir() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("TOOLDROP_BIN_DIR") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".local").join("bin"))
}

/// Default install directory for a tool: `~/.tooldrop/tools/<name>`
pub fn default_install_dir(home: &Path, tool: &str) -> PathBuf {
    home.join("tools").join(tool)
}

/// Override table consulted when `--overrides` is not given.
pub fn default_overrides_path(home: &Path) -> PathBuf {
    home.join("overrides.toml")
}

/// Base URL of the release API. `TOOLDROP_GITHUB_API` points it elsewhere.
pub fn github_api_base() -> String {
    std::env::var("TOOLDROP_GITHUB_API")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| crate::forges::github::DEFAULT_API_BASE.to_string())
}

/// Optional API token, `GITHUB_TOKEN` first then `GH_TOKEN`.
pub fn github_token() -> Option<String> {
    ["GITHUB_TOKEN", "GH_TOKEN"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
}

/// Extract the filename from a URL.
pub fn filename_from_url(url: &str) -> &str {
    url.split('/').next_back().unwrap_or("")
}
