//! Make an install directory discoverable on the command search path.
//!
//! Checks, in order: the live `PATH`, then the user's shell startup file.
//! Only when neither knows the directory is an export line appended, so
//! repeated runs never duplicate it.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Marker comment written above the export line.
const MARKER: &str = "# Added by tooldrop";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvStatus {
    /// Directory is already on the live `PATH`.
    AlreadyActive,
    /// The startup file already references it; a new shell will pick it up.
    AlreadyConfiguredPendingRestart { file: PathBuf },
    /// An export line was appended to `file`.
    Configured { file: PathBuf },
}

/// The parts of the user environment the configurator looks at.
#[derive(Debug, Clone)]
pub struct ShellEnv {
    pub path_var: Option<OsString>,
    /// Login shell, e.g. `/bin/zsh`.
    pub shell: Option<String>,
    pub home: PathBuf,
}

impl ShellEnv {
    /// Snapshot of the current process environment.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            path_var: std::env::var_os("PATH"),
            shell: std::env::var("SHELL").ok(),
            home: dirs::home_dir()?,
        })
    }

    /// Startup files worth editing for this shell, most preferred first.
    pub fn startup_candidates(&self) -> Vec<PathBuf> {
        let shell = self.shell.as_deref().unwrap_or_default().to_lowercase();
        let names: &[&str] = if shell.contains("zsh") {
            &[".zshrc", ".zprofile"]
        } else if shell.contains("bash") {
            &[".bashrc", ".bash_profile", ".profile"]
        } else {
            &[".zshrc", ".bashrc", ".bash_profile", ".profile"]
        };
        names.iter().map(|n| self.home.join(n)).collect()
    }

    /// First existing candidate, or `~/.bashrc` (created on append).
    pub fn startup_file(&self) -> PathBuf {
        self.startup_candidates()
            .into_iter()
            .find(|p| p.exists())
            .unwrap_or_else(|| self.home.join(".bashrc"))
    }

    /// Whether `dir` is an entry of the live `PATH`.
    pub fn on_path(&self, dir: &Path) -> bool {
        self.path_var
            .as_ref()
            .is_some_and(|p| std::env::split_paths(p).any(|entry| entry == dir))
    }

    /// Ensure `dir` is (or will be) on `PATH`.
    pub fn ensure(&self, dir: &Path) -> io::Result<EnvStatus> {
        if self.on_path(dir) {
            return Ok(EnvStatus::AlreadyActive);
        }

        let file = self.startup_file();
        if self.references(&file, dir)? {
            return Ok(EnvStatus::AlreadyConfiguredPendingRestart { file });
        }

        let mut out = OpenOptions::new().create(true).append(true).open(&file)?;
        write!(out, "\n{MARKER}\nexport PATH=\"{}:$PATH\"\n", dir.display())?;
        tracing::info!(file = %file.display(), dir = %dir.display(), "appended PATH export");
        Ok(EnvStatus::Configured { file })
    }

    /// Whether `file` mentions `dir`, literally or as `$HOME/...` / `~/...`.
    fn references(&self, file: &Path, dir: &Path) -> io::Result<bool> {
        let content = match fs::read_to_string(file) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };

        let mut needles = vec![dir.display().to_string()];
        if let Ok(rel) = dir.strip_prefix(&self.home) {
            needles.push(format!("$HOME/{}", rel.display()));
            needles.push(format!("~/{}", rel.display()));
        }
        Ok(needles.iter().any(|n| content.contains(n.as_str())))
    }
}
