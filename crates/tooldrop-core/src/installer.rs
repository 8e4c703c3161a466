//! Artifact installation.
//!
//! Download to scratch, extract, locate the main binary, fix permissions,
//! replace the install directory wholesale, link binaries into the shared
//! bin directory, then run a non-fatal version check.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tooldrop_schema::{Asset, ExecutableFormat};
use wait_timeout::ChildExt;
use walkdir::WalkDir;

use crate::Reporter;
use crate::io::download::{DownloadError, DownloadRequest};
use crate::io::extract::{self, ExtractError};
use crate::tools::ToolSpec;

/// How long a version check may run before it is abandoned.
pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("Extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("binary '{name}' not found under {}", searched.display())]
    BinaryNotFound { name: String, searched: PathBuf },

    #[error(
        "{} was removed but the new content is not yet in place: {reason}",
        dir.display()
    )]
    PartialInstall { dir: PathBuf, reason: String },

    #[error("failed to link {} -> {}: {source}", link.display(), target.display())]
    Link {
        link: PathBuf,
        target: PathBuf,
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{context}: {message}")]
    Context {
        context: &'static str,
        message: String,
    },
}

impl InstallError {
    /// Create an error with context for better debugging.
    pub fn context(ctx: &'static str, msg: impl std::fmt::Display) -> Self {
        Self::Context {
            context: ctx,
            message: msg.to_string(),
        }
    }

    /// Remediation hint for the user, where one exists.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::BinaryNotFound { .. } => {
                Some("the archive layout changed; try --no-extract and inspect it by hand")
            }
            Self::PartialInstall { .. } => {
                Some("the previous install is gone; re-run the install to repopulate it")
            }
            Self::Extract(ExtractError::UnsupportedFormat(_)) => {
                Some("pick a different asset with --platform, or use --no-extract")
            }
            _ => None,
        }
    }
}

/// Directory plus the binary names that make up one tool's footprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallTarget {
    pub directory: PathBuf,
    pub main_binary: String,
    pub aux_binaries: Vec<String>,
}

impl InstallTarget {
    pub fn for_tool(tool: &ToolSpec, directory: PathBuf) -> Self {
        Self {
            directory,
            main_binary: tool.main_binary.clone(),
            aux_binaries: tool.aux_binaries.clone(),
        }
    }
}

/// Outcome of running the installed binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// A flag exited successfully; first line of its output.
    Passed { flag: String, output: String },
    /// No flag succeeded.
    Failed { detail: String },
}

impl Verification {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Passed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct InstalledBinaries {
    pub directory: PathBuf,
    pub main: PathBuf,
    /// Symlinks created in the shared bin directory.
    pub links: Vec<PathBuf>,
    pub verification: Verification,
}

pub struct Installer<'a, R: Reporter> {
    client: &'a Client,
    tool: &'a ToolSpec,
    bin_dir: PathBuf,
    exe_suffix: bool,
    reporter: &'a R,
}

impl<R: Reporter> std::fmt::Debug for Installer<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installer")
            .field("tool", &self.tool.name)
            .field("bin_dir", &self.bin_dir)
            .field("exe_suffix", &self.exe_suffix)
            .finish_non_exhaustive()
    }
}

impl<'a, R: Reporter> Installer<'a, R> {
    pub fn new(client: &'a Client, tool: &'a ToolSpec, bin_dir: PathBuf, reporter: &'a R) -> Self {
        Self {
            client,
            tool,
            bin_dir,
            exe_suffix: cfg!(windows),
            reporter,
        }
    }

    /// Also accept `<name>.exe` when the exact name is missing.
    pub fn with_exe_suffix(mut self, exe_suffix: bool) -> Self {
        self.exe_suffix = exe_suffix;
        self
    }

    /// Fetch an asset into `output_dir` without installing it.
    pub async fn download_only(
        &self,
        asset: &Asset,
        output_dir: &Path,
    ) -> Result<PathBuf, InstallError> {
        let dest = output_dir.join(&asset.name);
        self.download(asset, &dest).await?;
        Ok(dest)
    }

    /// Download, extract and install an asset.
    pub async fn install_from_asset(
        &self,
        asset: &Asset,
        target: &InstallTarget,
    ) -> Result<InstalledBinaries, InstallError> {
        let scratch = tempfile::Builder::new().prefix("tooldrop-").tempdir()?;
        let archive = scratch.path().join(&asset.name);
        self.download(asset, &archive).await?;

        let extract_root = scratch.path().join("extract");
        let single_name = target.main_binary.clone();
        let dest = extract_root.clone();
        let files = tokio::task::spawn_blocking(move || {
            extract::extract_auto(&archive, &dest, &single_name)
        })
        .await
        .map_err(|e| InstallError::context("extraction task", e))??;
        tracing::debug!(count = files.len(), "extracted files");
        self.reporter.done(&asset.name, "extracted");

        let installed = self.install_from_directory(&extract_root, target).await;
        // Scratch removal is best effort; a leftover temp dir is harmless.
        if let Err(e) = scratch.close() {
            tracing::debug!(error = %e, "scratch cleanup failed");
        }
        installed
    }

    /// Install from an already-populated tree (extracted archive or build output).
    pub async fn install_from_directory(
        &self,
        root: &Path,
        target: &InstallTarget,
    ) -> Result<InstalledBinaries, InstallError> {
        let main_src = locate_binary(root, &target.main_binary, self.exe_suffix)?;
        let binary_dir = main_src
            .parent()
            .ok_or_else(|| InstallError::context("locating binary directory", main_src.display()))?
            .to_path_buf();

        let marked = mark_executables(&binary_dir, self.tool)?;
        ensure_executable(&main_src)?;
        tracing::debug!(count = marked.len(), "marked executables");

        self.reporter
            .info(&format!("Installing to {}", target.directory.display()));
        replace_directory(&binary_dir, &target.directory)?;

        let main_name = main_src
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| target.main_binary.clone());
        let main = target.directory.join(&main_name);

        let links = link_binaries(target, &self.bin_dir, self.exe_suffix)?;
        for link in &links {
            self.reporter.info(&format!("Linked {}", link.display()));
        }

        let flags = self.tool.version_flags.clone();
        let binary = main.clone();
        let verification =
            tokio::task::spawn_blocking(move || verify(&binary, &flags, VERIFY_TIMEOUT))
                .await
                .map_err(|e| InstallError::context("verification task", e))?;
        match &verification {
            Verification::Passed { output, .. } => self.reporter.success(output),
            Verification::Failed { detail } => self.reporter.warning(&format!(
                "{} installed but did not verify ({detail}); it may need extra setup",
                target.main_binary
            )),
        }

        Ok(InstalledBinaries {
            directory: target.directory.clone(),
            main,
            links,
            verification,
        })
    }

    async fn download(&self, asset: &Asset, dest: &Path) -> Result<(), InstallError> {
        self.reporter.info(&format!(
            "Downloading {} ({:.1} MB)",
            asset.name,
            asset.size_mb()
        ));
        let bytes = DownloadRequest {
            client: self.client,
            name: &asset.name,
            url: &asset.download_url,
            dest,
            declared_size: Some(asset.size_bytes),
            reporter: self.reporter,
        }
        .execute()
        .await?;
        tracing::debug!(bytes, "download complete");
        self.reporter.done(&asset.name, "downloaded");
        Ok(())
    }
}

/// Find a file named exactly `name` under `root`, shallowest first.
///
/// Falls back to `<name>.exe` when `exe_suffix` is set.
pub fn locate_binary(root: &Path, name: &str, exe_suffix: bool) -> Result<PathBuf, InstallError> {
    let mut candidates = vec![name.to_string()];
    if exe_suffix && !name.ends_with(".exe") {
        candidates.push(format!("{name}.exe"));
    }

    for candidate in &candidates {
        let found = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file() || e.path_is_symlink())
            .filter(|e| e.file_name().to_string_lossy() == candidate.as_str())
            .min_by_key(walkdir::DirEntry::depth);
        if let Some(entry) = found {
            return Ok(entry.into_path());
        }
    }

    Err(InstallError::BinaryNotFound {
        name: name.to_string(),
        searched: root.to_path_buf(),
    })
}

/// Read up to four leading bytes of a file.
fn read_header(path: &Path) -> io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(4);
    fs::File::open(path)?.take(4).read_to_end(&mut header)?;
    Ok(header)
}

/// Grant execute permission to every executable-looking regular file.
///
/// A file qualifies if its leading bytes carry a known executable signature
/// or its basename is on the tool's allowlist. Returns the files marked.
pub fn mark_executables(dir: &Path, tool: &ToolSpec) -> io::Result<Vec<PathBuf>> {
    let mut marked = Vec::new();
    for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let basename = entry.file_name().to_string_lossy();
        let signed = ExecutableFormat::sniff(&read_header(path)?).is_some();
        if signed || tool.is_allowlisted(&basename) {
            ensure_executable(path)?;
            marked.push(path.to_path_buf());
        }
    }
    Ok(marked)
}

#[cfg(unix)]
fn ensure_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn ensure_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Recursive copy of a directory's contents.
pub fn copy_dir_all(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> io::Result<()> {
    fs_extra::dir::copy(
        src,
        dst,
        &fs_extra::dir::CopyOptions::new()
            .content_only(true)
            .overwrite(true),
    )
    .map_err(|e| io::Error::other(format!("Copy failed: {e}")))?;
    Ok(())
}

/// Remove `dest` entirely, then copy `src` into it.
///
/// A failure after removal is reported as [`InstallError::PartialInstall`].
pub fn replace_directory(src: &Path, dest: &Path) -> Result<(), InstallError> {
    let existed = fs::symlink_metadata(dest).is_ok();
    if existed {
        tracing::debug!(dir = %dest.display(), "removing previous install");
        clear_path(dest)?;
    }

    fs::create_dir_all(dest)
        .and_then(|()| copy_dir_all(src, dest))
        .map_err(|e| {
            if existed {
                InstallError::PartialInstall {
                    dir: dest.to_path_buf(),
                    reason: e.to_string(),
                }
            } else {
                InstallError::Io(e)
            }
        })
}

/// Remove whatever is at `path` (file, symlink or directory).
fn clear_path(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn create_link(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn create_link(target: &Path, link: &Path) -> io::Result<()> {
    fs::copy(target, link).map(|_| ())
}

/// Link the main and auxiliary binaries into `bin_dir`.
///
/// Missing auxiliary binaries are skipped; a missing main binary is an error.
pub fn link_binaries(
    target: &InstallTarget,
    bin_dir: &Path,
    exe_suffix: bool,
) -> Result<Vec<PathBuf>, InstallError> {
    fs::create_dir_all(bin_dir)?;

    let names = std::iter::once((&target.main_binary, true))
        .chain(target.aux_binaries.iter().map(|n| (n, false)));

    let mut links = Vec::new();
    for (name, required) in names {
        let mut file_name = name.clone();
        let mut dest = target.directory.join(&file_name);
        if !dest.exists() && exe_suffix {
            file_name = format!("{name}.exe");
            dest = target.directory.join(&file_name);
        }
        if !dest.exists() {
            if required {
                return Err(InstallError::BinaryNotFound {
                    name: name.clone(),
                    searched: target.directory.clone(),
                });
            }
            tracing::debug!(binary = %name, "auxiliary binary absent, not linking");
            continue;
        }

        let link = bin_dir.join(&file_name);
        clear_path(&link)
            .and_then(|()| create_link(&dest, &link))
            .map_err(|source| InstallError::Link {
                link: link.clone(),
                target: dest.clone(),
                source,
            })?;
        links.push(link);
    }
    Ok(links)
}

/// Run `binary <flag>` for each flag until one succeeds.
///
/// Each attempt is abandoned after `timeout`. Never fails: the outcome is a
/// signal for the user, not a reason to roll back.
pub fn verify(binary: &Path, flags: &[String], timeout: Duration) -> Verification {
    let mut last = String::from("no version flags configured");

    for flag in flags {
        let child = Command::new(binary)
            .arg(flag)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match child {
            Ok(c) => c,
            Err(e) => {
                last = format!("could not run {}: {e}", binary.display());
                continue;
            }
        };

        // Drain both pipes while waiting; a full pipe blocks the child.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        match child.wait_timeout(timeout) {
            Ok(Some(status)) if status.success() => {
                let stdout = collect(stdout);
                let stderr = collect(stderr);
                let text = if stdout.trim().is_empty() { stderr } else { stdout };
                return Verification::Passed {
                    flag: flag.clone(),
                    output: text.lines().next().unwrap_or_default().trim().to_string(),
                };
            }
            Ok(Some(status)) => {
                last = format!("{flag} exited with {status}");
            }
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                last = format!("{flag} timed out after {}s", timeout.as_secs());
            }
            Err(e) => {
                last = format!("{flag} could not be awaited: {e}");
            }
        }
    }

    Verification::Failed { detail: last }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn collect(reader: Option<std::thread::JoinHandle<String>>) -> String {
    reader.and_then(|r| r.join().ok()).unwrap_or_default()
}
