//! Source-build fallback.
//!
//! Used when no prebuilt asset fits the host. The pipeline is explicit:
//!
//! 1. Check prerequisites (`git`, `rustup`, `cargo`) on `PATH`.
//! 2. Shallow-clone the tag into the build directory.
//! 3. Install the pinned toolchain, if the checkout pins one. No fallback to
//!    whatever toolchain happens to be active.
//! 4. Stage 0: build the project's helper binary, only if it is absent.
//! 5. Stage 1: run the helper in release mode.
//! 6. Probe the candidate output directories in order.
//!
//! Command output goes to `<build-dir>/build.log` unless verbose; a failing
//! step carries the last 20 log lines.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;

use crate::Reporter;
use crate::tools::{HelperSpec, SourceBuildSpec};

const LOG_TAIL_LINES: usize = 20;

/// Toolchain pin file names, in lookup order.
const PIN_FILES: [&str; 2] = ["rust-toolchain.toml", "rust-toolchain"];

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("git clone of '{tag}' failed: {detail}")]
    CloneFailed { tag: String, detail: String },

    #[error("toolchain missing: {detail}")]
    ToolchainMissing { detail: String },

    #[error("dependency '{name}' unusable: {detail}")]
    Dependency { name: String, detail: String },

    #[error("{stage} failed: {detail}")]
    BuildFailed {
        stage: String,
        detail: String,
        log: Option<PathBuf>,
        tail: String,
    },

    #[error("build finished but no output directory was found (searched: {})", format_paths(searched))]
    OutputNotFound { searched: Vec<PathBuf> },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl BuildError {
    /// Targeted remediation hint.
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::CloneFailed { .. } => {
                Some("check the tag name and network access to the repository".to_string())
            }
            Self::ToolchainMissing { .. } => {
                Some("install the Rust toolchain from https://rustup.rs".to_string())
            }
            Self::Dependency { name, .. } => Some(format!(
                "install {name} and put it on PATH, or point the override variable at the binary"
            )),
            Self::BuildFailed { log: Some(log), .. } => {
                Some(format!("full log: {}", log.display()))
            }
            Self::OutputNotFound { .. } => Some(
                "the project layout changed; use --keep-build and inspect the build directory"
                    .to_string(),
            ),
            _ => None,
        }
    }
}

/// Options for one source build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Parent of the checkout and home of `build.log`.
    pub build_dir: PathBuf,
    /// Parallelism hint; `Some(0)` means one job per CPU.
    pub jobs: Option<usize>,
    /// Stream command output to the terminal instead of the log.
    pub verbose: bool,
}

/// Result of a successful build.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub checkout: PathBuf,
    pub output_dir: PathBuf,
    pub log: PathBuf,
}

/// One external command in the pipeline.
#[derive(Debug, Clone)]
struct Step {
    label: String,
    program: OsString,
    args: Vec<OsString>,
    cwd: PathBuf,
    env: Vec<(OsString, OsString)>,
}

impl Step {
    fn new(label: impl Into<String>, program: impl Into<OsString>, cwd: &Path) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.to_path_buf(),
            env: Vec::new(),
        }
    }

    fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|s| s.to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Drives a [`SourceBuildSpec`] from tag to output directory.
pub struct SourceBuilder<'a, R: Reporter> {
    spec: &'a SourceBuildSpec,
    reporter: &'a R,
    opts: BuildOptions,
    /// `PATH` used to find prerequisites and passed to child processes.
    search_path: Option<OsString>,
    /// Dependency override values, keyed by env var name.
    dependency_env: Vec<(String, OsString)>,
}

impl<R: Reporter> std::fmt::Debug for SourceBuilder<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceBuilder")
            .field("repo", &self.spec.repo_url)
            .field("opts", &self.opts)
            .finish_non_exhaustive()
    }
}

impl<'a, R: Reporter> SourceBuilder<'a, R> {
    /// Builder reading `PATH` and dependency overrides from the process environment.
    ///
    /// A relative `build_dir` is anchored at the current directory, since
    /// steps run with their own working directories.
    pub fn new(spec: &'a SourceBuildSpec, mut opts: BuildOptions, reporter: &'a R) -> Self {
        if let Ok(absolute) = std::path::absolute(&opts.build_dir) {
            opts.build_dir = absolute;
        }
        let dependency_env = spec
            .dependencies
            .iter()
            .filter_map(|d| std::env::var_os(&d.env_var).map(|v| (d.env_var.clone(), v)))
            .collect();
        Self {
            spec,
            reporter,
            opts,
            search_path: std::env::var_os("PATH"),
            dependency_env,
        }
    }

    /// Replace the search path (tests, sandboxed callers).
    pub fn with_search_path(mut self, path: Option<OsString>) -> Self {
        self.search_path = path;
        self
    }

    /// Replace the dependency override values.
    pub fn with_dependency_env(mut self, env: Vec<(String, OsString)>) -> Self {
        self.dependency_env = env;
        self
    }

    fn log_path(&self) -> PathBuf {
        self.opts.build_dir.join("build.log")
    }

    /// Clone `tag` and build it.
    pub fn build(&self, tag: &str) -> Result<BuildOutput, BuildError> {
        self.check_prerequisites()?;
        fs::create_dir_all(&self.opts.build_dir)?;

        let checkout = self.opts.build_dir.join(checkout_name(&self.spec.repo_url));
        self.clone_tag(tag, &checkout)?;
        let output_dir = self.build_checkout(&checkout)?;

        Ok(BuildOutput {
            checkout,
            output_dir,
            log: self.log_path(),
        })
    }

    /// Every prerequisite must resolve on the search path.
    pub fn check_prerequisites(&self) -> Result<(), BuildError> {
        let cwd = std::env::current_dir()?;
        let missing: Vec<&str> = self
            .spec
            .prerequisites
            .iter()
            .map(String::as_str)
            .filter(|p| which::which_in(p, self.search_path.as_ref(), &cwd).is_err())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(BuildError::ToolchainMissing {
                detail: format!("required tools not found on PATH: {}", missing.join(", ")),
            })
        }
    }

    /// Locate each build dependency: override variable first, then `PATH`.
    ///
    /// A dependency found nowhere is a warning; one whose override points at
    /// a missing file is an error.
    pub fn locate_dependencies(&self) -> Result<Vec<(String, PathBuf)>, BuildError> {
        let cwd = std::env::current_dir()?;
        let mut found = Vec::new();

        for dep in &self.spec.dependencies {
            let overridden = self
                .dependency_env
                .iter()
                .find(|(k, _)| *k == dep.env_var)
                .map(|(_, v)| PathBuf::from(v));

            if let Some(path) = overridden {
                if !path.is_file() {
                    return Err(BuildError::Dependency {
                        name: dep.name.clone(),
                        detail: format!("{} is set but {} is not a file", dep.env_var, path.display()),
                    });
                }
                self.reporter
                    .info(&format!("Using {} from {}: {}", dep.name, dep.env_var, path.display()));
                found.push((dep.env_var.clone(), path));
            } else if let Ok(path) = which::which_in(&dep.name, self.search_path.as_ref(), &cwd) {
                self.reporter
                    .info(&format!("Found {} at {}", dep.name, path.display()));
                found.push((dep.env_var.clone(), path));
            } else {
                self.reporter.warning(&format!(
                    "{} not found on PATH and {} is not set; the built tool may not run",
                    dep.name, dep.env_var
                ));
            }
        }
        Ok(found)
    }

    /// `git clone --depth 1 --branch <tag>`, replacing any previous checkout.
    pub fn clone_tag(&self, tag: &str, checkout: &Path) -> Result<(), BuildError> {
        if checkout.exists() {
            fs::remove_dir_all(checkout)?;
        }
        self.reporter
            .info(&format!("Cloning {} at {tag}", self.spec.repo_url));

        let step = Step::new("git clone", "git", &self.opts.build_dir).args([
            OsString::from("clone"),
            "--depth".into(),
            "1".into(),
            "--branch".into(),
            tag.into(),
            self.spec.repo_url.clone().into(),
            checkout.as_os_str().to_os_string(),
        ]);

        self.run(&step).map_err(|e| BuildError::CloneFailed {
            tag: tag.to_string(),
            detail: match e {
                BuildError::BuildFailed { detail, tail, .. } if !tail.is_empty() => {
                    format!("{detail}\n{tail}")
                }
                other => other.to_string(),
            },
        })
    }

    /// Build an existing checkout and return its output directory.
    pub fn build_checkout(&self, checkout: &Path) -> Result<PathBuf, BuildError> {
        let workdir = checkout.join(&self.spec.workdir);
        if !workdir.is_dir() {
            return Err(BuildError::BuildFailed {
                stage: "prepare".to_string(),
                detail: format!("{} does not exist in the checkout", self.spec.workdir),
                log: None,
                tail: String::new(),
            });
        }

        self.install_pinned_toolchain(checkout, &workdir)?;
        let deps = self.locate_dependencies()?;

        let helper = match &self.spec.helper {
            Some(helper) => Some(self.ensure_helper(checkout, helper)?),
            None => None,
        };

        self.run_helper(&workdir, helper.as_deref(), &deps)?;
        self.find_output(checkout)
    }

    /// Install the toolchain named by a pin file at the checkout root or in
    /// the work directory.
    fn install_pinned_toolchain(&self, checkout: &Path, workdir: &Path) -> Result<(), BuildError> {
        let Some(pin) = find_pin_file(&[checkout, workdir]) else {
            tracing::debug!("no toolchain pin file");
            return Ok(());
        };
        let contents = fs::read_to_string(&pin)?;
        let channel = parse_toolchain_channel(&contents).ok_or_else(|| {
            BuildError::ToolchainMissing {
                detail: format!("no toolchain channel in {}", pin.display()),
            }
        })?;

        self.reporter
            .info(&format!("Installing pinned toolchain {channel}"));
        let step = Step::new("rustup toolchain install", "rustup", workdir)
            .args(["toolchain", "install", channel.as_str()]);
        self.run(&step).map_err(|e| BuildError::ToolchainMissing {
            detail: format!("could not install pinned toolchain {channel}: {e}"),
        })
    }

    /// Stage 0: build the helper only if its binary is absent.
    fn ensure_helper(&self, checkout: &Path, helper: &HelperSpec) -> Result<PathBuf, BuildError> {
        let binary = checkout.join(&helper.binary);
        if binary.is_file() {
            tracing::debug!(helper = %helper.name, "helper already built");
            return Ok(binary);
        }

        let source_dir = checkout.join(&helper.source_dir);
        if !source_dir.is_dir() {
            return Err(BuildError::BuildFailed {
                stage: format!("bootstrap {}", helper.name),
                detail: format!("helper source {} not found", source_dir.display()),
                log: None,
                tail: String::new(),
            });
        }
        let Some((program, args)) = helper.bootstrap.split_first() else {
            return Err(BuildError::BuildFailed {
                stage: format!("bootstrap {}", helper.name),
                detail: "no bootstrap command configured".to_string(),
                log: None,
                tail: String::new(),
            });
        };

        self.reporter.info(&format!("Building {} first", helper.name));
        let step = Step::new(format!("bootstrap {}", helper.name), program, &source_dir)
            .args(args.iter().map(String::as_str));
        self.run(&step)?;

        if binary.is_file() {
            Ok(binary)
        } else {
            Err(BuildError::BuildFailed {
                stage: format!("bootstrap {}", helper.name),
                detail: format!("{} was not produced", binary.display()),
                log: Some(self.log_path()),
                tail: String::new(),
            })
        }
    }

    /// Stage 1: run the helper (or the first build arg) in the work directory.
    fn run_helper(
        &self,
        workdir: &Path,
        helper: Option<&Path>,
        deps: &[(String, PathBuf)],
    ) -> Result<(), BuildError> {
        let (program, args): (OsString, Vec<String>) = match helper {
            Some(bin) => (bin.as_os_str().to_os_string(), self.spec.build_args.clone()),
            None => {
                let Some((first, rest)) = self.spec.build_args.split_first() else {
                    return Err(BuildError::BuildFailed {
                        stage: "build".to_string(),
                        detail: "no build command configured".to_string(),
                        log: None,
                        tail: String::new(),
                    });
                };
                (first.into(), rest.to_vec())
            }
        };

        let mut step = Step::new("build", program, workdir).args(args);
        if let Some(jobs) = self.opts.jobs {
            let jobs = if jobs == 0 { num_cpus::get() } else { jobs };
            step = step.args(["-j".to_string(), jobs.to_string()]);
        }

        // Helper dir goes first on PATH so the build can call it by name.
        let mut dirs: Vec<PathBuf> = helper
            .and_then(Path::parent)
            .map(|p| vec![p.to_path_buf()])
            .unwrap_or_default();
        if let Some(path) = &self.search_path {
            dirs.extend(std::env::split_paths(path));
        }
        if let Ok(joined) = std::env::join_paths(dirs) {
            step = step.env("PATH", joined);
        }
        for (key, value) in deps {
            step = step.env(key, value);
        }

        self.reporter.info(&format!("Running {}", step.display()));
        self.run(&step)
    }

    fn find_output(&self, checkout: &Path) -> Result<PathBuf, BuildError> {
        let searched: Vec<PathBuf> = self
            .spec
            .output_candidates
            .iter()
            .map(|c| checkout.join(c))
            .collect();
        if let Some(found) = searched.iter().find(|p| p.is_dir()) {
            return Ok(found.clone());
        }
        Err(BuildError::OutputNotFound { searched })
    }

    /// Run one step, logging to `build.log` unless verbose.
    fn run(&self, step: &Step) -> Result<(), BuildError> {
        tracing::info!(command = %step.display(), cwd = %step.cwd.display(), "running build step");

        let mut cmd = Command::new(&step.program);
        cmd.args(&step.args).current_dir(&step.cwd).stdin(Stdio::null());
        if let Some(path) = &self.search_path {
            cmd.env("PATH", path);
        }
        for (k, v) in &step.env {
            cmd.env(k, v);
        }

        let log_path = self.log_path();
        let status = if self.opts.verbose {
            cmd.status()
        } else {
            let mut log_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)?;
            writeln!(log_file, "==> {}", step.display())?;
            cmd.stdout(Stdio::from(log_file.try_clone()?))
                .stderr(Stdio::from(log_file))
                .status()
        };

        let status = status.map_err(|e| BuildError::BuildFailed {
            stage: step.label.clone(),
            detail: format!("could not start {}: {e}", step.program.to_string_lossy()),
            log: None,
            tail: String::new(),
        })?;

        if status.success() {
            return Ok(());
        }

        let (log, tail) = if self.opts.verbose {
            (None, String::new())
        } else {
            (
                Some(log_path.clone()),
                read_last_lines(&log_path, LOG_TAIL_LINES).unwrap_or_default(),
            )
        };
        Err(BuildError::BuildFailed {
            stage: step.label.clone(),
            detail: format!("exit code {:?}", status.code()),
            log,
            tail,
        })
    }
}

/// Directory name for a checkout: last URL segment without `.git`.
fn checkout_name(repo_url: &str) -> String {
    let last = crate::paths::filename_from_url(repo_url.trim_end_matches('/'));
    let name = last.trim_end_matches(".git");
    if name.is_empty() {
        "source".to_string()
    } else {
        name.to_string()
    }
}

fn find_pin_file(dirs: &[&Path]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|d| PIN_FILES.iter().map(move |f| d.join(f)))
        .find(|p| p.is_file())
}

/// Channel named by a toolchain pin file.
///
/// Accepts the TOML form (`[toolchain] channel = "..."`) and the legacy
/// single-line form.
pub fn parse_toolchain_channel(contents: &str) -> Option<String> {
    #[derive(serde::Deserialize)]
    struct Pin {
        toolchain: Toolchain,
    }
    #[derive(serde::Deserialize)]
    struct Toolchain {
        channel: Option<String>,
    }

    if let Ok(pin) = toml::from_str::<Pin>(contents) {
        return pin.toolchain.channel.filter(|c| !c.trim().is_empty());
    }

    let line = contents.lines().map(str::trim).find(|l| !l.is_empty())?;
    if line.starts_with('[') || line.contains('=') {
        return None;
    }
    Some(line.to_string())
}

/// Read the last N lines from a file without loading all of it.
fn read_last_lines(path: &Path, n: usize) -> io::Result<String> {
    // Read at most 16KB from the end
    const TAIL_SIZE: u64 = 16 * 1024;

    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();
    file.seek(SeekFrom::Start(file_len.saturating_sub(TAIL_SIZE)))?;

    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;
    let text = String::from_utf8_lossy(&buffer);

    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].join("\n"))
}
