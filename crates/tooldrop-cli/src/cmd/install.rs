//! `tooldrop install`: pick a release, resolve its asset for this platform,
//! and install it (or build it from source when no asset fits).

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use reqwest::Client;
use tooldrop_core::builder::{BuildError, BuildOptions, SourceBuilder};
use tooldrop_core::catalog::{self, Catalog, CatalogError, FETCH_TIMEOUT};
use tooldrop_core::config::OverrideTable;
use tooldrop_core::forges::{GitHubSource, ListingSource};
use tooldrop_core::installer::{InstallError, InstallTarget, InstalledBinaries, Installer, Verification};
use tooldrop_core::priority::SourcePriority;
use tooldrop_core::resolver::{self, ResolveError};
use tooldrop_core::shell_env::{EnvStatus, ShellEnv};
use tooldrop_core::tools::{self, ToolSpec};
use tooldrop_core::{Reporter, platform};
use tooldrop_schema::{ArchiveFormat, Asset, CatalogEntry, PlatformSelector};

use crate::InstallArgs;
use crate::ui::output::TerminalReporter;
use crate::ui::{catalog as table, prompt};

/// Run one install.
pub async fn install(args: &InstallArgs) -> Result<()> {
    let tool = tools::lookup(&args.tool).with_context(|| {
        format!("unknown tool '{}' (run `tooldrop tools` to list them)", args.tool)
    })?;
    let reporter = TerminalReporter::new();

    let selector = platform::select(args.platform.as_deref())?;
    tracing::debug!(platform = %selector, "selected platform");
    let home = crate::try_tooldrop_home().context("Could not determine home directory")?;

    let client = Client::builder()
        .user_agent(crate::USER_AGENT)
        .build()
        .context("Failed to build HTTP client")?;

    reporter.section(&format!("Fetching {} releases", tool.name));
    let catalog = fetch_catalog(&client, &tool, args.num_releases, &reporter).await?;

    if args.list {
        let entries: Vec<&CatalogEntry> = catalog.entries().iter().collect();
        table::print_releases(&entries);
        if let Some(query) = &args.version {
            let entry = catalog.select(query)?;
            table::print_assets(&entry.tag, &catalog.releases_for(&entry.tag));
        }
        return Ok(());
    }

    let entry = choose_release(&catalog, args)?;
    reporter.info(&format!("Selected {} ({})", entry.tag, entry.date()));

    let priority = load_priority(&tool, &home, args.overrides.as_deref())?;
    let releases = catalog.releases_for(&entry.tag);

    let asset = if args.from_source {
        None
    } else {
        match resolver::resolve(&tool, &entry.tag, &selector, &releases, &priority) {
            Ok(asset) => Some(asset),
            Err(err @ ResolveError::NoMatchingAsset { .. })
                if tool.source_build.is_some() && !args.no_extract =>
            {
                reporter.warning(&format!("{err}; building from source instead"));
                None
            }
            Err(err) => {
                reporter.error(&err.to_string());
                if let Some(diagnostic) = err.diagnostic() {
                    reporter.diagnostic(&diagnostic);
                }
                return Err(err.into());
            }
        }
    };

    let bin_dir = args
        .bin_dir
        .clone()
        .or_else(crate::try_bin_dir)
        .context("Could not determine bin directory")?;
    let installer = Installer::new(&client, &tool, bin_dir.clone(), &reporter)
        .with_exe_suffix(expects_exe_suffix(&selector));

    if args.no_extract {
        let Some(asset) = asset else {
            bail!("--no-extract needs a prebuilt asset");
        };
        return download_only(&installer, &asset, args.output_dir.as_deref(), &reporter).await;
    }

    let install_dir = args
        .install_dir
        .clone()
        .unwrap_or_else(|| crate::default_install_dir(&home, &tool.name));
    let target = InstallTarget::for_tool(&tool, install_dir);

    let installed = match asset {
        Some(asset) => {
            reporter.section(&format!("Installing {} {}", tool.name, entry.tag));
            installer
                .install_from_asset(&asset, &target)
                .await
                .map_err(|e| install_failed(&reporter, e))?
        }
        None => install_from_source(&tool, &entry.tag, args, &installer, &target, &reporter).await?,
    };

    report_installed(&tool, &installed, &reporter);

    if !args.no_path {
        configure_path(&bin_dir, &reporter);
    }

    Ok(())
}

/// Query every source and merge what came back.
async fn fetch_catalog(
    client: &Client,
    tool: &ToolSpec,
    max_count: usize,
    reporter: &TerminalReporter,
) -> Result<Catalog> {
    let api_base = crate::github_api_base();
    let token = crate::github_token();
    let sources: Vec<Box<dyn ListingSource>> = tool
        .sources
        .iter()
        .map(|s| {
            Box::new(
                GitHubSource::new(&s.id)
                    .with_api_base(&api_base)
                    .with_token(token.clone()),
            ) as Box<dyn ListingSource>
        })
        .collect();

    let outcome = catalog::fetch(client, &sources, max_count, FETCH_TIMEOUT).await;
    for err in &outcome.unreachable {
        reporter.warning(&err.to_string());
    }

    let catalog = Catalog::new(outcome.releases, max_count);
    if catalog.is_empty() {
        return Err(CatalogError::Empty.into());
    }
    reporter.done(&tool.name, &format!("{} releases", catalog.entries().len()));
    Ok(catalog)
}

/// Decide which release to install.
///
/// An ambiguous `--version` and a missing one both prompt when stdin is a
/// terminal; otherwise ambiguity is an error and a missing version means
/// the newest release.
fn choose_release<'c>(catalog: &'c Catalog, args: &InstallArgs) -> Result<&'c CatalogEntry> {
    let interactive = std::io::stdin().is_terminal();

    match args.version.as_deref() {
        Some(query) => match catalog.select(query) {
            Ok(entry) => Ok(entry),
            Err(CatalogError::Ambiguous { .. }) if interactive => {
                let candidates = catalog.matching(query);
                table::print_releases(&candidates);
                prompt::pick_release(&candidates, 1)
            }
            Err(err) => Err(err.into()),
        },
        None if interactive => {
            let entries: Vec<&CatalogEntry> = catalog.entries().iter().collect();
            let default = catalog
                .latest(args.pre_release)
                .ok()
                .and_then(|latest| entries.iter().position(|e| e.tag == latest.tag))
                .map_or(1, |i| i + 1);
            table::print_releases(&entries);
            prompt::pick_release(&entries, default)
        }
        None => Ok(catalog.latest(args.pre_release)?),
    }
}

/// Built-in priority with the override table layered on top.
///
/// An explicit table must exist; the default location is optional.
fn load_priority(tool: &ToolSpec, home: &Path, explicit: Option<&Path>) -> Result<SourcePriority> {
    let mut priority = tool.priority();
    let table = match explicit {
        Some(path) => OverrideTable::load(path)?,
        None => OverrideTable::load_optional(&crate::default_overrides_path(home))?,
    };
    let applied = table.apply(&tool.name, &mut priority);
    if applied > 0 {
        tracing::info!(applied, tool = %tool.name, "applied source overrides");
    }
    Ok(priority)
}

/// Executables inside archives for Windows carry `.exe`.
fn expects_exe_suffix(selector: &PlatformSelector) -> bool {
    match selector {
        PlatformSelector::Host(pattern) => pattern.uses_exe_suffix(),
        PlatformSelector::Explicit(literal) => literal
            .to_lowercase()
            .split(['-', '_'])
            .any(|token| token.starts_with("win")),
    }
}

async fn download_only(
    installer: &Installer<'_, TerminalReporter>,
    asset: &Asset,
    output_dir: Option<&Path>,
    reporter: &TerminalReporter,
) -> Result<()> {
    let output_dir = output_dir.map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    reporter.section(&format!("Downloading {}", asset.name));
    let path = installer.download_only(asset, &output_dir).await?;
    reporter.success(&format!("Saved {}", path.display()));

    match ArchiveFormat::from_name(&asset.name) {
        Some(format) => reporter.info(&format!(
            "Extract manually with: {}",
            format.manual_command(&path.display().to_string())
        )),
        None => reporter.warning("unrecognized archive suffix; inspect the file by hand"),
    }
    Ok(())
}

/// Build `tag` and install the build output.
///
/// A temporary build directory is removed afterwards unless `--keep-build`
/// is set, and kept after a failed build so its log can be read. A
/// user-supplied `--build-dir` is never removed.
async fn install_from_source(
    tool: &ToolSpec,
    tag: &str,
    args: &InstallArgs,
    installer: &Installer<'_, TerminalReporter>,
    target: &InstallTarget,
    reporter: &TerminalReporter,
) -> Result<InstalledBinaries> {
    let spec = tool
        .source_build
        .as_ref()
        .with_context(|| format!("{} cannot be built from source", tool.name))?;

    let (build_dir, scratch) = match &args.build_dir {
        Some(dir) => (dir.clone(), None),
        None => {
            let tmp = tempfile::Builder::new().prefix("tooldrop-build-").tempdir()?;
            (tmp.path().to_path_buf(), Some(tmp))
        }
    };

    reporter.section(&format!("Building {} {} from source", tool.name, tag));
    reporter.info(&format!("Build directory: {}", build_dir.display()));
    let opts = BuildOptions {
        build_dir,
        jobs: args.jobs,
        verbose: args.verbose,
    };

    // The build drives long-running child processes synchronously.
    let built = tokio::task::block_in_place(|| SourceBuilder::new(spec, opts, reporter).build(tag));
    let output = match built {
        Ok(output) => output,
        Err(err) => {
            if let Some(tmp) = scratch {
                let kept = tmp.keep();
                tracing::debug!(dir = %kept.display(), "kept failed build directory");
            }
            return Err(build_failed(reporter, err));
        }
    };
    reporter.done(tag, &format!("built in {}", output.output_dir.display()));

    let installed = installer.install_from_directory(&output.output_dir, target).await;

    match scratch {
        Some(tmp) if args.keep_build => {
            let kept = tmp.keep();
            reporter.info(&format!("Build directory kept at {}", kept.display()));
        }
        Some(tmp) => {
            if let Err(e) = tmp.close() {
                tracing::debug!(error = %e, "build directory cleanup failed");
            }
        }
        None => {}
    }

    installed.map_err(|e| install_failed(reporter, e))
}

fn install_failed(reporter: &TerminalReporter, err: InstallError) -> anyhow::Error {
    reporter.error(&err.to_string());
    if let Some(hint) = err.hint() {
        reporter.hint(hint);
    }
    err.into()
}

fn build_failed(reporter: &TerminalReporter, err: BuildError) -> anyhow::Error {
    reporter.error(&err.to_string());
    let tail = match &err {
        BuildError::BuildFailed { tail, .. } => tail.as_str(),
        _ => "",
    };
    if !tail.is_empty() {
        reporter.diagnostic(tail);
    }
    if let Some(hint) = err.hint() {
        reporter.hint(&hint);
    }
    err.into()
}

fn report_installed(tool: &ToolSpec, installed: &InstalledBinaries, reporter: &TerminalReporter) {
    let note = match &installed.verification {
        Verification::Passed { .. } => String::new(),
        Verification::Failed { .. } => " (unverified)".to_string(),
    };
    reporter.success(&format!(
        "{} installed to {}{note}",
        tool.name,
        installed.directory.display()
    ));
}

/// Make `bin_dir` reachable from new shells. Failures only warn: the
/// install itself already succeeded.
fn configure_path(bin_dir: &Path, reporter: &TerminalReporter) {
    let Some(env) = ShellEnv::from_env() else {
        reporter.warning(&format!(
            "Could not determine home directory; add {} to PATH yourself",
            bin_dir.display()
        ));
        return;
    };

    match env.ensure(bin_dir) {
        Ok(EnvStatus::AlreadyActive) => {}
        Ok(EnvStatus::AlreadyConfiguredPendingRestart { file }) => reporter.info(&format!(
            "{} is configured in {}; open a new shell to use it",
            bin_dir.display(),
            file.display()
        )),
        Ok(EnvStatus::Configured { file }) => reporter.info(&format!(
            "Added {} to PATH in {}; run `source {}` or open a new shell",
            bin_dir.display(),
            file.display(),
            file.display()
        )),
        Err(e) => reporter.warning(&format!(
            "Could not update shell configuration ({e}); add {} to PATH yourself",
            bin_dir.display()
        )),
    }
}
