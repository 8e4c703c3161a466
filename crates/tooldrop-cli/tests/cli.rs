//! End-to-end runs of the `tooldrop` binary against a mock release API.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output};

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;
use tempfile::TempDir;

/// Isolated home directory plus a mock release API.
struct TestContext {
    temp_dir: TempDir,
    tooldrop_home: PathBuf,
    server: ServerGuard,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let tooldrop_home = temp_dir.path().join(".tooldrop");
        Self {
            temp_dir,
            tooldrop_home,
            server: Server::new(),
        }
    }

    fn tooldrop_cmd(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_tooldrop"));
        cmd.env("HOME", self.temp_dir.path());
        cmd.env("TOOLDROP_HOME", &self.tooldrop_home);
        cmd.env("TOOLDROP_GITHUB_API", self.server.url());
        cmd.env("SHELL", "/bin/bash");
        for var in ["TOOLDROP_BIN_DIR", "TOOLDROP_OVERRIDES", "GITHUB_TOKEN", "GH_TOKEN"] {
            cmd.env_remove(var);
        }
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.tooldrop_cmd()
            .args(args)
            .output()
            .expect("failed to run tooldrop")
    }

    fn mock_releases(&mut self, repo: &str, body: serde_json::Value) -> Mock {
        self.server
            .mock("GET", format!("/repos/{repo}/releases").as_str())
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create()
    }

    fn mock_unreachable(&mut self, repo: &str) -> Mock {
        self.server
            .mock("GET", format!("/repos/{repo}/releases").as_str())
            .match_query(Matcher::Any)
            .with_status(500)
            .create()
    }

    fn asset_url(&self, name: &str) -> String {
        format!("{}/download/{name}", self.server.url())
    }
}

fn z3_releases(ctx: &TestContext) -> serde_json::Value {
    json!([
        {
            "tag_name": "z3-4.14.0-rc1",
            "published_at": "2025-02-01T00:00:00Z",
            "prerelease": true,
            "assets": []
        },
        {
            "tag_name": "z3-4.13.0",
            "published_at": "2024-03-09T12:00:00Z",
            "prerelease": false,
            "assets": [
                {
                    "name": "z3-4.13.0-x64-glibc-2.35.zip",
                    "size": 1024,
                    "browser_download_url": ctx.asset_url("z3-4.13.0-x64-glibc-2.35.zip")
                },
                {
                    "name": "z3-4.13.0-arm64-osx-11.0.zip",
                    "size": 2048,
                    "browser_download_url": ctx.asset_url("z3-4.13.0-arm64-osx-11.0.zip")
                }
            ]
        },
        {
            "tag_name": "z3-4.12.5",
            "published_at": "2024-01-18T12:00:00Z",
            "prerelease": false,
            "assets": []
        }
    ])
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--help"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("Usage:"));
    assert!(out.contains("install"));
}

#[test]
fn test_tools_lists_registry() {
    let ctx = TestContext::new();
    let output = ctx.run(&["tools"]);
    assert!(output.status.success());
    let out = stdout(&output);
    for name in ["z3", "verus", "rust-analyzer", "scip"] {
        assert!(out.contains(name), "missing {name} in:\n{out}");
    }
}

#[test]
fn test_unknown_tool_fails() {
    let ctx = TestContext::new();
    let output = ctx.run(&["install", "nosuchtool", "--list"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("unknown tool 'nosuchtool'"));
}

#[test]
fn test_list_merges_sources_and_survives_an_outage() {
    let mut ctx = TestContext::new();
    let body = z3_releases(&ctx);
    let primary = ctx.mock_releases("Z3Prover/z3", body);
    let mirror = ctx.mock_unreachable("Beneficial-AI-Foundation/z3");

    let output = ctx.run(&["install", "z3", "--list"]);
    primary.assert();
    mirror.assert();

    assert!(output.status.success(), "stderr:\n{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("z3-4.13.0"));
    assert!(out.contains("2024-03-09"));
    assert!(out.contains("(pre-release)"));
    assert!(stderr(&output).contains("Beneficial-AI-Foundation/z3"));

    // List mode touches nothing on disk
    assert!(!ctx.tooldrop_home.join("tools").exists());
}

#[test]
fn test_list_with_version_shows_assets() {
    let mut ctx = TestContext::new();
    let body = z3_releases(&ctx);
    let _primary = ctx.mock_releases("Z3Prover/z3", body);
    let _mirror = ctx.mock_releases("Beneficial-AI-Foundation/z3", json!([]));

    let output = ctx.run(&["install", "z3", "--list", "-v", "z3-4.13.0"]);
    assert!(output.status.success(), "stderr:\n{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("z3-4.13.0-x64-glibc-2.35.zip"));
    assert!(out.contains("z3-4.13.0-arm64-osx-11.0.zip"));
}

#[test]
fn test_ambiguous_version_fails_without_terminal() {
    let mut ctx = TestContext::new();
    let body = z3_releases(&ctx);
    let _primary = ctx.mock_releases("Z3Prover/z3", body);
    let _mirror = ctx.mock_releases("Beneficial-AI-Foundation/z3", json!([]));

    let output = ctx.run(&["install", "z3", "--list", "-v", "4.1"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("ambiguous"));
}

#[test]
fn test_unknown_version_lists_available_tags() {
    let mut ctx = TestContext::new();
    let body = z3_releases(&ctx);
    let _primary = ctx.mock_releases("Z3Prover/z3", body);
    let _mirror = ctx.mock_releases("Beneficial-AI-Foundation/z3", json!([]));

    let output = ctx.run(&["install", "z3", "-v", "9.9.9", "--no-path"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("9.9.9"));
    assert!(err.contains("z3-4.12.5"));
}

#[test]
fn test_missing_asset_prints_what_is_available() {
    let mut ctx = TestContext::new();
    let body = z3_releases(&ctx);
    let _primary = ctx.mock_releases("Z3Prover/z3", body);
    let _mirror = ctx.mock_releases("Beneficial-AI-Foundation/z3", json!([]));

    let output = ctx.run(&[
        "install", "z3", "-v", "z3-4.13.0", "--platform", "riscv64-musl", "--no-path",
    ]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("riscv64-musl"));
    assert!(err.contains("z3-4.13.0-x64-glibc-2.35.zip"));
}

#[test]
fn test_download_only_keeps_archive() {
    let mut ctx = TestContext::new();
    let body = z3_releases(&ctx);
    let _primary = ctx.mock_releases("Z3Prover/z3", body);
    let _mirror = ctx.mock_releases("Beneficial-AI-Foundation/z3", json!([]));
    let _asset = ctx
        .server
        .mock("GET", "/download/z3-4.13.0-x64-glibc-2.35.zip")
        .with_status(200)
        .with_body(b"not really a zip")
        .create();

    let out_dir = ctx.temp_dir.path().join("downloads");
    let output = ctx.run(&[
        "install",
        "z3",
        "--platform",
        "x64-glibc",
        "--no-extract",
        "--output-dir",
        out_dir.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "stderr:\n{}", stderr(&output));

    let saved = out_dir.join("z3-4.13.0-x64-glibc-2.35.zip");
    assert_eq!(std::fs::read(&saved).unwrap(), b"not really a zip");
    assert!(stdout(&output).contains("unzip"));
}

fn z3_archive() -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
    zip.start_file("z3-4.13.0-x64-glibc-2.35/bin/z3", options)
        .unwrap();
    zip.write_all(b"#!/bin/sh\necho \"Z3 version 4.13.0 - 64 bit\"\n")
        .unwrap();
    zip.start_file("z3-4.13.0-x64-glibc-2.35/bin/libz3.so", options)
        .unwrap();
    zip.write_all(b"library").unwrap();
    zip.finish().unwrap().into_inner()
}

#[cfg(unix)]
#[test]
fn test_install_links_binary_and_configures_path() {
    let mut ctx = TestContext::new();
    let body = z3_releases(&ctx);
    let _primary = ctx.mock_releases("Z3Prover/z3", body);
    let _mirror = ctx.mock_releases("Beneficial-AI-Foundation/z3", json!([]));
    let download = ctx
        .server
        .mock("GET", "/download/z3-4.13.0-x64-glibc-2.35.zip")
        .with_status(200)
        .with_body(z3_archive())
        .create();

    let bin_dir = ctx.temp_dir.path().join("bin");
    let output = ctx.run(&[
        "install",
        "z3",
        "--platform",
        "x64-glibc",
        "--bin-dir",
        bin_dir.to_str().unwrap(),
    ]);
    download.assert();
    assert!(output.status.success(), "stderr:\n{}", stderr(&output));

    // Latest stable, not the pre-release
    let install_dir = ctx.tooldrop_home.join("tools/z3");
    assert!(install_dir.join("z3").is_file());
    assert!(install_dir.join("libz3.so").is_file());

    let link = bin_dir.join("z3");
    assert_eq!(std::fs::read_link(&link).unwrap(), install_dir.join("z3"));
    assert!(stdout(&output).contains("Z3 version 4.13.0"));

    let bashrc = std::fs::read_to_string(ctx.temp_dir.path().join(".bashrc")).unwrap();
    assert!(bashrc.contains(&format!("export PATH=\"{}:$PATH\"", bin_dir.display())));

    // Second run: the startup file already knows the directory
    let again = ctx.run(&[
        "install",
        "z3",
        "--platform",
        "x64-glibc",
        "--bin-dir",
        bin_dir.to_str().unwrap(),
    ]);
    assert!(again.status.success(), "stderr:\n{}", stderr(&again));
    let bashrc = std::fs::read_to_string(ctx.temp_dir.path().join(".bashrc")).unwrap();
    assert_eq!(bashrc.matches("export PATH=").count(), 1);
}
