// Copyright 2025 The ncrc Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Driving the external conda executable

use anyhow::{anyhow, bail, Context, Result};
use ncutils::{run_captured, run_streaming, run_with_mode, OutputMode, ProcessOutput};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use url::Url;

/// Oldest conda known to handle the channel layout
pub const MINIMUM_VERSION: [u64; 3] = [23, 11, 0];

/// Result of a best-effort catalog query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// conda succeeded; its stdout
    Matches(String),
    /// conda ran and found nothing
    NoMatches,
    /// conda could not be run or failed for another reason
    ToolFailed(String),
}

/// One entry of `conda search --json`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub build: String,
    #[serde(rename = "fn")]
    pub filename: String,
    pub subdir: String,
    pub url: String,
    #[serde(default)]
    pub depends: Vec<String>,
}

/// The parts of `conda info --json` the client looks at
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CondaInfo {
    #[serde(default)]
    pub root_prefix: Option<PathBuf>,
    #[serde(default)]
    pub active_prefix: Option<PathBuf>,
    #[serde(default)]
    pub active_prefix_name: Option<String>,
    #[serde(default)]
    pub envs_dirs: Vec<PathBuf>,
    #[serde(default)]
    pub pkgs_dirs: Vec<PathBuf>,
}

impl CondaInfo {
    /// Prefix of the environment called `name`, if it exists.
    pub fn environment_prefix(&self, name: &str) -> Option<PathBuf> {
        if name == "base" {
            return self.root_prefix.clone();
        }
        if self.active_prefix_name.as_deref() == Some(name) {
            if let Some(prefix) = &self.active_prefix {
                return Some(prefix.clone());
            }
        }
        self.envs_dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|prefix| prefix.is_dir())
    }
}

#[derive(Debug, Clone)]
pub struct Conda {
    program: OsString,
    insecure: bool,
    output: OutputMode,
}

impl Conda {
    pub fn new(program: impl Into<OsString>, insecure: bool, output: OutputMode) -> Self {
        Self {
            program: program.into(),
            insecure,
            output,
        }
    }

    /// Use `$CONDA_EXE` when conda's shell hook set it, `conda` otherwise.
    pub fn from_env(insecure: bool, output: OutputMode) -> Self {
        let program = std::env::var_os("CONDA_EXE")
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| OsString::from("conda"));
        Self::new(program, insecure, output)
    }

    pub fn create_args(&self, env: &str, channels: &[String], specs: &[String]) -> Vec<String> {
        let mut args = strings(&["create", "--yes", "--name", env]);
        args.extend(channel_args(channels));
        args.push("--strict-channel-priority".to_string());
        self.push_insecure(&mut args);
        args.extend(specs.iter().cloned());
        args
    }

    pub fn update_args(&self, env: &str, channels: &[String]) -> Vec<String> {
        let mut args = strings(&["update", "--all", "--yes", "--name", env]);
        args.extend(channel_args(channels));
        args.push("--strict-channel-priority".to_string());
        self.push_insecure(&mut args);
        args
    }

    pub fn install_args(&self, env: &str, artifact: &Path) -> Vec<String> {
        let mut args = strings(&["install", "--yes", "--no-deps", "--name", env]);
        args.push(artifact.to_string_lossy().into_owned());
        args
    }

    pub fn search_args(&self, channels: &[String], pattern: &str, json: bool) -> Vec<String> {
        let mut args = strings(&["search", "--override-channels"]);
        args.extend(channel_args(channels));
        if json {
            args.push("--json".to_string());
        }
        self.push_insecure(&mut args);
        args.push(pattern.to_string());
        args
    }

    fn push_insecure(&self, args: &mut Vec<String>) {
        if self.insecure {
            args.push("--insecure".to_string());
        }
    }

    /// Create `env` holding `specs`.
    pub async fn create_environment(&self, env: &str, channels: &[String], specs: &[String]) -> Result<()> {
        self.run_checked("create", &self.create_args(env, channels, specs)).await
    }

    /// Update every package in `env`.
    pub async fn update_environment(&self, env: &str, channels: &[String]) -> Result<()> {
        self.run_checked("update", &self.update_args(env, channels)).await
    }

    /// Install a downloaded package file into `env`.
    pub async fn install_into(&self, env: &str, artifact: &Path) -> Result<()> {
        self.run_checked("install", &self.install_args(env, artifact)).await
    }

    pub async fn clean(&self) -> Result<()> {
        self.run_checked("clean", &strings(&["clean", "--all", "--yes"])).await
    }

    pub async fn version(&self) -> Result<String> {
        let output = run_captured(&self.program, ["--version"]).await?;
        if !output.success() {
            bail!("conda --version failed ({})", output.status);
        }
        Ok(output.stdout.trim().to_string())
    }

    pub async fn info(&self) -> Result<CondaInfo> {
        let output = run_captured(&self.program, ["info", "--json"]).await?;
        if !output.success() {
            bail!("conda info failed ({}){}", output.status, stderr_tail(&output));
        }
        serde_json::from_str(&output.stdout).context("failed to parse `conda info --json`")
    }

    /// Run a catalog search, echoing conda's table as it prints when `echo`
    /// is set. Never fails: problems come back as [`SearchOutcome::ToolFailed`].
    pub async fn search(&self, channel: &Url, pattern: &str, echo: bool) -> SearchOutcome {
        let args = self.search_args(&[channel.to_string()], pattern, false);
        log::debug!("running conda {}", redact(&args));

        let output = if echo {
            run_streaming(&self.program, &args).await
        } else {
            run_captured(&self.program, &args).await
        };
        match output {
            Err(e) => SearchOutcome::ToolFailed(format!("{:#}", e)),
            Ok(output) => classify_search(&output),
        }
    }

    /// Newest record matching `spec` across `channels`.
    pub async fn resolve(&self, channels: &[String], name: &str, spec: &str) -> Result<PackageRecord> {
        let args = self.search_args(channels, spec, true);
        log::debug!("running conda {}", redact(&args));

        let output = run_captured(&self.program, &args).await?;
        parse_search_json(&output.stdout, name)
            .with_context(|| format!("unable to resolve {}", spec))
    }

    async fn run_checked(&self, operation: &str, args: &[String]) -> Result<()> {
        log::debug!("running conda {}", redact(args));

        let output = run_with_mode(&self.program, args, self.output).await?;
        if !output.success() {
            bail!("conda {} failed ({}){}", operation, output.status, stderr_tail(&output));
        }
        Ok(())
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn channel_args(channels: &[String]) -> Vec<String> {
    channels
        .iter()
        .flat_map(|c| ["--channel".to_string(), c.clone()])
        .collect()
}

fn stderr_tail(output: &ProcessOutput) -> String {
    match output.stderr.trim().lines().last() {
        Some(line) => format!(": {}", line),
        None => String::new(),
    }
}

/// Command line for logs, with any URL password masked.
fn redact(args: &[String]) -> String {
    args.iter()
        .map(|arg| match Url::parse(arg) {
            Ok(mut url) if url.password().is_some() => {
                let _ = url.set_password(Some("****"));
                url.to_string()
            }
            _ => arg.clone(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn classify_search(output: &ProcessOutput) -> SearchOutcome {
    const NOT_FOUND: [&str; 2] = ["PackagesNotFoundError", "No match found"];

    if output.success() {
        return SearchOutcome::Matches(output.stdout.clone());
    }
    let text = format!("{}\n{}", output.stdout, output.stderr);
    if NOT_FOUND.iter().any(|marker| text.contains(marker)) {
        return SearchOutcome::NoMatches;
    }
    let reason = output
        .stderr
        .trim()
        .lines()
        .last()
        .map(str::to_string)
        .unwrap_or_else(|| format!("conda exited with {}", output.status));
    SearchOutcome::ToolFailed(reason)
}

/// Application names in `conda search` table output, prefix stripped,
/// de-duplicated and sorted.
pub fn parse_catalog(stdout: &str, prefix: &str) -> Vec<String> {
    let names: BTreeSet<String> = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| !line.starts_with("Loading channels") && !line.contains("No match found"))
        .filter_map(|line| line.split_whitespace().next())
        .map(|name| name.strip_prefix(prefix).unwrap_or(name).to_string())
        .filter(|name| !name.is_empty())
        .collect();

    names.into_iter().collect()
}

/// The last (newest) record for `name` in `conda search --json` output.
pub fn parse_search_json(stdout: &str, name: &str) -> Result<PackageRecord> {
    let value: Value = serde_json::from_str(stdout).context("conda search returned invalid JSON")?;

    if let Some(error) = value.get("error").and_then(Value::as_str) {
        let kind = value
            .get("exception_name")
            .and_then(Value::as_str)
            .unwrap_or("error");
        if kind == "PackagesNotFoundError" {
            bail!("no package matches in the configured channels");
        }
        bail!("{}: {}", kind, error.trim());
    }

    let records = value
        .get(name)
        .ok_or_else(|| anyhow!("{} is not in the search results", name))?;
    let mut records: Vec<PackageRecord> =
        serde_json::from_value(records.clone()).context("unexpected conda search record")?;

    records.pop().ok_or_else(|| anyhow!("no records for {}", name))
}

/// `[major, minor, patch]` from `conda --version` output such as `conda 23.11.0`.
pub fn parse_version(text: &str) -> Option<[u64; 3]> {
    let raw = text.split_whitespace().last()?;
    let mut parts = [0u64; 3];
    let mut seen = 0;

    for (slot, field) in parts.iter_mut().zip(raw.split('.')) {
        let digits: String = field.chars().take_while(char::is_ascii_digit).collect();
        *slot = digits.parse().ok()?;
        seen += 1;
    }

    if seen == 0 {
        None
    } else {
        Some(parts)
    }
}

pub fn meets_minimum(found: [u64; 3]) -> bool {
    found >= MINIMUM_VERSION
}
