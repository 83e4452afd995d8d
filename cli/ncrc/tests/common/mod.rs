// Copyright 2025 The ncrc Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Shared fixtures for the command tests: a scripted conda and canned settings.
//!
//! Each test binary writes and runs its script from a single test, so no other
//! thread holds the script open for writing while it is executed.

#![allow(dead_code)]

use ncrc::conda::Conda;
use ncrc::{ClientConfig, Command, EnvSnapshot, Invocation, Settings};
use ncutils::{Credentials, OutputMode, PromptError};
use securid::CredentialSource;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

pub const FILE: &str = "ncrc-moose-2023.02.01-build_0.conda";

/// A shell script standing in for conda. It appends its arguments to
/// `calls.log` and answers `--version`, `info` and `search` from files.
pub struct FakeConda {
    dir: PathBuf,
    program: PathBuf,
}

impl FakeConda {
    pub fn new(root: &Path) -> Self {
        let dir = root.join("fake-conda");
        fs::create_dir_all(&dir).unwrap();

        let program = dir.join("conda");
        let script = format!(
            r#"#!/bin/sh
dir='{}'
echo "$*" >> "$dir/calls.log"
case "$1" in
  --version) echo 'conda 24.1.2' ;;
  info) cat "$dir/info.json" ;;
  search)
    case "$*" in
      *--json*) cat "$dir/search.json" ;;
      *) cat "$dir/search.txt" ;;
    esac
    ;;
esac
exit 0
"#,
            dir.display()
        );
        fs::write(&program, script).unwrap();
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();

        Self { dir, program }
    }

    /// Canned stdout for `info` (`info.json`) or `search` (`search.json`, `search.txt`).
    pub fn respond(&self, file: &str, body: &str) {
        fs::write(self.dir.join(file), body).unwrap();
    }

    /// The newest `ncrc-moose` record as `search --json` prints it.
    pub fn respond_with_moose_record(&self) {
        let records = serde_json::json!({
            "ncrc-moose": [{
                "name": "ncrc-moose",
                "version": "2023.02.01",
                "build": "build_0",
                "fn": FILE,
                "subdir": "linux-64",
                "url": format!("https://conda.example.org/ncrc-applications/linux-64/{}", FILE),
                "depends": ["ncrc"]
            }]
        });
        self.respond("search.json", &records.to_string());
    }

    pub fn conda(&self) -> Conda {
        Conda::new(&self.program, false, OutputMode::Suppress)
    }

    /// Every invocation so far, one argument string per call.
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.dir.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }
}

/// Hands out fixed credentials, or refuses when it has none.
pub struct Prompt {
    pub calls: usize,
    credentials: Option<Credentials>,
}

impl Prompt {
    pub fn refusing() -> Self {
        Self {
            calls: 0,
            credentials: None,
        }
    }

    pub fn with(username: &str, passcode: &str) -> Self {
        Self {
            calls: 0,
            credentials: Some(Credentials::new(username, passcode)),
        }
    }
}

impl CredentialSource for Prompt {
    fn credentials(&mut self) -> Result<Credentials, PromptError> {
        self.calls += 1;
        self.credentials.clone().ok_or(PromptError::Eof)
    }
}

pub fn settings(command: Command, invocation: Invocation, active_env: Option<&str>) -> Settings {
    Settings::resolve(
        command,
        invocation,
        &ClientConfig::default(),
        EnvSnapshot {
            conda_default_env: active_env.map(String::from),
            ncrc_app: None,
        },
    )
    .unwrap()
}

pub fn against(server: &str, application: Option<&str>) -> Invocation {
    Invocation {
        application: application.map(String::from),
        server: Some(server.to_string()),
        quiet: true,
        ..Invocation::default()
    }
}
