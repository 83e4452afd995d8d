// Copyright 2025 The ncrc Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Process utilities

use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

/// What to do with a child's stdout and stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Child writes straight to our terminal
    Inherit,
    /// Child output is captured and only kept for error reporting
    Suppress,
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Run `program` to completion and capture its output.
pub async fn run_captured<S, I, A>(program: S, args: I) -> Result<ProcessOutput>
where
    S: AsRef<OsStr>,
    I: IntoIterator<Item = A>,
    A: AsRef<OsStr>,
{
    let program = program.as_ref();
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("failed to run {}", program.to_string_lossy()))?;

    Ok(ProcessOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run `program` to completion, streaming or suppressing its output.
///
/// In [`OutputMode::Inherit`] the returned stdout/stderr are empty.
pub async fn run_with_mode<S, I, A>(program: S, args: I, mode: OutputMode) -> Result<ProcessOutput>
where
    S: AsRef<OsStr>,
    I: IntoIterator<Item = A>,
    A: AsRef<OsStr>,
{
    match mode {
        OutputMode::Suppress => run_captured(program, args).await,
        OutputMode::Inherit => {
            let program = program.as_ref();
            let status = Command::new(program)
                .args(args)
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .await
                .with_context(|| format!("failed to run {}", program.to_string_lossy()))?;

            Ok(ProcessOutput {
                status,
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }
}

/// Run `program`, echoing each stdout line to our stdout as it arrives.
///
/// Stdout is also kept in the result; stderr is captured.
pub async fn run_streaming<S, I, A>(program: S, args: I) -> Result<ProcessOutput>
where
    S: AsRef<OsStr>,
    I: IntoIterator<Item = A>,
    A: AsRef<OsStr>,
{
    let program = program.as_ref();
    let name = program.to_string_lossy();
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to run {}", name))?;

    let stdout = child.stdout.take().context("child stdout was not piped")?;
    let mut stderr = child.stderr.take().context("child stderr was not piped")?;

    let forward = async {
        let mut lines = BufReader::new(stdout).lines();
        let mut kept = String::new();
        while let Some(line) = lines.next_line().await? {
            println!("{}", line);
            kept.push_str(&line);
            kept.push('\n');
        }
        Ok::<_, std::io::Error>(kept)
    };
    let collect = async {
        let mut raw = Vec::new();
        stderr.read_to_end(&mut raw).await?;
        Ok::<_, std::io::Error>(String::from_utf8_lossy(&raw).into_owned())
    };

    let (stdout, stderr) = tokio::try_join!(forward, collect)
        .with_context(|| format!("failed to read output of {}", name))?;
    let status = child
        .wait()
        .await
        .with_context(|| format!("failed to wait for {}", name))?;

    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
    })
}
