// Copyright 2025 The ncrc Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Interactive credential prompts
//!
//! Input is read straight from fd 0 so that Ctrl-C, which interrupts the
//! blocked `read(2)` with `EINTR`, can be turned into
//! [`PromptError::Interrupted`] instead of killing the process with the
//! terminal left in no-echo mode.

use nix::errno::Errno;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::termios::{self, LocalFlags, SetArg, Termios};
use std::fmt;
use std::io::{self, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("interrupted")]
    Interrupted,

    #[error("no input available on stdin")]
    Eof,

    #[error("terminal error: {0}")]
    Terminal(#[from] Errno),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A username and a PIN+token passcode. The passcode never shows up in `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub passcode: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, passcode: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            passcode: passcode.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("passcode", &"<redacted>")
            .finish()
    }
}

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// SIGINT handler installed without `SA_RESTART`, restored on drop.
struct SigintGuard {
    previous: SigAction,
}

impl SigintGuard {
    fn install() -> Result<Self, PromptError> {
        INTERRUPTED.store(false, Ordering::SeqCst);
        let action = SigAction::new(SigHandler::Handler(on_sigint), SaFlags::empty(), SigSet::empty());
        // SAFETY: the handler only touches an atomic.
        let previous = unsafe { signal::sigaction(Signal::SIGINT, &action) }?;
        Ok(Self { previous })
    }
}

impl Drop for SigintGuard {
    fn drop(&mut self) {
        // SAFETY: restoring the disposition we replaced in `install`.
        let _ = unsafe { signal::sigaction(Signal::SIGINT, &self.previous) };
    }
}

/// Terminal echo switched off until drop.
struct EchoGuard<'fd> {
    fd: BorrowedFd<'fd>,
    original: Termios,
}

impl<'fd> EchoGuard<'fd> {
    /// Returns `None` when stdin is not a terminal.
    fn disable(fd: BorrowedFd<'fd>) -> Result<Option<Self>, PromptError> {
        let original = match termios::tcgetattr(fd) {
            Ok(t) => t,
            Err(Errno::ENOTTY) | Err(Errno::EINVAL) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut silent = original.clone();
        silent.local_flags.remove(LocalFlags::ECHO);
        termios::tcsetattr(fd, SetArg::TCSANOW, &silent)?;

        Ok(Some(Self { fd, original }))
    }
}

impl Drop for EchoGuard<'_> {
    fn drop(&mut self) {
        let _ = termios::tcsetattr(self.fd, SetArg::TCSANOW, &self.original);
    }
}

/// Ask for a username and a PIN+token on the controlling terminal.
pub fn prompt_credentials() -> Result<Credentials, PromptError> {
    let _sigint = SigintGuard::install()?;

    let username = prompt_line("Username: ")?;
    let passcode = prompt_secret("PIN+TOKEN: ")?;

    Ok(Credentials { username, passcode })
}

fn prompt_line(label: &str) -> Result<String, PromptError> {
    print!("{}", label);
    io::stdout().flush()?;

    read_line(io::stdin().as_raw_fd())
}

fn prompt_secret(label: &str) -> Result<String, PromptError> {
    let stdin = io::stdin();
    let fd = stdin.as_fd();

    print!("{}", label);
    io::stdout().flush()?;

    let echo = EchoGuard::disable(fd)?;
    if echo.is_none() {
        log::debug!("stdin is not a terminal, reading passcode with echo");
    }
    let line = read_line(fd.as_raw_fd());
    drop(echo);
    println!();

    line
}

fn read_line(fd: RawFd) -> Result<String, PromptError> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        match nix::unistd::read(fd, &mut byte) {
            Ok(0) => {
                if line.is_empty() {
                    return Err(PromptError::Eof);
                }
                break;
            }
            Ok(_) if byte[0] == b'\n' => break,
            Ok(_) => line.push(byte[0]),
            Err(Errno::EINTR) => {
                if INTERRUPTED.load(Ordering::SeqCst) {
                    return Err(PromptError::Interrupted);
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    let text = String::from_utf8_lossy(&line);
    Ok(text.trim_end_matches('\r').to_string())
}
