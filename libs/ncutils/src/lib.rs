// Copyright 2025 The ncrc Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ncutils - ncrc Utilities Library
//!
//! Shared utilities for the ncrc client: files, child processes,
//! terminal prompts and configuration files.

pub mod file;
pub mod process;
pub mod prompt;

pub use file::{ensure_dir, safe_write, write_private};
pub use process::{run_captured, run_streaming, run_with_mode, OutputMode, ProcessOutput};
pub use prompt::{prompt_credentials, Credentials, PromptError};

#[cfg(feature = "serde")]
pub mod config;

#[cfg(feature = "serde")]
pub use config::ConfigFile;
