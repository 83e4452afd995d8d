// Copyright 2025 The ncrc Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ncrc - NCRC application client
//!
//! Installs, updates and lists NCRC applications published on conda channels
//! behind an RSA SecurID web login.

pub mod channel;
pub mod commands;
pub mod conda;
pub mod package;
pub mod scrub;
pub mod settings;

pub use commands::{Client, Network};
pub use settings::{ClientConfig, Command, EnvSnapshot, Invocation, Settings};
