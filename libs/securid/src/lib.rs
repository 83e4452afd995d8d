// Copyright 2025 The ncrc Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! securid - RSA SecurID web sessions
//!
//! Logs in to a SecurID protected web form, caches the resulting session
//! cookie per host and reuses it for later requests.

pub mod basic;
pub mod cookie;
pub mod error;
pub mod session;

pub use basic::{basic_auth_channel, EmbeddedCredentials};
pub use cookie::{CookieStore, Cookies, COOKIE_DIR};
pub use error::{check_proxy, SessionError};
pub use session::{
    join_path, Authentication, CredentialSource, Session, SessionOptions, TerminalPrompt,
};
