// Copyright 2025 The ncrc Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! On-disk session cookie cache, one file per host

use crate::error::SessionError;
use ncutils::{ensure_dir, write_private};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Directory under `$HOME` holding one cookie file per host
pub const COOKIE_DIR: &str = ".RSASecureID_login";

/// Cookie name/value pairs for a single host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cookies(BTreeMap<String, String>);

impl Cookies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse a `Cookie:` request header value (`a=1; b=2`).
    pub fn from_header(header: &str) -> Self {
        let mut cookies = Self::new();
        for pair in header.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                if !name.is_empty() {
                    cookies.insert(name, value);
                }
            }
        }
        cookies
    }

    /// Render as a `Cookie:` request header value.
    pub fn to_header(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        Some(pairs.join("; "))
    }
}

/// Cookie files keyed by fully qualified domain name
#[derive(Debug, Clone)]
pub struct CookieStore {
    dir: PathBuf,
}

impl CookieStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `~/.RSASecureID_login`
    pub fn default_location() -> Result<Self, SessionError> {
        let home = ncutils::config::home_dir().map_err(SessionError::CookieStore)?;
        Ok(Self::new(home.join(COOKIE_DIR)))
    }

    pub fn path_for(&self, fqdn: &str) -> PathBuf {
        self.dir.join(fqdn)
    }

    /// Cookies cached for `fqdn`. A missing or unreadable file means no session.
    pub fn load(&self, fqdn: &str) -> Cookies {
        let path = self.path_for(fqdn);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("ignoring unreadable cookie file {}: {}", path.display(), e);
                }
                return Cookies::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(cookies) => cookies,
            Err(e) => {
                log::warn!("ignoring corrupt cookie file {}: {}", path.display(), e);
                Cookies::new()
            }
        }
    }

    pub fn save(&self, fqdn: &str, cookies: &Cookies) -> Result<PathBuf, SessionError> {
        let path = self.path_for(fqdn);
        ensure_dir(&self.dir).map_err(SessionError::CookieStore)?;

        let content = serde_json::to_vec_pretty(cookies)
            .map_err(|e| SessionError::CookieStore(e.into()))?;
        write_private(&path, &content).map_err(SessionError::CookieStore)?;

        log::debug!("saved {} cookie(s) to {}", cookies.len(), path.display());
        Ok(path)
    }
}
