// Copyright 2025 The ncrc Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Application specs: `name[=version[=build]]`

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Prefix every NCRC package name carries on the channel
pub const VENDOR_PREFIX: &str = "ncrc-";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("'{0}' has too many '=' separators, expected name[=version[=build]]")]
    TooManyFields(String),
}

/// An application spec as typed by the user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageSpec {
    pub name: String,
    pub version: Option<String>,
    pub build: Option<String>,
}

impl FromStr for PackageSpec {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split('=').collect();
        let (name, version, build) = match fields.as_slice() {
            [name] => (*name, None, None),
            [name, version] => (*name, non_empty(version), None),
            [name, version, build] => (*name, non_empty(version), non_empty(build)),
            _ => return Err(SpecError::TooManyFields(s.to_string())),
        };

        Ok(Self {
            name: name.to_string(),
            version,
            build,
        })
    }
}

fn non_empty(field: &str) -> Option<String> {
    if field.is_empty() {
        None
    } else {
        Some(field.to_string())
    }
}

/// Channel package name for `name`: ASCII alphanumerics only, lowercase,
/// leading copies of the prefix dropped, prefix re-applied.
pub fn normalize(name: &str, prefix: &str) -> String {
    let cleaned = clean(name);
    let marker = clean(prefix);

    let mut bare = cleaned.as_str();
    if !marker.is_empty() {
        while let Some(rest) = bare.strip_prefix(marker.as_str()) {
            bare = rest;
        }
    }
    format!("{}{}", prefix, bare)
}

fn clean(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// A spec with its name resolved against the vendor prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// Name without the vendor prefix, e.g. `moose`
    pub application: String,
    /// Name on the channel, e.g. `ncrc-moose`
    pub name: String,
    pub version: Option<String>,
    pub build: Option<String>,
}

impl Package {
    pub fn resolve(spec: &PackageSpec, prefix: &str) -> Self {
        let name = normalize(&spec.name, prefix);
        let application = name
            .strip_prefix(prefix)
            .unwrap_or(name.as_str())
            .to_string();

        Self {
            application,
            name,
            version: spec.version.clone(),
            build: spec.build.clone(),
        }
    }

    /// Conda environment name: `application[_version[_build]]`
    pub fn environment_name(&self) -> String {
        self.joined(&self.application, "_")
    }

    /// Conda match spec: `name[=version[=build]]`
    pub fn match_spec(&self) -> String {
        self.joined(&self.name, "=")
    }

    fn joined(&self, head: &str, sep: &str) -> String {
        [Some(head), self.version.as_deref(), self.build.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(sep)
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.match_spec())
    }
}
