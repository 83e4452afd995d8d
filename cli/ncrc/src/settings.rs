// Copyright 2025 The ncrc Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Everything a command needs, resolved once from the command line, the
//! config file and the environment.

use crate::channel::Channels;
use crate::package::{Package, PackageSpec, SpecError, VENDOR_PREFIX};
use ncutils::ConfigFile;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

pub const DEFAULT_SERVER: &str = "conda.software.inl.gov";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Install,
    Update,
    Remove,
    Search,
    List,
}

impl Command {
    fn needs_application(self) -> bool {
        !matches!(self, Command::Update | Command::List)
    }

    /// Whether the command downloads from the server itself.
    pub fn uses_network(self) -> bool {
        matches!(self, Command::Install | Command::Update)
    }
}

/// Values from `~/.config/ncrc/config.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: String,
    pub prefix: String,
    /// Channel on `server` listing every application
    pub catalog_channel: String,
    /// Channel on `server` with the shared runtime packages
    pub public_channel: String,
    pub community_channel: String,
    pub stream_output: bool,
    pub clean_after_install: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            prefix: VENDOR_PREFIX.to_string(),
            catalog_channel: "ncrc-applications".to_string(),
            public_channel: "public".to_string(),
            community_channel: "conda-forge".to_string(),
            stream_output: true,
            clean_after_install: true,
        }
    }
}

impl ConfigFile for ClientConfig {
    fn config_path() -> PathBuf {
        ncutils::config::config_dir("ncrc").join("config.json")
    }
}

/// Environment variables the client reacts to, captured once
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    /// `CONDA_DEFAULT_ENV`
    pub conda_default_env: Option<String>,
    /// `NCRC_APP`
    pub ncrc_app: Option<String>,
}

impl EnvSnapshot {
    pub fn capture() -> Self {
        let read = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        Self {
            conda_default_env: read("CONDA_DEFAULT_ENV"),
            ncrc_app: read("NCRC_APP"),
        }
    }

    fn active_env(&self) -> &str {
        self.conda_default_env.as_deref().unwrap_or_default()
    }

    /// The ncrc application the active environment belongs to, if any.
    pub fn active_application(&self, prefix: &str) -> Option<String> {
        let env = self.active_env();
        if !prefix.is_empty() && env.contains(prefix) {
            let head = env.split('_').next().unwrap_or_default();
            return Some(head.replace(prefix, ""));
        }
        self.ncrc_app.as_ref().map(|app| app.to_lowercase())
    }
}

/// What the user typed
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub application: Option<String>,
    pub server: Option<String>,
    pub insecure: bool,
    pub quiet: bool,
    pub basic_auth: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("You must supply additional information when performing this action")]
    MissingApplication,

    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error("invalid server '{0}'")]
    InvalidServer(String),

    #[error(
        "Cannot install {package} while not inside the base environment.\n\
         Enter the base environment first with `conda activate base`."
    )]
    NotInBase { package: String },

    #[error(
        "Cannot perform an update while not inside said environment. Please\n\
         activate the environment first and then run the command again. Use:\n\n\
         \tconda env list\n\n\
         To view available environments to activate."
    )]
    NoActiveApplication,

    #[error(
        "You installed a specific version of {application}. If you wish\n\
         to update to the latest version, it would be best to install\n\
         it into a new environment instead:\n\n\
         \tconda activate base\n\tncrc install {application}\n\n\
         or activate that environment and perform the update there."
    )]
    PinnedEnvironment { application: String },
}

/// Resolved configuration for one command
#[derive(Debug, Clone)]
pub struct Settings {
    pub command: Command,
    pub package: Package,
    pub server: String,
    /// Host of `server`, keys the cookie cache
    pub fqdn: String,
    /// Root of `server`'s host, where the login form lives
    pub login_base: Url,
    pub channels: Channels,
    /// Environment the command works on
    pub environment: String,
    pub prefix: String,
    pub insecure: bool,
    pub stream_output: bool,
    pub clean_after_install: bool,
    pub basic_auth: bool,
    pub env: EnvSnapshot,
}

impl Settings {
    pub fn resolve(
        command: Command,
        invocation: Invocation,
        config: &ClientConfig,
        env: EnvSnapshot,
    ) -> Result<Self, UsageError> {
        let raw = invocation.application.unwrap_or_default();
        if raw.is_empty() && command.needs_application() {
            return Err(UsageError::MissingApplication);
        }

        let prefix = config.prefix.clone();
        let active_app = env.active_application(&prefix);

        let mut spec: PackageSpec = raw.parse()?;
        if spec.name.is_empty() {
            if let Some(app) = &active_app {
                spec.name = app.clone();
            }
        }
        let package = Package::resolve(&spec, &prefix);

        if command == Command::Install && env.active_env() != "base" {
            return Err(UsageError::NotInBase {
                package: package.name.clone(),
            });
        }

        if command == Command::Update {
            match &active_app {
                None => return Err(UsageError::NoActiveApplication),
                Some(app) if env.active_env().split('_').count() > 1 => {
                    return Err(UsageError::PinnedEnvironment {
                        application: app.clone(),
                    });
                }
                Some(_) => {}
            }
        }

        let server = invocation.server.unwrap_or_else(|| config.server.clone());
        let server_url = server_url(&server)?;
        let fqdn = server_url
            .host_str()
            .ok_or_else(|| UsageError::InvalidServer(server.clone()))?
            .to_string();
        let mut login_base = server_url.clone();
        login_base.set_path("/");
        login_base.set_query(None);

        let channels = Channels::new(&server_url, &package.name, config)
            .map_err(|_| UsageError::InvalidServer(server.clone()))?;

        let environment = match command {
            Command::Update => env.active_env().to_string(),
            _ => package.environment_name(),
        };

        Ok(Self {
            command,
            package,
            server,
            fqdn,
            login_base,
            channels,
            environment,
            prefix,
            insecure: invocation.insecure,
            stream_output: config.stream_output && !invocation.quiet,
            clean_after_install: config.clean_after_install,
            basic_auth: invocation.basic_auth,
            env,
        })
    }

    /// Channel and pattern a search or list runs with
    pub fn catalog_query(&self) -> (&Url, &str) {
        (&self.channels.catalog, &self.package.name)
    }
}

/// `server` as a URL; a bare host or host/path means https.
pub fn server_url(server: &str) -> Result<Url, UsageError> {
    let trimmed = server.trim().trim_end_matches('/');
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&candidate).map_err(|_| UsageError::InvalidServer(server.to_string()))?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(UsageError::InvalidServer(server.to_string()));
    }
    Ok(url)
}
