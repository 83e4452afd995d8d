// Copyright 2025 The ncrc Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! The five user commands

use crate::channel::{fetch_artifact, Artifact};
use crate::conda::{meets_minimum, parse_catalog, parse_version, Conda, PackageRecord, SearchOutcome, MINIMUM_VERSION};
use crate::scrub::scrub_installed;
use crate::settings::{Command, Settings};
use anyhow::{bail, Context, Result};
use ncutils::{ensure_dir, safe_write, OutputMode};
use securid::{basic_auth_channel, CookieStore, CredentialSource, EmbeddedCredentials, Session, SessionOptions};
use std::path::PathBuf;

/// Cookie store and HTTP options for the commands that talk to the server
#[derive(Debug, Clone)]
pub struct Network {
    pub store: CookieStore,
    pub options: SessionOptions,
}

impl Network {
    /// `~/.RSASecureID_login` and the proxy from the environment.
    pub fn from_env(insecure: bool) -> Result<Self> {
        Ok(Self {
            store: CookieStore::default_location()?,
            options: SessionOptions::from_env(insecure)?,
        })
    }
}

pub struct Client {
    settings: Settings,
    conda: Conda,
    network: Option<Network>,
    /// Where downloaded package files are kept
    cache: PathBuf,
}

impl Client {
    /// A client using the real conda and cache dir. The cookie store and
    /// proxy are only set up for commands that download.
    pub fn new(settings: Settings) -> Result<Self> {
        let output = if settings.stream_output {
            OutputMode::Inherit
        } else {
            OutputMode::Suppress
        };
        let conda = Conda::from_env(settings.insecure, output);
        let network = if settings.command.uses_network() {
            Some(Network::from_env(settings.insecure)?)
        } else {
            None
        };
        let cache = ncutils::config::cache_dir("ncrc");

        Ok(Self::with_parts(settings, conda, network, cache))
    }

    pub fn with_parts(settings: Settings, conda: Conda, network: Option<Network>, cache: PathBuf) -> Self {
        Self {
            settings,
            conda,
            network,
            cache,
        }
    }

    fn network(&self) -> Result<&Network> {
        self.network
            .as_ref()
            .context("no network settings for this command")
    }

    pub async fn run(&self, credentials: &mut dyn CredentialSource) -> Result<()> {
        match self.settings.command {
            Command::Install => self.install(credentials).await,
            Command::Update => self.update(credentials).await,
            Command::Remove => {
                self.remove();
                Ok(())
            }
            Command::Search => self.search().await,
            Command::List => self.list().await,
        }
    }

    async fn install(&self, credentials: &mut dyn CredentialSource) -> Result<()> {
        self.check_conda_version().await?;

        let app = &self.settings.package.application;
        let env = &self.settings.environment;
        println!("Installing {}, this can take a very long time. Please be patient...", app);

        if self.settings.basic_auth {
            let embedded = self.embedded_channel(credentials).await?;
            let channels = self.settings.channels.install_order(&embedded.channel);
            self.conda
                .create_environment(env, &channels, &[self.settings.package.match_spec()])
                .await
                .with_context(|| format!("There was an error installing {}", app))?;
            self.scrub(&embedded).await?;
        } else {
            let session = self.session(credentials).await?;
            let (record, path) = self.fetch_newest(&session).await?;

            self.conda
                .create_environment(env, &self.settings.channels.fallbacks, &record.depends)
                .await
                .with_context(|| format!("There was an error installing {}", app))?;
            println!("Installing {}...", record.filename);
            self.conda
                .install_into(env, &path)
                .await
                .with_context(|| format!("There was an error installing {}", app))?;
        }

        self.clean().await?;
        println!(
            "{} installed. To use, switch to the same named environment:\n\n\tconda activate {}",
            app, env
        );
        Ok(())
    }

    async fn update(&self, credentials: &mut dyn CredentialSource) -> Result<()> {
        let app = &self.settings.package.application;
        let env = &self.settings.environment;

        if self.settings.basic_auth {
            let embedded = self.embedded_channel(credentials).await?;
            let channels = self.settings.channels.install_order(&embedded.channel);
            self.conda
                .update_environment(env, &channels)
                .await
                .with_context(|| format!("There was an error updating {}", app))?;
            self.scrub(&embedded).await?;
        } else {
            let session = self.session(credentials).await?;
            self.conda
                .update_environment(env, &self.settings.channels.fallbacks)
                .await
                .with_context(|| format!("There was an error updating {}", app))?;

            let (record, path) = self.fetch_newest(&session).await?;
            println!("Installing {}...", record.filename);
            self.conda
                .install_into(env, &path)
                .await
                .with_context(|| format!("There was an error updating {}", app))?;
        }

        self.clean().await?;
        println!("{} updated, or was already up-to-date", app);
        Ok(())
    }

    fn remove(&self) {
        println!(
            "Due to the way ncrc wraps itself into conda commands, it is best to\n\
             remove the environment in which the application is installed. Begin\n\
             by deactivating the application environment and then remove it:\n\n\
             \tconda deactivate\n\tconda env remove -n {}",
            self.settings.package.application
        );
    }

    async fn search(&self) -> Result<()> {
        let (channel, pattern) = self.settings.catalog_query();
        match self.conda.search(channel, pattern, true).await {
            SearchOutcome::Matches(_) => {}
            SearchOutcome::NoMatches => {
                println!("No NCRC applications match '{}'", self.settings.package.application)
            }
            SearchOutcome::ToolFailed(reason) => eprintln!("WARNING: search failed: {}", reason),
        }
        Ok(())
    }

    async fn list(&self) -> Result<()> {
        println!("{}", format_catalog(&self.catalog().await));
        Ok(())
    }

    /// Application names on the catalog channel, unprefixed and sorted.
    /// Empty when conda finds nothing or fails.
    pub async fn catalog(&self) -> Vec<String> {
        let (channel, pattern) = self.settings.catalog_query();
        match self.conda.search(channel, pattern, false).await {
            SearchOutcome::Matches(stdout) => parse_catalog(&stdout, &self.settings.prefix),
            SearchOutcome::NoMatches => Vec::new(),
            SearchOutcome::ToolFailed(reason) => {
                eprintln!("WARNING: listing failed: {}", reason);
                Vec::new()
            }
        }
    }

    async fn check_conda_version(&self) -> Result<()> {
        let reported = self.conda.version().await?;
        let version = parse_version(&reported)
            .with_context(|| format!("unexpected `conda --version` output: {}", reported))?;

        if !meets_minimum(version) {
            bail!(
                "Conda out of date:\t{}\nRequired version:\t{}\nPlease update Conda:\n\n\t`conda update conda`",
                dotted(version),
                dotted(MINIMUM_VERSION)
            );
        }
        log::debug!("conda {} is recent enough", dotted(version));
        Ok(())
    }

    /// A session authorized for the package's own channel
    async fn session(&self, credentials: &mut dyn CredentialSource) -> Result<Session> {
        let network = self.network()?;
        let mut session = Session::new(
            self.settings.login_base.clone(),
            network.store.clone(),
            network.options.clone(),
        )?;
        let how = session
            .ensure(&self.settings.channels.primary, credentials)
            .await?;
        log::info!("{:?} session for {}", how, session.fqdn());
        Ok(session)
    }

    /// Resolve the newest matching package and download it into the cache.
    async fn fetch_newest(&self, session: &Session) -> Result<(PackageRecord, PathBuf)> {
        println!("Trying to figure out what to download. Sometimes this can take a while...");
        let package = &self.settings.package;
        let record = self
            .conda
            .resolve(&self.settings.channels.resolve_order(), &package.name, &package.match_spec())
            .await?;

        let artifact = fetch_artifact(session, &self.settings.channels, &record.subdir, &record.filename).await?;
        let path = self.store_artifact(&record, &artifact)?;
        Ok((record, path))
    }

    fn store_artifact(&self, record: &PackageRecord, artifact: &Artifact) -> Result<PathBuf> {
        if artifact.from_archive {
            println!("{} was found in the archive channel", record.filename);
        }
        let dir = self.cache.join(&record.subdir);
        ensure_dir(&dir)?;
        let path = dir.join(&record.filename);
        safe_write(&path, &artifact.bytes)?;
        log::info!("saved {} to {}", artifact.url, path.display());
        Ok(path)
    }

    async fn embedded_channel(&self, credentials: &mut dyn CredentialSource) -> Result<EmbeddedCredentials> {
        let supplied = credentials.credentials()?;
        let embedded = basic_auth_channel(&self.settings.channels.primary, &supplied, &self.network()?.options).await?;
        Ok(embedded)
    }

    async fn scrub(&self, embedded: &EmbeddedCredentials) -> Result<()> {
        let info = self.conda.info().await?;
        let Some(prefix) = info.environment_prefix(&self.settings.environment) else {
            log::warn!(
                "environment {} not found, credentials may remain in its metadata",
                self.settings.environment
            );
            return Ok(());
        };

        let report = scrub_installed(&prefix, &info.pkgs_dirs, &self.settings.package.name, &embedded.secret)?;
        for path in &report.skipped {
            eprintln!("WARNING: could not remove credentials from {}", path.display());
        }
        Ok(())
    }

    async fn clean(&self) -> Result<()> {
        if self.settings.clean_after_install {
            self.conda.clean().await?;
        }
        Ok(())
    }
}

fn dotted(version: [u64; 3]) -> String {
    version.map(|part| part.to_string()).join(".")
}

/// The `list` listing: a short header followed by one tab-indented name per line.
pub fn format_catalog(names: &[String]) -> String {
    let mut out = String::from(
        "# Use 'ncrc search name-of-application' to list more detail\n# NCRC applications available:\n",
    );
    for name in names {
        out.push('\n');
        out.push('\t');
        out.push_str(name);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_listing_is_indented_under_header() {
        let listing = format_catalog(&["bison".to_string(), "moose".to_string()]);
        let lines: Vec<&str> = listing.lines().collect();

        assert!(lines[0].starts_with("# Use 'ncrc search"));
        assert_eq!(lines[1], "# NCRC applications available:");
        assert_eq!(&lines[3..], ["\tbison", "\tmoose"]);
    }

    #[test]
    fn only_downloading_commands_read_the_proxy() {
        use crate::settings::{ClientConfig, EnvSnapshot, Invocation};

        let settings = |command| {
            Settings::resolve(
                command,
                Invocation {
                    application: Some("moose".into()),
                    ..Invocation::default()
                },
                &ClientConfig::default(),
                EnvSnapshot {
                    conda_default_env: Some("base".into()),
                    ncrc_app: None,
                },
            )
            .unwrap()
        };

        let previous = std::env::var_os("https_proxy");
        std::env::set_var("https_proxy", "socks://proxy.example.org:1080");

        let remove = Client::new(settings(Command::Remove));
        let search = Client::new(settings(Command::Search));
        let install = Client::new(settings(Command::Install));

        match previous {
            Some(value) => std::env::set_var("https_proxy", value),
            None => std::env::remove_var("https_proxy"),
        }

        assert!(remove.is_ok());
        assert!(search.is_ok());
        let err = install.err().unwrap();
        assert!(err.to_string().contains("Unable to determine SOCKS version"), "{:#}", err);
    }

    #[test]
    fn dotted_version() {
        assert_eq!(dotted(MINIMUM_VERSION), "23.11.0");
    }
}
