// Copyright 2025 The ncrc Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Channel URLs and artifact downloads with the archive fallback

use crate::settings::ClientConfig;
use securid::{join_path, Session, SessionError};
use thiserror::Error;
use url::Url;

/// Suffix of the channel keeping releases no longer in the primary channel
pub const ARCHIVE_SUFFIX: &str = "-archive";

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("{filename} was not found in {primary} nor in {archive}")]
    NotFound {
        filename: String,
        primary: Url,
        archive: Url,
    },

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Every channel a command may talk to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channels {
    /// `<server>/<package>`, protected by the login
    pub primary: Url,
    /// `<server>/<package>-archive`
    pub archive: Url,
    /// `<server>/ncrc-applications`, used for search, list and resolving
    pub catalog: Url,
    /// Channels appended after the primary one, in priority order
    pub fallbacks: Vec<String>,
}

impl Channels {
    pub fn new(server: &Url, package: &str, config: &ClientConfig) -> Result<Self, SessionError> {
        let public = join_path(server, &[config.public_channel.as_str()])?;
        let archive = format!("{}{}", package, ARCHIVE_SUFFIX);

        Ok(Self {
            primary: join_path(server, &[package])?,
            archive: join_path(server, &[archive.as_str()])?,
            catalog: join_path(server, &[config.catalog_channel.as_str()])?,
            fallbacks: vec![public.to_string(), config.community_channel.clone()],
        })
    }

    /// Catalog followed by the fallbacks, for resolving a package
    pub fn resolve_order(&self) -> Vec<String> {
        std::iter::once(self.catalog.to_string())
            .chain(self.fallbacks.iter().cloned())
            .collect()
    }

    /// `primary` (or any replacement for it) followed by the fallbacks
    pub fn install_order(&self, primary: &Url) -> Vec<String> {
        std::iter::once(primary.to_string())
            .chain(self.fallbacks.iter().cloned())
            .collect()
    }
}

/// A downloaded package file
#[derive(Debug, Clone)]
pub struct Artifact {
    pub url: Url,
    pub bytes: Vec<u8>,
    pub from_archive: bool,
}

/// Download `subdir/filename` from the primary channel, trying the archive
/// channel once if the primary answers 404.
pub async fn fetch_artifact(
    session: &Session,
    channels: &Channels,
    subdir: &str,
    filename: &str,
) -> Result<Artifact, ChannelError> {
    let primary = join_path(&channels.primary, &[subdir, filename])?;

    match session.download(&primary).await {
        Ok(bytes) => {
            return Ok(Artifact {
                url: primary,
                bytes,
                from_archive: false,
            })
        }
        Err(SessionError::NotFound(_)) => {
            log::info!("{} not in {}, trying the archive", filename, channels.primary);
        }
        Err(e) => return Err(e.into()),
    }

    let archive = join_path(&channels.archive, &[subdir, filename])?;
    match session.download(&archive).await {
        Ok(bytes) => Ok(Artifact {
            url: archive,
            bytes,
            from_archive: true,
        }),
        Err(SessionError::NotFound(_)) => Err(ChannelError::NotFound {
            filename: filename.to_string(),
            primary: channels.primary.clone(),
            archive: channels.archive.clone(),
        }),
        Err(e) => Err(e.into()),
    }
}
