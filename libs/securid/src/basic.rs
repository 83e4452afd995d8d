// Copyright 2025 The ncrc Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Deprecated: channel access through credentials embedded in the URL
//!
//! The channel URL handed to conda carries `user:pass@`, which conda then
//! writes into its package metadata. Anything installed this way must be
//! scrubbed afterwards; cookie sessions are the supported path.

use crate::error::SessionError;
use crate::session::{build_client, join_path, SessionOptions, PROBE_TIMEOUT};
use ncutils::Credentials;
use reqwest::StatusCode;
use url::Url;

/// A channel URL with credentials in its userinfo
#[derive(Clone)]
pub struct EmbeddedCredentials {
    pub channel: Url,
    /// The exact `user:pass@` text as it appears in `channel`
    pub secret: String,
}

impl std::fmt::Debug for EmbeddedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut shown = self.channel.clone();
        let _ = shown.set_password(None);
        f.debug_struct("EmbeddedCredentials")
            .field("channel", &shown.as_str())
            .finish_non_exhaustive()
    }
}

/// Check `credentials` against `channel` with HTTP basic auth and return the
/// channel URL with them embedded.
pub async fn basic_auth_channel(
    channel: &Url,
    credentials: &Credentials,
    options: &SessionOptions,
) -> Result<EmbeddedCredentials, SessionError> {
    log::warn!("embedding credentials in the channel URL is deprecated; drop --basic-auth to use a cached session");

    let client = build_client(None, options)?;
    let probe = join_path(channel, &[""])?;
    let target = format!("{}://{}", channel.scheme(), channel.host_str().unwrap_or_default());

    let response = client
        .get(probe.clone())
        .basic_auth(&credentials.username, Some(&credentials.passcode))
        .timeout(PROBE_TIMEOUT)
        .send()
        .await
        .map_err(|e| SessionError::from_request(e, &target, options.proxy.as_deref()))?;

    match response.status() {
        StatusCode::OK => embed(channel, credentials),
        StatusCode::UNAUTHORIZED => Err(SessionError::InvalidCredentials),
        StatusCode::NOT_FOUND => Err(SessionError::NotFound(format!(
            "application not available at {}",
            channel
        ))),
        status => Err(SessionError::Status {
            url: probe.to_string(),
            status: status.as_u16(),
            body: String::new(),
        }),
    }
}

fn embed(channel: &Url, credentials: &Credentials) -> Result<EmbeddedCredentials, SessionError> {
    let invalid = || SessionError::Url(channel.to_string());

    let mut url = channel.clone();
    url.set_username(&credentials.username).map_err(|_| invalid())?;
    url.set_password(Some(&credentials.passcode)).map_err(|_| invalid())?;

    let secret = format!("{}:{}@", url.username(), url.password().unwrap_or_default());
    Ok(EmbeddedCredentials {
        channel: url,
        secret,
    })
}
