// Copyright 2025 The ncrc Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Session errors and the mapping from transport failures

use ncutils::PromptError;
use thiserror::Error;

/// Errors that can occur while establishing or using a session
#[derive(Debug, Error)]
pub enum SessionError {
    /// The server did not answer in time
    #[error("Unable to establish a connection to: {0}")]
    ConnectTimeout(String),

    /// A proxy is configured but connecting through it failed
    #[error("Proxy information incorrect: {0}")]
    Proxy(String),

    /// Certificate or handshake failure
    #[error("Unable to establish a secure connection to {0}. If you trust this server, you can use --insecure")]
    Tls(String),

    /// `https_proxy` cannot be understood
    #[error("Unable to determine SOCKS version from https_proxy environment variable: {0}")]
    MalformedProxy(String),

    /// Any other transport failure
    #[error("General error connecting to server: {0}")]
    Connection(String),

    /// The login form could not be fetched
    #[error("ERROR connecting to {fqdn}: HTTP {status}")]
    LoginPage { fqdn: String, status: u16 },

    #[error("ERROR reading the login form from {0}: no csrftoken field")]
    MissingCsrfToken(String),

    /// The login POST was answered with something other than 200
    #[error("ERROR authenticating to {fqdn}: HTTP {status}")]
    Rejected { fqdn: String, status: u16 },

    #[error("ERROR authenticating, credentials invalid.")]
    InvalidCredentials,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP {status} while fetching {url}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("credential prompt failed")]
    Prompt(#[from] PromptError),

    #[error("failed to update the cookie store")]
    CookieStore(#[source] anyhow::Error),

    #[error("failed to build the HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("invalid URL: {0}")]
    Url(String),
}

impl SessionError {
    /// Classify a failed request to `target`. `proxy` is the configured proxy, if any.
    pub(crate) fn from_request(err: reqwest::Error, target: &str, proxy: Option<&str>) -> Self {
        log::debug!("request to {} failed: {:?}", target, err);

        if err.is_timeout() {
            return SessionError::ConnectTimeout(target.to_string());
        }
        if is_tls_failure(&err) {
            return SessionError::Tls(target.to_string());
        }
        match proxy {
            Some(proxy) if err.is_connect() => SessionError::Proxy(proxy.to_string()),
            _ => SessionError::Connection(target.to_string()),
        }
    }

    /// Whether the user explicitly aborted the credential prompt.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, SessionError::Prompt(PromptError::Interrupted))
    }
}

/// True when the chain holds a TLS error from the connector, either directly
/// or inside an `io::Error`.
fn is_tls_failure(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<native_tls::Error>() {
            return true;
        }
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.get_ref().map_or(false, |inner| inner.is::<native_tls::Error>()) {
                return true;
            }
        }
        current = e.source();
    }
    false
}

/// Validate an `https_proxy` value the way the client will use it.
pub fn check_proxy(value: Option<&str>) -> Result<Option<String>, SessionError> {
    let value = match value.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(v) => v,
    };

    let parsed = url::Url::parse(value)
        .map_err(|_| SessionError::MalformedProxy(value.to_string()))?;

    match parsed.scheme() {
        "http" | "https" | "socks5" | "socks5h" => Ok(Some(value.to_string())),
        "socks" => Err(SessionError::MalformedProxy(value.to_string())),
        _ => Err(SessionError::Proxy(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_proxy_is_fine() {
        assert!(check_proxy(None).unwrap().is_none());
        assert!(check_proxy(Some("  ")).unwrap().is_none());
    }

    #[test]
    fn supported_proxy_schemes_pass() {
        for proxy in ["http://proxy:3128", "https://proxy:443", "socks5h://proxy:1080"] {
            assert_eq!(check_proxy(Some(proxy)).unwrap().as_deref(), Some(proxy));
        }
    }

    #[test]
    fn socks_without_version_is_malformed() {
        let err = check_proxy(Some("socks://proxy:1080")).unwrap_err();
        assert!(matches!(err, SessionError::MalformedProxy(_)));
    }

    #[test]
    fn unparsable_proxy_is_malformed() {
        let err = check_proxy(Some("proxy.example.org")).unwrap_err();
        assert!(matches!(err, SessionError::MalformedProxy(_)));
    }

    #[test]
    fn unknown_scheme_is_a_proxy_error() {
        let err = check_proxy(Some("ftp://proxy:21")).unwrap_err();
        assert!(matches!(err, SessionError::Proxy(_)));
        assert!(err.to_string().starts_with("Proxy information incorrect"));
    }

    #[test]
    fn interrupted_prompt_is_detected() {
        assert!(SessionError::Prompt(PromptError::Interrupted).is_interrupted());
        assert!(!SessionError::InvalidCredentials.is_interrupted());
    }

    mod classify {
        use crate::error::SessionError;
        use crate::session::{build_client, SessionOptions};
        use httpmock::prelude::*;
        use std::time::Duration;

        async fn failure(url: &str, timeout: Duration) -> reqwest::Error {
            let client = build_client(None, &SessionOptions::default()).unwrap();
            client.get(url).timeout(timeout).send().await.unwrap_err()
        }

        fn closed_port() -> u16 {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        }

        #[tokio::test]
        async fn refused_connection_is_a_connection_error() {
            let url = format!("http://127.0.0.1:{}/ssl/conda_packages/ncrc-moose/channeldata.json", closed_port());
            let err = failure(&url, Duration::from_secs(5)).await;

            let classified = SessionError::from_request(err, "http://127.0.0.1", None);
            assert!(matches!(classified, SessionError::Connection(_)), "{:?}", classified);
        }

        #[tokio::test]
        async fn refused_connection_through_proxy_blames_the_proxy() {
            let url = format!("http://127.0.0.1:{}/tls/ncrc-moose", closed_port());
            let err = failure(&url, Duration::from_secs(5)).await;

            let classified = SessionError::from_request(err, "http://127.0.0.1", Some("http://proxy.example.org:3128"));
            assert!(matches!(classified, SessionError::Proxy(ref p) if p == "http://proxy.example.org:3128"));
        }

        #[tokio::test]
        async fn slow_server_is_a_timeout() {
            let server = MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.method(GET).path("/slow");
                    then.status(200).delay(Duration::from_secs(3));
                })
                .await;

            let err = failure(&server.url("/slow"), Duration::from_millis(200)).await;

            let classified = SessionError::from_request(err, "http://127.0.0.1", None);
            assert!(matches!(classified, SessionError::ConnectTimeout(_)), "{:?}", classified);
        }

        #[tokio::test]
        async fn handshake_with_plain_http_server_is_tls() {
            let server = MockServer::start_async().await;
            let url = format!("https://127.0.0.1:{}/ncrc-moose/channeldata.json", server.port());
            let err = failure(&url, Duration::from_secs(5)).await;

            let classified = SessionError::from_request(err, "https://127.0.0.1", None);
            assert!(matches!(classified, SessionError::Tls(_)), "{:?}", classified);
        }
    }
}
