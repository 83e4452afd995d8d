// Copyright 2025 The ncrc Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Cookie-first SecurID sessions
//!
//! A [`Session`] starts from whatever cookie is cached for its host. Before
//! it is used against a channel, [`Session::ensure`] probes the channel's
//! `channeldata.json`; only when that probe is refused does it walk the web
//! login form and cache the new cookie.

use crate::cookie::{CookieStore, Cookies};
use crate::error::{check_proxy, SessionError};
use ncutils::{Credentials, PromptError};
use regex::Regex;
use reqwest::cookie::{CookieStore as _, Jar};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Resource requested to decide whether a cached cookie is still good
pub const PROBE_RESOURCE: &str = "channeldata.json";

/// Path of the login form, relative to the host root
pub const LOGIN_PATH: &str = "webauthentication";

/// Text the login response carries when the passcode was accepted
pub const SUCCESS_MARKER: &str = "Authentication Succeeded";

const CSRF_PATTERN: &str = r#"name="csrftoken" value="(\w+)"#;

pub(crate) const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Supplies credentials when a login is needed
pub trait CredentialSource {
    fn credentials(&mut self) -> Result<Credentials, PromptError>;
}

/// Prompts on the controlling terminal
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl CredentialSource for TerminalPrompt {
    fn credentials(&mut self) -> Result<Credentials, PromptError> {
        ncutils::prompt_credentials()
    }
}

/// How a session was made usable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authentication {
    /// The cached cookie was accepted
    Cached,
    /// A fresh login was performed and cached
    LoggedIn,
}

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Skip TLS certificate verification
    pub insecure: bool,
    /// Validated proxy URL
    pub proxy: Option<String>,
}

impl SessionOptions {
    /// Options with the proxy taken from `https_proxy` / `HTTPS_PROXY`.
    pub fn from_env(insecure: bool) -> Result<Self, SessionError> {
        let raw = std::env::var("https_proxy")
            .or_else(|_| std::env::var("HTTPS_PROXY"))
            .ok();
        Ok(Self {
            insecure,
            proxy: check_proxy(raw.as_deref())?,
        })
    }
}

pub(crate) fn build_client(
    jar: Option<Arc<Jar>>,
    options: &SessionOptions,
) -> Result<Client, SessionError> {
    let mut builder = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(format!("ncrc/{}", env!("CARGO_PKG_VERSION")))
        .danger_accept_invalid_certs(options.insecure);

    if let Some(jar) = jar {
        builder = builder.cookie_provider(jar);
    }

    builder = match &options.proxy {
        Some(proxy) => {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|_| SessionError::MalformedProxy(proxy.clone()))?
                .no_proxy(reqwest::NoProxy::from_env());
            builder.proxy(proxy)
        }
        None => builder.no_proxy(),
    };

    builder.build().map_err(SessionError::Client)
}

/// Append path segments to `base`, ignoring a trailing slash on it.
pub fn join_path(base: &Url, segments: &[&str]) -> Result<Url, SessionError> {
    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| SessionError::Url(base.to_string()))?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

/// Extract the CSRF token from the login form.
pub fn csrf_token(body: &str) -> Option<String> {
    let pattern = Regex::new(CSRF_PATTERN).ok()?;
    pattern
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub struct Session {
    base: Url,
    fqdn: String,
    options: SessionOptions,
    store: CookieStore,
    jar: Arc<Jar>,
    client: Client,
}

impl Session {
    /// A session for the host of `base`, seeded from its cached cookie.
    pub fn new(base: Url, store: CookieStore, options: SessionOptions) -> Result<Self, SessionError> {
        let fqdn = base
            .host_str()
            .ok_or_else(|| SessionError::Url(base.to_string()))?
            .to_string();

        let cached = store.load(&fqdn);
        let jar = Arc::new(Jar::default());
        for (name, value) in cached.iter() {
            jar.add_cookie_str(&format!("{}={}; Path=/", name, value), &base);
        }
        log::debug!("loaded {} cached cookie(s) for {}", cached.len(), fqdn);

        let client = build_client(Some(jar.clone()), &options)?;

        Ok(Self {
            base,
            fqdn,
            options,
            store,
            jar,
            client,
        })
    }

    pub fn fqdn(&self) -> &str {
        &self.fqdn
    }

    /// Cookies currently held for this host
    pub fn cookies(&self) -> Cookies {
        self.jar
            .cookies(&self.base)
            .and_then(|value| value.to_str().ok().map(Cookies::from_header))
            .unwrap_or_default()
    }

    /// Make sure requests to `channel` are authorized, logging in if needed.
    pub async fn ensure(
        &mut self,
        channel: &Url,
        source: &mut dyn CredentialSource,
    ) -> Result<Authentication, SessionError> {
        if self.is_valid(channel).await? {
            log::info!("reusing cached session for {}", self.fqdn);
            return Ok(Authentication::Cached);
        }

        self.reset()?;
        self.login(source).await?;
        let path = self.store.save(&self.fqdn, &self.cookies())?;
        log::info!("session for {} cached in {}", self.fqdn, path.display());

        Ok(Authentication::LoggedIn)
    }

    /// Whether the current cookie grants access to `channel`'s metadata.
    pub async fn is_valid(&self, channel: &Url) -> Result<bool, SessionError> {
        let url = join_path(channel, &[PROBE_RESOURCE])?;
        let response = self
            .send(self.client.get(url.clone()).timeout(PROBE_TIMEOUT))
            .await?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        log::debug!("probe {} -> {} ({})", url, status, content_type);

        Ok(status == StatusCode::OK && content_type.contains("application"))
    }

    /// GET `url` with the session cookie and return the body.
    ///
    /// A 404 is reported as [`SessionError::NotFound`] so callers can fall back.
    pub async fn download(&self, url: &Url) -> Result<Vec<u8>, SessionError> {
        let response = self
            .send(self.client.get(url.clone()).timeout(DOWNLOAD_TIMEOUT))
            .await?;

        match response.status() {
            StatusCode::OK => {
                let bytes = response.bytes().await.map_err(|e| self.transport(e))?;
                log::debug!("downloaded {} bytes from {}", bytes.len(), url);
                Ok(bytes.to_vec())
            }
            StatusCode::NOT_FOUND => Err(SessionError::NotFound(url.to_string())),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(SessionError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                    body: body.trim().to_string(),
                })
            }
        }
    }

    async fn login(&mut self, source: &mut dyn CredentialSource) -> Result<(), SessionError> {
        let login_url = join_path(&self.base, &[LOGIN_PATH])?;

        let response = self
            .send(self.client.get(login_url.clone()).timeout(REQUEST_TIMEOUT))
            .await?;
        if response.status() != StatusCode::OK {
            return Err(SessionError::LoginPage {
                fqdn: self.fqdn.clone(),
                status: response.status().as_u16(),
            });
        }
        let form = response.text().await.map_err(|e| self.transport(e))?;
        let token = csrf_token(&form).ok_or_else(|| SessionError::MissingCsrfToken(self.fqdn.clone()))?;

        let credentials = source.credentials()?;
        let fields = [
            ("csrftoken", token.as_str()),
            ("username", credentials.username.as_str()),
            ("passcode", credentials.passcode.as_str()),
        ];

        let response = self
            .send(self.client.post(login_url).form(&fields).timeout(REQUEST_TIMEOUT))
            .await?;
        if response.status() != StatusCode::OK {
            return Err(SessionError::Rejected {
                fqdn: self.fqdn.clone(),
                status: response.status().as_u16(),
            });
        }
        let body = response.text().await.map_err(|e| self.transport(e))?;
        if !body.contains(SUCCESS_MARKER) {
            return Err(SessionError::InvalidCredentials);
        }

        log::info!("authenticated to {} as {}", self.fqdn, credentials.username);
        Ok(())
    }

    /// Drop every cookie held in memory.
    fn reset(&mut self) -> Result<(), SessionError> {
        self.jar = Arc::new(Jar::default());
        self.client = build_client(Some(self.jar.clone()), &self.options)?;
        Ok(())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, SessionError> {
        request.send().await.map_err(|e| self.transport(e))
    }

    fn transport(&self, err: reqwest::Error) -> SessionError {
        let target = format!("{}://{}", self.base.scheme(), self.fqdn);
        SessionError::from_request(err, &target, self.options.proxy.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_csrf_token_in_form() {
        let form = r#"<form method="post">
            <input type="hidden" name="csrftoken" value="a1B2c3_d4">
            <input name="username">
        </form>"#;
        assert_eq!(csrf_token(form).as_deref(), Some("a1B2c3_d4"));
    }

    #[test]
    fn form_without_token_yields_none() {
        assert!(csrf_token("<form><input name=\"username\"></form>").is_none());
    }

    #[test]
    fn join_path_appends_segments() {
        let base = Url::parse("https://conda.example.org/ssl/ncrc-moose").unwrap();
        let url = join_path(&base, &["linux-64", "ncrc-moose-1.0-0.conda"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://conda.example.org/ssl/ncrc-moose/linux-64/ncrc-moose-1.0-0.conda"
        );
    }

    #[test]
    fn join_path_ignores_trailing_slash() {
        let base = Url::parse("https://conda.example.org/").unwrap();
        let url = join_path(&base, &[LOGIN_PATH]).unwrap();
        assert_eq!(url.as_str(), "https://conda.example.org/webauthentication");
    }

    #[test]
    fn session_is_keyed_by_host() {
        let dir = tempfile::tempdir().unwrap();
        let base = Url::parse("https://conda.example.org:8443/").unwrap();
        let session = Session::new(base, CookieStore::new(dir.path()), SessionOptions::default()).unwrap();

        assert_eq!(session.fqdn(), "conda.example.org");
        assert!(session.cookies().is_empty());
    }
}
