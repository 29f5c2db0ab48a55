//! HTTP transport backed by `ureq`.
//!
//! Authenticates against the identity service with username, password and
//! tenant, caches the bearer token and refreshes it shortly before it
//! expires.

use crate::error::{Error, Result};
use crate::transport::{Method, Response, Token, Transport};
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Mutex;
use std::time::Duration;

/// Refresh the token when it expires within this many seconds.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Path of the token endpoint.
const TOKEN_PATH: &str = "identity/api/tokens";

/// Credentials for the identity service.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub tenant: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .field("tenant", &self.tenant)
            .finish()
    }
}

/// Blocking HTTP transport.
pub struct HttpTransport {
    /// HTTP agent for requests.
    agent: ureq::Agent,
    /// API root, without trailing slash.
    base_url: String,
    credentials: Credentials,
    token: Mutex<Option<Token>>,
}

impl HttpTransport {
    /// Create a transport for the API at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, credentials: Credentials, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();

        Self {
            agent: ureq::Agent::new_with_config(config),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            token: Mutex::new(None),
        }
    }

    /// Get the API root.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Current bearer header value, authenticating when needed.
    fn bearer(&self) -> Result<String> {
        let mut cached = self
            .token
            .lock()
            .map_err(|_| Error::Transport("token cache poisoned".to_string()))?;

        let stale = cached
            .as_ref()
            .is_none_or(|token| token.expires_within(Utc::now(), TOKEN_REFRESH_MARGIN_SECS));
        if stale {
            log::debug!("Requesting a new bearer token");
            *cached = Some(self.authenticate()?);
        }

        let token = cached
            .as_ref()
            .ok_or_else(|| Error::Transport("no bearer token".to_string()))?;
        Ok(format!("Bearer {}", token.id))
    }

    fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Response> {
        let url = self.url(path);
        let bearer = self.bearer()?;
        log::debug!("{method} {url}");

        let response = match (method, body) {
            (Method::Get, _) => self
                .agent
                .get(&url)
                .header("Accept", "application/json")
                .header("Authorization", bearer.as_str())
                .call()?,
            (Method::Delete, _) => self
                .agent
                .delete(&url)
                .header("Accept", "application/json")
                .header("Authorization", bearer.as_str())
                .call()?,
            (Method::Put, Some(body)) => self
                .agent
                .put(&url)
                .header("Accept", "application/json")
                .header("Authorization", bearer.as_str())
                .send_json(body)?,
            (Method::Patch, Some(body)) => self
                .agent
                .patch(&url)
                .header("Accept", "application/json")
                .header("Authorization", bearer.as_str())
                .send_json(body)?,
            (Method::Post, Some(body)) => self
                .agent
                .post(&url)
                .header("Accept", "application/json")
                .header("Authorization", bearer.as_str())
                .send_json(body)?,
            (_, None) => {
                return Err(Error::Transport(format!("{method} {url} requires a body")));
            }
        };

        read_response(response)
    }
}

fn read_response(mut response: ureq::http::Response<ureq::Body>) -> Result<Response> {
    let status = response.status().as_u16();
    let location = response
        .headers()
        .get("location")
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);
    let body = response.body_mut().read_to_string()?;
    log::trace!("HTTP {status}: {body}");

    Ok(Response {
        status,
        body,
        location,
    })
}

impl Transport for HttpTransport {
    fn get(&self, path: &str) -> Result<Response> {
        self.send(Method::Get, path, None)
    }

    fn post(&self, path: &str, body: &Value) -> Result<Response> {
        self.send(Method::Post, path, Some(body))
    }

    fn put(&self, path: &str, body: &Value) -> Result<Response> {
        self.send(Method::Put, path, Some(body))
    }

    fn patch(&self, path: &str, body: &Value) -> Result<Response> {
        self.send(Method::Patch, path, Some(body))
    }

    fn delete(&self, path: &str) -> Result<Response> {
        self.send(Method::Delete, path, None)
    }

    fn authenticate(&self) -> Result<Token> {
        let body = json!({
            "username": self.credentials.username,
            "password": self.credentials.password,
            "tenant": self.credentials.tenant,
        });

        let response = self
            .agent
            .post(&self.url(TOKEN_PATH))
            .header("Accept", "application/json")
            .send_json(&body)?;

        let token: Token = read_response(response)?.json()?;
        log::info!(
            "Authenticated as {} on tenant {}",
            self.credentials.username,
            self.credentials.tenant
        );
        Ok(token)
    }
}
