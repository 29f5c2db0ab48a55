//! Transport seam between the catalog logic and the remote API.
//!
//! Everything above this module talks to a [`Transport`]: paths relative to
//! the API root go in, raw status/body pairs come out. Non-2xx statuses are
//! returned as responses, not errors, so callers decide which ones matter;
//! only connection-level failures are `Err`.
//!
//! [`http::HttpTransport`] is the real implementation. Use [`MockTransport`]
//! for tests:
//!
//! ```
//! use catalogkit::transport::{MockTransport, Transport};
//! use serde_json::json;
//!
//! let mock = MockTransport::new();
//! mock.on_get("catalog-service/api/consumer/requests/r-1", json!({"id": "r-1", "phase": "SUCCESSFUL"}));
//!
//! let response = mock.get("catalog-service/api/consumer/requests/r-1").unwrap();
//! assert!(response.is_success());
//! ```

pub mod http;

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// HTTP method of a transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// Raw response of a transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
    /// `Location` header, set by the API on created requests.
    pub location: Option<String>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            location: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into [`Error::Api`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::Api {
                status: self.status,
                message: api_error_message(&self.body),
            })
        }
    }

    /// Deserialize the body of a 2xx response.
    pub fn json<T: DeserializeOwned>(self) -> Result<T> {
        let response = self.error_for_status()?;
        Ok(serde_json::from_str(&response.body)?)
    }
}

#[derive(Deserialize)]
struct ApiErrors {
    #[serde(default)]
    errors: Vec<ApiErrorEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiErrorEntry {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    system_message: Option<String>,
}

/// Extract the human-readable message from an API error body.
fn api_error_message(body: &str) -> String {
    let messages: Vec<String> = serde_json::from_str::<ApiErrors>(body)
        .map(|parsed| {
            parsed
                .errors
                .into_iter()
                .filter_map(|e| e.system_message.or(e.message))
                .collect()
        })
        .unwrap_or_default();

    if messages.is_empty() {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            "empty response body".to_string()
        } else {
            trimmed.to_string()
        }
    } else {
        messages.join("; ")
    }
}

/// Bearer token issued by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Token {
    pub id: String,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
}

impl Token {
    /// Whether the token expires within `margin_secs` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin_secs: i64) -> bool {
        self.expires
            .is_some_and(|expires| expires - chrono::Duration::seconds(margin_secs) <= now)
    }
}

/// Transport trait for the catalog API.
///
/// Paths are relative to the API root, e.g.
/// `catalog-service/api/consumer/requests/{id}`.
pub trait Transport: Send + Sync {
    /// Issue a GET request.
    fn get(&self, path: &str) -> Result<Response>;

    /// Issue a POST request with a JSON body.
    fn post(&self, path: &str, body: &Value) -> Result<Response>;

    /// Issue a PUT request with a JSON body.
    fn put(&self, path: &str, body: &Value) -> Result<Response>;

    /// Issue a PATCH request with a JSON body.
    fn patch(&self, path: &str, body: &Value) -> Result<Response>;

    /// Issue a DELETE request.
    fn delete(&self, path: &str) -> Result<Response>;

    /// Obtain a bearer token for subsequent calls.
    fn authenticate(&self) -> Result<Token>;
}

/// Percent-encode one path segment (an id or tenant name).
pub fn segment(raw: &str) -> Cow<'_, str> {
    urlencoding::encode(raw)
}

/// GET `path` and deserialize the 2xx body.
pub fn get_json<T: DeserializeOwned>(transport: &dyn Transport, path: &str) -> Result<T> {
    log::debug!("GET {path}");
    transport.get(path)?.json()
}

// =============================================================================
// Mock transport
// =============================================================================

/// A canned reply: a response, or a connection-level failure.
#[derive(Debug, Clone)]
pub enum MockReply {
    Response(Response),
    Failure(String),
}

/// A call the mock received.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

#[derive(Debug, Default)]
struct MockState {
    routes: HashMap<(Method, String), VecDeque<MockReply>>,
    calls: Vec<RecordedCall>,
}

/// In-memory transport for testing without network access.
///
/// Replies are queued per method and path and consumed in order; the last
/// reply of a queue is repeated for any further call. Unrouted paths answer
/// 404. Clones share state, so a test can keep a handle for inspecting calls
/// after boxing another into a client.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a new empty mock transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `method` on `path`.
    pub fn push(&self, method: Method, path: impl Into<String>, reply: MockReply) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .routes
            .entry((method, path.into()))
            .or_default()
            .push_back(reply);
    }

    /// Queue a 200 JSON reply for GET on `path`.
    pub fn on_get(&self, path: impl Into<String>, body: Value) {
        self.push(Method::Get, path, MockReply::Response(Response::new(200, body.to_string())));
    }

    /// Queue a 201 JSON reply for POST on `path`.
    pub fn on_post(&self, path: impl Into<String>, body: Value) {
        self.push(Method::Post, path, MockReply::Response(Response::new(201, body.to_string())));
    }

    /// Queue a raw response for `method` on `path`.
    pub fn on_response(&self, method: Method, path: impl Into<String>, response: Response) {
        self.push(method, path, MockReply::Response(response));
    }

    /// Queue a connection failure for `method` on `path`.
    pub fn on_failure(&self, method: Method, path: impl Into<String>, message: impl Into<String>) {
        self.push(method, path, MockReply::Failure(message.into()));
    }

    /// All calls received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).calls.clone()
    }

    /// Calls received for `method` on `path`.
    pub fn calls_to(&self, method: Method, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.method == method && call.path == path)
            .collect()
    }

    fn dispatch(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Response> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.calls.push(RecordedCall {
            method,
            path: path.to_string(),
            body: body.cloned(),
        });

        let reply = match state.routes.get_mut(&(method, path.to_string())) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };

        match reply {
            Some(MockReply::Response(response)) => Ok(response),
            Some(MockReply::Failure(message)) => Err(Error::Transport(message)),
            None => Ok(Response::new(
                404,
                format!(r#"{{"errors":[{{"message":"no mock route for {method} {path}"}}]}}"#),
            )),
        }
    }
}

impl Transport for MockTransport {
    fn get(&self, path: &str) -> Result<Response> {
        self.dispatch(Method::Get, path, None)
    }

    fn post(&self, path: &str, body: &Value) -> Result<Response> {
        self.dispatch(Method::Post, path, Some(body))
    }

    fn put(&self, path: &str, body: &Value) -> Result<Response> {
        self.dispatch(Method::Put, path, Some(body))
    }

    fn patch(&self, path: &str, body: &Value) -> Result<Response> {
        self.dispatch(Method::Patch, path, Some(body))
    }

    fn delete(&self, path: &str) -> Result<Response> {
        self.dispatch(Method::Delete, path, None)
    }

    fn authenticate(&self) -> Result<Token> {
        Ok(Token {
            id: "mock-token".to_string(),
            expires: None,
        })
    }
}
