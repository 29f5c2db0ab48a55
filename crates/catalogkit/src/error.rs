//! Error types for catalog operations.
//!
//! Errors are grouped into categories so callers can tell a user input
//! problem (a name that resolves to nothing, an unroutable configuration key)
//! from a remote fault or a request that simply has not finished yet.

use std::fmt;

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of catalog errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A name or id could not be resolved, or resolved inconsistently.
    Resolution,
    /// The configuration does not fit the template.
    Validation,
    /// A day-two action is not entitled on a resource.
    Entitlement,
    /// The remote API rejected a call or a request ended in failure.
    Remote,
    /// The polling budget ran out before the request finished.
    Timeout,
    /// Connectivity problems (transient, retryable).
    Network,
    /// Unexpected response shape.
    Format,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Resolution => "Catalog lookup failed",
            Self::Validation => "Invalid configuration",
            Self::Entitlement => "Action not entitled",
            Self::Remote => "Remote request failed",
            Self::Timeout => "Request still running",
            Self::Network => "Network connectivity issue",
            Self::Format => "Invalid response format",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Resolution => "Check the catalog item and business group names and ids",
            Self::Validation => "Prefix each resource_configuration key with a component name from the catalog item",
            Self::Entitlement => "Ask an administrator to entitle the action for this catalog item",
            Self::Remote => "Check the request details in the catalog portal",
            Self::Timeout => "The request keeps running remotely; run `read` later to refresh its state",
            Self::Network => "Check connectivity to the catalog host and try again",
            Self::Format => "The server answered with an unexpected payload",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Nothing matched a name or id.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// What was looked up ("catalog item", "business group").
        kind: &'static str,
        /// The name or id that was looked up.
        name: String,
    },

    /// A name only matched other entries by prefix.
    #[error("{} catalog items match '{name}': {}", .matches.len(), .matches.join(", "))]
    AmbiguousName {
        /// The requested name.
        name: String,
        /// Every entry whose name starts with the requested name.
        matches: Vec<String>,
    },

    /// A user-supplied name and id point at different entries.
    #[error("{kind} name '{name}' resolves to id '{resolved}', which conflicts with the configured id '{id}'")]
    Conflict {
        /// What was cross-checked.
        kind: &'static str,
        /// Configured name.
        name: String,
        /// Configured id.
        id: String,
        /// Id the name resolved to.
        resolved: String,
    },

    /// Configuration keys that cannot be routed to a template component.
    #[error("{}", describe_invalid_keys(.unknown, .malformed, .components))]
    InvalidConfigurationKeys {
        /// Keys whose prefix matches no component.
        unknown: Vec<String>,
        /// Keys of the form `<component>.` with an empty property.
        malformed: Vec<String>,
        /// Component names available in the template.
        components: Vec<String>,
    },

    /// The resource definition itself is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A required day-two operation is not available on a resource.
    #[error("{operation} is not entitled for resource '{resource}'")]
    Entitlement {
        /// Resource (or deployment) name.
        resource: String,
        /// Operation name.
        operation: String,
    },

    /// Non-2xx response from the remote API.
    #[error("API error (HTTP {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Remote error message.
        message: String,
    },

    /// The request reached a failed terminal phase.
    #[error("request {request_id} failed: {message}")]
    RequestFailed {
        /// Request id.
        request_id: String,
        /// Completion details from the remote system.
        message: String,
    },

    /// The request did not reach a terminal phase within the budget.
    #[error("request {request_id} still {last_phase} after {minutes} minute(s)")]
    Timeout {
        /// Request id.
        request_id: String,
        /// Wait budget in minutes.
        minutes: u64,
        /// Last observed phase.
        last_phase: String,
    },

    /// Status polling failed too many times in a row.
    #[error("status polling for request {request_id} failed {attempts} times in a row: {last}")]
    TransientPoll {
        /// Request id.
        request_id: String,
        /// Consecutive failed polls.
        attempts: u32,
        /// Last transport error.
        last: String,
    },

    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body could not be understood.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),
}

fn describe_invalid_keys(unknown: &[String], malformed: &[String], components: &[String]) -> String {
    let mut parts = Vec::new();
    if !unknown.is_empty() {
        parts.push(format!(
            "configuration keys match no component: {}",
            unknown.join(", ")
        ));
    }
    if !malformed.is_empty() {
        parts.push(format!(
            "configuration keys have an empty property name: {}",
            malformed.join(", ")
        ));
    }
    format!(
        "{} (components in template: {})",
        parts.join("; "),
        components.join(", ")
    )
}

impl Error {
    /// Create a not-found error.
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NotFound { .. } | Error::AmbiguousName { .. } | Error::Conflict { .. } => {
                ErrorCategory::Resolution
            }
            Error::InvalidConfigurationKeys { .. } | Error::InvalidConfig(_) => {
                ErrorCategory::Validation
            }
            Error::Entitlement { .. } => ErrorCategory::Entitlement,
            Error::Api { .. } | Error::RequestFailed { .. } => ErrorCategory::Remote,
            Error::Timeout { .. } => ErrorCategory::Timeout,
            Error::TransientPoll { .. } | Error::Transport(_) => ErrorCategory::Network,
            Error::InvalidResponse(_) => ErrorCategory::Format,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Api {
                status: code,
                message: format!("HTTP {code}"),
            },
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}
