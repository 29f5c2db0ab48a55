//! Request submission and status polling.
//!
//! A submitted request is polled at a fixed interval until it reaches a
//! terminal phase or the wait budget runs out. Every observed phase is
//! written into the caller's [`RequestRecord`], so the record is accurate
//! even when polling ends in an error.

use crate::error::{Error, Result};
use crate::transport::{Response, Transport, get_json, segment};
use crate::types::{
    CatalogRequest, DEFAULT_WAIT_TIMEOUT_MINUTES, Phase, RequestHandle, RequestRecord,
    RequestTemplate,
};
use serde::Deserialize;
use std::thread;
use std::time::Duration;

/// Default pause between two status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of failed polls in a row before giving up.
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// Blocks the polling loop between two polls.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

static THREAD_SLEEPER: ThreadSleeper = ThreadSleeper;

/// Callback trait for polling progress notifications.
pub trait PollObserver {
    /// Called after every successful poll.
    ///
    /// # Arguments
    /// * `poll` - Current poll number (1-indexed)
    /// * `max_polls` - Poll budget
    /// * `phase` - Phase reported by this poll
    fn on_poll(&self, poll: u32, max_polls: u32, phase: &Phase);

    /// Called when a poll fails and polling continues.
    fn on_poll_error(&self, _consecutive: u32, _error: &Error) {}
}

/// Polling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Pause before each poll.
    pub interval: Duration,
    /// Total wait budget.
    pub timeout: Duration,
    /// Return as soon as the request is `IN_PROGRESS`.
    pub return_on_in_progress: bool,
    /// Failed polls in a row tolerated before [`Error::TransientPoll`].
    pub max_consecutive_errors: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: Duration::from_secs(DEFAULT_WAIT_TIMEOUT_MINUTES * 60),
            return_on_in_progress: false,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
        }
    }
}

impl PollPolicy {
    /// Set the wait budget in minutes.
    #[must_use]
    pub fn with_timeout_minutes(mut self, minutes: u64) -> Self {
        self.timeout = Duration::from_secs(minutes * 60);
        self
    }

    /// Number of polls the budget allows: timeout divided by interval, at
    /// least one.
    pub fn max_polls(&self) -> u32 {
        let interval = self.interval.as_secs().max(1);
        let polls = self.timeout.as_secs() / interval;
        u32::try_from(polls).unwrap_or(u32::MAX).max(1)
    }

    /// Wait budget in whole minutes.
    pub fn timeout_minutes(&self) -> u64 {
        self.timeout.as_secs() / 60
    }
}

/// Which operation started the request being awaited.
///
/// Decides when the record forgets the request id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// A failed or rejected request never produced anything.
    Create,
    /// The deployment exists whatever the update's outcome.
    Update,
    /// Only a successful destroy removes the deployment.
    Delete,
}

impl Flow {
    fn clears_identity(self, phase: &Phase) -> bool {
        match self {
            Self::Create => phase.is_failure(),
            Self::Update => false,
            Self::Delete => *phase == Phase::Successful,
        }
    }
}

#[derive(Deserialize)]
struct CreatedRequest {
    id: String,
}

/// Extract the id of a newly created request.
///
/// The `Location` header's last segment is preferred; the body's `id` is
/// the fallback.
pub(crate) fn created_request(response: Response) -> Result<RequestHandle> {
    let response = response.error_for_status()?;

    let from_location = response
        .location
        .as_deref()
        .and_then(|location| location.trim_end_matches('/').rsplit('/').next())
        .filter(|segment| !segment.is_empty())
        .map(RequestHandle::new);
    if let Some(handle) = from_location {
        return Ok(handle);
    }

    let created: CreatedRequest = serde_json::from_str(&response.body).map_err(|e| {
        Error::InvalidResponse(format!("created request carries no id: {e}"))
    })?;
    Ok(RequestHandle::new(created.id))
}

/// Errors a poll may recover from on the next tick.
fn is_transient(error: &Error) -> bool {
    match error {
        Error::Transport(_) => true,
        Error::Api { status, .. } => *status >= 500,
        _ => false,
    }
}

/// Submits catalog requests and waits for them to finish.
pub struct RequestLifecycle<'a> {
    transport: &'a dyn Transport,
    policy: PollPolicy,
    sleeper: &'a dyn Sleeper,
    observer: Option<&'a dyn PollObserver>,
}

impl<'a> RequestLifecycle<'a> {
    pub fn new(transport: &'a dyn Transport, policy: PollPolicy) -> Self {
        Self {
            transport,
            policy,
            sleeper: &THREAD_SLEEPER,
            observer: None,
        }
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: &'a dyn Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: &'a dyn PollObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Submit `template` as a new request for the catalog item.
    pub fn submit(
        &self,
        catalog_item_id: &str,
        template: &RequestTemplate,
    ) -> Result<RequestHandle> {
        let path = format!(
            "catalog-service/api/consumer/entitledCatalogItems/{}/requests",
            segment(catalog_item_id)
        );
        let body = serde_json::to_value(template)?;
        let handle = created_request(self.transport.post(&path, &body)?)?;
        log::info!("Submitted request {handle} for catalog item {catalog_item_id}");
        Ok(handle)
    }

    /// Fetch the current state of a request.
    pub fn status(&self, handle: &RequestHandle) -> Result<CatalogRequest> {
        get_json(
            self.transport,
            &format!("catalog-service/api/consumer/requests/{}", segment(handle.id())),
        )
    }

    /// Poll `handle` until it finishes, fails or the budget runs out.
    ///
    /// Sleeps one interval before every poll. Returns the final request on
    /// success (or on `IN_PROGRESS` when the policy allows it).
    pub fn await_completion(
        &self,
        handle: &RequestHandle,
        record: &mut RequestRecord,
        flow: Flow,
    ) -> Result<CatalogRequest> {
        let max_polls = self.policy.max_polls();
        let mut consecutive_errors = 0u32;
        let mut last_phase: Option<Phase> = None;

        for poll in 1..=max_polls {
            self.sleeper.sleep(self.policy.interval);

            let request = match self.status(handle) {
                Ok(request) => {
                    consecutive_errors = 0;
                    request
                }
                Err(err) if is_transient(&err) => {
                    consecutive_errors += 1;
                    log::warn!(
                        "Polling request {handle} failed ({consecutive_errors}/{}): {err}",
                        self.policy.max_consecutive_errors
                    );
                    if let Some(observer) = self.observer {
                        observer.on_poll_error(consecutive_errors, &err);
                    }
                    if consecutive_errors >= self.policy.max_consecutive_errors {
                        return Err(Error::TransientPoll {
                            request_id: handle.to_string(),
                            attempts: consecutive_errors,
                            last: err.to_string(),
                        });
                    }
                    continue;
                }
                Err(err) => return Err(err),
            };

            let phase = request.phase.clone();
            record.request_status = Some(phase.clone());
            if let Some(observer) = self.observer {
                observer.on_poll(poll, max_polls, &phase);
            }
            log::debug!("Request {handle} is {phase} (poll {poll}/{max_polls})");

            if flow.clears_identity(&phase) {
                record.clear_identity();
            }

            match &phase {
                Phase::Successful => {
                    log::info!("Request {handle} succeeded");
                    record.failed_message = None;
                    return Ok(request);
                }
                Phase::Failed | Phase::Rejected => {
                    let message = request
                        .completion_details()
                        .map_or_else(|| format!("request {phase}"), ToString::to_string);
                    record.failed_message = Some(message.clone());
                    return Err(Error::RequestFailed {
                        request_id: handle.to_string(),
                        message,
                    });
                }
                Phase::InProgress if self.policy.return_on_in_progress => {
                    log::info!("Request {handle} is in progress; not waiting for it");
                    return Ok(request);
                }
                Phase::Unknown(raw) => {
                    log::warn!("Request {handle} reports unrecognised phase {raw}");
                }
                _ => {}
            }

            last_phase = Some(phase);
        }

        Err(Error::Timeout {
            request_id: handle.to_string(),
            minutes: self.policy.timeout_minutes(),
            last_phase: last_phase.map_or_else(|| "unobserved".to_string(), String::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Method, MockTransport};
    use serde_json::json;
    use std::cell::RefCell;

    const STATUS_PATH: &str = "catalog-service/api/consumer/requests/r-1";

    #[derive(Default)]
    struct RecordingSleeper {
        sleeps: RefCell<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.sleeps.borrow_mut().push(duration);
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        phases: RefCell<Vec<(u32, u32, Phase)>>,
        errors: RefCell<u32>,
    }

    impl PollObserver for RecordingObserver {
        fn on_poll(&self, poll: u32, max_polls: u32, phase: &Phase) {
            self.phases.borrow_mut().push((poll, max_polls, phase.clone()));
        }

        fn on_poll_error(&self, _consecutive: u32, _error: &Error) {
            *self.errors.borrow_mut() += 1;
        }
    }

    fn status(phase: &str) -> serde_json::Value {
        json!({"id": "r-1", "phase": phase})
    }

    fn one_minute() -> PollPolicy {
        PollPolicy::default().with_timeout_minutes(1)
    }

    fn record() -> RequestRecord {
        RequestRecord {
            request_id: Some("r-1".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_max_polls() {
        assert_eq!(one_minute().max_polls(), 2);
        assert_eq!(PollPolicy::default().max_polls(), 30);
        let short = PollPolicy {
            timeout: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(short.max_polls(), 1);
    }

    #[test]
    fn test_returns_on_first_success() {
        let mock = MockTransport::new();
        mock.on_get(STATUS_PATH, status("SUCCESSFUL"));
        let sleeper = RecordingSleeper::default();
        let lifecycle = RequestLifecycle::new(&mock, PollPolicy::default()).with_sleeper(&sleeper);
        let mut rec = record();

        let request = lifecycle
            .await_completion(&RequestHandle::new("r-1"), &mut rec, Flow::Create)
            .unwrap();

        assert_eq!(request.phase, Phase::Successful);
        assert_eq!(mock.calls_to(Method::Get, STATUS_PATH).len(), 1);
        assert_eq!(sleeper.sleeps.borrow().as_slice(), &[DEFAULT_POLL_INTERVAL]);
        assert_eq!(rec.request_status, Some(Phase::Successful));
        assert_eq!(rec.request_id.as_deref(), Some("r-1"));
    }

    #[test]
    fn test_times_out_after_exact_budget() {
        let mock = MockTransport::new();
        mock.on_get(STATUS_PATH, status("IN_PROGRESS"));
        let sleeper = RecordingSleeper::default();
        let lifecycle = RequestLifecycle::new(&mock, one_minute()).with_sleeper(&sleeper);
        let mut rec = record();

        let err = lifecycle
            .await_completion(&RequestHandle::new("r-1"), &mut rec, Flow::Update)
            .unwrap_err();

        match err {
            Error::Timeout {
                request_id,
                minutes,
                last_phase,
            } => {
                assert_eq!(request_id, "r-1");
                assert_eq!(minutes, 1);
                assert_eq!(last_phase, "IN_PROGRESS");
            }
            other => panic!("Expected Timeout, got {other:?}"),
        }
        assert_eq!(mock.calls_to(Method::Get, STATUS_PATH).len(), 2);
        assert_eq!(sleeper.sleeps.borrow().len(), 2);
        assert_eq!(rec.request_status, Some(Phase::InProgress));
    }

    #[test]
    fn test_in_progress_can_return_early() {
        let mock = MockTransport::new();
        mock.on_get(STATUS_PATH, status("SUBMITTED"));
        mock.on_get(STATUS_PATH, status("IN_PROGRESS"));
        let sleeper = RecordingSleeper::default();
        let policy = PollPolicy {
            return_on_in_progress: true,
            ..Default::default()
        };
        let lifecycle = RequestLifecycle::new(&mock, policy).with_sleeper(&sleeper);
        let mut rec = record();

        let request = lifecycle
            .await_completion(&RequestHandle::new("r-1"), &mut rec, Flow::Create)
            .unwrap();

        assert_eq!(request.phase, Phase::InProgress);
        assert_eq!(sleeper.sleeps.borrow().len(), 2);
    }

    #[test]
    fn test_create_failure_clears_identity() {
        let mock = MockTransport::new();
        mock.on_get(
            STATUS_PATH,
            json!({
                "id": "r-1",
                "phase": "FAILED",
                "requestCompletion": {"completionDetails": "Out of capacity"}
            }),
        );
        let sleeper = RecordingSleeper::default();
        let lifecycle = RequestLifecycle::new(&mock, one_minute()).with_sleeper(&sleeper);
        let mut rec = record();

        let err = lifecycle
            .await_completion(&RequestHandle::new("r-1"), &mut rec, Flow::Create)
            .unwrap_err();

        assert!(matches!(err, Error::RequestFailed { ref message, .. } if message == "Out of capacity"));
        assert_eq!(rec.request_id, None);
        assert_eq!(rec.request_status, Some(Phase::Failed));
        assert_eq!(rec.failed_message.as_deref(), Some("Out of capacity"));
    }

    #[test]
    fn test_failed_delete_keeps_identity() {
        let mock = MockTransport::new();
        mock.on_get(STATUS_PATH, status("FAILED"));
        let sleeper = RecordingSleeper::default();
        let lifecycle = RequestLifecycle::new(&mock, one_minute()).with_sleeper(&sleeper);
        let mut rec = record();

        let err = lifecycle
            .await_completion(&RequestHandle::new("r-1"), &mut rec, Flow::Delete)
            .unwrap_err();

        assert!(matches!(err, Error::RequestFailed { ref message, .. } if message == "request FAILED"));
        assert_eq!(rec.request_id.as_deref(), Some("r-1"));
    }

    #[test]
    fn test_successful_delete_clears_identity() {
        let mock = MockTransport::new();
        mock.on_get(STATUS_PATH, status("SUCCESSFUL"));
        let sleeper = RecordingSleeper::default();
        let lifecycle = RequestLifecycle::new(&mock, one_minute()).with_sleeper(&sleeper);
        let mut rec = record();

        lifecycle
            .await_completion(&RequestHandle::new("r-1"), &mut rec, Flow::Delete)
            .unwrap();
        assert_eq!(rec.request_id, None);
    }

    #[test]
    fn test_rejected_update_keeps_identity() {
        let mock = MockTransport::new();
        mock.on_get(STATUS_PATH, status("REJECTED"));
        let sleeper = RecordingSleeper::default();
        let lifecycle = RequestLifecycle::new(&mock, one_minute()).with_sleeper(&sleeper);
        let mut rec = record();

        assert!(lifecycle
            .await_completion(&RequestHandle::new("r-1"), &mut rec, Flow::Update)
            .is_err());
        assert_eq!(rec.request_id.as_deref(), Some("r-1"));
        assert_eq!(rec.request_status, Some(Phase::Rejected));
    }

    #[test]
    fn test_transient_errors_are_tolerated() {
        let mock = MockTransport::new();
        mock.on_failure(Method::Get, STATUS_PATH, "connection reset");
        mock.on_failure(Method::Get, STATUS_PATH, "connection reset");
        mock.on_get(STATUS_PATH, status("SUCCESSFUL"));
        let sleeper = RecordingSleeper::default();
        let observer = RecordingObserver::default();
        let lifecycle = RequestLifecycle::new(&mock, PollPolicy::default())
            .with_sleeper(&sleeper)
            .with_observer(&observer);
        let mut rec = record();

        lifecycle
            .await_completion(&RequestHandle::new("r-1"), &mut rec, Flow::Update)
            .unwrap();

        assert_eq!(*observer.errors.borrow(), 2);
        assert_eq!(
            observer.phases.borrow().as_slice(),
            &[(3, 30, Phase::Successful)]
        );
    }

    #[test]
    fn test_consecutive_errors_surface() {
        let mock = MockTransport::new();
        mock.on_failure(Method::Get, STATUS_PATH, "connection refused");
        let sleeper = RecordingSleeper::default();
        let lifecycle =
            RequestLifecycle::new(&mock, PollPolicy::default()).with_sleeper(&sleeper);
        let mut rec = record();

        let err = lifecycle
            .await_completion(&RequestHandle::new("r-1"), &mut rec, Flow::Update)
            .unwrap_err();

        match err {
            Error::TransientPoll { attempts, last, .. } => {
                assert_eq!(attempts, DEFAULT_MAX_CONSECUTIVE_ERRORS);
                assert!(last.contains("connection refused"));
            }
            other => panic!("Expected TransientPoll, got {other:?}"),
        }
        assert_eq!(sleeper.sleeps.borrow().len(), 3);
    }

    #[test]
    fn test_client_errors_are_not_retried() {
        let mock = MockTransport::new();
        let sleeper = RecordingSleeper::default();
        let lifecycle = RequestLifecycle::new(&mock, one_minute()).with_sleeper(&sleeper);
        let mut rec = record();

        // Unrouted path answers 404.
        let err = lifecycle
            .await_completion(&RequestHandle::new("r-1"), &mut rec, Flow::Update)
            .unwrap_err();
        assert!(matches!(err, Error::Api { status: 404, .. }));
        assert_eq!(sleeper.sleeps.borrow().len(), 1);
    }

    #[test]
    fn test_unknown_phase_keeps_polling() {
        let mock = MockTransport::new();
        mock.on_get(STATUS_PATH, status("AWAITING_OPERATOR"));
        mock.on_get(STATUS_PATH, status("SUCCESSFUL"));
        let sleeper = RecordingSleeper::default();
        let lifecycle = RequestLifecycle::new(&mock, one_minute()).with_sleeper(&sleeper);
        let mut rec = record();

        lifecycle
            .await_completion(&RequestHandle::new("r-1"), &mut rec, Flow::Create)
            .unwrap();
        assert_eq!(mock.calls_to(Method::Get, STATUS_PATH).len(), 2);
    }

    #[test]
    fn test_submit_posts_template() {
        let mock = MockTransport::new();
        mock.on_post(
            "catalog-service/api/consumer/entitledCatalogItems/c-1/requests",
            json!({"id": "r-7", "phase": "SUBMITTED"}),
        );
        let lifecycle = RequestLifecycle::new(&mock, PollPolicy::default());
        let template = RequestTemplate {
            catalog_item_id: Some("c-1".to_string()),
            ..Default::default()
        };

        let handle = lifecycle.submit("c-1", &template).unwrap();

        assert_eq!(handle.id(), "r-7");
        let calls = mock.calls_to(
            Method::Post,
            "catalog-service/api/consumer/entitledCatalogItems/c-1/requests",
        );
        assert_eq!(calls[0].body.as_ref().unwrap()["catalogItemId"], json!("c-1"));
    }

    #[test]
    fn test_created_request_prefers_location() {
        let response = Response {
            status: 201,
            body: String::new(),
            location: Some(
                "https://catalog.example.com/catalog-service/api/consumer/requests/r-9".to_string(),
            ),
        };
        assert_eq!(created_request(response).unwrap().id(), "r-9");

        let bare = Response::new(201, "");
        assert!(matches!(
            created_request(bare),
            Err(Error::InvalidResponse(_))
        ));
    }
}
