//! Classification of finished job tasks.
//!
//! The worker runs many jobs at once and must keep going when one of them
//! blows up. [`extract_result`] turns a finished task into `Option<T>`,
//! reporting the failure on stderr and through a `notify` callback instead of
//! propagating it.

use crate::error::QueueError;
use std::error::Error;
use std::io::Write;
use thiserror::Error;
use tokio::task::JoinError;

/// Message prefix of the disconnect Redis reports while shutting down or
/// reconnecting. Failures starting with it are dropped silently.
pub const CONNECTION_CLOSED: &str = "Connection closed by server";

/// Event kind passed to `notify` for reported failures.
pub const ERROR_EVENT: &str = "error";

/// Why a job task did not produce a value.
#[derive(Debug, Error)]
pub enum TaskFailure {
    /// The task ran and returned an error
    #[error(transparent)]
    Job(#[from] QueueError),

    /// The task panicked
    #[error("Task panicked: {0}")]
    Panicked(String),

    /// The task was aborted before it finished
    #[error("Task cancelled")]
    Cancelled,

    /// Free-form failure message
    #[error("{0}")]
    Message(String),
}

impl TaskFailure {
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }
}

impl From<JoinError> for TaskFailure {
    fn from(err: JoinError) -> Self {
        if err.is_cancelled() {
            return Self::Cancelled;
        }
        match err.try_into_panic() {
            Ok(payload) => {
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Self::Panicked(msg)
            }
            Err(err) => Self::Message(err.to_string()),
        }
    }
}

/// Result of a finished job task.
pub type TaskOutcome<T, E = TaskFailure> = Result<T, E>;

/// Flatten what a `JoinHandle` yields for a task returning `QueueResult<T>`.
pub fn from_join<T>(joined: Result<Result<T, QueueError>, JoinError>) -> TaskOutcome<T> {
    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(TaskFailure::Job(err)),
        Err(err) => Err(TaskFailure::from(err)),
    }
}

/// How a failure is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Expected disconnect, dropped without a trace
    Suppressed,
    /// Logged and passed to `notify`
    Reported,
}

/// Whether `err` or any of its causes is the server closing the connection.
pub fn is_connection_closed(err: &(dyn Error + 'static)) -> bool {
    std::iter::successors(Some(err), |&e| e.source())
        .any(|e| e.to_string().starts_with(CONNECTION_CLOSED))
}

pub fn classify(err: &(dyn Error + 'static)) -> FailureClass {
    if is_connection_closed(err) {
        FailureClass::Suppressed
    } else {
        FailureClass::Reported
    }
}

/// Take the value out of a finished task, or deal with its failure.
///
/// - success: the value is returned, `notify` is not called.
/// - connection closed by the server: `None`, nothing is logged or notified.
/// - any other failure: the failure and its cause chain go to stderr,
///   `notify("error", failure)` is called once, and `None` is returned.
///
/// The stderr trace follows `bullq_log`: operators can turn it off with
/// `BULLQ_LOG_LEVEL=off` (or `bullq_log::set_level(Level::Off)`). `notify` is
/// still called in that case.
///
/// ```
/// use bullq_queue::outcome::{extract_result, TaskFailure};
///
/// let mut events = Vec::new();
/// let value = extract_result(Ok::<_, TaskFailure>(42), |kind, err| events.push((kind, err)));
/// assert_eq!(value, Some(42));
/// assert!(events.is_empty());
/// ```
pub fn extract_result<T, E, F>(outcome: TaskOutcome<T, E>, notify: F) -> Option<T>
where
    E: Error + 'static,
    F: FnOnce(&'static str, E),
{
    extract_result_to(outcome, &mut std::io::stderr(), notify)
}

/// [`extract_result`] with the failure trace written to `diagnostics`.
pub fn extract_result_to<T, E, F, W>(
    outcome: TaskOutcome<T, E>,
    diagnostics: &mut W,
    notify: F,
) -> Option<T>
where
    E: Error + 'static,
    F: FnOnce(&'static str, E),
    W: Write,
{
    let failure = match outcome {
        Ok(value) => return Some(value),
        Err(failure) => failure,
    };

    if classify(&failure) == FailureClass::Reported {
        let _ = bullq_log::report_error_to(diagnostics, module_path!(), &failure);
        notify(ERROR_EVENT, failure);
    }
    None
}
