//! Railway-style outcome type shared by stages, the executor and the council.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

/// Which track an [`Outcome`] is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    /// The operation succeeded, possibly with an empty value.
    Ok,
    /// The operation failed.
    Err,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Err => write!(f, "err"),
        }
    }
}

/// Broad classification of a failure, used to decide retry and reporting policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Invalid construction-time configuration. Never retried.
    Configuration,
    /// Blocked tool input, path escape or open circuit. Never retried.
    Guard,
    /// Completion-service failure or timeout. Retried only by a pattern loop.
    Transient,
    /// Wall-clock limit or round cap reached.
    Termination,
    /// Any other stage-level failure.
    Stage,
}

impl ErrorCategory {
    /// Returns the lowercase name of the category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Guard => "guard",
            Self::Transient => "transient",
            Self::Termination => "termination",
            Self::Stage => "stage",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error side of an [`Outcome`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    /// Failure classification.
    pub category: ErrorCategory,
    /// Human-readable message, prefixed with the labels of the stages it crossed.
    pub message: String,
    /// Best partial artifact available when the failure happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<serde_json::Value>,
}

impl Failure {
    /// Creates a failure with an explicit category.
    #[must_use]
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            partial: None,
        }
    }

    /// Creates a stage failure.
    #[must_use]
    pub fn stage(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Stage, message)
    }

    /// Creates a guard failure.
    #[must_use]
    pub fn guard(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Guard, message)
    }

    /// Creates a transient failure.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Transient, message)
    }

    /// Creates a termination failure.
    #[must_use]
    pub fn termination(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Termination, message)
    }

    /// Creates a configuration failure.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Configuration, message)
    }

    /// Attaches the best partial artifact.
    #[must_use]
    pub fn with_partial(mut self, partial: serde_json::Value) -> Self {
        self.partial = Some(partial);
        self
    }

    /// Prefixes the message with a label, keeping category and partial.
    #[must_use]
    pub fn labelled(mut self, label: &str) -> Self {
        self.message = format!("{label}: {}", self.message);
        self
    }

    /// Returns true for guard failures.
    #[must_use]
    pub fn is_guard(&self) -> bool {
        self.category == ErrorCategory::Guard
    }

    /// Returns true for transient failures.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.category == ErrorCategory::Transient
    }

    /// Returns true for termination failures.
    #[must_use]
    pub fn is_termination(&self) -> bool {
        self.category == ErrorCategory::Termination
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Failure {}

/// A two-track result used for all pipeline-level error propagation.
///
/// The track is always chosen explicitly by the constructor, so
/// `Outcome::ok(())` and `Outcome::err("x")` can never be confused.
/// Combinators only run their closure on the `Ok` track. Closures that return
/// `Err` are converted into failures; panics are never caught.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum Outcome<T> {
    /// Success track.
    Ok(T),
    /// Failure track.
    Err(Failure),
}

impl<T> Outcome<T> {
    /// Creates a successful outcome.
    pub fn ok(value: T) -> Self {
        Self::Ok(value)
    }

    /// Creates a stage failure with a message.
    pub fn err(message: impl Into<String>) -> Self {
        Self::Err(Failure::stage(message))
    }

    /// Creates a failed outcome from a categorized failure.
    pub fn fail(failure: Failure) -> Self {
        Self::Err(failure)
    }

    /// Returns the track this outcome is on.
    pub const fn kind(&self) -> OutcomeKind {
        match self {
            Self::Ok(_) => OutcomeKind::Ok,
            Self::Err(_) => OutcomeKind::Err,
        }
    }

    /// Returns true on the success track.
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Returns true on the failure track.
    pub const fn is_err(&self) -> bool {
        matches!(self, Self::Err(_))
    }

    /// Returns the value, if any.
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Ok(value) => Some(value),
            Self::Err(_) => None,
        }
    }

    /// Returns the failure, if any.
    pub const fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Ok(_) => None,
            Self::Err(failure) => Some(failure),
        }
    }

    /// Returns the failure message, if any.
    pub fn error(&self) -> Option<&str> {
        self.failure().map(|f| f.message.as_str())
    }

    /// Applies `f` to the value and wraps the result.
    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Ok(value) => Outcome::Ok(f(value)),
            Self::Err(failure) => Outcome::Err(failure),
        }
    }

    /// Applies a fallible `f`, converting its error into a stage failure.
    pub fn try_map<U, E, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> Result<U, E>,
        E: fmt::Display,
    {
        match self {
            Self::Ok(value) => match f(value) {
                Ok(mapped) => Outcome::Ok(mapped),
                Err(e) => Outcome::err(e.to_string()),
            },
            Self::Err(failure) => Outcome::Err(failure),
        }
    }

    /// Chains an operation that already returns an outcome.
    ///
    /// A failure produced by `f` is prefixed with `label`; failures that were
    /// already on the error track pass through untouched.
    pub fn and_then<U, F>(self, label: &str, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> Outcome<U>,
    {
        match self {
            Self::Ok(value) => match f(value) {
                Outcome::Ok(next) => Outcome::Ok(next),
                Outcome::Err(failure) => Outcome::Err(failure.labelled(label)),
            },
            Self::Err(failure) => Outcome::Err(failure),
        }
    }

    /// Async counterpart of [`Outcome::and_then`].
    pub async fn and_then_async<U, F, Fut>(self, label: &str, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = Outcome<U>>,
    {
        match self {
            Self::Ok(value) => match f(value).await {
                Outcome::Ok(next) => Outcome::Ok(next),
                Outcome::Err(failure) => Outcome::Err(failure.labelled(label)),
            },
            Self::Err(failure) => Outcome::Err(failure),
        }
    }

    /// Runs a recovery path on the failure track.
    pub fn or_else<F>(self, f: F) -> Self
    where
        F: FnOnce(Failure) -> Self,
    {
        match self {
            Self::Ok(value) => Self::Ok(value),
            Self::Err(failure) => f(failure),
        }
    }

    /// Converts into a standard result so `?` can be used internally.
    pub fn into_result(self) -> Result<T, Failure> {
        self.into()
    }
}

impl<T> From<Result<T, Failure>> for Outcome<T> {
    fn from(result: Result<T, Failure>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(failure) => Self::Err(failure),
        }
    }
}

impl<T> From<Outcome<T>> for Result<T, Failure> {
    fn from(outcome: Outcome<T>) -> Self {
        match outcome {
            Outcome::Ok(value) => Ok(value),
            Outcome::Err(failure) => Err(failure),
        }
    }
}
