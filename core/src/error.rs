//! Crate-wide error taxonomy (§7).
//!
//! Every reconciler returns `Result<Action>`; `error_policy` (one per
//! controller, see `controllers::*`) inspects `Error::bucket()` to decide
//! whether to requeue with backoff, wait for the next watch event, or log
//! and drop without a retry loop.

use std::time::Duration;

use kube::runtime::controller::Action;
use thiserror::Error;

/// The five buckets of §7's error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorBucket {
    /// API throttle, conflict, stale resource version, cloud 5xx, deadline.
    Transient,
    /// GC paused, sizing config invalid, not enough free nodes yet.
    PreconditionNotMet,
    /// Missing size class, inconsistent MG annotations, zero MGs.
    Configuration,
    /// Unknown instance type in region, malformed annotation.
    PermanentInvalid,
    /// Cannot create namespace at startup; the process fails to start.
    FatalSetup,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("object store error: {0}")]
    Store(#[from] kube::Error),

    #[error("resource version conflict on {0}, requeueing immediately")]
    Conflict(String),

    #[error("precondition not met: {0}")]
    PreconditionNotMet(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("permanent invalid input on {subject}: {reason}")]
    PermanentInvalid { subject: String, reason: String },

    #[error("fatal setup error: {0}")]
    FatalSetup(String),

    #[error("finalizer error: {0}")]
    Finalizer(#[from] Box<kube::runtime::finalizer::Error<Error>>),

    #[error("{0} error(s) during reconcile: {1:?}")]
    Aggregate(usize, Vec<Error>),
}

impl Error {
    pub fn bucket(&self) -> ErrorBucket {
        match self {
            Error::Store(kube::Error::Api(e)) if e.code == 409 => ErrorBucket::Transient,
            Error::Store(_) => ErrorBucket::Transient,
            Error::Conflict(_) => ErrorBucket::Transient,
            Error::PreconditionNotMet(_) => ErrorBucket::PreconditionNotMet,
            Error::InvalidConfiguration(_) => ErrorBucket::Configuration,
            Error::PermanentInvalid { .. } => ErrorBucket::PermanentInvalid,
            Error::FatalSetup(_) => ErrorBucket::FatalSetup,
            Error::Finalizer(_) => ErrorBucket::Transient,
            Error::Aggregate(_, errors) => errors
                .iter()
                .map(Error::bucket)
                .max_by_key(severity_rank)
                .unwrap_or(ErrorBucket::Transient),
        }
    }

    /// Collapse a batch of per-item results into one aggregate error if any
    /// failed, preserving the partial progress already committed by the
    /// successful items (§7: "every loop aggregates multi-item errors").
    pub fn aggregate(errors: Vec<Error>) -> Option<Error> {
        if errors.is_empty() {
            None
        } else {
            let n = errors.len();
            Some(Error::Aggregate(n, errors))
        }
    }
}

/// Higher rank wins when picking the bucket of an aggregate: a single
/// fatal/config error should dominate the reported bucket even if most
/// items only hit transient conflicts.
fn severity_rank(bucket: &ErrorBucket) -> u8 {
    match bucket {
        ErrorBucket::Transient => 0,
        ErrorBucket::PreconditionNotMet => 1,
        ErrorBucket::PermanentInvalid => 2,
        ErrorBucket::Configuration => 3,
        ErrorBucket::FatalSetup => 4,
    }
}

/// Shared `error_policy` behavior: every controller's `error_policy` callback
/// should end with `map_action(&err)` after logging the error with whatever
/// object-specific fields it has in scope.
pub fn map_action(err: &Error) -> Action {
    match err.bucket() {
        ErrorBucket::Transient => Action::requeue(crate::backoff::DEFAULT_BACKOFF.floor),
        ErrorBucket::PreconditionNotMet | ErrorBucket::Configuration => Action::await_change(),
        ErrorBucket::PermanentInvalid => Action::await_change(),
        ErrorBucket::FatalSetup => Action::await_change(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// `Duration` to requeue a GC that is paused until `pausedUntil`, or any
/// other "come back at a specific time" precondition.
pub fn requeue_after(d: Duration) -> Action {
    Action::requeue(d)
}
