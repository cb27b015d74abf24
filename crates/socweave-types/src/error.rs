use thiserror::Error;

use crate::run::RunStatus;

/// Fatal configuration errors raised while loading the policy document.
///
/// These block startup entirely; a malformed policy never reaches a run.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy parse error: {0}")]
    Parse(String),

    #[error("policy validation error: {0}")]
    Validation(String),

    #[error("policy I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Local, retryable failures from external collaborators.
///
/// Reported with step identity by the executor; never corrupts run state and
/// never affects sibling concurrent steps.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("malformed score: {0}")]
    MalformedScore(String),

    #[error("collaborator reported failure: {0}")]
    Failure(String),
}

/// Defect signal: a routing token outside the two-value output domain.
///
/// Raised at string-to-route boundaries (policy load, replayed snapshots)
/// instead of coercing to a default route.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("unknown route token: '{0}'")]
    UnknownRoute(String),
}

/// Violations of the guarded state-merge contract.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("illegal status transition: {from:?} -> {to:?}")]
    IllegalTransition { from: RunStatus, to: RunStatus },

    #[error("run is finalized; delta rejected")]
    Finalized,
}

/// Errors from repository operations (used by trait definitions in
/// socweave-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}
