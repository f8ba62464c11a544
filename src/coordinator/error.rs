use thiserror::Error;

use crate::models::{GroupId, TargetId};

/// Why a bulk LMS job attempt ended without a result.
///
/// Every variant is terminal for the attempt; nothing is retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("No users selected")]
    EmptySelection,

    #[error("Targets {0:?} do not belong to the group")]
    ForeignTargets(Vec<TargetId>),

    #[error("Selection is for group {selection} but the session is for group {session}")]
    SessionMismatch { session: GroupId, selection: GroupId },

    #[error("An LMS job for group {0} is already in progress")]
    AlreadyInFlight(GroupId),

    /// The submit request failed or was refused
    #[error("{0}")]
    Submission(String),

    /// A status request failed
    #[error("{0}")]
    PollTransport(String),

    /// The server answered a status request with `success: false`
    #[error("{0}")]
    JobRejected(String),
}
