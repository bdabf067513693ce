//! Verification errors

use handoff_net::NetError;

/// Why a completion did not go through
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("location not verified by the backend")]
    NotVerified,

    #[error("completion already in progress")]
    InProgress,

    #[error("delivery already completed")]
    AlreadyCompleted,

    #[error("backend declined the completion")]
    Declined,

    #[error(transparent)]
    Net(#[from] NetError),
}
