//! Handoff Verification
//!
//! Gates delivery completion on the backend's proximity verdict.

mod error;
mod orchestrator;
mod session;

pub use error::VerifyError;
pub use orchestrator::VerificationOrchestrator;
pub use session::{SessionPhase, VerificationConfig, VerificationSession, VerificationSnapshot};
