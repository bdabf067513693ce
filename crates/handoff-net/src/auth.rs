//! Session collaborators
//!
//! The client never reads session state on its own; it is handed a token
//! source and a callback to run when the backend rejects the session.

use std::sync::Arc;

/// Supplies the bearer token for each request
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

impl<F> TokenProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn token(&self) -> Option<String> {
        self()
    }
}

/// Fixed token, mostly for tools and tests
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Invoked after a 401 so the owner can drop the session
pub type SessionInvalidated = Arc<dyn Fn() + Send + Sync>;
