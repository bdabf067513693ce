//! Handoff Engine
//!
//! Proximity-gated delivery verification: GPS acquisition, live proximity to
//! the drop point, and completion unlocked by the backend's verdict.
//!
//! # Example
//! ```rust,ignore
//! use handoff_engine::{Config, Engine};
//!
//! let engine = Engine::connect(Config::from_env()?, device, tokens, || logout())?;
//! let verify = engine.verification("d-42", Some(drop_point));
//! verify.enter().await;
//! // ... once the backend confirms proximity
//! verify.complete(None).await?;
//! verify.leave();
//! ```

mod config;
mod engine;

pub use config::{Config, ConfigError};
pub use engine::{Engine, EngineError, delivery_target, navigation_url};

// Re-export sub-crates for advanced usage
pub use handoff_geo as geo;
pub use handoff_location as location;
pub use handoff_net as net;
pub use handoff_verify as verify;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
