//! `genjobs-core`: shared building blocks.
//!
//! Identifiers, the shared error model, clock helpers and environment-driven
//! settings. No I/O beyond reading the process environment.

pub mod clock;
pub mod config;
pub mod error;
pub mod id;

pub use config::Settings;
pub use error::{CoreError, CoreResult};
pub use id::JobId;
