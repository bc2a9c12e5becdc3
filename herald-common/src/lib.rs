//! Shared vocabulary types for the herald delivery engine.

pub mod address;
pub mod domain;
pub mod logging;
pub mod secret;

pub use address::{Address, AddressError};
pub use domain::Domain;
pub use secret::Secret;

pub use tracing;

/// Control signal broadcast to in-flight operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Abort the operation as soon as possible, without graceful teardown.
    Cancel,
}
