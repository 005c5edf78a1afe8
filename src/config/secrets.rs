//! Secret handling utilities.
//!
//! Re-exports the secrecy types used by [`super::Config`] so callers can
//! expose the database URL without a direct secrecy dependency.

pub use secrecy::{ExposeSecret, SecretString};
