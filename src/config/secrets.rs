//! Secret handling.
//!
//! Re-exports the secrecy types used for connection strings so callers
//! never need a direct dependency on the crate.

pub use secrecy::{ExposeSecret, SecretString};
