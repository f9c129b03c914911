//! Registry error types.
//!
//! The variants carry the transport-agnostic meaning of the source API's
//! status codes: `Conflict` (409), `InvalidLease` (400), `NotFound` (404),
//! `Database`/`Config` (500-class, fatal at startup).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    /// An active or live-reserved record already owns the name.
    #[error("symbol already exists: {0}")]
    Conflict(String),

    /// The lease is missing, not in `reserved` state, or expired.
    #[error("invalid lease: {0}")]
    InvalidLease(String),

    #[error("symbol not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(String),

    #[error("config error: {0}")]
    Config(String),
}
