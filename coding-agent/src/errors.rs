//! Agent error type. Anything escaping the retry loop becomes a
//! `HARD_FAIL` with the error string in the result notes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bus error: {0}")]
    Bus(#[from] event_bus::BusError),
}
