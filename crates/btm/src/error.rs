//! Library error type

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by machine, codec and enumerator operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed text, an out-of-range argument, or a pinned prefix that
    /// violates the canonical form or the enumeration flags.
    #[error("{0}")]
    Invalid(String),
    /// The system entropy source could not seed random enumeration.
    #[error("entropy source: {0}")]
    Entropy(#[from] rand::Error),
}
