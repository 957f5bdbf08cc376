//! Error type for the counting pipeline.
//!
//! Errors only occur at the boundary (opening and mapping the input);
//! once scanning starts, any inconsistency is a programming fault and
//! aborts via a panic rather than surfacing as a recoverable error.

use std::fmt;
use std::io;

/// Errors surfaced by [`crate::wordcount`].
#[derive(Debug)]
#[non_exhaustive]
pub enum WordCountError {
    /// The path could not be opened or read, or is not a regular file.
    Open(io::Error),
    /// The virtual reservation or the file overlay was rejected.
    Map(io::Error),
    /// File offsets are packed into 40 bits; larger files are rejected.
    TooLarge { size: u64 },
}

impl fmt::Display for WordCountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open(err) => write!(f, "cannot open input: {err}"),
            Self::Map(err) => write!(f, "cannot map input: {err}"),
            Self::TooLarge { size } => {
                write!(f, "input too large: {size} bytes (limit: 2^40)")
            }
        }
    }
}

impl std::error::Error for WordCountError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open(err) | Self::Map(err) => Some(err),
            _ => None,
        }
    }
}
