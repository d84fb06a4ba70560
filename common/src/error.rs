use std::fmt::{Display, Formatter, Result as FmtResult};

/// How a failure should be treated by the loop that observes it.
///
/// Loops branch on this instead of on error messages: transient failures wait for the
/// next tick, item-fatal failures skip one block or receipt, permanent failures are
/// surfaced to the caller, and startup failures stop the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transient,
    ItemFatal,
    Permanent,
    Startup,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::ItemFatal => write!(f, "item-fatal"),
            Self::Permanent => write!(f, "permanent"),
            Self::Startup => write!(f, "startup"),
        }
    }
}

/// Implemented by every error type that crosses a loop boundary.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}
