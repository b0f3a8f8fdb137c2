//! Error Types
//!
//! Errors are reserved for user code that can genuinely fail: getters,
//! watch callbacks and data factories return [`Result`], and the runtime
//! catches whatever they produce at the evaluation boundary. Misuse of the
//! runtime itself is never an `Error`; it is reported through
//! [`crate::diagnostics`] and the operation degrades gracefully.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A getter, callback or factory reported a failure.
    #[error("{0}")]
    Evaluation(String),

    /// A getter or callback panicked. The payload message is kept when it
    /// was a string.
    #[error("panicked: {0}")]
    Panicked(String),

    /// A watch expression could not be parsed into a property path.
    #[error("invalid watch path `{0}`: only word characters, `$` and `.` are allowed")]
    InvalidPath(String),

    /// A value had a different variant than the caller required.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// The owning state was destroyed while something still referred to it.
    #[error("state `{0}` has been destroyed")]
    Destroyed(String),

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// Configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build an evaluation error from any displayable message.
    pub fn evaluation(message: impl std::fmt::Display) -> Self {
        Self::Evaluation(message.to_string())
    }

    /// Convert a caught panic payload into an error.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_keep_their_message() {
        let err = Error::from_panic(Box::new("boom"));
        assert_eq!(err.to_string(), "panicked: boom");

        let err = Error::from_panic(Box::new(String::from("owned boom")));
        assert_eq!(err.to_string(), "panicked: owned boom");

        let err = Error::from_panic(Box::new(42_u32));
        assert!(matches!(err, Error::Panicked(_)));
    }

    #[test]
    fn type_mismatch_names_both_sides() {
        let err = Error::TypeMismatch {
            expected: "number",
            found: "string",
        };
        assert_eq!(err.to_string(), "type mismatch: expected number, found string");
    }
}
