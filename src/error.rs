//! Error types for the policy engine.
//!
//! This module defines all error types that can occur while loading policy
//! documents, parsing distinguished names, expanding tokens, or talking to
//! host collaborators (directory service, attestation decoder, extension
//! encoder).

use thiserror::Error;

/// Result type alias using [`PolicyError`].
pub type Result<T> = std::result::Result<T, PolicyError>;

/// Errors that can occur during policy evaluation.
///
/// Stage functions never propagate these out of the pipeline; they are
/// converted into denial reasons (or warnings) at the point of use.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Malformed or inconsistent policy document.
    #[error("Policy configuration error: {0}")]
    Config(String),

    /// Distinguished name does not conform to the expected format.
    #[error("Invalid distinguished name: {0}")]
    DnFormat(String),

    /// A template referenced a token that is not present in the source data.
    #[error("Unknown token '{{{namespace}:{token}}}'")]
    UnknownToken {
        /// Namespace the token was looked up in.
        namespace: String,
        /// The token name that could not be resolved.
        token: String,
    },

    /// Directory service lookup failed.
    #[error("Directory lookup failed: {0}")]
    Directory(String),

    /// Attestation data embedded in the request could not be decoded.
    #[error("Attestation decode error: {0}")]
    Attestation(String),

    /// The host-side extension encoder reported a failure.
    #[error("Extension encoding error: {0}")]
    Encoding(String),

    /// A date or time value could not be parsed or is out of range.
    #[error("Invalid time value: {0}")]
    InvalidTime(String),

    /// I/O error while reading policy storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PolicyError {
    /// Create a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a distinguished-name format error with the given message.
    pub fn dn_format(msg: impl Into<String>) -> Self {
        Self::DnFormat(msg.into())
    }

    /// Create an unknown-token error.
    pub fn unknown_token(namespace: impl Into<String>, token: impl Into<String>) -> Self {
        Self::UnknownToken {
            namespace: namespace.into(),
            token: token.into(),
        }
    }

    /// Create a directory lookup error with the given message.
    pub fn directory(msg: impl Into<String>) -> Self {
        Self::Directory(msg.into())
    }

    /// Create an attestation decode error with the given message.
    pub fn attestation(msg: impl Into<String>) -> Self {
        Self::Attestation(msg.into())
    }

    /// Create an extension encoding error with the given message.
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    /// Create an invalid-time error with the given message.
    pub fn invalid_time(msg: impl Into<String>) -> Self {
        Self::InvalidTime(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PolicyError::unknown_token("ad", "department");
        assert_eq!(err.to_string(), "Unknown token '{ad:department}'");

        let err = PolicyError::dn_format("unterminated quote");
        assert_eq!(
            err.to_string(),
            "Invalid distinguished name: unterminated quote"
        );
    }

    #[test]
    fn test_constructor_helpers() {
        assert!(matches!(PolicyError::config("bad"), PolicyError::Config(_)));
        assert!(matches!(
            PolicyError::directory("down"),
            PolicyError::Directory(_)
        ));
    }
}
