//! Unified error types for xmldiff.
//!
//! Parse failures and invalid configuration are reported through
//! [`XmlDiffError`]; a rejected candidate pairing during matching is a
//! normal algorithmic outcome (an infinite cost), never an error.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for xmldiff operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum XmlDiffError {
    /// Errors while parsing an input document
    #[error("Failed to parse document: {context}")]
    Parse {
        context: String,
        #[source]
        source: ParseErrorKind,
    },

    /// Errors during diff computation
    #[error("Diff computation failed: {0}")]
    Diff(String),

    /// IO errors with path context
    #[error("IO error at {path:?}: {message}")]
    Io {
        path: Option<PathBuf>,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Specific parse error kinds
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ParseErrorKind {
    #[error("Malformed XML at byte {position}: {message}")]
    MalformedXml { position: u64, message: String },

    #[error("Document contains no root element")]
    NoRootElement,

    #[error("Element nesting exceeds the depth limit of {limit}")]
    DepthExceeded { limit: usize },

    #[error("Invalid text encoding: {0}")]
    Encoding(String),
}

/// Convenient Result type for xmldiff operations
pub type Result<T> = std::result::Result<T, XmlDiffError>;

impl XmlDiffError {
    /// Create a parse error with context
    pub fn parse(context: impl Into<String>, source: ParseErrorKind) -> Self {
        Self::Parse {
            context: context.into(),
            source,
        }
    }

    /// Create an IO error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        let message = format!("{source}");
        Self::Io {
            path: Some(path),
            message,
            source,
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<std::io::Error> for XmlDiffError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            path: None,
            message: format!("{err}"),
            source: err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = XmlDiffError::parse(
            "at input.xml",
            ParseErrorKind::MalformedXml {
                position: 42,
                message: "unexpected end of stream".into(),
            },
        );
        let display = err.to_string();
        assert!(display.contains("parse"), "unexpected message: {display}");

        let err = XmlDiffError::config("percent must be in (0, 1]");
        assert!(err.to_string().contains("percent"));
    }

    #[test]
    fn test_io_error_keeps_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = XmlDiffError::io("/path/to/input.xml", io_err);
        assert!(err.to_string().contains("/path/to/input.xml"));
    }
}
