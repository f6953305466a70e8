//! Error taxonomy shared across the workspace.
//!
//! Every error kind carries enough context for the HTTP boundary to build a
//! response: validation and integrity failures keep field-level detail,
//! query syntax errors keep the offending token and column. Storage errors
//! are logged where they occur and reduced to a generic message for callers.

use thiserror::Error;

/// Errors produced by the document store, graph overlay, and query engine.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Schema mismatch, missing required field, bad enum value, invalid
    /// aggregation argument, invalid sort spec.
    #[error("Validation failed")]
    Validation {
        /// Field-level error messages
        details: Vec<String>,
    },

    /// Referential integrity violation that is not a field-level validation
    /// problem, e.g. a non-cascade delete of a referenced document.
    #[error("{0}")]
    Integrity(String),

    /// Entity unknown, document id absent, job id absent.
    #[error("{0}")]
    NotFound(String),

    /// Save-with-id collision, or a result requested before completion.
    #[error("{0}")]
    Conflict(String),

    /// Sulpher lex/parse failure.
    #[error("Query syntax error: {message} at column {column}: '{token}'")]
    QuerySyntax {
        /// What was expected or found
        message: String,
        /// The offending token text
        token: String,
        /// 1-based column of the offending token
        column: usize,
    },

    /// Unresolvable variable, type mismatch in a predicate.
    #[error("Query error: {0}")]
    QueryRuntime(String),

    /// Exceeded the per-query wall clock.
    #[error("Query timed out after {0}")]
    Timeout(String),

    /// I/O failure, lock acquisition failure, corrupt JSON.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Build a validation error from a single message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation {
            details: vec![msg.into()],
        }
    }

    /// Build a not-found error for a document.
    pub fn document_not_found(entity: &str, id: u64) -> Self {
        Error::NotFound(format!(
            "Resource of entity {entity} with id {id} not found"
        ))
    }

    /// HTTP status code this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation { .. } => 400,
            Error::Integrity(_) => 409,
            Error::NotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::QuerySyntax { .. } => 400,
            Error::QueryRuntime(_) => 400,
            Error::Timeout(_) => 500,
            Error::Storage(_) => 500,
        }
    }

    /// Field-level details, if this error carries any.
    pub fn details(&self) -> Option<&[String]> {
        match self {
            Error::Validation { details } => Some(details),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::validation("x").status_code(), 400);
        assert_eq!(Error::NotFound("x".into()).status_code(), 404);
        assert_eq!(Error::Conflict("x".into()).status_code(), 409);
        assert_eq!(Error::Integrity("x".into()).status_code(), 409);
        assert_eq!(Error::Storage("x".into()).status_code(), 500);
        assert_eq!(
            Error::QuerySyntax {
                message: "unexpected".into(),
                token: ")".into(),
                column: 7,
            }
            .status_code(),
            400
        );
    }

    #[test]
    fn test_validation_details_preserved() {
        let err = Error::Validation {
            details: vec!["Missing required field: name".into()],
        };
        assert_eq!(err.details().unwrap().len(), 1);
    }
}
