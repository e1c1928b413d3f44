//! Error types for query translation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranslateError {
    /// A query operator call with an unsupported shape (unknown method,
    /// wrong argument count or argument kind).
    #[error("Could not parse '{expression}': {message} (root query: '{root}')")]
    Parser {
        /// The offending sub-expression.
        expression: String,
        /// What was expected instead.
        message: String,
        /// The whole query expression, for context.
        root: String,
    },

    /// A structurally valid construct for which no translation rule exists.
    #[error("{0}")]
    NotSupported(String),

    /// A member access that has no column or navigation mapping in the schema.
    #[error("The member '{member}' of type '{declaring_type}' has no column or navigation mapping")]
    UnmappedMember {
        member: String,
        declaring_type: String,
    },

    /// An entity type that has no table mapping in the schema.
    #[error("The type '{0}' has no table mapping")]
    UnmappedTable(String),
}

impl TranslateError {
    /// Create a parser error for an offending sub-expression.
    pub fn parser(
        expression: impl ToString,
        message: impl Into<String>,
        root: impl ToString,
    ) -> Self {
        Self::Parser {
            expression: expression.to_string(),
            message: message.into(),
            root: root.to_string(),
        }
    }

    /// Create a not-supported error.
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported(message.into())
    }
}

/// Result type alias for translation operations.
pub type TranslateResult<T> = Result<T, TranslateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_error_display() {
        let err = TranslateError::parser("x.Frobnicate()", "the method 'Frobnicate' is not a supported query operator", "Customer.Frobnicate()");
        let text = err.to_string();
        assert!(text.contains("Frobnicate"));
        assert!(text.contains("root query"));
    }

    #[test]
    fn test_unmapped_member_display() {
        let err = TranslateError::UnmappedMember {
            member: "Nickname".into(),
            declaring_type: "Customer".into(),
        };
        assert_eq!(
            err.to_string(),
            "The member 'Nickname' of type 'Customer' has no column or navigation mapping"
        );
    }
}
