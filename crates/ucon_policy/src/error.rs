//! Policy parsing errors.

use thiserror::Error;

/// Policy parse result
pub type ParseResult<T> = Result<T, ParseError>;

/// Why a policy document was rejected.
///
/// Every variant aborts a submission before any storage is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Document is not UTF-8
    #[error("Policy document is not valid UTF-8")]
    InvalidUtf8,

    /// Turtle syntax error
    #[error("Syntax error at {line}:{column}: {message}")]
    Syntax {
        /// 1-based line
        line: usize,
        /// 1-based column
        column: usize,
        /// What went wrong
        message: String,
    },

    /// No node typed `ucon:Authorization`
    #[error("No top-level authorization node found")]
    NoAuthorization,

    /// More than one authorization node
    #[error("Expected exactly one authorization node, found {count}")]
    MultipleAuthorizations {
        /// Number found
        count: usize,
    },

    /// Required field missing
    #[error("Missing required field {field}")]
    MissingField {
        /// Dotted path of the field
        field: String,
    },

    /// A rule block is present but only partially populated
    #[error("Incomplete rule block {block}: {reason}")]
    IncompleteBlock {
        /// Dotted path of the block
        block: String,
        /// What is missing or malformed
        reason: String,
    },

    /// A value could not be interpreted
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// Dotted path of the field
        field: String,
        /// Why
        reason: String,
    },

    /// `allowedTechniques` names no algorithm
    #[error("Authorization names no algorithm in processingRules.allowedTechniques")]
    NoAlgorithm,

    /// Algorithm name is not an identifier
    #[error("Algorithm name {name:?} is not an identifier")]
    InvalidAlgorithmName {
        /// The rejected name
        name: String,
    },

    /// Time range with start after end
    #[error("Time range {field} starts after it ends")]
    InvertedTimeRange {
        /// Dotted path of the range
        field: String,
    },
}

impl ParseError {
    pub(crate) fn syntax(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            column,
            message: message.into(),
        }
    }

    pub(crate) fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub(crate) fn incomplete(block: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IncompleteBlock {
            block: block.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_display() {
        let err = ParseError::syntax(3, 14, "expected '.'");
        assert_eq!(format!("{}", err), "Syntax error at 3:14: expected '.'");
    }

    #[test]
    fn test_missing_field_display() {
        let err = ParseError::missing("object_id.fileName");
        assert!(format!("{}", err).contains("object_id.fileName"));
    }
}
