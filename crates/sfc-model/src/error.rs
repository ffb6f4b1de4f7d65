//! Error types for sfc-model

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while parsing, validating or persisting process models.
#[derive(Error, Debug)]
pub enum ModelError {
    /// The source text is not a well-formed literal.
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    /// A required `name = ...` statement is absent.
    #[error("missing assignment: {0}")]
    MissingAssignment(String),

    /// A literal parsed but does not have the expected shape.
    #[error("malformed `{field}`: {message}")]
    Shape { field: String, message: String },

    /// The model parsed but is structurally inconsistent.
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// IO error while reading or writing a model file
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ModelError {
    pub(crate) fn shape(field: &str, err: impl std::fmt::Display) -> Self {
        ModelError::Shape {
            field: field.to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_error_reports_position() {
        let err = ModelError::Syntax {
            line: 3,
            column: 14,
            message: "expected ']'".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("line 3"));
        assert!(msg.contains("column 14"));
        assert!(msg.contains("expected ']'"));
    }

    #[test]
    fn io_error_names_the_path() {
        let err = ModelError::Io {
            path: PathBuf::from("/tmp/missing.txt"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.to_string().contains("/tmp/missing.txt"));
    }
}
