//! Errors raised while converting between Rust types and [`Value`](crate::Value).

use std::fmt::Display;

use crate::error::DlError;

/// Error type for the serde bridge.
#[derive(Debug)]
pub enum SerdeError {
    /// The value tree does not have the shape the Rust type expects.
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },
    /// The Rust type has no representation in a [`Value`](crate::Value).
    UnsupportedType(String),
    /// Storing or decoding through the context failed.
    Dl(DlError),
    /// Custom error message.
    Custom(String),
}

impl SerdeError {
    pub(crate) fn mismatch(expected: &str, actual: &str) -> Self {
        SerdeError::TypeMismatch {
            field: String::new(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl Display for SerdeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SerdeError::TypeMismatch {
                field,
                expected,
                actual,
            } if field.is_empty() => {
                write!(f, "type mismatch: expected {}, got {}", expected, actual)
            }
            SerdeError::TypeMismatch {
                field,
                expected,
                actual,
            } => write!(
                f,
                "type mismatch for field '{}': expected {}, got {}",
                field, expected, actual
            ),
            SerdeError::UnsupportedType(ty) => write!(f, "unsupported type: {}", ty),
            SerdeError::Dl(e) => write!(f, "{}", e),
            SerdeError::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for SerdeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SerdeError::Dl(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DlError> for SerdeError {
    fn from(e: DlError) -> Self {
        SerdeError::Dl(e)
    }
}

impl serde::ser::Error for SerdeError {
    fn custom<T: Display>(msg: T) -> Self {
        SerdeError::Custom(msg.to_string())
    }
}

impl serde::de::Error for SerdeError {
    fn custom<T: Display>(msg: T) -> Self {
        SerdeError::Custom(msg.to_string())
    }
}
