use std::fmt;

use crate::types::TypeId;

/// Numeric error codes. The values are stable and can cross a binding boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    MalformedTypeLibrary = 1,
    IdCollision = 2,
    UnknownType = 3,
    TypeMismatch = 4,
    BufferTooSmall = 5,
    CorruptData = 6,
    MalformedText = 7,
    AllocationFailure = 8,
}

impl ErrorCode {
    /// All codes, in numeric order.
    pub const ALL: [ErrorCode; 8] = [
        ErrorCode::MalformedTypeLibrary,
        ErrorCode::IdCollision,
        ErrorCode::UnknownType,
        ErrorCode::TypeMismatch,
        ErrorCode::BufferTooSmall,
        ErrorCode::CorruptData,
        ErrorCode::MalformedText,
        ErrorCode::AllocationFailure,
    ];

    /// Human-readable description of the code alone.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MalformedTypeLibrary => {
                "type library data is malformed or of an unsupported version"
            }
            ErrorCode::IdCollision => "a type id is already registered with a different layout",
            ErrorCode::UnknownType => "the requested type is not registered",
            ErrorCode::TypeMismatch => "the value or instance does not match the requested type",
            ErrorCode::BufferTooSmall => "the provided buffer is too small",
            ErrorCode::CorruptData => "the packed instance is corrupt",
            ErrorCode::MalformedText => "the text data could not be parsed",
            ErrorCode::AllocationFailure => "memory allocation failed",
        }
    }

    pub fn from_u32(code: u32) -> Option<ErrorCode> {
        ErrorCode::ALL.iter().copied().find(|c| *c as u32 == code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convert a raw error code to a human-readable string.
pub fn error_to_string(code: u32) -> &'static str {
    match ErrorCode::from_u32(code) {
        Some(c) => c.as_str(),
        None => "unknown error code",
    }
}

/// Every failure the engine can report.
#[derive(Debug, thiserror::Error)]
pub enum DlError {
    #[error("malformed type library: {0}")]
    MalformedTypeLibrary(String),

    #[error("type id {id} for '{name}' is already registered with a different layout")]
    IdCollision { id: TypeId, name: String },

    #[error("unknown type {0}")]
    UnknownType(String),

    #[error("type mismatch at '{path}': expected {expected}, got {actual}")]
    TypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },

    #[error("corrupt data: {0}")]
    CorruptData(String),

    #[error("malformed text at line {line}: {message}")]
    MalformedText { line: usize, message: String },

    #[error("allocation of {0} bytes failed")]
    AllocationFailure(usize),
}

impl DlError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DlError::MalformedTypeLibrary(_) => ErrorCode::MalformedTypeLibrary,
            DlError::IdCollision { .. } => ErrorCode::IdCollision,
            DlError::UnknownType(_) => ErrorCode::UnknownType,
            DlError::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            DlError::BufferTooSmall { .. } => ErrorCode::BufferTooSmall,
            DlError::CorruptData(_) => ErrorCode::CorruptData,
            DlError::MalformedText { .. } => ErrorCode::MalformedText,
            DlError::AllocationFailure(_) => ErrorCode::AllocationFailure,
        }
    }

    pub(crate) fn mismatch(
        path: &str,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        DlError::TypeMismatch {
            path: path.to_string(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub(crate) fn text(line: usize, message: impl Into<String>) -> Self {
        DlError::MalformedText {
            line,
            message: message.into(),
        }
    }
}

/// Result type alias for datalib operations.
pub type Result<T> = std::result::Result<T, DlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ErrorCode::MalformedTypeLibrary as u32, 1);
        assert_eq!(ErrorCode::AllocationFailure as u32, 8);
        for code in ErrorCode::ALL {
            assert_eq!(ErrorCode::from_u32(code as u32), Some(code));
        }
        assert_eq!(ErrorCode::from_u32(0), None);
    }

    #[test]
    fn test_error_to_string() {
        assert_eq!(error_to_string(5), "the provided buffer is too small");
        assert_eq!(error_to_string(99), "unknown error code");
    }

    #[test]
    fn test_error_code_mapping() {
        let err = DlError::BufferTooSmall { need: 10, have: 2 };
        assert_eq!(err.code(), ErrorCode::BufferTooSmall);
        assert_eq!(err.to_string(), "buffer too small: need 10 bytes, have 2");

        let err = DlError::text(3, "unexpected '}'");
        assert_eq!(err.code(), ErrorCode::MalformedText);
    }
}
