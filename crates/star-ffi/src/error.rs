//! FFI Error Types
//!
//! Errors raised when a native buffer contract is violated on the Rust side
//! of the boundary. They never reach the host directly: the bridge turns each
//! one into a native-style error identifier (see [`FfiError::native_code`])
//! and signals it through the error subsystem, so there is exactly one
//! translation path for every failure.

use thiserror::Error;

use crate::messages::codes;

/// Result type for FFI operations
pub type FfiResult<T> = Result<T, FfiError>;

/// FFI error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FfiError {
    /// Null pointer was returned where non-null was expected
    #[error("null pointer error: {context}")]
    NullPointer {
        /// Description of where the null pointer was encountered
        context: String,
    },

    /// Buffer overflow - operation would exceed buffer bounds
    #[error("buffer overflow: attempted to access {attempted} elements, but buffer only has {available}")]
    BufferOverflow {
        /// Number of elements attempted to access
        attempted: usize,
        /// Number of elements available
        available: usize,
    },

    /// Memory allocation failed
    #[error("memory allocation failed: requested {size} bytes")]
    AllocationFailed {
        /// Size requested
        size: usize,
    },

    /// A borrowed read-only buffer was handed out for writing
    #[error("buffer is read-only: {context}")]
    ReadOnly {
        /// Context description
        context: String,
    },

    /// A traceback frame was popped under a different name than it was pushed
    #[error("traceback mismatch: expected to leave '{expected}', got '{actual}'")]
    TraceMismatch {
        /// Name on top of the traceback stack
        expected: String,
        /// Name passed to leave
        actual: String,
    },

    /// Custom error with message
    #[error("{0}")]
    Custom(String),
}

impl FfiError {
    /// Create a null pointer error with context
    pub fn null_pointer(context: impl Into<String>) -> Self {
        FfiError::NullPointer {
            context: context.into(),
        }
    }

    /// Create a buffer overflow error
    pub fn buffer_overflow(attempted: usize, available: usize) -> Self {
        FfiError::BufferOverflow {
            attempted,
            available,
        }
    }

    /// Create an allocation failed error
    pub fn allocation_failed(size: usize) -> Self {
        FfiError::AllocationFailed { size }
    }

    /// Create a read-only error
    pub fn read_only(context: impl Into<String>) -> Self {
        FfiError::ReadOnly {
            context: context.into(),
        }
    }

    /// Create a custom error
    pub fn custom(message: impl Into<String>) -> Self {
        FfiError::Custom(message.into())
    }

    /// Native error identifier (without prefix) used when this error is
    /// signalled through the error subsystem.
    pub fn native_code(&self) -> &'static str {
        match self {
            FfiError::NullPointer { .. } => codes::NULL_POINTER,
            FfiError::BufferOverflow { .. } => codes::ARRAY_TOO_SMALL,
            FfiError::AllocationFailed { .. } => codes::MALLOC_FAILURE,
            FfiError::ReadOnly { .. } => codes::READ_ONLY_BUFFER,
            FfiError::TraceMismatch { .. } => codes::NAMES_DO_NOT_MATCH,
            FfiError::Custom(_) => codes::BUG,
        }
    }

    /// Check if this is a memory-related error
    pub fn is_memory_error(&self) -> bool {
        matches!(
            self,
            FfiError::AllocationFailed { .. } | FfiError::BufferOverflow { .. }
        )
    }
}
