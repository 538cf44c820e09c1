//! Error Types for the Bridge
//!
//! Every failure that reaches the host is a [`BridgeError`]: one variant per
//! host exception category, each carrying the native diagnostic that caused
//! it. Native failures and bridge-internal failures share this type because
//! both are translated from the native error subsystem.
//!
//! ## Error Categories
//!
//! - `Io`: file, handle and data-coverage failures
//! - `Memory`: allocation failure and buffer/table overflow
//! - `Type`: wrong variable or array type
//! - `Key`: name or ID lookup failure
//! - `Index`: out-of-range index
//! - `ZeroDivision`: division by zero
//! - `Runtime`: internal invariant violations and everything unclassified
//! - `Value`: malformed input, inconsistent dimensions, out-of-domain values

use std::fmt;

use thiserror::Error;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Host exception category selected for a native error identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Io,
    Memory,
    Type,
    Key,
    Index,
    ZeroDivision,
    Runtime,
    Value,
}

impl ErrorCategory {
    /// All categories, in classification order with the default last
    pub const ALL: [ErrorCategory; 8] = [
        ErrorCategory::Io,
        ErrorCategory::Memory,
        ErrorCategory::Type,
        ErrorCategory::Key,
        ErrorCategory::Index,
        ErrorCategory::ZeroDivision,
        ErrorCategory::Value,
        ErrorCategory::Runtime,
    ];

    /// Conventional host exception name for this category
    pub fn exception_name(&self) -> &'static str {
        match self {
            ErrorCategory::Io => "IOError",
            ErrorCategory::Memory => "MemoryError",
            ErrorCategory::Type => "TypeError",
            ErrorCategory::Key => "KeyError",
            ErrorCategory::Index => "IndexError",
            ErrorCategory::ZeroDivision => "ZeroDivisionError",
            ErrorCategory::Runtime => "RuntimeError",
            ErrorCategory::Value => "ValueError",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.exception_name())
    }
}

/// Snapshot of the native error subsystem at the moment an error was raised.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NativeDiagnostic {
    /// Short identifier, e.g. `LIB(ZEROVECTOR)`
    pub short: String,
    /// Long, call-specific message
    pub long: String,
    /// Explanation of the short identifier
    pub explain: String,
    /// Call chain active when the error was signalled, outermost first
    pub trace: Vec<String>,
}

impl NativeDiagnostic {
    /// Create a diagnostic from its parts
    pub fn new(
        short: impl Into<String>,
        long: impl Into<String>,
        explain: impl Into<String>,
        trace: Vec<String>,
    ) -> Self {
        Self {
            short: short.into(),
            long: long.into(),
            explain: explain.into(),
            trace,
        }
    }
}

impl fmt::Display for NativeDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short)?;
        if !self.explain.is_empty() {
            write!(f, " -- {}", self.explain)?;
        }
        if !self.long.is_empty() {
            write!(f, "\n{}", self.long)?;
        }
        if !self.trace.is_empty() {
            write!(f, "\n{}", self.trace.join(" --> "))?;
        }
        Ok(())
    }
}

/// Host-visible exception raised by the bridge
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("IOError: {0}")]
    Io(NativeDiagnostic),

    #[error("MemoryError: {0}")]
    Memory(NativeDiagnostic),

    #[error("TypeError: {0}")]
    Type(NativeDiagnostic),

    #[error("KeyError: {0}")]
    Key(NativeDiagnostic),

    #[error("IndexError: {0}")]
    Index(NativeDiagnostic),

    #[error("ZeroDivisionError: {0}")]
    ZeroDivision(NativeDiagnostic),

    #[error("RuntimeError: {0}")]
    Runtime(NativeDiagnostic),

    #[error("ValueError: {0}")]
    Value(NativeDiagnostic),
}

impl BridgeError {
    /// Create an error of the given category
    pub fn new(category: ErrorCategory, diagnostic: NativeDiagnostic) -> Self {
        match category {
            ErrorCategory::Io => BridgeError::Io(diagnostic),
            ErrorCategory::Memory => BridgeError::Memory(diagnostic),
            ErrorCategory::Type => BridgeError::Type(diagnostic),
            ErrorCategory::Key => BridgeError::Key(diagnostic),
            ErrorCategory::Index => BridgeError::Index(diagnostic),
            ErrorCategory::ZeroDivision => BridgeError::ZeroDivision(diagnostic),
            ErrorCategory::Runtime => BridgeError::Runtime(diagnostic),
            ErrorCategory::Value => BridgeError::Value(diagnostic),
        }
    }

    /// Category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            BridgeError::Io(_) => ErrorCategory::Io,
            BridgeError::Memory(_) => ErrorCategory::Memory,
            BridgeError::Type(_) => ErrorCategory::Type,
            BridgeError::Key(_) => ErrorCategory::Key,
            BridgeError::Index(_) => ErrorCategory::Index,
            BridgeError::ZeroDivision(_) => ErrorCategory::ZeroDivision,
            BridgeError::Runtime(_) => ErrorCategory::Runtime,
            BridgeError::Value(_) => ErrorCategory::Value,
        }
    }

    /// The native diagnostic carried by this error
    pub fn diagnostic(&self) -> &NativeDiagnostic {
        match self {
            BridgeError::Io(d)
            | BridgeError::Memory(d)
            | BridgeError::Type(d)
            | BridgeError::Key(d)
            | BridgeError::Index(d)
            | BridgeError::ZeroDivision(d)
            | BridgeError::Runtime(d)
            | BridgeError::Value(d) => d,
        }
    }

    /// Short identifier of the underlying native error
    pub fn short(&self) -> &str {
        &self.diagnostic().short
    }

    /// Check if this is a type-related error
    pub fn is_type_error(&self) -> bool {
        matches!(self, BridgeError::Type(_))
    }

    /// Check if this is a value-related error
    pub fn is_value_error(&self) -> bool {
        matches!(self, BridgeError::Value(_))
    }
}
