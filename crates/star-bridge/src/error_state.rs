//! Error State Translation
//!
//! The native layer never returns an error code. It sets a flag that the
//! bridge must poll immediately after every call, because the next native call
//! may overwrite it. [`ErrorState`] owns that flag (through
//! [`ErrorSubsystem`]), the current [`TranslationMode`], and a snapshot of the
//! last error that was raised to the host.
//!
//! ## Translation Modes
//!
//! | Mode              | Name        | On failure                              |
//! |-------------------|-------------|-----------------------------------------|
//! | `Silent`          | `RETURN`    | nothing; the caller polls               |
//! | `GenericRaise`    | `RUNTIME`   | reset, raise `RuntimeError`             |
//! | `ClassifiedRaise` | `EXCEPTION` | reset, raise the classified category    |
//! | `Ignore`          | `IGNORE`    | reset, do not raise                     |
//!
//! ## Reentrancy
//!
//! An `ErrorState` is single-slot shared state. Wrapped calls must run one at
//! a time; nesting is expressed with [`ErrorState::enter`] and
//! [`ErrorState::leave`], never by sharing the state across threads.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use star_ffi::{ErrorSubsystem, FfiError, MessageKind};
use thiserror::Error;
use tracing::{debug, trace};

use crate::classifier::classify;
use crate::error::{BridgeError, BridgeResult, ErrorCategory, NativeDiagnostic};

// ============================================================================
// TranslationMode
// ============================================================================

/// How a native failure is surfaced to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TranslationMode {
    /// Leave the error set; the caller polls
    #[serde(rename = "RETURN")]
    Silent,
    /// Raise every error as the catch-all category
    #[serde(rename = "RUNTIME")]
    GenericRaise,
    /// Raise every error as its classified category
    #[default]
    #[serde(rename = "EXCEPTION")]
    ClassifiedRaise,
    /// Clear errors without raising
    #[serde(rename = "IGNORE")]
    Ignore,
}

impl TranslationMode {
    /// Boundary name of this mode
    pub fn name(&self) -> &'static str {
        match self {
            TranslationMode::Silent => "RETURN",
            TranslationMode::GenericRaise => "RUNTIME",
            TranslationMode::ClassifiedRaise => "EXCEPTION",
            TranslationMode::Ignore => "IGNORE",
        }
    }

    /// Check if errors are raised in this mode
    pub fn raises(&self) -> bool {
        matches!(
            self,
            TranslationMode::GenericRaise | TranslationMode::ClassifiedRaise
        )
    }
}

impl fmt::Display for TranslationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Error returned when a mode name is not recognized
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{0}' is not a translation mode; expected RETURN, EXCEPTION, RUNTIME or IGNORE")]
pub struct UnknownMode(pub String);

impl FromStr for TranslationMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RETURN" => Ok(TranslationMode::Silent),
            "RUNTIME" => Ok(TranslationMode::GenericRaise),
            "EXCEPTION" => Ok(TranslationMode::ClassifiedRaise),
            "IGNORE" => Ok(TranslationMode::Ignore),
            _ => Err(UnknownMode(s.to_string())),
        }
    }
}

// ============================================================================
// ErrorRecord
// ============================================================================

/// A native error captured at the moment it was observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub short: String,
    pub long: String,
    pub explain: String,
    /// Frozen call chain, outermost first
    pub trace: Vec<String>,
    /// Classified category of `short`
    pub category: ErrorCategory,
}

impl ErrorRecord {
    /// Capture the outstanding error of a subsystem, if any
    pub fn capture(native: &ErrorSubsystem) -> Option<Self> {
        if !native.failed() {
            return None;
        }
        let short = native.message(MessageKind::Short).to_string();
        Some(Self {
            category: classify(&short),
            long: native.message(MessageKind::Long).to_string(),
            explain: native.message(MessageKind::Explain).to_string(),
            trace: native.trace(),
            short,
        })
    }

    /// Message text for one buffer
    pub fn message(&self, kind: MessageKind) -> &str {
        match kind {
            MessageKind::Short => &self.short,
            MessageKind::Long => &self.long,
            MessageKind::Explain => &self.explain,
        }
    }

    /// Diagnostic carried by the raised host error
    pub fn diagnostic(&self) -> NativeDiagnostic {
        NativeDiagnostic::new(
            self.short.clone(),
            self.long.clone(),
            self.explain.clone(),
            self.trace.clone(),
        )
    }

    /// Host error for this record under `mode`
    pub fn to_error(&self, mode: TranslationMode) -> BridgeError {
        let category = match mode {
            TranslationMode::GenericRaise => ErrorCategory::Runtime,
            _ => self.category,
        };
        BridgeError::new(category, self.diagnostic())
    }
}

// ============================================================================
// ErrorState
// ============================================================================

/// Native error state plus the host-side translation policy.
#[derive(Debug, Default)]
pub struct ErrorState {
    native: ErrorSubsystem,
    mode: TranslationMode,
    /// Last error raised to the host; survives later native overwrites
    snapshot: Option<ErrorRecord>,
}

impl ErrorState {
    /// Create a clean state in the default mode
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clean state in `mode`
    pub fn with_mode(mode: TranslationMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Create a clean state in `mode` with a traceback holding `capacity`
    /// frame names
    pub fn with_capacity(mode: TranslationMode, capacity: usize) -> Self {
        Self {
            native: ErrorSubsystem::with_capacity(capacity),
            mode,
            snapshot: None,
        }
    }

    /// The native error subsystem
    pub fn native(&self) -> &ErrorSubsystem {
        &self.native
    }

    /// The native error subsystem, for handing to a native call
    pub fn native_mut(&mut self) -> &mut ErrorSubsystem {
        &mut self.native
    }

    // ------------------------------------------------------------------------
    // Call frames
    // ------------------------------------------------------------------------

    /// Push a call frame
    pub fn enter(&mut self, name: &str) {
        self.native.enter(name);
    }

    /// Pop a call frame
    pub fn leave(&mut self, name: &str) {
        self.native.leave(name);
    }

    /// Current traceback depth
    pub fn depth(&self) -> usize {
        self.native.depth()
    }

    // ------------------------------------------------------------------------
    // Polling and raising
    // ------------------------------------------------------------------------

    /// Check whether the native layer is in the error state
    pub fn poll(&self) -> bool {
        let failed = self.native.failed();
        if failed {
            trace!(
                short = self.native.message(MessageKind::Short),
                "poll observed native failure"
            );
        }
        failed
    }

    /// Surface an outstanding native error according to the current mode.
    ///
    /// Raising modes capture, reset and return the error. `Ignore` resets
    /// without raising. `Silent` leaves the error set.
    pub fn raise_if_needed(&mut self) -> BridgeResult<()> {
        let Some(record) = ErrorRecord::capture(&self.native) else {
            return Ok(());
        };
        match self.mode {
            TranslationMode::Silent => Ok(()),
            TranslationMode::Ignore => {
                debug!(short = %record.short, "ignoring native error");
                self.native.reset();
                Ok(())
            }
            mode => {
                self.native.reset();
                let err = record.to_error(mode);
                debug!(short = %record.short, category = %err.category(), "raising native error");
                self.snapshot = Some(record);
                Err(err)
            }
        }
    }

    /// Poll and, if failed, surface the error. Returns whether the native
    /// layer was in the error state.
    pub fn check(&mut self) -> BridgeResult<bool> {
        let failed = self.poll();
        self.raise_if_needed()?;
        Ok(failed)
    }

    /// Run one native invocation bracketed by a call frame, then poll.
    pub fn call<R>(&mut self, name: &str, f: impl FnOnce(&mut ErrorSubsystem) -> R) -> BridgeResult<R> {
        self.native.enter(name);
        let result = f(&mut self.native);
        self.native.leave(name);
        self.raise_if_needed()?;
        Ok(result)
    }

    // ------------------------------------------------------------------------
    // Bridge-originated errors
    // ------------------------------------------------------------------------

    /// Signal an error identifier through the native channel
    pub fn signal(&mut self, identifier: &str, long: impl Into<String>) {
        self.native.signal_code(identifier, long);
    }

    /// Signal a buffer contract violation through the native channel
    pub fn signal_ffi(&mut self, err: &FfiError) {
        self.native.signal_ffi(err);
    }

    /// Reject an argument before any native call is made.
    ///
    /// Argument errors are always raised as their classified category,
    /// independent of the translation mode, and leave the native state clean.
    pub fn reject(&mut self, identifier: &str, long: impl Into<String>) -> BridgeError {
        self.native.signal_code(identifier, long);
        let err = match ErrorRecord::capture(&self.native) {
            Some(record) => {
                let err = record.to_error(TranslationMode::ClassifiedRaise);
                self.snapshot = Some(record);
                err
            }
            None => BridgeError::Runtime(NativeDiagnostic::default()),
        };
        self.native.reset();
        debug!(short = err.short(), "argument rejected");
        err
    }

    // ------------------------------------------------------------------------
    // Mode and messages
    // ------------------------------------------------------------------------

    /// Current translation mode
    pub fn mode(&self) -> TranslationMode {
        self.mode
    }

    /// Change the translation mode. Switching to `Ignore` clears any
    /// outstanding error.
    pub fn set_mode(&mut self, mode: TranslationMode) {
        debug!(from = %self.mode, to = %mode, "translation mode changed");
        self.mode = mode;
        if mode == TranslationMode::Ignore {
            self.native.reset();
        }
    }

    /// Message text for `kind`.
    ///
    /// Outside `Silent` mode this is the text of the last raised error, even
    /// if native buffers have been overwritten since. In `Silent` mode an
    /// outstanding native error takes precedence; with none outstanding the
    /// last raised error is reported.
    pub fn get_message(&self, kind: MessageKind) -> String {
        match (&self.snapshot, self.mode) {
            (Some(record), mode) if mode != TranslationMode::Silent || !self.native.failed() => {
                record.message(kind).to_string()
            }
            _ => self.native.message(kind).to_string(),
        }
    }

    /// The last error raised to the host
    pub fn last_raised(&self) -> Option<&ErrorRecord> {
        self.snapshot.as_ref()
    }

    /// Return to the clean state, clearing native buffers and the snapshot
    pub fn reset(&mut self) {
        self.native.reset();
        self.snapshot = None;
        debug!("error state reset");
    }
}
