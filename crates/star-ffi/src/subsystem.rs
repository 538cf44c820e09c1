//! Native Error Subsystem
//!
//! The wrapped library has no return codes. A failing routine sets a global
//! error flag and fills three message buffers; callers find out by polling.
//! Routines also push their name on a bounded traceback stack on entry and pop
//! it on exit, and the stack is frozen when the first error is signalled so
//! the report names the call chain that produced it.
//!
//! `ErrorSubsystem` is that global state made explicit as a single-slot value.
//!
//! ## States
//!
//! - **Clean**: `failed()` is false, message buffers are empty
//! - **ErrorSet**: `failed()` is true until [`ErrorSubsystem::reset`]
//!
//! There is no error queue: a second signal overwrites the first.
//!
//! ## Threading
//!
//! Not reentrant. One instance corresponds to one native library instance,
//! which in turn is process-wide; concurrent use from several threads without
//! external locking is outside the contract.

use std::fmt;

use smol_str::SmolStr;
use tracing::{trace, warn};

use crate::error::FfiError;
use crate::messages::{self, codes, short_code};

/// Maximum number of frames the traceback stores by name
pub const MAX_TRACE_DEPTH: usize = 100;

/// Maximum length of the long error message, in characters
pub const LONG_MESSAGE_LEN: usize = 1840;

/// Message buffers the error subsystem exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// The short identifier, e.g. `LIB(ZEROVECTOR)`
    Short,
    /// The long, call-specific message
    Long,
    /// The explanation of the short identifier
    Explain,
}

impl MessageKind {
    /// Parse an option name (case-insensitive)
    pub fn parse(option: &str) -> Option<Self> {
        match option.trim().to_ascii_uppercase().as_str() {
            "SHORT" => Some(MessageKind::Short),
            "LONG" => Some(MessageKind::Long),
            "EXPLAIN" => Some(MessageKind::Explain),
            _ => None,
        }
    }

    /// Canonical option name
    pub fn name(&self) -> &'static str {
        match self {
            MessageKind::Short => "SHORT",
            MessageKind::Long => "LONG",
            MessageKind::Explain => "EXPLAIN",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The native library's process-wide error flag, messages and traceback.
#[derive(Debug, Clone)]
pub struct ErrorSubsystem {
    failed: bool,
    short: String,
    long: String,
    explain: String,
    frames: Vec<SmolStr>,
    capacity: usize,
    /// Frames entered while the stack was full; tracked by count only
    overflow: usize,
    frozen: Vec<SmolStr>,
    signals: u64,
}

impl ErrorSubsystem {
    /// Create a clean subsystem with the default traceback capacity
    pub fn new() -> Self {
        Self::with_capacity(MAX_TRACE_DEPTH)
    }

    /// Create a clean subsystem storing at most `capacity` frame names
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            failed: false,
            short: String::new(),
            long: String::new(),
            explain: String::new(),
            frames: Vec::with_capacity(capacity.min(MAX_TRACE_DEPTH)),
            capacity,
            overflow: 0,
            frozen: Vec::new(),
            signals: 0,
        }
    }

    // ------------------------------------------------------------------------
    // Error flag
    // ------------------------------------------------------------------------

    /// Check whether an error has been signalled and not yet reset
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Signal an error with a full short message such as `LIB(ZEROVECTOR)`.
    ///
    /// Overwrites any outstanding error and freezes the traceback.
    pub fn signal(&mut self, short: &str, long: impl Into<String>) {
        let mut long = long.into();
        if let Some((cut, _)) = long.char_indices().nth(LONG_MESSAGE_LEN) {
            long.truncate(cut);
        }
        if !self.failed {
            self.frozen = self.frames.clone();
        }
        self.failed = true;
        self.short = short.trim().to_string();
        self.explain = messages::explain(&self.short).to_string();
        self.long = long;
        self.signals += 1;
        trace!(short = %self.short, depth = self.depth(), "native error signalled");
    }

    /// Signal an error by bare identifier, e.g. `ZEROVECTOR`
    pub fn signal_code(&mut self, identifier: &str, long: impl Into<String>) {
        self.signal(&short_code(identifier), long);
    }

    /// Signal a buffer contract violation as a native-style error
    pub fn signal_ffi(&mut self, err: &FfiError) {
        self.signal_code(err.native_code(), err.to_string());
    }

    /// Clear the error flag, the message buffers and the frozen traceback.
    pub fn reset(&mut self) {
        self.failed = false;
        self.short.clear();
        self.long.clear();
        self.explain.clear();
        self.frozen.clear();
    }

    /// Read one of the message buffers
    pub fn message(&self, kind: MessageKind) -> &str {
        match kind {
            MessageKind::Short => &self.short,
            MessageKind::Long => &self.long,
            MessageKind::Explain => &self.explain,
        }
    }

    /// Total number of errors signalled since creation
    pub fn signal_count(&self) -> u64 {
        self.signals
    }

    // ------------------------------------------------------------------------
    // Traceback
    // ------------------------------------------------------------------------

    /// Push a frame for a routine that is starting
    pub fn enter(&mut self, name: &str) {
        if self.frames.len() < self.capacity {
            self.frames.push(SmolStr::new(name));
        } else {
            self.overflow += 1;
            warn!(name, capacity = self.capacity, "traceback full; frame tracked by count only");
        }
    }

    /// Pop the frame of a routine that is finishing.
    ///
    /// Leaving under a name other than the one on top of the stack signals
    /// `NAMESDONOTMATCH` unless an error is already outstanding. The frame is
    /// popped either way so depth stays balanced.
    pub fn leave(&mut self, name: &str) {
        if self.overflow > 0 {
            self.overflow -= 1;
            return;
        }
        match self.frames.pop() {
            Some(top) if top == name => {}
            Some(top) => {
                if !self.failed {
                    let err = FfiError::TraceMismatch {
                        expected: top.to_string(),
                        actual: name.to_string(),
                    };
                    self.signal_code(codes::NAMES_DO_NOT_MATCH, err.to_string());
                }
            }
            None => {
                if !self.failed {
                    self.signal_code(
                        codes::NAMES_DO_NOT_MATCH,
                        format!("leave('{}') called with an empty traceback", name),
                    );
                }
            }
        }
    }

    /// Current traceback depth, including frames tracked only by count
    pub fn depth(&self) -> usize {
        self.frames.len() + self.overflow
    }

    /// Maximum number of frames stored by name
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Names of the frames currently on the stack, outermost first
    pub fn frames(&self) -> &[SmolStr] {
        &self.frames
    }

    /// Call chain to report: the frozen chain while an error is outstanding,
    /// the live stack otherwise.
    pub fn trace(&self) -> Vec<String> {
        let source = if self.failed { &self.frozen } else { &self.frames };
        source.iter().map(|s| s.to_string()).collect()
    }
}

impl Default for ErrorSubsystem {
    fn default() -> Self {
        Self::new()
    }
}
