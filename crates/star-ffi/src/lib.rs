//! # Starbridge FFI
//!
//! Native-side primitives for bridging a flat, scalar-oriented numerical
//! library to a host runtime.
//!
//! ## Overview
//!
//! The wrapped library exposes hundreds of independent entry points that
//! operate on fixed-size vectors and matrices and report failure only through
//! a process-wide error flag. This crate models that native surface:
//!
//! - [`buffer`]: typed contiguous memory handed to native calls
//!   (`NativeBuffer`) and memory allocated by the native side (`NativeAlloc`)
//! - [`element`]: element types the native library understands
//! - [`subsystem`]: the native error flag, message buffers and traceback
//! - [`messages`]: error identifiers synthesized by the bridge and their
//!   explanation text
//! - [`error`]: error types for buffer contract violations
//!
//! ## Threading
//!
//! The native error state is a single-slot context. It is not reentrant and
//! must not be shared between threads without external mutual exclusion.

pub mod buffer;
pub mod element;
pub mod error;
pub mod messages;
pub mod subsystem;

// Re-export main types for convenience
pub use buffer::{NativeAlloc, NativeBuffer};
pub use element::NativeElement;
pub use error::{FfiError, FfiResult};
pub use messages::{explain, short_code, strip_prefix, ERROR_PREFIX};
pub use subsystem::{ErrorSubsystem, MessageKind, MAX_TRACE_DEPTH};
