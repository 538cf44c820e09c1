//! # Starbridge
//!
//! Host-side bridge between a dynamically typed array runtime and a flat,
//! scalar-oriented native numerical library.
//!
//! ## Overview
//!
//! Native entry points take fixed-size vectors and matrices, write results
//! into caller-provided buffers, and report failure only through a global
//! error flag. This crate provides:
//!
//! - [`host_array`]: the host's dynamically typed, strided arrays
//! - [`array_bridge`]: host arrays to native buffers and back, zero-copy when
//!   layout and element type allow
//! - [`dynamic`]: outputs whose size is only known after the call
//! - [`classifier`]: native error identifier to host exception category
//! - [`error_state`]: polling the native error flag and translating it under
//!   the current [`TranslationMode`]
//! - [`broadcast`]: lifting a scalar entry point over leading batch dimensions
//! - [`config`] and [`boundary`]: settings and the host-visible entry points
//!
//! ## Example
//!
//! ```rust
//! use star_bridge::{array_bridge, ErrorState, HostArray};
//!
//! let mut state = ErrorState::new();
//! let v = HostArray::from_vec(vec![3.0f64, 4.0, 0.0], vec![3]).unwrap();
//! let arg = array_bridge::fixed_input::<f64>(&mut state, "v", &v, &[3]).unwrap();
//! let norm = state
//!     .call("vnorm", |_| arg.iter().map(|x| x * x).sum::<f64>().sqrt())
//!     .unwrap();
//! assert_eq!(norm, 5.0);
//! ```

pub mod array_bridge;
pub mod boundary;
pub mod broadcast;
pub mod classifier;
pub mod config;
pub mod dynamic;
pub mod error;
pub mod error_state;
pub mod host_array;

// Re-export main types for convenience
pub use array_bridge::{InoutArg, InputArg, OutputArg, TextArg};
pub use boundary::{erract, failed, getmsg, reset, with_context, BridgeContext};
pub use broadcast::{broadcast, broadcast_mixed, BroadcastArg, BroadcastOutput, BroadcastPlan, BroadcastRule};
pub use classifier::classify;
pub use config::{BridgeConfig, ConfigError};
pub use dynamic::{OverflowPolicy, ScratchSpec};
pub use error::{BridgeError, BridgeResult, ErrorCategory, NativeDiagnostic};
pub use error_state::{ErrorRecord, ErrorState, TranslationMode};
pub use host_array::{ArrayOwnership, DType, Element, ElementSlice, ElementSliceMut, HostArray, HostValue, Scalar};
