//! Host Entry Points
//!
//! The externally visible error-control surface:
//!
//! - `erract("GET")` / `erract("SET", mode)`: read or change the translation
//!   mode (`RETURN`, `EXCEPTION`, `RUNTIME`, `IGNORE`)
//! - `getmsg(option)`: message text for `SHORT`, `LONG` or `EXPLAIN`
//! - `reset()` / `failed()`
//!
//! ## Context
//!
//! The native library's error state is process-wide. The bridge keeps it in
//! one [`BridgeContext`] per thread, created on first use from
//! [`BridgeConfig::default`] plus environment overrides. Wrapped entry points
//! reach it through [`with_context`].
//!
//! The native library itself is not thread-safe. Running wrapped calls from
//! several threads, each with its own context, does not make it so; callers
//! must serialize native calls externally.
//!
//! `with_context` is not reentrant. A nested call returns a `RuntimeError`
//! instead of aliasing the state.

use std::cell::{Cell, RefCell};

use star_ffi::messages::codes;
use star_ffi::{short_code, ErrorSubsystem, MessageKind};
use tracing::{debug, warn};

use crate::broadcast::{self, BroadcastArg, BroadcastOutput};
use crate::config::BridgeConfig;
use crate::dynamic;
use crate::error::{BridgeError, BridgeResult, NativeDiagnostic};
use crate::error_state::{ErrorState, TranslationMode};
use crate::host_array::{Element, ElementSlice, ElementSliceMut, HostArray, HostValue};

/// Error state and settings shared by all wrapped calls on a thread
#[derive(Debug)]
pub struct BridgeContext {
    pub state: ErrorState,
    pub config: BridgeConfig,
}

impl BridgeContext {
    /// Build a context from settings
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            state: config.error_state(),
            config,
        }
    }

    /// Build a context from default settings and the environment
    pub fn from_env() -> Self {
        let config = match BridgeConfig::default().with_env_overrides() {
            Ok(config) => config,
            Err(err) => {
                warn!(%err, "ignoring environment override");
                BridgeConfig::default()
            }
        };
        Self::new(config)
    }

    /// [`broadcast::broadcast`] under the configured broadcast rule
    pub fn broadcast<I, O, F>(
        &mut self,
        name: &str,
        inputs: &[BroadcastArg<'_>],
        outputs: &[&[usize]],
        call: F,
    ) -> BridgeResult<Vec<HostArray>>
    where
        I: Element,
        O: Element,
        F: FnMut(&mut ErrorSubsystem, &[&[I]], &mut [&mut [O]]),
    {
        broadcast::broadcast(&mut self.state, name, inputs, outputs, self.config.broadcast, call)
    }

    /// [`broadcast::broadcast_mixed`] under the configured broadcast rule
    pub fn broadcast_mixed<F>(
        &mut self,
        name: &str,
        inputs: &[BroadcastArg<'_>],
        outputs: &[BroadcastOutput<'_>],
        call: F,
    ) -> BridgeResult<Vec<HostArray>>
    where
        F: FnMut(&mut ErrorSubsystem, &[ElementSlice<'_>], &mut [ElementSliceMut<'_>]),
    {
        broadcast::broadcast_mixed(&mut self.state, name, inputs, outputs, self.config.broadcast, call)
    }

    /// [`dynamic::rows`] with the scratch sizing configured for `site`
    pub fn rows<T, F>(
        &mut self,
        site: &str,
        requested: Option<usize>,
        row_shape: &[usize],
        call: F,
    ) -> BridgeResult<HostArray>
    where
        T: Element,
        F: FnOnce(&mut ErrorSubsystem, &mut [T], &mut usize),
    {
        let spec = self.config.scratch_spec(site);
        dynamic::rows(&mut self.state, site, &spec, requested, row_shape, call)
    }

    /// [`dynamic::scalar_or_array`] with the scratch sizing configured for
    /// `site`
    pub fn scalar_or_array<T, F>(&mut self, site: &str, requested: Option<usize>, call: F) -> BridgeResult<HostValue>
    where
        T: Element,
        F: FnOnce(&mut ErrorSubsystem, &mut [T], &mut usize),
    {
        let spec = self.config.scratch_spec(site);
        dynamic::scalar_or_array(&mut self.state, site, &spec, requested, call)
    }
}

thread_local! {
    static CONTEXT: RefCell<BridgeContext> = RefCell::new(BridgeContext::from_env());

    /// Nesting depth of `with_context`, for diagnostics
    static CONTEXT_DEPTH: Cell<usize> = const { Cell::new(0) };
}

fn reentrant_error() -> BridgeError {
    BridgeError::Runtime(NativeDiagnostic::new(
        short_code(codes::BUG),
        "The bridge context was entered again while already in use.",
        star_ffi::explain(codes::BUG),
        Vec::new(),
    ))
}

/// Holds one level of `CONTEXT_DEPTH`, released on drop even if the
/// wrapped call unwinds
struct DepthGuard;

impl DepthGuard {
    fn enter() -> Self {
        CONTEXT_DEPTH.with(|d| d.set(d.get() + 1));
        DepthGuard
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        CONTEXT_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Current nesting depth of [`with_context`] on this thread
pub fn context_depth() -> usize {
    CONTEXT_DEPTH.with(|d| d.get())
}

/// Run `f` with this thread's bridge context.
pub fn with_context<R>(f: impl FnOnce(&mut BridgeContext) -> BridgeResult<R>) -> BridgeResult<R> {
    CONTEXT.with(|cell| {
        let mut context = cell.try_borrow_mut().map_err(|_| {
            warn!(depth = context_depth(), "reentrant bridge context");
            reentrant_error()
        })?;
        let _depth = DepthGuard::enter();
        f(&mut context)
    })
}

/// Replace this thread's context with a fresh one built from `config`
pub fn configure(config: BridgeConfig) -> BridgeResult<()> {
    with_context(|context| {
        debug!(mode = %config.error_mode, "bridge reconfigured");
        *context = BridgeContext::new(config);
        Ok(())
    })
}

// ============================================================================
// Operations on an explicit state
// ============================================================================

/// `erract` against an explicit error state.
///
/// `GET` returns the current mode; `SET` changes it and returns the new mode.
/// Unknown verbs and mode names are rejected with `INVALIDACTION`.
pub fn erract_in(state: &mut ErrorState, op: &str, value: Option<&str>) -> BridgeResult<TranslationMode> {
    match op.trim().to_ascii_uppercase().as_str() {
        "GET" => Ok(state.mode()),
        "SET" => {
            let Some(value) = value else {
                return Err(state.reject(codes::INVALID_ACTION, "SET requires a mode."));
            };
            match value.parse::<TranslationMode>() {
                Ok(mode) => {
                    state.set_mode(mode);
                    Ok(mode)
                }
                Err(err) => Err(state.reject(codes::INVALID_ACTION, err.to_string())),
            }
        }
        other => Err(state.reject(
            codes::INVALID_ACTION,
            format!("'{}' is not a recognized operation; expected GET or SET.", other),
        )),
    }
}

/// `getmsg` against an explicit error state.
pub fn getmsg_in(state: &mut ErrorState, option: &str) -> BridgeResult<String> {
    match MessageKind::parse(option) {
        Some(kind) => Ok(state.get_message(kind)),
        None => Err(state.reject(
            codes::INVALID_OPTION,
            format!(
                "'{}' is not a recognized message option; expected SHORT, LONG or EXPLAIN.",
                option
            ),
        )),
    }
}

// ============================================================================
// Operations on this thread's context
// ============================================================================

/// Read (`GET`) or change (`SET`) the translation mode
pub fn erract(op: &str, value: Option<&str>) -> BridgeResult<TranslationMode> {
    with_context(|context| erract_in(&mut context.state, op, value))
}

/// Message text of the current or last raised error
pub fn getmsg(option: &str) -> BridgeResult<String> {
    with_context(|context| getmsg_in(&mut context.state, option))
}

/// Return the error state to clean
pub fn reset() -> BridgeResult<()> {
    with_context(|context| {
        context.state.reset();
        Ok(())
    })
}

/// Check whether the native layer is in the error state
pub fn failed() -> BridgeResult<bool> {
    with_context(|context| Ok(context.state.poll()))
}
