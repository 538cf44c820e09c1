//! Dynamically Sized Outputs
//!
//! Some native calls write a variable number of rows into a caller-provided
//! buffer and report the count afterwards; others allocate the result
//! themselves and hand back a pointer plus a count. Both are wrapped here.
//!
//! ## Protocol
//!
//! 1. Allocate call-scoped scratch with the capacity for the call site, or the
//!    caller's explicit maximum. An allocation failure is raised before the
//!    call in every translation mode, as for fixed outputs.
//! 2. Invoke the native call under a traceback frame.
//! 3. Poll immediately. On failure the scratch is freed, the reported count is
//!    not read, and the result has zero rows.
//! 4. Otherwise copy exactly `count` rows into a new host array. A count that
//!    does not fit the buffer signals `ARRAYTOOSMALL`.
//!
//! Scratch is never cached between calls.

use serde::{Deserialize, Serialize};
use star_ffi::{ErrorSubsystem, FfiError, NativeAlloc, NativeBuffer};
use tracing::{debug, warn};

use crate::error::BridgeResult;
use crate::error_state::ErrorState;
use crate::host_array::{Element, HostArray, HostValue};

/// What to do when a native call reports more rows than the scratch holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Signal `ARRAYTOOSMALL`
    #[default]
    Fail,
    /// Keep the first `capacity` rows
    Truncate,
}

/// Scratch sizing for one call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScratchSpec {
    /// Rows allocated when the caller does not give a maximum
    #[serde(rename = "default-capacity")]
    pub default_capacity: usize,
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl ScratchSpec {
    /// Sizing that fails on overflow, with the given default capacity
    pub const fn new(default_capacity: usize) -> Self {
        Self {
            default_capacity,
            overflow: OverflowPolicy::Fail,
        }
    }

    /// Same capacity, truncating on overflow
    pub const fn truncating(self) -> Self {
        Self {
            default_capacity: self.default_capacity,
            overflow: OverflowPolicy::Truncate,
        }
    }

    /// Effective capacity for a call
    pub fn capacity(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_capacity)
    }
}

impl Default for ScratchSpec {
    fn default() -> Self {
        Self::new(DEFAULT_ROWS)
    }
}

/// Capacity used by call sites that do not declare their own
pub const DEFAULT_ROWS: usize = 2000;

fn row_shape_with(count: usize, row_shape: &[usize]) -> Vec<usize> {
    let mut shape = Vec::with_capacity(row_shape.len() + 1);
    shape.push(count);
    shape.extend_from_slice(row_shape);
    shape
}

fn zero_rows<T: Element>(row_shape: &[usize]) -> HostArray {
    HostArray::zeros(T::DTYPE, row_shape_with(0, row_shape))
}

/// Raise (or not, per mode) the outstanding error and produce an empty result
fn failed_rows<T: Element>(state: &mut ErrorState, row_shape: &[usize]) -> BridgeResult<HostArray> {
    state.raise_if_needed()?;
    Ok(zero_rows::<T>(row_shape))
}

fn finish_rows<T: Element>(
    state: &mut ErrorState,
    values: Vec<T>,
    count: usize,
    row_shape: &[usize],
) -> BridgeResult<HostArray> {
    match HostArray::bridge_owned(T::into_data(values), row_shape_with(count, row_shape)) {
        Some(array) => Ok(array),
        None => Err(state.reject(
            star_ffi::messages::codes::BUG,
            "result rows do not match the reported count",
        )),
    }
}

/// Check the reported row count against capacity, signalling or truncating.
/// Must run inside the call's traceback frame so the error names it.
fn settle_count(
    native: &mut ErrorSubsystem,
    name: &str,
    spec: &ScratchSpec,
    count: usize,
    capacity: usize,
) -> usize {
    if native.failed() || count <= capacity {
        return count;
    }
    match spec.overflow {
        OverflowPolicy::Fail => {
            native.signal_ffi(&FfiError::buffer_overflow(count, capacity));
            count
        }
        OverflowPolicy::Truncate => {
            warn!(name, count, capacity, "native result truncated to scratch capacity");
            capacity
        }
    }
}

/// Wrap a call that writes up to `capacity` rows of `row_shape` into scratch
/// and reports how many it wrote.
///
/// The call receives the native error subsystem, the scratch and a location
/// for the row count.
pub fn rows<T, F>(
    state: &mut ErrorState,
    name: &str,
    spec: &ScratchSpec,
    requested: Option<usize>,
    row_shape: &[usize],
    call: F,
) -> BridgeResult<HostArray>
where
    T: Element,
    F: FnOnce(&mut ErrorSubsystem, &mut [T], &mut usize),
{
    let capacity = spec.capacity(requested);
    let row_len: usize = row_shape.iter().product();

    let mut scratch = match NativeBuffer::<T>::scratch(capacity.saturating_mul(row_len)) {
        Ok(scratch) => scratch,
        Err(err) => return Err(state.reject(err.native_code(), err.to_string())),
    };
    debug!(name, capacity, row_len, "scratch allocated");

    state.enter(name);
    let mut count = 0usize;
    match scratch.as_mut_slice() {
        Ok(slice) => call(state.native_mut(), slice, &mut count),
        Err(err) => state.signal_ffi(&err),
    }
    let count = settle_count(state.native_mut(), name, spec, count, capacity);
    state.leave(name);

    if state.poll() {
        drop(scratch);
        return failed_rows::<T>(state, row_shape);
    }

    let values = match count.checked_mul(row_len) {
        Some(len) => scratch.valid_prefix(len),
        None => Err(FfiError::buffer_overflow(count, capacity)),
    };
    match values {
        Ok(values) => finish_rows(state, values, count, row_shape),
        Err(err) => {
            state.signal_ffi(&err);
            failed_rows::<T>(state, row_shape)
        }
    }
}

/// Wrap a call that allocates its own result and reports a row count.
///
/// The call returns the native allocation, if it made one. The allocation is
/// released before this function returns, on failure as well as success.
pub fn native_owned<T, F>(
    state: &mut ErrorState,
    name: &str,
    row_shape: &[usize],
    call: F,
) -> BridgeResult<HostArray>
where
    T: Element,
    F: FnOnce(&mut ErrorSubsystem, &mut usize) -> Option<NativeAlloc<T>>,
{
    let row_len: usize = row_shape.iter().product();
    let mut count = 0usize;

    state.enter(name);
    let alloc = call(state.native_mut(), &mut count);
    let mut len = 0;
    if !state.poll() {
        let available = alloc.as_ref().map_or(0, |alloc| alloc.len());
        match count.checked_mul(row_len) {
            _ if alloc.is_none() && count > 0 => state.signal_ffi(&FfiError::null_pointer(format!(
                "{} reported {} rows but returned no data",
                name, count
            ))),
            Some(n) if n <= available => len = n,
            _ => state.signal_ffi(&FfiError::buffer_overflow(count, available / row_len.max(1))),
        }
    }
    state.leave(name);

    if state.poll() {
        drop(alloc);
        return failed_rows::<T>(state, row_shape);
    }

    let values = match &alloc {
        Some(alloc) => alloc.valid_prefix(len),
        None => Ok(Vec::new()),
    };
    drop(alloc);
    match values {
        Ok(values) => finish_rows(state, values, count, row_shape),
        Err(err) => {
            state.signal_ffi(&err);
            failed_rows::<T>(state, row_shape)
        }
    }
}

/// Wrap a call whose reported count of zero means a single scalar result in
/// the first scratch slot rather than an empty array.
pub fn scalar_or_array<T, F>(
    state: &mut ErrorState,
    name: &str,
    spec: &ScratchSpec,
    requested: Option<usize>,
    call: F,
) -> BridgeResult<HostValue>
where
    T: Element,
    F: FnOnce(&mut ErrorSubsystem, &mut [T], &mut usize),
{
    let mut scalar = None;
    let array = rows::<T, _>(state, name, spec, requested.map(|n| n.max(1)), &[], |native, slice, count| {
        call(native, slice, count);
        if *count == 0 && !native.failed() {
            scalar = slice.first().copied();
        }
    })?;
    if state.poll() {
        return Ok(HostValue::Array(array));
    }
    match scalar {
        Some(value) if array.size() == 0 => Ok(HostValue::Scalar(value.to_scalar())),
        _ => Ok(HostValue::Array(array)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::error_state::TranslationMode;
    use crate::host_array::Scalar;
    use pretty_assertions::assert_eq;

    fn fill(n: usize) -> impl FnOnce(&mut ErrorSubsystem, &mut [f64], &mut usize) {
        move |_, out, count| {
            for (i, v) in out.iter_mut().take(n * 2).enumerate() {
                *v = i as f64;
            }
            *count = n;
        }
    }

    #[test]
    fn test_rows_exact_count() {
        let mut state = ErrorState::new();
        let arr = rows(&mut state, "gfposc", &ScratchSpec::new(10), None, &[2], fill(3)).unwrap();
        assert_eq!(arr.shape(), &[3, 2]);
        assert_eq!(arr.to_vec::<f64>().unwrap(), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(state.depth(), 0);
    }

    #[test]
    fn test_rows_caller_capacity() {
        let mut state = ErrorState::new();
        let mut seen = 0;
        let arr = rows::<f64, _>(&mut state, "wnfetd", &ScratchSpec::new(10), Some(4), &[], |_, out, count| {
            seen = out.len();
            *count = 4;
        })
        .unwrap();
        assert_eq!(seen, 4);
        assert_eq!(arr.shape(), &[4]);
    }

    #[test]
    fn test_rows_failure_is_empty_and_classified() {
        let mut state = ErrorState::with_mode(TranslationMode::Silent);
        let arr = rows::<f64, _>(&mut state, "gfdist", &ScratchSpec::new(8), None, &[2], |native, _, count| {
            *count = 5;
            native.signal_code("ZEROVECTOR", "degenerate geometry");
        })
        .unwrap();
        assert_eq!(arr.shape(), &[0, 2]);
        assert!(state.poll());

        let mut state = ErrorState::new();
        let err = rows::<f64, _>(&mut state, "gfdist", &ScratchSpec::new(8), None, &[2], |native, _, _| {
            native.signal_code("ZEROVECTOR", "degenerate geometry");
        })
        .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Value);
        assert_eq!(err.diagnostic().trace, vec!["gfdist".to_string()]);
    }

    #[test]
    fn test_rows_overflow_fails() {
        let mut state = ErrorState::new();
        let err = rows::<f64, _>(&mut state, "ekfind", &ScratchSpec::new(2), None, &[], |_, _, count| {
            *count = 3;
        })
        .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Memory);
        assert_eq!(err.short(), "LIB(ARRAYTOOSMALL)");
    }

    #[test]
    fn test_rows_overflow_truncates() {
        let mut state = ErrorState::new();
        let spec = ScratchSpec::new(2).truncating();
        let arr = rows::<f64, _>(&mut state, "ekfind", &spec, None, &[], |_, out, count| {
            out.copy_from_slice(&[7.0, 8.0]);
            *count = 3;
        })
        .unwrap();
        assert_eq!(arr.to_vec::<f64>().unwrap(), vec![7.0, 8.0]);
        assert!(!state.poll());
    }

    #[test]
    fn test_native_owned_releases_and_copies() {
        let mut state = ErrorState::new();
        let arr = native_owned::<i32, _>(&mut state, "dskobj", &[], |_, count| {
            let mut alloc = NativeAlloc::<i32>::allocate(5).ok()?;
            alloc[..3].copy_from_slice(&[399, 301, 10]);
            *count = 3;
            Some(alloc)
        })
        .unwrap();
        assert_eq!(arr.to_vec::<i32>().unwrap(), vec![399, 301, 10]);
    }

    #[test]
    fn test_native_owned_null_with_count() {
        let mut state = ErrorState::new();
        let err = native_owned::<i32, _>(&mut state, "dskobj", &[], |_, count| {
            *count = 2;
            None
        })
        .unwrap_err();
        assert_eq!(err.short(), "LIB(NULLPOINTER)");
    }

    #[test]
    fn test_native_owned_failure_releases_partial() {
        let mut state = ErrorState::with_mode(TranslationMode::Ignore);
        let arr = native_owned::<f64, _>(&mut state, "spkobj", &[3], |native, count| {
            let alloc = NativeAlloc::<f64>::allocate(9).ok();
            *count = 3;
            native.signal_code("FILENOTFOUND", "no such kernel");
            alloc
        })
        .unwrap();
        assert_eq!(arr.shape(), &[0, 3]);
        assert!(!state.poll());
    }

    #[test]
    fn test_rows_scratch_failure_raises_in_every_mode() {
        let mut state = ErrorState::with_mode(TranslationMode::Silent);
        let mut called = false;
        let err = rows::<f64, _>(&mut state, "gfposc", &ScratchSpec::new(usize::MAX / 4), None, &[3], |_, _, _| {
            called = true;
        })
        .unwrap_err();
        assert!(!called);
        assert_eq!(err.category(), ErrorCategory::Memory);
        assert_eq!(err.short(), "LIB(MALLOCFAILURE)");
        assert_eq!(state.depth(), 0);
    }

    #[test]
    fn test_native_owned_huge_count() {
        let mut state = ErrorState::new();
        let err = native_owned::<f64, _>(&mut state, "spkobj", &[3], |_, count| {
            *count = usize::MAX / 2;
            NativeAlloc::<f64>::allocate(3).ok()
        })
        .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Memory);
        assert_eq!(err.short(), "LIB(ARRAYTOOSMALL)");
        assert_eq!(err.diagnostic().trace, vec!["spkobj".to_string()]);
        assert_eq!(state.depth(), 0);
    }

    #[test]
    fn test_native_owned_count_past_allocation() {
        let mut state = ErrorState::with_mode(TranslationMode::Silent);
        let arr = native_owned::<i32, _>(&mut state, "dskobj", &[2], |_, count| {
            *count = 3;
            NativeAlloc::<i32>::allocate(4).ok()
        })
        .unwrap();
        assert_eq!(arr.shape(), &[0, 2]);
        assert!(state.poll());

        state.set_mode(TranslationMode::ClassifiedRaise);
        let err = state.raise_if_needed().unwrap_err();
        assert_eq!(err.short(), "LIB(ARRAYTOOSMALL)");
    }

    #[test]
    fn test_scalar_or_array_failure() {
        let failing = |native: &mut ErrorSubsystem, out: &mut [f64], count: &mut usize| {
            out[0] = 1.0;
            *count = 0;
            native.signal_code("BODYNAMENOTFOUND", "no such body");
        };

        let mut state = ErrorState::new();
        let err = scalar_or_array::<f64, _>(&mut state, "bodvrd", &ScratchSpec::new(3), None, failing).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Key);

        let mut state = ErrorState::with_mode(TranslationMode::Silent);
        let value = scalar_or_array::<f64, _>(&mut state, "bodvrd", &ScratchSpec::new(3), None, failing).unwrap();
        assert_eq!(value.as_array().unwrap().shape(), &[0]);
        assert!(state.poll());
    }

    #[test]
    fn test_scalar_or_array() {
        let mut state = ErrorState::new();
        let value = scalar_or_array::<f64, _>(&mut state, "bodvrd", &ScratchSpec::new(3), None, |_, out, count| {
            out[0] = 6378.1366;
            *count = 0;
        })
        .unwrap();
        assert_eq!(value.as_scalar(), Some(&Scalar::Float(6378.1366)));

        let value = scalar_or_array::<f64, _>(&mut state, "bodvrd", &ScratchSpec::new(3), None, |_, out, count| {
            out.copy_from_slice(&[1.0, 2.0, 3.0]);
            *count = 3;
        })
        .unwrap();
        assert_eq!(value.as_array().unwrap().shape(), &[3]);
    }
}
