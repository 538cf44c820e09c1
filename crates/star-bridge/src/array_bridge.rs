//! Array Marshalling
//!
//! Converts host arrays into the typed contiguous buffers a native call
//! consumes, and wraps native results back into host arrays.
//!
//! ## Copy Avoidance
//!
//! When a host array is already C-contiguous with exactly the element type the
//! native call wants, the argument borrows its storage in place. Otherwise a
//! converted, contiguous temporary is made. [`InputArg::is_zero_copy`] tells
//! which path was taken.
//!
//! ## Rejections
//!
//! Argument problems are detected before the native call is made and are
//! raised as classified errors in every translation mode:
//!
//! - a scalar where an array was required: `NOTASEQUENCE`
//! - a shape other than the declared one: `BADARRAYSHAPE`
//! - an element type that does not convert: `WRONGDATATYPE`
//! - an integer that does not fit the native width: `VALUEOUTOFRANGE`
//! - output storage that cannot be allocated: `MALLOCFAILURE`
//! - storage already borrowed by an in/out argument of the same call:
//!   `ALIASEDARGUMENT`
//!
//! Storage locks are never waited on. An array passed both as an in/out
//! argument and as any other argument of one call, directly or through a
//! view, is rejected instead.

use std::ops::Deref;

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard};
use star_ffi::messages::codes;
use star_ffi::NativeBuffer;
use tracing::debug;

use crate::error::{BridgeError, BridgeResult};
use crate::error_state::ErrorState;
use crate::host_array::{CastError, Element, HostArray, HostData, HostValue};

fn format_shape(shape: &[usize]) -> String {
    match shape {
        [n] => format!("({},)", n),
        _ => {
            let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
            format!("({})", dims.join(", "))
        }
    }
}

/// Require an array where a host value was supplied.
pub fn as_array<'a>(state: &mut ErrorState, name: &str, value: &'a HostValue) -> BridgeResult<&'a HostArray> {
    match value {
        HostValue::Array(array) => Ok(array),
        HostValue::Scalar(scalar) => Err(state.reject(
            codes::NOT_A_SEQUENCE,
            format!(
                "Argument '{}' must be an array; a scalar of type {} was supplied.",
                name,
                scalar.type_name()
            ),
        )),
    }
}

fn check_shape(state: &mut ErrorState, name: &str, array: &HostArray, shape: &[usize]) -> BridgeResult<()> {
    if array.shape() != shape {
        return Err(state.reject(
            codes::BAD_ARRAY_SHAPE,
            format!(
                "Argument '{}' has shape {} but shape {} is required.",
                name,
                format_shape(array.shape()),
                format_shape(shape)
            ),
        ));
    }
    Ok(())
}

// ============================================================================
// Inputs
// ============================================================================

enum InputStorage<'a, T: Element> {
    Borrowed(MappedRwLockReadGuard<'a, [T]>),
    Converted(Vec<T>),
}

/// A read-only argument marshalled for a native call.
pub struct InputArg<'a, T: Element> {
    storage: InputStorage<'a, T>,
    shape: Vec<usize>,
}

impl<'a, T: Element> InputArg<'a, T> {
    /// Contents as a contiguous slice
    pub fn as_slice(&self) -> &[T] {
        match &self.storage {
            InputStorage::Borrowed(view) => &**view,
            InputStorage::Converted(values) => values.as_slice(),
        }
    }

    /// Buffer to hand to the native call
    pub fn as_native(&self) -> NativeBuffer<'_, T> {
        NativeBuffer::Borrowed(self.as_slice())
    }

    /// Check whether the argument aliases the caller's storage
    pub fn is_zero_copy(&self) -> bool {
        matches!(self.storage, InputStorage::Borrowed(_))
    }

    /// Shape of the host array
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a, T: Element> Deref for InputArg<'a, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

fn marshal<'a, T: Element>(
    state: &mut ErrorState,
    name: &str,
    array: &'a HostArray,
) -> BridgeResult<InputArg<'a, T>> {
    let shape = array.shape().to_vec();
    if let Some(view) = array.borrow_native::<T>() {
        return Ok(InputArg {
            storage: InputStorage::Borrowed(view),
            shape,
        });
    }
    match array.to_vec_as::<T>() {
        Ok(values) => {
            debug!(
                name,
                from = %array.dtype(),
                to = %T::DTYPE,
                contiguous = array.is_contiguous(),
                "argument copied to temporary"
            );
            Ok(InputArg {
                storage: InputStorage::Converted(values),
                shape,
            })
        }
        Err(CastError::Unsupported) => Err(state.reject(
            codes::WRONG_DATA_TYPE,
            format!(
                "Argument '{}' has element type {} which cannot be converted to {}.",
                name,
                array.dtype(),
                T::DTYPE
            ),
        )),
        Err(CastError::OutOfRange) => Err(state.reject(
            codes::VALUE_OUT_OF_RANGE,
            format!(
                "Argument '{}' contains a value that does not fit in {}.",
                name,
                T::DTYPE
            ),
        )),
        Err(CastError::Busy) => Err(aliased(state, name)),
    }
}

fn aliased(state: &mut ErrorState, name: &str) -> BridgeError {
    state.reject(
        codes::ALIASED_ARGUMENT,
        format!(
            "Argument '{}' shares storage with an in/out argument of the same call.",
            name
        ),
    )
}

/// Marshal an array whose shape is fixed by the native signature.
pub fn fixed_input<'a, T: Element>(
    state: &mut ErrorState,
    name: &str,
    array: &'a HostArray,
    shape: &[usize],
) -> BridgeResult<InputArg<'a, T>> {
    check_shape(state, name, array, shape)?;
    marshal(state, name, array)
}

/// Marshal an array of any shape. The element count travels with the buffer.
pub fn varying_input<'a, T: Element>(
    state: &mut ErrorState,
    name: &str,
    array: &'a HostArray,
) -> BridgeResult<InputArg<'a, T>> {
    marshal(state, name, array)
}

// ============================================================================
// In/Out
// ============================================================================

enum InoutStorage<'a, T: Element> {
    Borrowed(MappedRwLockWriteGuard<'a, [T]>),
    Temporary(Vec<T>),
}

/// An argument the native call reads and overwrites.
///
/// Writes go straight into the caller's storage when it could be borrowed.
/// Otherwise they land in a temporary that [`InoutArg::commit`] copies back;
/// dropping an uncommitted temporary discards them.
pub struct InoutArg<'a, T: Element> {
    target: &'a HostArray,
    storage: InoutStorage<'a, T>,
}

impl<'a, T: Element> InoutArg<'a, T> {
    /// Contents for the native call to modify
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match &mut self.storage {
            InoutStorage::Borrowed(view) => &mut **view,
            InoutStorage::Temporary(values) => values.as_mut_slice(),
        }
    }

    /// Buffer to hand to the native call
    pub fn as_native(&mut self) -> NativeBuffer<'_, T> {
        NativeBuffer::BorrowedMut(self.as_mut_slice())
    }

    /// Check whether writes go directly into the caller's storage
    pub fn is_zero_copy(&self) -> bool {
        matches!(self.storage, InoutStorage::Borrowed(_))
    }

    /// Make the native call's changes visible in the caller's array.
    ///
    /// Fails with `ALIASEDARGUMENT` if a temporary cannot be copied back
    /// because another argument still borrows the storage.
    pub fn commit(self, state: &mut ErrorState, name: &str) -> BridgeResult<()> {
        match self.storage {
            InoutStorage::Borrowed(_) => Ok(()),
            InoutStorage::Temporary(values) => {
                if self.target.write_from(&values) {
                    Ok(())
                } else {
                    Err(aliased(state, name))
                }
            }
        }
    }
}

/// Marshal an in/out argument. The element type must match exactly.
pub fn inout_arg<'a, T: Element>(
    state: &mut ErrorState,
    name: &str,
    array: &'a HostArray,
    shape: &[usize],
) -> BridgeResult<InoutArg<'a, T>> {
    check_shape(state, name, array, shape)?;
    if array.dtype() != T::DTYPE {
        return Err(state.reject(
            codes::WRONG_DATA_TYPE,
            format!(
                "In/out argument '{}' has element type {}; {} is required.",
                name,
                array.dtype(),
                T::DTYPE
            ),
        ));
    }
    if array.is_borrowed() {
        return Err(aliased(state, name));
    }
    if let Some(view) = array.borrow_native_mut::<T>() {
        return Ok(InoutArg {
            target: array,
            storage: InoutStorage::Borrowed(view),
        });
    }
    match array.to_vec_as::<T>() {
        Ok(values) => Ok(InoutArg {
            target: array,
            storage: InoutStorage::Temporary(values),
        }),
        Err(CastError::Busy) => Err(aliased(state, name)),
        Err(_) => Err(state.reject(
            codes::BUG,
            format!("In/out argument '{}' could not be read.", name),
        )),
    }
}

// ============================================================================
// Outputs
// ============================================================================

/// A fixed-shape output allocated before the native call.
#[derive(Debug)]
pub struct OutputArg<T: Element> {
    values: Vec<T>,
    shape: Vec<usize>,
}

impl<T: Element> OutputArg<T> {
    /// Contents for the native call to fill
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.values
    }

    /// Buffer to hand to the native call
    pub fn as_native(&mut self) -> NativeBuffer<'_, T> {
        NativeBuffer::BorrowedMut(&mut self.values)
    }

    /// Declared shape
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Hand the filled storage to the host
    pub fn into_array(self) -> Option<HostArray> {
        HostArray::bridge_owned(T::into_data(self.values), self.shape)
    }
}

/// Allocate an output of a fixed shape.
pub fn fixed_output<T: Element>(state: &mut ErrorState, shape: &[usize]) -> BridgeResult<OutputArg<T>> {
    let len = shape.iter().product();
    match NativeBuffer::<T>::scratch(len) {
        Ok(NativeBuffer::Scratch(values)) => Ok(OutputArg {
            values,
            shape: shape.to_vec(),
        }),
        Ok(_) => Err(state.reject(codes::BUG, "scratch allocation returned a borrowed buffer")),
        Err(err) => Err(state.reject(err.native_code(), err.to_string())),
    }
}

// ============================================================================
// Text
// ============================================================================

/// Fixed-width text marshalled as NUL-padded records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextArg {
    width: usize,
    records: Vec<u8>,
    shape: Vec<usize>,
}

impl TextArg {
    /// Bytes per record
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of records
    pub fn count(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.records.len() / self.width
        }
    }

    /// Shape of the host array
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// All records, concatenated
    pub fn records(&self) -> &[u8] {
        &self.records
    }

    /// Records for the native call to fill
    pub fn records_mut(&mut self) -> &mut [u8] {
        &mut self.records
    }

    /// One record, including its padding
    pub fn record(&self, index: usize) -> Option<&[u8]> {
        let start = index.checked_mul(self.width)?;
        self.records.get(start..start + self.width)
    }

    /// Write `text` into record `index`, truncating to the record width.
    pub fn set(&mut self, index: usize, text: &str) -> bool {
        let width = self.width;
        let start = index * width;
        match self.records.get_mut(start..start + width) {
            Some(record) => {
                record.fill(0);
                let n = text.len().min(width);
                record[..n].copy_from_slice(&text.as_bytes()[..n]);
                true
            }
            None => false,
        }
    }

    /// Hand the records to the host as a text array
    pub fn into_array(self) -> Option<HostArray> {
        HostArray::bridge_owned(
            HostData::Text {
                width: self.width,
                bytes: self.records,
            },
            self.shape,
        )
    }
}

/// Marshal a text array for a native call.
pub fn text_input(state: &mut ErrorState, name: &str, array: &HostArray) -> BridgeResult<TextArg> {
    match array.text_records() {
        Some((width, records)) => Ok(TextArg {
            width,
            records,
            shape: array.shape().to_vec(),
        }),
        None => Err(state.reject(
            codes::WRONG_DATA_TYPE,
            format!(
                "Argument '{}' has element type {}; a text array is required.",
                name,
                array.dtype()
            ),
        )),
    }
}

/// Allocate a text output of `shape` with `width`-byte records.
pub fn text_output(state: &mut ErrorState, shape: &[usize], width: usize) -> BridgeResult<TextArg> {
    let len = shape.iter().product::<usize>().saturating_mul(width);
    match NativeBuffer::<u8>::scratch(len) {
        Ok(NativeBuffer::Scratch(records)) => Ok(TextArg {
            width,
            records,
            shape: shape.to_vec(),
        }),
        Ok(_) => Err(state.reject(codes::BUG, "scratch allocation returned a borrowed buffer")),
        Err(err) => Err(state.reject(err.native_code(), err.to_string())),
    }
}
