//! Host Array Representation
//!
//! Dynamically typed, dynamically shaped arrays as the host runtime presents
//! them at the boundary.
//!
//! ## Storage
//!
//! Element data lives in a typed [`HostData`] vector behind
//! `Arc<RwLock<..>>`, so slices, transposes and reshapes are views that alias
//! their base array. A view is described entirely by its [`ArrayLayout`]:
//! shape, strides in elements, and an element offset into the storage.
//!
//! ## Element Types
//!
//! Integers (`int32`, `int64`), floats (`float32`, `float64`), booleans and
//! fixed-width text. Text elements are `width`-byte records, NUL padded.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use star_ffi::NativeElement;

// ============================================================================
// DType
// ============================================================================

/// Element type of a host array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// Boolean
    Bool,
    /// Signed 32-bit integer
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// Fixed-width byte string
    Text {
        /// Bytes per element
        width: usize,
    },
}

impl DType {
    /// Size in bytes of one element
    pub fn size(&self) -> usize {
        match self {
            DType::Bool => 1,
            DType::Int32 | DType::Float32 => 4,
            DType::Int64 | DType::Float64 => 8,
            DType::Text { width } => *width,
        }
    }

    /// Type name, e.g. `float64` or `S32`
    pub fn name(&self) -> String {
        match self {
            DType::Bool => "bool".to_string(),
            DType::Int32 => "int32".to_string(),
            DType::Int64 => "int64".to_string(),
            DType::Float32 => "float32".to_string(),
            DType::Float64 => "float64".to_string(),
            DType::Text { width } => format!("S{}", width),
        }
    }

    /// Parse a dtype name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bool" | "bool_" | "?" => Some(DType::Bool),
            "int32" | "i4" | "i" => Some(DType::Int32),
            "int64" | "i8" | "l" | "int" => Some(DType::Int64),
            "float32" | "f4" | "f" => Some(DType::Float32),
            "float64" | "f8" | "d" | "float" => Some(DType::Float64),
            _ => s
                .strip_prefix('S')
                .and_then(|w| w.parse().ok())
                .map(|width| DType::Text { width }),
        }
    }

    /// Check if this is an integer type
    pub fn is_integer(&self) -> bool {
        matches!(self, DType::Int32 | DType::Int64)
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, DType::Float32 | DType::Float64)
    }

    /// Check if this is a text type
    pub fn is_text(&self) -> bool {
        matches!(self, DType::Text { .. })
    }

    /// Check whether values of this type may be converted to `target` when an
    /// argument is marshalled. Integer narrowing is allowed but range-checked
    /// per element.
    pub fn casts_to(&self, target: DType) -> bool {
        if *self == target {
            return true;
        }
        match (self, target) {
            (DType::Text { .. }, _) | (_, DType::Text { .. }) => false,
            (_, DType::Bool) => false,
            (DType::Bool, _) => true,
            (DType::Int32 | DType::Int64, DType::Int32 | DType::Int64) => true,
            (DType::Int32 | DType::Int64, DType::Float32 | DType::Float64) => true,
            (DType::Float32, DType::Float64) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// ArrayLayout
// ============================================================================

/// Memory order for multi-dimensional arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayOrder {
    /// C-contiguous (row-major): last dimension varies fastest
    C,
    /// Fortran-contiguous (column-major): first dimension varies fastest
    Fortran,
    /// Neither C nor Fortran contiguous
    Neither,
}

/// Shape, strides and offset of an array view, in elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayLayout {
    /// Shape of the array (dimensions)
    pub shape: Vec<usize>,
    /// Strides in elements for each dimension
    pub strides: Vec<isize>,
    /// Memory order
    pub order: ArrayOrder,
    /// Starting element offset into the storage
    pub offset: usize,
}

fn c_strides(shape: &[usize]) -> Vec<isize> {
    let mut strides = vec![0isize; shape.len()];
    let mut stride = 1isize;
    for (i, &dim) in shape.iter().enumerate().rev() {
        strides[i] = stride;
        stride *= dim.max(1) as isize;
    }
    strides
}

fn fortran_strides(shape: &[usize]) -> Vec<isize> {
    let mut strides = Vec::with_capacity(shape.len());
    let mut stride = 1isize;
    for &dim in shape {
        strides.push(stride);
        stride *= dim.max(1) as isize;
    }
    strides
}

/// Strides only matter along dimensions longer than one.
fn strides_match(shape: &[usize], strides: &[isize], expected: &[isize]) -> bool {
    shape
        .iter()
        .zip(strides.iter().zip(expected))
        .all(|(&dim, (&s, &e))| dim <= 1 || s == e)
}

impl ArrayLayout {
    /// Create a C-contiguous layout
    pub fn c_contiguous(shape: Vec<usize>) -> Self {
        let strides = c_strides(&shape);
        Self {
            shape,
            strides,
            order: ArrayOrder::C,
            offset: 0,
        }
    }

    /// Create a Fortran-contiguous layout
    pub fn fortran_contiguous(shape: Vec<usize>) -> Self {
        let strides = fortran_strides(&shape);
        let order = if shape.iter().filter(|&&d| d > 1).count() <= 1 {
            ArrayOrder::C
        } else {
            ArrayOrder::Fortran
        };
        Self {
            shape,
            strides,
            order,
            offset: 0,
        }
    }

    /// Build a layout from explicit strides, deriving its memory order.
    pub fn strided(shape: Vec<usize>, strides: Vec<isize>, offset: usize) -> Self {
        let order = if strides_match(&shape, &strides, &c_strides(&shape)) {
            ArrayOrder::C
        } else if strides_match(&shape, &strides, &fortran_strides(&shape)) {
            ArrayOrder::Fortran
        } else {
            ArrayOrder::Neither
        };
        Self {
            shape,
            strides,
            order,
            offset,
        }
    }

    /// Get the number of dimensions
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Get the total number of elements
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    /// Check if layout is C-contiguous
    pub fn is_c_contiguous(&self) -> bool {
        self.order == ArrayOrder::C
    }

    /// Storage index of the element at multi-dimensional `indices`
    pub fn storage_index(&self, indices: &[usize]) -> Option<usize> {
        if indices.len() != self.shape.len() {
            return None;
        }
        let mut pos = self.offset as isize;
        for ((&idx, &dim), &stride) in indices.iter().zip(&self.shape).zip(&self.strides) {
            if idx >= dim {
                return None;
            }
            pos += idx as isize * stride;
        }
        usize::try_from(pos).ok()
    }

    /// Storage indices of every element, in row-major order
    pub fn storage_indices(&self) -> Vec<usize> {
        let size = self.size();
        let mut out = Vec::with_capacity(size);
        if size == 0 {
            return out;
        }
        let mut idx = vec![0usize; self.ndim()];
        for _ in 0..size {
            let pos = self.offset as isize
                + idx
                    .iter()
                    .zip(&self.strides)
                    .map(|(&i, &s)| i as isize * s)
                    .sum::<isize>();
            out.push(pos as usize);
            for d in (0..idx.len()).rev() {
                idx[d] += 1;
                if idx[d] < self.shape[d] {
                    break;
                }
                idx[d] = 0;
            }
        }
        out
    }

    /// Create a view with a slice `start..end` along every dimension
    pub fn slice_view(&self, start: &[usize], end: &[usize]) -> Option<Self> {
        if start.len() != self.ndim() || end.len() != self.ndim() {
            return None;
        }
        let mut shape = Vec::with_capacity(self.ndim());
        let mut offset = self.offset as isize;
        for (((&s, &e), &stride), &dim) in start
            .iter()
            .zip(end)
            .zip(&self.strides)
            .zip(&self.shape)
        {
            if s > e || e > dim {
                return None;
            }
            shape.push(e - s);
            offset += s as isize * stride;
        }
        Some(Self::strided(shape, self.strides.clone(), offset as usize))
    }

    /// Reverse dimensions and strides
    pub fn transpose(&self) -> Self {
        let mut shape = self.shape.clone();
        let mut strides = self.strides.clone();
        shape.reverse();
        strides.reverse();
        Self::strided(shape, strides, self.offset)
    }
}

// ============================================================================
// HostData
// ============================================================================

/// Typed storage behind a host array
#[derive(Debug, Clone, PartialEq)]
pub enum HostData {
    Bool(Vec<bool>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Text {
        /// Bytes per element
        width: usize,
        /// `width * len` bytes
        bytes: Vec<u8>,
    },
}

impl HostData {
    /// Zero-filled storage for `len` elements of `dtype`
    pub fn zeros(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::Bool => HostData::Bool(vec![false; len]),
            DType::Int32 => HostData::Int32(vec![0; len]),
            DType::Int64 => HostData::Int64(vec![0; len]),
            DType::Float32 => HostData::Float32(vec![0.0; len]),
            DType::Float64 => HostData::Float64(vec![0.0; len]),
            DType::Text { width } => HostData::Text {
                width,
                bytes: vec![0; width * len],
            },
        }
    }

    /// Element type of the storage
    pub fn dtype(&self) -> DType {
        match self {
            HostData::Bool(_) => DType::Bool,
            HostData::Int32(_) => DType::Int32,
            HostData::Int64(_) => DType::Int64,
            HostData::Float32(_) => DType::Float32,
            HostData::Float64(_) => DType::Float64,
            HostData::Text { width, .. } => DType::Text { width: *width },
        }
    }

    /// Number of elements stored
    pub fn len(&self) -> usize {
        match self {
            HostData::Bool(v) => v.len(),
            HostData::Int32(v) => v.len(),
            HostData::Int64(v) => v.len(),
            HostData::Float32(v) => v.len(),
            HostData::Float64(v) => v.len(),
            HostData::Text { width, bytes } => {
                if *width == 0 {
                    0
                } else {
                    bytes.len() / width
                }
            }
        }
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Element
// ============================================================================

/// One batch slice of an argument, typed by its element type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElementSlice<'a> {
    Bool(&'a [bool]),
    Int32(&'a [i32]),
    Int64(&'a [i64]),
    Float32(&'a [f32]),
    Float64(&'a [f64]),
}

impl<'a> ElementSlice<'a> {
    /// Element type of the slice
    pub fn dtype(&self) -> DType {
        match self {
            ElementSlice::Bool(_) => DType::Bool,
            ElementSlice::Int32(_) => DType::Int32,
            ElementSlice::Int64(_) => DType::Int64,
            ElementSlice::Float32(_) => DType::Float32,
            ElementSlice::Float64(_) => DType::Float64,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            ElementSlice::Bool(v) => v.len(),
            ElementSlice::Int32(v) => v.len(),
            ElementSlice::Int64(v) => v.len(),
            ElementSlice::Float32(v) => v.len(),
            ElementSlice::Float64(v) => v.len(),
        }
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The elements as `&[T]`, if `T` is the slice's element type
    pub fn get<T: Element>(&self) -> Option<&'a [T]> {
        T::from_elements(self)
    }
}

/// One batch slice of an output, typed by its element type
#[derive(Debug, PartialEq)]
pub enum ElementSliceMut<'a> {
    Bool(&'a mut [bool]),
    Int32(&'a mut [i32]),
    Int64(&'a mut [i64]),
    Float32(&'a mut [f32]),
    Float64(&'a mut [f64]),
}

impl<'a> ElementSliceMut<'a> {
    /// Element type of the slice
    pub fn dtype(&self) -> DType {
        match self {
            ElementSliceMut::Bool(_) => DType::Bool,
            ElementSliceMut::Int32(_) => DType::Int32,
            ElementSliceMut::Int64(_) => DType::Int64,
            ElementSliceMut::Float32(_) => DType::Float32,
            ElementSliceMut::Float64(_) => DType::Float64,
        }
    }

    /// The elements as `&mut [T]`, if `T` is the slice's element type
    pub fn get_mut<T: Element>(&mut self) -> Option<&mut [T]> {
        T::from_elements_mut(self)
    }
}

/// Numeric and boolean element types a host array can be marshalled into.
pub trait Element: NativeElement {
    /// The host dtype holding this type without conversion
    const DTYPE: DType;

    /// Borrow the storage if it holds exactly this type
    fn slice(data: &HostData) -> Option<&[Self]>;

    /// Borrow the storage mutably if it holds exactly this type
    fn slice_mut(data: &mut HostData) -> Option<&mut [Self]>;

    /// Convert the element at storage index `index`. `None` when the source
    /// type does not convert or the value does not fit.
    fn cast_from(data: &HostData, index: usize) -> Option<Self>;

    /// Wrap owned values as storage
    fn into_data(values: Vec<Self>) -> HostData;

    /// Convert to a host scalar
    fn to_scalar(self) -> Scalar;

    /// Wrap a slice of this type
    fn elements(values: &[Self]) -> ElementSlice<'_>;

    /// Wrap a mutable slice of this type
    fn elements_mut(values: &mut [Self]) -> ElementSliceMut<'_>;

    /// Recover the slice if `slice` holds this type
    fn from_elements<'a>(slice: &ElementSlice<'a>) -> Option<&'a [Self]>;

    /// Recover the mutable slice if `slice` holds this type
    fn from_elements_mut<'b>(slice: &'b mut ElementSliceMut<'_>) -> Option<&'b mut [Self]>;
}

impl Element for f64 {
    const DTYPE: DType = DType::Float64;

    fn slice(data: &HostData) -> Option<&[Self]> {
        match data {
            HostData::Float64(v) => Some(v),
            _ => None,
        }
    }

    fn slice_mut(data: &mut HostData) -> Option<&mut [Self]> {
        match data {
            HostData::Float64(v) => Some(v),
            _ => None,
        }
    }

    fn cast_from(data: &HostData, index: usize) -> Option<Self> {
        match data {
            HostData::Bool(v) => v.get(index).map(|&b| if b { 1.0 } else { 0.0 }),
            HostData::Int32(v) => v.get(index).map(|&x| x as f64),
            HostData::Int64(v) => v.get(index).map(|&x| x as f64),
            HostData::Float32(v) => v.get(index).map(|&x| x as f64),
            HostData::Float64(v) => v.get(index).copied(),
            HostData::Text { .. } => None,
        }
    }

    fn into_data(values: Vec<Self>) -> HostData {
        HostData::Float64(values)
    }

    fn to_scalar(self) -> Scalar {
        Scalar::Float(self)
    }

    fn elements(values: &[Self]) -> ElementSlice<'_> {
        ElementSlice::Float64(values)
    }

    fn elements_mut(values: &mut [Self]) -> ElementSliceMut<'_> {
        ElementSliceMut::Float64(values)
    }

    fn from_elements<'a>(slice: &ElementSlice<'a>) -> Option<&'a [Self]> {
        match *slice {
            ElementSlice::Float64(values) => Some(values),
            _ => None,
        }
    }

    fn from_elements_mut<'b>(slice: &'b mut ElementSliceMut<'_>) -> Option<&'b mut [Self]> {
        match slice {
            ElementSliceMut::Float64(values) => Some(&mut **values),
            _ => None,
        }
    }
}

impl Element for f32 {
    const DTYPE: DType = DType::Float32;

    fn slice(data: &HostData) -> Option<&[Self]> {
        match data {
            HostData::Float32(v) => Some(v),
            _ => None,
        }
    }

    fn slice_mut(data: &mut HostData) -> Option<&mut [Self]> {
        match data {
            HostData::Float32(v) => Some(v),
            _ => None,
        }
    }

    fn cast_from(data: &HostData, index: usize) -> Option<Self> {
        match data {
            HostData::Bool(v) => v.get(index).map(|&b| if b { 1.0 } else { 0.0 }),
            HostData::Int32(v) => v.get(index).map(|&x| x as f32),
            HostData::Int64(v) => v.get(index).map(|&x| x as f32),
            HostData::Float32(v) => v.get(index).copied(),
            _ => None,
        }
    }

    fn into_data(values: Vec<Self>) -> HostData {
        HostData::Float32(values)
    }

    fn to_scalar(self) -> Scalar {
        Scalar::Float(self as f64)
    }

    fn elements(values: &[Self]) -> ElementSlice<'_> {
        ElementSlice::Float32(values)
    }

    fn elements_mut(values: &mut [Self]) -> ElementSliceMut<'_> {
        ElementSliceMut::Float32(values)
    }

    fn from_elements<'a>(slice: &ElementSlice<'a>) -> Option<&'a [Self]> {
        match *slice {
            ElementSlice::Float32(values) => Some(values),
            _ => None,
        }
    }

    fn from_elements_mut<'b>(slice: &'b mut ElementSliceMut<'_>) -> Option<&'b mut [Self]> {
        match slice {
            ElementSliceMut::Float32(values) => Some(&mut **values),
            _ => None,
        }
    }
}

impl Element for i32 {
    const DTYPE: DType = DType::Int32;

    fn slice(data: &HostData) -> Option<&[Self]> {
        match data {
            HostData::Int32(v) => Some(v),
            _ => None,
        }
    }

    fn slice_mut(data: &mut HostData) -> Option<&mut [Self]> {
        match data {
            HostData::Int32(v) => Some(v),
            _ => None,
        }
    }

    fn cast_from(data: &HostData, index: usize) -> Option<Self> {
        match data {
            HostData::Bool(v) => v.get(index).map(|&b| b as i32),
            HostData::Int32(v) => v.get(index).copied(),
            HostData::Int64(v) => v.get(index).and_then(|&x| i32::try_from(x).ok()),
            _ => None,
        }
    }

    fn into_data(values: Vec<Self>) -> HostData {
        HostData::Int32(values)
    }

    fn to_scalar(self) -> Scalar {
        Scalar::Int(self as i64)
    }

    fn elements(values: &[Self]) -> ElementSlice<'_> {
        ElementSlice::Int32(values)
    }

    fn elements_mut(values: &mut [Self]) -> ElementSliceMut<'_> {
        ElementSliceMut::Int32(values)
    }

    fn from_elements<'a>(slice: &ElementSlice<'a>) -> Option<&'a [Self]> {
        match *slice {
            ElementSlice::Int32(values) => Some(values),
            _ => None,
        }
    }

    fn from_elements_mut<'b>(slice: &'b mut ElementSliceMut<'_>) -> Option<&'b mut [Self]> {
        match slice {
            ElementSliceMut::Int32(values) => Some(&mut **values),
            _ => None,
        }
    }
}

impl Element for i64 {
    const DTYPE: DType = DType::Int64;

    fn slice(data: &HostData) -> Option<&[Self]> {
        match data {
            HostData::Int64(v) => Some(v),
            _ => None,
        }
    }

    fn slice_mut(data: &mut HostData) -> Option<&mut [Self]> {
        match data {
            HostData::Int64(v) => Some(v),
            _ => None,
        }
    }

    fn cast_from(data: &HostData, index: usize) -> Option<Self> {
        match data {
            HostData::Bool(v) => v.get(index).map(|&b| b as i64),
            HostData::Int32(v) => v.get(index).map(|&x| x as i64),
            HostData::Int64(v) => v.get(index).copied(),
            _ => None,
        }
    }

    fn into_data(values: Vec<Self>) -> HostData {
        HostData::Int64(values)
    }

    fn to_scalar(self) -> Scalar {
        Scalar::Int(self)
    }

    fn elements(values: &[Self]) -> ElementSlice<'_> {
        ElementSlice::Int64(values)
    }

    fn elements_mut(values: &mut [Self]) -> ElementSliceMut<'_> {
        ElementSliceMut::Int64(values)
    }

    fn from_elements<'a>(slice: &ElementSlice<'a>) -> Option<&'a [Self]> {
        match *slice {
            ElementSlice::Int64(values) => Some(values),
            _ => None,
        }
    }

    fn from_elements_mut<'b>(slice: &'b mut ElementSliceMut<'_>) -> Option<&'b mut [Self]> {
        match slice {
            ElementSliceMut::Int64(values) => Some(&mut **values),
            _ => None,
        }
    }
}

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    fn slice(data: &HostData) -> Option<&[Self]> {
        match data {
            HostData::Bool(v) => Some(v),
            _ => None,
        }
    }

    fn slice_mut(data: &mut HostData) -> Option<&mut [Self]> {
        match data {
            HostData::Bool(v) => Some(v),
            _ => None,
        }
    }

    fn cast_from(data: &HostData, index: usize) -> Option<Self> {
        match data {
            HostData::Bool(v) => v.get(index).copied(),
            _ => None,
        }
    }

    fn into_data(values: Vec<Self>) -> HostData {
        HostData::Bool(values)
    }

    fn to_scalar(self) -> Scalar {
        Scalar::Bool(self)
    }

    fn elements(values: &[Self]) -> ElementSlice<'_> {
        ElementSlice::Bool(values)
    }

    fn elements_mut(values: &mut [Self]) -> ElementSliceMut<'_> {
        ElementSliceMut::Bool(values)
    }

    fn from_elements<'a>(slice: &ElementSlice<'a>) -> Option<&'a [Self]> {
        match *slice {
            ElementSlice::Bool(values) => Some(values),
            _ => None,
        }
    }

    fn from_elements_mut<'b>(slice: &'b mut ElementSliceMut<'_>) -> Option<&'b mut [Self]> {
        match slice {
            ElementSliceMut::Bool(values) => Some(&mut **values),
            _ => None,
        }
    }
}

// ============================================================================
// HostArray
// ============================================================================

/// Why an array could not be converted to another element type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastError {
    /// The dtype never converts to the target type
    Unsupported,
    /// A value does not fit the target type
    OutOfRange,
    /// The storage is exclusively borrowed by an in/out argument
    Busy,
}

static NEXT_ARRAY_ID: AtomicU64 = AtomicU64::new(1);

/// Who allocated an array's storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayOwnership {
    /// Supplied by the caller
    HostOwned,
    /// Freshly allocated by the bridge
    BridgeOwned,
    /// View into another array
    View,
}

/// A dynamically typed, dynamically shaped array at the host boundary.
#[derive(Debug)]
pub struct HostArray {
    id: u64,
    layout: ArrayLayout,
    dtype: DType,
    data: Arc<RwLock<HostData>>,
    ownership: ArrayOwnership,
    base_id: Option<u64>,
}

impl HostArray {
    fn with_data(data: HostData, shape: Vec<usize>, ownership: ArrayOwnership) -> Option<Self> {
        if data.len() != shape.iter().product::<usize>() {
            return None;
        }
        Some(Self {
            id: NEXT_ARRAY_ID.fetch_add(1, Ordering::Relaxed),
            layout: ArrayLayout::c_contiguous(shape),
            dtype: data.dtype(),
            data: Arc::new(RwLock::new(data)),
            ownership,
            base_id: None,
        })
    }

    fn view(&self, layout: ArrayLayout) -> Self {
        Self {
            id: NEXT_ARRAY_ID.fetch_add(1, Ordering::Relaxed),
            layout,
            dtype: self.dtype,
            data: Arc::clone(&self.data),
            ownership: ArrayOwnership::View,
            base_id: Some(self.id),
        }
    }

    /// Wrap caller-supplied values. `None` if `values.len()` does not match
    /// the shape.
    pub fn from_vec<T: Element>(values: Vec<T>, shape: Vec<usize>) -> Option<Self> {
        Self::with_data(T::into_data(values), shape, ArrayOwnership::HostOwned)
    }

    /// Wrap caller-supplied storage of any dtype
    pub fn from_data(data: HostData, shape: Vec<usize>) -> Option<Self> {
        Self::with_data(data, shape, ArrayOwnership::HostOwned)
    }

    /// Wrap caller-supplied strings as a fixed-width text array.
    ///
    /// `width` defaults to the longest string; longer strings are truncated.
    pub fn from_strings(values: &[&str], shape: Vec<usize>, width: Option<usize>) -> Option<Self> {
        let width = width
            .unwrap_or_else(|| values.iter().map(|s| s.len()).max().unwrap_or(0))
            .max(1);
        let mut bytes = vec![0u8; width * values.len()];
        for (i, s) in values.iter().enumerate() {
            let n = s.len().min(width);
            bytes[i * width..i * width + n].copy_from_slice(&s.as_bytes()[..n]);
        }
        Self::with_data(HostData::Text { width, bytes }, shape, ArrayOwnership::HostOwned)
    }

    /// Bridge-owned array built from native results
    pub(crate) fn bridge_owned(data: HostData, shape: Vec<usize>) -> Option<Self> {
        Self::with_data(data, shape, ArrayOwnership::BridgeOwned)
    }

    /// Bridge-owned, zero-filled array of any dtype
    pub fn zeros(dtype: DType, shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            id: NEXT_ARRAY_ID.fetch_add(1, Ordering::Relaxed),
            layout: ArrayLayout::c_contiguous(shape),
            dtype,
            data: Arc::new(RwLock::new(HostData::zeros(dtype, len))),
            ownership: ArrayOwnership::BridgeOwned,
            base_id: None,
        }
    }

    /// Get the array ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the layout
    pub fn layout(&self) -> &ArrayLayout {
        &self.layout
    }

    /// Get the shape
    pub fn shape(&self) -> &[usize] {
        &self.layout.shape
    }

    /// Get the dtype
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Get the number of dimensions
    pub fn ndim(&self) -> usize {
        self.layout.ndim()
    }

    /// Get the total number of elements
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Check if this is a view
    pub fn is_view(&self) -> bool {
        self.base_id.is_some()
    }

    /// Check if the array is C-contiguous
    pub fn is_contiguous(&self) -> bool {
        self.layout.is_c_contiguous()
    }

    /// Get ownership state
    pub fn ownership(&self) -> ArrayOwnership {
        self.ownership
    }

    /// Check whether two arrays share storage
    pub fn shares_storage(&self, other: &HostArray) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Check whether an argument currently borrows this array's storage
    pub fn is_borrowed(&self) -> bool {
        self.data.is_locked()
    }

    /// Create a view with a slice
    pub fn slice(&self, start: &[usize], end: &[usize]) -> Option<Self> {
        self.layout.slice_view(start, end).map(|l| self.view(l))
    }

    /// Create a transposed view
    pub fn transpose(&self) -> Self {
        self.view(self.layout.transpose())
    }

    /// Reshape a contiguous array into a view with the same element count
    pub fn reshape(&self, shape: Vec<usize>) -> Option<Self> {
        if !self.is_contiguous() || shape.iter().product::<usize>() != self.size() {
            return None;
        }
        let mut layout = ArrayLayout::c_contiguous(shape);
        layout.offset = self.layout.offset;
        Some(self.view(layout))
    }

    /// Borrow the contiguous storage of this array as `&[T]` without copying.
    ///
    /// `None` unless the dtype is exactly `T` and the view is C-contiguous,
    /// or while the storage is borrowed for writing.
    pub fn borrow_native<T: Element>(&self) -> Option<MappedRwLockReadGuard<'_, [T]>> {
        if self.dtype != T::DTYPE || !self.is_contiguous() {
            return None;
        }
        let range = self.layout.offset..self.layout.offset + self.size();
        RwLockReadGuard::try_map(self.data.try_read()?, |d| {
            T::slice(d).and_then(|s| s.get(range))
        })
        .ok()
    }

    /// Borrow the contiguous storage of this array as `&mut [T]` without
    /// copying. Same conditions as [`HostArray::borrow_native`], and `None`
    /// while any other borrow of the storage is alive.
    pub fn borrow_native_mut<T: Element>(&self) -> Option<MappedRwLockWriteGuard<'_, [T]>> {
        if self.dtype != T::DTYPE || !self.is_contiguous() {
            return None;
        }
        let range = self.layout.offset..self.layout.offset + self.size();
        RwLockWriteGuard::try_map(self.data.try_write()?, |d| {
            T::slice_mut(d).and_then(|s| s.get_mut(range))
        })
        .ok()
    }

    /// Copy the elements in row-major order, converting to `T`.
    pub fn to_vec_as<T: Element>(&self) -> Result<Vec<T>, CastError> {
        if !self.dtype.casts_to(T::DTYPE) {
            return Err(CastError::Unsupported);
        }
        let guard = self.data.try_read().ok_or(CastError::Busy)?;
        self.layout
            .storage_indices()
            .into_iter()
            .map(|i| T::cast_from(&guard, i).ok_or(CastError::OutOfRange))
            .collect()
    }

    /// Copy the elements in row-major order. `None` if the dtype does not
    /// convert to `T` or a value does not fit.
    pub fn to_vec<T: Element>(&self) -> Option<Vec<T>> {
        self.to_vec_as().ok()
    }

    /// Overwrite the elements in row-major order. The dtype must be exactly
    /// `T` and `values` must hold one value per element. Fails while the
    /// storage is borrowed.
    pub fn write_from<T: Element>(&self, values: &[T]) -> bool {
        if self.dtype != T::DTYPE || values.len() != self.size() {
            return false;
        }
        let indices = self.layout.storage_indices();
        let Some(mut guard) = self.data.try_write() else {
            return false;
        };
        match T::slice_mut(&mut guard) {
            Some(storage) => {
                for (&pos, &v) in indices.iter().zip(values) {
                    storage[pos] = v;
                }
                true
            }
            None => false,
        }
    }

    /// Element at multi-dimensional `indices`
    pub fn get<T: Element>(&self, indices: &[usize]) -> Option<T> {
        let pos = self.layout.storage_index(indices)?;
        if !self.dtype.casts_to(T::DTYPE) {
            return None;
        }
        T::cast_from(&*self.data.try_read()?, pos)
    }

    /// Copy text elements in row-major order as NUL-padded records.
    pub fn text_records(&self) -> Option<(usize, Vec<u8>)> {
        let guard = self.data.try_read()?;
        match &*guard {
            HostData::Text { width, bytes } => {
                let width = *width;
                let mut out = Vec::with_capacity(width * self.size());
                for pos in self.layout.storage_indices() {
                    out.extend_from_slice(&bytes[pos * width..(pos + 1) * width]);
                }
                Some((width, out))
            }
            _ => None,
        }
    }

    /// Overwrite text elements in row-major order from NUL-padded records of
    /// the array's own width.
    pub fn write_text_records(&self, records: &[u8]) -> bool {
        let indices = self.layout.storage_indices();
        let Some(mut guard) = self.data.try_write() else {
            return false;
        };
        match &mut *guard {
            HostData::Text { width, bytes } if records.len() == *width * indices.len() => {
                let width = *width;
                for (k, &pos) in indices.iter().enumerate() {
                    bytes[pos * width..(pos + 1) * width]
                        .copy_from_slice(&records[k * width..(k + 1) * width]);
                }
                true
            }
            _ => false,
        }
    }

    /// Text elements in row-major order, trailing NULs and blanks removed
    pub fn strings(&self) -> Option<Vec<String>> {
        let (width, records) = self.text_records()?;
        Some(
            records
                .chunks(width.max(1))
                .map(|r| {
                    String::from_utf8_lossy(r)
                        .trim_end_matches(['\0', ' '])
                        .to_string()
                })
                .collect(),
        )
    }
}

impl Clone for HostArray {
    fn clone(&self) -> Self {
        // Clone creates a view, not a copy
        self.view(self.layout.clone())
    }
}

// ============================================================================
// HostValue
// ============================================================================

/// A host scalar
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Type name for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::Text(_) => "str",
        }
    }
}

/// Any value crossing the host boundary
#[derive(Debug, Clone)]
pub enum HostValue {
    /// A single scalar
    Scalar(Scalar),
    /// An array of any rank
    Array(HostArray),
}

impl HostValue {
    /// Get the array, if this is one
    pub fn as_array(&self) -> Option<&HostArray> {
        match self {
            HostValue::Array(a) => Some(a),
            HostValue::Scalar(_) => None,
        }
    }

    /// Get the scalar, if this is one
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            HostValue::Scalar(s) => Some(s),
            HostValue::Array(_) => None,
        }
    }
}

impl From<HostArray> for HostValue {
    fn from(array: HostArray) -> Self {
        HostValue::Array(array)
    }
}

impl From<Scalar> for HostValue {
    fn from(scalar: Scalar) -> Self {
        HostValue::Scalar(scalar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_dtype_properties() {
        assert_eq!(DType::Float64.size(), 8);
        assert_eq!(DType::Int32.size(), 4);
        assert_eq!(DType::Text { width: 12 }.size(), 12);
        assert!(DType::Int64.is_integer());
        assert!(DType::Float32.is_float());
        assert!(DType::Text { width: 3 }.is_text());
    }

    #[test]
    fn test_dtype_parsing() {
        assert_eq!(DType::parse("float64"), Some(DType::Float64));
        assert_eq!(DType::parse("i4"), Some(DType::Int32));
        assert_eq!(DType::parse("S32"), Some(DType::Text { width: 32 }));
        assert_eq!(DType::parse("complex128"), None);
        assert_eq!(DType::Text { width: 8 }.to_string(), "S8");
    }

    #[test]
    fn test_casts() {
        assert!(DType::Int32.casts_to(DType::Float64));
        assert!(DType::Int64.casts_to(DType::Float32));
        assert!(DType::Int64.casts_to(DType::Int32));
        assert!(DType::Bool.casts_to(DType::Int32));
        assert!(DType::Float32.casts_to(DType::Float64));
        assert!(!DType::Float64.casts_to(DType::Int32));
        assert!(!DType::Float64.casts_to(DType::Float32));
        assert!(!DType::Int32.casts_to(DType::Bool));
        assert!(!DType::Text { width: 4 }.casts_to(DType::Float64));
    }

    #[test]
    fn test_layout_c_contiguous() {
        let layout = ArrayLayout::c_contiguous(vec![3, 4, 5]);
        assert_eq!(layout.strides, vec![20, 5, 1]);
        assert_eq!(layout.size(), 60);
        assert!(layout.is_c_contiguous());
    }

    #[test]
    fn test_layout_storage_index() {
        let layout = ArrayLayout::c_contiguous(vec![3, 4]);
        assert_eq!(layout.storage_index(&[0, 1]), Some(1));
        assert_eq!(layout.storage_index(&[2, 3]), Some(11));
        assert_eq!(layout.storage_index(&[3, 0]), None);
    }

    #[test]
    fn test_row_slice_stays_contiguous() {
        let layout = ArrayLayout::c_contiguous(vec![4, 3]);
        let rows = layout.slice_view(&[1, 0], &[3, 3]).unwrap();
        assert!(rows.is_c_contiguous());
        assert_eq!(rows.offset, 3);

        let cols = layout.slice_view(&[0, 1], &[4, 2]).unwrap();
        assert!(!cols.is_c_contiguous());
    }

    #[test]
    fn test_transpose_storage_order() {
        let arr = HostArray::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]).unwrap();
        let t = arr.transpose();
        assert_eq!(t.shape(), &[3, 2]);
        assert!(!t.is_contiguous());
        assert_eq!(t.to_vec::<f64>().unwrap(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert!(t.shares_storage(&arr));
        assert_eq!(t.ownership(), ArrayOwnership::View);
    }

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        assert!(HostArray::from_vec(vec![1i32, 2, 3], vec![2, 2]).is_none());
    }

    #[test]
    fn test_borrow_native_zero_copy() {
        let arr = HostArray::from_vec(vec![1.0f64, 2.0, 3.0], vec![3]).unwrap();
        {
            let view = arr.borrow_native::<f64>().unwrap();
            assert_eq!(&*view, &[1.0, 2.0, 3.0]);
        }
        assert!(arr.borrow_native::<i32>().is_none());
        assert!(arr.transpose().reshape(vec![3]).is_some());
    }

    #[test]
    fn test_borrow_native_mut_writes_through() {
        let arr = HostArray::zeros(DType::Int32, vec![2, 2]);
        arr.borrow_native_mut::<i32>().unwrap()[3] = 9;
        assert_eq!(arr.get::<i32>(&[1, 1]), Some(9));
    }

    #[test]
    fn test_to_vec_conversion_failures() {
        let big = HostArray::from_vec(vec![i64::MAX], vec![1]).unwrap();
        assert_eq!(big.to_vec_as::<i32>(), Err(CastError::OutOfRange));
        let floats = HostArray::from_vec(vec![1.5f64], vec![1]).unwrap();
        assert_eq!(floats.to_vec_as::<i32>(), Err(CastError::Unsupported));
        let ints = HostArray::from_vec(vec![3i32, 4], vec![2]).unwrap();
        assert_eq!(ints.to_vec::<f64>(), Some(vec![3.0, 4.0]));
    }

    #[test]
    fn test_write_from_strided_view() {
        let arr = HostArray::from_vec(vec![0i32; 6], vec![2, 3]).unwrap();
        let t = arr.transpose();
        assert!(t.write_from(&[1, 2, 3, 4, 5, 6]));
        assert_eq!(arr.to_vec::<i32>().unwrap(), vec![1, 3, 5, 2, 4, 6]);
        assert!(!t.write_from(&[1.0f64; 6]));
    }

    #[test]
    fn test_strings_roundtrip() {
        let arr = HostArray::from_strings(&["EARTH", "MOON"], vec![2], Some(8)).unwrap();
        assert_eq!(arr.dtype(), DType::Text { width: 8 });
        assert_eq!(arr.strings().unwrap(), vec!["EARTH", "MOON"]);
        let (width, records) = arr.text_records().unwrap();
        assert_eq!(width, 8);
        assert_eq!(&records[8..12], b"MOON");
    }

    #[test]
    fn test_host_value_accessors() {
        let v: HostValue = Scalar::Float(2.0).into();
        assert!(v.as_array().is_none());
        assert_eq!(v.as_scalar(), Some(&Scalar::Float(2.0)));
        assert_eq!(Scalar::Text("x".into()).type_name(), "str");
    }
}
