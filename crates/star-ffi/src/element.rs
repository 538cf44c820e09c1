//! Native Element Types
//!
//! The wrapped library takes doubles, integers and booleans. Only types whose
//! all-zero bit pattern is a valid value may be used, because native-owned
//! allocations come back zero-initialized from `calloc`.

use std::fmt;
use std::os::raw::{c_double, c_float, c_int, c_long};

/// Native `double`
pub type NativeDouble = c_double;

/// Native `float`
pub type NativeFloat = c_float;

/// Native `int`, the library's default integer width
pub type NativeInt = c_int;

/// Native `long`
pub type NativeLong = c_long;

/// Marker trait for element types that can cross the native boundary.
///
/// # Safety
///
/// Implementors must be plain data for which the all-zero bit pattern is a
/// valid value.
pub unsafe trait NativeElement: Sized + Copy + Default + PartialEq + fmt::Debug + 'static {
    /// Short native type name used in diagnostics
    const NAME: &'static str;

    /// Size in bytes of one element
    fn size() -> usize {
        std::mem::size_of::<Self>()
    }
}

unsafe impl NativeElement for f64 {
    const NAME: &'static str = "double";
}

unsafe impl NativeElement for f32 {
    const NAME: &'static str = "float";
}

unsafe impl NativeElement for i32 {
    const NAME: &'static str = "int";
}

unsafe impl NativeElement for i64 {
    const NAME: &'static str = "long";
}

unsafe impl NativeElement for bool {
    const NAME: &'static str = "boolean";
}

unsafe impl NativeElement for u8 {
    const NAME: &'static str = "char";
}
