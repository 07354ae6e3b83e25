//! Native runtime services
//!
//! Everything the bridge needs from the native component system beyond
//! calling functions: reference counting, memory release, runtime type tags
//! and property accessors.

use crate::error::Result;
use crate::marshal::GenericValue;
use core::ffi::{c_char, c_void};
use std::ffi::CStr;
use std::fmt;

/// Untyped native pointer
pub type NativePtr = *mut c_void;

/// Runtime type tag of the native type system (0 is invalid)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuntimeType(pub usize);

impl RuntimeType {
    pub const INVALID: Self = Self(0);

    #[inline]
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

/// Header of a growable, reference-counted native array
#[repr(C)]
#[derive(Debug)]
pub struct NativeArray {
    pub data: *mut u8,
    pub len: u32,
}

/// Error record a throwing native function writes into its error slot
#[repr(C)]
#[derive(Debug)]
pub struct NativeError {
    pub domain: u32,
    pub code: i32,
    pub message: *mut c_char,
}

impl NativeError {
    /// Message text, lossily decoded
    ///
    /// # Safety
    /// `message` must be null or a valid NUL-terminated string.
    pub unsafe fn message(&self) -> String {
        if self.message.is_null() {
            String::new()
        } else {
            CStr::from_ptr(self.message).to_string_lossy().into_owned()
        }
    }
}

/// Native runtime services consumed by the bridge
pub trait NativeHost {
    /// Take one reference on an object instance
    ///
    /// # Safety
    /// `object` must be a live instance.
    unsafe fn object_ref(&self, object: NativePtr);

    /// Drop one reference on an object instance
    ///
    /// # Safety
    /// `object` must be a live instance the caller holds a reference on.
    unsafe fn object_unref(&self, object: NativePtr);

    /// Runtime type of an object instance
    ///
    /// # Safety
    /// `object` must be a live instance.
    unsafe fn instance_type(&self, object: NativePtr) -> RuntimeType;

    /// True when `ty` equals or derives from `ancestor`
    fn type_is_a(&self, ty: RuntimeType, ancestor: RuntimeType) -> bool;

    fn type_name(&self, ty: RuntimeType) -> Option<String>;

    /// Release memory allocated by the native side
    ///
    /// # Safety
    /// `ptr` must come from the native allocator and not be used afterwards.
    unsafe fn free(&self, ptr: NativePtr);

    /// Drop one reference on a growable array
    ///
    /// # Safety
    /// `array` must be a live array header.
    unsafe fn array_unref(&self, array: *mut NativeArray);

    /// Copy a string into native-owned memory
    fn strdup(&self, s: &CStr) -> *mut c_char;

    /// Read an object property into an initialised generic value
    ///
    /// Object payloads written into `value` carry one reference owned by it.
    ///
    /// # Safety
    /// `object` must be a live instance.
    unsafe fn get_property(&self, object: NativePtr, name: &str, value: &mut GenericValue) -> Result<()>;

    /// Write an object property from a generic value
    ///
    /// # Safety
    /// `object` must be a live instance.
    unsafe fn set_property(&self, object: NativePtr, name: &str, value: &GenericValue) -> Result<()>;

    /// Release an error record produced by a throwing call
    ///
    /// # Safety
    /// `error` must come from the native side and not be used afterwards.
    unsafe fn error_free(&self, error: *mut NativeError);
}
