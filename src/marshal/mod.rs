//! Value marshalling between native slots and dynamic values
//!
//! Architecture:
//! - `scalar.rs` - primitive conversions (integers, floats, strings, booleans)
//! - `array.rs` - C and growable arrays
//! - `generic.rs` - tagged "any value" containers used for properties
//!
//! Every conversion takes its ownership-transfer mode explicitly.

mod scalar;
mod array;
pub mod generic;

pub use array::{element_size, to_dynamic_with_length};
pub use generic::{GenericData, GenericValue, ValueGuard, ValueType};
pub(crate) use scalar::{read_length, write_length};

use crate::catalog::{Info, Transfer, TypeInfo};
use crate::compound;
use crate::context::RuntimeContext;
use crate::dynamic::{Value, Values};
use crate::error::{BridgeError, Result};
use crate::interop::{NativePtr, Slot};
use smallvec::smallvec;
use std::ffi::CString;
use std::os::raw::c_char;
use typed_arena::Arena;

/// Native-to-dynamic conversion of one value
///
/// Yields zero values for `Void`, one otherwise.
///
/// # Safety
/// `slot` must point to a valid native value of type `ty`. With a transfer
/// other than `None`, the native value is consumed.
pub unsafe fn to_dynamic(ctx: &RuntimeContext, ty: &TypeInfo, transfer: Transfer, slot: Slot) -> Result<Values> {
    match ty {
        TypeInfo::Void => Ok(Values::new()),
        TypeInfo::Scalar(kind) => Ok(smallvec![scalar::read(ctx, *kind, transfer, slot)?]),
        TypeInfo::Array(array) => array::to_dynamic_with_length(ctx, array, transfer, slot, None),
        TypeInfo::Interface(name) => {
            let info = ctx.resolve(name)?;
            match &*info {
                // Enum values are plain integers; nothing to release.
                Info::Enum(e) => Ok(smallvec![scalar::read(ctx, e.storage, Transfer::None, slot)?]),
                Info::Struct(_) | Info::Object(_) => {
                    let mut address = slot.read::<NativePtr>();
                    let value = compound::store(ctx, &info, &mut address, transfer)?;
                    if transfer == Transfer::Container {
                        slot.write(address);
                    }
                    Ok(smallvec![value])
                }
                other => Err(BridgeError::encoding(
                    "value",
                    format!("{} `{}' has no dynamic representation", other.info_type(), name),
                )),
            }
        }
        TypeInfo::Unsupported(tag) => Err(BridgeError::encoding("value", format!("unsupported type `{}'", tag))),
    }
}

/// Dynamic-to-native conversion of one value at a 1-based `position`
///
/// Returns the number of dynamic values consumed. A missing or nil value is
/// accepted as the native zero value only when `optional` is set.
///
/// # Safety
/// `slot` must point to writable storage large enough for type `ty`.
pub unsafe fn from_dynamic(
    ctx: &RuntimeContext,
    value: Option<&Value>,
    position: usize,
    ty: &TypeInfo,
    slot: Slot,
    optional: bool,
    temps: &Temporaries,
) -> Result<usize> {
    match ty {
        TypeInfo::Void => Ok(0),
        TypeInfo::Scalar(kind) => {
            scalar::write(ctx, *kind, value, position, slot, optional, temps)?;
            Ok(1)
        }
        TypeInfo::Array(array) => {
            array::from_dynamic(ctx, array, value, position, slot, optional, temps)?;
            Ok(1)
        }
        TypeInfo::Interface(name) => {
            let info = ctx.resolve(name)?;
            match &*info {
                Info::Enum(e) => scalar::write(ctx, e.storage, value, position, slot, optional, temps)?,
                Info::Struct(_) | Info::Object(_) | Info::Interface(_) => {
                    let address = compound::load(ctx, value, position, &info, optional)?;
                    slot.write(address);
                }
                other => {
                    return Err(BridgeError::encoding(
                        "argument",
                        format!("{} `{}' cannot be passed to native code", other.info_type(), name),
                    ))
                }
            }
            Ok(1)
        }
        TypeInfo::Unsupported(tag) => Err(BridgeError::encoding("argument", format!("unsupported type `{}'", tag))),
    }
}

/// Name used for a missing argument in error messages
pub(crate) fn got(value: Option<&Value>) -> &'static str {
    value.map(Value::type_name).unwrap_or("no value")
}

/// Storage that must outlive one native call
///
/// Strings and array buffers handed to native code live here until the
/// temporaries are dropped. A persistent set instead copies strings into
/// native memory, for values that outlive the call (struct fields).
pub struct Temporaries {
    strings: Arena<CString>,
    buffers: Arena<Vec<u64>>,
    persistent: bool,
}

impl Temporaries {
    pub fn new() -> Self {
        Self {
            strings: Arena::new(),
            buffers: Arena::new(),
            persistent: false,
        }
    }

    pub fn persistent() -> Self {
        Self {
            persistent: true,
            ..Self::new()
        }
    }

    #[inline]
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Native `char*` for a string
    pub(crate) fn string(&self, ctx: &RuntimeContext, s: CString) -> *mut c_char {
        if self.persistent {
            ctx.host().strdup(&s)
        } else {
            self.strings.alloc(s).as_ptr() as *mut c_char
        }
    }

    /// Zeroed buffer of at least `len` bytes, 8-byte aligned
    pub(crate) fn buffer(&self, len: usize) -> Result<*mut u8> {
        if self.persistent {
            return Err(BridgeError::encoding("array", "arrays cannot be stored outside a call"));
        }
        let words = ((len + 7) / 8).max(1);
        Ok(self.buffers.alloc(vec![0u64; words]).as_mut_ptr() as *mut u8)
    }
}

impl Default for Temporaries {
    fn default() -> Self {
        Self::new()
    }
}
