//! Array marshaller
//!
//! Native arrays become dynamic sequences. A growable array's count is
//! always its header length. A C array's count comes from the descriptor's
//! fixed size, then an explicit length, then a zero-terminator scan. A null array is `Nil`, never an empty
//! sequence.

use super::{got, Temporaries};
use crate::catalog::{ArrayKind, ArrayType, Info, Transfer, TypeInfo};
use crate::context::RuntimeContext;
use crate::dynamic::{Value, Values};
use crate::error::{BridgeError, Result};
use crate::interop::{MachineType, NativeArray, NativePtr, Slot};
use smallvec::smallvec;
use std::rc::Rc;

/// Byte stride of one array element
pub fn element_size(ctx: &RuntimeContext, ty: &TypeInfo) -> Result<usize> {
    match ty {
        TypeInfo::Scalar(kind) => Ok(kind.size()),
        TypeInfo::Array(_) => Ok(MachineType::Pointer.size()),
        TypeInfo::Interface(name) => match &*ctx.resolve(name)? {
            Info::Enum(e) => Ok(e.storage.size()),
            Info::Struct(_) | Info::Object(_) | Info::Interface(_) => Ok(MachineType::Pointer.size()),
            other => Err(BridgeError::encoding(
                "array",
                format!("{} `{}' cannot be an array element", other.info_type(), name),
            )),
        },
        TypeInfo::Void | TypeInfo::Unsupported(_) => Err(BridgeError::encoding(
            "array",
            format!("{} cannot be an array element", ty.describe()),
        )),
    }
}

/// Native array to dynamic sequence, with an optional externally known length
///
/// # Safety
/// `slot` must hold null or a pointer to an array laid out as `array`
/// describes, with at least as many elements as the computed count.
pub unsafe fn to_dynamic_with_length(
    ctx: &RuntimeContext,
    array: &ArrayType,
    transfer: Transfer,
    slot: Slot,
    length: Option<usize>,
) -> Result<Values> {
    let ptr = slot.read::<*mut u8>();
    if ptr.is_null() {
        return Ok(smallvec![Value::Nil]);
    }

    let stride = element_size(ctx, &array.element)?;
    let (data, count) = match array.kind {
        ArrayKind::C => (ptr, array.fixed_size.or(length)),
        ArrayKind::Growable => {
            let header = &*(ptr as *const NativeArray);
            (header.data, Some(header.len as usize))
        }
    };
    if count.is_none() && !array.zero_terminated {
        return Err(BridgeError::encoding("array", "element count is unknown"));
    }

    // Elements are owned only when the whole array was handed over.
    let element_transfer = if transfer == Transfer::Everything {
        Transfer::Everything
    } else {
        Transfer::None
    };

    let mut items = Vec::with_capacity(count.unwrap_or(0));
    if let Some(base) = Slot::from_raw(data) {
        for index in 0usize.. {
            if count.map_or(false, |n| index >= n) {
                break;
            }
            let element = base.offset(index * stride);
            if array.zero_terminated && element.is_zero(stride) {
                break;
            }
            items.extend(super::to_dynamic(ctx, &array.element, element_transfer, element)?);
        }
    }

    if transfer != Transfer::None {
        match array.kind {
            ArrayKind::C => ctx.host().free(ptr as NativePtr),
            ArrayKind::Growable => ctx.host().array_unref(ptr as *mut NativeArray),
        }
    }

    Ok(smallvec![Value::Sequence(Rc::from(items))])
}

/// Dynamic sequence to a C array allocated in the call temporaries
///
/// # Safety
/// `slot` must point to pointer-sized writable storage.
pub(crate) unsafe fn from_dynamic(
    ctx: &RuntimeContext,
    array: &ArrayType,
    value: Option<&Value>,
    position: usize,
    slot: Slot,
    optional: bool,
    temps: &Temporaries,
) -> Result<()> {
    if array.kind == ArrayKind::Growable {
        return Err(BridgeError::encoding("array", "growable arrays cannot be built from dynamic values"));
    }

    let items = match value {
        Some(Value::Sequence(items)) => Rc::clone(items),
        None | Some(Value::Nil) if optional => {
            slot.write(std::ptr::null_mut::<u8>());
            return Ok(());
        }
        other => return Err(BridgeError::argument(position, "sequence", got(other))),
    };

    if let Some(n) = array.fixed_size {
        if items.len() != n {
            return Err(BridgeError::argument(
                position,
                format!("sequence of {} elements", n),
                format!("{} elements", items.len()),
            ));
        }
    }

    let stride = element_size(ctx, &array.element)?;
    let total = items.len() + usize::from(array.zero_terminated);
    let buffer = temps.buffer(total * stride)?;
    // Buffers are zeroed, so the terminator is already in place.
    let base = Slot::from_raw(buffer).ok_or_else(|| BridgeError::encoding("array", "allocation failed"))?;
    for (index, item) in items.iter().enumerate() {
        super::from_dynamic(ctx, Some(item), position, &array.element, base.offset(index * stride), false, temps)?;
    }

    slot.write(buffer);
    Ok(())
}
