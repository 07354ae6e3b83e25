//! Scalar codec
//!
//! One native primitive <-> one dynamic value. Integer narrowing follows the
//! configured overflow policy.

use super::{got, Temporaries};
use crate::catalog::{ScalarKind, Transfer};
use crate::config::IntegerOverflow;
use crate::context::RuntimeContext;
use crate::dynamic::Value;
use crate::error::{BridgeError, Result};
use crate::interop::{NativePtr, Slot};
use crate::logging;
use num_traits::{AsPrimitive, NumCast};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;

/// Read a native scalar
///
/// # Safety
/// `slot` must hold a valid value of `kind`; strings must be null or NUL-terminated.
pub(crate) unsafe fn read(ctx: &RuntimeContext, kind: ScalarKind, transfer: Transfer, slot: Slot) -> Result<Value> {
    let value = match kind {
        ScalarKind::Boolean => Value::Boolean(slot.read::<i32>() != 0),
        ScalarKind::Int8 => Value::Integer(slot.read::<i8>() as i64),
        ScalarKind::UInt8 => Value::Integer(slot.read::<u8>() as i64),
        ScalarKind::Int16 => Value::Integer(slot.read::<i16>() as i64),
        ScalarKind::UInt16 => Value::Integer(slot.read::<u16>() as i64),
        ScalarKind::Int32 => Value::Integer(slot.read::<i32>() as i64),
        ScalarKind::UInt32 => Value::Integer(slot.read::<u32>() as i64),
        ScalarKind::Int64 => Value::Integer(slot.read::<i64>()),
        ScalarKind::UInt64 => {
            let v = slot.read::<u64>();
            i64::try_from(v).map(Value::Integer).unwrap_or(Value::Number(v as f64))
        }
        ScalarKind::Float => Value::Number(slot.read::<f32>() as f64),
        ScalarKind::Double => Value::Number(slot.read::<f64>()),
        ScalarKind::GType => Value::Integer(slot.read::<usize>() as i64),
        ScalarKind::Utf8 | ScalarKind::Filename => {
            let ptr = slot.read::<*mut c_char>();
            if ptr.is_null() {
                Value::Nil
            } else {
                let value = Value::string(CStr::from_ptr(ptr).to_string_lossy());
                if transfer != Transfer::None {
                    ctx.host().free(ptr as NativePtr);
                }
                value
            }
        }
    };
    logging::log_type_conversion(kind.name(), value.type_name());
    Ok(value)
}

/// Write a dynamic value as a native scalar
///
/// # Safety
/// `slot` must point to at least `kind.size()` writable bytes.
pub(crate) unsafe fn write(
    ctx: &RuntimeContext,
    kind: ScalarKind,
    value: Option<&Value>,
    position: usize,
    slot: Slot,
    optional: bool,
    temps: &Temporaries,
) -> Result<()> {
    let value = match value {
        Some(v) if !v.is_nil() => v,
        _ if optional => {
            write_zero(kind, slot);
            return Ok(());
        }
        missing => return Err(BridgeError::argument(position, expected(kind), got(missing))),
    };

    match kind {
        ScalarKind::Boolean => slot.write::<i32>(value.truthy() as i32),
        ScalarKind::Int8 => slot.write(narrow::<i8>(ctx, kind, value, position)?),
        ScalarKind::UInt8 => slot.write(narrow::<u8>(ctx, kind, value, position)?),
        ScalarKind::Int16 => slot.write(narrow::<i16>(ctx, kind, value, position)?),
        ScalarKind::UInt16 => slot.write(narrow::<u16>(ctx, kind, value, position)?),
        ScalarKind::Int32 => slot.write(narrow::<i32>(ctx, kind, value, position)?),
        ScalarKind::UInt32 => slot.write(narrow::<u32>(ctx, kind, value, position)?),
        ScalarKind::Int64 => slot.write(narrow::<i64>(ctx, kind, value, position)?),
        ScalarKind::UInt64 => slot.write(narrow::<u64>(ctx, kind, value, position)?),
        ScalarKind::GType => slot.write(narrow::<usize>(ctx, kind, value, position)?),
        ScalarKind::Float => slot.write(number(value, position)? as f32),
        ScalarKind::Double => slot.write(number(value, position)?),
        ScalarKind::Utf8 | ScalarKind::Filename => {
            let s = cstring(value, position)?;
            slot.write(temps.string(ctx, s));
        }
    }
    Ok(())
}

/// Native zero value of `kind` (false, 0, 0.0 or null)
///
/// # Safety
/// `slot` must point to at least `kind.size()` writable bytes.
pub(crate) unsafe fn write_zero(kind: ScalarKind, slot: Slot) {
    slot.clear(kind.size());
}

/// Dynamic integer checked against the range of `T`
pub(crate) fn narrow<T>(ctx: &RuntimeContext, kind: ScalarKind, value: &Value, position: usize) -> Result<T>
where
    T: NumCast + Copy + 'static,
    i128: AsPrimitive<T>,
{
    let wide = value
        .as_integer()
        .ok_or_else(|| BridgeError::argument(position, "number", value.type_name()))?;

    match ctx.config().marshal.integer_overflow {
        IntegerOverflow::Error => <T as NumCast>::from(wide)
            .ok_or_else(|| BridgeError::argument(position, format!("{} in range", kind.name()), wide.to_string())),
        IntegerOverflow::Wrap => Ok(wide.as_()),
    }
}

/// Dynamic integer checked against the range of an integral `kind`
pub(crate) fn checked_integer(ctx: &RuntimeContext, kind: ScalarKind, value: &Value, position: usize) -> Result<i128> {
    Ok(match kind {
        ScalarKind::Int8 => narrow::<i8>(ctx, kind, value, position)? as i128,
        ScalarKind::UInt8 => narrow::<u8>(ctx, kind, value, position)? as i128,
        ScalarKind::Int16 => narrow::<i16>(ctx, kind, value, position)? as i128,
        ScalarKind::UInt16 => narrow::<u16>(ctx, kind, value, position)? as i128,
        ScalarKind::Int32 => narrow::<i32>(ctx, kind, value, position)? as i128,
        ScalarKind::UInt32 => narrow::<u32>(ctx, kind, value, position)? as i128,
        ScalarKind::Int64 => narrow::<i64>(ctx, kind, value, position)? as i128,
        ScalarKind::UInt64 => narrow::<u64>(ctx, kind, value, position)? as i128,
        ScalarKind::GType => narrow::<usize>(ctx, kind, value, position)? as i128,
        other => return Err(BridgeError::encoding("integer", format!("{} is not integral", other.name()))),
    })
}

pub(crate) fn number(value: &Value, position: usize) -> Result<f64> {
    value
        .as_number()
        .ok_or_else(|| BridgeError::argument(position, "number", value.type_name()))
}

pub(crate) fn cstring(value: &Value, position: usize) -> Result<CString> {
    let text = value
        .as_text()
        .ok_or_else(|| BridgeError::argument(position, "string", value.type_name()))?;
    CString::new(text.as_bytes()).map_err(|_| BridgeError::argument(position, "string without NUL", "string with NUL"))
}

/// Element count stored in an integral slot
///
/// # Safety
/// `slot` must hold a valid value of `kind`.
pub(crate) unsafe fn read_length(kind: ScalarKind, slot: Slot) -> Option<usize> {
    let n: i128 = match kind {
        ScalarKind::Int8 => slot.read::<i8>() as i128,
        ScalarKind::UInt8 => slot.read::<u8>() as i128,
        ScalarKind::Int16 => slot.read::<i16>() as i128,
        ScalarKind::UInt16 => slot.read::<u16>() as i128,
        ScalarKind::Int32 => slot.read::<i32>() as i128,
        ScalarKind::UInt32 => slot.read::<u32>() as i128,
        ScalarKind::Int64 => slot.read::<i64>() as i128,
        ScalarKind::UInt64 => slot.read::<u64>() as i128,
        _ => return None,
    };
    usize::try_from(n).ok()
}

/// Store an element count into an integral slot
///
/// `position` is the array argument the count belongs to; a count the
/// length type cannot represent is an argument error there.
///
/// # Safety
/// `slot` must point to at least `kind.size()` writable bytes.
pub(crate) unsafe fn write_length(kind: ScalarKind, slot: Slot, len: usize, position: usize) -> Result<()> {
    match kind {
        ScalarKind::Int8 => slot.write(count::<i8>(kind, len, position)?),
        ScalarKind::UInt8 => slot.write(count::<u8>(kind, len, position)?),
        ScalarKind::Int16 => slot.write(count::<i16>(kind, len, position)?),
        ScalarKind::UInt16 => slot.write(count::<u16>(kind, len, position)?),
        ScalarKind::Int32 => slot.write(count::<i32>(kind, len, position)?),
        ScalarKind::UInt32 => slot.write(count::<u32>(kind, len, position)?),
        ScalarKind::Int64 => slot.write(count::<i64>(kind, len, position)?),
        ScalarKind::UInt64 => slot.write(count::<u64>(kind, len, position)?),
        other => {
            return Err(BridgeError::encoding(
                "array length",
                format!("{} cannot hold an element count", other.name()),
            ))
        }
    }
    Ok(())
}

fn count<T: NumCast>(kind: ScalarKind, len: usize, position: usize) -> Result<T> {
    <T as NumCast>::from(len)
        .ok_or_else(|| BridgeError::argument(position, format!("{} in range", kind.name()), len.to_string()))
}

fn expected(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::Boolean => "boolean",
        ScalarKind::Utf8 | ScalarKind::Filename => "string",
        _ => "number",
    }
}
