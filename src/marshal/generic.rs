//! Generic value codec
//!
//! `GenericValue` is the tagged "any value" container the native property
//! accessors read and write. Object payloads hold one native reference,
//! released when the value is reset or its guard drops.

use super::{got, scalar};
use crate::catalog::{Info, ScalarKind, Transfer, TypeInfo};
use crate::compound;
use crate::context::RuntimeContext;
use crate::dynamic::{Value, Values};
use crate::error::{BridgeError, Result};
use crate::interop::{NativePtr, RuntimeType};
use smallvec::smallvec;
use std::ffi::CString;
use std::fmt;
use std::ops::{Deref, DerefMut};

/// What a generic value was initialised to hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Scalar(ScalarKind),
    Enum(RuntimeType),
    Flags(RuntimeType),
    Object(RuntimeType),
}

/// Payload of a generic value
#[derive(Debug, Clone, PartialEq)]
pub enum GenericData {
    Empty,
    Boolean(bool),
    Integer(i64),
    Unsigned(u64),
    Double(f64),
    String(Option<CString>),
    Object(NativePtr),
}

#[derive(Debug)]
pub struct GenericValue {
    ty: ValueType,
    data: GenericData,
}

impl GenericValue {
    pub fn new(ty: ValueType) -> Self {
        Self {
            ty,
            data: GenericData::Empty,
        }
    }

    #[inline]
    pub fn value_type(&self) -> ValueType {
        self.ty
    }

    #[inline]
    pub fn data(&self) -> &GenericData {
        &self.data
    }

    /// Replace the payload, returning the previous one
    pub fn set(&mut self, data: GenericData) -> GenericData {
        std::mem::replace(&mut self.data, data)
    }

    pub fn take(&mut self) -> GenericData {
        self.set(GenericData::Empty)
    }
}

/// Generic value that releases its object reference on drop
pub struct ValueGuard<'a> {
    ctx: &'a RuntimeContext,
    value: GenericValue,
}

impl Deref for ValueGuard<'_> {
    type Target = GenericValue;

    fn deref(&self) -> &GenericValue {
        &self.value
    }
}

impl DerefMut for ValueGuard<'_> {
    fn deref_mut(&mut self) -> &mut GenericValue {
        &mut self.value
    }
}

impl fmt::Debug for ValueGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueGuard")
            .field("type", &self.value.value_type())
            .field("data", self.value.data())
            .finish()
    }
}

impl Drop for ValueGuard<'_> {
    fn drop(&mut self) {
        let data = self.value.take();
        release(self.ctx, data);
    }
}

fn release(ctx: &RuntimeContext, data: GenericData) {
    if let GenericData::Object(ptr) = data {
        if !ptr.is_null() {
            // SAFETY: object payloads always carry one reference of their own.
            unsafe { ctx.host().object_unref(ptr) };
        }
    }
}

/// Initialise an empty generic value able to hold `ty`
pub fn init<'a>(ctx: &'a RuntimeContext, ty: &TypeInfo) -> Result<ValueGuard<'a>> {
    let value_type = match ty {
        TypeInfo::Scalar(kind) => ValueType::Scalar(*kind),
        TypeInfo::Interface(name) => {
            let info = ctx.resolve(name)?;
            let runtime_type = || -> Result<RuntimeType> {
                info.runtime_type()
                    .or_else(|| ctx.repo_type(&info).ok().and_then(|repo| repo.runtime_type))
                    .filter(|rt| rt.is_valid())
                    .ok_or_else(|| BridgeError::MissingRuntimeType(name.to_string()))
            };
            match &*info {
                Info::Enum(e) if e.is_flags => ValueType::Flags(runtime_type()?),
                Info::Enum(_) => ValueType::Enum(runtime_type()?),
                Info::Object(_) | Info::Interface(_) => ValueType::Object(runtime_type()?),
                Info::Struct(_) => {
                    return Err(BridgeError::encoding(
                        "generic value",
                        format!("don't know how to handle struct `{}'", name),
                    ))
                }
                other => {
                    return Err(BridgeError::encoding(
                        "generic value",
                        format!("{} `{}' cannot be held", other.info_type(), name),
                    ))
                }
            }
        }
        other => {
            return Err(BridgeError::encoding(
                "generic value",
                format!("{} cannot be held", other.describe()),
            ))
        }
    };

    Ok(ValueGuard {
        ctx,
        value: GenericValue::new(value_type),
    })
}

/// Set a generic value from the dynamic value at `position`
///
/// Returns the number of dynamic values consumed.
pub fn load(
    ctx: &RuntimeContext,
    value: Option<&Value>,
    position: usize,
    ty: &TypeInfo,
    generic: &mut GenericValue,
) -> Result<usize> {
    let data = match generic.value_type() {
        ValueType::Scalar(kind) => load_scalar(ctx, kind, value, position)?,
        ValueType::Enum(_) | ValueType::Flags(_) => {
            let value = value.ok_or_else(|| BridgeError::argument(position, "number", got(value)))?;
            let wide = scalar::checked_integer(ctx, ScalarKind::Int64, value, position)?;
            GenericData::Integer(wide as i64)
        }
        ValueType::Object(_) => {
            let info = match ty {
                TypeInfo::Interface(name) => ctx.resolve(name)?,
                other => {
                    return Err(BridgeError::encoding(
                        "generic value",
                        format!("object value described as {}", other.describe()),
                    ))
                }
            };
            let nil = value.map_or(true, Value::is_nil);
            let ptr = compound::load(ctx, value, position, &info, nil)?;
            if !ptr.is_null() {
                // SAFETY: the pointer comes from a live wrapper.
                unsafe { ctx.host().object_ref(ptr) };
            }
            GenericData::Object(ptr)
        }
    };

    let previous = generic.set(data);
    release(ctx, previous);
    Ok(1)
}

fn load_scalar(ctx: &RuntimeContext, kind: ScalarKind, value: Option<&Value>, position: usize) -> Result<GenericData> {
    if kind == ScalarKind::Boolean {
        return Ok(GenericData::Boolean(value.map_or(false, Value::truthy)));
    }
    if kind.is_string() && value.map_or(true, Value::is_nil) {
        return Ok(GenericData::String(None));
    }

    let value = match value {
        Some(v) if !v.is_nil() => v,
        missing => return Err(BridgeError::argument(position, kind.name(), got(missing))),
    };
    Ok(match kind {
        ScalarKind::Int8 | ScalarKind::Int16 | ScalarKind::Int32 | ScalarKind::Int64 => {
            GenericData::Integer(scalar::checked_integer(ctx, kind, value, position)? as i64)
        }
        ScalarKind::UInt8 | ScalarKind::UInt16 | ScalarKind::UInt32 | ScalarKind::UInt64 | ScalarKind::GType => {
            GenericData::Unsigned(scalar::checked_integer(ctx, kind, value, position)? as u64)
        }
        ScalarKind::Float | ScalarKind::Double => GenericData::Double(scalar::number(value, position)?),
        ScalarKind::Utf8 | ScalarKind::Filename => GenericData::String(Some(scalar::cstring(value, position)?)),
        ScalarKind::Boolean => GenericData::Boolean(value.truthy()),
    })
}

/// Dynamic value of a generic value
pub fn store(ctx: &RuntimeContext, generic: &GenericValue, ty: &TypeInfo) -> Result<Values> {
    let value = match generic.data() {
        GenericData::Empty => Value::Nil,
        GenericData::Boolean(b) => Value::Boolean(*b),
        GenericData::Integer(i) => Value::Integer(*i),
        GenericData::Unsigned(u) => i64::try_from(*u).map(Value::Integer).unwrap_or(Value::Number(*u as f64)),
        GenericData::Double(d) => Value::Number(*d),
        GenericData::String(Some(s)) => Value::string(s.to_string_lossy()),
        GenericData::String(None) => Value::Nil,
        GenericData::Object(ptr) if ptr.is_null() => Value::Nil,
        GenericData::Object(ptr) => {
            let info = match ty {
                TypeInfo::Interface(name) => ctx.resolve(name)?,
                other => {
                    return Err(BridgeError::encoding(
                        "generic value",
                        format!("object value described as {}", other.describe()),
                    ))
                }
            };
            let mut address = *ptr;
            // The generic value keeps its own reference; the wrapper gets a new one.
            unsafe {
                ctx.host().object_ref(address);
                compound::store(ctx, &info, &mut address, Transfer::Everything)?
            }
        }
    };
    Ok(smallvec![value])
}
