//! libffi-backed call dispatcher

use super::abi::CallingConvention;
use super::call::{CallDispatcher, CallError, FunctionCall};
use super::types::{Argument, MachineType};
use libffi::middle::{Arg, Cif, CodePtr, Type};
use std::cell::RefCell;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CifKey {
    return_type: MachineType,
    arg_types: Vec<MachineType>,
}

/// Dispatcher performing real calls through libffi
///
/// Call interfaces are built once per distinct machine signature.
#[derive(Default)]
pub struct FfiDispatcher {
    cifs: RefCell<HashMap<CifKey, Cif>>,
}

impl FfiDispatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

fn ffi_type(ty: MachineType) -> Type {
    match ty {
        MachineType::Void => Type::void(),
        MachineType::I8 => Type::i8(),
        MachineType::U8 => Type::u8(),
        MachineType::I16 => Type::i16(),
        MachineType::U16 => Type::u16(),
        MachineType::I32 => Type::i32(),
        MachineType::U32 => Type::u32(),
        MachineType::I64 => Type::i64(),
        MachineType::U64 => Type::u64(),
        MachineType::F32 => Type::f32(),
        MachineType::F64 => Type::f64(),
        MachineType::Pointer => Type::pointer(),
    }
}

impl CallDispatcher for FfiDispatcher {
    unsafe fn dispatch(&self, call: &FunctionCall, args: &[Argument]) -> Result<Argument, CallError> {
        if !call.convention().is_native() {
            return Err(CallError::UnsupportedConvention(call.convention()));
        }

        let key = CifKey {
            return_type: call.return_type(),
            arg_types: call.arg_types().to_vec(),
        };
        let mut cifs = self.cifs.borrow_mut();
        let cif = cifs.entry(key).or_insert_with(|| {
            Cif::new(
                call.arg_types().iter().map(|&t| ffi_type(t)),
                ffi_type(call.return_type()),
            )
        });

        // Each union member lives at offset 0, so the slot address serves every type.
        let ffi_args: Vec<Arg> = args.iter().map(Arg::new).collect();
        let code = CodePtr(call.ptr() as *mut _);

        let mut ret = Argument::zeroed();
        match call.return_type() {
            MachineType::Void => cif.call::<()>(code, &ffi_args),
            MachineType::I8 => ret.i8 = cif.call::<i8>(code, &ffi_args),
            MachineType::U8 => ret.u8 = cif.call::<u8>(code, &ffi_args),
            MachineType::I16 => ret.i16 = cif.call::<i16>(code, &ffi_args),
            MachineType::U16 => ret.u16 = cif.call::<u16>(code, &ffi_args),
            MachineType::I32 => ret.i32 = cif.call::<i32>(code, &ffi_args),
            MachineType::U32 => ret.u32 = cif.call::<u32>(code, &ffi_args),
            MachineType::I64 => ret.i64 = cif.call::<i64>(code, &ffi_args),
            MachineType::U64 => ret.u64 = cif.call::<u64>(code, &ffi_args),
            MachineType::F32 => ret.f32 = cif.call::<f32>(code, &ffi_args),
            MachineType::F64 => ret.f64 = cif.call::<f64>(code, &ffi_args),
            MachineType::Pointer => ret.ptr = cif.call::<*mut core::ffi::c_void>(code, &ffi_args),
        }
        Ok(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn add_i32(a: i32, b: i32) -> i32 {
        a + b
    }

    extern "C" fn mul_f64(a: f64, b: f64) -> f64 {
        a * b
    }

    extern "C" fn no_args() -> i32 {
        42
    }

    #[test]
    fn test_ffi_call_no_args() {
        let call = FunctionCall::new(
            no_args as *const (),
            CallingConvention::platform(),
            MachineType::I32,
            vec![],
        );
        let dispatcher = FfiDispatcher::new();
        unsafe {
            let result = call.call(&dispatcher, &[]).unwrap();
            assert_eq!(result.i32, 42);
        }
    }

    #[test]
    fn test_ffi_call_mixed_signatures() {
        let dispatcher = FfiDispatcher::new();
        let add = FunctionCall::new(
            add_i32 as *const (),
            CallingConvention::platform(),
            MachineType::I32,
            vec![MachineType::I32, MachineType::I32],
        );
        let mul = FunctionCall::new(
            mul_f64 as *const (),
            CallingConvention::platform(),
            MachineType::F64,
            vec![MachineType::F64, MachineType::F64],
        );
        unsafe {
            let sum = add.call(&dispatcher, &[Argument { i32: 40 }, Argument { i32: 2 }]).unwrap();
            assert_eq!(sum.i32, 42);
            let product = mul.call(&dispatcher, &[Argument { f64: 1.5 }, Argument { f64: 4.0 }]).unwrap();
            assert!((product.f64 - 6.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_foreign_convention_rejected() {
        let foreign = if CallingConvention::platform() == CallingConvention::Win64 {
            CallingConvention::SysV
        } else {
            CallingConvention::Win64
        };
        let call = FunctionCall::new(no_args as *const (), foreign, MachineType::I32, vec![]);
        let err = unsafe { call.call(&FfiDispatcher::new(), &[]) }.unwrap_err();
        assert!(matches!(err, CallError::UnsupportedConvention(_)));
    }
}
