//! Prepared native calls
//!
//! A `FunctionCall` is the runtime-built call descriptor: resolved address,
//! convention and machine signature. Performing the call is delegated to a
//! [`CallDispatcher`].

use super::abi::CallingConvention;
use super::types::{Argument, MachineType};
use thiserror::Error;

/// Function call descriptor
#[derive(Debug, Clone)]
pub struct FunctionCall {
    ptr: *const (),
    convention: CallingConvention,
    return_type: MachineType,
    arg_types: Vec<MachineType>,
}

impl FunctionCall {
    /// Create function call descriptor
    #[inline]
    pub fn new(
        ptr: *const (),
        convention: CallingConvention,
        return_type: MachineType,
        arg_types: Vec<MachineType>,
    ) -> Self {
        Self {
            ptr,
            convention,
            return_type,
            arg_types,
        }
    }

    #[inline]
    pub fn ptr(&self) -> *const () {
        self.ptr
    }

    #[inline]
    pub fn convention(&self) -> CallingConvention {
        self.convention
    }

    #[inline]
    pub fn return_type(&self) -> MachineType {
        self.return_type
    }

    #[inline]
    pub fn arg_types(&self) -> &[MachineType] {
        &self.arg_types
    }

    /// Call function with arguments
    ///
    /// # Safety
    /// Caller must ensure:
    /// - Function pointer is valid
    /// - Arguments match declared types
    /// - Pointer arguments reference live memory for the duration of the call
    pub unsafe fn call(
        &self,
        dispatcher: &dyn CallDispatcher,
        args: &[Argument],
    ) -> Result<Argument, CallError> {
        if args.len() != self.arg_types.len() {
            return Err(CallError::ArgCountMismatch {
                expected: self.arg_types.len(),
                got: args.len(),
            });
        }
        if self.ptr.is_null() {
            return Err(CallError::NullFunction);
        }
        if let Some(&ty) = self.arg_types.iter().find(|t| **t == MachineType::Void) {
            return Err(CallError::UnsupportedType(ty));
        }

        dispatcher.dispatch(self, args)
    }
}

/// The low-level call primitive
///
/// Given a prepared descriptor and one [`Argument`] per declared slot, invoke
/// the function and return its return slot. The slot for a `Void` return is
/// unspecified.
pub trait CallDispatcher {
    /// # Safety
    /// Same contract as [`FunctionCall::call`]; `args.len()` already matches.
    unsafe fn dispatch(&self, call: &FunctionCall, args: &[Argument]) -> Result<Argument, CallError>;
}

/// Function call errors
#[derive(Debug, Error)]
pub enum CallError {
    #[error("expected {expected} arguments, got {got}")]
    ArgCountMismatch { expected: usize, got: usize },

    #[error("call through null function pointer")]
    NullFunction,

    #[error("machine type {0:?} not supported by dispatcher")]
    UnsupportedType(MachineType),

    #[error("calling convention {0} not supported by dispatcher")]
    UnsupportedConvention(CallingConvention),

    #[error("no native implementation at {0:#x}")]
    UnknownFunction(usize),
}
