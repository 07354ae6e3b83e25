//! Generic call invoker
//!
//! A `Callable` pairs a function info with a call plan and a prepared call
//! descriptor, all built once. Each call then runs the same frame:
//! prepare slots, marshal inputs, dispatch, check the error slot, marshal
//! the return value and outputs.

mod plan;

pub use plan::{machine_type, CallPlan, PlannedArg};

use crate::catalog::{InfoRef, Transfer, TypeInfo};
use crate::compound;
use crate::context::RuntimeContext;
use crate::dynamic::{Value, Values};
use crate::error::{BridgeError, Result};
use crate::interop::{Argument, CallingConvention, FunctionCall, NativeError, NativePtr, Slot};
use crate::logging::{self, perf};
use crate::marshal::{self, Temporaries};
use smallvec::smallvec;
use std::ffi::c_void;
use std::fmt;

/// A native function ready to be called from the dynamic side
pub struct Callable {
    info: InfoRef,
    name: String,
    plan: CallPlan,
    call: FunctionCall,
}

impl Callable {
    pub fn new(ctx: &RuntimeContext, info: InfoRef) -> Result<Self> {
        let function = info
            .as_function()
            .ok_or_else(|| BridgeError::encoding("callable", format!("{} is not a function", info)))?;

        let plan = CallPlan::build(ctx, function)?;
        let ptr = ctx
            .symbols()
            .resolve(&function.symbol)
            .map_err(|e| BridgeError::Symbol {
                symbol: e.symbol().to_string(),
            })?;
        let call = FunctionCall::new(ptr, CallingConvention::platform(), plan.return_machine, plan.arg_machines());
        let name = match &function.container {
            Some(container) => format!("{}.{}.{}", function.namespace, container, function.name),
            None => format!("{}.{}", function.namespace, function.name),
        };

        Ok(Self { info, name, plan, call })
    }

    #[inline]
    pub fn info(&self) -> &InfoRef {
        &self.info
    }

    /// Fully qualified name (`ns.container.name`)
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn plan(&self) -> &CallPlan {
        &self.plan
    }

    /// Call with dynamic arguments
    ///
    /// Returns the return value (unless void) followed by the output
    /// arguments in declaration order. A native error reported through the
    /// error slot becomes the values `[false, message, code]`.
    pub fn call(&self, ctx: &RuntimeContext, args: &[Value]) -> Result<Values> {
        let _perf = perf::track(&self.name);
        let plan = &self.plan;
        let temps = Temporaries::new();

        // Prepare
        let mut storage = vec![Argument::zeroed(); plan.args.len()];
        let mut preallocated: Vec<Option<Value>> = vec![None; plan.args.len()];
        let mut lengths = Vec::new();
        let mut receiver: NativePtr = std::ptr::null_mut();
        let mut next = 0;

        // MarshalIn
        if let Some(container) = &plan.receiver {
            let info = ctx.resolve(container)?;
            receiver = compound::load(ctx, args.first(), 1, &info, true)?;
            next = 1;
        }

        for (index, arg) in plan.args.iter().enumerate() {
            let info = &arg.info;
            if info.direction.is_input() {
                if arg.hidden_input {
                    continue;
                }
                let value = args.get(next);
                let position = next + 1;
                let slot = Slot::of(&mut storage[index]);
                // SAFETY: each storage entry is a full `Argument`.
                next += unsafe {
                    marshal::from_dynamic(
                        ctx,
                        value,
                        position,
                        &info.ty,
                        slot,
                        info.may_be_null || info.optional,
                        &temps,
                    )?
                };
                if let TypeInfo::Array(array) = &info.ty {
                    if let Some(length) = array.length_arg {
                        let len = value.and_then(Value::as_sequence).map_or(0, <[Value]>::len);
                        lengths.push((length, len, position));
                    }
                }
            } else if info.caller_allocates {
                let TypeInfo::Interface(name) = &info.ty else {
                    return Err(BridgeError::encoding(
                        "call",
                        format!("caller-allocated `{}' is {}", info.name, info.ty.describe()),
                    ));
                };
                let struct_info = ctx.resolve(name)?;
                let mut address: NativePtr = std::ptr::null_mut();
                // SAFETY: container transfer allocates fresh inline storage.
                let value = unsafe { compound::store(ctx, &struct_info, &mut address, Transfer::Container)? };
                storage[index] = Argument::from_ptr(address);
                preallocated[index] = Some(value);
            }
        }

        for (length, len, position) in lengths {
            if let TypeInfo::Scalar(kind) = plan.args[length].info.ty {
                // SAFETY: length arguments are integral scalars (checked by the plan).
                unsafe { marshal::write_length(kind, Slot::of(&mut storage[length]), len, position)? };
            }
        }

        // Invoke
        let mut error: *mut NativeError = std::ptr::null_mut();
        let mut argv = Vec::with_capacity(plan.slot_count());
        if plan.receiver.is_some() {
            argv.push(Argument::from_ptr(receiver));
        }
        let base = storage.as_mut_ptr();
        for (index, arg) in plan.args.iter().enumerate() {
            // SAFETY: `index` is in bounds; storage is not touched again until the call returns.
            let entry = unsafe { base.add(index) };
            if arg.by_reference() && !arg.info.caller_allocates {
                argv.push(Argument::from_ptr(entry as *mut c_void));
            } else {
                argv.push(unsafe { *entry });
            }
        }
        if plan.throws {
            argv.push(Argument::from_ptr(&mut error as *mut *mut NativeError as *mut c_void));
        }

        logging::log_call(&self.name, argv.len());
        // SAFETY: the plan matches the descriptor; every pointer in argv refers
        // to storage, temporaries or wrappers that outlive the call.
        let mut ret = unsafe { self.call.call(ctx.dispatcher(), &argv)? };

        // CheckError
        if !error.is_null() {
            // SAFETY: a non-null error slot holds an error record owned by us.
            let (message, code) = unsafe {
                let record = &*error;
                let found = (record.message(), record.code);
                ctx.host().error_free(error);
                found
            };
            logging::log_call_failure(&self.name, &message, code);
            return Ok(smallvec![Value::Boolean(false), Value::string(message), Value::Integer(code as i64)]);
        }

        // MarshalOut
        let mut results = Values::new();
        let return_length = self.output_length(&plan.return_type, &mut storage);
        // SAFETY: the dispatcher wrote a value of the declared return type.
        results.extend(unsafe {
            marshal_out(ctx, &plan.return_type, plan.caller_owns, Slot::of(&mut ret), return_length)?
        });

        for (index, arg) in plan.args.iter().enumerate() {
            let info = &arg.info;
            if !info.direction.is_output() || arg.hidden_output {
                continue;
            }
            if let Some(value) = preallocated[index].take() {
                results.push(value);
                continue;
            }
            let length = self.output_length(&info.ty, &mut storage);
            // SAFETY: the callee filled the output storage.
            results.extend(unsafe {
                marshal_out(ctx, &info.ty, info.transfer, Slot::of(&mut storage[index]), length)?
            });
        }

        logging::log_call_return(&self.name, results.len());
        Ok(results)
    }

    /// Element count of an output array held by its length argument
    fn output_length(&self, ty: &TypeInfo, storage: &mut [Argument]) -> Option<usize> {
        let TypeInfo::Array(array) = ty else {
            return None;
        };
        let index = array.length_arg?;
        let TypeInfo::Scalar(kind) = self.plan.args.get(index)?.info.ty else {
            return None;
        };
        // SAFETY: the length argument's storage holds a value of its kind.
        unsafe { marshal::read_length(kind, Slot::of(&mut storage[index])) }
    }
}

/// Output marshalling, with the array length when one is known
///
/// # Safety
/// See [`marshal::to_dynamic`].
unsafe fn marshal_out(
    ctx: &RuntimeContext,
    ty: &TypeInfo,
    transfer: Transfer,
    slot: Slot,
    length: Option<usize>,
) -> Result<Values> {
    match ty {
        TypeInfo::Array(array) => marshal::to_dynamic_with_length(ctx, array, transfer, slot, length),
        other => marshal::to_dynamic(ctx, other, transfer, slot),
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function: {}", self.name)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("name", &self.name)
            .field("slots", &self.plan.slot_count())
            .field("ptr", &self.call.ptr())
            .finish()
    }
}
