//! Call plans
//!
//! Built once per callable from its function info: which native slot each
//! declared argument occupies, its machine type, and which arguments only
//! carry the length of an array and so never reach the dynamic side.

use crate::catalog::{ArgInfo, FunctionInfo, Info, QualifiedName, Transfer, TypeInfo};
use crate::context::RuntimeContext;
use crate::error::{BridgeError, Result};
use crate::interop::MachineType;

#[derive(Debug, Clone)]
pub struct PlannedArg {
    pub info: ArgInfo,
    /// Index into the native argument vector
    pub slot: usize,
    pub machine: MachineType,
    /// Length filled in from an input array instead of a dynamic value
    pub hidden_input: bool,
    /// Length consumed by an output array instead of being returned
    pub hidden_output: bool,
}

impl PlannedArg {
    /// Native storage passed through a pointer
    #[inline]
    pub fn by_reference(&self) -> bool {
        self.info.direction.is_output() || self.info.caller_allocates
    }
}

#[derive(Debug, Clone)]
pub struct CallPlan {
    /// Container type of the receiver, for methods
    pub receiver: Option<QualifiedName>,
    pub args: Vec<PlannedArg>,
    pub throws: bool,
    pub return_type: TypeInfo,
    pub return_machine: MachineType,
    pub caller_owns: Transfer,
}

impl CallPlan {
    pub fn build(ctx: &RuntimeContext, function: &FunctionInfo) -> Result<Self> {
        let receiver = if function.has_receiver() {
            let container = function.container_name().ok_or_else(|| {
                BridgeError::encoding("call", format!("method `{}' has no container", function.name))
            })?;
            Some(container)
        } else {
            None
        };

        let first_slot = usize::from(receiver.is_some());
        let mut args = Vec::with_capacity(function.args.len());
        for (index, arg) in function.args.iter().enumerate() {
            let machine = if arg.direction.is_output() || arg.caller_allocates {
                MachineType::Pointer
            } else {
                machine_type(ctx, &arg.ty)?
            };
            args.push(PlannedArg {
                info: arg.clone(),
                slot: first_slot + index,
                machine,
                hidden_input: false,
                hidden_output: false,
            });
        }

        let return_machine = machine_type(ctx, &function.return_type)?;
        if let Some(length) = length_arg(&function.return_type) {
            hide_output(&mut args, length, &function.name)?;
        }
        for index in 0..args.len() {
            let Some(length) = length_arg(&args[index].info.ty) else {
                continue;
            };
            let direction = args[index].info.direction;
            if direction.is_input() {
                let target = checked(&mut args, length, &function.name)?;
                if target.info.direction.is_input() {
                    target.hidden_input = true;
                }
            }
            if direction.is_output() {
                hide_output(&mut args, length, &function.name)?;
            }
        }

        Ok(Self {
            receiver,
            args,
            throws: function.flags.throws,
            return_type: function.return_type.clone(),
            return_machine,
            caller_owns: function.caller_owns,
        })
    }

    /// Native slots: receiver, declared arguments, error slot
    pub fn slot_count(&self) -> usize {
        usize::from(self.receiver.is_some()) + self.args.len() + usize::from(self.throws)
    }

    pub fn arg_machines(&self) -> Vec<MachineType> {
        let mut machines = Vec::with_capacity(self.slot_count());
        if self.receiver.is_some() {
            machines.push(MachineType::Pointer);
        }
        machines.extend(self.args.iter().map(|arg| arg.machine));
        if self.throws {
            machines.push(MachineType::Pointer);
        }
        machines
    }
}

fn length_arg(ty: &TypeInfo) -> Option<usize> {
    match ty {
        TypeInfo::Array(array) if array.fixed_size.is_none() => array.length_arg,
        _ => None,
    }
}

fn checked<'a>(args: &'a mut [PlannedArg], index: usize, function: &str) -> Result<&'a mut PlannedArg> {
    let len = args.len();
    let arg = args.get_mut(index).ok_or_else(|| {
        BridgeError::encoding(
            "call",
            format!("`{}': length argument {} out of range ({} arguments)", function, index, len),
        )
    })?;
    if matches!(arg.info.ty, TypeInfo::Scalar(kind) if kind.machine_type().is_integral()) {
        Ok(arg)
    } else {
        Err(BridgeError::encoding(
            "call",
            format!("`{}': length argument `{}' is {}", function, arg.info.name, arg.info.ty.describe()),
        ))
    }
}

fn hide_output(args: &mut [PlannedArg], index: usize, function: &str) -> Result<()> {
    let target = checked(args, index, function)?;
    if target.info.direction.is_output() {
        target.hidden_output = true;
    }
    Ok(())
}

/// Machine type of a value passed by value
pub fn machine_type(ctx: &RuntimeContext, ty: &TypeInfo) -> Result<MachineType> {
    Ok(match ty {
        TypeInfo::Void => MachineType::Void,
        TypeInfo::Scalar(kind) => kind.machine_type(),
        TypeInfo::Array(_) => MachineType::Pointer,
        TypeInfo::Interface(name) => match &*ctx.resolve(name)? {
            Info::Enum(e) => e.storage.machine_type(),
            _ => MachineType::Pointer,
        },
        TypeInfo::Unsupported(tag) => {
            return Err(BridgeError::encoding("call", format!("unsupported type `{}'", tag)))
        }
    })
}
