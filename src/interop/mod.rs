//! Interoperability - the native side of the bridge
//!
//! Design: machine-level slots plus narrow traits for everything native
//!
//! Architecture:
//! - `types.rs` - machine types, the `Argument` slot union and `Slot` views
//! - `call.rs` - prepared call descriptors and the `CallDispatcher` seam
//! - `abi.rs` - calling convention support
//! - `library.rs` - dynamic library loading and symbol resolution
//! - `host.rs` - native runtime services (refcounts, frees, type tags)
//! - `ffi_dispatch.rs` - libffi dispatcher (`libffi` feature)

mod types;
mod call;
mod abi;
mod library;
mod host;
#[cfg(feature = "libffi")]
mod ffi_dispatch;

pub use types::{MachineType, Argument, Slot};
pub use call::{FunctionCall, CallDispatcher, CallError};
pub use abi::CallingConvention;
pub use library::{Library, SymbolTable, SymbolResolver, LoadError, SymbolError};
pub use host::{NativeHost, NativePtr, RuntimeType, NativeArray, NativeError};
#[cfg(feature = "libffi")]
pub use ffi_dispatch::FfiDispatcher;
