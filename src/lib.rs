//! dynabind - metadata-driven bridge between a dynamic runtime and native libraries
//!
//! Architecture:
//! - `catalog` - introspection data describing native types and functions
//! - `interop` - machine-level call descriptors, symbol lookup, native host services
//! - `marshal` - value conversion between native slots and dynamic values
//! - `compound` - wrappers for native structs and objects, identity cache, repo types
//! - `invoke` - call plans and the generic call frame
//! - `context` - per-runtime state and the top-level entry points

// Core modules
pub mod catalog;
pub mod compound;
pub mod config;
pub mod context;
pub mod dynamic;
pub mod error;
pub mod interop;
pub mod invoke;
pub mod logging;
pub mod marshal;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

// Re-export commonly used items
pub use catalog::{Catalog, Info, InfoRef, MemoryCatalog, QualifiedName, Transfer, TypeInfo};
pub use compound::{Compound, RepoType};
pub use config::BridgeConfig;
pub use context::{RuntimeContext, RuntimeContextBuilder};
pub use dynamic::{Value, Values};
pub use error::{BridgeError, Result};
pub use interop::{CallDispatcher, NativeHost, SymbolResolver};
pub use invoke::Callable;
pub use marshal::{GenericValue, Temporaries};
