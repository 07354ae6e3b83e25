//! Compound object manager
//!
//! Wraps native struct and object instances as dynamic values. At most one
//! live wrapper exists per native address; the identity cache holds wrappers
//! weakly, so a wrapper lives exactly as long as the dynamic side references
//! it. Dropping the last reference finalizes the wrapper: owned objects are
//! unreferenced, owned structs go to their `dispose` hook.

mod cache;
mod repo;

pub use cache::{BindingTable, IdentityCache};
pub use repo::{AcquireHook, DisposeHook, Element, Hooks, IndexHook, NewIndexHook, RepoType};

use crate::catalog::{Info, InfoRef, InfoType, QualifiedName, Transfer};
use crate::context::{RuntimeContext, Shared};
use crate::dynamic::Value;
use crate::error::{AccessReason, BridgeError, Result};
use crate::interop::{NativePtr, Slot};
use crate::invoke::Callable;
use crate::logging::{self, warn};
use crate::marshal::{self, generic, Temporaries};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Position of the assigned value in a `set` operation (self, key, value)
const SET_POSITION: usize = 3;

/// Native side of one wrapper
pub struct CompoundCell {
    address: NativePtr,
    owns: Cell<bool>,
    binding: usize,
    kind: InfoType,
    type_name: QualifiedName,
    /// Inline storage, present for container-allocated structs
    storage: Option<Box<[u64]>>,
    /// Keeps the context's tables alive until the last wrapper is finalized
    context: Rc<Shared>,
}

/// Dynamic-side wrapper of a native struct or object instance
#[derive(Clone)]
pub struct Compound(Rc<CompoundCell>);

impl Compound {
    #[inline]
    pub fn address(&self) -> NativePtr {
        self.0.address
    }

    /// Whether finalization releases the native resource
    #[inline]
    pub fn owns(&self) -> bool {
        self.0.owns.get()
    }

    #[inline]
    pub fn kind(&self) -> InfoType {
        self.0.kind
    }

    #[inline]
    pub fn type_name(&self) -> &QualifiedName {
        &self.0.type_name
    }

    #[inline]
    pub fn binding(&self) -> usize {
        self.0.binding
    }

    /// True when the wrapper carries its own inline storage
    #[inline]
    pub fn is_inline(&self) -> bool {
        self.0.storage.is_some()
    }

    /// Identity comparison
    #[inline]
    pub fn same(&self, other: &Compound) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Repo type anchored by the wrapper's binding slot
    pub fn repo_type(&self, ctx: &RuntimeContext) -> Result<Rc<RepoType>> {
        ctx.shared()
            .bindings
            .borrow()
            .get(self.0.binding)
            .ok_or_else(|| BridgeError::NotInRepo(self.0.type_name.to_string()))
    }

    /// Read a field, property, method or stored value by name
    pub fn get(&self, ctx: &RuntimeContext, name: &str) -> Result<Value> {
        let repo = self.repo_type(ctx)?;
        let Some((owner, element)) = find_element(ctx, &repo, name)? else {
            return match find_hook(ctx, &repo, |hooks| hooks.index.clone())? {
                Some(index) => index(ctx, self, name),
                None => Err(self.access_error(name, AccessReason::Missing)),
            };
        };

        match element {
            Element::Field(field) => {
                if !field.readable {
                    return Err(self.access_error(name, AccessReason::NotReadable));
                }
                let slot = self.slot()?;
                // SAFETY: the offset comes from the catalog layout of this type.
                let values = unsafe { marshal::to_dynamic(ctx, &field.ty, Transfer::None, slot.offset(field.offset))? };
                Ok(values.into_iter().next().unwrap_or_default())
            }
            Element::Property(prop) => {
                if !prop.readable {
                    return Err(self.access_error(name, AccessReason::NotReadable));
                }
                let mut value = generic::init(ctx, &prop.ty)?;
                // SAFETY: properties are only declared on object types.
                unsafe { ctx.host().get_property(self.address(), name, &mut value)? };
                let values = generic::store(ctx, &value, &prop.ty)?;
                Ok(values.into_iter().next().unwrap_or_default())
            }
            Element::Method(info) => {
                let value = Value::Callable(Rc::new(Callable::new(ctx, info)?));
                owner.cache_element(name, Element::Value(value.clone()));
                Ok(value)
            }
            Element::Value(value) => Ok(value),
        }
    }

    /// Assign a field or property by name
    pub fn set(&self, ctx: &RuntimeContext, name: &str, value: &Value) -> Result<()> {
        let repo = self.repo_type(ctx)?;
        let Some((_, element)) = find_element(ctx, &repo, name)? else {
            return match find_hook(ctx, &repo, |hooks| hooks.newindex.clone())? {
                Some(newindex) => newindex(ctx, self, name, value),
                None => Err(self.access_error(name, AccessReason::Missing)),
            };
        };

        match element {
            Element::Field(field) => {
                if !field.writable {
                    return Err(self.access_error(name, AccessReason::NotWritable));
                }
                let slot = self.slot()?;
                // Field values outlive this call; strings are copied to native memory.
                let temps = Temporaries::persistent();
                unsafe {
                    marshal::from_dynamic(
                        ctx,
                        Some(value),
                        SET_POSITION,
                        &field.ty,
                        slot.offset(field.offset),
                        false,
                        &temps,
                    )?;
                }
                Ok(())
            }
            Element::Property(prop) => {
                if !prop.writable {
                    return Err(self.access_error(name, AccessReason::NotWritable));
                }
                let mut generic_value = generic::init(ctx, &prop.ty)?;
                generic::load(ctx, Some(value), SET_POSITION, &prop.ty, &mut generic_value)?;
                // SAFETY: properties are only declared on object types.
                unsafe { ctx.host().set_property(self.address(), name, &generic_value) }
            }
            Element::Method(_) | Element::Value(_) => Err(self.access_error(name, AccessReason::NotWritable)),
        }
    }

    fn slot(&self) -> Result<Slot> {
        Slot::from_raw(self.address() as *mut u8)
            .ok_or_else(|| BridgeError::encoding("compound", format!("`{}' has a null address", self.0.type_name)))
    }

    fn access_error(&self, element: &str, reason: AccessReason) -> BridgeError {
        BridgeError::access(self.0.type_name.to_string(), element, reason)
    }
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:p})", self.0.type_name, self.0.address)
    }
}

impl fmt::Debug for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compound")
            .field("type", &self.0.type_name.to_string())
            .field("address", &self.0.address)
            .field("owns", &self.0.owns.get())
            .finish()
    }
}

/// Element `name` on `repo` or one of its ancestors, with the repo type holding it
fn find_element(ctx: &RuntimeContext, repo: &Rc<RepoType>, name: &str) -> Result<Option<(Rc<RepoType>, Element)>> {
    let mut current = Rc::clone(repo);
    loop {
        if let Some(element) = current.element(name) {
            return Ok(Some((current, element)));
        }
        match current.parent.clone() {
            Some(parent) => current = ctx.lookup_repo_type(&parent)?,
            None => return Ok(None),
        }
    }
}

fn find_hook<T>(ctx: &RuntimeContext, repo: &Rc<RepoType>, pick: impl Fn(&Hooks) -> Option<T>) -> Result<Option<T>> {
    let mut current = Rc::clone(repo);
    loop {
        if let Some(hook) = pick(&current.hooks) {
            return Ok(Some(hook));
        }
        match current.parent.clone() {
            Some(parent) => current = ctx.lookup_repo_type(&parent)?,
            None => return Ok(None),
        }
    }
}

/// Wrap the native instance at `*address`
///
/// A null address yields `Nil` unless the transfer is `Container`, which
/// allocates zeroed inline storage and redirects `*address` to it.
///
/// # Safety
/// A non-null `*address` must point to a live instance of `info`. With
/// `Everything` transfer the caller hands over one reference/ownership.
pub unsafe fn store(ctx: &RuntimeContext, info: &InfoRef, address: &mut NativePtr, transfer: Transfer) -> Result<Value> {
    if transfer != Transfer::Container && address.is_null() {
        return Ok(Value::Nil);
    }

    let kind = info.info_type();
    if !matches!(kind, InfoType::Struct | InfoType::Object) {
        return Err(BridgeError::encoding(
            "compound",
            format!("{} `{}' cannot be wrapped", kind, info.qualified_name()),
        ));
    }

    if transfer != Transfer::Container {
        let cached = ctx.shared().cache.borrow_mut().lookup(*address as usize);
        if let Some(cell) = cached {
            if transfer == Transfer::Everything {
                adopt(ctx, &cell)?;
            }
            return Ok(Value::Compound(Compound(cell)));
        }
    }

    let repo = ctx.repo_type(info)?;
    let mut storage = None;
    let mut owns = transfer == Transfer::Everything;
    match transfer {
        Transfer::Container => {
            if kind == InfoType::Object {
                return Err(BridgeError::encoding(
                    "compound",
                    format!("object `{}' cannot be allocated inline", repo.name),
                ));
            }
            let words = ((repo.size + 7) / 8).max(1);
            let mut inline = vec![0u64; words].into_boxed_slice();
            *address = inline.as_mut_ptr() as NativePtr;
            storage = Some(inline);
        }
        Transfer::None => match kind {
            InfoType::Object => {
                ctx.host().object_ref(*address);
                owns = true;
            }
            InfoType::Struct => {
                if let Some(acquire) = repo.hooks.acquire.clone() {
                    acquire(ctx, *address)?;
                    owns = true;
                }
            }
            _ => {}
        },
        Transfer::Everything => {}
    }

    let binding = ctx.shared().bindings.borrow_mut().insert(Rc::clone(&repo));
    let cell = Rc::new(CompoundCell {
        address: *address,
        owns: Cell::new(owns),
        binding,
        kind,
        type_name: repo.name.clone(),
        storage,
        context: Rc::clone(ctx.shared()),
    });
    ctx.shared().cache.borrow_mut().insert(*address as usize, &cell);
    logging::log_wrapper_created(&cell.type_name.to_string(), *address as *const u8, owns);

    Ok(Value::Compound(Compound(cell)))
}

/// Fold a handed-over instance into the wrapper already cached for it
///
/// The wrapper keeps at most one reference. An object's surplus reference
/// is dropped. A struct wrapper that did not own its instance takes over
/// the ownership; one that already did releases the surplus through the
/// `dispose` hook.
///
/// # Safety
/// The caller hands over one reference/ownership of `cell`'s instance.
unsafe fn adopt(ctx: &RuntimeContext, cell: &CompoundCell) -> Result<()> {
    match cell.kind {
        InfoType::Object => ctx.host().object_unref(cell.address),
        _ if !cell.owns.get() => cell.owns.set(true),
        _ => {
            let repo = ctx.lookup_repo_type(&cell.type_name)?;
            if let Some(dispose) = repo.hooks.dispose.clone() {
                dispose(ctx, cell.address);
            }
        }
    }
    Ok(())
}

/// Native address of the wrapper at `position`, checked against `info`
///
/// The wrapper must be of the requested type or one of its descendants.
/// With `optional`, anything else yields null instead of an error.
pub fn load(ctx: &RuntimeContext, value: Option<&Value>, position: usize, info: &Info, optional: bool) -> Result<NativePtr> {
    let expected = info.qualified_name();
    let compound = match value {
        Some(Value::Compound(compound)) => compound,
        _ if optional => return Ok(std::ptr::null_mut()),
        other => return Err(BridgeError::argument(position, expected.to_string(), marshal::got(other))),
    };

    let (matches, actual) = match requested_runtime_type(info) {
        Some(requested) if compound.kind() == InfoType::Object => {
            let host = ctx.host();
            // SAFETY: object wrappers keep their instance alive.
            let actual = unsafe { host.instance_type(compound.address()) };
            let name = host.type_name(actual).unwrap_or_else(|| compound.type_name().to_string());
            (host.type_is_a(actual, requested), name)
        }
        _ => (
            descends_from(ctx, compound.type_name(), &expected),
            compound.type_name().to_string(),
        ),
    };

    if matches {
        Ok(compound.address())
    } else if optional {
        Ok(std::ptr::null_mut())
    } else {
        Err(BridgeError::argument(position, expected.to_string(), actual))
    }
}

fn requested_runtime_type(info: &Info) -> Option<crate::interop::RuntimeType> {
    match info {
        Info::Object(_) | Info::Interface(_) => info.runtime_type().filter(|rt| rt.is_valid()),
        _ => None,
    }
}

/// Name-based ancestry walk through the repo table
fn descends_from(ctx: &RuntimeContext, actual: &QualifiedName, expected: &QualifiedName) -> bool {
    let mut current = actual.clone();
    loop {
        if &current == expected {
            return true;
        }
        match ctx.lookup_repo_type(&current).ok().and_then(|repo| repo.parent.clone()) {
            Some(parent) => current = parent,
            None => return false,
        }
    }
}

impl Drop for CompoundCell {
    fn drop(&mut self) {
        let ctx = RuntimeContext::from_shared(Rc::clone(&self.context));
        let address = self.address as *const u8;

        match ctx.shared().cache.try_borrow_mut() {
            Ok(mut cache) => cache.prune(self.address as usize, self as *const CompoundCell),
            Err(_) => warn!(address = ?address, "identity cache busy during finalize"),
        }

        let repo = match ctx.shared().bindings.try_borrow_mut() {
            Ok(mut bindings) => bindings.release(self.binding),
            Err(_) => {
                warn!(address = ?address, binding = self.binding, "binding table busy during finalize");
                None
            }
        };

        let owns = self.owns.get();
        if owns {
            match (self.kind, repo.as_ref()) {
                (InfoType::Struct, Some(repo)) => {
                    if let Some(dispose) = repo.hooks.dispose.clone() {
                        dispose(&ctx, self.address);
                    }
                }
                // SAFETY: an owning object wrapper holds exactly one reference.
                (InfoType::Object, _) => unsafe { ctx.host().object_unref(self.address) },
                (kind, _) => logging::log_consistency_violation(&format!("owning {} wrapper", kind), address),
            }
        }

        logging::log_wrapper_finalized(address, owns);
    }
}

#[cfg(test)]
mod tests;
