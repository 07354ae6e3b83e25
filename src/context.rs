//! Runtime context
//!
//! One `RuntimeContext` per scripting-runtime instance. It owns the catalog,
//! the native services, the identity cache and the repo table, and every
//! bridge entry point takes it by reference.

use crate::catalog::{Catalog, ConstantValue, Info, InfoRef, QualifiedName, ScalarKind, Transfer, TypeInfo};
use crate::compound::{self, BindingTable, IdentityCache, RepoType};
use crate::config::BridgeConfig;
use crate::dynamic::{Value, Values};
use crate::error::{BridgeError, Result};
use crate::interop::{Argument, CallDispatcher, NativeHost, NativePtr, Slot, SymbolResolver, SymbolTable};
use crate::invoke::Callable;
use crate::logging::{self, debug, Level};
use crate::marshal;
use smallvec::smallvec;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// State shared between the context and the wrappers it created
pub(crate) struct Shared {
    pub(crate) catalog: Box<dyn Catalog>,
    pub(crate) host: Box<dyn NativeHost>,
    pub(crate) dispatcher: Box<dyn CallDispatcher>,
    pub(crate) symbols: Box<dyn SymbolResolver>,
    pub(crate) config: BridgeConfig,
    pub(crate) cache: RefCell<IdentityCache>,
    pub(crate) bindings: RefCell<BindingTable>,
    pub(crate) repo: RefCell<HashMap<QualifiedName, Rc<RepoType>>>,
}

/// Handle to one bridge instance
#[derive(Clone)]
pub struct RuntimeContext {
    shared: Rc<Shared>,
}

pub struct RuntimeContextBuilder {
    catalog: Box<dyn Catalog>,
    host: Box<dyn NativeHost>,
    dispatcher: Box<dyn CallDispatcher>,
    symbols: Option<Box<dyn SymbolResolver>>,
    config: BridgeConfig,
}

impl RuntimeContextBuilder {
    /// Resolver for native symbols (defaults to an empty `SymbolTable`)
    pub fn symbols(mut self, symbols: impl SymbolResolver + 'static) -> Self {
        self.symbols = Some(Box::new(symbols));
        self
    }

    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> RuntimeContext {
        let capacity = self.config.marshal.cache_capacity;
        RuntimeContext {
            shared: Rc::new(Shared {
                catalog: self.catalog,
                host: self.host,
                dispatcher: self.dispatcher,
                symbols: self.symbols.unwrap_or_else(|| Box::new(SymbolTable::new())),
                config: self.config,
                cache: RefCell::new(IdentityCache::new(capacity)),
                bindings: RefCell::new(BindingTable::new()),
                repo: RefCell::new(HashMap::new()),
            }),
        }
    }
}

impl RuntimeContext {
    pub fn builder(
        catalog: impl Catalog + 'static,
        host: impl NativeHost + 'static,
        dispatcher: impl CallDispatcher + 'static,
    ) -> RuntimeContextBuilder {
        RuntimeContextBuilder {
            catalog: Box::new(catalog),
            host: Box::new(host),
            dispatcher: Box::new(dispatcher),
            symbols: None,
            config: BridgeConfig::default(),
        }
    }

    pub(crate) fn from_shared(shared: Rc<Shared>) -> Self {
        Self { shared }
    }

    #[inline]
    pub(crate) fn shared(&self) -> &Rc<Shared> {
        &self.shared
    }

    #[inline]
    pub fn catalog(&self) -> &dyn Catalog {
        &*self.shared.catalog
    }

    #[inline]
    pub fn host(&self) -> &dyn NativeHost {
        &*self.shared.host
    }

    #[inline]
    pub fn dispatcher(&self) -> &dyn CallDispatcher {
        &*self.shared.dispatcher
    }

    #[inline]
    pub fn symbols(&self) -> &dyn SymbolResolver {
        &*self.shared.symbols
    }

    #[inline]
    pub fn config(&self) -> &BridgeConfig {
        &self.shared.config
    }

    /// Catalog entry for a qualified name
    pub fn resolve(&self, name: &QualifiedName) -> Result<InfoRef> {
        self.catalog()
            .find_by_name(&name.namespace, &name.name)
            .ok_or_else(|| BridgeError::Unresolved(name.to_string()))
    }

    /// Look up `symbol` in `namespace`, optionally as a member of `container`
    ///
    /// Failure is reported as the value pair `[false, message]`.
    pub fn find(&self, namespace: &str, symbol: &str, container: Option<&str>) -> Values {
        let found = match container {
            None => self.catalog().find_by_name(namespace, symbol),
            Some(container) => self
                .catalog()
                .find_by_name(namespace, container)
                .and_then(|info| self.catalog().find_method(&info, symbol)),
        };

        match found {
            Some(info) => smallvec![Value::Info(info)],
            None => {
                let message = match container {
                    Some(container) => format!("unable to resolve {}.{}:{}", namespace, container, symbol),
                    None => format!("unable to resolve {}:{}", namespace, symbol),
                };
                debug!(namespace, symbol, "{}", message);
                smallvec![Value::Boolean(false), Value::string(message)]
            }
        }
    }

    /// Instantiate the info value at argument position 1
    pub fn get(&self, value: Option<&Value>) -> Result<Values> {
        match value {
            Some(Value::Info(info)) => self.instantiate(info),
            other => Err(BridgeError::argument(1, "info", marshal::got(other))),
        }
    }

    /// Dynamic counterpart of a catalog entry
    ///
    /// Functions become callables, structs fresh container-owned instances,
    /// constants their value. Other kinds produce nothing.
    pub fn instantiate(&self, info: &InfoRef) -> Result<Values> {
        match &**info {
            Info::Function(_) => Ok(smallvec![Value::Callable(Rc::new(Callable::new(self, Arc::clone(info))?))]),
            Info::Struct(_) => {
                let mut address: NativePtr = std::ptr::null_mut();
                // SAFETY: container transfer allocates fresh inline storage.
                let value = unsafe { compound::store(self, info, &mut address, Transfer::Container)? };
                Ok(smallvec![value])
            }
            Info::Constant(constant) => {
                let mut storage = Argument::zeroed();
                let slot = Slot::of(&mut storage);
                // SAFETY: the slot is written with the constant's declared width;
                // string payloads stay alive in the catalog entry.
                unsafe {
                    write_constant(&constant.ty, &constant.value, slot);
                    marshal::to_dynamic(self, &constant.ty, Transfer::None, slot)
                }
            }
            Info::Object(_) | Info::Interface(_) | Info::Enum(_) => Ok(Values::new()),
        }
    }

    /// Wrap a native instance (embedding glue)
    ///
    /// # Safety
    /// See [`compound::store`].
    pub unsafe fn compound_create(&self, info: &InfoRef, address: NativePtr, transfer: Transfer) -> Result<Value> {
        let mut address = address;
        compound::store(self, info, &mut address, transfer)
    }

    /// Address of a wrapper checked against `info` (embedding glue)
    pub fn compound_get(&self, value: Option<&Value>, position: usize, info: &Info, optional: bool) -> Result<NativePtr> {
        compound::load(self, value, position, info, optional)
    }

    /// Install a binding record, replacing any derived one
    pub fn register_type(&self, repo: RepoType) -> Rc<RepoType> {
        let repo = Rc::new(repo);
        self.shared.repo.borrow_mut().insert(repo.name.clone(), Rc::clone(&repo));
        repo
    }

    /// Binding record for a catalog entry, derived on first use
    pub fn repo_type(&self, info: &InfoRef) -> Result<Rc<RepoType>> {
        let name = info.qualified_name();
        if let Some(repo) = self.shared.repo.borrow().get(&name) {
            return Ok(Rc::clone(repo));
        }
        let repo = Rc::new(RepoType::from_info(info));
        self.shared.repo.borrow_mut().insert(name, Rc::clone(&repo));
        Ok(repo)
    }

    /// Binding record by name, from the repo table or the catalog
    pub fn lookup_repo_type(&self, name: &QualifiedName) -> Result<Rc<RepoType>> {
        if let Some(repo) = self.shared.repo.borrow().get(name) {
            return Ok(Rc::clone(repo));
        }
        let info = self
            .resolve(name)
            .map_err(|_| BridgeError::NotInRepo(name.to_string()))?;
        self.repo_type(&info)
    }

    /// Number of live wrappers in the identity cache
    pub fn cached_wrappers(&self) -> usize {
        self.shared.cache.borrow().len()
    }

    /// Number of occupied binding-table slots
    pub fn live_bindings(&self) -> usize {
        self.shared.bindings.borrow().live()
    }

    /// Route a message from the scripting side into the log
    pub fn log(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => logging::error!(target: "dynabind::script", "{}", message),
            Level::WARN => logging::warn!(target: "dynabind::script", "{}", message),
            Level::INFO => logging::info!(target: "dynabind::script", "{}", message),
            Level::DEBUG => logging::debug!(target: "dynabind::script", "{}", message),
            _ => logging::trace!(target: "dynabind::script", "{}", message),
        }
    }
}

/// Store a constant's literal into a native slot
///
/// # Safety
/// `slot` must point to a full `Argument`.
unsafe fn write_constant(ty: &TypeInfo, value: &ConstantValue, slot: Slot) {
    match value {
        ConstantValue::Boolean(b) => slot.write(*b as i32),
        ConstantValue::Integer(i) => match ty {
            TypeInfo::Scalar(kind) => match kind.size() {
                1 => slot.write(*i as i8),
                2 => slot.write(*i as i16),
                4 => slot.write(*i as i32),
                _ => slot.write(*i),
            },
            _ => slot.write(*i),
        },
        ConstantValue::Double(d) => match ty {
            TypeInfo::Scalar(ScalarKind::Float) => slot.write(*d as f32),
            _ => slot.write(*d),
        },
        ConstantValue::String(s) => slot.write(s.as_ptr() as *mut c_void),
    }
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("cached_wrappers", &self.cached_wrappers())
            .field("live_bindings", &self.live_bindings())
            .field("repo_types", &self.shared.repo.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ConstantInfo, FunctionInfo, MemoryCatalog, StructInfo};
    use crate::test_support::{FakeHost, ScriptedDispatcher};

    fn context() -> RuntimeContext {
        let catalog = MemoryCatalog::builder("Demo")
            .structure(
                StructInfo::new("Demo", "Point", 8).method(FunctionInfo::new("Demo", "norm", "demo_point_norm").method_of("Point")),
            )
            .constant(ConstantInfo::new(
                "Demo",
                "ANSWER",
                TypeInfo::Scalar(ScalarKind::Int32),
                ConstantValue::Integer(42),
            ))
            .constant(ConstantInfo::new(
                "Demo",
                "GREETING",
                TypeInfo::Scalar(ScalarKind::Utf8),
                ConstantValue::String(std::ffi::CString::new("hello").unwrap()),
            ))
            .build();
        RuntimeContext::builder(catalog, FakeHost::new(), ScriptedDispatcher::new()).build()
    }

    #[test]
    fn test_find_failure_is_a_value() {
        let ctx = context();
        let result = ctx.find("Demo", "missing", None);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0], Value::Boolean(false));
        assert_eq!(result[1], Value::from("unable to resolve Demo:missing"));

        let result = ctx.find("Demo", "area", Some("Point"));
        assert_eq!(result[1], Value::from("unable to resolve Demo.Point:area"));
    }

    #[test]
    fn test_find_method_in_container() {
        let ctx = context();
        let result = ctx.find("Demo", "norm", Some("Point"));
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].as_info().unwrap().to_string(), "function Demo.Point.norm");
    }

    #[test]
    fn test_get_requires_info() {
        let ctx = context();
        let err = ctx.get(Some(&Value::from(3))).unwrap_err();
        assert!(err.is_argument_error());
        assert!(ctx.get(None).is_err());
    }

    #[test]
    fn test_instantiate_constants() {
        let ctx = context();
        let answer = ctx.find("Demo", "ANSWER", None);
        assert_eq!(ctx.get(answer.first()).unwrap().as_slice(), &[Value::Integer(42)]);

        let greeting = ctx.find("Demo", "GREETING", None);
        assert_eq!(ctx.get(greeting.first()).unwrap().as_slice(), &[Value::from("hello")]);
    }

    #[test]
    fn test_instantiate_struct_is_inline() {
        let ctx = context();
        let point = ctx.find("Demo", "Point", None);
        let values = ctx.get(point.first()).unwrap();
        let compound = values[0].as_compound().unwrap();
        assert!(compound.is_inline());
        assert!(!compound.owns());
        assert_eq!(ctx.cached_wrappers(), 1);
        assert_eq!(ctx.live_bindings(), 1);

        drop(values);
        assert_eq!(ctx.cached_wrappers(), 0);
        assert_eq!(ctx.live_bindings(), 0);
    }

    #[test]
    fn test_unresolved_repo_type() {
        let ctx = context();
        let err = ctx.lookup_repo_type(&QualifiedName::new("Demo", "Nope")).unwrap_err();
        assert!(matches!(err, BridgeError::NotInRepo(_)));
    }
}
