//! Repo types: per-type binding records
//!
//! A repo type is what a wrapper's binding slot anchors. It names the native
//! type, lists the elements reachable through `get`/`set`, and carries the
//! optional extension hooks embedders install.

use super::Compound;
use crate::catalog::{FieldInfo, Info, InfoRef, InfoType, PropertyInfo, QualifiedName};
use crate::context::RuntimeContext;
use crate::dynamic::Value;
use crate::error::Result;
use crate::interop::{NativePtr, RuntimeType};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

pub type AcquireHook = Rc<dyn Fn(&RuntimeContext, NativePtr) -> Result<()>>;
pub type DisposeHook = Rc<dyn Fn(&RuntimeContext, NativePtr)>;
pub type IndexHook = Rc<dyn Fn(&RuntimeContext, &Compound, &str) -> Result<Value>>;
pub type NewIndexHook = Rc<dyn Fn(&RuntimeContext, &Compound, &str, &Value) -> Result<()>>;

/// Something reachable by name on a compound
#[derive(Clone)]
pub enum Element {
    Field(FieldInfo),
    Property(PropertyInfo),
    /// Not yet materialised into a callable
    Method(InfoRef),
    Value(Value),
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(field) => write!(f, "Field({})", field.name),
            Self::Property(prop) => write!(f, "Property({})", prop.name),
            Self::Method(info) => write!(f, "Method({})", info),
            Self::Value(value) => write!(f, "Value({:?})", value),
        }
    }
}

#[derive(Clone, Default)]
pub struct Hooks {
    pub acquire: Option<AcquireHook>,
    pub dispose: Option<DisposeHook>,
    pub index: Option<IndexHook>,
    pub newindex: Option<NewIndexHook>,
}

pub struct RepoType {
    pub name: QualifiedName,
    pub kind: InfoType,
    pub runtime_type: Option<RuntimeType>,
    /// Native byte size (structs)
    pub size: usize,
    pub parent: Option<QualifiedName>,
    pub info: Option<InfoRef>,
    pub(crate) elements: RefCell<HashMap<String, Element>>,
    pub hooks: Hooks,
}

impl RepoType {
    pub fn new(name: QualifiedName, kind: InfoType) -> Self {
        Self {
            name,
            kind,
            runtime_type: None,
            size: 0,
            parent: None,
            info: None,
            elements: RefCell::new(HashMap::new()),
            hooks: Hooks::default(),
        }
    }

    /// Binding record derived from a catalog entry
    pub fn from_info(info: &InfoRef) -> Self {
        let mut repo = Self::new(info.qualified_name(), info.info_type());
        repo.runtime_type = info.runtime_type();
        repo.info = Some(Arc::clone(info));

        let mut elements = HashMap::new();
        let (fields, properties): (&[FieldInfo], &[PropertyInfo]) = match &**info {
            Info::Struct(s) => {
                repo.size = s.size;
                (s.fields.as_slice(), &[][..])
            }
            Info::Object(o) => {
                repo.parent = o.parent.clone();
                (o.fields.as_slice(), o.properties.as_slice())
            }
            Info::Interface(i) => (&[][..], i.properties.as_slice()),
            Info::Enum(e) => {
                repo.size = e.storage.size();
                for (name, value) in &e.values {
                    elements.insert(name.clone(), Element::Value(Value::Integer(*value)));
                }
                (&[][..], &[][..])
            }
            Info::Function(_) | Info::Constant(_) => (&[][..], &[][..]),
        };
        for field in fields {
            elements.insert(field.name.clone(), Element::Field(field.clone()));
        }
        for prop in properties {
            elements.insert(prop.name.clone(), Element::Property(prop.clone()));
        }
        for method in info.methods() {
            elements.insert(method.name().to_string(), Element::Method(method.clone()));
        }
        repo.elements = RefCell::new(elements);
        repo
    }

    pub fn with_runtime_type(mut self, ty: RuntimeType) -> Self {
        self.runtime_type = Some(ty);
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_parent(mut self, parent: QualifiedName) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_field(self, field: FieldInfo) -> Self {
        self.with_element(field.name.clone(), Element::Field(field))
    }

    pub fn with_property(self, prop: PropertyInfo) -> Self {
        self.with_element(prop.name.clone(), Element::Property(prop))
    }

    pub fn with_method(self, method: InfoRef) -> Self {
        self.with_element(method.name().to_string(), Element::Method(method))
    }

    pub fn with_value(self, name: impl Into<String>, value: Value) -> Self {
        self.with_element(name.into(), Element::Value(value))
    }

    fn with_element(self, name: String, element: Element) -> Self {
        self.elements.borrow_mut().insert(name, element);
        self
    }

    pub fn on_acquire(mut self, hook: impl Fn(&RuntimeContext, NativePtr) -> Result<()> + 'static) -> Self {
        self.hooks.acquire = Some(Rc::new(hook));
        self
    }

    pub fn on_dispose(mut self, hook: impl Fn(&RuntimeContext, NativePtr) + 'static) -> Self {
        self.hooks.dispose = Some(Rc::new(hook));
        self
    }

    pub fn on_index(mut self, hook: impl Fn(&RuntimeContext, &Compound, &str) -> Result<Value> + 'static) -> Self {
        self.hooks.index = Some(Rc::new(hook));
        self
    }

    pub fn on_newindex(
        mut self,
        hook: impl Fn(&RuntimeContext, &Compound, &str, &Value) -> Result<()> + 'static,
    ) -> Self {
        self.hooks.newindex = Some(Rc::new(hook));
        self
    }

    pub fn element(&self, name: &str) -> Option<Element> {
        self.elements.borrow().get(name).cloned()
    }

    pub(crate) fn cache_element(&self, name: &str, element: Element) {
        self.elements.borrow_mut().insert(name.to_string(), element);
    }
}

impl fmt::Debug for RepoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepoType")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("runtime_type", &self.runtime_type)
            .field("size", &self.size)
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}
