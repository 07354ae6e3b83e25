//! In-memory catalog
//!
//! Entries registered up front by the embedder; lookups are map hits.

use super::{Catalog, ConstantInfo, EnumInfo, FunctionInfo, Info, InfoRef, InterfaceInfo, ObjectInfo, QualifiedName, StructInfo};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default, Clone)]
pub struct MemoryCatalog {
    entries: HashMap<QualifiedName, InfoRef>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder(namespace: impl Into<String>) -> MemoryCatalogBuilder {
        MemoryCatalogBuilder {
            namespace: namespace.into(),
            catalog: Self::new(),
        }
    }

    /// Register an entry under its qualified name, replacing any previous one
    pub fn insert(&mut self, info: Info) -> InfoRef {
        let info = Arc::new(info);
        self.entries.insert(info.qualified_name(), Arc::clone(&info));
        info
    }

    pub fn get(&self, name: &QualifiedName) -> Option<&InfoRef> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &QualifiedName> {
        self.entries.keys()
    }
}

impl Catalog for MemoryCatalog {
    fn find_by_name(&self, namespace: &str, name: &str) -> Option<InfoRef> {
        let key = QualifiedName::new(namespace, name);
        self.entries.get(&key).cloned()
    }
}

/// Fluent registration for a single namespace
#[derive(Debug)]
pub struct MemoryCatalogBuilder {
    namespace: String,
    catalog: MemoryCatalog,
}

impl MemoryCatalogBuilder {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn function(mut self, info: FunctionInfo) -> Self {
        self.catalog.insert(Info::Function(info));
        self
    }

    pub fn structure(mut self, info: StructInfo) -> Self {
        self.catalog.insert(Info::Struct(info));
        self
    }

    pub fn object(mut self, info: ObjectInfo) -> Self {
        self.catalog.insert(Info::Object(info));
        self
    }

    pub fn interface(mut self, info: InterfaceInfo) -> Self {
        self.catalog.insert(Info::Interface(info));
        self
    }

    pub fn enumeration(mut self, info: EnumInfo) -> Self {
        self.catalog.insert(Info::Enum(info));
        self
    }

    pub fn constant(mut self, info: ConstantInfo) -> Self {
        self.catalog.insert(Info::Constant(info));
        self
    }

    pub fn build(self) -> MemoryCatalog {
        self.catalog
    }
}
