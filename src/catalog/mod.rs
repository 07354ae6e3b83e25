//! Introspection catalog model
//!
//! Immutable descriptions of native types and functions. The bridge only
//! reads them; where they come from is the [`Catalog`] implementation's
//! business.

mod memory;

pub use memory::{MemoryCatalog, MemoryCatalogBuilder};

use crate::interop::{MachineType, RuntimeType};
use std::ffi::CString;
use std::fmt;
use std::sync::Arc;

/// Shared handle to one catalog entry
pub type InfoRef = Arc<Info>;

/// Answers "what is the shape of this name"
pub trait Catalog {
    fn find_by_name(&self, namespace: &str, name: &str) -> Option<InfoRef>;

    /// Method lookup on a struct, object or interface
    fn find_method(&self, container: &Info, name: &str) -> Option<InfoRef> {
        container
            .methods()
            .iter()
            .find(|m| m.name() == name)
            .cloned()
    }
}

/// `namespace.name` of a catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    pub namespace: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

/// Primitive native types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// C `int` used as a truth value
    Boolean,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    /// Runtime type id (`usize`)
    GType,
    /// NUL-terminated UTF-8 `char*`
    Utf8,
    /// NUL-terminated file name `char*`
    Filename,
}

impl ScalarKind {
    #[inline]
    pub const fn machine_type(self) -> MachineType {
        match self {
            Self::Boolean | Self::Int32 => MachineType::I32,
            Self::Int8 => MachineType::I8,
            Self::UInt8 => MachineType::U8,
            Self::Int16 => MachineType::I16,
            Self::UInt16 => MachineType::U16,
            Self::UInt32 => MachineType::U32,
            Self::Int64 => MachineType::I64,
            Self::UInt64 => MachineType::U64,
            Self::Float => MachineType::F32,
            Self::Double => MachineType::F64,
            Self::GType | Self::Utf8 | Self::Filename => MachineType::Pointer,
        }
    }

    /// Native size in bytes
    #[inline]
    pub const fn size(self) -> usize {
        self.machine_type().size()
    }

    #[inline]
    pub const fn is_string(self) -> bool {
        matches!(self, Self::Utf8 | Self::Filename)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float => "float",
            Self::Double => "double",
            Self::GType => "gtype",
            Self::Utf8 => "utf8",
            Self::Filename => "filename",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayKind {
    /// Plain C array
    C,
    /// Reference-counted array with a length header (`NativeArray`)
    Growable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayType {
    pub kind: ArrayKind,
    pub element: TypeInfo,
    pub fixed_size: Option<usize>,
    pub zero_terminated: bool,
    /// Index of the argument carrying the element count
    pub length_arg: Option<usize>,
}

/// Type descriptor
#[derive(Debug, Clone, PartialEq)]
pub enum TypeInfo {
    Void,
    Scalar(ScalarKind),
    Array(Box<ArrayType>),
    /// Named struct, object, interface, enum or flags
    Interface(QualifiedName),
    /// A descriptor this bridge does not know how to marshal
    Unsupported(String),
}

impl TypeInfo {
    pub fn interface(namespace: &str, name: &str) -> Self {
        Self::Interface(QualifiedName::new(namespace, name))
    }

    pub fn c_array(element: TypeInfo) -> ArrayBuilder {
        ArrayBuilder::new(ArrayKind::C, element)
    }

    pub fn growable_array(element: TypeInfo) -> Self {
        ArrayBuilder::new(ArrayKind::Growable, element).build()
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Void => "void".to_string(),
            Self::Scalar(kind) => kind.name().to_string(),
            Self::Array(array) => format!("array of {}", array.element.describe()),
            Self::Interface(name) => name.to_string(),
            Self::Unsupported(tag) => format!("unsupported type `{}'", tag),
        }
    }
}

/// Builder for C array descriptors
#[derive(Debug, Clone)]
pub struct ArrayBuilder {
    array: ArrayType,
}

impl ArrayBuilder {
    fn new(kind: ArrayKind, element: TypeInfo) -> Self {
        Self {
            array: ArrayType {
                kind,
                element,
                fixed_size: None,
                zero_terminated: false,
                length_arg: None,
            },
        }
    }

    pub fn fixed(mut self, size: usize) -> Self {
        self.array.fixed_size = Some(size);
        self
    }

    pub fn zero_terminated(mut self) -> Self {
        self.array.zero_terminated = true;
        self
    }

    pub fn length_arg(mut self, index: usize) -> Self {
        self.array.length_arg = Some(index);
        self
    }

    pub fn build(self) -> TypeInfo {
        TypeInfo::Array(Box::new(self.array))
    }
}

/// Ownership-transfer mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transfer {
    /// Receiver must not free
    None,
    /// Receiver becomes the sole owner
    Everything,
    /// Only the outer container changes hands
    Container,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
    InOut,
}

impl Direction {
    #[inline]
    pub fn is_input(self) -> bool {
        matches!(self, Self::In | Self::InOut)
    }

    #[inline]
    pub fn is_output(self) -> bool {
        matches!(self, Self::Out | Self::InOut)
    }
}

/// Category of a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfoType {
    Function,
    Struct,
    Object,
    Interface,
    Enum,
    Flags,
    Constant,
}

impl fmt::Display for InfoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Function => "function",
            Self::Struct => "struct",
            Self::Object => "object",
            Self::Interface => "interface",
            Self::Enum => "enum",
            Self::Flags => "flags",
            Self::Constant => "constant",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArgInfo {
    pub name: String,
    pub direction: Direction,
    pub ty: TypeInfo,
    pub transfer: Transfer,
    pub may_be_null: bool,
    pub optional: bool,
    pub caller_allocates: bool,
}

impl ArgInfo {
    pub fn new(name: impl Into<String>, direction: Direction, ty: TypeInfo) -> Self {
        Self {
            name: name.into(),
            direction,
            ty,
            transfer: Transfer::None,
            may_be_null: false,
            optional: false,
            caller_allocates: false,
        }
    }

    pub fn input(name: impl Into<String>, ty: TypeInfo) -> Self {
        Self::new(name, Direction::In, ty)
    }

    pub fn output(name: impl Into<String>, ty: TypeInfo) -> Self {
        Self::new(name, Direction::Out, ty)
    }

    pub fn transfer(mut self, transfer: Transfer) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.may_be_null = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn caller_allocates(mut self) -> Self {
        self.caller_allocates = true;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionFlags {
    pub is_method: bool,
    pub is_constructor: bool,
    pub throws: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInfo {
    pub namespace: String,
    pub name: String,
    /// Struct/object/interface the function belongs to
    pub container: Option<String>,
    pub symbol: String,
    pub flags: FunctionFlags,
    pub args: Vec<ArgInfo>,
    pub return_type: TypeInfo,
    pub caller_owns: Transfer,
}

impl FunctionInfo {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            container: None,
            symbol: symbol.into(),
            flags: FunctionFlags::default(),
            args: Vec::new(),
            return_type: TypeInfo::Void,
            caller_owns: Transfer::None,
        }
    }

    pub fn method_of(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self.flags.is_method = true;
        self
    }

    pub fn constructor_of(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self.flags.is_method = true;
        self.flags.is_constructor = true;
        self
    }

    pub fn throws(mut self) -> Self {
        self.flags.throws = true;
        self
    }

    pub fn arg(mut self, arg: ArgInfo) -> Self {
        self.args.push(arg);
        self
    }

    pub fn returns(mut self, ty: TypeInfo, caller_owns: Transfer) -> Self {
        self.return_type = ty;
        self.caller_owns = caller_owns;
        self
    }

    pub fn container_name(&self) -> Option<QualifiedName> {
        self.container
            .as_ref()
            .map(|c| QualifiedName::new(self.namespace.clone(), c.clone()))
    }

    /// Receiver is prepended for methods that are not constructors
    #[inline]
    pub fn has_receiver(&self) -> bool {
        self.flags.is_method && !self.flags.is_constructor
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    pub offset: usize,
    pub ty: TypeInfo,
    pub readable: bool,
    pub writable: bool,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, offset: usize, ty: TypeInfo) -> Self {
        Self {
            name: name.into(),
            offset,
            ty,
            readable: true,
            writable: true,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.readable = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyInfo {
    pub name: String,
    pub ty: TypeInfo,
    pub readable: bool,
    pub writable: bool,
}

impl PropertyInfo {
    pub fn new(name: impl Into<String>, ty: TypeInfo) -> Self {
        Self {
            name: name.into(),
            ty,
            readable: true,
            writable: true,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.readable = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructInfo {
    pub namespace: String,
    pub name: String,
    pub size: usize,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<InfoRef>,
    pub runtime_type: Option<RuntimeType>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub namespace: String,
    pub name: String,
    pub parent: Option<QualifiedName>,
    pub runtime_type: Option<RuntimeType>,
    pub fields: Vec<FieldInfo>,
    pub properties: Vec<PropertyInfo>,
    pub methods: Vec<InfoRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceInfo {
    pub namespace: String,
    pub name: String,
    pub runtime_type: Option<RuntimeType>,
    pub properties: Vec<PropertyInfo>,
    pub methods: Vec<InfoRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumInfo {
    pub namespace: String,
    pub name: String,
    pub is_flags: bool,
    /// Integer type the values are stored as
    pub storage: ScalarKind,
    pub runtime_type: Option<RuntimeType>,
    pub values: Vec<(String, i64)>,
}

/// Literal value of a constant
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(CString),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantInfo {
    pub namespace: String,
    pub name: String,
    pub ty: TypeInfo,
    pub value: ConstantValue,
}

impl StructInfo {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, size: usize) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            size,
            fields: Vec::new(),
            methods: Vec::new(),
            runtime_type: None,
        }
    }

    pub fn field(mut self, field: FieldInfo) -> Self {
        self.fields.push(field);
        self
    }

    /// Attach a method; its container is set to this struct
    pub fn method(mut self, method: FunctionInfo) -> Self {
        let method = attach(method, &self.name);
        self.methods.push(Arc::new(Info::Function(method)));
        self
    }

    pub fn runtime_type(mut self, ty: RuntimeType) -> Self {
        self.runtime_type = Some(ty);
        self
    }
}

impl ObjectInfo {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, runtime_type: RuntimeType) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            parent: None,
            runtime_type: Some(runtime_type),
            fields: Vec::new(),
            properties: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn parent(mut self, parent: QualifiedName) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn field(mut self, field: FieldInfo) -> Self {
        self.fields.push(field);
        self
    }

    pub fn property(mut self, property: PropertyInfo) -> Self {
        self.properties.push(property);
        self
    }

    /// Attach a method; its container is set to this object
    pub fn method(mut self, method: FunctionInfo) -> Self {
        let method = attach(method, &self.name);
        self.methods.push(Arc::new(Info::Function(method)));
        self
    }
}

impl InterfaceInfo {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, runtime_type: RuntimeType) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            runtime_type: Some(runtime_type),
            properties: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn property(mut self, property: PropertyInfo) -> Self {
        self.properties.push(property);
        self
    }

    pub fn method(mut self, method: FunctionInfo) -> Self {
        let method = attach(method, &self.name);
        self.methods.push(Arc::new(Info::Function(method)));
        self
    }
}

impl EnumInfo {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, storage: ScalarKind) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            is_flags: false,
            storage,
            runtime_type: None,
            values: Vec::new(),
        }
    }

    pub fn flags(mut self) -> Self {
        self.is_flags = true;
        self
    }

    pub fn runtime_type(mut self, ty: RuntimeType) -> Self {
        self.runtime_type = Some(ty);
        self
    }

    pub fn value(mut self, name: impl Into<String>, value: i64) -> Self {
        self.values.push((name.into(), value));
        self
    }
}

impl ConstantInfo {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, ty: TypeInfo, value: ConstantValue) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ty,
            value,
        }
    }
}

fn attach(mut method: FunctionInfo, container: &str) -> FunctionInfo {
    method.container = Some(container.to_string());
    method
}

/// One catalog entry
#[derive(Debug, Clone, PartialEq)]
pub enum Info {
    Function(FunctionInfo),
    Struct(StructInfo),
    Object(ObjectInfo),
    Interface(InterfaceInfo),
    Enum(EnumInfo),
    Constant(ConstantInfo),
}

impl Info {
    pub fn namespace(&self) -> &str {
        match self {
            Self::Function(i) => &i.namespace,
            Self::Struct(i) => &i.namespace,
            Self::Object(i) => &i.namespace,
            Self::Interface(i) => &i.namespace,
            Self::Enum(i) => &i.namespace,
            Self::Constant(i) => &i.namespace,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Function(i) => &i.name,
            Self::Struct(i) => &i.name,
            Self::Object(i) => &i.name,
            Self::Interface(i) => &i.name,
            Self::Enum(i) => &i.name,
            Self::Constant(i) => &i.name,
        }
    }

    pub fn qualified_name(&self) -> QualifiedName {
        QualifiedName::new(self.namespace(), self.name())
    }

    pub fn info_type(&self) -> InfoType {
        match self {
            Self::Function(_) => InfoType::Function,
            Self::Struct(_) => InfoType::Struct,
            Self::Object(_) => InfoType::Object,
            Self::Interface(_) => InfoType::Interface,
            Self::Enum(e) if e.is_flags => InfoType::Flags,
            Self::Enum(_) => InfoType::Enum,
            Self::Constant(_) => InfoType::Constant,
        }
    }

    pub fn runtime_type(&self) -> Option<RuntimeType> {
        match self {
            Self::Struct(i) => i.runtime_type,
            Self::Object(i) => i.runtime_type,
            Self::Interface(i) => i.runtime_type,
            Self::Enum(i) => i.runtime_type,
            Self::Function(_) | Self::Constant(_) => None,
        }
    }

    pub fn methods(&self) -> &[InfoRef] {
        match self {
            Self::Struct(i) => &i.methods,
            Self::Object(i) => &i.methods,
            Self::Interface(i) => &i.methods,
            Self::Function(_) | Self::Enum(_) | Self::Constant(_) => &[],
        }
    }

    pub fn as_function(&self) -> Option<&FunctionInfo> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }
}

impl fmt::Display for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(func) => match &func.container {
                Some(container) => write!(f, "function {}.{}.{}", func.namespace, container, func.name),
                None => write!(f, "function {}.{}", func.namespace, func.name),
            },
            other => write!(f, "{} {}", other.info_type(), other.qualified_name()),
        }
    }
}

#[cfg(test)]
mod tests;
