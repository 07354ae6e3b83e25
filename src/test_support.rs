//! Simulated native world
//!
//! A counting [`NativeHost`], a [`CallDispatcher`] that runs Rust closures in
//! place of native functions, and a small fixture catalog. Used by the unit
//! tests, the integration tests and the benchmarks. Embedders enable the
//! `test-support` feature to test their own bindings without a native
//! runtime.

use crate::catalog::{
    ArgInfo, ConstantInfo, ConstantValue, Direction, EnumInfo, FieldInfo, FunctionInfo, MemoryCatalog, ObjectInfo,
    PropertyInfo, QualifiedName, ScalarKind, StructInfo, Transfer, TypeInfo,
};
use crate::error::{AccessReason, BridgeError, Result};
use crate::interop::{
    Argument, CallDispatcher, CallError, FunctionCall, NativeArray, NativeError, NativeHost, NativePtr, RuntimeType,
    SymbolTable,
};
use crate::marshal::{GenericData, GenericValue};
use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::rc::Rc;

pub const WIDGET_TYPE: RuntimeType = RuntimeType(100);
pub const BUTTON_TYPE: RuntimeType = RuntimeType(101);
pub const LABEL_TYPE: RuntimeType = RuntimeType(102);
pub const MODE_TYPE: RuntimeType = RuntimeType(200);

#[derive(Default)]
struct HostState {
    refs: HashMap<usize, i64>,
    instance_types: HashMap<usize, RuntimeType>,
    parents: HashMap<RuntimeType, RuntimeType>,
    names: HashMap<RuntimeType, String>,
    objects: Vec<Box<[u64; 4]>>,
    properties: HashMap<(usize, String), GenericData>,
    freed: Vec<usize>,
    array_unrefs: Vec<usize>,
    errors_freed: usize,
}

/// Native host keeping reference counts and release logs in memory
///
/// Clones share state, so a test can keep one handle after moving another
/// into a context.
#[derive(Clone, Default)]
pub struct FakeHost {
    state: Rc<RefCell<HostState>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host with the fixture object hierarchy registered
    pub fn with_demo_types() -> Self {
        let host = Self::new();
        host.define_type(WIDGET_TYPE, "DemoWidget", None);
        host.define_type(BUTTON_TYPE, "DemoButton", Some(WIDGET_TYPE));
        host.define_type(LABEL_TYPE, "DemoLabel", Some(WIDGET_TYPE));
        host.define_type(MODE_TYPE, "DemoMode", None);
        host
    }

    pub fn define_type(&self, ty: RuntimeType, name: &str, parent: Option<RuntimeType>) {
        let mut state = self.state.borrow_mut();
        state.names.insert(ty, name.to_string());
        if let Some(parent) = parent {
            state.parents.insert(ty, parent);
        }
    }

    /// Fresh object instance holding one reference
    pub fn new_object(&self, ty: RuntimeType) -> NativePtr {
        let mut state = self.state.borrow_mut();
        let mut memory = Box::new([0u64; 4]);
        let ptr = memory.as_mut_ptr() as NativePtr;
        state.objects.push(memory);
        state.refs.insert(ptr as usize, 1);
        state.instance_types.insert(ptr as usize, ty);
        ptr
    }

    pub fn ref_count(&self, object: NativePtr) -> i64 {
        self.state.borrow().refs.get(&(object as usize)).copied().unwrap_or(0)
    }

    pub fn was_freed(&self, ptr: *const u8) -> bool {
        self.state.borrow().freed.contains(&(ptr as usize))
    }

    pub fn freed_count(&self) -> usize {
        self.state.borrow().freed.len()
    }

    pub fn array_unrefs(&self) -> usize {
        self.state.borrow().array_unrefs.len()
    }

    pub fn errors_freed(&self) -> usize {
        self.state.borrow().errors_freed
    }

    /// Preset a property value; object payloads take a reference
    pub fn set_property_value(&self, object: NativePtr, name: &str, data: GenericData) {
        if let GenericData::Object(ptr) = &data {
            self.add_ref(*ptr, 1);
        }
        let previous = self
            .state
            .borrow_mut()
            .properties
            .insert((object as usize, name.to_string()), data);
        if let Some(GenericData::Object(ptr)) = previous {
            self.add_ref(ptr, -1);
        }
    }

    pub fn property_value(&self, object: NativePtr, name: &str) -> Option<GenericData> {
        self.state
            .borrow()
            .properties
            .get(&(object as usize, name.to_string()))
            .cloned()
    }

    fn add_ref(&self, object: NativePtr, delta: i64) {
        if !object.is_null() {
            *self.state.borrow_mut().refs.entry(object as usize).or_insert(0) += delta;
        }
    }
}

impl NativeHost for FakeHost {
    unsafe fn object_ref(&self, object: NativePtr) {
        self.add_ref(object, 1);
    }

    unsafe fn object_unref(&self, object: NativePtr) {
        self.add_ref(object, -1);
    }

    unsafe fn instance_type(&self, object: NativePtr) -> RuntimeType {
        self.state
            .borrow()
            .instance_types
            .get(&(object as usize))
            .copied()
            .unwrap_or(RuntimeType::INVALID)
    }

    fn type_is_a(&self, ty: RuntimeType, ancestor: RuntimeType) -> bool {
        let state = self.state.borrow();
        let mut current = Some(ty);
        while let Some(ty) = current {
            if ty == ancestor {
                return true;
            }
            current = state.parents.get(&ty).copied();
        }
        false
    }

    fn type_name(&self, ty: RuntimeType) -> Option<String> {
        self.state.borrow().names.get(&ty).cloned()
    }

    unsafe fn free(&self, ptr: NativePtr) {
        self.state.borrow_mut().freed.push(ptr as usize);
    }

    unsafe fn array_unref(&self, array: *mut NativeArray) {
        self.state.borrow_mut().array_unrefs.push(array as usize);
    }

    fn strdup(&self, s: &CStr) -> *mut c_char {
        s.to_owned().into_raw()
    }

    unsafe fn get_property(&self, object: NativePtr, name: &str, value: &mut GenericValue) -> Result<()> {
        let data = self
            .property_value(object, name)
            .ok_or_else(|| BridgeError::access("FakeHost", name, AccessReason::Missing))?;
        if let GenericData::Object(ptr) = &data {
            self.add_ref(*ptr, 1);
        }
        value.set(data);
        Ok(())
    }

    unsafe fn set_property(&self, object: NativePtr, name: &str, value: &GenericValue) -> Result<()> {
        self.set_property_value(object, name, value.data().clone());
        Ok(())
    }

    unsafe fn error_free(&self, error: *mut NativeError) {
        self.state.borrow_mut().errors_freed += 1;
        let error = Box::from_raw(error);
        if !error.message.is_null() {
            drop(CString::from_raw(error.message));
        }
    }
}

/// Error record as a throwing native function would produce it
pub fn native_error(code: i32, message: &str) -> *mut NativeError {
    let message = CString::new(message).unwrap_or_default();
    Box::into_raw(Box::new(NativeError {
        domain: 1,
        code,
        message: message.into_raw(),
    }))
}

/// Stand-in for one native function
pub type Script = Rc<dyn Fn(&[Argument]) -> Argument>;

#[derive(Default)]
struct DispatchState {
    scripts: Vec<(String, Script)>,
    calls: Vec<String>,
}

/// Dispatcher running closures at fake function addresses
#[derive(Clone, Default)]
pub struct ScriptedDispatcher {
    state: Rc<RefCell<DispatchState>>,
}

impl ScriptedDispatcher {
    const STRIDE: usize = 16;

    pub fn new() -> Self {
        Self::default()
    }

    /// Register `script` under `symbol`, returning its fake address
    pub fn define(&self, symbol: &str, script: impl Fn(&[Argument]) -> Argument + 'static) -> *const () {
        let mut state = self.state.borrow_mut();
        state.scripts.push((symbol.to_string(), Rc::new(script)));
        (state.scripts.len() * Self::STRIDE) as *const ()
    }

    /// Symbol table resolving every defined script
    pub fn symbols(&self) -> SymbolTable {
        let state = self.state.borrow();
        state
            .scripts
            .iter()
            .enumerate()
            .fold(SymbolTable::new(), |table, (index, (symbol, _))| {
                table.with_symbol(symbol.clone(), ((index + 1) * Self::STRIDE) as *const ())
            })
    }

    /// Symbols called so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }
}

impl CallDispatcher for ScriptedDispatcher {
    unsafe fn dispatch(&self, call: &FunctionCall, args: &[Argument]) -> std::result::Result<Argument, CallError> {
        let address = call.ptr() as usize;
        let index = address / Self::STRIDE;
        let (symbol, script) = {
            let state = self.state.borrow();
            match state.scripts.get(index.wrapping_sub(1)) {
                Some((symbol, script)) if address % Self::STRIDE == 0 => (symbol.clone(), Rc::clone(script)),
                _ => return Err(CallError::UnknownFunction(address)),
            }
        };
        self.state.borrow_mut().calls.push(symbol);
        Ok(script(args))
    }
}

/// Fixture namespace `Demo`
///
/// - `Point { x: i32 @0, y: i32 @4, tag: utf8 @8, id: u32 @16 (read-only) }`
/// - `Widget` object with `label`, `width`, `buddy` and `mode` properties,
///   `Button` and `Label` deriving from it
/// - `Mode` enum, functions exercising outputs, arrays and errors
pub fn demo_catalog() -> MemoryCatalog {
    let int32 = || TypeInfo::Scalar(ScalarKind::Int32);
    let utf8 = || TypeInfo::Scalar(ScalarKind::Utf8);
    let widget = || TypeInfo::interface("Demo", "Widget");

    MemoryCatalog::builder("Demo")
        .structure(
            StructInfo::new("Demo", "Point", 24)
                .field(FieldInfo::new("x", 0, int32()))
                .field(FieldInfo::new("y", 4, int32()))
                .field(FieldInfo::new("tag", 8, utf8()))
                .field(FieldInfo::new("id", 16, TypeInfo::Scalar(ScalarKind::UInt32)).read_only())
                .method(
                    FunctionInfo::new("Demo", "norm", "demo_point_norm")
                        .method_of("Point")
                        .returns(int32(), Transfer::None),
                ),
        )
        .structure(StructInfo::new("Demo", "Buffer", 16))
        .object(
            ObjectInfo::new("Demo", "Widget", WIDGET_TYPE)
                .property(PropertyInfo::new("label", utf8()))
                .property(PropertyInfo::new("width", int32()))
                .property(PropertyInfo::new("buddy", widget()))
                .property(PropertyInfo::new("mode", TypeInfo::interface("Demo", "Mode")))
                .property(PropertyInfo::new("serial", int32()).read_only())
                .method(
                    FunctionInfo::new("Demo", "get_width", "demo_widget_get_width")
                        .method_of("Widget")
                        .returns(int32(), Transfer::None),
                )
                .method(
                    FunctionInfo::new("Demo", "new", "demo_widget_new")
                        .constructor_of("Widget")
                        .returns(widget(), Transfer::Everything),
                ),
        )
        .object(ObjectInfo::new("Demo", "Button", BUTTON_TYPE).parent(QualifiedName::new("Demo", "Widget")))
        .object(ObjectInfo::new("Demo", "Label", LABEL_TYPE).parent(QualifiedName::new("Demo", "Widget")))
        .enumeration(
            EnumInfo::new("Demo", "Mode", ScalarKind::Int32)
                .runtime_type(MODE_TYPE)
                .value("plain", 0)
                .value("bold", 1),
        )
        .function(
            FunctionInfo::new("Demo", "double_it", "demo_double_it")
                .arg(ArgInfo::input("value", int32()))
                .arg(ArgInfo::output("result", int32()))
                .returns(TypeInfo::Scalar(ScalarKind::Boolean), Transfer::None)
                .throws(),
        )
        .function(
            FunctionInfo::new("Demo", "sum", "demo_sum")
                .arg(ArgInfo::input("values", TypeInfo::c_array(int32()).length_arg(1).build()))
                .arg(ArgInfo::input("count", int32()))
                .returns(int32(), Transfer::None),
        )
        .function(
            FunctionInfo::new("Demo", "numbers", "demo_numbers")
                .arg(ArgInfo::output("count", int32()))
                .returns(TypeInfo::c_array(int32()).length_arg(0).build(), Transfer::Everything),
        )
        .function(
            FunctionInfo::new("Demo", "greet", "demo_greet")
                .arg(ArgInfo::input("name", utf8()).nullable())
                .returns(utf8(), Transfer::Everything),
        )
        .function(
            FunctionInfo::new("Demo", "make_point", "demo_make_point")
                .arg(ArgInfo::input("x", int32()))
                .arg(ArgInfo::output("point", TypeInfo::interface("Demo", "Point")).caller_allocates()),
        )
        .function(
            FunctionInfo::new("Demo", "checksum", "demo_checksum")
                .arg(ArgInfo::input("bytes", TypeInfo::c_array(int32()).length_arg(1).build()))
                .arg(ArgInfo::input("len", TypeInfo::Scalar(ScalarKind::UInt8)))
                .returns(int32(), Transfer::None),
        )
        .function(
            FunctionInfo::new("Demo", "increment", "demo_increment")
                .arg(ArgInfo::new("value", Direction::InOut, int32())),
        )
        .function(
            FunctionInfo::new("Demo", "scale", "demo_scale")
                .arg(ArgInfo::new("values", Direction::InOut, TypeInfo::c_array(int32()).length_arg(1).build()))
                .arg(ArgInfo::new("count", Direction::InOut, int32())),
        )
        .constant(ConstantInfo::new("Demo", "ANSWER", int32(), ConstantValue::Integer(42)))
        .build()
}
