use super::*;
use crate::catalog::InfoRef;
use crate::interop::Argument;
use crate::marshal::GenericData;
use crate::test_support::{demo_catalog, FakeHost, ScriptedDispatcher, BUTTON_TYPE, LABEL_TYPE, WIDGET_TYPE};
use std::cell::{Cell, RefCell};

struct World {
    ctx: RuntimeContext,
    host: FakeHost,
}

impl World {
    fn new() -> Self {
        let host = FakeHost::with_demo_types();
        let dispatcher = ScriptedDispatcher::new();
        dispatcher.define("demo_widget_get_width", |_| {
            let mut ret = Argument::zeroed();
            ret.i32 = 320;
            ret
        });
        let ctx = RuntimeContext::builder(demo_catalog(), host.clone(), dispatcher.clone())
            .symbols(dispatcher.symbols())
            .build();
        Self { ctx, host }
    }

    fn info(&self, name: &str) -> InfoRef {
        self.ctx.resolve(&QualifiedName::new("Demo", name)).unwrap()
    }

    fn wrap(&self, name: &str, address: NativePtr, transfer: Transfer) -> Value {
        let mut address = address;
        unsafe { store(&self.ctx, &self.info(name), &mut address, transfer).unwrap() }
    }

    fn point(&self) -> Value {
        self.ctx.instantiate(&self.info("Point")).unwrap().remove(0)
    }
}

#[test]
fn test_null_address_is_nil() {
    let world = World::new();
    assert_eq!(world.wrap("Widget", std::ptr::null_mut(), Transfer::Everything), Value::Nil);
    assert_eq!(world.ctx.cached_wrappers(), 0);
}

#[test]
fn test_identity_is_preserved() {
    let world = World::new();
    let object = world.host.new_object(WIDGET_TYPE);

    let first = world.wrap("Widget", object, Transfer::None);
    let second = world.wrap("Widget", object, Transfer::None);
    assert_eq!(first, second);
    assert!(first.as_compound().unwrap().same(second.as_compound().unwrap()));
    assert_eq!(world.ctx.cached_wrappers(), 1);
    assert_eq!(world.ctx.live_bindings(), 1);
    // One reference taken by the wrapper, none for the cache hit.
    assert_eq!(world.host.ref_count(object), 2);

    drop(first);
    drop(second);
    assert_eq!(world.host.ref_count(object), 1);
    assert_eq!(world.ctx.cached_wrappers(), 0);
    assert_eq!(world.ctx.live_bindings(), 0);
}

#[test]
fn test_new_wrapper_after_finalize() {
    let world = World::new();
    let object = world.host.new_object(WIDGET_TYPE);
    let first = world.wrap("Widget", object, Transfer::None);
    let binding = first.as_compound().unwrap().binding();
    drop(first);

    let second = world.wrap("Widget", object, Transfer::None);
    assert_eq!(second.as_compound().unwrap().binding(), binding);
    assert_eq!(world.host.ref_count(object), 2);
}

#[test]
fn test_surplus_reference_released_on_cache_hit() {
    let world = World::new();
    let object = world.host.new_object(WIDGET_TYPE);
    let held = world.wrap("Widget", object, Transfer::Everything);
    assert!(held.as_compound().unwrap().owns());
    assert_eq!(world.host.ref_count(object), 1);

    // The native side hands over another reference for the same instance.
    unsafe { world.ctx.host().object_ref(object) };
    let again = world.wrap("Widget", object, Transfer::Everything);
    assert_eq!(held, again);
    assert_eq!(world.host.ref_count(object), 1);

    drop(held);
    drop(again);
    assert_eq!(world.host.ref_count(object), 0);
}

#[test]
fn test_container_allocates_inline_storage() {
    let world = World::new();
    let mut address: NativePtr = std::ptr::null_mut();
    let value = unsafe { store(&world.ctx, &world.info("Point"), &mut address, Transfer::Container).unwrap() };
    let compound = value.as_compound().unwrap();
    assert!(!address.is_null());
    assert_eq!(compound.address(), address);
    assert!(compound.is_inline());
    assert!(!compound.owns());
    assert_eq!(compound.get(&world.ctx, "x").unwrap(), Value::Integer(0));
}

#[test]
fn test_objects_cannot_be_inline() {
    let world = World::new();
    let mut address: NativePtr = std::ptr::null_mut();
    let err = unsafe { store(&world.ctx, &world.info("Widget"), &mut address, Transfer::Container).unwrap_err() };
    assert!(matches!(err, BridgeError::Encoding { .. }));
    assert_eq!(world.ctx.live_bindings(), 0);
}

#[test]
fn test_struct_hooks() {
    let world = World::new();
    let acquired = Rc::new(Cell::new(0));
    let disposed = Rc::new(RefCell::new(Vec::new()));
    let (a, d) = (Rc::clone(&acquired), Rc::clone(&disposed));
    world.ctx.register_type(
        RepoType::from_info(&world.info("Buffer"))
            .on_acquire(move |_, _| {
                a.set(a.get() + 1);
                Ok(())
            })
            .on_dispose(move |_, address| d.borrow_mut().push(address as usize)),
    );

    let mut memory = [0u64; 2];
    let address = memory.as_mut_ptr() as NativePtr;
    let value = world.wrap("Buffer", address, Transfer::None);
    assert_eq!(acquired.get(), 1);
    assert!(value.as_compound().unwrap().owns());

    drop(value);
    assert_eq!(disposed.borrow().as_slice(), &[address as usize]);
}

#[test]
fn test_struct_without_acquire_stays_borrowed() {
    let world = World::new();
    let disposed = Rc::new(Cell::new(false));
    let d = Rc::clone(&disposed);
    world
        .ctx
        .register_type(RepoType::from_info(&world.info("Buffer")).on_dispose(move |_, _| d.set(true)));

    let mut memory = [0u64; 2];
    let value = world.wrap("Buffer", memory.as_mut_ptr() as NativePtr, Transfer::None);
    assert!(!value.as_compound().unwrap().owns());
    drop(value);
    assert!(!disposed.get());
}

#[test]
fn test_struct_ownership_handed_over_on_cache_hit() {
    let world = World::new();
    let disposed = Rc::new(Cell::new(0));
    let d = Rc::clone(&disposed);
    world
        .ctx
        .register_type(RepoType::from_info(&world.info("Buffer")).on_dispose(move |_, _| d.set(d.get() + 1)));

    let mut memory = [0u64; 2];
    let address = memory.as_mut_ptr() as NativePtr;
    let borrowed = world.wrap("Buffer", address, Transfer::None);
    assert!(!borrowed.as_compound().unwrap().owns());

    // The cached wrapper takes over the handed-over ownership.
    let owned = world.wrap("Buffer", address, Transfer::Everything);
    assert_eq!(borrowed, owned);
    assert!(owned.as_compound().unwrap().owns());
    assert_eq!(disposed.get(), 0);

    // A second hand-over is surplus and released at once.
    let again = world.wrap("Buffer", address, Transfer::Everything);
    assert_eq!(again, owned);
    assert_eq!(disposed.get(), 1);

    drop((borrowed, owned, again));
    assert_eq!(disposed.get(), 2);
}

#[test]
fn test_acquire_failure_propagates() {
    let world = World::new();
    world.ctx.register_type(
        RepoType::from_info(&world.info("Buffer"))
            .on_acquire(|_, _| Err(BridgeError::hook("acquire", "Demo.Buffer", "refused"))),
    );

    let mut memory = [0u64; 2];
    let mut address = memory.as_mut_ptr() as NativePtr;
    let err = unsafe { store(&world.ctx, &world.info("Buffer"), &mut address, Transfer::None).unwrap_err() };
    assert!(matches!(err, BridgeError::Hook { .. }));
    assert_eq!(world.ctx.cached_wrappers(), 0);
    assert_eq!(world.ctx.live_bindings(), 0);
}

#[test]
fn test_load_accepts_descendants() {
    let world = World::new();
    let button = world.wrap("Button", world.host.new_object(BUTTON_TYPE), Transfer::Everything);
    let address = button.as_compound().unwrap().address();

    let widget = world.info("Widget");
    assert_eq!(load(&world.ctx, Some(&button), 1, &widget, false).unwrap(), address);
    assert_eq!(load(&world.ctx, Some(&button), 1, &world.info("Button"), false).unwrap(), address);
}

#[test]
fn test_load_rejects_other_types() {
    let world = World::new();
    let widget = world.wrap("Widget", world.host.new_object(WIDGET_TYPE), Transfer::Everything);
    let label = world.wrap("Label", world.host.new_object(LABEL_TYPE), Transfer::Everything);
    let button = world.info("Button");

    let err = load(&world.ctx, Some(&widget), 2, &button, false).unwrap_err();
    assert_eq!(err.to_string(), "bad argument #2 (Demo.Button expected, got DemoWidget)");
    assert!(load(&world.ctx, Some(&label), 2, &button, false).is_err());
    assert!(load(&world.ctx, Some(&label), 2, &button, true).unwrap().is_null());

    let err = load(&world.ctx, Some(&Value::Integer(3)), 1, &button, false).unwrap_err();
    assert_eq!(err.to_string(), "bad argument #1 (Demo.Button expected, got number)");
    assert!(load(&world.ctx, None, 1, &button, true).unwrap().is_null());
}

#[test]
fn test_load_compares_struct_names() {
    let world = World::new();
    let point = world.point();
    assert!(!load(&world.ctx, Some(&point), 1, &world.info("Point"), false).unwrap().is_null());

    let err = load(&world.ctx, Some(&point), 1, &world.info("Buffer"), false).unwrap_err();
    assert_eq!(err.to_string(), "bad argument #1 (Demo.Buffer expected, got Demo.Point)");
}

#[test]
fn test_field_access() {
    let world = World::new();
    let point = world.point();
    let compound = point.as_compound().unwrap();

    compound.set(&world.ctx, "x", &Value::Integer(5)).unwrap();
    compound.set(&world.ctx, "y", &Value::from("-2")).unwrap();
    compound.set(&world.ctx, "tag", &Value::from("origin")).unwrap();
    assert_eq!(compound.get(&world.ctx, "x").unwrap(), Value::Integer(5));
    assert_eq!(compound.get(&world.ctx, "y").unwrap(), Value::Integer(-2));
    assert_eq!(compound.get(&world.ctx, "tag").unwrap(), Value::from("origin"));
    assert_eq!(compound.get(&world.ctx, "id").unwrap(), Value::Integer(0));
}

#[test]
fn test_field_access_errors() {
    let world = World::new();
    let point = world.point();
    let compound = point.as_compound().unwrap();

    let err = compound.set(&world.ctx, "id", &Value::Integer(1)).unwrap_err();
    assert!(matches!(err, BridgeError::Access { reason: AccessReason::NotWritable, .. }));

    let err = compound.get(&world.ctx, "nope").unwrap_err();
    assert_eq!(err.to_string(), "Demo.Point: `nope' no such element");

    let err = compound.set(&world.ctx, "x", &Value::from("wide")).unwrap_err();
    assert!(err.to_string().starts_with("bad argument #3"));
}

#[test]
fn test_property_round_trip() {
    let world = World::new();
    let object = world.host.new_object(WIDGET_TYPE);
    let widget = world.wrap("Widget", object, Transfer::Everything);
    let compound = widget.as_compound().unwrap();

    compound.set(&world.ctx, "label", &Value::from("hello")).unwrap();
    assert_eq!(
        world.host.property_value(object, "label"),
        Some(GenericData::String(Some(std::ffi::CString::new("hello").unwrap())))
    );
    assert_eq!(compound.get(&world.ctx, "label").unwrap(), Value::from("hello"));

    compound.set(&world.ctx, "mode", &Value::Integer(1)).unwrap();
    assert_eq!(compound.get(&world.ctx, "mode").unwrap(), Value::Integer(1));

    let err = compound.set(&world.ctx, "serial", &Value::Integer(9)).unwrap_err();
    assert!(matches!(err, BridgeError::Access { reason: AccessReason::NotWritable, .. }));
}

#[test]
fn test_object_property_keeps_identity() {
    let world = World::new();
    let widget = world.wrap("Widget", world.host.new_object(WIDGET_TYPE), Transfer::Everything);
    let buddy_ptr = world.host.new_object(BUTTON_TYPE);
    let buddy = world.wrap("Button", buddy_ptr, Transfer::None);
    assert_eq!(world.host.ref_count(buddy_ptr), 2);

    let compound = widget.as_compound().unwrap();
    compound.set(&world.ctx, "buddy", &buddy).unwrap();
    // The stored property holds its own reference.
    assert_eq!(world.host.ref_count(buddy_ptr), 3);

    let fetched = compound.get(&world.ctx, "buddy").unwrap();
    assert_eq!(fetched, buddy);
    assert_eq!(world.host.ref_count(buddy_ptr), 3);
}

#[test]
fn test_properties_inherited_from_parent() {
    let world = World::new();
    let object = world.host.new_object(BUTTON_TYPE);
    let button = world.wrap("Button", object, Transfer::Everything);
    let compound = button.as_compound().unwrap();
    compound.set(&world.ctx, "width", &Value::Integer(80)).unwrap();
    assert_eq!(compound.get(&world.ctx, "width").unwrap(), Value::Integer(80));
}

#[test]
fn test_method_materialised_once() {
    let world = World::new();
    let widget = world.wrap("Widget", world.host.new_object(WIDGET_TYPE), Transfer::Everything);
    let compound = widget.as_compound().unwrap();

    let first = compound.get(&world.ctx, "get_width").unwrap();
    let second = compound.get(&world.ctx, "get_width").unwrap();
    assert_eq!(first, second);

    let callable = first.as_callable().unwrap();
    assert_eq!(callable.to_string(), "function: Demo.Widget.get_width");
    assert_eq!(callable.call(&world.ctx, &[widget.clone()]).unwrap().as_slice(), &[Value::Integer(320)]);

    let err = compound.set(&world.ctx, "get_width", &Value::Nil).unwrap_err();
    assert!(matches!(err, BridgeError::Access { reason: AccessReason::NotWritable, .. }));
}

#[test]
fn test_index_hooks() {
    let world = World::new();
    let assigned = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&assigned);
    world.ctx.register_type(
        RepoType::from_info(&world.info("Point"))
            .with_value("dimensions", Value::Integer(2))
            .on_index(|_, _, name| Ok(Value::string(format!("virtual {}", name))))
            .on_newindex(move |_, _, name, value| {
                log.borrow_mut().push((name.to_string(), value.clone()));
                Ok(())
            }),
    );

    let point = world.point();
    let compound = point.as_compound().unwrap();
    assert_eq!(compound.get(&world.ctx, "dimensions").unwrap(), Value::Integer(2));
    assert_eq!(compound.get(&world.ctx, "z").unwrap(), Value::from("virtual z"));
    compound.set(&world.ctx, "z", &Value::Integer(1)).unwrap();
    assert_eq!(assigned.borrow().as_slice(), &[("z".to_string(), Value::Integer(1))]);
}

#[test]
fn test_wrappers_outlive_context() {
    let world = World::new();
    let owned = world.host.new_object(WIDGET_TYPE);
    let borrowed = world.host.new_object(WIDGET_TYPE);
    let first = world.wrap("Widget", owned, Transfer::Everything);
    let second = world.wrap("Widget", borrowed, Transfer::None);
    let World { ctx, host } = world;
    drop(ctx);

    drop(first);
    assert_eq!(host.ref_count(owned), 0);
    drop(second);
    assert_eq!(host.ref_count(borrowed), 1);
}

#[test]
fn test_display() {
    let world = World::new();
    let point = world.point();
    let compound = point.as_compound().unwrap();
    assert!(compound.to_string().starts_with("Demo.Point (0x"));
}
