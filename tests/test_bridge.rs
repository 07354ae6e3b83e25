//! End-to-end bridge scenarios against the simulated native world

use dynabind::config::{BridgeConfig, IntegerOverflow};
use dynabind::interop::Argument;
use dynabind::test_support::{demo_catalog, FakeHost, ScriptedDispatcher, BUTTON_TYPE, WIDGET_TYPE};
use dynabind::{RuntimeContext, Value};
use std::os::raw::c_void;

struct Runtime {
    ctx: RuntimeContext,
    host: FakeHost,
}

fn runtime(config: BridgeConfig) -> Runtime {
    let host = FakeHost::with_demo_types();
    let dispatcher = ScriptedDispatcher::new();
    {
        let host = host.clone();
        dispatcher.define("demo_widget_new", move |_| Argument::from_ptr(host.new_object(BUTTON_TYPE)));
    }
    dispatcher.define("demo_widget_get_width", |_| {
        let mut ret = Argument::zeroed();
        ret.i32 = 640;
        ret
    });
    dispatcher.define("demo_make_point", |args| {
        unsafe {
            let point = args[1].ptr as *mut i32;
            *point = args[0].i32;
        }
        Argument::zeroed()
    });
    dispatcher.define("demo_numbers", |args| {
        let data = Box::leak(vec![1i32, 2].into_boxed_slice());
        unsafe { *(args[0].ptr as *mut i32) = 2 };
        Argument::from_ptr(data.as_mut_ptr() as *mut c_void)
    });

    let ctx = RuntimeContext::builder(demo_catalog(), host.clone(), dispatcher.clone())
        .symbols(dispatcher.symbols())
        .config(config)
        .build();
    Runtime { ctx, host }
}

fn lookup(ctx: &RuntimeContext, symbol: &str, container: Option<&str>) -> Value {
    let found = ctx.find("Demo", symbol, container);
    ctx.get(found.first()).unwrap().remove(0)
}

fn call(ctx: &RuntimeContext, function: &Value, args: &[Value]) -> Vec<Value> {
    function.as_callable().unwrap().call(ctx, args).unwrap().into_vec()
}

#[test]
fn test_object_lifecycle() {
    let rt = runtime(BridgeConfig::default());
    let new = lookup(&rt.ctx, "new", Some("Widget"));

    let widget = call(&rt.ctx, &new, &[]).remove(0);
    let compound = widget.as_compound().unwrap();
    let address = compound.address();
    assert!(compound.owns());
    assert_eq!(rt.host.ref_count(address), 1);

    // A Button constructed through the Widget constructor is a Widget.
    let width = compound.get(&rt.ctx, "get_width").unwrap();
    assert_eq!(call(&rt.ctx, &width, &[widget.clone()]), vec![Value::Integer(640)]);

    compound.set(&rt.ctx, "label", &Value::string("ok")).unwrap();
    assert_eq!(compound.get(&rt.ctx, "label").unwrap(), Value::string("ok"));

    let err = compound.set(&rt.ctx, "serial", &Value::Integer(1)).unwrap_err();
    assert_eq!(err.to_string(), "Demo.Widget: `serial' not writable");

    drop(widget);
    assert_eq!(rt.host.ref_count(address), 0);
    assert_eq!(rt.ctx.cached_wrappers(), 0);
    assert_eq!(rt.ctx.live_bindings(), 0);
}

#[test]
fn test_borrowed_object_shared_between_wrappers() {
    let rt = runtime(BridgeConfig::default());
    let first = rt.host.new_object(WIDGET_TYPE);
    let second = rt.host.new_object(WIDGET_TYPE);

    let mut a = first;
    let mut b = second;
    let wrapper_a = unsafe { dynabind::compound::store(&rt.ctx, &widget_info(&rt.ctx), &mut a, dynabind::Transfer::None) }
        .unwrap();
    let wrapper_b = unsafe { dynabind::compound::store(&rt.ctx, &widget_info(&rt.ctx), &mut b, dynabind::Transfer::None) }
        .unwrap();
    assert_ne!(wrapper_a, wrapper_b);

    let compound = wrapper_a.as_compound().unwrap();
    compound.set(&rt.ctx, "buddy", &wrapper_b).unwrap();
    let buddy = compound.get(&rt.ctx, "buddy").unwrap();
    assert_eq!(buddy, wrapper_b);

    drop((wrapper_a, wrapper_b, buddy));
    assert_eq!(rt.host.ref_count(first), 1);
    // The native side still holds `second` through the property.
    assert_eq!(rt.host.ref_count(second), 2);
}

fn widget_info(ctx: &RuntimeContext) -> dynabind::InfoRef {
    ctx.resolve(&dynabind::QualifiedName::new("Demo", "Widget")).unwrap()
}

#[test]
fn test_struct_values() {
    let rt = runtime(BridgeConfig::default());
    let point = lookup(&rt.ctx, "Point", None);
    let compound = point.as_compound().unwrap();
    compound.set(&rt.ctx, "y", &Value::Number(7.0)).unwrap();
    assert_eq!(compound.get(&rt.ctx, "y").unwrap(), Value::Integer(7));
    assert_eq!(point.to_string(), format!("Demo.Point ({:p})", compound.address()));

    let make_point = lookup(&rt.ctx, "make_point", None);
    let made = call(&rt.ctx, &make_point, &[Value::Integer(-4)]);
    assert_eq!(made[0].as_compound().unwrap().get(&rt.ctx, "x").unwrap(), Value::Integer(-4));
}

#[test]
fn test_constants_and_arrays() {
    let rt = runtime(BridgeConfig::default());
    assert_eq!(lookup(&rt.ctx, "ANSWER", None), Value::Integer(42));

    let numbers = lookup(&rt.ctx, "numbers", None);
    let result = call(&rt.ctx, &numbers, &[]);
    assert_eq!(result, vec![Value::sequence([Value::Integer(1), Value::Integer(2)])]);
    assert_eq!(rt.host.freed_count(), 1);
}

#[test]
fn test_unresolved_names() {
    let rt = runtime(BridgeConfig::default());
    let found = rt.ctx.find("Demo", "missing", None);
    assert_eq!(found.as_slice(), &[Value::Boolean(false), Value::string("unable to resolve Demo:missing")]);
    let found = rt.ctx.find("Demo", "missing", Some("Widget"));
    assert_eq!(found[1], Value::string("unable to resolve Demo.Widget:missing"));
}

#[test]
fn test_overflow_policy_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(dynabind::config::CONFIG_FILE);
    std::fs::write(&path, "[marshal]\ninteger_overflow = \"wrap\"\n").unwrap();

    let config = BridgeConfig::discover_in(dir.path()).unwrap();
    assert_eq!(config.marshal.integer_overflow, IntegerOverflow::Wrap);

    let strict = runtime(BridgeConfig::default());
    let point = lookup(&strict.ctx, "Point", None);
    let err = point
        .as_compound()
        .unwrap()
        .set(&strict.ctx, "x", &Value::Integer(1 << 40))
        .unwrap_err();
    assert!(err.is_argument_error());

    let lenient = runtime(config);
    let point = lookup(&lenient.ctx, "Point", None);
    let compound = point.as_compound().unwrap();
    compound.set(&lenient.ctx, "x", &Value::Integer((1 << 32) + 5)).unwrap();
    assert_eq!(compound.get(&lenient.ctx, "x").unwrap(), Value::Integer(5));
}
