//! Marshalling benchmarks
//!
//! Measures the call frame, wrapper cache hits and array conversion
//! against the simulated native world.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dynabind::interop::Argument;
use dynabind::test_support::{demo_catalog, FakeHost, ScriptedDispatcher, WIDGET_TYPE};
use dynabind::{QualifiedName, RuntimeContext, Transfer, Value};

fn setup() -> (RuntimeContext, FakeHost) {
    let host = FakeHost::with_demo_types();
    let dispatcher = ScriptedDispatcher::new();
    dispatcher.define("demo_double_it", |args| {
        let mut ret = Argument::zeroed();
        unsafe { *(args[1].ptr as *mut i32) = args[0].i32 * 2 };
        ret.boolean = 1;
        ret
    });
    dispatcher.define("demo_sum", |args| {
        let mut ret = Argument::zeroed();
        unsafe {
            let values = std::slice::from_raw_parts(args[0].ptr as *const i32, args[1].i32 as usize);
            ret.i32 = values.iter().sum();
        }
        ret
    });

    let ctx = RuntimeContext::builder(demo_catalog(), host.clone(), dispatcher.clone())
        .symbols(dispatcher.symbols())
        .build();
    (ctx, host)
}

fn function(ctx: &RuntimeContext, name: &str) -> Value {
    let found = ctx.find("Demo", name, None);
    ctx.get(found.first()).unwrap().remove(0)
}

fn bench_call_frame(c: &mut Criterion) {
    let (ctx, _) = setup();
    let double_it = function(&ctx, "double_it");
    let callable = double_it.as_callable().unwrap();
    let args = [Value::Integer(21)];

    c.bench_function("call_scalar_out", |b| {
        b.iter(|| black_box(callable.call(&ctx, black_box(&args)).unwrap()))
    });
}

fn bench_array_argument(c: &mut Criterion) {
    let mut group = c.benchmark_group("array_argument");
    let (ctx, _) = setup();
    let sum = function(&ctx, "sum");
    let callable = sum.as_callable().unwrap();

    for len in [4usize, 64, 1024].iter() {
        let values = [Value::sequence((0..*len as i64).map(Value::Integer))];
        group.bench_with_input(BenchmarkId::from_parameter(len), &values, |b, values| {
            b.iter(|| black_box(callable.call(&ctx, values).unwrap()))
        });
    }

    group.finish();
}

fn bench_wrapper_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("wrapper");
    let (ctx, host) = setup();
    let info = ctx.resolve(&QualifiedName::new("Demo", "Widget")).unwrap();
    let object = host.new_object(WIDGET_TYPE);

    group.bench_function("create_and_finalize", |b| {
        b.iter(|| {
            let mut address = object;
            let value = unsafe { dynabind::compound::store(&ctx, &info, &mut address, Transfer::None).unwrap() };
            black_box(value)
        })
    });

    let mut address = object;
    let held = unsafe { dynabind::compound::store(&ctx, &info, &mut address, Transfer::None).unwrap() };
    group.bench_function("cache_hit", |b| {
        b.iter(|| {
            let mut address = object;
            let value = unsafe { dynabind::compound::store(&ctx, &info, &mut address, Transfer::None).unwrap() };
            black_box(value)
        })
    });
    drop(held);

    group.finish();
}

criterion_group!(benches, bench_call_frame, bench_array_argument, bench_wrapper_cache);
criterion_main!(benches);
