use super::*;

fn demo_catalog() -> MemoryCatalog {
    MemoryCatalog::builder("Demo")
        .structure(
            StructInfo::new("Demo", "Point", 8)
                .field(FieldInfo::new("x", 0, TypeInfo::Scalar(ScalarKind::Int32)))
                .field(FieldInfo::new("y", 4, TypeInfo::Scalar(ScalarKind::Int32)).read_only())
                .method(FunctionInfo::new("Demo", "length", "demo_point_length").method_of("Point")),
        )
        .object(
            ObjectInfo::new("Demo", "Widget", RuntimeType(100))
                .property(PropertyInfo::new("label", TypeInfo::Scalar(ScalarKind::Utf8))),
        )
        .enumeration(
            EnumInfo::new("Demo", "Mode", ScalarKind::Int32)
                .flags()
                .value("read", 1)
                .value("write", 2),
        )
        .function(FunctionInfo::new("Demo", "answer", "demo_answer").returns(TypeInfo::Scalar(ScalarKind::Int32), Transfer::None))
        .build()
}

#[test]
fn test_find_by_name() {
    let catalog = demo_catalog();
    assert_eq!(catalog.len(), 4);

    let point = catalog.find_by_name("Demo", "Point").unwrap();
    assert_eq!(point.info_type(), InfoType::Struct);
    assert_eq!(point.qualified_name().to_string(), "Demo.Point");
    assert!(catalog.find_by_name("Demo", "Nope").is_none());
    assert!(catalog.find_by_name("Other", "Point").is_none());
}

#[test]
fn test_find_method_sets_container() {
    let catalog = demo_catalog();
    let point = catalog.find_by_name("Demo", "Point").unwrap();
    let method = catalog.find_method(&point, "length").unwrap();
    let function = method.as_function().unwrap();
    assert_eq!(function.container.as_deref(), Some("Point"));
    assert!(function.has_receiver());
    assert_eq!(method.to_string(), "function Demo.Point.length");
    assert!(catalog.find_method(&point, "width").is_none());
}

#[test]
fn test_flags_info_type() {
    let catalog = demo_catalog();
    let mode = catalog.find_by_name("Demo", "Mode").unwrap();
    assert_eq!(mode.info_type(), InfoType::Flags);
    assert!(mode.methods().is_empty());
}

#[test]
fn test_constructor_has_no_receiver() {
    let ctor = FunctionInfo::new("Demo", "new", "demo_widget_new").constructor_of("Widget");
    assert!(ctor.flags.is_method);
    assert!(!ctor.has_receiver());
    assert_eq!(ctor.container_name(), Some(QualifiedName::new("Demo", "Widget")));
}

#[test]
fn test_scalar_sizes() {
    assert_eq!(ScalarKind::Boolean.size(), 4);
    assert_eq!(ScalarKind::UInt8.size(), 1);
    assert_eq!(ScalarKind::Int16.size(), 2);
    assert_eq!(ScalarKind::Double.size(), 8);
    assert_eq!(ScalarKind::Utf8.size(), std::mem::size_of::<usize>());
    assert!(ScalarKind::Filename.is_string());
    assert!(!ScalarKind::GType.is_string());
}

#[test]
fn test_array_builder() {
    let ty = TypeInfo::c_array(TypeInfo::Scalar(ScalarKind::Int32)).fixed(3).zero_terminated().build();
    match &ty {
        TypeInfo::Array(array) => {
            assert_eq!(array.kind, ArrayKind::C);
            assert_eq!(array.fixed_size, Some(3));
            assert!(array.zero_terminated);
            assert_eq!(array.length_arg, None);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(ty.describe(), "array of int32");
}

#[test]
fn test_direction_predicates() {
    assert!(Direction::In.is_input() && !Direction::In.is_output());
    assert!(Direction::Out.is_output() && !Direction::Out.is_input());
    assert!(Direction::InOut.is_input() && Direction::InOut.is_output());
}
