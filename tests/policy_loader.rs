//! Integration tests for policy file loading and emission

#![allow(clippy::unwrap_used, clippy::expect_used)]

use rpcgate::core::types::{well_known, TypeDescriptor, TypeRef, TypeRegistry};
use rpcgate::policy::{SerializationPolicy, SerializationPolicyLoader, TypeNameObfuscator};
use rpcgate::RpcError;
use std::io::Cursor;

fn registry() -> TypeRegistry {
    TypeRegistry::with_core_types()
        .with(TypeDescriptor::class("com.example.Foo").implements(well_known::SERIALIZABLE))
        .with(TypeDescriptor::class("com.example.Bar").extends("com.example.Foo"))
        .with(TypeDescriptor::class("com.example.Baz"))
        .with(TypeDescriptor::interface("com.example.Service").implements(well_known::REMOTE_SERVICE))
}

const POLICY: &str = "\
com.example.Bar, true, true, false, false, Bar/3, 3
com.example.Foo, true
com.example.Baz, false
com.example.Service, false, false, false, false, _, 0
java.lang.String, true, true, true, true, java.lang.String/2004016611, 2004016611
@ClientFields, com.example.Foo, id, name
";

#[test]
fn test_emitted_policy_reloads_identically() {
    let registry = registry();
    let policy = SerializationPolicyLoader::load_from_str(POLICY, &registry, None).unwrap();

    let emitted = SerializationPolicyLoader::write_policy(&policy);
    let reloaded = SerializationPolicyLoader::load_from_str(&emitted, &registry, None).unwrap();

    assert_eq!(reloaded.entries().len(), policy.entries().len());
    assert_eq!(SerializationPolicyLoader::write_policy(&reloaded), emitted);

    for class in ["com.example.Foo", "com.example.Bar", "com.example.Baz", "java.lang.String"] {
        let ty = TypeRef::class(class);
        assert_eq!(
            policy.validate_serialize(&ty).is_ok(),
            reloaded.validate_serialize(&ty).is_ok(),
            "{class}"
        );
        assert_eq!(
            policy.validate_deserialize(&ty).is_ok(),
            reloaded.validate_deserialize(&ty).is_ok(),
            "{class}"
        );
        assert_eq!(
            policy.should_serialize_fields(&ty),
            reloaded.should_serialize_fields(&ty),
            "{class}"
        );
    }
    assert_eq!(
        reloaded.client_field_names_for_enhanced_class("com.example.Foo"),
        policy.client_field_names_for_enhanced_class("com.example.Foo")
    );
}

#[test]
fn test_two_column_entry_ties_both_directions() {
    let policy = SerializationPolicyLoader::load_from_str(POLICY, &registry(), None).unwrap();

    let foo = TypeRef::class("com.example.Foo");
    assert!(policy.validate_serialize(&foo).is_ok());
    assert!(policy.validate_deserialize(&foo).is_ok());

    let baz = TypeRef::class("com.example.Baz");
    assert!(policy.validate_serialize(&baz).is_err());
    assert!(policy.validate_deserialize(&baz).is_err());
    assert!(policy.should_serialize_fields(&baz));
    assert!(policy.should_deserialize_fields(&baz));
}

#[test]
fn test_seven_column_entry_sets_directions_independently() {
    let policy = SerializationPolicyLoader::load_from_str(POLICY, &registry(), None).unwrap();

    let bar = TypeRef::class("com.example.Bar");
    assert!(policy.validate_serialize(&bar).is_ok());
    assert!(matches!(
        policy.validate_deserialize(&bar),
        Err(RpcError::PolicyViolation(_))
    ));
    assert!(!policy.should_deserialize_fields(&bar));
}

#[test]
fn test_type_ids_map_both_ways() {
    let policy = SerializationPolicyLoader::load_from_str(POLICY, &registry(), None).unwrap();

    assert_eq!(policy.class_name_for_type_id("Bar/3"), Some("com.example.Bar"));
    assert_eq!(policy.type_id_for_class("com.example.Bar"), Some("Bar/3"));
    assert_eq!(policy.class_name_for_type_id("_"), Some("com.example.Service"));
    assert_eq!(policy.class_name_for_type_id("nope"), None);
}

#[test]
fn test_unresolvable_class_is_reported_not_fatal() {
    let registry = registry();
    let mut contents = String::from(POLICY);
    contents.push_str("com.example.Missing, true\n");

    let mut missing = Vec::new();
    let policy =
        SerializationPolicyLoader::load_from_str(&contents, &registry, Some(&mut missing)).unwrap();

    assert_eq!(policy.entries().len(), 5);
    assert_eq!(missing.len(), 1);
    assert!(matches!(&missing[0], RpcError::ClassNotFound(name) if name == "com.example.Missing"));
}

#[test]
fn test_unresolvable_class_without_collector() {
    let contents = "com.example.Missing, true\ncom.example.Foo, true\n";
    let policy = SerializationPolicyLoader::load_from_str(contents, &registry(), None).unwrap();
    assert_eq!(policy.entries().len(), 1);
}

#[test]
fn test_reader_and_string_loading_agree() {
    let registry = registry();
    let from_str = SerializationPolicyLoader::load_from_str(POLICY, &registry, None).unwrap();
    let from_reader =
        SerializationPolicyLoader::load_from_reader(Cursor::new(POLICY), &registry, None).unwrap();

    assert_eq!(
        SerializationPolicyLoader::write_policy(&from_str),
        SerializationPolicyLoader::write_policy(&from_reader)
    );
}

#[test]
fn test_malformed_line_reports_line_number() {
    let contents = "com.example.Foo, true\ncom.example.Bar, true, false\n";
    let err = SerializationPolicyLoader::load_from_str(contents, &registry(), None)
        .err()
        .expect("three columns is malformed");
    assert!(matches!(err, RpcError::PolicyParse { line: 2, .. }));
}

#[test]
fn test_blank_lines_are_ignored() {
    let contents = "\n   \ncom.example.Foo, true\n\n";
    let policy = SerializationPolicyLoader::load_from_str(contents, &registry(), None).unwrap();
    assert_eq!(policy.entries().len(), 1);
}
