//! Integration tests for request decoding

#![allow(clippy::unwrap_used, clippy::expect_used)]

use rpcgate::core::method::MethodBinding;
use rpcgate::core::types::{well_known, TypeDescriptor, TypeRef, TypeRegistry, TypeSignature};
use rpcgate::core::value::Value;
use rpcgate::error::constants::{ERR_EMPTY_REQUEST, ERR_INVALID_PARAMETER_COUNT};
use rpcgate::policy::{SerializationPolicy, SerializationPolicyLoader};
use rpcgate::protocol::{RequestPayloadBuilder, Rpc};
use rpcgate::{Result, RpcError};
use std::sync::Arc;

const ECHO: &str = "com.example.Echo";
const OTHER: &str = "com.example.Other";
const PLAIN: &str = "com.example.Plain";
const ECHO_IMPL: &str = "com.example.EchoImpl";

fn string_list() -> TypeSignature {
    TypeSignature::generic(well_known::LIST, vec![TypeSignature::class(well_known::STRING)])
}

fn rpc() -> Rpc {
    let registry = TypeRegistry::with_core_types()
        .with(
            TypeDescriptor::interface(ECHO)
                .implements(well_known::REMOTE_SERVICE)
                .method(
                    MethodBinding::new("echo")
                        .param(TypeRef::class(well_known::STRING))
                        .returns(TypeRef::class(well_known::STRING)),
                )
                .method(
                    MethodBinding::new("count")
                        .param(string_list())
                        .returns(TypeRef::Primitive(rpcgate::core::types::Primitive::Int)),
                )
                .method(MethodBinding::new("take").param(TypeRef::class(well_known::LIST))),
        )
        .with(TypeDescriptor::interface(OTHER).implements(well_known::REMOTE_SERVICE))
        .with(TypeDescriptor::interface(PLAIN))
        .with(
            TypeDescriptor::class(ECHO_IMPL)
                .extends(well_known::REMOTE_SERVICE_SERVLET)
                .implements(ECHO)
                .implements(PLAIN),
        );
    Rpc::new(Arc::new(registry))
}

fn echo_request(rpc: &Rpc, interface: &str) -> String {
    RequestPayloadBuilder::new(rpc.registry(), interface, "echo")
        .param(TypeRef::class(well_known::STRING), Value::string("hello"))
        .build()
        .unwrap()
}

#[test]
fn test_decode_echo() {
    let rpc = rpc();
    let request = rpc
        .decode_request(&echo_request(&rpc, ECHO), Some(ECHO_IMPL), None)
        .unwrap();

    assert_eq!(request.method().name(), "echo");
    assert_eq!(request.method().interface(), ECHO);
    assert_eq!(request.parameters(), &[Value::string("hello")]);
    assert!(request.rpc_token().is_none());
    assert_eq!(request.to_string(), "com.example.Echo.echo(hello)");
}

#[test]
fn test_empty_payload_is_invalid_argument() {
    let err = rpc().decode_request("", None, None).unwrap_err();
    assert!(matches!(err, RpcError::InvalidArgument(msg) if msg == ERR_EMPTY_REQUEST));
}

#[test]
fn test_interface_not_implemented_is_blocked() {
    let rpc = rpc();
    let err = rpc
        .decode_request(&echo_request(&rpc, OTHER), Some(ECHO_IMPL), None)
        .unwrap_err();
    assert!(err.is_blocked());
    assert!(err.to_string().contains(OTHER));
}

#[test]
fn test_unknown_interface_is_blocked_before_resolution() {
    let rpc = rpc();
    let err = rpc
        .decode_request(&echo_request(&rpc, "com.example.Nowhere"), Some(ECHO_IMPL), None)
        .unwrap_err();
    assert!(err.is_blocked());
}

#[test]
fn test_unknown_interface_without_expected_service_is_incompatible() {
    let rpc = rpc();
    let err = rpc
        .decode_request(&echo_request(&rpc, "com.example.Nowhere"), None, None)
        .unwrap_err();
    assert!(matches!(err, RpcError::IncompatibleRequest(_)));
}

#[test]
fn test_interface_not_extending_remote_service_is_blocked() {
    let rpc = rpc();
    let err = rpc
        .decode_request(&echo_request(&rpc, PLAIN), Some(ECHO_IMPL), None)
        .unwrap_err();
    assert!(err.is_blocked());
    assert!(err.to_string().contains("RemoteService"));
}

#[test]
fn test_parameter_count_bounded_by_stream() {
    let rpc = rpc();
    for count in ["99999", "-1", "1"] {
        let payload = format!("7|0|2|com.example.Echo|echo|0|0|1|2|{count}|");
        let err = rpc.decode_request(&payload, Some(ECHO_IMPL), None).unwrap_err();
        assert!(
            matches!(&err, RpcError::IncompatibleRequest(msg) if msg == ERR_INVALID_PARAMETER_COUNT),
            "count {count}: {err}"
        );
    }
}

#[test]
fn test_unknown_parameter_type_is_incompatible() {
    let rpc = rpc();
    let payload = RequestPayloadBuilder::new(rpc.registry(), ECHO, "echo")
        .param_with_wire_type(
            "com.example.Unknown",
            TypeRef::class(well_known::STRING),
            Value::string("hello"),
        )
        .build()
        .unwrap();

    let err = rpc.decode_request(&payload, Some(ECHO_IMPL), None).unwrap_err();
    assert!(matches!(&err, RpcError::IncompatibleRequest(msg) if msg.contains("com.example.Unknown")));
}

#[test]
fn test_unknown_method_is_incompatible() {
    let rpc = rpc();
    let payload = RequestPayloadBuilder::new(rpc.registry(), ECHO, "echo")
        .param(TypeRef::Primitive(rpcgate::core::types::Primitive::Int), Value::Int(3))
        .build()
        .unwrap();

    let err = rpc.decode_request(&payload, Some(ECHO_IMPL), None).unwrap_err();
    assert!(matches!(
        &err,
        RpcError::IncompatibleRequest(msg) if msg.contains("Could not locate requested method 'echo(int)'")
    ));
}

#[test]
fn test_generic_collection_decodes() {
    let rpc = rpc();
    let list = Value::Sequence {
        class: well_known::ARRAY_LIST.to_string(),
        elements: vec![Value::string("a"), Value::string("b")],
    };
    let payload = RequestPayloadBuilder::new(rpc.registry(), ECHO, "count")
        .param(TypeRef::class(well_known::LIST), list.clone())
        .build()
        .unwrap();

    let request = rpc.decode_request(&payload, Some(ECHO_IMPL), None).unwrap();
    assert_eq!(request.method().name(), "count");
    assert_eq!(request.parameters(), &[list]);
}

#[test]
fn test_spoofed_collection_element_rejected() {
    let rpc = rpc();
    let spoofed = Value::Sequence {
        class: well_known::ARRAY_LIST.to_string(),
        elements: vec![Value::Int(5)],
    };
    let payload = RequestPayloadBuilder::new(rpc.registry(), ECHO, "count")
        .param(TypeRef::class(well_known::LIST), spoofed)
        .build()
        .unwrap();

    let err = rpc.decode_request(&payload, Some(ECHO_IMPL), None).unwrap_err();
    assert!(matches!(err, RpcError::Serialization(_)), "{err}");
}

#[test]
fn test_elided_names_need_an_obfuscating_policy() {
    let rpc = rpc();
    let payload = RequestPayloadBuilder::new(rpc.registry(), ECHO, "echo")
        .elide_type_names()
        .param(TypeRef::class(well_known::STRING), Value::string("hello"))
        .build()
        .unwrap();

    let err = rpc.decode_request(&payload, Some(ECHO_IMPL), None).unwrap_err();
    assert!(matches!(err, RpcError::IncompatibleRequest(msg) if msg.contains("deobfuscation")));
}

#[test]
fn test_elided_names_resolved_through_policy() {
    let rpc = rpc();
    let policy: Arc<dyn SerializationPolicy> = Arc::new(
        SerializationPolicyLoader::load_from_str(
            "com.example.Echo, false, false, false, false, _, 0\njava.lang.String, true, true, true, true, S1, 1\n",
            rpc.registry(),
            None,
        )
        .unwrap(),
    );
    let payload = RequestPayloadBuilder::new(rpc.registry(), ECHO, "echo")
        .module("http://localhost/app/", "ABCDEF")
        .naming_policy(Arc::clone(&policy))
        .elide_type_names()
        .param(TypeRef::class(well_known::STRING), Value::string("hello"))
        .build()
        .unwrap();
    assert!(payload.contains("|_|"));
    assert!(payload.contains("|S1|"));

    let provider = move |_: &str, _: &str| -> Result<Arc<dyn SerializationPolicy>> { Ok(Arc::clone(&policy)) };
    let request = rpc
        .decode_request(&payload, Some(ECHO_IMPL), Some(&provider))
        .unwrap();
    assert_eq!(request.method().interface(), ECHO);
    assert_eq!(request.parameters(), &[Value::string("hello")]);
}

#[test]
fn test_provider_failure_propagates() {
    let rpc = rpc();
    let payload = echo_request(&rpc, ECHO);
    let provider = |_: &str, _: &str| -> Result<Arc<dyn SerializationPolicy>> {
        Err(RpcError::IncompatibleRequest("no policy".into()))
    };

    let err = rpc
        .decode_request(&payload, Some(ECHO_IMPL), Some(&provider))
        .unwrap_err();
    assert!(matches!(err, RpcError::IncompatibleRequest(msg) if msg == "no policy"));
}

#[test]
fn test_unsupported_version_is_incompatible() {
    let rpc = rpc();
    let payload = echo_request(&rpc, ECHO).replacen('7', "4", 1);
    let err = rpc.decode_request(&payload, Some(ECHO_IMPL), None).unwrap_err();
    assert!(matches!(err, RpcError::IncompatibleRequest(_)));
}

/// A `take(List)` call whose list holds `[inner, inner]` nested `depth`
/// times, the second element being a back reference to the first
fn nested_back_reference_request(depth: usize) -> String {
    let mut payload = String::from(
        "7|0|4|com.example.Echo|take|java.util.List|java.util.ArrayList/1|0|0|1|2|1|3|",
    );
    for _ in 0..depth {
        payload.push_str("4|2|");
    }
    payload.push_str("4|0|");
    for level in (0..depth).rev() {
        payload.push_str(&format!("-{}|", level + 2));
    }
    payload
}

fn leaf_lists(value: &Value) -> usize {
    match value {
        Value::Sequence { elements, .. } if elements.is_empty() => 1,
        Value::Sequence { elements, .. } => elements.iter().map(leaf_lists).sum(),
        _ => 0,
    }
}

#[test]
fn test_shallow_back_references_decode() {
    let rpc = rpc();
    let request = rpc
        .decode_request(&nested_back_reference_request(4), Some(ECHO_IMPL), None)
        .unwrap();
    assert_eq!(leaf_lists(&request.parameters()[0]), 16);
}

#[test]
fn test_doubling_back_references_are_bounded() {
    let rpc = rpc().with_max_decoded_values(50_000);
    let payload = nested_back_reference_request(40);
    assert!(payload.len() < 600);

    let err = rpc
        .decode_request(&payload, Some(ECHO_IMPL), None)
        .unwrap_err();
    assert!(matches!(err, RpcError::Serialization(ref msg) if msg.contains("50000")), "{err}");
}
