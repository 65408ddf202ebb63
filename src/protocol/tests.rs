// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use crate::config::LimitsConfig;
use crate::core::method::MethodBinding;
use crate::core::stream::{StreamFlags, RESPONSE_FAILURE_MARKER, RESPONSE_SUCCESS_MARKER};
use crate::core::types::{well_known, TypeDescriptor, TypeRef, TypeRegistry, TypeSignature};
use crate::core::value::{ObjectValue, Value};
use crate::error::constants::GENERIC_FAILURE_MSG;
use crate::error::{Result, RpcError};
use crate::protocol::*;
use std::sync::Arc;

const ECHO_SERVICE: &str = "com.example.EchoService";
const OTHER_SERVICE: &str = "com.example.OtherService";
const ECHO_IMPL: &str = "com.example.EchoServiceImpl";
const ECHO_EXCEPTION: &str = "com.example.EchoException";
const XSRF_TOKEN: &str = "com.example.XsrfToken";

fn echo_method() -> MethodBinding {
    MethodBinding::new("echo")
        .param(TypeRef::class(well_known::STRING))
        .returns(TypeRef::class(well_known::STRING))
        .throws(ECHO_EXCEPTION)
}

fn registry() -> Arc<TypeRegistry> {
    let registry = TypeRegistry::with_core_types()
        .with(
            TypeDescriptor::interface(ECHO_SERVICE)
                .implements(well_known::REMOTE_SERVICE)
                .method(echo_method()),
        )
        .with(
            TypeDescriptor::interface(OTHER_SERVICE)
                .implements(well_known::REMOTE_SERVICE)
                .method(echo_method()),
        )
        .with(
            TypeDescriptor::class(ECHO_IMPL)
                .extends(well_known::REMOTE_SERVICE_SERVLET)
                .implements(ECHO_SERVICE),
        )
        .with(
            TypeDescriptor::class(ECHO_EXCEPTION)
                .extends(well_known::EXCEPTION)
                .implements(well_known::IS_SERIALIZABLE),
        )
        .with(
            TypeDescriptor::class(XSRF_TOKEN)
                .implements(well_known::RPC_TOKEN)
                .implements(well_known::IS_SERIALIZABLE)
                .field("token", TypeSignature::class(well_known::STRING)),
        );
    Arc::new(registry)
}

fn bound_echo(registry: &TypeRegistry) -> Arc<MethodBinding> {
    registry
        .find_method(ECHO_SERVICE, "echo", &[TypeRef::class(well_known::STRING)])
        .expect("echo is registered")
}

fn dispatcher_with<F>(handler: F) -> RemoteServiceDispatcher
where
    F: Fn(&[Value]) -> crate::core::value::ServiceResult + Send + Sync + 'static,
{
    let registry = registry();
    let target = ServiceTarget::new(ECHO_IMPL);
    target.register(&bound_echo(&registry), handler).unwrap();
    RemoteServiceDispatcher::new(Arc::new(Rpc::new(registry)), Arc::new(target))
}

fn echo_payload(registry: &TypeRegistry, interface: &str, text: &str) -> String {
    RequestPayloadBuilder::new(registry, interface, "echo")
        .param(TypeRef::class(well_known::STRING), Value::string(text))
        .build()
        .unwrap()
}

struct RequireToken(&'static str);

impl RpcTokenValidator for RequireToken {
    fn validate(&self, token: Option<&Value>, _request: &RpcRequest) -> Result<()> {
        let presented = match token {
            Some(Value::Object(object)) => object.field("token").and_then(Value::as_str),
            _ => None,
        };
        if presented == Some(self.0) {
            Ok(())
        } else {
            Err(RpcError::TokenRejected("Invalid RPC token".to_string()))
        }
    }
}

#[test]
fn test_echo_round_trip() {
    let dispatcher = dispatcher_with(|args| Ok(args[0].clone()));
    let payload = echo_payload(dispatcher.rpc().registry(), ECHO_SERVICE, "hello");

    let response = dispatcher.process_call(&payload).unwrap();
    assert_eq!(response, "//OK7|0|1|hello|1|");
}

#[test]
fn test_declared_exception_is_encoded() {
    let dispatcher = dispatcher_with(|_| Err(ObjectValue::exception(ECHO_EXCEPTION, "no echo today")));
    let payload = echo_payload(dispatcher.rpc().registry(), ECHO_SERVICE, "hello");

    let response = dispatcher.process_call(&payload).unwrap();
    assert!(response.starts_with(RESPONSE_FAILURE_MARKER));
    assert!(response.contains(ECHO_EXCEPTION));
    assert!(response.contains("no echo today"));
}

#[test]
fn test_undeclared_exception_is_hidden() {
    let dispatcher = dispatcher_with(|_| {
        Err(ObjectValue::exception(
            well_known::ILLEGAL_ARGUMENT_EXCEPTION,
            "internal detail",
        ))
    });
    let payload = echo_payload(dispatcher.rpc().registry(), ECHO_SERVICE, "hello");

    match dispatcher.process_call(&payload) {
        Err(RpcError::UnexpectedFailure { cause, .. }) => {
            assert_eq!(cause.class, well_known::ILLEGAL_ARGUMENT_EXCEPTION);
        }
        other => panic!("Expected UnexpectedFailure, got {other:?}"),
    }
    assert_eq!(dispatcher.handle(&payload), GENERIC_FAILURE_MSG);
}

#[test]
fn test_unknown_method_answers_incompatible() {
    let dispatcher = dispatcher_with(|args| Ok(args[0].clone()));
    let payload = RequestPayloadBuilder::new(dispatcher.rpc().registry(), ECHO_SERVICE, "shout")
        .param(TypeRef::class(well_known::STRING), Value::string("hello"))
        .build()
        .unwrap();

    let response = dispatcher.process_call(&payload).unwrap();
    assert!(response.starts_with(RESPONSE_FAILURE_MARKER));
    assert!(response.contains(well_known::INCOMPATIBLE_REMOTE_SERVICE_EXCEPTION));
    assert!(response.contains("shout"));
}

#[test]
fn test_unimplemented_interface_is_blocked() {
    let dispatcher = dispatcher_with(|args| Ok(args[0].clone()));
    let payload = echo_payload(dispatcher.rpc().registry(), OTHER_SERVICE, "hello");

    let err = dispatcher.process_call(&payload).unwrap_err();
    assert!(err.is_blocked());
    assert_eq!(dispatcher.handle(&payload), GENERIC_FAILURE_MSG);
}

#[test]
fn test_wrong_return_type_is_blocked() {
    let dispatcher = dispatcher_with(|_| Ok(Value::Int(42)));
    let payload = echo_payload(dispatcher.rpc().registry(), ECHO_SERVICE, "hello");

    let err = dispatcher.process_call(&payload).unwrap_err();
    assert!(err.is_blocked());
}

#[test]
fn test_oversized_payload_rejected() {
    let limits = LimitsConfig {
        max_payload_size: 8,
        ..LimitsConfig::default()
    };
    let dispatcher = dispatcher_with(|args| Ok(args[0].clone())).with_limits(&limits);
    let payload = echo_payload(dispatcher.rpc().registry(), ECHO_SERVICE, "hello");

    assert!(matches!(
        dispatcher.process_call(&payload),
        Err(RpcError::OversizedPayload(len)) if len == payload.len()
    ));
}

#[test]
fn test_token_validator_accepts_and_rejects() {
    let dispatcher = dispatcher_with(|args| Ok(args[0].clone()))
        .with_token_validator(Arc::new(RequireToken("secret")));
    let registry = Arc::clone(dispatcher.rpc().registry());

    let with_token = |token: &str| {
        RequestPayloadBuilder::new(&registry, ECHO_SERVICE, "echo")
            .rpc_token(Value::Object(
                ObjectValue::new(XSRF_TOKEN).with_field("token", token),
            ))
            .param(TypeRef::class(well_known::STRING), Value::string("hello"))
            .build()
            .unwrap()
    };

    let accepted = dispatcher.process_call(&with_token("secret")).unwrap();
    assert!(accepted.starts_with(RESPONSE_SUCCESS_MARKER));

    let rejected = dispatcher.process_call(&with_token("forged")).unwrap();
    assert!(rejected.starts_with(RESPONSE_FAILURE_MARKER));
    assert!(rejected.contains(well_known::RPC_TOKEN_EXCEPTION));
}

#[test]
fn test_missing_token_rejected() {
    let dispatcher = dispatcher_with(|args| Ok(args[0].clone()))
        .with_token_validator(Arc::new(RequireToken("secret")));
    let payload = echo_payload(dispatcher.rpc().registry(), ECHO_SERVICE, "hello");

    let response = dispatcher.process_call(&payload).unwrap();
    assert!(response.contains(well_known::RPC_TOKEN_EXCEPTION));
}

#[test]
fn test_missing_handler_is_blocked() {
    let registry = registry();
    let rpc = Rpc::new(Arc::clone(&registry));
    let target = ServiceTarget::new(ECHO_IMPL);

    let err = rpc
        .invoke_and_encode_response(
            &target,
            &bound_echo(&registry),
            &[Value::string("hello")],
            &rpc.default_serialization_policy(),
            StreamFlags::DEFAULT,
        )
        .unwrap_err();
    assert!(err.is_blocked());
    assert!(err.to_string().contains("inaccessible method"));
}

#[test]
fn test_invalid_arguments_are_blocked() {
    let registry = registry();
    let rpc = Rpc::new(Arc::clone(&registry));
    let target = ServiceTarget::new(ECHO_IMPL);
    let method = bound_echo(&registry);
    target.register(&method, |args| Ok(args[0].clone())).unwrap();

    for args in [vec![], vec![Value::Int(1)], vec![Value::Null, Value::Null]] {
        let err = rpc
            .invoke_and_encode_response(
                &target,
                &method,
                &args,
                &rpc.default_serialization_policy(),
                StreamFlags::DEFAULT,
            )
            .unwrap_err();
        assert!(err.to_string().contains("invalid arguments"), "{err}");
    }
}

#[test]
fn test_null_argument_reaches_handler() {
    let dispatcher = dispatcher_with(|args| {
        assert!(args[0].is_null());
        Ok(Value::Null)
    });
    let payload = RequestPayloadBuilder::new(dispatcher.rpc().registry(), ECHO_SERVICE, "echo")
        .param(TypeRef::class(well_known::STRING), Value::Null)
        .build()
        .unwrap();

    assert_eq!(dispatcher.process_call(&payload).unwrap(), "//OK7|0|0|0|");
}
