#![no_main]

use libfuzzer_sys::fuzz_target;
use once_cell::sync::Lazy;
use rpcgate::core::method::MethodBinding;
use rpcgate::core::types::{well_known, TypeDescriptor, TypeRef, TypeRegistry, TypeSignature};
use rpcgate::protocol::Rpc;
use std::sync::Arc;

static RPC: Lazy<Rpc> = Lazy::new(|| {
    let registry = TypeRegistry::with_core_types()
        .with(
            TypeDescriptor::interface("com.example.Echo")
                .implements(well_known::REMOTE_SERVICE)
                .method(
                    MethodBinding::new("echo")
                        .param(TypeRef::class(well_known::STRING))
                        .returns(TypeRef::class(well_known::STRING)),
                )
                .method(MethodBinding::new("count").param(TypeSignature::generic(
                    well_known::LIST,
                    vec![TypeSignature::class(well_known::STRING)],
                ))),
        )
        .with(
            TypeDescriptor::class("com.example.EchoImpl")
                .extends(well_known::REMOTE_SERVICE_SERVLET)
                .implements("com.example.Echo"),
        );
    Rpc::new(Arc::new(registry))
});

fuzz_target!(|data: &[u8]| {
    // Hostile request payloads must be rejected, never panic or recurse unbounded
    if let Ok(payload) = std::str::from_utf8(data) {
        let _ = RPC.decode_request(payload, Some("com.example.EchoImpl"), None);
    }
});
