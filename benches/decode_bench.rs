use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rpcgate::core::method::MethodBinding;
use rpcgate::core::stream::StreamFlags;
use rpcgate::core::types::{well_known, TypeDescriptor, TypeRef, TypeRegistry, TypeSignature};
use rpcgate::core::value::Value;
use rpcgate::policy::SerializationPolicyLoader;
use rpcgate::protocol::{RequestPayloadBuilder, Rpc};
use std::sync::Arc;

fn rpc() -> Rpc {
    let registry = TypeRegistry::with_core_types()
        .with(
            TypeDescriptor::interface("com.example.Echo")
                .implements(well_known::REMOTE_SERVICE)
                .method(
                    MethodBinding::new("echo")
                        .param(TypeRef::class(well_known::STRING))
                        .returns(TypeRef::class(well_known::STRING)),
                )
                .method(
                    MethodBinding::new("count").param(TypeSignature::generic(
                        well_known::LIST,
                        vec![TypeSignature::class(well_known::STRING)],
                    )),
                ),
        )
        .with(
            TypeDescriptor::class("com.example.EchoImpl")
                .extends(well_known::REMOTE_SERVICE_SERVLET)
                .implements("com.example.Echo"),
        );
    Rpc::new(Arc::new(registry))
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_request");
    let rpc = rpc();

    let echo = RequestPayloadBuilder::new(rpc.registry(), "com.example.Echo", "echo")
        .param(TypeRef::class(well_known::STRING), Value::string("a".repeat(1024)))
        .build()
        .unwrap();
    group.bench_function("echo_string", |b| {
        b.iter(|| {
            let _ = rpc
                .decode_request(black_box(&echo), Some("com.example.EchoImpl"), None)
                .unwrap();
        })
    });

    let list = Value::Sequence {
        class: well_known::ARRAY_LIST.to_string(),
        elements: (0..512).map(|i| Value::string(format!("item-{i}"))).collect(),
    };
    let count = RequestPayloadBuilder::new(rpc.registry(), "com.example.Echo", "count")
        .param(TypeRef::class(well_known::LIST), list)
        .build()
        .unwrap();
    group.bench_function("string_list_512", |b| {
        b.iter(|| {
            let _ = rpc
                .decode_request(black_box(&count), Some("com.example.EchoImpl"), None)
                .unwrap();
        })
    });

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_response");
    let rpc = rpc();
    let method = rpc
        .registry()
        .find_method("com.example.Echo", "echo", &[TypeRef::class(well_known::STRING)])
        .unwrap();
    let policy = rpc.default_serialization_policy();

    group.bench_function("success_string", |b| {
        b.iter_batched(
            || Value::string("a".repeat(1024)),
            |value| {
                let _ = rpc
                    .encode_response_for_success(&method, &value, &policy, StreamFlags::DEFAULT)
                    .unwrap();
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn bench_policy_load(c: &mut Criterion) {
    let registry = TypeRegistry::with_core_types();
    let contents: String = [
        well_known::STRING,
        well_known::ARRAY_LIST,
        well_known::HASH_MAP,
        well_known::HASH_SET,
        well_known::INCOMPATIBLE_REMOTE_SERVICE_EXCEPTION,
    ]
    .iter()
    .enumerate()
    .map(|(i, class)| format!("{class}, true, true, true, true, {class}/{i}, {i}\n"))
    .collect();

    c.bench_function("policy_load", |b| {
        b.iter(|| {
            let _ = SerializationPolicyLoader::load_from_str(black_box(&contents), &registry, None)
                .unwrap();
        })
    });
}

criterion_group!(benches, bench_decode, bench_encode, bench_policy_load);
criterion_main!(benches);
