#![no_main]

use libfuzzer_sys::fuzz_target;
use rpcgate::core::types::TypeRegistry;
use rpcgate::policy::SerializationPolicyLoader;

fuzz_target!(|data: &[u8]| {
    let registry = TypeRegistry::with_core_types();
    if let Ok(contents) = std::str::from_utf8(data) {
        let mut missing = Vec::new();
        if let Ok(policy) = SerializationPolicyLoader::load_from_str(contents, &registry, Some(&mut missing)) {
            // An emitted policy must load again
            let emitted = SerializationPolicyLoader::write_policy(&policy);
            assert!(SerializationPolicyLoader::load_from_str(&emitted, &registry, None).is_ok());
        }
    }
});
