//! Shared pipeline state.

use crate::config::{MAX_DECODED_VALUES, MAX_STRING_TABLE_SIZE};
use crate::core::types::{TypeRef, TypeRegistry};
use crate::core::value::Value;
use crate::policy::{LegacySerializationPolicy, SerializationPolicy};
use crate::protocol::gate::SecurityGate;
use std::sync::Arc;

/// Entry point for decoding, invoking and encoding calls.
///
/// Holds the type registry, the legacy policy used when no provider is
/// supplied, and the security gate's cache. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct Rpc {
    registry: Arc<TypeRegistry>,
    default_policy: Arc<dyn SerializationPolicy>,
    gate: SecurityGate,
    max_string_table_size: usize,
    max_decoded_values: usize,
}

impl Rpc {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        let default_policy: Arc<dyn SerializationPolicy> =
            Arc::new(LegacySerializationPolicy::new(Arc::clone(&registry)));
        Self {
            registry,
            default_policy,
            gate: SecurityGate::new(),
            max_string_table_size: MAX_STRING_TABLE_SIZE,
            max_decoded_values: MAX_DECODED_VALUES,
        }
    }

    /// Cap on the string table of incoming requests
    pub fn with_max_string_table_size(mut self, max: usize) -> Self {
        self.max_string_table_size = max;
        self
    }

    /// Cap on the values one request may decode to
    pub fn with_max_decoded_values(mut self, max: usize) -> Self {
        self.max_decoded_values = max;
        self
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Policy used when the caller supplies no provider
    pub fn default_serialization_policy(&self) -> Arc<dyn SerializationPolicy> {
        Arc::clone(&self.default_policy)
    }

    pub fn gate(&self) -> &SecurityGate {
        &self.gate
    }

    pub(crate) fn max_string_table_size(&self) -> usize {
        self.max_string_table_size
    }

    pub(crate) fn max_decoded_values(&self) -> usize {
        self.max_decoded_values
    }

    /// Whether `service` implements the interface named `intf_name`
    pub fn implements_interface(&self, service: &str, intf_name: &str) -> bool {
        self.gate
            .implements_interface(&self.registry, service, intf_name)
    }

    /// Whether `value` may be passed or returned where `declared` is expected.
    /// Scalars match their primitive type; null never matches a primitive.
    pub(crate) fn value_matches(&self, declared: &TypeRef, value: &Value) -> bool {
        match (declared, value) {
            (TypeRef::Void, _) => false,
            (TypeRef::Primitive(primitive), v) => v.primitive_kind() == Some(*primitive),
            (_, Value::Null) => true,
            (declared, v) => v
                .runtime_type()
                .is_some_and(|actual| self.registry.is_assignable(declared, &actual)),
        }
    }
}
