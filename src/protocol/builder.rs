//! Client-side request construction.
//!
//! ```rust
//! use rpcgate::core::types::{well_known, TypeRef, TypeRegistry};
//! use rpcgate::core::value::Value;
//! use rpcgate::protocol::RequestPayloadBuilder;
//!
//! let registry = TypeRegistry::with_core_types();
//! let payload = RequestPayloadBuilder::new(&registry, "com.example.Echo", "echo")
//!     .module("http://localhost/app/", "ABCDEF")
//!     .param(TypeRef::class(well_known::STRING), Value::string("hi"))
//!     .build()
//!     .unwrap();
//! assert!(payload.starts_with("7|0|"));
//! ```

use crate::core::stream::StreamFlags;
use crate::core::types::{well_known, TypeRef, TypeRegistry};
use crate::core::value::Value;
use crate::core::writer::SerializationStreamWriter;
use crate::error::{Result, RpcError};
use crate::policy::SerializationPolicy;
use std::sync::Arc;

struct Param {
    wire_type: Option<String>,
    declared: TypeRef,
    value: Value,
}

/// Builds request payloads the way a client would send them.
///
/// Nothing is validated against a server policy, so requests a server must
/// refuse can be produced as easily as valid ones.
pub struct RequestPayloadBuilder<'a> {
    registry: &'a TypeRegistry,
    naming_policy: Option<Arc<dyn SerializationPolicy>>,
    flags: StreamFlags,
    module_base_url: Option<String>,
    strong_name: Option<String>,
    rpc_token: Option<Value>,
    interface: String,
    method: String,
    params: Vec<Param>,
}

impl<'a> RequestPayloadBuilder<'a> {
    pub fn new(registry: &'a TypeRegistry, interface: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            registry,
            naming_policy: None,
            flags: StreamFlags::DEFAULT,
            module_base_url: None,
            strong_name: None,
            rpc_token: None,
            interface: interface.into(),
            method: method.into(),
            params: Vec::new(),
        }
    }

    pub fn module(mut self, module_base_url: impl Into<String>, strong_name: impl Into<String>) -> Self {
        self.module_base_url = Some(module_base_url.into());
        self.strong_name = Some(strong_name.into());
        self
    }

    /// Policy supplying type ids and enhanced-class field lists
    pub fn naming_policy(mut self, policy: Arc<dyn SerializationPolicy>) -> Self {
        self.naming_policy = Some(policy);
        self
    }

    /// Send type ids instead of class names; requires a naming policy
    pub fn elide_type_names(mut self) -> Self {
        self.flags.insert(StreamFlags::ELIDE_TYPE_NAMES);
        self
    }

    pub fn rpc_token(mut self, token: Value) -> Self {
        self.flags.insert(StreamFlags::RPC_TOKEN_INCLUDED);
        self.rpc_token = Some(token);
        self
    }

    /// Add a parameter whose wire type name is derived from `declared`
    pub fn param(mut self, declared: TypeRef, value: Value) -> Self {
        self.params.push(Param {
            wire_type: None,
            declared,
            value,
        });
        self
    }

    /// Add a parameter announced under an explicit wire type name
    pub fn param_with_wire_type(mut self, wire_type: impl Into<String>, declared: TypeRef, value: Value) -> Self {
        self.params.push(Param {
            wire_type: Some(wire_type.into()),
            declared,
            value,
        });
        self
    }

    /// # Errors
    /// `Serialization` when a value does not fit its declared type or an
    /// object's type id is missing while names are elided.
    pub fn build(self) -> Result<String> {
        let mut writer = SerializationStreamWriter::for_client(self.registry, self.flags);
        if let Some(policy) = self.naming_policy {
            writer = writer.with_naming_policy(policy);
        }

        writer.write_optional_string(self.module_base_url.as_deref());
        writer.write_optional_string(self.strong_name.as_deref());

        if let Some(token) = &self.rpc_token {
            writer.serialize_value(token, &TypeRef::class(well_known::RPC_TOKEN))?;
        }

        let interface = header_type_name(&writer, &self.interface);
        writer.write_string(&interface);
        writer.write_string(&self.method);

        let count = i32::try_from(self.params.len())
            .map_err(|_| RpcError::Serialization("Too many parameters".to_string()))?;
        writer.write_int(count);

        for param in &self.params {
            let wire_type = match &param.wire_type {
                Some(explicit) => explicit.clone(),
                None => header_type_name(&writer, &param.declared.binary_name()),
            };
            writer.write_string(&wire_type);
        }
        for param in &self.params {
            writer.serialize_value(&param.value, &param.declared)?;
        }

        Ok(writer.to_payload())
    }
}

/// Interface and parameter type names fall back to the plain name when the
/// policy has no id for them; the server passes unknown ids through.
fn header_type_name(writer: &SerializationStreamWriter<'_>, name: &str) -> String {
    writer
        .type_name_for_wire(name)
        .unwrap_or_else(|_| name.to_string())
}
