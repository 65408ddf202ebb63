//! # Stream Writer
//!
//! Produces token streams in the format read by
//! [`ServerSerializationStreamReader`](crate::core::reader::ServerSerializationStreamReader).
//!
//! A server-side writer validates every class it writes against the
//! serialization policy. A client-side writer ([`SerializationStreamWriter::for_client`])
//! only uses a policy for type ids and enhanced-class field lists, which lets
//! tests and tools produce requests that a server policy will refuse.

use crate::core::stream::{
    escape_string, StreamFlags, RPC_SEPARATOR_CHAR, SERIALIZATION_STREAM_VERSION,
};
use crate::core::types::{well_known, Primitive, SerializerKind, TypeRef, TypeRegistry};
use crate::core::value::{ObjectValue, Value};
use crate::core::MAX_OBJECT_DEPTH;
use crate::error::{Result, RpcError};
use crate::policy::SerializationPolicy;
use std::collections::HashMap;
use std::sync::Arc;

pub struct SerializationStreamWriter<'a> {
    registry: &'a TypeRegistry,
    policy: Option<Arc<dyn SerializationPolicy>>,
    enforce_policy: bool,
    flags: StreamFlags,
    strings: Vec<String>,
    string_ids: HashMap<String, usize>,
    tokens: Vec<String>,
    depth: usize,
}

impl<'a> SerializationStreamWriter<'a> {
    /// Server-side writer; every class written must pass `policy`
    pub fn new(
        registry: &'a TypeRegistry,
        policy: Arc<dyn SerializationPolicy>,
        flags: StreamFlags,
    ) -> Self {
        Self {
            registry,
            policy: Some(policy),
            enforce_policy: true,
            flags,
            strings: Vec::new(),
            string_ids: HashMap::new(),
            tokens: Vec::new(),
            depth: 0,
        }
    }

    /// Client-side writer; no policy enforcement
    pub fn for_client(registry: &'a TypeRegistry, flags: StreamFlags) -> Self {
        Self {
            registry,
            policy: None,
            enforce_policy: false,
            flags,
            strings: Vec::new(),
            string_ids: HashMap::new(),
            tokens: Vec::new(),
            depth: 0,
        }
    }

    /// Policy consulted for type ids and client field lists only
    pub fn with_naming_policy(mut self, policy: Arc<dyn SerializationPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn flags(&self) -> StreamFlags {
        self.flags
    }

    pub fn write_int(&mut self, value: i32) {
        self.tokens.push(value.to_string());
    }

    /// Write a string-table reference, interning `value`
    pub fn write_string(&mut self, value: &str) {
        let index = match self.string_ids.get(value) {
            Some(index) => *index,
            None => {
                self.strings.push(value.to_string());
                let index = self.strings.len();
                self.string_ids.insert(value.to_string(), index);
                index
            }
        };
        self.tokens.push(index.to_string());
    }

    pub fn write_optional_string(&mut self, value: Option<&str>) {
        match value {
            Some(s) => self.write_string(s),
            None => self.write_int(0),
        }
    }

    /// Name under which `binary_name` goes on the wire: the binary name
    /// itself, or the policy's type id when type names are elided.
    ///
    /// # Errors
    /// `Serialization` when names are elided and no type id is known
    pub fn type_name_for_wire(&self, binary_name: &str) -> Result<String> {
        if !self.flags.contains(StreamFlags::ELIDE_TYPE_NAMES) {
            return Ok(binary_name.to_string());
        }
        self.policy
            .as_ref()
            .and_then(|policy| policy.type_name_obfuscator())
            .and_then(|obfuscator| obfuscator.type_id_for_class(binary_name))
            .map(str::to_string)
            .ok_or_else(|| {
                RpcError::Serialization(format!(
                    "Type '{binary_name}' has no type id in the serialization policy"
                ))
            })
    }

    /// Write `value` where a value of type `declared` is expected.
    ///
    /// # Errors
    /// - `PolicyViolation` when a server-side writer meets a class the policy refuses
    /// - `Serialization` when the value does not fit the declared type
    pub fn serialize_value(&mut self, value: &Value, declared: &TypeRef) -> Result<()> {
        match declared {
            TypeRef::Void => Err(RpcError::Serialization(
                "Cannot serialize a value of type void".to_string(),
            )),
            TypeRef::Primitive(primitive) => self.write_primitive(*primitive, value),
            TypeRef::Class(name) if name == well_known::STRING => match value {
                Value::Null => {
                    self.write_int(0);
                    Ok(())
                }
                Value::String(s) => {
                    self.write_string(s);
                    Ok(())
                }
                other => Err(RpcError::Serialization(format!(
                    "Expected a string but found a value of type '{}'",
                    other.type_name()
                ))),
            },
            _ => self.write_object(value),
        }
    }

    fn write_primitive(&mut self, primitive: Primitive, value: &Value) -> Result<()> {
        let token = match (primitive, value) {
            (Primitive::Boolean, Value::Boolean(v)) => u8::from(*v).to_string(),
            (Primitive::Byte, Value::Byte(v)) => v.to_string(),
            (Primitive::Char, Value::Char(v)) => v.to_string(),
            (Primitive::Double, Value::Double(v)) => v.to_string(),
            (Primitive::Float, Value::Float(v)) => v.to_string(),
            (Primitive::Int, Value::Int(v)) => v.to_string(),
            (Primitive::Long, Value::Long(v)) => v.to_string(),
            (Primitive::Short, Value::Short(v)) => v.to_string(),
            (primitive, other) => {
                return Err(RpcError::Serialization(format!(
                    "Value of type '{}' cannot be written as {}",
                    other.type_name(),
                    primitive.source_name()
                )))
            }
        };
        self.tokens.push(token);
        Ok(())
    }

    fn write_object(&mut self, value: &Value) -> Result<()> {
        let Some(runtime_type) = value.runtime_type() else {
            self.write_int(0);
            return Ok(());
        };
        if self.depth >= MAX_OBJECT_DEPTH {
            return Err(RpcError::Serialization(format!(
                "Object nesting exceeds {MAX_OBJECT_DEPTH} levels"
            )));
        }
        self.depth += 1;
        let result = self.write_object_inner(value, &runtime_type);
        self.depth -= 1;
        result
    }

    fn write_object_inner(&mut self, value: &Value, runtime_type: &TypeRef) -> Result<()> {
        if self.enforce_policy {
            if let Some(policy) = &self.policy {
                policy.validate_serialize(runtime_type)?;
            }
        }
        let serializer = self.serializer_for(runtime_type)?;
        let wire_name = self.type_name_for_wire(&runtime_type.binary_name())?;
        self.write_string(&wire_name);

        match (value, serializer) {
            (Value::Array { component, elements }, None) => {
                self.write_length(elements.len())?;
                for element in elements {
                    self.serialize_value(element, component)?;
                }
                Ok(())
            }
            (Value::String(s), Some(SerializerKind::Text)) => {
                self.write_string(s);
                Ok(())
            }
            (scalar, Some(SerializerKind::Boxed(primitive))) => {
                self.write_primitive(primitive, scalar)
            }
            (Value::Sequence { elements, .. }, Some(SerializerKind::Sequence)) => {
                self.write_length(elements.len())?;
                for element in elements {
                    self.write_object(element)?;
                }
                Ok(())
            }
            (Value::Mapping { entries, .. }, Some(SerializerKind::Mapping)) => {
                self.write_length(entries.len())?;
                for (key, entry) in entries {
                    self.write_object(key)?;
                    self.write_object(entry)?;
                }
                Ok(())
            }
            (Value::Object(object), Some(SerializerKind::Fields)) => self.write_fields(object),
            (other, _) => Err(RpcError::Serialization(format!(
                "Value does not match the serialized form of '{}'",
                other.type_name()
            ))),
        }
    }

    /// Serializer of a class; `None` for arrays
    fn serializer_for(&self, ty: &TypeRef) -> Result<Option<SerializerKind>> {
        match ty {
            TypeRef::Array(_) => Ok(None),
            TypeRef::Class(name) => self
                .registry
                .get(name)
                .map(|descriptor| Some(descriptor.serializer_kind()))
                .ok_or_else(|| RpcError::ClassNotFound(name.clone())),
            other => Err(RpcError::Serialization(format!(
                "Type '{other}' cannot be sent as an object"
            ))),
        }
    }

    fn write_length(&mut self, length: usize) -> Result<()> {
        let length = i32::try_from(length).map_err(|_| {
            RpcError::Serialization(format!("Length {length} does not fit the stream"))
        })?;
        self.write_int(length);
        Ok(())
    }

    fn write_fields(&mut self, object: &ObjectValue) -> Result<()> {
        let registry = self.registry;
        let policy = self.policy.clone();
        let mut current = registry.get(&object.class);
        let mut is_instance_class = true;

        while let Some(class) = current {
            if !is_instance_class {
                let included = policy
                    .as_ref()
                    .map_or(true, |p| p.should_serialize_fields(&TypeRef::class(class.name())));
                if !included {
                    break;
                }
            }
            let client_fields = policy
                .as_ref()
                .and_then(|p| p.client_field_names_for_enhanced_class(class.name()));
            for field in class.fields() {
                if client_fields.is_some_and(|visible| !visible.contains(&field.name)) {
                    continue;
                }
                let declared = field.signature.erasure();
                let default = Value::default_for(&declared);
                let value = object.field(&field.name).unwrap_or(&default);
                self.serialize_value(value, &declared)?;
            }
            current = class.superclass().and_then(|name| registry.get(name));
            is_instance_class = false;
        }
        Ok(())
    }

    /// Render the finished stream: header, string table, then tokens
    pub fn to_payload(&self) -> String {
        let mut out = format!(
            "{}{sep}{}{sep}{}{sep}",
            SERIALIZATION_STREAM_VERSION,
            self.flags.bits(),
            self.strings.len(),
            sep = RPC_SEPARATOR_CHAR
        );
        for s in &self.strings {
            out.push_str(&escape_string(s));
            out.push(RPC_SEPARATOR_CHAR);
        }
        for token in &self.tokens {
            out.push_str(token);
            out.push(RPC_SEPARATOR_CHAR);
        }
        out
    }
}
