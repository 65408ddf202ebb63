//! # Server Stream Reader
//!
//! Reads a request token stream while enforcing the serialization policy.
//!
//! ## Object Encoding
//! - `0`: null
//! - negative `n`: back reference to the `-n`th object read so far
//! - positive `n`: string-table index of the instance type name, followed by
//!   the instance's own tokens
//!
//! Before any object is built the reader checks that its wire type is
//! assignable to the declared generic type, then asks the policy whether the
//! type may be deserialized. A `List<Foo>` argument whose elements are `Bar`
//! is rejected at the first `Bar`.
//!
//! Every value produced counts against a per-request budget. A back
//! reference copies the object it names, so it is charged that object's
//! full size before the copy is made.

use crate::core::stream::{
    strip_type_signature, unescape_string, StreamFlags, RPC_SEPARATOR_CHAR,
    SERIALIZATION_STREAM_MIN_VERSION, SERIALIZATION_STREAM_VERSION,
};
use crate::core::types::{
    well_known, Primitive, SerializerKind, TypeBindings, TypeDescriptor, TypeRef, TypeRegistry,
    TypeSignature,
};
use crate::core::value::{ObjectValue, Value};
use crate::core::MAX_OBJECT_DEPTH;
use crate::error::constants::{ERR_NULL_STRING, ERR_UNEXPECTED_END};
use crate::error::{Result, RpcError};
use crate::policy::{SerializationPolicy, SerializationPolicyProvider};
use std::str::FromStr;
use std::sync::Arc;
use tracing::trace;

pub struct ServerSerializationStreamReader<'a> {
    registry: &'a TypeRegistry,
    policy: Arc<dyn SerializationPolicy>,
    flags: StreamFlags,
    version: i32,
    strings: Vec<String>,
    tokens: Vec<&'a str>,
    position: usize,
    /// Objects read so far with their value counts, indexed by back
    /// reference. `None` while the object is still being read.
    seen: Vec<Option<(Value, usize)>>,
    depth: usize,
    decoded_values: usize,
    max_decoded_values: usize,
}

impl<'a> ServerSerializationStreamReader<'a> {
    /// Parse the stream header, the string table and the module/strong-name
    /// pair, then select the serialization policy.
    ///
    /// The provider's policy replaces `default_policy` when a provider is given.
    ///
    /// # Errors
    /// - `IncompatibleRequest` for an unsupported version or unknown flag bits
    /// - `Serialization` for a truncated or malformed header or string table
    /// - whatever the provider returns when it cannot produce a policy
    pub fn prepare(
        encoded: &'a str,
        registry: &'a TypeRegistry,
        provider: Option<&dyn SerializationPolicyProvider>,
        default_policy: Arc<dyn SerializationPolicy>,
    ) -> Result<Self> {
        Self::prepare_bounded(encoded, registry, provider, default_policy, usize::MAX)
    }

    /// [`Self::prepare`] with a cap on the string table size
    pub fn prepare_bounded(
        encoded: &'a str,
        registry: &'a TypeRegistry,
        provider: Option<&dyn SerializationPolicyProvider>,
        default_policy: Arc<dyn SerializationPolicy>,
        max_strings: usize,
    ) -> Result<Self> {
        let mut tokens: Vec<&'a str> = encoded.split(RPC_SEPARATOR_CHAR).collect();
        if tokens.last() == Some(&"") {
            tokens.pop();
        }

        let mut reader = Self {
            registry,
            policy: default_policy,
            flags: StreamFlags::NONE,
            version: 0,
            strings: Vec::new(),
            tokens,
            position: 0,
            seen: Vec::new(),
            depth: 0,
            decoded_values: 0,
            max_decoded_values: usize::MAX,
        };

        reader.version = reader.read_int()?;
        if !(SERIALIZATION_STREAM_MIN_VERSION..=SERIALIZATION_STREAM_VERSION)
            .contains(&reader.version)
        {
            return Err(RpcError::IncompatibleRequest(format!(
                "Expecting version between {} and {} from client, got {}.",
                SERIALIZATION_STREAM_MIN_VERSION, SERIALIZATION_STREAM_VERSION, reader.version
            )));
        }

        let raw_flags = reader.read_int()?;
        reader.flags = u32::try_from(raw_flags)
            .ok()
            .and_then(StreamFlags::from_bits)
            .ok_or_else(|| {
                RpcError::IncompatibleRequest(format!(
                    "Got an unknown flag from client: {raw_flags}"
                ))
            })?;

        reader.read_string_table(max_strings)?;

        let module_base_url = reader.read_optional_string()?;
        let strong_name = reader.read_optional_string()?;
        if let Some(provider) = provider {
            reader.policy = provider.serialization_policy(
                module_base_url.as_deref().unwrap_or_default(),
                strong_name.as_deref().unwrap_or_default(),
            )?;
        }

        trace!(
            version = reader.version,
            flags = reader.flags.bits(),
            strings = reader.strings.len(),
            "Prepared request stream"
        );
        Ok(reader)
    }

    fn read_string_table(&mut self, max_strings: usize) -> Result<()> {
        let count = self.read_int()?;
        let count = usize::try_from(count).map_err(|_| {
            RpcError::Serialization(format!("Invalid string table size {count}"))
        })?;
        if count > max_strings {
            return Err(RpcError::Serialization(format!(
                "String table size {count} exceeds the limit of {max_strings}"
            )));
        }
        if count > self.remaining_tokens() {
            return Err(RpcError::Serialization(format!(
                "String table size {count} exceeds the remaining stream"
            )));
        }
        self.strings.reserve(count);
        for _ in 0..count {
            let raw = self.next_token()?;
            self.strings.push(unescape_string(raw)?);
        }
        Ok(())
    }

    /// Cap on the number of values, back-reference copies included, that
    /// may be produced from this stream
    pub fn with_max_decoded_values(mut self, max: usize) -> Self {
        self.max_decoded_values = max;
        self
    }

    /// Values produced so far
    pub fn decoded_values(&self) -> usize {
        self.decoded_values
    }

    fn charge(&mut self, values: usize) -> Result<()> {
        let total = self.decoded_values.saturating_add(values);
        if total > self.max_decoded_values {
            return Err(RpcError::Serialization(format!(
                "Request decodes to more than {} values",
                self.max_decoded_values
            )));
        }
        self.decoded_values = total;
        Ok(())
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn flags(&self) -> StreamFlags {
        self.flags
    }

    pub fn has_flags(&self, flags: StreamFlags) -> bool {
        self.flags.contains(flags)
    }

    /// Tokens not yet consumed
    pub fn remaining_tokens(&self) -> usize {
        self.tokens.len().saturating_sub(self.position)
    }

    pub fn serialization_policy(&self) -> Arc<dyn SerializationPolicy> {
        Arc::clone(&self.policy)
    }

    fn next_token(&mut self) -> Result<&'a str> {
        let token = self
            .tokens
            .get(self.position)
            .copied()
            .ok_or_else(|| RpcError::Serialization(ERR_UNEXPECTED_END.to_string()))?;
        self.position += 1;
        Ok(token)
    }

    fn parse_token<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let token = self.next_token()?;
        token.parse::<T>().map_err(|_| {
            RpcError::Serialization(format!("Expected a {what} token but found '{token}'"))
        })
    }

    pub fn read_int(&mut self) -> Result<i32> {
        self.parse_token("int")
    }

    pub fn read_long(&mut self) -> Result<i64> {
        self.parse_token("long")
    }

    pub fn read_boolean(&mut self) -> Result<bool> {
        match self.next_token()? {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(RpcError::Serialization(format!(
                "Expected a boolean token but found '{other}'"
            ))),
        }
    }

    /// A string-table reference that may be null
    pub fn read_optional_string(&mut self) -> Result<Option<String>> {
        let index = self.read_int()?;
        if index == 0 {
            return Ok(None);
        }
        self.string_at(index).map(|s| Some(s.to_string()))
    }

    /// A non-null string-table reference
    pub fn read_string(&mut self) -> Result<String> {
        self.read_optional_string()?
            .ok_or_else(|| RpcError::Serialization(ERR_NULL_STRING.to_string()))
    }

    fn string_at(&self, index: i32) -> Result<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| self.strings.get(i))
            .map(String::as_str)
            .ok_or_else(|| {
                RpcError::Serialization(format!("String table index {index} is out of range"))
            })
    }

    /// Read a length prefix; every element takes at least one token, so a
    /// length beyond the remaining stream is rejected before allocating.
    fn read_length(&mut self) -> Result<usize> {
        let length = self.read_int()?;
        usize::try_from(length)
            .ok()
            .filter(|n| *n <= self.remaining_tokens())
            .ok_or_else(|| {
                RpcError::Serialization(format!(
                    "Invalid length {length} with {} tokens remaining",
                    self.remaining_tokens()
                ))
            })
    }

    /// Map a type name from an object header to a class name.
    fn instance_class_name(&self, type_signature: &str) -> Result<String> {
        if !self.flags.contains(StreamFlags::ELIDE_TYPE_NAMES) {
            return Ok(strip_type_signature(type_signature).to_string());
        }
        let obfuscator = self.policy.type_name_obfuscator().ok_or_else(|| {
            RpcError::Serialization(format!(
                "Type id '{type_signature}' received but the serialization policy has no type ids"
            ))
        })?;
        obfuscator
            .class_name_for_type_id(type_signature)
            .map(str::to_string)
            .ok_or_else(|| {
                RpcError::Serialization(format!("Unknown type id '{type_signature}'"))
            })
    }

    /// Read one value declared as `ty` (erased) with generic type `generic`.
    ///
    /// Strings and primitives declared directly are read inline; everything
    /// else is read as an object.
    ///
    /// # Errors
    /// - `Serialization` for malformed tokens or a spoofed instance type
    /// - `PolicyViolation` when the policy refuses the instance type
    /// - `ClassNotFound` when the instance type is not registered
    pub fn deserialize_value(
        &mut self,
        ty: &TypeRef,
        generic: &TypeSignature,
        bindings: &TypeBindings,
    ) -> Result<Value> {
        match ty {
            TypeRef::Void => Err(RpcError::Serialization(
                "Cannot deserialize a value of type void".to_string(),
            )),
            TypeRef::Primitive(primitive) => {
                self.charge(1)?;
                self.read_primitive(*primitive)
            }
            TypeRef::Class(name) if name == well_known::STRING => {
                self.charge(1)?;
                Ok(self
                    .read_optional_string()?
                    .map_or(Value::Null, Value::String))
            }
            _ => {
                let expected = generic.resolve(bindings);
                self.read_object(&expected)
            }
        }
    }

    fn read_primitive(&mut self, primitive: Primitive) -> Result<Value> {
        Ok(match primitive {
            Primitive::Boolean => Value::Boolean(self.read_boolean()?),
            Primitive::Byte => Value::Byte(self.parse_token("byte")?),
            Primitive::Char => Value::Char(self.parse_token("char")?),
            Primitive::Double => Value::Double(self.parse_token("double")?),
            Primitive::Float => Value::Float(self.parse_token("float")?),
            Primitive::Int => Value::Int(self.read_int()?),
            Primitive::Long => Value::Long(self.read_long()?),
            Primitive::Short => Value::Short(self.parse_token("short")?),
        })
    }

    fn read_object(&mut self, expected: &TypeSignature) -> Result<Value> {
        if self.depth >= MAX_OBJECT_DEPTH {
            return Err(RpcError::Serialization(format!(
                "Object nesting exceeds {MAX_OBJECT_DEPTH} levels"
            )));
        }
        self.depth += 1;
        let result = self.read_object_inner(expected);
        self.depth -= 1;
        result
    }

    fn read_object_inner(&mut self, expected: &TypeSignature) -> Result<Value> {
        let token = self.read_int()?;
        if token < 0 {
            return self.back_reference(token);
        }
        self.charge(1)?;
        if token == 0 {
            return Ok(Value::Null);
        }
        let first_value = self.decoded_values - 1;

        let type_signature = self.string_at(token)?.to_string();
        let class_name = self.instance_class_name(&type_signature)?;
        let instance_type = self.registry.resolve(&class_name)?;

        let declared = expected.erasure();
        if !self.registry.is_assignable(&declared, &instance_type) {
            return Err(RpcError::Serialization(format!(
                "Attempt to deserialize an object of type '{instance_type}' where an object of type '{expected}' is expected"
            )));
        }
        self.policy.validate_deserialize(&instance_type)?;

        let slot = self.seen.len();
        self.seen.push(None);
        let value = match &instance_type {
            TypeRef::Array(component) => self.read_array(component, expected)?,
            TypeRef::Class(name) => self.read_instance(name, expected)?,
            other => {
                return Err(RpcError::Serialization(format!(
                    "Type '{other}' cannot be sent as an object"
                )))
            }
        };
        let size = self.decoded_values - first_value;
        self.seen[slot] = Some((value.clone(), size));
        Ok(value)
    }

    fn back_reference(&mut self, token: i32) -> Result<Value> {
        let index = usize::try_from(-i64::from(token) - 1)
            .map_err(|_| RpcError::Serialization(format!("Invalid back reference {token}")))?;
        let size = match self.seen.get(index) {
            Some(Some((_, size))) => *size,
            Some(None) => {
                return Err(RpcError::Serialization(format!(
                    "Back reference {token} points at an object still being read"
                )))
            }
            None => {
                return Err(RpcError::Serialization(format!(
                    "Back reference {token} is out of range"
                )))
            }
        };
        self.charge(size)?;
        self.seen
            .get(index)
            .and_then(Option::as_ref)
            .map(|(value, _)| value.clone())
            .ok_or_else(|| RpcError::Serialization(format!("Invalid back reference {token}")))
    }

    fn read_array(&mut self, component: &TypeRef, expected: &TypeSignature) -> Result<Value> {
        let length = self.read_length()?;
        let component_signature = match expected {
            TypeSignature::Array(declared) if declared.erasure() == *component => {
                (**declared).clone()
            }
            _ => TypeSignature::from(component.clone()),
        };
        let bindings = TypeBindings::new();
        let mut elements = Vec::with_capacity(length);
        for _ in 0..length {
            elements.push(self.deserialize_value(component, &component_signature, &bindings)?);
        }
        Ok(Value::Array {
            component: component.clone(),
            elements,
        })
    }

    fn read_instance(&mut self, class_name: &str, expected: &TypeSignature) -> Result<Value> {
        let registry = self.registry;
        let descriptor = registry
            .get(class_name)
            .ok_or_else(|| RpcError::ClassNotFound(class_name.to_string()))?;
        if descriptor.is_interface() || descriptor.is_abstract() {
            return Err(RpcError::Serialization(format!(
                "Type '{class_name}' cannot be instantiated"
            )));
        }

        let bindings = class_bindings(descriptor, expected);
        match descriptor.serializer_kind() {
            SerializerKind::Text => self.read_string().map(Value::String),
            SerializerKind::Boxed(primitive) => self.read_primitive(primitive),
            SerializerKind::Sequence => {
                let element = type_argument(descriptor, &bindings, 0);
                let length = self.read_length()?;
                let mut elements = Vec::with_capacity(length);
                for _ in 0..length {
                    elements.push(self.read_object(&element)?);
                }
                Ok(Value::Sequence {
                    class: class_name.to_string(),
                    elements,
                })
            }
            SerializerKind::Mapping => {
                let key = type_argument(descriptor, &bindings, 0);
                let value = type_argument(descriptor, &bindings, 1);
                let length = self.read_length()?;
                let mut entries = Vec::with_capacity(length);
                for _ in 0..length {
                    let k = self.read_object(&key)?;
                    let v = self.read_object(&value)?;
                    entries.push((k, v));
                }
                Ok(Value::Mapping {
                    class: class_name.to_string(),
                    entries,
                })
            }
            SerializerKind::Fields => self.read_fields(descriptor, bindings).map(Value::Object),
        }
    }

    /// Read the instance's own fields, then those of each superclass the
    /// policy allows, stopping at the first one it does not.
    fn read_fields(
        &mut self,
        descriptor: &'a TypeDescriptor,
        mut bindings: TypeBindings,
    ) -> Result<ObjectValue> {
        let registry = self.registry;
        let policy = Arc::clone(&self.policy);
        let mut object = ObjectValue::new(descriptor.name());
        let mut current = Some(descriptor);
        let mut is_instance_class = true;

        while let Some(class) = current {
            if !is_instance_class
                && !policy.should_deserialize_fields(&TypeRef::class(class.name()))
            {
                break;
            }
            let client_fields = policy.client_field_names_for_enhanced_class(class.name());
            for field in class.fields() {
                if client_fields.is_some_and(|visible| !visible.contains(&field.name)) {
                    continue;
                }
                let value =
                    self.deserialize_value(&field.signature.erasure(), &field.signature, &bindings)?;
                object.fields.insert(field.name.clone(), value);
            }
            bindings = TypeBindings::new();
            current = class.superclass().and_then(|name| registry.get(name));
            is_instance_class = false;
        }
        Ok(object)
    }
}

/// Bind a generic class's type parameters from the declared type arguments
fn class_bindings(descriptor: &TypeDescriptor, expected: &TypeSignature) -> TypeBindings {
    let args = expected.type_args();
    if args.len() != descriptor.type_params().len() {
        return TypeBindings::new();
    }
    descriptor
        .type_params()
        .iter()
        .cloned()
        .zip(args.iter().cloned())
        .collect()
}

fn type_argument(descriptor: &TypeDescriptor, bindings: &TypeBindings, index: usize) -> TypeSignature {
    descriptor
        .type_params()
        .get(index)
        .and_then(|name| bindings.get(name))
        .cloned()
        .unwrap_or_else(TypeSignature::object)
}
