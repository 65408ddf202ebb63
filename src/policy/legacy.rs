//! Marker-interface policy used when no policy file is available.
//!
//! A class is instantiable when it implements `IsSerializable` or has a
//! custom serializer. `java.io.Serializable` classes only contribute fields.

use crate::core::types::{well_known, TypeRef, TypeRegistry};
use crate::error::{Result, RpcError};
use crate::policy::SerializationPolicy;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct LegacySerializationPolicy {
    registry: Arc<TypeRegistry>,
}

impl LegacySerializationPolicy {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    fn is_instantiable(&self, ty: &TypeRef) -> bool {
        match ty {
            TypeRef::Primitive(_) => true,
            TypeRef::Array(component) => self.is_instantiable(component),
            TypeRef::Class(name) => {
                self.registry.is_subtype(name, well_known::IS_SERIALIZABLE)
                    || self
                        .registry
                        .get(name)
                        .is_some_and(|descriptor| descriptor.has_custom_serializer())
            }
            TypeRef::Void => false,
        }
    }

    fn is_field_serializable(&self, ty: &TypeRef) -> bool {
        if self.is_instantiable(ty) {
            return true;
        }
        match ty {
            TypeRef::Class(name) => {
                name != well_known::OBJECT
                    && self.registry.is_subtype(name, well_known::SERIALIZABLE)
            }
            _ => false,
        }
    }
}

impl SerializationPolicy for LegacySerializationPolicy {
    fn should_serialize_fields(&self, ty: &TypeRef) -> bool {
        self.is_field_serializable(ty)
    }

    fn should_deserialize_fields(&self, ty: &TypeRef) -> bool {
        self.is_field_serializable(ty)
    }

    fn validate_serialize(&self, ty: &TypeRef) -> Result<()> {
        if self.is_instantiable(ty) {
            return Ok(());
        }
        Err(RpcError::PolicyViolation(format!(
            "Type '{ty}' was not assignable to '{}' and did not have a custom field serializer. For security purposes, this type will not be serialized.",
            well_known::IS_SERIALIZABLE
        )))
    }

    fn validate_deserialize(&self, ty: &TypeRef) -> Result<()> {
        if self.is_instantiable(ty) {
            return Ok(());
        }
        Err(RpcError::PolicyViolation(format!(
            "Type '{ty}' was not assignable to '{}' and did not have a custom field serializer. For security purposes, this type will not be deserialized.",
            well_known::IS_SERIALIZABLE
        )))
    }

    fn client_field_names_for_enhanced_class(&self, _class_name: &str) -> Option<&HashSet<String>> {
        None
    }
}
