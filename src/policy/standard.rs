//! Whitelist-based serialization policy.

use crate::core::types::TypeRef;
use crate::error::{Result, RpcError};
use crate::policy::{SerializationPolicy, TypeNameObfuscator};
use std::collections::{HashMap, HashSet};

/// One class line of a policy file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyEntry {
    pub class_name: String,
    pub field_serializable: bool,
    pub instantiable_serialize: bool,
    pub field_deserializable: bool,
    pub instantiable_deserialize: bool,
    pub type_id: String,
    /// `None` for entries read from the two-column form
    pub signature: Option<String>,
}

impl PolicyEntry {
    /// Entry in the two-column form: field serializable both ways, with
    /// `instantiable` deciding instantiation both ways.
    pub fn legacy(class_name: impl Into<String>, instantiable: bool) -> Self {
        let class_name = class_name.into();
        Self {
            type_id: class_name.clone(),
            class_name,
            field_serializable: true,
            instantiable_serialize: instantiable,
            field_deserializable: true,
            instantiable_deserialize: instantiable,
            signature: None,
        }
    }
}

/// Serialization policy built from whitelists.
///
/// The maps hold `class -> instantiable` for every class whose fields may be
/// exchanged in that direction. A class absent from a map is neither field
/// serializable nor instantiable in that direction.
#[derive(Debug, Clone, Default)]
pub struct StandardSerializationPolicy {
    serialization_whitelist: HashMap<String, bool>,
    deserialization_whitelist: HashMap<String, bool>,
    type_ids: HashMap<String, String>,
    classes_by_type_id: HashMap<String, String>,
    client_fields: HashMap<String, HashSet<String>>,
    entries: Vec<PolicyEntry>,
    client_field_lines: Vec<(String, Vec<String>)>,
}

impl StandardSerializationPolicy {
    /// Build from raw maps
    pub fn new(
        serialization_whitelist: HashMap<String, bool>,
        deserialization_whitelist: HashMap<String, bool>,
        type_ids: HashMap<String, String>,
        client_fields: HashMap<String, HashSet<String>>,
    ) -> Self {
        let classes_by_type_id = type_ids
            .iter()
            .map(|(class, id)| (id.clone(), class.clone()))
            .collect();
        Self {
            serialization_whitelist,
            deserialization_whitelist,
            type_ids,
            classes_by_type_id,
            client_fields,
            entries: Vec::new(),
            client_field_lines: Vec::new(),
        }
    }

    /// Build from policy-file lines, keeping them for [`Self::entries`]
    pub fn from_entries(
        entries: Vec<PolicyEntry>,
        client_field_lines: Vec<(String, Vec<String>)>,
    ) -> Self {
        let mut serialization_whitelist = HashMap::new();
        let mut deserialization_whitelist = HashMap::new();
        let mut type_ids = HashMap::new();

        for entry in &entries {
            if entry.field_serializable {
                serialization_whitelist
                    .insert(entry.class_name.clone(), entry.instantiable_serialize);
            }
            if entry.field_deserializable {
                deserialization_whitelist
                    .insert(entry.class_name.clone(), entry.instantiable_deserialize);
            }
            type_ids.insert(entry.class_name.clone(), entry.type_id.clone());
        }

        let client_fields = client_field_lines
            .iter()
            .map(|(class, fields)| (class.clone(), fields.iter().cloned().collect()))
            .collect();

        let mut policy = Self::new(
            serialization_whitelist,
            deserialization_whitelist,
            type_ids,
            client_fields,
        );
        policy.entries = entries;
        policy.client_field_lines = client_field_lines;
        policy
    }

    /// Class lines in load order
    pub fn entries(&self) -> &[PolicyEntry] {
        &self.entries
    }

    /// `@ClientFields` lines in load order
    pub fn client_field_lines(&self) -> &[(String, Vec<String>)] {
        &self.client_field_lines
    }

    pub fn type_id_count(&self) -> usize {
        self.type_ids.len()
    }
}

/// Field-serializable in a direction: primitives always, arrays when their
/// component is, classes when whitelisted.
fn is_field_serializable(ty: &TypeRef, whitelist: &HashMap<String, bool>) -> bool {
    match ty {
        TypeRef::Primitive(_) => true,
        TypeRef::Array(component) => is_field_serializable(component, whitelist),
        TypeRef::Class(name) => whitelist.contains_key(name),
        TypeRef::Void => false,
    }
}

fn is_instantiable(ty: &TypeRef, whitelist: &HashMap<String, bool>) -> bool {
    match ty {
        TypeRef::Primitive(_) => true,
        TypeRef::Array(component) => is_instantiable(component, whitelist),
        TypeRef::Class(name) => whitelist.get(name).copied().unwrap_or(false),
        TypeRef::Void => false,
    }
}

impl SerializationPolicy for StandardSerializationPolicy {
    fn should_serialize_fields(&self, ty: &TypeRef) -> bool {
        is_field_serializable(ty, &self.serialization_whitelist)
    }

    fn should_deserialize_fields(&self, ty: &TypeRef) -> bool {
        is_field_serializable(ty, &self.deserialization_whitelist)
    }

    fn validate_serialize(&self, ty: &TypeRef) -> Result<()> {
        if is_instantiable(ty, &self.serialization_whitelist) {
            return Ok(());
        }
        Err(RpcError::PolicyViolation(format!(
            "Type '{ty}' was not included in the set of types which can be serialized by this SerializationPolicy or its Class object could not be loaded. For security purposes, this type will not be serialized."
        )))
    }

    fn validate_deserialize(&self, ty: &TypeRef) -> Result<()> {
        if is_instantiable(ty, &self.deserialization_whitelist) {
            return Ok(());
        }
        Err(RpcError::PolicyViolation(format!(
            "Type '{ty}' was not included in the set of types which can be deserialized by this SerializationPolicy or its Class object could not be loaded. For security purposes, this type will not be deserialized."
        )))
    }

    fn client_field_names_for_enhanced_class(&self, class_name: &str) -> Option<&HashSet<String>> {
        self.client_fields.get(class_name)
    }

    fn type_name_obfuscator(&self) -> Option<&dyn TypeNameObfuscator> {
        Some(self)
    }
}

impl TypeNameObfuscator for StandardSerializationPolicy {
    fn class_name_for_type_id(&self, type_id: &str) -> Option<&str> {
        self.classes_by_type_id.get(type_id).map(String::as_str)
    }

    fn type_id_for_class(&self, class_name: &str) -> Option<&str> {
        self.type_ids.get(class_name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Primitive;

    fn policy() -> StandardSerializationPolicy {
        StandardSerializationPolicy::from_entries(
            vec![
                PolicyEntry::legacy("com.example.Foo", true),
                PolicyEntry::legacy("com.example.AbstractBase", false),
                PolicyEntry {
                    class_name: "com.example.OutOnly".into(),
                    field_serializable: true,
                    instantiable_serialize: true,
                    field_deserializable: false,
                    instantiable_deserialize: false,
                    type_id: "7".into(),
                    signature: Some("123".into()),
                },
            ],
            Vec::new(),
        )
    }

    #[test]
    fn test_whitelist_decisions() {
        let policy = policy();
        let foo = TypeRef::class("com.example.Foo");
        assert!(policy.validate_deserialize(&foo).is_ok());
        assert!(policy.validate_serialize(&foo).is_ok());

        let base = TypeRef::class("com.example.AbstractBase");
        assert!(policy.should_deserialize_fields(&base));
        assert!(policy.validate_deserialize(&base).is_err());

        let out_only = TypeRef::class("com.example.OutOnly");
        assert!(policy.validate_serialize(&out_only).is_ok());
        assert!(matches!(
            policy.validate_deserialize(&out_only),
            Err(RpcError::PolicyViolation(_))
        ));
    }

    #[test]
    fn test_primitives_and_arrays() {
        let policy = policy();
        let ints = TypeRef::array_of(TypeRef::Primitive(Primitive::Int));
        assert!(policy.validate_deserialize(&ints).is_ok());
        let foos = TypeRef::array_of(TypeRef::class("com.example.Foo"));
        assert!(policy.validate_deserialize(&foos).is_ok());
        let bars = TypeRef::array_of(TypeRef::class("com.example.Bar"));
        assert!(policy.validate_deserialize(&bars).is_err());
    }

    #[test]
    fn test_type_ids_are_bidirectional() {
        let policy = policy();
        let obfuscator = policy.type_name_obfuscator().unwrap();
        assert_eq!(obfuscator.class_name_for_type_id("7"), Some("com.example.OutOnly"));
        assert_eq!(obfuscator.type_id_for_class("com.example.OutOnly"), Some("7"));
        assert_eq!(obfuscator.class_name_for_type_id("nope"), None);
    }
}
