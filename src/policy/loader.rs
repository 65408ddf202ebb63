//! # Policy File Loader
//!
//! Parses and emits serialization policy files.
//!
//! ## Format
//! UTF-8, one entry per line, comma separated, surrounding whitespace ignored:
//! ```text
//! com.example.Foo, true
//! com.example.Bar, true, true, false, false, Bar/12, 12
//! com.example.Service, false, false, false, false, _, 0
//! @ClientFields, com.example.Enhanced, id, name
//! ```
//! Two-column lines whitelist the class in both directions; seven-column
//! lines set each direction independently. A class that is neither field
//! serializable nor field deserializable must carry the service interface
//! type id `_`.
//!
//! Classes the registry cannot resolve are skipped and reported to the
//! caller; structural errors abort the load.

use crate::core::types::TypeRegistry;
use crate::error::{Result, RpcError};
use crate::policy::standard::{PolicyEntry, StandardSerializationPolicy};
use crate::policy::SERVICE_INTERFACE_ID;
use std::io::BufRead;
use tracing::debug;

/// Keyword introducing a client-visible field list
pub const CLIENT_FIELDS_KEYWORD: &str = "@ClientFields";

/// Suffix of every policy file name
pub const SERIALIZATION_POLICY_FILE_SUFFIX: &str = ".gwt.rpc";

const FORMAT_ERROR_MESSAGE: &str = "Expected: className, [true | false], or className, fieldSerializable, instantiableSerialize, fieldDeserializable, instantiableDeserialize, typeId, signature";

/// Policy file name for a module path and strong name
pub fn policy_file_name(path_and_strong_name: &str) -> String {
    format!("{path_and_strong_name}{SERIALIZATION_POLICY_FILE_SUFFIX}")
}

pub struct SerializationPolicyLoader;

impl SerializationPolicyLoader {
    /// Load a policy from an in-memory string.
    ///
    /// # Errors
    /// `RpcError::PolicyParse` on the first malformed line.
    pub fn load_from_str(
        contents: &str,
        registry: &TypeRegistry,
        class_not_found: Option<&mut Vec<RpcError>>,
    ) -> Result<StandardSerializationPolicy> {
        let mut builder = PolicyBuilder::new(registry, class_not_found);
        for (index, line) in contents.lines().enumerate() {
            builder.parse_line(index + 1, line)?;
        }
        Ok(builder.finish())
    }

    /// Load a policy from a reader.
    ///
    /// # Errors
    /// `RpcError::PolicyParse` on the first malformed line, `RpcError::Io`
    /// when reading fails.
    pub fn load_from_reader<R: BufRead>(
        reader: R,
        registry: &TypeRegistry,
        class_not_found: Option<&mut Vec<RpcError>>,
    ) -> Result<StandardSerializationPolicy> {
        let mut builder = PolicyBuilder::new(registry, class_not_found);
        for (index, line) in reader.lines().enumerate() {
            builder.parse_line(index + 1, &line?)?;
        }
        Ok(builder.finish())
    }

    /// Emit `policy` in the file format: class lines sorted by class name,
    /// then `@ClientFields` lines.
    pub fn write_policy(policy: &StandardSerializationPolicy) -> String {
        let mut entries: Vec<&PolicyEntry> = policy.entries().iter().collect();
        entries.sort_by(|a, b| a.class_name.cmp(&b.class_name));

        let mut out = String::new();
        for entry in entries {
            out.push_str(&format_entry(entry));
            out.push('\n');
        }

        let mut client_fields: Vec<&(String, Vec<String>)> =
            policy.client_field_lines().iter().collect();
        client_fields.sort_by(|a, b| a.0.cmp(&b.0));
        for (class_name, fields) in client_fields {
            out.push_str(CLIENT_FIELDS_KEYWORD);
            out.push(',');
            out.push_str(class_name);
            for field in fields {
                out.push(',');
                out.push_str(field);
            }
            out.push('\n');
        }
        out
    }
}

fn format_entry(entry: &PolicyEntry) -> String {
    match &entry.signature {
        None if is_two_column(entry) => {
            format!("{},{}", entry.class_name, entry.instantiable_serialize)
        }
        signature => format!(
            "{},{},{},{},{},{},{}",
            entry.class_name,
            entry.field_serializable,
            entry.instantiable_serialize,
            entry.field_deserializable,
            entry.instantiable_deserialize,
            entry.type_id,
            signature.as_deref().unwrap_or(&entry.type_id)
        ),
    }
}

fn is_two_column(entry: &PolicyEntry) -> bool {
    entry.field_serializable
        && entry.field_deserializable
        && entry.instantiable_serialize == entry.instantiable_deserialize
        && entry.type_id == entry.class_name
}

fn parse_bool(component: &str) -> bool {
    component.eq_ignore_ascii_case("true")
}

struct PolicyBuilder<'a, 'e> {
    registry: &'a TypeRegistry,
    class_not_found: Option<&'e mut Vec<RpcError>>,
    entries: Vec<PolicyEntry>,
    client_fields: Vec<(String, Vec<String>)>,
}

impl<'a, 'e> PolicyBuilder<'a, 'e> {
    fn new(registry: &'a TypeRegistry, class_not_found: Option<&'e mut Vec<RpcError>>) -> Self {
        Self {
            registry,
            class_not_found,
            entries: Vec::new(),
            client_fields: Vec::new(),
        }
    }

    fn parse_line(&mut self, line_number: usize, raw: &str) -> Result<()> {
        let line = raw.trim();
        if line.is_empty() {
            return Ok(());
        }
        let components: Vec<&str> = line.split(',').map(str::trim).collect();

        if components[0] == CLIENT_FIELDS_KEYWORD {
            return self.parse_client_fields(line_number, &components);
        }

        if components.len() != 2 && components.len() != 7 {
            return Err(parse_error(line_number, FORMAT_ERROR_MESSAGE));
        }
        if components.iter().any(|c| c.is_empty()) {
            return Err(parse_error(line_number, FORMAT_ERROR_MESSAGE));
        }

        let class_name = components[0];
        let entry = if components.len() == 2 {
            PolicyEntry::legacy(class_name, parse_bool(components[1]))
        } else {
            let entry = PolicyEntry {
                class_name: class_name.to_string(),
                field_serializable: parse_bool(components[1]),
                instantiable_serialize: parse_bool(components[2]),
                field_deserializable: parse_bool(components[3]),
                instantiable_deserialize: parse_bool(components[4]),
                type_id: components[5].to_string(),
                signature: Some(components[6].to_string()),
            };
            if !entry.field_serializable
                && !entry.field_deserializable
                && entry.type_id != SERVICE_INTERFACE_ID
            {
                return Err(parse_error(
                    line_number,
                    &format!(
                        "Type {class_name} is neither field serializable, field deserializable nor the service interface"
                    ),
                ));
            }
            entry
        };

        if self.registry.resolve(class_name).is_ok() {
            self.entries.push(entry);
        } else {
            self.report_missing(class_name);
        }
        Ok(())
    }

    fn parse_client_fields(&mut self, line_number: usize, components: &[&str]) -> Result<()> {
        let class_name = match components.get(1) {
            Some(name) if !name.is_empty() => *name,
            _ => {
                return Err(parse_error(
                    line_number,
                    "Expected: @ClientFields, className, [fieldName, ...]",
                ))
            }
        };
        if self.registry.resolve(class_name).is_err() {
            self.report_missing(class_name);
            return Ok(());
        }
        let fields = components[2..]
            .iter()
            .filter(|f| !f.is_empty())
            .map(|f| f.to_string())
            .collect();
        self.client_fields.push((class_name.to_string(), fields));
        Ok(())
    }

    fn report_missing(&mut self, class_name: &str) {
        debug!(class = class_name, "Policy names a class missing from the registry");
        if let Some(errors) = self.class_not_found.as_mut() {
            errors.push(RpcError::ClassNotFound(class_name.to_string()));
        }
    }

    fn finish(self) -> StandardSerializationPolicy {
        StandardSerializationPolicy::from_entries(self.entries, self.client_fields)
    }
}

fn parse_error(line: usize, message: &str) -> RpcError {
    RpcError::PolicyParse {
        line,
        message: message.to_string(),
    }
}
