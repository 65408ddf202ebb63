//! # Serialization Policies
//!
//! A serialization policy is the whitelist deciding which classes may be
//! instantiated from, or written to, the wire.
//!
//! ## Components
//! - **Standard**: whitelist loaded from a compiler-emitted policy file
//! - **Legacy**: marker-interface rules used when no policy file is available
//! - **Loader**: policy file parser and emitter
//! - **Cache**: per-module policy cache and the file-backed provider
//!
//! ## Security
//! - Primitives are always admitted; arrays are judged by their component
//! - A class missing from the whitelist is rejected, never guessed

pub mod cache;
pub mod legacy;
pub mod loader;
pub mod standard;

use crate::core::types::TypeRef;
use crate::error::Result;
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

pub use cache::{FilePolicyProvider, SerializationPolicyCache};
pub use legacy::LegacySerializationPolicy;
pub use loader::{policy_file_name, SerializationPolicyLoader};
pub use standard::{PolicyEntry, StandardSerializationPolicy};

/// Type id reserved for the service interface in policy files
pub const SERVICE_INTERFACE_ID: &str = "_";

/// Decides which classes may cross the wire in each direction.
pub trait SerializationPolicy: Send + Sync + Debug {
    /// Whether the fields of `ty` are written when a subclass instance is serialized
    fn should_serialize_fields(&self, ty: &TypeRef) -> bool;

    /// Whether the fields of `ty` are read when a subclass instance is deserialized
    fn should_deserialize_fields(&self, ty: &TypeRef) -> bool;

    /// # Errors
    /// `RpcError::PolicyViolation` when `ty` may not be written
    fn validate_serialize(&self, ty: &TypeRef) -> Result<()>;

    /// # Errors
    /// `RpcError::PolicyViolation` when `ty` may not be instantiated from the wire
    fn validate_deserialize(&self, ty: &TypeRef) -> Result<()>;

    /// Fields the client knows about for an enhanced class; `None` when the
    /// class is not enhanced and all fields are exchanged.
    fn client_field_names_for_enhanced_class(&self, class_name: &str) -> Option<&HashSet<String>>;

    /// Type id mapping, when the policy supports elided type names
    fn type_name_obfuscator(&self) -> Option<&dyn TypeNameObfuscator> {
        None
    }
}

/// Bidirectional mapping between class names and short type ids.
pub trait TypeNameObfuscator: Send + Sync {
    fn class_name_for_type_id(&self, type_id: &str) -> Option<&str>;

    fn type_id_for_class(&self, class_name: &str) -> Option<&str>;
}

/// Looks up the serialization policy for a module/strong-name pair.
pub trait SerializationPolicyProvider: Send + Sync {
    /// # Errors
    /// Implementations return `RpcError::IncompatibleRequest` when no policy
    /// can be produced for the pair.
    fn serialization_policy(
        &self,
        module_base_url: &str,
        strong_name: &str,
    ) -> Result<Arc<dyn SerializationPolicy>>;
}

impl<F> SerializationPolicyProvider for F
where
    F: Fn(&str, &str) -> Result<Arc<dyn SerializationPolicy>> + Send + Sync,
{
    fn serialization_policy(
        &self,
        module_base_url: &str,
        strong_name: &str,
    ) -> Result<Arc<dyn SerializationPolicy>> {
        self(module_base_url, strong_name)
    }
}
