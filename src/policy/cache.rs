//! # Policy Cache and File Provider
//!
//! Policies read from disk are looked up once per (module base URL, strong
//! name) pair and kept for the life of the process. The legacy fallback is
//! shared and never enters the cache.
//!
//! ## File Lookup
//! 1. Take the path component of the module base URL
//! 2. Require it to start with the configured context path and strip it
//! 3. Append the strong name and `.gwt.rpc`, relative to the policy directory
//!
//! Both the URL and the strong name come from the client, so path separators
//! and `..` components in either are refused before touching the filesystem.

use crate::config::PolicyConfig;
use crate::core::types::TypeRegistry;
use crate::error::{Result, RpcError};
use crate::policy::legacy::LegacySerializationPolicy;
use crate::policy::loader::{policy_file_name, SerializationPolicyLoader};
use crate::policy::{SerializationPolicy, SerializationPolicyProvider};
use crate::utils::metrics::global_metrics;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// Policies keyed by module base URL and strong name.
///
/// Entries are immutable once inserted; a poisoned lock is recovered.
#[derive(Debug, Default)]
pub struct SerializationPolicyCache {
    policies: Mutex<HashMap<(String, String), Arc<dyn SerializationPolicy>>>,
}

impl SerializationPolicyCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(module_base_url: &str, strong_name: &str) -> (String, String) {
        (module_base_url.to_string(), strong_name.to_string())
    }

    pub fn get(&self, module_base_url: &str, strong_name: &str) -> Option<Arc<dyn SerializationPolicy>> {
        let policies = self.policies.lock().unwrap_or_else(PoisonError::into_inner);
        policies
            .get(&Self::key(module_base_url, strong_name))
            .map(Arc::clone)
    }

    pub fn put(&self, module_base_url: &str, strong_name: &str, policy: Arc<dyn SerializationPolicy>) {
        let mut policies = self.policies.lock().unwrap_or_else(PoisonError::into_inner);
        policies.insert(Self::key(module_base_url, strong_name), policy);
    }

    pub fn len(&self) -> usize {
        self.policies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Loads policy files from a directory, falling back to the legacy policy
/// when configured to.
#[derive(Debug)]
pub struct FilePolicyProvider {
    base_dir: PathBuf,
    context_path: String,
    legacy_fallback: bool,
    registry: Arc<TypeRegistry>,
    legacy: Arc<dyn SerializationPolicy>,
    cache: SerializationPolicyCache,
}

impl FilePolicyProvider {
    pub fn new(config: &PolicyConfig, registry: Arc<TypeRegistry>) -> Self {
        let legacy: Arc<dyn SerializationPolicy> =
            Arc::new(LegacySerializationPolicy::new(Arc::clone(&registry)));
        Self {
            base_dir: config.base_dir.clone(),
            context_path: config.context_path.trim_end_matches('/').to_string(),
            legacy_fallback: config.legacy_fallback,
            registry,
            legacy,
            cache: SerializationPolicyCache::new(),
        }
    }

    pub fn cache(&self) -> &SerializationPolicyCache {
        &self.cache
    }

    /// Location of the policy file for a module, or `None` when the pair
    /// cannot name a file under the policy directory.
    pub fn policy_path(&self, module_base_url: &str, strong_name: &str) -> Option<PathBuf> {
        let Some(module_path) = module_path(module_base_url) else {
            error!(module_base_url, "Malformed moduleBaseURL");
            return None;
        };

        let Some(relative) = module_path.strip_prefix(self.context_path.as_str()) else {
            error!(
                module_base_url,
                context_path = %self.context_path,
                "ERROR: The module path requested, {}, is not in the same web application as this servlet, {}. Your module may not be properly configured or your client and server code maybe out of date.",
                module_path,
                self.context_path
            );
            return None;
        };

        if !is_safe_strong_name(strong_name) || !is_safe_relative_path(relative) {
            warn!(
                module_base_url,
                strong_name, "Refusing policy lookup outside the policy directory"
            );
            return None;
        }

        let file_name = policy_file_name(&format!("{relative}{strong_name}"));
        Some(self.base_dir.join(file_name.trim_start_matches('/')))
    }

    /// Load the policy file for a module without consulting the cache.
    /// Failures are logged and reported as `None`.
    pub fn load_serialization_policy(
        &self,
        module_base_url: &str,
        strong_name: &str,
    ) -> Option<Arc<dyn SerializationPolicy>> {
        let path = self.policy_path(module_base_url, strong_name)?;
        let metrics = global_metrics();

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                metrics.policy_load_failed();
                error!(
                    "ERROR: The serialization policy file '{}' was not found; did you forget to include it in this deployment?",
                    path.display()
                );
                return None;
            }
            Err(e) => {
                metrics.policy_load_failed();
                error!(path = %path.display(), error = %e, "ERROR: Could not open the serialization policy file");
                return None;
            }
        };

        let mut missing = Vec::new();
        match SerializationPolicyLoader::load_from_reader(
            BufReader::new(file),
            &self.registry,
            Some(&mut missing),
        ) {
            Ok(policy) => {
                for class in &missing {
                    warn!(
                        path = %path.display(),
                        error = %class,
                        "ERROR: Could not find class listed in the serialization policy file; your server's classpath may be misconfigured"
                    );
                }
                metrics.policy_loaded();
                info!(path = %path.display(), types = policy.type_id_count(), "Loaded serialization policy");
                Some(Arc::new(policy))
            }
            Err(e) => {
                metrics.policy_load_failed();
                error!(path = %path.display(), error = %e, "ERROR: Failed to parse the policy file");
                None
            }
        }
    }
}

impl SerializationPolicyProvider for FilePolicyProvider {
    fn serialization_policy(
        &self,
        module_base_url: &str,
        strong_name: &str,
    ) -> Result<Arc<dyn SerializationPolicy>> {
        let metrics = global_metrics();
        if let Some(policy) = self.cache.get(module_base_url, strong_name) {
            metrics.policy_cache_hit();
            return Ok(policy);
        }
        metrics.policy_cache_miss();

        let policy = match self.load_serialization_policy(module_base_url, strong_name) {
            Some(policy) => policy,
            // Both names come from the client; only policies read from disk
            // are cached.
            None if self.legacy_fallback => {
                warn!(
                    "WARNING: Failed to get the SerializationPolicy '{}' for module '{}'; a legacy, 1.3.3 compatible, serialization policy will be used. You may experience SerializationExceptions as a result.",
                    strong_name, module_base_url
                );
                return Ok(Arc::clone(&self.legacy));
            }
            None => {
                return Err(RpcError::IncompatibleRequest(format!(
                    "No serialization policy '{strong_name}' is available for module '{module_base_url}'"
                )))
            }
        };

        debug!(module_base_url, strong_name, "Caching serialization policy");
        self.cache.put(module_base_url, strong_name, Arc::clone(&policy));
        Ok(policy)
    }
}

/// Path component of a URL: everything from the first `/` after the
/// authority, without query or fragment.
fn module_path(url: &str) -> Option<&str> {
    let (scheme, rest) = url.split_once("://")?;
    if scheme.is_empty() {
        return None;
    }
    let path = match rest.find('/') {
        Some(index) => &rest[index..],
        None => "",
    };
    let end = path.find(['?', '#']).unwrap_or(path.len());
    Some(&path[..end])
}

fn is_safe_strong_name(strong_name: &str) -> bool {
    !strong_name.is_empty()
        && strong_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_safe_relative_path(relative: &str) -> bool {
    !relative.contains(['\\', '\0']) && !relative.split('/').any(|segment| segment == "..")
}
