//! # Security Gate
//!
//! Decides whether a server class may be addressed through a requested
//! interface, and whether a thrown exception may be reported to the client.
//!
//! The interface check walks the registry's static interface graph from the
//! server class and its superclasses, stopping at the servlet boundary class.
//! The requested name is only ever compared against that graph, never
//! resolved, so a hostile name cannot trigger any lookup side effect.

use crate::core::method::MethodBinding;
use crate::core::types::{well_known, TypeRegistry};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use tracing::trace;

/// Interface-implementation checks with a per-class cache of positive answers.
#[derive(Debug, Default)]
pub struct SecurityGate {
    implemented: Mutex<HashMap<String, HashSet<String>>>,
}

impl SecurityGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `service` (a class, or an interface) implements `intf_name`.
    ///
    /// For a class, every interface implemented by the class or its
    /// superclasses below the servlet boundary is searched together with its
    /// super-interfaces. For an interface, its own reflexive closure is searched.
    pub fn implements_interface(&self, registry: &TypeRegistry, service: &str, intf_name: &str) -> bool {
        let mut implemented = self
            .implemented
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let known = implemented.entry(service.to_string()).or_default();
        if known.contains(intf_name) {
            return true;
        }

        let found = match registry.get(service) {
            Some(descriptor) if descriptor.is_interface() => {
                interface_closure_contains(registry, service, intf_name)
            }
            Some(_) => class_implements(registry, service, intf_name),
            None => false,
        };

        if found {
            known.insert(intf_name.to_string());
        }
        trace!(service, interface = intf_name, found, "Checked interface implementation");
        found
    }

    /// Positive answers cached for `service`
    pub fn cached_interfaces(&self, service: &str) -> HashSet<String> {
        self.implemented
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service)
            .cloned()
            .unwrap_or_default()
    }
}

fn class_implements(registry: &TypeRegistry, service: &str, intf_name: &str) -> bool {
    let mut visited = HashSet::new();
    let mut current = Some(service);
    while let Some(class) = current {
        if class == well_known::REMOTE_SERVICE_SERVLET || !visited.insert(class) {
            break;
        }
        let Some(descriptor) = registry.get(class) else {
            break;
        };
        if descriptor
            .interfaces()
            .iter()
            .any(|intf| interface_closure_contains(registry, intf, intf_name))
        {
            return true;
        }
        current = descriptor.superclass();
    }
    false
}

/// Whether `intf_name` is `intf` or one of its super-interfaces
fn interface_closure_contains(registry: &TypeRegistry, intf: &str, intf_name: &str) -> bool {
    let mut pending = vec![intf];
    let mut visited = HashSet::new();
    while let Some(current) = pending.pop() {
        if current == intf_name {
            return true;
        }
        if !visited.insert(current) {
            continue;
        }
        if let Some(descriptor) = registry.get(current) {
            pending.extend(descriptor.interfaces().iter().map(String::as_str));
        }
    }
    false
}

/// Whether `cause_class` may be reported as a declared failure of `method`:
/// it must be checked and assignable to one of the declared exceptions.
pub fn is_expected_exception(registry: &TypeRegistry, method: &MethodBinding, cause_class: &str) -> bool {
    if registry.is_unchecked_exception(cause_class) {
        return false;
    }
    method
        .exceptions()
        .iter()
        .any(|declared| registry.is_subtype(cause_class, declared))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TypeDescriptor;

    fn registry() -> TypeRegistry {
        TypeRegistry::with_core_types()
            .with(TypeDescriptor::interface("com.example.Base").implements(well_known::REMOTE_SERVICE))
            .with(TypeDescriptor::interface("com.example.Echo").implements("com.example.Base"))
            .with(TypeDescriptor::interface("com.example.Other").implements(well_known::REMOTE_SERVICE))
            .with(
                TypeDescriptor::class("com.example.AbstractImpl")
                    .extends(well_known::REMOTE_SERVICE_SERVLET)
                    .implements("com.example.Echo"),
            )
            .with(TypeDescriptor::class("com.example.EchoImpl").extends("com.example.AbstractImpl"))
            .with(TypeDescriptor::class("com.example.Checked").extends(well_known::EXCEPTION))
            .with(TypeDescriptor::class("com.example.SubChecked").extends("com.example.Checked"))
            .with(TypeDescriptor::class("com.example.Unchecked").extends(well_known::RUNTIME_EXCEPTION))
    }

    #[test]
    fn test_inherited_interfaces_found() {
        let registry = registry();
        let gate = SecurityGate::new();
        assert!(gate.implements_interface(&registry, "com.example.EchoImpl", "com.example.Echo"));
        assert!(gate.implements_interface(&registry, "com.example.EchoImpl", "com.example.Base"));
        assert!(gate.implements_interface(&registry, "com.example.EchoImpl", well_known::REMOTE_SERVICE));
        assert!(!gate.implements_interface(&registry, "com.example.EchoImpl", "com.example.Other"));
        assert!(!gate.implements_interface(&registry, "com.example.EchoImpl", "com.example.Nope"));
    }

    #[test]
    fn test_interface_service_uses_own_closure() {
        let registry = registry();
        let gate = SecurityGate::new();
        assert!(gate.implements_interface(&registry, "com.example.Echo", "com.example.Echo"));
        assert!(gate.implements_interface(&registry, "com.example.Echo", "com.example.Base"));
        assert!(!gate.implements_interface(&registry, "com.example.Echo", "com.example.Other"));
    }

    #[test]
    fn test_only_positive_answers_cached() {
        let registry = registry();
        let gate = SecurityGate::new();
        gate.implements_interface(&registry, "com.example.EchoImpl", "com.example.Echo");
        gate.implements_interface(&registry, "com.example.EchoImpl", "com.example.Other");
        let cached = gate.cached_interfaces("com.example.EchoImpl");
        assert_eq!(cached.len(), 1);
        assert!(cached.contains("com.example.Echo"));
    }

    #[test]
    fn test_expected_exceptions() {
        let registry = registry();
        let method = MethodBinding::new("m")
            .throws("com.example.Checked")
            .throws(well_known::RUNTIME_EXCEPTION);
        assert!(is_expected_exception(&registry, &method, "com.example.SubChecked"));
        assert!(!is_expected_exception(&registry, &method, "com.example.Unchecked"));
        assert!(!is_expected_exception(&registry, &method, well_known::RUNTIME_EXCEPTION));
        assert!(!is_expected_exception(&registry, &method, well_known::EXCEPTION));
    }
}
