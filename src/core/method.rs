//! Service method descriptors.
//!
//! A [`MethodBinding`] is the registry's stand-in for a reflected interface
//! method: owning interface, name, generic parameter and return signatures,
//! and the checked exceptions it declares.

use crate::core::types::{TypeBindings, TypeRef, TypeSignature};
use std::fmt;

/// A method-level type variable with its upper bound
#[derive(Debug, Clone, PartialEq)]
pub struct TypeParam {
    pub name: String,
    pub bound: TypeSignature,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodBinding {
    interface: String,
    name: String,
    type_params: Vec<TypeParam>,
    params: Vec<TypeSignature>,
    return_type: TypeSignature,
    exceptions: Vec<String>,
}

impl MethodBinding {
    /// A `void name()` method. The owning interface is filled in when the
    /// binding is attached to a type descriptor.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            interface: String::new(),
            name: name.into(),
            type_params: Vec::new(),
            params: Vec::new(),
            return_type: TypeSignature::Void,
            exceptions: Vec::new(),
        }
    }

    pub fn on_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = interface.into();
        self
    }

    pub fn type_param(mut self, name: impl Into<String>, bound: TypeSignature) -> Self {
        self.type_params.push(TypeParam {
            name: name.into(),
            bound,
        });
        self
    }

    pub fn param(mut self, signature: impl Into<TypeSignature>) -> Self {
        self.params.push(signature.into());
        self
    }

    pub fn returns(mut self, signature: impl Into<TypeSignature>) -> Self {
        self.return_type = signature.into();
        self
    }

    pub fn throws(mut self, exception: impl Into<String>) -> Self {
        self.exceptions.push(exception.into());
        self
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn generic_param_types(&self) -> &[TypeSignature] {
        &self.params
    }

    pub fn generic_return_type(&self) -> &TypeSignature {
        &self.return_type
    }

    /// Declared checked exceptions, by binary name
    pub fn exceptions(&self) -> &[String] {
        &self.exceptions
    }

    /// Method type variables mapped to their bounds
    pub fn type_bindings(&self) -> TypeBindings {
        self.type_params
            .iter()
            .map(|p| (p.name.clone(), p.bound.clone()))
            .collect()
    }

    /// Parameter types as they appear on the wire
    pub fn erased_param_types(&self) -> Vec<TypeRef> {
        let bindings = self.type_bindings();
        self.params
            .iter()
            .map(|p| p.resolve(&bindings).erasure())
            .collect()
    }

    pub fn erased_return_type(&self) -> TypeRef {
        self.return_type.resolve(&self.type_bindings()).erasure()
    }

    /// Human-readable signature used in log and error messages
    pub fn source_representation(&self) -> String {
        let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        let mut out = format!(
            "{} {}.{}({})",
            self.return_type,
            self.interface.replace('$', "."),
            self.name,
            params.join(", ")
        );
        if !self.exceptions.is_empty() {
            let thrown: Vec<String> = self.exceptions.iter().map(|e| e.replace('$', ".")).collect();
            out.push_str(" throws ");
            out.push_str(&thrown.join(", "));
        }
        out
    }
}

impl fmt::Display for MethodBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source_representation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{well_known, Primitive};

    #[test]
    fn test_bounded_variable_erases_to_bound() {
        let method = MethodBinding::new("store")
            .on_interface("com.example.Store")
            .type_param("T", TypeSignature::class("com.example.Foo"))
            .param(TypeSignature::variable("T"))
            .param(TypeSignature::Primitive(Primitive::Int));
        assert_eq!(
            method.erased_param_types(),
            vec![
                TypeRef::class("com.example.Foo"),
                TypeRef::Primitive(Primitive::Int)
            ]
        );
        assert_eq!(method.erased_return_type(), TypeRef::Void);
    }

    #[test]
    fn test_source_representation() {
        let method = MethodBinding::new("echo")
            .on_interface("com.example.Outer$Echo")
            .param(TypeSignature::generic(
                well_known::LIST,
                vec![TypeSignature::class(well_known::STRING)],
            ))
            .returns(TypeSignature::class(well_known::STRING))
            .throws("com.example.EchoException");
        assert_eq!(
            method.source_representation(),
            "java.lang.String com.example.Outer.Echo.echo(java.util.List<java.lang.String>) throws com.example.EchoException"
        );
    }
}
