//! # Type Registry
//!
//! Static class model standing in for runtime reflection.
//!
//! Every type that may cross the wire (argument, result, thrown exception,
//! service interface, server implementation class) is described once, at
//! startup, by a [`TypeDescriptor`] registered in a [`TypeRegistry`]. Decoding
//! resolves wire names against the registry; it never creates types on the
//! fly, so an unknown name is always a lookup failure and never an
//! instantiation.
//!
//! ## Wire names
//! - Primitive codes: `Z B C D F I J S`
//! - Arrays: `[I`, `[Lcom.example.Foo;`, `[[J`
//! - Classes and interfaces: binary names such as `com.example.Outer$Inner`

use crate::core::method::MethodBinding;
use crate::error::{Result, RpcError};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Binary names of the types every registry created with
/// [`TypeRegistry::with_core_types`] knows about. These match the names used by
/// existing policy-file producers and clients.
pub mod well_known {
    pub const OBJECT: &str = "java.lang.Object";
    pub const STRING: &str = "java.lang.String";
    pub const SERIALIZABLE: &str = "java.io.Serializable";

    pub const BOOLEAN: &str = "java.lang.Boolean";
    pub const BYTE: &str = "java.lang.Byte";
    pub const CHARACTER: &str = "java.lang.Character";
    pub const DOUBLE: &str = "java.lang.Double";
    pub const FLOAT: &str = "java.lang.Float";
    pub const INTEGER: &str = "java.lang.Integer";
    pub const LONG: &str = "java.lang.Long";
    pub const SHORT: &str = "java.lang.Short";

    pub const THROWABLE: &str = "java.lang.Throwable";
    pub const EXCEPTION: &str = "java.lang.Exception";
    pub const RUNTIME_EXCEPTION: &str = "java.lang.RuntimeException";
    pub const ERROR: &str = "java.lang.Error";
    pub const ILLEGAL_ARGUMENT_EXCEPTION: &str = "java.lang.IllegalArgumentException";

    pub const COLLECTION: &str = "java.util.Collection";
    pub const LIST: &str = "java.util.List";
    pub const ARRAY_LIST: &str = "java.util.ArrayList";
    pub const SET: &str = "java.util.Set";
    pub const HASH_SET: &str = "java.util.HashSet";
    pub const MAP: &str = "java.util.Map";
    pub const HASH_MAP: &str = "java.util.HashMap";

    /// Marker for types that opted in to client serialization
    pub const IS_SERIALIZABLE: &str = "com.google.gwt.user.client.rpc.IsSerializable";
    /// Marker every addressable service interface must extend
    pub const REMOTE_SERVICE: &str = "com.google.gwt.user.client.rpc.RemoteService";
    pub const RPC_TOKEN: &str = "com.google.gwt.user.client.rpc.RpcToken";
    pub const RPC_TOKEN_EXCEPTION: &str = "com.google.gwt.user.client.rpc.RpcTokenException";
    pub const INCOMPATIBLE_REMOTE_SERVICE_EXCEPTION: &str =
        "com.google.gwt.user.client.rpc.IncompatibleRemoteServiceException";
    pub const SERIALIZATION_EXCEPTION: &str =
        "com.google.gwt.user.client.rpc.SerializationException";

    /// Base class at which the interface walk of a server class stops
    pub const REMOTE_SERVICE_SERVLET: &str = "com.google.gwt.user.server.rpc.RemoteServiceServlet";

    /// Field holding an exception's message
    pub const DETAIL_MESSAGE_FIELD: &str = "detailMessage";
}

/// Primitive value kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Boolean,
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
}

impl Primitive {
    pub const ALL: [Primitive; 8] = [
        Primitive::Boolean,
        Primitive::Byte,
        Primitive::Char,
        Primitive::Double,
        Primitive::Float,
        Primitive::Int,
        Primitive::Long,
        Primitive::Short,
    ];

    /// Parse a one-letter wire code (`I` for int, `J` for long, ...)
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "Z" => Some(Primitive::Boolean),
            "B" => Some(Primitive::Byte),
            "C" => Some(Primitive::Char),
            "D" => Some(Primitive::Double),
            "F" => Some(Primitive::Float),
            "I" => Some(Primitive::Int),
            "J" => Some(Primitive::Long),
            "S" => Some(Primitive::Short),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Primitive::Boolean => "Z",
            Primitive::Byte => "B",
            Primitive::Char => "C",
            Primitive::Double => "D",
            Primitive::Float => "F",
            Primitive::Int => "I",
            Primitive::Long => "J",
            Primitive::Short => "S",
        }
    }

    pub fn source_name(self) -> &'static str {
        match self {
            Primitive::Boolean => "boolean",
            Primitive::Byte => "byte",
            Primitive::Char => "char",
            Primitive::Double => "double",
            Primitive::Float => "float",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Short => "short",
        }
    }

    /// Binary name of the boxed form
    pub fn wrapper_class(self) -> &'static str {
        match self {
            Primitive::Boolean => well_known::BOOLEAN,
            Primitive::Byte => well_known::BYTE,
            Primitive::Char => well_known::CHARACTER,
            Primitive::Double => well_known::DOUBLE,
            Primitive::Float => well_known::FLOAT,
            Primitive::Int => well_known::INTEGER,
            Primitive::Long => well_known::LONG,
            Primitive::Short => well_known::SHORT,
        }
    }

    pub fn from_wrapper_class(class_name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.wrapper_class() == class_name)
    }
}

/// An erased type: what a wire type name resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Void,
    Primitive(Primitive),
    Class(String),
    Array(Box<TypeRef>),
}

impl TypeRef {
    pub fn class(name: impl Into<String>) -> Self {
        TypeRef::Class(name.into())
    }

    pub fn array_of(component: TypeRef) -> Self {
        TypeRef::Array(Box::new(component))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeRef::Primitive(_))
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            TypeRef::Class(name) => Some(name),
            _ => None,
        }
    }

    /// Structural parse of a wire name. Does not check that the class exists.
    pub fn parse_binary_name(name: &str) -> Option<TypeRef> {
        if let Some(primitive) = Primitive::from_code(name) {
            return Some(TypeRef::Primitive(primitive));
        }
        if let Some(descriptor) = name.strip_prefix('[') {
            return parse_descriptor(descriptor).map(TypeRef::array_of);
        }
        if name.is_empty() {
            return None;
        }
        Some(TypeRef::class(name))
    }

    /// Inverse of [`TypeRef::parse_binary_name`]
    pub fn binary_name(&self) -> String {
        match self {
            TypeRef::Void => "V".to_string(),
            TypeRef::Primitive(p) => p.code().to_string(),
            TypeRef::Class(name) => name.clone(),
            TypeRef::Array(component) => format!("[{}", component.descriptor()),
        }
    }

    fn descriptor(&self) -> String {
        match self {
            TypeRef::Class(name) => format!("L{name};"),
            other => other.binary_name(),
        }
    }
}

fn parse_descriptor(descriptor: &str) -> Option<TypeRef> {
    if let Some(rest) = descriptor.strip_prefix('[') {
        return parse_descriptor(rest).map(TypeRef::array_of);
    }
    if let Some(class) = descriptor
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
    {
        return (!class.is_empty()).then(|| TypeRef::class(class));
    }
    Primitive::from_code(descriptor).map(TypeRef::Primitive)
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Void => f.write_str("void"),
            TypeRef::Primitive(p) => f.write_str(p.source_name()),
            TypeRef::Class(name) => f.write_str(&name.replace('$', ".")),
            TypeRef::Array(component) => write!(f, "{component}[]"),
        }
    }
}

/// Resolution of type variables to concrete signatures
pub type TypeBindings = HashMap<String, TypeSignature>;

/// Bound on nested variable resolution (`T extends Comparable<T>`)
const MAX_RESOLVE_DEPTH: usize = 8;

/// A generic type as declared on a method parameter or a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSignature {
    Void,
    Primitive(Primitive),
    Class {
        name: String,
        args: Vec<TypeSignature>,
    },
    Array(Box<TypeSignature>),
    Variable(String),
    /// `?` or `? extends Bound`
    Wildcard(Option<Box<TypeSignature>>),
}

impl TypeSignature {
    pub fn class(name: impl Into<String>) -> Self {
        TypeSignature::Class {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn generic(name: impl Into<String>, args: Vec<TypeSignature>) -> Self {
        TypeSignature::Class {
            name: name.into(),
            args,
        }
    }

    pub fn array_of(component: TypeSignature) -> Self {
        TypeSignature::Array(Box::new(component))
    }

    pub fn variable(name: impl Into<String>) -> Self {
        TypeSignature::Variable(name.into())
    }

    pub fn wildcard() -> Self {
        TypeSignature::Wildcard(None)
    }

    pub fn wildcard_extends(bound: TypeSignature) -> Self {
        TypeSignature::Wildcard(Some(Box::new(bound)))
    }

    pub fn object() -> Self {
        TypeSignature::class(well_known::OBJECT)
    }

    pub fn type_args(&self) -> &[TypeSignature] {
        match self {
            TypeSignature::Class { args, .. } => args,
            _ => &[],
        }
    }

    /// Substitute bound variables; unbound variables and bare wildcards become `Object`.
    pub fn resolve(&self, bindings: &TypeBindings) -> TypeSignature {
        self.resolve_at(bindings, 0)
    }

    fn resolve_at(&self, bindings: &TypeBindings, depth: usize) -> TypeSignature {
        if depth > MAX_RESOLVE_DEPTH {
            return TypeSignature::object();
        }
        match self {
            TypeSignature::Variable(name) => match bindings.get(name) {
                Some(bound) => bound.resolve_at(bindings, depth + 1),
                None => TypeSignature::object(),
            },
            TypeSignature::Wildcard(Some(bound)) => bound.resolve_at(bindings, depth + 1),
            TypeSignature::Wildcard(None) => TypeSignature::object(),
            TypeSignature::Class { name, args } => TypeSignature::Class {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|arg| arg.resolve_at(bindings, depth + 1))
                    .collect(),
            },
            TypeSignature::Array(component) => {
                TypeSignature::array_of(component.resolve_at(bindings, depth + 1))
            }
            other => other.clone(),
        }
    }

    /// Raw type. Variables and wildcards erase to `Object`; resolve first to
    /// erase them to their bounds.
    pub fn erasure(&self) -> TypeRef {
        match self {
            TypeSignature::Void => TypeRef::Void,
            TypeSignature::Primitive(p) => TypeRef::Primitive(*p),
            TypeSignature::Class { name, .. } => TypeRef::class(name.clone()),
            TypeSignature::Array(component) => TypeRef::array_of(component.erasure()),
            TypeSignature::Variable(_) | TypeSignature::Wildcard(_) => {
                TypeRef::class(well_known::OBJECT)
            }
        }
    }
}

impl From<TypeRef> for TypeSignature {
    fn from(ty: TypeRef) -> Self {
        match ty {
            TypeRef::Void => TypeSignature::Void,
            TypeRef::Primitive(p) => TypeSignature::Primitive(p),
            TypeRef::Class(name) => TypeSignature::class(name),
            TypeRef::Array(component) => TypeSignature::array_of((*component).into()),
        }
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSignature::Void => f.write_str("void"),
            TypeSignature::Primitive(p) => f.write_str(p.source_name()),
            TypeSignature::Class { name, args } => {
                f.write_str(&name.replace('$', "."))?;
                if !args.is_empty() {
                    let rendered: Vec<String> = args.iter().map(ToString::to_string).collect();
                    write!(f, "<{}>", rendered.join(", "))?;
                }
                Ok(())
            }
            TypeSignature::Array(component) => write!(f, "{component}[]"),
            TypeSignature::Variable(name) => f.write_str(name),
            TypeSignature::Wildcard(None) => f.write_str("?"),
            TypeSignature::Wildcard(Some(bound)) => write!(f, "? extends {bound}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Interface,
}

/// How instances of a class are laid out in the token stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializerKind {
    /// Declared fields, own class first, then serializable superclasses
    Fields,
    /// A single string
    Text,
    /// A single primitive token
    Boxed(Primitive),
    /// Length followed by elements (lists, sets)
    Sequence,
    /// Length followed by key/value pairs
    Mapping,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub signature: TypeSignature,
}

/// Static description of one class or interface.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    name: String,
    kind: TypeKind,
    superclass: Option<String>,
    interfaces: Vec<String>,
    type_params: Vec<String>,
    fields: Vec<FieldDescriptor>,
    serializer: SerializerKind,
    is_abstract: bool,
    methods: Vec<Arc<MethodBinding>>,
}

impl TypeDescriptor {
    /// A concrete class extending `java.lang.Object`
    pub fn class(name: impl Into<String>) -> Self {
        let name = name.into();
        let superclass = (name != well_known::OBJECT).then(|| well_known::OBJECT.to_string());
        Self {
            name,
            kind: TypeKind::Class,
            superclass,
            interfaces: Vec::new(),
            type_params: Vec::new(),
            fields: Vec::new(),
            serializer: SerializerKind::Fields,
            is_abstract: false,
            methods: Vec::new(),
        }
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Interface,
            superclass: None,
            interfaces: Vec::new(),
            type_params: Vec::new(),
            fields: Vec::new(),
            serializer: SerializerKind::Fields,
            is_abstract: true,
            methods: Vec::new(),
        }
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    /// Implemented interface (for classes) or super-interface (for interfaces)
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn type_param(mut self, name: impl Into<String>) -> Self {
        self.type_params.push(name.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, signature: TypeSignature) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            signature,
        });
        self
    }

    pub fn serializer(mut self, serializer: SerializerKind) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Attach a service method; the binding's owning interface becomes this type.
    pub fn method(mut self, binding: MethodBinding) -> Self {
        self.methods
            .push(Arc::new(binding.on_interface(self.name.clone())));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn is_interface(&self) -> bool {
        self.kind == TypeKind::Interface
    }

    pub fn superclass(&self) -> Option<&str> {
        self.superclass.as_deref()
    }

    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    pub fn type_params(&self) -> &[String] {
        &self.type_params
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn serializer_kind(&self) -> SerializerKind {
        self.serializer
    }

    pub fn has_custom_serializer(&self) -> bool {
        self.serializer != SerializerKind::Fields
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn methods(&self) -> &[Arc<MethodBinding>] {
        &self.methods
    }
}

/// Registry of every type the server can resolve by name.
///
/// Built once at startup and shared read-only (`Arc<TypeRegistry>`).
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, TypeDescriptor>,
}

impl TypeRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the well-known wire types
    pub fn with_core_types() -> Self {
        let mut registry = Self::new();
        for descriptor in core_types() {
            registry.register(descriptor);
        }
        registry
    }

    /// Register (or replace) a descriptor
    pub fn register(&mut self, descriptor: TypeDescriptor) -> &mut Self {
        self.types.insert(descriptor.name.clone(), descriptor);
        self
    }

    /// Builder-style [`TypeRegistry::register`]
    pub fn with(mut self, descriptor: TypeDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Resolve a wire name to a type known to this registry.
    ///
    /// # Errors
    /// `RpcError::ClassNotFound` when the name is malformed or names (or, for
    /// arrays, has a component naming) an unregistered class.
    pub fn resolve(&self, serialized_name: &str) -> Result<TypeRef> {
        TypeRef::parse_binary_name(serialized_name)
            .filter(|ty| self.is_loadable(ty))
            .ok_or_else(|| RpcError::ClassNotFound(serialized_name.to_string()))
    }

    fn is_loadable(&self, ty: &TypeRef) -> bool {
        match ty {
            TypeRef::Void => false,
            TypeRef::Primitive(_) => true,
            TypeRef::Class(name) => self.contains(name),
            TypeRef::Array(component) => self.is_loadable(component),
        }
    }

    /// Reflexive-transitive subtype check over superclasses and interfaces.
    pub fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        if sub == sup || sup == well_known::OBJECT {
            return true;
        }
        let mut pending = vec![sub];
        let mut visited = HashSet::new();
        while let Some(name) = pending.pop() {
            if name == sup {
                return true;
            }
            if !visited.insert(name) {
                continue;
            }
            if let Some(descriptor) = self.types.get(name) {
                pending.extend(descriptor.superclass.as_deref());
                pending.extend(descriptor.interfaces.iter().map(String::as_str));
            }
        }
        false
    }

    /// Whether a value of type `source` may be stored where `target` is declared.
    pub fn is_assignable(&self, target: &TypeRef, source: &TypeRef) -> bool {
        match (target, source) {
            (TypeRef::Primitive(a), TypeRef::Primitive(b)) => a == b,
            (TypeRef::Class(t), TypeRef::Class(s)) => self.is_subtype(s, t),
            (TypeRef::Class(t), TypeRef::Array(_)) => {
                t == well_known::OBJECT || t == well_known::SERIALIZABLE
            }
            (TypeRef::Array(t), TypeRef::Array(s)) => match (t.as_ref(), s.as_ref()) {
                (TypeRef::Primitive(a), TypeRef::Primitive(b)) => a == b,
                (TypeRef::Primitive(_), _) | (_, TypeRef::Primitive(_)) => false,
                (t, s) => self.is_assignable(t, s),
            },
            _ => false,
        }
    }

    /// `RuntimeException` and `Error` subtypes
    pub fn is_unchecked_exception(&self, class_name: &str) -> bool {
        self.is_subtype(class_name, well_known::RUNTIME_EXCEPTION)
            || self.is_subtype(class_name, well_known::ERROR)
    }

    /// Find the overload `name(params)` declared on `interface` or any of its
    /// super-interfaces.
    pub fn find_method(
        &self,
        interface: &str,
        name: &str,
        params: &[TypeRef],
    ) -> Option<Arc<MethodBinding>> {
        let mut pending = vec![interface];
        let mut visited = HashSet::new();
        while let Some(current) = pending.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(descriptor) = self.types.get(current) else {
                continue;
            };
            let found = descriptor
                .methods
                .iter()
                .find(|m| m.name() == name && m.erased_param_types() == params);
            if let Some(method) = found {
                return Some(Arc::clone(method));
            }
            pending.extend(descriptor.interfaces.iter().map(String::as_str));
        }
        None
    }
}

fn core_types() -> Vec<TypeDescriptor> {
    use well_known::*;

    let mut types = vec![
        TypeDescriptor::class(OBJECT),
        TypeDescriptor::interface(SERIALIZABLE),
        TypeDescriptor::interface(IS_SERIALIZABLE),
        TypeDescriptor::interface(REMOTE_SERVICE),
        TypeDescriptor::interface(RPC_TOKEN).implements(SERIALIZABLE),
        TypeDescriptor::class(STRING)
            .implements(SERIALIZABLE)
            .serializer(SerializerKind::Text),
        TypeDescriptor::class(THROWABLE)
            .implements(SERIALIZABLE)
            .field(DETAIL_MESSAGE_FIELD, TypeSignature::class(STRING)),
        TypeDescriptor::class(EXCEPTION).extends(THROWABLE),
        TypeDescriptor::class(RUNTIME_EXCEPTION).extends(EXCEPTION),
        TypeDescriptor::class(ERROR).extends(THROWABLE),
        TypeDescriptor::class(ILLEGAL_ARGUMENT_EXCEPTION).extends(RUNTIME_EXCEPTION),
        TypeDescriptor::class(INCOMPATIBLE_REMOTE_SERVICE_EXCEPTION)
            .extends(RUNTIME_EXCEPTION)
            .implements(IS_SERIALIZABLE),
        TypeDescriptor::class(RPC_TOKEN_EXCEPTION)
            .extends(RUNTIME_EXCEPTION)
            .implements(IS_SERIALIZABLE),
        TypeDescriptor::class(SERIALIZATION_EXCEPTION)
            .extends(EXCEPTION)
            .implements(IS_SERIALIZABLE),
        TypeDescriptor::interface(COLLECTION).type_param("E"),
        TypeDescriptor::interface(LIST)
            .type_param("E")
            .implements(COLLECTION),
        TypeDescriptor::interface(SET)
            .type_param("E")
            .implements(COLLECTION),
        TypeDescriptor::interface(MAP).type_param("K").type_param("V"),
        TypeDescriptor::class(ARRAY_LIST)
            .type_param("E")
            .implements(LIST)
            .implements(SERIALIZABLE)
            .serializer(SerializerKind::Sequence),
        TypeDescriptor::class(HASH_SET)
            .type_param("E")
            .implements(SET)
            .implements(SERIALIZABLE)
            .serializer(SerializerKind::Sequence),
        TypeDescriptor::class(HASH_MAP)
            .type_param("K")
            .type_param("V")
            .implements(MAP)
            .implements(SERIALIZABLE)
            .serializer(SerializerKind::Mapping),
        TypeDescriptor::class(REMOTE_SERVICE_SERVLET),
    ];

    types.extend(Primitive::ALL.iter().map(|p| {
        TypeDescriptor::class(p.wrapper_class())
            .implements(SERIALIZABLE)
            .serializer(SerializerKind::Boxed(*p))
    }));

    types
}
