//! Dynamic values carried by requests and responses.

use crate::core::types::{well_known, Primitive, TypeRef};
use std::collections::BTreeMap;
use std::fmt;

/// A deserialized argument, a return value, or a field of either.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Array {
        component: TypeRef,
        elements: Vec<Value>,
    },
    /// Instance of a class with a sequence serializer (`java.util.ArrayList`, ...)
    Sequence {
        class: String,
        elements: Vec<Value>,
    },
    /// Instance of a class with a mapping serializer (`java.util.HashMap`, ...)
    Mapping {
        class: String,
        entries: Vec<(Value, Value)>,
    },
    Object(ObjectValue),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Primitive kind for scalar values; matches both `int` and `Integer`
    pub fn primitive_kind(&self) -> Option<Primitive> {
        match self {
            Value::Boolean(_) => Some(Primitive::Boolean),
            Value::Byte(_) => Some(Primitive::Byte),
            Value::Char(_) => Some(Primitive::Char),
            Value::Short(_) => Some(Primitive::Short),
            Value::Int(_) => Some(Primitive::Int),
            Value::Long(_) => Some(Primitive::Long),
            Value::Float(_) => Some(Primitive::Float),
            Value::Double(_) => Some(Primitive::Double),
            _ => None,
        }
    }

    /// Concrete class of the value when it is sent as an object. Scalars
    /// report their wrapper class; `Null` has none.
    pub fn runtime_type(&self) -> Option<TypeRef> {
        if let Some(primitive) = self.primitive_kind() {
            return Some(TypeRef::class(primitive.wrapper_class()));
        }
        match self {
            Value::String(_) => Some(TypeRef::class(well_known::STRING)),
            Value::Array { component, .. } => Some(TypeRef::array_of(component.clone())),
            Value::Sequence { class, .. } | Value::Mapping { class, .. } => {
                Some(TypeRef::class(class.clone()))
            }
            Value::Object(object) => Some(TypeRef::class(object.class.clone())),
            _ => None,
        }
    }

    /// Printable runtime type, `null` for [`Value::Null`]
    pub fn type_name(&self) -> String {
        self.runtime_type()
            .map_or_else(|| "null".to_string(), |ty| ty.to_string())
    }

    /// Zero value for a field of type `ty` that was left unset
    pub fn default_for(ty: &TypeRef) -> Value {
        match ty {
            TypeRef::Primitive(Primitive::Boolean) => Value::Boolean(false),
            TypeRef::Primitive(Primitive::Byte) => Value::Byte(0),
            TypeRef::Primitive(Primitive::Char) => Value::Char(0),
            TypeRef::Primitive(Primitive::Short) => Value::Short(0),
            TypeRef::Primitive(Primitive::Int) => Value::Int(0),
            TypeRef::Primitive(Primitive::Long) => Value::Long(0),
            TypeRef::Primitive(Primitive::Float) => Value::Float(0.0),
            TypeRef::Primitive(Primitive::Double) => Value::Double(0.0),
            _ => Value::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Char(v) => match char::from_u32(u32::from(*v)) {
                Some(c) => write!(f, "{c}"),
                None => write!(f, "\\u{v:04x}"),
            },
            Value::Short(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::String(s) => f.write_str(s),
            Value::Array { elements, .. } | Value::Sequence { elements, .. } => {
                let rendered: Vec<String> = elements.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            Value::Mapping { entries, .. } => {
                let rendered: Vec<String> =
                    entries.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "{{{}}}", rendered.join(", "))
            }
            Value::Object(object) => write!(f, "{object}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<ObjectValue> for Value {
    fn from(v: ObjectValue) -> Self {
        Value::Object(v)
    }
}

/// Instance of a field-serialized class. Also used for thrown exceptions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectValue {
    pub class: String,
    pub fields: BTreeMap<String, Value>,
}

impl ObjectValue {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            fields: BTreeMap::new(),
        }
    }

    /// An exception instance carrying `message`
    pub fn exception(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(class).with_field(
            well_known::DETAIL_MESSAGE_FIELD,
            Value::String(message.into()),
        )
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Exception message, when present
    pub fn message(&self) -> Option<&str> {
        match self.fields.get(well_known::DETAIL_MESSAGE_FIELD) {
            Some(Value::String(message)) => Some(message),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.class.replace('$', "."))?;
        if let Some(message) = self.message() {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

/// Outcome of a service method: a return value, or the exception it threw
pub type ServiceResult = std::result::Result<Value, ObjectValue>;
