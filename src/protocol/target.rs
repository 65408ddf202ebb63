use crate::core::method::MethodBinding;
use crate::core::types::TypeRef;
use crate::core::value::{ServiceResult, Value};
use crate::error::constants::{ERR_HANDLERS_READ_LOCK, ERR_HANDLERS_WRITE_LOCK};
use crate::error::{Result, RpcError};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// A service method implementation: arguments in, value or thrown exception out
pub type MethodHandler = dyn Fn(&[Value]) -> ServiceResult + Send + Sync + 'static;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MethodKey {
    name: String,
    params: Vec<TypeRef>,
}

impl MethodKey {
    fn of(method: &MethodBinding) -> Self {
        Self {
            name: method.name().to_string(),
            params: method.erased_param_types(),
        }
    }
}

/// Server-side implementation of one or more remote service interfaces.
/// Handlers are keyed by method name and erased parameter types.
pub struct ServiceTarget {
    class_name: String,
    handlers: Arc<RwLock<HashMap<MethodKey, Arc<MethodHandler>>>>,
}

impl ServiceTarget {
    /// `class_name` is the registered implementation class the security gate
    /// checks requested interfaces against.
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn register<F>(&self, method: &MethodBinding, handler: F) -> Result<()>
    where
        F: Fn(&[Value]) -> ServiceResult + Send + Sync + 'static,
    {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| RpcError::LockPoisoned(ERR_HANDLERS_WRITE_LOCK))?;

        handlers.insert(MethodKey::of(method), Arc::new(handler));
        Ok(())
    }

    pub fn handler_for(&self, method: &MethodBinding) -> Result<Option<Arc<MethodHandler>>> {
        let handlers = self
            .handlers
            .read()
            .map_err(|_| RpcError::LockPoisoned(ERR_HANDLERS_READ_LOCK))?;

        Ok(handlers.get(&MethodKey::of(method)).map(Arc::clone))
    }
}

impl fmt::Debug for ServiceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handler_count = self.handlers.read().map(|h| h.len()).unwrap_or_default();
        f.debug_struct("ServiceTarget")
            .field("class_name", &self.class_name)
            .field("handlers", &handler_count)
            .finish()
    }
}
