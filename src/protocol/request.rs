//! Decoded request.

use crate::core::method::MethodBinding;
use crate::core::stream::StreamFlags;
use crate::core::value::Value;
use crate::policy::SerializationPolicy;
use std::fmt;
use std::sync::Arc;

/// A fully resolved call: method, arguments, optional RPC token, and the
/// policy and flags the response must be encoded with.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    method: Arc<MethodBinding>,
    parameters: Vec<Value>,
    rpc_token: Option<Value>,
    serialization_policy: Arc<dyn SerializationPolicy>,
    flags: StreamFlags,
}

impl RpcRequest {
    pub fn new(
        method: Arc<MethodBinding>,
        parameters: Vec<Value>,
        rpc_token: Option<Value>,
        serialization_policy: Arc<dyn SerializationPolicy>,
        flags: StreamFlags,
    ) -> Self {
        Self {
            method,
            parameters,
            rpc_token,
            serialization_policy,
            flags,
        }
    }

    pub fn method(&self) -> &MethodBinding {
        &self.method
    }

    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    pub fn rpc_token(&self) -> Option<&Value> {
        self.rpc_token.as_ref()
    }

    pub fn serialization_policy(&self) -> &Arc<dyn SerializationPolicy> {
        &self.serialization_policy
    }

    pub fn flags(&self) -> StreamFlags {
        self.flags
    }
}

impl fmt::Display for RpcRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self.parameters.iter().map(ToString::to_string).collect();
        write!(
            f,
            "{}.{}({})",
            self.method.interface().replace('$', "."),
            self.method.name(),
            args.join(", ")
        )
    }
}
