//! # Response Encoder
//!
//! Encodes a return value (`//OK`) or a thrown exception (`//EX`).
//!
//! A return value is checked against the method's declared return type and a
//! thrown exception against its declared exceptions before anything is
//! written, so a misbehaving service cannot leak an undeclared object.

use crate::core::method::MethodBinding;
use crate::core::stream::{StreamFlags, RESPONSE_FAILURE_MARKER, RESPONSE_SUCCESS_MARKER};
use crate::core::types::TypeRef;
use crate::core::value::{ObjectValue, Value};
use crate::core::writer::SerializationStreamWriter;
use crate::error::{Result, RpcError};
use crate::policy::SerializationPolicy;
use crate::protocol::gate::is_expected_exception;
use crate::protocol::request::RpcRequest;
use crate::protocol::rpc::Rpc;
use std::sync::Arc;
use tracing::{debug, instrument};

impl Rpc {
    /// Encode a normal return from `method`.
    ///
    /// # Errors
    /// - `BlockedAccess` when `value` does not match the declared return type
    /// - `PolicyViolation` / `Serialization` when the value cannot be written
    #[instrument(skip_all, fields(method = method.name()), level = "debug")]
    pub fn encode_response_for_success(
        &self,
        method: &MethodBinding,
        value: &Value,
        policy: &Arc<dyn SerializationPolicy>,
        flags: StreamFlags,
    ) -> Result<String> {
        let return_type = method.erased_return_type();
        if return_type != TypeRef::Void && !self.value_matches(&return_type, value) {
            return Err(RpcError::BlockedAccess(format!(
                "Type '{}' does not match the return type in the method's signature: '{}'",
                value.type_name(),
                method.source_representation()
            )));
        }
        self.encode_response(&return_type, value, false, flags, policy)
    }

    /// Encode an exception thrown by `method`.
    ///
    /// With a method, `cause` must be one of its declared checked exceptions.
    ///
    /// # Errors
    /// - `UnexpectedFailure` when `cause` was not declared
    /// - `PolicyViolation` / `Serialization` when the exception cannot be written
    #[instrument(skip_all, fields(cause = %cause.class), level = "debug")]
    pub fn encode_response_for_failure(
        &self,
        method: Option<&MethodBinding>,
        cause: &ObjectValue,
        policy: &Arc<dyn SerializationPolicy>,
        flags: StreamFlags,
    ) -> Result<String> {
        if let Some(method) = method {
            if !is_expected_exception(self.registry(), method, &cause.class) {
                return Err(RpcError::UnexpectedFailure {
                    message: format!(
                        "Service method '{}' threw an unexpected exception: {}",
                        method.source_representation(),
                        cause
                    ),
                    cause: cause.clone(),
                });
            }
        }
        self.encode_response(
            &TypeRef::class(cause.class.as_str()),
            &Value::Object(cause.clone()),
            true,
            flags,
            policy,
        )
    }

    /// Encode a failure that happened before or around invocation, without
    /// a declared-exception check. Uses the request's policy and flags when
    /// there is a request, the legacy policy and default flags otherwise.
    pub fn encode_response_for_failed_request(
        &self,
        request: Option<&RpcRequest>,
        cause: &ObjectValue,
    ) -> Result<String> {
        match request {
            Some(request) => self.encode_response_for_failure(
                None,
                cause,
                request.serialization_policy(),
                request.flags(),
            ),
            None => self.encode_response_for_failure(
                None,
                cause,
                &self.default_serialization_policy(),
                StreamFlags::DEFAULT,
            ),
        }
    }

    fn encode_response(
        &self,
        response_type: &TypeRef,
        value: &Value,
        was_thrown: bool,
        flags: StreamFlags,
        policy: &Arc<dyn SerializationPolicy>,
    ) -> Result<String> {
        let mut stream = SerializationStreamWriter::new(self.registry(), Arc::clone(policy), flags);
        if *response_type != TypeRef::Void {
            stream.serialize_value(value, response_type)?;
        }
        let marker = if was_thrown {
            RESPONSE_FAILURE_MARKER
        } else {
            RESPONSE_SUCCESS_MARKER
        };
        let payload = format!("{marker}{}", stream.to_payload());
        debug!(thrown = was_thrown, bytes = payload.len(), "Encoded RPC response");
        Ok(payload)
    }
}
