//! # Request Decoder
//!
//! Turns an encoded request into an [`RpcRequest`].
//!
//! ## Steps
//! 1. Read the header and select the serialization policy
//! 2. Read the optional RPC token
//! 3. Read the interface name and check it against the expected service class
//! 4. Resolve the interface, which must extend `RemoteService`
//! 5. Read the method name and parameter count, bounded by the stream length
//! 6. Resolve parameter types and find the method overload
//! 7. Deserialize every argument against its generic parameter type

use crate::core::reader::ServerSerializationStreamReader;
use crate::core::stream::{strip_type_signature, StreamFlags};
use crate::core::types::{well_known, TypeBindings, TypeRef, TypeSignature};
use crate::error::constants::{ERR_EMPTY_REQUEST, ERR_INVALID_PARAMETER_COUNT, ERR_NO_DEOBFUSCATION};
use crate::error::{Result, RpcError};
use crate::policy::SerializationPolicyProvider;
use crate::protocol::request::RpcRequest;
use crate::protocol::rpc::Rpc;
use crate::utils::metrics::global_metrics;
use tracing::{debug, instrument, warn};

impl Rpc {
    /// Decode `encoded_request` into a method invocation.
    ///
    /// When `expected_service` is given, the requested interface must be
    /// implemented by that class. When `provider` is given it supplies the
    /// serialization policy; otherwise the legacy policy applies.
    ///
    /// # Errors
    /// - `InvalidArgument` for an empty payload
    /// - `BlockedAccess` when the interface is not implemented by the
    ///   expected service or is not a remote service interface
    /// - `IncompatibleRequest` when the interface, method or a type cannot be
    ///   resolved, or the parameter count is invalid
    /// - `Serialization` for a corrupt stream or a spoofed argument type
    /// - `PolicyViolation` when an argument type is not whitelisted
    #[instrument(skip_all, fields(expected = expected_service), level = "debug")]
    pub fn decode_request(
        &self,
        encoded_request: &str,
        expected_service: Option<&str>,
        provider: Option<&dyn SerializationPolicyProvider>,
    ) -> Result<RpcRequest> {
        if encoded_request.is_empty() {
            return Err(RpcError::InvalidArgument(ERR_EMPTY_REQUEST.to_string()));
        }

        let result = self
            .decode_request_inner(encoded_request, expected_service, provider)
            .map_err(|e| match e {
                RpcError::ClassNotFound(name) => {
                    RpcError::IncompatibleRequest(format!("Could not locate class '{name}'"))
                }
                other => other,
            });

        match &result {
            Ok(request) => {
                global_metrics().request_decoded();
                debug!(request = %request, "Decoded RPC request");
            }
            Err(e) if e.is_blocked() => {
                global_metrics().access_blocked();
                warn!(error = %e, "Blocked RPC request");
            }
            Err(e) => debug!(error = %e, "Failed to decode RPC request"),
        }
        result
    }

    fn decode_request_inner(
        &self,
        encoded_request: &str,
        expected_service: Option<&str>,
        provider: Option<&dyn SerializationPolicyProvider>,
    ) -> Result<RpcRequest> {
        let registry = self.registry().as_ref();
        let mut reader = ServerSerializationStreamReader::prepare_bounded(
            encoded_request,
            registry,
            provider,
            self.default_serialization_policy(),
            self.max_string_table_size(),
        )?
        .with_max_decoded_values(self.max_decoded_values());

        let rpc_token = if reader.has_flags(StreamFlags::RPC_TOKEN_INCLUDED) {
            let token_type = TypeRef::class(well_known::RPC_TOKEN);
            let token_signature = TypeSignature::from(token_type.clone());
            Some(reader.deserialize_value(&token_type, &token_signature, &TypeBindings::new())?)
        } else {
            None
        };

        let raw_interface = reader.read_string()?;
        let interface_name = maybe_deobfuscate(&reader, &raw_interface)?;

        if let Some(service) = expected_service {
            if !self.implements_interface(service, &interface_name) {
                return Err(RpcError::BlockedAccess(format!(
                    "Blocked attempt to access interface '{}', which is not implemented by '{}'; this is either misconfiguration or a hack attempt",
                    interface_name,
                    TypeRef::class(service)
                )));
            }
        }

        let interface = match registry.resolve(&interface_name) {
            Ok(TypeRef::Class(name)) => name,
            _ => {
                return Err(RpcError::IncompatibleRequest(format!(
                    "Could not locate requested interface '{interface_name}' in the type registry"
                )))
            }
        };
        let is_remote_service = registry
            .get(&interface)
            .is_some_and(|descriptor| descriptor.is_interface())
            && registry.is_subtype(&interface, well_known::REMOTE_SERVICE);
        if !is_remote_service {
            return Err(RpcError::BlockedAccess(format!(
                "Blocked attempt to access interface '{}', which doesn't extend RemoteService; this is either misconfiguration or a hack attempt",
                TypeRef::class(interface.as_str())
            )));
        }

        let method_name = reader.read_string()?;
        let param_count = reader.read_int()?;
        let param_count = usize::try_from(param_count)
            .ok()
            .filter(|count| *count <= reader.remaining_tokens())
            .ok_or_else(|| RpcError::IncompatibleRequest(ERR_INVALID_PARAMETER_COUNT.to_string()))?;

        let mut parameter_types = Vec::with_capacity(param_count);
        for index in 0..param_count {
            let raw_type = reader.read_string()?;
            let type_name = maybe_deobfuscate(&reader, &raw_type)?;
            let ty = registry.resolve(&type_name).map_err(|_| {
                RpcError::IncompatibleRequest(format!(
                    "Parameter {index} is of an unknown type '{type_name}'"
                ))
            })?;
            parameter_types.push(ty);
        }

        let method = registry
            .find_method(&interface, &method_name, &parameter_types)
            .ok_or_else(|| {
                RpcError::IncompatibleRequest(format_method_not_found(
                    &interface,
                    &method_name,
                    &parameter_types,
                ))
            })?;

        let bindings = method.type_bindings();
        let mut parameters = Vec::with_capacity(param_count);
        for (ty, generic) in parameter_types.iter().zip(method.generic_param_types()) {
            parameters.push(reader.deserialize_value(ty, generic, &bindings)?);
        }

        Ok(RpcRequest::new(
            method,
            parameters,
            rpc_token,
            reader.serialization_policy(),
            reader.flags(),
        ))
    }
}

/// Map a wire type name to a class name: through the policy's type ids when
/// names are elided, otherwise by dropping the `/signature` suffix. An id the
/// policy does not know is passed through and fails resolution later.
fn maybe_deobfuscate(reader: &ServerSerializationStreamReader<'_>, name: &str) -> Result<String> {
    if !reader.has_flags(StreamFlags::ELIDE_TYPE_NAMES) {
        return Ok(strip_type_signature(name).to_string());
    }
    let policy = reader.serialization_policy();
    let obfuscator = policy
        .type_name_obfuscator()
        .ok_or_else(|| RpcError::IncompatibleRequest(ERR_NO_DEOBFUSCATION.to_string()))?;
    Ok(obfuscator
        .class_name_for_type_id(name)
        .unwrap_or(name)
        .to_string())
}

fn format_method_not_found(interface: &str, method_name: &str, parameter_types: &[TypeRef]) -> String {
    let params: Vec<String> = parameter_types.iter().map(ToString::to_string).collect();
    format!(
        "Could not locate requested method '{}({})' in interface '{}'",
        method_name,
        params.join(", "),
        TypeRef::class(interface)
    )
}
