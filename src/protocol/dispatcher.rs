//! # Dispatcher
//!
//! One remote call from request payload to response payload, independent of
//! the transport carrying it.
//!
//! Requests the server cannot understand are answered with an encoded
//! `IncompatibleRemoteServiceException` so the client can tell its code is
//! out of date. Blocked access and undeclared exceptions are never described
//! to the client.

use crate::config::{LimitsConfig, RpcConfig};
use crate::core::types::{well_known, TypeRegistry};
use crate::core::value::{ObjectValue, Value};
use crate::error::constants::GENERIC_FAILURE_MSG;
use crate::error::{Result, RpcError};
use crate::policy::{FilePolicyProvider, SerializationPolicyProvider};
use crate::protocol::request::RpcRequest;
use crate::protocol::rpc::Rpc;
use crate::protocol::target::ServiceTarget;
use crate::utils::metrics::global_metrics;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Checks the RPC token a request carried before the service method runs.
pub trait RpcTokenValidator: Send + Sync {
    /// # Errors
    /// `RpcError::TokenRejected` when the call must not proceed.
    fn validate(&self, token: Option<&Value>, request: &RpcRequest) -> Result<()>;
}

impl<F> RpcTokenValidator for F
where
    F: Fn(Option<&Value>, &RpcRequest) -> Result<()> + Send + Sync,
{
    fn validate(&self, token: Option<&Value>, request: &RpcRequest) -> Result<()> {
        self(token, request)
    }
}

/// Serves calls against a single [`ServiceTarget`].
pub struct RemoteServiceDispatcher {
    rpc: Arc<Rpc>,
    target: Arc<ServiceTarget>,
    policy_provider: Option<Arc<dyn SerializationPolicyProvider>>,
    token_validator: Option<Arc<dyn RpcTokenValidator>>,
    max_payload_size: usize,
}

impl RemoteServiceDispatcher {
    pub fn new(rpc: Arc<Rpc>, target: Arc<ServiceTarget>) -> Self {
        Self {
            rpc,
            target,
            policy_provider: None,
            token_validator: None,
            max_payload_size: LimitsConfig::default().max_payload_size,
        }
    }

    /// Build a dispatcher with a file policy provider and the configured limits
    pub fn from_config(
        config: &RpcConfig,
        registry: Arc<TypeRegistry>,
        target: Arc<ServiceTarget>,
    ) -> Self {
        let provider = FilePolicyProvider::new(&config.policy, Arc::clone(&registry));
        let rpc = Rpc::new(registry)
            .with_max_string_table_size(config.limits.max_string_table_size)
            .with_max_decoded_values(config.limits.max_decoded_values);
        info!(
            target_class = target.class_name(),
            policy_dir = %config.policy.base_dir.display(),
            "Creating remote service dispatcher"
        );
        Self::new(Arc::new(rpc), target)
            .with_policy_provider(Arc::new(provider))
            .with_limits(&config.limits)
    }

    pub fn with_policy_provider(mut self, provider: Arc<dyn SerializationPolicyProvider>) -> Self {
        self.policy_provider = Some(provider);
        self
    }

    pub fn with_token_validator(mut self, validator: Arc<dyn RpcTokenValidator>) -> Self {
        self.token_validator = Some(validator);
        self
    }

    pub fn with_limits(mut self, limits: &LimitsConfig) -> Self {
        self.max_payload_size = limits.max_payload_size;
        self
    }

    pub fn rpc(&self) -> &Arc<Rpc> {
        &self.rpc
    }

    pub fn target(&self) -> &Arc<ServiceTarget> {
        &self.target
    }

    /// Decode, invoke and encode one call.
    ///
    /// # Errors
    /// - `OversizedPayload` when the payload exceeds the configured limit
    /// - `InvalidArgument` for an empty payload
    /// - `BlockedAccess` and `UnexpectedFailure` from the gate and invoker
    /// - any error raised while encoding a failure response
    #[instrument(skip_all, fields(target = self.target.class_name(), bytes = payload.len()))]
    pub fn process_call(&self, payload: &str) -> Result<String> {
        if payload.len() > self.max_payload_size {
            return Err(RpcError::OversizedPayload(payload.len()));
        }
        let metrics = global_metrics();
        metrics.request_received();

        let request = match self.rpc.decode_request(
            payload,
            Some(self.target.class_name()),
            self.policy_provider.as_deref(),
        ) {
            Ok(request) => request,
            Err(
                e @ (RpcError::IncompatibleRequest(_)
                | RpcError::Serialization(_)
                | RpcError::PolicyViolation(_)),
            ) => {
                metrics.incompatible_request();
                warn!(error = %e, "An IncompatibleRemoteServiceException was thrown while processing this call");
                let cause = ObjectValue::exception(
                    well_known::INCOMPATIBLE_REMOTE_SERVICE_EXCEPTION,
                    e.client_message(),
                );
                return self.rpc.encode_response_for_failed_request(None, &cause);
            }
            Err(e) => return Err(e),
        };

        self.process_request(&request)
    }

    /// Validate the token of a decoded request, then invoke and encode.
    ///
    /// # Errors
    /// See [`RemoteServiceDispatcher::process_call`].
    pub fn process_request(&self, request: &RpcRequest) -> Result<String> {
        if let Some(validator) = &self.token_validator {
            if let Err(e) = validator.validate(request.rpc_token(), request) {
                warn!(error = %e, request = %request, "An RpcTokenException was thrown while processing this call");
                let cause = ObjectValue::exception(well_known::RPC_TOKEN_EXCEPTION, e.client_message());
                return self
                    .rpc
                    .encode_response_for_failed_request(Some(request), &cause);
            }
        }

        self.rpc.invoke_and_encode_response(
            &self.target,
            request.method(),
            request.parameters(),
            request.serialization_policy(),
            request.flags(),
        )
    }

    /// [`RemoteServiceDispatcher::process_call`] with every error reduced to
    /// the generic failure message the client may see.
    pub fn handle(&self, payload: &str) -> String {
        match self.process_call(payload) {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Exception while dispatching incoming RPC call");
                GENERIC_FAILURE_MSG.to_string()
            }
        }
    }
}

impl fmt::Debug for RemoteServiceDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteServiceDispatcher")
            .field("target", &self.target)
            .field("has_policy_provider", &self.policy_provider.is_some())
            .field("has_token_validator", &self.token_validator.is_some())
            .field("max_payload_size", &self.max_payload_size)
            .finish()
    }
}
