//! Method invocation.

use crate::core::method::MethodBinding;
use crate::core::stream::{StreamFlags, RESPONSE_FAILURE_MARKER};
use crate::core::types::TypeRef;
use crate::core::value::Value;
use crate::error::{Result, RpcError};
use crate::policy::SerializationPolicy;
use crate::protocol::rpc::Rpc;
use crate::protocol::target::ServiceTarget;
use crate::utils::metrics::{global_metrics, Timer};
use std::sync::Arc;
use tracing::{error, instrument, warn};

impl Rpc {
    /// Run `target`'s handler for `method` with `args` and encode the outcome.
    ///
    /// A normal return is encoded with the success encoder, a thrown
    /// exception with the failure encoder.
    ///
    /// # Errors
    /// - `BlockedAccess` when the target has no handler for the method, when
    ///   the arguments do not fit the method, or when the return value does
    ///   not match the declared return type
    /// - `UnexpectedFailure` when the handler throws an undeclared exception
    #[instrument(skip_all, fields(method = method.name()), level = "debug")]
    pub fn invoke_and_encode_response(
        &self,
        target: &ServiceTarget,
        method: &MethodBinding,
        args: &[Value],
        policy: &Arc<dyn SerializationPolicy>,
        flags: StreamFlags,
    ) -> Result<String> {
        let metrics = global_metrics();

        let Some(handler) = target.handler_for(method)? else {
            metrics.access_blocked();
            let err = RpcError::BlockedAccess(format!(
                "Blocked attempt to access inaccessible method '{}' on target '{}'",
                method.source_representation(),
                TypeRef::class(target.class_name())
            ));
            warn!(error = %err, "Service method is not accessible");
            return Err(err);
        };

        if !self.arguments_match(method, args) {
            metrics.access_blocked();
            let rendered: Vec<String> = args.iter().map(ToString::to_string).collect();
            let err = RpcError::BlockedAccess(format!(
                "Blocked attempt to invoke method '{}' on target '{}' with invalid arguments [{}]",
                method.source_representation(),
                TypeRef::class(target.class_name()),
                rendered.join(", ")
            ));
            warn!(error = %err, "Service method called with invalid arguments");
            return Err(err);
        }

        let outcome = {
            let _timer = Timer::start("service_method");
            handler(args)
        };

        let encoded = match outcome {
            Ok(value) => self.encode_response_for_success(method, &value, policy, flags),
            Err(thrown) => self.encode_response_for_failure(Some(method), &thrown, policy, flags),
        };

        match &encoded {
            Ok(payload) if payload.starts_with(RESPONSE_FAILURE_MARKER) => {
                metrics.declared_failure()
            }
            Ok(_) => metrics.request_succeeded(),
            Err(e @ RpcError::UnexpectedFailure { .. }) => {
                metrics.unexpected_failure();
                error!(error = %e, "Service method threw an undeclared exception");
            }
            Err(e) if e.is_blocked() => {
                metrics.access_blocked();
                warn!(error = %e, "Service method returned a value of the wrong type");
            }
            Err(_) => {}
        }
        encoded
    }

    fn arguments_match(&self, method: &MethodBinding, args: &[Value]) -> bool {
        let params = method.erased_param_types();
        params.len() == args.len()
            && params
                .iter()
                .zip(args)
                .all(|(declared, value)| self.value_matches(declared, value))
    }
}
