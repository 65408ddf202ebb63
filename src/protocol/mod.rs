//! # Protocol Layer
//!
//! The decode → authorize → invoke → encode pipeline.
//!
//! ## Components
//! - **Rpc**: shared pipeline state (type registry, legacy policy, gate)
//! - **Decoder**: payload → [`RpcRequest`]
//! - **Gate**: interface-implementation and declared-exception checks
//! - **Invoker**: runs a [`ServiceTarget`] handler and encodes its outcome
//! - **Encoder**: `//OK` / `//EX` response payloads
//! - **Builder**: client-side request payloads
//! - **Dispatcher**: one call from payload to response, with failure mapping
//!
//! ## Security
//! - The requested interface must be implemented by the target class
//! - Argument objects are type-checked and policy-checked before instantiation
//! - Undeclared exceptions never reach the client

pub mod builder;
pub mod decoder;
pub mod dispatcher;
pub mod encoder;
pub mod gate;
pub mod invoker;
pub mod request;
pub mod rpc;
pub mod target;

#[cfg(test)]
mod tests;

pub use builder::RequestPayloadBuilder;
pub use dispatcher::{RemoteServiceDispatcher, RpcTokenValidator};
pub use gate::{is_expected_exception, SecurityGate};
pub use request::RpcRequest;
pub use rpc::Rpc;
pub use target::{MethodHandler, ServiceTarget};
