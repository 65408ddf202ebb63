//! # rpcgate
//!
//! Server side of a remote procedure call protocol whose clients cannot be
//! trusted: requests are decoded into method invocations, checked against the
//! service's declared interfaces and a per-client serialization whitelist,
//! invoked, and the outcome encoded back.
//!
//! ## Modules
//! - **core**: type registry, method bindings, dynamic values, token stream codec
//! - **policy**: serialization policies, the policy file loader and the policy cache
//! - **protocol**: request decoder, response encoder, invoker, security gate, dispatcher
//! - **config**: TOML and environment configuration
//! - **utils**: logging setup and metrics
//!
//! ## Example
//! ```rust
//! use rpcgate::core::method::MethodBinding;
//! use rpcgate::core::types::{well_known, TypeDescriptor, TypeRef, TypeRegistry};
//! use rpcgate::core::value::Value;
//! use rpcgate::protocol::{RemoteServiceDispatcher, RequestPayloadBuilder, Rpc, ServiceTarget};
//! use std::sync::Arc;
//!
//! let echo = MethodBinding::new("echo")
//!     .param(TypeRef::class(well_known::STRING))
//!     .returns(TypeRef::class(well_known::STRING));
//! let registry = Arc::new(
//!     TypeRegistry::with_core_types()
//!         .with(
//!             TypeDescriptor::interface("com.example.Echo")
//!                 .implements(well_known::REMOTE_SERVICE)
//!                 .method(echo.clone()),
//!         )
//!         .with(TypeDescriptor::class("com.example.EchoImpl").implements("com.example.Echo")),
//! );
//!
//! let target = ServiceTarget::new("com.example.EchoImpl");
//! target.register(&echo, |args| Ok(args[0].clone())).unwrap();
//! let dispatcher = RemoteServiceDispatcher::new(Arc::new(Rpc::new(Arc::clone(&registry))), Arc::new(target));
//!
//! let request = RequestPayloadBuilder::new(&registry, "com.example.Echo", "echo")
//!     .param(TypeRef::class(well_known::STRING), Value::string("hi"))
//!     .build()
//!     .unwrap();
//! assert_eq!(dispatcher.handle(&request), "//OK7|0|1|hi|1|");
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod policy;
pub mod protocol;
pub mod utils;

pub use crate::config::RpcConfig;
pub use crate::core::method::MethodBinding;
pub use crate::core::types::{TypeDescriptor, TypeRef, TypeRegistry, TypeSignature};
pub use crate::core::value::{ObjectValue, ServiceResult, Value};
pub use crate::error::{Result, RpcError};
pub use crate::policy::{
    FilePolicyProvider, SerializationPolicy, SerializationPolicyLoader, SerializationPolicyProvider,
    StandardSerializationPolicy,
};
pub use crate::protocol::{RemoteServiceDispatcher, RequestPayloadBuilder, Rpc, RpcRequest, ServiceTarget};
