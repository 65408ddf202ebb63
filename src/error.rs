//! # Error Types
//!
//! Error taxonomy for the decode → authorize → invoke → encode pipeline.
//!
//! ## Error Categories
//! - **Malformed input**: structurally invalid payloads and policy files
//!   (`Serialization`, `PolicyParse`, `InvalidArgument`, `OversizedPayload`)
//! - **Incompatible request**: the request names something this server cannot
//!   resolve (`IncompatibleRequest`, `ClassNotFound`)
//! - **Blocked access**: the security gate refused the request
//!   (`BlockedAccess`, `PolicyViolation`)
//! - **Unexpected failure**: a service method threw something it never declared
//!   (`UnexpectedFailure`)
//!
//! Every variant is safe to log verbatim. Only [`RpcError::client_message`]
//! may be shown to the remote caller.
//!
//! ## Example Usage
//! ```rust
//! use rpcgate::error::{RpcError, Result};
//! use tracing::{error, info};
//!
//! fn check_payload(payload: &str) -> Result<()> {
//!     if payload.is_empty() {
//!         return Err(RpcError::InvalidArgument("encoded request cannot be empty".into()));
//!     }
//!     Ok(())
//! }
//!
//! match check_payload("") {
//!     Ok(()) => info!("payload accepted"),
//!     Err(e) => error!(error = %e, "payload rejected"),
//! }
//! ```

use crate::core::value::ObjectValue;
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Returned to callers whenever the real cause must stay server-side
    pub const GENERIC_FAILURE_MSG: &str =
        "The call failed on the server; see server log for details";

    /// Decoder preconditions
    pub const ERR_EMPTY_REQUEST: &str = "encodedRequest cannot be empty";
    pub const ERR_INVALID_PARAMETER_COUNT: &str = "Invalid number of parameters";
    pub const ERR_NO_DEOBFUSCATION: &str =
        "RPC request was encoded with obfuscated type names, but the SerializationPolicy in use does not support type name deobfuscation";

    /// Stream errors
    pub const ERR_UNEXPECTED_END: &str = "Unexpected end of serialization stream";
    pub const ERR_NULL_STRING: &str = "Unexpected null string reference";

    /// Dispatcher / cache errors
    pub const ERR_HANDLERS_WRITE_LOCK: &str = "Failed to acquire write lock on service handlers";
    pub const ERR_HANDLERS_READ_LOCK: &str = "Failed to acquire read lock on service handlers";
    pub const ERR_LOCK_POISONED: &str = "Synchronization primitive poisoned";
}

/// RpcError is the primary error type for all pipeline operations
#[derive(Error, Debug)]
pub enum RpcError {
    /// Programmer error at an API boundary (empty payload, missing cause)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The request addresses an interface, method or type this server cannot resolve
    #[error("Incompatible request: {0}")]
    IncompatibleRequest(String),

    /// Security gate rejection; a misconfiguration or an attack attempt
    #[error("Blocked access: {0}")]
    BlockedAccess(String),

    /// Corrupt or truncated token stream, or a value that cannot be written
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A class was not admitted by the serialization policy in effect
    #[error("Serialization policy violation: {0}")]
    PolicyViolation(String),

    /// Hard parse failure of a policy file
    #[error("Malformed serialization policy at line {line}: {message}")]
    PolicyParse { line: usize, message: String },

    #[error("Class not found: {0}")]
    ClassNotFound(String),

    /// A service method threw an exception it did not declare
    #[error("Unexpected failure: {message}")]
    UnexpectedFailure {
        message: String,
        cause: ObjectValue,
    },

    #[error("RPC token rejected: {0}")]
    TokenRejected(String),

    #[error("Payload too large: {0} bytes")]
    OversizedPayload(usize),

    #[error("Synchronization primitive poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RpcError {
    /// Description that may be sent to the remote caller.
    ///
    /// Incompatibility, stream, policy and token failures carry messages that
    /// were written to be shown to clients. Everything else collapses into
    /// [`constants::GENERIC_FAILURE_MSG`].
    pub fn client_message(&self) -> String {
        match self {
            RpcError::IncompatibleRequest(msg)
            | RpcError::Serialization(msg)
            | RpcError::PolicyViolation(msg)
            | RpcError::TokenRejected(msg) => msg.clone(),
            _ => constants::GENERIC_FAILURE_MSG.to_string(),
        }
    }

    /// True for rejections raised by the security gate
    pub fn is_blocked(&self) -> bool {
        matches!(self, RpcError::BlockedAccess(_))
    }
}

/// Type alias for Results using RpcError
pub type Result<T> = std::result::Result<T, RpcError>;
