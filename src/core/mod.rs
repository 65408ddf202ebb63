//! # Core Components
//!
//! Class model, dynamic values, and the token stream codec.
//!
//! ## Components
//! - **Types**: registry of wire-visible classes and interfaces
//! - **Method**: service method descriptors
//! - **Value**: dynamic argument and result values
//! - **Stream**: token stream constants, flags and escaping
//! - **Reader / Writer**: policy-checked token stream codec
//!
//! ## Security
//! - Every object read is checked against its declared generic type
//! - The serialization policy is consulted before anything is instantiated
//! - Lengths and table sizes are bounded by the tokens actually present
//! - Nesting depth is capped to keep hostile payloads off the stack

pub mod method;
pub mod reader;
pub mod stream;
pub mod types;
pub mod value;
pub mod writer;

/// Maximum object nesting accepted on read and produced on write
pub const MAX_OBJECT_DEPTH: usize = 256;
