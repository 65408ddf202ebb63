//! # Token Stream Format
//!
//! Constants and string escaping shared by the reader and the writer.
//!
//! ## Layout
//! ```text
//! version|flags|N|s1|...|sN|token|token|...|
//! ```
//! Strings are referenced by their 1-based table index; index `0` is `null`.
//! Responses are prefixed with `//OK` or `//EX`.

use crate::error::{Result, RpcError};
use std::ops::BitOr;

/// Version written by this implementation
pub const SERIALIZATION_STREAM_VERSION: i32 = 7;
/// Oldest version still accepted from clients
pub const SERIALIZATION_STREAM_MIN_VERSION: i32 = 5;

pub const RPC_SEPARATOR_CHAR: char = '|';

pub const RESPONSE_SUCCESS_MARKER: &str = "//OK";
pub const RESPONSE_FAILURE_MARKER: &str = "//EX";

/// Per-request stream flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StreamFlags(u32);

impl StreamFlags {
    pub const NONE: StreamFlags = StreamFlags(0);
    /// Type names are replaced by policy-assigned type ids
    pub const ELIDE_TYPE_NAMES: StreamFlags = StreamFlags(0x1);
    /// An RPC token object precedes the service interface name
    pub const RPC_TOKEN_INCLUDED: StreamFlags = StreamFlags(0x2);
    pub const VALID_MASK: StreamFlags = StreamFlags(0x3);
    pub const DEFAULT: StreamFlags = StreamFlags::NONE;

    /// Reject bits outside [`StreamFlags::VALID_MASK`]
    pub const fn from_bits(bits: u32) -> Option<Self> {
        if bits & !Self::VALID_MASK.0 == 0 {
            Some(StreamFlags(bits))
        } else {
            None
        }
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: StreamFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: StreamFlags) {
        self.0 |= other.0;
    }
}

impl BitOr for StreamFlags {
    type Output = StreamFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        StreamFlags(self.0 | rhs.0)
    }
}

/// Escape a string-table entry so it never contains the separator
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            RPC_SEPARATOR_CHAR => out.push_str("\\!"),
            '\0' => out.push_str("\\0"),
            other => out.push(other),
        }
    }
    out
}

/// Inverse of [`escape_string`]
pub fn unescape_string(s: &str) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('!') => out.push(RPC_SEPARATOR_CHAR),
            Some('0') => out.push('\0'),
            Some(other) => {
                return Err(RpcError::Serialization(format!(
                    "Unexpected escape character '{other}' in string table"
                )))
            }
            None => {
                return Err(RpcError::Serialization(
                    "Dangling escape character at end of string".to_string(),
                ))
            }
        }
    }
    Ok(out)
}

/// Drop the `/signature` suffix of a type name sent without elision
pub fn strip_type_signature(type_signature: &str) -> &str {
    match type_signature.find('/') {
        Some(index) => &type_signature[..index],
        None => type_signature,
    }
}
