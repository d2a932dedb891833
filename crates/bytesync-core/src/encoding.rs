//! Text encodings for binary fields.
//!
//! Binary payloads travel as standard base64 on the wire, hashes as hex.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;

use crate::error::CoreError;

/// Encode bytes as standard base64.
pub fn to_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode standard base64 into bytes.
pub fn from_base64(s: &str) -> Result<Bytes, CoreError> {
    Ok(Bytes::from(STANDARD.decode(s)?))
}

/// Keep the first and last four characters of a long identifier.
pub fn shorten(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= 8 {
        return s.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Serde adapter for `Bytes` fields carried as base64 strings.
///
/// Use with `#[serde(with = "bytesync_core::encoding::base64_bytes")]`.
pub mod base64_bytes {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_base64(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::from_base64(&s).map_err(serde::de::Error::custom)
    }
}
