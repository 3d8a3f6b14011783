//! Base64 codec for wire payloads
//!
//! The broadcast channel carries JSON, so binary deltas and state vectors
//! are base64-encoded into string-safe form. Stateless function pair.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::SyncResult;

/// Encode raw delta bytes into the string-safe wire form
pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode a wire string back into raw delta bytes
///
/// # Errors
///
/// Returns `SyncError::Codec` if the input is not valid base64.
pub fn decode(data: &str) -> SyncResult<Vec<u8>> {
    Ok(STANDARD.decode(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;

    #[test]
    fn test_roundtrip() {
        let data = vec![0u8, 1, 2, 255, 254];
        let encoded = encode(&data);
        assert_eq!(decode(&encoded).unwrap(), data);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result = decode("!!! not base64 !!!");
        assert!(matches!(result, Err(SyncError::Codec(_))));
    }
}
