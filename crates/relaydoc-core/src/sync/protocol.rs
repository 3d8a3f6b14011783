//! Wire protocol for channel sync
//!
//! Two message kinds flow over the broadcast channel:
//!
//! - **Content update** ([`MSG_UPDATE`]): a base64 delta plus the sender's
//!   peer identity. Applied directly by receivers.
//! - **State-vector probe** ([`MSG_STATE_VECTOR`]): the sender's document
//!   heads, base64 over a compact postcard encoding. An advertisement:
//!   "here is what I have, send me what I'm missing."
//!
//! ## Message flow
//!
//! ```text
//! Peer A                              Peer B
//!   |                                   |
//!   |--- state_vector {heads A} ------->|
//!   |<-- update {what A is missing} ----|   (first probe from A only)
//!   |<-- state_vector {heads B} --------|
//!   |--- update {what B is missing} --->|
//!   |                                   |
//!   |    (both replicas converged)      |
//! ```
//!
//! Every payload carries `user.id` so replicas can discard their own
//! echoes, and a millisecond timestamp.

use automerge::ChangeHash;
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::types::PeerId;

/// Message kind for content updates
pub const MSG_UPDATE: &str = "update";

/// Message kind for state-vector probes
pub const MSG_STATE_VECTOR: &str = "state_vector";

/// Sender identity embedded in every payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRef {
    /// The sender's peer identity
    pub id: String,
}

/// Payload of a content-update message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePayload {
    /// Base64-encoded delta
    pub update: String,
    /// Sender identity
    pub user: UserRef,
    /// Send time, Unix milliseconds
    pub timestamp: i64,
}

impl UpdatePayload {
    /// Build a content-update payload from an already-encoded delta
    pub fn new(update: String, peer: &PeerId) -> Self {
        Self {
            update,
            user: UserRef {
                id: peer.as_str().to_string(),
            },
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Payload of a state-vector probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbePayload {
    /// Base64-encoded state vector (postcard-encoded document heads)
    #[serde(rename = "stateVector")]
    pub state_vector: String,
    /// Sender identity
    pub user: UserRef,
    /// Send time, Unix milliseconds
    pub timestamp: i64,
}

impl ProbePayload {
    /// Build a probe payload from an already-encoded state vector
    pub fn new(state_vector: String, peer: &PeerId) -> Self {
        Self {
            state_vector,
            user: UserRef {
                id: peer.as_str().to_string(),
            },
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Encode document heads into the binary state-vector wire form
///
/// # Errors
///
/// Returns `SyncError::Serialization` if encoding fails.
pub fn encode_heads(heads: &[ChangeHash]) -> SyncResult<Vec<u8>> {
    let raw: Vec<Vec<u8>> = heads.iter().map(|h| h.0.to_vec()).collect();
    Ok(postcard::to_allocvec(&raw)?)
}

/// Decode the binary state-vector wire form back into document heads
///
/// # Errors
///
/// Returns `SyncError::Serialization` if the postcard framing is corrupt,
/// or `SyncError::Codec` if a head is not a valid change hash.
pub fn decode_heads(data: &[u8]) -> SyncResult<Vec<ChangeHash>> {
    let raw: Vec<Vec<u8>> = postcard::from_bytes(data)?;
    raw.iter()
        .map(|bytes| {
            ChangeHash::try_from(bytes.as_slice())
                .map_err(|e| SyncError::Codec(format!("invalid change hash: {}", e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_payload_field_names() {
        let peer = PeerId::generate();
        let payload = UpdatePayload::new("AAEC".to_string(), &peer);
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["update"], "AAEC");
        assert_eq!(json["user"]["id"], peer.as_str());
        assert!(json["timestamp"].is_i64());
    }

    #[test]
    fn test_probe_payload_uses_camel_case_state_vector() {
        let peer = PeerId::generate();
        let payload = ProbePayload::new("AAA=".to_string(), &peer);
        let json = serde_json::to_value(&payload).unwrap();

        assert!(json.get("stateVector").is_some());
        assert!(json.get("state_vector").is_none());
    }

    #[test]
    fn test_heads_roundtrip() {
        let heads = vec![
            ChangeHash::try_from([0u8; 32].as_slice()).unwrap(),
            ChangeHash::try_from([7u8; 32].as_slice()).unwrap(),
        ];

        let encoded = encode_heads(&heads).unwrap();
        let decoded = decode_heads(&encoded).unwrap();
        assert_eq!(decoded, heads);
    }

    #[test]
    fn test_empty_heads_roundtrip() {
        let encoded = encode_heads(&[]).unwrap();
        assert!(decode_heads(&encoded).unwrap().is_empty());
    }

    #[test]
    fn test_decode_heads_rejects_short_hash() {
        let encoded = postcard::to_allocvec(&vec![vec![1u8, 2, 3]]).unwrap();
        assert!(matches!(
            decode_heads(&encoded),
            Err(SyncError::Codec(_))
        ));
    }

    #[test]
    fn test_decode_heads_rejects_garbage_framing() {
        assert!(decode_heads(&[0xff, 0xff, 0xff, 0xff]).is_err());
    }
}
