//! Wire messages. Each one is a JSON object carried in a single frame; the
//! field names are part of the protocol and must not change.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 1230;

/// Handshake proof: hex SHA-256 of the encoded session key. Sent in the clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyProof {
    pub hash: String,
}

/// Opening request from the client after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub strict: bool,
}

/// Every relative path on the server, sent only in strict mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub paths: Vec<String>,
}

/// One server file offered to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOffer {
    pub path: String,
    pub hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferReply {
    pub wanted: bool,
}

/// Header preceding a sealed data frame with the raw file bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Transfer {
    File { path: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_message_shapes_match_wire_format() {
        assert_eq!(
            serde_json::to_value(KeyProof { hash: "ab".into() }).unwrap(),
            json!({"hash": "ab"})
        );
        assert_eq!(
            serde_json::to_value(SyncRequest { strict: true }).unwrap(),
            json!({"strict": true})
        );
        assert_eq!(
            serde_json::to_value(Manifest {
                paths: vec!["a.txt".into(), "b/c.txt".into()]
            })
            .unwrap(),
            json!({"paths": ["a.txt", "b/c.txt"]})
        );
        assert_eq!(
            serde_json::to_value(FileOffer { path: "a.txt".into(), hash: "00".into() }).unwrap(),
            json!({"path": "a.txt", "hash": "00"})
        );
        assert_eq!(
            serde_json::to_value(OfferReply { wanted: false }).unwrap(),
            json!({"wanted": false})
        );
        assert_eq!(
            serde_json::to_value(Transfer::File { path: "b/c.txt".into() }).unwrap(),
            json!({"type": "file", "path": "b/c.txt"})
        );
    }

    #[test]
    fn test_accepts_messages_written_by_other_peers() {
        // Other implementations separate keys with a space after the colon.
        let offer: FileOffer = serde_json::from_str(r#"{"path": "x", "hash": "ff"}"#).unwrap();
        assert_eq!(offer.path, "x");

        let transfer: Transfer = serde_json::from_str(r#"{"type": "file", "path": "x"}"#).unwrap();
        assert_eq!(transfer, Transfer::File { path: "x".into() });
    }

    #[test]
    fn test_unknown_transfer_type_is_rejected() {
        let result: Result<Transfer, _> = serde_json::from_str(r#"{"type": "dir", "path": "x"}"#);
        assert!(result.is_err());
    }
}
