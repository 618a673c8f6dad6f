//! Serialization and deserialization of [`StoreMessage`] frames.
//!
//! WebSocket keeps message boundaries, so a frame is just the postcard
//! encoding of one message with no length prefix.

use crate::protocol::StoreMessage;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Encodes a [`StoreMessage`] into a byte vector using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the message cannot be serialized.
pub fn encode(msg: &StoreMessage) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(msg).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`StoreMessage`] from a byte slice using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the bytes cannot be deserialized.
pub fn decode(bytes: &[u8]) -> Result<StoreMessage, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FailureReason;
    use crate::task::{Task, TaskId, TaskPatch, TaskStatus};

    #[test]
    fn snapshot_round_trip() {
        let original = StoreMessage::Snapshot {
            collection: "Tasks".to_string(),
            tasks: vec![
                Task {
                    id: TaskId::new("a"),
                    title: "Buy milk".to_string(),
                    status: TaskStatus::ToDo,
                },
                Task {
                    id: TaskId::new("b"),
                    title: "Ship release".to_string(),
                    status: TaskStatus::Done,
                },
            ],
        };
        let bytes = encode(&original).unwrap();
        assert_eq!(decode(&bytes).unwrap(), original);
    }

    #[test]
    fn update_round_trip() {
        let original = StoreMessage::Update {
            request_id: 42,
            collection: "Tasks".to_string(),
            id: TaskId::new("a"),
            patch: TaskPatch::Status(TaskStatus::InProgress),
        };
        let bytes = encode(&original).unwrap();
        assert_eq!(decode(&bytes).unwrap(), original);
    }

    #[test]
    fn failed_round_trip() {
        let original = StoreMessage::Failed {
            request_id: 1,
            reason: FailureReason::Invalid("bad".to_string()),
        };
        let bytes = encode(&original).unwrap();
        assert_eq!(decode(&bytes).unwrap(), original);
    }

    #[test]
    fn decode_corrupted_bytes_returns_error() {
        let result = decode(&[0xff, 0xfe, 0xfd, 0xfc, 0xfb]);
        assert!(result.is_err());
    }

    #[test]
    fn decode_truncated_bytes_returns_error() {
        let original = StoreMessage::Hello {
            project_id: "real-time".to_string(),
            access_key: "secret".to_string(),
        };
        let bytes = encode(&original).unwrap();
        let truncated = &bytes[..bytes.len() / 2];
        assert!(decode(truncated).is_err());
    }

    #[test]
    fn decode_empty_bytes_returns_error() {
        assert!(decode(&[]).is_err());
    }
}
