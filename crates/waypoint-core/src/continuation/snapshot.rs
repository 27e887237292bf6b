//! Snapshot codec: execution state to self-contained bytes and back.
//!
//! Blob layout:
//!
//! ```text
//! +-------+---------+-------+-----------+-----------------+
//! | magic | version | flags | crc32 (LE)| payload         |
//! | WPSN  | 1 byte  | 1 byte| 4 bytes   | JSON, maybe zstd|
//! +-------+---------+-------+-----------+-----------------+
//! ```
//!
//! The checksum covers the payload as stored (after compression). Flag bit 0
//! marks a zstd payload; restore honours the flag regardless of how the codec
//! is configured, so toggling compression never strands existing blobs.

use std::borrow::Cow;

use waypoint_types::error::RepositoryError;
use waypoint_types::execution::FlowExecution;

pub const SNAPSHOT_MAGIC: &[u8; 4] = b"WPSN";
pub const SNAPSHOT_FORMAT_VERSION: u8 = 1;

const FLAG_ZSTD: u8 = 0b0000_0001;
const HEADER_LEN: usize = 10;
const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotCodec {
    compress: bool,
}

impl SnapshotCodec {
    pub fn new(compress: bool) -> Self {
        Self { compress }
    }

    pub fn compresses(&self) -> bool {
        self.compress
    }

    /// Serialize the execution's persistable state.
    ///
    /// Fails with `NotSerializable` naming the first transient value found,
    /// e.g. `sessions[1].scope.cart`.
    pub fn capture(&self, execution: &FlowExecution) -> Result<Vec<u8>, RepositoryError> {
        if let Some(path) = first_transient_path(execution) {
            return Err(RepositoryError::NotSerializable {
                path,
                reason: "transient values cannot be snapshotted".to_string(),
            });
        }

        let json = serde_json::to_vec(execution).map_err(|e| RepositoryError::NotSerializable {
            path: "execution".to_string(),
            reason: e.to_string(),
        })?;

        let (flags, payload) = if self.compress {
            let compressed = zstd::encode_all(json.as_slice(), ZSTD_LEVEL).map_err(|e| {
                RepositoryError::NotSerializable {
                    path: "execution".to_string(),
                    reason: format!("compression failed: {e}"),
                }
            })?;
            (FLAG_ZSTD, compressed)
        } else {
            (0, json)
        };

        let mut blob = Vec::with_capacity(HEADER_LEN + payload.len());
        blob.extend_from_slice(SNAPSHOT_MAGIC);
        blob.push(SNAPSHOT_FORMAT_VERSION);
        blob.push(flags);
        blob.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        blob.extend_from_slice(&payload);
        Ok(blob)
    }

    /// Rebuild a detached execution from a blob produced by [`capture`].
    ///
    /// [`capture`]: SnapshotCodec::capture
    pub fn restore(&self, blob: &[u8]) -> Result<FlowExecution, RepositoryError> {
        if blob.len() < HEADER_LEN {
            return Err(corrupt(format!("truncated: {} bytes", blob.len())));
        }
        let (header, payload) = blob.split_at(HEADER_LEN);
        if &header[..4] != SNAPSHOT_MAGIC {
            return Err(corrupt("bad magic"));
        }
        if header[4] != SNAPSHOT_FORMAT_VERSION {
            return Err(corrupt(format!("unsupported format version {}", header[4])));
        }
        let flags = header[5];
        if flags & !FLAG_ZSTD != 0 {
            return Err(corrupt(format!("unknown flags {flags:#04x}")));
        }
        let expected = u32::from_le_bytes([header[6], header[7], header[8], header[9]]);
        let actual = crc32fast::hash(payload);
        if actual != expected {
            return Err(corrupt(format!(
                "checksum mismatch: expected {expected:08x}, got {actual:08x}"
            )));
        }

        let json: Cow<'_, [u8]> = if flags & FLAG_ZSTD != 0 {
            Cow::Owned(zstd::decode_all(payload).map_err(|e| corrupt(format!("decompression failed: {e}")))?)
        } else {
            Cow::Borrowed(payload)
        };

        serde_json::from_slice(&json).map_err(|e| corrupt(format!("invalid payload: {e}")))
    }
}

fn corrupt(reason: impl Into<String>) -> RepositoryError {
    RepositoryError::CorruptSnapshot(reason.into())
}

fn first_transient_path(execution: &FlowExecution) -> Option<String> {
    for (index, session) in execution.sessions().iter().enumerate() {
        if let Some(name) = session.scope().transient_names().next() {
            return Some(format!("sessions[{index}].scope.{name}"));
        }
    }
    execution
        .conversation_scope()
        .transient_names()
        .next()
        .map(|name| format!("conversation_scope.{name}"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use waypoint_types::definition::{FlowDefinition, FlowDefinitionLocator};
    use waypoint_types::execution::ExecutionStatus;
    use waypoint_types::scope::ScopeValue;

    use super::*;

    struct NoFlows;

    impl FlowDefinitionLocator for NoFlows {
        fn get_flow_definition(&self, _flow_id: &str) -> Option<Arc<FlowDefinition>> {
            None
        }
    }

    fn paused_in_subflow() -> FlowExecution {
        let flow = Arc::new(
            FlowDefinition::builder("checkout")
                .view("cart", &[("pay", "payment")])
                .subflow("payment", "card-entry", &[])
                .inline_flow(
                    FlowDefinition::builder("card-entry")
                        .view("enter", &[])
                        .build(),
                )
                .build(),
        );
        let mut execution = FlowExecution::new(flow, Vec::new());
        execution.start(&NoFlows).unwrap();
        execution
            .flow_scope_mut()
            .unwrap()
            .put("items", json!([{"sku": "A1", "qty": 2}]));
        execution.signal_event("pay", &NoFlows).unwrap();
        execution.flow_scope_mut().unwrap().put("card_type", json!("visa"));
        execution.conversation_scope_mut().put("user", json!("ada"));
        execution
    }

    #[test]
    fn capture_restore_preserves_state() {
        let codec = SnapshotCodec::default();
        let execution = paused_in_subflow();
        let blob = codec.capture(&execution).unwrap();
        assert_eq!(&blob[..4], SNAPSHOT_MAGIC);
        assert_eq!(blob[5], 0);

        let restored = codec.restore(&blob).unwrap();
        assert_eq!(restored.status(), ExecutionStatus::Active);
        assert_eq!(restored.sessions(), execution.sessions());
        assert_eq!(restored.current_state(), Some(("card-entry", "enter")));
        assert_eq!(restored.conversation_scope(), execution.conversation_scope());
    }

    #[test]
    fn restored_execution_is_detached() {
        let codec = SnapshotCodec::default();
        let restored = codec.restore(&codec.capture(&paused_in_subflow()).unwrap()).unwrap();
        assert!(restored.flow().is_none());
        assert!(restored.sessions().iter().all(|s| !s.is_attached()));
        assert!(restored.listeners().is_empty());
    }

    #[test]
    fn compressed_blobs_restore_with_any_codec() {
        let execution = paused_in_subflow();
        let blob = SnapshotCodec::new(true).capture(&execution).unwrap();
        assert_eq!(blob[5] & FLAG_ZSTD, FLAG_ZSTD);

        let restored = SnapshotCodec::new(false).restore(&blob).unwrap();
        assert_eq!(restored.sessions(), execution.sessions());
    }

    #[test]
    fn transient_value_is_reported_by_path() {
        let mut execution = paused_in_subflow();
        execution
            .flow_scope_mut()
            .unwrap()
            .put("cart", ScopeValue::transient(std::sync::Mutex::new(0_u8)));

        let err = SnapshotCodec::default().capture(&execution).unwrap_err();
        match err {
            RepositoryError::NotSerializable { path, .. } => {
                assert_eq!(path, "sessions[1].scope.cart");
            }
            other => panic!("expected NotSerializable, got {other:?}"),
        }
    }

    #[test]
    fn transient_in_conversation_scope_is_reported() {
        let mut execution = paused_in_subflow();
        execution
            .conversation_scope_mut()
            .put("socket", ScopeValue::transient(()));
        let err = SnapshotCodec::default().capture(&execution).unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::NotSerializable { ref path, .. } if path == "conversation_scope.socket"
        ));
    }

    #[test]
    fn rejects_corruption() {
        let codec = SnapshotCodec::default();
        let blob = codec.capture(&paused_in_subflow()).unwrap();

        let mut flipped = blob.clone();
        let last = flipped.len() - 1;
        flipped[last] ^= 0xff;

        let mut bad_magic = blob.clone();
        bad_magic[0] = b'X';

        let mut bad_version = blob.clone();
        bad_version[4] = 9;

        let mut bad_flags = blob.clone();
        bad_flags[5] = 0x80;

        let cases: Vec<(&str, Vec<u8>)> = vec![
            ("empty", Vec::new()),
            ("truncated", blob[..HEADER_LEN - 1].to_vec()),
            ("magic", bad_magic),
            ("version", bad_version),
            ("flags", bad_flags),
            ("checksum", flipped),
        ];
        for (name, bytes) in cases {
            let err = codec.restore(&bytes).unwrap_err();
            assert!(
                matches!(err, RepositoryError::CorruptSnapshot(_)),
                "{name}: {err:?}"
            );
        }
    }

    #[test]
    fn rejects_valid_checksum_over_garbage() {
        let payload = b"not json at all";
        let mut blob = SNAPSHOT_MAGIC.to_vec();
        blob.push(SNAPSHOT_FORMAT_VERSION);
        blob.push(FLAG_ZSTD);
        blob.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
        blob.extend_from_slice(payload);
        let err = SnapshotCodec::default().restore(&blob).unwrap_err();
        assert!(matches!(err, RepositoryError::CorruptSnapshot(ref m) if m.contains("decompression")));

        blob[5] = 0;
        let err = SnapshotCodec::default().restore(&blob).unwrap_err();
        assert!(matches!(err, RepositoryError::CorruptSnapshot(ref m) if m.contains("invalid payload")));
    }
}
