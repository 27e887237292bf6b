//! Flow execution keys and the codec between a key and its string form.
//!
//! A key renders as `_c<conversation id>_k<continuation id>`. Ids are lowercase
//! hex, so neither marker can appear inside a component and the encoded key is
//! usable verbatim as a URL path segment, query value or form field.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RepositoryError;
use crate::id::{ContinuationId, ConversationId};

/// Marker that precedes the conversation id.
pub const CONVERSATION_ID_PREFIX: &str = "_c";

/// Marker that precedes the continuation id.
pub const CONTINUATION_ID_PREFIX: &str = "_k";

/// Opaque handle a client presents to resume a paused flow.
///
/// Equality and hashing are component-wise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowExecutionKey {
    conversation_id: ConversationId,
    continuation_id: ContinuationId,
}

impl FlowExecutionKey {
    pub fn new(conversation_id: ConversationId, continuation_id: ContinuationId) -> Self {
        Self {
            conversation_id,
            continuation_id,
        }
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    pub fn continuation_id(&self) -> ContinuationId {
        self.continuation_id
    }

    /// A key in the same conversation pointing at another continuation.
    pub fn with_continuation(&self, continuation_id: ContinuationId) -> Self {
        Self::new(self.conversation_id, continuation_id)
    }
}

impl fmt::Display for FlowExecutionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&KeyCodec::encode(&self.conversation_id, &self.continuation_id))
    }
}

impl FromStr for FlowExecutionKey {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyCodec::decode(s)
    }
}

/// Converts keys to and from their external string form.
///
/// Decoding is purely syntactic: a well-formed key naming a conversation that
/// does not exist still decodes. Existence is checked by the repository.
pub struct KeyCodec;

impl KeyCodec {
    pub fn encode(conversation_id: &ConversationId, continuation_id: &ContinuationId) -> String {
        format!(
            "{CONVERSATION_ID_PREFIX}{conversation_id}{CONTINUATION_ID_PREFIX}{continuation_id}"
        )
    }

    pub fn decode(encoded: &str) -> Result<FlowExecutionKey, RepositoryError> {
        let rest = encoded
            .strip_prefix(CONVERSATION_ID_PREFIX)
            .ok_or_else(|| malformed(encoded, "missing conversation marker '_c'"))?;
        let (conversation, continuation) = rest
            .split_once(CONTINUATION_ID_PREFIX)
            .ok_or_else(|| malformed(encoded, "missing continuation marker '_k'"))?;

        let conversation_id = ConversationId::parse(conversation)
            .map_err(|e| malformed(encoded, format!("conversation id: {e}")))?;
        let continuation_id = ContinuationId::parse(continuation)
            .map_err(|e| malformed(encoded, format!("continuation id: {e}")))?;

        Ok(FlowExecutionKey::new(conversation_id, continuation_id))
    }

    /// Human-readable description of the key format.
    pub fn format() -> String {
        format!(
            "{CONVERSATION_ID_PREFIX}<conversationId>{CONTINUATION_ID_PREFIX}<continuationId>"
        )
    }
}

fn malformed(encoded: &str, reason: impl Into<String>) -> RepositoryError {
    RepositoryError::MalformedKey {
        key: encoded.to_string(),
        reason: reason.into(),
    }
}
