use thiserror::Error;

use crate::id::ConversationId;
use crate::id::ContinuationId;

/// Errors from flow execution repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("malformed flow execution key '{key}': {reason}")]
    MalformedKey { key: String, reason: String },

    #[error("no conversation '{0}' exists (it ended or never existed)")]
    ConversationNotFound(ConversationId),

    #[error("no continuation '{continuation_id}' in conversation '{conversation_id}'")]
    ContinuationNotFound {
        conversation_id: ConversationId,
        continuation_id: ContinuationId,
    },

    #[error("flow definition '{flow_id}' not found{}", state_suffix(.state_id))]
    DefinitionNotFound {
        flow_id: String,
        state_id: Option<String>,
    },

    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("value at '{path}' is not serializable: {reason}")]
    NotSerializable { path: String, reason: String },
}

fn state_suffix(state_id: &Option<String>) -> String {
    match state_id {
        Some(state) => format!(" (missing state '{state}')"),
        None => String::new(),
    }
}

impl RepositoryError {
    /// True for the "it's gone" family: expired, ended, evicted, forged.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ConversationNotFound(_) | Self::ContinuationNotFound { .. }
        )
    }

    pub fn is_malformed_key(&self) -> bool {
        matches!(self, Self::MalformedKey { .. })
    }
}

/// Errors raised by the flow engine while driving an execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("execution is not active")]
    NotActive,

    #[error("execution has already been started")]
    AlreadyStarted,

    #[error("no transition for event '{event}' from state '{state_id}' of flow '{flow_id}'")]
    NoTransition {
        flow_id: String,
        state_id: String,
        event: String,
    },

    #[error("flow '{flow_id}' has no state '{state_id}'")]
    UnknownState { flow_id: String, state_id: String },

    #[error("flow '{0}' could not be resolved")]
    UnknownFlow(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_family() {
        let conversation_id = ConversationId::generate();
        assert!(RepositoryError::ConversationNotFound(conversation_id).is_not_found());
        assert!(
            RepositoryError::ContinuationNotFound {
                conversation_id,
                continuation_id: ContinuationId::generate(),
            }
            .is_not_found()
        );
        let malformed = RepositoryError::MalformedKey {
            key: "x".into(),
            reason: "bad".into(),
        };
        assert!(!malformed.is_not_found());
        assert!(malformed.is_malformed_key());
    }

    #[test]
    fn definition_not_found_message_names_state() {
        let err = RepositoryError::DefinitionNotFound {
            flow_id: "checkout".into(),
            state_id: Some("payment".into()),
        };
        assert_eq!(
            err.to_string(),
            "flow definition 'checkout' not found (missing state 'payment')"
        );
        let err = RepositoryError::DefinitionNotFound {
            flow_id: "checkout".into(),
            state_id: None,
        };
        assert_eq!(err.to_string(), "flow definition 'checkout' not found");
    }
}
