//! Conversations: the unit of locking, lifetime and continuation grouping.

pub mod lock;
pub mod registry;

use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use waypoint_types::id::ConversationId;
use waypoint_types::scope::{Scope, ScopeValue};

use crate::continuation::ContinuationStore;

pub use lock::{ConversationGuard, ConversationLock};
pub use registry::{ConversationRegistry, LocalConversationRegistry};

/// Attribute under which the latest saved conversation scope is kept.
pub const CONVERSATION_SCOPE_ATTRIBUTE: &str = "scope";

/// One logical user interaction spanning many requests.
///
/// Owns its lock, its bounded continuation store and an attribute bag. The
/// repository keeps the most recently saved conversation scope in the bag
/// under [`CONVERSATION_SCOPE_ATTRIBUTE`]; other names are free for hosts.
pub struct Conversation {
    id: ConversationId,
    created_at: DateTime<Utc>,
    lock: ConversationLock,
    continuations: ContinuationStore,
    attributes: RwLock<Scope>,
}

impl Conversation {
    pub fn new(id: ConversationId, max_continuations: usize) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            lock: ConversationLock::new(),
            continuations: ContinuationStore::new(id, max_continuations),
            attributes: RwLock::new(Scope::new()),
        }
    }

    pub fn id(&self) -> ConversationId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn lock(&self) -> &ConversationLock {
        &self.lock
    }

    pub fn continuations(&self) -> &ContinuationStore {
        &self.continuations
    }

    pub fn attribute(&self, name: &str) -> Option<ScopeValue> {
        self.attributes.read().get(name).cloned()
    }

    pub fn put_attribute(&self, name: impl Into<String>, value: impl Into<ScopeValue>) -> Option<ScopeValue> {
        self.attributes.write().put(name, value)
    }

    pub fn remove_attribute(&self, name: &str) -> Option<ScopeValue> {
        self.attributes.write().remove(name)
    }

    /// Scope shared by every continuation of this conversation, as of the
    /// latest save.
    pub fn conversation_scope(&self) -> Option<Scope> {
        self.attributes
            .read()
            .get(CONVERSATION_SCOPE_ATTRIBUTE)
            .and_then(|value| value.downcast_ref::<Scope>())
            .cloned()
    }

    pub fn set_conversation_scope(&self, scope: Scope) {
        self.attributes
            .write()
            .put(CONVERSATION_SCOPE_ATTRIBUTE, ScopeValue::transient(scope));
    }
}

impl fmt::Debug for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversation")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("lock", &self.lock)
            .field("continuations", &self.continuations)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn attributes_round_trip() {
        let conversation = Conversation::new(ConversationId::generate(), 5);
        assert!(conversation.attribute("locale").is_none());
        conversation.put_attribute("locale", json!("en-GB"));
        assert_eq!(
            conversation.attribute("locale"),
            Some(ScopeValue::Json(json!("en-GB")))
        );
        assert!(conversation.remove_attribute("locale").is_some());
        assert!(conversation.attribute("locale").is_none());
    }

    #[test]
    fn conversation_scope_starts_unset() {
        let conversation = Conversation::new(ConversationId::generate(), 5);
        assert!(conversation.conversation_scope().is_none());
        let scope: Scope = [("user", json!("ada"))].into_iter().collect();
        conversation.set_conversation_scope(scope.clone());
        assert_eq!(conversation.conversation_scope(), Some(scope));
    }

    #[test]
    fn conversation_scope_lives_in_attribute_bag() {
        let conversation = Conversation::new(ConversationId::generate(), 5);
        conversation.put_attribute("locale", json!("en-GB"));
        let scope: Scope = [("user", json!("ada"))].into_iter().collect();
        conversation.set_conversation_scope(scope.clone());

        let stored = conversation.attribute(CONVERSATION_SCOPE_ATTRIBUTE).unwrap();
        assert_eq!(stored.downcast_ref::<Scope>(), Some(&scope));
        assert!(conversation.attribute("locale").is_some());

        conversation.remove_attribute(CONVERSATION_SCOPE_ATTRIBUTE);
        assert!(conversation.conversation_scope().is_none());
    }

    #[test]
    fn store_inherits_bound() {
        let conversation = Conversation::new(ConversationId::generate(), 3);
        assert_eq!(conversation.continuations().max_continuations(), 3);
        assert!(conversation.continuations().is_empty());
    }
}
