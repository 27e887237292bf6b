//! Conversation registry port and its in-process implementation.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use waypoint_types::config::RepositoryConfig;
use waypoint_types::error::RepositoryError;
use waypoint_types::id::ConversationId;

use super::{Conversation, ConversationLock};

/// Manages the set of live conversations.
///
/// Implementations must be safe to share between request threads.
pub trait ConversationRegistry: Send + Sync {
    /// Begin a new conversation with a fresh id.
    fn begin(&self) -> Result<Arc<Conversation>, RepositoryError>;

    fn get(&self, id: &ConversationId) -> Result<Arc<Conversation>, RepositoryError>;

    /// End a conversation, discarding its continuations.
    fn end(&self, id: &ConversationId) -> Result<(), RepositoryError>;

    fn lock(&self, id: &ConversationId) -> Result<ConversationLock, RepositoryError> {
        Ok(self.get(id)?.lock().clone())
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// LocalConversationRegistry
// ---------------------------------------------------------------------------

/// Process-local registry backed by a concurrent map.
///
/// With `max_conversations > 0`, beginning a conversation beyond the limit
/// ends the oldest live one. The victim's lock is taken first, so a request
/// in flight on it completes before it disappears.
pub struct LocalConversationRegistry {
    conversations: DashMap<ConversationId, Arc<Conversation>>,
    order: Mutex<VecDeque<ConversationId>>,
    max_continuations: usize,
    max_conversations: usize,
}

impl LocalConversationRegistry {
    pub fn new(max_continuations: usize, max_conversations: usize) -> Self {
        Self {
            conversations: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            max_continuations,
            max_conversations,
        }
    }

    pub fn from_config(config: &RepositoryConfig) -> Self {
        Self::new(config.max_continuations, config.max_conversations)
    }

    pub fn max_continuations(&self) -> usize {
        self.max_continuations
    }

    pub fn max_conversations(&self) -> usize {
        self.max_conversations
    }

    fn evict(&self, id: &ConversationId) {
        let Some(conversation) = self.conversations.get(id).map(|c| Arc::clone(c.value())) else {
            return;
        };
        let _guard = conversation.lock().acquire();
        self.conversations.remove(id);
        tracing::debug!(
            conversation_id = %id,
            max_conversations = self.max_conversations,
            "ended oldest conversation"
        );
    }
}

impl Default for LocalConversationRegistry {
    fn default() -> Self {
        Self::from_config(&RepositoryConfig::default())
    }
}

impl ConversationRegistry for LocalConversationRegistry {
    fn begin(&self) -> Result<Arc<Conversation>, RepositoryError> {
        let conversation = loop {
            let id = ConversationId::generate();
            if let Entry::Vacant(slot) = self.conversations.entry(id) {
                let conversation = Arc::new(Conversation::new(id, self.max_continuations));
                slot.insert(Arc::clone(&conversation));
                break conversation;
            }
        };

        let oldest = {
            let mut order = self.order.lock();
            order.push_back(conversation.id());
            if self.max_conversations > 0 && order.len() > self.max_conversations {
                order.pop_front()
            } else {
                None
            }
        };
        if let Some(oldest) = oldest {
            self.evict(&oldest);
        }

        tracing::debug!(conversation_id = %conversation.id(), "began conversation");
        Ok(conversation)
    }

    fn get(&self, id: &ConversationId) -> Result<Arc<Conversation>, RepositoryError> {
        self.conversations
            .get(id)
            .map(|c| Arc::clone(c.value()))
            .ok_or(RepositoryError::ConversationNotFound(*id))
    }

    fn end(&self, id: &ConversationId) -> Result<(), RepositoryError> {
        if self.conversations.remove(id).is_none() {
            return Err(RepositoryError::ConversationNotFound(*id));
        }
        self.order.lock().retain(|c| c != id);
        tracing::debug!(conversation_id = %id, "ended conversation");
        Ok(())
    }

    fn len(&self) -> usize {
        self.conversations.len()
    }
}

impl fmt::Debug for LocalConversationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalConversationRegistry")
            .field("conversations", &self.conversations.len())
            .field("max_continuations", &self.max_continuations)
            .field("max_conversations", &self.max_conversations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn begin_get_end() {
        let registry = LocalConversationRegistry::default();
        let conversation = registry.begin().unwrap();
        let id = conversation.id();
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.get(&id).unwrap(), &conversation));

        registry.end(&id).unwrap();
        assert!(registry.is_empty());
        assert!(registry.get(&id).unwrap_err().is_not_found());
        assert!(registry.end(&id).unwrap_err().is_not_found());
    }

    #[test]
    fn conversations_get_distinct_ids() {
        let registry = LocalConversationRegistry::default();
        let a = registry.begin().unwrap();
        let b = registry.begin().unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn continuation_bound_is_applied() {
        let registry = LocalConversationRegistry::new(7, 0);
        let conversation = registry.begin().unwrap();
        assert_eq!(conversation.continuations().max_continuations(), 7);
    }

    #[test]
    fn lock_is_shared_with_conversation() {
        let registry = LocalConversationRegistry::default();
        let conversation = registry.begin().unwrap();
        let lock = registry.lock(&conversation.id()).unwrap();
        let _guard = lock.acquire();
        assert!(conversation.lock().is_locked());
    }

    #[test]
    fn oldest_conversation_is_ended_past_limit() {
        let registry = LocalConversationRegistry::new(5, 2);
        let first = registry.begin().unwrap();
        let second = registry.begin().unwrap();
        let third = registry.begin().unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.get(&first.id()).is_err());
        assert!(registry.get(&second.id()).is_ok());
        assert!(registry.get(&third.id()).is_ok());
    }

    #[test]
    fn ended_conversations_leave_eviction_order() {
        let registry = LocalConversationRegistry::new(5, 2);
        let first = registry.begin().unwrap();
        let second = registry.begin().unwrap();
        registry.end(&first.id()).unwrap();
        let third = registry.begin().unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.get(&second.id()).is_ok());
        assert!(registry.get(&third.id()).is_ok());
    }

    #[test]
    fn eviction_waits_for_lock_holder() {
        let registry = Arc::new(LocalConversationRegistry::new(5, 1));
        let first = registry.begin().unwrap();
        let barrier = Arc::new(Barrier::new(2));

        let holder = {
            let lock = first.lock().clone();
            let registry = Arc::clone(&registry);
            let barrier = Arc::clone(&barrier);
            let id = first.id();
            thread::spawn(move || {
                let _guard = lock.acquire();
                barrier.wait();
                thread::sleep(Duration::from_millis(50));
                registry.get(&id).is_ok()
            })
        };

        barrier.wait();
        registry.begin().unwrap();
        assert!(holder.join().unwrap(), "conversation vanished while locked");
        assert!(registry.get(&first.id()).is_err());
        assert_eq!(registry.len(), 1);
    }
}
