//! Flow execution repository facade.
//!
//! Entry point for hosts: create a new execution, save it to get the key the
//! client will present next, load it back by key on the following request.
//!
//! Every save appends an immutable continuation to the conversation, so
//! older keys keep loading the state they captured (back button, duplicate
//! tabs) until the per-conversation bound evicts them. Saves and loads hold
//! the conversation lock for their whole duration; hosts that need a
//! load-modify-save cycle to be atomic take the lock themselves via
//! [`FlowExecutionRepository::lock`].

pub mod restorer;

use std::fmt;
use std::sync::Arc;

use waypoint_types::config::RepositoryConfig;
use waypoint_types::definition::FlowDefinitionLocator;
use waypoint_types::error::RepositoryError;
use waypoint_types::execution::FlowExecution;
use waypoint_types::id::{ContinuationId, ConversationId};
use waypoint_types::key::{FlowExecutionKey, KeyCodec};
use waypoint_types::scope::Scope;

use crate::continuation::{Continuation, SnapshotCodec};
use crate::conversation::{
    Conversation, ConversationGuard, ConversationLock, ConversationRegistry, LocalConversationRegistry,
};
use crate::engine::{DefaultFlowExecutionFactory, FlowExecutionFactory, FlowExecutionListenerLoader};

pub use restorer::StateRestorer;

pub struct FlowExecutionRepository<R: ConversationRegistry = LocalConversationRegistry> {
    registry: R,
    locator: Arc<dyn FlowDefinitionLocator>,
    factory: Arc<dyn FlowExecutionFactory>,
    restorer: StateRestorer,
    codec: SnapshotCodec,
    always_generate_new_next_key: bool,
}

impl FlowExecutionRepository<LocalConversationRegistry> {
    /// Repository over a process-local registry sized from `config`.
    pub fn from_config(config: &RepositoryConfig, locator: Arc<dyn FlowDefinitionLocator>) -> Self {
        Self::new(LocalConversationRegistry::from_config(config), locator, config)
    }
}

impl<R: ConversationRegistry> FlowExecutionRepository<R> {
    pub fn new(registry: R, locator: Arc<dyn FlowDefinitionLocator>, config: &RepositoryConfig) -> Self {
        Self {
            registry,
            restorer: StateRestorer::new(Arc::clone(&locator)),
            locator,
            factory: Arc::new(DefaultFlowExecutionFactory::default()),
            codec: SnapshotCodec::new(config.compress_snapshots),
            always_generate_new_next_key: config.always_generate_new_next_key,
        }
    }

    /// Use `loader` for both new and restored executions.
    pub fn with_listener_loader(self, loader: Arc<dyn FlowExecutionListenerLoader>) -> Self {
        self.with_components(loader, Scope::new())
    }

    /// Install the listener loader and execution attributes applied to both
    /// new and restored executions.
    pub fn with_components(mut self, loader: Arc<dyn FlowExecutionListenerLoader>, execution_attributes: Scope) -> Self {
        self.factory = Arc::new(DefaultFlowExecutionFactory::new(
            Arc::clone(&loader),
            execution_attributes.clone(),
        ));
        self.restorer = self
            .restorer
            .with_listener_loader(loader)
            .with_execution_attributes(execution_attributes);
        self
    }

    /// Replace the factory for new executions. Restored executions are
    /// unaffected.
    pub fn with_factory(mut self, factory: Arc<dyn FlowExecutionFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn locator(&self) -> &Arc<dyn FlowDefinitionLocator> {
        &self.locator
    }

    /// Decode a client-supplied key string.
    pub fn parse_key(&self, encoded: &str) -> Result<FlowExecutionKey, RepositoryError> {
        KeyCodec::decode(encoded)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Begin a conversation and build a new, not yet started execution.
    ///
    /// The returned key names the new conversation. Nothing is stored under
    /// it until the execution is saved.
    pub fn create(&self, flow_id: &str) -> Result<(FlowExecutionKey, FlowExecution), RepositoryError> {
        let flow = self
            .locator
            .get_flow_definition(flow_id)
            .ok_or_else(|| RepositoryError::DefinitionNotFound {
                flow_id: flow_id.to_string(),
                state_id: None,
            })?;
        let conversation = self.registry.begin()?;
        let key = FlowExecutionKey::new(conversation.id(), ContinuationId::generate());
        let execution = self.factory.create_execution(flow);
        tracing::debug!(flow_id, key = %key, "created flow execution");
        Ok((key, execution))
    }

    /// Persist `execution` and return the key for its next request.
    ///
    /// An execution that is no longer active is not stored: its conversation
    /// is ended and `None` is returned. A key whose conversation is gone,
    /// including one ended while this call waited for its lock, starts a new
    /// conversation.
    pub fn save(
        &self,
        previous: Option<&FlowExecutionKey>,
        execution: &FlowExecution,
    ) -> Result<Option<FlowExecutionKey>, RepositoryError> {
        if !execution.is_active() {
            if let Some(previous) = previous {
                self.end_finished(previous)?;
            }
            return Ok(None);
        }

        let snapshot = self.codec.capture(execution)?;

        let (conversation, key, _guard) = self.lock_target(previous)?;
        let size = snapshot.len();
        conversation
            .continuations()
            .put(Continuation::new(key.continuation_id(), snapshot));
        conversation.set_conversation_scope(execution.conversation_scope().clone());

        tracing::debug!(
            key = %key,
            flow_id = execution.flow_id(),
            snapshot_bytes = size,
            continuations = conversation.continuations().len(),
            "saved flow execution"
        );
        Ok(Some(key))
    }

    /// Restore the execution saved under `key`.
    pub fn load(&self, key: &FlowExecutionKey) -> Result<FlowExecution, RepositoryError> {
        let conversation = self.registry.get(&key.conversation_id()).inspect_err(|e| {
            tracing::warn!(key = %key, error = %e, "flow execution load failed");
        })?;
        let _guard = conversation.lock().acquire();
        if !self.is_live(&conversation) {
            tracing::warn!(key = %key, "conversation ended while waiting for its lock");
            return Err(RepositoryError::ConversationNotFound(key.conversation_id()));
        }

        let continuation = conversation
            .continuations()
            .get(&key.continuation_id())
            .inspect_err(|e| {
                tracing::warn!(key = %key, error = %e, "flow execution load failed");
            })?;
        let detached = self.codec.restore(continuation.snapshot())?;
        let execution = self
            .restorer
            .restore(detached, conversation.conversation_scope())?;

        tracing::debug!(key = %key, flow_id = execution.flow_id(), "loaded flow execution");
        Ok(execution)
    }

    /// Decode `encoded` and load it.
    pub fn load_encoded(&self, encoded: &str) -> Result<FlowExecution, RepositoryError> {
        let key = self.parse_key(encoded)?;
        self.load(&key)
    }

    /// The key the next save under `previous` will return, if its
    /// conversation still exists.
    pub fn next_key(&self, previous: &FlowExecutionKey) -> Result<FlowExecutionKey, RepositoryError> {
        self.registry.get(&previous.conversation_id())?;
        Ok(self.advance(previous))
    }

    /// The lock guarding a conversation, for host-driven critical sections.
    pub fn lock(&self, conversation_id: &ConversationId) -> Result<ConversationLock, RepositoryError> {
        self.registry.lock(conversation_id)
    }

    /// End a conversation. Every key in it stops loading.
    pub fn invalidate(&self, conversation_id: &ConversationId) -> Result<(), RepositoryError> {
        self.end_locked(conversation_id)?;
        tracing::debug!(conversation_id = %conversation_id, "invalidated conversation");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    pub fn conversation_count(&self) -> usize {
        self.registry.len()
    }

    pub fn continuation_count(&self, conversation_id: &ConversationId) -> Result<usize, RepositoryError> {
        Ok(self.registry.get(conversation_id)?.continuations().len())
    }

    pub fn is_locked(&self, conversation_id: &ConversationId) -> Result<bool, RepositoryError> {
        Ok(self.registry.get(conversation_id)?.lock().is_locked())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn advance(&self, previous: &FlowExecutionKey) -> FlowExecutionKey {
        if self.always_generate_new_next_key {
            previous.with_continuation(ContinuationId::generate())
        } else {
            *previous
        }
    }

    /// Whether `conversation` is still the registered one for its id.
    fn is_live(&self, conversation: &Arc<Conversation>) -> bool {
        matches!(
            self.registry.get(&conversation.id()),
            Ok(current) if Arc::ptr_eq(&current, conversation)
        )
    }

    /// Pick the conversation a save writes into and take its lock.
    ///
    /// The conversation of `previous` is only used if it is still live once
    /// the lock is held; otherwise a new conversation is begun.
    fn lock_target(
        &self,
        previous: Option<&FlowExecutionKey>,
    ) -> Result<(Arc<Conversation>, FlowExecutionKey, ConversationGuard), RepositoryError> {
        if let Some(previous) = previous {
            match self.registry.get(&previous.conversation_id()) {
                Ok(conversation) => {
                    let guard = conversation.lock().acquire();
                    if self.is_live(&conversation) {
                        return Ok((conversation, self.advance(previous), guard));
                    }
                    tracing::debug!(
                        conversation_id = %previous.conversation_id(),
                        "conversation ended while waiting for its lock, saving into a new one"
                    );
                }
                Err(e) if e.is_not_found() => {
                    tracing::debug!(
                        conversation_id = %previous.conversation_id(),
                        "conversation gone, saving into a new one"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        // A bounded registry may end a fresh conversation before we lock it.
        loop {
            let conversation = self.registry.begin()?;
            let guard = conversation.lock().acquire();
            if self.is_live(&conversation) {
                let key = FlowExecutionKey::new(conversation.id(), ContinuationId::generate());
                return Ok((conversation, key, guard));
            }
        }
    }

    /// End a conversation while holding its lock, so in-flight requests on
    /// it finish first.
    fn end_locked(&self, conversation_id: &ConversationId) -> Result<(), RepositoryError> {
        let conversation = self.registry.get(conversation_id)?;
        let _guard = conversation.lock().acquire();
        self.registry.end(conversation_id)
    }

    fn end_finished(&self, previous: &FlowExecutionKey) -> Result<(), RepositoryError> {
        let conversation_id = previous.conversation_id();
        match self.end_locked(&conversation_id) {
            Ok(()) => {
                tracing::debug!(conversation_id = %conversation_id, "execution inactive, conversation ended");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl<R: ConversationRegistry + fmt::Debug> fmt::Debug for FlowExecutionRepository<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowExecutionRepository")
            .field("registry", &self.registry)
            .field("codec", &self.codec)
            .field("always_generate_new_next_key", &self.always_generate_new_next_key)
            .finish_non_exhaustive()
    }
}
