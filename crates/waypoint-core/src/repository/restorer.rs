//! Reattaches live references to a freshly restored execution.

use std::fmt;
use std::sync::Arc;

use waypoint_types::definition::{FlowDefinitionLocator, resolve_session_flow};
use waypoint_types::error::RepositoryError;
use waypoint_types::execution::FlowExecution;
use waypoint_types::scope::Scope;

use crate::engine::{FlowExecutionListenerLoader, StaticListenerLoader};

/// Turns a detached execution back into a runnable one.
///
/// For each session, the flow definition is resolved from the root flow,
/// then the root's inline flows, then the global locator, and the session's
/// state must exist in it. Listeners come from the listener loader keyed by
/// the root flow, the conversation scope is replaced with the conversation's
/// copy when one is supplied, and execution attributes are installed.
///
/// Restoring an already attached execution yields the same result.
pub struct StateRestorer {
    locator: Arc<dyn FlowDefinitionLocator>,
    listener_loader: Arc<dyn FlowExecutionListenerLoader>,
    execution_attributes: Scope,
}

impl StateRestorer {
    pub fn new(locator: Arc<dyn FlowDefinitionLocator>) -> Self {
        Self {
            locator,
            listener_loader: Arc::new(StaticListenerLoader::default()),
            execution_attributes: Scope::new(),
        }
    }

    pub fn with_listener_loader(mut self, listener_loader: Arc<dyn FlowExecutionListenerLoader>) -> Self {
        self.listener_loader = listener_loader;
        self
    }

    pub fn with_execution_attributes(mut self, execution_attributes: Scope) -> Self {
        self.execution_attributes = execution_attributes;
        self
    }

    pub fn restore(
        &self,
        mut execution: FlowExecution,
        conversation_scope: Option<Scope>,
    ) -> Result<FlowExecution, RepositoryError> {
        let flow_id = execution.flow_id().to_string();

        match self.locator.get_flow_definition(&flow_id) {
            Some(root) => {
                for session in execution.sessions_mut() {
                    let flow = resolve_session_flow(&root, session.flow_id(), &*self.locator)
                        .ok_or_else(|| RepositoryError::DefinitionNotFound {
                            flow_id: session.flow_id().to_string(),
                            state_id: None,
                        })?;
                    if !flow.contains_state(session.state_id()) {
                        return Err(RepositoryError::DefinitionNotFound {
                            flow_id: session.flow_id().to_string(),
                            state_id: Some(session.state_id().to_string()),
                        });
                    }
                    session.attach(flow);
                }
                let listeners = self.listener_loader.listeners(&root);
                execution.set_listeners(listeners);
                execution.set_flow(Some(root));
            }
            None if execution.is_active() => {
                return Err(RepositoryError::DefinitionNotFound {
                    flow_id,
                    state_id: None,
                });
            }
            None => {
                tracing::debug!(flow_id = %flow_id, "restoring inactive execution without its definition");
            }
        }

        if let Some(scope) = conversation_scope {
            execution.set_conversation_scope(scope);
        }
        execution.set_attributes(self.execution_attributes.clone());
        Ok(execution)
    }
}

impl fmt::Debug for StateRestorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateRestorer")
            .field("execution_attributes", &self.execution_attributes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use waypoint_types::definition::FlowDefinition;
    use waypoint_types::execution::{FlowExecutionListener, FlowSession};

    use super::*;
    use crate::definition::InMemoryDefinitionRegistry;

    struct Quiet;

    impl FlowExecutionListener for Quiet {}

    fn registry() -> Arc<InMemoryDefinitionRegistry> {
        let registry = Arc::new(InMemoryDefinitionRegistry::new());
        registry.register(
            FlowDefinition::builder("checkout")
                .view("cart", &[("pay", "payment"), ("address", "shipping")])
                .subflow("payment", "card-entry", &[])
                .subflow("shipping", "address", &[])
                .inline_flow(
                    FlowDefinition::builder("card-entry")
                        .view("enter", &[])
                        .build(),
                )
                .build(),
        );
        registry.register(FlowDefinition::builder("address").view("form", &[]).build());
        registry
    }

    fn detached(registry: &InMemoryDefinitionRegistry, event: &str) -> FlowExecution {
        let mut execution = FlowExecution::new(
            registry.get_flow_definition("checkout").unwrap(),
            Vec::new(),
        );
        execution.start(registry).unwrap();
        execution.signal_event(event, registry).unwrap();
        serde_json::from_value(serde_json::to_value(&execution).unwrap()).unwrap()
    }

    #[test]
    fn reattaches_root_inline_and_global_flows() {
        let registry = registry();
        let restorer = StateRestorer::new(registry.clone());

        let inline = restorer.restore(detached(&registry, "pay"), None).unwrap();
        assert!(inline.is_attached());
        assert_eq!(inline.sessions()[1].flow().unwrap().id(), "card-entry");

        let global = restorer.restore(detached(&registry, "address"), None).unwrap();
        let address = registry.get_flow_definition("address").unwrap();
        assert!(Arc::ptr_eq(global.sessions()[1].flow().unwrap(), &address));
    }

    #[test]
    fn reloads_listeners_and_attributes() {
        let registry = registry();
        let loader = |_: &FlowDefinition| -> Vec<Arc<dyn FlowExecutionListener>> {
            let quiet: Arc<dyn FlowExecutionListener> = Arc::new(Quiet);
            vec![quiet]
        };
        let attributes: Scope = [("channel", json!("web"))].into_iter().collect();
        let restorer = StateRestorer::new(registry.clone())
            .with_listener_loader(Arc::new(loader))
            .with_execution_attributes(attributes.clone());

        let restored = restorer.restore(detached(&registry, "pay"), None).unwrap();
        assert_eq!(restored.listeners().len(), 1);
        assert_eq!(restored.attributes(), &attributes);
    }

    #[test]
    fn conversation_scope_overrides_snapshot_copy() {
        let registry = registry();
        let restorer = StateRestorer::new(registry.clone());
        let mut execution = detached(&registry, "pay");
        execution.conversation_scope_mut().put("user", json!("stale"));

        let latest: Scope = [("user", json!("fresh"))].into_iter().collect();
        let restored = restorer.restore(execution.clone(), Some(latest.clone())).unwrap();
        assert_eq!(restored.conversation_scope(), &latest);

        let kept = restorer.restore(execution, None).unwrap();
        assert_eq!(kept.conversation_scope().get_json("user"), Some(&json!("stale")));
    }

    #[test]
    fn restoring_twice_is_idempotent() {
        let registry = registry();
        let restorer = StateRestorer::new(registry.clone());
        let once = restorer.restore(detached(&registry, "pay"), None).unwrap();
        let twice = restorer.restore(once.clone(), None).unwrap();
        assert_eq!(twice.sessions(), once.sessions());
        assert!(twice.is_attached());
        assert!(Arc::ptr_eq(twice.flow().unwrap(), once.flow().unwrap()));
    }

    #[test]
    fn missing_root_definition_fails_for_active_execution() {
        let registry = registry();
        let execution = detached(&registry, "pay");
        registry.remove("checkout");

        let err = StateRestorer::new(registry).restore(execution, None).unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::DefinitionNotFound { ref flow_id, state_id: None } if flow_id == "checkout"
        ));
    }

    #[test]
    fn missing_global_subflow_definition_fails() {
        let registry = registry();
        let execution = detached(&registry, "address");
        registry.remove("address");

        let err = StateRestorer::new(registry).restore(execution, None).unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::DefinitionNotFound { ref flow_id, .. } if flow_id == "address"
        ));
    }

    #[test]
    fn missing_state_fails() {
        let registry = registry();
        let mut execution = detached(&registry, "pay");
        execution.sessions_mut()[0] = FlowSession::detached("checkout", "gone", Scope::new());

        let err = StateRestorer::new(registry).restore(execution, None).unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::DefinitionNotFound { state_id: Some(ref s), .. } if s == "gone"
        ));
    }
}
