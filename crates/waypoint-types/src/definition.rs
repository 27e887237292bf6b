//! Flow definitions and the locator port used to resolve them by id.
//!
//! A definition is an immutable graph of states connected by event-labelled
//! transitions. Definitions are shared between every execution of a flow via
//! `Arc`; snapshots record only flow ids and state ids, and the repository
//! reattaches the live definition on restore.

use std::collections::HashMap;
use std::sync::Arc;

/// What happens when a flow enters a state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateKind {
    /// Pause and wait for the next user event.
    View,
    /// Spawn a child session of the named flow.
    Subflow { flow_id: String },
    /// End the current session. The state id is the outcome signalled to
    /// the parent session, if any.
    End,
}

#[derive(Debug, Clone)]
pub struct StateDefinition {
    id: String,
    kind: StateKind,
    transitions: HashMap<String, String>,
}

impl StateDefinition {
    pub fn new(id: impl Into<String>, kind: StateKind) -> Self {
        Self {
            id: id.into(),
            kind,
            transitions: HashMap::new(),
        }
    }

    pub fn with_transition(mut self, event: impl Into<String>, target: impl Into<String>) -> Self {
        self.transitions.insert(event.into(), target.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &StateKind {
        &self.kind
    }

    /// Target state for `event`, if this state handles it.
    pub fn target_for(&self, event: &str) -> Option<&str> {
        self.transitions.get(event).map(String::as_str)
    }

    pub fn is_end(&self) -> bool {
        self.kind == StateKind::End
    }
}

#[derive(Debug, Clone)]
pub struct FlowDefinition {
    id: String,
    start_state: String,
    states: Vec<StateDefinition>,
    inline_flows: Vec<Arc<FlowDefinition>>,
}

impl FlowDefinition {
    pub fn builder(id: impl Into<String>) -> FlowDefinitionBuilder {
        FlowDefinitionBuilder {
            id: id.into(),
            start_state: None,
            states: Vec::new(),
            inline_flows: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn start_state(&self) -> &str {
        &self.start_state
    }

    pub fn states(&self) -> &[StateDefinition] {
        &self.states
    }

    pub fn state(&self, state_id: &str) -> Option<&StateDefinition> {
        self.states.iter().find(|s| s.id == state_id)
    }

    pub fn contains_state(&self, state_id: &str) -> bool {
        self.state(state_id).is_some()
    }

    pub fn inline_flows(&self) -> &[Arc<FlowDefinition>] {
        &self.inline_flows
    }

    /// Find an inline flow by id, searching nested inline flows depth-first.
    pub fn inline_flow(&self, flow_id: &str) -> Option<&Arc<FlowDefinition>> {
        self.inline_flows.iter().find_map(|inline| {
            if inline.id == flow_id {
                Some(inline)
            } else {
                inline.inline_flow(flow_id)
            }
        })
    }
}

/// Incremental builder for [`FlowDefinition`].
///
/// The start state defaults to the first state added.
#[derive(Debug)]
pub struct FlowDefinitionBuilder {
    id: String,
    start_state: Option<String>,
    states: Vec<StateDefinition>,
    inline_flows: Vec<Arc<FlowDefinition>>,
}

impl FlowDefinitionBuilder {
    pub fn start_state(mut self, state_id: impl Into<String>) -> Self {
        self.start_state = Some(state_id.into());
        self
    }

    pub fn state(mut self, state: StateDefinition) -> Self {
        self.states.push(state);
        self
    }

    pub fn view(self, id: impl Into<String>, transitions: &[(&str, &str)]) -> Self {
        let state = with_transitions(StateDefinition::new(id, StateKind::View), transitions);
        self.state(state)
    }

    pub fn subflow(
        self,
        id: impl Into<String>,
        flow_id: impl Into<String>,
        transitions: &[(&str, &str)],
    ) -> Self {
        let kind = StateKind::Subflow {
            flow_id: flow_id.into(),
        };
        self.state(with_transitions(StateDefinition::new(id, kind), transitions))
    }

    pub fn end(self, id: impl Into<String>) -> Self {
        self.state(StateDefinition::new(id, StateKind::End))
    }

    pub fn inline_flow(mut self, flow: FlowDefinition) -> Self {
        self.inline_flows.push(Arc::new(flow));
        self
    }

    pub fn build(self) -> FlowDefinition {
        let start_state = self
            .start_state
            .or_else(|| self.states.first().map(|s| s.id.clone()))
            .unwrap_or_default();
        FlowDefinition {
            id: self.id,
            start_state,
            states: self.states,
            inline_flows: self.inline_flows,
        }
    }
}

fn with_transitions(state: StateDefinition, transitions: &[(&str, &str)]) -> StateDefinition {
    transitions
        .iter()
        .fold(state, |state, (event, target)| state.with_transition(*event, *target))
}

// ---------------------------------------------------------------------------
// Locator port
// ---------------------------------------------------------------------------

/// Resolves flow definitions by id.
///
/// Implementations must be safe to call from any request thread.
pub trait FlowDefinitionLocator: Send + Sync {
    fn get_flow_definition(&self, flow_id: &str) -> Option<Arc<FlowDefinition>>;
}

impl<L: FlowDefinitionLocator + ?Sized> FlowDefinitionLocator for Arc<L> {
    fn get_flow_definition(&self, flow_id: &str) -> Option<Arc<FlowDefinition>> {
        (**self).get_flow_definition(flow_id)
    }
}

/// Resolve the flow of a session belonging to an execution rooted at `root`.
///
/// Order: the root flow itself, then the root's inline flows (nested
/// included), then the global locator.
pub fn resolve_session_flow(
    root: &Arc<FlowDefinition>,
    flow_id: &str,
    locator: &dyn FlowDefinitionLocator,
) -> Option<Arc<FlowDefinition>> {
    if root.id() == flow_id {
        return Some(Arc::clone(root));
    }
    if let Some(inline) = root.inline_flow(flow_id) {
        return Some(Arc::clone(inline));
    }
    locator.get_flow_definition(flow_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OneFlow(Arc<FlowDefinition>);

    impl FlowDefinitionLocator for OneFlow {
        fn get_flow_definition(&self, flow_id: &str) -> Option<Arc<FlowDefinition>> {
            (self.0.id() == flow_id).then(|| Arc::clone(&self.0))
        }
    }

    fn checkout() -> Arc<FlowDefinition> {
        let card = FlowDefinition::builder("card-entry")
            .view("enter", &[("submit", "accepted")])
            .end("accepted")
            .inline_flow(
                FlowDefinition::builder("three-d-secure")
                    .view("challenge", &[("ok", "passed")])
                    .end("passed")
                    .build(),
            )
            .build();
        Arc::new(
            FlowDefinition::builder("checkout")
                .view("cart", &[("next", "payment")])
                .subflow("payment", "card-entry", &[("accepted", "done")])
                .end("done")
                .inline_flow(card)
                .build(),
        )
    }

    #[test]
    fn builder_defaults_start_to_first_state() {
        let flow = checkout();
        assert_eq!(flow.start_state(), "cart");
        assert_eq!(flow.states().len(), 3);
        assert_eq!(flow.state("cart").unwrap().target_for("next"), Some("payment"));
        assert!(flow.state("cart").unwrap().target_for("back").is_none());
        assert!(flow.state("done").unwrap().is_end());
    }

    #[test]
    fn explicit_start_state_wins() {
        let flow = FlowDefinition::builder("f")
            .start_state("b")
            .view("a", &[])
            .view("b", &[])
            .build();
        assert_eq!(flow.start_state(), "b");
    }

    #[test]
    fn inline_flow_search_is_recursive() {
        let flow = checkout();
        assert_eq!(flow.inline_flow("card-entry").unwrap().id(), "card-entry");
        assert_eq!(
            flow.inline_flow("three-d-secure").unwrap().id(),
            "three-d-secure"
        );
        assert!(flow.inline_flow("missing").is_none());
    }

    #[test]
    fn resolution_order_root_inline_locator() {
        let root = checkout();
        let global = Arc::new(
            FlowDefinition::builder("address")
                .view("form", &[])
                .build(),
        );
        let locator = OneFlow(Arc::clone(&global));

        let resolved = resolve_session_flow(&root, "checkout", &locator).unwrap();
        assert!(Arc::ptr_eq(&resolved, &root));

        let inline = resolve_session_flow(&root, "card-entry", &locator).unwrap();
        assert!(Arc::ptr_eq(&inline, root.inline_flow("card-entry").unwrap()));

        let from_locator = resolve_session_flow(&root, "address", &locator).unwrap();
        assert!(Arc::ptr_eq(&from_locator, &global));

        assert!(resolve_session_flow(&root, "nowhere", &locator).is_none());
    }
}
