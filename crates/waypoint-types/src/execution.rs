//! The execution-state object the repository stores between requests.
//!
//! A [`FlowExecution`] is a stack of [`FlowSession`]s, bottom = root flow,
//! top = the active subflow, plus the conversation-wide scope. Only ids and
//! scope data are serialized: flow definitions, listeners and execution
//! attributes are live references that are skipped on capture and
//! reattached on restore. An execution straight out of `serde` is therefore
//! *detached* until the repository's state restorer has processed it.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::definition::{FlowDefinition, FlowDefinitionLocator, StateKind, resolve_session_flow};
use crate::error::ExecutionError;
use crate::scope::Scope;

/// Observer of execution progress. Both callbacks default to no-ops.
pub trait FlowExecutionListener: Send + Sync {
    fn state_entered(&self, _flow_id: &str, _state_id: &str) {}

    fn session_ended(&self, _flow_id: &str, _outcome: &str) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created but not yet started.
    Created,
    /// Paused in a view state or running.
    Active,
    /// The root session reached an end state.
    Ended,
}

// ---------------------------------------------------------------------------
// FlowSession
// ---------------------------------------------------------------------------

/// One activation of one flow within an execution.
#[derive(Clone, Serialize, Deserialize)]
pub struct FlowSession {
    flow_id: String,
    state_id: String,
    #[serde(default)]
    scope: Scope,
    #[serde(skip)]
    flow: Option<Arc<FlowDefinition>>,
}

impl FlowSession {
    pub fn new(flow: Arc<FlowDefinition>, state_id: impl Into<String>) -> Self {
        Self {
            flow_id: flow.id().to_string(),
            state_id: state_id.into(),
            scope: Scope::new(),
            flow: Some(flow),
        }
    }

    /// A session with no live definition attached.
    pub fn detached(flow_id: impl Into<String>, state_id: impl Into<String>, scope: Scope) -> Self {
        Self {
            flow_id: flow_id.into(),
            state_id: state_id.into(),
            scope,
            flow: None,
        }
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    pub fn state_id(&self) -> &str {
        &self.state_id
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn scope_mut(&mut self) -> &mut Scope {
        &mut self.scope
    }

    pub fn flow(&self) -> Option<&Arc<FlowDefinition>> {
        self.flow.as_ref()
    }

    pub fn is_attached(&self) -> bool {
        self.flow.is_some()
    }

    pub fn attach(&mut self, flow: Arc<FlowDefinition>) {
        self.flow = Some(flow);
    }
}

// Live definitions are excluded from equality.
impl PartialEq for FlowSession {
    fn eq(&self, other: &Self) -> bool {
        self.flow_id == other.flow_id && self.state_id == other.state_id && self.scope == other.scope
    }
}

impl fmt::Debug for FlowSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowSession")
            .field("flow_id", &self.flow_id)
            .field("state_id", &self.state_id)
            .field("scope", &self.scope)
            .field("attached", &self.is_attached())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// FlowExecution
// ---------------------------------------------------------------------------

#[derive(Clone, Serialize, Deserialize)]
pub struct FlowExecution {
    flow_id: String,
    status: ExecutionStatus,
    sessions: Vec<FlowSession>,
    #[serde(default)]
    conversation_scope: Scope,
    #[serde(skip)]
    flow: Option<Arc<FlowDefinition>>,
    #[serde(skip)]
    listeners: Vec<Arc<dyn FlowExecutionListener>>,
    #[serde(skip)]
    attributes: Scope,
}

impl FlowExecution {
    /// A new, not yet started execution of `flow`.
    pub fn new(flow: Arc<FlowDefinition>, listeners: Vec<Arc<dyn FlowExecutionListener>>) -> Self {
        Self {
            flow_id: flow.id().to_string(),
            status: ExecutionStatus::Created,
            sessions: Vec::new(),
            conversation_scope: Scope::new(),
            flow: Some(flow),
            listeners,
            attributes: Scope::new(),
        }
    }

    /// Root flow id. Always available, attached or not.
    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == ExecutionStatus::Active
    }

    pub fn has_started(&self) -> bool {
        self.status != ExecutionStatus::Created
    }

    pub fn has_ended(&self) -> bool {
        self.status == ExecutionStatus::Ended
    }

    /// Sessions from root (index 0) to the active one.
    pub fn sessions(&self) -> &[FlowSession] {
        &self.sessions
    }

    pub fn sessions_mut(&mut self) -> &mut [FlowSession] {
        &mut self.sessions
    }

    pub fn active_session(&self) -> Option<&FlowSession> {
        self.sessions.last()
    }

    pub fn active_session_mut(&mut self) -> Option<&mut FlowSession> {
        self.sessions.last_mut()
    }

    /// Flow id and state id of the active session.
    pub fn current_state(&self) -> Option<(&str, &str)> {
        self.active_session().map(|s| (s.flow_id(), s.state_id()))
    }

    /// Scope of the active session.
    pub fn flow_scope(&self) -> Option<&Scope> {
        self.active_session().map(FlowSession::scope)
    }

    pub fn flow_scope_mut(&mut self) -> Option<&mut Scope> {
        self.active_session_mut().map(FlowSession::scope_mut)
    }

    pub fn conversation_scope(&self) -> &Scope {
        &self.conversation_scope
    }

    pub fn conversation_scope_mut(&mut self) -> &mut Scope {
        &mut self.conversation_scope
    }

    pub fn set_conversation_scope(&mut self, scope: Scope) {
        self.conversation_scope = scope;
    }

    pub fn flow(&self) -> Option<&Arc<FlowDefinition>> {
        self.flow.as_ref()
    }

    pub fn set_flow(&mut self, flow: Option<Arc<FlowDefinition>>) {
        self.flow = flow;
    }

    pub fn listeners(&self) -> &[Arc<dyn FlowExecutionListener>] {
        &self.listeners
    }

    pub fn set_listeners(&mut self, listeners: Vec<Arc<dyn FlowExecutionListener>>) {
        self.listeners = listeners;
    }

    /// Per-execution attributes supplied by the host. Never snapshotted.
    pub fn attributes(&self) -> &Scope {
        &self.attributes
    }

    pub fn set_attributes(&mut self, attributes: Scope) {
        self.attributes = attributes;
    }

    /// True when the root flow and every session carry a live definition.
    pub fn is_attached(&self) -> bool {
        self.flow.is_some() && self.sessions.iter().all(FlowSession::is_attached)
    }

    /// Start the root flow and run until it pauses or ends.
    pub fn start(&mut self, locator: &dyn FlowDefinitionLocator) -> Result<(), ExecutionError> {
        if self.status != ExecutionStatus::Created {
            return Err(ExecutionError::AlreadyStarted);
        }
        let root = self
            .flow
            .clone()
            .ok_or_else(|| ExecutionError::UnknownFlow(self.flow_id.clone()))?;
        let start = root.start_state().to_string();
        self.status = ExecutionStatus::Active;
        self.sessions.push(FlowSession::new(root, start.clone()));
        self.enter_state(start, locator)
    }

    /// Deliver a user event to the active session.
    pub fn signal_event(
        &mut self,
        event: &str,
        locator: &dyn FlowDefinitionLocator,
    ) -> Result<(), ExecutionError> {
        if !self.is_active() {
            return Err(ExecutionError::NotActive);
        }
        let session = self.sessions.last().ok_or(ExecutionError::NotActive)?;
        let flow = session
            .flow
            .clone()
            .ok_or_else(|| ExecutionError::UnknownFlow(session.flow_id.clone()))?;
        let state = flow
            .state(&session.state_id)
            .ok_or_else(|| ExecutionError::UnknownState {
                flow_id: session.flow_id.clone(),
                state_id: session.state_id.clone(),
            })?;
        let target = state
            .target_for(event)
            .ok_or_else(|| ExecutionError::NoTransition {
                flow_id: session.flow_id.clone(),
                state_id: session.state_id.clone(),
                event: event.to_string(),
            })?
            .to_string();
        self.enter_state(target, locator)
    }

    // Runs state entry in a loop: subflow states push a session and continue
    // with its start state, end states pop and resume the parent with the
    // end state id as the event. Returns once a view state is reached or the
    // root session ends.
    fn enter_state(
        &mut self,
        mut state_id: String,
        locator: &dyn FlowDefinitionLocator,
    ) -> Result<(), ExecutionError> {
        loop {
            let session = self.sessions.last_mut().ok_or(ExecutionError::NotActive)?;
            let flow = session
                .flow
                .clone()
                .ok_or_else(|| ExecutionError::UnknownFlow(session.flow_id.clone()))?;
            let state = flow
                .state(&state_id)
                .ok_or_else(|| ExecutionError::UnknownState {
                    flow_id: flow.id().to_string(),
                    state_id: state_id.clone(),
                })?;
            session.state_id = state_id.clone();
            for listener in &self.listeners {
                listener.state_entered(flow.id(), &state_id);
            }

            match state.kind() {
                StateKind::View => return Ok(()),
                StateKind::Subflow { flow_id } => {
                    let root = self
                        .flow
                        .clone()
                        .ok_or_else(|| ExecutionError::UnknownFlow(self.flow_id.clone()))?;
                    let subflow = resolve_session_flow(&root, flow_id, locator)
                        .ok_or_else(|| ExecutionError::UnknownFlow(flow_id.clone()))?;
                    state_id = subflow.start_state().to_string();
                    self.sessions.push(FlowSession::new(subflow, state_id.clone()));
                }
                StateKind::End => {
                    if let Some(ended) = self.sessions.pop() {
                        for listener in &self.listeners {
                            listener.session_ended(&ended.flow_id, &state_id);
                        }
                    }
                    let Some(parent) = self.sessions.last() else {
                        self.status = ExecutionStatus::Ended;
                        return Ok(());
                    };
                    let parent_flow = parent
                        .flow
                        .clone()
                        .ok_or_else(|| ExecutionError::UnknownFlow(parent.flow_id.clone()))?;
                    let resume = parent_flow
                        .state(&parent.state_id)
                        .and_then(|s| s.target_for(&state_id))
                        .ok_or_else(|| ExecutionError::NoTransition {
                            flow_id: parent.flow_id.clone(),
                            state_id: parent.state_id.clone(),
                            event: state_id.clone(),
                        })?;
                    state_id = resume.to_string();
                }
            }
        }
    }
}

impl fmt::Debug for FlowExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowExecution")
            .field("flow_id", &self.flow_id)
            .field("status", &self.status)
            .field("sessions", &self.sessions)
            .field("conversation_scope", &self.conversation_scope)
            .field("listeners", &self.listeners.len())
            .field("attributes", &self.attributes)
            .finish()
    }
}
