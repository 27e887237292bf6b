//! Execution construction and listener loading.
//!
//! The repository never builds executions itself: new ones come from a
//! [`FlowExecutionFactory`], and both the factory and the state restorer ask
//! a [`FlowExecutionListenerLoader`] which listeners observe a given flow.

use std::fmt;
use std::sync::Arc;

use waypoint_types::definition::FlowDefinition;
use waypoint_types::execution::{FlowExecution, FlowExecutionListener};
use waypoint_types::scope::Scope;

/// Supplies the listeners attached to executions of a root flow.
pub trait FlowExecutionListenerLoader: Send + Sync {
    fn listeners(&self, flow: &FlowDefinition) -> Vec<Arc<dyn FlowExecutionListener>>;
}

impl<F> FlowExecutionListenerLoader for F
where
    F: Fn(&FlowDefinition) -> Vec<Arc<dyn FlowExecutionListener>> + Send + Sync,
{
    fn listeners(&self, flow: &FlowDefinition) -> Vec<Arc<dyn FlowExecutionListener>> {
        self(flow)
    }
}

/// Attaches the same listeners to every flow.
#[derive(Clone, Default)]
pub struct StaticListenerLoader {
    listeners: Vec<Arc<dyn FlowExecutionListener>>,
}

impl StaticListenerLoader {
    pub fn new(listeners: Vec<Arc<dyn FlowExecutionListener>>) -> Self {
        Self { listeners }
    }
}

impl FlowExecutionListenerLoader for StaticListenerLoader {
    fn listeners(&self, _flow: &FlowDefinition) -> Vec<Arc<dyn FlowExecutionListener>> {
        self.listeners.clone()
    }
}

impl fmt::Debug for StaticListenerLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticListenerLoader")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Creates new, not yet started executions.
pub trait FlowExecutionFactory: Send + Sync {
    fn create_execution(&self, flow: Arc<FlowDefinition>) -> FlowExecution;
}

pub struct DefaultFlowExecutionFactory {
    listener_loader: Arc<dyn FlowExecutionListenerLoader>,
    execution_attributes: Scope,
}

impl DefaultFlowExecutionFactory {
    pub fn new(listener_loader: Arc<dyn FlowExecutionListenerLoader>, execution_attributes: Scope) -> Self {
        Self {
            listener_loader,
            execution_attributes,
        }
    }
}

impl Default for DefaultFlowExecutionFactory {
    fn default() -> Self {
        Self::new(Arc::new(StaticListenerLoader::default()), Scope::new())
    }
}

impl FlowExecutionFactory for DefaultFlowExecutionFactory {
    fn create_execution(&self, flow: Arc<FlowDefinition>) -> FlowExecution {
        let listeners = self.listener_loader.listeners(&flow);
        let mut execution = FlowExecution::new(flow, listeners);
        execution.set_attributes(self.execution_attributes.clone());
        execution
    }
}

impl fmt::Debug for DefaultFlowExecutionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultFlowExecutionFactory")
            .field("execution_attributes", &self.execution_attributes)
            .finish_non_exhaustive()
    }
}
