//! In-memory flow definition registry.

use std::sync::Arc;

use dashmap::DashMap;
use waypoint_types::definition::{FlowDefinition, FlowDefinitionLocator};

/// Thread-safe registry of flow definitions keyed by flow id.
///
/// Serves as the global [`FlowDefinitionLocator`]. Removing a definition
/// makes every active execution of that flow unloadable.
#[derive(Debug, Default)]
pub struct InMemoryDefinitionRegistry {
    flows: DashMap<String, Arc<FlowDefinition>>,
}

impl InMemoryDefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a definition.
    pub fn register(&self, flow: FlowDefinition) -> Arc<FlowDefinition> {
        let flow = Arc::new(flow);
        self.flows.insert(flow.id().to_string(), Arc::clone(&flow));
        tracing::debug!(flow_id = flow.id(), "registered flow definition");
        flow
    }

    pub fn remove(&self, flow_id: &str) -> Option<Arc<FlowDefinition>> {
        self.flows.remove(flow_id).map(|(_, flow)| flow)
    }

    pub fn contains(&self, flow_id: &str) -> bool {
        self.flows.contains_key(flow_id)
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Registered flow ids, sorted.
    pub fn flow_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.flows.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

impl FlowDefinitionLocator for InMemoryDefinitionRegistry {
    fn get_flow_definition(&self, flow_id: &str) -> Option<Arc<FlowDefinition>> {
        self.flows.get(flow_id).map(|e| Arc::clone(e.value()))
    }
}
