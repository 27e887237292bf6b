//! Guided walk through the repository: create, save, load, back button,
//! eviction and invalidation against an in-memory checkout flow.

use std::sync::Arc;

use anyhow::Result;
use console::style;
use serde_json::{Value, json};

use waypoint_core::definition::InMemoryDefinitionRegistry;
use waypoint_core::repository::FlowExecutionRepository;
use waypoint_types::config::RepositoryConfig;
use waypoint_types::definition::FlowDefinition;
use waypoint_types::execution::FlowExecution;
use waypoint_types::key::FlowExecutionKey;

/// The flow the demo drives.
pub fn checkout_flow() -> FlowDefinition {
    FlowDefinition::builder("checkout")
        .view("cart", &[("next", "shipping")])
        .view("shipping", &[("next", "payment"), ("back", "cart")])
        .subflow("payment", "card-entry", &[("accepted", "confirm")])
        .view("confirm", &[("finish", "done")])
        .end("done")
        .inline_flow(
            FlowDefinition::builder("card-entry")
                .view("enter", &[("submit", "accepted")])
                .end("accepted")
                .build(),
        )
        .build()
}

struct Step {
    action: String,
    key: Option<FlowExecutionKey>,
    outcome: String,
}

impl Step {
    fn to_json(&self) -> Value {
        json!({
            "action": self.action,
            "key": self.key.map(|k| k.to_string()),
            "outcome": self.outcome,
        })
    }
}

fn describe(execution: &FlowExecution) -> String {
    match execution.current_state() {
        Some((flow, state)) => format!("paused at {flow}.{state}"),
        None => format!("{:?}", execution.status()).to_lowercase(),
    }
}

/// Run the demo and print each step.
pub fn run(config: &RepositoryConfig, json: bool) -> Result<()> {
    let steps = walk(config)?;

    if json {
        let report: Vec<Value> = steps.iter().map(Step::to_json).collect();
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("  {} Waypoint checkout demo", style("▶").bold());
    println!();
    for (i, step) in steps.iter().enumerate() {
        println!(
            "  {} {}",
            style(format!("{}.", i + 1)).dim(),
            style(&step.action).cyan()
        );
        if let Some(key) = &step.key {
            println!("     key      {}", style(key).dim());
        }
        println!("     outcome  {}", step.outcome);
    }
    println!();
    Ok(())
}

fn walk(config: &RepositoryConfig) -> Result<Vec<Step>> {
    let definitions = Arc::new(InMemoryDefinitionRegistry::new());
    definitions.register(checkout_flow());
    let repository = FlowExecutionRepository::from_config(config, definitions.clone());

    let mut steps = Vec::new();

    // Request 1: start the flow.
    let (key, mut execution) = repository.create("checkout")?;
    execution.start(&*definitions)?;
    if let Some(scope) = execution.flow_scope_mut() {
        scope.put("items", json!(["notebook", "pen"]));
    }
    let k1 = repository
        .save(Some(&key), &execution)?
        .ok_or_else(|| anyhow::anyhow!("checkout ended unexpectedly"))?;
    steps.push(Step {
        action: "start checkout".into(),
        key: Some(k1),
        outcome: describe(&execution),
    });

    // Request 2: advance with the latest key.
    let mut execution = repository.load(&k1)?;
    execution.signal_event("next", &*definitions)?;
    let k2 = repository
        .save(Some(&k1), &execution)?
        .ok_or_else(|| anyhow::anyhow!("checkout ended unexpectedly"))?;
    steps.push(Step {
        action: "signal next".into(),
        key: Some(k2),
        outcome: describe(&execution),
    });

    // Request 3: the back button replays the first key.
    let outcome = match repository.load(&k1) {
        Ok(execution) => describe(&execution),
        Err(e) if e.is_not_found() => format!("expired ({e})"),
        Err(e) => return Err(e.into()),
    };
    steps.push(Step {
        action: "back button".into(),
        key: Some(k1),
        outcome,
    });

    let conversation_id = k2.conversation_id();
    let continuations = repository.continuation_count(&conversation_id)?;
    steps.push(Step {
        action: "count continuations".into(),
        key: None,
        outcome: format!("{continuations} of max {}", config.max_continuations),
    });

    // Eviction: with room for a single continuation, the previous key expires.
    let bounded = FlowExecutionRepository::from_config(
        &RepositoryConfig {
            max_continuations: 1,
            ..config.clone()
        },
        definitions.clone(),
    );
    let (key, mut execution) = bounded.create("checkout")?;
    execution.start(&*definitions)?;
    let first = bounded
        .save(Some(&key), &execution)?
        .ok_or_else(|| anyhow::anyhow!("checkout ended unexpectedly"))?;
    execution.signal_event("next", &*definitions)?;
    let second = bounded
        .save(Some(&first), &execution)?
        .ok_or_else(|| anyhow::anyhow!("checkout ended unexpectedly"))?;
    let outcome = match bounded.load(&first) {
        Ok(execution) => describe(&execution),
        Err(e) if e.is_not_found() => format!("evicted by {second} ({e})"),
        Err(e) => return Err(e.into()),
    };
    steps.push(Step {
        action: "evict with max 1".into(),
        key: Some(first),
        outcome,
    });

    // Request 4: the conversation is invalidated, the latest key stops working.
    repository.invalidate(&conversation_id)?;
    let outcome = match repository.load(&k2) {
        Ok(execution) => describe(&execution),
        Err(e) => format!("rejected ({e})"),
    };
    steps.push(Step {
        action: "invalidate and reload".into(),
        key: Some(k2),
        outcome,
    });

    tracing::debug!(steps = steps.len(), "demo finished");
    Ok(steps)
}
