//! Flow execution key inspection.

use anyhow::Result;
use console::style;
use serde_json::json;

use waypoint_types::key::KeyCodec;

/// Decode `encoded` and print its components.
///
/// Decoding is syntactic only; no repository is consulted.
pub fn decode(encoded: &str, json: bool) -> Result<()> {
    let key = KeyCodec::decode(encoded)?;

    if json {
        let out = json!({
            "key": key.to_string(),
            "conversation_id": key.conversation_id().to_string(),
            "continuation_id": key.continuation_id().to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("  {} {}", style("Key").bold(), key);
    println!("  conversation  {}", style(key.conversation_id()).cyan());
    println!("  continuation  {}", style(key.continuation_id()).cyan());
    println!("  format        {}", style(KeyCodec::format()).dim());
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use waypoint_types::id::{ContinuationId, ConversationId};
    use waypoint_types::key::FlowExecutionKey;

    use super::*;

    #[test]
    fn decodes_valid_key() {
        let key = FlowExecutionKey::new(ConversationId::generate(), ContinuationId::generate());
        decode(&key.to_string(), true).unwrap();
    }

    #[test]
    fn rejects_malformed_key() {
        let err = decode("definitely-not-a-key", false).unwrap_err();
        assert!(err.to_string().contains("malformed"));
    }
}
