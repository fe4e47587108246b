//! Tool-call accumulator.
//!
//! Tool calls arrive as fragments spread over many stream events, each
//! addressed by a slot index. The accumulator merges them for the duration
//! of one streaming response and finalizes the result once the model signals
//! `finish_reason: "tool_calls"`.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::stream::ToolCallDelta;

/// Accumulated state of one tool-call slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ToolCallFragment {
    /// Call identifier; the latest non-empty value wins.
    id: String,
    /// Function name; the latest supplied value wins.
    function_name: String,
    /// Argument text, concatenated in arrival order.
    arguments_text: String,
}

/// A finalized tool call, ready to be proposed.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedToolCall {
    /// Call identifier.
    pub id: String,
    /// Function name.
    pub function_name: String,
    /// Raw argument text as the model produced it.
    pub arguments_text: String,
    /// Parsed argument object; empty when the text was not a JSON object.
    pub arguments: Map<String, Value>,
}

/// Index-keyed merge of tool-call fragments.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    slots: BTreeMap<u32, ToolCallFragment>,
}

impl ToolCallAccumulator {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one fragment into its slot.
    pub fn apply(&mut self, delta: &ToolCallDelta) {
        let index = delta.index.unwrap_or(0);
        let slot = self.slots.entry(index).or_default();

        if let Some(id) = delta.id.as_deref().filter(|id| !id.is_empty()) {
            slot.id = id.to_string();
        }
        if let Some(function) = &delta.function {
            if let Some(name) = function.name.as_deref().filter(|n| !n.is_empty()) {
                slot.function_name = name.to_string();
            }
            if let Some(arguments) = &function.arguments {
                slot.arguments_text.push_str(arguments);
            }
        }
    }

    /// Returns true if no fragment has been seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Finalize the first slot by index.
    ///
    /// Only one tool call per turn is acted upon; later slots are dropped
    /// with a warning. Returns `None` when no fragment was received.
    pub fn finalize(&mut self) -> Option<CompletedToolCall> {
        let slots = std::mem::take(&mut self.slots);
        if slots.len() > 1 {
            tracing::warn!(
                count = slots.len(),
                "Model proposed several tool calls; only the first is used"
            );
        }

        let (_, first) = slots.into_iter().next()?;
        let arguments = parse_arguments(&first.arguments_text);
        Some(CompletedToolCall {
            id: first.id,
            function_name: first.function_name,
            arguments_text: first.arguments_text,
            arguments,
        })
    }
}

/// Parse tool arguments, falling back to an empty object.
fn parse_arguments(text: &str) -> Map<String, Value> {
    if text.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            tracing::debug!("Tool arguments are not an object; using empty arguments");
            Map::new()
        }
        Err(e) => {
            tracing::debug!(error = %e, "Tool arguments are not valid JSON; using empty arguments");
            Map::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::FunctionDelta;

    fn delta(index: Option<u32>, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> ToolCallDelta {
        ToolCallDelta {
            index,
            id: id.map(String::from),
            function: Some(FunctionDelta {
                name: name.map(String::from),
                arguments: args.map(String::from),
            }),
        }
    }

    #[test]
    fn fragments_merge_across_events() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(&delta(Some(0), Some("call_1"), None, None));
        acc.apply(&delta(Some(0), None, Some("api_request"), None));
        acc.apply(&delta(Some(0), None, None, Some(r#"{"method":"GET","#)));
        acc.apply(&delta(Some(0), None, None, Some(r#""path":"/items"}"#)));

        let call = acc.finalize().unwrap();
        assert_eq!(call.id, "call_1");
        assert_eq!(call.function_name, "api_request");
        assert_eq!(call.arguments["method"], "GET");
        assert_eq!(call.arguments["path"], "/items");
        assert!(acc.is_empty());
    }

    #[test]
    fn interleaved_indices_keep_per_slot_order() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(&delta(Some(1), Some("call_b"), Some("second"), Some("[1,")));
        acc.apply(&delta(Some(0), Some("call_a"), Some("first"), Some("{\"a\":")));
        acc.apply(&delta(Some(1), None, None, Some("2]")));
        acc.apply(&delta(Some(0), None, None, Some("1}")));

        let call = acc.finalize().unwrap();
        assert_eq!(call.id, "call_a");
        assert_eq!(call.function_name, "first");
        assert_eq!(call.arguments_text, "{\"a\":1}");
        assert_eq!(call.arguments["a"], 1);
    }

    #[test]
    fn missing_index_defaults_to_zero() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(&delta(None, Some("call_1"), Some("api_request"), Some("{\"a\":")));
        acc.apply(&delta(Some(0), None, None, Some("1}")));
        let call = acc.finalize().unwrap();
        assert_eq!(call.id, "call_1");
        assert_eq!(call.arguments["a"], 1);
    }

    #[test]
    fn empty_id_does_not_overwrite() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(&delta(Some(0), Some("call_1"), None, None));
        acc.apply(&delta(Some(0), Some(""), None, None));
        assert_eq!(acc.finalize().unwrap().id, "call_1");
    }

    #[test]
    fn later_id_replaces_earlier() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(&delta(Some(0), Some("call_1"), None, None));
        acc.apply(&delta(Some(0), Some("call_2"), None, None));
        assert_eq!(acc.finalize().unwrap().id, "call_2");
    }

    #[test]
    fn invalid_arguments_become_empty_object() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(&delta(Some(0), Some("call_1"), Some("api_request"), Some("{\"method\":")));
        let call = acc.finalize().unwrap();
        assert!(call.arguments.is_empty());
        assert_eq!(call.arguments_text, "{\"method\":");
    }

    #[test]
    fn finalize_without_fragments() {
        let mut acc = ToolCallAccumulator::new();
        assert!(acc.finalize().is_none());
    }
}
