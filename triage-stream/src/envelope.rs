//! Envelope (session_id, node_id, event_id) wrapping one streaming update.
//!
//! `EnvelopeState` tracks the current node and a monotonically increasing `event_id`; this is
//! what gives the streaming surface its per-id ordering guarantee (every chunk for a given
//! step id is assigned a strictly increasing `event_id` before it reaches the sink).

use serde::Serialize;
use serde_json::Value;

/// Envelope fields attached to each wire message.
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    /// Session id; constant within a run.
    pub session_id: Option<String>,
    /// Identifier of the node currently emitting (pre-processing/reasoning/review/post-processing).
    pub node_id: Option<String>,
    /// Per-message sequence number; monotonically increasing within a run.
    pub event_id: Option<u64>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_node_id(mut self, id: impl Into<String>) -> Self {
        self.node_id = Some(id.into());
        self
    }

    pub fn with_event_id(mut self, id: u64) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Merges envelope fields into the given JSON object (top-level only).
    /// Does not overwrite existing keys.
    pub fn inject_into(&self, obj: &mut Value) {
        let Some(obj) = obj.as_object_mut() else {
            return;
        };
        if let Some(ref id) = self.session_id {
            obj.entry("sessionId")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(ref id) = self.node_id {
            obj.entry("nodeId")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(id) = self.event_id {
            obj.entry("eventId")
                .or_insert_with(|| Value::Number(serde_json::Number::from(id)));
        }
    }
}

/// Envelope state for one run: session id, current node, next event id.
pub struct EnvelopeState {
    pub session_id: String,
    pub current_node_id: String,
    pub next_event_id: u64,
}

impl EnvelopeState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            current_node_id: String::new(),
            next_event_id: 1,
        }
    }

    /// Enters a named node; subsequent `to_json` calls carry this node id until the next call.
    pub fn enter_node(&mut self, node_id: impl Into<String>) {
        self.current_node_id = node_id.into();
    }

    fn envelope(&mut self) -> Envelope {
        let node_id = if self.current_node_id.is_empty() {
            "pipeline"
        } else {
            self.current_node_id.as_str()
        };
        let env = Envelope::new()
            .with_session_id(&self.session_id)
            .with_node_id(node_id)
            .with_event_id(self.next_event_id);
        self.next_event_id += 1;
        env
    }

    /// Serializes `event` to JSON and injects the envelope, advancing `event_id`.
    pub fn to_json<T: Serialize>(&mut self, event: &T) -> Result<Value, serde_json::Error> {
        let mut value = serde_json::to_value(event)?;
        self.envelope().inject_into(&mut value);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_inject() {
        let mut obj = serde_json::json!({"type":"reasoningChunk","id":"step-1"});
        let env = Envelope::new()
            .with_session_id("sess-1")
            .with_node_id("reasoning")
            .with_event_id(1);
        env.inject_into(&mut obj);
        assert_eq!(obj["sessionId"], "sess-1");
        assert_eq!(obj["nodeId"], "reasoning");
        assert_eq!(obj["eventId"], 1);
        assert_eq!(obj["type"], "reasoningChunk");
    }

    #[test]
    fn to_json_assigns_monotonic_event_ids() {
        #[derive(serde::Serialize)]
        struct Ev {
            r#type: &'static str,
            id: &'static str,
        }
        let mut state = EnvelopeState::new("run-123");
        state.enter_node("reasoning");
        let a = state.to_json(&Ev { r#type: "reasoningChunk", id: "s1" }).unwrap();
        let b = state.to_json(&Ev { r#type: "reasoningChunk", id: "s1" }).unwrap();
        assert_eq!(a["sessionId"], "run-123");
        assert_eq!(a["nodeId"], "reasoning");
        assert_eq!(a["eventId"], 1);
        assert_eq!(b["eventId"], 2);
    }
}
