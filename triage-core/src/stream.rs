//! Streaming update surface (§6 "Produced — Streaming update surface").
//!
//! `StreamUpdate` is the tagged union emitted through the caller-supplied sink. The sink is a
//! plain synchronous closure (`UpdateSink`), never an async trait method — that is what makes
//! the "MUST NOT await inside the sink" invariant (§5) enforceable by the type system rather
//! than a convention callers might violate.

use serde::Serialize;

use crate::types::{
    CodeFact, CodePostprocessingStep, CodeToolCallWithResult, LogFact, LogPostprocessingStep,
    LogSearchToolCallWithResult, ReviewStep, Timestamp,
};

/// The three kinds of streamed text chunk (§4.1 `addStreamingUpdate(kind, id, chunk)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Reasoning,
    LogSearch,
    CodeSearch,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamUpdate {
    #[serde(rename = "reasoning-chunk")]
    ReasoningChunk {
        id: String,
        chunk: String,
        timestamp: Timestamp,
    },
    #[serde(rename = "logSearch-chunk")]
    LogSearchChunk {
        id: String,
        chunk: String,
        timestamp: Timestamp,
    },
    #[serde(rename = "codeSearch-chunk")]
    CodeSearchChunk {
        id: String,
        chunk: String,
        timestamp: Timestamp,
    },
    #[serde(rename = "logSearch-tools")]
    LogSearchTools {
        id: String,
        timestamp: Timestamp,
        tool_calls: Vec<LogSearchToolCallWithResult>,
    },
    #[serde(rename = "codeSearch-tools")]
    CodeSearchTools {
        id: String,
        timestamp: Timestamp,
        tool_calls: Vec<CodeToolCallWithResult>,
    },
    Review(ReviewStep),
    LogPostprocessing(LogPostprocessingStep),
    CodePostprocessing(CodePostprocessingStep),
}

impl StreamUpdate {
    pub fn chunk(kind: ChunkKind, id: impl Into<String>, chunk: impl Into<String>) -> Self {
        let id = id.into();
        let chunk = chunk.into();
        let timestamp = crate::types::new_timestamp();
        match kind {
            ChunkKind::Reasoning => StreamUpdate::ReasoningChunk { id, chunk, timestamp },
            ChunkKind::LogSearch => StreamUpdate::LogSearchChunk { id, chunk, timestamp },
            ChunkKind::CodeSearch => StreamUpdate::CodeSearchChunk { id, chunk, timestamp },
        }
    }
}

/// Caller-supplied synchronous callback receiving streaming updates — the only output channel
/// of the state manager (GLOSSARY "Update sink"). Implementations MUST NOT block or await.
pub type UpdateSink = Box<dyn Fn(StreamUpdate) + Send + Sync>;

/// An update sink that discards everything; useful for tests and for runs with no consumer.
pub fn noop_sink() -> UpdateSink {
    Box::new(|_| {})
}

/// Wraps a sink so every update is also mirrored through a `triage_stream::EnvelopeState`,
/// producing the enveloped wire JSON (`sessionId`/`nodeId`/`eventId` + payload) before handing
/// it to `on_json`. This is the bridge from the typed in-process `StreamUpdate` to the wire
/// format a transport would actually send; the transport itself is out of scope (§1).
pub fn enveloping_sink<F>(
    session_id: impl Into<String>,
    mut on_json: F,
) -> UpdateSink
where
    F: FnMut(serde_json::Value) + Send + Sync + 'static,
{
    use std::sync::Mutex;
    let state = Mutex::new(triage_stream::EnvelopeState::new(session_id.into()));
    Box::new(move |update| {
        let node_id = match &update {
            StreamUpdate::ReasoningChunk { .. } => "reasoning",
            StreamUpdate::LogSearchChunk { .. } | StreamUpdate::LogSearchTools { .. } => {
                "logSearch"
            }
            StreamUpdate::CodeSearchChunk { .. } | StreamUpdate::CodeSearchTools { .. } => {
                "codeSearch"
            }
            StreamUpdate::Review(_) => "review",
            StreamUpdate::LogPostprocessing(_) => "logPostprocessing",
            StreamUpdate::CodePostprocessing(_) => "codePostprocessing",
        };
        let mut state = state.lock().expect("envelope state mutex poisoned");
        state.enter_node(node_id);
        if let Ok(json) = state.to_json(&update) {
            on_json(json);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn chunk_builds_correct_variant() {
        let u = StreamUpdate::chunk(ChunkKind::LogSearch, "s1", "hello");
        matches!(u, StreamUpdate::LogSearchChunk { .. });
    }

    #[test]
    fn enveloping_sink_assigns_increasing_event_ids() {
        let seen: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let sink = enveloping_sink("run-1", move |v| seen2.lock().unwrap().push(v));
        sink(StreamUpdate::chunk(ChunkKind::Reasoning, "s1", "a"));
        sink(StreamUpdate::chunk(ChunkKind::Reasoning, "s1", "b"));
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0]["eventId"], 1);
        assert_eq!(seen[1]["eventId"], 2);
        assert_eq!(seen[0]["sessionId"], "run-1");
    }
}
