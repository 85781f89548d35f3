//! State manager (C2): the single source of truth for the per-run transcript and the
//! streaming surface (§4.1).

use crate::stream::{ChunkKind, StreamUpdate, UpdateSink};
use crate::types::{
    AssistantMessage, CatToolCallWithResult, ChatMessage, ChatTurn, CodeToolCallWithResult,
    GrepToolCallWithResult, LogSearchToolCallWithResult, Scope, Step,
};

/// Renders an assistant turn's `steps` into the "Gathered Context" block used both when
/// materializing prior turns into model messages and when building the current turn's
/// assistant message for the reasoner (§4.1 "Chat history → messages", design note §9
/// "dynamic chat-history reshaping... keep as a pure function").
pub fn format_gathered_context(steps: &[Step]) -> String {
    let mut blocks = Vec::new();
    for step in steps {
        match step {
            Step::LogSearch(s) => {
                let mut lines = vec![format!("## Log search: {}", s.reasoning)];
                for call in &s.data {
                    lines.push(format_log_tool_call(call));
                }
                blocks.push(lines.join("\n"));
            }
            Step::CodeSearch(s) => {
                let mut lines = vec![format!("## Code search: {}", s.reasoning)];
                for call in &s.data {
                    lines.push(format_code_tool_call(call));
                }
                blocks.push(lines.join("\n"));
            }
            Step::Reasoning(s) => blocks.push(format!("## Reasoning\n{}", s.data)),
            Step::Review(s) => blocks.push(format!(
                "## Review ({})\n{}",
                if s.accepted { "accepted" } else { "rejected" },
                s.content
            )),
            Step::LogPostprocessing(_) | Step::CodePostprocessing(_) => {
                // Post-processing facts are not part of the reasoning context; they are the
                // terminal output of a run, not input to a future one.
            }
        }
    }
    blocks.join("\n\n")
}

fn format_log_tool_call(call: &LogSearchToolCallWithResult) -> String {
    format!(
        "- logSearch({}): {}",
        call.input.query,
        match &call.output {
            crate::types::ToolOutput::Result(r) => format!("{} log(s)", r.logs.len()),
            crate::types::ToolOutput::Error { error, .. } => format!("error: {error}"),
        }
    )
}

fn format_code_tool_call(call: &CodeToolCallWithResult) -> String {
    match call {
        CodeToolCallWithResult::Cat(c) => format!(
            "- cat({}): {}",
            c.input.path,
            match &c.output {
                crate::types::ToolOutput::Result(_) => "ok".to_string(),
                crate::types::ToolOutput::Error { error, .. } => format!("error: {error}"),
            }
        ),
        CodeToolCallWithResult::Grep(g) => format!(
            "- grep({}): {}",
            g.input.pattern,
            match &g.output {
                crate::types::ToolOutput::Result(_) => "ok".to_string(),
                crate::types::ToolOutput::Error { error, .. } => format!("error: {error}"),
            }
        ),
    }
}

/// Concatenates (a) gathered context, (b) response, (c) error, blank-line separated, skipping
/// empty parts. Pure over the typed variant so tests can drive it without a live model.
fn assistant_turn_to_content(msg: &AssistantMessage) -> String {
    let mut parts = Vec::new();
    let context = format_gathered_context(&msg.steps);
    if !context.is_empty() {
        parts.push(context);
    }
    if let Some(response) = &msg.response {
        if !response.is_empty() {
            parts.push(response.clone());
        }
    }
    if let Some(error) = &msg.error {
        if !error.is_empty() {
            parts.push(error.clone());
        }
    }
    parts.join("\n\n")
}

fn turn_to_message(turn: &ChatTurn) -> ChatMessage {
    match turn {
        ChatTurn::User(u) => ChatMessage::User {
            content: u.content.clone(),
        },
        ChatTurn::Assistant(a) => ChatMessage::Assistant {
            content: assistant_turn_to_content(a),
        },
    }
}

/// Single source of truth for the per-run transcript and the streaming surface. Owned
/// exclusively by one `run()`; no cross-run sharing (§3 "Lifecycle / ownership").
pub struct StateManager {
    current: Vec<Step>,
    previous: Vec<Step>,
    chat_history: Vec<ChatTurn>,
    answer: Option<String>,
    sink: UpdateSink,
}

impl StateManager {
    /// `chat_history` is the committed prior conversation; `previous` steps are derived from it
    /// once, here, and are read-only for the rest of the run.
    pub fn new(chat_history: Vec<ChatTurn>, sink: UpdateSink) -> Self {
        let previous = chat_history
            .iter()
            .filter_map(|t| match t {
                ChatTurn::Assistant(a) => Some(a.steps.clone()),
                ChatTurn::User(_) => None,
            })
            .flatten()
            .collect();
        Self {
            current: Vec::new(),
            previous,
            chat_history,
            answer: None,
            sink,
        }
    }

    /// Emits an incremental chunk; does not mutate step storage. Chunks for a given `id` are
    /// delivered to the sink in call order (caller is responsible for calling in order).
    pub fn add_streaming_update(&self, kind: ChunkKind, id: &str, chunk: &str) {
        (self.sink)(StreamUpdate::chunk(kind, id.to_string(), chunk.to_string()));
    }

    /// Appends a fully-materialized step and emits a corresponding final update, except for
    /// `Reasoning` steps whose text was already streamed via chunks (§4.1).
    pub fn add_update(&mut self, step: Step) {
        match &step {
            Step::Reasoning(_) => {}
            Step::LogSearch(s) => (self.sink)(StreamUpdate::LogSearchTools {
                id: s.id.clone(),
                timestamp: s.timestamp,
                tool_calls: s.data.clone(),
            }),
            Step::CodeSearch(s) => (self.sink)(StreamUpdate::CodeSearchTools {
                id: s.id.clone(),
                timestamp: s.timestamp,
                tool_calls: s.data.clone(),
            }),
            Step::Review(s) => (self.sink)(StreamUpdate::Review(s.clone())),
            Step::LogPostprocessing(s) => {
                (self.sink)(StreamUpdate::LogPostprocessing(s.clone()))
            }
            Step::CodePostprocessing(s) => {
                (self.sink)(StreamUpdate::CodePostprocessing(s.clone()))
            }
        }
        self.current.push(step);
    }

    /// Returns the requested scope. `Both` = `Previous ++ Current`, disjoint (§8 invariant).
    pub fn get_steps(&self, scope: Scope) -> Vec<Step> {
        match scope {
            Scope::Current => self.current.clone(),
            Scope::Previous => self.previous.clone(),
            Scope::Both => {
                let mut all = self.previous.clone();
                all.extend(self.current.clone());
                all
            }
        }
    }

    pub fn get_log_search_tool_calls_with_results(
        &self,
        scope: Scope,
    ) -> Vec<LogSearchToolCallWithResult> {
        self.get_steps(scope)
            .into_iter()
            .filter_map(|s| match s {
                Step::LogSearch(s) => Some(s.data),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn get_cat_tool_calls_with_results(&self, scope: Scope) -> Vec<CatToolCallWithResult> {
        self.get_steps(scope)
            .into_iter()
            .filter_map(|s| match s {
                Step::CodeSearch(s) => Some(s.data),
                _ => None,
            })
            .flatten()
            .filter_map(|c| match c {
                CodeToolCallWithResult::Cat(c) => Some(c),
                CodeToolCallWithResult::Grep(_) => None,
            })
            .collect()
    }

    pub fn get_grep_tool_calls_with_results(&self, scope: Scope) -> Vec<GrepToolCallWithResult> {
        self.get_steps(scope)
            .into_iter()
            .filter_map(|s| match s {
                Step::CodeSearch(s) => Some(s.data),
                _ => None,
            })
            .flatten()
            .filter_map(|c| match c {
                CodeToolCallWithResult::Grep(g) => Some(g),
                CodeToolCallWithResult::Cat(_) => None,
            })
            .collect()
    }

    /// Materializes a model message list: `[system, ...history, assistant(current-turn context)]`.
    pub fn get_reasoner_messages(&self, system_prompt: &str) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::System {
            content: system_prompt.to_string(),
        }];
        messages.extend(self.chat_history.iter().map(turn_to_message));
        let current_context = format_gathered_context(&self.current);
        if !current_context.is_empty() {
            messages.push(ChatMessage::Assistant {
                content: current_context,
            });
        }
        messages
    }

    pub fn set_answer(&mut self, text: impl Into<String>) {
        self.answer = Some(text.into());
    }

    pub fn get_answer(&self) -> Option<&str> {
        self.answer.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{new_step_id, new_timestamp, ReasoningStep, ReviewStep};

    fn manager() -> StateManager {
        StateManager::new(Vec::new(), crate::stream::noop_sink())
    }

    #[test]
    fn both_scope_is_previous_then_current_disjoint() {
        let mut previous_turn_steps = vec![Step::Reasoning(ReasoningStep {
            id: new_step_id(),
            timestamp: new_timestamp(),
            data: "previous answer".into(),
        })];
        let history = vec![ChatTurn::Assistant(AssistantMessage {
            steps: std::mem::take(&mut previous_turn_steps),
            response: Some("previous answer".into()),
            error: None,
        })];
        let mut mgr = StateManager::new(history, crate::stream::noop_sink());
        mgr.add_update(Step::Review(ReviewStep {
            id: new_step_id(),
            timestamp: new_timestamp(),
            content: "looks right".into(),
            accepted: true,
        }));

        let both = mgr.get_steps(Scope::Both);
        let prev = mgr.get_steps(Scope::Previous);
        let cur = mgr.get_steps(Scope::Current);
        assert_eq!(both.len(), prev.len() + cur.len());
        assert_eq!(prev.len(), 1);
        assert_eq!(cur.len(), 1);
    }

    #[test]
    fn reasoning_step_is_stored_but_not_emitted() {
        use std::sync::{Arc, Mutex};
        let emitted: Arc<Mutex<Vec<StreamUpdate>>> = Arc::new(Mutex::new(Vec::new()));
        let emitted2 = Arc::clone(&emitted);
        let sink: UpdateSink = Box::new(move |u| emitted2.lock().unwrap().push(u));
        let mut mgr = StateManager::new(Vec::new(), sink);
        mgr.add_update(Step::Reasoning(ReasoningStep {
            id: new_step_id(),
            timestamp: new_timestamp(),
            data: "text".into(),
        }));
        assert!(emitted.lock().unwrap().is_empty());
        assert_eq!(mgr.get_steps(Scope::Current).len(), 1);
    }

    #[test]
    fn gathered_context_is_empty_for_no_steps() {
        assert_eq!(format_gathered_context(&[]), "");
    }

    #[test]
    fn answer_round_trips() {
        let mut mgr = manager();
        assert!(mgr.get_answer().is_none());
        mgr.set_answer("root cause");
        assert_eq!(mgr.get_answer(), Some("root cause"));
    }
}
