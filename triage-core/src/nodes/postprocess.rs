//! Post-processors (C7, §4.7): single-shot model calls extracting typed, citable facts from
//! the final transcript. Run independently, fanned out by the caller (§5: up to 2 parallel).

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::PostprocessError;
use crate::llm::{LlmClient, LlmError, ToolChoiceMode, ToolSpec};
use crate::observability::ObservabilityClient;
use crate::state_manager::StateManager;
use crate::types::{
    new_step_id, new_timestamp, CodeFact, CodePostprocessingStep, LogFact,
    LogPostprocessingStep, Scope, Step,
};
use crate::util::normalize_file_path;

const EMIT_LOG_FACTS_TOOL: &str = "emitLogFacts";
const EMIT_CODE_FACTS_TOOL: &str = "emitCodeFacts";

fn emit_log_facts_tool_spec() -> ToolSpec {
    ToolSpec {
        name: EMIT_LOG_FACTS_TOOL.to_string(),
        description: "Emit up to 8 citable log facts.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "facts": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "query": {"type": "object"},
                            "title": {"type": "string"},
                            "fact": {"type": "string"}
                        },
                        "required": ["query", "title", "fact"]
                    }
                }
            },
            "required": ["facts"]
        }),
    }
}

fn emit_code_facts_tool_spec() -> ToolSpec {
    ToolSpec {
        name: EMIT_CODE_FACTS_TOOL.to_string(),
        description: "Emit up to 8 citable code facts.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "facts": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": {"type": "string"},
                            "fact": {"type": "string"},
                            "filepath": {"type": "string"},
                            "startLine": {"type": "integer"},
                            "endLine": {"type": "integer"}
                        },
                        "required": ["title", "fact", "filepath", "startLine", "endLine"]
                    }
                }
            },
            "required": ["facts"]
        }),
    }
}

#[derive(Deserialize)]
struct LogFactsArgs {
    facts: Vec<LogFact>,
}

#[derive(Deserialize)]
struct RawCodeFact {
    title: String,
    fact: String,
    filepath: String,
    #[serde(rename = "startLine")]
    start_line: u32,
    #[serde(rename = "endLine")]
    end_line: u32,
}

#[derive(Deserialize)]
struct CodeFactsArgs {
    facts: Vec<RawCodeFact>,
}

fn gathered_transcript(state: &StateManager) -> String {
    crate::state_manager::format_gathered_context(&state.get_steps(Scope::Both))
}

/// Extracts ≤8 `LogFact`s, each referencing an original log query, narrowing its time window
/// and folding in highlight keywords via the observability adapter.
///
/// Takes the state manager behind an async mutex, not `&mut`, so the runner can run this
/// concurrently with [`invoke_code_postprocessor`] (§5 "bounded fan-out... up to 2 parallel
/// tasks"); each mutation locks just long enough to read or append.
pub async fn invoke_log_postprocessor(
    llm: &dyn LlmClient,
    observability: &dyn ObservabilityClient,
    state: &tokio::sync::Mutex<StateManager>,
    max_facts: usize,
    cancel: &CancellationToken,
) -> Result<(), PostprocessError> {
    let tools = vec![emit_log_facts_tool_spec()];
    let transcript = gathered_transcript(&*state.lock().await);
    let messages = vec![
        crate::types::ChatMessage::System {
            content: crate::prompts::LOG_POSTPROCESSOR_SYSTEM_PROMPT.to_string(),
        },
        crate::types::ChatMessage::User { content: transcript },
    ];

    let response = llm
        .invoke(&messages, &tools, ToolChoiceMode::Required, cancel)
        .await
        .map_err(|e| match e {
            LlmError::Cancelled => PostprocessError::Cancelled,
            LlmError::Provider(msg) => PostprocessError::Provider(msg),
        })?;

    if response.tool_calls.is_empty() {
        return Err(PostprocessError::NoToolCall);
    }
    if response.tool_calls.len() > 1 {
        warn!("log post-processor returned multiple tool calls, merging facts");
    }

    let mut facts = Vec::new();
    for call in &response.tool_calls {
        let args: LogFactsArgs = serde_json::from_value(call.arguments.clone())
            .map_err(|e| PostprocessError::Provider(format!("invalid emitLogFacts args: {e}")))?;
        facts.extend(args.facts);
    }
    if facts.len() > max_facts {
        warn!(returned = facts.len(), max_facts, "truncating log facts to the bound");
        facts.truncate(max_facts);
    }
    for fact in &mut facts {
        let keywords = extract_keywords(&fact.fact);
        fact.query.query = observability.add_keywords_to_query(&fact.query.query, &keywords);
    }

    state.lock().await.add_update(Step::LogPostprocessing(LogPostprocessingStep {
        id: new_step_id(),
        timestamp: new_timestamp(),
        data: facts,
    }));
    Ok(())
}

/// Extremely small heuristic: pull capitalized-looking tokens out of the fact text as highlight
/// keywords. The actual keyword selection is a model/prompt concern; this is just the glue that
/// threads whatever the post-processor decided into `ObservabilityClient::add_keywords_to_query`.
fn extract_keywords(fact_text: &str) -> Vec<String> {
    fact_text
        .split_whitespace()
        .filter(|w| w.chars().next().map(|c| c.is_ascii_uppercase()).unwrap_or(false))
        .take(3)
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Extracts ≤8 `CodeFact`s. Emits an initial empty step and a final populated step under the
/// same id, so the UI can render a placeholder then fill it (§4.7).
pub async fn invoke_code_postprocessor(
    llm: &dyn LlmClient,
    state: &tokio::sync::Mutex<StateManager>,
    repo_path: &str,
    max_facts: usize,
    cancel: &CancellationToken,
) -> Result<(), PostprocessError> {
    let step_id = new_step_id();
    let transcript = {
        let mut guard = state.lock().await;
        guard.add_update(Step::CodePostprocessing(CodePostprocessingStep {
            id: step_id.clone(),
            timestamp: new_timestamp(),
            data: Vec::new(),
        }));
        gathered_transcript(&guard)
    };

    let tools = vec![emit_code_facts_tool_spec()];
    let messages = vec![
        crate::types::ChatMessage::System {
            content: crate::prompts::CODE_POSTPROCESSOR_SYSTEM_PROMPT.to_string(),
        },
        crate::types::ChatMessage::User { content: transcript },
    ];

    let response = llm
        .invoke(&messages, &tools, ToolChoiceMode::Required, cancel)
        .await
        .map_err(|e| match e {
            LlmError::Cancelled => PostprocessError::Cancelled,
            LlmError::Provider(msg) => PostprocessError::Provider(msg),
        })?;

    if response.tool_calls.is_empty() {
        return Err(PostprocessError::NoToolCall);
    }
    if response.tool_calls.len() > 1 {
        warn!("code post-processor returned multiple tool calls, merging facts");
    }

    let mut facts = Vec::new();
    for call in &response.tool_calls {
        let args: CodeFactsArgs = serde_json::from_value(call.arguments.clone())
            .map_err(|e| PostprocessError::Provider(format!("invalid emitCodeFacts args: {e}")))?;
        facts.extend(args.facts.into_iter().map(|f| CodeFact {
            title: f.title,
            fact: f.fact,
            filepath: normalize_file_path(&f.filepath, repo_path),
            start_line: f.start_line,
            end_line: f.end_line,
        }));
    }
    if facts.len() > max_facts {
        warn!(returned = facts.len(), max_facts, "truncating code facts to the bound");
        facts.truncate(max_facts);
    }

    state.lock().await.add_update(Step::CodePostprocessing(CodePostprocessingStep {
        id: step_id,
        timestamp: new_timestamp(),
        data: facts,
    }));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmResponse, MockLlm, ToolCallRequest};
    use crate::observability::MockObservabilityClient;
    use crate::stream::{noop_sink, StreamUpdate, UpdateSink};
    use crate::types::ChatTurn;

    #[tokio::test]
    async fn log_postprocessor_populates_facts() {
        let call = ToolCallRequest {
            id: "1".into(),
            name: EMIT_LOG_FACTS_TOOL.into(),
            arguments: serde_json::json!({
                "facts": [
                    {"query": {"query": "service:orders", "start": "now-1h", "end": "now", "limit": 50}, "title": "Pool exhaustion", "fact": "Connections maxed out"},
                    {"query": {"query": "service:orders", "start": "now-2h", "end": "now-1h", "limit": 50}, "title": "Retry storm", "fact": "Clients retried aggressively"}
                ]
            }),
        };
        let llm = MockLlm::with_responses(vec![LlmResponse { content: String::new(), tool_calls: vec![call], usage: None }]);
        let obs = MockObservabilityClient::empty();
        let state = tokio::sync::Mutex::new(StateManager::new(Vec::<ChatTurn>::new(), noop_sink()));
        let cancel = CancellationToken::new();
        invoke_log_postprocessor(&llm, &obs, &state, 8, &cancel).await.unwrap();
        let steps = state.lock().await.get_steps(Scope::Current);
        match &steps[0] {
            Step::LogPostprocessing(s) => assert_eq!(s.data.len(), 2),
            _ => panic!("expected log postprocessing step"),
        }
    }

    #[tokio::test]
    async fn code_postprocessor_normalizes_paths_and_emits_initial_then_final() {
        let call = ToolCallRequest {
            id: "1".into(),
            name: EMIT_CODE_FACTS_TOOL.into(),
            arguments: serde_json::json!({
                "facts": [
                    {"title": "Retry loop", "fact": "Retries without backoff", "filepath": "/a/b/src/x.ts", "startLine": 10, "endLine": 20}
                ]
            }),
        };
        let llm = MockLlm::with_responses(vec![LlmResponse { content: String::new(), tool_calls: vec![call], usage: None }]);

        let seen: std::sync::Arc<std::sync::Mutex<Vec<StreamUpdate>>> = Default::default();
        let seen2 = std::sync::Arc::clone(&seen);
        let sink: UpdateSink = Box::new(move |u| seen2.lock().unwrap().push(u));
        let state = tokio::sync::Mutex::new(StateManager::new(Vec::<ChatTurn>::new(), sink));
        let cancel = CancellationToken::new();
        invoke_code_postprocessor(&llm, &state, "/a/b/", 8, &cancel).await.unwrap();

        let steps = state.lock().await.get_steps(Scope::Current);
        match &steps[0] {
            Step::CodePostprocessing(s) => {
                assert_eq!(s.data.len(), 1);
                assert_eq!(s.data[0].filepath, "src/x.ts");
                assert!(!s.data[0].filepath.starts_with("/a/b"));
            }
            _ => panic!("expected code postprocessing step"),
        }

        let emitted = seen.lock().unwrap();
        assert_eq!(emitted.len(), 2, "initial empty step then final populated step");
        match &emitted[0] {
            StreamUpdate::CodePostprocessing(s) => assert!(s.data.is_empty()),
            _ => panic!("expected initial CodePostprocessing update"),
        }
    }

    #[tokio::test]
    async fn missing_tool_call_is_an_error() {
        let llm = MockLlm::with_responses(vec![LlmResponse { content: String::new(), tool_calls: vec![], usage: None }]);
        let obs = MockObservabilityClient::empty();
        let state = tokio::sync::Mutex::new(StateManager::new(Vec::<ChatTurn>::new(), noop_sink()));
        let cancel = CancellationToken::new();
        let err = invoke_log_postprocessor(&llm, &obs, &state, 8, &cancel).await.unwrap_err();
        assert!(matches!(err, PostprocessError::NoToolCall));
    }
}
