//! Reasoner node (C5, §4.5).

use tokio_util::sync::CancellationToken;

use crate::error::SubAgentError;
use crate::llm::{LlmClient, LlmError, ToolChoiceMode, ToolSpec};
use crate::state_manager::StateManager;
use crate::stream::ChunkKind;
use crate::types::{
    new_step_id, new_timestamp, CodeRequest, LogRequest, ReasoningStep, ReasonerOutput, Step,
    SubAgentCall,
};
use crate::util::strip_reasoning;

fn log_request_tool_spec() -> ToolSpec {
    ToolSpec {
        name: "logRequest".to_string(),
        description: "Delegate a focused log search to the log-search sub-agent.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "request": {"type": "string"},
                "reasoning": {"type": "string"}
            },
            "required": ["request", "reasoning"]
        }),
    }
}

fn code_request_tool_spec() -> ToolSpec {
    ToolSpec {
        name: "codeRequest".to_string(),
        description: "Delegate a focused code search to the code-search sub-agent.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "request": {"type": "string"},
                "reasoning": {"type": "string"}
            },
            "required": ["request", "reasoning"]
        }),
    }
}

/// Runs one reasoner turn. Text-delta events are forwarded as `reasoning` chunks under a fresh
/// id; the final [`ReasoningStep`] is stored with the aggregated text regardless of which
/// output variant results.
///
/// Provider errors (non-cancellation) are NOT recovered here — they bubble to the caller, which
/// treats them as fatal to the run (§4.5, §7 "Reasoner failures bubble").
pub async fn invoke(
    llm: &dyn LlmClient,
    state: &mut StateManager,
    system_prompt: &str,
    cancel: &CancellationToken,
) -> Result<ReasonerOutput, SubAgentError> {
    let tools = vec![log_request_tool_spec(), code_request_tool_spec()];
    let messages = state.get_reasoner_messages(system_prompt);

    let step_id = new_step_id();
    let mut accumulated = String::new();
    let mut on_chunk = |chunk: &str| {
        accumulated.push_str(chunk);
        state.add_streaming_update(ChunkKind::Reasoning, &step_id, chunk);
    };

    let response = llm
        .invoke_stream(&messages, &tools, ToolChoiceMode::Auto, cancel, &mut on_chunk)
        .await
        .map_err(|e| match e {
            LlmError::Cancelled => SubAgentError::Cancelled,
            LlmError::Provider(msg) => SubAgentError::Provider(msg),
        })?;

    state.add_update(Step::Reasoning(ReasoningStep {
        id: step_id,
        timestamp: new_timestamp(),
        data: accumulated.clone(),
    }));

    if response.tool_calls.is_empty() {
        // The transcript step above keeps the raw streamed text; the candidate answer itself
        // has any `<thinking>` preamble stripped before it is reviewed or returned (§8).
        return Ok(ReasonerOutput::Reasoning { content: strip_reasoning(&accumulated) });
    }

    let mut calls = Vec::with_capacity(response.tool_calls.len());
    for call in response.tool_calls {
        let parsed = match call.name.as_str() {
            "logRequest" => {
                let r: LogRequest = serde_json::from_value(call.arguments)
                    .map_err(|e| SubAgentError::Protocol(format!("invalid logRequest args: {e}")))?;
                SubAgentCall::LogRequest(r)
            }
            "codeRequest" => {
                let r: CodeRequest = serde_json::from_value(call.arguments)
                    .map_err(|e| SubAgentError::Protocol(format!("invalid codeRequest args: {e}")))?;
                SubAgentCall::CodeRequest(r)
            }
            other => return Err(SubAgentError::Protocol(format!("unknown tool call {other}"))),
        };
        calls.push(parsed);
    }
    Ok(ReasonerOutput::SubAgentCalls(calls))
}
