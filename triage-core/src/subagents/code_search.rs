//! Sub-agent: code search (C4, §4.4).

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{SubAgentError, ToolError};
use crate::llm::{LlmClient, LlmError, ToolChoiceMode};
use crate::state_manager::StateManager;
use crate::stream::ChunkKind;
use crate::tool_exec::{execute_cat, execute_grep};
use crate::types::{
    new_step_id, new_timestamp, CatInput, CatToolCallWithResult, CodeRequest, CodeSearchStep,
    CodeToolCallWithResult, GrepInput, GrepToolCallWithResult, Scope, Step, ToolOutput,
};

use super::{cat_request_tool_spec, grep_request_tool_spec};

fn build_prompt(
    user_query: &str,
    code_request: &CodeRequest,
    history: &[CodeToolCallWithResult],
    remaining_queries: u32,
) -> String {
    let already_read: Vec<&str> = history
        .iter()
        .filter_map(|c| match c {
            CodeToolCallWithResult::Cat(c) => Some(c.input.path.as_str()),
            CodeToolCallWithResult::Grep(_) => None,
        })
        .collect();
    format!(
        "User incident query: {user_query}\n\
         Delegated request: {}\n\
         Delegation reasoning: {}\n\
         Files already read (do not re-read): {}\n\
         Remaining iterations in this budget: {remaining_queries}",
        code_request.request,
        code_request.reasoning,
        already_read.join(", "),
    )
}

/// Same shape as the log-search sub-agent, but each iteration may emit multiple `catRequest`/
/// `grepRequest` tool calls, executed sequentially with order preserved (§4.4).
pub async fn invoke(
    llm: &dyn LlmClient,
    state: &mut StateManager,
    repo_path: &str,
    user_query: &str,
    code_request: &CodeRequest,
    max_iters: u32,
    cancel: &CancellationToken,
) -> Result<(), SubAgentError> {
    let tools = vec![cat_request_tool_spec(), grep_request_tool_spec()];

    for iter in 0..max_iters {
        if cancel.is_cancelled() {
            return Err(SubAgentError::Cancelled);
        }

        let history: Vec<CodeToolCallWithResult> = state
            .get_cat_tool_calls_with_results(Scope::Both)
            .into_iter()
            .map(CodeToolCallWithResult::Cat)
            .chain(
                state
                    .get_grep_tool_calls_with_results(Scope::Both)
                    .into_iter()
                    .map(CodeToolCallWithResult::Grep),
            )
            .collect();
        let remaining = max_iters.saturating_sub(iter);
        let prompt = build_prompt(user_query, code_request, &history, remaining);
        let messages = vec![
            crate::types::ChatMessage::System {
                content: crate::prompts::CODE_SEARCH_SUB_AGENT_SYSTEM_PROMPT.to_string(),
            },
            crate::types::ChatMessage::User { content: prompt },
        ];

        let step_id = new_step_id();
        let mut accumulated = String::new();
        let mut on_chunk = |chunk: &str| {
            accumulated.push_str(chunk);
            state.add_streaming_update(ChunkKind::CodeSearch, &step_id, chunk);
        };

        let response = llm
            .invoke_stream(&messages, &tools, ToolChoiceMode::Auto, cancel, &mut on_chunk)
            .await;

        let response = match response {
            Ok(r) => r,
            Err(LlmError::Cancelled) => return Err(SubAgentError::Cancelled),
            Err(LlmError::Provider(msg)) => {
                warn!(error = %msg, "code-search sub-agent provider error, returning empty actions");
                return Ok(());
            }
        };

        if response.tool_calls.is_empty() {
            return Ok(());
        }

        let mut results = Vec::with_capacity(response.tool_calls.len());
        for call in &response.tool_calls {
            let result = match call.name.as_str() {
                "catRequest" => {
                    let input: CatInput = serde_json::from_value(call.arguments.clone())
                        .map_err(|e| SubAgentError::Protocol(format!("invalid catRequest args: {e}")))?;
                    match execute_cat(input.clone(), cancel).await {
                        Ok(r) => Ok(CodeToolCallWithResult::Cat(r)),
                        Err(ToolError::Cancelled) => Err(SubAgentError::Cancelled),
                        Err(e) => Ok(CodeToolCallWithResult::Cat(CatToolCallWithResult {
                            timestamp: new_timestamp(),
                            input,
                            output: ToolOutput::Error {
                                tool_call_type: "catRequest".to_string(),
                                error: e.to_string(),
                            },
                        })),
                    }
                }
                "grepRequest" => {
                    let input: GrepInput = serde_json::from_value(call.arguments.clone())
                        .map_err(|e| SubAgentError::Protocol(format!("invalid grepRequest args: {e}")))?;
                    match execute_grep(input.clone(), repo_path, cancel).await {
                        Ok(r) => Ok(CodeToolCallWithResult::Grep(r)),
                        Err(ToolError::Cancelled) => Err(SubAgentError::Cancelled),
                        Err(e) => Ok(CodeToolCallWithResult::Grep(GrepToolCallWithResult {
                            timestamp: new_timestamp(),
                            input,
                            output: ToolOutput::Error {
                                tool_call_type: "grepRequest".to_string(),
                                error: e.to_string(),
                            },
                        })),
                    }
                }
                other => {
                    return Err(SubAgentError::Protocol(format!("unknown tool call {other}")))
                }
            };
            match result {
                Ok(r) => results.push(r),
                Err(e) => return Err(e),
            }
        }

        state.add_update(Step::CodeSearch(CodeSearchStep {
            id: step_id,
            timestamp: new_timestamp(),
            reasoning: accumulated,
            data: results,
        }));
    }

    warn!(max_iters, "code-search sub-agent reached iteration cap, forcing completion");
    Ok(())
}
