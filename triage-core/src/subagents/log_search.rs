//! Sub-agent: log search (C3, §4.3).

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::SubAgentError;
use crate::llm::{LlmClient, LlmError, ToolChoiceMode};
use crate::observability::{ObservabilityClient, ObservabilityError};
use crate::state_manager::StateManager;
use crate::stream::ChunkKind;
use crate::tool_exec::execute_log_search;
use crate::types::{new_step_id, new_timestamp, LogRequest, LogSearchInput, LogSearchStep, Scope, Step};

use super::log_search_input_tool_spec;

/// A fixed broad query used when the provider fails: last 24h, generous limit, no filter. Keeps
/// the pipeline moving per §4.3 "Failure" rather than aborting the whole run over a flaky model.
fn fallback_broad_query() -> LogSearchInput {
    LogSearchInput {
        query: "*".to_string(),
        start: "now-24h".to_string(),
        end: "now".to_string(),
        limit: 200,
        page_cursor: None,
    }
}

/// Renders `{facet: [values...]}` as one sorted line per facet, so the prompt is deterministic
/// regardless of the backend's map iteration order.
fn format_facets(facets: &HashMap<String, Vec<String>>) -> String {
    if facets.is_empty() {
        return "none available".to_string();
    }
    let mut keys: Vec<&String> = facets.keys().collect();
    keys.sort();
    keys.into_iter()
        .map(|k| format!("- {k}: {}", facets[k].join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

#[allow(clippy::too_many_arguments)]
fn build_prompt(
    user_query: &str,
    log_request: &LogRequest,
    observability: &dyn ObservabilityClient,
    facets: &HashMap<String, Vec<String>>,
    codebase_overview: &str,
    history: &[crate::types::LogSearchToolCallWithResult],
    remaining_queries: u32,
) -> String {
    let most_recent = history
        .last()
        .map(|c| format!("{:?}", c.output))
        .unwrap_or_else(|| "none yet".to_string());
    let history_text = history
        .iter()
        .map(|c| format!("- {} -> {:?}", c.input.query, c.output))
        .collect::<Vec<_>>()
        .join("\n");
    let overview = if codebase_overview.is_empty() { "none provided" } else { codebase_overview };
    format!(
        "User incident query: {user_query}\n\
         Delegated request: {}\n\
         Delegation reasoning: {}\n\
         Log-label facets:\n{}\n\
         Platform query guidance: {}\n\
         Most recent result: {most_recent}\n\
         Full history:\n{history_text}\n\
         Remaining queries in this budget: {remaining_queries}\n\
         Codebase overview: {overview}",
        log_request.request,
        log_request.reasoning,
        format_facets(facets),
        observability.get_log_search_query_instructions(),
    )
}

/// Finds logs to satisfy `log_request` using the fast model; extends the transcript with one
/// [`LogSearchStep`] per iteration. `max_iters` defaults to 12 (§4.3).
#[allow(clippy::too_many_arguments)]
pub async fn invoke(
    llm: &dyn LlmClient,
    observability: &dyn ObservabilityClient,
    state: &mut StateManager,
    user_query: &str,
    log_request: &LogRequest,
    codebase_overview: &str,
    max_iters: u32,
    cancel: &CancellationToken,
) -> Result<(), SubAgentError> {
    let tools = vec![log_search_input_tool_spec()];

    for iter in 0..max_iters {
        if cancel.is_cancelled() {
            return Err(SubAgentError::Cancelled);
        }

        let facets = match observability.get_logs_facet_values("now-24h", "now", cancel).await {
            Ok(f) => f,
            Err(ObservabilityError::Cancelled) => return Err(SubAgentError::Cancelled),
            Err(ObservabilityError::Backend(msg)) => {
                warn!(error = %msg, "failed to fetch log-label facets, continuing without them");
                HashMap::new()
            }
        };

        let history = state.get_log_search_tool_calls_with_results(Scope::Both);
        let remaining = max_iters.saturating_sub(iter);
        let prompt = build_prompt(
            user_query,
            log_request,
            observability,
            &facets,
            codebase_overview,
            &history,
            remaining,
        );
        let messages = vec![
            crate::types::ChatMessage::System {
                content: crate::prompts::LOG_SEARCH_SUB_AGENT_SYSTEM_PROMPT.to_string(),
            },
            crate::types::ChatMessage::User { content: prompt },
        ];

        let step_id = new_step_id();
        let mut accumulated = String::new();
        let mut on_chunk = |chunk: &str| {
            accumulated.push_str(chunk);
            state.add_streaming_update(ChunkKind::LogSearch, &step_id, chunk);
        };

        let response = llm
            .invoke_stream(&messages, &tools, ToolChoiceMode::Auto, cancel, &mut on_chunk)
            .await;

        let response = match response {
            Ok(r) => r,
            Err(LlmError::Cancelled) => return Err(SubAgentError::Cancelled),
            Err(LlmError::Provider(msg)) => {
                warn!(error = %msg, "log-search sub-agent provider error, falling back to broad query");
                let call = execute_log_search(fallback_broad_query(), observability, cancel)
                    .await
                    .map_err(|_| SubAgentError::Cancelled)?;
                state.add_update(Step::LogSearch(LogSearchStep {
                    id: new_step_id(),
                    timestamp: new_timestamp(),
                    reasoning: "fallback after provider error".to_string(),
                    data: vec![call],
                }));
                return Ok(());
            }
        };

        if response.tool_calls.is_empty() {
            // taskComplete
            return Ok(());
        }
        if response.tool_calls.len() != 1 || response.tool_calls[0].name != "logSearchInput" {
            return Err(SubAgentError::Protocol(format!(
                "expected exactly one logSearchInput tool call, got {:?}",
                response.tool_calls.iter().map(|t| &t.name).collect::<Vec<_>>()
            )));
        }

        let args = &response.tool_calls[0].arguments;
        let input: LogSearchInput = serde_json::from_value(args.clone())
            .map_err(|e| SubAgentError::Protocol(format!("invalid logSearchInput args: {e}")))?;

        let call = execute_log_search(input, observability, cancel)
            .await
            .map_err(|_| SubAgentError::Cancelled)?;

        state.add_update(Step::LogSearch(LogSearchStep {
            id: step_id,
            timestamp: new_timestamp(),
            reasoning: accumulated,
            data: vec![call],
        }));
    }

    warn!(max_iters, "log-search sub-agent reached iteration cap, forcing completion");
    Ok(())
}
