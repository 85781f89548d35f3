//! Reviewer node (C6, §4.6). Optional; owned loop policy lives in the pipeline runner.

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::ReviewError;
use crate::llm::{LlmClient, LlmError, ToolChoiceMode, ToolSpec};
use crate::state_manager::StateManager;
use crate::types::{new_step_id, new_timestamp, ChatMessage, ReviewStep, Step};

const REVIEW_DECISION_TOOL: &str = "reviewDecision";

fn review_decision_tool_spec() -> ToolSpec {
    ToolSpec {
        name: REVIEW_DECISION_TOOL.to_string(),
        description: "Record the review verdict for the proposed root-cause analysis."
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "accepted": {"type": "boolean"},
                "reasoning": {"type": "string"}
            },
            "required": ["accepted", "reasoning"]
        }),
    }
}

#[derive(Deserialize)]
struct ReviewDecisionArgs {
    accepted: bool,
    reasoning: String,
}

/// Forces exactly one `reviewDecision` tool call. Fails the step if it is missing or duplicated.
pub async fn invoke(
    llm: &dyn LlmClient,
    state: &mut StateManager,
    candidate_answer: &str,
    cancel: &CancellationToken,
) -> Result<ReviewStep, ReviewError> {
    let tools = vec![review_decision_tool_spec()];
    let messages = vec![
        ChatMessage::System {
            content: crate::prompts::REVIEWER_SYSTEM_PROMPT.to_string(),
        },
        ChatMessage::User {
            content: format!("Proposed root-cause analysis:\n{candidate_answer}"),
        },
    ];

    let response = llm
        .invoke(
            &messages,
            &tools,
            ToolChoiceMode::ForcedSingle(REVIEW_DECISION_TOOL.to_string()),
            cancel,
        )
        .await
        .map_err(|e| match e {
            LlmError::Cancelled => ReviewError::Cancelled,
            LlmError::Provider(msg) => ReviewError::Provider(msg),
        })?;

    if response.tool_calls.len() != 1 {
        return Err(ReviewError::Protocol(format!(
            "expected exactly one reviewDecision tool call, got {}",
            response.tool_calls.len()
        )));
    }
    let args: ReviewDecisionArgs = serde_json::from_value(response.tool_calls[0].arguments.clone())
        .map_err(|e| ReviewError::Protocol(format!("invalid reviewDecision args: {e}")))?;

    let step = ReviewStep {
        id: new_step_id(),
        timestamp: new_timestamp(),
        content: args.reasoning,
        accepted: args.accepted,
    };
    state.add_update(Step::Review(step.clone()));
    Ok(step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmResponse, MockLlm, ToolCallRequest};
    use crate::stream::noop_sink;
    use crate::types::ChatTurn;

    #[tokio::test]
    async fn accepted_decision_is_recorded() {
        let call = ToolCallRequest {
            id: "1".into(),
            name: REVIEW_DECISION_TOOL.into(),
            arguments: serde_json::json!({"accepted": true, "reasoning": "complete"}),
        };
        let llm = MockLlm::with_responses(vec![LlmResponse {
            content: String::new(),
            tool_calls: vec![call],
            usage: None,
        }]);
        let mut state = StateManager::new(Vec::<ChatTurn>::new(), noop_sink());
        let cancel = CancellationToken::new();
        let step = invoke(&llm, &mut state, "answer", &cancel).await.unwrap();
        assert!(step.accepted);
        assert_eq!(step.content, "complete");
    }

    #[tokio::test]
    async fn missing_tool_call_is_a_protocol_violation() {
        let llm = MockLlm::with_responses(vec![LlmResponse {
            content: "I think it's fine".into(),
            tool_calls: vec![],
            usage: None,
        }]);
        let mut state = StateManager::new(Vec::<ChatTurn>::new(), noop_sink());
        let cancel = CancellationToken::new();
        let err = invoke(&llm, &mut state, "answer", &cancel).await.unwrap_err();
        assert!(matches!(err, ReviewError::Protocol(_)));
    }

    #[tokio::test]
    async fn duplicated_tool_call_is_a_protocol_violation() {
        let call = ToolCallRequest {
            id: "1".into(),
            name: REVIEW_DECISION_TOOL.into(),
            arguments: serde_json::json!({"accepted": true, "reasoning": "x"}),
        };
        let llm = MockLlm::with_responses(vec![LlmResponse {
            content: String::new(),
            tool_calls: vec![call.clone(), call],
            usage: None,
        }]);
        let mut state = StateManager::new(Vec::<ChatTurn>::new(), noop_sink());
        let cancel = CancellationToken::new();
        let err = invoke(&llm, &mut state, "answer", &cancel).await.unwrap_err();
        assert!(matches!(err, ReviewError::Protocol(_)));
    }
}
