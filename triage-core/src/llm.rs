//! Provider-agnostic LLM client contract (§6 "Consumed — LLM client").
//!
//! The core never names a concrete provider; callers plug in an adapter that implements
//! [`LlmClient`]. Grounded on the teacher's `LlmClient` trait: text+tool-call streaming with a
//! configurable tool-choice and an abort signal, expressed here as a `CancellationToken`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::types::ChatMessage;

/// A tool declared to the model as `{description, parameters}` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// How the model is constrained to use tools for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoiceMode {
    /// The model may call zero or more declared tools.
    Auto,
    /// The model must call at least one declared tool.
    Required,
    /// The model must call exactly the named tool (reviewer's forced `reviewDecision`).
    ForcedSingle(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: Option<LlmUsage>,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("cancelled")]
    Cancelled,
    #[error("provider error: {0}")]
    Provider(String),
}

/// A provider-agnostic chat model. `invoke_stream`'s default forwards the whole response as a
/// single chunk, matching the teacher's `default_invoke_stream` fallback for clients that only
/// implement the non-streaming path.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        tool_choice: ToolChoiceMode,
        cancel: &CancellationToken,
    ) -> Result<LlmResponse, LlmError>;

    /// Streams text deltas to `on_chunk` as they arrive, then returns the full response.
    /// `on_chunk` is synchronous and non-blocking, mirroring the state manager's update sink.
    async fn invoke_stream(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        tool_choice: ToolChoiceMode,
        cancel: &CancellationToken,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<LlmResponse, LlmError> {
        let response = self.invoke(messages, tools, tool_choice, cancel).await?;
        if !response.content.is_empty() {
            on_chunk(&response.content);
        }
        Ok(response)
    }
}

/// Test fixture: returns a fixed sequence of responses, one per call, repeating the last
/// response once the sequence is exhausted. Grounded on the teacher's `MockLlm` pattern.
pub struct MockLlm {
    responses: std::sync::Mutex<std::collections::VecDeque<LlmResponse>>,
    last: std::sync::Mutex<Option<LlmResponse>>,
}

impl MockLlm {
    pub fn with_responses(responses: Vec<LlmResponse>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
            last: std::sync::Mutex::new(None),
        }
    }

    pub fn constant_text(text: impl Into<String>) -> Self {
        Self::with_responses(vec![LlmResponse {
            content: text.into(),
            tool_calls: vec![],
            usage: None,
        }])
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn invoke(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolSpec],
        _tool_choice: ToolChoiceMode,
        cancel: &CancellationToken,
    ) -> Result<LlmResponse, LlmError> {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }
        let mut queue = self.responses.lock().unwrap();
        let response = match queue.pop_front() {
            Some(r) => r,
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| LlmResponse {
                    content: String::new(),
                    tool_calls: vec![],
                    usage: None,
                }),
        };
        *self.last.lock().unwrap() = Some(response.clone());
        Ok(response)
    }
}

impl Clone for LlmResponse {
    fn clone(&self) -> Self {
        LlmResponse {
            content: self.content.clone(),
            tool_calls: self.tool_calls.clone(),
            usage: self.usage,
        }
    }
}
