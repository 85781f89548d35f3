//! Step taxonomy, tool-call-with-result records, facts and chat-message shapes (C9, data model §3).
//!
//! All tagged unions here are explicit sum types with a `type` discriminant, never inheritance
//! hierarchies (design note §9); consumers are expected to match exhaustively.

use serde::{Deserialize, Serialize};

/// Wall-clock timestamp, ISO-8601. Carried as a string on the wire like the rest of the
/// streaming surface; ordering invariants (§8 "monotonically ordered by timestamp") are
/// enforced by construction, not reparsed from this string.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

fn now() -> Timestamp {
    chrono::Utc::now()
}

/// A structured action requested by the model, decoded against a declared schema.
pub trait ToolCallType {
    const TYPE_NAME: &'static str;
}

// ---------------------------------------------------------------------------------------------
// Tool-call-with-result records (§3 "Tool-call-with-result records")
// ---------------------------------------------------------------------------------------------

/// A tool's output is exactly one of a typed success payload or a tagged error — never partial.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ToolOutput<T> {
    Result(T),
    Error { tool_call_type: String, error: String },
}

impl<T> ToolOutput<T> {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutput::Error { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSearchInput {
    pub query: String,
    pub start: String,
    pub end: String,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub service: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSearchResult {
    pub logs: Vec<LogEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_cursor_or_indicator: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSearchToolCallWithResult {
    pub timestamp: Timestamp,
    pub input: LogSearchInput,
    pub output: ToolOutput<LogSearchResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatInput {
    /// Absolute path, re-anchored to `repoPath` by the caller.
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatResult {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatToolCallWithResult {
    pub timestamp: Timestamp,
    pub input: CatInput,
    pub output: ToolOutput<CatResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrepInput {
    pub pattern: String,
    /// Letters only, no dashes (validated at the tool boundary).
    #[serde(default)]
    pub flags: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrepResult {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrepToolCallWithResult {
    pub timestamp: Timestamp,
    pub input: GrepInput,
    pub output: ToolOutput<GrepResult>,
}

/// Either a `catRequest` or a `grepRequest` result, as appended by the code-search sub-agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CodeToolCallWithResult {
    Cat(CatToolCallWithResult),
    Grep(GrepToolCallWithResult),
}

// ---------------------------------------------------------------------------------------------
// Step taxonomy (§3 "Step taxonomy")
// ---------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSearchStep {
    pub id: String,
    pub timestamp: Timestamp,
    pub reasoning: String,
    pub data: Vec<LogSearchToolCallWithResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSearchStep {
    pub id: String,
    pub timestamp: Timestamp,
    pub reasoning: String,
    pub data: Vec<CodeToolCallWithResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub id: String,
    pub timestamp: Timestamp,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewStep {
    pub id: String,
    pub timestamp: Timestamp,
    pub content: String,
    pub accepted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFact {
    pub query: LogSearchInput,
    pub title: String,
    pub fact: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeFact {
    pub title: String,
    pub fact: String,
    /// Repo-relative; never begins with `repoPath` (§8 invariant).
    pub filepath: String,
    pub start_line: u32,
    pub end_line: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPostprocessingStep {
    pub id: String,
    pub timestamp: Timestamp,
    pub data: Vec<LogFact>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodePostprocessingStep {
    pub id: String,
    pub timestamp: Timestamp,
    pub data: Vec<CodeFact>,
}

/// An atomic entry in the agent transcript; exactly one tagged variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Step {
    LogSearch(LogSearchStep),
    CodeSearch(CodeSearchStep),
    Reasoning(ReasoningStep),
    Review(ReviewStep),
    LogPostprocessing(LogPostprocessingStep),
    CodePostprocessing(CodePostprocessingStep),
}

impl Step {
    pub fn id(&self) -> &str {
        match self {
            Step::LogSearch(s) => &s.id,
            Step::CodeSearch(s) => &s.id,
            Step::Reasoning(s) => &s.id,
            Step::Review(s) => &s.id,
            Step::LogPostprocessing(s) => &s.id,
            Step::CodePostprocessing(s) => &s.id,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            Step::LogSearch(s) => s.timestamp,
            Step::CodeSearch(s) => s.timestamp,
            Step::Reasoning(s) => s.timestamp,
            Step::Review(s) => s.timestamp,
            Step::LogPostprocessing(s) => s.timestamp,
            Step::CodePostprocessing(s) => s.timestamp,
        }
    }
}

/// Allocates a fresh step id and the current timestamp; used by every node that opens a step.
pub fn new_step_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn new_timestamp() -> Timestamp {
    now()
}

// ---------------------------------------------------------------------------------------------
// Delegations emitted by the reasoner (C5)
// ---------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRequest {
    pub request: String,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeRequest {
    pub request: String,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SubAgentCall {
    LogRequest(LogRequest),
    CodeRequest(CodeRequest),
}

/// What one reasoner turn produced (§4.5).
#[derive(Debug, Clone)]
pub enum ReasonerOutput {
    /// No tool calls emitted; `content` is the candidate answer.
    Reasoning { content: String },
    /// One or more delegations to run before the reasoner is invoked again.
    SubAgentCalls(Vec<SubAgentCall>),
}

// ---------------------------------------------------------------------------------------------
// Context items and chat messages (§3 "Chat messages", "Context items")
// ---------------------------------------------------------------------------------------------

/// Opaque reference the host materializes into a concrete payload before sending; the core
/// treats it as a typed leaf appended to the user turn (e.g. a saved log-query spec, an event id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextItem {
    pub kind: String,
    pub value: serde_json::Value,
}

/// A context item already materialized by the host into concrete, renderable text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterializedContextItem {
    pub kind: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_items: Vec<ContextItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub materialized_context_items: Vec<MaterializedContextItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AssistantMessage {
    pub steps: Vec<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatTurn {
    User(UserMessage),
    Assistant(AssistantMessage),
}

/// A model-ready chat message (what the reasoner/sub-agents actually send to the LLM client).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System { content: String },
    User { content: String },
    Assistant { content: String },
}

/// Scope selector over the combined transcript (§4.1, GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Current,
    Previous,
    Both,
}
