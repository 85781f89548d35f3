//! # triage-core
//!
//! A production-incident triage pipeline: given a user's description of an incident, gathers
//! log and code evidence through bounded sub-agent loops, reasons over the evidence (delegating
//! back to those sub-agents as needed), optionally reviews its own candidate answer, and emits
//! citable facts by post-processing the finished transcript.
//!
//! ## Design principles
//!
//! - **Single state type**: [`StateManager`] is the one mutable owner of a run's transcript;
//!   every node reads from and appends to it, nothing else holds transcript state.
//! - **Explicit sum types**: [`Step`], [`ToolOutput`], [`SubAgentCall`], [`ChatMessage`] are all
//!   tagged unions with a `type`/`role` discriminant — never inheritance hierarchies.
//! - **Provider-agnostic model access**: the pipeline depends only on [`LlmClient`] and
//!   [`ObservabilityClient`]; no concrete provider is named anywhere in this crate.
//! - **Synchronous streaming sink**: [`UpdateSink`] is a plain closure, not an async trait
//!   method, so "must not block" is a type-level guarantee rather than a convention.
//!
//! ## Main modules
//!
//! - [`types`]: the data model — steps, tool-call-with-result records, facts, chat messages.
//! - [`state_manager`]: [`StateManager`], the per-run transcript and streaming surface.
//! - [`stream`]: [`StreamUpdate`], [`UpdateSink`], the envelope bridge to `triage-stream`.
//! - [`llm`]: [`LlmClient`] trait, [`MockLlm`].
//! - [`observability`]: [`ObservabilityClient`] trait, [`MockObservabilityClient`].
//! - [`tool_exec`]: `cat`/`grep`/`logSearch` tool executors.
//! - [`subagents`]: the log-search and code-search sub-agent loops.
//! - [`nodes`]: reasoner, reviewer, post-processor nodes.
//! - [`runner`]: [`PipelineRunner`], sequencing every phase of one run.
//! - [`config`]: [`PipelineConfig`] and environment/`.env` loading.
//! - [`error`]: per-component error enums converging on [`PipelineError`].
//!
//! Key types are re-exported at crate root:
//! `use triage_core::{PipelineRunner, PipelineConfig, StateManager, Step};`

pub mod config;
pub mod error;
pub mod llm;
pub mod nodes;
pub mod observability;
pub mod prompts;
pub mod runner;
pub mod state_manager;
pub mod stream;
pub mod subagents;
pub mod timing;
pub mod tool_exec;
pub mod types;
pub mod util;

pub use config::{DataSources, PipelineConfig};
pub use error::{
    Cancelled, PipelineError, PostprocessError, ReviewError, SubAgentError, ToolError,
};
pub use llm::{
    LlmClient, LlmError, LlmResponse, LlmUsage, MockLlm, ToolCallRequest, ToolChoiceMode, ToolSpec,
};
pub use observability::{MockObservabilityClient, ObservabilityClient, ObservabilityError};
pub use runner::{PipelineRunner, RunOutcome};
pub use state_manager::StateManager;
pub use stream::{enveloping_sink, noop_sink, ChunkKind, StreamUpdate, UpdateSink};
pub use types::{
    AssistantMessage, CatInput, CatResult, CatToolCallWithResult, ChatMessage, ChatTurn,
    CodeFact, CodePostprocessingStep, CodeRequest, CodeSearchStep, CodeToolCallWithResult,
    ContextItem, GrepInput, GrepResult, GrepToolCallWithResult, LogEntry, LogFact, LogRequest,
    LogPostprocessingStep, LogSearchInput, LogSearchResult, LogSearchStep,
    LogSearchToolCallWithResult, MaterializedContextItem, ReasonerOutput, ReasoningStep,
    ReviewStep, Scope, Step, SubAgentCall, ToolOutput, UserMessage,
};
