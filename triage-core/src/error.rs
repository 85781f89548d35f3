//! Error kinds for the triage pipeline (error handling design, §7).
//!
//! Each component gets its own small enum in the teacher's style; component errors convert
//! into [`PipelineError`] via `#[from]` so `PipelineRunner::run` has one return type.

use thiserror::Error;

/// A cooperative cancellation signal fired. Propagated unchanged; never masked as a result.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("run cancelled")]
pub struct Cancelled;

/// Errors from a single tool executor call (cat / grep / logSearch).
///
/// Tool errors are normally *recorded* as a tagged error inside the step's `output`, not
/// propagated as a Rust `Err` — this type exists for the rare case (cancellation) where the
/// executor must short-circuit instead of returning a tagged result.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("cancelled")]
    Cancelled,
    #[error("io error: {0}")]
    Io(String),
    #[error("process exited with status {0}")]
    NonZeroExit(i32),
    #[error("observability backend error: {0}")]
    Observability(String),
}

/// Errors surfaced by a sub-agent loop (C3/C4).
#[derive(Debug, Error)]
pub enum SubAgentError {
    #[error("cancelled")]
    Cancelled,
    #[error("model provider error: {0}")]
    Provider(String),
    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// Errors surfaced by the reviewer node (C6).
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("cancelled")]
    Cancelled,
    #[error("model provider error: {0}")]
    Provider(String),
    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// Errors surfaced by a post-processor (C7).
#[derive(Debug, Error)]
pub enum PostprocessError {
    #[error("cancelled")]
    Cancelled,
    #[error("model provider error: {0}")]
    Provider(String),
    #[error("protocol violation: no tool call returned")]
    NoToolCall,
}

/// Top-level pipeline error: what `PipelineRunner::run` returns on failure.
///
/// Fatal per §7: cancellation, a reasoner provider error, or any protocol violation
/// (sub-agent given multiple tool calls when one was required, reviewer returning zero or
/// multiple forced tool calls). Tool execution errors and iteration-cap exhaustion are NOT
/// represented here — those are recorded in the transcript and the run continues.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cancelled")]
    Cancelled,
    #[error("reasoner failed: {0}")]
    ReasonerFailed(String),
    #[error(transparent)]
    SubAgent(#[from] SubAgentError),
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error(transparent)]
    Postprocess(#[from] PostprocessError),
}

impl From<Cancelled> for PipelineError {
    fn from(_: Cancelled) -> Self {
        PipelineError::Cancelled
    }
}
