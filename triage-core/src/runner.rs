//! Pipeline runner (C8, §4.8): sequences pre-processing, reasoning, optional review and
//! post-processing into one run.
//!
//! Unlike the teacher's generic `StateGraph`/`Node` machinery, the phase order here is fixed and
//! known at compile time, so the runner is a purpose-written async function rather than a
//! dynamically-wired graph. `timing::timed` stands in for the teacher's `NodeMiddleware`, logging
//! each phase's wall-clock duration without needing a registration step.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::llm::LlmClient;
use crate::nodes::{postprocess, reasoner, reviewer};
use crate::observability::ObservabilityClient;
use crate::state_manager::StateManager;
use crate::subagents::{code_search, log_search};
use crate::timing::timed;
use crate::types::{ChatTurn, CodeRequest, LogRequest, ReasonerOutput, SubAgentCall};

/// Everything the runner needs beyond per-run state: two model seats (§6 distinguishes a
/// reasoning-tier model used by the reasoner/reviewer/post-processors from a faster model used
/// by both sub-agents) and the observability backend.
pub struct PipelineRunner<'a> {
    pub reasoning_model: &'a dyn LlmClient,
    pub fast_model: &'a dyn LlmClient,
    pub observability: &'a dyn ObservabilityClient,
    pub config: PipelineConfig,
}

/// What one run produced: the accepted answer plus whichever steps the caller wants to persist
/// as the next turn's chat history.
pub struct RunOutcome {
    pub answer: String,
}

impl<'a> PipelineRunner<'a> {
    pub fn new(
        reasoning_model: &'a dyn LlmClient,
        fast_model: &'a dyn LlmClient,
        observability: &'a dyn ObservabilityClient,
        config: PipelineConfig,
    ) -> Self {
        Self {
            reasoning_model,
            fast_model,
            observability,
            config,
        }
    }

    /// Runs pre-processing, reasoning, optional review and post-processing in order.
    ///
    /// Cancellation is checked before each suspension point and propagated unmasked; a reasoner
    /// provider error or any protocol violation is fatal and aborts the run (§7). Tool execution
    /// errors and iteration-cap exhaustion are not: they stay recorded in steps and the run
    /// continues.
    pub async fn run(
        &self,
        chat_history: Vec<ChatTurn>,
        user_query: &str,
        sink: crate::stream::UpdateSink,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        let mut state = StateManager::new(chat_history, sink);

        timed("pre-processing", self.pre_process(&mut state, user_query, cancel)).await?;

        let candidate = timed(
            "reasoning",
            self.reason_until_answer(&mut state, user_query, cancel),
        )
        .await?;

        let answer = timed(
            "review",
            self.review_until_accepted(&mut state, user_query, candidate, cancel),
        )
        .await?;
        state.set_answer(answer.clone());

        timed("post-processing", self.post_process(state, cancel)).await?;

        Ok(RunOutcome { answer })
    }

    /// §4.8 step 1: an initial, broad delegation to each enabled sub-agent so the reasoner's
    /// first turn already has some evidence. Run sequentially — unlike post-processing's fan-out,
    /// the spec's control flow does not call these out as parallel.
    async fn pre_process(
        &self,
        state: &mut StateManager,
        user_query: &str,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        if self.config.data_sources.logs {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let request = LogRequest {
                request: user_query.to_string(),
                reasoning: "initial broad sweep".to_string(),
            };
            log_search::invoke(
                self.fast_model,
                self.observability,
                state,
                user_query,
                &request,
                &self.config.codebase_overview,
                self.config.max_sub_agent_iters,
                cancel,
            )
            .await?;
        }
        if self.config.data_sources.code {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let request = CodeRequest {
                request: user_query.to_string(),
                reasoning: "initial broad sweep".to_string(),
            };
            code_search::invoke(
                self.fast_model,
                state,
                &self.config.repo_path,
                user_query,
                &request,
                self.config.max_sub_agent_iters,
                cancel,
            )
            .await?;
        }
        Ok(())
    }

    /// §4.5/§4.8: alternates reasoner turns with sub-agent dispatch until the reasoner returns
    /// plain-text reasoning (the candidate answer) or the iteration cap is exhausted.
    async fn reason_until_answer(
        &self,
        state: &mut StateManager,
        user_query: &str,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        for _ in 0..self.config.max_reasoner_iters {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let output = reasoner::invoke(
                self.reasoning_model,
                state,
                crate::prompts::REASONER_SYSTEM_PROMPT,
                cancel,
            )
            .await
            // Reasoner failures bubble: a provider error here is fatal to the run (§7).
            .map_err(PipelineError::from)?;

            match output {
                ReasonerOutput::Reasoning { content } => return Ok(content),
                ReasonerOutput::SubAgentCalls(calls) => {
                    for call in calls {
                        if cancel.is_cancelled() {
                            return Err(PipelineError::Cancelled);
                        }
                        match call {
                            SubAgentCall::LogRequest(request) => {
                                log_search::invoke(
                                    self.fast_model,
                                    self.observability,
                                    state,
                                    user_query,
                                    &request,
                                    &self.config.codebase_overview,
                                    self.config.max_sub_agent_iters,
                                    cancel,
                                )
                                .await?;
                            }
                            SubAgentCall::CodeRequest(request) => {
                                code_search::invoke(
                                    self.fast_model,
                                    state,
                                    &self.config.repo_path,
                                    user_query,
                                    &request,
                                    self.config.max_sub_agent_iters,
                                    cancel,
                                )
                                .await?;
                            }
                        }
                    }
                }
            }
        }

        warn!(
            max_reasoner_iters = self.config.max_reasoner_iters,
            "reasoner reached iteration cap, forcing completion with last reasoning"
        );
        Ok(state
            .get_steps(crate::types::Scope::Current)
            .into_iter()
            .rev()
            .find_map(|s| match s {
                crate::types::Step::Reasoning(r) => Some(r.data),
                _ => None,
            })
            .unwrap_or_default())
    }

    /// §4.6/§4.8: the reviewer always runs at least once — a reasoner answer with no tool calls
    /// causes exactly one review attempt, even when `max_review_rejections` is 0. Only the
    /// re-reason retry after a rejection is gated by the rejection counter; once it is exhausted
    /// the last candidate is force-accepted instead of reviewing again.
    async fn review_until_accepted(
        &self,
        state: &mut StateManager,
        user_query: &str,
        mut candidate: String,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let mut rejections = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let decision = reviewer::invoke(self.reasoning_model, state, &candidate, cancel)
                .await
                .map_err(PipelineError::from)?;
            if decision.accepted {
                return Ok(candidate);
            }
            if rejections >= self.config.max_review_rejections {
                warn!(
                    max_review_rejections = self.config.max_review_rejections,
                    "exhausted review rejections, accepting last candidate"
                );
                return Ok(candidate);
            }
            rejections += 1;
            warn!(rejection = rejections, "review rejected candidate answer, re-reasoning");
            candidate = self.reason_until_answer(state, user_query, cancel).await?;
        }
    }

    /// §4.7/§5: log and code post-processing run concurrently, each gated by its data source
    /// flag. The state manager moves behind a mutex only for this phase.
    async fn post_process(
        &self,
        state: StateManager,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let state = Arc::new(tokio::sync::Mutex::new(state));
        let max_facts = self.config.max_facts_per_kind;

        let log_fut = async {
            if self.config.data_sources.logs {
                postprocess::invoke_log_postprocessor(
                    self.reasoning_model,
                    self.observability,
                    &state,
                    max_facts,
                    cancel,
                )
                .await
            } else {
                Ok(())
            }
        };
        let code_fut = async {
            if self.config.data_sources.code {
                postprocess::invoke_code_postprocessor(
                    self.reasoning_model,
                    &state,
                    &self.config.repo_path,
                    max_facts,
                    cancel,
                )
                .await
            } else {
                Ok(())
            }
        };

        let (log_result, code_result) = tokio::join!(log_fut, code_fut);
        log_result?;
        code_result?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataSources;
    use crate::llm::{LlmResponse, MockLlm, ToolCallRequest};
    use crate::observability::MockObservabilityClient;

    fn config() -> PipelineConfig {
        PipelineConfig {
            repo_path: ".".to_string(),
            data_sources: DataSources { logs: true, code: false },
            max_reasoner_iters: 5,
            max_sub_agent_iters: 2,
            max_review_rejections: 1,
            max_facts_per_kind: 8,
            codebase_overview: String::new(),
        }
    }

    #[tokio::test]
    async fn happy_path_logs_only_produces_an_answer_and_facts() {
        let log_call = ToolCallRequest {
            id: "1".into(),
            name: "logSearchInput".into(),
            arguments: serde_json::json!({"query": "service:orders", "start": "now-1h", "end": "now", "limit": 50}),
        };
        let fast = MockLlm::with_responses(vec![
            LlmResponse { content: "searching".into(), tool_calls: vec![log_call], usage: None },
            LlmResponse { content: "done".into(), tool_calls: vec![], usage: None },
        ]);

        let review_call = ToolCallRequest {
            id: "1".into(),
            name: "reviewDecision".into(),
            arguments: serde_json::json!({"accepted": true, "reasoning": "well supported"}),
        };
        let fact_call = ToolCallRequest {
            id: "1".into(),
            name: "emitLogFacts".into(),
            arguments: serde_json::json!({
                "facts": [{"query": {"query": "service:orders", "start": "now-1h", "end": "now", "limit": 50}, "title": "t", "fact": "f"}]
            }),
        };
        let reasoning = MockLlm::with_responses(vec![
            LlmResponse { content: "pool exhausted".into(), tool_calls: vec![], usage: None },
            LlmResponse { content: String::new(), tool_calls: vec![review_call], usage: None },
            LlmResponse { content: String::new(), tool_calls: vec![fact_call], usage: None },
        ]);
        let obs = MockObservabilityClient::empty();

        let runner = PipelineRunner::new(&reasoning, &fast, &obs, config());
        let cancel = CancellationToken::new();
        let outcome = runner
            .run(Vec::new(), "checkout failing", crate::stream::noop_sink(), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.answer, "pool exhausted");
    }

    #[tokio::test]
    async fn cancellation_before_start_short_circuits() {
        let reasoning = MockLlm::constant_text("unused");
        let fast = MockLlm::constant_text("unused");
        let obs = MockObservabilityClient::empty();
        let runner = PipelineRunner::new(&reasoning, &fast, &obs, config());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = runner
            .run(Vec::new(), "q", crate::stream::noop_sink(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }

    #[tokio::test]
    async fn review_rejection_re_reasons_then_forces_acceptance() {
        let fast = MockLlm::with_responses(vec![LlmResponse {
            content: "done".into(),
            tool_calls: vec![],
            usage: None,
        }]);
        let reject = ToolCallRequest {
            id: "1".into(),
            name: "reviewDecision".into(),
            arguments: serde_json::json!({"accepted": false, "reasoning": "not enough evidence"}),
        };
        let fact_call = ToolCallRequest {
            id: "1".into(),
            name: "emitLogFacts".into(),
            arguments: serde_json::json!({"facts": []}),
        };
        let reasoning = MockLlm::with_responses(vec![
            LlmResponse { content: "first guess".into(), tool_calls: vec![], usage: None },
            LlmResponse { content: String::new(), tool_calls: vec![reject.clone()], usage: None },
            LlmResponse { content: "second guess".into(), tool_calls: vec![], usage: None },
            LlmResponse { content: String::new(), tool_calls: vec![reject], usage: None },
            LlmResponse { content: String::new(), tool_calls: vec![fact_call], usage: None },
        ]);
        let obs = MockObservabilityClient::empty();
        let mut cfg = config();
        cfg.max_review_rejections = 1;
        let runner = PipelineRunner::new(&reasoning, &fast, &obs, cfg);
        let cancel = CancellationToken::new();
        let outcome = runner
            .run(Vec::new(), "q", crate::stream::noop_sink(), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.answer, "second guess", "forced acceptance after exhausting rejections");
    }
}
