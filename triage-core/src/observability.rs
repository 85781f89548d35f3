//! Observability backend contract (§6 "Consumed — ObservabilityClient").
//!
//! Only a narrow interface is consumed; the concrete backend driver is out of scope (§1).

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::types::{LogSearchInput, LogSearchResult};

#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("cancelled")]
    Cancelled,
    #[error("backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait ObservabilityClient: Send + Sync {
    async fn fetch_logs(
        &self,
        input: &LogSearchInput,
        cancel: &CancellationToken,
    ) -> Result<LogSearchResult, ObservabilityError>;

    async fn get_logs_facet_values(
        &self,
        start_iso: &str,
        end_iso: &str,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Vec<String>>, ObservabilityError>;

    /// Platform-specific guidance embedded in prompts (§4.3 step 2).
    fn get_log_search_query_instructions(&self) -> String;

    /// Folds highlight keywords into a query string (used by the log post-processor, §4.7).
    fn add_keywords_to_query(&self, query: &str, keywords: &[String]) -> String;
}

/// Test fixture returning a fixed set of logs regardless of the query, and recording the
/// queries it was asked (useful for asserting sub-agent prompt content in tests).
pub struct MockObservabilityClient {
    logs: Vec<crate::types::LogEntry>,
}

impl MockObservabilityClient {
    pub fn with_logs(logs: Vec<crate::types::LogEntry>) -> Self {
        Self { logs }
    }

    pub fn empty() -> Self {
        Self { logs: Vec::new() }
    }
}

#[async_trait]
impl ObservabilityClient for MockObservabilityClient {
    async fn fetch_logs(
        &self,
        _input: &LogSearchInput,
        cancel: &CancellationToken,
    ) -> Result<LogSearchResult, ObservabilityError> {
        if cancel.is_cancelled() {
            return Err(ObservabilityError::Cancelled);
        }
        Ok(LogSearchResult {
            logs: self.logs.clone(),
            page_cursor_or_indicator: None,
        })
    }

    async fn get_logs_facet_values(
        &self,
        _start_iso: &str,
        _end_iso: &str,
        _cancel: &CancellationToken,
    ) -> Result<HashMap<String, Vec<String>>, ObservabilityError> {
        Ok(HashMap::new())
    }

    fn get_log_search_query_instructions(&self) -> String {
        "Use field:value syntax; wildcard with *.".to_string()
    }

    fn add_keywords_to_query(&self, query: &str, keywords: &[String]) -> String {
        if keywords.is_empty() {
            return query.to_string();
        }
        format!("{query} {}", keywords.join(" "))
    }
}
