//! Tool executors (C1, §4.2): run one tool-call input, produce a tagged result record.
//!
//! All three executors respect the cancellation token: inflight operations are cancellable and
//! surface [`ToolError::Cancelled`], distinct from application errors, which the caller turns
//! into the run's standard cancellation propagation rather than a tagged step error.

use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::observability::ObservabilityClient;
use crate::types::{
    new_timestamp, CatInput, CatResult, CatToolCallWithResult, GrepInput, GrepResult,
    GrepToolCallWithResult, LogSearchInput, LogSearchToolCallWithResult, ToolOutput,
};

/// `cat`: reads an absolute file path. Any I/O failure becomes a tagged error, never a thrown
/// exception (§4.2).
pub async fn execute_cat(
    input: CatInput,
    cancel: &CancellationToken,
) -> Result<CatToolCallWithResult, ToolError> {
    if cancel.is_cancelled() {
        return Err(ToolError::Cancelled);
    }
    let timestamp = new_timestamp();
    let path = input.path.clone();
    let output = tokio::select! {
        _ = cancel.cancelled() => return Err(ToolError::Cancelled),
        result = tokio::fs::read_to_string(&path) => match result {
            Ok(content) => ToolOutput::Result(CatResult { content }),
            Err(e) => ToolOutput::Error {
                tool_call_type: "catRequest".to_string(),
                error: e.to_string(),
            },
        },
    };
    Ok(CatToolCallWithResult { timestamp, input, output })
}

/// Translates letter-only flags (e.g. `"in"`) into `git grep` short options (`-i -n`).
/// Rejects anything that isn't an ASCII letter so a caller can never smuggle a dash-prefixed
/// argument or an extra positional through the flags field.
fn flags_to_args(flags: &str) -> Vec<String> {
    flags
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| format!("-{c}"))
        .collect()
}

/// `grep`: git-grep-style search over the repo working tree. Arguments are passed as an argv
/// array to `git grep` (never interpolated into a shell string), which is what actually
/// prevents shell injection here — there is no shell in the loop at all.
pub async fn execute_grep(
    input: GrepInput,
    repo_path: &str,
    cancel: &CancellationToken,
) -> Result<GrepToolCallWithResult, ToolError> {
    if cancel.is_cancelled() {
        return Err(ToolError::Cancelled);
    }
    let timestamp = new_timestamp();
    let mut cmd = tokio::process::Command::new("git");
    cmd.arg("grep").args(flags_to_args(&input.flags)).arg(&input.pattern);
    cmd.current_dir(repo_path);
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| ToolError::Io(e.to_string()))?;
    let output = tokio::select! {
        _ = cancel.cancelled() => {
            let _ = child.start_kill();
            return Err(ToolError::Cancelled);
        }
        result = child.wait_with_output() => result.map_err(|e| ToolError::Io(e.to_string()))?,
    };

    let output = match output.status.code() {
        Some(0) => ToolOutput::Result(GrepResult {
            content: String::from_utf8_lossy(&output.stdout).into_owned(),
        }),
        Some(1) => ToolOutput::Result(GrepResult {
            content: "No matches found".to_string(),
        }),
        _ => ToolOutput::Error {
            tool_call_type: "grepRequest".to_string(),
            error: String::from_utf8_lossy(&output.stderr).into_owned(),
        },
    };
    Ok(GrepToolCallWithResult { timestamp, input, output })
}

/// `logSearch`: delegates to `ObservabilityClient::fetch_logs`.
pub async fn execute_log_search(
    input: LogSearchInput,
    client: &dyn ObservabilityClient,
    cancel: &CancellationToken,
) -> Result<LogSearchToolCallWithResult, ToolError> {
    if cancel.is_cancelled() {
        return Err(ToolError::Cancelled);
    }
    let timestamp = new_timestamp();
    let output = match client.fetch_logs(&input, cancel).await {
        Ok(result) => ToolOutput::Result(result),
        Err(crate::observability::ObservabilityError::Cancelled) => {
            return Err(ToolError::Cancelled)
        }
        Err(crate::observability::ObservabilityError::Backend(msg)) => ToolOutput::Error {
            tool_call_type: "logSearchInput".to_string(),
            error: msg,
        },
    };
    Ok(LogSearchToolCallWithResult { timestamp, input, output })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MockObservabilityClient;

    #[tokio::test]
    async fn cat_reads_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "hello").unwrap();
        let cancel = CancellationToken::new();
        let result = execute_cat(
            CatInput { path: file.to_string_lossy().into_owned() },
            &cancel,
        )
        .await
        .unwrap();
        match result.output {
            ToolOutput::Result(r) => assert_eq!(r.content, "hello"),
            ToolOutput::Error { .. } => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn cat_tags_missing_file_as_error_not_exception() {
        let cancel = CancellationToken::new();
        let result = execute_cat(
            CatInput { path: "/nonexistent/path/does-not-exist.txt".into() },
            &cancel,
        )
        .await
        .unwrap();
        assert!(result.output.is_error());
    }

    #[test]
    fn flags_to_args_rejects_non_letters() {
        assert_eq!(flags_to_args("in"), vec!["-i", "-n"]);
        assert_eq!(flags_to_args("i-n; rm -rf"), vec!["-i", "-n", "-r", "-m", "-r", "-f"]);
    }

    #[tokio::test]
    async fn grep_no_matches_is_success_with_standard_message() {
        let dir = tempfile::tempdir().unwrap();
        std::process::Command::new("git").arg("init").arg("-q").current_dir(dir.path()).status().unwrap();
        std::fs::write(dir.path().join("a.txt"), "nothing interesting").unwrap();
        let cancel = CancellationToken::new();
        let result = execute_grep(
            GrepInput { pattern: "needle_not_present".into(), flags: String::new() },
            dir.path().to_str().unwrap(),
            &cancel,
        )
        .await
        .unwrap();
        match result.output {
            ToolOutput::Result(r) => assert_eq!(r.content, "No matches found"),
            ToolOutput::Error { .. } => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn log_search_delegates_to_observability_client() {
        let client = MockObservabilityClient::with_logs(vec![crate::types::LogEntry {
            timestamp: "2026-01-01T00:00:00Z".into(),
            level: "error".into(),
            service: "orders".into(),
            message: "pool exhausted".into(),
            attributes: None,
        }]);
        let cancel = CancellationToken::new();
        let result = execute_log_search(
            LogSearchInput {
                query: "service:orders".into(),
                start: "now-1h".into(),
                end: "now".into(),
                limit: 50,
                page_cursor: None,
            },
            &client,
            &cancel,
        )
        .await
        .unwrap();
        match result.output {
            ToolOutput::Result(r) => assert_eq!(r.logs.len(), 1),
            ToolOutput::Error { .. } => panic!("expected success"),
        }
    }
}
