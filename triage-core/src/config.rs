//! Immutable pipeline configuration (§3 "the pipeline owns... the immutable config").
//!
//! Config schema validation is out of scope (§1); this module only resolves values from the
//! process environment and an optional `.env` file, following the teacher's minimal dotenv
//! parser. It does not validate shapes beyond parsing plain strings/integers.

use std::collections::HashMap;
use std::path::Path;

/// Which observability data sources are enabled for this run (§8 scenario 1: `dataSources`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataSources {
    pub logs: bool,
    pub code: bool,
}

impl DataSources {
    pub fn all() -> Self {
        Self { logs: true, code: true }
    }
}

/// Immutable, per-run configuration held by the pipeline runner and shared (non-owning) with
/// every sub-component.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Absolute path to the repository working tree that `cat`/`grep` operate against.
    pub repo_path: String,
    pub data_sources: DataSources,
    /// Hard cap on reasoner iterations (§4.5: 50).
    pub max_reasoner_iters: u32,
    /// Default sub-agent iteration cap (§4.3/§4.4: 12), overridable per-call.
    pub max_sub_agent_iters: u32,
    /// Max reviewer rejections before accepting the last candidate (§4.6: 3).
    pub max_review_rejections: u32,
    /// Max facts per post-processor kind (§3 invariant: ≤8).
    pub max_facts_per_kind: usize,
    /// Static free-text description of the repository, folded into the log-search sub-agent's
    /// prompt (§4.3 step 2). Empty by default; callers that want it populated set it explicitly
    /// or via `TRIAGE_CODEBASE_OVERVIEW`.
    pub codebase_overview: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            repo_path: String::from("."),
            data_sources: DataSources::all(),
            max_reasoner_iters: 50,
            max_sub_agent_iters: 12,
            max_review_rejections: 3,
            max_facts_per_kind: 8,
            codebase_overview: String::new(),
        }
    }
}

/// Paths to try for `.env`: `override_dir` if given, else current directory.
fn dotenv_path(override_dir: Option<&Path>) -> Option<std::path::PathBuf> {
    let dir = override_dir
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())?;
    let path = dir.join(".env");
    if path.exists() && path.is_file() {
        Some(path)
    } else {
        None
    }
}

/// Minimal `.env` parser: `KEY=VALUE` lines, skipping empty lines and `#` comments.
fn parse_dotenv(content: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        let key = k.trim().to_string();
        let value = v.trim().trim_matches('"').trim_matches('\'').to_string();
        if !key.is_empty() {
            out.insert(key, value);
        }
    }
    out
}

/// Loads `TRIAGE_REPO_PATH`, `TRIAGE_DATA_SOURCES` (comma list of `logs`/`code`) and the
/// numeric overrides from the environment, falling back to a `.env` in `override_dir` (or the
/// current directory) for any key not already set in the process environment, and finally to
/// [`PipelineConfig::default`] for anything still missing.
pub fn load_config(override_dir: Option<&Path>) -> std::io::Result<PipelineConfig> {
    let dotenv_map = match dotenv_path(override_dir) {
        Some(path) => parse_dotenv(&std::fs::read_to_string(path)?),
        None => HashMap::new(),
    };
    let lookup = |key: &str| std::env::var(key).ok().or_else(|| dotenv_map.get(key).cloned());

    let mut cfg = PipelineConfig::default();
    if let Some(v) = lookup("TRIAGE_REPO_PATH") {
        cfg.repo_path = v;
    }
    if let Some(v) = lookup("TRIAGE_DATA_SOURCES") {
        let sources: Vec<&str> = v.split(',').map(str::trim).collect();
        cfg.data_sources = DataSources {
            logs: sources.contains(&"logs"),
            code: sources.contains(&"code"),
        };
    }
    if let Some(v) = lookup("TRIAGE_MAX_REASONER_ITERS").and_then(|s| s.parse().ok()) {
        cfg.max_reasoner_iters = v;
    }
    if let Some(v) = lookup("TRIAGE_MAX_SUB_AGENT_ITERS").and_then(|s| s.parse().ok()) {
        cfg.max_sub_agent_iters = v;
    }
    if let Some(v) = lookup("TRIAGE_MAX_REVIEW_REJECTIONS").and_then(|s| s.parse().ok()) {
        cfg.max_review_rejections = v;
    }
    if let Some(v) = lookup("TRIAGE_CODEBASE_OVERVIEW") {
        cfg.codebase_overview = v;
    }
    Ok(cfg)
}
