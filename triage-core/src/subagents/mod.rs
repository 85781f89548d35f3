//! Bounded sub-agent search loops (C3, C4), delegated to by the reasoner (§4.3, §4.4).

pub mod code_search;
pub mod log_search;

use crate::llm::ToolSpec;

/// Declares the `logSearchInput` tool (§3, §6).
pub fn log_search_input_tool_spec() -> ToolSpec {
    ToolSpec {
        name: "logSearchInput".to_string(),
        description: "Search the observability backend for log entries.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "start": {"type": "string"},
                "end": {"type": "string"},
                "limit": {"type": "integer"},
                "pageCursor": {"type": "string"}
            },
            "required": ["query", "start", "end", "limit"]
        }),
    }
}

/// Declares the `catRequest` tool (§3, §6).
pub fn cat_request_tool_spec() -> ToolSpec {
    ToolSpec {
        name: "catRequest".to_string(),
        description: "Read the full contents of a file at an absolute path.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": { "path": {"type": "string"} },
            "required": ["path"]
        }),
    }
}

/// Declares the `grepRequest` tool (§3, §6).
pub fn grep_request_tool_spec() -> ToolSpec {
    ToolSpec {
        name: "grepRequest".to_string(),
        description: "Search the repository working tree for a pattern (git-grep semantics)."
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string"},
                "flags": {"type": "string", "description": "letters only, e.g. \"in\""}
            },
            "required": ["pattern"]
        }),
    }
}
