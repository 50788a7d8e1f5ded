//! Execution settings shared by every step of a run

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default length of the request summary message
pub const DEFAULT_SUMMARY_LEN: usize = 100;

/// Settings the orchestrator hands to workers through their context
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Directory workers write artifacts into
    pub workspace: PathBuf,
    /// Model name workers should use when they call one
    pub model: String,
    /// Maximum characters of the request echoed back when a run starts
    pub request_summary_len: usize,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("./workspace"),
            model: "default".to_string(),
            request_summary_len: DEFAULT_SUMMARY_LEN,
        }
    }
}

impl ExecutionSettings {
    /// Truncate `request` to the configured summary length, on a char
    /// boundary, appending an ellipsis when anything was cut.
    pub fn summarize(&self, request: &str) -> String {
        let trimmed = request.trim();
        if trimmed.chars().count() <= self.request_summary_len {
            return trimmed.to_string();
        }
        let mut summary: String = trimmed.chars().take(self.request_summary_len).collect();
        summary.push_str("...");
        summary
    }
}
