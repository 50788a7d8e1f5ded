//! Coordinator configuration

use serde::{Deserialize, Serialize};
use steward_engine::ExecutionSettings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Name given to each run's OS thread
    #[serde(default = "default_thread_name")]
    pub thread_name: String,

    /// Settings handed to workers
    #[serde(default)]
    pub execution: ExecutionSettings,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
            execution: ExecutionSettings::default(),
        }
    }
}

fn default_thread_name() -> String {
    "steward-run".to_string()
}
