//! Configuration for the steward console

use serde::{Deserialize, Serialize};
use steward_coordinator::CoordinatorConfig;

/// Main console configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StewardConfig {
    /// Run coordination and worker settings
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Approval handling
    #[serde(default)]
    pub approvals: ApprovalConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Approval handling
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Approve every request without prompting
    #[serde(default)]
    pub auto_approve: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl StewardConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `STEWARD__`-prefixed environment variables.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&StewardConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Nested keys use a double underscore, e.g.
        // STEWARD__COORDINATOR__EXECUTION__MODEL
        builder = builder.add_source(
            config::Environment::with_prefix("STEWARD")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
