//! Model configuration: output variable lists, output interval, rate
//! zeroing and the engine mode.
//!
//! The configuration is read from YAML. Every field has a default, so an
//! empty document is a valid configuration that produces no output.
//!
//! ```yaml
//! output_vars: [DVS, TSUM, SM]
//! summary_output_vars: [DVS, TSUM]
//! terminal_output_vars: [WTOT]
//! output_interval: dekadal
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A field has a value outside its valid range.
    #[error("invalid model configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// How often the timer requests an `output` snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputInterval {
    /// Every `output_interval_days` days.
    #[default]
    Daily,
    /// Once a week on `output_weekday`.
    Weekly,
    /// On the 10th, the 20th and the last day of each month.
    Dekadal,
    /// On the last day of each month.
    Monthly,
}

/// What the engine does once the crop has finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    /// Finish the crop, follow the agromanagement to the next campaign and
    /// terminate at the end date.
    #[default]
    Standard,
    /// Keep the clock running after `crop_finish` with every state held at
    /// its final value. The crop stays mounted, `terminate` is ignored and
    /// only [`Engine::run_till`](crate::Engine::run_till) can drive the run.
    Hold,
}

/// Model configuration consumed by the engine and the timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Variables snapshotted on every `output` signal.
    #[serde(default)]
    pub output_vars: Vec<String>,

    /// Variables snapshotted when a crop finishes.
    #[serde(default)]
    pub summary_output_vars: Vec<String>,

    /// Variables snapshotted once, at termination.
    #[serde(default)]
    pub terminal_output_vars: Vec<String>,

    /// Output interval type.
    #[serde(default)]
    pub output_interval: OutputInterval,

    /// Days between outputs for the `daily` interval.
    #[serde(default = "default_output_interval_days")]
    pub output_interval_days: u32,

    /// Weekday of `weekly` outputs, 0 = Monday.
    #[serde(default)]
    pub output_weekday: u32,

    /// Reset every rate to zero after integration.
    #[serde(default = "default_true")]
    pub zerofy: bool,

    /// Behaviour after the crop has finished.
    #[serde(default)]
    pub engine_mode: EngineMode,
}

const fn default_output_interval_days() -> u32 {
    1
}

const fn default_true() -> bool {
    true
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            output_vars: Vec::new(),
            summary_output_vars: Vec::new(),
            terminal_output_vars: Vec::new(),
            output_interval: OutputInterval::default(),
            output_interval_days: default_output_interval_days(),
            output_weekday: 0,
            zerofy: true,
            engine_mode: EngineMode::Standard,
        }
    }
}

/// Change to one output variable list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputListUpdate {
    /// Append the names to the configured list.
    Extend(Vec<String>),
    /// Replace the configured list with the names.
    Replace(Vec<String>),
}

impl OutputListUpdate {
    fn apply(self, list: &mut Vec<String>) {
        match self {
            Self::Extend(names) => list.extend(names),
            Self::Replace(names) => *list = names,
        }
    }
}

impl ModelConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `output_interval_days` is zero or
    /// `output_weekday` is not in `0..=6`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_interval_days == 0 {
            return Err(ConfigError::Invalid {
                reason: "output_interval_days must be at least 1".to_owned(),
            });
        }
        if self.output_weekday > 6 {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "output_weekday must be in 0..=6, got {}",
                    self.output_weekday
                ),
            });
        }
        Ok(())
    }

    /// Extend or replace the output variable lists.
    pub fn update_output_variable_lists(
        &mut self,
        output: Option<OutputListUpdate>,
        summary: Option<OutputListUpdate>,
        terminal: Option<OutputListUpdate>,
    ) {
        if let Some(update) = output {
            update.apply(&mut self.output_vars);
        }
        if let Some(update) = summary {
            update.apply(&mut self.summary_output_vars);
        }
        if let Some(update) = terminal {
            update.apply(&mut self.terminal_output_vars);
        }
    }
}
