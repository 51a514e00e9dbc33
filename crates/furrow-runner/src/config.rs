//! Run file: everything one simulation needs, in a single YAML document.
//!
//! ```yaml
//! weather: weather.yaml
//! agromanagement: agromanagement.yaml
//! config:
//!   output_vars: [DVS, TAGP, SM]
//!   output_interval: weekly
//! parameters:
//!   soil: {SMW: 0.1, SMFCF: 0.3, SM0: 0.4, RDMSOL: 100.0, SOPE: 0.5, WAV: 15.0}
//!   crop:
//!     crops:
//!       wheat:
//!         spring-wheat: {TSUM1: 240.0, TSUM2: 120.0}
//! ```
//!
//! Relative `weather` and `agromanagement` paths resolve against the
//! directory holding the run file.

use std::path::{Path, PathBuf};

use furrow_core::{
    ConfigError, CropData, ModelConfig, ParameterError, ParameterProvider, ParameterSet,
};
use serde::Deserialize;

/// Errors that can occur when loading a run file.
#[derive(Debug, thiserror::Error)]
pub enum RunFileError {
    /// The run file could not be read.
    #[error("failed to read run file {}: {source}", .path.display())]
    Io {
        /// Path of the run file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The run file is not valid YAML or has unknown keys.
    #[error("failed to parse run file: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        #[from]
        source: serde_yml::Error,
    },

    /// The embedded model configuration is out of range.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Parameter sets of a run, grouped by source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunParameters {
    /// Site parameters.
    #[serde(default)]
    pub site: ParameterSet,
    /// Timer parameters.
    #[serde(default)]
    pub timer: ParameterSet,
    /// Soil parameters.
    #[serde(default)]
    pub soil: ParameterSet,
    /// One crop parameter set, or a library keyed by crop and variety.
    #[serde(default)]
    pub crop: CropData,
}

/// A parsed run file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunFile {
    /// Weather records file.
    pub weather: PathBuf,
    /// Agromanagement definition file.
    pub agromanagement: PathBuf,
    /// Output lists and interval.
    #[serde(default)]
    pub config: ModelConfig,
    /// Parameter sets.
    #[serde(default)]
    pub parameters: RunParameters,
}

impl RunFile {
    /// Load a run file and resolve its paths against its directory.
    pub fn load(path: &Path) -> Result<Self, RunFileError> {
        let contents = std::fs::read_to_string(path).map_err(|source| RunFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(Self::parse(&contents)?.resolved_against(base))
    }

    /// Parse a run file; paths are kept as written.
    pub fn parse(yaml: &str) -> Result<Self, RunFileError> {
        let run: Self = serde_yml::from_str(yaml)?;
        run.config.validate()?;
        Ok(run)
    }

    fn resolved_against(mut self, base: &Path) -> Self {
        self.weather = base.join(&self.weather);
        self.agromanagement = base.join(&self.agromanagement);
        self
    }

    /// Build the parameter provider of the run.
    pub fn parameter_provider(&self) -> Result<ParameterProvider, ParameterError> {
        let RunParameters {
            site,
            timer,
            soil,
            crop,
        } = self.parameters.clone();
        ParameterProvider::new(site, timer, soil, crop)
    }
}
