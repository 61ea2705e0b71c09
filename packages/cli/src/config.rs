//! Analysis configuration, read from TOML.
//!
//! Only the `[input]` section is required; every other section falls back
//! to the defaults shown in the embedded [`DEFAULT_CONFIG`].

use std::path::{Path, PathBuf};

use crime_spatial_analytics::design::DesignSpec;
use crime_spatial_analytics_models::{Alternative, LagOptions, MoranOptions, NullAssumption};
use crime_spatial_geography_models::{BUS_STOPS_COLUMN, TOTAL_COLUMN, TRIPS_COLUMN};
use crime_spatial_ingest_models::IngestConfig;
use crime_spatial_spatial::{ContiguityRule, DEFAULT_SNAP, WeightStyle};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The annotated default configuration.
pub const DEFAULT_CONFIG: &str = include_str!("default.toml");

/// Errors from loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`AnalysisConfig`].
    #[error("Invalid config {path}: {source}")]
    Parse {
        /// Config path (empty for in-memory sources).
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
}

/// Complete analysis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Input files and their column mapping.
    pub input: IngestConfig,
    /// Regression design.
    #[serde(default)]
    pub model: ModelConfig,
    /// Contiguity and weighting.
    #[serde(default)]
    pub weights: WeightsConfig,
    /// Moran's I settings.
    #[serde(default)]
    pub moran: MoranConfig,
    /// Lagrange-multiplier settings.
    #[serde(default)]
    pub lm: LmConfig,
    /// Spatial-lag fit settings.
    #[serde(default)]
    pub lag: LagOptions,
}

/// Response and predictor columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Response column.
    pub response: String,
    /// Predictor columns.
    pub predictors: Vec<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            response: TOTAL_COLUMN.to_string(),
            predictors: vec![BUS_STOPS_COLUMN.to_string(), TRIPS_COLUMN.to_string()],
        }
    }
}

impl ModelConfig {
    /// The design this model describes.
    #[must_use]
    pub fn design_spec(&self) -> DesignSpec {
        DesignSpec {
            response: self.response.clone(),
            predictors: self.predictors.clone(),
        }
    }
}

/// How the weights matrix is built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightsConfig {
    /// Queen or rook contiguity.
    pub contiguity: ContiguityRule,
    /// Row-standardised or binary weights.
    pub style: WeightStyle,
    /// Distance within which two vertices count as shared.
    pub snap: f64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            contiguity: ContiguityRule::default(),
            style: WeightStyle::default(),
            snap: DEFAULT_SNAP,
        }
    }
}

/// Moran's I settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoranConfig {
    /// Variance assumption for the analytical test.
    pub assumption: NullAssumption,
    /// Alternative hypothesis.
    pub alternative: Alternative,
    /// Allow cells without neighbours.
    pub zero_policy: bool,
    /// Permutation draws; `0` skips the permutation test.
    pub permutations: usize,
    /// Seed for the permutation draws.
    pub seed: u64,
}

impl Default for MoranConfig {
    fn default() -> Self {
        Self {
            assumption: NullAssumption::default(),
            alternative: Alternative::default(),
            zero_policy: true,
            permutations: 999,
            seed: 42,
        }
    }
}

impl MoranConfig {
    /// The analytical test options.
    #[must_use]
    pub const fn options(&self) -> MoranOptions {
        MoranOptions {
            assumption: self.assumption,
            alternative: self.alternative,
            zero_policy: self.zero_policy,
        }
    }
}

/// Lagrange-multiplier settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmConfig {
    /// Level at which a test counts as significant.
    pub significance: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self { significance: 0.05 }
    }
}

impl AnalysisConfig {
    /// Parses a configuration from TOML text. Paths are left as written.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not a valid config.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })
    }

    /// Reads `path` and resolves relative input paths against its
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Parse`] if it is not a valid config.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(config.with_base_dir(base))
    }

    /// Returns a copy with every relative input path joined onto `base`.
    #[must_use]
    pub fn with_base_dir(mut self, base: &Path) -> Self {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.input.incidents.dir);
        resolve(&mut self.input.cells.path);
        resolve(&mut self.input.stops.path);
        self
    }
}
