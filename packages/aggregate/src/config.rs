//! Pipeline configuration.
//!
//! Settings are read from TOML. Every key is optional and falls back to
//! the values in `config/defaults.toml`, which is embedded at compile time.

use std::path::Path;

use hexmap_aggregate_models::{Color, GroupBy};
use hexmap_spatial::Region;
use serde::{Deserialize, Serialize};

use crate::AggregateError;
use crate::bins::{MAX_BIN_COUNT, check_bin_count};
use crate::pipeline::PipelineRequest;

/// The embedded default configuration file.
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../config/defaults.toml");

/// Largest H3 resolution.
pub const MAX_RESOLUTION: u8 = 15;

/// Tunables for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Default H3 resolution (0-15).
    pub resolution: u8,
    /// Default bin width.
    pub bin_step: u32,
    /// Default number of bins.
    pub bin_count: u32,
    /// Most bins a request may ask for, at most [`MAX_BIN_COUNT`].
    pub max_bin_count: u32,
    /// Equal-width buckets in the raw count distribution.
    pub histogram_buckets: usize,
    /// Cell count above which an advisory is attached.
    pub cell_soft_cap: u64,
    /// Export size in bytes above which an advisory is attached.
    pub export_warn_bytes: u64,
    /// Color of the first bin.
    pub palette_start: Color,
    /// Color of the last bin.
    pub palette_end: Color,
    /// Default export grouping.
    pub group_by: GroupBy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resolution: 7,
            bin_step: 10,
            bin_count: 5,
            max_bin_count: 100,
            histogram_buckets: 30,
            cell_soft_cap: 5000,
            export_warn_bytes: 50 * 1024 * 1024,
            palette_start: Color::rgb(0xff, 0xff, 0xb2),
            palette_end: Color::rgb(0xbd, 0x00, 0x26),
            group_by: GroupBy::None,
        }
    }
}

impl PipelineConfig {
    /// Parses and validates a TOML configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::Config`] if the TOML is malformed or has
    /// unknown keys, or a validation error if a value is out of range.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, AggregateError> {
        let config: Self = toml::de::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::Io`] if the file cannot be read, otherwise
    /// see [`Self::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, AggregateError> {
        let contents = std::fs::read_to_string(path).map_err(|e| AggregateError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let config = Self::from_toml_str(&contents)?;
        log::info!("Loaded pipeline config from {}", path.display());
        Ok(config)
    }

    /// Checks value ranges that the type system does not.
    ///
    /// # Errors
    ///
    /// Returns the first out-of-range value found.
    pub fn validate(&self) -> Result<(), AggregateError> {
        if self.resolution > MAX_RESOLUTION {
            return Err(AggregateError::InvalidResolution {
                value: self.resolution,
            });
        }
        if self.bin_step == 0 || self.bin_count == 0 {
            return Err(AggregateError::InvalidBinParameters {
                step: self.bin_step,
                count: self.bin_count,
            });
        }
        if self.max_bin_count == 0 || self.max_bin_count > MAX_BIN_COUNT {
            return Err(AggregateError::Validation {
                field: "max_bin_count",
                message: format!("{} is outside 1-{MAX_BIN_COUNT}", self.max_bin_count),
            });
        }
        check_bin_count(self.bin_count, self.max_bin_count)?;
        if self.histogram_buckets == 0 {
            return Err(AggregateError::Validation {
                field: "histogram_buckets",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Builds a request for `region` using this configuration's defaults.
    #[must_use]
    pub fn request(&self, region: Region) -> PipelineRequest {
        PipelineRequest {
            region,
            resolution: self.resolution,
            bin_step: self.bin_step,
            bin_count: self.bin_count,
            group_by: self.group_by,
        }
    }
}
