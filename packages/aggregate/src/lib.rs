#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hexagon aggregation of geographic points.
//!
//! Filters a point set to a user-selected region, counts the surviving
//! points per H3 cell, classifies cell counts into ordered bins, and
//! produces a [`Bundle`](hexmap_aggregate_models::Bundle) with per-cell
//! features, raw and binned count distributions, a bin palette, and export
//! size estimates.
//!
//! Every stage is a pure function of its inputs. [`pipeline::Pipeline`]
//! chains them; [`session::PipelineSession`] adds last-request-wins
//! execution for callers that re-run on every parameter edit.

pub mod bins;
pub mod config;
pub mod export;
pub mod filter;
pub mod histogram;
pub mod indexer;
pub mod palette;
pub mod pipeline;
pub mod progress;
pub mod session;

pub use hexmap_spatial::{Region, SpatialError};

/// Broad category of an [`AggregateError`], used by callers to decide how
/// to present a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad parameters or a malformed region.
    Validation,
    /// The region contains no points.
    EmptyRegion,
    /// An internal invariant was violated.
    Computation,
    /// The run was superseded and stopped early.
    Cancelled,
    /// Configuration or I/O problems outside the pipeline itself.
    Environment,
}

/// Errors that can occur while running the aggregation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    /// Bin width or bin count below 1.
    #[error("Invalid bin parameters: step={step}, count={count} (both must be at least 1)")]
    InvalidBinParameters {
        /// Requested bin width.
        step: u32,
        /// Requested number of bins.
        count: u32,
    },

    /// Hexagon resolution outside 0-15.
    #[error("Invalid resolution {value}: expected 0-15")]
    InvalidResolution {
        /// Requested resolution.
        value: u8,
    },

    /// Any other parameter that failed validation.
    #[error("Invalid {field}: {message}")]
    Validation {
        /// Name of the offending parameter.
        field: &'static str,
        /// Description of what went wrong.
        message: String,
    },

    /// The region definition is unusable.
    #[error("Region error: {0}")]
    Region(#[from] SpatialError),

    /// No point falls inside the region. The caller should discard the
    /// selection rather than render an empty result.
    #[error("No points fall inside the selected region ({points_in} points checked)")]
    EmptyRegion {
        /// Number of points that were tested.
        points_in: u64,
    },

    /// An internal invariant was violated.
    #[error("Computation error: {message}")]
    Computation {
        /// Description of what went wrong.
        message: String,
    },

    /// The run was superseded and stopped before `stage`.
    #[error("Run cancelled before {stage}")]
    Cancelled {
        /// Stage that was about to start.
        stage: &'static str,
    },

    /// Configuration file could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Reading a file failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AggregateError {
    /// Category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidBinParameters { .. }
            | Self::InvalidResolution { .. }
            | Self::Validation { .. }
            | Self::Region(_) => ErrorKind::Validation,
            Self::EmptyRegion { .. } => ErrorKind::EmptyRegion,
            Self::Computation { .. } | Self::Json(_) => ErrorKind::Computation,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Config(_) | Self::Io { .. } => ErrorKind::Environment,
        }
    }

    /// Whether the caller can recover by changing its input (as opposed
    /// to an internal failure).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Computation)
    }
}
