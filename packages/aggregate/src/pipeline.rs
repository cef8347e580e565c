//! The full aggregation run: points in, [`Bundle`] out.
//!
//! A run either completes every stage and returns a complete bundle, or
//! fails and returns nothing, so callers keep their previous bundle on
//! error. Nothing from a previous run is reused.

use hexmap_aggregate_models::{Advisory, Bundle, BundleMetadata, CellId, Feature, GroupBy, Point};
use hexmap_spatial::Region;

use crate::AggregateError;
use crate::bins::{BinSpec, build_bins_capped};
use crate::config::PipelineConfig;
use crate::export::{estimate_sizes, size_advisories};
use crate::filter::filter;
use crate::histogram::build_histograms;
use crate::indexer::{cell_boundary_ring, index, resolution};
use crate::palette::{PaletteOverrides, assign};
use crate::progress::{NullProgress, ProgressCallback, Stage};

/// Parameters of one run.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    /// Area the points are filtered to.
    pub region: Region,
    /// H3 resolution (0-15).
    pub resolution: u8,
    /// Bin width.
    pub bin_step: u32,
    /// Number of bins.
    pub bin_count: u32,
    /// Grouping used for the archive size estimate.
    pub group_by: GroupBy,
}

/// Runs requests against a fixed configuration.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Creates a pipeline after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns the validation error for the first out-of-range value.
    pub fn new(config: PipelineConfig) -> Result<Self, AggregateError> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage without progress reporting or cancellation.
    ///
    /// # Errors
    ///
    /// See [`Self::run_with`].
    pub fn run(
        &self,
        points: &[Point],
        request: &PipelineRequest,
        overrides: &PaletteOverrides,
    ) -> Result<Bundle, AggregateError> {
        self.run_with(points, request, overrides, &NullProgress, &|| false)
    }

    /// Runs every stage, reporting one progress step per stage and checking
    /// `is_cancelled` before each one.
    ///
    /// Bin parameters and resolution are validated before any point is
    /// touched.
    ///
    /// # Errors
    ///
    /// * [`AggregateError::InvalidBinParameters`] or
    ///   [`AggregateError::InvalidResolution`] for bad parameters
    /// * [`AggregateError::Validation`] for more bins than the configured
    ///   `max_bin_count`
    /// * [`AggregateError::EmptyRegion`] if no point is inside the region
    /// * [`AggregateError::Cancelled`] if `is_cancelled` returned `true`
    /// * [`AggregateError::Computation`] if an indexed cell cannot be
    ///   decoded
    pub fn run_with(
        &self,
        points: &[Point],
        request: &PipelineRequest,
        overrides: &PaletteOverrides,
        progress: &dyn ProgressCallback,
        is_cancelled: &dyn Fn() -> bool,
    ) -> Result<Bundle, AggregateError> {
        let spec = build_bins_capped(
            request.bin_step,
            request.bin_count,
            self.config.max_bin_count,
        )?;
        let h3_resolution = resolution(request.resolution)?;

        progress.begin(Some(Stage::count()));

        let step = |stage: Stage| -> Result<(), AggregateError> {
            if is_cancelled() {
                log::debug!("Run cancelled before {}", stage.label());
                return Err(AggregateError::Cancelled {
                    stage: stage.label(),
                });
            }
            progress.stage(stage);
            Ok(())
        };

        step(Stage::Filter)?;
        let inside = filter(points, &request.region)?;
        log::info!(
            "Filtered {} points to {} inside the region",
            points.len(),
            inside.len()
        );
        progress.advance(1);

        step(Stage::Index)?;
        let cells = index(inside.iter().copied(), h3_resolution);
        log::info!(
            "Indexed {} points into {} cells at resolution {}",
            inside.len(),
            cells.len(),
            request.resolution
        );
        progress.advance(1);

        step(Stage::Classify)?;
        let classified: Vec<(CellId, u64, usize)> = cells
            .iter()
            .map(|(&cell, &count)| (cell, count, spec.classify(count)))
            .collect();
        progress.advance(1);

        step(Stage::Histogram)?;
        let counts: Vec<u64> = classified.iter().map(|&(_, count, _)| count).collect();
        let histograms = build_histograms(&counts, &spec, self.config.histogram_buckets);
        progress.advance(1);

        step(Stage::Palette)?;
        let palette = assign(
            &spec.labels(),
            overrides.colors(),
            self.config.palette_start,
            self.config.palette_end,
        );
        progress.advance(1);

        step(Stage::Assemble)?;
        let features = classified
            .iter()
            .map(|&(cell_id, count, bin_index)| {
                Ok(Feature {
                    cell_id,
                    count,
                    bin_index,
                    bin_label: palette[bin_index].label.clone(),
                    color: palette[bin_index].color,
                    boundary: cell_boundary_ring(cell_id)?,
                })
            })
            .collect::<Result<Vec<_>, AggregateError>>()?;
        let metadata = build_metadata(
            &spec,
            request.resolution,
            points.len(),
            inside.len(),
            &features,
        );
        progress.advance(1);

        step(Stage::Estimate)?;
        let export_sizes = estimate_sizes(&features, spec.bins(), &metadata, request.group_by)?;
        let mut advisories = Vec::new();
        if metadata.cell_count > self.config.cell_soft_cap {
            advisories.push(Advisory::CellLimitExceeded {
                cell_count: metadata.cell_count,
                limit: self.config.cell_soft_cap,
            });
        }
        advisories.extend(size_advisories(&export_sizes, self.config.export_warn_bytes));
        for advisory in &advisories {
            log::warn!("{advisory}");
        }
        progress.advance(1);

        progress.done(&format!("{} cells", metadata.cell_count));

        Ok(Bundle {
            metadata,
            features,
            bins: spec.bins().to_vec(),
            histograms,
            palette,
            export_sizes,
            advisories,
        })
    }
}

fn build_metadata(
    spec: &BinSpec,
    resolution: u8,
    points_in: usize,
    points_out: usize,
    features: &[Feature],
) -> BundleMetadata {
    BundleMetadata {
        resolution,
        bin_step: spec.step(),
        bin_count: spec.count(),
        bin_edges: spec.edges().to_vec(),
        bin_labels: spec.labels(),
        total_points_in: points_in as u64,
        total_points_out: points_out as u64,
        cell_count: features.len() as u64,
    }
}
