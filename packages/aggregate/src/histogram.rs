//! Raw and binned distributions of cell counts.

use hexmap_aggregate_models::{BinnedBucket, HistogramSet, RawBucket};

use crate::bins::BinSpec;

/// Default number of raw buckets.
pub const DEFAULT_RAW_BUCKETS: usize = 30;

/// Builds both distributions from one set of cell counts.
///
/// `raw` splits `[0, max(counts)]` into `raw_buckets` equal-width buckets
/// regardless of the user's bins. `binned` has one entry per bin of
/// `spec`, bounded by its numeric edges. Both are filled in the
/// same pass over `counts`, so their totals always agree.
#[must_use]
pub fn build_histograms(counts: &[u64], spec: &BinSpec, raw_buckets: usize) -> HistogramSet {
    let mut binned: Vec<BinnedBucket> = spec
        .bins()
        .iter()
        .map(|bin| BinnedBucket {
            label: bin.label.clone(),
            lower_bound: bin.lower,
            upper_bound: bin.upper.map(|upper| upper + 1),
            hexagon_count: 0,
        })
        .collect();

    let max = counts.iter().copied().max().unwrap_or(0);
    let mut raw = if counts.is_empty() || raw_buckets == 0 {
        Vec::new()
    } else {
        raw_buckets_for(max, raw_buckets)
    };
    let width = raw.first().map_or(0.0, |bucket| bucket.upper - bucket.lower);

    for &count in counts {
        if !raw.is_empty() {
            let k = raw_bucket_index(count, width, raw.len());
            raw[k].hexagon_count += 1;
        }
        binned[spec.classify(count)].hexagon_count += 1;
    }

    HistogramSet { raw, binned }
}

#[allow(clippy::cast_precision_loss)]
fn raw_buckets_for(max: u64, n: usize) -> Vec<RawBucket> {
    let width = max as f64 / n as f64;
    (0..n)
        .map(|k| RawBucket {
            lower: k as f64 * width,
            upper: (k + 1) as f64 * width,
            hexagon_count: 0,
        })
        .collect()
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn raw_bucket_index(count: u64, width: f64, n: usize) -> usize {
    if width <= 0.0 {
        return 0;
    }
    ((count as f64 / width).floor() as usize).min(n - 1)
}
