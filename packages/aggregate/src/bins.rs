//! Count-range bins derived from a bin width and a bin count.
//!
//! With `step = 10, count = 3` the bins are `1–10`, `11–20`, and `21+`.
//! The finite edges are `[0, 10, 20]`: bin `i` holds counts with
//! `edges[i] < value <= edges[i + 1]`, and the last bin holds every count
//! above the last edge.

use hexmap_aggregate_models::Bin;

use crate::AggregateError;

/// Identifies the `(step, count)` pair a [`BinSpec`] was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BinGeneration {
    /// Bin width.
    pub step: u32,
    /// Number of bins.
    pub count: u32,
}

/// An ordered, immutable set of bins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinSpec {
    step: u32,
    bins: Vec<Bin>,
    edges: Vec<u64>,
}

/// Most bins any layout may have, whatever the configured limit.
pub const MAX_BIN_COUNT: u32 = 1024;

/// Builds the bins for a width and count, up to [`MAX_BIN_COUNT`] bins.
///
/// # Errors
///
/// See [`build_bins_capped`].
pub fn build_bins(step: u32, count: u32) -> Result<BinSpec, AggregateError> {
    build_bins_capped(step, count, MAX_BIN_COUNT)
}

/// Builds the bins for a width and count, rejecting more than `max_count`
/// bins. `max_count` is itself clamped to [`MAX_BIN_COUNT`].
///
/// # Errors
///
/// * [`AggregateError::InvalidBinParameters`] if `step` or `count` is zero
/// * [`AggregateError::Validation`] if `count` is above the limit
pub fn build_bins_capped(
    step: u32,
    count: u32,
    max_count: u32,
) -> Result<BinSpec, AggregateError> {
    if step == 0 || count == 0 {
        return Err(AggregateError::InvalidBinParameters { step, count });
    }
    check_bin_count(count, max_count)?;

    let width = u64::from(step);
    let last = count as usize - 1;

    let edges: Vec<u64> = (0..u64::from(count)).map(|i| i * width).collect();
    let bins = edges
        .iter()
        .enumerate()
        .map(|(index, &edge)| {
            let lower = edge + 1;
            if index == last {
                Bin {
                    index,
                    lower,
                    upper: None,
                    label: format!("{lower}+"),
                }
            } else {
                let upper = edge + width;
                Bin {
                    index,
                    lower,
                    upper: Some(upper),
                    label: format!("{lower}\u{2013}{upper}"),
                }
            }
        })
        .collect();

    Ok(BinSpec { step, bins, edges })
}

/// Rejects `count` above `max_count` (or above [`MAX_BIN_COUNT`]).
///
/// # Errors
///
/// Returns [`AggregateError::Validation`] naming `bin_count` and the
/// rejected value.
pub fn check_bin_count(count: u32, max_count: u32) -> Result<(), AggregateError> {
    let limit = max_count.min(MAX_BIN_COUNT);
    if count > limit {
        return Err(AggregateError::Validation {
            field: "bin_count",
            message: format!("{count} bins is more than the limit of {limit}"),
        });
    }
    Ok(())
}

impl BinSpec {
    /// Bin width.
    #[must_use]
    pub const fn step(&self) -> u32 {
        self.step
    }

    /// Number of bins.
    #[must_use]
    pub fn count(&self) -> u32 {
        u32::try_from(self.bins.len()).unwrap_or(u32::MAX)
    }

    /// The `(step, count)` pair these bins were built from.
    #[must_use]
    pub fn generation(&self) -> BinGeneration {
        BinGeneration {
            step: self.step,
            count: self.count(),
        }
    }

    /// The bins in order.
    #[must_use]
    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    /// Finite thresholds, strictly increasing, one per bin.
    #[must_use]
    pub fn edges(&self) -> &[u64] {
        &self.edges
    }

    /// Labels in bin order.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.bins.iter().map(|bin| bin.label.clone()).collect()
    }

    /// Bin at `index`.
    #[must_use]
    pub fn bin(&self, index: usize) -> Option<&Bin> {
        self.bins.get(index)
    }

    /// Index of the bin holding `value`.
    ///
    /// Total over all counts: zero lands in the first bin and anything
    /// past the last edge lands in the open-ended bin. Cells never have a
    /// zero count, so the first case does not arise in practice.
    #[must_use]
    pub fn classify(&self, value: u64) -> usize {
        let below = self.edges.partition_point(|&edge| edge < value);
        below.saturating_sub(1).min(self.bins.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_parameters() {
        assert!(matches!(
            build_bins(0, 3),
            Err(AggregateError::InvalidBinParameters { step: 0, count: 3 })
        ));
        assert!(matches!(
            build_bins(10, 0),
            Err(AggregateError::InvalidBinParameters { step: 10, count: 0 })
        ));
    }

    #[test]
    fn rejects_counts_above_limit_before_allocating() {
        let err = build_bins(1, u32::MAX).unwrap_err();
        assert!(matches!(
            &err,
            AggregateError::Validation {
                field: "bin_count",
                ..
            }
        ));
        assert!(err.to_string().contains(&u32::MAX.to_string()));

        assert_eq!(build_bins(1, MAX_BIN_COUNT).unwrap().bins().len(), 1024);
        assert!(build_bins_capped(5, 10, 10).is_ok());
        assert!(matches!(
            build_bins_capped(5, 11, 10),
            Err(AggregateError::Validation {
                field: "bin_count",
                ..
            })
        ));
        // a configured limit can only tighten the built-in one
        assert!(build_bins_capped(1, MAX_BIN_COUNT + 1, u32::MAX).is_err());
    }

    #[test]
    fn step_ten_count_three() {
        let spec = build_bins(10, 3).unwrap();
        assert_eq!(spec.labels(), vec!["1\u{2013}10", "11\u{2013}20", "21+"]);
        assert_eq!(spec.edges(), &[0, 10, 20]);
        assert_eq!(spec.classify(5), 0);
        assert_eq!(spec.classify(15), 1);
        assert_eq!(spec.classify(1000), 2);
    }

    #[test]
    fn edge_values_follow_labels() {
        let spec = build_bins(10, 3).unwrap();
        assert_eq!(spec.classify(1), 0);
        assert_eq!(spec.classify(10), 0);
        assert_eq!(spec.classify(11), 1);
        assert_eq!(spec.classify(20), 1);
        assert_eq!(spec.classify(21), 2);
    }

    #[test]
    fn single_bin_is_open_ended() {
        let spec = build_bins(1, 1).unwrap();
        assert_eq!(spec.labels(), vec!["1+"]);
        assert_eq!(spec.bin(0).unwrap().upper, None);
        assert_eq!(spec.classify(2), 0);
        assert_eq!(spec.classify(u64::MAX), 0);
    }

    #[test]
    fn classify_is_total_and_consistent_with_bounds() {
        for (step, count) in [(1, 1), (1, 5), (3, 4), (10, 3), (25, 8)] {
            let spec = build_bins(step, count).unwrap();
            for value in 0..=u64::from(step * count + 5) {
                let index = spec.classify(value);
                assert!(index < spec.bins().len());
                if value > 0 {
                    let bin = spec.bin(index).unwrap();
                    assert!(
                        bin.contains(value),
                        "value {value} classified into {} (step={step}, count={count})",
                        bin.label
                    );
                }
            }
        }
    }

    #[test]
    fn bounds_are_typed_and_contiguous() {
        let spec = build_bins(5, 4).unwrap();
        let bins = spec.bins();
        assert_eq!(bins[0].lower, 1);
        for pair in bins.windows(2) {
            assert_eq!(pair[0].upper.map(|u| u + 1), Some(pair[1].lower));
        }
        assert_eq!(bins[3].lower, 16);
        assert_eq!(bins[3].label, "16+");
    }

    #[test]
    fn generation_tracks_parameters() {
        let spec = build_bins(7, 2).unwrap();
        assert_eq!(spec.generation(), BinGeneration { step: 7, count: 2 });
        assert_eq!(spec.step(), 7);
        assert_eq!(spec.count(), 2);
    }
}
