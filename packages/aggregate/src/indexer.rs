//! Assigns points to H3 cells and counts points per cell.
//!
//! The cell map is rebuilt from scratch on every call. Cells from two
//! different resolutions never share an id because the resolution is part
//! of the H3 index.

use std::collections::BTreeMap;

use h3o::{CellIndex, LatLng, Resolution};
use hexmap_aggregate_models::{CellId, Point};

use crate::AggregateError;

/// Validates a resolution number.
///
/// # Errors
///
/// Returns [`AggregateError::InvalidResolution`] for values above 15.
pub fn resolution(value: u8) -> Result<Resolution, AggregateError> {
    Resolution::try_from(value).map_err(|_| AggregateError::InvalidResolution { value })
}

/// The cell containing a coordinate, or `None` for non-finite input.
#[must_use]
pub fn cell_for_coordinate(
    latitude: f64,
    longitude: f64,
    resolution: Resolution,
) -> Option<CellId> {
    let coord = LatLng::new(latitude, longitude).ok()?;
    Some(CellId::new(u64::from(coord.to_cell(resolution))))
}

/// Counts points per cell.
///
/// The result is keyed in cell-id order and does not depend on the order
/// of `points`. Points with non-finite coordinates are skipped.
pub fn index<'a>(
    points: impl IntoIterator<Item = &'a Point>,
    resolution: Resolution,
) -> BTreeMap<CellId, u64> {
    let mut counts: BTreeMap<CellId, u64> = BTreeMap::new();
    let mut skipped = 0u64;

    for point in points {
        let Some(cell) = cell_for_coordinate(point.latitude, point.longitude, resolution) else {
            skipped += 1;
            continue;
        };
        *counts.entry(cell).or_insert(0) += 1;
    }

    if skipped > 0 {
        log::debug!("Skipped {skipped} points that could not be indexed");
    }

    counts
}

/// Closed boundary ring of a cell as `[lon, lat]` pairs.
///
/// Hexagons yield seven positions (six vertices plus the repeated first);
/// pentagons and cells with distortion vertices yield their own count.
/// Rings that straddle the antimeridian are unwrapped so longitudes stay
/// continuous, which may put some longitudes above 180.
///
/// # Errors
///
/// Returns [`AggregateError::Computation`] if `cell` is not a valid H3
/// cell index.
pub fn cell_boundary_ring(cell: CellId) -> Result<Vec<[f64; 2]>, AggregateError> {
    let index = CellIndex::try_from(cell.raw()).map_err(|e| AggregateError::Computation {
        message: format!("cell {cell} is not a valid H3 index: {e}"),
    })?;

    let mut ring: Vec<[f64; 2]> = index
        .boundary()
        .iter()
        .map(|vertex| [vertex.lng(), vertex.lat()])
        .collect();

    if ring.is_empty() {
        return Err(AggregateError::Computation {
            message: format!("cell {cell} has an empty boundary"),
        });
    }

    let (min_lng, max_lng) = ring
        .iter()
        .fold((f64::MAX, f64::MIN), |(lo, hi), [lng, _]| (lo.min(*lng), hi.max(*lng)));
    if max_lng - min_lng > 180.0 {
        for vertex in &mut ring {
            if vertex[0] < 0.0 {
                vertex[0] += 360.0;
            }
        }
    }
    ring.push(ring[0]);

    Ok(ring)
}

/// Resolution encoded in a cell id.
///
/// # Errors
///
/// Returns [`AggregateError::Computation`] if `cell` is not a valid H3
/// cell index.
pub fn cell_resolution(cell: CellId) -> Result<u8, AggregateError> {
    CellIndex::try_from(cell.raw())
        .map(|index| u8::from(index.resolution()))
        .map_err(|e| AggregateError::Computation {
            message: format!("cell {cell} is not a valid H3 index: {e}"),
        })
}
