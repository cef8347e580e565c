//! Reduces a point set to the points inside a [`Region`].
//!
//! Polygon regions are filtered in two stages: an O(n) bounding-box pass
//! over every point, then the exact point-in-polygon test on the survivors
//! only. Survivors are tracked by their index into the input slice, never
//! re-located by coordinate value, so duplicate points are kept as
//! distinct entries.

use hexmap_aggregate_models::Point;
use hexmap_spatial::Region;

use crate::AggregateError;

/// Indices of the points inside `region`, in input order.
///
/// Points with non-finite coordinates are skipped.
///
/// # Errors
///
/// Returns [`AggregateError::EmptyRegion`] if no point is inside.
pub fn filter_indices(points: &[Point], region: &Region) -> Result<Vec<usize>, AggregateError> {
    let candidates = prefilter(points, region);

    let survivors = match region {
        Region::BoundingBox(_) => candidates,
        Region::Polygons(polygons) => {
            let prefiltered = candidates.len();
            let exact: Vec<usize> = candidates
                .into_iter()
                .filter(|&i| polygons.contains(points[i].latitude, points[i].longitude))
                .collect();
            log::debug!(
                "Polygon filter: {prefiltered} bounding-box candidates -> {} inside",
                exact.len()
            );
            exact
        }
    };

    if survivors.is_empty() {
        return Err(AggregateError::EmptyRegion {
            points_in: points.len() as u64,
        });
    }

    Ok(survivors)
}

/// Points inside `region`, in input order.
///
/// # Errors
///
/// See [`filter_indices`].
pub fn filter<'a>(points: &'a [Point], region: &Region) -> Result<Vec<&'a Point>, AggregateError> {
    Ok(filter_indices(points, region)?
        .into_iter()
        .map(|i| &points[i])
        .collect())
}

/// Indices of the points inside the region's bounding box.
fn prefilter(points: &[Point], region: &Region) -> Vec<usize> {
    let bounds = region.bounds();
    let mut skipped = 0usize;

    let candidates: Vec<usize> = points
        .iter()
        .enumerate()
        .filter(|(_, p)| {
            if p.is_finite() {
                true
            } else {
                skipped += 1;
                false
            }
        })
        .filter(|(_, p)| bounds.contains(p.latitude, p.longitude))
        .map(|(i, _)| i)
        .collect();

    if skipped > 0 {
        log::debug!("Skipped {skipped} points with non-finite coordinates");
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexmap_aggregate_models::BoundingBox;

    fn grid(step: f64) -> Vec<Point> {
        let mut points = Vec::new();
        let mut lat = -30.0;
        while lat <= 30.0 {
            let mut lon = -30.0;
            while lon <= 30.0 {
                points.push(Point::new(lat, lon));
                lon += step;
            }
            lat += step;
        }
        points
    }

    fn triangle() -> Region {
        Region::from_geojson_str(
            r#"{"type": "Polygon", "coordinates": [[[0, 0], [20, 0], [0, 20], [0, 0]]]}"#,
        )
        .unwrap()
    }

    #[test]
    fn box_membership_matches_inclusive_predicate() {
        let points = grid(2.5);
        let bbox = BoundingBox::new(10.0, -5.0, 7.5, -12.5);
        let region = Region::bounding_box(bbox).unwrap();
        let kept = filter_indices(&points, &region).unwrap();

        for (i, p) in points.iter().enumerate() {
            let expected = bbox.south <= p.latitude
                && p.latitude <= bbox.north
                && bbox.west <= p.longitude
                && p.longitude <= bbox.east;
            assert_eq!(
                kept.binary_search(&i).is_ok(),
                expected,
                "point ({}, {}) membership mismatch",
                p.latitude,
                p.longitude
            );
        }
    }

    #[test]
    fn polygon_result_is_subset_of_its_bounding_box() {
        let points = grid(1.0);
        let region = triangle();
        let bbox_region = Region::bounding_box(region.bounds()).unwrap();

        let exact = filter_indices(&points, &region).unwrap();
        let coarse = filter_indices(&points, &bbox_region).unwrap();

        assert!(exact.len() < coarse.len());
        for i in &exact {
            assert!(coarse.binary_search(i).is_ok(), "index {i} not in bbox result");
        }
    }

    #[test]
    fn polygon_filter_excludes_points_outside_triangle() {
        let points = vec![
            Point::new(5.0, 5.0),
            Point::new(15.0, 15.0),
            Point::new(1.0, 18.0),
        ];
        let kept = filter_indices(&points, &triangle()).unwrap();
        assert_eq!(kept, vec![0, 2]);
    }

    #[test]
    fn duplicate_points_are_kept_separately() {
        let points = vec![
            Point::new(5.0, 5.0),
            Point::new(5.0, 5.0),
            Point::new(50.0, 50.0),
            Point::new(5.0, 5.0),
        ];
        let kept = filter_indices(&points, &triangle()).unwrap();
        assert_eq!(kept, vec![0, 1, 3]);
    }

    #[test]
    fn non_finite_points_are_skipped() {
        let points = vec![
            Point::new(f64::NAN, 5.0),
            Point::new(5.0, f64::NAN),
            Point::new(5.0, 5.0),
        ];
        let region = Region::bounding_box(BoundingBox::new(90.0, -90.0, 180.0, -180.0)).unwrap();
        assert_eq!(filter_indices(&points, &region).unwrap(), vec![2]);
    }

    #[test]
    fn empty_result_is_an_error() {
        let points = vec![Point::new(50.0, 50.0), Point::new(-10.0, -10.0)];
        let region = Region::bounding_box(BoundingBox::new(20.0, 0.0, 20.0, 0.0)).unwrap();
        assert!(matches!(
            filter(&points, &region),
            Err(AggregateError::EmptyRegion { points_in: 2 })
        ));
    }

    #[test]
    fn filter_returns_original_points() {
        let points = vec![Point::new(10.0, 10.0), Point::new(50.0, 50.0)];
        let region = Region::bounding_box(BoundingBox::new(20.0, 0.0, 20.0, 0.0)).unwrap();
        let kept = filter(&points, &region).unwrap();
        assert_eq!(kept.len(), 1);
        assert!(std::ptr::eq(kept[0], &points[0]));
    }
}
