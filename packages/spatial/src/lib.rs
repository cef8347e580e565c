#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Selection regions for point filtering.
//!
//! A [`Region`] is either an edge-inclusive bounding box or a set of
//! polygons parsed from `GeoJSON`. Polygon parts are bulk-loaded into an
//! R-tree keyed by their envelopes so a point is only tested against the
//! parts whose bounding box it falls in.
//!
//! Boundary convention for polygons: the crossing-number test counts an
//! edge when exactly one endpoint lies strictly above the point. Points on
//! a left or bottom edge are inside, points on a right or top edge are
//! outside, so two polygons that share an edge never both claim a point.

use geo::{BoundingRect, Coord, LineString, MultiPolygon, Polygon};
use geojson::GeoJson;
use hexmap_aggregate_models::BoundingBox;
use rstar::{AABB, RTree, RTreeObject};

/// Errors raised while building a region.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// The region definition cannot be used for filtering.
    #[error("Malformed region: {message}")]
    MalformedRegion {
        /// Description of what went wrong.
        message: String,
    },

    /// The `GeoJSON` text could not be parsed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
}

impl SpatialError {
    fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRegion {
            message: message.into(),
        }
    }
}

/// A polygon part stored in the R-tree with its envelope.
#[derive(Debug, Clone)]
struct PolygonPart {
    envelope: AABB<[f64; 2]>,
    polygon: Polygon<f64>,
}

impl RTreeObject for PolygonPart {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// A validated set of polygons indexed for point lookups.
#[derive(Debug, Clone)]
pub struct PolygonRegion {
    parts: RTree<PolygonPart>,
    bounds: BoundingBox,
}

impl PolygonRegion {
    /// Builds the index from a multipolygon.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::MalformedRegion`] if the multipolygon is
    /// empty, has a ring with fewer than three vertices, or contains
    /// non-finite coordinates.
    pub fn new(multi_polygon: MultiPolygon<f64>) -> Result<Self, SpatialError> {
        if multi_polygon.0.is_empty() {
            return Err(SpatialError::malformed("region contains no polygons"));
        }

        let mut parts = Vec::with_capacity(multi_polygon.0.len());
        let mut bounds: Option<BoundingBox> = None;

        for (i, polygon) in multi_polygon.0.into_iter().enumerate() {
            validate_polygon(&polygon).map_err(|message| {
                SpatialError::malformed(format!("polygon {i}: {message}"))
            })?;

            let Some(rect) = polygon.bounding_rect() else {
                return Err(SpatialError::malformed(format!(
                    "polygon {i} has no extent"
                )));
            };

            let part_bounds =
                BoundingBox::new(rect.max().y, rect.min().y, rect.max().x, rect.min().x);
            bounds = Some(bounds.map_or(part_bounds, |b| union(&b, &part_bounds)));

            parts.push(PolygonPart {
                envelope: AABB::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                ),
                polygon,
            });
        }

        let bounds = bounds.ok_or_else(|| SpatialError::malformed("region has no extent"))?;
        log::debug!("Indexed {} region polygon(s)", parts.len());

        Ok(Self {
            parts: RTree::bulk_load(parts),
            bounds,
        })
    }

    /// Number of polygon parts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.size()
    }

    /// Whether the region holds no polygons. Always `false` once built.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.size() == 0
    }

    /// Bounding box enclosing every ring.
    #[must_use]
    pub const fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    /// Exact point-in-polygon test across all parts.
    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        let query_env = AABB::from_point([longitude, latitude]);

        self.parts
            .locate_in_envelope_intersecting(&query_env)
            .any(|part| polygon_contains(&part.polygon, longitude, latitude))
    }
}

/// The user-selected area that points are filtered against.
#[derive(Debug, Clone)]
pub enum Region {
    /// Edge-inclusive axis-aligned box.
    BoundingBox(BoundingBox),
    /// One or more polygons, possibly with holes.
    Polygons(PolygonRegion),
}

impl Region {
    /// Creates a box region.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::MalformedRegion`] if any edge is not finite,
    /// `south > north`, or `west > east`.
    pub fn bounding_box(bbox: BoundingBox) -> Result<Self, SpatialError> {
        let edges = [bbox.north, bbox.south, bbox.east, bbox.west];
        if edges.iter().any(|v| !v.is_finite()) {
            return Err(SpatialError::malformed("bounding box edges must be finite"));
        }
        if bbox.south > bbox.north {
            return Err(SpatialError::malformed(format!(
                "south ({}) is greater than north ({})",
                bbox.south, bbox.north
            )));
        }
        if bbox.west > bbox.east {
            return Err(SpatialError::malformed(format!(
                "west ({}) is greater than east ({})",
                bbox.west, bbox.east
            )));
        }
        Ok(Self::BoundingBox(bbox))
    }

    /// Creates a polygon region.
    ///
    /// # Errors
    ///
    /// See [`PolygonRegion::new`].
    pub fn polygons(multi_polygon: MultiPolygon<f64>) -> Result<Self, SpatialError> {
        PolygonRegion::new(multi_polygon).map(Self::Polygons)
    }

    /// Parses a `GeoJSON` `Polygon`, `MultiPolygon`, `GeometryCollection`,
    /// `Feature`, or `FeatureCollection` into a polygon region.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid `GeoJSON`, contains
    /// non-polygonal geometry, or yields no usable polygons.
    pub fn from_geojson_str(geojson_str: &str) -> Result<Self, SpatialError> {
        let geojson: GeoJson = geojson_str.parse()?;
        Self::from_geojson(geojson)
    }

    /// Builds a polygon region from parsed `GeoJSON`.
    ///
    /// # Errors
    ///
    /// See [`Self::from_geojson_str`].
    pub fn from_geojson(geojson: GeoJson) -> Result<Self, SpatialError> {
        let mut polygons = Vec::new();

        match geojson {
            GeoJson::Geometry(geometry) => collect_geojson_geometry(geometry, &mut polygons)?,
            GeoJson::Feature(feature) => collect_feature(feature, &mut polygons)?,
            GeoJson::FeatureCollection(collection) => {
                for feature in collection.features {
                    collect_feature(feature, &mut polygons)?;
                }
            }
        }

        Self::polygons(MultiPolygon(polygons))
    }

    /// Axis-aligned box enclosing the region.
    #[must_use]
    pub const fn bounds(&self) -> BoundingBox {
        match self {
            Self::BoundingBox(bbox) => *bbox,
            Self::Polygons(polygons) => polygons.bounds(),
        }
    }

    /// Exact containment test.
    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        match self {
            Self::BoundingBox(bbox) => bbox.contains(latitude, longitude),
            Self::Polygons(polygons) => polygons.contains(latitude, longitude),
        }
    }
}

fn collect_feature(
    feature: geojson::Feature,
    out: &mut Vec<Polygon<f64>>,
) -> Result<(), SpatialError> {
    let Some(geometry) = feature.geometry else {
        return Err(SpatialError::malformed("feature has no geometry"));
    };
    collect_geojson_geometry(geometry, out)
}

fn collect_geojson_geometry(
    geometry: geojson::Geometry,
    out: &mut Vec<Polygon<f64>>,
) -> Result<(), SpatialError> {
    let geometry: geo::Geometry<f64> = geometry.try_into()?;
    collect_geometry(geometry, out)
}

fn collect_geometry(
    geometry: geo::Geometry<f64>,
    out: &mut Vec<Polygon<f64>>,
) -> Result<(), SpatialError> {
    match geometry {
        geo::Geometry::Polygon(polygon) => out.push(polygon),
        geo::Geometry::MultiPolygon(multi) => out.extend(multi.0),
        geo::Geometry::Rect(rect) => out.push(rect.to_polygon()),
        geo::Geometry::Triangle(triangle) => out.push(triangle.to_polygon()),
        geo::Geometry::GeometryCollection(collection) => {
            for inner in collection.0 {
                collect_geometry(inner, out)?;
            }
        }
        _ => {
            return Err(SpatialError::malformed(
                "region geometry must be a Polygon or MultiPolygon",
            ));
        }
    }
    Ok(())
}

fn validate_polygon(polygon: &Polygon<f64>) -> Result<(), String> {
    validate_ring(polygon.exterior()).map_err(|e| format!("exterior ring {e}"))?;
    for (i, hole) in polygon.interiors().iter().enumerate() {
        validate_ring(hole).map_err(|e| format!("hole {i} {e}"))?;
    }
    Ok(())
}

fn validate_ring(ring: &LineString<f64>) -> Result<(), String> {
    if ring.0.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err("has non-finite coordinates".to_string());
    }
    // Closed rings repeat the first vertex.
    if ring.0.len() < 4 {
        return Err(format!(
            "has {} vertices, need at least 3",
            ring.0.len().saturating_sub(1)
        ));
    }
    Ok(())
}

fn union(a: &BoundingBox, b: &BoundingBox) -> BoundingBox {
    BoundingBox::new(
        a.north.max(b.north),
        a.south.min(b.south),
        a.east.max(b.east),
        a.west.min(b.west),
    )
}

/// Even-odd test over the exterior and every hole of `polygon`.
#[must_use]
pub fn polygon_contains(polygon: &Polygon<f64>, x: f64, y: f64) -> bool {
    let mut inside = ring_crosses(polygon.exterior(), x, y);
    for hole in polygon.interiors() {
        if ring_crosses(hole, x, y) {
            inside = !inside;
        }
    }
    inside
}

/// Crossing-number parity of a horizontal ray cast east from `(x, y)`.
fn ring_crosses(ring: &LineString<f64>, x: f64, y: f64) -> bool {
    let mut inside = false;
    for line in ring.lines() {
        let (a, b): (Coord<f64>, Coord<f64>) = (line.start, line.end);
        if (a.y > y) != (b.y > y) {
            let x_cross = (b.x - a.x) * (y - a.y) / (b.y - a.y) + a.x;
            if x < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn unit_square(offset_x: f64) -> Polygon<f64> {
        polygon![
            (x: offset_x, y: 0.0),
            (x: offset_x + 1.0, y: 0.0),
            (x: offset_x + 1.0, y: 1.0),
            (x: offset_x, y: 1.0),
        ]
    }

    #[test]
    fn bounding_box_rejects_inverted_edges() {
        assert!(Region::bounding_box(BoundingBox::new(0.0, 10.0, 10.0, 0.0)).is_err());
        assert!(Region::bounding_box(BoundingBox::new(10.0, 0.0, 0.0, 10.0)).is_err());
        assert!(Region::bounding_box(BoundingBox::new(f64::NAN, 0.0, 10.0, 0.0)).is_err());
        assert!(Region::bounding_box(BoundingBox::new(10.0, 0.0, 10.0, 0.0)).is_ok());
    }

    #[test]
    fn bounding_box_region_is_edge_inclusive() {
        let region = Region::bounding_box(BoundingBox::new(20.0, 0.0, 20.0, 0.0)).unwrap();
        assert!(region.contains(0.0, 20.0));
        assert!(region.contains(20.0, 0.0));
        assert!(!region.contains(20.5, 10.0));
    }

    #[test]
    fn polygon_contains_interior_points() {
        let square = unit_square(0.0);
        assert!(polygon_contains(&square, 0.5, 0.5));
        assert!(!polygon_contains(&square, 1.5, 0.5));
        assert!(!polygon_contains(&square, 0.5, -0.5));
    }

    #[test]
    fn half_open_edges() {
        let square = unit_square(0.0);
        // left and bottom edges are inside
        assert!(polygon_contains(&square, 0.0, 0.5));
        assert!(polygon_contains(&square, 0.5, 0.0));
        // right and top edges are outside
        assert!(!polygon_contains(&square, 1.0, 0.5));
        assert!(!polygon_contains(&square, 0.5, 1.0));
    }

    #[test]
    fn shared_edge_is_claimed_once() {
        let left = unit_square(0.0);
        let right = unit_square(1.0);
        for y in [0.1, 0.25, 0.5, 0.75, 0.9] {
            let claims = usize::from(polygon_contains(&left, 1.0, y))
                + usize::from(polygon_contains(&right, 1.0, y));
            assert_eq!(claims, 1, "point (1.0, {y}) claimed {claims} times");
        }
    }

    #[test]
    fn holes_are_excluded() {
        let with_hole = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]),
            vec![LineString::from(vec![
                (4.0, 4.0),
                (6.0, 4.0),
                (6.0, 6.0),
                (4.0, 6.0),
            ])],
        );
        assert!(polygon_contains(&with_hole, 2.0, 2.0));
        assert!(!polygon_contains(&with_hole, 5.0, 5.0));
    }

    #[test]
    fn multipolygon_region_checks_every_part() {
        let region =
            Region::polygons(MultiPolygon(vec![unit_square(0.0), unit_square(5.0)])).unwrap();
        assert!(region.contains(0.5, 0.5));
        assert!(region.contains(0.5, 5.5));
        assert!(!region.contains(0.5, 3.0));

        let bounds = region.bounds();
        assert!((bounds.west - 0.0).abs() < f64::EPSILON);
        assert!((bounds.east - 6.0).abs() < f64::EPSILON);
        assert!((bounds.north - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_feature_collection() {
        let geojson = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 1], [0, 0]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": {},
                    "geometry": {
                        "type": "MultiPolygon",
                        "coordinates": [[[[5, 5], [6, 5], [6, 6], [5, 6], [5, 5]]]]
                    }
                }
            ]
        }"#;
        let region = Region::from_geojson_str(geojson).unwrap();
        let Region::Polygons(polygons) = &region else {
            panic!("expected polygon region");
        };
        assert_eq!(polygons.len(), 2);
        assert!(region.contains(5.5, 5.5));
        assert!(region.contains(0.5, 0.5));
        assert!(!region.contains(3.0, 3.0));
    }

    #[test]
    fn rejects_non_polygon_geometry() {
        let geojson = r#"{"type": "Point", "coordinates": [1, 2]}"#;
        assert!(matches!(
            Region::from_geojson_str(geojson),
            Err(SpatialError::MalformedRegion { .. })
        ));
    }

    #[test]
    fn rejects_empty_collection() {
        let geojson = r#"{"type": "FeatureCollection", "features": []}"#;
        assert!(matches!(
            Region::from_geojson_str(geojson),
            Err(SpatialError::MalformedRegion { .. })
        ));
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(matches!(
            Region::from_geojson_str("{not json"),
            Err(SpatialError::GeoJson(_))
        ));
    }
}
