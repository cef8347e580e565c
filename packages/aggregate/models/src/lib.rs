#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Data types shared by the hexagon aggregation pipeline.
//!
//! Input points, hexagon cell identifiers, count bins, output features, and
//! the distribution/export statistics that make up a [`Bundle`]. These are
//! plain serde types; all computation lives in `hexmap_aggregate`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// A geographic point supplied by the caller.
///
/// Coordinates are validated upstream; the pipeline still skips `NaN`
/// values rather than trusting that blindly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Point {
    /// Latitude in degrees (-90 to 90).
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180).
    pub longitude: f64,
    /// Remaining columns of the source row, untyped.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Point {
    /// Creates a point with no attributes.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            attributes: BTreeMap::new(),
        }
    }

    /// Whether both coordinates are finite numbers.
    #[must_use]
    pub const fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

/// Axis-aligned geographic bounding box. All four edges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Northern latitude boundary.
    pub north: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Western longitude boundary.
    pub west: f64,
}

impl BoundingBox {
    /// Creates a new bounding box from the given edges.
    #[must_use]
    pub const fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// Edge-inclusive containment test.
    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.south <= latitude
            && latitude <= self.north
            && self.west <= longitude
            && longitude <= self.east
    }
}

/// Opaque identifier of one hexagonal cell.
///
/// Wraps the 64-bit H3 index. Serialized as the canonical lowercase hex
/// string (e.g. `"872830828ffffff"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellId(u64);

impl CellId {
    /// Wraps a raw H3 index.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw H3 index.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl FromStr for CellId {
    type Err = ParseCellIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| ParseCellIdError {
                value: s.to_string(),
            })
    }
}

impl TryFrom<String> for CellId {
    type Error = ParseCellIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CellId> for String {
    fn from(id: CellId) -> Self {
        id.to_string()
    }
}

/// Error returned when a cell id string is not valid hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCellIdError {
    /// The rejected input.
    pub value: String,
}

impl fmt::Display for ParseCellIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid cell id {:?}: expected a hex H3 index", self.value)
    }
}

impl std::error::Error for ParseCellIdError {}

/// An sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Color {
    /// Creates a color from its channels.
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Color {
    type Err = ParseColorError;

    /// Parses `#rrggbb` or the `#rgb` shorthand. The leading `#` is optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseColorError {
            value: s.to_string(),
        };
        let hex = s.trim().trim_start_matches('#');
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(err());
        }

        let channel = |digits: &str| u8::from_str_radix(digits, 16).map_err(|_| err());

        match hex.len() {
            6 => Ok(Self {
                r: channel(&hex[0..2])?,
                g: channel(&hex[2..4])?,
                b: channel(&hex[4..6])?,
            }),
            3 => {
                let expand = |i: usize| channel(&hex[i..=i]).map(|v| v * 17);
                Ok(Self {
                    r: expand(0)?,
                    g: expand(1)?,
                    b: expand(2)?,
                })
            }
            _ => Err(err()),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = ParseColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

/// Error returned when a color string is not `#rgb` or `#rrggbb`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseColorError {
    /// The rejected input.
    pub value: String,
}

impl fmt::Display for ParseColorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid color {:?}: expected #rrggbb", self.value)
    }
}

impl std::error::Error for ParseColorError {}

/// One count range of a bin layout.
///
/// Numeric bounds are carried as typed fields; the label is display text
/// only and is never parsed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bin {
    /// Zero-based position of the bin.
    pub index: usize,
    /// Smallest count in the bin (inclusive).
    pub lower: u64,
    /// Largest count in the bin (inclusive), `None` for the open-ended bin.
    pub upper: Option<u64>,
    /// Display label, e.g. `"1–10"` or `"21+"`.
    pub label: String,
}

impl Bin {
    /// Whether `value` falls inside this bin's inclusive range.
    #[must_use]
    pub fn contains(&self, value: u64) -> bool {
        value >= self.lower && self.upper.is_none_or(|upper| value <= upper)
    }
}

/// How exported features are split into files.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GroupBy {
    /// One combined document.
    #[default]
    None,
    /// One document per bin label.
    Bin,
}

/// One non-empty hexagon of the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    /// Cell identifier.
    pub cell_id: CellId,
    /// Number of points in the cell (always at least 1).
    pub count: u64,
    /// Index of the bin the count falls in.
    pub bin_index: usize,
    /// Label of that bin.
    pub bin_label: String,
    /// Fill color assigned to the bin.
    pub color: Color,
    /// Closed boundary ring of `[lon, lat]` vertices.
    pub boundary: Vec<[f64; 2]>,
}

/// Top-level metadata describing how a bundle was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleMetadata {
    /// Hexagon resolution (0-15).
    pub resolution: u8,
    /// Bin width.
    pub bin_step: u32,
    /// Number of bins.
    pub bin_count: u32,
    /// Finite bin thresholds; the upper end of the last bin is open.
    pub bin_edges: Vec<u64>,
    /// One label per bin, in order.
    pub bin_labels: Vec<String>,
    /// Number of points supplied.
    pub total_points_in: u64,
    /// Number of points inside the region.
    pub total_points_out: u64,
    /// Number of non-empty cells.
    pub cell_count: u64,
}

/// One equal-width bucket of the raw count distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBucket {
    /// Lower edge of the bucket.
    pub lower: f64,
    /// Upper edge of the bucket.
    pub upper: f64,
    /// Number of cells whose count falls in the bucket.
    pub hexagon_count: u64,
}

/// Cells per user bin, bounded as `[lower_bound, upper_bound)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinnedBucket {
    /// Bin label.
    pub label: String,
    /// Inclusive lower bound.
    pub lower_bound: u64,
    /// Exclusive upper bound, `None` for the open-ended bin.
    pub upper_bound: Option<u64>,
    /// Number of cells whose count falls in the bin.
    pub hexagon_count: u64,
}

/// The two parallel count distributions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramSet {
    /// Equal-width buckets over `[0, max count]`.
    pub raw: Vec<RawBucket>,
    /// One entry per bin, in bin order.
    pub binned: Vec<BinnedBucket>,
}

/// Color chosen for one bin label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaletteEntry {
    /// Bin label.
    pub label: String,
    /// Assigned color.
    pub color: Color,
    /// Whether the color came from a user override.
    pub overridden: bool,
}

/// Serialized size of one grouped export document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSize {
    /// Bin label of the group.
    pub label: String,
    /// File name the group would be written to.
    pub file_name: String,
    /// Serialized size in bytes.
    pub bytes: u64,
}

/// Serialized-size estimates for exporting a bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSizes {
    /// Grouping the archive estimate was computed for.
    pub group_by: GroupBy,
    /// Size of the single combined document.
    pub single_file_bytes: u64,
    /// Size of each per-bin document, in bin order.
    pub per_group_bytes: Vec<GroupSize>,
    /// Size of an archive holding the chosen documents.
    pub total_archive_bytes: u64,
}

/// A non-fatal warning attached to a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Advisory {
    /// More cells than the soft cap.
    #[serde(rename_all = "camelCase")]
    CellLimitExceeded {
        /// Number of cells produced.
        cell_count: u64,
        /// Configured soft cap.
        limit: u64,
    },
    /// An export document above the size warning threshold.
    #[serde(rename_all = "camelCase")]
    ExportSizeExceeded {
        /// Estimated size in bytes.
        bytes: u64,
        /// Configured threshold in bytes.
        threshold: u64,
    },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CellLimitExceeded { cell_count, limit } => write!(
                f,
                "{cell_count} hexagons exceeds the recommended maximum of {limit}; \
                 consider a lower resolution or a smaller region"
            ),
            Self::ExportSizeExceeded { bytes, threshold } => {
                #[allow(clippy::cast_precision_loss)]
                let mb = *bytes as f64 / 1_048_576.0;
                #[allow(clippy::cast_precision_loss)]
                let limit_mb = *threshold as f64 / 1_048_576.0;
                write!(
                    f,
                    "estimated export size {mb:.1} MB exceeds {limit_mb:.1} MB"
                )
            }
        }
    }
}

/// The complete output of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    /// How the bundle was produced.
    pub metadata: BundleMetadata,
    /// One feature per non-empty cell, ordered by cell id.
    pub features: Vec<Feature>,
    /// The bins the features were classified into.
    pub bins: Vec<Bin>,
    /// Raw and binned count distributions.
    pub histograms: HistogramSet,
    /// One color per bin label, in bin order.
    pub palette: Vec<PaletteEntry>,
    /// Export size estimates.
    pub export_sizes: ExportSizes,
    /// Non-fatal warnings.
    pub advisories: Vec<Advisory>,
}

impl Bundle {
    /// Color assigned to `label`, if the label exists.
    #[must_use]
    pub fn color_for(&self, label: &str) -> Option<Color> {
        self.palette
            .iter()
            .find(|entry| entry.label == label)
            .map(|entry| entry.color)
    }
}
