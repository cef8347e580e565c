//! Loading points, regions, and color overrides from user input.
//!
//! Rows with unusable coordinates are skipped and counted here so the
//! aggregation pipeline only ever sees valid points. The row and file size
//! caps are enforced before any aggregation work starts.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use hexmap_aggregate::Region;
use hexmap_aggregate::progress::ProgressCallback;
use hexmap_aggregate_models::{BoundingBox, Color, Point};

/// Largest number of data rows accepted from one file.
pub const MAX_ROWS: usize = 500_000;

/// Largest input file accepted, in bytes.
pub const MAX_FILE_BYTES: u64 = 100 * 1024 * 1024;

const LATITUDE_COLUMNS: &[&str] = &["latitude", "lat"];
const LONGITUDE_COLUMNS: &[&str] = &["longitude", "lon", "lng"];

/// Errors that can occur while reading user input.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// The points file is larger than [`MAX_FILE_BYTES`].
    #[error("{path} is {bytes} bytes; the limit is {limit} bytes")]
    FileTooLarge {
        /// Offending file.
        path: PathBuf,
        /// Its size.
        bytes: u64,
        /// The cap.
        limit: u64,
    },

    /// The points file has more than [`MAX_ROWS`] data rows.
    #[error("Input has more than {limit} rows")]
    TooManyRows {
        /// The cap.
        limit: usize,
    },

    /// A required coordinate column is absent.
    #[error("CSV has no {axis} column (expected one of: {expected})")]
    MissingColumn {
        /// `latitude` or `longitude`.
        axis: &'static str,
        /// Accepted header names.
        expected: String,
    },

    /// The `--bbox` value is unusable.
    #[error("Invalid bounding box {value:?}: {message}")]
    InvalidBoundingBox {
        /// The rejected input.
        value: String,
        /// What went wrong.
        message: String,
    },

    /// A `--color` value is not `LABEL=#rrggbb`.
    #[error("Invalid color override {value:?}: expected LABEL=#rrggbb")]
    InvalidColorOverride {
        /// The rejected input.
        value: String,
    },

    /// Neither `--bbox` nor `--region` was given.
    #[error("A region is required: pass --bbox or --region")]
    MissingRegion,

    /// The region file could not be used.
    #[error("Region error: {0}")]
    Region(#[from] hexmap_aggregate::SpatialError),

    /// The CSV could not be parsed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Reading a file failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Points read from a CSV file.
#[derive(Debug)]
pub struct LoadedPoints {
    /// Rows with valid coordinates.
    pub points: Vec<Point>,
    /// Rows skipped for missing, unparseable, or out-of-range coordinates.
    pub skipped: u64,
}

/// Reads points from a CSV file after checking the file size cap.
///
/// # Errors
///
/// * [`InputError::FileTooLarge`] or [`InputError::TooManyRows`] if a cap
///   is exceeded
/// * [`InputError::MissingColumn`] if no coordinate column is found
/// * [`InputError::Io`] or [`InputError::Csv`] if the file cannot be read
pub fn load_points(
    path: &Path,
    progress: &dyn ProgressCallback,
) -> Result<LoadedPoints, InputError> {
    let io_err = |source| InputError::Io {
        path: path.to_path_buf(),
        source,
    };

    let bytes = std::fs::metadata(path).map_err(io_err)?.len();
    if bytes > MAX_FILE_BYTES {
        return Err(InputError::FileTooLarge {
            path: path.to_path_buf(),
            bytes,
            limit: MAX_FILE_BYTES,
        });
    }

    let file = File::open(path).map_err(io_err)?;
    let loaded = read_points(file, progress)?;

    log::info!(
        "Loaded {} points from {} ({} rows skipped)",
        loaded.points.len(),
        path.display(),
        loaded.skipped
    );

    Ok(loaded)
}

/// Reads points from CSV data with a header row.
///
/// Column names are matched case-insensitively. Columns other than the two
/// coordinates are kept as point attributes.
///
/// # Errors
///
/// See [`load_points`].
pub fn read_points<R: Read>(
    reader: R,
    progress: &dyn ProgressCallback,
) -> Result<LoadedPoints, InputError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_owned())
        .collect();

    let lat_col = find_column(&headers, LATITUDE_COLUMNS, "latitude")?;
    let lon_col = find_column(&headers, LONGITUDE_COLUMNS, "longitude")?;

    let mut points = Vec::new();
    let mut skipped = 0u64;
    let mut rows = 0usize;
    progress.begin(None);

    for result in reader.records() {
        let record = result?;
        rows += 1;
        if rows > MAX_ROWS {
            return Err(InputError::TooManyRows { limit: MAX_ROWS });
        }
        progress.advance(1);

        let latitude = record.get(lat_col).and_then(|v| parse_coordinate(v, 90.0));
        let longitude = record.get(lon_col).and_then(|v| parse_coordinate(v, 180.0));
        let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
            skipped += 1;
            continue;
        };

        let attributes: BTreeMap<String, String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != lat_col && *i != lon_col)
            .filter_map(|(i, header)| {
                record
                    .get(i)
                    .map(|value| (header.clone(), value.trim().to_owned()))
            })
            .collect();

        points.push(Point {
            latitude,
            longitude,
            attributes,
        });
    }

    if skipped > 0 {
        log::warn!("Skipped {skipped} rows with invalid coordinates");
    }
    progress.done(&format!("{} points", points.len()));

    Ok(LoadedPoints { points, skipped })
}

fn find_column(
    headers: &[String],
    names: &[&str],
    axis: &'static str,
) -> Result<usize, InputError> {
    headers
        .iter()
        .position(|h| names.iter().any(|name| h.eq_ignore_ascii_case(name)))
        .ok_or_else(|| InputError::MissingColumn {
            axis,
            expected: names.join(", "),
        })
}

fn parse_coordinate(value: &str, limit: f64) -> Option<f64> {
    let parsed: f64 = value.trim().parse().ok()?;
    (parsed.is_finite() && parsed.abs() <= limit).then_some(parsed)
}

/// Parses a `west,south,east,north` bounding box.
///
/// # Errors
///
/// Returns [`InputError::InvalidBoundingBox`] unless the value is four
/// comma-separated numbers.
pub fn parse_bbox(value: &str) -> Result<BoundingBox, InputError> {
    let invalid = |message: &str| InputError::InvalidBoundingBox {
        value: value.to_string(),
        message: message.to_string(),
    };

    let parts: Vec<f64> = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| invalid("expected numbers"))?;

    let &[west, south, east, north] = parts.as_slice() else {
        return Err(invalid("expected west,south,east,north"));
    };

    Ok(BoundingBox::new(north, south, east, west))
}

/// Builds the region from either a `--bbox` value or a `GeoJSON` file.
///
/// # Errors
///
/// Returns [`InputError::MissingRegion`] if neither is given, otherwise
/// any error from parsing or validating the region.
pub fn load_region(bbox: Option<&str>, region_path: Option<&Path>) -> Result<Region, InputError> {
    if let Some(bbox) = bbox {
        return Ok(Region::bounding_box(parse_bbox(bbox)?)?);
    }

    let Some(path) = region_path else {
        return Err(InputError::MissingRegion);
    };

    let contents = std::fs::read_to_string(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let region = Region::from_geojson_str(&contents)?;
    log::info!("Loaded region from {}", path.display());

    Ok(region)
}

/// Parses a `LABEL=#rrggbb` color override. The label may itself contain
/// `=`; the color is everything after the last one.
///
/// # Errors
///
/// Returns [`InputError::InvalidColorOverride`] for any other shape.
pub fn parse_color_override(value: &str) -> Result<(String, Color), InputError> {
    let invalid = || InputError::InvalidColorOverride {
        value: value.to_string(),
    };

    let (label, color) = value.rsplit_once('=').ok_or_else(invalid)?;
    if label.is_empty() {
        return Err(invalid());
    }
    let color: Color = color.parse().map_err(|_| invalid())?;

    Ok((label.to_string(), color))
}
