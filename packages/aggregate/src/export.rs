//! `GeoJSON` output documents and their serialized sizes.
//!
//! A bundle exports either as one combined `FeatureCollection` or as one
//! collection per bin label. Every document carries the bundle metadata as
//! a top-level `metadata` member. Size estimates serialize the real
//! documents, and the archive estimate adds the per-entry framing of a
//! stored (uncompressed) ZIP archive.

use geo::{LineString, Polygon};
use geojson::{Feature as GeoJsonFeature, FeatureCollection, Geometry, JsonObject, JsonValue};
use hexmap_aggregate_models::{
    Advisory, Bin, Bundle, BundleMetadata, ExportSizes, Feature, GroupBy, GroupSize,
};

use crate::AggregateError;

/// File name of the combined document.
pub const SINGLE_FILE_NAME: &str = "hexbins.geojson";

/// ZIP local file header, excluding the file name.
const ZIP_LOCAL_HEADER_BYTES: u64 = 30;

/// ZIP central directory header, excluding the file name.
const ZIP_CENTRAL_HEADER_BYTES: u64 = 46;

/// ZIP end of central directory record.
const ZIP_END_RECORD_BYTES: u64 = 22;

/// Converts features into a `GeoJSON` collection with `metadata` attached.
///
/// # Errors
///
/// Returns [`AggregateError::Json`] if the metadata cannot be serialized.
pub fn feature_collection(
    features: &[Feature],
    metadata: &BundleMetadata,
) -> Result<FeatureCollection, AggregateError> {
    let mut foreign_members = JsonObject::new();
    foreign_members.insert("metadata".to_string(), serde_json::to_value(metadata)?);

    Ok(FeatureCollection {
        bbox: None,
        features: features.iter().map(to_geojson_feature).collect(),
        foreign_members: Some(foreign_members),
    })
}

/// The combined collection for a bundle.
///
/// # Errors
///
/// See [`feature_collection`].
pub fn bundle_collection(bundle: &Bundle) -> Result<FeatureCollection, AggregateError> {
    feature_collection(&bundle.features, &bundle.metadata)
}

/// One collection per bin that has at least one feature, in bin order,
/// paired with the bin and its file name.
///
/// # Errors
///
/// See [`feature_collection`].
pub fn grouped_collections<'a>(
    features: &[Feature],
    bins: &'a [Bin],
    metadata: &BundleMetadata,
) -> Result<Vec<(&'a Bin, String, FeatureCollection)>, AggregateError> {
    let mut groups = Vec::new();

    for bin in bins {
        let members: Vec<Feature> = features
            .iter()
            .filter(|feature| feature.bin_index == bin.index)
            .cloned()
            .collect();
        if members.is_empty() {
            continue;
        }
        groups.push((bin, group_file_name(bin), feature_collection(&members, metadata)?));
    }

    Ok(groups)
}

/// File name for a bin's document, e.g. `hexbins_0_1-10.geojson` or
/// `hexbins_2_21plus.geojson`.
#[must_use]
pub fn group_file_name(bin: &Bin) -> String {
    let mut slug = String::with_capacity(bin.label.len());
    for c in bin.label.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if c == '+' {
            slug.push_str("plus");
        } else {
            slug.push('-');
        }
    }
    format!("hexbins_{}_{slug}.geojson", bin.index)
}

/// ZIP framing bytes added for one stored entry named `file_name`.
#[must_use]
pub fn archive_entry_overhead(file_name: &str) -> u64 {
    ZIP_LOCAL_HEADER_BYTES + ZIP_CENTRAL_HEADER_BYTES + 2 * file_name.len() as u64
}

/// Serialized sizes of the combined document, each grouped document, and
/// an archive holding the documents selected by `group_by`.
///
/// # Errors
///
/// Returns [`AggregateError::Json`] if a document cannot be serialized.
pub fn estimate_sizes(
    features: &[Feature],
    bins: &[Bin],
    metadata: &BundleMetadata,
    group_by: GroupBy,
) -> Result<ExportSizes, AggregateError> {
    let single_file_bytes = serialized_len(&feature_collection(features, metadata)?)?;

    let mut per_group_bytes = Vec::new();
    for (bin, file_name, collection) in grouped_collections(features, bins, metadata)? {
        per_group_bytes.push(GroupSize {
            label: bin.label.clone(),
            file_name,
            bytes: serialized_len(&collection)?,
        });
    }

    let entries = match group_by {
        GroupBy::None => single_file_bytes + archive_entry_overhead(SINGLE_FILE_NAME),
        GroupBy::Bin => per_group_bytes
            .iter()
            .map(|group| group.bytes + archive_entry_overhead(&group.file_name))
            .sum(),
    };

    Ok(ExportSizes {
        group_by,
        single_file_bytes,
        per_group_bytes,
        total_archive_bytes: entries + ZIP_END_RECORD_BYTES,
    })
}

/// Advisories for export documents above `threshold` bytes.
#[must_use]
pub fn size_advisories(sizes: &ExportSizes, threshold: u64) -> Vec<Advisory> {
    let largest = match sizes.group_by {
        GroupBy::None => sizes.single_file_bytes,
        GroupBy::Bin => sizes.total_archive_bytes,
    };

    if largest > threshold {
        vec![Advisory::ExportSizeExceeded {
            bytes: largest,
            threshold,
        }]
    } else {
        Vec::new()
    }
}

fn serialized_len(collection: &FeatureCollection) -> Result<u64, AggregateError> {
    Ok(serde_json::to_vec(collection)?.len() as u64)
}

fn to_geojson_feature(feature: &Feature) -> GeoJsonFeature {
    let ring: Vec<(f64, f64)> = feature
        .boundary
        .iter()
        .map(|[lng, lat]| (*lng, *lat))
        .collect();
    let polygon = Polygon::new(LineString::from(ring), Vec::new());

    let mut properties = JsonObject::new();
    properties.insert(
        "cellId".to_string(),
        JsonValue::from(feature.cell_id.to_string()),
    );
    properties.insert("count".to_string(), JsonValue::from(feature.count));
    properties.insert("binIndex".to_string(), JsonValue::from(feature.bin_index));
    properties.insert(
        "binLabel".to_string(),
        JsonValue::from(feature.bin_label.clone()),
    );
    properties.insert(
        "color".to_string(),
        JsonValue::from(feature.color.to_string()),
    );

    GeoJsonFeature {
        bbox: None,
        geometry: Some(Geometry::new(geojson::Value::from(&polygon))),
        id: Some(geojson::feature::Id::String(feature.cell_id.to_string())),
        properties: Some(properties),
        foreign_members: None,
    }
}
