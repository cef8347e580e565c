//! Writing bundles to disk and printing summaries.

use std::path::{Path, PathBuf};

use hexmap_aggregate::export::{SINGLE_FILE_NAME, bundle_collection, grouped_collections};
use hexmap_aggregate_models::{Bundle, ExportSizes, GroupBy};

/// Writes `bundle` as `GeoJSON`.
///
/// With [`GroupBy::None`], `output` is the file to write (or a directory,
/// in which case `hexbins.geojson` is written inside it). With
/// [`GroupBy::Bin`], `output` is a directory that receives one file per
/// non-empty bin. Returns the paths written.
///
/// # Errors
///
/// Returns an error if serialization or any write fails.
pub fn write_bundle(
    bundle: &Bundle,
    output: &Path,
    group_by: GroupBy,
) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    match group_by {
        GroupBy::None => {
            let path = if output.is_dir() {
                output.join(SINGLE_FILE_NAME)
            } else {
                if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                output.to_path_buf()
            };
            let collection = bundle_collection(bundle)?;
            std::fs::write(&path, serde_json::to_vec(&collection)?)?;
            log::info!("Wrote {} features to {}", bundle.features.len(), path.display());
            Ok(vec![path])
        }
        GroupBy::Bin => {
            std::fs::create_dir_all(output)?;
            let mut written = Vec::new();
            for (bin, file_name, collection) in
                grouped_collections(&bundle.features, &bundle.bins, &bundle.metadata)?
            {
                let path = output.join(file_name);
                std::fs::write(&path, serde_json::to_vec(&collection)?)?;
                log::info!(
                    "Wrote {} features for bin {} to {}",
                    collection.features.len(),
                    bin.label,
                    path.display()
                );
                written.push(path);
            }
            Ok(written)
        }
    }
}

/// Prints the binned distribution with each bin's color.
pub fn print_distribution(bundle: &Bundle) {
    println!(
        "{} points in region, {} hexagons at resolution {}",
        bundle.metadata.total_points_out, bundle.metadata.cell_count, bundle.metadata.resolution
    );
    println!();
    println!("{:<16} {:>10}  COLOR", "BIN", "HEXAGONS");
    println!("{}", "-".repeat(36));
    for bucket in &bundle.histograms.binned {
        let color = bundle
            .color_for(&bucket.label)
            .map_or_else(String::new, |c| c.to_string());
        println!("{:<16} {:>10}  {color}", bucket.label, bucket.hexagon_count);
    }
}

/// Prints export size estimates.
pub fn print_sizes(sizes: &ExportSizes) {
    println!("Single file ({SINGLE_FILE_NAME}): {}", format_bytes(sizes.single_file_bytes));
    if !sizes.per_group_bytes.is_empty() {
        println!();
        println!("{:<40} {:>12}", "FILE", "SIZE");
        println!("{}", "-".repeat(53));
        for group in &sizes.per_group_bytes {
            println!("{:<40} {:>12}", group.file_name, format_bytes(group.bytes));
        }
    }
    println!();
    println!(
        "Archive (grouped by {}): {}",
        sizes.group_by,
        format_bytes(sizes.total_archive_bytes)
    );
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;

    let b = bytes as f64;
    if b >= MIB {
        format!("{:.1} MB", b / MIB)
    } else if b >= KIB {
        format!("{:.1} KB", b / KIB)
    } else {
        format!("{bytes} B")
    }
}
