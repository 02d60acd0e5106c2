use crate::core::buckets::BucketTable;
use crate::core::filename::RasterNameParser;
use crate::domain::model::{FileGroups, GroupKey};
use std::collections::HashMap;
use std::path::PathBuf;

/// Parses, classifies and groups raster paths by (year, bucket).
///
/// Names outside the grammar, bands with no bucket and years outside
/// `years` are counted and dropped. Two files collapsing onto the same
/// (year, sex, band) are both kept and will be summed; that case is logged.
pub fn group_files(
    paths: &[PathBuf],
    parser: &RasterNameParser,
    table: &BucketTable,
    years: &[i32],
) -> FileGroups {
    let mut files = FileGroups::default();
    let mut seen_bands: HashMap<_, PathBuf> = HashMap::new();

    for path in paths {
        files.stats.files_seen += 1;

        let Some(descriptor) = parser.parse(path) else {
            files.stats.unrecognized += 1;
            continue;
        };
        let Some(bucket) = table.classify(descriptor.band) else {
            tracing::debug!("No bucket for band {} in {}", descriptor.band, path.display());
            files.stats.unbucketed += 1;
            continue;
        };
        if !years.contains(&descriptor.year) {
            files.stats.outside_years += 1;
            continue;
        }

        let band_key = (descriptor.year, descriptor.sex, descriptor.band);
        if let Some(previous) = seen_bands.get(&band_key) {
            tracing::warn!(
                "⚠️ {} and {} both cover {} {} in {}; their populations will be summed",
                previous.display(),
                path.display(),
                descriptor.sex,
                descriptor.band,
                descriptor.year
            );
            files.stats.duplicate_bands += 1;
        } else {
            seen_bands.insert(band_key, path.clone());
        }

        files
            .groups
            .entry(GroupKey {
                year: descriptor.year,
                bucket,
            })
            .or_default()
            .push(descriptor);
    }

    tracing::debug!(
        "Scanned {} files: {} unrecognized, {} unbucketed, {} outside target years",
        files.stats.files_seen,
        files.stats.unrecognized,
        files.stats.unbucketed,
        files.stats.outside_years
    );

    files
}
