//! Views over the finished series: latest-year snapshot and per-region nesting.

use crate::domain::model::{RegionSet, Snapshot, SnapshotEntry, TimeSeriesRecord};
use std::collections::{BTreeMap, HashMap};

pub fn latest_year(records: &[TimeSeriesRecord]) -> Option<i32> {
    records.iter().map(|r| r.year).max()
}

/// People per km². Undefined for regions without area.
pub fn density(total: f64, area_km2: f64) -> Option<f64> {
    if area_km2 > 0.0 && area_km2.is_finite() {
        Some(total / area_km2)
    } else {
        None
    }
}

/// Left-joins the latest year's rows onto every region. `None` when the
/// series is empty.
pub fn latest_snapshot(records: &[TimeSeriesRecord], regions: &RegionSet) -> Option<Snapshot> {
    let year = latest_year(records)?;
    let rows: HashMap<&str, &TimeSeriesRecord> = records
        .iter()
        .filter(|r| r.year == year)
        .map(|r| (r.region_id.as_str(), r))
        .collect();

    let entries = regions
        .iter()
        .enumerate()
        .map(|(region_index, region)| {
            let record = rows.get(region.id.as_str()).map(|r| (*r).clone());
            let density = record
                .as_ref()
                .and_then(|r| density(r.total, region.area_km2));
            SnapshotEntry {
                region_index,
                record,
                density,
            }
        })
        .collect();

    Some(Snapshot { year, entries })
}

/// Rows grouped by region id, each group ascending by year.
pub fn by_region(records: &[TimeSeriesRecord]) -> BTreeMap<String, Vec<TimeSeriesRecord>> {
    let mut grouped: BTreeMap<String, Vec<TimeSeriesRecord>> = BTreeMap::new();
    for record in records {
        grouped
            .entry(record.region_id.clone())
            .or_default()
            .push(record.clone());
    }
    for rows in grouped.values_mut() {
        rows.sort_by_key(|r| r.year);
    }
    grouped
}
