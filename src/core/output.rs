//! Serializes projected outputs to bytes. Nothing here touches the disk.

use crate::core::buckets::BucketTable;
use crate::domain::model::{
    KeyedRecord, RegionSet, RunReport, ScanStats, Snapshot, TimeSeriesRecord,
};
use crate::utils::error::{EtlError, Result};
use geo::{MultiPolygon, Polygon};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

/// Long-form table: id, year, one column per bucket, total.
pub fn series_csv(
    records: &[TimeSeriesRecord],
    table: &BucketTable,
    id_column: &str,
) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec![id_column.to_string(), "year".to_string()];
    header.extend(table.names().map(str::to_string));
    header.push("total".to_string());
    writer.write_record(&header)?;

    for record in records {
        let mut row = vec![record.region_id.clone(), record.year.to_string()];
        row.extend(record.buckets.iter().map(|(_, value)| value.to_string()));
        row.push(record.total.to_string());
        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|e| EtlError::IoError(e.into_error()))
}

/// FeatureCollection with one feature per region: boundary properties plus
/// the snapshot row, area and density. Regions without a row get nulls.
pub fn snapshot_geojson(
    snapshot: &Snapshot,
    regions: &RegionSet,
    table: &BucketTable,
) -> Result<Vec<u8>> {
    let mut features = Vec::with_capacity(snapshot.entries.len());

    for entry in &snapshot.entries {
        let region = regions
            .get(entry.region_index)
            .ok_or_else(|| EtlError::ProcessingError {
                message: format!("snapshot refers to missing region #{}", entry.region_index),
            })?;

        let mut properties: Map<String, Value> = region.properties.clone();
        properties.insert("year".to_string(), json!(snapshot.year));
        match &entry.record {
            Some(record) => {
                for (name, value) in &record.buckets {
                    properties.insert(name.clone(), json!(value));
                }
                properties.insert("total".to_string(), json!(record.total));
            }
            None => {
                for name in table.names() {
                    properties.insert(name.to_string(), Value::Null);
                }
                properties.insert("total".to_string(), Value::Null);
            }
        }
        properties.insert("area_km2".to_string(), json!(region.area_km2));
        properties.insert("density".to_string(), json!(entry.density));

        features.push(json!({
            "type": "Feature",
            "properties": properties,
            "geometry": geometry_json(&region.geometry),
        }));
    }

    let collection = json!({
        "type": "FeatureCollection",
        "features": features,
    });
    Ok(serde_json::to_vec(&collection)?)
}

fn polygon_rings(polygon: &Polygon<f64>) -> Vec<Vec<[f64; 2]>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(|ring| ring.coords().map(|c| [c.x, c.y]).collect())
        .collect()
}

fn geometry_json(shape: &MultiPolygon<f64>) -> Value {
    match shape.0.as_slice() {
        [] => Value::Null,
        [single] => json!({ "type": "Polygon", "coordinates": polygon_rings(single) }),
        many => json!({
            "type": "MultiPolygon",
            "coordinates": many.iter().map(polygon_rings).collect::<Vec<_>>(),
        }),
    }
}

/// `{ region_id: [record, ...] }` with each record's id under `id_column`.
pub fn nested_json(
    by_region: &BTreeMap<String, Vec<TimeSeriesRecord>>,
    id_column: &str,
) -> Result<Vec<u8>> {
    let keyed: BTreeMap<&str, Vec<KeyedRecord<'_>>> = by_region
        .iter()
        .map(|(id, records)| {
            let records = records.iter().map(|r| r.keyed(id_column)).collect();
            (id.as_str(), records)
        })
        .collect();
    Ok(serde_json::to_vec(&keyed)?)
}

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    pipeline: &'a str,
    generated_at: String,
    rows: usize,
    latest_year: Option<i32>,
    regions: usize,
    groups_aggregated: usize,
    files_used: usize,
    files_skipped: usize,
    scan: &'a ScanStats,
}

pub fn run_summary(pipeline: &str, report: &RunReport, scan: &ScanStats) -> Result<Vec<u8>> {
    let summary = RunSummary {
        pipeline,
        generated_at: chrono::Utc::now().to_rfc3339(),
        rows: report.rows,
        latest_year: report.latest_year,
        regions: report.regions,
        groups_aggregated: report.groups_aggregated,
        files_used: report.files_used,
        files_skipped: report.files_skipped,
        scan,
    };
    Ok(serde_json::to_vec_pretty(&summary)?)
}

/// Bundles already-serialized outputs into one archive.
pub fn bundle_zip(files: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, data) in files {
        zip.start_file::<_, ()>(name.as_str(), FileOptions::default())?;
        zip.write_all(data)?;
    }
    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}
