use geo::MultiPolygon;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::utils::error::{EtlError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Female,
    Male,
}

impl Sex {
    pub fn from_letter(letter: &str) -> Option<Self> {
        match letter {
            "f" | "F" => Some(Sex::Female),
            "m" | "M" => Some(Sex::Male),
            _ => None,
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sex::Female => write!(f, "female"),
            Sex::Male => write!(f, "male"),
        }
    }
}

/// Inclusive age interval in years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "[u8; 2]", into = "[u8; 2]")]
pub struct AgeBand {
    pub lo: u8,
    pub hi: u8,
}

impl AgeBand {
    pub const fn new(lo: u8, hi: u8) -> Self {
        Self { lo, hi }
    }

    pub fn contains(&self, other: &AgeBand) -> bool {
        other.lo >= self.lo && other.hi <= self.hi
    }
}

impl From<[u8; 2]> for AgeBand {
    fn from([lo, hi]: [u8; 2]) -> Self {
        Self { lo, hi }
    }
}

impl From<AgeBand> for [u8; 2] {
    fn from(band: AgeBand) -> Self {
        [band.lo, band.hi]
    }
}

impl fmt::Display for AgeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.lo, self.hi)
    }
}

/// Metadata recovered from one raster file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterDescriptor {
    pub path: PathBuf,
    pub year: i32,
    pub band: AgeBand,
    pub sex: Sex,
}

#[derive(Debug, Clone)]
pub struct AdministrativeRegion {
    pub id: String,
    pub area_km2: f64,
    pub geometry: MultiPolygon<f64>,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// Read-only region set shared by every aggregation task. Iteration order is
/// the order zonal results are expected in.
#[derive(Debug, Clone)]
pub struct RegionSet {
    id_field: String,
    regions: Vec<AdministrativeRegion>,
}

impl RegionSet {
    pub fn new(id_field: impl Into<String>, regions: Vec<AdministrativeRegion>) -> Result<Self> {
        let id_field = id_field.into();
        let mut seen = std::collections::HashSet::new();
        for region in &regions {
            if !seen.insert(region.id.as_str()) {
                return Err(EtlError::DuplicateRegionId {
                    id: region.id.clone(),
                    field: id_field,
                });
            }
        }
        Ok(Self { id_field, regions })
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AdministrativeRegion> {
        self.regions.iter()
    }

    pub fn get(&self, index: usize) -> Option<&AdministrativeRegion> {
        self.regions.get(index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZonalOptions {
    /// Count every pixel touched by a region instead of only pixels whose
    /// centre falls inside it.
    pub all_touched: bool,
    pub nodata: f64,
}

impl Default for ZonalOptions {
    fn default() -> Self {
        Self {
            all_touched: false,
            nodata: -99999.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum RasterErrorPolicy {
    #[default]
    Skip,
    Abort,
}

/// (year, bucket index into the configured table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub year: i32,
    pub bucket: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub files_seen: usize,
    pub unrecognized: usize,
    pub unbucketed: usize,
    pub outside_years: usize,
    pub duplicate_bands: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FileGroups {
    pub groups: BTreeMap<GroupKey, Vec<RasterDescriptor>>,
    pub stats: ScanStats,
}

impl FileGroups {
    pub fn file_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }
}

/// Per-region population for one (year, bucket), in region order.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupTotals {
    pub key: GroupKey,
    pub values: Vec<f64>,
    pub files_used: usize,
    pub files_skipped: usize,
}

/// One flattened output row. `buckets` follows the table's declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesRecord {
    pub region_id: String,
    pub year: i32,
    pub buckets: Vec<(String, f64)>,
    pub total: f64,
}

impl TimeSeriesRecord {
    pub fn bucket(&self, name: &str) -> Option<f64> {
        self.buckets
            .iter()
            .find(|(bucket, _)| bucket == name)
            .map(|(_, value)| *value)
    }

    pub fn keyed<'a>(&'a self, id_key: &'a str) -> KeyedRecord<'a> {
        KeyedRecord {
            id_key,
            record: self,
        }
    }
}

/// Serializable view of a record with the region id under a chosen key.
#[derive(Debug, Clone, Copy)]
pub struct KeyedRecord<'a> {
    id_key: &'a str,
    record: &'a TimeSeriesRecord,
}

impl Serialize for KeyedRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let record = self.record;
        let mut map = serializer.serialize_map(Some(record.buckets.len() + 3))?;
        map.serialize_entry(self.id_key, &record.region_id)?;
        map.serialize_entry("year", &record.year)?;
        for (name, value) in &record.buckets {
            map.serialize_entry(name, value)?;
        }
        map.serialize_entry("total", &record.total)?;
        map.end()
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub region_index: usize,
    pub record: Option<TimeSeriesRecord>,
    pub density: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub year: i32,
    pub entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone)]
pub struct ExtractResult {
    pub regions: Arc<RegionSet>,
    pub files: FileGroups,
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub regions: Arc<RegionSet>,
    pub series: Vec<TimeSeriesRecord>,
    pub snapshot: Option<Snapshot>,
    pub by_region: BTreeMap<String, Vec<TimeSeriesRecord>>,
    pub scan: ScanStats,
    pub groups_aggregated: usize,
    pub files_used: usize,
    pub files_skipped: usize,
}

/// What a finished run reports back to the operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub output_path: String,
    pub rows: usize,
    pub latest_year: Option<i32>,
    pub regions: usize,
    pub groups_aggregated: usize,
    pub files_used: usize,
    pub files_skipped: usize,
    pub written: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(id: &str) -> AdministrativeRegion {
        AdministrativeRegion {
            id: id.to_string(),
            area_km2: 1.0,
            geometry: MultiPolygon::new(vec![]),
            properties: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_region_set_rejects_duplicate_ids() {
        let err = RegionSet::new("ADM3_PCODE", vec![region("YE01"), region("YE01")]).unwrap_err();
        assert!(matches!(err, EtlError::DuplicateRegionId { ref id, .. } if id == "YE01"));
    }

    #[test]
    fn test_record_serializes_buckets_in_order() {
        let record = TimeSeriesRecord {
            region_id: "A".to_string(),
            year: 2020,
            buckets: vec![("pre_school".to_string(), 8.0), ("school_age".to_string(), 0.0)],
            total: 8.0,
        };
        let json = serde_json::to_string(&record.keyed("adm3_id")).unwrap();
        assert_eq!(
            json,
            r#"{"adm3_id":"A","year":2020,"pre_school":8.0,"school_age":0.0,"total":8.0}"#
        );
    }

    #[test]
    fn test_age_band_contains() {
        let working = AgeBand::new(35, 39);
        assert!(working.contains(&AgeBand::new(35, 39)));
        assert!(!working.contains(&AgeBand::new(37, 41)));
    }
}
