use crate::core::buckets::BucketTable;
use crate::domain::model::{GroupTotals, RegionSet, TimeSeriesRecord};
use crate::utils::error::{EtlError, Result};
use std::collections::HashMap;

/// Accumulates group totals into (region id, year) cells and flattens them
/// into output rows.
pub struct TimeSeriesBuilder<'a> {
    table: &'a BucketTable,
    years: Vec<i32>,
    cells: HashMap<(String, i32), Vec<f64>>,
}

impl<'a> TimeSeriesBuilder<'a> {
    pub fn new(table: &'a BucketTable, years: &[i32]) -> Self {
        let mut years = years.to_vec();
        years.sort_unstable();
        years.dedup();
        Self {
            table,
            years,
            cells: HashMap::new(),
        }
    }

    /// Adds one group's per-region values into that bucket's slot. Values
    /// only ever grow; several groups may feed the same cell.
    pub fn accumulate(&mut self, regions: &RegionSet, totals: &GroupTotals) -> Result<()> {
        if totals.key.bucket >= self.table.len() {
            return Err(EtlError::ProcessingError {
                message: format!("bucket index {} outside the bucket table", totals.key.bucket),
            });
        }
        if totals.values.len() != regions.len() {
            return Err(EtlError::ProcessingError {
                message: format!(
                    "group {} has {} values for {} regions",
                    totals.key.year,
                    totals.values.len(),
                    regions.len()
                ),
            });
        }

        let width = self.table.len();
        for (region, value) in regions.iter().zip(&totals.values) {
            let cell = self
                .cells
                .entry((region.id.clone(), totals.key.year))
                .or_insert_with(|| vec![0.0; width]);
            cell[totals.key.bucket] += value;
        }
        Ok(())
    }

    /// One row per region and configured year, missing buckets at 0.0.
    /// Rows whose total is not positive had no raster coverage and are
    /// dropped.
    pub fn build(&self, regions: &RegionSet) -> Vec<TimeSeriesRecord> {
        let zeros = vec![0.0; self.table.len()];
        let mut records = Vec::new();

        for region in regions.iter() {
            for &year in &self.years {
                let values = self
                    .cells
                    .get(&(region.id.clone(), year))
                    .unwrap_or(&zeros);
                let total: f64 = values.iter().sum();
                if total <= 0.0 {
                    continue;
                }

                records.push(TimeSeriesRecord {
                    region_id: region.id.clone(),
                    year,
                    buckets: self
                        .table
                        .names()
                        .zip(values)
                        .map(|(name, value)| (name.to_string(), *value))
                        .collect(),
                    total,
                });
            }
        }

        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{AdministrativeRegion, GroupKey};
    use geo::MultiPolygon;

    fn regions(ids: &[&str]) -> RegionSet {
        let regions = ids
            .iter()
            .map(|id| AdministrativeRegion {
                id: id.to_string(),
                area_km2: 10.0,
                geometry: MultiPolygon::new(vec![]),
                properties: serde_json::Map::new(),
            })
            .collect();
        RegionSet::new("id", regions).unwrap()
    }

    fn totals(year: i32, bucket: usize, values: &[f64]) -> GroupTotals {
        GroupTotals {
            key: GroupKey { year, bucket },
            values: values.to_vec(),
            files_used: 1,
            files_skipped: 0,
        }
    }

    #[test]
    fn test_two_region_pre_school_scenario() {
        let table = BucketTable::default();
        let regions = regions(&["A", "B"]);
        let mut builder = TimeSeriesBuilder::new(&table, &[2020]);
        builder.accumulate(&regions, &totals(2020, 0, &[8.0, 2.0])).unwrap();

        let records = builder.build(&regions);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].region_id, "A");
        assert_eq!(records[0].bucket("pre_school"), Some(8.0));
        assert_eq!(records[0].bucket("eighty_plus"), Some(0.0));
        assert_eq!(records[0].total, 8.0);
        assert_eq!(records[1].region_id, "B");
        assert_eq!(records[1].total, 2.0);
        assert_eq!(records[1].buckets.len(), 6);
    }

    #[test]
    fn test_contributions_to_one_cell_add_up() {
        let table = BucketTable::default();
        let regions = regions(&["A"]);
        let mut builder = TimeSeriesBuilder::new(&table, &[2020]);
        builder.accumulate(&regions, &totals(2020, 1, &[5.0])).unwrap();
        builder.accumulate(&regions, &totals(2020, 1, &[3.0])).unwrap();
        builder.accumulate(&regions, &totals(2020, 3, &[10.0])).unwrap();

        let records = builder.build(&regions);
        assert_eq!(records[0].bucket("school_age"), Some(8.0));
        assert_eq!(records[0].total, 18.0);
    }

    #[test]
    fn test_rows_without_coverage_are_dropped() {
        let table = BucketTable::default();
        let regions = regions(&["A", "B"]);
        let mut builder = TimeSeriesBuilder::new(&table, &[2030, 2015, 2020]);
        builder.accumulate(&regions, &totals(2015, 0, &[1.0, 0.0])).unwrap();
        builder.accumulate(&regions, &totals(2020, 0, &[2.0, 4.0])).unwrap();

        let records = builder.build(&regions);
        let keys: Vec<_> = records.iter().map(|r| (r.region_id.as_str(), r.year)).collect();
        // B has only zeros for 2015 and nobody has 2030 rasters
        assert_eq!(keys, vec![("A", 2015), ("A", 2020), ("B", 2020)]);
    }

    #[test]
    fn test_rejects_misshapen_totals() {
        let table = BucketTable::default();
        let regions = regions(&["A", "B"]);
        let mut builder = TimeSeriesBuilder::new(&table, &[2020]);
        assert!(builder.accumulate(&regions, &totals(2020, 0, &[1.0])).is_err());
        assert!(builder.accumulate(&regions, &totals(2020, 6, &[1.0, 1.0])).is_err());
    }
}
