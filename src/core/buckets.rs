//! Age bucket table and band classification.

use crate::domain::model::AgeBand;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::Validate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Oldest age covered by the table; the open-ended top band is capped here.
pub const MAX_AGE: u8 = 120;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketDefinition {
    pub name: String,
    pub ranges: Vec<AgeBand>,
}

impl BucketDefinition {
    pub fn new(name: &str, ranges: &[(u8, u8)]) -> Self {
        Self {
            name: name.to_string(),
            ranges: ranges.iter().map(|&(lo, hi)| AgeBand::new(lo, hi)).collect(),
        }
    }
}

/// Ordered bucket table. Declaration order is significant: classification
/// returns the first bucket with a sub-range containing the band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketTable {
    buckets: Vec<BucketDefinition>,
}

impl Default for BucketTable {
    fn default() -> Self {
        Self {
            buckets: vec![
                BucketDefinition::new("pre_school", &[(0, 4)]),
                BucketDefinition::new("school_age", &[(5, 9), (10, 14)]),
                BucketDefinition::new("university_age", &[(15, 19), (20, 24)]),
                BucketDefinition::new(
                    "working_age",
                    &[
                        (25, 29),
                        (30, 34),
                        (35, 39),
                        (40, 44),
                        (45, 49),
                        (50, 54),
                        (55, 59),
                    ],
                ),
                BucketDefinition::new("retirement_age", &[(60, 64), (65, 69), (70, 74), (75, 79)]),
                BucketDefinition::new("eighty_plus", &[(80, MAX_AGE)]),
            ],
        }
    }
}

impl BucketTable {
    pub fn new(buckets: Vec<BucketDefinition>) -> Self {
        Self { buckets }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.buckets.iter().map(|b| b.name.as_str())
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.buckets.get(index).map(|b| b.name.as_str())
    }

    pub fn definitions(&self) -> &[BucketDefinition] {
        &self.buckets
    }

    /// Index of the first bucket with a sub-range fully containing `band`.
    pub fn classify(&self, band: AgeBand) -> Option<usize> {
        self.buckets
            .iter()
            .position(|bucket| bucket.ranges.iter().any(|range| range.contains(&band)))
    }

    /// Checks that the sub-ranges tile `[0, MAX_AGE]` exactly.
    pub fn check_partition(&self) -> Result<()> {
        if self.buckets.is_empty() {
            return Err(EtlError::MissingConfigError {
                field: "buckets".to_string(),
            });
        }

        let mut names = HashSet::new();
        let mut ranges = Vec::new();
        for bucket in &self.buckets {
            if bucket.name.trim().is_empty() || !names.insert(bucket.name.as_str()) {
                return Err(partition_error(format!(
                    "bucket name '{}' is empty or repeated",
                    bucket.name
                )));
            }
            if bucket.ranges.is_empty() {
                return Err(partition_error(format!("bucket '{}' has no ranges", bucket.name)));
            }
            for range in &bucket.ranges {
                if range.lo > range.hi {
                    return Err(partition_error(format!(
                        "range {} in '{}' is inverted",
                        range, bucket.name
                    )));
                }
                ranges.push((*range, bucket.name.as_str()));
            }
        }

        ranges.sort_by_key(|(range, _)| (range.lo, range.hi));

        let mut next_age: u16 = 0;
        for (range, name) in &ranges {
            let lo = u16::from(range.lo);
            if lo < next_age {
                return Err(partition_error(format!("range {} in '{}' overlaps another range", range, name)));
            }
            if lo > next_age {
                return Err(partition_error(format!("ages {}-{} are not covered", next_age, lo - 1)));
            }
            next_age = u16::from(range.hi) + 1;
        }

        if next_age != u16::from(MAX_AGE) + 1 {
            return Err(partition_error(format!(
                "ranges end at {} instead of {}",
                next_age.saturating_sub(1),
                MAX_AGE
            )));
        }

        Ok(())
    }
}

impl Validate for BucketTable {
    fn validate(&self) -> Result<()> {
        self.check_partition()
    }
}

fn partition_error(message: String) -> EtlError {
    EtlError::ConfigValidationError {
        field: "buckets".to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_partitions_zero_to_max_age() {
        let table = BucketTable::default();
        assert_eq!(table.len(), 6);
        assert!(table.check_partition().is_ok());

        // every single year of age lands in exactly one bucket
        for age in 0..=MAX_AGE {
            let hits = table
                .definitions()
                .iter()
                .filter(|b| b.ranges.iter().any(|r| r.lo <= age && age <= r.hi))
                .count();
            assert_eq!(hits, 1, "age {age}");
        }
    }

    #[test]
    fn test_classify_canonical_bands() {
        let table = BucketTable::default();
        let name = |lo, hi| table.classify(AgeBand::new(lo, hi)).and_then(|i| table.name(i));

        assert_eq!(name(0, 4), Some("pre_school"));
        assert_eq!(name(10, 14), Some("school_age"));
        assert_eq!(name(20, 24), Some("university_age"));
        assert_eq!(name(55, 59), Some("working_age"));
        assert_eq!(name(75, 79), Some("retirement_age"));
        assert_eq!(name(80, MAX_AGE), Some("eighty_plus"));
    }

    #[test]
    fn test_misaligned_band_is_unbucketed() {
        let table = BucketTable::default();
        assert_eq!(table.classify(AgeBand::new(37, 41)), None);
        // straddles school_age and university_age
        assert_eq!(table.classify(AgeBand::new(12, 16)), None);
    }

    #[test]
    fn test_first_declared_bucket_wins_on_overlap() {
        let table = BucketTable::new(vec![
            BucketDefinition::new("young", &[(0, 10)]),
            BucketDefinition::new("children", &[(0, 14)]),
        ]);
        assert_eq!(table.classify(AgeBand::new(5, 9)), Some(0));
        assert_eq!(table.classify(AgeBand::new(10, 14)), Some(1));
    }

    #[test]
    fn test_partition_rejects_gap() {
        let table = BucketTable::new(vec![
            BucketDefinition::new("young", &[(0, 4)]),
            BucketDefinition::new("old", &[(10, MAX_AGE)]),
        ]);
        let err = table.check_partition().unwrap_err();
        assert!(err.to_string().contains("5-9"));
    }

    #[test]
    fn test_partition_rejects_overlap() {
        let table = BucketTable::new(vec![
            BucketDefinition::new("young", &[(0, 9)]),
            BucketDefinition::new("old", &[(5, MAX_AGE)]),
        ]);
        assert!(table.check_partition().is_err());
    }

    #[test]
    fn test_partition_rejects_short_table_and_duplicate_names() {
        let short = BucketTable::new(vec![BucketDefinition::new("all", &[(0, 99)])]);
        assert!(short.check_partition().is_err());

        let dupes = BucketTable::new(vec![
            BucketDefinition::new("a", &[(0, 59)]),
            BucketDefinition::new("a", &[(60, MAX_AGE)]),
        ]);
        assert!(dupes.check_partition().is_err());

        assert!(BucketTable::new(vec![]).check_partition().is_err());
    }
}
