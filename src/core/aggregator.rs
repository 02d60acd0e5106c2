use crate::domain::model::{
    GroupKey, GroupTotals, RasterDescriptor, RasterErrorPolicy, RegionSet, ZonalOptions,
};
use crate::domain::ports::ZonalSum;
use crate::utils::error::{EtlError, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Runs the zonal-sum backend over every (year, bucket) group.
///
/// Each group is one blocking task; at most `concurrency` run at once.
/// Results come back in group-key order regardless of completion order.
/// Once a group fails no further groups are dispatched.
pub struct ZonalAggregator<Z: ZonalSum + 'static> {
    zonal: Arc<Z>,
    regions: Arc<RegionSet>,
    options: ZonalOptions,
    concurrency: usize,
    policy: RasterErrorPolicy,
}

impl<Z: ZonalSum + 'static> ZonalAggregator<Z> {
    pub fn new(
        zonal: Arc<Z>,
        regions: Arc<RegionSet>,
        options: ZonalOptions,
        concurrency: usize,
        policy: RasterErrorPolicy,
    ) -> Self {
        Self {
            zonal,
            regions,
            options,
            concurrency: concurrency.max(1),
            policy,
        }
    }

    pub async fn aggregate_all(
        &self,
        groups: &BTreeMap<GroupKey, Vec<RasterDescriptor>>,
    ) -> Result<Vec<GroupTotals>> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let failed = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(groups.len());

        for (key, descriptors) in groups {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| EtlError::WorkerError {
                    message: e.to_string(),
                })?;
            if failed.load(Ordering::Acquire) {
                tracing::debug!("🛑 A group failed; not dispatching the remaining groups");
                break;
            }

            let failed = Arc::clone(&failed);
            let zonal = Arc::clone(&self.zonal);
            let regions = Arc::clone(&self.regions);
            let descriptors = descriptors.clone();
            let options = self.options;
            let policy = self.policy;
            let key = *key;

            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let result =
                    aggregate_group(zonal.as_ref(), &regions, key, &descriptors, &options, policy);
                if result.is_err() {
                    failed.store(true, Ordering::Release);
                }
                result
            }));
        }

        let mut totals = Vec::with_capacity(handles.len());
        for handle in handles {
            let group = handle.await.map_err(|e| EtlError::WorkerError {
                message: e.to_string(),
            })??;
            tracing::debug!(
                "Aggregated {} bucket {} from {} files",
                group.key.year,
                group.key.bucket,
                group.files_used
            );
            totals.push(group);
        }

        Ok(totals)
    }
}

/// Sums one group's files region by region. Missing, non-finite and negative
/// per-region sums contribute nothing.
pub fn aggregate_group<Z: ZonalSum + ?Sized>(
    zonal: &Z,
    regions: &RegionSet,
    key: GroupKey,
    descriptors: &[RasterDescriptor],
    options: &ZonalOptions,
    policy: RasterErrorPolicy,
) -> Result<GroupTotals> {
    let mut values = vec![0.0; regions.len()];
    let mut files_used = 0;
    let mut files_skipped = 0;

    for descriptor in descriptors {
        let sums = match zonal.zonal_sums(regions, &descriptor.path, options) {
            Ok(sums) => sums,
            Err(e) if e.is_skippable_raster_error() && policy == RasterErrorPolicy::Skip => {
                tracing::warn!("⚠️ Skipping raster: {}", e);
                files_skipped += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        if sums.len() != regions.len() {
            return Err(EtlError::ZonalShapeMismatch {
                path: descriptor.path.clone(),
                expected: regions.len(),
                actual: sums.len(),
            });
        }

        for (total, sum) in values.iter_mut().zip(sums) {
            *total += contribution(sum);
        }
        files_used += 1;
    }

    Ok(GroupTotals {
        key,
        values,
        files_used,
        files_skipped,
    })
}

fn contribution(sum: Option<f64>) -> f64 {
    match sum {
        Some(value) if value.is_finite() && value > 0.0 => value,
        _ => 0.0,
    }
}
