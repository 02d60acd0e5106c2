use crate::core::aggregator::ZonalAggregator;
use crate::core::filename::RasterNameParser;
use crate::core::grouper::group_files;
use crate::core::timeseries::TimeSeriesBuilder;
use crate::core::{output, projector};
use crate::core::{BoundarySource, ConfigProvider, Pipeline, Storage, ZonalSum};
use crate::domain::model::{ExtractResult, RunReport, TransformResult};
use crate::utils::error::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Raster directory + boundary file in, bucketed population time series out.
pub struct PopulationPipeline<S, C, B, Z>
where
    S: Storage,
    C: ConfigProvider,
    B: BoundarySource,
    Z: ZonalSum + 'static,
{
    storage: S,
    config: C,
    boundaries: B,
    zonal: Arc<Z>,
    parser: RasterNameParser,
}

impl<S, C, B, Z> PopulationPipeline<S, C, B, Z>
where
    S: Storage,
    C: ConfigProvider,
    B: BoundarySource,
    Z: ZonalSum + 'static,
{
    pub fn new(storage: S, config: C, boundaries: B, zonal: Z) -> Result<Self> {
        let parser = RasterNameParser::new(config.country_code(), config.raster_extension())?;
        Ok(Self {
            storage,
            config,
            boundaries,
            zonal: Arc::new(zonal),
            parser,
        })
    }

    pub fn config(&self) -> &C {
        &self.config
    }
}

/// Files directly under `dir`, symlinks followed, sorted by path.
pub fn scan_raster_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[async_trait::async_trait]
impl<S, C, B, Z> Pipeline for PopulationPipeline<S, C, B, Z>
where
    S: Storage,
    C: ConfigProvider,
    B: BoundarySource,
    Z: ZonalSum + 'static,
{
    async fn extract(&self) -> Result<ExtractResult> {
        tracing::debug!("Loading boundaries from {}", self.config.boundaries_path());
        let regions = self.boundaries.load_regions(self.config.id_fields())?;
        tracing::info!(
            "🗺️ Loaded {} regions keyed by '{}'",
            regions.len(),
            regions.id_field()
        );
        if regions.is_empty() {
            tracing::warn!("⚠️ Boundary file contains no regions; the series will be empty");
        }

        let paths = scan_raster_dir(Path::new(self.config.raster_dir()))?;
        let files = group_files(
            &paths,
            &self.parser,
            self.config.buckets(),
            self.config.target_years(),
        );
        tracing::info!(
            "📂 {} of {} files grouped into {} (year, bucket) groups",
            files.file_count(),
            files.stats.files_seen,
            files.groups.len()
        );

        Ok(ExtractResult {
            regions: Arc::new(regions),
            files,
        })
    }

    async fn transform(&self, data: ExtractResult) -> Result<TransformResult> {
        let aggregator = ZonalAggregator::new(
            Arc::clone(&self.zonal),
            Arc::clone(&data.regions),
            self.config.zonal_options(),
            self.config.concurrency(),
            self.config.raster_error_policy(),
        );
        let totals = aggregator.aggregate_all(&data.files.groups).await?;

        let table = self.config.buckets();
        let mut builder = TimeSeriesBuilder::new(table, self.config.target_years());
        let mut files_used = 0;
        let mut files_skipped = 0;
        for group in &totals {
            builder.accumulate(&data.regions, group)?;
            files_used += group.files_used;
            files_skipped += group.files_skipped;
        }

        let series = builder.build(&data.regions);
        let snapshot = projector::latest_snapshot(&series, &data.regions);
        let by_region = projector::by_region(&series);

        Ok(TransformResult {
            regions: data.regions,
            series,
            snapshot,
            by_region,
            scan: data.files.stats,
            groups_aggregated: totals.len(),
            files_used,
            files_skipped,
        })
    }

    async fn load(&self, result: TransformResult) -> Result<RunReport> {
        let table = self.config.buckets();
        let names = self.config.output_files();

        // serialize everything before the first write
        let mut outputs: Vec<(String, Vec<u8>)> = Vec::new();
        outputs.push((
            names.csv.clone(),
            output::series_csv(&result.series, table, self.config.id_column())?,
        ));
        match &result.snapshot {
            Some(snapshot) => outputs.push((
                names.geojson.clone(),
                output::snapshot_geojson(snapshot, &result.regions, table)?,
            )),
            None => tracing::warn!("⚠️ No rows survived; skipping the latest-year snapshot"),
        }
        outputs.push((
            names.json.clone(),
            output::nested_json(&result.by_region, self.config.id_column())?,
        ));

        let mut report = RunReport {
            output_path: self.config.output_path().to_string(),
            rows: result.series.len(),
            latest_year: result.snapshot.as_ref().map(|s| s.year),
            regions: result.regions.len(),
            groups_aggregated: result.groups_aggregated,
            files_used: result.files_used,
            files_skipped: result.files_skipped,
            written: Vec::new(),
        };

        if let Some(summary) = &names.summary {
            outputs.push((
                summary.clone(),
                output::run_summary(self.config.pipeline_name(), &report, &result.scan)?,
            ));
        }
        if let Some(archive) = &names.archive {
            let bundle = output::bundle_zip(&outputs)?;
            outputs.push((archive.clone(), bundle));
        }

        for (name, data) in &outputs {
            tracing::debug!("Writing {} ({} bytes)", name, data.len());
            self.storage.write_file(name, data).await?;
            report.written.push(name.clone());
        }

        Ok(report)
    }
}
