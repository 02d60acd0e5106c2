use crate::core::buckets::BucketTable;
use crate::domain::model::{ExtractResult, RasterErrorPolicy, RegionSet, RunReport, TransformResult, ZonalOptions};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::Path;

pub trait Storage: Send + Sync {
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Output file names relative to the storage root. `None` disables a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFiles {
    pub csv: String,
    pub geojson: String,
    pub json: String,
    pub summary: Option<String>,
    pub archive: Option<String>,
}

impl Default for OutputFiles {
    fn default() -> Self {
        Self {
            csv: "population_timeseries.csv".to_string(),
            geojson: "population_latest.geojson".to_string(),
            json: "population_timeseries.json".to_string(),
            summary: Some("run_summary.json".to_string()),
            archive: None,
        }
    }
}

pub trait ConfigProvider: Send + Sync {
    fn pipeline_name(&self) -> &str;
    fn boundaries_path(&self) -> &str;
    fn raster_dir(&self) -> &str;
    fn output_path(&self) -> &str;
    fn id_fields(&self) -> &[String];
    /// Column header used for the region identifier in tabular output.
    fn id_column(&self) -> &str;
    fn target_years(&self) -> &[i32];
    fn buckets(&self) -> &BucketTable;
    /// File-name prefix before the sex letter; `None` accepts any
    /// three-letter country code.
    fn country_code(&self) -> Option<&str>;
    fn raster_extension(&self) -> &str;
    fn zonal_options(&self) -> ZonalOptions;
    fn concurrency(&self) -> usize;
    fn raster_error_policy(&self) -> RasterErrorPolicy;
    fn output_files(&self) -> OutputFiles;
}

/// Supplies the administrative regions every raster is summed against.
pub trait BoundarySource: Send + Sync {
    fn load_regions(&self, id_fields: &[String]) -> Result<RegionSet>;
}

/// Sums one raster inside every region. The returned vector has exactly one
/// entry per region, in `regions` order; `None` means no valid pixels.
pub trait ZonalSum: Send + Sync {
    fn zonal_sums(
        &self,
        regions: &RegionSet,
        raster: &Path,
        options: &ZonalOptions,
    ) -> Result<Vec<Option<f64>>>;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<ExtractResult>;
    async fn transform(&self, data: ExtractResult) -> Result<TransformResult>;
    async fn load(&self, result: TransformResult) -> Result<RunReport>;
}
