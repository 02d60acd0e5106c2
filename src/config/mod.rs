pub mod cli;
pub mod toml_config;

use crate::core::ConfigProvider;
#[cfg(feature = "cli")]
use crate::core::{buckets::BucketTable, OutputFiles};
#[cfg(feature = "cli")]
use crate::domain::model::{RasterErrorPolicy, ZonalOptions};
use crate::utils::error::Result;
use crate::utils::validation;
use std::sync::OnceLock;
#[cfg(feature = "cli")]
use crate::utils::validation::Validate;
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use serde::{Deserialize, Serialize};

pub const DEFAULT_YEARS: [i32; 4] = [2015, 2020, 2025, 2030];
pub const DEFAULT_ID_FIELDS: [&str; 5] =
    ["ADM3_PCODE", "adm3_pcode", "ADM2_PCODE", "ADM3_EN", "adm3_en"];
pub const DEFAULT_ID_COLUMN: &str = "adm3_id";
pub const DEFAULT_OUTPUT_PATH: &str = "output";
pub const DEFAULT_BOUNDARIES: &str = "data/boundaries.geojson";
pub const DEFAULT_RASTER_DIR: &str = "data/worldpop";
pub const DEFAULT_EXTENSION: &str = "tif";

/// `DEFAULT_ID_FIELDS` as owned strings.
pub fn id_field_candidates() -> &'static [String] {
    static FIELDS: OnceLock<Vec<String>> = OnceLock::new();
    FIELDS.get_or_init(|| DEFAULT_ID_FIELDS.iter().map(|s| s.to_string()).collect())
}

/// Worker count when none is configured.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "popgrid-etl")]
#[command(about = "Aggregate age/sex population rasters into per-region age-bucket time series")]
pub struct CliConfig {
    /// TOML pipeline configuration; the flags below override it
    #[arg(short, long)]
    pub config: Option<String>,

    /// GeoJSON boundary file [default: data/boundaries.geojson]
    #[arg(long)]
    pub boundaries: Option<String>,

    /// Directory holding the rasters [default: data/worldpop]
    #[arg(long)]
    pub raster_dir: Option<String>,

    #[arg(long)]
    pub output_path: Option<String>,

    /// Target years, comma separated
    #[arg(long, value_delimiter = ',')]
    pub years: Vec<i32>,

    /// Count every pixel a region touches, not only pixels centred inside it
    #[arg(long)]
    pub all_touched: bool,

    /// Pixel value treated as missing [default: -99999]
    #[arg(long, allow_hyphen_values = true)]
    pub nodata: Option<f64>,

    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Three-letter file-name prefix; any prefix is accepted when omitted
    #[arg(long)]
    pub country_code: Option<String>,

    /// Raster file extension [default: tif]
    #[arg(long)]
    pub extension: Option<String>,

    /// Candidate identifier properties, first present wins
    /// [default: ADM3_PCODE,adm3_pcode,ADM2_PCODE,ADM3_EN,adm3_en]
    #[arg(long, value_delimiter = ',')]
    pub id_fields: Vec<String>,

    /// Id column name in the outputs [default: adm3_id]
    #[arg(long)]
    pub id_column: Option<String>,

    /// What to do with an unreadable raster [default: skip]
    #[arg(long, value_enum)]
    pub on_raster_error: Option<RasterErrorPolicy>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log CPU and memory per phase")]
    pub monitor: bool,

    /// Group the inputs and report without reading any raster
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long, help = "Emit JSON log lines")]
    pub json_logs: bool,

    #[arg(skip)]
    #[serde(default)]
    pub buckets: BucketTable,
}

#[cfg(feature = "cli")]
impl ConfigProvider for CliConfig {
    fn pipeline_name(&self) -> &str {
        "popgrid-etl"
    }

    fn boundaries_path(&self) -> &str {
        self.boundaries.as_deref().unwrap_or(DEFAULT_BOUNDARIES)
    }

    fn raster_dir(&self) -> &str {
        self.raster_dir.as_deref().unwrap_or(DEFAULT_RASTER_DIR)
    }

    fn output_path(&self) -> &str {
        self.output_path.as_deref().unwrap_or(DEFAULT_OUTPUT_PATH)
    }

    fn id_fields(&self) -> &[String] {
        if self.id_fields.is_empty() {
            id_field_candidates()
        } else {
            &self.id_fields
        }
    }

    fn id_column(&self) -> &str {
        self.id_column.as_deref().unwrap_or(DEFAULT_ID_COLUMN)
    }

    fn target_years(&self) -> &[i32] {
        if self.years.is_empty() {
            &DEFAULT_YEARS[..]
        } else {
            self.years.as_slice()
        }
    }

    fn buckets(&self) -> &BucketTable {
        &self.buckets
    }

    fn country_code(&self) -> Option<&str> {
        self.country_code.as_deref()
    }

    fn raster_extension(&self) -> &str {
        self.extension.as_deref().unwrap_or(DEFAULT_EXTENSION)
    }

    fn zonal_options(&self) -> ZonalOptions {
        let defaults = ZonalOptions::default();
        ZonalOptions {
            all_touched: self.all_touched,
            nodata: self.nodata.unwrap_or(defaults.nodata),
        }
    }

    fn concurrency(&self) -> usize {
        self.concurrency.unwrap_or_else(default_concurrency)
    }

    fn raster_error_policy(&self) -> RasterErrorPolicy {
        self.on_raster_error.unwrap_or_default()
    }

    fn output_files(&self) -> OutputFiles {
        OutputFiles::default()
    }
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_provider(self)
    }
}

/// Checks shared by every configuration source. Runs before any boundary or
/// raster I/O.
pub fn validate_provider<C: ConfigProvider + ?Sized>(config: &C) -> Result<()> {
    validation::validate_path("source.boundaries", config.boundaries_path())?;
    validation::validate_path("source.raster_dir", config.raster_dir())?;
    validation::validate_path("load.output_path", config.output_path())?;
    validation::validate_non_empty_list("source.id_fields", config.id_fields())?;
    validation::validate_unique_strings("source.id_fields", config.id_fields())?;
    validation::validate_non_empty_string("load.id_column", config.id_column())?;
    validation::validate_non_empty_string("source.extension", config.raster_extension())?;
    if let Some(code) = config.country_code() {
        validation::validate_non_empty_string("source.country_code", code)?;
    }
    validation::validate_years("aggregation.years", config.target_years())?;
    validation::validate_positive_number("aggregation.concurrency", config.concurrency(), 1)?;
    config.buckets().check_partition()
}
