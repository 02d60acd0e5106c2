use crate::config::{
    default_concurrency, id_field_candidates, DEFAULT_EXTENSION, DEFAULT_ID_COLUMN, DEFAULT_YEARS,
};
use crate::core::buckets::BucketTable;
use crate::core::{ConfigProvider, OutputFiles};
use crate::domain::model::{RasterErrorPolicy, ZonalOptions};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub pipeline: PipelineConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub buckets: BucketTable,
    pub load: LoadConfig,
    pub monitoring: Option<MonitoringConfig>,
    pub error_handling: Option<ErrorHandlingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub boundaries: String,
    pub raster_dir: String,
    #[serde(default = "default_id_fields")]
    pub id_fields: Vec<String>,
    pub country_code: Option<String>,
    #[serde(default = "default_extension")]
    pub extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    #[serde(default = "default_years")]
    pub years: Vec<i32>,
    #[serde(default)]
    pub all_touched: bool,
    #[serde(default = "default_nodata")]
    pub nodata: f64,
    pub concurrency: Option<usize>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            years: default_years(),
            all_touched: false,
            nodata: default_nodata(),
            concurrency: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub output_path: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    pub filenames: Option<FilenameConfig>,
    pub compression: Option<CompressionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilenameConfig {
    pub csv: Option<String>,
    pub geojson: Option<String>,
    pub json: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorHandlingConfig {
    #[serde(default)]
    pub on_raster_error: RasterErrorPolicy,
}

fn default_id_fields() -> Vec<String> {
    id_field_candidates().to_vec()
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

fn default_years() -> Vec<i32> {
    DEFAULT_YEARS.to_vec()
}

fn default_nodata() -> f64 {
    ZonalOptions::default().nodata
}

fn default_id_column() -> String {
    DEFAULT_ID_COLUMN.to_string()
}

impl TomlConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value; unset variables are left
    /// as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ProcessingError {
            message: format!("env substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("pipeline.name", &self.pipeline.name)?;
        if let Some(level) = self.log_level() {
            validation::validate_log_level("monitoring.log_level", level)?;
        }
        if let Some(compression) = self.load.compression.as_ref().filter(|c| c.enabled) {
            validation::validate_path("load.compression.filename", &compression.filename)?;
        }
        crate::config::validate_provider(self)
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn log_level(&self) -> Option<&str> {
        self.monitoring.as_ref().and_then(|m| m.log_level.as_deref())
    }

    /// Flags given on the command line win over the file.
    #[cfg(feature = "cli")]
    pub fn apply_cli_overrides(&mut self, cli: &crate::config::CliConfig) {
        if let Some(boundaries) = &cli.boundaries {
            self.source.boundaries = boundaries.clone();
            tracing::info!("🔧 Boundaries overridden to: {}", boundaries);
        }
        if let Some(raster_dir) = &cli.raster_dir {
            self.source.raster_dir = raster_dir.clone();
            tracing::info!("🔧 Raster directory overridden to: {}", raster_dir);
        }
        if !cli.id_fields.is_empty() {
            self.source.id_fields = cli.id_fields.clone();
            tracing::info!("🔧 Id fields overridden to: {:?}", cli.id_fields);
        }
        if let Some(code) = &cli.country_code {
            self.source.country_code = Some(code.clone());
            tracing::info!("🔧 Country code overridden to: {}", code);
        }
        if let Some(extension) = &cli.extension {
            self.source.extension = extension.clone();
            tracing::info!("🔧 Extension overridden to: {}", extension);
        }
        if !cli.years.is_empty() {
            self.aggregation.years = cli.years.clone();
            tracing::info!("🔧 Years overridden to: {:?}", cli.years);
        }
        if cli.all_touched {
            self.aggregation.all_touched = true;
            tracing::info!("🔧 all_touched enabled from the command line");
        }
        if let Some(nodata) = cli.nodata {
            self.aggregation.nodata = nodata;
            tracing::info!("🔧 Nodata overridden to: {}", nodata);
        }
        if let Some(concurrency) = cli.concurrency {
            self.aggregation.concurrency = Some(concurrency);
            tracing::info!("🔧 Concurrency overridden to: {}", concurrency);
        }
        if let Some(output_path) = &cli.output_path {
            self.load.output_path = output_path.clone();
            tracing::info!("🔧 Output path overridden to: {}", output_path);
        }
        if let Some(id_column) = &cli.id_column {
            self.load.id_column = id_column.clone();
            tracing::info!("🔧 Id column overridden to: {}", id_column);
        }
        if let Some(policy) = cli.on_raster_error {
            self.error_handling = Some(ErrorHandlingConfig {
                on_raster_error: policy,
            });
            tracing::info!("🔧 Raster error policy overridden to: {:?}", policy);
        }
        if cli.monitor {
            let monitoring = self.monitoring.get_or_insert(MonitoringConfig {
                enabled: true,
                log_level: None,
            });
            monitoring.enabled = true;
        }
    }
}

impl ConfigProvider for TomlConfig {
    fn pipeline_name(&self) -> &str {
        &self.pipeline.name
    }

    fn boundaries_path(&self) -> &str {
        &self.source.boundaries
    }

    fn raster_dir(&self) -> &str {
        &self.source.raster_dir
    }

    fn output_path(&self) -> &str {
        &self.load.output_path
    }

    fn id_fields(&self) -> &[String] {
        &self.source.id_fields
    }

    fn id_column(&self) -> &str {
        &self.load.id_column
    }

    fn target_years(&self) -> &[i32] {
        &self.aggregation.years
    }

    fn buckets(&self) -> &BucketTable {
        &self.buckets
    }

    fn country_code(&self) -> Option<&str> {
        self.source.country_code.as_deref()
    }

    fn raster_extension(&self) -> &str {
        &self.source.extension
    }

    fn zonal_options(&self) -> ZonalOptions {
        ZonalOptions {
            all_touched: self.aggregation.all_touched,
            nodata: self.aggregation.nodata,
        }
    }

    fn concurrency(&self) -> usize {
        self.aggregation
            .concurrency
            .unwrap_or_else(default_concurrency)
    }

    fn raster_error_policy(&self) -> RasterErrorPolicy {
        self.error_handling
            .as_ref()
            .map(|e| e.on_raster_error)
            .unwrap_or_default()
    }

    fn output_files(&self) -> OutputFiles {
        let mut files = OutputFiles::default();
        if let Some(names) = &self.load.filenames {
            if let Some(csv) = &names.csv {
                files.csv = csv.clone();
            }
            if let Some(geojson) = &names.geojson {
                files.geojson = geojson.clone();
            }
            if let Some(json) = &names.json {
                files.json = json.clone();
            }
            if let Some(summary) = &names.summary {
                files.summary = (!summary.is_empty()).then(|| summary.clone());
            }
        }
        files.archive = self
            .load
            .compression
            .as_ref()
            .filter(|c| c.enabled)
            .map(|c| c.filename.clone());
        files
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
[pipeline]
name = "yemen-adm3"

[source]
boundaries = "data/yemen_adm3.geojson"
raster_dir = "data/worldpop"

[load]
output_path = "./output"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = TomlConfig::from_toml_str(MINIMAL).unwrap();

        assert_eq!(config.pipeline_name(), "yemen-adm3");
        assert_eq!(config.target_years(), &[2015, 2020, 2025, 2030]);
        assert_eq!(config.id_fields()[0], "ADM3_PCODE");
        assert_eq!(config.id_column(), "adm3_id");
        assert_eq!(config.raster_extension(), "tif");
        assert_eq!(config.zonal_options(), ZonalOptions::default());
        assert_eq!(config.raster_error_policy(), RasterErrorPolicy::Skip);
        assert_eq!(config.buckets().len(), 6);
        assert_eq!(config.output_files(), OutputFiles::default());
        assert!(!config.monitoring_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[pipeline]
name = "custom"
description = "three buckets"
version = "1.0"

[source]
boundaries = "b.geojson"
raster_dir = "rasters"
id_fields = ["code"]
country_code = "yem"

[aggregation]
years = [2020, 2025]
all_touched = true
nodata = -1.0
concurrency = 3

[[buckets]]
name = "children"
ranges = [[0, 14]]

[[buckets]]
name = "adults"
ranges = [[15, 64]]

[[buckets]]
name = "seniors"
ranges = [[65, 120]]

[load]
output_path = "out"
id_column = "code"
filenames = { csv = "series.csv", summary = "" }
compression = { enabled = true, filename = "bundle.zip" }

[error_handling]
on_raster_error = "abort"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.target_years(), &[2020, 2025]);
        assert_eq!(config.concurrency(), 3);
        assert_eq!(config.country_code(), Some("yem"));
        assert!(config.zonal_options().all_touched);
        assert_eq!(config.raster_error_policy(), RasterErrorPolicy::Abort);
        let names: Vec<&str> = config.buckets().names().collect();
        assert_eq!(names, vec!["children", "adults", "seniors"]);

        let files = config.output_files();
        assert_eq!(files.csv, "series.csv");
        assert_eq!(files.geojson, "population_latest.geojson");
        assert_eq!(files.summary, None);
        assert_eq!(files.archive.as_deref(), Some("bundle.zip"));
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("POPGRID_TEST_RASTER_DIR", "/srv/worldpop");

        let toml_content = r#"
[pipeline]
name = "test"

[source]
boundaries = "b.geojson"
raster_dir = "${POPGRID_TEST_RASTER_DIR}"

[load]
output_path = "${POPGRID_TEST_UNSET_VAR}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.raster_dir(), "/srv/worldpop");
        assert_eq!(config.output_path(), "${POPGRID_TEST_UNSET_VAR}");

        std::env::remove_var("POPGRID_TEST_RASTER_DIR");
    }

    #[test]
    fn test_bucket_gap_fails_validation() {
        let toml_content = format!(
            "{}\n[[buckets]]\nname = \"young\"\nranges = [[0, 14]]\n\n[[buckets]]\nname = \"old\"\nranges = [[20, 120]]\n",
            MINIMAL
        );
        let config = TomlConfig::from_toml_str(&toml_content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_year_outside_grammar_fails_validation() {
        let toml_content = format!("{}\n[aggregation]\nyears = [1999]\n", MINIMAL);
        let config = TomlConfig::from_toml_str(&toml_content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = TomlConfig::from_toml_str("[pipeline\nname = 1").unwrap_err();
        assert!(matches!(err, EtlError::ConfigValidationError { .. }));
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_cli_overrides() {
        use clap::Parser;

        let mut config = TomlConfig::from_toml_str(MINIMAL).unwrap();
        let cli = crate::config::CliConfig::parse_from([
            "popgrid-etl",
            "--years",
            "2020",
            "--all-touched",
            "--concurrency",
            "2",
            "--output-path",
            "elsewhere",
            "--monitor",
        ]);
        config.apply_cli_overrides(&cli);

        assert_eq!(config.target_years(), &[2020]);
        assert!(config.zonal_options().all_touched);
        assert_eq!(config.concurrency(), 2);
        assert_eq!(config.output_path(), "elsewhere");
        assert!(config.monitoring_enabled());
        // untouched flags keep the file's values
        assert_eq!(config.boundaries_path(), "data/yemen_adm3.geojson");
        assert_eq!(config.raster_error_policy(), RasterErrorPolicy::Skip);
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_cli_overrides_source_and_policy_flags() {
        use clap::Parser;

        let mut config = TomlConfig::from_toml_str(MINIMAL).unwrap();
        let cli = crate::config::CliConfig::parse_from([
            "popgrid-etl",
            "--boundaries",
            "other.geojson",
            "--raster-dir",
            "/mnt/worldpop",
            "--id-fields",
            "code,name",
            "--id-column",
            "code",
            "--country-code",
            "yem",
            "--extension",
            "tiff",
            "--nodata",
            "-1",
            "--on-raster-error",
            "abort",
        ]);
        config.apply_cli_overrides(&cli);

        assert_eq!(config.boundaries_path(), "other.geojson");
        assert_eq!(config.raster_dir(), "/mnt/worldpop");
        assert_eq!(config.id_fields(), &["code".to_string(), "name".to_string()]);
        assert_eq!(config.id_column(), "code");
        assert_eq!(config.country_code(), Some("yem"));
        assert_eq!(config.raster_extension(), "tiff");
        assert_eq!(config.zonal_options().nodata, -1.0);
        assert_eq!(config.raster_error_policy(), RasterErrorPolicy::Abort);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_level_is_read_and_checked() {
        let with_level = format!("{}\n[monitoring]\nenabled = false\nlog_level = \"warn\"\n", MINIMAL);
        let config = TomlConfig::from_toml_str(&with_level).unwrap();
        assert_eq!(config.log_level(), Some("warn"));
        assert!(config.validate().is_ok());

        let bad = format!("{}\n[monitoring]\nenabled = false\nlog_level = \"loud\"\n", MINIMAL);
        let config = TomlConfig::from_toml_str(&bad).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.pipeline.name, "yemen-adm3");
    }
}
