use clap::Parser;
use popgrid_etl::core::ConfigProvider;
use popgrid_etl::utils::error::ErrorSeverity;
use popgrid_etl::utils::logger::{self, LogFormat};
use popgrid_etl::utils::validation::Validate;
use popgrid_etl::{
    CliConfig, EtlEngine, EtlError, GeoJsonBoundaries, GeoTiffZonalSum, LocalStorage,
    PopulationPipeline, TomlConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // the file may carry the log level, so it is read before logging starts
    let loaded = cli
        .config
        .as_deref()
        .map(|path| TomlConfig::from_file(path))
        .transpose();
    let log_level = loaded
        .as_ref()
        .ok()
        .and_then(Option::as_ref)
        .and_then(TomlConfig::log_level);

    let log_format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    logger::init_logger(cli.verbose, log_format, log_level);

    tracing::info!("Starting popgrid-etl");

    let dry_run = cli.dry_run;
    let outcome = match loaded {
        Ok(Some(mut config)) => {
            tracing::info!(
                "📁 Loaded configuration from: {}",
                cli.config.as_deref().unwrap_or_default()
            );
            config.apply_cli_overrides(&cli);
            let monitor = config.monitoring_enabled();
            run(config, monitor, dry_run).await
        }
        Ok(None) => {
            let monitor = cli.monitor;
            run(cli, monitor, dry_run).await
        }
        Err(e) => {
            eprintln!(
                "❌ Failed to load config file '{}': {}",
                cli.config.as_deref().unwrap_or_default(),
                e
            );
            Err(e)
        }
    };

    if let Err(e) = outcome {
        tracing::error!(
            "❌ Run failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());

        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }

    Ok(())
}

async fn run<C>(config: C, monitor_enabled: bool, dry_run: bool) -> Result<(), EtlError>
where
    C: ConfigProvider + Validate + std::fmt::Debug,
{
    config.validate()?;
    tracing::info!("✅ Configuration validated");
    tracing::debug!("Config: {:?}", config);

    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let bucket_names: Vec<String> = config.buckets().names().map(String::from).collect();
    let storage = LocalStorage::new(config.output_path());
    let boundaries = GeoJsonBoundaries::new(config.boundaries_path());
    let pipeline = PopulationPipeline::new(storage, config, boundaries, GeoTiffZonalSum)?;
    let engine = EtlEngine::new_with_monitoring(pipeline, monitor_enabled);

    if dry_run {
        let extracted = engine.dry_run().await?;
        let scan = &extracted.files.stats;
        println!("🔍 Dry run");
        println!(
            "🗺️ {} regions keyed by '{}'",
            extracted.regions.len(),
            extracted.regions.id_field()
        );
        println!(
            "📂 {} files seen: {} unrecognized, {} unbucketed, {} outside target years, {} duplicate bands",
            scan.files_seen, scan.unrecognized, scan.unbucketed, scan.outside_years, scan.duplicate_bands
        );
        for (key, files) in &extracted.files.groups {
            let bucket = bucket_names
                .get(key.bucket)
                .map(String::as_str)
                .unwrap_or("?");
            println!("   {} {:<16} {} files", key.year, bucket, files.len());
        }
        return Ok(());
    }

    let report = engine.run().await?;

    println!("✅ Aggregation completed successfully!");
    println!("📊 Rows written: {}", report.rows);
    match report.latest_year {
        Some(year) => println!("📅 Latest year: {}", year),
        None => println!("📅 Latest year: none (no data)"),
    }
    if report.files_skipped > 0 {
        println!("⚠️ Rasters skipped: {}", report.files_skipped);
    }
    println!("📁 Output saved to: {}", report.output_path);

    Ok(())
}
