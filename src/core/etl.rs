use crate::core::Pipeline;
use crate::domain::model::{ExtractResult, RunReport};
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub async fn run(&self) -> Result<RunReport> {
        tracing::info!("🚀 Starting population aggregation");

        let extracted = self.pipeline.extract().await?;
        self.monitor.log_phase("Extract");

        tracing::info!("🧮 Aggregating {} groups", extracted.files.groups.len());
        let transformed = self.pipeline.transform(extracted).await?;
        self.monitor.log_phase("Aggregate");

        let report = self.pipeline.load(transformed).await?;
        self.monitor.log_phase("Load");
        self.monitor.log_final_stats();

        match report.latest_year {
            Some(year) => tracing::info!(
                "✅ Wrote {} rows; latest year {} selected for the snapshot",
                report.rows,
                year
            ),
            None => tracing::info!("✅ Wrote {} rows; no year had data", report.rows),
        }

        Ok(report)
    }

    /// Extract only: boundaries are loaded and rasters grouped, nothing is
    /// read from the rasters and nothing is written.
    pub async fn dry_run(&self) -> Result<ExtractResult> {
        tracing::info!("🔍 Dry run: scanning inputs only");
        self.pipeline.extract().await
    }
}
