use crate::core::{Pipeline, TransformResult};
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

/// 一次執行的輸出：報表路徑與比價結果
#[derive(Debug)]
pub struct RunReport {
    pub output_path: String,
    pub result: TransformResult,
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
        tracing::info!("🚀 Starting basket comparison");
        self.monitor.log_stats("start");

        // Extract
        let raw_data = self.pipeline.extract().await?;
        let hit_count: usize = raw_data.iter().map(|r| r.hits.len()).sum();
        tracing::info!("📥 Retrieved {} hits for {} terms", hit_count, raw_data.len());
        self.monitor.log_stats("extract");

        // Transform
        let result = self.pipeline.transform(raw_data).await?;
        tracing::info!(
            "🔄 Compared {} vendors, ranking status: {}",
            result.outcome.vendors.len(),
            result.outcome.ranking.status()
        );
        self.monitor.log_stats("transform");

        // Load 需要保留結果供摘要使用
        let output_path = self.pipeline.load(result.clone()).await?;
        tracing::info!("💾 Report saved to: {}", output_path);
        self.monitor.log_stats("load");
        self.monitor.log_final_stats();

        Ok(RunReport {
            output_path,
            result,
        })
    }
}
