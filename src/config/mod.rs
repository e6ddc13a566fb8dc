pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "basket-compare")]
#[command(about = "Compare grocery baskets across vendors returned by search backends")]
pub struct CliConfig {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "basket.toml")]
    pub config: String,

    /// Override load.output_path from config
    #[arg(long)]
    pub output_path: Option<String>,

    /// Override extract.concurrent_requests from config
    #[arg(long)]
    pub concurrent_requests: Option<usize>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    pub monitor: Option<bool>,

    /// Show what would be searched without calling any backend
    #[arg(long)]
    pub dry_run: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// 將命令列覆蓋套用到 TOML 配置
    pub fn apply_overrides(&self, config: &mut toml_config::BasketConfig) {
        if let Some(path) = &self.output_path {
            config.load.output_path = path.clone();
            tracing::info!("🔧 Output path overridden to: {}", path);
        }
        if let Some(concurrent) = self.concurrent_requests {
            config.extract.concurrent_requests = Some(concurrent);
            tracing::info!("🔧 Concurrent requests overridden to: {}", concurrent);
        }
    }
}
