use basket_compare::core::report;
use basket_compare::utils::error::ErrorSeverity;
use basket_compare::utils::{logger, validation::Validate};
use basket_compare::{BasketConfig, BasketPipeline, CliConfig, EtlEngine, LocalStorage};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliConfig::parse();

    // 初始化日誌
    if args.json_logs {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting basket-compare");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    // 載入 TOML 配置
    let mut config = match BasketConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    // 應用命令列覆蓋設定
    args.apply_overrides(&mut config);

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");
    display_config_summary(&config);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No backend will be called");
        perform_dry_run(&config);
        return Ok(());
    }

    // 決定監控設定
    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let storage = LocalStorage::new(config.output_path().to_string());
    let pipeline = match BasketPipeline::from_config(storage, config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    let engine = EtlEngine::new_with_monitoring(pipeline, monitor_enabled);

    match engine.run().await {
        Ok(run) => {
            println!("{}", report::render_console_summary(&run.result.outcome));
            println!("📁 Report saved to: {}", run.output_path);
        }
        Err(e) => {
            // 記錄詳細錯誤信息
            tracing::error!(
                "❌ Basket comparison failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            // 輸出用戶友好的錯誤信息
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            // 根據錯誤嚴重程度決定退出碼
            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,      // 警告，但成功
                ErrorSeverity::Medium => 2,   // 重試錯誤
                ErrorSeverity::High => 1,     // 處理錯誤
                ErrorSeverity::Critical => 3, // 系統錯誤
            };

            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}

fn display_config_summary(config: &BasketConfig) {
    tracing::info!("📋 Configuration Summary:");
    tracing::info!("  Run: {}", config.run.name);
    if let Some(description) = &config.run.description {
        tracing::info!("  Description: {}", description);
    }
    tracing::info!(
        "  Items: {} ({} mandatory)",
        config.items.len(),
        config.items.iter().filter(|item| item.mandatory).count()
    );
    tracing::info!("  Backends: {}", config.backends.len());
    tracing::info!("  Concurrent requests: {}", config.concurrent_requests());
    tracing::info!("  Output: {}/{}", config.output_path(), config.archive_name());
    tracing::info!("  Formats: {:?}", config.load.output_formats);
}

fn perform_dry_run(config: &BasketConfig) {
    println!("🔍 Dry run: the following searches would be made");
    for item in &config.items {
        let kind = if item.mandatory { "mandatory" } else { "optional" };
        for backend in &config.backends {
            println!(
                "  - '{}' ({}) via {} {} {}",
                item.term,
                kind,
                backend.name,
                backend.method(),
                backend.endpoint
            );
        }
    }
    println!(
        "📁 Report would be written to: {}/{}",
        config.output_path(),
        config.archive_name()
    );
}
