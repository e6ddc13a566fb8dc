use crate::adapters::HttpSearchBackend;
use crate::config::toml_config::BasketConfig;
use crate::core::engine::BasketEngine;
use crate::core::report::{self, ITEMS_CSV, RANKING_CSV, REPORT_JSON};
use crate::core::{Pipeline, SearchBackend, Storage, TermResults, TransformResult};
use crate::domain::model::RawHit;
use crate::utils::error::Result;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

/// 依 TOML 配置執行一次比價：搜尋 → 比較 → 打包報表
pub struct BasketPipeline<S: Storage> {
    storage: S,
    config: BasketConfig,
    engine: BasketEngine,
    backends: Vec<Box<dyn SearchBackend>>,
}

impl<S: Storage> BasketPipeline<S> {
    /// 為每個 `[[backends]]` 建立 HTTP 後端
    pub fn from_config(storage: S, config: BasketConfig) -> Result<Self> {
        let backends = config
            .backends
            .iter()
            .cloned()
            .map(|backend| Box::new(HttpSearchBackend::new(backend)) as Box<dyn SearchBackend>)
            .collect();
        Self::with_backends(storage, config, backends)
    }

    pub fn with_backends(
        storage: S,
        config: BasketConfig,
        backends: Vec<Box<dyn SearchBackend>>,
    ) -> Result<Self> {
        let engine = BasketEngine::new(config.items.clone())?;
        Ok(Self {
            storage,
            config,
            engine,
            backends,
        })
    }

    pub fn config(&self) -> &BasketConfig {
        &self.config
    }

    async fn search_one(&self, term: &str, backend: &dyn SearchBackend) -> Vec<RawHit> {
        match backend.search(term).await {
            Ok(hits) => hits,
            Err(e) => {
                // 單一後端失敗只視為零筆結果
                tracing::warn!(
                    "⚠️ Backend '{}' failed for '{}': {} ({})",
                    backend.name(),
                    term,
                    e,
                    e.recovery_suggestion()
                );
                Vec::new()
            }
        }
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for BasketPipeline<S> {
    async fn extract(&self) -> Result<Vec<TermResults>> {
        let items = self.engine.items();
        // (item 索引, 後端索引)；future 內再向 self 借用
        let units: Vec<(usize, usize)> = (0..items.len())
            .flat_map(|item| (0..self.backends.len()).map(move |backend| (item, backend)))
            .collect();

        let concurrency = self.config.concurrent_requests().max(1);
        tracing::info!(
            "🔎 Searching {} terms across {} backends ({} requests, {} concurrent)",
            items.len(),
            self.backends.len(),
            units.len(),
            concurrency
        );

        // buffered 保持輸入順序，結果依 term、後端的配置順序排列
        let responses: Vec<(usize, Vec<RawHit>)> = stream::iter(units)
            .map(|(item, backend)| {
                async move {
                    let term = items[item].term.as_str();
                    let hits = self.search_one(term, self.backends[backend].as_ref()).await;
                    (item, hits)
                }
                .boxed()
            })
            .buffered(concurrency)
            .collect()
            .await;

        let mut results: Vec<TermResults> = items
            .iter()
            .map(|item| TermResults::new(item.term.clone(), Vec::new()))
            .collect();
        for (item, hits) in responses {
            results[item].hits.extend(hits);
        }

        for entry in &results {
            tracing::debug!("'{}': {} hits", entry.term, entry.hits.len());
        }
        Ok(results)
    }

    async fn transform(&self, data: Vec<TermResults>) -> Result<TransformResult> {
        let outcome = self.engine.compare(&data)?;

        if outcome.rejected_hits > 0 {
            tracing::warn!("⚠️ Rejected {} malformed hits", outcome.rejected_hits);
        }

        let ranking_csv = report::render_ranking_csv(&outcome)?;
        let items_csv = report::render_items_csv(&outcome)?;
        let json_output = report::render_json(&self.config.run.name, &outcome)?;

        Ok(TransformResult {
            outcome,
            ranking_csv,
            items_csv,
            json_output,
        })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        let archive_name = self.config.archive_name();
        let output_path = format!("{}/{}", self.config.output_path(), archive_name);

        let zip_data = {
            let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

            if self.config.wants_format("csv") {
                zip.start_file::<_, ()>(RANKING_CSV, FileOptions::default())?;
                zip.write_all(result.ranking_csv.as_bytes())?;

                zip.start_file::<_, ()>(ITEMS_CSV, FileOptions::default())?;
                zip.write_all(result.items_csv.as_bytes())?;
            }

            if self.config.wants_format("json") {
                zip.start_file::<_, ()>(REPORT_JSON, FileOptions::default())?;
                zip.write_all(result.json_output.as_bytes())?;
            }

            let cursor = zip.finish()?;
            cursor.into_inner()
        };

        tracing::debug!("Writing ZIP file ({} bytes) to storage", zip_data.len());
        self.storage.write_file(archive_name, &zip_data).await?;

        Ok(output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::RawPrice;
    use crate::utils::error::EtlError;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        fn new() -> Self {
            Self {
                files: Arc::new(Mutex::new(HashMap::new())),
            }
        }

        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned()
        }
    }

    impl Storage for MockStorage {
        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }
    }

    /// 依 term 回傳固定結果；fail 時一律回錯
    struct MockBackend {
        name: String,
        hits: HashMap<String, Vec<RawHit>>,
        fail: bool,
    }

    impl MockBackend {
        fn new(name: &str, hits: Vec<(&str, RawHit)>) -> Self {
            let mut by_term: HashMap<String, Vec<RawHit>> = HashMap::new();
            for (term, hit) in hits {
                by_term.entry(term.to_string()).or_default().push(hit);
            }
            Self {
                name: name.to_string(),
                hits: by_term,
                fail: false,
            }
        }

        fn failing(name: &str) -> Self {
            Self {
                name: name.to_string(),
                hits: HashMap::new(),
                fail: true,
            }
        }
    }

    #[async_trait::async_trait]
    impl SearchBackend for MockBackend {
        fn name(&self) -> &str {
            &self.name
        }

        async fn search(&self, term: &str) -> Result<Vec<RawHit>> {
            if self.fail {
                return Err(EtlError::ProcessingError {
                    message: "backend down".to_string(),
                });
            }
            Ok(self.hits.get(term).cloned().unwrap_or_default())
        }
    }

    /// 固定延遲後回傳同一個店家的結果
    struct DelayedBackend {
        vendor: String,
        delay: std::time::Duration,
    }

    #[async_trait::async_trait]
    impl SearchBackend for DelayedBackend {
        fn name(&self) -> &str {
            &self.vendor
        }

        async fn search(&self, term: &str) -> Result<Vec<RawHit>> {
            tokio::time::sleep(self.delay).await;
            Ok(vec![hit(&self.vendor, term, "5.00")])
        }
    }

    fn hit(vendor: &str, name: &str, price: &str) -> RawHit {
        RawHit::new(vendor, name, RawPrice::Text(price.to_string()))
    }

    const CONFIG: &str = r#"
[run]
name = "pipeline-test"

[[items]]
term = "milk"

[[items]]
term = "cocoa"
mandatory = false

[[backends]]
name = "unused"
endpoint = "http://localhost/search"

[backends.fields]
vendor_id = "vendor"
name = "name"
price = "price"

[extract]
concurrent_requests = 2

[load]
output_path = "test_output"
output_formats = ["csv", "json"]
"#;

    fn pipeline(storage: MockStorage) -> BasketPipeline<MockStorage> {
        let config = BasketConfig::from_toml_str(CONFIG).unwrap();
        let backends: Vec<Box<dyn SearchBackend>> = vec![
            Box::new(MockBackend::new(
                "first",
                vec![
                    ("milk", hit("a", "milk 1L", "6.90")),
                    ("cocoa", hit("b", "cocoa", "12.00")),
                ],
            )),
            Box::new(MockBackend::failing("broken")),
            Box::new(MockBackend::new(
                "second",
                vec![("milk", hit("b", "milk", "7.10"))],
            )),
        ];
        BasketPipeline::with_backends(storage, config, backends).unwrap()
    }

    #[tokio::test]
    async fn test_extract_merges_backends_in_order_and_tolerates_failures() {
        let pipeline = pipeline(MockStorage::new());

        let results = pipeline.extract().await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].term, "milk");
        let vendors: Vec<_> = results[0].hits.iter().map(|h| h.vendor_id.as_str()).collect();
        assert_eq!(vendors, vec!["a", "b"]);
        assert_eq!(results[1].term, "cocoa");
        assert_eq!(results[1].hits.len(), 1);
    }

    #[tokio::test]
    async fn test_extract_keeps_configured_order_when_later_requests_finish_first() {
        let config = BasketConfig::from_toml_str(CONFIG).unwrap();
        let backends: Vec<Box<dyn SearchBackend>> = vec![
            Box::new(DelayedBackend {
                vendor: "slow".to_string(),
                delay: std::time::Duration::from_millis(80),
            }),
            Box::new(DelayedBackend {
                vendor: "fast".to_string(),
                delay: std::time::Duration::from_millis(0),
            }),
        ];
        let pipeline = BasketPipeline::with_backends(MockStorage::new(), config, backends).unwrap();

        let results = pipeline.extract().await.unwrap();

        for entry in &results {
            let vendors: Vec<_> = entry.hits.iter().map(|h| h.vendor_id.as_str()).collect();
            assert_eq!(vendors, vec!["slow", "fast"], "{}", entry.term);
        }
        assert_eq!(results[0].term, "milk");
        assert_eq!(results[1].term, "cocoa");
    }

    #[tokio::test]
    async fn test_transform_renders_reports() {
        let pipeline = pipeline(MockStorage::new());
        let results = pipeline.extract().await.unwrap();

        let transformed = pipeline.transform(results).await.unwrap();

        assert_eq!(transformed.outcome.ranking.cheapest().unwrap().vendor_id, "a");
        assert!(transformed.ranking_csv.starts_with("rank,status"));
        assert!(transformed.json_output.contains("\"run\": \"pipeline-test\""));
    }

    #[tokio::test]
    async fn test_load_writes_zip_archive() {
        let storage = MockStorage::new();
        let pipeline = pipeline(storage.clone());
        let results = pipeline.extract().await.unwrap();
        let transformed = pipeline.transform(results).await.unwrap();

        let output_path = pipeline.load(transformed).await.unwrap();

        assert_eq!(output_path, "test_output/basket_report.zip");
        let zip_data = storage.get_file("basket_report.zip").await.unwrap();
        let archive = zip::ZipArchive::new(std::io::Cursor::new(zip_data)).unwrap();
        let mut names: Vec<_> = archive.file_names().collect();
        names.sort();
        assert_eq!(names, vec![ITEMS_CSV, RANKING_CSV, REPORT_JSON]);
    }

    #[tokio::test]
    async fn test_unknown_term_from_backend_is_rejected() {
        let pipeline = pipeline(MockStorage::new());
        let result = pipeline
            .transform(vec![TermResults::new("bread", Vec::new())])
            .await;

        assert!(matches!(result, Err(EtlError::InvalidInput { .. })));
    }
}
