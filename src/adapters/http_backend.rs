use crate::adapters::json_path::{lookup, lookup_bool, lookup_string};
use crate::config::toml_config::BackendConfig;
use crate::domain::model::{Price, RawHit, RawPrice, VendorMetadata};
use crate::domain::ports::SearchBackend;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

/// 以 JSON API 查詢的搜尋後端；回應欄位由 `[backends.fields]` 對應
pub struct HttpSearchBackend {
    config: BackendConfig,
    client: Client,
}

impl HttpSearchBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self::with_client(config, Client::new())
    }

    pub fn with_client(config: BackendConfig, client: Client) -> Self {
        Self { config, client }
    }

    fn build_request(&self, term: &str) -> Result<RequestBuilder> {
        let mut request = match self.config.method() {
            "POST" => {
                let mut body = self
                    .config
                    .body
                    .clone()
                    .unwrap_or_else(|| Value::Object(Default::default()));
                let fields = body.as_object_mut().ok_or_else(|| EtlError::ConfigError {
                    message: format!("backend '{}' body must be a JSON object", self.config.name),
                })?;
                fields.insert(
                    self.config.query_param().to_string(),
                    Value::String(term.to_string()),
                );
                self.client.post(&self.config.endpoint).json(&body)
            }
            _ => self
                .client
                .get(&self.config.endpoint)
                .query(&[(self.config.query_param(), term)]),
        };

        // 添加自定義標頭
        if let Some(headers) = &self.config.headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        if let Some(timeout) = self.config.timeout_seconds {
            request = request.timeout(std::time::Duration::from_secs(timeout));
        }

        Ok(request)
    }

    /// 依 results_path 找到結果陣列並轉為 RawHit
    pub fn map_hits(&self, response: &Value) -> Vec<RawHit> {
        let path = self.config.results_path.as_deref().unwrap_or("");
        let elements = match lookup(response, path) {
            Some(Value::Array(elements)) => elements,
            Some(_) | None => {
                tracing::debug!(
                    "📡 {}: no result array at '{}', treating as empty",
                    self.config.name,
                    path
                );
                return Vec::new();
            }
        };

        elements
            .iter()
            .filter_map(|element| self.map_hit(element))
            .collect()
    }

    fn map_hit(&self, element: &Value) -> Option<RawHit> {
        if !element.is_object() {
            tracing::debug!("📡 {}: skipping non-object result", self.config.name);
            return None;
        }
        let fields = &self.config.fields;

        let Some(raw_name) = lookup_string(element, &fields.name) else {
            tracing::debug!(
                "📡 {}: skipping result without '{}'",
                self.config.name,
                fields.name
            );
            return None;
        };

        // 缺少的店家 ID 或價格交由分組階段以 ParseError 拒絕
        let vendor_id = lookup_string(element, &fields.vendor_id).unwrap_or_default();
        let price = match lookup(element, &fields.price) {
            Some(Value::Number(number)) => RawPrice::Number(number.clone()),
            Some(Value::String(text)) => RawPrice::Text(text.clone()),
            Some(other) => RawPrice::Text(other.to_string()),
            None => RawPrice::Text(String::new()),
        };
        let price = if self.config.price_in_minor_units() {
            scale_minor_units(price)
        } else {
            price
        };

        Some(RawHit {
            vendor_id,
            vendor_name: fields
                .vendor_name
                .as_deref()
                .and_then(|path| lookup_string(element, path)),
            raw_name,
            price,
            url: fields
                .url
                .as_deref()
                .and_then(|path| lookup_string(element, path)),
            vendor_meta: self.map_vendor_meta(element),
        })
    }

    fn map_vendor_meta(&self, element: &Value) -> VendorMetadata {
        let fields = &self.config.fields;
        let string_at =
            |path: &Option<String>| path.as_deref().and_then(|path| lookup_string(element, path));
        let bool_at =
            |path: &Option<String>| path.as_deref().and_then(|path| lookup_bool(element, path));

        VendorMetadata {
            is_available: bool_at(&fields.vendor_available),
            delivery_time: string_at(&fields.vendor_delivery_time),
            subscription: bool_at(&fields.vendor_subscription),
            url: string_at(&fields.vendor_url),
        }
    }
}

/// 1290 → "12.90"；無法轉換時保留原值
fn scale_minor_units(price: RawPrice) -> RawPrice {
    let scaled = match &price {
        RawPrice::Number(number) => Price::from_json_number(number, true).ok(),
        RawPrice::Text(text) => text.trim().parse::<u64>().ok().map(Price::from_minor),
    };
    match scaled {
        Some(scaled) => RawPrice::Text(scaled.to_string()),
        None => price,
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn search(&self, term: &str) -> Result<Vec<RawHit>> {
        tracing::debug!("📡 {}: searching '{}'", self.config.name, term);

        let response = self.build_request(term)?.send().await?;
        tracing::debug!("📡 {}: response status {}", self.config.name, response.status());

        if !response.status().is_success() {
            return Err(EtlError::ProcessingError {
                message: format!(
                    "backend '{}' returned status {} for '{}'",
                    self.config.name,
                    response.status(),
                    term
                ),
            });
        }

        let body: Value = response.json().await?;
        let hits = self.map_hits(&body);
        tracing::debug!("📡 {}: {} hits for '{}'", self.config.name, hits.len(), term);
        Ok(hits)
    }
}
