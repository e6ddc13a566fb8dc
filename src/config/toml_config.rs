use crate::domain::model::CanonicalItem;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_ARCHIVE_NAME: &str = "basket_report.zip";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasketConfig {
    pub run: RunConfig,
    pub items: Vec<CanonicalItem>,
    pub backends: Vec<BackendConfig>,
    #[serde(default)]
    pub extract: ExtractConfig,
    pub load: LoadConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    pub endpoint: String,
    pub method: Option<String>,
    /// GET 時的查詢參數名；POST 時寫入 body 的欄位名
    pub query_param: Option<String>,
    pub body: Option<serde_json::Value>,
    pub headers: Option<HashMap<String, String>>,
    pub timeout_seconds: Option<u64>,
    /// 結果陣列在回應中的路徑，例如 "sections.0.items"
    pub results_path: Option<String>,
    pub price_in_minor_units: Option<bool>,
    pub fields: FieldMapping,
}

/// 每個欄位對應到 JSON 內的點分路徑
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub vendor_id: String,
    pub vendor_name: Option<String>,
    pub name: String,
    pub price: String,
    pub url: Option<String>,
    pub vendor_available: Option<String>,
    pub vendor_delivery_time: Option<String>,
    pub vendor_subscription: Option<String>,
    pub vendor_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractConfig {
    pub concurrent_requests: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub output_path: String,
    pub output_formats: Vec<String>,
    pub archive_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

impl BackendConfig {
    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or("GET")
    }

    pub fn query_param(&self) -> &str {
        self.query_param.as_deref().unwrap_or("q")
    }

    pub fn price_in_minor_units(&self) -> bool {
        self.price_in_minor_units.unwrap_or(false)
    }
}

impl BasketConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${API_KEY})，未設定的保留原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("run.name", &self.run.name)?;

        if self.items.is_empty() {
            return Err(EtlError::MissingConfigError {
                field: "items".to_string(),
            });
        }
        for item in &self.items {
            validation::validate_non_empty_string("items.term", &item.term)?;
        }
        validation::validate_unique("items.term", self.items.iter().map(|i| i.term.as_str()))?;

        if self.backends.is_empty() {
            return Err(EtlError::MissingConfigError {
                field: "backends".to_string(),
            });
        }
        validation::validate_unique(
            "backends.name",
            self.backends.iter().map(|b| b.name.as_str()),
        )?;
        for backend in &self.backends {
            validation::validate_non_empty_string("backends.name", &backend.name)?;
            validation::validate_url("backends.endpoint", &backend.endpoint)?;
            validation::validate_one_of("backends.method", backend.method(), &["GET", "POST"])?;
            validation::validate_non_empty_string("backends.fields.vendor_id", &backend.fields.vendor_id)?;
            validation::validate_non_empty_string("backends.fields.name", &backend.fields.name)?;
            validation::validate_non_empty_string("backends.fields.price", &backend.fields.price)?;
            if let Some(body) = &backend.body {
                if !body.is_object() {
                    return Err(EtlError::InvalidConfigValueError {
                        field: "backends.body".to_string(),
                        value: body.to_string(),
                        reason: "POST body template must be a table".to_string(),
                    });
                }
            }
        }

        if let Some(concurrent) = self.extract.concurrent_requests {
            validation::validate_positive_number("extract.concurrent_requests", concurrent, 1)?;
        }

        validation::validate_path("load.output_path", &self.load.output_path)?;
        for format in &self.load.output_formats {
            validation::validate_one_of("load.output_formats", format, &["csv", "json"])?;
        }

        Ok(())
    }

    pub fn output_path(&self) -> &str {
        &self.load.output_path
    }

    pub fn concurrent_requests(&self) -> usize {
        self.extract.concurrent_requests.unwrap_or(5)
    }

    pub fn archive_name(&self) -> &str {
        self.load
            .archive_name
            .as_deref()
            .unwrap_or(DEFAULT_ARCHIVE_NAME)
    }

    pub fn wants_format(&self, format: &str) -> bool {
        self.load.output_formats.iter().any(|f| f == format)
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }
}

impl Validate for BasketConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASIC: &str = r#"
[run]
name = "weekly-basket"

[[items]]
term = "corn flakes 850g"
mandatory = true

[[items]]
term = "cocoa 500g"
mandatory = false

[[items]]
term = "eggs L 12"

[[backends]]
name = "wolt"
endpoint = "https://api.example.com/v1/pages/search"
method = "POST"
body = { target = "items", lat = 32.08, lon = 34.78 }
results_path = "sections.0.items"
price_in_minor_units = true

[backends.fields]
vendor_id = "link.menu_item_details.venue_slug"
vendor_name = "menu_item.venue_name"
name = "menu_item.name"
price = "menu_item.price"
vendor_available = "venue.online"
vendor_delivery_time = "venue.estimate_range"

[extract]
concurrent_requests = 3

[load]
output_path = "./test-output"
output_formats = ["csv", "json"]
"#;

    #[test]
    fn test_parse_basic_toml_config() {
        let config = BasketConfig::from_toml_str(BASIC).unwrap();

        assert_eq!(config.run.name, "weekly-basket");
        assert_eq!(config.items.len(), 3);
        assert!(!config.items[1].mandatory);
        // 未指定 mandatory 時預設為必要
        assert!(config.items[2].mandatory);
        assert_eq!(config.backends[0].method(), "POST");
        assert_eq!(config.backends[0].query_param(), "q");
        assert!(config.backends[0].price_in_minor_units());
        assert_eq!(
            config.backends[0].fields.vendor_delivery_time.as_deref(),
            Some("venue.estimate_range")
        );
        assert!(config.backends[0].fields.vendor_url.is_none());
        assert_eq!(config.concurrent_requests(), 3);
        assert_eq!(config.archive_name(), DEFAULT_ARCHIVE_NAME);
        assert!(config.wants_format("json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("BASKET_TEST_ENDPOINT", "https://test.api.com/search");

        let content = BASIC.replace(
            "https://api.example.com/v1/pages/search",
            "${BASKET_TEST_ENDPOINT}",
        );
        let config = BasketConfig::from_toml_str(&content).unwrap();
        assert_eq!(config.backends[0].endpoint, "https://test.api.com/search");

        std::env::remove_var("BASKET_TEST_ENDPOINT");
    }

    #[test]
    fn test_duplicate_terms_fail_validation() {
        let content = BASIC.replace("cocoa 500g", "corn flakes 850g");
        let config = BasketConfig::from_toml_str(&content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_endpoint_fails_validation() {
        let content = BASIC.replace("https://api.example.com/v1/pages/search", "not-a-url");
        let config = BasketConfig::from_toml_str(&content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_output_format_fails_validation() {
        let content = BASIC.replace(r#"["csv", "json"]"#, r#"["docx"]"#);
        let config = BasketConfig::from_toml_str(&content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(BASIC.as_bytes()).unwrap();

        let config = BasketConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.run.name, "weekly-basket");
    }
}
