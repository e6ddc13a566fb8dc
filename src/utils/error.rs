use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Cannot parse {field} '{value}': {reason}")]
    ParseError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

/// 錯誤分類，用於日誌與退出碼
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Configuration,
    Data,
    Storage,
    Input,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        EtlError::InvalidInput {
            message: message.into(),
        }
    }

    pub fn parse(field: &str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        EtlError::ParseError {
            field: field.to_string(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::ApiError(_) => ErrorCategory::Network,
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. } => ErrorCategory::Configuration,
            EtlError::ParseError { .. }
            | EtlError::ProcessingError { .. }
            | EtlError::CsvError(_)
            | EtlError::SerializationError(_) => ErrorCategory::Data,
            EtlError::ZipError(_) | EtlError::IoError(_) => ErrorCategory::Storage,
            EtlError::InvalidInput { .. } => ErrorCategory::Input,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // 單筆報價解析失敗只會被丟棄
            EtlError::ParseError { .. } => ErrorSeverity::Low,
            EtlError::ApiError(_) => ErrorSeverity::Medium,
            EtlError::ProcessingError { .. }
            | EtlError::CsvError(_)
            | EtlError::SerializationError(_)
            | EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. } => ErrorSeverity::High,
            EtlError::InvalidInput { .. } | EtlError::ZipError(_) | EtlError::IoError(_) => {
                ErrorSeverity::Critical
            }
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Network => {
                "Check the backend endpoint, network connectivity and timeout settings"
            }
            ErrorCategory::Configuration => {
                "Review the TOML configuration file and fix the reported field"
            }
            ErrorCategory::Data => "Inspect the backend response shape and the field mapping",
            ErrorCategory::Storage => "Make sure the output path exists and is writable",
            ErrorCategory::Input => {
                "Check the [[items]] list: terms must be non-empty and unique"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            EtlError::ApiError(_) => "Could not reach a search backend".to_string(),
            EtlError::InvalidInput { message } => format!("Invalid basket input: {}", message),
            EtlError::ConfigValidationError { field, message } => {
                format!("Configuration problem in '{}': {}", field, message)
            }
            EtlError::InvalidConfigValueError { field, reason, .. } => {
                format!("Configuration problem in '{}': {}", field, reason)
            }
            EtlError::MissingConfigError { field } => {
                format!("Configuration is missing '{}'", field)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_is_low_severity() {
        let err = EtlError::parse("price", "abc", "not a number");
        assert_eq!(err.severity(), ErrorSeverity::Low);
        assert_eq!(err.category(), ErrorCategory::Data);
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_invalid_input_is_fatal() {
        let err = EtlError::invalid_input("empty item list");
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(err.user_friendly_message().contains("empty item list"));
    }
}
