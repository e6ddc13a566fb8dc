pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::{cli::LocalStorage, toml_config::BasketConfig};

pub use adapters::HttpSearchBackend;
pub use core::{engine::BasketEngine, etl::EtlEngine, pipeline::BasketPipeline};
pub use utils::error::{EtlError, Result};
