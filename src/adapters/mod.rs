// Adapters layer: concrete implementations of the domain ports for external systems.

pub mod http_backend;
pub mod json_path;

pub use http_backend::HttpSearchBackend;
