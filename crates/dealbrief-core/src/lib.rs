//! Shared configuration and domain types for the dealbrief workspace.

pub mod app_config;
pub mod config;
pub mod naming;
pub mod types;

use thiserror::Error;

pub use app_config::{AppConfig, BreakerConfig, RetrievalConfig};
pub use config::{load_app_config, load_app_config_from_env};
pub use naming::{company_name_from_url, namespace_key};
pub use types::{BranchKind, DocumentKind, DocumentMeta, ProgressEvent, SourceDocument};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
