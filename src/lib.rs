// Core modules
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod indicators;
pub mod market;
pub mod models;
pub mod persistence;
pub mod pipeline;
pub mod registry;
pub mod strategy;
pub mod trend;

// Re-export commonly used types
pub use api::{ExchangeClient, KlineRequest, OkxClient, SyntheticExchange};
pub use config::AppConfig;
pub use error::SignalError;
pub use models::*;
pub use pipeline::Pipeline;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
