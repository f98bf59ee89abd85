pub mod backoff;
pub mod config;
pub mod evaluator;
pub mod fetcher;
pub mod models;
pub mod notifier;
pub mod orchestrator;
pub mod parser;
pub mod renderer;
pub mod runner;
pub mod store;
pub mod utils;
pub mod watchlist;

// Re-export commonly used types
pub use config::AppConfig;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
