// Core modules
pub mod algo;
pub mod api;
pub mod bootstrap;
pub mod db;
pub mod feed;
pub mod models;
pub mod pnl;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod timeframe;

// Re-export commonly used types
pub use algo::AlgoController;
pub use models::*;
pub use store::CandleStore;
pub use timeframe::TimeframeAggregator;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
