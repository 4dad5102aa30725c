// Core modules
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod persistence;
pub mod risk;
pub mod strategy;
pub mod venue;

// Re-export commonly used types
pub use error::{ConfigError, StrategyError, TradeError, VenueError};
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, TradeError>;
