use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the execution venue or market data endpoints.
///
/// All of these are treated as retriable: the affected symbol is skipped for
/// the current tick and the operation is attempted again on the next one.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VenueError {
    #[error("{operation} timed out after {limit:?}")]
    Timeout {
        operation: &'static str,
        limit: Duration,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse venue response: {0}")]
    Parse(String),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Insufficient {asset} balance: required {required}, available {available}")]
    InsufficientBalance {
        asset: String,
        required: Decimal,
        available: Decimal,
    },

    #[error("Order not filled: {0}")]
    OrderRejected(String),

    #[error("API key and secret are required for account and order endpoints")]
    MissingCredentials,
}

impl From<reqwest::Error> for VenueError {
    fn from(err: reqwest::Error) -> Self {
        VenueError::Network(err.to_string())
    }
}

/// Invalid startup state. Fatal: the process does not start.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors from the trading core.
#[derive(Error, Debug)]
pub enum TradeError {
    #[error("Invalid volatility {volatility} at price {price}")]
    InvalidVolatility { volatility: f64, price: Decimal },

    #[error("Quantity too small for {symbol}: {notional} notional at {price} with step {step_size}")]
    QuantityTooSmall {
        symbol: String,
        notional: Decimal,
        price: Decimal,
        step_size: Decimal,
    },

    #[error("Quantity {quantity} for {symbol} is not a multiple of step {step_size}")]
    Misaligned {
        symbol: String,
        quantity: Decimal,
        step_size: Decimal,
    },

    #[error("Invalid state for {symbol}: {message}")]
    InvalidState { symbol: String, message: String },

    #[error("Venue error: {0}")]
    Venue(#[from] VenueError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors from signal generation.
#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Insufficient data: need {required} bars, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Market data error: {0}")]
    Market(#[from] VenueError),

    #[error("Numerical error: {0}")]
    Numerical(String),
}
