//! Exchange-facing collaborators: order execution and market data.

pub mod binance;
pub mod paper;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::future::Future;
use std::time::Duration;

use crate::error::VenueError;
use crate::models::{Balance, Candle, Fill, Symbol, SymbolFilters};

pub use binance::{BinanceClient, Credentials};
pub use paper::PaperVenue;

/// Execution venue. Every call may fail with a retriable `VenueError`.
#[async_trait]
pub trait Venue: Send + Sync {
    /// Latest traded price
    async fn get_price(&self, symbol: &Symbol) -> Result<Decimal, VenueError>;

    /// Market buy of `quantity` base units
    async fn market_buy(&self, symbol: &Symbol, quantity: Decimal) -> Result<Fill, VenueError>;

    /// Market sell of `quantity` base units
    async fn market_sell(&self, symbol: &Symbol, quantity: Decimal) -> Result<Fill, VenueError>;

    /// Free and locked balance of an asset
    async fn get_balance(&self, asset: &str) -> Result<Balance, VenueError>;

    /// Lot-size rules for a symbol
    async fn get_symbol_filters(&self, symbol: &Symbol) -> Result<SymbolFilters, VenueError>;

    fn name(&self) -> &str;
}

/// Read-only market data used by signal sources and the paper venue
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn get_price(&self, symbol: &Symbol) -> Result<Decimal, VenueError>;

    async fn get_symbol_filters(&self, symbol: &Symbol) -> Result<SymbolFilters, VenueError>;

    /// Most recent `limit` klines, oldest first
    async fn get_klines(
        &self,
        symbol: &Symbol,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, VenueError>;
}

/// Bound a venue call; an elapsed deadline becomes `VenueError::Timeout`
pub async fn with_timeout<T, F>(
    operation: &'static str,
    limit: Duration,
    call: F,
) -> Result<T, VenueError>
where
    F: Future<Output = Result<T, VenueError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(VenueError::Timeout { operation, limit }),
    }
}
