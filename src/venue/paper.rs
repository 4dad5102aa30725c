//! Simulated spot account filling market orders at live market prices.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::{MarketData, Venue};
use crate::error::VenueError;
use crate::models::{Balance, Fill, OrderSide, Symbol, SymbolFilters};

/// Paper trading venue backed by real market data
pub struct PaperVenue {
    market: Arc<dyn MarketData>,
    quote_asset: String,
    fee_rate: Decimal,
    balances: Mutex<HashMap<String, Decimal>>,
}

impl PaperVenue {
    pub fn new(market: Arc<dyn MarketData>, quote_asset: impl Into<String>, fee_rate: Decimal) -> Self {
        Self {
            market,
            quote_asset: quote_asset.into(),
            fee_rate,
            balances: Mutex::new(HashMap::new()),
        }
    }

    /// Seed a free balance
    pub fn with_balance(self, asset: &str, amount: Decimal) -> Self {
        self.lock().insert(asset.to_uppercase(), amount);
        self
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Decimal>> {
        self.balances.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn base_asset<'a>(&self, symbol: &'a Symbol) -> Result<&'a str, VenueError> {
        symbol
            .base_asset(&self.quote_asset)
            .ok_or_else(|| VenueError::UnknownSymbol(symbol.to_string()))
    }

    /// Move balances for a fill; all-or-nothing
    fn settle(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<Fill, VenueError> {
        let base = self.base_asset(symbol)?;
        let notional = price * quantity;
        let fee = notional * self.fee_rate;

        let mut balances = self.lock();
        let (debit_asset, debit, credit_asset, credit) = match side {
            OrderSide::Buy => (self.quote_asset.as_str(), notional + fee, base, quantity),
            OrderSide::Sell => (base, quantity, self.quote_asset.as_str(), notional - fee),
        };

        let available = balances.get(debit_asset).copied().unwrap_or_default();
        if available < debit {
            return Err(VenueError::InsufficientBalance {
                asset: debit_asset.to_string(),
                required: debit,
                available,
            });
        }

        balances.insert(debit_asset.to_string(), available - debit);
        *balances.entry(credit_asset.to_string()).or_default() += credit;

        Ok(Fill {
            order_id: Uuid::new_v4().to_string(),
            symbol: symbol.clone(),
            side,
            price,
            quantity,
            fee,
            timestamp: Utc::now(),
        })
    }
}

#[async_trait]
impl Venue for PaperVenue {
    async fn get_price(&self, symbol: &Symbol) -> Result<Decimal, VenueError> {
        self.market.get_price(symbol).await
    }

    async fn market_buy(&self, symbol: &Symbol, quantity: Decimal) -> Result<Fill, VenueError> {
        let price = self.market.get_price(symbol).await?;
        let fill = self.settle(symbol, OrderSide::Buy, price, quantity)?;
        tracing::info!(symbol = %symbol, %quantity, %price, "Paper BUY filled");
        Ok(fill)
    }

    async fn market_sell(&self, symbol: &Symbol, quantity: Decimal) -> Result<Fill, VenueError> {
        let price = self.market.get_price(symbol).await?;
        let fill = self.settle(symbol, OrderSide::Sell, price, quantity)?;
        tracing::info!(symbol = %symbol, %quantity, %price, "Paper SELL filled");
        Ok(fill)
    }

    async fn get_balance(&self, asset: &str) -> Result<Balance, VenueError> {
        let free = self
            .lock()
            .get(&asset.to_uppercase())
            .copied()
            .unwrap_or_default();
        Ok(Balance {
            free,
            locked: Decimal::ZERO,
        })
    }

    async fn get_symbol_filters(&self, symbol: &Symbol) -> Result<SymbolFilters, VenueError> {
        self.market.get_symbol_filters(symbol).await
    }

    fn name(&self) -> &str {
        "paper"
    }
}
