use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use super::Venue;
use crate::error::VenueError;
use crate::models::{Balance, Fill, OrderSide, Symbol, SymbolFilters};

/// Scriptable venue for unit tests. Fills at the current scripted price.
pub(crate) struct MockVenue {
    prices: Mutex<HashMap<Symbol, Decimal>>,
    step_size: Decimal,
    failing_buys: Mutex<HashSet<Symbol>>,
    failing_sells: Mutex<HashSet<Symbol>>,
    failing_prices: Mutex<HashSet<Symbol>>,
    slow_prices: Mutex<HashSet<Symbol>>,
    orders: Mutex<Vec<(OrderSide, Symbol, Decimal)>>,
}

impl MockVenue {
    pub(crate) fn new(step_size: Decimal) -> Self {
        Self {
            prices: Mutex::new(HashMap::new()),
            step_size,
            failing_buys: Mutex::new(HashSet::new()),
            failing_sells: Mutex::new(HashSet::new()),
            failing_prices: Mutex::new(HashSet::new()),
            slow_prices: Mutex::new(HashSet::new()),
            orders: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.lock().unwrap().insert(Symbol::new(symbol), price);
    }

    pub(crate) fn fail_buys(&self, symbol: &str, fail: bool) {
        toggle(&self.failing_buys, symbol, fail);
    }

    pub(crate) fn fail_sells(&self, symbol: &str, fail: bool) {
        toggle(&self.failing_sells, symbol, fail);
    }

    pub(crate) fn fail_prices(&self, symbol: &str, fail: bool) {
        toggle(&self.failing_prices, symbol, fail);
    }

    pub(crate) fn hang_prices(&self, symbol: &str, hang: bool) {
        toggle(&self.slow_prices, symbol, hang);
    }

    pub(crate) fn orders(&self) -> Vec<(OrderSide, Symbol, Decimal)> {
        self.orders.lock().unwrap().clone()
    }

    fn price_of(&self, symbol: &Symbol) -> Result<Decimal, VenueError> {
        self.prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| VenueError::UnknownSymbol(symbol.to_string()))
    }

    fn fill(&self, side: OrderSide, symbol: &Symbol, quantity: Decimal) -> Result<Fill, VenueError> {
        let price = self.price_of(symbol)?;
        self.orders
            .lock()
            .unwrap()
            .push((side, symbol.clone(), quantity));
        Ok(Fill {
            order_id: Uuid::new_v4().to_string(),
            symbol: symbol.clone(),
            side,
            price,
            quantity,
            fee: Decimal::ZERO,
            timestamp: Utc::now(),
        })
    }
}

fn toggle(set: &Mutex<HashSet<Symbol>>, symbol: &str, on: bool) {
    let mut set = set.lock().unwrap();
    if on {
        set.insert(Symbol::new(symbol));
    } else {
        set.remove(&Symbol::new(symbol));
    }
}

#[async_trait]
impl Venue for MockVenue {
    async fn get_price(&self, symbol: &Symbol) -> Result<Decimal, VenueError> {
        let hang = self.slow_prices.lock().unwrap().contains(symbol);
        if hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.failing_prices.lock().unwrap().contains(symbol) {
            return Err(VenueError::Network("price feed down".to_string()));
        }
        self.price_of(symbol)
    }

    async fn market_buy(&self, symbol: &Symbol, quantity: Decimal) -> Result<Fill, VenueError> {
        if self.failing_buys.lock().unwrap().contains(symbol) {
            return Err(VenueError::Api {
                status: 503,
                message: "buy rejected".to_string(),
            });
        }
        self.fill(OrderSide::Buy, symbol, quantity)
    }

    async fn market_sell(&self, symbol: &Symbol, quantity: Decimal) -> Result<Fill, VenueError> {
        if self.failing_sells.lock().unwrap().contains(symbol) {
            return Err(VenueError::Network("connection reset".to_string()));
        }
        self.fill(OrderSide::Sell, symbol, quantity)
    }

    async fn get_balance(&self, _asset: &str) -> Result<Balance, VenueError> {
        Ok(Balance::default())
    }

    async fn get_symbol_filters(&self, _symbol: &Symbol) -> Result<SymbolFilters, VenueError> {
        Ok(SymbolFilters {
            step_size: self.step_size,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
