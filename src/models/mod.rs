use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tradable instrument identifier, e.g. `BTCUSDT`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base asset of a spot pair quoted in `quote_asset` (`BTCUSDT` -> `BTC`)
    pub fn base_asset(&self, quote_asset: &str) -> Option<&str> {
        self.0
            .strip_suffix(quote_asset)
            .filter(|base| !base.is_empty())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::new(s)
    }
}

/// Trading signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
    Stop,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
            Signal::Hold => "HOLD",
            Signal::Stop => "STOP",
        };
        f.write_str(s)
    }
}

/// A signal together with the model outputs that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolSignal {
    pub signal: Signal,
    /// Expected next-bar return (0.0 when the source has no model)
    pub predicted_return: f64,
    /// Volatility of close-to-close returns, as a fraction; `None` when undefined
    pub volatility: Option<f64>,
}

impl SymbolSignal {
    pub fn new(signal: Signal, predicted_return: f64, volatility: Option<f64>) -> Self {
        Self {
            signal,
            predicted_return,
            volatility,
        }
    }
}

impl From<Signal> for SymbolSignal {
    fn from(signal: Signal) -> Self {
        Self::new(signal, 0.0, None)
    }
}

/// OHLCV kline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: Symbol,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    SellSignal,
    StopSignal,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::StopLoss => "STOP-LOSS",
            ExitReason::TakeProfit => "TAKE-PROFIT",
            ExitReason::SellSignal => "SELL",
            ExitReason::StopSignal => "STOP",
        };
        f.write_str(s)
    }
}

/// Action column of the trade and feedback logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeAction {
    Buy,
    Hold,
    Exit(ExitReason),
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => f.write_str("BUY"),
            TradeAction::Hold => f.write_str("HOLD"),
            TradeAction::Exit(reason) => reason.fmt(f),
        }
    }
}

/// Prediction paired with its realized outcome, one per closed position
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackRecord {
    pub timestamp: DateTime<Utc>,
    pub symbol: Symbol,
    pub predicted_return: f64,
    pub action: TradeAction,
    pub realized_profit: Decimal,
}

/// Entry or monitoring tick of one symbol
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub symbol: Symbol,
    pub action: TradeAction,
    pub price: Decimal,
    pub quantity: Decimal,
    pub profit: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Confirmation of an executed market order
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    /// Venue-assigned order id
    pub order_id: String,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    pub fee: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Balance {
    pub free: Decimal,
    pub locked: Decimal,
}

/// Exchange trading rules relevant to order sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolFilters {
    pub step_size: Decimal,
}
