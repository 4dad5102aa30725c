use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::TradeError;
use crate::execution::sizing::is_step_aligned;
use crate::models::{ExitReason, FeedbackRecord, Symbol, TradeAction, TradeRecord};
use crate::persistence::RecordSink;
use crate::risk::RiskThresholds;
use crate::venue::{with_timeout, Venue};

/// Everything needed to enter one position
#[derive(Debug, Clone)]
pub struct EntryPlan {
    /// Lot-aligned base quantity
    pub quantity: Decimal,
    pub step_size: Decimal,
    /// Price the plan was sized at
    pub quoted_price: Decimal,
    pub thresholds: RiskThresholds,
    pub predicted_return: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub stop_loss_frac: Decimal,
    pub take_profit_frac: Decimal,
    pub predicted_return: f64,
    pub entry_time: DateTime<Utc>,
}

impl OpenPosition {
    pub fn stop_price(&self) -> Decimal {
        self.entry_price * (Decimal::ONE - self.stop_loss_frac)
    }

    pub fn target_price(&self) -> Decimal {
        self.entry_price * (Decimal::ONE + self.take_profit_frac)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum PositionState {
    #[default]
    Flat,
    Long(OpenPosition),
}

/// Outcome of a completed sell
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub symbol: Symbol,
    pub reason: ExitReason,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub quantity: Decimal,
    /// Net of fees on both legs, per base unit
    pub profit_per_unit: Decimal,
}

/// Read-only snapshot of one executor
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSummary {
    pub symbol: Symbol,
    pub state: PositionState,
}

impl fmt::Display for PositionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            PositionState::Flat => write!(f, "{} FLAT", self.symbol),
            PositionState::Long(p) => write!(
                f,
                "{} LONG {} @ {} (SL {} / TP {})",
                self.symbol,
                p.quantity,
                p.entry_price,
                p.stop_price().round_dp(8),
                p.target_price().round_dp(8)
            ),
        }
    }
}

/// Per-unit profit of a round trip: `exit·(1−fee) − entry·(1+fee)`
pub fn realized_profit(entry_price: Decimal, exit_price: Decimal, fee_rate: Decimal) -> Decimal {
    exit_price * (Decimal::ONE - fee_rate) - entry_price * (Decimal::ONE + fee_rate)
}

/// Owns the lifecycle of one symbol's position: Flat -> Long -> Flat.
///
/// Venue calls are bounded by `call_timeout`. A failed sell leaves the
/// position Long so the next monitor tick retries the exit.
pub struct PositionExecutor {
    symbol: Symbol,
    state: PositionState,
    fee_rate: Decimal,
    venue: Arc<dyn Venue>,
    recorder: Arc<dyn RecordSink>,
    call_timeout: Duration,
}

impl PositionExecutor {
    pub fn new(
        symbol: Symbol,
        venue: Arc<dyn Venue>,
        recorder: Arc<dyn RecordSink>,
        fee_rate: Decimal,
        call_timeout: Duration,
    ) -> Self {
        Self {
            symbol,
            state: PositionState::Flat,
            fee_rate,
            venue,
            recorder,
            call_timeout,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn state(&self) -> &PositionState {
        &self.state
    }

    pub fn is_long(&self) -> bool {
        matches!(self.state, PositionState::Long(_))
    }

    pub fn summary(&self) -> PositionSummary {
        PositionSummary {
            symbol: self.symbol.clone(),
            state: self.state.clone(),
        }
    }

    /// Place the entry order and become Long at the fill price
    pub async fn open(&mut self, plan: EntryPlan) -> Result<(), TradeError> {
        if self.is_long() {
            return Err(TradeError::InvalidState {
                symbol: self.symbol.to_string(),
                message: "position already open".to_string(),
            });
        }

        if plan.quantity <= Decimal::ZERO {
            return Err(TradeError::QuantityTooSmall {
                symbol: self.symbol.to_string(),
                notional: plan.quantity * plan.quoted_price,
                price: plan.quoted_price,
                step_size: plan.step_size,
            });
        }

        if !is_step_aligned(plan.quantity, plan.step_size) {
            return Err(TradeError::Misaligned {
                symbol: self.symbol.to_string(),
                quantity: plan.quantity,
                step_size: plan.step_size,
            });
        }

        let fill = with_timeout(
            "market_buy",
            self.call_timeout,
            self.venue.market_buy(&self.symbol, plan.quantity),
        )
        .await?;

        let position = OpenPosition {
            entry_price: fill.price,
            quantity: fill.quantity,
            stop_loss_frac: plan.thresholds.stop_loss_frac,
            take_profit_frac: plan.thresholds.take_profit_frac,
            predicted_return: plan.predicted_return,
            entry_time: fill.timestamp,
        };

        tracing::info!(
            symbol = %self.symbol,
            quantity = %position.quantity,
            entry = %position.entry_price,
            stop = %position.stop_price().round_dp(8),
            target = %position.target_price().round_dp(8),
            "Opened position"
        );

        self.record_trade(TradeAction::Buy, position.entry_price, position.quantity, Decimal::ZERO);
        self.state = PositionState::Long(position);
        Ok(())
    }

    /// Check the exit thresholds fixed at entry against `current_price`
    pub async fn monitor(&mut self, current_price: Decimal) -> Option<ClosedTrade> {
        let (stop, target, quantity) = match &self.state {
            PositionState::Flat => return None,
            PositionState::Long(p) => (p.stop_price(), p.target_price(), p.quantity),
        };

        if current_price <= stop {
            self.close(ExitReason::StopLoss).await
        } else if current_price >= target {
            self.close(ExitReason::TakeProfit).await
        } else {
            tracing::debug!(symbol = %self.symbol, price = %current_price, "Holding");
            self.record_trade(TradeAction::Hold, current_price, quantity, Decimal::ZERO);
            None
        }
    }

    /// Fetch a fresh price and monitor against it
    pub async fn poll(&mut self) -> Result<Option<ClosedTrade>, TradeError> {
        if !self.is_long() {
            return Ok(None);
        }
        let price = with_timeout(
            "get_price",
            self.call_timeout,
            self.venue.get_price(&self.symbol),
        )
        .await?;
        Ok(self.monitor(price).await)
    }

    /// Sell the full quantity. Flat is a no-op.
    pub async fn close(&mut self, reason: ExitReason) -> Option<ClosedTrade> {
        let position = match &self.state {
            PositionState::Flat => return None,
            PositionState::Long(p) => p.clone(),
        };

        let fill = match with_timeout(
            "market_sell",
            self.call_timeout,
            self.venue.market_sell(&self.symbol, position.quantity),
        )
        .await
        {
            Ok(fill) => fill,
            Err(e) => {
                tracing::error!(symbol = %self.symbol, %reason, "Exit failed, position kept: {}", e);
                self.audit("ERROR", &format!("{} {} sell failed: {}", self.symbol, reason, e));
                return None;
            }
        };

        let profit = realized_profit(position.entry_price, fill.price, self.fee_rate);
        self.state = PositionState::Flat;

        tracing::info!(
            symbol = %self.symbol,
            %reason,
            entry = %position.entry_price,
            exit = %fill.price,
            profit = %profit.round_dp(4),
            "Closed position"
        );

        let action = TradeAction::Exit(reason);
        self.record_trade(action, fill.price, position.quantity, profit);
        let feedback = FeedbackRecord {
            timestamp: fill.timestamp,
            symbol: self.symbol.clone(),
            predicted_return: position.predicted_return,
            action,
            realized_profit: profit,
        };
        if let Err(e) = self.recorder.feedback(&feedback) {
            tracing::warn!(symbol = %self.symbol, "Failed to write feedback record: {}", e);
        }

        Some(ClosedTrade {
            symbol: self.symbol.clone(),
            reason,
            entry_price: position.entry_price,
            exit_price: fill.price,
            quantity: position.quantity,
            profit_per_unit: profit,
        })
    }

    fn record_trade(&self, action: TradeAction, price: Decimal, quantity: Decimal, profit: Decimal) {
        let record = TradeRecord {
            timestamp: Utc::now(),
            symbol: self.symbol.clone(),
            action,
            price,
            quantity,
            profit,
        };
        if let Err(e) = self.recorder.trade(&record) {
            tracing::warn!(symbol = %self.symbol, "Failed to write trade record: {}", e);
        }
    }

    fn audit(&self, event: &str, detail: &str) {
        if let Err(e) = self.recorder.audit(event, detail) {
            tracing::warn!("Failed to write audit line: {}", e);
        }
    }
}
