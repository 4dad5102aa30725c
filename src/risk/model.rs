use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::TradeError;

/// Decimal places kept on threshold fractions
const FRACTION_DP: u32 = 5;

/// Volatility-scaled stop-loss / take-profit distances
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskModel {
    pub stop_loss_multiplier: f64,
    pub take_profit_multiplier: f64,
}

impl Default for RiskModel {
    fn default() -> Self {
        Self {
            stop_loss_multiplier: 1.2,
            take_profit_multiplier: 2.0,
        }
    }
}

/// Exit distances fixed at entry time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskThresholds {
    /// Fraction below entry that triggers a stop-loss
    pub stop_loss_frac: Decimal,
    /// Fraction above entry that triggers a take-profit
    pub take_profit_frac: Decimal,
    /// Stop price anchored on the quoted price
    pub stop_price: Decimal,
    /// Target price anchored on the quoted price
    pub target_price: Decimal,
}

impl RiskThresholds {
    /// Build thresholds from explicit fractions, anchored on `price`
    pub fn from_fractions(price: Decimal, stop_loss_frac: Decimal, take_profit_frac: Decimal) -> Self {
        Self {
            stop_loss_frac,
            take_profit_frac,
            stop_price: price * (Decimal::ONE - stop_loss_frac),
            target_price: price * (Decimal::ONE + take_profit_frac),
        }
    }
}

impl RiskModel {
    pub fn new(stop_loss_multiplier: f64, take_profit_multiplier: f64) -> Self {
        Self {
            stop_loss_multiplier,
            take_profit_multiplier,
        }
    }

    /// Derive stop-loss and take-profit fractions from a return volatility.
    ///
    /// Fails with `InvalidVolatility` when the volatility is zero, negative or
    /// not finite, when either fraction rounds to zero, or when the price
    /// cannot anchor the thresholds. Callers skip entry for that symbol.
    pub fn thresholds(
        &self,
        current_price: Decimal,
        volatility: f64,
    ) -> Result<RiskThresholds, TradeError> {
        let invalid = || TradeError::InvalidVolatility {
            volatility,
            price: current_price,
        };

        if !volatility.is_finite() || volatility <= 0.0 || current_price <= Decimal::ZERO {
            return Err(invalid());
        }

        let stop_loss_frac = to_fraction(volatility * self.stop_loss_multiplier).ok_or_else(invalid)?;
        let take_profit_frac =
            to_fraction(volatility * self.take_profit_multiplier).ok_or_else(invalid)?;

        Ok(RiskThresholds::from_fractions(
            current_price,
            stop_loss_frac,
            take_profit_frac,
        ))
    }
}

fn to_fraction(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(FRACTION_DP))
        .filter(|d| *d > Decimal::ZERO)
}
