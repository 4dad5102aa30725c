//! Runtime settings: optional TOML file overlaid by `SPOTBOT__*` environment variables.

use config::{Config, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::Symbol;
use crate::risk::RiskModel;
use crate::strategy::STRATEGY_NAMES;
use crate::venue::binance::{Credentials, BINANCE_TESTNET_URL};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const ENV_PREFIX: &str = "SPOTBOT";

/// Where orders are executed
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VenueMode {
    /// Simulated account on live market data
    #[default]
    Paper,
    /// Signed orders against the account behind `api_key`
    Binance,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub api_url: String,
    pub venue: VenueMode,
    /// Usually supplied as `SPOTBOT__API_KEY`
    pub api_key: Option<String>,
    /// Usually supplied as `SPOTBOT__API_SECRET`
    #[serde(skip_serializing)]
    pub api_secret: Option<String>,
    pub strategy: String,
    pub symbols: Vec<String>,
    pub quote_asset: String,
    pub max_positions: usize,
    pub price_check_interval_secs: u64,
    pub decision_interval_secs: u64,
    /// Quote amount spent per entry
    pub fixed_trade_usd: Decimal,
    pub fee_rate: Decimal,
    /// Warn at startup below this free quote balance
    pub min_quote_balance: Decimal,
    pub log_dir: PathBuf,
    pub venue_timeout_secs: u64,
    pub error_backoff_secs: u64,
    pub kline_interval: String,
    pub kline_limit: usize,
    pub requests_per_minute: u32,
    /// Starting quote balance of the paper account
    pub paper_quote_balance: Decimal,
    pub risk: RiskModel,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: BINANCE_TESTNET_URL.to_string(),
            venue: VenueMode::Paper,
            api_key: None,
            api_secret: None,
            strategy: "rsi_ma".to_string(),
            symbols: Vec::new(),
            quote_asset: "USDT".to_string(),
            max_positions: 3,
            price_check_interval_secs: 60,
            decision_interval_secs: 300,
            fixed_trade_usd: dec!(10),
            fee_rate: dec!(0.001),
            min_quote_balance: dec!(10),
            log_dir: PathBuf::from("logs"),
            venue_timeout_secs: 10,
            error_backoff_secs: 60,
            kline_interval: "5m".to_string(),
            kline_limit: 100,
            requests_per_minute: 1200,
            paper_quote_balance: dec!(1000),
            risk: RiskModel::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load and validate settings.
    ///
    /// An explicit `path` must exist; without one `config.toml` is read if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_PATH).required(false),
        };

        let config = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("symbols")
                    .try_parsing(true),
            )
            .build()?;

        Self::from_config(config)
    }

    pub(crate) fn from_config(config: Config) -> Result<Self, ConfigError> {
        let mut settings: Settings = config.try_deserialize()?;
        settings.quote_asset = settings.quote_asset.to_uppercase();
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.symbols.is_empty() {
            return invalid("symbols must name at least one instrument".to_string());
        }
        if self.quote_asset.is_empty() {
            return invalid("quote_asset must not be empty".to_string());
        }

        let mut seen = HashSet::new();
        for symbol in self.universe() {
            if symbol.base_asset(&self.quote_asset).is_none() {
                return invalid(format!(
                    "symbol {} is not quoted in {}",
                    symbol, self.quote_asset
                ));
            }
            if !seen.insert(symbol.clone()) {
                return invalid(format!("symbol {} listed twice", symbol));
            }
        }

        if self.max_positions == 0 {
            return invalid("max_positions must be at least 1".to_string());
        }
        if self.fixed_trade_usd <= Decimal::ZERO {
            return invalid(format!(
                "fixed_trade_usd must be positive, got {}",
                self.fixed_trade_usd
            ));
        }
        if self.fee_rate < Decimal::ZERO || self.fee_rate >= Decimal::ONE {
            return invalid(format!("fee_rate must be in [0, 1), got {}", self.fee_rate));
        }
        if self.price_check_interval_secs == 0 || self.decision_interval_secs == 0 {
            return invalid("intervals must be at least one second".to_string());
        }
        if self.decision_interval_secs < self.price_check_interval_secs {
            return invalid(format!(
                "decision_interval_secs ({}) is shorter than price_check_interval_secs ({})",
                self.decision_interval_secs, self.price_check_interval_secs
            ));
        }
        if self.venue_timeout_secs == 0 {
            return invalid("venue_timeout_secs must be at least one second".to_string());
        }
        if self.kline_limit == 0 {
            return invalid("kline_limit must be positive".to_string());
        }
        if self.venue == VenueMode::Binance && self.credentials().is_none() {
            return invalid("venue = \"binance\" requires api_key and api_secret".to_string());
        }
        if !STRATEGY_NAMES.contains(&self.strategy.to_lowercase().as_str()) {
            return invalid(format!(
                "unknown strategy '{}', expected one of {:?}",
                self.strategy, STRATEGY_NAMES
            ));
        }
        let multipliers = [
            self.risk.stop_loss_multiplier,
            self.risk.take_profit_multiplier,
        ];
        if multipliers.iter().any(|m| !m.is_finite() || *m <= 0.0) {
            return invalid(format!(
                "risk multipliers must be positive, got {:?}",
                multipliers
            ));
        }

        Ok(())
    }

    /// API key pair, when both halves are set and non-empty
    pub fn credentials(&self) -> Option<Credentials> {
        let key = self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())?;
        let secret = self.api_secret.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some(Credentials::new(key, secret))
    }

    /// Configured symbols in configuration order
    pub fn universe(&self) -> Vec<Symbol> {
        self.symbols.iter().map(|s| Symbol::new(s.trim())).collect()
    }

    pub fn price_check_interval(&self) -> Duration {
        Duration::from_secs(self.price_check_interval_secs)
    }

    pub fn decision_interval(&self) -> Duration {
        Duration::from_secs(self.decision_interval_secs)
    }

    pub fn venue_timeout(&self) -> Duration {
        Duration::from_secs(self.venue_timeout_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}
