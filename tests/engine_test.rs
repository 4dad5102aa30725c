use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use spotbot::execution::{DecisionScheduler, PortfolioLimits, PortfolioManager, SchedulerConfig};
use spotbot::persistence::{CsvRecorder, FeedbackSummary, MemoryRecorder, RecordSink};
use spotbot::risk::RiskModel;
use spotbot::strategy::build_signal_source;
use spotbot::venue::{MarketData, PaperVenue, Venue};
use spotbot::{Candle, ExitReason, Signal, Symbol, SymbolFilters, SymbolSignal, TradeAction, VenueError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

/// Market data with scripted prices and a +2/-1 sawtooth kline history
struct ScriptedMarket {
    prices: Mutex<HashMap<Symbol, Decimal>>,
}

impl ScriptedMarket {
    fn new(prices: &[(&str, Decimal)]) -> Self {
        Self {
            prices: Mutex::new(
                prices
                    .iter()
                    .map(|(s, p)| (Symbol::new(*s), *p))
                    .collect(),
            ),
        }
    }

    fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.lock().unwrap().insert(Symbol::new(symbol), price);
    }
}

#[async_trait]
impl MarketData for ScriptedMarket {
    async fn get_price(&self, symbol: &Symbol) -> Result<Decimal, VenueError> {
        self.prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| VenueError::UnknownSymbol(symbol.to_string()))
    }

    async fn get_symbol_filters(&self, _symbol: &Symbol) -> Result<SymbolFilters, VenueError> {
        Ok(SymbolFilters {
            step_size: dec!(0.001),
        })
    }

    async fn get_klines(
        &self,
        symbol: &Symbol,
        _interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, VenueError> {
        Ok((0..limit)
            .map(|i| {
                let k = (i / 2) as f64;
                let close = if i % 2 == 0 { 100.0 + k } else { 102.0 + k };
                Candle {
                    symbol: symbol.clone(),
                    timestamp: Utc::now(),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1.0,
                }
            })
            .collect())
    }
}

struct Engine {
    market: Arc<ScriptedMarket>,
    venue: Arc<PaperVenue>,
    recorder: Arc<MemoryRecorder>,
    portfolio: PortfolioManager,
}

fn engine(max_positions: usize, quote_balance: Decimal) -> Engine {
    let market = Arc::new(ScriptedMarket::new(&[
        ("BTCUSDT", dec!(100)),
        ("ETHUSDT", dec!(50)),
    ]));
    let venue = Arc::new(
        PaperVenue::new(market.clone(), "USDT", dec!(0.001)).with_balance("USDT", quote_balance),
    );
    let recorder = Arc::new(MemoryRecorder::new());
    let portfolio = PortfolioManager::new(
        vec![Symbol::new("BTCUSDT"), Symbol::new("ETHUSDT")],
        PortfolioLimits {
            max_positions,
            trade_notional: dec!(10),
            fee_rate: dec!(0.001),
            call_timeout: Duration::from_secs(1),
        },
        RiskModel::default(),
        venue.clone(),
        recorder.clone(),
    );
    Engine {
        market,
        venue,
        recorder,
        portfolio,
    }
}

fn buy(volatility: f64) -> SymbolSignal {
    SymbolSignal::new(Signal::Buy, 0.0015, Some(volatility))
}

#[tokio::test]
async fn test_paper_round_trip_take_profit() {
    let mut e = engine(2, dec!(1000));
    let mut signals = HashMap::new();
    signals.insert(Symbol::new("BTCUSDT"), buy(0.01));

    let report = e.portfolio.update(&signals).await;
    assert_eq!(report.opened, vec![Symbol::new("BTCUSDT")]);

    // 10 USDT at 100 -> 0.1 BTC, fee 0.01 USDT
    let usdt = assert_ok!(e.venue.get_balance("USDT").await);
    assert_eq!(usdt.free, dec!(989.99));
    assert_eq!(assert_ok!(e.venue.get_balance("BTC").await).free, dec!(0.1));

    // tp fraction = 0.01 * 2.0
    e.market.set_price("BTCUSDT", dec!(101.9));
    assert!(e.portfolio.monitor_all().await.is_empty());

    e.market.set_price("BTCUSDT", dec!(102));
    let closed = e.portfolio.monitor_all().await;
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].reason, ExitReason::TakeProfit);
    // 102 * 0.999 - 100 * 1.001
    assert_eq!(closed[0].profit_per_unit, dec!(1.798));
    assert!(e.portfolio.is_empty());

    let feedback = e.recorder.feedback_records();
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0].action, TradeAction::Exit(ExitReason::TakeProfit));
    assert_eq!(feedback[0].predicted_return, 0.0015);

    let trades = e.recorder.trade_records();
    assert_eq!(trades.first().map(|t| t.action), Some(TradeAction::Buy));
    assert!(trades.iter().any(|t| t.action == TradeAction::Hold));

    assert_eq!(assert_ok!(e.venue.get_balance("BTC").await).free, Decimal::ZERO);
}

#[tokio::test]
async fn test_exhausted_paper_balance_skips_entry() {
    let mut e = engine(2, dec!(15));
    let mut signals = HashMap::new();
    signals.insert(Symbol::new("BTCUSDT"), buy(0.01));
    signals.insert(Symbol::new("ETHUSDT"), buy(0.01));

    let report = e.portfolio.update(&signals).await;

    // First entry takes ~10 USDT, the second cannot be paid for
    assert_eq!(report.opened, vec![Symbol::new("BTCUSDT")]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(e.portfolio.len(), 1);
    assert_err!(e.venue.market_buy(&Symbol::new("ETHUSDT"), dec!(1)).await);

    let audit = e.recorder.audit_lines();
    assert_eq!(audit.len(), 1);
    assert!(audit[0].1.contains("ETHUSDT"));
}

#[tokio::test]
async fn test_sell_signal_closes_and_reopens_next_cycle() {
    let mut e = engine(1, dec!(1000));
    let btc = Symbol::new("BTCUSDT");

    let mut cycle = HashMap::new();
    cycle.insert(btc.clone(), buy(0.02));
    e.portfolio.update(&cycle).await;

    cycle.insert(btc.clone(), Signal::Sell.into());
    let report = e.portfolio.update(&cycle).await;
    assert_eq!(report.closed[0].reason, ExitReason::SellSignal);
    assert!(e.portfolio.is_empty());

    // Re-entry uses thresholds from the new volatility
    cycle.insert(btc.clone(), buy(0.05));
    e.portfolio.update(&cycle).await;
    let summary = e.portfolio.summary();
    assert_eq!(summary.len(), 1);
    assert!(summary[0].to_string().contains("TP 110"));
}

#[tokio::test]
async fn test_scheduler_with_rsi_ma_source() {
    let e = engine(1, dec!(1000));
    let source = assert_ok!(build_signal_source("rsi_ma", e.market.clone(), "5m", 30));

    let mut scheduler = DecisionScheduler::new(
        e.portfolio,
        source,
        e.recorder.clone(),
        SchedulerConfig {
            price_interval: Duration::from_secs(60),
            decision_interval: Duration::from_secs(300),
            error_backoff: Duration::from_secs(60),
        },
    );

    let tick = assert_ok!(scheduler.tick_at(tokio::time::Instant::now()).await);
    assert!(tick.generation_started);

    let report = assert_ok!(scheduler.settle_decision().await.unwrap());
    // Both symbols signal Buy; the single slot goes to the first in universe order
    assert_eq!(report.opened, vec![Symbol::new("BTCUSDT")]);
    assert_eq!(report.skipped[0].0, Symbol::new("ETHUSDT"));
    assert_eq!(scheduler.portfolio().len(), 1);

    let events: Vec<String> = e.recorder.audit_lines().into_iter().map(|(ev, _)| ev).collect();
    assert!(events.contains(&"DECISION".to_string()));
}

#[tokio::test]
async fn test_csv_logs_written_during_trading() {
    let tmp = tempfile::tempdir().unwrap();
    let market = Arc::new(ScriptedMarket::new(&[("BTCUSDT", dec!(100))]));
    let venue: Arc<dyn Venue> =
        Arc::new(PaperVenue::new(market.clone(), "USDT", Decimal::ZERO).with_balance("USDT", dec!(100)));
    let recorder = Arc::new(CsvRecorder::new(tmp.path().join("logs")));

    let mut portfolio = PortfolioManager::new(
        vec![Symbol::new("BTCUSDT")],
        PortfolioLimits {
            max_positions: 1,
            trade_notional: dec!(10),
            fee_rate: Decimal::ZERO,
            call_timeout: Duration::from_secs(1),
        },
        RiskModel::default(),
        venue,
        recorder.clone(),
    );

    let mut signals = HashMap::new();
    signals.insert(Symbol::new("BTCUSDT"), buy(0.01));
    portfolio.update(&signals).await;

    market.set_price("BTCUSDT", dec!(98));
    portfolio.monitor_all().await;

    let trade_log =
        std::fs::read_to_string(recorder.trade_path(&Symbol::new("BTCUSDT"))).unwrap();
    assert!(trade_log.starts_with("timestamp,action,price,quantity,profit\n"));
    assert!(trade_log.contains(",BUY,100,0.100,"));
    assert!(trade_log.contains(",STOP-LOSS,98,0.100,-2.0000"));

    let summary = FeedbackSummary::from_dir(recorder.dir(), 0.001).unwrap().unwrap();
    assert_eq!(summary.trades, 1);
    assert_eq!(summary.losses, 1);
    assert_eq!(summary.above_threshold, 1);

    recorder.audit("STOP", "test").unwrap();
    assert!(recorder.audit_path().exists());
}
