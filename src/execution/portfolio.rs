use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::TradeError;
use crate::execution::position::{ClosedTrade, EntryPlan, PositionExecutor, PositionSummary};
use crate::execution::sizing::lot_size_quantity;
use crate::models::{ExitReason, Signal, Symbol, SymbolSignal};
use crate::persistence::RecordSink;
use crate::risk::RiskModel;
use crate::venue::{with_timeout, Venue};

/// Limits applied when admitting new positions
#[derive(Debug, Clone)]
pub struct PortfolioLimits {
    pub max_positions: usize,
    /// Quote amount spent per entry
    pub trade_notional: Decimal,
    pub fee_rate: Decimal,
    pub call_timeout: Duration,
}

/// What one `update` call did
#[derive(Debug, Default)]
pub struct UpdateReport {
    pub opened: Vec<Symbol>,
    pub closed: Vec<ClosedTrade>,
    /// Buy signals that did not result in a position, with the reason
    pub skipped: Vec<(Symbol, String)>,
}

/// Routes per-symbol signals to position executors, capping concurrent longs.
///
/// The registry only ever contains Long executors; a symbol leaves it as soon
/// as its executor returns to Flat.
pub struct PortfolioManager {
    universe: Vec<Symbol>,
    registry: HashMap<Symbol, PositionExecutor>,
    limits: PortfolioLimits,
    risk: RiskModel,
    venue: Arc<dyn Venue>,
    recorder: Arc<dyn RecordSink>,
}

impl PortfolioManager {
    pub fn new(
        universe: Vec<Symbol>,
        limits: PortfolioLimits,
        risk: RiskModel,
        venue: Arc<dyn Venue>,
        recorder: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            universe,
            registry: HashMap::new(),
            limits,
            risk,
            venue,
            recorder,
        }
    }

    pub fn universe(&self) -> &[Symbol] {
        &self.universe
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn is_held(&self, symbol: &Symbol) -> bool {
        self.registry.contains_key(symbol)
    }

    pub fn max_positions(&self) -> usize {
        self.limits.max_positions
    }

    /// Snapshot of open positions, sorted by symbol
    pub fn summary(&self) -> Vec<PositionSummary> {
        let mut summary: Vec<_> = self.registry.values().map(|e| e.summary()).collect();
        summary.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        summary
    }

    /// Apply one decision cycle's signals.
    ///
    /// Exits for held symbols run first and concurrently, then Buy signals
    /// are admitted one at a time in universe order while slots remain.
    /// Held symbols with any other signal are monitored at a fresh price.
    pub async fn update(&mut self, signals: &HashMap<Symbol, SymbolSignal>) -> UpdateReport {
        self.route(signals, true).await
    }

    /// `update` for a caller that already ran `monitor_all` in the same tick:
    /// held symbols are only touched by Sell/Stop.
    pub async fn update_monitored(
        &mut self,
        signals: &HashMap<Symbol, SymbolSignal>,
    ) -> UpdateReport {
        self.route(signals, false).await
    }

    async fn route(
        &mut self,
        signals: &HashMap<Symbol, SymbolSignal>,
        poll_held: bool,
    ) -> UpdateReport {
        let mut report = UpdateReport::default();

        for symbol in signals.keys() {
            if !self.universe.contains(symbol) {
                tracing::debug!(symbol = %symbol, "Ignoring signal outside the universe");
            }
        }

        let held = self.registry.iter_mut().filter_map(|(symbol, executor)| {
            let signal = signals.get(symbol)?.signal;
            let reason = exit_reason(signal);
            if reason.is_none() && !poll_held {
                return None;
            }
            Some(async move {
                let result = match reason {
                    Some(reason) => Ok(executor.close(reason).await),
                    None => executor.poll().await,
                };
                (symbol.clone(), result)
            })
        });
        let results = join_all(held).await;
        self.collect(results, &mut report.closed);

        let candidates: Vec<(Symbol, SymbolSignal)> = self
            .universe
            .iter()
            .filter(|symbol| !self.registry.contains_key(*symbol))
            .filter_map(|symbol| {
                let signal = signals.get(symbol)?;
                (signal.signal == Signal::Buy).then(|| (symbol.clone(), signal.clone()))
            })
            .collect();

        for (symbol, signal) in candidates {
            if self.registry.len() >= self.limits.max_positions {
                tracing::debug!(
                    symbol = %symbol,
                    max_positions = self.limits.max_positions,
                    "Buy dropped, position cap reached"
                );
                report.skipped.push((symbol, "position cap reached".to_string()));
                continue;
            }

            match self.admit(&symbol, &signal).await {
                Ok(()) => report.opened.push(symbol),
                Err(e) => {
                    tracing::warn!(symbol = %symbol, "Entry skipped: {}", e);
                    match &e {
                        TradeError::Venue(_) => {
                            self.audit("ERROR", &format!("{} entry failed: {}", symbol, e))
                        }
                        _ => self.audit("SKIP", &format!("{} entry skipped: {}", symbol, e)),
                    }
                    report.skipped.push((symbol, e.to_string()));
                }
            }
        }

        report
    }

    /// Fast-cadence tick: every held position checks its exits at a fresh price
    pub async fn monitor_all(&mut self) -> Vec<ClosedTrade> {
        let polls = self.registry.iter_mut().map(|(symbol, executor)| async move {
            (symbol.clone(), executor.poll().await)
        });
        let results = join_all(polls).await;

        let mut closed = Vec::new();
        self.collect(results, &mut closed);
        closed
    }

    async fn admit(&mut self, symbol: &Symbol, signal: &SymbolSignal) -> Result<(), TradeError> {
        let timeout = self.limits.call_timeout;
        let price = with_timeout("get_price", timeout, self.venue.get_price(symbol)).await?;

        let volatility = signal.volatility.unwrap_or(f64::NAN);
        let thresholds = self.risk.thresholds(price, volatility)?;

        let filters = with_timeout(
            "get_symbol_filters",
            timeout,
            self.venue.get_symbol_filters(symbol),
        )
        .await?;
        let quantity =
            lot_size_quantity(symbol, self.limits.trade_notional, price, filters.step_size)?;

        let mut executor = PositionExecutor::new(
            symbol.clone(),
            self.venue.clone(),
            self.recorder.clone(),
            self.limits.fee_rate,
            timeout,
        );
        executor
            .open(EntryPlan {
                quantity,
                step_size: filters.step_size,
                quoted_price: price,
                thresholds,
                predicted_return: signal.predicted_return,
            })
            .await?;

        self.registry.insert(symbol.clone(), executor);
        Ok(())
    }

    /// Drop Flat executors and log per-symbol failures
    fn collect(
        &mut self,
        results: Vec<(Symbol, Result<Option<ClosedTrade>, TradeError>)>,
        closed: &mut Vec<ClosedTrade>,
    ) {
        for (symbol, result) in results {
            match result {
                Ok(Some(trade)) => closed.push(trade),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(symbol = %symbol, "Monitoring failed: {}", e);
                    self.audit("ERROR", &format!("{} monitor failed: {}", symbol, e));
                }
            }
        }
        self.registry.retain(|_, executor| executor.is_long());
    }

    fn audit(&self, event: &str, detail: &str) {
        if let Err(e) = self.recorder.audit(event, detail) {
            tracing::warn!("Failed to write audit line: {}", e);
        }
    }
}

fn exit_reason(signal: Signal) -> Option<ExitReason> {
    match signal {
        Signal::Sell => Some(ExitReason::SellSignal),
        Signal::Stop => Some(ExitReason::StopSignal),
        Signal::Buy | Signal::Hold => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::position::PositionState;
    use crate::models::{OrderSide, TradeAction};
    use crate::persistence::MemoryRecorder;
    use crate::venue::mock::MockVenue;
    use rust_decimal_macros::dec;

    const UNIVERSE: [&str; 3] = ["BTCUSDT", "ETHUSDT", "SOLUSDT"];

    fn setup(max_positions: usize) -> (Arc<MockVenue>, Arc<MemoryRecorder>, PortfolioManager) {
        let venue = Arc::new(MockVenue::new(dec!(0.001)));
        for symbol in UNIVERSE {
            venue.set_price(symbol, dec!(100));
        }
        let recorder = Arc::new(MemoryRecorder::new());
        let manager = PortfolioManager::new(
            UNIVERSE.iter().map(|s| Symbol::new(*s)).collect(),
            PortfolioLimits {
                max_positions,
                trade_notional: dec!(10),
                fee_rate: Decimal::ZERO,
                call_timeout: Duration::from_millis(200),
            },
            RiskModel::default(),
            venue.clone(),
            recorder.clone(),
        );
        (venue, recorder, manager)
    }

    fn buy() -> SymbolSignal {
        SymbolSignal::new(Signal::Buy, 0.001, Some(0.01))
    }

    fn signals(entries: &[(&str, SymbolSignal)]) -> HashMap<Symbol, SymbolSignal> {
        entries
            .iter()
            .map(|(s, sig)| (Symbol::new(*s), sig.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_cap_respected_in_universe_order() {
        let (_, _, mut manager) = setup(2);
        let report = manager
            .update(&signals(&[
                ("SOLUSDT", buy()),
                ("ETHUSDT", buy()),
                ("BTCUSDT", buy()),
            ]))
            .await;

        assert_eq!(manager.len(), 2);
        assert_eq!(
            report.opened,
            vec![Symbol::new("BTCUSDT"), Symbol::new("ETHUSDT")]
        );
        assert_eq!(report.skipped[0].0, Symbol::new("SOLUSDT"));
    }

    #[tokio::test]
    async fn test_single_slot_goes_to_first_in_universe() {
        let (_, _, mut manager) = setup(1);
        manager
            .update(&signals(&[("ETHUSDT", buy()), ("BTCUSDT", buy())]))
            .await;

        assert_eq!(manager.len(), 1);
        assert!(manager.is_held(&Symbol::new("BTCUSDT")));
    }

    #[tokio::test]
    async fn test_repeated_buy_is_idempotent() {
        let (venue, _, mut manager) = setup(3);
        let cycle = signals(&[("BTCUSDT", buy())]);

        manager.update(&cycle).await;
        manager.update(&cycle).await;

        assert_eq!(manager.len(), 1);
        let buys = venue
            .orders()
            .iter()
            .filter(|(side, _, _)| *side == OrderSide::Buy)
            .count();
        assert_eq!(buys, 1);
    }

    #[tokio::test]
    async fn test_sell_for_flat_symbol_is_noop() {
        let (venue, _, mut manager) = setup(3);
        let report = manager
            .update(&signals(&[
                ("BTCUSDT", Signal::Sell.into()),
                ("ETHUSDT", Signal::Stop.into()),
            ]))
            .await;

        assert!(manager.is_empty());
        assert!(report.closed.is_empty());
        assert!(venue.orders().is_empty());
    }

    #[tokio::test]
    async fn test_exit_frees_slot_in_same_cycle() {
        let (_, recorder, mut manager) = setup(1);
        manager.update(&signals(&[("BTCUSDT", buy())])).await;

        let report = manager
            .update(&signals(&[
                ("BTCUSDT", Signal::Stop.into()),
                ("ETHUSDT", buy()),
            ]))
            .await;

        assert_eq!(report.closed.len(), 1);
        assert_eq!(report.closed[0].reason, ExitReason::StopSignal);
        assert_eq!(report.opened, vec![Symbol::new("ETHUSDT")]);
        assert!(manager.is_held(&Symbol::new("ETHUSDT")));
        assert!(!manager.is_held(&Symbol::new("BTCUSDT")));
        assert_eq!(recorder.feedback_records().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_volatility_skips_symbol() {
        let (venue, _, mut manager) = setup(3);
        let report = manager
            .update(&signals(&[
                ("BTCUSDT", SymbolSignal::new(Signal::Buy, 0.0, None)),
                ("ETHUSDT", SymbolSignal::new(Signal::Buy, 0.0, Some(0.0))),
                ("SOLUSDT", buy()),
            ]))
            .await;

        assert_eq!(report.opened, vec![Symbol::new("SOLUSDT")]);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(venue.orders().len(), 1);
    }

    #[tokio::test]
    async fn test_quantity_too_small_skips_symbol() {
        let (venue, _, mut manager) = setup(3);
        venue.set_price("BTCUSDT", dec!(100000));

        let report = manager.update(&signals(&[("BTCUSDT", buy())])).await;

        assert!(report.opened.is_empty());
        assert!(report.skipped[0].1.contains("Quantity too small"));
        assert!(venue.orders().is_empty());
    }

    #[tokio::test]
    async fn test_venue_failure_isolated_to_symbol() {
        let (venue, recorder, mut manager) = setup(3);
        venue.fail_buys("BTCUSDT", true);

        let report = manager
            .update(&signals(&[("BTCUSDT", buy()), ("ETHUSDT", buy())]))
            .await;

        assert_eq!(report.opened, vec![Symbol::new("ETHUSDT")]);
        assert_eq!(manager.len(), 1);
        assert_eq!(recorder.audit_lines().len(), 1);
    }

    #[tokio::test]
    async fn test_every_skipped_entry_is_audited() {
        let (venue, recorder, mut manager) = setup(3);
        venue.set_price("ETHUSDT", dec!(100000));
        venue.fail_buys("SOLUSDT", true);

        let report = manager
            .update(&signals(&[
                ("BTCUSDT", SymbolSignal::new(Signal::Buy, 0.0, Some(0.0))),
                ("ETHUSDT", buy()),
                ("SOLUSDT", buy()),
            ]))
            .await;

        assert_eq!(report.skipped.len(), 3);
        let audit = recorder.audit_lines();
        assert_eq!(audit.len(), 3);
        assert_eq!(audit[0].0, "SKIP");
        assert!(audit[0].1.starts_with("BTCUSDT entry skipped: Invalid volatility"));
        assert_eq!(audit[1].0, "SKIP");
        assert!(audit[1].1.starts_with("ETHUSDT entry skipped: Quantity too small"));
        assert_eq!(audit[2].0, "ERROR");
        assert!(audit[2].1.starts_with("SOLUSDT entry failed"));
    }

    #[tokio::test]
    async fn test_cap_drop_is_not_audited() {
        let (_, recorder, mut manager) = setup(1);
        let report = manager
            .update(&signals(&[("BTCUSDT", buy()), ("ETHUSDT", buy())]))
            .await;

        assert_eq!(report.skipped.len(), 1);
        assert!(recorder.audit_lines().is_empty());
    }

    #[tokio::test]
    async fn test_thresholds_survive_new_volatility() {
        let (venue, _, mut manager) = setup(3);
        let btc = Symbol::new("BTCUSDT");
        manager.update(&signals(&[("BTCUSDT", buy())])).await;

        // Much wider thresholds would follow from this signal if it were applied
        let wide = SymbolSignal::new(Signal::Buy, 0.001, Some(0.5));
        let report = manager.update(&signals(&[("BTCUSDT", wide)])).await;
        assert!(report.opened.is_empty());

        match &manager.summary()[0].state {
            PositionState::Long(p) => {
                assert_eq!(p.stop_price(), dec!(98.8));
                assert_eq!(p.target_price(), dec!(102));
            }
            other => panic!("expected {} to be Long, got {:?}", btc, other),
        }

        venue.set_price("BTCUSDT", dec!(98.8));
        let closed = manager.monitor_all().await;
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].reason, ExitReason::StopLoss);
        assert!(!manager.is_held(&btc));
    }

    #[tokio::test]
    async fn test_update_monitored_leaves_held_symbols_alone() {
        let (_, recorder, mut manager) = setup(3);
        manager.update(&signals(&[("BTCUSDT", buy())])).await;
        let holds = || {
            recorder
                .trade_records()
                .iter()
                .filter(|t| t.action == TradeAction::Hold)
                .count()
        };

        manager
            .update(&signals(&[("BTCUSDT", Signal::Hold.into())]))
            .await;
        assert_eq!(holds(), 1);

        manager
            .update_monitored(&signals(&[("BTCUSDT", Signal::Hold.into())]))
            .await;
        assert_eq!(holds(), 1);

        // Exits still go through
        let report = manager
            .update_monitored(&signals(&[("BTCUSDT", Signal::Sell.into())]))
            .await;
        assert_eq!(report.closed[0].reason, ExitReason::SellSignal);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_signals_outside_universe_ignored() {
        let (venue, _, mut manager) = setup(3);
        manager.update(&signals(&[("DOGEUSDT", buy())])).await;

        assert!(manager.is_empty());
        assert!(venue.orders().is_empty());
    }

    #[tokio::test]
    async fn test_monitor_all_closes_on_stop_loss() {
        let (venue, _, mut manager) = setup(3);
        manager
            .update(&signals(&[("BTCUSDT", buy()), ("ETHUSDT", buy())]))
            .await;

        // sl fraction = 0.01 * 1.2
        venue.set_price("BTCUSDT", dec!(98.8));
        let closed = manager.monitor_all().await;

        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].reason, ExitReason::StopLoss);
        assert_eq!(manager.len(), 1);
        assert!(manager.is_held(&Symbol::new("ETHUSDT")));
    }

    #[tokio::test]
    async fn test_monitor_failure_keeps_position() {
        let (venue, recorder, mut manager) = setup(3);
        manager.update(&signals(&[("BTCUSDT", buy())])).await;
        venue.fail_prices("BTCUSDT", true);

        let closed = manager.monitor_all().await;

        assert!(closed.is_empty());
        assert_eq!(manager.len(), 1);
        assert_eq!(recorder.audit_lines()[0].0, "ERROR");
    }

    #[tokio::test]
    async fn test_cap_invariant_over_many_cycles() {
        let (_, _, mut manager) = setup(2);
        let cycles = [
            vec![("BTCUSDT", buy()), ("ETHUSDT", buy()), ("SOLUSDT", buy())],
            vec![("ETHUSDT", Signal::Sell.into()), ("SOLUSDT", buy())],
            vec![("BTCUSDT", Signal::Hold.into()), ("ETHUSDT", buy())],
            vec![("BTCUSDT", Signal::Stop.into()), ("SOLUSDT", Signal::Sell.into())],
            vec![("BTCUSDT", buy()), ("ETHUSDT", buy()), ("SOLUSDT", buy())],
        ];

        for cycle in cycles.iter() {
            manager.update(&signals(cycle)).await;
            assert!(manager.len() <= manager.max_positions());
        }
        assert_eq!(manager.len(), 2);
    }

    #[tokio::test]
    async fn test_summary_sorted_by_symbol() {
        let (_, _, mut manager) = setup(3);
        manager
            .update(&signals(&[("SOLUSDT", buy()), ("BTCUSDT", buy())]))
            .await;

        let symbols: Vec<_> = manager.summary().into_iter().map(|s| s.symbol).collect();
        assert_eq!(symbols, vec![Symbol::new("BTCUSDT"), Symbol::new("SOLUSDT")]);
    }
}
