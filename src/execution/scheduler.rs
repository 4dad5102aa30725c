use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

use crate::execution::portfolio::{PortfolioManager, UpdateReport};
use crate::execution::position::ClosedTrade;
use crate::models::{Symbol, SymbolSignal};
use crate::persistence::RecordSink;
use crate::strategy::{SignalBatch, SignalSource};

type Signals = HashMap<Symbol, SymbolSignal>;

/// Slow-cadence timer. Fires once `now >= next`, then re-arms at
/// `now + interval`; missed decisions are not caught up.
#[derive(Debug, Clone)]
pub struct DecisionClock {
    interval: Duration,
    next: Instant,
}

impl DecisionClock {
    /// First decision is due at `start`
    pub fn new(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            next: start,
        }
    }

    pub fn next_decision(&self) -> Instant {
        self.next
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next
    }

    /// Returns true and re-arms when a decision is due
    pub fn fire(&mut self, now: Instant) -> bool {
        if !self.is_due(now) {
            return false;
        }
        self.next = now + self.interval;
        true
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub price_interval: Duration,
    pub decision_interval: Duration,
    pub error_backoff: Duration,
}

/// Outcome of one fast tick
#[derive(Debug, Default)]
pub struct TickReport {
    pub closed: Vec<ClosedTrade>,
    /// Set when a completed signal generation was applied this tick
    pub decision: Option<UpdateReport>,
    pub generation_started: bool,
}

/// Control loop: monitors positions every tick and re-decides on the slow cadence.
///
/// Signal generation runs on its own task so a slow model never delays
/// monitoring. Its result is applied on the first tick after it completes.
pub struct DecisionScheduler {
    portfolio: PortfolioManager,
    source: Arc<dyn SignalSource>,
    recorder: Arc<dyn RecordSink>,
    clock: DecisionClock,
    config: SchedulerConfig,
    pending: Option<JoinHandle<SignalBatch>>,
}

impl DecisionScheduler {
    pub fn new(
        portfolio: PortfolioManager,
        source: Arc<dyn SignalSource>,
        recorder: Arc<dyn RecordSink>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            portfolio,
            source,
            recorder,
            clock: DecisionClock::new(config.decision_interval, Instant::now()),
            config,
            pending: None,
        }
    }

    pub fn portfolio(&self) -> &PortfolioManager {
        &self.portfolio
    }

    pub fn clock(&self) -> &DecisionClock {
        &self.clock
    }

    /// True while a signal generation task exists, finished or not
    pub fn generation_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn generation_finished(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| h.is_finished())
    }

    /// Run until `shutdown` flips to true or its sender is dropped.
    ///
    /// A tick in progress always completes; a pending signal generation is aborted.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "🔄 Scheduler starting (price check every {}s, decision every {}s, source: {})",
            self.config.price_interval.as_secs(),
            self.config.decision_interval.as_secs(),
            self.source.name()
        );

        let mut ticker = interval_at(Instant::now(), self.config.price_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.tick_at(Instant::now()).await {
                tracing::error!("❌ Tick failed: {}", e);
                self.audit("ERROR", &e.to_string());

                tokio::select! {
                    _ = tokio::time::sleep(self.config.error_backoff) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }

        if let Some(handle) = self.pending.take() {
            handle.abort();
            tracing::info!("Aborted in-flight signal generation");
        }
        tracing::info!("Scheduler stopped with {} open position(s)", self.portfolio.len());
    }

    /// One fast tick at `now`.
    ///
    /// Fails only when the signal task panicked or was cancelled; the
    /// generation is dropped and the next one starts on the decision cadence.
    pub async fn tick_at(&mut self, now: Instant) -> Result<TickReport, JoinError> {
        let mut report = TickReport {
            closed: self.portfolio.monitor_all().await,
            ..TickReport::default()
        };

        if self.generation_finished() {
            if let Some(handle) = self.pending.take() {
                let batch = handle.await?;
                // Held positions were already polled above
                report.decision = Some(self.apply(batch, true).await);
            }
        }

        if self.pending.is_none() && self.clock.fire(now) {
            self.spawn_generation();
            report.generation_started = true;
        }

        if report.decision.is_none() {
            let detail = format!(
                "price monitoring ({}), {} open",
                Utc::now().format("%H:%M:%S"),
                self.portfolio.len()
            );
            tracing::debug!("👀 {}", detail);
            self.audit("WATCH", &detail);
        }

        Ok(report)
    }

    /// Wait for the in-flight generation and apply it immediately
    pub async fn settle_decision(&mut self) -> Option<Result<UpdateReport, JoinError>> {
        let handle = self.pending.take()?;
        Some(match handle.await {
            Ok(batch) => Ok(self.apply(batch, false).await),
            Err(e) => Err(e),
        })
    }

    fn spawn_generation(&mut self) {
        let source = Arc::clone(&self.source);
        let symbols = self.portfolio.universe().to_vec();
        tracing::debug!("Starting signal generation for {} symbols", symbols.len());

        self.pending = Some(tokio::spawn(async move {
            source.generate_signals(&symbols).await
        }));
    }

    async fn apply(&mut self, batch: SignalBatch, monitored: bool) -> UpdateReport {
        for (symbol, error) in &batch.failures {
            tracing::warn!(symbol = %symbol, "⚠️  No signal this cycle: {}", error);
            self.audit("ERROR", &format!("{} signal failed: {}", symbol, error));
        }

        let detail = describe(&batch.signals);
        tracing::info!("🧠 [DECISION] {}", detail);
        self.audit("DECISION", &detail);

        let report = if monitored {
            self.portfolio.update_monitored(&batch.signals).await
        } else {
            self.portfolio.update(&batch.signals).await
        };

        for symbol in &report.opened {
            tracing::info!("✅ Opened {}", symbol);
        }
        for trade in &report.closed {
            tracing::info!(
                "💰 Closed {} ({}) profit/unit {}",
                trade.symbol,
                trade.reason,
                trade.profit_per_unit.round_dp(4)
            );
        }
        self.log_summary();
        report
    }

    fn log_summary(&self) {
        let summary = self.portfolio.summary();
        tracing::info!(
            "📊 Portfolio: {}/{} positions",
            summary.len(),
            self.portfolio.max_positions()
        );
        for position in summary {
            tracing::info!("  {}", position);
        }
    }

    fn audit(&self, event: &str, detail: &str) {
        if let Err(e) = self.recorder.audit(event, detail) {
            tracing::warn!("Failed to write audit line: {}", e);
        }
    }
}

/// `BTCUSDT=BUY ETHUSDT=HOLD`, sorted by symbol
fn describe(signals: &Signals) -> String {
    let mut entries: Vec<_> = signals.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
        .into_iter()
        .map(|(symbol, s)| format!("{}={}", symbol, s.signal))
        .collect::<Vec<_>>()
        .join(" ")
}
