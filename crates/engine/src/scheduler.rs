//! Drives the engine across every enabled symbol on a timer.
//!
//! Symbols are checked one at a time in configured order. Shutdown is only
//! honoured between symbols and between ticks, never inside a check.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use wheel_trade_core::{NotificationLevel, WheelResult};

use crate::engine::{CheckOutcome, WheelEngine};
use crate::report::{MorningBriefing, WeeklyReport};
use crate::ticker::{Days, MarketHours, Trigger};

/// Cloneable stop signal shared with the signal handler.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    stopped: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl ShutdownHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Resolves once `trigger` has been called.
    pub async fn wait(&self) {
        loop {
            let notified = self.wake.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

/// Result of one pass over the symbols.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub at: DateTime<Utc>,
    /// Skipped because the market was closed.
    pub gated: bool,
    /// Shutdown arrived before every symbol was checked.
    pub interrupted: bool,
    pub outcomes: Vec<(String, CheckOutcome)>,
}

impl TickReport {
    fn gated(at: DateTime<Utc>) -> Self {
        Self {
            at,
            gated: true,
            interrupted: false,
            outcomes: Vec::new(),
        }
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_failure()).count()
    }
}

pub struct Scheduler {
    engine: Arc<WheelEngine>,
    hours: MarketHours,
    check_every: Trigger,
    summary_at: Trigger,
    briefing_at: Option<Trigger>,
    weekly_at: Option<Trigger>,
    market_hours_only: bool,
    shutdown: ShutdownHandle,
}

impl Scheduler {
    /// # Errors
    ///
    /// Returns a configuration error for an invalid schedule.
    pub fn new(engine: Arc<WheelEngine>, shutdown: ShutdownHandle) -> WheelResult<Self> {
        let schedule = &engine.config().schedule;
        let hours = MarketHours::from_schedule(schedule)?;
        let summary_at = Trigger::DailyAt {
            time: schedule.summary_time()?,
            tz: hours.tz,
            days: Days::All,
        };
        let briefing_at = schedule.briefing_time()?.map(|time| Trigger::DailyAt {
            time,
            tz: hours.tz,
            days: Days::Weekdays,
        });
        let weekly_at = schedule.weekly_report()?.map(|(day, time)| Trigger::DailyAt {
            time,
            tz: hours.tz,
            days: Days::Only(day),
        });
        Ok(Self {
            check_every: Trigger::Every(Duration::from_secs(schedule.check_interval_minutes * 60)),
            market_hours_only: schedule.market_hours_only,
            summary_at,
            briefing_at,
            weekly_at,
            hours,
            shutdown,
            engine,
        })
    }

    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    fn symbols(&self) -> Vec<String> {
        self.engine
            .config()
            .enabled_symbols()
            .map(|s| s.symbol.clone())
            .collect()
    }

    /// One timer tick as of `now`. When gated, nothing is called.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickReport {
        if self.market_hours_only && !self.hours.is_open(now) {
            debug!(%now, "market closed, skipping position check");
            return TickReport::gated(now);
        }

        info!("running scheduled position check");
        let mut report = TickReport {
            at: now,
            gated: false,
            interrupted: false,
            outcomes: Vec::new(),
        };
        for symbol in self.symbols() {
            if self.shutdown.is_triggered() {
                report.interrupted = true;
                break;
            }
            let outcome = self.engine.check(&symbol).await;
            report.outcomes.push((symbol, outcome));
        }
        if report.failures() > 0 {
            warn!(failures = report.failures(), checked = report.outcomes.len(), "tick finished with failures");
        }
        report
    }

    /// Manual single-shot check. A named symbol bypasses the market-hours
    /// gate; `None` behaves like a timer tick.
    pub async fn run_once(&self, symbol: Option<&str>) -> TickReport {
        let now = Utc::now();
        match symbol {
            Some(symbol) => {
                let outcome = self.engine.check(symbol).await;
                TickReport {
                    at: now,
                    gated: false,
                    interrupted: false,
                    outcomes: vec![(symbol.to_uppercase(), outcome)],
                }
            }
            None => self.tick_at(now).await,
        }
    }

    pub async fn send_daily_summary(&self) {
        let summary = self.engine.store().summary();
        info!(
            active = summary.active_positions,
            premium = %summary.total_premium,
            cycles = summary.total_cycles,
            "sending daily summary"
        );
        self.engine.notifier().daily_summary(&summary).await;
    }

    /// Pre-market briefing: open legs with spot and DTE, then the best put
    /// for every flat symbol.
    pub async fn send_morning_briefing(&self) -> MorningBriefing {
        let briefing = MorningBriefing::gather(&self.engine, self.engine.today()).await;
        info!(
            open = briefing.open.len(),
            opportunities = briefing.opportunities.len(),
            unavailable = briefing.unavailable.len(),
            "sending morning briefing"
        );
        let (message, data) = briefing.render();
        self.engine
            .notifier()
            .notify(message, NotificationLevel::Info, Some("Morning Briefing".to_string()), data)
            .await;
        briefing
    }

    pub async fn send_weekly_report(&self, now: DateTime<Utc>) -> WeeklyReport {
        let report = WeeklyReport::gather(&self.engine, now);
        info!(
            premium = %report.total_premium,
            cycles = report.total_cycles,
            trades = report.trades_this_week,
            "sending weekly report"
        );
        let (message, data) = report.render();
        self.engine
            .notifier()
            .notify(message, NotificationLevel::Info, Some("Weekly Wheel Report".to_string()), data)
            .await;
        report
    }

    /// Runs until the shutdown handle fires. The first tick runs at once.
    pub async fn run(&self) {
        let config = self.engine.config();
        let symbols = self.symbols();
        info!(
            mode = %config.broker.mode,
            interval_minutes = config.schedule.check_interval_minutes,
            market_hours_only = self.market_hours_only,
            symbols = ?symbols,
            "wheel scheduler started"
        );

        self.tick_at(Utc::now()).await;

        if !self.shutdown.is_triggered() {
            self.announce_start(&symbols).await;
        }

        let now = Utc::now();
        let mut next_check = self.check_every.next_after(now);
        let mut next_summary = self.summary_at.next_after(now);
        let mut next_briefing = self.briefing_at.map(|t| t.next_after(now));
        let mut next_weekly = self.weekly_at.map(|t| t.next_after(now));

        while !self.shutdown.is_triggered() {
            let wake_at = [Some(next_check), Some(next_summary), next_briefing, next_weekly]
                .into_iter()
                .flatten()
                .min()
                .unwrap_or(next_check);
            let sleep_for = (wake_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                () = tokio::time::sleep(sleep_for) => {}
                () = self.shutdown.wait() => break,
            }

            let now = Utc::now();
            if now >= next_check {
                self.tick_at(now).await;
                next_check = self.check_every.next_after(now);
            }
            if now >= next_summary && !self.shutdown.is_triggered() {
                self.send_daily_summary().await;
                next_summary = self.summary_at.next_after(now);
            }
            if let (Some(at), Some(trigger)) = (next_briefing, self.briefing_at) {
                if now >= at && !self.shutdown.is_triggered() {
                    self.send_morning_briefing().await;
                    next_briefing = Some(trigger.next_after(now));
                }
            }
            if let (Some(at), Some(trigger)) = (next_weekly, self.weekly_at) {
                if now >= at && !self.shutdown.is_triggered() {
                    self.send_weekly_report(now).await;
                    next_weekly = Some(trigger.next_after(now));
                }
            }
        }

        info!("stopping wheel scheduler");
        self.engine
            .notifier()
            .notify(
                "Wheel automation stopped",
                NotificationLevel::Warning,
                Some("Wheel Scheduler Stopped".to_string()),
                BTreeMap::new(),
            )
            .await;
    }

    async fn announce_start(&self, symbols: &[String]) {
        let config = self.engine.config();
        self.engine
            .notifier()
            .notify(
                format!("Wheel automation started, monitoring {} symbols", symbols.len()),
                NotificationLevel::Info,
                Some("Wheel Scheduler Started".to_string()),
                BTreeMap::from([
                    ("Mode".to_string(), config.broker.mode.to_string().to_uppercase()),
                    (
                        "Check Interval".to_string(),
                        format!("{} minutes", config.schedule.check_interval_minutes),
                    ),
                    ("Symbols".to_string(), symbols.join(", ")),
                ]),
            )
            .await;
    }
}
