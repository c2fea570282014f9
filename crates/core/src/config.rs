use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use chrono::{NaiveTime, Weekday};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{WheelError, WheelResult};
use crate::traits::NotificationLevel;

/// Top-level settings for the wheel automation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelConfig {
    /// Traded underlyings, checked in this order on every tick.
    pub symbols: Vec<SymbolConfig>,
    pub schedule: ScheduleConfig,
    pub safety: SafetyConfig,
    pub broker: BrokerConfig,
    pub notifications: NotificationsConfig,
    /// JSON state document location.
    pub state_file: PathBuf,
    /// Annual risk-free rate fed to the pricing model.
    pub risk_free_rate: f64,
    /// Upper bound on any single broker/market-data call.
    pub call_timeout_secs: u64,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            schedule: ScheduleConfig::default(),
            safety: SafetyConfig::default(),
            broker: BrokerConfig::default(),
            notifications: NotificationsConfig::default(),
            state_file: default_state_file(),
            risk_free_rate: 0.05,
            call_timeout_secs: 30,
        }
    }
}

/// `~/.wheel/wheel_state.json`, or `./wheel_state.json` without a home directory.
#[must_use]
pub fn default_state_file() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("wheel_state.json"),
        |dirs| dirs.home_dir().join(".wheel").join("wheel_state.json"),
    )
}

/// Per-symbol targeting parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolConfig {
    pub symbol: String,
    pub enabled: bool,
    /// Absolute put delta to target (e.g. 0.25 means -0.25).
    pub target_put_delta: f64,
    pub target_call_delta: f64,
    pub min_dte: i64,
    pub max_dte: i64,
    /// Minimum mid price per share.
    pub min_premium: Decimal,
    pub min_open_interest: u64,
}

impl Default for SymbolConfig {
    fn default() -> Self {
        Self {
            symbol: String::new(),
            enabled: true,
            target_put_delta: 0.25,
            target_call_delta: 0.30,
            min_dte: 25,
            max_dte: 45,
            min_premium: Decimal::new(30, 2),
            min_open_interest: 10,
        }
    }
}

impl SymbolConfig {
    /// Defaults for one symbol.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub check_interval_minutes: u64,
    pub market_hours_only: bool,
    /// IANA name of the exchange timezone.
    pub timezone: String,
    /// `HH:MM` local exchange time.
    pub market_open: String,
    pub market_close: String,
    pub daily_summary_at: String,
    /// Weekday pre-market briefing; empty disables it.
    pub morning_briefing_at: String,
    /// Weekly premium report; empty `weekly_report_at` disables it.
    pub weekly_report_day: String,
    pub weekly_report_at: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            check_interval_minutes: 60,
            market_hours_only: true,
            timezone: "America/New_York".to_string(),
            market_open: "09:30".to_string(),
            market_close: "16:00".to_string(),
            daily_summary_at: "16:05".to_string(),
            morning_briefing_at: "09:00".to_string(),
            weekly_report_day: "Sun".to_string(),
            weekly_report_at: "18:00".to_string(),
        }
    }
}

impl ScheduleConfig {
    /// Parsed exchange timezone.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown timezone name.
    pub fn tz(&self) -> WheelResult<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| WheelError::config(format!("unknown timezone '{}'", self.timezone)))
    }

    /// # Errors
    ///
    /// Returns a configuration error if `market_open` is not `HH:MM`.
    pub fn open_time(&self) -> WheelResult<NaiveTime> {
        parse_clock("market_open", &self.market_open)
    }

    /// # Errors
    ///
    /// Returns a configuration error if `market_close` is not `HH:MM`.
    pub fn close_time(&self) -> WheelResult<NaiveTime> {
        parse_clock("market_close", &self.market_close)
    }

    /// # Errors
    ///
    /// Returns a configuration error if `daily_summary_at` is not `HH:MM`.
    pub fn summary_time(&self) -> WheelResult<NaiveTime> {
        parse_clock("daily_summary_at", &self.daily_summary_at)
    }

    /// `None` when the briefing is switched off.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `morning_briefing_at` is set but not `HH:MM`.
    pub fn briefing_time(&self) -> WheelResult<Option<NaiveTime>> {
        optional_clock("morning_briefing_at", &self.morning_briefing_at)
    }

    /// Day and time of the weekly report, `None` when switched off.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown weekday or a bad clock time.
    pub fn weekly_report(&self) -> WheelResult<Option<(Weekday, NaiveTime)>> {
        let Some(at) = optional_clock("weekly_report_at", &self.weekly_report_at)? else {
            return Ok(None);
        };
        let day = self.weekly_report_day.trim().parse::<Weekday>().map_err(|_| {
            WheelError::config(format!(
                "weekly_report_day must be a weekday name, got '{}'",
                self.weekly_report_day
            ))
        })?;
        Ok(Some((day, at)))
    }
}

fn optional_clock(field: &str, value: &str) -> WheelResult<Option<NaiveTime>> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    parse_clock(field, value.trim()).map(Some)
}

fn parse_clock(field: &str, value: &str) -> WheelResult<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| WheelError::config(format!("{field} must be HH:MM, got '{value}'")))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Buying power that must remain after securing a put.
    pub min_buying_power_reserve: Decimal,
    pub max_total_capital: Decimal,
    /// DTE at which an open option is reported as a roll candidate.
    pub roll_dte_threshold: i64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            min_buying_power_reserve: Decimal::from(5000),
            max_total_capital: Decimal::from(50_000),
            roll_dte_threshold: 5,
        }
    }
}

/// Which broker implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerMode {
    #[default]
    Paper,
    Live,
    /// In-memory broker, no network for orders.
    Simulated,
}

impl fmt::Display for BrokerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Paper => write!(f, "paper"),
            Self::Live => write!(f, "live"),
            Self::Simulated => write!(f, "simulated"),
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub mode: BrokerMode,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// Overrides the trading API base URL for the selected mode.
    pub trading_url: Option<String>,
    pub data_url: Option<String>,
    /// Starting cash for the simulated broker.
    pub simulated_cash: Decimal,
    pub request_timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            mode: BrokerMode::Paper,
            api_key: None,
            api_secret: None,
            trading_url: None,
            data_url: None,
            simulated_cash: Decimal::from(100_000),
            request_timeout_secs: 30,
        }
    }
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("mode", &self.mode)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "[REDACTED]"))
            .field("trading_url", &self.trading_url)
            .field("data_url", &self.data_url)
            .field("simulated_cash", &self.simulated_cash)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub console: ConsoleConfig,
    pub discord: DiscordConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    /// Lowest level echoed to the console.
    pub level: NotificationLevel,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: NotificationLevel::Info,
        }
    }
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
}

impl fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("enabled", &self.enabled)
            .field("webhook_url", &self.webhook_url.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl WheelConfig {
    /// Trims and upper-cases every ticker so store keys and market-data
    /// requests agree.
    pub fn normalize(&mut self) {
        for symbol in &mut self.symbols {
            symbol.symbol = symbol.symbol.trim().to_uppercase();
        }
    }

    #[must_use]
    pub fn is_normalized(&self) -> bool {
        self.symbols
            .iter()
            .all(|s| s.symbol.trim().len() == s.symbol.len() && s.symbol.to_uppercase() == s.symbol)
    }

    /// Enabled symbols in configured order.
    pub fn enabled_symbols(&self) -> impl Iterator<Item = &SymbolConfig> {
        self.symbols.iter().filter(|s| s.enabled)
    }

    /// Looks up a symbol's settings (case-insensitive).
    #[must_use]
    pub fn symbol(&self, symbol: &str) -> Option<&SymbolConfig> {
        self.symbols
            .iter()
            .find(|s| s.symbol.eq_ignore_ascii_case(symbol))
    }

    /// Checks cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`WheelError::Configuration`] describing the first problem found.
    pub fn validate(&self) -> WheelResult<()> {
        let mut seen = HashSet::new();
        for s in &self.symbols {
            if s.symbol.trim().is_empty() {
                return Err(WheelError::config("symbol name must not be empty"));
            }
            if !seen.insert(s.symbol.to_uppercase()) {
                return Err(WheelError::config(format!("duplicate symbol '{}'", s.symbol)));
            }
            if s.min_dte < 0 || s.min_dte > s.max_dte {
                return Err(WheelError::config(format!(
                    "{}: min_dte ({}) must be between 0 and max_dte ({})",
                    s.symbol, s.min_dte, s.max_dte
                )));
            }
            for (name, delta) in [
                ("target_put_delta", s.target_put_delta),
                ("target_call_delta", s.target_call_delta),
            ] {
                if !(delta > 0.0 && delta < 1.0) {
                    return Err(WheelError::config(format!(
                        "{}: {name} must be in (0, 1), got {delta}",
                        s.symbol
                    )));
                }
            }
            if s.min_premium < Decimal::ZERO {
                return Err(WheelError::config(format!("{}: min_premium must not be negative", s.symbol)));
            }
        }

        if self.schedule.check_interval_minutes == 0 {
            return Err(WheelError::config("check_interval_minutes must be greater than 0"));
        }
        self.schedule.tz()?;
        let open = self.schedule.open_time()?;
        let close = self.schedule.close_time()?;
        if open >= close {
            return Err(WheelError::config(format!(
                "market_open ({}) must be before market_close ({})",
                self.schedule.market_open, self.schedule.market_close
            )));
        }
        self.schedule.summary_time()?;
        self.schedule.briefing_time()?;
        self.schedule.weekly_report()?;

        if self.call_timeout_secs == 0 || self.broker.request_timeout_secs == 0 {
            return Err(WheelError::config("timeouts must be greater than 0"));
        }

        if self.broker.mode != BrokerMode::Simulated {
            let missing = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
            if missing(&self.broker.api_key) || missing(&self.broker.api_secret) {
                return Err(WheelError::config(format!(
                    "{} mode requires broker.api_key and broker.api_secret",
                    self.broker.mode
                )));
            }
        }

        if self.notifications.discord.enabled
            && self
                .notifications
                .discord
                .webhook_url
                .as_deref()
                .map_or(true, str::is_empty)
        {
            return Err(WheelError::config("discord notifications enabled without webhook_url"));
        }

        Ok(())
    }
}

/// Commented starter configuration written by `wheel init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# Wheel automation settings.
# Environment overrides use the WHEEL_ prefix with "__" between sections,
# e.g. WHEEL_BROKER__API_KEY, WHEEL_SCHEDULE__CHECK_INTERVAL_MINUTES.

# state_file = "~/.wheel/wheel_state.json"
risk_free_rate = 0.05
call_timeout_secs = 30

[[symbols]]
symbol = "SPY"
enabled = true
target_put_delta = 0.25
target_call_delta = 0.30
min_dte = 25
max_dte = 45
min_premium = 0.30
min_open_interest = 10

[schedule]
check_interval_minutes = 60
market_hours_only = true
timezone = "America/New_York"
market_open = "09:30"
market_close = "16:00"
daily_summary_at = "16:05"
# weekday pre-market briefing; "" turns it off
morning_briefing_at = "09:00"
weekly_report_day = "Sun"
weekly_report_at = "18:00"

[safety]
min_buying_power_reserve = 5000
max_total_capital = 50000
roll_dte_threshold = 5

[broker]
# paper | live | simulated
mode = "paper"
# api_key = ""
# api_secret = ""
simulated_cash = 100000
request_timeout_secs = 30

[notifications.console]
enabled = true
level = "info"

[notifications.discord]
enabled = false
# webhook_url = ""
"#;
