//! Operator notifications: a fan-out hub plus console and Discord backends.
//!
//! Delivery is fire-and-forget. Each backend is bounded by a timeout and a
//! failing backend is logged, never surfaced to the engine.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, error, info, warn};
use wheel_trade_core::{
    Collaborator, Notification, NotificationLevel, Notifier, NotificationsConfig, OptionRight,
    WheelError, WheelResult,
};

use crate::bounded::bounded;
use crate::store::StoreSummary;

/// Writes notifications to the process log.
pub struct ConsoleNotifier {
    min_level: NotificationLevel,
}

impl ConsoleNotifier {
    #[must_use]
    pub fn new(min_level: NotificationLevel) -> Self {
        Self { min_level }
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send(&self, n: &Notification) -> WheelResult<()> {
        if n.level < self.min_level {
            return Ok(());
        }
        let title = n.title.as_deref().unwrap_or("");
        let details = if n.data.is_empty() {
            String::new()
        } else {
            format!("{:?}", n.data)
        };
        match n.level {
            NotificationLevel::Debug => debug!(title, %details, "{}", n.message),
            NotificationLevel::Info => info!(title, %details, "{}", n.message),
            NotificationLevel::Warning => warn!(title, %details, "{}", n.message),
            NotificationLevel::Error | NotificationLevel::Critical => {
                error!(title, %details, level = %n.level, "{}", n.message);
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}

/// Posts notifications as embeds to a Discord webhook.
pub struct DiscordNotifier {
    webhook_url: String,
    http: Client,
}

impl DiscordNotifier {
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> WheelResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WheelError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            webhook_url: webhook_url.into(),
            http,
        })
    }

    const fn colour(level: NotificationLevel) -> u32 {
        match level {
            NotificationLevel::Debug => 0x0080_8080,
            NotificationLevel::Info => 0x0034_98DB,
            NotificationLevel::Warning => 0x00F3_9C12,
            NotificationLevel::Error => 0x00E7_4C3C,
            NotificationLevel::Critical => 0x008E_44AD,
        }
    }

    fn embed(n: &Notification) -> serde_json::Value {
        let fields: Vec<_> = n
            .data
            .iter()
            .map(|(k, v)| json!({ "name": k, "value": v, "inline": true }))
            .collect();
        json!({
            "embeds": [{
                "title": n.title.as_deref().unwrap_or("Wheel Automation"),
                "description": n.message,
                "color": Self::colour(n.level),
                "timestamp": n.timestamp.to_rfc3339(),
                "fields": fields,
                "footer": { "text": "wheel-trade" }
            }]
        })
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, n: &Notification) -> WheelResult<()> {
        let response = self
            .http
            .post(&self.webhook_url)
            .json(&Self::embed(n))
            .send()
            .await
            // the webhook URL is a credential; keep it out of the message
            .map_err(|e| WheelError::notifier(e.without_url().to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(WheelError::notifier(format!("discord webhook returned {status}")))
        }
    }

    fn name(&self) -> &str {
        "discord"
    }
}

/// Fans each notification out to every configured backend.
pub struct NotificationHub {
    backends: Vec<Arc<dyn Notifier>>,
    timeout: Duration,
}

fn money(value: Decimal) -> String {
    format!("${:.2}", value)
}

impl NotificationHub {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            backends: Vec::new(),
            timeout,
        }
    }

    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn Notifier>) -> Self {
        info!(backend = backend.name(), "notification backend added");
        self.backends.push(backend);
        self
    }

    /// Builds the hub from settings.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a backend cannot be constructed.
    pub fn from_config(cfg: &NotificationsConfig, timeout: Duration) -> WheelResult<Self> {
        let mut hub = Self::new(timeout);
        if cfg.console.enabled {
            hub = hub.with_backend(Arc::new(ConsoleNotifier::new(cfg.console.level)));
        }
        if cfg.discord.enabled {
            let url = cfg
                .discord
                .webhook_url
                .as_deref()
                .ok_or_else(|| WheelError::config("notifications.discord.webhook_url is not set"))?;
            hub = hub.with_backend(Arc::new(DiscordNotifier::new(url, timeout)?));
        }
        Ok(hub)
    }

    #[must_use]
    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }

    /// Sends to every backend. Returns how many accepted it.
    pub async fn notify(
        &self,
        message: impl Into<String>,
        level: NotificationLevel,
        title: Option<String>,
        data: BTreeMap<String, String>,
    ) -> usize {
        let notification = Notification {
            message: message.into(),
            level,
            title,
            data,
            timestamp: Utc::now(),
        };

        let mut delivered = 0;
        for backend in &self.backends {
            match bounded(Collaborator::Notifier, self.timeout, backend.send(&notification)).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(backend = backend.name(), error = %e, "notification failed"),
            }
        }
        delivered
    }

    pub async fn trade_alert(&self, action: &str, symbol: &str, details: BTreeMap<String, String>) -> usize {
        self.notify(
            format!("Executed {action} on {symbol}"),
            NotificationLevel::Info,
            Some(format!("Trade: {action} {symbol}")),
            details,
        )
        .await
    }

    pub async fn assignment_alert(
        &self,
        symbol: &str,
        right: OptionRight,
        strike: Decimal,
        shares: i64,
    ) -> usize {
        let (title, message) = match right {
            OptionRight::Put => (
                format!("Assignment: {symbol} Put"),
                format!("Put assigned, acquired {shares} shares at {}", money(strike)),
            ),
            OptionRight::Call => (
                format!("Called Away: {symbol}"),
                format!("Call assigned, sold {shares} shares at {}", money(strike)),
            ),
        };
        let data = BTreeMap::from([
            ("Symbol".to_string(), symbol.to_string()),
            ("Type".to_string(), right.to_string().to_uppercase()),
            ("Strike".to_string(), money(strike)),
            ("Shares".to_string(), shares.to_string()),
        ]);
        self.notify(message, NotificationLevel::Warning, Some(title), data).await
    }

    /// Error alert. `context` should name the symbol and state only.
    pub async fn error_alert(&self, error: &str, context: BTreeMap<String, String>) -> usize {
        self.notify(
            error,
            NotificationLevel::Error,
            Some("Wheel Automation Error".to_string()),
            context,
        )
        .await
    }

    pub async fn daily_summary(&self, summary: &StoreSummary) -> usize {
        let mut data = BTreeMap::from([
            ("Active Positions".to_string(), summary.active_positions.to_string()),
            ("Total Premium".to_string(), money(summary.total_premium)),
            ("Cycles Completed".to_string(), summary.total_cycles.to_string()),
        ]);
        for (state, count) in &summary.by_state {
            data.insert(state.to_string(), count.to_string());
        }
        self.notify(
            format!(
                "{} active positions, {} total premium collected",
                summary.active_positions,
                money(summary.total_premium)
            ),
            NotificationLevel::Info,
            Some("Daily Wheel Summary".to_string()),
            data,
        )
        .await
    }
}
