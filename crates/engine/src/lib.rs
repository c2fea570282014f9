//! Wheel strategy automation.
//!
//! - [`store::StateStore`]: crash-safe JSON persistence of one
//!   [`position::WheelPosition`] per symbol
//! - [`position`]: the IDLE / PUT_OPEN / HOLDING_SHARES / CALL_OPEN state
//!   machine and its audit trail
//! - [`selector::StrikeSelector`]: delta-targeted strike selection
//! - [`engine::WheelEngine`]: one decision per symbol per tick
//! - [`scheduler::Scheduler`]: timer, market-hours gate, daily summary,
//!   morning briefing, weekly report, graceful shutdown
//! - [`notify::NotificationHub`]: console and Discord alerts

pub mod bounded;
pub mod engine;
pub mod notify;
pub mod position;
pub mod report;
pub mod scheduler;
pub mod selector;
pub mod store;
pub mod ticker;

pub use engine::{CheckOutcome, WheelEngine};
pub use notify::{ConsoleNotifier, DiscordNotifier, NotificationHub};
pub use position::{OptionInfo, Trade, TradeAction, Transition, WheelPosition, WheelState, LOT_SIZE};
pub use report::{MorningBriefing, WeeklyReport};
pub use scheduler::{Scheduler, ShutdownHandle, TickReport};
pub use selector::{StrikeCandidate, StrikeSelector, Targeting, WheelAnalysis};
pub use store::{StateStore, StoreSummary, TradeRecord, STATE_VERSION};
pub use ticker::{Days, MarketHours, Trigger};
