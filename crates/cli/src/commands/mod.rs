//! Operator commands for the wheel automation.

pub mod analyze;
pub mod check;
pub mod init;
pub mod reset;
pub mod start;
pub mod status;

pub use analyze::{run_analyze, AnalyzeArgs};
pub use check::{run_check, run_check_all, CheckArgs};
pub use init::{run_init, InitArgs};
pub use reset::{run_reset, ResetArgs};
pub use start::run_start;
pub use status::{run_status, run_trades, TradesArgs};
