pub mod config;
pub mod config_loader;
pub mod error;
pub mod pricing;
pub mod traits;
pub mod types;

pub use config::{
    BrokerConfig, BrokerMode, ConsoleConfig, DiscordConfig, NotificationsConfig, SafetyConfig,
    ScheduleConfig, SymbolConfig, WheelConfig, DEFAULT_CONFIG_TOML,
};
pub use config_loader::{ConfigLoader, DEFAULT_CONFIG_PATH};
pub use error::{Collaborator, WheelError, WheelResult};
pub use pricing::BlackScholes;
pub use traits::{Broker, MarketData, Notification, NotificationLevel, Notifier, PricingModel};
pub use types::{
    occ_symbol, AccountInfo, BrokerPosition, OptionContract, OptionRight, Order, OrderRequest,
    OrderSide, OrderStatus, OrderType, CONTRACT_MULTIPLIER,
};
