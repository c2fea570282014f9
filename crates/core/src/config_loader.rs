use std::path::Path;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};

use crate::config::WheelConfig;
use crate::error::WheelResult;

/// Default TOML location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/Wheel.toml";
const DEFAULT_JSON_PATH: &str = "config/Wheel.json";
const ENV_PREFIX: &str = "WHEEL_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Builds the provider chain: defaults, TOML, JSON (joined), then `WHEEL_` env vars.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let toml = path.map_or_else(
            || Toml::file(DEFAULT_CONFIG_PATH),
            Toml::file,
        );

        Figment::from(Serialized::defaults(WheelConfig::default()))
            .merge(toml)
            .join(Json::file(DEFAULT_JSON_PATH))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Loads and validates configuration.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a file cannot be parsed or the merged
    /// settings fail validation.
    pub fn load(path: Option<&Path>) -> WheelResult<WheelConfig> {
        let config = Self::load_unchecked(path)?;
        config.validate()?;
        tracing::debug!(
            symbols = config.symbols.len(),
            mode = %config.broker.mode,
            state_file = %config.state_file.display(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Loads configuration without cross-field validation.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a file cannot be parsed.
    pub fn load_unchecked(path: Option<&Path>) -> WheelResult<WheelConfig> {
        let mut config: WheelConfig = Self::figment(path).extract()?;
        config.normalize();
        Ok(config)
    }
}
