use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/Config.toml";

/// Prefix for environment overrides, e.g. `TRADE_ETL_PIPELINE__TOP_K=5`.
pub const ENV_PREFIX: &str = "TRADE_ETL_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration from the default file location.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load() -> Result<AppConfig> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Loads configuration by layering built-in defaults, the TOML file at
    /// `path` (skipped if absent) and `TRADE_ETL_` environment variables.
    ///
    /// Nested keys use a double underscore: `TRADE_ETL_OUTPUT__TABLE`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed, or if a
    /// value has the wrong type.
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig> {
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }
}
