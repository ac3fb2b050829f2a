//! Handles settings for the application. Configuration is read from an
//! optional `settings.toml` and from `DIVVY_` environment variables
//! (`DIVVY_APP__LEVEL=debug`, `DIVVY_CURRENCIES__ENABLED=JPY,KWD`).
//!
//! See `settings.toml` for the configuration.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct App {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
}

impl Database {
    pub fn url(&self) -> String {
        match self {
            Database::Memory => String::from("sqlite::memory:"),
            Database::Sqlite(path) => format!("sqlite:{path}?mode=rwc"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Splits {
    #[serde(default)]
    pub strict_settlement: bool,
    #[serde(default)]
    pub allow_external_payer: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct Currencies {
    /// Extra currency codes whose precision is not two decimals.
    #[serde(default)]
    pub enabled: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: App,
    pub database: Option<Database>,
    #[serde(default)]
    pub splits: Splits,
    #[serde(default)]
    pub currencies: Currencies,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("settings").required(false))
            .add_source(
                Environment::with_prefix("DIVVY")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("currencies.enabled"),
            )
            .build()?;

        settings.try_deserialize()
    }
}
