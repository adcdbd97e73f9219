#[macro_use]
extern crate log;

use cached::proc_macro::cached;
use config::{Config, ConfigError, Environment, File, FileFormat};
use futures_locks::RwLock;
use once_cell::sync::Lazy;
use serde::Deserialize;

static DEFAULTS: &str = include_str!("../Purchases.toml");

static CONFIG_BUILDER: Lazy<RwLock<Config>> = Lazy::new(|| {
    RwLock::new({
        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULTS, FileFormat::Toml));

        if std::path::Path::new("Purchases.toml").exists() {
            builder = builder.add_source(File::new("Purchases.toml", FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("PURCHASES")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build().unwrap_or_else(|err| {
            error!("Failed to build configuration, falling back to defaults: {err}");
            Config::default()
        })
    })
});

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Api {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

/// What a running network request means for the operation queue
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InFlightPolicy {
    /// Slot is released once the request has been issued
    #[default]
    Detached,
    /// Slot is held until the response has been handed to the callback cache
    OccupiesSlot,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Queue {
    pub max_concurrent: usize,
    pub max_queue: usize,
    pub in_flight: InFlightPolicy,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api: Api,
    pub queue: Queue,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            api: Api {
                base_url: "https://api.revenuecat.com/v1".to_string(),
                user_agent: "Purchases/1.0".to_string(),
                timeout_secs: 10,
                connect_timeout_secs: 5,
            },
            queue: Queue {
                max_concurrent: 1,
                max_queue: 10_000,
                in_flight: InFlightPolicy::Detached,
            },
        }
    }
}

/// Configure logging, defaulting to `info`
pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }

    pretty_env_logger::try_init().ok();
}

pub async fn init() {
    info!(":: Purchases Configuration ::\n{:?}", config().await);
}

pub async fn read() -> Config {
    CONFIG_BUILDER.read().await.clone()
}

/// Parse settings from a TOML document layered over the built-in defaults
pub fn parse(toml: &str) -> Result<Settings, ConfigError> {
    Config::builder()
        .add_source(File::from_str(DEFAULTS, FileFormat::Toml))
        .add_source(File::from_str(toml, FileFormat::Toml))
        .build()?
        .try_deserialize()
}

#[cached(time = 30, result = true)]
pub async fn try_config() -> Result<Settings, ConfigError> {
    read().await.try_deserialize::<Settings>()
}

pub async fn config() -> Settings {
    match try_config().await {
        Ok(settings) => settings,
        Err(err) => {
            error!("Invalid configuration, using defaults: {err}");
            Settings::default()
        }
    }
}
