use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

pub mod events;
mod metrics;

/// Result type used throughout this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type returned by all fallible operations within this crate.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("feed error: {0}")]
    Feed(#[from] events::feed::FeedError),
}

/// A link configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Link {
    /// The link title.
    pub title: String,
    /// The URL that it points to.
    pub href: String,
}

/// Harvest feed configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct HarvestConfig {
    /// Source for harvested events.
    pub event_source: events::EventSourceKind,
    /// Candidate URLs for the `feed` event source, tried in order.
    #[serde(default)]
    pub feed_urls: Vec<String>,
    /// Path to the harvester's JSON artifact for the `artifact` event source.
    #[serde(default)]
    pub artifact_path: Option<PathBuf>,
    /// Seconds between two harvest syncs.
    #[serde(default = "default_sync_period_secs")]
    pub sync_period_secs: u64,
    /// Static events for the `static` event source.
    #[serde(default)]
    pub events: Vec<events::Event>,
}

fn default_sync_period_secs() -> u64 {
    300
}

/// Website specific configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct SiteConfig {
    /// The site title.
    pub title: String,
    /// The tagline displayed next to the site title.
    pub tagline: String,
    /// Optional site description. This is used in the description meta tag.
    pub description: Option<String>,
    /// Optional canonical URL of the site. This is used in the canonical meta tag.
    pub canonical_url: Option<String>,
    /// Links to display in the site footer.
    #[serde(default)]
    pub links: Vec<Link>,
}

/// Web server configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ServerConfig {
    /// Address on which the web server will listen.
    pub listen_addr: SocketAddr,
    /// Automatically reload templates when they are modified.
    pub template_autoreload: bool,
    /// Path to the template directory.
    #[serde(default = "default_template_dir")]
    pub template_dir: PathBuf,
    /// Path to the static file directory.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

fn default_template_dir() -> PathBuf {
    "templates".into()
}

fn default_static_dir() -> PathBuf {
    "static".into()
}

/// Global application configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct AppConfig {
    /// Server configuration section.
    pub server: ServerConfig,
    /// Website configuration section.
    pub site: SiteConfig,
    /// Harvest feed configuration section.
    pub harvest: HarvestConfig,
}

impl AppConfig {
    /// Loads the application configuration from files in the `config/` directory and environment
    /// variables.
    pub fn load() -> Result<AppConfig> {
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".into());

        log::info!("loading configuration using {} environment", app_env);

        let config = Config::builder()
            // Configuration defaults from `config/default.toml`.
            .add_source(File::with_name("config/default"))
            // Optional environment specific config overrides, e.g. `config/production.toml`.
            .add_source(File::with_name(&format!("config/{}", app_env)).required(false))
            // Optional local config overrides from `config/local.toml` (on .gitignore).
            .add_source(File::with_name("config/local").required(false))
            // Config from environment variables.
            .add_source(Environment::default().separator("__"))
            // Config from environment variables prefixed with `NB_`.
            .add_source(
                Environment::with_prefix("NB")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        log::debug!("loaded configuration: {:?}", config);

        Ok(config)
    }
}
