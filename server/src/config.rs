use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ws::actor::Keepalive;

const DEFAULT_CONFIG_PATH: &str = "./karaoke.toml";

/// Resolved server configuration.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    /// Port to listen on
    pub port: u16,

    /// Bind address
    pub bind_address: String,

    /// Path to TOML config file
    pub config: String,

    /// Structured JSON logging (for Docker/production)
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    pub generate_config: bool,

    /// Data directory for the party database
    pub data_dir: String,

    /// Keep parties in memory instead of SQLite (lost on restart)
    pub in_memory: bool,

    /// Seconds between WebSocket pings
    pub ping_interval_secs: u64,

    /// Seconds a ping may go unanswered before the connection is dropped
    pub pong_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            bind_address: "0.0.0.0".to_string(),
            config: DEFAULT_CONFIG_PATH.to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            in_memory: false,
            ping_interval_secs: 30,
            pong_timeout_secs: 10,
        }
    }
}

/// Karaoke party server
///
/// Only flags actually given on the command line are serialized, so an
/// omitted flag never masks a value from the TOML file or environment.
#[derive(Parser, Serialize, Clone, Debug, Default)]
#[command(name = "karaoke-server", version, about = "Karaoke party server")]
pub struct Cli {
    /// Port to listen on [default: 8000]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file [default: ./karaoke.toml]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,

    /// Enable structured JSON logging
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub generate_config: bool,

    /// Data directory for the party database [default: ./data]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Keep parties in memory instead of SQLite
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub in_memory: bool,

    /// Seconds between WebSocket pings [default: 30]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping_interval_secs: Option<u64>,

    /// Seconds to wait for a pong [default: 10]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pong_timeout_secs: Option<u64>,
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (KARAOKE_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment(Cli::parse()).extract()
    }

    pub fn figment(cli: Cli) -> Figment {
        let config_path = cli
            .config
            .clone()
            .or_else(|| std::env::var("KARAOKE_CONFIG").ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("KARAOKE_"))
            .merge(Serialized::defaults(cli))
    }

    pub fn keepalive(&self) -> Keepalive {
        Keepalive {
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            pong_timeout: Duration::from_secs(self.pong_timeout_secs),
        }
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Karaoke Party Server Configuration
# Place this file at ./karaoke.toml or specify with --config <path>
# All settings can be overridden via environment variables (KARAOKE_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 8000)
# port = 8000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite party database
# data_dir = "./data"

# Keep parties in memory only (nothing written to data_dir)
# in_memory = false

# WebSocket keepalive: ping every N seconds, drop after M without a pong
# ping_interval_secs = 30
# pong_timeout_secs = 10
"#
    .to_string()
}
