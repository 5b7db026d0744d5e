//! Thin configuration loader: a `--config`/`CONFIG` JSON file resolving the
//! keys spec.md §6 names, modeled on `facilitator/src/config.rs`'s
//! `Config::load`/`load_from_path` (CLI path, then env-var fallback for
//! leaf fields via `serde(default = ...)`, then a hardcoded default). The
//! full multi-subcommand CLI front-end is an external collaborator
//! (SPEC_FULL.md §2); this loader only resolves enough to construct the
//! core's dependencies.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use nexus_persistence::dialect::UnsupportedDialect;
use nexus_persistence::BankDialect;

#[derive(Parser, Debug)]
#[command(name = "nexus")]
#[command(about = "LibEuFin Nexus: EBICS 3 to Taler Wire Gateway core")]
struct CliArgs {
    /// Path to the JSON configuration file.
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Accept the bank's HPB keys as soon as they are fetched, instead of
    /// waiting for an operator to confirm the hash out of band
    /// (SPEC_FULL.md §3, spec.md §4.6).
    #[arg(long, env = "NEXUS_AUTO_ACCEPT_BANK_KEYS", default_value_t = false)]
    auto_accept_bank_keys: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub currency: String,
    pub host_base_url: String,
    pub host_id: String,
    pub user_id: String,
    pub partner_id: String,
    #[serde(default)]
    pub system_id: Option<String>,

    pub own_iban: String,
    #[serde(default)]
    pub own_bic: Option<String>,
    pub own_name: String,

    pub bank_dialect: String,

    pub client_key_path: PathBuf,
    pub bank_key_path: PathBuf,

    #[serde(default = "config_defaults::default_fetch_frequency_secs")]
    pub fetch_frequency_secs: u64,
    #[serde(default = "config_defaults::default_submit_frequency_secs")]
    pub submit_frequency_secs: u64,

    /// Smallest amount a `/transfer` request at the Wire Gateway boundary
    /// may initiate (spec.md §6 "optional `minimum_amount`"). Enforced by
    /// that external collaborator, not by the fetch/submit ticks in this
    /// core, which operate on whatever has already been persisted.
    #[serde(default)]
    pub minimum_amount: Option<String>,

    /// Optional debug-log directory (spec.md §6, C11).
    #[serde(default)]
    pub debug_log_dir: Option<PathBuf>,

    #[serde(skip)]
    pub auto_accept_bank_keys: bool,
}

pub mod config_defaults {
    pub fn default_fetch_frequency_secs() -> u64 {
        std::env::var("NEXUS_FETCH_FREQUENCY_SECS").ok().and_then(|s| s.parse().ok()).unwrap_or(300)
    }

    pub fn default_submit_frequency_secs() -> u64 {
        std::env::var("NEXUS_SUBMIT_FREQUENCY_SECS").ok().and_then(|s| s.parse().ok()).unwrap_or(60)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("invalid bank_dialect in config: {0}")]
    InvalidDialect(#[from] UnsupportedDialect),
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let config_path =
            Path::new(&cli_args.config).canonicalize().map_err(|e| ConfigError::FileRead(cli_args.config.clone(), e))?;
        let mut config = Self::load_from_path(config_path)?;
        config.auto_accept_bank_keys = cli_args.auto_accept_bank_keys;
        Ok(config)
    }

    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn dialect(&self) -> Result<BankDialect, ConfigError> {
        self.bank_dialect.parse().map_err(ConfigError::from)
    }
}
