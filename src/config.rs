// Escrow node configuration, read from the environment (and `.env`)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ids::Address;

pub const DEFAULT_STATE_PATH: &str = "data/escrow_state.json";

/// Matches the widest answer set we expect a question to carry
pub const DEFAULT_MAX_ANSWERS: usize = 256;

pub const DEFAULT_EVENT_LOG_LIMIT: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowConfig {
    /// Where the market snapshot is kept between runs
    pub state_path: PathBuf,
    /// Upper bound on the answer set of a new question
    pub max_answers: usize,
    /// Market activity log retention
    pub event_log_limit: usize,
    /// `trace`, `debug`, `info`, `warn` or `error`
    pub log_level: String,
    /// Account allowed to run every question of a new market
    pub market_admin: Option<Address>,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
            max_answers: DEFAULT_MAX_ANSWERS,
            event_log_limit: DEFAULT_EVENT_LOG_LIMIT,
            log_level: "info".to_string(),
            market_admin: None,
        }
    }
}

impl EscrowConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let defaults = Self::default();
        Self {
            state_path: std::env::var("ESCROW_STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_path),
            max_answers: parse_var("ESCROW_MAX_ANSWERS").unwrap_or(defaults.max_answers),
            event_log_limit: parse_var("ESCROW_EVENT_LOG_LIMIT")
                .unwrap_or(defaults.event_log_limit),
            log_level: std::env::var("ESCROW_LOG_LEVEL").unwrap_or(defaults.log_level),
            market_admin: std::env::var("ESCROW_MARKET_ADMIN")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(|v| Address::new(v.trim())),
        }
    }

    pub fn tracing_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

fn parse_var(key: &str) -> Option<usize> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            eprintln!("⚠️  Ignoring {}={:?}: not a number", key, raw);
            None
        }
    }
}
