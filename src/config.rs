use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

use crate::services::tabular::{MAX_FILE_SIZE, MAX_ROWS};

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_DATABASE_PATH: &str = "reports.db";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Clone)]
pub struct Config {
    pub openai_key: String,
    pub openai_model: String,
    pub openai_api_base: Option<String>,
    pub database_path: String,
    pub bind_addr: SocketAddr,
    pub max_file_size: usize,
    pub max_rows: usize,
    pub daily_report_limit: u32,
    pub ai_timeout: Duration,
}

impl Config {
    pub fn new() -> Result<Self> {
        // Load .env file first
        dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let openai_key = lookup("OPENAI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("Failed to load OPENAI_API_KEY: not set"))?;

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("BIND_ADDR must be a socket address such as 127.0.0.1:3000")?;

        Ok(Config {
            openai_key,
            openai_model: lookup("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            openai_api_base: lookup("OPENAI_API_BASE"),
            database_path: lookup("DATABASE_PATH")
                .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string()),
            bind_addr,
            max_file_size: parse_or(&lookup, "MAX_FILE_SIZE", MAX_FILE_SIZE)?,
            max_rows: parse_or(&lookup, "MAX_ROWS", MAX_ROWS)?,
            daily_report_limit: parse_or(&lookup, "DAILY_REPORT_LIMIT", 1)?,
            ai_timeout: Duration::from_secs(parse_or(&lookup, "AI_TIMEOUT_SECS", 60)?),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}
