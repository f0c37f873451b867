use anyhow::{anyhow, Result};
use chrono::Weekday;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use crate::utils::datetime::parse_weekday;
use crate::utils::validation::validate_user_id;

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_SHEET_PREFIX: &str = "לוח";

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_bot_token: String,
    pub schedule_url: String,
    pub maintainer_id: u64,
    pub maintainer_contact: String,
    pub http_port: u16,
    pub data_dir: PathBuf,
    pub send_delay: Duration,
    pub canonical_weekday: Weekday,
    pub sheet_prefix: String,
}

/// Reads a variable, treating an empty or blank value as unset.
fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let token = env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| anyhow!("TELEGRAM_BOT_TOKEN must be set"))?;

        if token.trim().is_empty() {
            return Err(anyhow!("TELEGRAM_BOT_TOKEN must be set"));
        }

        let schedule_url = non_empty("SCHEDULE_URL")
            .ok_or_else(|| anyhow!("SCHEDULE_URL must be set"))?;

        let maintainer_raw = non_empty("MAINTAINER_ID")
            .ok_or_else(|| anyhow!("MAINTAINER_ID must be set"))?;
        let maintainer_id = validate_user_id(&maintainer_raw)
            .map_err(|e| anyhow!("Invalid MAINTAINER_ID: {}", e))?;

        let maintainer_contact = non_empty("MAINTAINER_CONTACT")
            .unwrap_or_else(|| format!("@{maintainer_id}"));

        let port_str = non_empty("HTTP_PORT")
            .or_else(|| non_empty("PORT"))
            .unwrap_or_else(|| "3000".to_string());
        let http_port = port_str
            .parse()
            .map_err(|_| anyhow!("Invalid HTTP_PORT"))?;

        let send_delay_ms: u64 = match non_empty("SEND_DELAY_MS") {
            Some(v) => v.parse().map_err(|_| anyhow!("Invalid SEND_DELAY_MS"))?,
            None => 50,
        };

        let canonical_weekday = match non_empty("CANONICAL_WEEKDAY") {
            Some(v) => parse_weekday(&v)?,
            None => Weekday::Wed,
        };

        Ok(Config {
            telegram_bot_token: token,
            schedule_url,
            maintainer_id,
            maintainer_contact,
            http_port,
            data_dir: Self::data_dir_from_env(),
            send_delay: Duration::from_millis(send_delay_ms),
            canonical_weekday,
            sheet_prefix: non_empty("SHEET_PREFIX").unwrap_or_else(|| DEFAULT_SHEET_PREFIX.to_string()),
        })
    }

    /// Just the data directory, for tools that do not talk to Telegram.
    pub fn data_dir_from_env() -> PathBuf {
        non_empty("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }

    pub fn roster_path(&self) -> PathBuf {
        self.data_dir.join("roster.json")
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }
}
