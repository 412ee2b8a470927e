use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use crate::{errors::Error, Result};

/// Typed configuration, loaded from the environment (with optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    /// Optional allowlist; empty means every user may issue commands.
    pub telegram_allowed_users: Vec<i64>,

    // Polling
    pub poll_interval: Duration,
    pub tracked_drivers_file: PathBuf,

    // iRacing credentials (optional; without them the result source is idle)
    pub iracing_email: Option<String>,
    pub iracing_password: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let telegram_allowed_users = parse_csv_i64(env_str("TELEGRAM_ALLOWED_USERS"));

        let poll_interval = Duration::from_secs(env_u64("POLL_INTERVAL_SECS").unwrap_or(300));
        let tracked_drivers_file = PathBuf::from(
            env_str("TRACKED_DRIVERS_FILE")
                .unwrap_or("/tmp/rtb-tracked-drivers.json".to_string()),
        );

        let iracing_email = env_str("IRACING_EMAIL").and_then(non_empty);
        let iracing_password = env_str("IRACING_PASSWORD").and_then(non_empty);

        Ok(Self {
            telegram_bot_token,
            telegram_allowed_users,
            poll_interval,
            tracked_drivers_file,
            iracing_email,
            iracing_password,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
