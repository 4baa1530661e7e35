use std::{
    collections::HashSet,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    deletion::DeletionConfig, errors::Error, messaging::throttled::ThrottleConfig, Result,
};

/// Typed configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram_bot_token: String,

    // Persistence
    pub chat_store_file: PathBuf,

    // Detection
    pub convert_target: String,
    pub default_allow_words: HashSet<String>,
    pub ng_rate_threshold: u32,
    pub reason_max_chars: usize,

    // Timing
    pub admin_refresh_interval: Duration,
    pub delete_scan_interval: Duration,
    pub delete_grace_period: Duration,

    // Telegram flood control
    pub telegram_global_min_interval: Duration,
    pub telegram_per_chat_min_interval: Duration,
}

impl Config {
    /// Load from the process environment, after applying `.env` if present.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());
        let num = |key: &str| -> Result<Option<u64>> {
            match get(key).filter(|v| !v.is_empty()) {
                None => Ok(None),
                Some(v) => v
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got {v:?}"))),
            }
        };

        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let chat_store_file = PathBuf::from(
            get("CHAT_STORE_FILE")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "chatinfo.json".to_string()),
        );
        let convert_target = get("CONVERT_TARGET")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "zh-Hant".to_string());
        let default_allow_words = parse_csv_set(get("DEFAULT_ALLOW_WORDS"));

        let ng_rate_threshold = num("NG_RATE_THRESHOLD")?.unwrap_or(20);
        if ng_rate_threshold > 100 {
            return Err(Error::Config(format!(
                "NG_RATE_THRESHOLD must be at most 100, got {ng_rate_threshold}"
            )));
        }
        let reason_max_chars = num("REASON_MAX_CHARS")?.unwrap_or(15) as usize;

        let admin_refresh_interval =
            Duration::from_secs(num("ADMIN_REFRESH_INTERVAL_SECS")?.unwrap_or(600));
        let delete_scan_interval =
            Duration::from_millis(num("DELETE_SCAN_INTERVAL_MS")?.unwrap_or(2000));
        if delete_scan_interval.is_zero() {
            return Err(Error::Config(
                "DELETE_SCAN_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }
        let delete_grace_period =
            Duration::from_millis(num("DELETE_GRACE_PERIOD_MS")?.unwrap_or(8000));

        let telegram_global_min_interval =
            Duration::from_millis(num("TELEGRAM_GLOBAL_MIN_INTERVAL_MS")?.unwrap_or(40));
        let telegram_per_chat_min_interval =
            Duration::from_millis(num("TELEGRAM_PER_CHAT_MIN_INTERVAL_MS")?.unwrap_or(1050));

        Ok(Self {
            telegram_bot_token,
            chat_store_file,
            convert_target,
            default_allow_words,
            ng_rate_threshold: ng_rate_threshold as u32,
            reason_max_chars,
            admin_refresh_interval,
            delete_scan_interval,
            delete_grace_period,
            telegram_global_min_interval,
            telegram_per_chat_min_interval,
        })
    }

    pub fn deletion(&self) -> DeletionConfig {
        DeletionConfig {
            scan_interval: self.delete_scan_interval,
            grace_period: self.delete_grace_period,
        }
    }

    pub fn throttle(&self) -> ThrottleConfig {
        ThrottleConfig {
            global_gap: self.telegram_global_min_interval,
            chat_gap: self.telegram_per_chat_min_interval,
        }
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

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        &val[1..val.len() - 1]
    } else {
        val
    }
}

fn parse_csv_set(v: Option<String>) -> HashSet<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
