//! # Server configuration.
//!
//! All knobs come from the process environment; the monitor cadences and
//! feature flags are compiled in (see [`crate::constants`]).

use std::env;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use chrono_tz::Tz;

use crate::constants::DEFAULT_TIMEZONE;

/// Server configuration, read once at start-up.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bot token for the chat transport. Start-up fails without it.
    pub bot_token: String,

    /// Fallback timezone for user-visible hour formatting.
    pub default_tz: Tz,

    /// Base URL of the companion web app, sent by the `/app` command.
    pub web_app_url: Option<String>,

    /// Directory holding one SQLite file per project database.
    pub db_dir: PathBuf,
}

impl Config {
    /// Reads the configuration from the environment.
    ///
    /// A missing `TELEGRAM_BOT_TOKEN` is the only fatal condition; everything
    /// else has a usable default.
    pub fn from_env() -> Result<Self> {
        let bot_token =
            env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN is not set")?;

        let default_tz = match env::var("DEFAULT_TZ") {
            Ok(name) => name
                .parse()
                .map_err(|_| anyhow::anyhow!("DEFAULT_TZ {name:?} is not a known IANA zone"))?,
            Err(_) => default_timezone(),
        };

        let web_app_url = env::var("WEB_APP_URL").ok().filter(|url| !url.is_empty());

        let db_dir = env::var("GEOCLOCK_DB_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("databases"));

        Ok(Self {
            bot_token,
            default_tz,
            web_app_url,
            db_dir,
        })
    }
}

/// Returns the compiled-in fallback timezone.
pub(crate) fn default_timezone() -> Tz {
    DEFAULT_TIMEZONE
        .parse()
        .unwrap_or(chrono_tz::Africa::Nairobi)
}
