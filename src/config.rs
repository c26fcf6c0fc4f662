//! Runtime configuration read from the environment.
//!
//! A `.env` file in the working directory is honoured when present.

use poise::serenity_prelude::GuildId;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is not a valid {expected}: {value}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Bot token; the dashboard still runs without one
    pub discord_token: Option<String>,
    /// The guild the dashboard administers
    pub main_guild_id: Option<GuildId>,
    pub dashboard_host: String,
    pub dashboard_port: u16,
    pub data_dir: PathBuf,
    pub session_ttl_hours: i64,
    /// How often expired voice sanctions are swept
    pub sanction_check_interval_secs: u64,
    /// Seeded as the first owner account when no account exists
    pub owner_username: Option<String>,
    pub owner_password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: None,
            main_guild_id: None,
            dashboard_host: "0.0.0.0".to_string(),
            dashboard_port: 3000,
            data_dir: PathBuf::from("data"),
            session_ttl_hours: 24,
            sanction_check_interval_secs: 30,
            owner_username: None,
            owner_password: None,
        }
    }
}

impl Config {
    /// Load the configuration from the process environment
    ///
    /// # Errors
    /// Returns an error when a numeric variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    ///
    /// # Errors
    /// Returns an error when a numeric variable cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let main_guild_id = match get("MAIN_GUILD_ID") {
            Some(raw) => Some(
                raw.parse::<u64>()
                    .ok()
                    .filter(|id| *id != 0)
                    .map(GuildId::new)
                    .ok_or(ConfigError::Invalid {
                        name: "MAIN_GUILD_ID",
                        expected: "guild id",
                        value: raw,
                    })?,
            ),
            None => None,
        };

        Ok(Self {
            discord_token: get("DISCORD_TOKEN").or_else(|| get("BOT_TOKEN")),
            main_guild_id,
            dashboard_host: get("DASHBOARD_HOST").unwrap_or(defaults.dashboard_host),
            dashboard_port: parse_or(get("PORT"), "PORT", defaults.dashboard_port)?,
            data_dir: get("DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            session_ttl_hours: parse_or(
                get("SESSION_TTL_HOURS"),
                "SESSION_TTL_HOURS",
                defaults.session_ttl_hours,
            )?,
            sanction_check_interval_secs: parse_or(
                get("SANCTION_CHECK_INTERVAL_SECS"),
                "SANCTION_CHECK_INTERVAL_SECS",
                defaults.sanction_check_interval_secs,
            )?,
            owner_username: get("OWNER_USERNAME"),
            owner_password: get("OWNER_PASSWORD"),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            name,
            expected: "number",
            value,
        }),
        None => Ok(default),
    }
}
