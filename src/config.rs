use crate::error::{AppError, AppResult};
use crate::models::{ChanceRule, ClaimPolicy};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minutes a participant has to confirm a claim before it lapses
    pub grace_period_minutes: i64,
    /// How many random picks `get_and_claim_random` tries before falling back to unlimited prizes
    pub random_max_tries: u32,
    pub requires_confirmation: bool,
    pub unique_per_participant: bool,
    /// Can a participant claim an unlimited prize several times?
    pub can_reclaim_unlimited: bool,
    pub consumes_chance: bool,
    pub chance_rule: ChanceRule,
    /// Chances a freshly registered participant starts with
    pub initial_chances: i32,
}

/// One year
const MAX_GRACE_PERIOD_MINUTES: i64 = 365 * 24 * 60;

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grace_period_minutes: 5,
            random_max_tries: 6,
            requires_confirmation: true,
            unique_per_participant: true,
            can_reclaim_unlimited: true,
            consumes_chance: true,
            chance_rule: ChanceRule::Limited,
            initial_chances: 1,
        }
    }
}

impl EngineConfig {
    pub fn claim_policy(&self) -> AppResult<ClaimPolicy> {
        self.validate()?;
        Ok(ClaimPolicy {
            requires_confirmation: self.requires_confirmation,
            unique_per_participant: self.unique_per_participant,
            can_reclaim_unlimited: self.can_reclaim_unlimited,
            consumes_chance: self.consumes_chance,
            grace_period: self.grace_period()?,
            random_max_tries: self.random_max_tries,
        })
    }

    fn grace_period(&self) -> AppResult<Duration> {
        Duration::try_minutes(self.grace_period_minutes).ok_or_else(|| {
            AppError::ConfigError(format!(
                "grace_period_minutes {} is out of range",
                self.grace_period_minutes
            ))
        })
    }

    fn validate(&self) -> AppResult<()> {
        if self.grace_period_minutes < 0 {
            return Err(AppError::ConfigError(
                "grace_period_minutes must not be negative".into(),
            ));
        }
        if self.grace_period_minutes > MAX_GRACE_PERIOD_MINUTES {
            return Err(AppError::ConfigError(format!(
                "grace_period_minutes must not exceed {MAX_GRACE_PERIOD_MINUTES}"
            )));
        }
        if self.initial_chances < 0 {
            return Err(AppError::ConfigError(
                "initial_chances must not be negative".into(),
            ));
        }
        Ok(())
    }
}

fn get_env(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    pub fn from_toml() -> AppResult<Self> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // Without a config file everything comes from the environment and defaults
        let mut config: Config = match std::fs::read_to_string(&config_path) {
            Ok(config_str) => Self::from_toml_str(&config_str)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let database_url = get_env("DATABASE_URL").ok_or_else(|| {
                    AppError::ConfigError(
                        "DATABASE_URL is not set and no config.toml was found".into(),
                    )
                })?;

                Config {
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: get_env_parse("DB_MAX_CONNECTIONS").unwrap_or(10),
                    },
                    engine: EngineConfig::default(),
                }
            }
            Err(e) => {
                return Err(AppError::ConfigError(format!(
                    "failed to read config file {config_path}: {e}"
                )));
            }
        };

        config.apply_env_overrides();
        config.engine.validate()?;

        Ok(config)
    }

    pub fn from_toml_str(config_str: &str) -> AppResult<Self> {
        let config: Config = toml::from_str(config_str)
            .map_err(|e| AppError::ConfigError(format!("failed to parse config file: {e}")))?;
        Ok(config)
    }

    /// Environment variables win over file values.
    fn apply_env_overrides(&mut self) {
        if let Some(v) = get_env("DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(n) = get_env_parse("DB_MAX_CONNECTIONS") {
            self.database.max_connections = n;
        }
        if let Some(n) = get_env_parse("REFEREE_GRACE_PERIOD_MINUTES") {
            self.engine.grace_period_minutes = n;
        }
        if let Some(n) = get_env_parse("REFEREE_RANDOM_MAX_TRIES") {
            self.engine.random_max_tries = n;
        }
        if let Some(b) = get_env_parse("REFEREE_REQUIRES_CONFIRMATION") {
            self.engine.requires_confirmation = b;
        }
        if let Some(b) = get_env_parse("REFEREE_UNIQUE_PER_PARTICIPANT") {
            self.engine.unique_per_participant = b;
        }
        if let Some(b) = get_env_parse("REFEREE_CAN_RECLAIM_UNLIMITED") {
            self.engine.can_reclaim_unlimited = b;
        }
        if let Some(b) = get_env_parse("REFEREE_CONSUMES_CHANCE") {
            self.engine.consumes_chance = b;
        }
        if let Some(rule) = get_env_parse("REFEREE_CHANCE_RULE") {
            self.engine.chance_rule = rule;
        }
        if let Some(n) = get_env_parse("REFEREE_INITIAL_CHANCES") {
            self.engine.initial_chances = n;
        }
    }
}
