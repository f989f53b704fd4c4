use crate::engine::{CommissionPlan, PlanError};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// Spillover depth used when a placement does not ask for one.
    pub matrix_max_level: u32,
    pub team_volume_depth: u32,
    /// Rolling window of the tier-upgrade check.
    pub volume_period_days: u32,
    pub active_window_days: u32,
    pub commission_plan: CommissionPlan,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
    #[error("Invalid commission plan: {0}")]
    Plan(#[from] PlanError),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let matrix_max_level = parse_u32(&env_map, "MATRIX_MAX_LEVEL", 5)?;
        let team_volume_depth = parse_u32(&env_map, "TEAM_VOLUME_DEPTH", 5)?;

        let volume_period_days = parse_u32(&env_map, "VOLUME_PERIOD_DAYS", 30)?;
        if volume_period_days == 0 {
            return Err(ConfigError::InvalidValue(
                "VOLUME_PERIOD_DAYS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let active_window_days = parse_u32(&env_map, "ACTIVE_WINDOW_DAYS", 30)?;

        let commission_plan = match env_map.get("COMMISSION_PLAN_FILE") {
            Some(path) => CommissionPlan::from_file(path)?,
            None => CommissionPlan::default(),
        };

        Ok(Config {
            port,
            database_path,
            matrix_max_level,
            team_volume_depth,
            volume_period_days,
            active_window_days,
            commission_plan,
        })
    }
}

fn parse_u32(
    env_map: &HashMap<String, String>,
    key: &str,
    default: u32,
) -> Result<u32, ConfigError> {
    match env_map.get(key) {
        Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be a non-negative integer".to_string())
        }),
        None => Ok(default),
    }
}
