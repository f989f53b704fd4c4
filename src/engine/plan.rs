//! Table-driven commission plan: per-level rates and tier thresholds.

use crate::domain::{Decimal, EventType, Tier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

fn default_max_level() -> u32 {
    5
}

/// Commission rates and eligibility thresholds.
///
/// `level_rates[event][n]` is the rate paid at level `n + 1`; `tier_thresholds[n]` is the
/// minimum tier an ancestor needs to earn at level `n + 1`. Level 1 is always eligible.
/// Levels past the end of the thresholds table reuse its last entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionPlan {
    #[serde(default = "default_max_level")]
    pub max_level: u32,
    pub level_rates: BTreeMap<EventType, Vec<Decimal>>,
    pub tier_thresholds: Vec<Tier>,
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("maxLevel must be at least 1")]
    ZeroMaxLevel,
    #[error("rate {rate} for {event_type} level {level} is outside [0, 1]")]
    RateOutOfRange {
        event_type: EventType,
        level: u32,
        rate: Decimal,
    },
    #[error("tier threshold for level {level} is lower than the level before it")]
    ThresholdsDecrease { level: u32 },
    #[error("cannot read commission plan: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse commission plan: {0}")]
    Parse(#[from] serde_json::Error),
}

impl Default for CommissionPlan {
    fn default() -> Self {
        let rates = |values: [&str; 5]| -> Vec<Decimal> {
            values
                .iter()
                .filter_map(|v| Decimal::from_str(v).ok())
                .collect()
        };

        let mut level_rates = BTreeMap::new();
        level_rates.insert(
            EventType::Purchase,
            rates(["0.10", "0.05", "0.03", "0.02", "0.01"]),
        );
        level_rates.insert(
            EventType::Subscription,
            rates(["0.05", "0.03", "0.02", "0.01", "0.01"]),
        );
        level_rates.insert(
            EventType::Renewal,
            rates(["0.03", "0.02", "0.01", "0.01", "0.01"]),
        );

        CommissionPlan {
            max_level: default_max_level(),
            level_rates,
            tier_thresholds: vec![
                Tier::Starter,
                Tier::Builder,
                Tier::Leader,
                Tier::Elite,
                Tier::Elite,
            ],
        }
    }
}

impl CommissionPlan {
    /// Parse and validate a plan from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, PlanError> {
        let plan: CommissionPlan = serde_json::from_str(json)?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PlanError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        if self.max_level == 0 {
            return Err(PlanError::ZeroMaxLevel);
        }

        for (event_type, rates) in &self.level_rates {
            for (idx, rate) in rates.iter().enumerate() {
                if rate.is_negative() || *rate > Decimal::one() {
                    return Err(PlanError::RateOutOfRange {
                        event_type: *event_type,
                        level: idx as u32 + 1,
                        rate: *rate,
                    });
                }
            }
        }

        for (idx, pair) in self.tier_thresholds.windows(2).enumerate() {
            if pair[1] < pair[0] {
                return Err(PlanError::ThresholdsDecrease {
                    level: idx as u32 + 2,
                });
            }
        }

        Ok(())
    }

    /// Rate for a 1-indexed level, zero when the plan has none.
    pub fn rate(&self, level: u32, event_type: EventType) -> Decimal {
        let Some(idx) = level.checked_sub(1) else {
            return Decimal::zero();
        };
        self.level_rates
            .get(&event_type)
            .and_then(|rates| rates.get(idx as usize))
            .copied()
            .unwrap_or_default()
    }

    /// Minimum tier needed at a 1-indexed level.
    pub fn min_tier(&self, level: u32) -> Tier {
        if level <= 1 {
            return Tier::Starter;
        }
        let idx = (level - 1) as usize;
        self.tier_thresholds
            .get(idx)
            .or_else(|| self.tier_thresholds.last())
            .copied()
            .unwrap_or_default()
    }

    pub fn is_eligible(&self, level: u32, tier: Tier) -> bool {
        level == 1 || tier >= self.min_tier(level)
    }
}
