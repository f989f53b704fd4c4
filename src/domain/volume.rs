//! Team volume snapshots and per-level breakdowns.

use super::{Decimal, MemberId, Period};
use serde::{Deserialize, Serialize};

/// Qualifying volume of a single member over a period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeTally {
    pub volume: Decimal,
    pub order_count: u64,
}

impl VolumeTally {
    pub fn merge(&mut self, other: VolumeTally) {
        self.volume += other.volume;
        self.order_count += other.order_count;
    }
}

/// Volume contributed by the descendants sitting `level` hops below a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelVolume {
    pub level: u32,
    pub member_count: u64,
    pub level_volume: Decimal,
    pub order_count: u64,
    /// `level_volume / order_count`, zero when the level placed no orders.
    pub avg_order_size: Decimal,
}

impl LevelVolume {
    pub fn new(level: u32, member_count: u64, tally: VolumeTally) -> Self {
        let avg_order_size = tally
            .volume
            .checked_div(Decimal::from(tally.order_count as i64))
            .map(|d| d.round_money())
            .unwrap_or_default();
        LevelVolume {
            level,
            member_count,
            level_volume: tally.volume,
            order_count: tally.order_count,
            avg_order_size,
        }
    }
}

/// Team volume of a member for one period. Overwritten per `(member, period)` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamVolumeSnapshot {
    pub member_id: MemberId,
    pub period: Period,
    pub personal_volume: Decimal,
    pub team_volume: Decimal,
    pub active_referrals_count: u64,
    /// Deepest sponsor-tree level (relative) that holds at least one descendant.
    pub team_depth: u32,
}

impl TeamVolumeSnapshot {
    /// Rebuild a snapshot, rejecting team volume below personal volume.
    pub fn from_parts(
        member_id: MemberId,
        period: Period,
        personal_volume: Decimal,
        team_volume: Decimal,
        active_referrals_count: u64,
        team_depth: u32,
    ) -> Result<Self, String> {
        if team_volume < personal_volume {
            return Err(format!(
                "team volume {} below personal volume {} for {}",
                team_volume, personal_volume, member_id
            ));
        }
        Ok(TeamVolumeSnapshot {
            member_id,
            period,
            personal_volume,
            team_volume,
            active_referrals_count,
            team_depth,
        })
    }

    /// Volume contributed by the downline alone.
    pub fn downline_volume(&self) -> Decimal {
        self.team_volume - self.personal_volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TimeMs;

    #[test]
    fn test_level_volume_average() {
        let level = LevelVolume::new(
            1,
            2,
            VolumeTally {
                volume: Decimal::from(400i64),
                order_count: 3,
            },
        );
        assert_eq!(level.avg_order_size.to_canonical_string(), "133.33");
    }

    #[test]
    fn test_level_volume_without_orders_has_zero_average() {
        let level = LevelVolume::new(2, 4, VolumeTally::default());
        assert!(level.avg_order_size.is_zero());
        assert_eq!(level.member_count, 4);
    }

    #[test]
    fn test_snapshot_rejects_team_below_personal() {
        let period = Period::new(TimeMs::new(0), TimeMs::new(1)).unwrap();
        let result = TeamVolumeSnapshot::from_parts(
            MemberId::new("m"),
            period,
            Decimal::from(10i64),
            Decimal::from(5i64),
            0,
            0,
        );
        assert!(result.is_err());
    }
}
