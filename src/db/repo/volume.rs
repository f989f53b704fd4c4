//! Personal volume sums and team volume snapshot persistence.

use crate::domain::{Decimal, MemberId, Period, TeamVolumeSnapshot, VolumeTally};
use crate::store::StoreError;
use sqlx::Row;

use super::{parse_decimal, Repository};

impl Repository {
    /// Sum a member's qualifying events inside the period.
    ///
    /// # Implementation Note
    ///
    /// Amounts are summed in Rust. SQLite's SUM over TEXT coerces to REAL, which
    /// would lose precision on money.
    pub async fn personal_volume(
        &self,
        member_id: &MemberId,
        period: &Period,
    ) -> Result<VolumeTally, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT amount
            FROM qualifying_events
            WHERE member_id = ? AND occurred_at >= ? AND occurred_at <= ?
            ORDER BY id ASC
            "#,
        )
        .bind(member_id.as_str())
        .bind(period.start.as_ms())
        .bind(period.end.as_ms())
        .fetch_all(&self.pool)
        .await?;

        let mut tally = VolumeTally::default();
        for row in rows {
            let amount = parse_decimal(&row.get::<String, _>("amount"), "event amount")?;
            tally.merge(VolumeTally {
                volume: amount,
                order_count: 1,
            });
        }
        Ok(tally)
    }

    /// Upsert the snapshot for its `(member, period)` key.
    pub async fn write_volume_snapshot(
        &self,
        snapshot: &TeamVolumeSnapshot,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO volume_snapshots (
                member_id, period_start, period_end, personal_volume, team_volume,
                active_referrals_count, team_depth, computed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(member_id, period_start, period_end) DO UPDATE SET
                personal_volume = excluded.personal_volume,
                team_volume = excluded.team_volume,
                active_referrals_count = excluded.active_referrals_count,
                team_depth = excluded.team_depth,
                computed_at = excluded.computed_at
            "#,
        )
        .bind(snapshot.member_id.as_str())
        .bind(snapshot.period.start.as_ms())
        .bind(snapshot.period.end.as_ms())
        .bind(snapshot.personal_volume.to_canonical_string())
        .bind(snapshot.team_volume.to_canonical_string())
        .bind(snapshot.active_referrals_count as i64)
        .bind(i64::from(snapshot.team_depth))
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_volume_snapshot(
        &self,
        member_id: &MemberId,
        period: &Period,
    ) -> Result<Option<TeamVolumeSnapshot>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT personal_volume, team_volume, active_referrals_count, team_depth
            FROM volume_snapshots
            WHERE member_id = ? AND period_start = ? AND period_end = ?
            "#,
        )
        .bind(member_id.as_str())
        .bind(period.start.as_ms())
        .bind(period.end.as_ms())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let personal: Decimal =
            parse_decimal(&row.get::<String, _>("personal_volume"), "personal volume")?;
        let team: Decimal = parse_decimal(&row.get::<String, _>("team_volume"), "team volume")?;
        let active = u64::try_from(row.get::<i64, _>("active_referrals_count"))
            .map_err(|_| StoreError::Corrupt("negative active referral count".to_string()))?;
        let depth = u32::try_from(row.get::<i64, _>("team_depth"))
            .map_err(|_| StoreError::Corrupt("negative team depth".to_string()))?;

        TeamVolumeSnapshot::from_parts(member_id.clone(), *period, personal, team, active, depth)
            .map(Some)
            .map_err(StoreError::Corrupt)
    }
}
