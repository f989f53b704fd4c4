//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct, the SQLite `NetworkStore`.
//! Methods are organized across submodules by domain:
//! - `mod.rs` - Members and the sponsor relation
//! - `matrix.rs` - Matrix positions and slot claims
//! - `commissions.rs` - Qualifying events and commission status batches
//! - `volume.rs` - Personal volume sums and team volume snapshots

mod commissions;
mod matrix;
mod volume;

use crate::domain::{
    Commission, CommissionId, CommissionStatus, Decimal, MatrixPosition, Member, MemberId,
    MemberStatus, NewCommission, Period, PositionId, QualifyingEvent, SlotIndex,
    TeamVolumeSnapshot, Tier, TimeMs, VolumeTally,
};
use crate::store::{NetworkStore, StoreError};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

/// SQLite implementation of the network store.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    // =========================================================================
    // Member operations
    // =========================================================================

    /// Fetch a member by id.
    ///
    /// # Errors
    /// Returns an error if the query fails or the row cannot be decoded.
    pub async fn get_member(&self, id: &MemberId) -> Result<Option<Member>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, sponsor_id, tier, status, created_at, last_active_at
            FROM members
            WHERE id = ?
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(member_from_row).transpose()
    }

    /// Insert a member.
    ///
    /// # Errors
    /// Returns `Conflict` if the id already exists.
    pub async fn insert_member(&self, member: &Member) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO members (id, sponsor_id, tier, status, created_at, last_active_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(member.id.as_str())
        .bind(member.sponsor.as_ref().map(|s| s.as_str()))
        .bind(member.tier.as_str())
        .bind(member.status.as_str())
        .bind(member.created_at.as_ms())
        .bind(member.last_active_at.map(|t| t.as_ms()))
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, format!("member {} already exists", member.id)))?;

        Ok(())
    }

    /// Record platform activity for a member (tier/status upkeep lives outside the engine).
    pub async fn update_member_activity(
        &self,
        id: &MemberId,
        status: MemberStatus,
        last_active_at: Option<TimeMs>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE members SET status = ?, last_active_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(last_active_at.map(|t| t.as_ms()))
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_sponsor(&self, id: &MemberId) -> Result<Option<MemberId>, StoreError> {
        let row = sqlx::query("SELECT sponsor_id FROM members WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .and_then(|r| r.get::<Option<String>, _>("sponsor_id"))
            .map(MemberId::new))
    }

    /// Direct referrals ordered by `(created_at, id)`.
    pub async fn get_direct_referrals(&self, id: &MemberId) -> Result<Vec<MemberId>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM members
            WHERE sponsor_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| MemberId::new(r.get::<String, _>("id")))
            .collect())
    }
}

#[async_trait]
impl NetworkStore for Repository {
    async fn get_member(&self, id: &MemberId) -> Result<Option<Member>, StoreError> {
        Repository::get_member(self, id).await
    }

    async fn insert_member(&self, member: &Member) -> Result<(), StoreError> {
        Repository::insert_member(self, member).await
    }

    async fn update_member_activity(
        &self,
        id: &MemberId,
        status: MemberStatus,
        last_active_at: Option<TimeMs>,
    ) -> Result<bool, StoreError> {
        Repository::update_member_activity(self, id, status, last_active_at).await
    }

    async fn get_sponsor(&self, id: &MemberId) -> Result<Option<MemberId>, StoreError> {
        Repository::get_sponsor(self, id).await
    }

    async fn get_direct_referrals(&self, id: &MemberId) -> Result<Vec<MemberId>, StoreError> {
        Repository::get_direct_referrals(self, id).await
    }

    async fn get_matrix_position(
        &self,
        member_id: &MemberId,
    ) -> Result<Option<MatrixPosition>, StoreError> {
        Repository::get_matrix_position(self, member_id).await
    }

    async fn get_children(
        &self,
        position_id: PositionId,
    ) -> Result<Vec<MatrixPosition>, StoreError> {
        Repository::get_children(self, position_id).await
    }

    async fn create_root_position(
        &self,
        member_id: &MemberId,
        at: TimeMs,
    ) -> Result<MatrixPosition, StoreError> {
        Repository::create_root_position(self, member_id, at).await
    }

    async fn claim_slot(
        &self,
        parent: PositionId,
        slot: SlotIndex,
        new_member: &MemberId,
        at: TimeMs,
    ) -> Result<MatrixPosition, StoreError> {
        Repository::claim_slot(self, parent, slot, new_member, at).await
    }

    async fn append_commission(
        &self,
        commission: &NewCommission,
    ) -> Result<CommissionId, StoreError> {
        Repository::append_commission(self, commission).await
    }

    async fn record_qualifying_event(
        &self,
        event: &QualifyingEvent,
        commissions: &[NewCommission],
    ) -> Result<Vec<Commission>, StoreError> {
        Repository::record_qualifying_event(self, event, commissions).await
    }

    async fn get_commissions(&self, ids: &[CommissionId]) -> Result<Vec<Commission>, StoreError> {
        Repository::get_commissions(self, ids).await
    }

    async fn list_commissions(
        &self,
        earner: &MemberId,
        status: Option<CommissionStatus>,
    ) -> Result<Vec<Commission>, StoreError> {
        Repository::list_commissions(self, earner, status).await
    }

    async fn update_commission_status(
        &self,
        ids: &[CommissionId],
        status: CommissionStatus,
        at: TimeMs,
    ) -> Result<u64, StoreError> {
        Repository::update_commission_status(self, ids, status, at).await
    }

    async fn personal_volume(
        &self,
        member_id: &MemberId,
        period: &Period,
    ) -> Result<VolumeTally, StoreError> {
        Repository::personal_volume(self, member_id, period).await
    }

    async fn write_volume_snapshot(&self, snapshot: &TeamVolumeSnapshot) -> Result<(), StoreError> {
        Repository::write_volume_snapshot(self, snapshot).await
    }

    async fn get_volume_snapshot(
        &self,
        member_id: &MemberId,
        period: &Period,
    ) -> Result<Option<TeamVolumeSnapshot>, StoreError> {
        Repository::get_volume_snapshot(self, member_id, period).await
    }
}

// =========================================================================
// Row decoding
// =========================================================================

fn member_from_row(row: &SqliteRow) -> Result<Member, StoreError> {
    let id = MemberId::new(row.get::<String, _>("id"));
    let tier = Tier::from_str(&row.get::<String, _>("tier")).map_err(StoreError::Corrupt)?;
    let status =
        MemberStatus::from_str(&row.get::<String, _>("status")).map_err(StoreError::Corrupt)?;

    Member::from_parts(
        id.clone(),
        row.get::<Option<String>, _>("sponsor_id").map(MemberId::new),
        tier,
        status,
        TimeMs::new(row.get("created_at")),
        row.get::<Option<i64>, _>("last_active_at").map(TimeMs::new),
    )
    .ok_or_else(|| StoreError::Corrupt(format!("member {} sponsors itself", id)))
}

fn parse_decimal(raw: &str, what: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str_canonical(raw)
        .map_err(|e| StoreError::Corrupt(format!("{} {:?}: {}", what, raw, e)))
}

/// Map a unique-constraint violation to `Conflict`, anything else to `Db`.
fn conflict_on_unique(err: sqlx::Error, message: String) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::Conflict(message)
        }
        _ => StoreError::Db(err),
    }
}
