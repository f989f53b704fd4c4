//! Storage abstraction the network engine reads from and writes to.
//!
//! The store is the single source of truth: the engine keeps no tree state between
//! calls and re-reads what it needs on every operation.

use crate::domain::{
    Commission, CommissionId, CommissionStatus, MatrixPosition, Member, MemberId, MemberStatus,
    NewCommission, Period, PositionId, QualifyingEvent, SlotIndex, TeamVolumeSnapshot, TimeMs,
    VolumeTally,
};
use async_trait::async_trait;
use thiserror::Error;

pub mod memory;

pub use memory::InMemoryNetworkStore;

/// Durable, transactional storage of members, matrix positions, events, commissions,
/// and volume snapshots.
///
/// Implementations must make `claim_slot`, `create_root_position`,
/// `record_qualifying_event`, and `update_commission_status` atomic.
#[async_trait]
pub trait NetworkStore: Send + Sync {
    /// Fetch a member by id.
    async fn get_member(&self, id: &MemberId) -> Result<Option<Member>, StoreError>;

    /// Insert a new member. Fails with `Conflict` when the id is taken.
    async fn insert_member(&self, member: &Member) -> Result<(), StoreError>;

    /// Overwrite a member's status and last activity time. Returns false for unknown ids.
    async fn update_member_activity(
        &self,
        id: &MemberId,
        status: MemberStatus,
        last_active_at: Option<TimeMs>,
    ) -> Result<bool, StoreError>;

    /// Referrer of a member, None for network roots.
    async fn get_sponsor(&self, id: &MemberId) -> Result<Option<MemberId>, StoreError>;

    /// Members directly referred by `id`, ordered by `(created_at, id)`.
    async fn get_direct_referrals(&self, id: &MemberId) -> Result<Vec<MemberId>, StoreError>;

    /// Active matrix position of a member.
    async fn get_matrix_position(
        &self,
        member_id: &MemberId,
    ) -> Result<Option<MatrixPosition>, StoreError>;

    /// Active children of a position, ordered by slot (at most three).
    async fn get_children(&self, position_id: PositionId)
        -> Result<Vec<MatrixPosition>, StoreError>;

    /// Create a level-0 position for a member that has none.
    async fn create_root_position(
        &self,
        member_id: &MemberId,
        at: TimeMs,
    ) -> Result<MatrixPosition, StoreError>;

    /// Atomically fill `slot` under `parent` with `new_member`.
    ///
    /// Fails with `Conflict` if the slot is already filled and with `AlreadyPlaced`
    /// if the member already holds an active position.
    async fn claim_slot(
        &self,
        parent: PositionId,
        slot: SlotIndex,
        new_member: &MemberId,
        at: TimeMs,
    ) -> Result<MatrixPosition, StoreError>;

    /// Append a single commission record.
    async fn append_commission(&self, commission: &NewCommission)
        -> Result<CommissionId, StoreError>;

    /// Persist an event together with the commissions it generated, all or nothing.
    async fn record_qualifying_event(
        &self,
        event: &QualifyingEvent,
        commissions: &[NewCommission],
    ) -> Result<Vec<Commission>, StoreError>;

    /// Fetch commissions by id. Unknown ids are omitted.
    async fn get_commissions(&self, ids: &[CommissionId]) -> Result<Vec<Commission>, StoreError>;

    /// Commissions earned by a member, oldest first.
    async fn list_commissions(
        &self,
        earner: &MemberId,
        status: Option<CommissionStatus>,
    ) -> Result<Vec<Commission>, StoreError>;

    /// Move every listed commission from pending to `status` in one batch.
    ///
    /// If any listed commission is missing or not pending, nothing changes and
    /// `Conflict` is returned. Returns the number of rows updated otherwise.
    async fn update_commission_status(
        &self,
        ids: &[CommissionId],
        status: CommissionStatus,
        at: TimeMs,
    ) -> Result<u64, StoreError>;

    /// Sum of a member's own qualifying events within the period.
    async fn personal_volume(
        &self,
        member_id: &MemberId,
        period: &Period,
    ) -> Result<VolumeTally, StoreError>;

    /// Write (or overwrite) the snapshot for its `(member, period)` key.
    async fn write_volume_snapshot(&self, snapshot: &TeamVolumeSnapshot) -> Result<(), StoreError>;

    async fn get_volume_snapshot(
        &self,
        member_id: &MemberId,
        period: &Period,
    ) -> Result<Option<TeamVolumeSnapshot>, StoreError>;
}

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A concurrent writer got there first (slot taken, duplicate key, stale status).
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Member {0} already holds an active matrix position")]
    AlreadyPlaced(MemberId),
    #[error("Not found: {0}")]
    NotFound(String),
    /// Stored data could not be turned back into a domain value.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Conflict("slot 1 under position 4".to_string());
        assert_eq!(err.to_string(), "Conflict: slot 1 under position 4");

        let err = StoreError::AlreadyPlaced(MemberId::new("m1"));
        assert_eq!(
            err.to_string(),
            "Member m1 already holds an active matrix position"
        );
    }
}
