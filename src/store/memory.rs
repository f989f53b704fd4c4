//! In-memory network store for tests and embedded use.

use super::{NetworkStore, StoreError};
use crate::domain::{
    Commission, CommissionId, CommissionStatus, MatrixPosition, Member, MemberId, MemberStatus,
    NewCommission, ParentLink, Period, PositionId, QualifyingEvent, SlotIndex, SlotMask,
    TeamVolumeSnapshot, TimeMs, VolumeTally,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct State {
    members: HashMap<MemberId, Member>,
    referrals: HashMap<MemberId, Vec<MemberId>>,
    /// Arena of positions; `PositionId(n)` lives at index `n - 1`.
    positions: Vec<MatrixPosition>,
    active_positions: HashMap<MemberId, PositionId>,
    children: HashMap<PositionId, Vec<PositionId>>,
    events: Vec<QualifyingEvent>,
    /// `CommissionId(n)` lives at index `n - 1`.
    commissions: Vec<Commission>,
    snapshots: HashMap<(MemberId, Period), TeamVolumeSnapshot>,
    pending_claim_conflicts: u32,
}

fn arena_index(raw_id: i64) -> Option<usize> {
    usize::try_from(raw_id.checked_sub(1)?).ok()
}

impl State {
    fn position(&self, id: PositionId) -> Option<&MatrixPosition> {
        arena_index(id.0).and_then(|idx| self.positions.get(idx))
    }

    fn position_mut(&mut self, id: PositionId) -> Option<&mut MatrixPosition> {
        arena_index(id.0).and_then(|idx| self.positions.get_mut(idx))
    }

    fn next_position_id(&self) -> PositionId {
        PositionId(self.positions.len() as i64 + 1)
    }

    fn commission_mut(&mut self, id: CommissionId) -> Option<&mut Commission> {
        arena_index(id.0).and_then(|idx| self.commissions.get_mut(idx))
    }

    fn push_commission(&mut self, commission: &NewCommission) -> Commission {
        let id = CommissionId(self.commissions.len() as i64 + 1);
        let stored = commission.clone().into_commission(id);
        self.commissions.push(stored.clone());
        stored
    }
}

/// Network store holding everything behind one mutex.
///
/// Each trait method runs in a single critical section, which makes every write atomic
/// and serializes concurrent slot claims.
#[derive(Debug, Default)]
pub struct InMemoryNetworkStore {
    state: Mutex<State>,
}

impl InMemoryNetworkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` slot claims fail with `Conflict`, as if another writer won.
    pub fn with_claim_conflicts(self, n: u32) -> Self {
        self.state.lock().pending_claim_conflicts = n;
        self
    }

    /// Number of stored volume snapshots.
    pub fn snapshot_count(&self) -> usize {
        self.state.lock().snapshots.len()
    }

    /// Update a member's tier in place, as the platform's upgrade flow would.
    pub fn set_tier(&self, id: &MemberId, tier: crate::domain::Tier) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let member = state
            .members
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("member {}", id)))?;
        member.tier = tier;
        Ok(())
    }
}

#[async_trait]
impl NetworkStore for InMemoryNetworkStore {
    async fn get_member(&self, id: &MemberId) -> Result<Option<Member>, StoreError> {
        Ok(self.state.lock().members.get(id).cloned())
    }

    async fn insert_member(&self, member: &Member) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.members.contains_key(&member.id) {
            return Err(StoreError::Conflict(format!(
                "member {} already exists",
                member.id
            )));
        }
        if let Some(sponsor) = &member.sponsor {
            state
                .referrals
                .entry(sponsor.clone())
                .or_default()
                .push(member.id.clone());
        }
        state.members.insert(member.id.clone(), member.clone());
        Ok(())
    }

    async fn update_member_activity(
        &self,
        id: &MemberId,
        status: MemberStatus,
        last_active_at: Option<TimeMs>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        let Some(member) = state.members.get_mut(id) else {
            return Ok(false);
        };
        member.status = status;
        member.last_active_at = last_active_at;
        Ok(true)
    }

    async fn get_sponsor(&self, id: &MemberId) -> Result<Option<MemberId>, StoreError> {
        Ok(self
            .state
            .lock()
            .members
            .get(id)
            .and_then(|m| m.sponsor.clone()))
    }

    async fn get_direct_referrals(&self, id: &MemberId) -> Result<Vec<MemberId>, StoreError> {
        let state = self.state.lock();
        let mut referrals: Vec<&Member> = state
            .referrals
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|child| state.members.get(child))
            .collect();
        referrals.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(referrals.into_iter().map(|m| m.id.clone()).collect())
    }

    async fn get_matrix_position(
        &self,
        member_id: &MemberId,
    ) -> Result<Option<MatrixPosition>, StoreError> {
        let state = self.state.lock();
        Ok(state
            .active_positions
            .get(member_id)
            .and_then(|id| state.position(*id))
            .cloned())
    }

    async fn get_children(
        &self,
        position_id: PositionId,
    ) -> Result<Vec<MatrixPosition>, StoreError> {
        let state = self.state.lock();
        let mut children: Vec<MatrixPosition> = state
            .children
            .get(&position_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.position(*id))
            .filter(|p| p.active)
            .cloned()
            .collect();
        children.sort_by_key(|p| p.slot);
        Ok(children)
    }

    async fn create_root_position(
        &self,
        member_id: &MemberId,
        at: TimeMs,
    ) -> Result<MatrixPosition, StoreError> {
        let mut state = self.state.lock();
        if state.active_positions.contains_key(member_id) {
            return Err(StoreError::AlreadyPlaced(member_id.clone()));
        }
        let id = state.next_position_id();
        let position = MatrixPosition::root(id, member_id.clone(), at);
        state.positions.push(position.clone());
        state.active_positions.insert(member_id.clone(), id);
        Ok(position)
    }

    async fn claim_slot(
        &self,
        parent: PositionId,
        slot: SlotIndex,
        new_member: &MemberId,
        at: TimeMs,
    ) -> Result<MatrixPosition, StoreError> {
        let mut state = self.state.lock();
        if state.pending_claim_conflicts > 0 {
            state.pending_claim_conflicts -= 1;
            return Err(StoreError::Conflict(format!(
                "slot {} under position {} was claimed concurrently",
                slot, parent
            )));
        }
        if state.active_positions.contains_key(new_member) {
            return Err(StoreError::AlreadyPlaced(new_member.clone()));
        }
        let parent_position = state
            .position(parent)
            .filter(|p| p.active)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("position {}", parent)))?;
        if parent_position.occupied.is_occupied(slot) {
            return Err(StoreError::Conflict(format!(
                "slot {} under position {} is already occupied",
                slot, parent
            )));
        }

        let id = state.next_position_id();
        let position = MatrixPosition::from_parts(
            id,
            new_member.clone(),
            Some(ParentLink {
                position: parent,
                member: parent_position.member_id.clone(),
                slot,
            }),
            parent_position.level + 1,
            SlotMask::empty(),
            true,
            at,
        )
        .map_err(StoreError::Corrupt)?;

        if let Some(p) = state.position_mut(parent) {
            p.occupied = p.occupied.with(slot);
        }
        state.positions.push(position.clone());
        state.children.entry(parent).or_default().push(id);
        state.active_positions.insert(new_member.clone(), id);
        Ok(position)
    }

    async fn append_commission(
        &self,
        commission: &NewCommission,
    ) -> Result<CommissionId, StoreError> {
        Ok(self.state.lock().push_commission(commission).id)
    }

    async fn record_qualifying_event(
        &self,
        event: &QualifyingEvent,
        commissions: &[NewCommission],
    ) -> Result<Vec<Commission>, StoreError> {
        let mut state = self.state.lock();
        state.events.push(event.clone());
        Ok(commissions
            .iter()
            .map(|c| state.push_commission(c))
            .collect())
    }

    async fn get_commissions(&self, ids: &[CommissionId]) -> Result<Vec<Commission>, StoreError> {
        let state = self.state.lock();
        Ok(ids
            .iter()
            .filter_map(|id| arena_index(id.0))
            .filter_map(|idx| state.commissions.get(idx))
            .cloned()
            .collect())
    }

    async fn list_commissions(
        &self,
        earner: &MemberId,
        status: Option<CommissionStatus>,
    ) -> Result<Vec<Commission>, StoreError> {
        let state = self.state.lock();
        Ok(state
            .commissions
            .iter()
            .filter(|c| &c.earner_id == earner && status.map_or(true, |s| c.status == s))
            .cloned()
            .collect())
    }

    async fn update_commission_status(
        &self,
        ids: &[CommissionId],
        status: CommissionStatus,
        at: TimeMs,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock();
        for id in ids {
            let current = arena_index(id.0)
                .and_then(|idx| state.commissions.get(idx))
                .map(|c| c.status);
            match current {
                Some(s) if s.can_transition_to(status) => {}
                Some(s) => {
                    return Err(StoreError::Conflict(format!(
                        "commission {} is {}, cannot become {}",
                        id, s, status
                    )))
                }
                None => return Err(StoreError::NotFound(format!("commission {}", id))),
            }
        }

        let mut updated = 0;
        for id in ids {
            if let Some(commission) = state.commission_mut(*id) {
                if commission.transition(status, at).is_ok() {
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn personal_volume(
        &self,
        member_id: &MemberId,
        period: &Period,
    ) -> Result<VolumeTally, StoreError> {
        let state = self.state.lock();
        let mut tally = VolumeTally::default();
        for event in state
            .events
            .iter()
            .filter(|e| &e.member_id == member_id && period.contains(e.occurred_at))
        {
            tally.merge(VolumeTally {
                volume: event.amount,
                order_count: 1,
            });
        }
        Ok(tally)
    }

    async fn write_volume_snapshot(&self, snapshot: &TeamVolumeSnapshot) -> Result<(), StoreError> {
        self.state.lock().snapshots.insert(
            (snapshot.member_id.clone(), snapshot.period),
            snapshot.clone(),
        );
        Ok(())
    }

    async fn get_volume_snapshot(
        &self,
        member_id: &MemberId,
        period: &Period,
    ) -> Result<Option<TeamVolumeSnapshot>, StoreError> {
        Ok(self
            .state
            .lock()
            .snapshots
            .get(&(member_id.clone(), *period))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Decimal, EventType, NewMember, Tier};

    fn slot(i: u8) -> SlotIndex {
        SlotIndex::new(i).unwrap()
    }

    async fn seed(store: &InMemoryNetworkStore, id: &str, sponsor: Option<&str>, at: i64) {
        let member = NewMember::new(id, sponsor.map(MemberId::from), Tier::Starter)
            .into_member(TimeMs::new(at));
        store.insert_member(&member).await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_member_rejects_duplicates() {
        let store = InMemoryNetworkStore::new();
        seed(&store, "a", None, 1).await;
        let dup = NewMember::new("a", None, Tier::Starter).into_member(TimeMs::new(2));
        assert!(matches!(
            store.insert_member(&dup).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_direct_referrals_ordered_by_creation() {
        let store = InMemoryNetworkStore::new();
        seed(&store, "root", None, 0).await;
        seed(&store, "late", Some("root"), 20).await;
        seed(&store, "early", Some("root"), 10).await;

        let referrals = store
            .get_direct_referrals(&MemberId::new("root"))
            .await
            .unwrap();
        assert_eq!(referrals, vec![MemberId::new("early"), MemberId::new("late")]);
    }

    #[tokio::test]
    async fn test_claim_slot_sets_parent_bit_and_level() {
        let store = InMemoryNetworkStore::new();
        let root = store
            .create_root_position(&MemberId::new("a"), TimeMs::new(0))
            .await
            .unwrap();
        let child = store
            .claim_slot(root.id, slot(1), &MemberId::new("b"), TimeMs::new(1))
            .await
            .unwrap();

        assert_eq!(child.level, 1);
        assert_eq!(child.parent_member, Some(MemberId::new("a")));
        let parent = store
            .get_matrix_position(&MemberId::new("a"))
            .await
            .unwrap()
            .unwrap();
        assert!(parent.occupied.is_occupied(slot(1)));
        assert_eq!(parent.occupied.count(), 1);
    }

    #[tokio::test]
    async fn test_claim_slot_twice_conflicts() {
        let store = InMemoryNetworkStore::new();
        let root = store
            .create_root_position(&MemberId::new("a"), TimeMs::new(0))
            .await
            .unwrap();
        store
            .claim_slot(root.id, slot(0), &MemberId::new("b"), TimeMs::new(1))
            .await
            .unwrap();
        let second = store
            .claim_slot(root.id, slot(0), &MemberId::new("c"), TimeMs::new(2))
            .await;
        assert!(matches!(second, Err(StoreError::Conflict(_))));
        let placed_again = store
            .claim_slot(root.id, slot(1), &MemberId::new("b"), TimeMs::new(3))
            .await;
        assert!(matches!(placed_again, Err(StoreError::AlreadyPlaced(_))));
    }

    #[tokio::test]
    async fn test_status_batch_is_all_or_nothing() {
        let store = InMemoryNetworkStore::new();
        let new = |earner: &str| NewCommission {
            earner_id: MemberId::new(earner),
            source_id: MemberId::new("x"),
            level: 1,
            amount: Decimal::from(10i64),
            commission_type: EventType::Purchase,
            earned_at: TimeMs::new(1),
        };
        let a = store.append_commission(&new("a")).await.unwrap();
        let b = store.append_commission(&new("b")).await.unwrap();
        store
            .update_commission_status(&[a], CommissionStatus::Paid, TimeMs::new(2))
            .await
            .unwrap();

        let result = store
            .update_commission_status(&[b, a], CommissionStatus::Cancelled, TimeMs::new(3))
            .await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));

        let b_now = store.get_commissions(&[b]).await.unwrap();
        assert_eq!(b_now[0].status, CommissionStatus::Pending);
    }
}
