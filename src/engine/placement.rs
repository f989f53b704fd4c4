//! Matrix placement with breadth-first spillover.

use super::{EngineError, MatrixTree};
use crate::domain::{MatrixPosition, Member, MemberId, TimeMs};
use crate::store::{NetworkStore, StoreError};
use backoff::future::retry;
use backoff::ExponentialBackoff;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Scan-and-claim rounds before a lost race is surfaced to the caller.
pub const MAX_CLAIM_ATTEMPTS: u32 = 10;

/// Upper bound on the time spent retrying lost claims.
const CLAIM_RETRY_WINDOW: Duration = Duration::from_secs(10);

/// Finds and claims matrix slots for new members.
///
/// Placements issued through one engine (and its clones) are serialized, so they
/// queue instead of racing for the same first open slot. The store's `claim_slot`
/// stays the only atomic step: a `Conflict` means a writer outside this engine took
/// the slot between scan and claim, and the scan is retried with jittered
/// exponential backoff from a fresh read of the sponsor's position.
#[derive(Clone)]
pub struct PlacementEngine {
    store: Arc<dyn NetworkStore>,
    matrix: MatrixTree,
    claims: Arc<Mutex<()>>,
}

impl PlacementEngine {
    pub fn new(store: Arc<dyn NetworkStore>) -> Self {
        Self {
            matrix: MatrixTree::new(store.clone()),
            store,
            claims: Arc::new(Mutex::new(())),
        }
    }

    /// Place `new_member` under `sponsor`, spilling over up to `max_level` levels deep.
    pub async fn place(
        &self,
        new_member: &MemberId,
        sponsor: &MemberId,
        max_level: u32,
    ) -> Result<MatrixPosition, EngineError> {
        if new_member == sponsor {
            return Err(EngineError::InvalidSponsor(sponsor.clone()));
        }
        match self.store.get_member(sponsor).await? {
            Some(member) if member.is_active() => {}
            _ => return Err(EngineError::InvalidSponsor(sponsor.clone())),
        }
        self.require_member(new_member).await?;

        let _claims = self.claims.lock().await;
        if self.matrix.position(new_member).await?.is_some() {
            return Err(EngineError::AlreadyPlaced(new_member.clone()));
        }
        self.ensure_root(sponsor).await?;

        let backoff = ExponentialBackoff {
            current_interval: Duration::from_millis(5),
            initial_interval: Duration::from_millis(5),
            max_interval: Duration::from_millis(250),
            max_elapsed_time: Some(CLAIM_RETRY_WINDOW),
            ..Default::default()
        };
        let attempts = AtomicU32::new(0);

        retry(backoff, || async {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            self.claim_open_slot(new_member, sponsor, max_level, attempt).await
        })
        .await
    }

    /// One scan-and-claim round. Only a lost claim is worth another round.
    async fn claim_open_slot(
        &self,
        new_member: &MemberId,
        sponsor: &MemberId,
        max_level: u32,
        attempt: u32,
    ) -> Result<MatrixPosition, backoff::Error<EngineError>> {
        let root = self
            .matrix
            .position(sponsor)
            .await
            .map_err(EngineError::from)?
            .ok_or_else(|| EngineError::InvalidSponsor(sponsor.clone()))?;
        let Some(open) = self
            .matrix
            .find_open_slot(&root, max_level)
            .await
            .map_err(EngineError::from)?
        else {
            return Err(backoff::Error::permanent(EngineError::PlacementExhausted {
                sponsor: sponsor.clone(),
                max_level,
            }));
        };
        debug!(
            sponsor = %sponsor,
            parent = %open.parent.member_id,
            slot = %open.slot,
            depth = open.depth,
            attempt,
            "Claiming matrix slot"
        );

        match self
            .store
            .claim_slot(open.parent.id, open.slot, new_member, TimeMs::now())
            .await
        {
            Ok(position) => {
                info!(
                    member = %new_member,
                    sponsor = %sponsor,
                    parent = %open.parent.member_id,
                    level = position.level,
                    slot = %open.slot,
                    spillover = open.depth > 0,
                    "Member placed in matrix"
                );
                Ok(position)
            }
            Err(StoreError::Conflict(reason)) => {
                warn!(
                    member = %new_member,
                    sponsor = %sponsor,
                    attempt,
                    %reason,
                    "Slot claim lost, rescanning"
                );
                let lost = EngineError::SlotClaimConflict { attempts: attempt };
                if attempt >= MAX_CLAIM_ATTEMPTS {
                    Err(backoff::Error::permanent(lost))
                } else {
                    Err(backoff::Error::transient(lost))
                }
            }
            Err(StoreError::AlreadyPlaced(member)) => {
                Err(backoff::Error::permanent(EngineError::AlreadyPlaced(member)))
            }
            Err(e) => Err(backoff::Error::permanent(e.into())),
        }
    }

    /// Position of `member`, creating a level-0 root for it when it has none.
    pub async fn ensure_root(&self, member: &MemberId) -> Result<MatrixPosition, EngineError> {
        if let Some(position) = self.matrix.position(member).await? {
            return Ok(position);
        }
        self.require_member(member).await?;

        match self.store.create_root_position(member, TimeMs::now()).await {
            Ok(position) => {
                info!(member = %member, "Created matrix root position");
                Ok(position)
            }
            // Another call created it first.
            Err(StoreError::AlreadyPlaced(_)) => self
                .matrix
                .position(member)
                .await?
                .ok_or_else(|| EngineError::MemberNotFound(member.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn require_member(&self, id: &MemberId) -> Result<Member, EngineError> {
        self.store
            .get_member(id)
            .await?
            .ok_or_else(|| EngineError::MemberNotFound(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MemberStatus, SlotIndex, Tier};
    use crate::engine::testing::{join, member_id};
    use crate::store::InMemoryNetworkStore;

    async fn store_with_sponsor() -> Arc<InMemoryNetworkStore> {
        let store = Arc::new(InMemoryNetworkStore::new());
        join(&store, "s", None, Tier::Leader, 0).await;
        store
    }

    async fn place_n(
        engine: &PlacementEngine,
        store: &Arc<InMemoryNetworkStore>,
        n: usize,
        max_level: u32,
    ) {
        for i in 0..n {
            let id = format!("r{}", i);
            join(store, &id, Some("s"), Tier::Starter, i as i64 + 1).await;
            engine
                .place(&member_id(&id), &member_id("s"), max_level)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_first_placement_creates_sponsor_root() {
        let store = store_with_sponsor().await;
        join(&store, "a", Some("s"), Tier::Starter, 1).await;
        let engine = PlacementEngine::new(store.clone());

        let position = engine.place(&member_id("a"), &member_id("s"), 5).await.unwrap();
        assert_eq!(position.level, 1);
        assert_eq!(position.slot, SlotIndex::new(0));
        assert_eq!(position.parent_member, Some(member_id("s")));

        let root = store.get_matrix_position(&member_id("s")).await.unwrap().unwrap();
        assert!(root.is_root());
    }

    #[tokio::test]
    async fn test_fourth_referral_spills_to_first_child() {
        let store = store_with_sponsor().await;
        let engine = PlacementEngine::new(store.clone());
        place_n(&engine, &store, 3, 5).await;

        join(&store, "fourth", Some("s"), Tier::Starter, 10).await;
        let position = engine
            .place(&member_id("fourth"), &member_id("s"), 5)
            .await
            .unwrap();

        assert_eq!(position.level, 2);
        assert_eq!(position.slot, SlotIndex::new(0));
        assert_eq!(position.parent_member, Some(member_id("r0")));
    }

    #[tokio::test]
    async fn test_zero_max_level_exhausts_when_direct_slots_full() {
        let store = store_with_sponsor().await;
        let engine = PlacementEngine::new(store.clone());
        place_n(&engine, &store, 3, 0).await;

        join(&store, "fourth", Some("s"), Tier::Starter, 10).await;
        let result = engine.place(&member_id("fourth"), &member_id("s"), 0).await;
        assert!(matches!(
            result,
            Err(EngineError::PlacementExhausted { max_level: 0, .. })
        ));
        assert!(store
            .get_matrix_position(&member_id("fourth"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_placement_is_deterministic() {
        let mut runs = Vec::new();
        for _ in 0..2 {
            let store = store_with_sponsor().await;
            let engine = PlacementEngine::new(store.clone());
            place_n(&engine, &store, 13, 5).await;

            let mut layout = Vec::new();
            for i in 0..13 {
                let p = store
                    .get_matrix_position(&member_id(&format!("r{}", i)))
                    .await
                    .unwrap()
                    .unwrap();
                layout.push((p.parent_member.clone(), p.level, p.slot));
            }
            runs.push(layout);
        }
        assert_eq!(runs[0], runs[1]);
        // 3 direct, 9 on level 2, then the first grandchild takes the 13th.
        assert_eq!(runs[0][12], (Some(member_id("r3")), 3, SlotIndex::new(0)));
    }

    #[tokio::test]
    async fn test_conflicts_are_retried() {
        let store =
            Arc::new(InMemoryNetworkStore::new().with_claim_conflicts(MAX_CLAIM_ATTEMPTS - 1));
        join(&store, "s", None, Tier::Leader, 0).await;
        join(&store, "a", Some("s"), Tier::Starter, 1).await;
        let engine = PlacementEngine::new(store.clone());

        let position = engine.place(&member_id("a"), &member_id("s"), 5).await.unwrap();
        assert_eq!(position.level, 1);
    }

    #[tokio::test]
    async fn test_conflicts_surface_after_bounded_retries() {
        let store =
            Arc::new(InMemoryNetworkStore::new().with_claim_conflicts(MAX_CLAIM_ATTEMPTS));
        join(&store, "s", None, Tier::Leader, 0).await;
        join(&store, "a", Some("s"), Tier::Starter, 1).await;
        let engine = PlacementEngine::new(store.clone());

        let result = engine.place(&member_id("a"), &member_id("s"), 5).await;
        assert!(matches!(
            result,
            Err(EngineError::SlotClaimConflict { attempts: MAX_CLAIM_ATTEMPTS })
        ));
    }

    #[tokio::test]
    async fn test_rejects_unknown_or_inactive_sponsor() {
        let store = store_with_sponsor().await;
        join(&store, "a", Some("s"), Tier::Starter, 1).await;
        let engine = PlacementEngine::new(store.clone());

        let result = engine.place(&member_id("a"), &member_id("ghost"), 5).await;
        assert!(matches!(result, Err(EngineError::InvalidSponsor(_))));

        let mut dormant = crate::domain::NewMember::new("d", None, Tier::Starter)
            .into_member(TimeMs::new(0));
        dormant.status = MemberStatus::Suspended;
        store.insert_member(&dormant).await.unwrap();
        let result = engine.place(&member_id("a"), &member_id("d"), 5).await;
        assert!(matches!(result, Err(EngineError::InvalidSponsor(_))));
        assert!(store.get_matrix_position(&member_id("d")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_member_cannot_be_placed_twice() {
        let store = store_with_sponsor().await;
        join(&store, "a", Some("s"), Tier::Starter, 1).await;
        let engine = PlacementEngine::new(store.clone());
        engine.place(&member_id("a"), &member_id("s"), 5).await.unwrap();

        let again = engine.place(&member_id("a"), &member_id("s"), 5).await;
        assert!(matches!(again, Err(EngineError::AlreadyPlaced(_))));
    }

    #[tokio::test]
    async fn test_unknown_member_is_not_placed() {
        let store = store_with_sponsor().await;
        let engine = PlacementEngine::new(store);

        let result = engine.place(&member_id("nobody"), &member_id("s"), 5).await;
        assert!(matches!(result, Err(EngineError::MemberNotFound(_))));
    }

    #[tokio::test]
    async fn test_ensure_root_is_idempotent() {
        let store = store_with_sponsor().await;
        let engine = PlacementEngine::new(store);

        let first = engine.ensure_root(&member_id("s")).await.unwrap();
        let second = engine.ensure_root(&member_id("s")).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.level, 0);
    }
}
