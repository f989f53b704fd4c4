//! Multi-level commission attribution and the commission state machine.

use super::{CommissionPlan, EngineError, SponsorTree};
use crate::domain::{
    Commission, CommissionId, CommissionStatus, Decimal, EventType, MemberId, NewCommission,
    QualifyingEvent, TimeMs,
};
use crate::store::{NetworkStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Totals of a member's commissions per status.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionSummary {
    pub pending: Decimal,
    pub paid: Decimal,
    pub cancelled: Decimal,
    pub count: u64,
}

/// Walks sponsor ancestors of an event source and emits commissions per the plan.
#[derive(Clone)]
pub struct CommissionEngine {
    store: Arc<dyn NetworkStore>,
    sponsors: SponsorTree,
    plan: Arc<CommissionPlan>,
}

impl CommissionEngine {
    pub fn new(store: Arc<dyn NetworkStore>, plan: Arc<CommissionPlan>) -> Self {
        Self {
            sponsors: SponsorTree::new(store.clone()),
            store,
            plan,
        }
    }

    pub fn plan(&self) -> &CommissionPlan {
        &self.plan
    }

    /// Record a qualifying event and the commissions it generates.
    ///
    /// Walks at most `max_level` ancestors (clamped to the plan's maximum). A level is
    /// skipped when the ancestor is not active, its tier is below the level threshold,
    /// or the plan pays nothing there. The event and its commissions are persisted in
    /// one store call.
    pub async fn record_qualifying_event(
        &self,
        source: &MemberId,
        amount: Decimal,
        event_type: EventType,
        max_level: Option<u32>,
    ) -> Result<Vec<Commission>, EngineError> {
        if !amount.is_positive() {
            return Err(EngineError::InvalidAmount(format!(
                "event amount must be positive, got {}",
                amount
            )));
        }
        if self.store.get_member(source).await?.is_none() {
            return Err(EngineError::MemberNotFound(source.clone()));
        }

        let depth = max_level.map_or(self.plan.max_level, |l| l.min(self.plan.max_level));
        let occurred_at = TimeMs::now();
        let mut pending = Vec::new();

        for ancestor in self.sponsors.ancestors(source, depth).await? {
            let Some(earner) = self.store.get_member(&ancestor.member_id).await? else {
                warn!(
                    source = %source,
                    ancestor = %ancestor.member_id,
                    "Sponsor record missing, skipping level"
                );
                continue;
            };
            let rate = self.plan.rate(ancestor.level, event_type);
            if rate.is_zero() || !earner.is_active() {
                continue;
            }
            if !self.plan.is_eligible(ancestor.level, earner.tier) {
                debug!(
                    earner = %earner.id,
                    level = ancestor.level,
                    tier = %earner.tier,
                    required = %self.plan.min_tier(ancestor.level),
                    "Tier below threshold, skipping level"
                );
                continue;
            }

            let commission_amount = (amount * rate).round_money();
            if commission_amount.is_zero() {
                continue;
            }
            pending.push(NewCommission {
                earner_id: earner.id,
                source_id: source.clone(),
                level: ancestor.level,
                amount: commission_amount,
                commission_type: event_type,
                earned_at: occurred_at,
            });
        }

        let event = QualifyingEvent {
            member_id: source.clone(),
            amount,
            event_type,
            occurred_at,
        };
        let commissions = self.store.record_qualifying_event(&event, &pending).await?;

        info!(
            source = %source,
            event_type = %event_type,
            amount = %amount,
            commissions = commissions.len(),
            "Qualifying event recorded"
        );
        Ok(commissions)
    }

    /// Move pending commissions to paid, all or nothing.
    pub async fn mark_paid(&self, ids: &[CommissionId]) -> Result<Vec<Commission>, EngineError> {
        self.transition(ids, CommissionStatus::Paid).await
    }

    /// Move pending commissions to cancelled, all or nothing.
    pub async fn cancel(&self, ids: &[CommissionId]) -> Result<Vec<Commission>, EngineError> {
        self.transition(ids, CommissionStatus::Cancelled).await
    }

    async fn transition(
        &self,
        ids: &[CommissionId],
        to: CommissionStatus,
    ) -> Result<Vec<Commission>, EngineError> {
        let mut seen = HashSet::new();
        let ids: Vec<CommissionId> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        self.check_transition(&ids, to).await?;

        match self.store.update_commission_status(&ids, to, TimeMs::now()).await {
            Ok(updated) => {
                info!(count = updated, status = %to, "Commission batch transitioned");
            }
            // Lost a race with another batch; report which commission moved.
            Err(StoreError::Conflict(_)) | Err(StoreError::NotFound(_)) => {
                self.check_transition(&ids, to).await?;
                return Err(StoreError::Conflict(format!(
                    "commission batch could not become {}",
                    to
                ))
                .into());
            }
            Err(e) => return Err(e.into()),
        }

        Ok(self.store.get_commissions(&ids).await?)
    }

    async fn check_transition(
        &self,
        ids: &[CommissionId],
        to: CommissionStatus,
    ) -> Result<(), EngineError> {
        let current = self.store.get_commissions(ids).await?;
        for id in ids {
            let Some(commission) = current.iter().find(|c| c.id == *id) else {
                return Err(EngineError::CommissionNotFound(*id));
            };
            if !commission.status.can_transition_to(to) {
                warn!(
                    commission = %id,
                    from = %commission.status,
                    to = %to,
                    "Rejected commission transition"
                );
                return Err(EngineError::InvalidStateTransition {
                    id: *id,
                    from: commission.status,
                    to,
                });
            }
        }
        Ok(())
    }

    pub async fn commissions_for(
        &self,
        earner: &MemberId,
        status: Option<CommissionStatus>,
    ) -> Result<Vec<Commission>, EngineError> {
        Ok(self.store.list_commissions(earner, status).await?)
    }

    pub async fn commission_summary(
        &self,
        earner: &MemberId,
    ) -> Result<CommissionSummary, EngineError> {
        let mut summary = CommissionSummary::default();
        for commission in self.store.list_commissions(earner, None).await? {
            summary.count += 1;
            match commission.status {
                CommissionStatus::Pending => summary.pending += commission.amount,
                CommissionStatus::Paid => summary.paid += commission.amount,
                CommissionStatus::Cancelled => summary.cancelled += commission.amount,
            }
        }
        Ok(summary)
    }
}
