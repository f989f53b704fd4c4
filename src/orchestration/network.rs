use crate::config::Config;
use crate::domain::{
    Commission, CommissionId, CommissionStatus, Decimal, EventType, LevelVolume, MatrixPosition,
    Member, MemberId, MemberStatus, NewMember, Period, TeamVolumeSnapshot, TimeMs, TreeNode,
    TreeType,
};
use crate::engine::{
    ActivityPolicy, CommissionEngine, CommissionSummary, EngineError, PlacementEngine,
    RecentActivity, TeamVolumeAggregator, TreeReportBuilder,
};
use crate::store::NetworkStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Outcome of a tier-upgrade check with the figures it was decided on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierUpgradeCheck {
    pub eligible: bool,
    pub team_volume: Decimal,
    pub active_referrals: u64,
    pub period: Period,
}

/// Depth limits the service applies when callers do not pass their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceLimits {
    pub matrix_max_level: u32,
    pub commission_max_level: u32,
    pub team_volume_depth: u32,
}

/// The network engine as the rest of the platform sees it.
///
/// Composes the engine components over one store. Holds no tree state of its own.
#[derive(Clone)]
pub struct NetworkService {
    store: Arc<dyn NetworkStore>,
    placement: PlacementEngine,
    commissions: CommissionEngine,
    volume: TeamVolumeAggregator,
    reports: TreeReportBuilder,
    matrix_max_level: u32,
    team_volume_depth: u32,
    volume_period_days: u32,
}

impl NetworkService {
    pub fn new(store: Arc<dyn NetworkStore>, config: &Config) -> Self {
        let activity = Arc::new(RecentActivity::days(config.active_window_days));
        Self::with_activity(store, config, activity)
    }

    /// Build the service with a caller-supplied activity predicate.
    pub fn with_activity(
        store: Arc<dyn NetworkStore>,
        config: &Config,
        activity: Arc<dyn ActivityPolicy>,
    ) -> Self {
        Self {
            placement: PlacementEngine::new(store.clone()),
            commissions: CommissionEngine::new(
                store.clone(),
                Arc::new(config.commission_plan.clone()),
            ),
            volume: TeamVolumeAggregator::new(store.clone(), activity),
            reports: TreeReportBuilder::new(store.clone()),
            store,
            matrix_max_level: config.matrix_max_level,
            team_volume_depth: config.team_volume_depth,
            volume_period_days: config.volume_period_days,
        }
    }

    pub fn limits(&self) -> ServiceLimits {
        ServiceLimits {
            matrix_max_level: self.matrix_max_level,
            commission_max_level: self.commissions.plan().max_level,
            team_volume_depth: self.team_volume_depth,
        }
    }

    /// Register a member under an existing, active sponsor.
    ///
    /// Members without a sponsor start a new network. Nothing is written when the
    /// sponsor check fails.
    pub async fn register_member(&self, new_member: NewMember) -> Result<Member, EngineError> {
        if let Some(sponsor) = &new_member.sponsor {
            if sponsor == &new_member.id {
                return Err(EngineError::InvalidSponsor(sponsor.clone()));
            }
            match self.store.get_member(sponsor).await? {
                Some(m) if m.is_active() => {}
                _ => return Err(EngineError::InvalidSponsor(sponsor.clone())),
            }
        }

        let member = new_member.into_member(TimeMs::now());
        self.store.insert_member(&member).await?;
        info!(
            member = %member.id,
            sponsor = ?member.sponsor.as_ref().map(|s| s.as_str()),
            tier = %member.tier,
            "Member registered",
        );
        Ok(member)
    }

    pub async fn get_member(&self, id: &MemberId) -> Result<Member, EngineError> {
        self.store
            .get_member(id)
            .await?
            .ok_or_else(|| EngineError::MemberNotFound(id.clone()))
    }

    /// Record activity reported by the platform's billing or session side.
    pub async fn update_member_activity(
        &self,
        id: &MemberId,
        status: MemberStatus,
        last_active_at: Option<TimeMs>,
    ) -> Result<Member, EngineError> {
        if !self
            .store
            .update_member_activity(id, status, last_active_at)
            .await?
        {
            return Err(EngineError::MemberNotFound(id.clone()));
        }
        self.get_member(id).await
    }

    pub async fn ensure_root(&self, member: &MemberId) -> Result<MatrixPosition, EngineError> {
        self.placement.ensure_root(member).await
    }

    /// Place a member in the matrix.
    ///
    /// Without an explicit `sponsor`, the member's registered sponsor is used, and a
    /// member with none gets a root position of its own.
    pub async fn place_new_member(
        &self,
        new_member: &MemberId,
        sponsor: Option<&MemberId>,
        max_level: Option<u32>,
    ) -> Result<MatrixPosition, EngineError> {
        let max_level = max_level.unwrap_or(self.matrix_max_level);
        let sponsor = match sponsor {
            Some(s) => s.clone(),
            None => match self.get_member(new_member).await?.sponsor {
                Some(s) => s,
                None => return self.placement.ensure_root(new_member).await,
            },
        };
        self.placement.place(new_member, &sponsor, max_level).await
    }

    pub async fn record_qualifying_event(
        &self,
        source: &MemberId,
        amount: Decimal,
        event_type: EventType,
        max_level: Option<u32>,
    ) -> Result<Vec<Commission>, EngineError> {
        self.commissions
            .record_qualifying_event(source, amount, event_type, max_level)
            .await
    }

    pub async fn mark_paid(&self, ids: &[CommissionId]) -> Result<Vec<Commission>, EngineError> {
        self.commissions.mark_paid(ids).await
    }

    pub async fn cancel(&self, ids: &[CommissionId]) -> Result<Vec<Commission>, EngineError> {
        self.commissions.cancel(ids).await
    }

    pub async fn commissions_for(
        &self,
        earner: &MemberId,
        status: Option<CommissionStatus>,
    ) -> Result<Vec<Commission>, EngineError> {
        self.commissions.commissions_for(earner, status).await
    }

    pub async fn commission_summary(
        &self,
        earner: &MemberId,
    ) -> Result<CommissionSummary, EngineError> {
        self.commissions.commission_summary(earner).await
    }

    /// Aggregate and store the team volume snapshot for `[start, end]`.
    pub async fn get_team_volume(
        &self,
        member: &MemberId,
        start: TimeMs,
        end: TimeMs,
    ) -> Result<TeamVolumeSnapshot, EngineError> {
        let period = period(start, end)?;
        self.volume
            .aggregate(member, &period, self.team_volume_depth)
            .await
    }

    pub async fn level_breakdown(
        &self,
        member: &MemberId,
        start: TimeMs,
        end: TimeMs,
        max_depth: Option<u32>,
    ) -> Result<Vec<LevelVolume>, EngineError> {
        let period = period(start, end)?;
        self.volume
            .level_breakdown(
                member,
                &period,
                max_depth.unwrap_or(self.team_volume_depth),
            )
            .await
    }

    /// Stored snapshot for `[start, end]`, without recomputing.
    pub async fn get_volume_snapshot(
        &self,
        member: &MemberId,
        start: TimeMs,
        end: TimeMs,
    ) -> Result<Option<TeamVolumeSnapshot>, EngineError> {
        let period = period(start, end)?;
        Ok(self.store.get_volume_snapshot(member, &period).await?)
    }

    pub async fn get_downline_tree(
        &self,
        member: &MemberId,
        max_level: u32,
        tree_type: TreeType,
    ) -> Result<TreeNode, EngineError> {
        self.reports.build(member, max_level, tree_type).await
    }

    pub async fn check_tier_upgrade_eligibility(
        &self,
        member: &MemberId,
        required_volume: Decimal,
        required_active_referrals: u64,
    ) -> Result<bool, EngineError> {
        Ok(self
            .tier_upgrade_check(
                member,
                required_volume,
                required_active_referrals,
                TimeMs::now(),
            )
            .await?
            .eligible)
    }

    /// Compare team volume and active referrals over the rolling window that ends at
    /// the UTC midnight following `as_of` against the requirements.
    ///
    /// Checks within one UTC day share a window and so overwrite a single snapshot.
    pub async fn tier_upgrade_check(
        &self,
        member: &MemberId,
        required_volume: Decimal,
        required_active_referrals: u64,
        as_of: TimeMs,
    ) -> Result<TierUpgradeCheck, EngineError> {
        let period = Period::trailing_days(as_of.ceil_to_utc_day(), self.volume_period_days);
        let snapshot = self
            .volume
            .aggregate(member, &period, self.team_volume_depth)
            .await?;

        let eligible = snapshot.team_volume >= required_volume
            && snapshot.active_referrals_count >= required_active_referrals;
        info!(
            member = %member,
            eligible,
            team_volume = %snapshot.team_volume,
            active_referrals = snapshot.active_referrals_count,
            "Tier upgrade checked"
        );

        Ok(TierUpgradeCheck {
            eligible,
            team_volume: snapshot.team_volume,
            active_referrals: snapshot.active_referrals_count,
            period,
        })
    }
}

fn period(start: TimeMs, end: TimeMs) -> Result<Period, EngineError> {
    Period::new(start, end).ok_or(EngineError::InvalidPeriod {
        start: start.as_ms(),
        end: end.as_ms(),
    })
}
