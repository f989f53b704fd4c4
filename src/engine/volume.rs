//! Bounded-depth team volume rollups over the sponsor tree.

use super::{ActivityPolicy, EngineError, SponsorTree};
use crate::domain::{
    Decimal, LevelVolume, MemberId, Period, TeamVolumeSnapshot, VolumeTally,
};
use crate::store::{NetworkStore, StoreError};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info};

/// Full result of one aggregation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamVolumeReport {
    pub snapshot: TeamVolumeSnapshot,
    /// One entry per non-empty level, `levels[0]` being direct referrals.
    pub levels: Vec<LevelVolume>,
}

/// Computes team volume snapshots and per-level breakdowns.
#[derive(Clone)]
pub struct TeamVolumeAggregator {
    store: Arc<dyn NetworkStore>,
    sponsors: SponsorTree,
    activity: Arc<dyn ActivityPolicy>,
}

impl TeamVolumeAggregator {
    pub fn new(store: Arc<dyn NetworkStore>, activity: Arc<dyn ActivityPolicy>) -> Self {
        Self {
            sponsors: SponsorTree::new(store.clone()),
            store,
            activity,
        }
    }

    /// Compute volume for `member_id` over `period` without writing anything.
    ///
    /// Volume is read from qualifying-event history, so the same history always
    /// yields the same report.
    pub async fn report(
        &self,
        member_id: &MemberId,
        period: &Period,
        max_depth: u32,
    ) -> Result<TeamVolumeReport, EngineError> {
        if self.store.get_member(member_id).await?.is_none() {
            return Err(EngineError::MemberNotFound(member_id.clone()));
        }

        let personal = self.store.personal_volume(member_id, period).await?;
        let descendants = self
            .sponsors
            .descendants_by_level(member_id, max_depth)
            .await?;

        let mut levels = Vec::with_capacity(descendants.len());
        for (idx, members) in descendants.iter().enumerate() {
            let tallies = try_join_all(
                members
                    .iter()
                    .map(|id| self.store.personal_volume(id, period)),
            )
            .await?;
            let mut level_tally = VolumeTally::default();
            for tally in tallies {
                level_tally.merge(tally);
            }
            levels.push(LevelVolume::new(
                idx as u32 + 1,
                members.len() as u64,
                level_tally,
            ));
        }

        let active_referrals_count = match descendants.first() {
            Some(direct) => self.count_active(direct, period).await?,
            None => 0,
        };

        let downline: Decimal = levels.iter().map(|l| l.level_volume).sum();
        let snapshot = TeamVolumeSnapshot::from_parts(
            member_id.clone(),
            *period,
            personal.volume,
            personal.volume + downline,
            active_referrals_count,
            levels.len() as u32,
        )
        .map_err(StoreError::Corrupt)?;

        debug!(
            member = %member_id,
            levels = levels.len(),
            team_volume = %snapshot.team_volume,
            "Team volume computed"
        );

        Ok(TeamVolumeReport { snapshot, levels })
    }

    /// Compute and persist the snapshot for `(member_id, period)`.
    ///
    /// The snapshot is written only after the whole computation succeeded.
    pub async fn aggregate(
        &self,
        member_id: &MemberId,
        period: &Period,
        max_depth: u32,
    ) -> Result<TeamVolumeSnapshot, EngineError> {
        let report = self.report(member_id, period, max_depth).await?;
        self.store.write_volume_snapshot(&report.snapshot).await?;
        info!(
            member = %member_id,
            team_volume = %report.snapshot.team_volume,
            active_referrals = report.snapshot.active_referrals_count,
            "Volume snapshot written"
        );
        Ok(report.snapshot)
    }

    pub async fn level_breakdown(
        &self,
        member_id: &MemberId,
        period: &Period,
        max_depth: u32,
    ) -> Result<Vec<LevelVolume>, EngineError> {
        Ok(self.report(member_id, period, max_depth).await?.levels)
    }

    async fn count_active(
        &self,
        members: &[MemberId],
        period: &Period,
    ) -> Result<u64, EngineError> {
        let loaded = try_join_all(members.iter().map(|id| self.store.get_member(id))).await?;
        Ok(loaded
            .iter()
            .flatten()
            .filter(|m| self.activity.is_active(m, period.end))
            .count() as u64)
    }
}
