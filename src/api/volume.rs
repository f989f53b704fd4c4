use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::members::parse_member_id;
use crate::api::AppState;
use crate::domain::{LevelVolume, TeamVolumeSnapshot, TimeMs};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeQuery {
    pub from_ms: i64,
    pub to_ms: i64,
    pub max_depth: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDto {
    pub member_id: String,
    pub from_ms: i64,
    pub to_ms: i64,
    pub personal_volume: String,
    pub team_volume: String,
    pub active_referrals_count: u64,
    pub team_depth: u32,
}

impl From<TeamVolumeSnapshot> for SnapshotDto {
    fn from(s: TeamVolumeSnapshot) -> Self {
        SnapshotDto {
            member_id: s.member_id.0,
            from_ms: s.period.start.as_ms(),
            to_ms: s.period.end.as_ms(),
            personal_volume: s.personal_volume.to_canonical_string(),
            team_volume: s.team_volume.to_canonical_string(),
            active_referrals_count: s.active_referrals_count,
            team_depth: s.team_depth,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelDto {
    pub level: u32,
    pub member_count: u64,
    pub level_volume: String,
    pub order_count: u64,
    pub avg_order_size: String,
}

impl From<LevelVolume> for LevelDto {
    fn from(l: LevelVolume) -> Self {
        LevelDto {
            level: l.level,
            member_count: l.member_count,
            level_volume: l.level_volume.to_canonical_string(),
            order_count: l.order_count,
            avg_order_size: l.avg_order_size.to_canonical_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamVolumeResponse {
    pub snapshot: SnapshotDto,
    pub levels: Vec<LevelDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSnapshotResponse {
    pub snapshot: Option<SnapshotDto>,
}

/// Recompute the snapshot for the window, store it, and return it with the level
/// breakdown.
pub async fn get_team_volume(
    Path(id): Path<String>,
    Query(params): Query<VolumeQuery>,
    State(state): State<AppState>,
) -> Result<Json<TeamVolumeResponse>, AppError> {
    let member = parse_member_id(&id)?;
    let (from, to) = (TimeMs::new(params.from_ms), TimeMs::new(params.to_ms));

    let snapshot = state.service.get_team_volume(&member, from, to).await?;
    let levels = state
        .service
        .level_breakdown(&member, from, to, params.max_depth)
        .await?;

    Ok(Json(TeamVolumeResponse {
        snapshot: snapshot.into(),
        levels: levels.into_iter().map(LevelDto::from).collect(),
    }))
}

pub async fn get_volume_snapshot(
    Path(id): Path<String>,
    Query(params): Query<VolumeQuery>,
    State(state): State<AppState>,
) -> Result<Json<StoredSnapshotResponse>, AppError> {
    let member = parse_member_id(&id)?;
    let snapshot = state
        .service
        .get_volume_snapshot(
            &member,
            TimeMs::new(params.from_ms),
            TimeMs::new(params.to_ms),
        )
        .await?;

    Ok(Json(StoredSnapshotResponse {
        snapshot: snapshot.map(SnapshotDto::from),
    }))
}
