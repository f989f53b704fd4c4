use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::api::AppState;
use crate::domain::{
    Decimal, MatrixPosition, Member, MemberId, MemberStatus, NewMember, Tier, TimeMs, TreeNode,
    TreeType,
};
use crate::error::AppError;
use crate::orchestration::TierUpgradeCheck;

const DEFAULT_TREE_LEVELS: u32 = 3;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub member_id: String,
    pub sponsor_id: Option<String>,
    pub tier: Option<String>,
    /// Place the member in the matrix right after registering.
    #[serde(default)]
    pub place: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub member: Member,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<MatrixPosition>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementRequest {
    pub sponsor_id: Option<String>,
    pub max_level: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRequest {
    pub status: String,
    pub last_active_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeQuery {
    pub max_level: Option<u32>,
    pub tree_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierEligibilityQuery {
    pub required_volume: String,
    #[serde(default)]
    pub required_active_referrals: u64,
}

pub async fn register_member(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, AppError> {
    let id = parse_member_id(&body.member_id)?;
    let sponsor = body.sponsor_id.as_deref().map(parse_member_id).transpose()?;
    let tier = match body.tier.as_deref() {
        Some(raw) => Tier::from_str(raw).map_err(AppError::BadRequest)?,
        None => Tier::default(),
    };

    let member = state
        .service
        .register_member(NewMember::new(id, sponsor, tier))
        .await?;
    let position = if body.place {
        Some(
            state
                .service
                .place_new_member(&member.id, None, None)
                .await?,
        )
    } else {
        None
    };

    Ok(Json(RegisterResponse { member, position }))
}

pub async fn get_member(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Member>, AppError> {
    let id = parse_member_id(&id)?;
    Ok(Json(state.service.get_member(&id).await?))
}

pub async fn update_activity(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<ActivityRequest>,
) -> Result<Json<Member>, AppError> {
    let id = parse_member_id(&id)?;
    let status = MemberStatus::from_str(&body.status).map_err(AppError::BadRequest)?;

    let member = state
        .service
        .update_member_activity(&id, status, body.last_active_ms.map(TimeMs::new))
        .await?;
    Ok(Json(member))
}

pub async fn place_member(
    Path(id): Path<String>,
    State(state): State<AppState>,
    body: Option<Json<PlacementRequest>>,
) -> Result<Json<MatrixPosition>, AppError> {
    let id = parse_member_id(&id)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let sponsor = body.sponsor_id.as_deref().map(parse_member_id).transpose()?;

    let position = state
        .service
        .place_new_member(&id, sponsor.as_ref(), body.max_level)
        .await?;
    Ok(Json(position))
}

pub async fn get_downline_tree(
    Path(id): Path<String>,
    Query(params): Query<TreeQuery>,
    State(state): State<AppState>,
) -> Result<Json<TreeNode>, AppError> {
    let id = parse_member_id(&id)?;
    let tree_type = match params.tree_type.as_deref() {
        Some(raw) => TreeType::from_str(raw).map_err(AppError::BadRequest)?,
        None => TreeType::Sponsor,
    };

    let tree = state
        .service
        .get_downline_tree(
            &id,
            params.max_level.unwrap_or(DEFAULT_TREE_LEVELS),
            tree_type,
        )
        .await?;
    Ok(Json(tree))
}

pub async fn check_tier_eligibility(
    Path(id): Path<String>,
    Query(params): Query<TierEligibilityQuery>,
    State(state): State<AppState>,
) -> Result<Json<TierUpgradeCheck>, AppError> {
    let id = parse_member_id(&id)?;
    let required_volume = Decimal::from_str_canonical(&params.required_volume)
        .map_err(|_| AppError::BadRequest("requiredVolume must be a decimal".into()))?;
    if required_volume.is_negative() {
        return Err(AppError::BadRequest("requiredVolume must be >= 0".into()));
    }

    let check = state
        .service
        .tier_upgrade_check(
            &id,
            required_volume,
            params.required_active_referrals,
            TimeMs::now(),
        )
        .await?;
    Ok(Json(check))
}

pub(crate) fn parse_member_id(raw: &str) -> Result<MemberId, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest("member id must not be empty".into()));
    }
    Ok(MemberId::new(trimmed))
}
