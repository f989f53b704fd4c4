use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::api::members::parse_member_id;
use crate::api::AppState;
use crate::domain::{Commission, CommissionId, CommissionStatus, Decimal, EventType};
use crate::engine::CommissionSummary;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    pub member_id: String,
    pub amount: String,
    pub event_type: String,
    pub max_level: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionsQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionDto {
    pub id: i64,
    pub earner_id: String,
    pub source_id: String,
    pub level: u32,
    pub amount: String,
    pub commission_type: EventType,
    pub status: CommissionStatus,
    pub earned_at_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at_ms: Option<i64>,
}

impl From<Commission> for CommissionDto {
    fn from(c: Commission) -> Self {
        CommissionDto {
            id: c.id.0,
            earner_id: c.earner_id.0,
            source_id: c.source_id.0,
            level: c.level,
            amount: c.amount.to_canonical_string(),
            commission_type: c.commission_type,
            status: c.status,
            earned_at_ms: c.earned_at.as_ms(),
            paid_at_ms: c.paid_at.map(|t| t.as_ms()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionsResponse {
    pub commissions: Vec<CommissionDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberCommissionsResponse {
    pub summary: SummaryDto,
    pub commissions: Vec<CommissionDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryDto {
    pub pending: String,
    pub paid: String,
    pub cancelled: String,
    pub count: u64,
}

impl From<CommissionSummary> for SummaryDto {
    fn from(s: CommissionSummary) -> Self {
        SummaryDto {
            pending: s.pending.to_canonical_string(),
            paid: s.paid.to_canonical_string(),
            cancelled: s.cancelled.to_canonical_string(),
            count: s.count,
        }
    }
}

fn to_response(commissions: Vec<Commission>) -> Json<CommissionsResponse> {
    Json(CommissionsResponse {
        commissions: commissions.into_iter().map(CommissionDto::from).collect(),
    })
}

pub async fn record_event(
    State(state): State<AppState>,
    Json(body): Json<EventRequest>,
) -> Result<Json<CommissionsResponse>, AppError> {
    let source = parse_member_id(&body.member_id)?;
    let amount = Decimal::from_str_canonical(&body.amount)
        .map_err(|_| AppError::BadRequest("amount must be a decimal".into()))?;
    let event_type = EventType::from_str(&body.event_type).map_err(AppError::BadRequest)?;

    let commissions = state
        .service
        .record_qualifying_event(&source, amount, event_type, body.max_level)
        .await?;
    Ok(to_response(commissions))
}

pub async fn mark_paid(
    State(state): State<AppState>,
    Json(body): Json<BatchRequest>,
) -> Result<Json<CommissionsResponse>, AppError> {
    let ids = batch_ids(&body)?;
    Ok(to_response(state.service.mark_paid(&ids).await?))
}

pub async fn cancel(
    State(state): State<AppState>,
    Json(body): Json<BatchRequest>,
) -> Result<Json<CommissionsResponse>, AppError> {
    let ids = batch_ids(&body)?;
    Ok(to_response(state.service.cancel(&ids).await?))
}

pub async fn get_member_commissions(
    Path(id): Path<String>,
    Query(params): Query<CommissionsQuery>,
    State(state): State<AppState>,
) -> Result<Json<MemberCommissionsResponse>, AppError> {
    let earner = parse_member_id(&id)?;
    let status = params
        .status
        .as_deref()
        .map(CommissionStatus::from_str)
        .transpose()
        .map_err(AppError::BadRequest)?;

    let summary = state.service.commission_summary(&earner).await?;
    let commissions = state.service.commissions_for(&earner, status).await?;

    Ok(Json(MemberCommissionsResponse {
        summary: summary.into(),
        commissions: commissions.into_iter().map(CommissionDto::from).collect(),
    }))
}

fn batch_ids(body: &BatchRequest) -> Result<Vec<CommissionId>, AppError> {
    if body.ids.is_empty() {
        return Err(AppError::BadRequest("ids must not be empty".into()));
    }
    Ok(body.ids.iter().copied().map(CommissionId).collect())
}
