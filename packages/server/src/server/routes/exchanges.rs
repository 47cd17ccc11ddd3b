//! REST endpoints for the exchange lifecycle.
//!
//! Every handler requires an [`AuthUser`]; the lifecycle manager makes the
//! participant checks.

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::common::{ExchangeId, SkillId};
use crate::domains::exchanges::{ExchangeError, ExchangeRequest, ExchangeStatus, ExchangeWithSkill};
use crate::server::app::AppState;
use crate::server::middleware::AuthUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExchangeBody {
    pub skill_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TransitionStatusBody {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct RateExchangeBody {
    pub rating: i64,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListExchangesQuery {
    pub status: Option<String>,
}

fn parse_exchange_id(raw: &str) -> Result<ExchangeId, ExchangeError> {
    ExchangeId::parse(raw)
        .map_err(|_| ExchangeError::ValidationError(format!("Invalid exchange id: {}", raw)))
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ExchangeError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ExchangeError::ValidationError(rejection.body_text()))
}

/// POST /exchanges
pub async fn create_exchange_handler(
    Extension(state): Extension<AppState>,
    user: AuthUser,
    body: Result<Json<CreateExchangeBody>, JsonRejection>,
) -> Result<(StatusCode, Json<ExchangeRequest>), ExchangeError> {
    let body = json_body(body)?;
    let skill_id = SkillId::parse(body.skill_id.trim()).map_err(|_| {
        ExchangeError::ValidationError(format!("Invalid skill id: {}", body.skill_id))
    })?;

    let exchange = state
        .lifecycle
        .request_exchange(skill_id, user.member_id)
        .await?;

    Ok((StatusCode::CREATED, Json(exchange)))
}

/// GET /exchanges?status=
pub async fn list_exchanges_handler(
    Extension(state): Extension<AppState>,
    user: AuthUser,
    Query(query): Query<ListExchangesQuery>,
) -> Result<Json<Vec<ExchangeWithSkill>>, ExchangeError> {
    let status = match query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => None,
        Some(raw) => match raw.parse::<ExchangeStatus>() {
            Ok(status) => Some(status),
            // No exchange ever carries an unknown status
            Err(_) => return Ok(Json(Vec::new())),
        },
    };

    let exchanges = state.lifecycle.list_exchanges(user.member_id, status).await?;
    Ok(Json(exchanges))
}

/// GET /exchanges/:id
pub async fn get_exchange_handler(
    Extension(state): Extension<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ExchangeRequest>, ExchangeError> {
    let id = parse_exchange_id(&id)?;
    let exchange = state.lifecycle.get_exchange(id, user.member_id).await?;
    Ok(Json(exchange))
}

/// PATCH /exchanges/:id/status
pub async fn transition_status_handler(
    Extension(state): Extension<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    body: Result<Json<TransitionStatusBody>, JsonRejection>,
) -> Result<Json<ExchangeRequest>, ExchangeError> {
    let id = parse_exchange_id(&id)?;
    let body = json_body(body)?;

    let exchange = state
        .lifecycle
        .transition_status_named(id, user.member_id, body.status.trim())
        .await?;
    Ok(Json(exchange))
}

/// DELETE /exchanges/:id
pub async fn withdraw_exchange_handler(
    Extension(state): Extension<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ExchangeError> {
    let id = parse_exchange_id(&id)?;
    state.lifecycle.withdraw_exchange(id, user.member_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /exchanges/:id/rate
pub async fn rate_exchange_handler(
    Extension(state): Extension<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    body: Result<Json<RateExchangeBody>, JsonRejection>,
) -> Result<Json<ExchangeRequest>, ExchangeError> {
    let id = parse_exchange_id(&id)?;
    let body = json_body(body)?;

    let exchange = state
        .lifecycle
        .rate_exchange(id, user.member_id, body.rating, body.feedback)
        .await?;
    Ok(Json(exchange))
}
