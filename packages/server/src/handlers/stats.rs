use axum::{Json, extract::State};
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::models::stats::{CountResponse, LabelsResponse, StatsResponse};
use crate::state::AppState;
use crate::store::SessionStore;

#[utoipa::path(
    get,
    path = "/predictions/count",
    tag = "Statistics",
    operation_id = "countRecentPredictions",
    summary = "Count own sessions in the stats window",
    description = "The window is `stats.window_days` (7 by default) ending now.",
    responses(
        (status = 200, description = "Session count", body = CountResponse),
        (status = 401, description = "Unauthorized (CREDENTIALS_MISSING, INVALID_CREDENTIALS)", body = ErrorBody),
    ),
    security(("basic" = [])),
)]
#[instrument(skip(state, auth_user), fields(username = %auth_user.username))]
pub async fn count_predictions(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<CountResponse>, AppError> {
    let count = SessionStore::new(&state.db)
        .count_recent_sessions(&auth_user.username, state.config.stats.window())
        .await?;
    Ok(Json(CountResponse { count }))
}

#[utoipa::path(
    get,
    path = "/labels",
    tag = "Statistics",
    operation_id = "listRecentLabels",
    summary = "Distinct labels detected in own sessions in the stats window",
    responses(
        (status = 200, description = "Sorted distinct labels", body = LabelsResponse),
        (status = 401, description = "Unauthorized (CREDENTIALS_MISSING, INVALID_CREDENTIALS)", body = ErrorBody),
    ),
    security(("basic" = [])),
)]
#[instrument(skip(state, auth_user), fields(username = %auth_user.username))]
pub async fn recent_labels(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<LabelsResponse>, AppError> {
    let labels = SessionStore::new(&state.db)
        .list_recent_labels(&auth_user.username, state.config.stats.window())
        .await?;
    Ok(Json(LabelsResponse { labels }))
}

#[utoipa::path(
    get,
    path = "/stats",
    tag = "Statistics",
    operation_id = "recentStats",
    summary = "Aggregate statistics over own sessions in the stats window",
    responses(
        (status = 200, description = "Totals, mean confidence and top labels", body = StatsResponse),
        (status = 401, description = "Unauthorized (CREDENTIALS_MISSING, INVALID_CREDENTIALS)", body = ErrorBody),
    ),
    security(("basic" = [])),
)]
#[instrument(skip(state, auth_user), fields(username = %auth_user.username))]
pub async fn stats(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<StatsResponse>, AppError> {
    let stats = SessionStore::new(&state.db)
        .recent_stats(&auth_user.username, state.config.stats.window())
        .await?;
    Ok(Json(stats.into()))
}
