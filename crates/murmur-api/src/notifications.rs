use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
};
use tracing::debug;
use uuid::Uuid;

use murmur_types::api::{Claims, MarkReadRequest, NotificationPage, NotificationResponse, PageQuery, SuccessResponse};

use crate::convert::notification_response;
use crate::error::ApiError;
use crate::state::{AppState, with_db};

/// GET /api/notifications. The caller's notifications, newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<NotificationPage>, ApiError> {
    let Query(query) = query?;
    let page = query.pagination().map_err(ApiError::Validation)?;

    let user_id = claims.sub.clone();
    let (rows, total) = with_db(&state, move |db| {
        let rows = db.list_notifications(&user_id, page.limit, page.offset())?;
        let total = db.count_notifications(&user_id)?;
        Ok((rows, total))
    })
    .await?;

    Ok(Json(NotificationPage {
        notifications: rows.iter().map(notification_response).collect(),
        total,
        pages: page.pages(total),
    }))
}

/// POST /api/notifications. Marks all of the caller's notifications read.
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let user_id = claims.sub.clone();
    let changed = with_db(&state, move |db| db.mark_all_notifications_read(&user_id)).await?;

    debug!(user_id = %claims.sub, changed, "Marked notifications read");
    Ok(Json(SuccessResponse { success: true }))
}

/// PATCH /api/notifications/{id}. Notifications owned by someone else are
/// reported as missing.
pub async fn mark_read(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<MarkReadRequest>, JsonRejection>,
) -> Result<Json<NotificationResponse>, ApiError> {
    let Path(id) = path.map_err(|_| ApiError::NotFound("Notification not found"))?;
    let Json(req) = payload?;

    let user_id = claims.sub.clone();
    let row = with_db(&state, move |db| db.set_notification_read(&id.to_string(), &user_id, req.read))
        .await?
        .ok_or(ApiError::NotFound("Notification not found"))?;

    Ok(Json(notification_response(&row)))
}
