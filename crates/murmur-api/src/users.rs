use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::error;

use murmur_types::api::UsersResponse;

use crate::directory::users_response;
use crate::state::AppState;

/// GET /api/users. Mention-suggestion contacts from the identity provider.
/// A directory failure still answers with the usual shape, just empty.
pub async fn list_users(State(state): State<AppState>) -> impl IntoResponse {
    match state.directory.list_users().await {
        Ok(entries) => (StatusCode::OK, Json(users_response(entries))),
        Err(e) => {
            error!("Error fetching users from directory: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(UsersResponse::default()))
        }
    }
}
