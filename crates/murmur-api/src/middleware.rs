use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;

use murmur_types::api::Claims;

use crate::error::ApiError;
use crate::state::AppState;

/// Extract and validate the identity provider's JWT from the Authorization
/// header. On success the claims are available to handlers as
/// `Extension<Claims>`; `sub` is the caller id.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.map_err(|_| ApiError::Unauthorized)?;

    let token_data = decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        debug!("Rejected bearer token: {}", e);
        ApiError::Unauthorized
    })?;

    if token_data.claims.sub.is_empty() {
        return Err(ApiError::Unauthorized);
    }

    req.extensions_mut().insert(token_data.claims);
    Ok(next.run(req).await)
}
