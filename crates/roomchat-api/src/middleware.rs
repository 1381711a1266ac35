use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::AppState;
use crate::error::ApiError;

/// Extract and validate the bearer token, then hand the handler an
/// [`Identity`](roomchat_core::Identity) extension.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthorized)?;

    let identity = state.keys.verify(token).ok_or(ApiError::Unauthorized)?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
