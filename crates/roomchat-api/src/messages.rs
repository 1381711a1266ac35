use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use roomchat_core::{ChatError, Identity};
use roomchat_types::api::{MessageResponse, SendMessageRequest};

use crate::error::ApiResult;
use crate::{AppState, blocking};

/// Full room history, oldest first. Members only.
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(code): Path<String>,
) -> ApiResult<Json<Vec<MessageResponse>>> {
    let messages = blocking(&state, move |chat| {
        if !chat.is_member(&identity, &code)? {
            return Err(ChatError::NotAMember);
        }
        chat.history(&code)
    })
    .await?;

    Ok(Json(messages.iter().map(MessageResponse::from).collect()))
}

/// Append and broadcast. Subscribers on the gateway receive the message
/// before this response is written.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(code): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let message = blocking(&state, move |chat| chat.append(&identity, &code, &req.message)).await?;
    Ok((StatusCode::CREATED, Json(MessageResponse::from(&message))))
}
