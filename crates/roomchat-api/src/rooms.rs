use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use roomchat_core::{ChatError, Identity};
use roomchat_types::api::{CreateRoomRequest, JoinRoomRequest, JoinRoomResponse, RoomResponse};
use roomchat_types::models::Room;

use crate::error::ApiResult;
use crate::{AppState, blocking};

/// Rooms the caller belongs to, minus the ones it dismissed.
pub async fn list_rooms(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<Vec<Room>>> {
    let rooms = blocking(&state, move |chat| chat.visible_rooms(&identity)).await?;
    Ok(Json(rooms))
}

pub async fn create_room(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateRoomRequest>,
) -> ApiResult<impl IntoResponse> {
    let room = blocking(&state, move |chat| chat.create_room(&identity, &req.name)).await?;
    Ok((StatusCode::CREATED, Json(RoomResponse { room })))
}

pub async fn join_room(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<JoinRoomRequest>,
) -> ApiResult<Json<JoinRoomResponse>> {
    let (room, outcome) = blocking(&state, move |chat| chat.join(&identity, &req.code)).await?;
    Ok(Json(JoinRoomResponse {
        room,
        already_member: outcome.already_member(),
    }))
}

pub async fn get_room(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<RoomResponse>> {
    let room = blocking(&state, move |chat| chat.find_room(&code))
        .await?
        .ok_or(ChatError::RoomNotFound)?;
    Ok(Json(RoomResponse { room }))
}

/// Drop the caller's membership for good. A later join re-enrolls.
pub async fn leave_room(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(code): Path<String>,
) -> ApiResult<StatusCode> {
    if blocking(&state, move |chat| chat.leave(&identity, &code)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ChatError::NotAMember.into())
    }
}

pub async fn dismiss_room(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(code): Path<String>,
) -> ApiResult<StatusCode> {
    blocking(&state, move |chat| chat.dismiss(&identity, &code)).await?;
    Ok(StatusCode::NO_CONTENT)
}
