//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    domain::{ConnectionId, MessageContent, RoomId},
    infrastructure::dto::http::{
        HistoryQuery, MemberDetailDto, MessageDto, PostMessageRequest, PostMessageResponse,
        RoomDetailDto, RoomSummaryDto,
    },
    ui::{identity::AuthenticatedUser, state::AppState},
    usecase::PostMessageError,
};
use irori_shared::time::timestamp_to_rfc3339;

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 500;

fn parse_room_id(raw: String) -> Result<RoomId, StatusCode> {
    RoomId::new(raw).map_err(|e| {
        tracing::debug!("Invalid room id in path: {}", e);
        StatusCode::BAD_REQUEST
    })
}

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Rooms with at least one live member
pub async fn get_rooms(State(state): State<Arc<AppState>>) -> Json<Vec<RoomSummaryDto>> {
    let rooms = state.hub.rooms().await;

    // Domain Model から DTO への変換
    let summaries = rooms
        .into_iter()
        .map(|presence| RoomSummaryDto {
            id: presence.room_id.into_string(),
            member_count: presence.member_count,
        })
        .collect();

    Json(summaries)
}

/// Live members of one room
pub async fn get_room_detail(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomDetailDto>, StatusCode> {
    let room_id = parse_room_id(room_id)?;
    if !state.hub.contains_room(&room_id).await {
        return Err(StatusCode::NOT_FOUND);
    }
    let members = state.hub.members(&room_id).await;

    // Domain Model から DTO への変換
    Ok(Json(RoomDetailDto {
        id: room_id.into_string(),
        members: members
            .into_iter()
            .map(|participant| MemberDetailDto {
                user_id: participant.id.into_string(),
                joined_at: timestamp_to_rfc3339(participant.joined_at.value()),
            })
            .collect(),
    }))
}

/// Persisted history of one room, oldest first
pub async fn get_room_messages(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageDto>>, StatusCode> {
    let room_id = parse_room_id(room_id)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);

    let messages = state
        .message_store
        .recent_messages(&room_id, limit)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load history of '{}': {}", room_id, e);
            StatusCode::SERVICE_UNAVAILABLE
        })?;

    Ok(Json(
        messages
            .into_iter()
            .map(|message| MessageDto {
                id: message.id.into_string(),
                sender_id: message.from.into_string(),
                content: message.content.into_string(),
                sent_at: timestamp_to_rfc3339(message.sent_at.value()),
            })
            .collect(),
    ))
}

/// Grant durable membership (201 when new, 204 when it already existed)
pub async fn grant_membership(
    State(state): State<Arc<AppState>>,
    Path((room_id, user_id)): Path<(String, String)>,
) -> Result<StatusCode, StatusCode> {
    let room_id = parse_room_id(room_id)?;
    let user_id = ConnectionId::new(user_id).map_err(|_| StatusCode::BAD_REQUEST)?;

    if state.membership.grant(room_id.clone(), user_id.clone()).await {
        tracing::info!("Granted '{}' membership of '{}'", user_id, room_id);
        Ok(StatusCode::CREATED)
    } else {
        Ok(StatusCode::NO_CONTENT)
    }
}

/// Post a message to a room's live members (403 unless the poster is one of them)
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(room_id): Path<String>,
    Json(request): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<PostMessageResponse>), StatusCode> {
    let room_id = parse_room_id(room_id)?;
    let content = MessageContent::new(request.content).map_err(|e| {
        tracing::debug!("Rejected posted message: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    let (message_id, report) = state
        .post_message_usecase
        .execute(user.into_id(), room_id, content)
        .await
        .map_err(|e| match e {
            PostMessageError::NotAMember { .. } => {
                tracing::info!("Rejected posted message: {}", e);
                StatusCode::FORBIDDEN
            }
            PostMessageError::Hub(_) => {
                tracing::error!("Failed to post message: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(PostMessageResponse {
            message_id: message_id.into_string(),
            delivered: report.delivered,
        }),
    ))
}
