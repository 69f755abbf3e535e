use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::error::AppResult;
use crate::models::{RecentQuery, RoomId, RoomPairQuery, SendMessageRequest, UserId, UserQuery};
use crate::routes::AppState;

const DEFAULT_RECENT_LIMIT: u32 = 50;
const MAX_RECENT_LIMIT: u32 = 200;

/// Configure chat routes under /messages
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/messages")
            .route("/room", web::post().to(get_or_create_room))
            .route("/rooms/{user_id}", web::get().to(list_rooms))
            .route("/room/{room_id}", web::get().to(history))
            .route("/room/{room_id}", web::delete().to(leave_room))
            .route("/room/{room_id}/recent", web::get().to(recent))
            .route("/room/{room_id}/read", web::put().to(mark_read))
            .route("/room/{room_id}/unread", web::get().to(unread_count))
            .route("/send", web::post().to(send_message))
            .route("/unread/{user_id}", web::get().to(total_unread_count)),
    );
}

/// POST /api/v1/messages/room?userId1=..&userId2=..
async fn get_or_create_room(
    state: web::Data<AppState>,
    query: web::Query<RoomPairQuery>,
) -> AppResult<HttpResponse> {
    let room = state
        .chat
        .get_or_create_room(query.user_id1, query.user_id2)
        .await?;
    Ok(HttpResponse::Ok().json(room))
}

async fn list_rooms(state: web::Data<AppState>, path: web::Path<UserId>) -> AppResult<HttpResponse> {
    let rooms = state.chat.list_rooms(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(rooms))
}

/// GET /api/v1/messages/room/{roomId}?userId=..
///
/// Returns the whole history, then marks the room read for the caller.
async fn history(
    state: web::Data<AppState>,
    path: web::Path<RoomId>,
    query: web::Query<UserQuery>,
) -> AppResult<HttpResponse> {
    let room_id = path.into_inner();
    let messages = state.chat.history(room_id, query.user_id).await?;

    if let Err(e) = state.chat.mark_read(room_id, query.user_id).await {
        tracing::warn!(room_id, user_id = query.user_id, error = %e, "mark read after history failed");
    }

    Ok(HttpResponse::Ok().json(messages))
}

async fn recent(
    state: web::Data<AppState>,
    path: web::Path<RoomId>,
    query: web::Query<RecentQuery>,
) -> AppResult<HttpResponse> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .clamp(1, MAX_RECENT_LIMIT);
    let messages = state
        .chat
        .recent(path.into_inner(), query.user_id, limit)
        .await?;
    Ok(HttpResponse::Ok().json(messages))
}

/// POST /api/v1/messages/send
///
/// Request body:
/// ```json
/// {
///   "chatRoomId": 12,
///   "senderId": 3,
///   "content": "walk at 6?",
///   "messageType": "TEXT"
/// }
/// ```
async fn send_message(
    state: web::Data<AppState>,
    req: web::Json<SendMessageRequest>,
) -> AppResult<HttpResponse> {
    let message = state.chat.send_message(&req).await?;
    Ok(HttpResponse::Created().json(message))
}

async fn mark_read(
    state: web::Data<AppState>,
    path: web::Path<RoomId>,
    query: web::Query<UserQuery>,
) -> AppResult<HttpResponse> {
    let updated = state.chat.mark_read(path.into_inner(), query.user_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "updated": updated })))
}

async fn unread_count(
    state: web::Data<AppState>,
    path: web::Path<RoomId>,
    query: web::Query<UserQuery>,
) -> AppResult<HttpResponse> {
    let count = state
        .chat
        .unread_count(path.into_inner(), query.user_id)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "count": count })))
}

async fn total_unread_count(
    state: web::Data<AppState>,
    path: web::Path<UserId>,
) -> AppResult<HttpResponse> {
    let count = state.chat.total_unread_count(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "count": count })))
}

/// DELETE /api/v1/messages/room/{roomId}?userId=..
async fn leave_room(
    state: web::Data<AppState>,
    path: web::Path<RoomId>,
    query: web::Query<UserQuery>,
) -> AppResult<HttpResponse> {
    state.chat.leave_room(path.into_inner(), query.user_id).await?;
    Ok(HttpResponse::NoContent().finish())
}
