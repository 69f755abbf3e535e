use actix_web::{web, HttpResponse};
use serde_json::json;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{
    CandidateFilter, LikeRequest, LocationUpdate, MatchId, ProfileRequest, RespondRequest,
    StatusUpdate, UserId,
};
use crate::routes::AppState;

/// Configure matching routes under /petmate
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/petmate")
            .route("/profile", web::put().to(save_profile))
            .route("/candidates/{user_id}", web::post().to(find_candidates))
            .route("/like", web::post().to(like))
            .route("/unlike", web::post().to(unlike))
            .route("/requests/{match_id}/respond", web::post().to(respond))
            .route("/requests/{user_id}", web::get().to(pending_incoming))
            .route("/requests/{user_id}/sent", web::get().to(pending_outgoing))
            .route("/requests/{user_id}/count", web::get().to(pending_count))
            .route("/matches/{user_id}", web::get().to(matches))
            .route("/matches/{user_id}/{matched_user_id}", web::delete().to(unfriend))
            .route("/liked/{user_id}", web::get().to(liked_user_ids))
            .route("/location/{user_id}", web::get().to(get_location))
            .route("/location/{user_id}", web::put().to(update_location))
            .route("/status/{user_id}", web::post().to(update_status)),
    );
}

/// PUT /api/v1/petmate/profile
async fn save_profile(
    state: web::Data<AppState>,
    req: web::Json<ProfileRequest>,
) -> AppResult<HttpResponse> {
    req.validate()?;
    let profile = state.provisioner.save_profile(&req).await?;
    Ok(HttpResponse::Ok().json(profile))
}

/// POST /api/v1/petmate/candidates/{userId}
///
/// Request body (all fields optional):
/// ```json
/// {
///   "latitude": 37.5665,
///   "longitude": 126.978,
///   "radiusKm": 3.0,
///   "gender": "female",
///   "breed": "poodle",
///   "minActivity": 2,
///   "maxActivity": 5
/// }
/// ```
///
/// An empty body searches with the defaults; a malformed one is rejected.
async fn find_candidates(
    state: web::Data<AppState>,
    path: web::Path<UserId>,
    body: web::Bytes,
) -> AppResult<HttpResponse> {
    let filter = parse_filter(&body)?;
    filter.validate()?;

    let candidates = state.finder.find_candidates(path.into_inner(), &filter).await?;
    Ok(HttpResponse::Ok().json(candidates))
}

fn parse_filter(body: &[u8]) -> AppResult<CandidateFilter> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(CandidateFilter::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid JSON: {}", e)))
}

/// POST /api/v1/petmate/like
async fn like(state: web::Data<AppState>, req: web::Json<LikeRequest>) -> AppResult<HttpResponse> {
    req.validate()?;
    let view = state.engine.like(req.from_user_id, req.to_user_id).await?;
    Ok(HttpResponse::Ok().json(view))
}

/// POST /api/v1/petmate/unlike
async fn unlike(state: web::Data<AppState>, req: web::Json<LikeRequest>) -> AppResult<HttpResponse> {
    req.validate()?;
    let deleted = state.engine.unlike(req.from_user_id, req.to_user_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "unliked": deleted })))
}

/// POST /api/v1/petmate/requests/{matchId}/respond
async fn respond(
    state: web::Data<AppState>,
    path: web::Path<MatchId>,
    req: web::Json<RespondRequest>,
) -> AppResult<HttpResponse> {
    req.validate()?;
    let view = state
        .engine
        .respond(path.into_inner(), req.user_id, req.accept)
        .await?;
    Ok(HttpResponse::Ok().json(view))
}

async fn pending_incoming(
    state: web::Data<AppState>,
    path: web::Path<UserId>,
) -> AppResult<HttpResponse> {
    let requests = state.engine.pending_incoming(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(requests))
}

async fn pending_outgoing(
    state: web::Data<AppState>,
    path: web::Path<UserId>,
) -> AppResult<HttpResponse> {
    let requests = state.engine.pending_outgoing(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(requests))
}

async fn pending_count(
    state: web::Data<AppState>,
    path: web::Path<UserId>,
) -> AppResult<HttpResponse> {
    let count = state.engine.pending_count(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "count": count })))
}

async fn matches(state: web::Data<AppState>, path: web::Path<UserId>) -> AppResult<HttpResponse> {
    let matches = state.engine.matches(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(matches))
}

/// DELETE /api/v1/petmate/matches/{userId}/{matchedUserId}
async fn unfriend(
    state: web::Data<AppState>,
    path: web::Path<(UserId, UserId)>,
) -> AppResult<HttpResponse> {
    let (user_id, matched_user_id) = path.into_inner();
    state.engine.unfriend(user_id, matched_user_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn liked_user_ids(
    state: web::Data<AppState>,
    path: web::Path<UserId>,
) -> AppResult<HttpResponse> {
    let ids = state.engine.liked_user_ids(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ids))
}

async fn get_location(
    state: web::Data<AppState>,
    path: web::Path<UserId>,
) -> AppResult<HttpResponse> {
    let location = state.provisioner.saved_location(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(location))
}

async fn update_location(
    state: web::Data<AppState>,
    path: web::Path<UserId>,
    req: web::Json<LocationUpdate>,
) -> AppResult<HttpResponse> {
    req.validate()?;
    let location = state
        .provisioner
        .update_location(path.into_inner(), &req)
        .await?;
    Ok(HttpResponse::Ok().json(location))
}

async fn update_status(
    state: web::Data<AppState>,
    path: web::Path<UserId>,
    req: web::Json<StatusUpdate>,
) -> AppResult<HttpResponse> {
    let user_id = path.into_inner();
    let updated = state.provisioner.update_status(user_id, req.is_online).await?;
    Ok(HttpResponse::Ok().json(json!({
        "userId": user_id,
        "isOnline": req.is_online,
        "updated": updated,
    })))
}
