// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{GamificationRecord, PositionSample, StoredWalk, WalkResult, XpAward, XpSource};
use crate::services::{DogRef, WalkSubmission};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Most fixes accepted in one uploaded walk.
const MAX_UPLOAD_POSITIONS: u64 = 20_000;

const DEFAULT_WALK_LIMIT: u32 = 20;
const MAX_WALK_LIMIT: u32 = 100;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/dogs/{dog_id}/gamification", get(get_gamification))
        .route(
            "/api/dogs/{dog_id}/gamification/stream",
            get(stream_gamification),
        )
        .route("/api/dogs/{dog_id}/xp", post(add_xp))
        .route("/api/dogs/{dog_id}/streak", post(update_streak))
        .route("/api/dogs/{dog_id}/achievements", post(unlock_achievement))
        .route("/api/dogs/{dog_id}/walks", post(submit_walk).get(list_walks))
        .route("/api/dogs/{dog_id}/walks/{started}", get(get_walk))
}

fn dog_ref(user: &AuthUser, dog_id: String) -> Result<DogRef> {
    DogRef::new(user.user_id.clone(), dog_id)
}

// ─── Gamification ────────────────────────────────────────────

async fn get_gamification(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(dog_id): Path<String>,
) -> Result<Json<GamificationRecord>> {
    let dog = dog_ref(&user, dog_id)?;
    Ok(Json(state.ledger.get_record(&dog).await?))
}

/// Server-sent events carrying the full record after every change.
///
/// The first event is the current record (a fresh level-1 record if the dog
/// has none yet).
async fn stream_gamification(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(dog_id): Path<String>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    let dog = dog_ref(&user, dog_id)?;
    let rx = state.ledger.subscribe(&dog).await?;

    tracing::debug!(dog = %dog.doc_id(), "Gamification stream opened");

    let events = stream::unfold((rx, true), |(mut rx, first)| async move {
        if !first && rx.changed().await.is_err() {
            return None;
        }
        let record = rx.borrow_and_update().clone().unwrap_or_default();
        let event = Event::default().event("gamification").json_data(&record);
        Some((event, (rx, false)))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Deserialize)]
struct AddXpRequest {
    xp: i64,
    source: XpSource,
}

async fn add_xp(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(dog_id): Path<String>,
    Json(body): Json<AddXpRequest>,
) -> Result<Json<XpAward>> {
    let dog = dog_ref(&user, dog_id)?;
    Ok(Json(state.ledger.add_xp(&dog, body.xp, body.source).await?))
}

async fn update_streak(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(dog_id): Path<String>,
) -> Result<Json<crate::models::StreakOutcome>> {
    let dog = dog_ref(&user, dog_id)?;
    Ok(Json(state.ledger.update_streak(&dog).await?))
}

#[derive(Debug, Deserialize)]
struct AchievementRequest {
    id: String,
}

#[derive(Debug, Serialize)]
struct AchievementResponse {
    unlocked: bool,
}

async fn unlock_achievement(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(dog_id): Path<String>,
    Json(body): Json<AchievementRequest>,
) -> Result<Json<AchievementResponse>> {
    let dog = dog_ref(&user, dog_id)?;
    let unlocked = state.ledger.unlock_achievement(&dog, &body.id).await?;
    Ok(Json(AchievementResponse { unlocked }))
}

// ─── Walks ───────────────────────────────────────────────────

/// A finished walk uploaded by the device.
///
/// Distance, duration and XP are recomputed from the track; nothing the
/// client derived is trusted.
#[derive(Debug, Deserialize, Validate)]
struct WalkUpload {
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    /// Total time spent paused
    #[serde(default)]
    paused_seconds: u64,
    #[validate(length(max = MAX_UPLOAD_POSITIONS), nested)]
    positions: Vec<PositionSample>,
}

impl WalkUpload {
    fn into_result(self) -> Result<WalkResult> {
        self.validate()
            .map_err(|e| AppError::BadRequest(format!("Invalid walk: {}", e)))?;

        if self.ended_at < self.started_at {
            return Err(AppError::BadRequest(
                "Walk must end after it starts".to_string(),
            ));
        }

        Ok(WalkResult::from_track(
            &self.positions,
            self.started_at,
            self.ended_at,
            self.paused_seconds,
        ))
    }
}

async fn submit_walk(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(dog_id): Path<String>,
    Json(body): Json<WalkUpload>,
) -> Result<(StatusCode, Json<WalkSubmission>)> {
    let dog = dog_ref(&user, dog_id)?;
    let uploaded = body.positions.len();
    let result = body.into_result()?;

    tracing::debug!(
        dog = %dog.doc_id(),
        uploaded,
        accepted = result.position_count,
        "Walk track received"
    );

    let submission = state.ledger.submit_walk(&dog, &result).await?;
    let status = if submission.duplicate {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(submission)))
}

/// A stored walk, addressed by its start time in unix seconds.
async fn get_walk(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((dog_id, started)): Path<(String, i64)>,
) -> Result<Json<StoredWalk>> {
    let dog = dog_ref(&user, dog_id)?;
    Ok(Json(state.ledger.get_walk(&dog, started).await?))
}

#[derive(Debug, Deserialize)]
struct WalksQuery {
    #[serde(default = "default_walk_limit")]
    limit: u32,
}

fn default_walk_limit() -> u32 {
    DEFAULT_WALK_LIMIT
}

#[derive(Debug, Serialize)]
struct WalksResponse {
    walks: Vec<StoredWalk>,
}

async fn list_walks(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(dog_id): Path<String>,
    Query(params): Query<WalksQuery>,
) -> Result<Json<WalksResponse>> {
    if params.limit == 0 {
        return Err(AppError::BadRequest(
            "Limit must be greater than 0".to_string(),
        ));
    }
    let dog = dog_ref(&user, dog_id)?;
    let walks = state
        .ledger
        .list_walks(&dog, params.limit.min(MAX_WALK_LIMIT))
        .await?;
    Ok(Json(WalksResponse { walks }))
}
