// HTTP API routes (players, economy, duels, matchmaking).

pub mod ws;

use axum::{
    body::Body,
    extract::{Json, Path, Query, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::economy::{self, Building, EconomyError, RaidTarget};
use crate::engine::duel::{DuelError, DuelId};
use crate::engine::moves::MoveGroup;
use crate::engine::server::DuelEngine;
use crate::matchmaking::{self, MatchQueue};
use crate::metrics;
use crate::players::PlayerId;

// ── Request types ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RegisterPlayerRequest {
    pub id: PlayerId,
    pub display_name: Option<String>,
}

#[derive(Deserialize)]
pub struct MovesParams {
    pub sample: Option<usize>,
}

#[derive(Deserialize)]
pub struct RaidRequest {
    pub target: RaidTarget,
}

#[derive(Deserialize)]
pub struct BuildRequest {
    pub building: Building,
}

#[derive(Deserialize)]
pub struct UnlockRequest {
    pub group: MoveGroup,
}

#[derive(Deserialize)]
pub struct LeaderboardParams {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct CreateDuelRequest {
    pub challenger: PlayerId,
    pub opponent: PlayerId,
    #[serde(default)]
    pub ranked: bool,
}

#[derive(Deserialize)]
pub struct ChoiceRequest {
    pub player_id: PlayerId,
    pub move_id: String,
}

#[derive(Deserialize)]
pub struct ForfeitRequest {
    pub player_id: PlayerId,
}

#[derive(Deserialize)]
pub struct MatchmakingRequest {
    pub player_id: PlayerId,
    #[serde(default)]
    pub ranked: bool,
}

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DuelEngine>,
    pub queue: MatchQueue,
    pub rating_window: i32,
}

// ── Error helpers ─────────────────────────────────────────────────────

fn json_error(status: StatusCode, msg: &str) -> Response {
    (status, Json(json!({ "error": msg }))).into_response()
}

fn duel_error(e: DuelError) -> Response {
    let status = match e {
        DuelError::InvalidParticipants => StatusCode::BAD_REQUEST,
        DuelError::DuelNotFound => StatusCode::NOT_FOUND,
        DuelError::UnknownParticipant(_) => StatusCode::FORBIDDEN,
        DuelError::InvalidMove(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DuelError::ChoiceAlreadyResolving | DuelError::ParticipantBusy(_) => StatusCode::CONFLICT,
    };
    json_error(status, &e.to_string())
}

fn economy_error(e: EconomyError) -> Response {
    let status = match e {
        EconomyError::UnknownPlayer(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    };
    json_error(status, &e.to_string())
}

fn player_not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, "Player not found")
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    Router::new()
        // Players
        .route("/api/players", post(register_player))
        .route("/api/players/{id}", get(get_player))
        .route("/api/players/{id}/moves", get(list_moves))
        // Kingdom economy
        .route("/api/players/{id}/collect", post(collect))
        .route("/api/players/{id}/bonus", post(daily_bonus))
        .route("/api/players/{id}/raid", post(raid))
        .route("/api/players/{id}/build", post(build))
        .route("/api/players/{id}/unlock", post(unlock))
        .route("/api/leaderboard", get(leaderboard))
        // Duels
        .route("/api/duels", post(create_duel))
        .route("/api/duels/{id}", get(get_duel))
        .route("/api/duels/{id}/choice", post(submit_choice))
        .route("/api/duels/{id}/forfeit", post(forfeit))
        .route("/api/duels/{id}/replay", get(get_replay))
        // Matchmaking
        .route("/api/matchmaking", post(join_matchmaking))
        .route("/api/matchmaking/{player_id}", delete(leave_matchmaking))
        .route("/api/matchmaking/status", get(matchmaking_status))
        // WebSocket
        .route("/ws/duels", get(ws::ws_duels))
        .with_state(state)
}

/// Record request count and latency per normalized path.
pub async fn track_requests(req: Request<Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let endpoint = metrics::normalize_path(req.uri().path());
    let timer = metrics::API_REQUEST_DURATION_SECONDS
        .with_label_values(&[endpoint.as_str()])
        .start_timer();

    let response = next.run(req).await;

    timer.observe_duration();
    metrics::API_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), endpoint.as_str(), response.status().as_str()])
        .inc();
    response
}

// ── Player handlers ───────────────────────────────────────────────────

async fn register_player(
    State(state): State<AppState>,
    Json(req): Json<RegisterPlayerRequest>,
) -> impl IntoResponse {
    let name = req
        .display_name
        .unwrap_or_else(|| format!("player {}", req.id));
    let player = state.engine.directory().get_or_create(req.id, &name);
    (StatusCode::OK, Json(json!(player))).into_response()
}

async fn get_player(State(state): State<AppState>, Path(id): Path<PlayerId>) -> impl IntoResponse {
    match state.engine.directory().get(id) {
        Some(player) => {
            let active_duel = state.engine.active_duel_for(id);
            (
                StatusCode::OK,
                Json(json!({ "player": player, "active_duel": active_duel })),
            )
                .into_response()
        }
        None => player_not_found(),
    }
}

async fn list_moves(
    State(state): State<AppState>,
    Path(id): Path<PlayerId>,
    Query(params): Query<MovesParams>,
) -> impl IntoResponse {
    if !state.engine.directory().contains(id) {
        return player_not_found();
    }
    let mut moves = state.engine.list_available_moves(id);
    if let Some(n) = params.sample {
        moves = moves
            .choose_multiple(&mut rand::thread_rng(), n)
            .cloned()
            .collect();
    }
    (StatusCode::OK, Json(json!(moves))).into_response()
}

async fn leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LeaderboardParams>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(10).min(100);
    let players = state.engine.directory().leaderboard(limit);
    (StatusCode::OK, Json(json!(players))).into_response()
}

// ── Economy handlers ──────────────────────────────────────────────────

fn receipt_response(result: Result<economy::Receipt, EconomyError>) -> Response {
    match result {
        Ok(receipt) => (StatusCode::OK, Json(json!(receipt))).into_response(),
        Err(e) => economy_error(e),
    }
}

async fn collect(State(state): State<AppState>, Path(id): Path<PlayerId>) -> impl IntoResponse {
    receipt_response(economy::collect(state.engine.directory(), id))
}

async fn daily_bonus(
    State(state): State<AppState>,
    Path(id): Path<PlayerId>,
) -> impl IntoResponse {
    let today = chrono::Utc::now().date_naive();
    receipt_response(economy::daily_bonus(state.engine.directory(), id, today))
}

async fn raid(
    State(state): State<AppState>,
    Path(id): Path<PlayerId>,
    Json(req): Json<RaidRequest>,
) -> impl IntoResponse {
    receipt_response(economy::raid(state.engine.directory(), id, req.target))
}

async fn build(
    State(state): State<AppState>,
    Path(id): Path<PlayerId>,
    Json(req): Json<BuildRequest>,
) -> impl IntoResponse {
    receipt_response(economy::build(state.engine.directory(), id, req.building))
}

async fn unlock(
    State(state): State<AppState>,
    Path(id): Path<PlayerId>,
    Json(req): Json<UnlockRequest>,
) -> impl IntoResponse {
    receipt_response(economy::buy_move_group(
        state.engine.directory(),
        id,
        req.group,
    ))
}

// ── Duel handlers ─────────────────────────────────────────────────────

async fn create_duel(
    State(state): State<AppState>,
    Json(req): Json<CreateDuelRequest>,
) -> impl IntoResponse {
    let directory = state.engine.directory();
    if !directory.contains(req.challenger) || !directory.contains(req.opponent) {
        return player_not_found();
    }
    let duel_id = match state
        .engine
        .create_duel(req.challenger, req.opponent, req.ranked)
    {
        Ok(id) => id,
        Err(e) => return duel_error(e),
    };
    // A directly challenged player leaves the matchmaking queue.
    state.queue.remove(req.challenger);
    state.queue.remove(req.opponent);

    match state.engine.duel_state(&duel_id) {
        Ok(snapshot) => (StatusCode::CREATED, Json(json!(snapshot))).into_response(),
        Err(e) => duel_error(e),
    }
}

async fn get_duel(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.engine.duel_state(&DuelId::from(id)) {
        Ok(snapshot) => (StatusCode::OK, Json(json!(snapshot))).into_response(),
        Err(e) => duel_error(e),
    }
}

async fn submit_choice(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChoiceRequest>,
) -> impl IntoResponse {
    match state
        .engine
        .submit_choice(&DuelId::from(id), req.player_id, &req.move_id)
    {
        Ok(outcome) => (StatusCode::OK, Json(json!(outcome))).into_response(),
        Err(e) => duel_error(e),
    }
}

async fn forfeit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ForfeitRequest>,
) -> impl IntoResponse {
    match state.engine.forfeit(&DuelId::from(id), req.player_id) {
        Ok(settlement) => (StatusCode::OK, Json(json!(settlement))).into_response(),
        Err(e) => duel_error(e),
    }
}

async fn get_replay(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let duel_id = DuelId::from(id);
    let Some(data) = state.engine.replay(&duel_id) else {
        return json_error(StatusCode::NOT_FOUND, "Replay not found for this duel");
    };

    let json_str = match crate::replay::decompress_replay(&data) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to decompress replay: {e}");
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to decompress replay",
            );
        }
    };
    let events: serde_json::Value = match serde_json::from_str(&json_str) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("Failed to parse replay JSON: {e}");
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to parse replay data",
            );
        }
    };

    (
        StatusCode::OK,
        Json(json!({ "duel_id": duel_id, "events": events })),
    )
        .into_response()
}

// ── Matchmaking handlers ──────────────────────────────────────────────

async fn join_matchmaking(
    State(state): State<AppState>,
    Json(req): Json<MatchmakingRequest>,
) -> impl IntoResponse {
    match matchmaking::request_duel(
        &state.engine,
        &state.queue,
        req.player_id,
        req.ranked,
        state.rating_window,
    ) {
        Ok(outcome) => (StatusCode::OK, Json(json!(outcome))).into_response(),
        Err(DuelError::UnknownParticipant(_)) => player_not_found(),
        Err(e) => duel_error(e),
    }
}

async fn leave_matchmaking(
    State(state): State<AppState>,
    Path(player_id): Path<PlayerId>,
) -> impl IntoResponse {
    let removed = state.queue.remove(player_id);
    (StatusCode::OK, Json(json!({ "removed": removed }))).into_response()
}

async fn matchmaking_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.queue.status();
    (StatusCode::OK, Json(json!(status))).into_response()
}
