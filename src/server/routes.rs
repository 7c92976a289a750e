use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use uuid::Uuid;

use crate::engine::{acquire, splendor, GameKind, Phase};
use crate::room::Registry;
use crate::store::{RoomMeta, RoomStore};

use super::dto::{
    CreateRoomRequest, CreateRoomResponse, DeleteRoomRequest, RoomListResponse, RoomPlayerView,
    RoomSummary,
};
use super::error::ApiError;

const LOG_TARGET: &str = "server::routes";
const MIN_PLAYERS: usize = 2;
const MAX_PLAYERS: usize = 6;

/// Shared state behind every HTTP and WebSocket handler.
pub struct AppContext {
    pub store: Arc<dyn RoomStore>,
    pub registry: Arc<Registry>,
    pub game: GameKind,
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    // The browser frontend is served from another origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/room/create", post(create_room))
        .route("/room/delete", post(delete_room))
        .route("/room/list", get(list_rooms))
        .route("/ws", get(super::ws::ws_handler))
        .layer(Extension(ctx))
        .layer(middleware::from_fn(super::logging::log_requests))
        .layer(cors)
}

/// `POST /room/create`: allocate an id, seed the game state and seat the
/// requested AI opponents.
async fn create_room(
    Extension(ctx): Extension<Arc<AppContext>>,
    Json(payload): Json<CreateRoomRequest>,
) -> Result<Json<CreateRoomResponse>, ApiError> {
    if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&payload.max_players) {
        return Err(ApiError::invalid_field(
            "maxPlayers",
            "must be between 2 and 6",
        ));
    }
    if payload.ai_count >= payload.max_players {
        return Err(ApiError::invalid_field(
            "aiCount",
            "must leave room for at least one human",
        ));
    }

    let room_id = Uuid::new_v4().simple().to_string()[..8].to_string();
    let meta = RoomMeta {
        game: ctx.game,
        owner: payload.user_id.clone(),
        max_players: payload.max_players,
        started: false,
        phase: match ctx.game {
            GameKind::Acquire => Phase::SetTile,
            GameKind::Splendor => Phase::Waiting,
        },
        game_start: None,
    };
    ctx.store.create_room(&room_id, meta).await?;

    let seed_result = match ctx.game {
        GameKind::Acquire => acquire::init_room(ctx.store.as_ref(), &room_id).await,
        GameKind::Splendor => {
            let mut rng = ctx.registry.child_rng();
            splendor::init_room(ctx.store.as_ref(), &room_id, payload.max_players, &mut rng).await
        }
    };
    if let Err(err) = seed_result {
        ctx.store.delete_room(&room_id).await?;
        return Err(ApiError::internal(err.to_string()));
    }

    ctx.registry
        .seat_virtual(&room_id, payload.ai_count)
        .await
        .map_err(ApiError::from)?;

    info!(
        target: LOG_TARGET,
        room = %room_id, owner = %payload.user_id, max_players = payload.max_players,
        ai_count = payload.ai_count, "room created"
    );
    Ok(Json(CreateRoomResponse { room_id }))
}

/// `POST /room/delete`: drop the room from the registry and the store.
async fn delete_room(
    Extension(ctx): Extension<Arc<AppContext>>,
    Json(payload): Json<DeleteRoomRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ctx.registry.remove(&payload.room_id);
    ctx.store.delete_room(&payload.room_id).await?;
    info!(target: LOG_TARGET, room = %payload.room_id, "room deleted");
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// `GET /room/list`: lobby view of every room and its roster.
async fn list_rooms(
    Extension(ctx): Extension<Arc<AppContext>>,
) -> Result<Json<RoomListResponse>, ApiError> {
    let mut rooms = Vec::new();
    let mut online_player = 0usize;
    for (room_id, meta) in ctx.store.list_rooms().await? {
        let roster = match ctx.registry.get(&room_id) {
            Some(room) => room.roster().await,
            None => Vec::new(),
        };
        online_player += roster.iter().filter(|(_, online)| *online).count();
        rooms.push(RoomSummary {
            room_id,
            user_id: meta.owner,
            max_players: meta.max_players,
            status: meta.started,
            room_player: roster
                .into_iter()
                .map(|(player_id, online)| RoomPlayerView { player_id, online })
                .collect(),
        });
    }
    Ok(Json(RoomListResponse {
        rooms,
        online_player,
    }))
}
