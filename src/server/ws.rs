use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::Query;
use axum::response::Response;
use axum::Extension;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::room::{Conn, Outbound, RealConn};
use crate::tokio_tools::spawn_named_task;

use super::routes::AppContext;

const LOG_TARGET: &str = "server::ws";

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(rename = "roomID")]
    pub room_id: String,
    #[serde(rename = "userID")]
    pub user_id: String,
}

/// `GET /ws?roomID=..&userID=..`: upgrade and hand the socket to the room.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    Extension(ctx): Extension<Arc<AppContext>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx, query))
}

fn error_frame(message: &str) -> String {
    serde_json::json!({ "type": "error", "message": message }).to_string()
}

fn init_frame(player_id: &str) -> String {
    serde_json::json!({ "type": "init", "playerId": player_id }).to_string()
}

async fn handle_socket(socket: WebSocket, ctx: Arc<AppContext>, query: WsQuery) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    // Dedicated write pump: room broadcasts enqueue and never block on a
    // slow socket.
    let pump = spawn_named_task(format!("ws-writer-{}", query.user_id), async move {
        while let Some(out) = rx.recv().await {
            match out {
                Outbound::Frame(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let conn: Arc<dyn Conn> = Arc::new(RealConn::new(tx.clone()));
    let room = match ctx.registry.join(&query.room_id, &query.user_id, conn).await {
        Ok(room) => room,
        Err(err) => {
            info!(
                target: LOG_TARGET,
                room = %query.room_id, player = %query.user_id, %err, "join refused"
            );
            let _ = tx.send(Outbound::Frame(error_frame(&err.to_string())));
            let _ = tx.send(Outbound::Close);
            return;
        }
    };

    let _ = tx.send(Outbound::Frame(init_frame(&query.user_id)));
    room.broadcast().await;

    // Reader loop: one fiber per connection, frames processed in arrival
    // order.
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => room.handle_frame(&query.user_id, &text).await,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(other) => {
                debug!(target: LOG_TARGET, player = %query.user_id, ?other, "ignoring non-text frame")
            }
        }
    }

    room.handle_disconnect(&query.user_id).await;
    if !pump.is_finished() {
        warn!(
            target: LOG_TARGET,
            player = %query.user_id, "reader closed, shutting down write pump"
        );
        pump.abort();
    }
}
