use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};

const LOG_TARGET: &str = "boardroom::server::http";
/// Lobby calls are tiny; anything slower than this is worth flagging.
const SLOW_REQUEST_MS: u128 = 500;

/// Request/response log line for the room façade. Room and player ids
/// travel as query parameters on the lobby routes, so they are pulled out
/// here and tagged the same way the room modules tag their lines.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let (room, player) = room_scope(request.uri().query());

    tracing::info!(
        target: LOG_TARGET,
        %method,
        %path,
        room = room.as_deref().unwrap_or("-"),
        player = player.as_deref().unwrap_or("-"),
        "request received"
    );

    let started = Instant::now();
    let response = next.run(request).await;

    let elapsed_ms = started.elapsed().as_millis();
    let status = response.status().as_u16();
    if elapsed_ms >= SLOW_REQUEST_MS {
        tracing::warn!(
            target: LOG_TARGET,
            %method,
            %path,
            status,
            elapsed_ms = %elapsed_ms,
            "slow request"
        );
    } else {
        tracing::info!(
            target: LOG_TARGET,
            %method,
            %path,
            status,
            elapsed_ms = %elapsed_ms,
            "request served"
        );
    }

    response
}

/// Best-effort extraction of `roomID` / `userID` from a query string.
/// Unknown or malformed pairs are simply skipped; this only feeds logs.
fn room_scope(query: Option<&str>) -> (Option<String>, Option<String>) {
    let mut room = None;
    let mut player = None;
    for pair in query.unwrap_or_default().split('&') {
        match pair.split_once('=') {
            Some(("roomID", value)) if !value.is_empty() => room = Some(value.to_string()),
            Some(("userID", value)) if !value.is_empty() => player = Some(value.to_string()),
            _ => {}
        }
    }
    (room, player)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_scope_reads_ws_style_queries() {
        let (room, player) = room_scope(Some("roomID=ab12cd34&userID=alice"));
        assert_eq!(room.as_deref(), Some("ab12cd34"));
        assert_eq!(player.as_deref(), Some("alice"));
    }

    #[test]
    fn room_scope_tolerates_noise() {
        assert_eq!(room_scope(None), (None, None));
        assert_eq!(room_scope(Some("")), (None, None));
        let (room, player) = room_scope(Some("roomID=&foo&userID=bob&x=1"));
        assert_eq!(room, None);
        assert_eq!(player.as_deref(), Some("bob"));
    }
}
