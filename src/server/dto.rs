use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    #[serde(rename = "maxPlayers")]
    pub max_players: usize,
    #[serde(rename = "aiCount", default)]
    pub ai_count: usize,
    #[serde(rename = "userID")]
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreateRoomResponse {
    pub room_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRoomRequest {
    #[serde(rename = "roomID")]
    pub room_id: String,
}

#[derive(Debug, Serialize)]
pub struct RoomPlayerView {
    #[serde(rename = "playerID")]
    pub player_id: String,
    pub online: bool,
}

#[derive(Debug, Serialize)]
pub struct RoomSummary {
    #[serde(rename = "roomID")]
    pub room_id: String,
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "maxPlayers")]
    pub max_players: usize,
    pub status: bool,
    #[serde(rename = "roomPlayer")]
    pub room_player: Vec<RoomPlayerView>,
}

#[derive(Debug, Serialize)]
pub struct RoomListResponse {
    pub rooms: Vec<RoomSummary>,
    #[serde(rename = "onlinePlayer")]
    pub online_player: usize,
}
