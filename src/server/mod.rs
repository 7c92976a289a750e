pub mod bootstrap;
mod dto;
mod error;
pub mod logging;
pub mod routes;
pub mod ws;

pub use bootstrap::{run_server, ServerConfig};
pub use dto::{
    CreateRoomRequest, CreateRoomResponse, DeleteRoomRequest, RoomListResponse, RoomPlayerView,
    RoomSummary,
};
pub use error::ApiError;
pub use routes::{build_router, AppContext};
