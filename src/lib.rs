pub mod ai;
pub mod engine;
pub mod room;
pub mod server;
pub mod store;
pub mod tokio_tools;

pub use server::{run_server, ServerConfig};
