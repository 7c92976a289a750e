pub mod conn;
pub mod lifecycle;
pub mod registry;
pub mod room;
pub mod router;
pub mod turn;

pub use conn::*;
pub use lifecycle::*;
pub use registry::*;
pub use room::*;
pub use router::*;
