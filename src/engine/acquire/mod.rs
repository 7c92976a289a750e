pub mod board;
pub mod engine;
pub mod merger;
pub mod rules;
pub mod snapshot;
pub mod types;

pub use board::*;
pub use engine::*;
pub use merger::*;
pub use rules::*;
pub use snapshot::*;
pub use types::*;

#[cfg(test)]
mod tests;
