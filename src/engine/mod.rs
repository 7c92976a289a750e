use serde::{Deserialize, Serialize};

use crate::store::StoreError;

pub mod acquire;
pub mod splendor;

/// Which rule subsystem a deployment (and therefore every room it owns)
/// runs. The two variants share the room/turn/broadcast skeleton.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    Acquire,
    Splendor,
}

impl std::fmt::Display for GameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameKind::Acquire => f.write_str("acquire"),
            GameKind::Splendor => f.write_str("splendor"),
        }
    }
}

/// Room phase. One closed enum covers both variants; each engine only
/// ever moves a room through its own subset. Wire names match the
/// strings the frontend already speaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "waiting")]
    Waiting,
    #[serde(rename = "setTile")]
    SetTile,
    #[serde(rename = "createCompany")]
    CreateCompany,
    #[serde(rename = "mergingSelection")]
    MergingSelection,
    #[serde(rename = "mergingSettle")]
    MergingSettle,
    #[serde(rename = "buyStock")]
    BuyStock,
    #[serde(rename = "playing")]
    Playing,
    #[serde(rename = "last_turn")]
    LastTurn,
    #[serde(rename = "end")]
    End,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Waiting => "waiting",
            Phase::SetTile => "setTile",
            Phase::CreateCompany => "createCompany",
            Phase::MergingSelection => "mergingSelection",
            Phase::MergingSettle => "mergingSettle",
            Phase::BuyStock => "buyStock",
            Phase::Playing => "playing",
            Phase::LastTurn => "last_turn",
            Phase::End => "end",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a handler refused to act. Precondition failures are logged and
/// swallowed by the router (the follow-up broadcast re-syncs the client);
/// store failures bubble up the same way.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("not this player's turn")]
    OutOfTurn,
    #[error("action not valid in phase {0}")]
    WrongPhase(Phase),
    #[error("illegal action: {0}")]
    Illegal(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-invocation handler context assembled by the room under its mutex.
#[derive(Debug, Clone)]
pub struct HandlerCtx {
    pub room_id: String,
    pub player_id: String,
    /// Seat ids in join order; drives round-robin turn advancement.
    pub seat_order: Vec<String>,
}
