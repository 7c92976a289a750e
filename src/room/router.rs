use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::acquire::{Company, SettleDecision, Tile};
use crate::engine::splendor::GemColor;

/// Every inbound frame, as a closed sum. An unknown `type` is a protocol
/// error: the frame is logged and dropped without a broadcast.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ready,
    PlaceTile { payload: Tile },
    CreateCompany { payload: Company },
    BuyStock { payload: BTreeMap<Company, u32> },
    MergingSelection { payload: Company },
    MergingSettle { payload: Vec<SettleDecision> },
    GetGem { payload: BTreeMap<GemColor, u32> },
    BuyCard { payload: u32 },
    PreserveCard { payload: u32 },
    PlayAudio { payload: String },
    RestartGame,
    GameEnd,
}

impl ClientMessage {
    /// Stable name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Ready => "ready",
            ClientMessage::PlaceTile { .. } => "place_tile",
            ClientMessage::CreateCompany { .. } => "create_company",
            ClientMessage::BuyStock { .. } => "buy_stock",
            ClientMessage::MergingSelection { .. } => "merging_selection",
            ClientMessage::MergingSettle { .. } => "merging_settle",
            ClientMessage::GetGem { .. } => "get_gem",
            ClientMessage::BuyCard { .. } => "buy_card",
            ClientMessage::PreserveCard { .. } => "preserve_card",
            ClientMessage::PlayAudio { .. } => "play_audio",
            ClientMessage::RestartGame => "restart_game",
            ClientMessage::GameEnd => "game_end",
        }
    }
}

pub fn parse_frame(raw: &str) -> Result<ClientMessage, serde_json::Error> {
    serde_json::from_str(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_frames_parse() {
        let msg = parse_frame(r#"{"type":"place_tile","payload":"6A"}"#).unwrap();
        assert_eq!(msg.kind(), "place_tile");

        let msg = parse_frame(r#"{"type":"buy_stock","payload":{"Tower":2,"Imperial":1}}"#).unwrap();
        match msg {
            ClientMessage::BuyStock { payload } => {
                assert_eq!(payload.get(&Company::Tower), Some(&2));
                assert_eq!(payload.get(&Company::Imperial), Some(&1));
            }
            other => panic!("unexpected message {other:?}"),
        }

        let msg = parse_frame(
            r#"{"type":"merging_settle","payload":[{"company":"Sackson","sellAmount":2,"exchangeAmount":2}]}"#,
        )
        .unwrap();
        assert_eq!(msg.kind(), "merging_settle");
    }

    #[test]
    fn unit_frames_tolerate_extra_fields() {
        let msg = parse_frame(r#"{"type":"ready","playerID":"p1"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Ready);
    }

    #[test]
    fn unknown_type_is_a_protocol_error() {
        assert!(parse_frame(r#"{"type":"hack_the_bank"}"#).is_err());
        assert!(parse_frame(r#"{"payload":"6A"}"#).is_err());
        assert!(parse_frame("not json").is_err());
    }
}
