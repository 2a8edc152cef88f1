//! Player actions, trade offers and the event stream emitted by the reducer.
//!
//! `PlayerAction` is the wire union: internally tagged on `type` with
//! SCREAMING_SNAKE tags and camelCase fields, matching the client protocol.

use crate::board::PlayerId;
use crate::hex::{EdgeCoord, HexCoord, VertexCoord};
use crate::player::{Resource, ResourceBundle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier of a trade offer within one game.
pub type TradeId = u32;

/// Everything a seated player can ask the engine to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum PlayerAction {
    RollDice,
    PlaceSettlement {
        vertex: VertexCoord,
    },
    PlaceRoad {
        edge: EdgeCoord,
    },
    PlaceCity {
        vertex: VertexCoord,
    },
    BuyDevCard,
    PlayKnight {
        robber_hex: HexCoord,
    },
    PlayRoadBuilding,
    PlayYearOfPlenty {
        resources: [Resource; 2],
    },
    PlayMonopoly {
        resource: Resource,
    },
    DiscardResources {
        resources: ResourceBundle,
    },
    MoveRobber {
        hex: HexCoord,
    },
    Steal {
        target_player_id: PlayerId,
    },
    ProposeTrade {
        offering: ResourceBundle,
        requesting: ResourceBundle,
    },
    RespondToTrade {
        trade_id: TradeId,
        accept: bool,
    },
    ConfirmTrade {
        trade_id: TradeId,
        with_player_id: PlayerId,
    },
    CancelTrade {
        trade_id: TradeId,
    },
    BankTrade {
        giving: ResourceBundle,
        receiving: Resource,
    },
    EndTurn,
}

/// A responder's position on an open offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeResponse {
    Pending,
    Accepted,
    Rejected,
}

/// Lifecycle of an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    Executed,
    Cancelled,
}

/// A player-to-player trade offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeOffer {
    pub id: TradeId,
    pub proposer: PlayerId,
    pub offering: ResourceBundle,
    pub requesting: ResourceBundle,
    /// Per-responder status, keyed by seat.
    pub responses: HashMap<PlayerId, TradeResponse>,
    pub status: TradeStatus,
}

/// One player's share of a production round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGrant {
    pub player: PlayerId,
    pub resource: Resource,
    pub amount: u32,
}

/// Structured events describing each transition, broadcast alongside the
/// filtered state so clients can animate without diffing.
///
/// Events go to every seat, so they never carry hidden information: a steal
/// names the thief and victim but not the card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum GameEvent {
    DiceRolled {
        player: PlayerId,
        roll: [u8; 2],
        total: u8,
    },
    ResourcesProduced {
        grants: Vec<ResourceGrant>,
    },
    /// Bank scarcity: total claims exceeded the stock, so nobody received
    /// this resource for the roll.
    ProductionShorted {
        resource: Resource,
        claimed: u32,
        available: u32,
    },
    DiscardsRequired {
        pending: HashMap<PlayerId, u32>,
    },
    ResourcesDiscarded {
        player: PlayerId,
        count: u32,
    },
    SettlementBuilt {
        player: PlayerId,
        vertex: VertexCoord,
    },
    CityBuilt {
        player: PlayerId,
        vertex: VertexCoord,
    },
    RoadBuilt {
        player: PlayerId,
        edge: EdgeCoord,
    },
    DevCardBought {
        player: PlayerId,
    },
    KnightPlayed {
        player: PlayerId,
    },
    RoadBuildingPlayed {
        player: PlayerId,
    },
    YearOfPlentyPlayed {
        player: PlayerId,
        resources: [Resource; 2],
    },
    MonopolyPlayed {
        player: PlayerId,
        resource: Resource,
        collected: u32,
    },
    RobberMoved {
        player: PlayerId,
        from: HexCoord,
        to: HexCoord,
    },
    ResourceStolen {
        thief: PlayerId,
        victim: PlayerId,
    },
    TradeProposed {
        offer: TradeOffer,
    },
    TradeResponded {
        trade_id: TradeId,
        player: PlayerId,
        accept: bool,
    },
    TradeExecuted {
        trade_id: TradeId,
        proposer: PlayerId,
        with_player: PlayerId,
    },
    TradeCancelled {
        trade_id: TradeId,
    },
    BankTraded {
        player: PlayerId,
        gave: Resource,
        gave_count: u32,
        received: Resource,
    },
    LongestRoadChanged {
        previous: Option<PlayerId>,
        current: Option<PlayerId>,
        length: u32,
    },
    LargestArmyChanged {
        previous: Option<PlayerId>,
        current: Option<PlayerId>,
        knights: u32,
    },
    TurnEnded {
        player: PlayerId,
        next_player: PlayerId,
    },
    GameWon {
        player: PlayerId,
        victory_points: u32,
    },
}
