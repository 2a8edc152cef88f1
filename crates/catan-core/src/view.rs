//! Per-viewer projection of the authoritative state.
//!
//! This is the only place hidden information is dropped: the viewer's own
//! seat keeps its full hand, development cards and port set, while other
//! seats are reduced to public totals. The projection is total and
//! side-effect-free.

use crate::actions::TradeOffer;
use crate::board::{Building, PlayerId, Port, PortKind, Tile};
use crate::game::{GameState, TurnState};
use crate::hex::{geometry, HexCoord};
use crate::player::{DevCard, PlayerColor, ResourceBundle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What one connected client is allowed to see.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    pub game_id: String,
    pub board: BoardView,
    pub players: Vec<PlayerView>,
    pub turn: TurnState,
    /// The bank's stock is public.
    pub bank: ResourceBundle,
    /// Only the count of the deck is revealed, never its order.
    pub dev_deck_remaining: usize,
    pub trade_offers: Vec<TradeOffer>,
    pub winner: Option<PlayerId>,
    pub log: Vec<String>,
}

/// Board projection. Mapped collections use `"q,r,s"` / `"q,r,s,dir"` string
/// keys on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardView {
    /// Tiles in board enumeration order.
    pub tiles: Vec<Tile>,
    /// Keyed by canonical `"q,r,s,dir"` vertex keys.
    pub buildings: BTreeMap<String, Building>,
    /// Keyed by canonical `"q,r,s,dir"` edge keys.
    pub roads: BTreeMap<String, PlayerId>,
    pub ports: Vec<Port>,
    pub robber: HexCoord,
}

/// One seat as seen by the viewer. The private fields are present only on
/// the viewer's own entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub color: PlayerColor,
    pub resource_count: u32,
    pub dev_card_count: usize,
    pub knights_played: u32,
    pub longest_road_length: u32,
    /// Excludes hidden victory-point cards.
    pub public_victory_points: u32,
    pub has_longest_road: bool,
    pub has_largest_army: bool,
    pub settlements_remaining: u32,
    pub cities_remaining: u32,
    pub roads_remaining: u32,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceBundle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_cards: Option<Vec<DevCard>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<PortKind>>,
}

impl GameView {
    /// Project the state for one viewer.
    pub fn for_player(state: &GameState, viewer: PlayerId) -> GameView {
        let players = state
            .players
            .iter()
            .map(|player| {
                let own = player.id == viewer;
                let mut ports: Vec<PortKind> = player.ports.iter().copied().collect();
                ports.sort();
                PlayerView {
                    id: player.id,
                    name: player.name.clone(),
                    color: player.color,
                    resource_count: player.resources.total(),
                    dev_card_count: player.dev_cards.len(),
                    knights_played: player.knights_played,
                    longest_road_length: player.longest_road_length,
                    public_victory_points: state.public_score(player.id),
                    has_longest_road: player.has_longest_road,
                    has_largest_army: player.has_largest_army,
                    settlements_remaining: player.settlements_remaining,
                    cities_remaining: player.cities_remaining,
                    roads_remaining: player.roads_remaining,
                    connected: player.connected,
                    resources: own.then_some(player.resources),
                    dev_cards: own.then(|| player.dev_cards.clone()),
                    ports: own.then_some(ports),
                }
            })
            .collect();

        GameView {
            game_id: state.game_id.clone(),
            board: board_view(state),
            players,
            turn: state.turn.clone(),
            bank: *state.bank.stock(),
            dev_deck_remaining: state.dev_deck.len(),
            trade_offers: state.trade_offers.clone(),
            winner: state.winner,
            log: state.log.clone(),
        }
    }
}

fn board_view(state: &GameState) -> BoardView {
    let tiles = geometry()
        .hexes
        .iter()
        .filter_map(|hex| state.board.tile(hex))
        .cloned()
        .collect();

    let buildings = state
        .board
        .buildings()
        .map(|(vertex, building)| (vertex.to_string(), *building))
        .collect();

    let roads = state
        .board
        .roads()
        .map(|(edge, owner)| (edge.to_string(), owner))
        .collect();

    BoardView {
        tiles,
        buildings,
        roads,
        ports: state.board.ports().to_vec(),
        robber: state.board.robber(),
    }
}
