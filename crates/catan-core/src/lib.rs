//! Authoritative game engine for the catan-server workspace.
//!
//! The engine is a deterministic reducer: rooms feed player actions into
//! [`GameState::dispatch`], which validates against the full rule-set and
//! returns a new state plus the events describing the transition. All
//! randomness (board layout, deck order, dice, steals) is driven by the seed
//! carried inside the state, so a game replays bit-identically from its
//! initial state and action sequence.
//!
//! # Modules
//!
//! - [`hex`]: cube coordinates, canonical vertices/edges, adjacency tables
//! - [`board`]: tiles, buildings, roads, ports, robber, board generation
//! - [`player`]: resources, the bank, development cards, per-seat state
//! - [`actions`]: the wire action union, trade offers, the event stream
//! - [`game`]: phase machine, validation and the `dispatch` reducer
//! - [`view`]: per-viewer projection that drops hidden information

pub mod actions;
pub mod board;
pub mod game;
pub mod hex;
pub mod player;
pub mod view;

// Re-export commonly used types
pub use actions::{GameEvent, PlayerAction, TradeId, TradeOffer, TradeResponse, TradeStatus};
pub use board::{Board, Building, BuildingKind, PlayerId, Port, PortKind, Terrain, Tile};
pub use game::{GameError, GameState, MainSub, Phase, SetupPlacing, TurnState};
pub use hex::{EdgeCoord, EdgeDir, HexCoord, VertexCoord, VertexDir, Wind};
pub use player::{Bank, DevCard, DevCardKind, Player, PlayerColor, Resource, ResourceBundle};
pub use view::{BoardView, GameView, PlayerView};
