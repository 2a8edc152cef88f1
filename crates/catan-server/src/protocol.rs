//! WebSocket protocol frames: one JSON object per frame, tagged on `type`.

use catan_core::{GameEvent, GameView, PlayerAction, PlayerColor, PlayerId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Create a new room; the creator becomes the host.
    CreateRoom { player_name: String },

    /// Join an existing room by its 6-character code.
    JoinRoom { room_id: String, player_name: String },

    /// Leave the current room (during play this only marks the seat
    /// disconnected).
    LeaveRoom,

    /// Start the game (host only, 3-4 players).
    StartGame,

    /// Request the list of joinable rooms.
    ListRooms,

    /// Rebind this connection to a seat using the reconnect token.
    Reconnect { token: Uuid },

    /// Submit a game action for the engine.
    GameAction { action: PlayerAction },

    /// Room chat.
    Chat { message: String },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    RoomCreated {
        room_id: String,
        player_id: Uuid,
        token: Uuid,
    },
    RoomJoined {
        player_id: Uuid,
        token: Uuid,
        room_info: RoomInfo,
    },
    RoomList {
        rooms: Vec<RoomInfo>,
    },
    RoomUpdate {
        room_info: RoomInfo,
    },
    RoomLeft,
    GameStarted {
        state: GameView,
    },
    StateUpdate {
        state: GameView,
    },
    /// Sent only to the player whose action the validator rejected.
    ActionRejected {
        action: PlayerAction,
        reason: String,
    },
    GameEvent {
        event: GameEvent,
    },
    Reconnected {
        state: GameView,
    },
    PlayerDisconnected {
        player_id: Uuid,
    },
    PlayerReconnected {
        player_id: Uuid,
    },
    Error {
        message: String,
    },
    ChatMessage {
        player_id: Uuid,
        player_name: String,
        message: String,
    },
}

/// Room lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    InProgress,
    Finished,
}

/// Room summary for lobby listings and updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub room_id: String,
    pub host_id: Uuid,
    pub players: Vec<RoomPlayerInfo>,
    pub max_players: u8,
    pub status: RoomStatus,
}

/// One seat as shown in the lobby.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPlayerInfo {
    pub player_id: Uuid,
    pub name: String,
    pub color: PlayerColor,
    pub seat: PlayerId,
    pub connected: bool,
}
