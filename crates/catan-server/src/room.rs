//! Room lifecycle: seats, reconnect tokens and the action path into the
//! engine.

use catan_core::{GameError, GameEvent, GameState, GameView, PlayerAction, PlayerColor, PlayerId};
use rand::seq::SliceRandom;
use thiserror::Error;
use uuid::Uuid;

use crate::protocol::{RoomInfo, RoomPlayerInfo, RoomStatus};

pub const MAX_PLAYERS: usize = 4;
pub const MIN_PLAYERS_TO_START: usize = 3;

/// Unambiguous room-code alphabet: no I, O, 0 or 1.
const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const ROOM_CODE_LEN: usize = 6;

/// Generate a fresh 6-character room code.
pub fn new_room_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_CODE_LEN)
        .map(|_| *ROOM_CODE_ALPHABET.choose(&mut rng).unwrap() as char)
        .collect()
}

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Failed to join room: room is full")]
    RoomFull,

    #[error("Failed to join room: game already started")]
    AlreadyStarted,

    #[error("Need at least {MIN_PLAYERS_TO_START} players to start")]
    NotEnoughPlayers,

    #[error("Only the host can start the game")]
    NotHost,

    #[error("Game has not started")]
    NotStarted,

    #[error("Player is not seated in this room")]
    NotSeated,

    /// A validator rejection from the engine; surfaced as ACTION_REJECTED.
    #[error(transparent)]
    Rule(#[from] GameError),
}

/// One occupied seat.
#[derive(Debug, Clone)]
pub struct Seat {
    pub player_id: Uuid,
    /// Opaque reconnect token, issued at join and held client-side.
    pub token: Uuid,
    pub name: String,
    pub seat: PlayerId,
    pub connected: bool,
}

impl Seat {
    fn new(name: String, seat: PlayerId) -> Self {
        Self {
            player_id: Uuid::new_v4(),
            token: Uuid::new_v4(),
            name,
            seat,
            connected: true,
        }
    }
}

/// What `leave` did, so the server can react.
#[derive(Debug, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Seat vacated (room was still waiting). True when the room emptied.
    Removed { room_empty: bool },
    /// Game in progress: the seat is kept, only marked disconnected.
    MarkedDisconnected,
    NotSeated,
}

/// A game room. Owned exclusively by the server's room map; all access to
/// the contained `GameState` is serialized through that ownership.
pub struct Room {
    pub id: String,
    pub host: Uuid,
    pub seats: Vec<Seat>,
    pub status: RoomStatus,
    pub game: Option<GameState>,
}

impl Room {
    pub fn new(id: String, host_name: String) -> Self {
        let host_seat = Seat::new(host_name, 0);
        let host = host_seat.player_id;
        Self {
            id,
            host,
            seats: vec![host_seat],
            status: RoomStatus::Waiting,
            game: None,
        }
    }

    pub fn is_full(&self) -> bool {
        self.seats.len() >= MAX_PLAYERS
    }

    /// Seat a new player. Only possible while waiting with a free seat.
    pub fn join(&mut self, name: String) -> Result<&Seat, RoomError> {
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::AlreadyStarted);
        }
        if self.is_full() {
            return Err(RoomError::RoomFull);
        }
        let seat = Seat::new(name, self.seats.len() as PlayerId);
        self.seats.push(seat);
        Ok(self.seats.last().expect("just pushed"))
    }

    pub fn seat_of(&self, player: Uuid) -> Option<&Seat> {
        self.seats.iter().find(|s| s.player_id == player)
    }

    pub fn seat_by_token(&self, token: Uuid) -> Option<&Seat> {
        self.seats.iter().find(|s| s.token == token)
    }

    pub fn set_connected(&mut self, player: Uuid, connected: bool) {
        if let Some(seat) = self.seats.iter_mut().find(|s| s.player_id == player) {
            seat.connected = connected;
        }
    }

    /// Start the game: host only, 3-4 seated players.
    pub fn start(&mut self, requester: Uuid, seed: u64) -> Result<(), RoomError> {
        if requester != self.host {
            return Err(RoomError::NotHost);
        }
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::AlreadyStarted);
        }
        if self.seats.len() < MIN_PLAYERS_TO_START {
            return Err(RoomError::NotEnoughPlayers);
        }

        let names: Vec<String> = self.seats.iter().map(|s| s.name.clone()).collect();
        self.game = Some(GameState::new(self.id.clone(), names, seed));
        self.status = RoomStatus::InProgress;
        Ok(())
    }

    /// Tag the sender's seat and dispatch. On success the room swaps in the
    /// new state; on a rule rejection nothing changes.
    pub fn apply_action(
        &mut self,
        player: Uuid,
        action: &PlayerAction,
    ) -> Result<Vec<GameEvent>, RoomError> {
        let seat = self.seat_of(player).ok_or(RoomError::NotSeated)?.seat;
        let game = self.game.as_ref().ok_or(RoomError::NotStarted)?;

        let (next, events) = game.dispatch(seat, action)?;
        if next.winner.is_some() {
            self.status = RoomStatus::Finished;
        }
        self.game = Some(next);
        Ok(events)
    }

    /// The filtered state for one seated player.
    pub fn view_for(&self, player: Uuid) -> Option<GameView> {
        let seat = self.seat_of(player)?;
        let game = self.game.as_ref()?;
        Some(GameView::for_player(game, seat.seat))
    }

    /// Per-recipient filtered views for a broadcast.
    pub fn views(&self) -> Vec<(Uuid, GameView)> {
        let Some(game) = self.game.as_ref() else {
            return Vec::new();
        };
        self.seats
            .iter()
            .map(|s| (s.player_id, GameView::for_player(game, s.seat)))
            .collect()
    }

    /// Leave the room. Seats are never vacated once the game started; the
    /// seat is only marked disconnected and waits for a reconnect.
    pub fn leave(&mut self, player: Uuid) -> LeaveOutcome {
        if self.seat_of(player).is_none() {
            return LeaveOutcome::NotSeated;
        }
        match self.status {
            RoomStatus::Waiting => {
                self.seats.retain(|s| s.player_id != player);
                // Reseat so join order stays contiguous.
                for (i, seat) in self.seats.iter_mut().enumerate() {
                    seat.seat = i as PlayerId;
                }
                if player == self.host {
                    if let Some(next_host) = self.seats.first() {
                        self.host = next_host.player_id;
                    }
                }
                LeaveOutcome::Removed {
                    room_empty: self.seats.is_empty(),
                }
            }
            RoomStatus::InProgress | RoomStatus::Finished => {
                self.set_connected(player, false);
                LeaveOutcome::MarkedDisconnected
            }
        }
    }

    pub fn to_info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.id.clone(),
            host_id: self.host,
            players: self
                .seats
                .iter()
                .map(|s| RoomPlayerInfo {
                    player_id: s.player_id,
                    name: s.name.clone(),
                    color: PlayerColor::for_seat(s.seat),
                    seat: s.seat,
                    connected: s.connected,
                })
                .collect(),
            max_players: MAX_PLAYERS as u8,
            status: self.status,
        }
    }
}
