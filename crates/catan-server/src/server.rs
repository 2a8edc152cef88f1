//! WebSocket server and connection handling.
//!
//! Every connection gets an unbounded outbox drained by its own forwarding
//! task, so a stalled socket never blocks a room. Rooms live in a `DashMap`;
//! the exclusive guard handed out by `get_mut` serializes all dispatches
//! against one room, which is the single-writer guarantee the engine needs.

use crate::protocol::{ClientMessage, RoomInfo, RoomStatus, ServerMessage};
use crate::room::{new_room_code, LeaveOutcome, Room, RoomError};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{error, info, warn};
use uuid::Uuid;

/// JSON body answered to plain HTTP requests on the listen port.
const HEALTH_BODY: &str = r#"{"status":"ok","service":"catan-server"}"#;

/// Server state shared across all connections.
pub struct ServerState {
    /// All rooms, keyed by room code.
    pub rooms: DashMap<String, Room>,
    /// Player id -> room code.
    pub player_rooms: DashMap<Uuid, String>,
    /// Player id -> outbox for their connection.
    pub senders: DashMap<Uuid, mpsc::UnboundedSender<ServerMessage>>,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            player_rooms: DashMap::new(),
            senders: DashMap::new(),
        }
    }

    /// Queue a message for one player; best-effort, a closed outbox is
    /// ignored.
    pub fn send_to_player(&self, player_id: Uuid, msg: ServerMessage) {
        if let Some(sender) = self.senders.get(&player_id) {
            let _ = sender.send(msg);
        }
    }

    /// Queue a message for every seat in a room.
    pub fn broadcast_to_room(&self, room_id: &str, msg: ServerMessage) {
        if let Some(room) = self.rooms.get(room_id) {
            for seat in &room.seats {
                self.send_to_player(seat.player_id, msg.clone());
            }
        }
    }

    pub fn broadcast_to_room_except(&self, room_id: &str, except: Uuid, msg: ServerMessage) {
        if let Some(room) = self.rooms.get(room_id) {
            for seat in &room.seats {
                if seat.player_id != except {
                    self.send_to_player(seat.player_id, msg.clone());
                }
            }
        }
    }

    /// Rooms still accepting players.
    pub fn joinable_rooms(&self) -> Vec<RoomInfo> {
        self.rooms
            .iter()
            .filter(|r| r.status == RoomStatus::Waiting)
            .map(|r| r.to_info())
            .collect()
    }

    fn fresh_room_code(&self) -> String {
        loop {
            let code = new_room_code();
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the listener. WebSocket upgrades get the game protocol; plain HTTP
/// requests get the health response.
pub async fn run_server(addr: SocketAddr, state: Arc<ServerState>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("catan-server listening on {}", addr);

    while let Ok((stream, peer_addr)) = listener.accept().await {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, state).await {
                error!("connection error from {}: {}", peer_addr, e);
            }
        });
    }

    Ok(())
}

/// Peek the request preamble to tell a WebSocket upgrade from a plain HTTP
/// probe (health checks, load balancers).
async fn is_websocket_upgrade(stream: &TcpStream) -> anyhow::Result<bool> {
    let mut buf = [0u8; 2048];
    // Headers can arrive split; peek again until the blank line shows up.
    for _ in 0..8 {
        let n = stream.peek(&mut buf).await?;
        let preamble = String::from_utf8_lossy(&buf[..n]).to_ascii_lowercase();
        if preamble.contains("\r\n\r\n") || n == buf.len() {
            return Ok(preamble.contains("upgrade: websocket"));
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    Ok(false)
}

async fn serve_health(mut stream: TcpStream) -> anyhow::Result<()> {
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        HEALTH_BODY.len(),
        HEALTH_BODY
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Handle a single connection for its whole lifetime.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<ServerState>,
) -> anyhow::Result<()> {
    if !is_websocket_upgrade(&stream).await? {
        return serve_health(stream).await;
    }

    let ws_stream = accept_async(stream).await?;
    info!("new WebSocket connection from {}", addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Identity starts as a fresh id and may be swapped by RECONNECT.
    let mut player_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    state.senders.insert(player_id, tx);

    // Forward the outbox to the socket; per-recipient order is the channel
    // order, and a dead socket just ends the task.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(text) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => handle_message(&mut player_id, client_msg, &state),
                Err(e) => {
                    warn!("bad frame from {}: {}", player_id, e);
                    let message = if e.to_string().contains("unknown variant") {
                        "Unknown message type"
                    } else {
                        "Invalid message format"
                    };
                    state.send_to_player(
                        player_id,
                        ServerMessage::Error {
                            message: message.into(),
                        },
                    );
                }
            },
            Ok(Message::Close(_)) => {
                info!("client {} closed the connection", player_id);
                break;
            }
            Err(e) => {
                error!("WebSocket error from {}: {}", player_id, e);
                break;
            }
            _ => {}
        }
    }

    handle_disconnect(player_id, &state);
    state.senders.remove(&player_id);
    send_task.abort();

    info!("connection closed for {}", player_id);
    Ok(())
}

/// Handle one inbound frame. `player_id` is mutable because RECONNECT
/// rebinds the connection to an existing seat.
fn handle_message(player_id: &mut Uuid, msg: ClientMessage, state: &Arc<ServerState>) {
    match msg {
        ClientMessage::CreateRoom { player_name } => {
            let code = state.fresh_room_code();
            let room = Room::new(code.clone(), player_name);
            let seat = room.seats[0].clone();
            let room_info = room.to_info();

            // The creator's connection adopts the seat's player id.
            rebind_sender(state, player_id, seat.player_id);
            state.rooms.insert(code.clone(), room);
            state.player_rooms.insert(seat.player_id, code.clone());

            state.send_to_player(
                seat.player_id,
                ServerMessage::RoomCreated {
                    room_id: code,
                    player_id: seat.player_id,
                    token: seat.token,
                },
            );
            state.send_to_player(seat.player_id, ServerMessage::RoomUpdate { room_info });
        }

        ClientMessage::JoinRoom {
            room_id,
            player_name,
        } => {
            let Some(mut room) = state.rooms.get_mut(&room_id) else {
                state.send_to_player(
                    *player_id,
                    ServerMessage::Error {
                        message: "Failed to join room: room not found".into(),
                    },
                );
                return;
            };
            match room.join(player_name) {
                Ok(seat) => {
                    let seat = seat.clone();
                    let room_info = room.to_info();
                    drop(room);

                    rebind_sender(state, player_id, seat.player_id);
                    state.player_rooms.insert(seat.player_id, room_id.clone());

                    state.send_to_player(
                        seat.player_id,
                        ServerMessage::RoomJoined {
                            player_id: seat.player_id,
                            token: seat.token,
                            room_info: room_info.clone(),
                        },
                    );
                    state.broadcast_to_room_except(
                        &room_id,
                        seat.player_id,
                        ServerMessage::RoomUpdate { room_info },
                    );
                }
                Err(e) => {
                    drop(room);
                    state.send_to_player(
                        *player_id,
                        ServerMessage::Error {
                            message: e.to_string(),
                        },
                    );
                }
            }
        }

        ClientMessage::LeaveRoom => {
            let Some((_, room_id)) = state.player_rooms.remove(player_id) else {
                state.send_to_player(
                    *player_id,
                    ServerMessage::Error {
                        message: "Not in a room".into(),
                    },
                );
                return;
            };
            leave_room(state, *player_id, &room_id);
            state.send_to_player(*player_id, ServerMessage::RoomLeft);
        }

        ClientMessage::StartGame => {
            let Some(room_id) = state.player_rooms.get(player_id).map(|r| r.value().clone()) else {
                state.send_to_player(
                    *player_id,
                    ServerMessage::Error {
                        message: "Not in a room".into(),
                    },
                );
                return;
            };
            let Some(mut room) = state.rooms.get_mut(&room_id) else {
                return;
            };
            match room.start(*player_id, rand::random()) {
                Ok(()) => {
                    let views = room.views();
                    let room_info = room.to_info();
                    drop(room);

                    for (recipient, view) in views {
                        state.send_to_player(
                            recipient,
                            ServerMessage::GameStarted { state: view },
                        );
                    }
                    state.broadcast_to_room(&room_id, ServerMessage::RoomUpdate { room_info });
                    info!("game started in room {}", room_id);
                }
                Err(e) => {
                    drop(room);
                    state.send_to_player(
                        *player_id,
                        ServerMessage::Error {
                            message: e.to_string(),
                        },
                    );
                }
            }
        }

        ClientMessage::GameAction { action } => {
            let Some(room_id) = state.player_rooms.get(player_id).map(|r| r.value().clone()) else {
                state.send_to_player(
                    *player_id,
                    ServerMessage::Error {
                        message: "Not in a room".into(),
                    },
                );
                return;
            };
            let Some(mut room) = state.rooms.get_mut(&room_id) else {
                return;
            };
            match room.apply_action(*player_id, &action) {
                Ok(events) => {
                    let views = room.views();
                    drop(room);

                    // Filtered state per recipient, then the event stream.
                    // Each recipient's outbox preserves this order.
                    for (recipient, view) in views {
                        state.send_to_player(recipient, ServerMessage::StateUpdate { state: view });
                    }
                    for event in events {
                        state.broadcast_to_room(&room_id, ServerMessage::GameEvent { event });
                    }
                }
                Err(RoomError::Rule(rejection)) => {
                    drop(room);
                    state.send_to_player(
                        *player_id,
                        ServerMessage::ActionRejected {
                            action,
                            reason: rejection.to_string(),
                        },
                    );
                }
                Err(e) => {
                    drop(room);
                    error!("action failed in room {}: {}", room_id, e);
                    state.send_to_player(
                        *player_id,
                        ServerMessage::Error {
                            message: e.to_string(),
                        },
                    );
                }
            }
        }

        ClientMessage::Reconnect { token } => {
            // Scan all rooms for the seat holding this token.
            let hit = state
                .rooms
                .iter()
                .find_map(|room| {
                    room.seat_by_token(token)
                        .map(|seat| (room.id.clone(), seat.player_id))
                });
            let Some((room_id, seat_player)) = hit else {
                state.send_to_player(
                    *player_id,
                    ServerMessage::Error {
                        message: "Reconnection failed".into(),
                    },
                );
                return;
            };

            rebind_sender(state, player_id, seat_player);
            state.player_rooms.insert(seat_player, room_id.clone());

            let view = {
                let Some(mut room) = state.rooms.get_mut(&room_id) else {
                    return;
                };
                room.set_connected(seat_player, true);
                room.view_for(seat_player)
            };

            match view {
                Some(view) => {
                    state.send_to_player(seat_player, ServerMessage::Reconnected { state: view })
                }
                // Room still in the lobby: there is no game state yet.
                None => {
                    if let Some(room) = state.rooms.get(&room_id) {
                        let room_info = room.to_info();
                        drop(room);
                        state.send_to_player(seat_player, ServerMessage::RoomUpdate { room_info });
                    }
                }
            }
            state.broadcast_to_room_except(
                &room_id,
                seat_player,
                ServerMessage::PlayerReconnected {
                    player_id: seat_player,
                },
            );
            info!("player {} reconnected to room {}", seat_player, room_id);
        }

        ClientMessage::ListRooms => {
            let rooms = state.joinable_rooms();
            state.send_to_player(*player_id, ServerMessage::RoomList { rooms });
        }

        ClientMessage::Chat { message } => {
            let Some(room_id) = state.player_rooms.get(player_id).map(|r| r.value().clone()) else {
                state.send_to_player(
                    *player_id,
                    ServerMessage::Error {
                        message: "Not in a room".into(),
                    },
                );
                return;
            };
            let player_name = state
                .rooms
                .get(&room_id)
                .and_then(|r| r.seat_of(*player_id).map(|s| s.name.clone()))
                .unwrap_or_else(|| "Unknown".to_string());

            state.broadcast_to_room(
                &room_id,
                ServerMessage::ChatMessage {
                    player_id: *player_id,
                    player_name,
                    message,
                },
            );
        }
    }
}

/// Move the connection's outbox under a new player id.
fn rebind_sender(state: &Arc<ServerState>, player_id: &mut Uuid, new_id: Uuid) {
    if *player_id == new_id {
        return;
    }
    if let Some((_, tx)) = state.senders.remove(player_id) {
        state.senders.insert(new_id, tx);
    }
    *player_id = new_id;
}

/// Socket gone: mark the seat disconnected (in progress) or vacate it
/// (waiting). The engine state is untouched either way.
fn handle_disconnect(player_id: Uuid, state: &Arc<ServerState>) {
    let Some((_, room_id)) = state.player_rooms.remove(&player_id) else {
        return;
    };
    leave_room(state, player_id, &room_id);
}

fn leave_room(state: &Arc<ServerState>, player_id: Uuid, room_id: &str) {
    let Some(mut room) = state.rooms.get_mut(room_id) else {
        return;
    };
    match room.leave(player_id) {
        LeaveOutcome::Removed { room_empty: true } => {
            drop(room);
            state.rooms.remove(room_id);
            info!("room {} emptied and removed", room_id);
        }
        LeaveOutcome::Removed { room_empty: false } => {
            let room_info = room.to_info();
            drop(room);
            state.broadcast_to_room(room_id, ServerMessage::RoomUpdate { room_info });
        }
        LeaveOutcome::MarkedDisconnected => {
            let room_info = room.to_info();
            drop(room);
            state.broadcast_to_room_except(
                room_id,
                player_id,
                ServerMessage::PlayerDisconnected { player_id },
            );
            state.broadcast_to_room(room_id, ServerMessage::RoomUpdate { room_info });
        }
        LeaveOutcome::NotSeated => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_body_matches_contract() {
        let parsed: serde_json::Value = serde_json::from_str(HEALTH_BODY).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["service"], "catan-server");
    }

    #[test]
    fn joinable_rooms_excludes_started_games() {
        let state = ServerState::new();
        let mut open = Room::new("AAAAAA".into(), "Host".into());
        open.join("P2".into()).unwrap();

        let mut started = Room::new("BBBBBB".into(), "Host".into());
        started.join("P2".into()).unwrap();
        started.join("P3".into()).unwrap();
        let host = started.host;
        started.start(host, 1).unwrap();

        state.rooms.insert("AAAAAA".into(), open);
        state.rooms.insert("BBBBBB".into(), started);

        let listed = state.joinable_rooms();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].room_id, "AAAAAA");
    }

    #[test]
    fn fresh_room_codes_avoid_collisions() {
        let state = ServerState::new();
        let code = state.fresh_room_code();
        state
            .rooms
            .insert(code.clone(), Room::new(code.clone(), "Host".into()));
        let other = state.fresh_room_code();
        assert_ne!(code, other);
    }
}
