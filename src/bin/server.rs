use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chaathan_server::config::{ServerArgs, ServerConfig};
use chaathan_server::constants::TICK_MS;
use chaathan_server::directory::RoomDirectory;
use chaathan_server::engine::{RoomSession, RoomSettings};
use chaathan_server::error::RoomError;
use chaathan_server::server_protocol::{parse_client_message, ParsedClientMessage};
use chaathan_server::server_utils::normalize_duration_ms;
use chaathan_server::types::{Difficulty, GameMode, Outbound, ServerEvent};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

const CLIENT_QUEUE_CAPACITY: usize = 256;

type SharedState = Arc<Mutex<ServerState>>;

#[derive(Clone)]
struct ClientContext {
    tx: mpsc::Sender<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

struct ServerState {
    clients: HashMap<String, ClientContext>,
    rooms: RoomDirectory,
    tick_tasks: HashMap<String, JoinHandle<()>>,
    default_duration_ms: u64,
}

impl ServerState {
    fn new(config: &ServerConfig) -> Self {
        Self {
            clients: HashMap::new(),
            rooms: RoomDirectory::new(config.max_rooms, config.default_duration_ms),
            tick_tasks: HashMap::new(),
            default_duration_ms: config.default_duration_ms,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config = ServerArgs::parse().into_config().inspect_err(|err| {
        error!(error = %err, "invalid configuration");
    })?;
    info!(
        port = config.port,
        max_rooms = config.max_rooms,
        default_duration_ms = config.default_duration_ms,
        "configuration loaded"
    );

    let state = Arc::new(Mutex::new(ServerState::new(&config)));
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/rooms", get(rooms_handler))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let app = match config.static_dir.as_ref() {
        Some(static_dir) => {
            info!(root = %static_dir.display(), "serving static files");
            let index_file = static_dir.join("index.html");
            app.fallback_service(
                ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
            )
        }
        None => {
            warn!("static file root not found; only /ws and /api are served");
            app
        }
    };

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .inspect_err(|err| error!(addr = %bind_addr, error = %err, "failed to bind"))?;
    info!(addr = %bind_addr, "listening");
    axum::serve(listener, app)
        .await
        .inspect_err(|err| error!(error = %err, "server runtime failed"))?;
    Ok(())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn rooms_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let guard = state.lock().await;
    Json(json!({ "rooms": guard.rooms.list_rooms() }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = make_id("conn");
    let (tx, mut rx) = mpsc::channel::<String>(CLIENT_QUEUE_CAPACITY);

    {
        let mut guard = state.lock().await;
        guard
            .clients
            .insert(client_id.clone(), ClientContext { tx: tx.clone() });
    }
    info!(client_id = %client_id, "client connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_client_message(&state, &client_id, raw.as_str()).await;
            }
            Message::Binary(raw) => match std::str::from_utf8(&raw) {
                Ok(text) => handle_client_message(&state, &client_id, text).await,
                Err(_) => send_error_to_client(&state, &client_id, "invalid utf8 message").await,
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    handle_disconnect(&state, &client_id).await;
    drop(tx);
    let _ = writer.await;
}

async fn handle_client_message(state: &SharedState, client_id: &str, raw: &str) {
    let Some(message) = parse_client_message(raw) else {
        debug!(client_id, "unparseable frame");
        send_error_to_client(state, client_id, "invalid message").await;
        return;
    };

    let mut guard = state.lock().await;
    let joined = match message {
        ParsedClientMessage::Join { name } => Some(guard.rooms.join(client_id, name.as_deref())),
        ParsedClientMessage::CreateRoom {
            name,
            duration_ms,
            difficulty,
            mode,
        } => {
            let settings =
                room_settings_from_request(duration_ms, difficulty, mode, guard.default_duration_ms);
            Some(guard.rooms.create_room(client_id, name.as_deref(), settings))
        }
        ParsedClientMessage::JoinRoom { name, room_id } => {
            Some(guard.rooms.join_room(client_id, name.as_deref(), &room_id))
        }
        ParsedClientMessage::ListRooms => {
            let rooms = guard.rooms.list_rooms();
            send_event(
                &mut guard,
                client_id,
                &ServerEvent::RoomList { rooms },
                QueuePolicy::DisconnectOnFull,
            );
            None
        }
        ParsedClientMessage::Ping { t } => {
            send_event(
                &mut guard,
                client_id,
                &ServerEvent::Pong { t },
                QueuePolicy::DisconnectOnFull,
            );
            None
        }
        intent => {
            let Some(room) = guard.rooms.session_for_mut(client_id) else {
                send_event(
                    &mut guard,
                    client_id,
                    &ServerEvent::Error {
                        message: "not in a room".to_string(),
                    },
                    QueuePolicy::DisconnectOnFull,
                );
                return;
            };
            apply_room_intent(room, client_id, intent);
            let room_id = room.id.clone();
            flush_room(&mut guard, state, &room_id);
            None
        }
    };

    match joined {
        Some(Ok(room_id)) => flush_room(&mut guard, state, &room_id),
        Some(Err(err)) => reject(&mut guard, client_id, &err),
        None => {}
    }
}

/// In-game intents. A rejected intent changes nothing; a rejected move
/// still sends the mover their server position.
fn apply_room_intent(room: &mut RoomSession, player_id: &str, intent: ParsedClientMessage) {
    let applied = match intent {
        ParsedClientMessage::Ready => room.mark_ready(player_id).is_some(),
        ParsedClientMessage::Move { x, y } => room.move_player(player_id, x, y).is_some(),
        ParsedClientMessage::LightLamp { lamp_id } => room.light_lamp(player_id, lamp_id).is_some(),
        ParsedClientMessage::RefuelAura { lamp_id } => {
            room.refuel_aura(player_id, lamp_id).is_some()
        }
        ParsedClientMessage::PickupItem => room.pickup_item(player_id).is_some(),
        ParsedClientMessage::DropItem => room.drop_item(player_id).is_some(),
        ParsedClientMessage::Flicker { lamp_id } => {
            room.flicker_lamp(player_id, lamp_id).is_some()
        }
        ParsedClientMessage::Extinguish { lamp_id } => {
            room.extinguish_lamp(player_id, lamp_id).is_some()
        }
        ParsedClientMessage::SealDoor { door_id } => room.seal_door(player_id, door_id).is_some(),
        ParsedClientMessage::Push { target_id } => {
            room.push_player(player_id, &target_id).is_some()
        }
        ParsedClientMessage::PickupSalt { salt_id } => {
            room.pickup_salt(player_id, salt_id).is_some()
        }
        ParsedClientMessage::UseSalt => room.use_salt(player_id).is_some(),
        ParsedClientMessage::Join { .. }
        | ParsedClientMessage::CreateRoom { .. }
        | ParsedClientMessage::JoinRoom { .. }
        | ParsedClientMessage::ListRooms
        | ParsedClientMessage::Ping { .. } => true,
    };
    if !applied {
        debug!(room_id = %room.id, player_id, "intent rejected");
    }
}

fn room_settings_from_request(
    duration_ms: Option<i64>,
    difficulty: Option<Difficulty>,
    mode: Option<GameMode>,
    default_duration_ms: u64,
) -> RoomSettings {
    RoomSettings::new(
        mode.unwrap_or(GameMode::Survival),
        difficulty.unwrap_or(Difficulty::Medium),
        normalize_duration_ms(duration_ms, default_duration_ms),
    )
}

fn reject(state: &mut ServerState, client_id: &str, err: &RoomError) {
    info!(client_id, error = %err, "room request rejected");
    send_event(
        state,
        client_id,
        &ServerEvent::Error {
            message: err.to_string(),
        },
        QueuePolicy::DisconnectOnFull,
    );
}

/// Routes a room's pending events and starts its tick task once it is playing.
fn flush_room(state: &mut ServerState, shared: &SharedState, room_id: &str) {
    let outbound = state.rooms.drain_room(room_id);
    deliver(state, outbound);
    ensure_tick_task(state, shared, room_id);
}

fn ensure_tick_task(state: &mut ServerState, shared: &SharedState, room_id: &str) {
    let playing = state
        .rooms
        .room_mut(room_id)
        .is_some_and(|room| room.is_playing());
    if !playing {
        return;
    }
    if state
        .tick_tasks
        .get(room_id)
        .is_some_and(|handle| !handle.is_finished())
    {
        return;
    }
    let handle = tokio::spawn(run_room_ticks(shared.clone(), room_id.to_string()));
    state.tick_tasks.insert(room_id.to_string(), handle);
    info!(room_id, "room tick started");
}

async fn run_room_ticks(state: SharedState, room_id: String) {
    let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;
    loop {
        interval.tick().await;
        let mut guard = state.lock().await;
        let Some(room) = guard.rooms.room_mut(&room_id) else {
            break;
        };
        room.step(TICK_MS);
        let still_playing = room.is_playing();
        let outbound = room.drain_outbox();
        deliver(&mut guard, outbound);
        if !still_playing {
            guard.tick_tasks.remove(&room_id);
            info!(room_id = %room_id, "room tick stopped");
            break;
        }
    }
}

fn queue_policy_for(event: &ServerEvent) -> QueuePolicy {
    if event.is_droppable() {
        QueuePolicy::DropOnFull
    } else {
        QueuePolicy::DisconnectOnFull
    }
}

/// Sends each event to its recipients in emission order.
fn deliver(state: &mut ServerState, outbound: Vec<Outbound>) {
    let mut failed_clients: Vec<String> = Vec::new();
    for Outbound { to, event } in outbound {
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, "failed to encode event");
                continue;
            }
        };
        let policy = queue_policy_for(&event);
        for client_id in to {
            let Some(client) = state.clients.get(&client_id) else {
                continue;
            };
            if client.tx.try_send(payload.clone()).is_err()
                && policy == QueuePolicy::DisconnectOnFull
                && !failed_clients.contains(&client_id)
            {
                failed_clients.push(client_id);
            }
        }
    }
    for client_id in failed_clients {
        warn!(client_id = %client_id, "client queue full, disconnecting");
        disconnect_client_internal(state, &client_id);
    }
}

fn send_event(state: &mut ServerState, client_id: &str, event: &ServerEvent, policy: QueuePolicy) {
    let send_failed = match (state.clients.get(client_id), serde_json::to_string(event)) {
        (Some(client), Ok(payload)) => client.tx.try_send(payload).is_err(),
        (_, Err(err)) => {
            error!(error = %err, "failed to encode event");
            false
        }
        (None, _) => false,
    };
    if send_failed && policy == QueuePolicy::DisconnectOnFull {
        disconnect_client_internal(state, client_id);
    }
}

async fn send_error_to_client(state: &SharedState, client_id: &str, message: &str) {
    let mut guard = state.lock().await;
    send_event(
        &mut guard,
        client_id,
        &ServerEvent::Error {
            message: message.to_string(),
        },
        QueuePolicy::DisconnectOnFull,
    );
}

async fn handle_disconnect(state: &SharedState, client_id: &str) {
    let mut guard = state.lock().await;
    disconnect_client_internal(&mut guard, client_id);
    info!(client_id, "client disconnected");
}

fn disconnect_client_internal(state: &mut ServerState, client_id: &str) {
    let was_connected = state.clients.remove(client_id).is_some();
    let Some(departure) = state.rooms.leave(client_id) else {
        return;
    };
    if departure.destroyed {
        if let Some(handle) = state.tick_tasks.remove(&departure.room_id) {
            handle.abort();
        }
    }
    debug!(
        client_id,
        room_id = %departure.room_id,
        destroyed = departure.destroyed,
        was_connected,
        "left room"
    );
    deliver(state, departure.outbound);
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_room_defaults_to_medium_survival() {
        let settings = room_settings_from_request(None, None, None, 300_000);
        assert_eq!(settings.mode, GameMode::Survival);
        assert_eq!(settings.difficulty, Difficulty::Medium);
        assert_eq!(settings.duration_ms, 300_000);
    }

    #[test]
    fn create_room_duration_is_clamped() {
        let settings = room_settings_from_request(
            Some(5_000),
            Some(Difficulty::Hard),
            Some(GameMode::Competitive),
            300_000,
        );
        assert_eq!(settings.duration_ms, 60_000);
        let settings = room_settings_from_request(Some(i64::MAX), None, None, 300_000);
        assert_eq!(settings.duration_ms, 3_600_000);
    }

    #[test]
    fn only_agent_snapshots_may_be_dropped() {
        assert_eq!(
            queue_policy_for(&ServerEvent::ChaathanUpdate { chaathans: vec![] }),
            QueuePolicy::DropOnFull
        );
        assert_eq!(
            queue_policy_for(&ServerEvent::RitualDisrupted),
            QueuePolicy::DisconnectOnFull
        );
    }

    #[test]
    fn ids_are_unique_and_prefixed() {
        let a = make_id("conn");
        let b = make_id("conn");
        assert_ne!(a, b);
        assert!(a.starts_with("conn_"));
    }

    #[test]
    fn leaving_a_shared_room_notifies_the_rest() {
        let config = ServerConfig {
            port: 0,
            static_dir: None,
            max_rooms: 2,
            default_duration_ms: 300_000,
        };
        let mut state = ServerState::new(&config);
        let (tx, mut rx) = mpsc::channel(8);
        state
            .clients
            .insert("conn_a".to_string(), ClientContext { tx });
        let room_id = state.rooms.join("conn_a", None).expect("join");
        state.rooms.join("conn_b", None).expect("join");
        let outbound = state.rooms.drain_room(&room_id);
        deliver(&mut state, outbound);
        while rx.try_recv().is_ok() {}

        disconnect_client_internal(&mut state, "conn_b");
        let payload = rx.try_recv().expect("player-left delivered");
        assert!(payload.contains("\"type\":\"player-left\""));
        assert_eq!(state.rooms.room_count(), 1);
    }
}
