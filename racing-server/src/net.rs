use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::accept_async;
use tungstenite::Message;
use uuid::Uuid;

use crate::assets::ModelLibrary;
use crate::physics::PhysicsWorld;
use crate::settings::Settings;
use crate::state::{Axes, SharedGameState};
use crate::vehicle::Vehicle;

/// Everything a client session needs. Locks are always taken in field order.
#[derive(Clone)]
pub struct ServerContext {
    pub state: Arc<Mutex<SharedGameState>>,
    pub physics: Arc<Mutex<PhysicsWorld>>,
    pub models: Arc<Mutex<ModelLibrary>>,
    pub settings: Arc<Settings>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Ping,
    Input {
        #[serde(default)]
        throttle: f32,
        #[serde(default)]
        steer: f32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Welcome { player_id: String },
    Pong,
}

impl ClientMessage {
    pub fn from_json(txt: &str) -> Option<Self> {
        serde_json::from_str(txt).ok()
    }
}

/// Grid position of start slot `n`: four abreast along Z, later rows
/// further back along +X.
pub fn spawn_slot(n: usize) -> [f32; 2] {
    let column = (n % 4) as f32;
    let row = (n / 4) as f32;
    [row * 6.0, column * 4.0 - 6.0]
}

pub async fn start_websocket_server(ctx: ServerContext) {
    let listener = match TcpListener::bind(&ctx.settings.bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {}: {e}", ctx.settings.bind_addr);
            return;
        }
    };
    info!("WebSocket listening on ws://{}", ctx.settings.bind_addr);

    loop {
        let raw = match listener.accept().await {
            Ok((raw, _)) => raw,
            Err(e) => {
                warn!("Accept failed: {e}");
                continue;
            }
        };
        tokio::spawn(handle_client(ctx.clone(), raw));
    }
}

async fn spawn_player(ctx: &ServerContext, tx: mpsc::UnboundedSender<String>) -> Option<String> {
    let mut game = ctx.state.lock().await;
    let mut phys = ctx.physics.lock().await;
    let mut models = ctx.models.lock().await;

    let slot = game.free_slot();
    let vehicle = match Vehicle::spawn(
        &mut *phys,
        &mut *models,
        spawn_slot(slot),
        &ctx.settings.vehicle,
        &ctx.settings.wheel,
    ) {
        Ok(v) => v,
        Err(e) => {
            error!("Failed to spawn vehicle: {e}");
            return None;
        }
    };

    let id = Uuid::new_v4().to_string();
    game.register_client(tx);
    game.add_entity(id.clone(), slot, vehicle);
    Some(id)
}

async fn handle_client(ctx: ServerContext, raw: TcpStream) {
    let ws = match accept_async(raw).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed: {e}");
            return;
        }
    };
    let (mut write, mut read) = ws.split();

    // Outgoing channel; the send loop ends when every sender is dropped.
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if write.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    let Some(player_id) = spawn_player(&ctx, tx.clone()).await else {
        return;
    };
    info!("Player connected: {player_id}");

    let welcome = ServerMessage::Welcome {
        player_id: player_id.clone(),
    };
    if let Ok(json) = serde_json::to_string(&welcome) {
        let _ = tx.send(json);
    }

    while let Some(msg) = read.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(_) => break,
        };
        if !msg.is_text() {
            continue;
        }
        let Ok(text) = msg.to_text() else {
            continue;
        };

        match ClientMessage::from_json(text) {
            Some(ClientMessage::Ping) => {
                if let Ok(json) = serde_json::to_string(&ServerMessage::Pong) {
                    let _ = tx.send(json);
                }
            }
            Some(ClientMessage::Input { throttle, steer }) => {
                let mut game = ctx.state.lock().await;
                game.update_input(&player_id, Axes { throttle, steer });
            }
            None => warn!("Ignoring malformed message from {player_id}"),
        }
    }

    info!("Player disconnected: {player_id}");
    let mut game = ctx.state.lock().await;
    let mut phys = ctx.physics.lock().await;
    if let Some(vehicle) = game.remove_entity(&player_id) {
        let chassis = vehicle.body;
        if let Err(e) = vehicle.despawn(&mut *phys) {
            warn!("Failed to despawn vehicle {chassis:?}: {e}");
        }
    }
}
