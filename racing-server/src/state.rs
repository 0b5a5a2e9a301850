use std::collections::HashMap;

use log::warn;
use rapier3d::prelude::RigidBodyHandle;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::physics::{PhysicsSpace, PhysicsWorld};
use crate::vehicle::{ControlInput, Vehicle};
use crate::wheel::WheelSide;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Axes {
    pub throttle: f32,
    pub steer: f32,
}

impl From<Axes> for ControlInput {
    fn from(axes: Axes) -> Self {
        ControlInput {
            throttle: axes.throttle,
            steer: axes.steer,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityInput {
    pub tick: u64,
    pub axes: Axes,
}

pub struct Entity {
    pub id: String,
    pub slot: usize, // start-grid slot, held until the entity leaves
    pub vehicle: Vehicle<PhysicsWorld>,
    pub last_input: Option<EntityInput>,
}

#[derive(Debug, Serialize)]
pub struct WheelSnapshot {
    pub id: &'static str,
    pub side: WheelSide,
    pub mesh: String,
    pub position: [f32; 3],
    pub rotation: [f32; 4], // quaternion (x, y, z, w)
}

#[derive(Debug, Serialize)]
pub struct PlayerSnapshot {
    pub id: String,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub wheels: Vec<WheelSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    pub players: Vec<PlayerSnapshot>,
}

#[derive(Default)]
pub struct SharedGameState {
    pub tick: u64,
    pub clients: Vec<UnboundedSender<String>>,
    pub entities: HashMap<String, Entity>,
}

fn pose(world: &PhysicsWorld, body: RigidBodyHandle) -> Option<([f32; 3], [f32; 4])> {
    let t = world.body_translation(body).ok()?;
    let q = world.body_rotation(body)?.coords;
    Some(([t.x, t.y, t.z], [q.x, q.y, q.z, q.w]))
}

impl SharedGameState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_client(&mut self, tx: UnboundedSender<String>) {
        self.clients.push(tx);
    }

    /// Lowest start-grid slot no current entity holds.
    pub fn free_slot(&self) -> usize {
        (0..)
            .find(|n| self.entities.values().all(|e| e.slot != *n))
            .unwrap_or_default()
    }

    pub fn add_entity(&mut self, id: String, slot: usize, vehicle: Vehicle<PhysicsWorld>) {
        self.entities.insert(
            id.clone(),
            Entity {
                id,
                slot,
                vehicle,
                last_input: None,
            },
        );
    }

    pub fn remove_entity(&mut self, id: &str) -> Option<Vehicle<PhysicsWorld>> {
        self.entities.remove(id).map(|e| e.vehicle)
    }

    pub fn update_input(&mut self, id: &str, axes: Axes) {
        let tick = self.tick;
        if let Some(entity) = self.entities.get_mut(id) {
            entity.last_input = Some(EntityInput { tick, axes });
        }
    }

    /// Pushes every entity's latest input onto its wheels.
    pub fn apply_inputs(&mut self, world: &mut PhysicsWorld) {
        for entity in self.entities.values_mut() {
            let Some(input) = &entity.last_input else {
                continue;
            };
            if let Err(e) = entity.vehicle.apply_input(world, input.axes.into()) {
                warn!("Dropping input for {}: {e}", entity.id);
            }
        }
    }

    pub fn snapshot(&self, world: &PhysicsWorld) -> Snapshot {
        let mut players = Vec::with_capacity(self.entities.len());

        for entity in self.entities.values() {
            let Some((position, rotation)) = pose(world, entity.vehicle.body) else {
                continue;
            };
            let wheels = entity
                .vehicle
                .wheels
                .iter()
                .filter_map(|vw| {
                    let (position, rotation) = pose(world, vw.wheel.body())?;
                    Some(WheelSnapshot {
                        id: vw.placement.corner.as_str(),
                        side: vw.wheel.side(),
                        mesh: vw.wheel.mesh().resource().to_string(),
                        position,
                        rotation,
                    })
                })
                .collect();

            players.push(PlayerSnapshot {
                id: entity.id.clone(),
                position,
                rotation,
                wheels,
            });
        }

        Snapshot {
            tick: self.tick,
            players,
        }
    }

    /// Build and send a snapshot of all entities to all clients.
    pub fn broadcast_snapshot(&mut self, world: &PhysicsWorld) {
        let json = match serde_json::to_string(&self.snapshot(world)) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to encode snapshot: {e}");
                return;
            }
        };

        // Drop clients whose receiver is gone.
        self.clients.retain(|tx| tx.send(json.clone()).is_ok());
    }
}
