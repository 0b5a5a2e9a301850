use std::fmt;

use log::{debug, info, warn};
use rapier3d::na::Vector3;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::assets::ModelLibrary;
use crate::physics::{Material, PhysicsError, PhysicsSpace};
use crate::wheel::{Wheel, WheelConfig, WheelError, WheelSide};

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)))]
#[snafu(visibility(pub))]
pub enum VehicleError {
    #[snafu(display("Failed to build the chassis"))]
    Chassis { source: PhysicsError },

    #[snafu(display("Failed to build wheel {corner}"))]
    BuildWheel { corner: WheelId, source: WheelError },

    #[snafu(display("Wheel {corner} rejected a command"))]
    Command { corner: WheelId, source: PhysicsError },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum WheelId {
    FL,
    FR,
    RL,
    RR,
}

impl WheelId {
    pub fn as_str(&self) -> &'static str {
        match self {
            WheelId::FL => "FL",
            WheelId::FR => "FR",
            WheelId::RL => "RL",
            WheelId::RR => "RR",
        }
    }

    pub fn is_front(&self) -> bool {
        matches!(self, WheelId::FL | WheelId::FR)
    }

    pub fn side(&self) -> WheelSide {
        match self {
            WheelId::FL | WheelId::RL => WheelSide::Left,
            WheelId::FR | WheelId::RR => WheelSide::Right,
        }
    }
}

impl fmt::Display for WheelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WheelPlacement {
    pub corner: WheelId,
    pub offset: [f32; 3], // chassis local
    pub side: WheelSide,
    pub drive: bool,      // takes throttle
    pub steer: bool,      // takes steering
}

impl WheelPlacement {
    fn at(corner: WheelId, offset: [f32; 3]) -> Self {
        Self {
            corner,
            offset,
            side: corner.side(),
            drive: !corner.is_front(),
            steer: corner.is_front(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub chassis_half_extents: [f32; 3], // [hx, hy, hz] meters
    pub chassis_mass: f32,              // kg
    pub spawn_height: f32,              // chassis y at spawn
    pub max_wheel_speed: f32,           // rad/s at full throttle
    pub steer_speed: f32,               // rad/s at full lock
    pub dead_zone: f32,                 // |input| below this counts as zero
    pub wheels: Vec<WheelPlacement>,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            chassis_half_extents: [1.6, 0.25, 1.0],
            chassis_mass: 40.0,
            spawn_height: 1.5,
            max_wheel_speed: 30.0,
            steer_speed: 2.0,
            dead_zone: 0.05,
            // Nose along -X, axles along Z: positive spin about local Z rolls
            // the car forward, and +Z is on the driver's left.
            wheels: vec![
                WheelPlacement::at(WheelId::FL, [-1.2, -0.3, 1.2]),
                WheelPlacement::at(WheelId::FR, [-1.2, -0.3, -1.2]),
                WheelPlacement::at(WheelId::RL, [1.2, -0.3, 1.2]),
                WheelPlacement::at(WheelId::RR, [1.2, -0.3, -1.2]),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlInput {
    pub throttle: f32, // -1..1
    pub steer: f32,    // -1..1
}

/// Command last sent to a group of wheels, so repeated inputs stay off the solver.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Drive {
    Idle,
    Target(f32),
}

#[derive(Debug)]
pub struct VehicleWheel<S: PhysicsSpace> {
    pub placement: WheelPlacement,
    pub wheel: Wheel<S>,
}

#[derive(Debug)]
pub struct Vehicle<S: PhysicsSpace> {
    pub body: S::Body, // the chassis body
    pub wheels: Vec<VehicleWheel<S>>,
    max_wheel_speed: f32,
    steer_speed: f32,
    dead_zone: f32,
    traction: Drive,
    steering: Drive,
}

impl<S: PhysicsSpace> Vehicle<S> {
    /// Builds the chassis and its wheels. On failure everything created so
    /// far is removed again.
    pub fn spawn(
        space: &mut S,
        models: &mut ModelLibrary,
        position: [f32; 2],
        config: &VehicleConfig,
        wheel_config: &WheelConfig,
    ) -> Result<Self, VehicleError> {
        let [x, z] = position;
        let body = space.create_dynamic_body(Vector3::new(x, config.spawn_height, z));
        let wheels = match Self::build(space, models, body, config, wheel_config) {
            Ok(wheels) => wheels,
            Err(e) => {
                if let Err(cleanup) = space.remove_body(body) {
                    warn!("Failed to remove chassis {body:?} after a failed spawn: {cleanup}");
                }
                return Err(e);
            }
        };

        info!("Spawned vehicle {body:?} with {} wheels at {position:?}", wheels.len());
        Ok(Self {
            body,
            wheels,
            max_wheel_speed: config.max_wheel_speed,
            steer_speed: config.steer_speed,
            dead_zone: config.dead_zone,
            traction: Drive::Idle,
            steering: Drive::Idle,
        })
    }

    fn build(
        space: &mut S,
        models: &mut ModelLibrary,
        body: S::Body,
        config: &VehicleConfig,
        wheel_config: &WheelConfig,
    ) -> Result<Vec<VehicleWheel<S>>, VehicleError> {
        space
            .attach_box(body, "chassis", Vector3::from(config.chassis_half_extents))
            .context(ChassisErr)?;
        space.generate_physics_geometry(body).context(ChassisErr)?;
        space.set_mass(body, config.chassis_mass).context(ChassisErr)?;
        space.set_material(body, Material::Wood).context(ChassisErr)?;

        let mut wheels: Vec<VehicleWheel<S>> = Vec::with_capacity(config.wheels.len());
        for placement in &config.wheels {
            let built = Wheel::new(
                space,
                models,
                body,
                Vector3::from(placement.offset),
                placement.side,
                wheel_config,
            );
            match built {
                Ok(wheel) => wheels.push(VehicleWheel {
                    placement: placement.clone(),
                    wheel,
                }),
                Err(source) => {
                    for vw in wheels {
                        let corner = vw.placement.corner;
                        if let Err(cleanup) = vw.wheel.destroy(space) {
                            warn!("Failed to remove wheel {corner} after a failed spawn: {cleanup}");
                        }
                    }
                    return Err(source).context(BuildWheelErr {
                        corner: placement.corner,
                    });
                }
            }
        }
        Ok(wheels)
    }

    fn drive_for(&self, value: f32, scale: f32) -> Drive {
        let value = value.clamp(-1.0, 1.0);
        if value.abs() < self.dead_zone {
            Drive::Idle
        } else {
            Drive::Target(value * scale)
        }
    }

    /// Maps driver input onto the wheels: throttle on driven wheels,
    /// steering on steered ones.
    pub fn apply_input(&mut self, space: &mut S, input: ControlInput) -> Result<(), VehicleError> {
        let traction = self.drive_for(input.throttle, self.max_wheel_speed);
        if traction != self.traction {
            for vw in self.wheels.iter().filter(|vw| vw.placement.drive) {
                let result = match traction {
                    Drive::Idle => vw.wheel.stop(space),
                    Drive::Target(v) => vw.wheel.accelerate(space, v),
                };
                result.context(CommandErr {
                    corner: vw.placement.corner,
                })?;
            }
            debug!("Vehicle {:?} traction {:?}", self.body, traction);
            self.traction = traction;
        }

        let steering = self.drive_for(input.steer, self.steer_speed);
        if steering != self.steering {
            for vw in self.wheels.iter().filter(|vw| vw.placement.steer) {
                let result = match steering {
                    Drive::Idle => vw.wheel.unsteer(space),
                    Drive::Target(d) => vw.wheel.steer(space, d),
                };
                result.context(CommandErr {
                    corner: vw.placement.corner,
                })?;
            }
            debug!("Vehicle {:?} steering {:?}", self.body, steering);
            self.steering = steering;
        }
        Ok(())
    }

    /// Removes the wheels, then the chassis.
    pub fn despawn(self, space: &mut S) -> Result<(), PhysicsError> {
        for vw in self.wheels {
            vw.wheel.destroy(space)?;
        }
        space.remove_body(self.body)
    }
}
