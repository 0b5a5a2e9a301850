//! Authoritative toy-racing server: rapier-simulated cars whose wheels are
//! jointed tire bodies driven through traction and steer axes.

pub mod assets;
pub mod net;
pub mod physics;
pub mod settings;
pub mod state;
pub mod vehicle;
pub mod wheel;

pub use assets::{MeshRef, ModelLibrary};
pub use physics::{Material, MemorySpace, PhysicsError, PhysicsSpace, PhysicsWorld};
pub use vehicle::{ControlInput, Vehicle, VehicleConfig, WheelId};
pub use wheel::{Wheel, WheelConfig, WheelError, WheelSide};
