//! Engine boundary: the handful of physics-space operations the wheel and
//! vehicle code relies on. `rapier` is the live backend, `memory` records
//! configuration calls without simulating anything.

pub mod memory;
pub mod rapier;

use std::fmt::Debug;

use rapier3d::na::Vector3;
use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::assets::MeshRef;

pub use memory::MemorySpace;
pub use rapier::PhysicsWorld;

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)))]
#[snafu(visibility(pub))]
pub enum PhysicsError {
    #[snafu(display("Unknown body handle {body}"))]
    UnknownBody { body: String },

    #[snafu(display("Unknown joint handle {joint}"))]
    UnknownJoint { joint: String },

    #[snafu(display("Unknown rotational axis {axis}"))]
    UnknownAxis { axis: String },

    #[snafu(display("Rotational axis {axis} has no direction yet"))]
    UndirectedAxis { axis: String },

    #[snafu(display("Axis direction {direction:?} is not a unit local axis"))]
    UnsupportedDirection { direction: [f32; 3] },

    #[snafu(display("Joint {joint} already rotates about {direction:?}"))]
    DuplicateAxis { joint: String, direction: [f32; 3] },

    #[snafu(display("Mass must be strictly positive, got {mass}"))]
    InvalidMass { mass: f32 },

    #[snafu(display("Scale must be strictly positive, got {scale}"))]
    InvalidScale { scale: f32 },
}

/// Surface material of a body. Only drives contact coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Material {
    #[default]
    Default,
    Rubber,
    Wood,
    Ice,
}

impl Material {
    pub fn friction(&self) -> f32 {
        match self {
            Material::Default => 0.5,
            Material::Rubber => 1.2,
            Material::Wood => 0.6,
            Material::Ice => 0.05,
        }
    }

    pub fn restitution(&self) -> f32 {
        match self {
            Material::Default => 0.1,
            Material::Rubber => 0.4,
            Material::Wood => 0.2,
            Material::Ice => 0.05,
        }
    }
}

/// Operations a physics/scene engine must provide to host wheels and vehicles.
///
/// Objects are addressed through `Copy` handles, the way rapier addresses
/// bodies and joints. A rotational axis is one angular degree of freedom of
/// a joint; it is inert until a direction has been set.
pub trait PhysicsSpace {
    type Body: Copy + Eq + Debug;
    type Joint: Copy + Eq + Debug;
    type Axis: Copy + Eq + Debug;

    fn body_translation(&self, body: Self::Body) -> Result<Vector3<f32>, PhysicsError>;
    fn create_dynamic_body(&mut self, translation: Vector3<f32>) -> Self::Body;
    fn remove_body(&mut self, body: Self::Body) -> Result<(), PhysicsError>;

    /// Records a sphere primitive. It only collides after `generate_physics_geometry`.
    fn attach_sphere(&mut self, body: Self::Body, name: &str, scale: f32) -> Result<(), PhysicsError>;
    /// Records a box primitive with the given half extents.
    fn attach_box(
        &mut self,
        body: Self::Body,
        name: &str,
        half_extents: Vector3<f32>,
    ) -> Result<(), PhysicsError>;
    fn generate_physics_geometry(&mut self, body: Self::Body) -> Result<(), PhysicsError>;
    fn attach_mesh(&mut self, body: Self::Body, mesh: MeshRef) -> Result<(), PhysicsError>;
    fn set_mass(&mut self, body: Self::Body, mass: f32) -> Result<(), PhysicsError>;
    fn set_material(&mut self, body: Self::Body, material: Material) -> Result<(), PhysicsError>;
    fn set_visual_scale(&mut self, body: Self::Body, scale: f32) -> Result<(), PhysicsError>;

    fn create_joint(&mut self, first: Self::Body, second: Self::Body) -> Result<Self::Joint, PhysicsError>;
    /// Anchor in the first body's local frame.
    fn set_joint_anchor(&mut self, joint: Self::Joint, anchor: Vector3<f32>) -> Result<(), PhysicsError>;
    fn create_rotational_axis(&mut self, joint: Self::Joint) -> Result<Self::Axis, PhysicsError>;

    fn set_axis_direction(&mut self, axis: Self::Axis, direction: Vector3<f32>) -> Result<(), PhysicsError>;
    fn set_relative_to_second(&mut self, axis: Self::Axis, relative: bool) -> Result<(), PhysicsError>;
    fn set_available_acceleration(&mut self, axis: Self::Axis, acceleration: f32) -> Result<(), PhysicsError>;
    fn set_desired_velocity(&mut self, axis: Self::Axis, velocity: f32) -> Result<(), PhysicsError>;
    fn set_position_minimum(&mut self, axis: Self::Axis, min: f32) -> Result<(), PhysicsError>;
    fn set_position_maximum(&mut self, axis: Self::Axis, max: f32) -> Result<(), PhysicsError>;
}

/// Local coordinate axis (0 = X, 1 = Y, 2 = Z) matching a unit direction of either sign.
pub(crate) fn principal_axis(direction: Vector3<f32>) -> Option<usize> {
    const EPS: f32 = 1e-4;
    if (direction.norm() - 1.0).abs() > EPS {
        return None;
    }
    (0..3).find(|&i| (direction[i].abs() - 1.0).abs() < EPS)
}

#[inline]
pub(crate) fn v3(v: Vector3<f32>) -> [f32; 3] {
    [v.x, v.y, v.z]
}
