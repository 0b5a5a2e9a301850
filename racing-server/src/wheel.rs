//! A single vehicle wheel: a sphere-shaped tire body hung off the chassis
//! by a joint with a steer axis and a traction axis.
//!
//! The wheel only configures engine objects and forwards commands to them;
//! the solver does the actual driving.

use std::fmt;

use log::{debug, warn};
use rapier3d::na::Vector3;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::assets::{AssetError, MeshRef, ModelLibrary};
use crate::physics::{Material, PhysicsError, PhysicsSpace};

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)))]
#[snafu(visibility(pub))]
pub enum WheelError {
    #[snafu(display("Unknown wheel side selector {value}"))]
    InvalidSide { value: u8 },

    #[snafu(display("Failed to load the {side} wheel model"))]
    Model { side: WheelSide, source: AssetError },

    #[snafu(display("Wheel setup failed while {step}"))]
    Setup { step: &'static str, source: PhysicsError },
}

/// Which visual model a wheel uses. Physics is identical for both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WheelSide {
    Left,
    Right,
}

impl WheelSide {
    pub const LEFT_MODEL: &'static str = "obj/wheelLeftSide.obj";
    pub const RIGHT_MODEL: &'static str = "obj/wheelRightSide.obj";

    /// Model path relative to the models directory.
    pub fn model_path(&self) -> &'static str {
        match self {
            WheelSide::Left => Self::LEFT_MODEL,
            WheelSide::Right => Self::RIGHT_MODEL,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WheelSide::Left => "left",
            WheelSide::Right => "right",
        }
    }
}

impl fmt::Display for WheelSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Legacy integer selector: `0` is left, `1` is right.
impl TryFrom<u8> for WheelSide {
    type Error = WheelError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(WheelSide::Left),
            1 => Ok(WheelSide::Right),
            value => InvalidSideErr { value }.fail(),
        }
    }
}

/// Tuning for one wheel. Defaults are the stock toy-car values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelConfig {
    pub tire_scale: f32,             // sphere primitive scale
    pub wheel_scale: f32,            // overall body scale
    pub mass: f32,                   // kg
    pub traction_axis: [f32; 3],     // chassis local
    pub steer_axis: [f32; 3],        // chassis local
    pub traction_acceleration: f32,  // traction motor limit
    pub steer_acceleration: f32,     // steer motor limit
    pub max_steer_rotation: f32,     // radians
    pub material: Material,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            tire_scale: 2.0,
            wheel_scale: 0.5,
            mass: 5.0,
            traction_axis: [0.0, 0.0, 1.0],
            steer_axis: [0.0, 1.0, 0.0],
            traction_acceleration: 150.0,
            steer_acceleration: 30.0,
            max_steer_rotation: 0.3,
            material: Material::Rubber,
        }
    }
}

pub struct Wheel<S: PhysicsSpace> {
    body: S::Body,
    joint: S::Joint,
    traction_axis: S::Axis,
    steer_axis: S::Axis,
    side: WheelSide,
    mesh: MeshRef,
    max_steer_rotation: f32,
}

impl<S: PhysicsSpace> fmt::Debug for Wheel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wheel")
            .field("body", &self.body)
            .field("joint", &self.joint)
            .field("side", &self.side)
            .field("mesh", &self.mesh.resource())
            .finish()
    }
}

impl<S: PhysicsSpace> Wheel<S> {
    /// Builds the tire at `chassis position + offset` and hooks it to the
    /// chassis. The chassis is only read here; the wheel never holds on to it.
    pub fn new(
        space: &mut S,
        models: &mut ModelLibrary,
        chassis: S::Body,
        offset: Vector3<f32>,
        side: WheelSide,
        config: &WheelConfig,
    ) -> Result<Self, WheelError> {
        let mesh = models.load(side.model_path()).context(ModelErr { side })?;

        let base = space
            .body_translation(chassis)
            .context(SetupErr { step: "reading the chassis position" })?;
        let body = space.create_dynamic_body(base + offset);

        // A half-built tire is removed again, taking its joint with it.
        let rigged = Self::create_tire(space, body, mesh.clone(), config).and_then(|()| {
            let joint = Self::create_base_tire_joint(space, chassis, body)?;
            let steer_axis = Self::create_steer_axis(space, joint, config)?;
            let traction_axis = Self::create_traction_axis(space, joint, config)?;
            Ok((joint, steer_axis, traction_axis))
        });
        let (joint, steer_axis, traction_axis) = match rigged {
            Ok(parts) => parts,
            Err(e) => {
                if let Err(cleanup) = space.remove_body(body) {
                    warn!("Failed to remove tire {body:?} after a failed setup: {cleanup}");
                }
                return Err(e);
            }
        };

        debug!("Built {side} wheel {body:?} on chassis {chassis:?} at offset {offset:?}");
        Ok(Wheel {
            body,
            joint,
            traction_axis,
            steer_axis,
            side,
            mesh,
            max_steer_rotation: config.max_steer_rotation,
        })
    }

    fn create_tire(space: &mut S, body: S::Body, mesh: MeshRef, config: &WheelConfig) -> Result<(), WheelError> {
        space
            .attach_sphere(body, "tire", config.tire_scale)
            .context(SetupErr { step: "attaching the tire sphere" })?;
        space
            .generate_physics_geometry(body)
            .context(SetupErr { step: "generating tire geometry" })?;
        space
            .attach_mesh(body, mesh)
            .context(SetupErr { step: "attaching the wheel mesh" })?;
        space
            .set_mass(body, config.mass)
            .context(SetupErr { step: "setting the tire mass" })?;
        space
            .set_material(body, config.material)
            .context(SetupErr { step: "setting the tire material" })?;
        space
            .set_visual_scale(body, config.wheel_scale)
            .context(SetupErr { step: "scaling the wheel" })?;
        Ok(())
    }

    /// Anchor is the tire position relative to the chassis, captured once.
    fn create_base_tire_joint(space: &mut S, chassis: S::Body, tire: S::Body) -> Result<S::Joint, WheelError> {
        let joint = space
            .create_joint(chassis, tire)
            .context(SetupErr { step: "creating the chassis joint" })?;

        let chassis_pos = space
            .body_translation(chassis)
            .context(SetupErr { step: "reading the chassis position" })?;
        let tire_pos = space
            .body_translation(tire)
            .context(SetupErr { step: "reading the tire position" })?;
        space
            .set_joint_anchor(joint, tire_pos - chassis_pos)
            .context(SetupErr { step: "anchoring the chassis joint" })?;
        Ok(joint)
    }

    fn create_steer_axis(space: &mut S, joint: S::Joint, config: &WheelConfig) -> Result<S::Axis, WheelError> {
        let axis = space
            .create_rotational_axis(joint)
            .context(SetupErr { step: "creating the steer axis" })?;
        space
            .set_axis_direction(axis, Vector3::from(config.steer_axis))
            .context(SetupErr { step: "orienting the steer axis" })?;
        space
            .set_available_acceleration(axis, config.steer_acceleration)
            .context(SetupErr { step: "limiting steer acceleration" })?;
        Self::pin_straight(space, axis).context(SetupErr { step: "unsteering" })?;
        Ok(axis)
    }

    /// Traction turns about the tire's own axle, whatever the chassis does.
    fn create_traction_axis(space: &mut S, joint: S::Joint, config: &WheelConfig) -> Result<S::Axis, WheelError> {
        let axis = space
            .create_rotational_axis(joint)
            .context(SetupErr { step: "creating the traction axis" })?;
        space
            .set_axis_direction(axis, Vector3::from(config.traction_axis))
            .context(SetupErr { step: "orienting the traction axis" })?;
        space
            .set_relative_to_second(axis, true)
            .context(SetupErr { step: "binding traction to the tire" })?;
        space
            .set_available_acceleration(axis, config.traction_acceleration)
            .context(SetupErr { step: "limiting traction acceleration" })?;
        Ok(axis)
    }

    /// Drives the tire towards `velocity`. The value is not clamped; the
    /// traction acceleration decides how fast it is reached.
    pub fn accelerate(&self, space: &mut S, velocity: f32) -> Result<(), PhysicsError> {
        space.set_desired_velocity(self.traction_axis, velocity)
    }

    pub fn stop(&self, space: &mut S) -> Result<(), PhysicsError> {
        self.accelerate(space, 0.0)
    }

    /// Turns the wheel at `direction` within `[-max, max]`. Always reopens
    /// the steer range, even after `unsteer`.
    pub fn steer(&self, space: &mut S, direction: f32) -> Result<(), PhysicsError> {
        space.set_desired_velocity(self.steer_axis, direction)?;
        space.set_position_maximum(self.steer_axis, self.max_steer_rotation)?;
        space.set_position_minimum(self.steer_axis, -self.max_steer_rotation)
    }

    /// Pins the wheel straight: zero velocity and a `[0, 0]` range.
    pub fn unsteer(&self, space: &mut S) -> Result<(), PhysicsError> {
        Self::pin_straight(space, self.steer_axis)
    }

    fn pin_straight(space: &mut S, axis: S::Axis) -> Result<(), PhysicsError> {
        space.set_desired_velocity(axis, 0.0)?;
        space.set_position_maximum(axis, 0.0)?;
        space.set_position_minimum(axis, 0.0)
    }

    pub fn body(&self) -> S::Body {
        self.body
    }

    pub fn joint(&self) -> S::Joint {
        self.joint
    }

    pub fn traction_axis(&self) -> S::Axis {
        self.traction_axis
    }

    pub fn steer_axis(&self) -> S::Axis {
        self.steer_axis
    }

    pub fn side(&self) -> WheelSide {
        self.side
    }

    pub fn mesh(&self) -> &MeshRef {
        &self.mesh
    }

    /// Removes the tire body, and with it the chassis joint.
    pub fn destroy(self, space: &mut S) -> Result<(), PhysicsError> {
        space.remove_body(self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::MemorySpace;

    fn build(side: WheelSide) -> (MemorySpace, Wheel<MemorySpace>) {
        let mut space = MemorySpace::new();
        let mut models = ModelLibrary::new("models", false);
        let chassis = space.create_dynamic_body(Vector3::zeros());
        let wheel = Wheel::new(
            &mut space,
            &mut models,
            chassis,
            Vector3::new(1.0, 0.0, -1.0),
            side,
            &WheelConfig::default(),
        )
        .unwrap();
        (space, wheel)
    }

    #[test]
    fn side_selector_is_closed() {
        assert_eq!(WheelSide::try_from(0).unwrap(), WheelSide::Left);
        assert_eq!(WheelSide::try_from(1).unwrap(), WheelSide::Right);
        assert!(matches!(
            WheelSide::try_from(2),
            Err(WheelError::InvalidSide { value: 2 })
        ));
    }

    #[test]
    fn tire_body_is_configured() {
        let (space, wheel) = build(WheelSide::Right);
        let body = space.body(wheel.body()).unwrap();

        assert_eq!(body.mass, Some(5.0));
        assert_eq!(body.material, Material::Rubber);
        assert_eq!(body.visual_scale, 0.5);
        assert!(body.geometry_generated);
        assert_eq!(
            body.primitives,
            vec![crate::physics::memory::Primitive::Sphere {
                name: "tire".to_string(),
                scale: 2.0,
            }]
        );
        assert_eq!(body.meshes.len(), 1);
        assert_eq!(body.meshes[0].resource(), "obj/wheelRightSide.obj");
    }

    #[test]
    fn traction_is_relative_to_the_tire() {
        let (space, wheel) = build(WheelSide::Left);
        let traction = space.axis(wheel.traction_axis()).unwrap();
        let steer = space.axis(wheel.steer_axis()).unwrap();

        assert!(traction.relative_to_second);
        assert!(!steer.relative_to_second);
        assert_eq!(traction.direction, Some(Vector3::z()));
        assert_eq!(steer.direction, Some(Vector3::y()));
        assert_eq!(traction.available_acceleration, 150.0);
        assert_eq!(steer.available_acceleration, 30.0);
    }

    #[test]
    fn steer_reopens_range_after_unsteer() {
        let (mut space, wheel) = build(WheelSide::Left);
        wheel.steer(&mut space, 1.5).unwrap();
        wheel.unsteer(&mut space).unwrap();
        wheel.steer(&mut space, -0.7).unwrap();

        let steer = space.axis(wheel.steer_axis()).unwrap();
        assert_eq!(steer.desired_velocity, -0.7);
        assert_eq!(steer.position_minimum, -0.3);
        assert_eq!(steer.position_maximum, 0.3);
    }

    #[test]
    fn accelerate_is_not_clamped() {
        let (mut space, wheel) = build(WheelSide::Left);
        wheel.accelerate(&mut space, 10_000.0).unwrap();
        assert_eq!(space.axis(wheel.traction_axis()).unwrap().desired_velocity, 10_000.0);
    }

    #[test]
    fn failed_setup_removes_the_tire() {
        let mut space = MemorySpace::new();
        let mut models = ModelLibrary::new("models", false);
        let chassis = space.create_dynamic_body(Vector3::zeros());
        let config = WheelConfig {
            traction_axis: [0.0, 1.0, 0.0],
            ..WheelConfig::default()
        };

        let err = Wheel::new(&mut space, &mut models, chassis, Vector3::x(), WheelSide::Left, &config).unwrap_err();
        assert!(matches!(err, WheelError::Setup { step: "orienting the traction axis", .. }));
        assert_eq!(space.body_count(), 1);
        assert!(space.joints_of(chassis).is_empty());
    }

    #[test]
    fn destroy_removes_tire_and_joint() {
        let (mut space, wheel) = build(WheelSide::Left);
        let (body, joint) = (wheel.body(), wheel.joint());
        wheel.destroy(&mut space).unwrap();
        assert!(space.body(body).is_none());
        assert!(space.joint(joint).is_none());
    }
}
