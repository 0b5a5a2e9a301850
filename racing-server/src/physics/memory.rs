//! Recording physics space. Keeps every configuration call so the
//! wheel/vehicle contract can be inspected without running a simulation.

use rapier3d::na::Vector3;
use snafu::{OptionExt, ensure};

use super::{
    DuplicateAxisErr, InvalidMassErr, InvalidScaleErr, Material, PhysicsError, PhysicsSpace,
    UndirectedAxisErr, UnknownAxisErr, UnknownBodyErr, UnknownJointErr, UnsupportedDirectionErr,
    principal_axis, v3,
};
use crate::assets::MeshRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JointId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AxisId(usize);

#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Sphere { name: String, scale: f32 },
    Cuboid { name: String, half_extents: Vector3<f32> },
}

#[derive(Debug, Clone)]
pub struct BodyRecord {
    pub translation: Vector3<f32>,
    pub primitives: Vec<Primitive>,
    pub geometry_generated: bool,
    pub meshes: Vec<MeshRef>,
    pub mass: Option<f32>,
    pub material: Material,
    pub visual_scale: f32,
}

#[derive(Debug, Clone)]
pub struct JointRecord {
    pub first: BodyId,
    pub second: BodyId,
    pub anchor: Vector3<f32>,
    pub axes: Vec<AxisId>,
}

#[derive(Debug, Clone)]
pub struct AxisRecord {
    pub joint: JointId,
    pub direction: Option<Vector3<f32>>,
    pub relative_to_second: bool,
    pub available_acceleration: f32,
    pub desired_velocity: f32,
    pub position_minimum: f32,
    pub position_maximum: f32,
}

#[derive(Debug, Default)]
pub struct MemorySpace {
    bodies: Vec<Option<BodyRecord>>,
    joints: Vec<Option<JointRecord>>,
    axes: Vec<Option<AxisRecord>>,
}

impl MemorySpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(&self, body: BodyId) -> Option<&BodyRecord> {
        self.bodies.get(body.0)?.as_ref()
    }

    pub fn joint(&self, joint: JointId) -> Option<&JointRecord> {
        self.joints.get(joint.0)?.as_ref()
    }

    pub fn axis(&self, axis: AxisId) -> Option<&AxisRecord> {
        self.axes.get(axis.0)?.as_ref()
    }

    /// Joints that have `body` as one of their two ends.
    pub fn joints_of(&self, body: BodyId) -> Vec<JointId> {
        self.joints
            .iter()
            .enumerate()
            .filter_map(|(i, j)| j.as_ref().map(|j| (i, j)))
            .filter(|(_, j)| j.first == body || j.second == body)
            .map(|(i, _)| JointId(i))
            .collect()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.iter().flatten().count()
    }

    /// Teleports a body. Joint anchors are left untouched.
    pub fn set_body_translation(&mut self, body: BodyId, translation: Vector3<f32>) -> Result<(), PhysicsError> {
        self.body_mut(body)?.translation = translation;
        Ok(())
    }

    fn body_mut(&mut self, body: BodyId) -> Result<&mut BodyRecord, PhysicsError> {
        self.bodies
            .get_mut(body.0)
            .and_then(Option::as_mut)
            .context(UnknownBodyErr { body: format!("{body:?}") })
    }

    fn joint_mut(&mut self, joint: JointId) -> Result<&mut JointRecord, PhysicsError> {
        self.joints
            .get_mut(joint.0)
            .and_then(Option::as_mut)
            .context(UnknownJointErr { joint: format!("{joint:?}") })
    }

    fn axis_mut(&mut self, axis: AxisId) -> Result<&mut AxisRecord, PhysicsError> {
        self.axes
            .get_mut(axis.0)
            .and_then(Option::as_mut)
            .context(UnknownAxisErr { axis: format!("{axis:?}") })
    }

    fn directed_axis_mut(&mut self, axis: AxisId) -> Result<&mut AxisRecord, PhysicsError> {
        let record = self.axis_mut(axis)?;
        ensure!(record.direction.is_some(), UndirectedAxisErr { axis: format!("{axis:?}") });
        Ok(record)
    }
}

impl PhysicsSpace for MemorySpace {
    type Body = BodyId;
    type Joint = JointId;
    type Axis = AxisId;

    fn body_translation(&self, body: BodyId) -> Result<Vector3<f32>, PhysicsError> {
        self.body(body)
            .map(|b| b.translation)
            .context(UnknownBodyErr { body: format!("{body:?}") })
    }

    fn create_dynamic_body(&mut self, translation: Vector3<f32>) -> BodyId {
        self.bodies.push(Some(BodyRecord {
            translation,
            primitives: Vec::new(),
            geometry_generated: false,
            meshes: Vec::new(),
            mass: None,
            material: Material::Default,
            visual_scale: 1.0,
        }));
        BodyId(self.bodies.len() - 1)
    }

    fn remove_body(&mut self, body: BodyId) -> Result<(), PhysicsError> {
        self.body_mut(body)?;
        for joint in self.joints_of(body) {
            if let Some(record) = self.joints[joint.0].take() {
                for axis in record.axes {
                    self.axes[axis.0] = None;
                }
            }
        }
        self.bodies[body.0] = None;
        Ok(())
    }

    fn attach_sphere(&mut self, body: BodyId, name: &str, scale: f32) -> Result<(), PhysicsError> {
        ensure!(scale > 0.0, InvalidScaleErr { scale });
        self.body_mut(body)?.primitives.push(Primitive::Sphere {
            name: name.to_string(),
            scale,
        });
        Ok(())
    }

    fn attach_box(&mut self, body: BodyId, name: &str, half_extents: Vector3<f32>) -> Result<(), PhysicsError> {
        let smallest = half_extents.min();
        ensure!(smallest > 0.0, InvalidScaleErr { scale: smallest });
        self.body_mut(body)?.primitives.push(Primitive::Cuboid {
            name: name.to_string(),
            half_extents,
        });
        Ok(())
    }

    fn generate_physics_geometry(&mut self, body: BodyId) -> Result<(), PhysicsError> {
        self.body_mut(body)?.geometry_generated = true;
        Ok(())
    }

    fn attach_mesh(&mut self, body: BodyId, mesh: MeshRef) -> Result<(), PhysicsError> {
        self.body_mut(body)?.meshes.push(mesh);
        Ok(())
    }

    fn set_mass(&mut self, body: BodyId, mass: f32) -> Result<(), PhysicsError> {
        ensure!(mass > 0.0, InvalidMassErr { mass });
        self.body_mut(body)?.mass = Some(mass);
        Ok(())
    }

    fn set_material(&mut self, body: BodyId, material: Material) -> Result<(), PhysicsError> {
        self.body_mut(body)?.material = material;
        Ok(())
    }

    fn set_visual_scale(&mut self, body: BodyId, scale: f32) -> Result<(), PhysicsError> {
        ensure!(scale > 0.0, InvalidScaleErr { scale });
        self.body_mut(body)?.visual_scale = scale;
        Ok(())
    }

    fn create_joint(&mut self, first: BodyId, second: BodyId) -> Result<JointId, PhysicsError> {
        self.body_mut(first)?;
        self.body_mut(second)?;
        self.joints.push(Some(JointRecord {
            first,
            second,
            anchor: Vector3::zeros(),
            axes: Vec::new(),
        }));
        Ok(JointId(self.joints.len() - 1))
    }

    fn set_joint_anchor(&mut self, joint: JointId, anchor: Vector3<f32>) -> Result<(), PhysicsError> {
        self.joint_mut(joint)?.anchor = anchor;
        Ok(())
    }

    fn create_rotational_axis(&mut self, joint: JointId) -> Result<AxisId, PhysicsError> {
        self.joint_mut(joint)?;
        self.axes.push(Some(AxisRecord {
            joint,
            direction: None,
            relative_to_second: false,
            available_acceleration: 0.0,
            desired_velocity: 0.0,
            position_minimum: f32::NEG_INFINITY,
            position_maximum: f32::INFINITY,
        }));
        let axis = AxisId(self.axes.len() - 1);
        self.joint_mut(joint)?.axes.push(axis);
        Ok(axis)
    }

    fn set_axis_direction(&mut self, axis: AxisId, direction: Vector3<f32>) -> Result<(), PhysicsError> {
        let slot = principal_axis(direction).context(UnsupportedDirectionErr { direction: v3(direction) })?;
        let joint = self.axis_mut(axis)?.joint;

        let taken = self
            .joint(joint)
            .map(|j| j.axes.as_slice())
            .unwrap_or_default()
            .iter()
            .filter(|&&other| other != axis)
            .filter_map(|&other| self.axis(other)?.direction)
            .any(|d| principal_axis(d) == Some(slot));
        ensure!(
            !taken,
            DuplicateAxisErr {
                joint: format!("{joint:?}"),
                direction: v3(direction),
            }
        );

        self.axis_mut(axis)?.direction = Some(direction);
        Ok(())
    }

    fn set_relative_to_second(&mut self, axis: AxisId, relative: bool) -> Result<(), PhysicsError> {
        self.directed_axis_mut(axis)?.relative_to_second = relative;
        Ok(())
    }

    fn set_available_acceleration(&mut self, axis: AxisId, acceleration: f32) -> Result<(), PhysicsError> {
        self.directed_axis_mut(axis)?.available_acceleration = acceleration;
        Ok(())
    }

    fn set_desired_velocity(&mut self, axis: AxisId, velocity: f32) -> Result<(), PhysicsError> {
        self.directed_axis_mut(axis)?.desired_velocity = velocity;
        Ok(())
    }

    fn set_position_minimum(&mut self, axis: AxisId, min: f32) -> Result<(), PhysicsError> {
        self.directed_axis_mut(axis)?.position_minimum = min;
        Ok(())
    }

    fn set_position_maximum(&mut self, axis: AxisId, max: f32) -> Result<(), PhysicsError> {
        self.directed_axis_mut(axis)?.position_maximum = max;
        Ok(())
    }
}
