// src/physics/rapier.rs

use std::collections::HashMap;

use log::{debug, info, warn};
use rapier3d::na::{UnitQuaternion, Vector3};
use rapier3d::prelude::*;
use snafu::{OptionExt, ensure};

use super::{
    DuplicateAxisErr, InvalidMassErr, InvalidScaleErr, Material, PhysicsError, PhysicsSpace,
    UndirectedAxisErr, UnknownAxisErr, UnknownBodyErr, UnknownJointErr, UnsupportedDirectionErr,
    principal_axis, v3,
};
use crate::assets::MeshRef;

const GROUP_GROUND: Group = Group::from_bits_truncate(0b0001);
const GROUP_VEHICLE: Group = Group::from_bits_truncate(0b0010);

/// Radius of an unscaled sphere primitive.
pub const SPHERE_RADIUS: Real = 0.5;

/// Bodies further than this from the origin are considered exploded.
const ARENA_LIMIT: Real = 1_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AxisHandle {
    pub joint: ImpulseJointHandle,
    pub index: usize,
}

#[derive(Debug, Clone)]
enum Shape {
    Sphere { scale: Real },
    Cuboid { half_extents: Vector<Real> },
}

#[derive(Debug, Clone)]
struct Primitive {
    name: String,
    shape: Shape,
    collider: Option<ColliderHandle>,
}

/// Per-body state rapier does not track itself.
#[derive(Debug, Clone)]
struct BodyExtras {
    primitives: Vec<Primitive>,
    meshes: Vec<MeshRef>,
    material: Material,
    visual_scale: Real,
    mass: Option<Real>,
}

impl Default for BodyExtras {
    fn default() -> Self {
        Self {
            primitives: Vec::new(),
            meshes: Vec::new(),
            material: Material::Default,
            visual_scale: 1.0,
            mass: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct AxisSlot {
    dof: Option<JointAxis>,
    relative_to_second: bool,
}

/// Snapshot view of one rotational axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisInfo {
    pub dof: JointAxis,
    pub relative_to_second: bool,
    pub target_velocity: Real,
    pub max_force: Real,
    pub limits: Option<[Real; 2]>,
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,               // gravity vector
    pub pipeline: PhysicsPipeline,           // physics pipeline
    pub island_manager: IslandManager,       // manages islands of bodies
    pub broad_phase: DefaultBroadPhase,      // broad-phase collision detection
    pub narrow_phase: NarrowPhase,           // collision detection
    pub bodies: RigidBodySet,                // for rigid bodies
    pub colliders: ColliderSet,              // for collision shapes
    pub joints: ImpulseJointSet,             // for constraints
    pub multibody_joints: MultibodyJointSet, // for articulated bodies
    pub ccd: CCDSolver,                      // continuous collision detection
    pub query_pipeline: QueryPipeline,       // for raycasting
    extras: HashMap<RigidBodyHandle, BodyExtras>,
    axes: HashMap<ImpulseJointHandle, Vec<AxisSlot>>,
    spawn_translations: HashMap<RigidBodyHandle, Vector<Real>>,
}

fn dof_for(index: usize) -> JointAxis {
    match index {
        0 => JointAxis::AngX,
        1 => JointAxis::AngY,
        _ => JointAxis::AngZ,
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsWorld {
    pub fn new() -> Self {
        let gravity = vector![0.0, -9.81, 0.0];

        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();

        // Big static ground box whose top surface sits exactly at y = 0.
        let ground_rb = RigidBodyBuilder::fixed()
            .translation(vector![0.0, -1.0, 0.0])
            .build();
        let ground_handle = bodies.insert(ground_rb);

        let ground_collider = ColliderBuilder::cuboid(500.0, 1.0, 500.0)
            .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_VEHICLE))
            .friction(1.0)
            .restitution(0.0)
            .build();
        colliders.insert_with_parent(ground_collider, ground_handle, &mut bodies);

        info!(
            "Ground inserted. Bodies = {}, Colliders = {}",
            bodies.len(),
            colliders.len()
        );

        Self {
            gravity,
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies,
            colliders,
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            extras: HashMap::new(),
            axes: HashMap::new(),
            spawn_translations: HashMap::new(),
        }
    }

    pub fn body_rotation(&self, body: RigidBodyHandle) -> Option<UnitQuaternion<Real>> {
        self.bodies.get(body).map(|b| *b.rotation())
    }

    pub fn meshes(&self, body: RigidBodyHandle) -> &[MeshRef] {
        self.extras
            .get(&body)
            .map(|e| e.meshes.as_slice())
            .unwrap_or_default()
    }

    pub fn axis_info(&self, axis: AxisHandle) -> Option<AxisInfo> {
        let slot = self.axes.get(&axis.joint)?.get(axis.index)?;
        let dof = slot.dof?;
        let joint = &self.joints.get(axis.joint)?.data;
        // Read the raw motor: the max force is set before the motor is enabled.
        let motor = &joint.motors[dof as usize];
        Some(AxisInfo {
            dof,
            relative_to_second: slot.relative_to_second,
            target_velocity: motor.target_vel,
            max_force: motor.max_force,
            limits: joint.limits(dof).map(|l| [l.min, l.max]),
        })
    }

    pub fn joint_anchor(&self, joint: ImpulseJointHandle) -> Option<Vector<Real>> {
        self.joints.get(joint).map(|j| j.data.local_anchor1().coords)
    }

    fn extras_mut(&mut self, body: RigidBodyHandle) -> Result<&mut BodyExtras, PhysicsError> {
        ensure!(self.bodies.contains(body), UnknownBodyErr { body: format!("{body:?}") });
        Ok(self.extras.entry(body).or_default())
    }

    fn joint_mut(&mut self, joint: ImpulseJointHandle) -> Result<&mut GenericJoint, PhysicsError> {
        self.joints
            .get_mut(joint)
            .map(|j| &mut j.data)
            .context(UnknownJointErr { joint: format!("{joint:?}") })
    }

    fn slot_mut(&mut self, axis: AxisHandle) -> Result<&mut AxisSlot, PhysicsError> {
        self.axes
            .get_mut(&axis.joint)
            .and_then(|slots| slots.get_mut(axis.index))
            .context(UnknownAxisErr { axis: format!("{axis:?}") })
    }

    /// Joint and DOF an axis drives; fails until the axis has a direction.
    fn driven(&mut self, axis: AxisHandle) -> Result<(&mut GenericJoint, JointAxis), PhysicsError> {
        let dof = self
            .slot_mut(axis)?
            .dof
            .context(UndirectedAxisErr { axis: format!("{axis:?}") })?;
        Ok((self.joint_mut(axis.joint)?, dof))
    }

    fn collider_radius(scale: Real, visual_scale: Real) -> Real {
        SPHERE_RADIUS * scale * visual_scale
    }

    /// Pushes the current shape, material and scale of a body onto its colliders.
    fn refresh_colliders(&mut self, body: RigidBodyHandle) {
        let Some(extras) = self.extras.get(&body) else {
            return;
        };
        for primitive in &extras.primitives {
            let Some(handle) = primitive.collider else {
                continue;
            };
            let Some(collider) = self.colliders.get_mut(handle) else {
                continue;
            };
            let shape = match primitive.shape {
                Shape::Sphere { scale } => {
                    SharedShape::ball(Self::collider_radius(scale, extras.visual_scale))
                }
                Shape::Cuboid { half_extents } => {
                    let h = half_extents * extras.visual_scale;
                    SharedShape::cuboid(h.x, h.y, h.z)
                }
            };
            collider.set_shape(shape);
            collider.set_friction(extras.material.friction());
            collider.set_restitution(extras.material.restitution());
        }
    }

    /// Spreads the body mass over its colliders so rapier derives inertia
    /// from the shapes. Without colliders the mass is carried by the body.
    fn apply_mass(&mut self, body: RigidBodyHandle) {
        let Some(extras) = self.extras.get(&body) else {
            return;
        };
        let Some(mass) = extras.mass else {
            return;
        };
        let colliders: Vec<ColliderHandle> = extras.primitives.iter().filter_map(|p| p.collider).collect();

        let body_share = if colliders.is_empty() { mass } else { 0.0 };
        if let Some(rb) = self.bodies.get_mut(body) {
            rb.set_additional_mass(body_share, true);
        }
        let share = mass / colliders.len().max(1) as Real;
        for handle in colliders {
            if let Some(collider) = self.colliders.get_mut(handle) {
                collider.set_mass(share);
            }
        }
    }

    pub fn step(&mut self, dt: Real) {
        self.pipeline.step(
            &self.gravity,
            &IntegrationParameters {
                dt,
                ..IntegrationParameters::default()
            },
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );

        // Prevent bodies from exploding to insane coordinates
        for (handle, body) in self.bodies.iter_mut() {
            let pos = *body.translation();
            let bad = !pos.iter().all(|c| c.is_finite()) || pos.amax() > ARENA_LIMIT;
            if bad {
                let reset = self
                    .spawn_translations
                    .get(&handle)
                    .copied()
                    .unwrap_or_else(|| vector![0.0, 1.0, 0.0]);
                body.set_translation(reset, true);
                body.set_linvel(Vector::zeros(), true);
                body.set_angvel(Vector::zeros(), true);
                warn!("Reset exploding body {handle:?} back to {reset:?}");
            }
        }
    }
}

impl PhysicsSpace for PhysicsWorld {
    type Body = RigidBodyHandle;
    type Joint = ImpulseJointHandle;
    type Axis = AxisHandle;

    fn body_translation(&self, body: RigidBodyHandle) -> Result<Vector3<f32>, PhysicsError> {
        self.bodies
            .get(body)
            .map(|b| *b.translation())
            .context(UnknownBodyErr { body: format!("{body:?}") })
    }

    fn create_dynamic_body(&mut self, translation: Vector3<f32>) -> RigidBodyHandle {
        let rb = RigidBodyBuilder::dynamic()
            .translation(translation)
            .ccd_enabled(true)
            .build();
        let handle = self.bodies.insert(rb);
        self.extras.insert(handle, BodyExtras::default());
        self.spawn_translations.insert(handle, translation);
        handle
    }

    fn remove_body(&mut self, body: RigidBodyHandle) -> Result<(), PhysicsError> {
        let removed = self.bodies.remove(
            body,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            true,
        );
        ensure!(removed.is_some(), UnknownBodyErr { body: format!("{body:?}") });

        self.extras.remove(&body);
        self.spawn_translations.remove(&body);
        let joints = &self.joints;
        self.axes.retain(|handle, _| joints.contains(*handle));
        Ok(())
    }

    fn attach_sphere(&mut self, body: RigidBodyHandle, name: &str, scale: f32) -> Result<(), PhysicsError> {
        ensure!(scale > 0.0, InvalidScaleErr { scale });
        self.extras_mut(body)?.primitives.push(Primitive {
            name: name.to_string(),
            shape: Shape::Sphere { scale },
            collider: None,
        });
        Ok(())
    }

    fn attach_box(&mut self, body: RigidBodyHandle, name: &str, half_extents: Vector3<f32>) -> Result<(), PhysicsError> {
        let smallest = half_extents.min();
        ensure!(smallest > 0.0, InvalidScaleErr { scale: smallest });
        self.extras_mut(body)?.primitives.push(Primitive {
            name: name.to_string(),
            shape: Shape::Cuboid { half_extents },
            collider: None,
        });
        Ok(())
    }

    fn generate_physics_geometry(&mut self, body: RigidBodyHandle) -> Result<(), PhysicsError> {
        let extras = self.extras_mut(body)?;
        let visual_scale = extras.visual_scale;
        let material = extras.material;
        let pending: Vec<(usize, Shape)> = extras
            .primitives
            .iter()
            .enumerate()
            .filter(|(_, p)| p.collider.is_none())
            .map(|(i, p)| (i, p.shape.clone()))
            .collect();

        for (index, shape) in pending {
            let builder = match shape {
                Shape::Sphere { scale } => ColliderBuilder::ball(Self::collider_radius(scale, visual_scale)),
                Shape::Cuboid { half_extents } => {
                    let h = half_extents * visual_scale;
                    ColliderBuilder::cuboid(h.x, h.y, h.z)
                }
            };
            let collider = builder
                .friction(material.friction())
                .restitution(material.restitution())
                .collision_groups(InteractionGroups::new(GROUP_VEHICLE, GROUP_GROUND))
                .build();
            let handle = self.colliders.insert_with_parent(collider, body, &mut self.bodies);

            if let Some(primitive) = self
                .extras
                .get_mut(&body)
                .and_then(|e| e.primitives.get_mut(index))
            {
                debug!("Generated collider for primitive '{}' on {body:?}", primitive.name);
                primitive.collider = Some(handle);
            }
        }
        self.apply_mass(body);
        Ok(())
    }

    fn attach_mesh(&mut self, body: RigidBodyHandle, mesh: MeshRef) -> Result<(), PhysicsError> {
        self.extras_mut(body)?.meshes.push(mesh);
        Ok(())
    }

    fn set_mass(&mut self, body: RigidBodyHandle, mass: f32) -> Result<(), PhysicsError> {
        ensure!(mass > 0.0, InvalidMassErr { mass });
        self.extras_mut(body)?.mass = Some(mass);
        self.apply_mass(body);
        Ok(())
    }

    fn set_material(&mut self, body: RigidBodyHandle, material: Material) -> Result<(), PhysicsError> {
        self.extras_mut(body)?.material = material;
        self.refresh_colliders(body);
        Ok(())
    }

    fn set_visual_scale(&mut self, body: RigidBodyHandle, scale: f32) -> Result<(), PhysicsError> {
        ensure!(scale > 0.0, InvalidScaleErr { scale });
        self.extras_mut(body)?.visual_scale = scale;
        self.refresh_colliders(body);
        Ok(())
    }

    fn create_joint(&mut self, first: RigidBodyHandle, second: RigidBodyHandle) -> Result<ImpulseJointHandle, PhysicsError> {
        for body in [first, second] {
            ensure!(self.bodies.contains(body), UnknownBodyErr { body: format!("{body:?}") });
        }
        // Starts fully locked; rotational axes free one angular DOF each.
        let joint = GenericJointBuilder::new(JointAxesMask::LOCKED_FIXED_AXES)
            .contacts_enabled(false)
            .build();
        let handle = self.joints.insert(first, second, joint, true);
        self.axes.insert(handle, Vec::new());
        Ok(handle)
    }

    fn set_joint_anchor(&mut self, joint: ImpulseJointHandle, anchor: Vector3<f32>) -> Result<(), PhysicsError> {
        let data = self.joint_mut(joint)?;
        data.set_local_anchor1(Point::from(anchor));
        data.set_local_anchor2(Point::origin());
        Ok(())
    }

    fn create_rotational_axis(&mut self, joint: ImpulseJointHandle) -> Result<AxisHandle, PhysicsError> {
        let slots = self
            .axes
            .get_mut(&joint)
            .context(UnknownJointErr { joint: format!("{joint:?}") })?;
        slots.push(AxisSlot {
            dof: None,
            relative_to_second: false,
        });
        Ok(AxisHandle {
            joint,
            index: slots.len() - 1,
        })
    }

    fn set_axis_direction(&mut self, axis: AxisHandle, direction: Vector3<f32>) -> Result<(), PhysicsError> {
        let dof = principal_axis(direction)
            .map(dof_for)
            .context(UnsupportedDirectionErr { direction: v3(direction) })?;

        let previous = self.slot_mut(axis)?.dof;
        let data = self.joint_mut(axis.joint)?;
        let mask = JointAxesMask::from(dof);
        if previous.map(JointAxesMask::from) == Some(mask) {
            return Ok(());
        }
        ensure!(
            data.locked_axes.contains(mask),
            DuplicateAxisErr {
                joint: format!("{:?}", axis.joint),
                direction: v3(direction),
            }
        );
        if let Some(previous) = previous {
            data.locked_axes |= JointAxesMask::from(previous);
        }
        data.locked_axes.remove(mask);

        self.slot_mut(axis)?.dof = Some(dof);
        Ok(())
    }

    // The motor of a free DOF acts between the two joint frames, the
    // second of which is fixed to the second body; the flag is kept for
    // introspection.
    fn set_relative_to_second(&mut self, axis: AxisHandle, relative: bool) -> Result<(), PhysicsError> {
        let slot = self.slot_mut(axis)?;
        ensure!(slot.dof.is_some(), UndirectedAxisErr { axis: format!("{axis:?}") });
        slot.relative_to_second = relative;
        Ok(())
    }

    fn set_available_acceleration(&mut self, axis: AxisHandle, acceleration: f32) -> Result<(), PhysicsError> {
        let (data, dof) = self.driven(axis)?;
        // Engage the motor at its current target so the axis holds still until driven.
        let target = data.motors[dof as usize].target_vel;
        data.set_motor_velocity(dof, target, 1.0);
        data.set_motor_max_force(dof, acceleration);
        Ok(())
    }

    fn set_desired_velocity(&mut self, axis: AxisHandle, velocity: f32) -> Result<(), PhysicsError> {
        let (data, dof) = self.driven(axis)?;
        data.set_motor_velocity(dof, velocity, 1.0);
        Ok(())
    }

    fn set_position_minimum(&mut self, axis: AxisHandle, min: f32) -> Result<(), PhysicsError> {
        let (data, dof) = self.driven(axis)?;
        let max = data.limits(dof).map(|l| l.max).unwrap_or(Real::MAX);
        data.set_limits(dof, [min, max]);
        Ok(())
    }

    fn set_position_maximum(&mut self, axis: AxisHandle, max: f32) -> Result<(), PhysicsError> {
        let (data, dof) = self.driven(axis)?;
        let min = data.limits(dof).map(|l| l.min).unwrap_or(-Real::MAX);
        data.set_limits(dof, [min, max]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jointed_pair(world: &mut PhysicsWorld) -> (RigidBodyHandle, RigidBodyHandle, ImpulseJointHandle) {
        let a = world.create_dynamic_body(vector![0.0, 2.0, 0.0]);
        let b = world.create_dynamic_body(vector![1.0, 2.0, 0.0]);
        let joint = world.create_joint(a, b).unwrap();
        (a, b, joint)
    }

    #[test]
    fn directed_axis_unlocks_its_dof() {
        let mut world = PhysicsWorld::new();
        let (_, _, joint) = jointed_pair(&mut world);
        let axis = world.create_rotational_axis(joint).unwrap();
        world.set_axis_direction(axis, vector![0.0, 0.0, 1.0]).unwrap();

        let data = &world.joints.get(joint).unwrap().data;
        assert!(!data.locked_axes.contains(JointAxesMask::ANG_Z));
        assert!(data.locked_axes.contains(JointAxesMask::ANG_Y));
        assert!(data.locked_axes.contains(JointAxesMask::LIN_X));
    }

    #[test]
    fn limits_and_motor_land_on_the_joint() {
        let mut world = PhysicsWorld::new();
        let (_, _, joint) = jointed_pair(&mut world);
        let axis = world.create_rotational_axis(joint).unwrap();
        world.set_axis_direction(axis, vector![0.0, 1.0, 0.0]).unwrap();
        world.set_available_acceleration(axis, 30.0).unwrap();
        world.set_desired_velocity(axis, -2.0).unwrap();
        world.set_position_maximum(axis, 0.3).unwrap();
        world.set_position_minimum(axis, -0.3).unwrap();

        let info = world.axis_info(axis).unwrap();
        assert_eq!(info.dof, JointAxis::AngY);
        assert_eq!(info.target_velocity, -2.0);
        assert_eq!(info.max_force, 30.0);
        assert_eq!(info.limits, Some([-0.3, 0.3]));
    }

    #[test]
    fn generated_sphere_follows_visual_scale() {
        let mut world = PhysicsWorld::new();
        let body = world.create_dynamic_body(vector![0.0, 2.0, 0.0]);
        world.attach_sphere(body, "tire", 2.0).unwrap();
        world.generate_physics_geometry(body).unwrap();
        world.set_visual_scale(body, 0.5).unwrap();

        let collider = world.bodies[body].colliders()[0];
        let ball = world.colliders[collider].shape().as_ball().unwrap();
        assert!((ball.radius - SPHERE_RADIUS).abs() < 1e-6);
    }

    #[test]
    fn mass_is_spread_over_colliders() {
        let mut world = PhysicsWorld::new();
        let body = world.create_dynamic_body(vector![0.0, 2.0, 0.0]);
        world.attach_sphere(body, "tire", 2.0).unwrap();
        world.generate_physics_geometry(body).unwrap();
        world.set_mass(body, 5.0).unwrap();

        let collider = world.bodies[body].colliders()[0];
        assert!((world.colliders[collider].mass() - 5.0).abs() < 1e-4);
    }

    #[test]
    fn removing_a_body_forgets_its_axes() {
        let mut world = PhysicsWorld::new();
        let (_, b, joint) = jointed_pair(&mut world);
        let axis = world.create_rotational_axis(joint).unwrap();
        world.set_axis_direction(axis, vector![0.0, 0.0, 1.0]).unwrap();

        world.remove_body(b).unwrap();
        assert!(world.axis_info(axis).is_none());
        assert!(world.remove_body(b).is_err());
    }

    #[test]
    fn unknown_axis_is_reported() {
        let mut world = PhysicsWorld::new();
        let (_, _, joint) = jointed_pair(&mut world);
        let ghost = AxisHandle { joint, index: 7 };
        assert!(matches!(
            world.set_desired_velocity(ghost, 1.0),
            Err(PhysicsError::UnknownAxis { .. })
        ));
    }
}
