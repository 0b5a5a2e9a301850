use rapier3d::na::Vector3;
use racing_server::physics::memory::MemorySpace;
use racing_server::physics::PhysicsSpace;
use racing_server::{ModelLibrary, Wheel, WheelConfig, WheelError, WheelSide};

fn spawn_wheel(
    space: &mut MemorySpace,
    chassis_at: Vector3<f32>,
    offset: Vector3<f32>,
    side: WheelSide,
) -> Wheel<MemorySpace> {
    let mut models = ModelLibrary::new("data/models", false);
    let chassis = space.create_dynamic_body(chassis_at);
    Wheel::new(space, &mut models, chassis, offset, side, &WheelConfig::default()).unwrap()
}

#[test]
fn mesh_matches_side() {
    let mut space = MemorySpace::new();
    let left = spawn_wheel(&mut space, Vector3::zeros(), Vector3::x(), WheelSide::Left);
    let right = spawn_wheel(&mut space, Vector3::zeros(), -Vector3::x(), WheelSide::Right);

    assert_eq!(left.mesh().resource(), "obj/wheelLeftSide.obj");
    assert_eq!(right.mesh().resource(), "obj/wheelRightSide.obj");
    assert_eq!(
        space.body(left.body()).unwrap().meshes[0].resource(),
        "obj/wheelLeftSide.obj"
    );
}

#[test]
fn fresh_wheel_is_unsteered_and_idle() {
    let mut space = MemorySpace::new();
    let wheel = spawn_wheel(&mut space, Vector3::zeros(), Vector3::x(), WheelSide::Left);

    let steer = space.axis(wheel.steer_axis()).unwrap();
    let traction = space.axis(wheel.traction_axis()).unwrap();
    assert_eq!(steer.position_minimum, 0.0);
    assert_eq!(steer.position_maximum, 0.0);
    assert_eq!(steer.desired_velocity, 0.0);
    assert_eq!(traction.desired_velocity, 0.0);
}

#[test]
fn steer_opens_symmetric_range() {
    let mut space = MemorySpace::new();
    let wheel = spawn_wheel(&mut space, Vector3::zeros(), Vector3::x(), WheelSide::Left);

    for d in [-3.0, -0.1, 0.0, 0.25, 8.0] {
        wheel.steer(&mut space, d).unwrap();
        let steer = space.axis(wheel.steer_axis()).unwrap();
        assert_eq!(steer.desired_velocity, d);
        assert_eq!(steer.position_minimum, -0.3);
        assert_eq!(steer.position_maximum, 0.3);
    }
}

#[test]
fn unsteer_pins_straight_whatever_came_before() {
    let mut space = MemorySpace::new();
    let wheel = spawn_wheel(&mut space, Vector3::zeros(), Vector3::x(), WheelSide::Right);

    for d in [-5.0, 0.3, 12.0] {
        wheel.steer(&mut space, d).unwrap();
        wheel.unsteer(&mut space).unwrap();
        let steer = space.axis(wheel.steer_axis()).unwrap();
        assert_eq!(steer.desired_velocity, 0.0);
        assert_eq!(steer.position_minimum, 0.0);
        assert_eq!(steer.position_maximum, 0.0);
    }
}

#[test]
fn stop_after_accelerate_idles_traction() {
    let mut space = MemorySpace::new();
    let wheel = spawn_wheel(&mut space, Vector3::zeros(), Vector3::x(), WheelSide::Left);

    wheel.accelerate(&mut space, 42.0).unwrap();
    assert_eq!(space.axis(wheel.traction_axis()).unwrap().desired_velocity, 42.0);
    wheel.stop(&mut space).unwrap();
    assert_eq!(space.axis(wheel.traction_axis()).unwrap().desired_velocity, 0.0);
}

#[test]
fn anchor_is_captured_once() {
    let mut space = MemorySpace::new();
    let chassis_at = Vector3::new(3.0, 2.0, -4.0);
    let offset = Vector3::new(1.0, 0.0, -1.0);
    let wheel = spawn_wheel(&mut space, chassis_at, offset, WheelSide::Left);

    assert_eq!(space.body_translation(wheel.body()).unwrap(), chassis_at + offset);
    assert_eq!(space.joint(wheel.joint()).unwrap().anchor, offset);

    let chassis = space.joint(wheel.joint()).unwrap().first;
    space.set_body_translation(chassis, Vector3::new(50.0, 0.0, 0.0)).unwrap();
    space.set_body_translation(wheel.body(), Vector3::new(-7.0, 1.0, 9.0)).unwrap();
    assert_eq!(space.joint(wheel.joint()).unwrap().anchor, offset);
}

#[test]
fn origin_chassis_example() {
    let mut space = MemorySpace::new();
    let offset = Vector3::new(1.0, 0.0, -1.0);
    let wheel = spawn_wheel(&mut space, Vector3::zeros(), offset, WheelSide::Left);

    assert_eq!(space.body_translation(wheel.body()).unwrap(), offset);
    assert_eq!(wheel.mesh().resource(), "obj/wheelLeftSide.obj");
    assert_eq!(space.joint(wheel.joint()).unwrap().anchor, offset);
}

#[test]
fn joint_links_chassis_then_tire() {
    let mut space = MemorySpace::new();
    let wheel = spawn_wheel(&mut space, Vector3::zeros(), Vector3::x(), WheelSide::Left);
    let joint = space.joint(wheel.joint()).unwrap();

    assert_eq!(joint.second, wheel.body());
    assert_ne!(joint.first, wheel.body());
    assert_eq!(joint.axes, vec![wheel.steer_axis(), wheel.traction_axis()]);
}

#[test]
fn missing_chassis_fails_setup() {
    let mut space = MemorySpace::new();
    let mut models = ModelLibrary::new("data/models", false);
    let chassis = space.create_dynamic_body(Vector3::zeros());
    space.remove_body(chassis).unwrap();

    let err = Wheel::new(
        &mut space,
        &mut models,
        chassis,
        Vector3::x(),
        WheelSide::Left,
        &WheelConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, WheelError::Setup { .. }));
}

#[test]
fn missing_model_fails_before_touching_the_space() {
    let mut space = MemorySpace::new();
    let dir = std::env::temp_dir().join(format!("racing-empty-{}", uuid::Uuid::new_v4()));
    let mut models = ModelLibrary::new(dir, true);
    let chassis = space.create_dynamic_body(Vector3::zeros());

    let err = Wheel::new(
        &mut space,
        &mut models,
        chassis,
        Vector3::x(),
        WheelSide::Right,
        &WheelConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, WheelError::Model { side: WheelSide::Right, .. }));
    assert_eq!(space.body_count(), 1);
}

#[test]
fn tuned_config_flows_through() {
    let mut space = MemorySpace::new();
    let mut models = ModelLibrary::new("data/models", false);
    let chassis = space.create_dynamic_body(Vector3::zeros());
    let config = WheelConfig {
        mass: 9.0,
        max_steer_rotation: 0.5,
        traction_acceleration: 75.0,
        ..WheelConfig::default()
    };
    let wheel = Wheel::new(&mut space, &mut models, chassis, Vector3::x(), WheelSide::Left, &config).unwrap();
    wheel.steer(&mut space, 1.0).unwrap();

    assert_eq!(space.body(wheel.body()).unwrap().mass, Some(9.0));
    assert_eq!(space.axis(wheel.traction_axis()).unwrap().available_acceleration, 75.0);
    assert_eq!(space.axis(wheel.steer_axis()).unwrap().position_maximum, 0.5);
}

#[test]
fn diagonal_axis_is_rejected() {
    let mut space = MemorySpace::new();
    let mut models = ModelLibrary::new("data/models", false);
    let chassis = space.create_dynamic_body(Vector3::zeros());
    let config = WheelConfig {
        steer_axis: [0.0, 0.6, 0.8],
        ..WheelConfig::default()
    };
    let err = Wheel::new(&mut space, &mut models, chassis, Vector3::x(), WheelSide::Left, &config).unwrap_err();
    assert!(matches!(err, WheelError::Setup { step: "orienting the steer axis", .. }));
}
