use detbox::dynamics::{
    linear_stiffness, DistanceJointDef, JointBase, FrictionJointDef, GearJointDef, JointKind, MotorJointDef, MouseJointDef,
    PrismaticJointDef, PulleyJointDef, RevoluteJointDef, WeldJointDef, WheelJointDef,
};
use detbox::fixed_math::FRAC_PI_4;
use detbox::prelude::*;

const DT: (i32, i32) = (1, 60);

fn step_n(world: &mut World, n: usize) {
    for _ in 0..n {
        world.step(ratio(DT.0, DT.1), 8, 3);
    }
}

fn f(v: FixedNum) -> f64 {
    v.to_num::<f64>()
}

fn ground(world: &mut World) -> BodyHandle {
    world.create_body(&BodyDef::fixed(FixedVec2::ZERO)).unwrap()
}

fn dynamic_box(world: &mut World, position: FixedVec2, hx: FixedNum, hy: FixedNum) -> BodyHandle {
    let body = world.create_body(&BodyDef::dynamic(position)).unwrap();
    world
        .create_fixture(body, &FixtureDef::new(PolygonShape::new_box(hx, hy)).with_density(int(1)))
        .unwrap();
    body
}

fn wheel(world: &mut World, position: FixedVec2) -> BodyHandle {
    let body = world.create_body(&BodyDef::dynamic(position)).unwrap();
    world
        .create_fixture(body, &FixtureDef::new(CircleShape::new(FixedVec2::ZERO, ratio(1, 2))).with_density(int(1)))
        .unwrap();
    body
}

#[test]
fn test_distance_joint_keeps_length() {
    let mut world = World::new(FixedVec2::from_int(0, -10));
    let g = ground(&mut world);
    let bob = dynamic_box(&mut world, FixedVec2::from_int(3, 6), ratio(1, 4), ratio(1, 4));

    let def = DistanceJointDef::new(
        (g, world.body(g).unwrap()),
        (bob, world.body(bob).unwrap()),
        FixedVec2::from_int(0, 10),
        FixedVec2::from_int(3, 6),
    );
    let joint = world.create_joint(def).unwrap();

    // Swing for three seconds, checking the rope every step.
    for _ in 0..180 {
        world.step(ratio(1, 60), 8, 3);
        let JointKind::Distance(distance) = world.joint(joint).unwrap().kind() else {
            panic!("expected distance joint");
        };
        let length = distance.current_length(world.body(g).unwrap(), world.body(bob).unwrap());
        assert!((f(length) - 5.0).abs() < 0.05, "rope length {}", length);
    }
    assert!(world.body(bob).unwrap().position().x < int(3), "bob should swing");
}

#[test]
fn test_revolute_limit_stops_swing() {
    let mut world = World::new(FixedVec2::from_int(0, -10));
    let g = ground(&mut world);
    let bar = dynamic_box(&mut world, FixedVec2::from_int(1, 0), int(1), ratio(1, 10));

    let mut def = RevoluteJointDef::new((g, world.body(g).unwrap()), (bar, world.body(bar).unwrap()), FixedVec2::ZERO);
    def.enable_limit = true;
    def.lower_angle = -FRAC_PI_4;
    def.upper_angle = FRAC_PI_4;
    let joint = world.create_joint(def).unwrap();

    step_n(&mut world, 120);

    let JointKind::Revolute(revolute) = world.joint(joint).unwrap().kind() else {
        panic!("expected revolute joint");
    };
    let angle = revolute.joint_angle(world.body(g).unwrap(), world.body(bar).unwrap());
    assert!((f(angle) + std::f64::consts::FRAC_PI_4).abs() < 0.05, "angle {}", angle);

    // Pinned at the anchor.
    let bar = world.body(bar).unwrap();
    let anchor = bar.world_point(FixedVec2::from_int(-1, 0));
    assert!(f(anchor.length()) < 0.01);
}

#[test]
fn test_revolute_motor_reaches_speed() {
    let mut world = World::new(FixedVec2::ZERO);
    let g = ground(&mut world);
    let w = wheel(&mut world, FixedVec2::ZERO);

    let mut def = RevoluteJointDef::new((g, world.body(g).unwrap()), (w, world.body(w).unwrap()), FixedVec2::ZERO);
    def.enable_motor = true;
    def.motor_speed = int(2);
    def.max_motor_torque = int(1000);
    let joint = world.create_joint(def).unwrap();

    step_n(&mut world, 60);
    assert!((f(world.body(w).unwrap().angular_velocity()) - 2.0).abs() < 0.01);

    // Reversing through the handle takes effect on the next step.
    if let JointKind::Revolute(revolute) = world.joint_mut(joint).unwrap().kind_mut() {
        revolute.set_motor_speed(int(-1));
    }
    step_n(&mut world, 30);
    assert!((f(world.body(w).unwrap().angular_velocity()) + 1.0).abs() < 0.01);
}

#[test]
fn test_prismatic_motor_runs_to_limit_along_axis() {
    let mut world = World::new(FixedVec2::from_int(0, -10));
    let g = ground(&mut world);
    let slider = dynamic_box(&mut world, FixedVec2::from_int(0, 5), ratio(1, 2), ratio(1, 2));

    let mut def = PrismaticJointDef::new(
        (g, world.body(g).unwrap()),
        (slider, world.body(slider).unwrap()),
        FixedVec2::from_int(0, 5),
        FixedVec2::from_int(1, 0),
    );
    def.enable_limit = true;
    def.lower_translation = int(-1);
    def.upper_translation = int(1);
    def.enable_motor = true;
    def.motor_speed = int(2);
    def.max_motor_force = int(1000);
    let joint = world.create_joint(def).unwrap();

    step_n(&mut world, 120);

    let JointKind::Prismatic(prismatic) = world.joint(joint).unwrap().kind() else {
        panic!("expected prismatic joint");
    };
    let translation = prismatic.joint_translation(world.body(g).unwrap(), world.body(slider).unwrap());
    assert!((f(translation) - 1.0).abs() < 0.02, "translation {}", translation);

    // Gravity is fully resisted off-axis.
    let body = world.body(slider).unwrap();
    assert!((f(body.position().y) - 5.0).abs() < 0.01);
    assert!(f(body.angle()).abs() < 0.01);
}

#[test]
fn test_pulley_conserves_rope_length() {
    let mut world = World::new(FixedVec2::from_int(0, -10));
    let heavy = world.create_body(&BodyDef::dynamic(FixedVec2::from_int(-2, 5))).unwrap();
    world
        .create_fixture(heavy, &FixtureDef::new(PolygonShape::new_box(ratio(1, 2), ratio(1, 2))).with_density(int(2)))
        .unwrap();
    let light = dynamic_box(&mut world, FixedVec2::from_int(2, 5), ratio(1, 2), ratio(1, 2));

    let pulley_ratio = ratio(3, 2);
    let def = PulleyJointDef::new(
        (heavy, world.body(heavy).unwrap()),
        (light, world.body(light).unwrap()),
        (FixedVec2::from_int(-2, 10), FixedVec2::from_int(2, 10)),
        (FixedVec2::from_int(-2, 5), FixedVec2::from_int(2, 5)),
        pulley_ratio,
    );
    let joint = world.create_joint(def).unwrap();

    step_n(&mut world, 60);

    let JointKind::Pulley(pulley) = world.joint(joint).unwrap().kind() else {
        panic!("expected pulley joint");
    };
    let length_a = pulley.current_length_a(world.body(heavy).unwrap());
    let length_b = pulley.current_length_b(world.body(light).unwrap());
    let total = f(length_a) + f(pulley_ratio) * f(length_b);
    assert!((total - 12.5).abs() < 0.05, "rope {}", total);
    assert!(world.body(heavy).unwrap().position().y < int(5), "heavy side should descend");
}

#[test]
fn test_pulley_rejects_non_positive_ratio() {
    let mut world = World::new(FixedVec2::ZERO);
    let a = dynamic_box(&mut world, FixedVec2::from_int(-2, 5), int(1), int(1));
    let b = dynamic_box(&mut world, FixedVec2::from_int(2, 5), int(1), int(1));
    let def = PulleyJointDef::new(
        (a, world.body(a).unwrap()),
        (b, world.body(b).unwrap()),
        (FixedVec2::from_int(-2, 10), FixedVec2::from_int(2, 10)),
        (FixedVec2::from_int(-2, 5), FixedVec2::from_int(2, 5)),
        FixedNum::ZERO,
    );
    assert!(matches!(
        world.create_joint(def),
        Err(PhysicsError::InvalidConfiguration { .. })
    ));
    assert_eq!(world.joint_count(), 0);
}

#[test]
fn test_mouse_joint_drags_to_target() {
    let mut world = World::new(FixedVec2::ZERO);
    let g = ground(&mut world);
    let body = dynamic_box(&mut world, FixedVec2::ZERO, ratio(1, 2), ratio(1, 2));

    let (stiffness, damping) = linear_stiffness(int(5), ratio(7, 10), world.body(g).unwrap(), world.body(body).unwrap());
    let def = MouseJointDef {
        base: JointBase { body_a: g, body_b: body, ..Default::default() },
        target: FixedVec2::ZERO,
        max_force: int(1000),
        stiffness,
        damping,
    };
    let joint = world.create_joint(def).unwrap();

    if let JointKind::Mouse(mouse) = world.joint_mut(joint).unwrap().kind_mut() {
        mouse.set_target(FixedVec2::from_int(3, 0));
    }
    step_n(&mut world, 120);

    let p = world.body(body).unwrap().position();
    assert!((f(p.x) - 3.0).abs() < 0.05, "x = {}", p.x);
    assert!(f(p.y).abs() < 0.05);
}

#[test]
fn test_weld_holds_relative_pose() {
    let mut world = World::new(FixedVec2::from_int(0, -10));
    let a = dynamic_box(&mut world, FixedVec2::from_int(0, 10), ratio(1, 2), ratio(1, 2));
    let b = dynamic_box(&mut world, FixedVec2::from_int(2, 10), ratio(1, 2), ratio(1, 2));

    let def = WeldJointDef::new((a, world.body(a).unwrap()), (b, world.body(b).unwrap()), FixedVec2::from_int(1, 10));
    world.create_joint(def).unwrap();
    world.body_mut(a).unwrap().set_angular_velocity(int(10));

    step_n(&mut world, 60);

    let body_a = world.body(a).unwrap();
    let body_b = world.body(b).unwrap();
    let offset = body_b.position() - body_a.position();
    assert!((f(offset.length()) - 2.0).abs() < 0.02, "separation {}", offset.length());
    assert!(f(body_b.angle() - body_a.angle()).abs() < 0.02);
    // The pair spins as one piece.
    assert!(f(body_a.angle()).abs() > 0.3);
}

#[test]
fn test_friction_joint_brings_body_to_rest() {
    let mut world = World::new(FixedVec2::ZERO);
    let g = ground(&mut world);
    let mut def = BodyDef::dynamic(FixedVec2::ZERO);
    def.linear_velocity = FixedVec2::from_int(5, 0);
    def.angular_velocity = int(3);
    let body = world.create_body(&def).unwrap();
    world
        .create_fixture(body, &FixtureDef::new(PolygonShape::new_box(ratio(1, 2), ratio(1, 2))).with_density(int(1)))
        .unwrap();

    let mut friction = FrictionJointDef::new((g, world.body(g).unwrap()), (body, world.body(body).unwrap()), FixedVec2::ZERO);
    friction.max_force = int(10);
    friction.max_torque = int(10);
    world.create_joint(friction).unwrap();

    // Decelerates at 10 m/s^2: still moving after a third of a second.
    step_n(&mut world, 20);
    assert!(world.body(body).unwrap().linear_velocity().x > FixedNum::ZERO);
    step_n(&mut world, 60);
    let body = world.body(body).unwrap();
    assert!(f(body.linear_velocity().length()) < 0.01);
    assert!(f(body.angular_velocity()).abs() < 0.01);
}

#[test]
fn test_gear_couples_two_wheels() {
    let mut world = World::new(FixedVec2::ZERO);
    let g = ground(&mut world);
    let w1 = wheel(&mut world, FixedVec2::ZERO);
    let w2 = wheel(&mut world, FixedVec2::from_int(3, 0));

    let j1 = world
        .create_joint(RevoluteJointDef::new((g, world.body(g).unwrap()), (w1, world.body(w1).unwrap()), FixedVec2::ZERO))
        .unwrap();
    let j2 = world
        .create_joint(RevoluteJointDef::new(
            (g, world.body(g).unwrap()),
            (w2, world.body(w2).unwrap()),
            FixedVec2::from_int(3, 0),
        ))
        .unwrap();
    let gear = world.create_joint(GearJointDef::new(j1, j2, int(2))).unwrap();

    world.body_mut(w1).unwrap().set_angular_velocity(int(4));
    step_n(&mut world, 60);

    let a1 = f(world.body(w1).unwrap().angle());
    let a2 = f(world.body(w2).unwrap().angle());
    assert!(a1.abs() > 0.5, "driver wheel barely turned: {}", a1);
    assert!((a1 + 2.0 * a2).abs() < 0.02, "gear slipped: {} + 2 * {}", a1, a2);

    // Removing a coupled joint takes the gear with it.
    assert_eq!(world.joint_count(), 3);
    world.destroy_joint(j1).unwrap();
    assert!(world.joint(gear).is_none());
    assert_eq!(world.joint_count(), 1);
}

#[test]
fn test_gear_requires_revolute_or_prismatic() {
    let mut world = World::new(FixedVec2::ZERO);
    let g = ground(&mut world);
    let a = wheel(&mut world, FixedVec2::ZERO);
    let b = wheel(&mut world, FixedVec2::from_int(3, 0));

    let weld = world
        .create_joint(WeldJointDef::new((g, world.body(g).unwrap()), (a, world.body(a).unwrap()), FixedVec2::ZERO))
        .unwrap();
    let hinge = world
        .create_joint(RevoluteJointDef::new((g, world.body(g).unwrap()), (b, world.body(b).unwrap()), FixedVec2::from_int(3, 0)))
        .unwrap();
    assert!(world.create_joint(GearJointDef::new(weld, hinge, int(1))).is_err());
}

#[test]
fn test_wheel_spring_sags_and_motor_spins() {
    let mut world = World::new(FixedVec2::from_int(0, -10));
    let g = ground(&mut world);
    let w = wheel(&mut world, FixedVec2::ZERO);

    let mut def = WheelJointDef::new(
        (g, world.body(g).unwrap()),
        (w, world.body(w).unwrap()),
        FixedVec2::ZERO,
        FixedVec2::from_int(0, 1),
    );
    let (stiffness, damping) = linear_stiffness(int(4), ratio(7, 10), world.body(g).unwrap(), world.body(w).unwrap());
    def.stiffness = stiffness;
    def.damping = damping;
    def.enable_motor = true;
    def.motor_speed = int(3);
    def.max_motor_torque = int(100);
    let joint = world.create_joint(def).unwrap();

    step_n(&mut world, 180);

    // Static sag is g / omega^2 for a spring tuned to 4 Hz.
    let omega = 2.0 * std::f64::consts::PI * 4.0;
    let expected = -10.0 / (omega * omega);
    let JointKind::Wheel(wheel_joint) = world.joint(joint).unwrap().kind() else {
        panic!("expected wheel joint");
    };
    let translation = f(wheel_joint.joint_translation(world.body(g).unwrap(), world.body(w).unwrap()));
    assert!((translation - expected).abs() < 0.005, "sag {} vs {}", translation, expected);

    let body = world.body(w).unwrap();
    assert!((f(body.angular_velocity()) - 3.0).abs() < 0.05);
    assert!(f(body.position().x).abs() < 0.01);
}

#[test]
fn test_motor_joint_reaches_offset() {
    let mut world = World::new(FixedVec2::ZERO);
    let g = ground(&mut world);
    let body = dynamic_box(&mut world, FixedVec2::ZERO, ratio(1, 2), ratio(1, 2));

    let mut def = MotorJointDef::new((g, world.body(g).unwrap()), (body, world.body(body).unwrap()));
    def.max_force = int(1000);
    def.max_torque = int(1000);
    let joint = world.create_joint(def).unwrap();

    if let JointKind::Motor(motor) = world.joint_mut(joint).unwrap().kind_mut() {
        motor.set_linear_offset(FixedVec2::from_int(2, 1));
        motor.set_angular_offset(ratio(1, 2));
    }
    step_n(&mut world, 180);

    let body = world.body(body).unwrap();
    assert!((f(body.position().x) - 2.0).abs() < 0.05);
    assert!((f(body.position().y) - 1.0).abs() < 0.05);
    assert!((f(body.angle()) - 0.5).abs() < 0.05);
}

#[test]
fn test_joint_on_single_body_rejected() {
    let mut world = World::new(FixedVec2::ZERO);
    let body = dynamic_box(&mut world, FixedVec2::ZERO, int(1), int(1));
    let def = RevoluteJointDef::new((body, world.body(body).unwrap()), (body, world.body(body).unwrap()), FixedVec2::ZERO);
    assert_eq!(world.create_joint(def), Err(PhysicsError::SameBody));
}

#[test]
fn test_joined_bodies_skip_collision_unless_asked() {
    let mut world = World::new(FixedVec2::ZERO);
    let a = dynamic_box(&mut world, FixedVec2::ZERO, int(1), int(1));
    let b = dynamic_box(&mut world, FixedVec2::new(ratio(3, 2), FixedNum::ZERO), int(1), int(1));

    world.step(ratio(1, 60), 8, 3);
    assert_eq!(world.contact_count(), 1);

    let def = RevoluteJointDef::new((a, world.body(a).unwrap()), (b, world.body(b).unwrap()), FixedVec2::new(ratio(3, 4), FixedNum::ZERO));
    world.create_joint(def).unwrap();
    world.step(ratio(1, 60), 8, 3);
    assert_eq!(world.contact_count(), 0);
}
