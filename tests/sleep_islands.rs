use detbox::dynamics::DistanceJointDef;
use detbox::prelude::*;

fn resting_box(world: &mut World, x: i32) -> BodyHandle {
    let body = world.create_body(&BodyDef::dynamic(FixedVec2::new(int(x), ratio(1, 2)))).unwrap();
    world
        .create_fixture(
            body,
            &FixtureDef::new(PolygonShape::new_box(ratio(1, 2), ratio(1, 2))).with_density(int(1)),
        )
        .unwrap();
    body
}

fn world_with_ground() -> World {
    let mut world = World::new(FixedVec2::from_int(0, -10));
    let ground = world.create_body(&BodyDef::fixed(FixedVec2::from_int(0, -1))).unwrap();
    world
        .create_fixture(ground, &FixtureDef::new(PolygonShape::new_box(int(30), int(1))))
        .unwrap();
    world
}

#[test]
fn test_insomniac_keeps_its_island_awake() {
    // 1. Setup: a joined pair where one body refuses to sleep, and a loner
    let mut world = world_with_ground();
    let insomniac = resting_box(&mut world, -4);
    world.body_mut(insomniac).unwrap().set_sleeping_allowed(false);
    let partner = resting_box(&mut world, -2);
    let loner = resting_box(&mut world, 6);

    let def = DistanceJointDef::new(
        (insomniac, world.body(insomniac).unwrap()),
        (partner, world.body(partner).unwrap()),
        FixedVec2::new(int(-4), ratio(1, 2)),
        FixedVec2::new(int(-2), ratio(1, 2)),
    );
    world.create_joint(def).unwrap();

    // 2. Run; the joined pair shares one sleep state every step
    for step in 0..240 {
        world.step(ratio(1, 60), 8, 3);
        let a = world.body(insomniac).unwrap().is_awake();
        let b = world.body(partner).unwrap().is_awake();
        assert_eq!(a, b, "island split its sleep state at step {}", step);
    }

    // 3. Pair awake, loner asleep with zeroed velocity
    assert!(world.body(insomniac).unwrap().is_awake());
    assert!(world.body(partner).unwrap().is_awake());
    let loner = world.body(loner).unwrap();
    assert!(!loner.is_awake());
    assert_eq!(loner.linear_velocity(), FixedVec2::ZERO);
    assert_eq!(loner.angular_velocity(), FixedNum::ZERO);
}

#[test]
fn test_disabling_sleep_world_wide() {
    let mut world = world_with_ground();
    world.allow_sleeping = false;
    let body = resting_box(&mut world, 0);

    for _ in 0..240 {
        world.step(ratio(1, 60), 8, 3);
    }
    assert!(world.body(body).unwrap().is_awake());
}

#[test]
fn test_sleeping_body_is_not_integrated() {
    let mut world = world_with_ground();
    let body = resting_box(&mut world, 0);
    for _ in 0..240 {
        world.step(ratio(1, 60), 8, 3);
    }
    assert!(!world.body(body).unwrap().is_awake());
    let before = world.body(body).unwrap().transform();

    // Without waking, a sleeping body ignores the force.
    world
        .body_mut(body)
        .unwrap()
        .apply_force_to_center(FixedVec2::from_int(100, 0), false);
    for _ in 0..10 {
        world.step(ratio(1, 60), 8, 3);
    }
    assert_eq!(world.body(body).unwrap().transform(), before);
}

#[test]
fn test_falling_body_wakes_sleeping_neighbour() {
    let mut world = world_with_ground();
    let sleeper = resting_box(&mut world, 0);
    for _ in 0..240 {
        world.step(ratio(1, 60), 8, 3);
    }
    assert!(!world.body(sleeper).unwrap().is_awake());

    // Drop a box on top of it.
    let falling = world.create_body(&BodyDef::dynamic(FixedVec2::from_int(0, 4))).unwrap();
    world
        .create_fixture(
            falling,
            &FixtureDef::new(PolygonShape::new_box(ratio(1, 2), ratio(1, 2))).with_density(int(1)),
        )
        .unwrap();

    let mut woke = false;
    for _ in 0..60 {
        world.step(ratio(1, 60), 8, 3);
        woke |= world.body(sleeper).unwrap().is_awake();
    }
    assert!(woke, "impact never woke the resting box");
}
