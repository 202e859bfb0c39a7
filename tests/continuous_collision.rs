use detbox::prelude::*;

const WALL_X: i32 = 5;

fn f(v: FixedNum) -> f64 {
    v.to_num::<f64>()
}

/// Thin wall, 0.2 thick, centered on `x = WALL_X`.
fn spawn_wall(world: &mut World, body_type: BodyType) -> BodyHandle {
    let mut def = BodyDef::fixed(FixedVec2::from_int(WALL_X, 0));
    def.body_type = body_type;
    let wall = world.create_body(&def).unwrap();
    world
        .create_fixture(
            wall,
            &FixtureDef::new(PolygonShape::new_box(ratio(1, 10), int(2))).with_density(int(1)),
        )
        .unwrap();
    wall
}

/// Ball of radius 0.25 at 300 m/s, about 5 m per step toward the wall.
fn spawn_ball(world: &mut World, bullet: bool) -> BodyHandle {
    let mut def = BodyDef::dynamic(FixedVec2::ZERO);
    def.linear_velocity = FixedVec2::from_int(300, 0);
    def.bullet = bullet;
    let ball = world.create_body(&def).unwrap();
    world
        .create_fixture(
            ball,
            &FixtureDef::new(CircleShape::new(FixedVec2::ZERO, ratio(1, 4))).with_density(int(1)),
        )
        .unwrap();
    ball
}

fn run(world: &mut World, steps: usize) {
    for _ in 0..steps {
        world.step(ratio(1, 60), 8, 3);
    }
}

#[test]
fn test_fast_ball_stops_at_static_wall() {
    // 1. Setup
    let mut world = World::new(FixedVec2::ZERO);
    spawn_wall(&mut world, BodyType::Static);
    let ball = spawn_ball(&mut world, false);

    // 2. Ten steps would carry the ball far past the wall
    run(&mut world, 10);

    // 3. Stopped on the near face (4.9 - radius)
    let x = f(world.body(ball).unwrap().position().x);
    assert!(x > 4.5, "ball stopped early at {x}");
    assert!(x < 4.66, "ball entered the wall at {x}");
}

#[test]
fn test_ball_tunnels_without_continuous_physics() {
    let mut world = World::new(FixedVec2::ZERO);
    world.continuous_physics = false;
    spawn_wall(&mut world, BodyType::Static);
    let ball = spawn_ball(&mut world, false);

    run(&mut world, 10);

    // The discrete step never sees an overlap.
    let x = f(world.body(ball).unwrap().position().x);
    assert!(x > 5.1, "ball should pass through, ended at {x}");
}

#[test]
fn test_bullet_stops_at_dynamic_wall() {
    // 1. Setup: a free wall and a bullet
    let mut world = World::new(FixedVec2::ZERO);
    let wall = spawn_wall(&mut world, BodyType::Dynamic);
    let bullet = spawn_ball(&mut world, true);

    // 2. Simulate
    run(&mut world, 10);

    // 3. The bullet stays on the near side of the wall
    let wall_x = f(world.body(wall).unwrap().position().x);
    let bullet_x = f(world.body(bullet).unwrap().position().x);
    assert!(bullet_x > 4.5, "bullet stopped early at {bullet_x}");
    assert!(
        bullet_x + 0.25 < wall_x - 0.1 + 0.02,
        "bullet at {bullet_x} entered the wall at {wall_x}"
    );
    // Momentum went into the wall
    assert!(world.body(wall).unwrap().linear_velocity().x > FixedNum::ZERO);
}

#[test]
fn test_non_bullet_passes_dynamic_wall() {
    // Dynamic against dynamic only sweeps when one side is a bullet.
    let mut world = World::new(FixedVec2::ZERO);
    let wall = spawn_wall(&mut world, BodyType::Dynamic);
    let ball = spawn_ball(&mut world, false);

    run(&mut world, 10);

    let wall_x = f(world.body(wall).unwrap().position().x);
    let ball_x = f(world.body(ball).unwrap().position().x);
    assert!(ball_x > wall_x, "ball at {ball_x} should be past the wall at {wall_x}");
    assert_eq!(world.body(wall).unwrap().linear_velocity(), FixedVec2::ZERO);
}
