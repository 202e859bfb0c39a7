use detbox::prelude::*;

fn ground(world: &mut World) -> BodyHandle {
    let ground = world.create_body(&BodyDef::fixed(FixedVec2::ZERO)).unwrap();
    world
        .create_fixture(ground, &FixtureDef::new(EdgeShape::two_sided(FixedVec2::from_int(-40, 0), FixedVec2::from_int(40, 0))))
        .unwrap();
    ground
}

fn spawn_box(world: &mut World, x: FixedNum, y: FixedNum) -> BodyHandle {
    let body = world.create_body(&BodyDef::dynamic(FixedVec2::new(x, y))).unwrap();
    world
        .create_fixture(
            body,
            &FixtureDef::new(PolygonShape::new_box(ratio(1, 2), ratio(1, 2)))
                .with_density(int(1))
                .with_friction(ratio(6, 10)),
        )
        .unwrap();
    body
}

#[test]
fn test_vertical_stack_comes_to_rest() {
    // 1. Setup: five boxes with small gaps
    let mut world = World::new(FixedVec2::from_int(0, -10));
    ground(&mut world);
    let boxes: Vec<BodyHandle> = (0..5)
        .map(|i| spawn_box(&mut world, FixedNum::ZERO, ratio(1, 2) + int(i) * ratio(21, 20)))
        .collect();

    // 2. Ten seconds
    for _ in 0..600 {
        world.step(ratio(1, 60), 8, 3);
    }

    // 3. Stack is upright, ordered and asleep
    for (i, &handle) in boxes.iter().enumerate() {
        let body = world.body(handle).unwrap();
        let p = body.position();
        assert!(p.x.abs().to_num::<f64>() < 0.05, "box {} slid to x = {}", i, p.x);
        let expected_y = 0.5 + i as f64;
        assert!(
            (p.y.to_num::<f64>() - expected_y).abs() < 0.1,
            "box {} at y = {}, expected ~{}",
            i,
            p.y,
            expected_y
        );
        assert!(body.angle().abs().to_num::<f64>() < 0.02);
        assert!(!body.is_awake(), "box {} still awake", i);
    }
}

#[test]
fn test_pyramid_stays_standing() {
    let mut world = World::new(FixedVec2::from_int(0, -10));
    ground(&mut world);

    let rows = 6;
    let mut top = None;
    for row in 0..rows {
        for col in 0..(rows - row) {
            let x = ratio(2 * col - (rows - 1 - row), 2) * ratio(11, 10);
            let y = ratio(1, 2) + int(row) * ratio(21, 20);
            top = Some(spawn_box(&mut world, x, y));
        }
    }
    let top = top.unwrap();

    for _ in 0..300 {
        world.step(ratio(1, 60), 8, 3);
    }

    // The apex box settles about one box per row up and stays centred.
    let apex = world.body(top).unwrap().position();
    assert!(apex.x.abs().to_num::<f64>() < 0.1, "apex drifted to {}", apex.x);
    let expected = 0.5 + (rows - 1) as f64;
    assert!((apex.y.to_num::<f64>() - expected).abs() < 0.15, "apex at {}", apex.y);

    for (_, body) in world.bodies() {
        assert!(body.linear_velocity().length().to_num::<f64>() < 0.1);
    }
}

#[test]
fn test_sleeping_stack_wakes_on_impulse() {
    let mut world = World::new(FixedVec2::from_int(0, -10));
    ground(&mut world);
    let bottom = spawn_box(&mut world, FixedNum::ZERO, ratio(1, 2));
    let top = spawn_box(&mut world, FixedNum::ZERO, ratio(3, 2));

    for _ in 0..300 {
        world.step(ratio(1, 60), 8, 3);
    }
    assert!(!world.body(top).unwrap().is_awake());

    // Kicking the top box wakes the whole island on the next step.
    let body = world.body_mut(top).unwrap();
    let center = body.world_center();
    body.apply_linear_impulse(FixedVec2::from_int(2, 0), center, true);
    world.step(ratio(1, 60), 8, 3);

    assert!(world.body(top).unwrap().is_awake());
    assert!(world.body(bottom).unwrap().is_awake());
}
