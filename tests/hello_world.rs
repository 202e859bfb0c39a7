use detbox::prelude::*;

fn to_f64(v: FixedNum) -> f64 {
    v.to_num::<f64>()
}

#[test]
fn test_box_settles_on_ground() {
    // 1. Setup: ground box and a 1x1 dynamic box four meters up
    let mut world = World::new(FixedVec2::from_int(0, -10));
    let ground = world.create_body(&BodyDef::fixed(FixedVec2::from_int(0, -10))).unwrap();
    world
        .create_fixture(ground, &FixtureDef::new(PolygonShape::new_box(int(50), int(10))))
        .unwrap();

    let body = world.create_body(&BodyDef::dynamic(FixedVec2::from_int(0, 4))).unwrap();
    world
        .create_fixture(
            body,
            &FixtureDef::new(PolygonShape::new_box(int(1), int(1)))
                .with_density(int(1))
                .with_friction(ratio(3, 10)),
        )
        .unwrap();

    // 2. One second at 60 Hz
    let dt = ratio(1, 60);
    for _ in 0..60 {
        world.step(dt, 6, 2);
    }

    // 3. The box rests on the ground: centre at 1 + skin radius
    let body = world.body(body).unwrap();
    let p = body.position();
    assert!(to_f64(p.x).abs() < 0.01, "x drifted: {}", p.x);
    assert!((to_f64(p.y) - 1.01).abs() < 0.01, "y = {}", p.y);
    assert!(to_f64(body.angle()).abs() < 0.01, "angle = {}", body.angle());
    assert_eq!(world.step_index(), 60);
}

#[test]
fn test_identical_scenes_produce_identical_transforms() {
    let build = || {
        let mut world = World::new(FixedVec2::from_int(0, -10));
        let ground = world.create_body(&BodyDef::fixed(FixedVec2::from_int(0, -10))).unwrap();
        world
            .create_fixture(ground, &FixtureDef::new(PolygonShape::new_box(int(50), int(10))))
            .unwrap();
        let mut def = BodyDef::dynamic(FixedVec2::from_int(0, 4));
        def.angle = ratio(1, 5);
        let body = world.create_body(&def).unwrap();
        world
            .create_fixture(body, &FixtureDef::new(PolygonShape::new_box(int(1), int(1))).with_density(int(1)))
            .unwrap();
        world
    };

    let mut a = build();
    let mut b = build();
    for _ in 0..120 {
        a.step(ratio(1, 60), 6, 2);
        b.step(ratio(1, 60), 6, 2);
        assert_eq!(a.transform_log(), b.transform_log());
    }
    assert_eq!(a.state_hash(), b.state_hash());
}
