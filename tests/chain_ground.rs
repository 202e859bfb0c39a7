use detbox::prelude::*;

fn f(v: FixedNum) -> f64 {
    v.to_num::<f64>()
}

/// Flat chain ground from x = 20 to x = -20 with a seam every 5 m.
///
/// Chain edges collide on their right side only, so the vertices run
/// right to left for the normals to point up.
fn chain_ground(world: &mut World) {
    let vertices: Vec<FixedVec2> = (0..9).map(|i| FixedVec2::from_int(20 - 5 * i, 0)).collect();
    let chain = ChainShape::new_chain(&vertices, FixedVec2::from_int(25, 0), FixedVec2::from_int(-25, 0)).unwrap();
    let ground = world.create_body(&BodyDef::fixed(FixedVec2::ZERO)).unwrap();
    world.create_fixture(ground, &FixtureDef::new(chain)).unwrap();
}

fn slider(world: &mut World, shape: impl Into<Shape>, y: FixedNum) -> BodyHandle {
    let mut def = BodyDef::dynamic(FixedVec2::new(int(-18), y));
    def.linear_velocity = FixedVec2::from_int(10, 0);
    let body = world.create_body(&def).unwrap();
    world
        .create_fixture(body, &FixtureDef::new(shape).with_density(int(1)).with_friction(FixedNum::ZERO))
        .unwrap();
    body
}

#[test]
fn test_box_slides_across_chain_seams() {
    // 1. Setup: box resting on the chain, sliding right
    let mut world = World::new(FixedVec2::from_int(0, -10));
    chain_ground(&mut world);
    let body = slider(&mut world, PolygonShape::new_box(ratio(1, 2), ratio(1, 2)), ratio(52, 100));

    // 2. Three seconds, past six seams
    let mut max_spin: f64 = 0.0;
    for step in 0..180 {
        world.step(ratio(1, 60), 8, 3);
        let b = world.body(body).unwrap();
        max_spin = max_spin.max(f(b.angular_velocity()).abs());
        if step >= 30 {
            // Resting height: half extent plus both skins minus slop
            assert!((f(b.position().y) - 0.515).abs() < 0.01, "box hopped at step {step}");
        }
    }

    // 3. No catching on the internal vertices
    let b = world.body(body).unwrap();
    assert!(max_spin < 1e-3, "box tipped on a seam, max spin {max_spin}");
    assert!(f(b.position().x) > 10.0);
    assert!(f(b.angle()).abs() < 1e-3);
}

#[test]
fn test_circle_slides_across_chain_seams() {
    let mut world = World::new(FixedVec2::from_int(0, -10));
    chain_ground(&mut world);
    let body = slider(&mut world, CircleShape::new(FixedVec2::ZERO, ratio(1, 4)), ratio(26, 100));

    for step in 0..180 {
        world.step(ratio(1, 60), 8, 3);
        let b = world.body(body).unwrap();
        if step >= 30 {
            assert!(f(b.linear_velocity().y).abs() < 0.05, "ball bounced at step {step}");
        }
    }

    let b = world.body(body).unwrap();
    assert!((f(b.position().y) - 0.26).abs() < 0.02);
    assert!(f(b.position().x) > 10.0);
}
