use detbox::collision::{
    collide_polygons, distance, shape_cast, time_of_impact, DistanceInput, DistanceProxy, DynamicTree, ShapeCastInput,
    SimplexCache, ToiInput, ToiState, WorldManifold,
};
use detbox::fixed_math::Sweep;
use detbox::prelude::*;

fn f(v: FixedNum) -> f64 {
    v.to_num::<f64>()
}

fn num(rng: &mut fastrand::Rng, low: f64, high: f64) -> FixedNum {
    FixedNum::from_num(low + rng.f64() * (high - low))
}

fn proxy(shape: impl Into<Shape>) -> DistanceProxy {
    DistanceProxy::from_shape(&shape.into(), 0)
}

#[test]
fn test_gjk_box_distance_matches_analytic() {
    let mut rng = fastrand::Rng::with_seed(7);
    let a = proxy(PolygonShape::new_box(int(1), int(1)));
    let b = proxy(PolygonShape::new_box(int(1), int(1)));

    for _ in 0..200 {
        // Side by side with overlapping vertical extents: the gap is along x.
        let dx = num(&mut rng, 2.5, 10.0);
        let dy = num(&mut rng, -1.5, 1.5);
        let input = DistanceInput {
            proxy_a: a,
            proxy_b: b,
            transform_a: Transform::IDENTITY,
            transform_b: Transform::new(FixedVec2::new(dx, dy), FixedNum::ZERO),
            use_radii: false,
        };
        let output = distance(&mut SimplexCache::default(), &input);
        let expected = f(dx) - 2.0;
        assert!(
            (f(output.distance) - expected).abs() < 1e-4,
            "dx={} dy={} got {}",
            dx,
            dy,
            output.distance
        );
        assert!(output.iterations <= 20);
    }
}

#[test]
fn test_gjk_circle_distance_with_radii() {
    let mut rng = fastrand::Rng::with_seed(11);
    for _ in 0..200 {
        let ra = num(&mut rng, 0.1, 2.0);
        let rb = num(&mut rng, 0.1, 2.0);
        let angle = num(&mut rng, -3.0, 3.0);
        let gap = num(&mut rng, 0.1, 5.0);
        let dir = Rot::from_angle(angle).x_axis();
        let center = dir * (ra + rb + gap);

        let input = DistanceInput {
            proxy_a: proxy(CircleShape::new(FixedVec2::ZERO, ra)),
            proxy_b: proxy(CircleShape::new(FixedVec2::ZERO, rb)),
            transform_a: Transform::IDENTITY,
            transform_b: Transform::new(center, FixedNum::ZERO),
            use_radii: true,
        };
        let output = distance(&mut SimplexCache::default(), &input);
        assert!((f(output.distance) - f(gap)).abs() < 1e-3, "gap {} got {}", gap, output.distance);

        // Witness points sit on the two surfaces.
        assert!((f(output.point_a.length()) - f(ra)).abs() < 1e-3);
        assert!((f((output.point_b - center).length()) - f(rb)).abs() < 1e-3);
    }
}

#[test]
fn test_box_mass_properties() {
    let mut rng = fastrand::Rng::with_seed(3);
    for _ in 0..50 {
        let hx = num(&mut rng, 0.1, 5.0);
        let hy = num(&mut rng, 0.1, 5.0);
        let density = num(&mut rng, 0.5, 3.0);
        let md = PolygonShape::new_box(hx, hy).compute_mass(density);

        let (hx, hy, density) = (f(hx), f(hy), f(density));
        let mass = 4.0 * hx * hy * density;
        let inertia = mass * (hx * hx + hy * hy) / 3.0;
        assert!((f(md.mass) - mass).abs() / mass < 1e-3, "mass {} vs {}", md.mass, mass);
        assert!((f(md.inertia) - inertia).abs() / inertia < 1e-3, "inertia {} vs {}", md.inertia, inertia);
        assert!(f(md.center.length()) < 1e-6);
    }
}

#[test]
fn test_offset_box_mass_uses_parallel_axis() {
    let shape = PolygonShape::new_oriented_box(int(1), ratio(1, 2), FixedVec2::from_int(2, 0), FixedNum::ZERO);
    let md = shape.compute_mass(int(1));
    // Area 2, centroid inertia 2 * (1 + 1/4) / 3, shifted by m * d^2.
    let expected = 2.0 * 1.25 / 3.0 + 2.0 * 4.0;
    assert!((f(md.mass) - 2.0).abs() < 1e-6);
    assert!((f(md.inertia) - expected).abs() < 1e-4);
    assert!((f(md.center.x) - 2.0).abs() < 1e-6);
}

#[test]
fn test_shape_cast_box_into_box() {
    let input = ShapeCastInput {
        proxy_a: proxy(PolygonShape::new_box(int(1), int(1))),
        proxy_b: proxy(PolygonShape::new_box(int(1), int(1))),
        transform_a: Transform::IDENTITY,
        transform_b: Transform::new(FixedVec2::from_int(-10, 0), FixedNum::ZERO),
        translation_b: FixedVec2::from_int(20, 0),
    };
    let output = shape_cast(&input, &Settings::default()).expect("boxes should meet");
    assert!((f(output.lambda) - 0.4).abs() < 0.002, "lambda {}", output.lambda);
    assert!(f(output.normal.x).abs() > 0.99);

    // Moving away never hits.
    let miss = ShapeCastInput {
        translation_b: FixedVec2::from_int(-20, 0),
        ..input
    };
    assert!(shape_cast(&miss, &Settings::default()).is_none());
}

#[test]
fn test_toi_circle_against_box() {
    let settings = Settings::default();
    let sweep_a = Sweep::default();
    let sweep_b = Sweep {
        c0: FixedVec2::from_int(-10, 0),
        c: FixedVec2::from_int(10, 0),
        ..Sweep::default()
    };
    let input = ToiInput {
        proxy_a: proxy(PolygonShape::new_box(int(1), int(1))),
        proxy_b: proxy(CircleShape::new(FixedVec2::ZERO, ratio(1, 2))),
        sweep_a,
        sweep_b,
        t_max: FixedNum::ONE,
    };
    let output = time_of_impact(&input, &settings);
    assert_eq!(output.state, ToiState::Touching);
    // Surfaces meet at x = -1.5, slightly deeper by the target slop.
    assert!((f(output.t) - 0.425).abs() < 0.002, "t = {}", output.t);
    assert!(output.iterations >= 1);

    // Parallel miss.
    let miss = ToiInput {
        sweep_b: Sweep {
            c0: FixedVec2::from_int(-10, 5),
            c: FixedVec2::from_int(10, 5),
            ..Sweep::default()
        },
        ..input
    };
    assert_eq!(time_of_impact(&miss, &settings).state, ToiState::Separated);
}

#[test]
fn test_resting_boxes_produce_two_point_manifold() {
    let settings = Settings::default();
    let lower = PolygonShape::new_box(int(2), ratio(1, 2));
    let upper = PolygonShape::new_box(ratio(1, 2), ratio(1, 2));
    let xf_a = Transform::IDENTITY;
    // Overlapping by 0.05.
    let xf_b = Transform::new(FixedVec2::new(FixedNum::ZERO, ratio(19, 20)), FixedNum::ZERO);

    let manifold = collide_polygons(&lower, &xf_a, &upper, &xf_b, settings.linear_slop);
    assert_eq!(manifold.point_count, 2);

    let wm = WorldManifold::new(&manifold, &xf_a, lower.radius, &xf_b, upper.radius);
    assert!((f(wm.normal.y) - 1.0).abs() < 1e-6);
    assert!(f(wm.normal.x).abs() < 1e-6);
    for i in 0..2 {
        // Core overlap 0.05 plus two skins of polygon radius.
        let expected = -0.05 - 2.0 * f(settings.polygon_radius);
        assert!((f(wm.separations[i]) - expected).abs() < 1e-4, "separation {}", wm.separations[i]);
    }

    // Lift it clear and the manifold empties.
    let apart = Transform::new(FixedVec2::from_int(0, 2), FixedNum::ZERO);
    assert_eq!(collide_polygons(&lower, &xf_a, &upper, &apart, settings.linear_slop).point_count, 0);
}

#[test]
fn test_dynamic_tree_query_matches_brute_force() {
    // 1. Setup: random boxes
    let mut rng = fastrand::Rng::with_seed(42);
    let mut tree = DynamicTree::new(ratio(1, 10), int(4));
    let mut proxies = Vec::new();
    for i in 0..300usize {
        let lower = FixedVec2::new(num(&mut rng, -100.0, 100.0), num(&mut rng, -100.0, 100.0));
        let size = FixedVec2::new(num(&mut rng, 0.1, 5.0), num(&mut rng, 0.1, 5.0));
        let id = tree.create_proxy(&Aabb::new(lower, lower + size), i);
        proxies.push(id);
    }

    // 2. Shuffle things around, remove a few
    for &id in proxies.iter().step_by(7) {
        let aabb = tree.fat_aabb(id);
        let shift = FixedVec2::new(num(&mut rng, -10.0, 10.0), num(&mut rng, -10.0, 10.0));
        tree.move_proxy(id, &aabb.shifted(shift), shift);
    }
    for &id in proxies.iter().step_by(11) {
        tree.destroy_proxy(id);
    }
    let live: Vec<usize> = proxies.iter().enumerate().filter(|(i, _)| i % 11 != 0).map(|(_, &id)| id).collect();
    assert_eq!(tree.proxy_count(), live.len());
    tree.validate();

    // 3. Queries agree with a linear scan over fat AABBs
    for _ in 0..50 {
        let lower = FixedVec2::new(num(&mut rng, -100.0, 100.0), num(&mut rng, -100.0, 100.0));
        let query = Aabb::new(lower, lower + FixedVec2::from_int(20, 20));

        let mut found = Vec::new();
        tree.query(&query, |id| {
            found.push(id);
            true
        });
        found.sort_unstable();

        let mut expected: Vec<usize> = live.iter().copied().filter(|&id| tree.fat_aabb(id).overlaps(&query)).collect();
        expected.sort_unstable();
        assert_eq!(found, expected);
    }
}

#[test]
fn test_world_ray_cast_reports_closest_hit() {
    let mut world = World::new(FixedVec2::ZERO);
    let mut near = None;
    for x in [3, 6, 9] {
        let body = world.create_body(&BodyDef::fixed(FixedVec2::from_int(x, 0))).unwrap();
        let fixture = world
            .create_fixture(body, &FixtureDef::new(CircleShape::new(FixedVec2::ZERO, ratio(1, 2))))
            .unwrap();
        near.get_or_insert(fixture);
    }

    // Clip to each hit so the last reported fraction is the closest.
    let mut closest = None;
    world.ray_cast(FixedVec2::ZERO, FixedVec2::from_int(12, 0), |fixture, _, point, normal, fraction| {
        closest = Some((fixture, point, normal));
        fraction
    });
    let (fixture, point, normal) = closest.expect("ray should hit");
    assert_eq!(Some(fixture), near);
    assert!((f(point.x) - 2.5).abs() < 1e-4);
    assert!((f(normal.x) + 1.0).abs() < 1e-4);
    assert!(f(normal.y).abs() < 1e-4);
}

fn ray_cast_row() -> (World, Vec<FixtureHandle>) {
    let mut world = World::new(FixedVec2::ZERO);
    let mut fixtures = Vec::new();
    for x in [3, 6, 9] {
        let body = world.create_body(&BodyDef::fixed(FixedVec2::from_int(x, 0))).unwrap();
        let fixture = world
            .create_fixture(body, &FixtureDef::new(CircleShape::new(FixedVec2::ZERO, ratio(1, 2))))
            .unwrap();
        fixtures.push(fixture);
    }
    (world, fixtures)
}

#[test]
fn test_world_ray_cast_negative_return_ignores_fixture() {
    let (world, fixtures) = ray_cast_row();

    // Filter out the nearest circle, clip to everything else.
    let mut closest = None;
    world.ray_cast(FixedVec2::ZERO, FixedVec2::from_int(12, 0), |fixture, _, point, _, fraction| {
        if fixture == fixtures[0] {
            return -FixedNum::ONE;
        }
        closest = Some((fixture, point));
        fraction
    });
    let (fixture, point) = closest.expect("ray should hit the middle circle");
    assert_eq!(fixture, fixtures[1]);
    assert!((f(point.x) - 5.5).abs() < 1e-4);
}

#[test]
fn test_world_ray_cast_zero_return_terminates() {
    let (world, _) = ray_cast_row();

    let mut calls = 0;
    world.ray_cast(FixedVec2::ZERO, FixedVec2::from_int(12, 0), |_, _, _, _, _| {
        calls += 1;
        FixedNum::ZERO
    });
    assert_eq!(calls, 1);

    // Returning one visits every fixture on the segment.
    let mut all = 0;
    world.ray_cast(FixedVec2::ZERO, FixedVec2::from_int(12, 0), |_, _, _, _, _| {
        all += 1;
        FixedNum::ONE
    });
    assert_eq!(all, 3);
}
