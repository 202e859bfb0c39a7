use std::cell::RefCell;
use std::rc::Rc;

use detbox::collision::Manifold;
use detbox::dynamics::{Contact, ContactImpulse};
use detbox::prelude::*;

#[derive(Default, Debug)]
struct Counts {
    begin: usize,
    end: usize,
    pre_solve: usize,
    post_solve: usize,
    /// Step-ordered event trace, "b" for begin and "e" for end.
    order: Vec<&'static str>,
}

struct Recorder(Rc<RefCell<Counts>>);

impl ContactListener for Recorder {
    fn begin_contact(&mut self, _contact: &Contact) {
        let mut counts = self.0.borrow_mut();
        counts.begin += 1;
        counts.order.push("b");
    }

    fn end_contact(&mut self, _contact: &Contact) {
        let mut counts = self.0.borrow_mut();
        counts.end += 1;
        counts.order.push("e");
    }

    fn pre_solve(&mut self, _contact: &mut Contact, _old_manifold: &Manifold) {
        self.0.borrow_mut().pre_solve += 1;
    }

    fn post_solve(&mut self, _contact: &Contact, _impulse: &ContactImpulse) {
        self.0.borrow_mut().post_solve += 1;
    }
}

fn circle(radius: FixedNum) -> CircleShape {
    CircleShape::new(FixedVec2::ZERO, radius)
}

#[test]
fn test_bounce_reports_begin_then_end() {
    // 1. Setup: zero gravity, a ball flying into a fixed ball
    let mut world = World::new(FixedVec2::ZERO);
    let counts = Rc::new(RefCell::new(Counts::default()));
    world.set_contact_listener(Box::new(Recorder(counts.clone())));

    let wall = world.create_body(&BodyDef::fixed(FixedVec2::from_int(3, 0))).unwrap();
    world.create_fixture(wall, &FixtureDef::new(circle(int(1)))).unwrap();

    let mut def = BodyDef::dynamic(FixedVec2::ZERO);
    def.linear_velocity = FixedVec2::from_int(5, 0);
    let ball = world.create_body(&def).unwrap();
    world
        .create_fixture(
            ball,
            &FixtureDef::new(circle(ratio(1, 2)))
                .with_density(int(1))
                .with_restitution(int(1)),
        )
        .unwrap();

    // 2. Two seconds: hit at ~0.3s, then fly away
    for _ in 0..120 {
        world.step(ratio(1, 60), 8, 3);
    }

    // 3. Exactly one touch, begin before end, solver hooks paired
    let counts = counts.borrow();
    assert_eq!(counts.begin, 1, "{:?}", counts);
    assert_eq!(counts.end, 1, "{:?}", counts);
    assert_eq!(counts.order, vec!["b", "e"]);
    assert!(counts.pre_solve >= 1);
    assert_eq!(counts.pre_solve, counts.post_solve);

    let ball = world.body(ball).unwrap();
    assert!(ball.linear_velocity().x < FixedNum::ZERO, "ball should bounce back");
}

#[test]
fn test_sensor_reports_overlap_without_response() {
    let mut world = World::new(FixedVec2::ZERO);
    let counts = Rc::new(RefCell::new(Counts::default()));
    world.set_contact_listener(Box::new(Recorder(counts.clone())));

    let zone = world.create_body(&BodyDef::fixed(FixedVec2::from_int(3, 0))).unwrap();
    world.create_fixture(zone, &FixtureDef::new(circle(int(1))).sensor()).unwrap();

    let mut def = BodyDef::dynamic(FixedVec2::ZERO);
    def.linear_velocity = FixedVec2::from_int(5, 0);
    let ball = world.create_body(&def).unwrap();
    world
        .create_fixture(ball, &FixtureDef::new(circle(ratio(1, 2))).with_density(int(1)))
        .unwrap();

    for _ in 0..120 {
        world.step(ratio(1, 60), 8, 3);
    }

    let counts = counts.borrow();
    assert_eq!(counts.begin, 1);
    assert_eq!(counts.end, 1);
    assert_eq!(counts.pre_solve, 0);
    assert_eq!(counts.post_solve, 0);

    // Passed straight through at the original speed.
    let ball = world.body(ball).unwrap();
    assert_eq!(ball.linear_velocity(), FixedVec2::from_int(5, 0));
}

#[test]
fn test_destroying_touching_body_ends_contact() {
    let mut world = World::new(FixedVec2::from_int(0, -10));
    let counts = Rc::new(RefCell::new(Counts::default()));
    world.set_contact_listener(Box::new(Recorder(counts.clone())));

    let ground = world.create_body(&BodyDef::fixed(FixedVec2::ZERO)).unwrap();
    world
        .create_fixture(ground, &FixtureDef::new(PolygonShape::new_box(int(10), ratio(1, 2))))
        .unwrap();
    let ball = world.create_body(&BodyDef::dynamic(FixedVec2::from_int(0, 1))).unwrap();
    world
        .create_fixture(ball, &FixtureDef::new(circle(ratio(1, 2))).with_density(int(1)))
        .unwrap();

    for _ in 0..30 {
        world.step(ratio(1, 60), 8, 3);
    }
    assert_eq!(counts.borrow().begin, 1);
    assert_eq!(world.contact_count(), 1);

    world.destroy_body(ball).unwrap();
    assert_eq!(counts.borrow().end, 1);
    assert_eq!(world.contact_count(), 0);
}

#[test]
fn test_filter_groups_prevent_contacts() {
    let mut world = World::new(FixedVec2::from_int(0, -10));
    let filter = Filter {
        group_index: -1,
        ..Filter::default()
    };

    let ground = world.create_body(&BodyDef::fixed(FixedVec2::ZERO)).unwrap();
    world
        .create_fixture(ground, &FixtureDef::new(PolygonShape::new_box(int(10), ratio(1, 2))).with_filter(filter))
        .unwrap();
    let ball = world.create_body(&BodyDef::dynamic(FixedVec2::from_int(0, 2))).unwrap();
    let fixture = world
        .create_fixture(ball, &FixtureDef::new(circle(ratio(1, 2))).with_density(int(1)).with_filter(filter))
        .unwrap();

    for _ in 0..60 {
        world.step(ratio(1, 60), 8, 3);
    }
    // Same negative group: falls through the ground.
    assert_eq!(world.contact_count(), 0);
    assert!(world.body(ball).unwrap().position().y < FixedNum::ZERO);

    // Refiltering back to defaults lets contacts form again.
    world.set_filter_data(fixture, Filter::default()).unwrap();
    world.set_transform(ball, FixedVec2::from_int(0, 1), FixedNum::ZERO).unwrap();
    world.step(ratio(1, 60), 8, 3);
    assert_eq!(world.contact_count(), 1);
}
