//! Creates, updates and destroys contacts from broad-phase pairs.

use rustc_hash::FxHashMap;

use super::arena::{Arena, BodyHandle, ContactHandle, FixtureHandle};
use super::body::{Body, BodyType, ContactEdge};
use super::contact::{Contact, ContactKind};
use super::fixture::{Fixture, ProxyKey};
use super::world_callbacks::{ContactFilter, ContactListener, DefaultContactFilter};
use crate::collision::BroadPhase;
use crate::fixed_math::FixedNum;
use crate::profiling::profile;
use crate::settings::Settings;

type PairKey = (ProxyKey, ProxyKey);

fn pair_key(a: ProxyKey, b: ProxyKey) -> PairKey {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn contact_key(contact: &Contact) -> PairKey {
    pair_key(
        ProxyKey {
            fixture: contact.fixture_a,
            child_index: contact.child_index_a,
        },
        ProxyKey {
            fixture: contact.fixture_b,
            child_index: contact.child_index_b,
        },
    )
}

pub struct ContactManager {
    pub(crate) broad_phase: BroadPhase<ProxyKey>,
    pub(crate) contacts: Arena<ContactHandle, Contact>,
    /// Existing contact per fixture-child pair. Lookup only, never iterated.
    pair_lookup: FxHashMap<PairKey, ContactHandle>,
    pub(crate) contact_filter: Box<dyn ContactFilter>,
    pub(crate) contact_listener: Option<Box<dyn ContactListener>>,
    pair_scratch: Vec<PairKey>,
    handle_scratch: Vec<ContactHandle>,
}

impl ContactManager {
    pub fn new(settings: &Settings) -> Self {
        Self {
            broad_phase: BroadPhase::new(settings.aabb_extension, settings.aabb_multiplier),
            contacts: Arena::new(),
            pair_lookup: FxHashMap::default(),
            contact_filter: Box::new(DefaultContactFilter),
            contact_listener: None,
            pair_scratch: Vec::new(),
            handle_scratch: Vec::new(),
        }
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// Query the broad phase for new pairs and create contacts for them.
    #[profile(500)]
    pub(crate) fn find_new_contacts(
        &mut self,
        bodies: &mut Arena<BodyHandle, Body>,
        fixtures: &Arena<FixtureHandle, Fixture>,
    ) {
        let mut pairs = std::mem::take(&mut self.pair_scratch);
        pairs.clear();
        self.broad_phase.update_pairs(|a, b| pairs.push((a, b)));
        for &(a, b) in &pairs {
            self.add_pair(a, b, bodies, fixtures);
        }
        self.pair_scratch = pairs;
    }

    fn add_pair(
        &mut self,
        proxy_a: ProxyKey,
        proxy_b: ProxyKey,
        bodies: &mut Arena<BodyHandle, Body>,
        fixtures: &Arena<FixtureHandle, Fixture>,
    ) {
        let (Some(fixture_a), Some(fixture_b)) = (fixtures.get(proxy_a.fixture), fixtures.get(proxy_b.fixture)) else {
            return;
        };

        // Fixtures on the same body never collide.
        let (body_handle_a, body_handle_b) = (fixture_a.body, fixture_b.body);
        if body_handle_a == body_handle_b {
            return;
        }

        let key = pair_key(proxy_a, proxy_b);
        if self.pair_lookup.contains_key(&key) {
            return;
        }

        let (Some(body_a), Some(body_b)) = (bodies.get(body_handle_a), bodies.get(body_handle_b)) else {
            return;
        };
        if !body_b.should_collide(body_handle_a, body_a) {
            return;
        }
        if !self.contact_filter.should_collide(fixture_a, fixture_b) {
            return;
        }

        let Some((kind, swap)) = ContactKind::for_shapes(fixture_a.shape.shape_type(), fixture_b.shape.shape_type())
        else {
            return;
        };

        let side_a = (proxy_a.fixture, fixture_a, proxy_a.child_index);
        let side_b = (proxy_b.fixture, fixture_b, proxy_b.child_index);
        let contact = if swap {
            Contact::new(kind, side_b, side_a)
        } else {
            Contact::new(kind, side_a, side_b)
        };

        let (body_handle_a, body_handle_b) = (contact.body_a, contact.body_b);
        let handle = self.contacts.insert(contact);
        self.pair_lookup.insert(key, handle);

        bodies[body_handle_a].contact_edges.push(ContactEdge {
            other: body_handle_b,
            contact: handle,
        });
        bodies[body_handle_b].contact_edges.push(ContactEdge {
            other: body_handle_a,
            contact: handle,
        });
    }

    /// Remove a contact and unlink it from both bodies. A touching contact
    /// reports `end_contact`, and a contact with points wakes its bodies.
    pub(crate) fn destroy(
        &mut self,
        handle: ContactHandle,
        bodies: &mut Arena<BodyHandle, Body>,
        fixtures: &Arena<FixtureHandle, Fixture>,
    ) {
        let Some(contact) = self.contacts.remove(handle) else {
            return;
        };

        if contact.touching {
            if let Some(listener) = self.contact_listener.as_deref_mut() {
                listener.end_contact(&contact);
            }
        }

        self.pair_lookup.remove(&contact_key(&contact));

        let sensor = [contact.fixture_a, contact.fixture_b]
            .iter()
            .any(|&f| fixtures.get(f).is_some_and(|f| f.is_sensor));
        let wake = contact.manifold.point_count > 0 && !sensor;

        for body_handle in [contact.body_a, contact.body_b] {
            if let Some(body) = bodies.get_mut(body_handle) {
                body.contact_edges.retain(|edge| edge.contact != handle);
                if wake {
                    body.set_awake(true);
                }
            }
        }
    }

    /// Narrow phase for every contact whose proxies still overlap.
    #[profile(1000)]
    pub(crate) fn collide(
        &mut self,
        bodies: &mut Arena<BodyHandle, Body>,
        fixtures: &Arena<FixtureHandle, Fixture>,
        settings: &Settings,
    ) {
        let mut handles = std::mem::take(&mut self.handle_scratch);
        handles.clear();
        handles.extend(self.contacts.iter().map(|(handle, _)| handle));

        for &handle in &handles {
            self.collide_one(handle, bodies, fixtures, settings.linear_slop);
        }

        self.handle_scratch = handles;
    }

    fn collide_one(
        &mut self,
        handle: ContactHandle,
        bodies: &mut Arena<BodyHandle, Body>,
        fixtures: &Arena<FixtureHandle, Fixture>,
        linear_slop: FixedNum,
    ) {
        let Some(contact) = self.contacts.get(handle) else {
            return;
        };
        let (fixture_handle_a, fixture_handle_b) = (contact.fixture_a, contact.fixture_b);
        let (child_index_a, child_index_b) = (contact.child_index_a, contact.child_index_b);
        let (body_handle_a, body_handle_b) = (contact.body_a, contact.body_b);
        let needs_filtering = contact.needs_filtering;

        let (Some(fixture_a), Some(fixture_b)) = (fixtures.get(fixture_handle_a), fixtures.get(fixture_handle_b)) else {
            return;
        };
        let (Some(body_a), Some(body_b)) = (bodies.get(body_handle_a), bodies.get(body_handle_b)) else {
            return;
        };

        if needs_filtering {
            if !body_b.should_collide(body_handle_a, body_a)
                || !self.contact_filter.should_collide(fixture_a, fixture_b)
            {
                self.destroy(handle, bodies, fixtures);
                return;
            }
            self.contacts[handle].needs_filtering = false;
        }

        let active_a = body_a.awake && body_a.body_type != BodyType::Static;
        let active_b = body_b.awake && body_b.body_type != BodyType::Static;
        if !active_a && !active_b {
            return;
        }

        let (Some(proxy_a), Some(proxy_b)) = (fixture_a.proxies.get(child_index_a), fixture_b.proxies.get(child_index_b))
        else {
            return;
        };

        // Fat AABBs stopped overlapping: the pair is gone.
        if !self.broad_phase.test_overlap(proxy_a.proxy_id, proxy_b.proxy_id) {
            self.destroy(handle, bodies, fixtures);
            return;
        }

        self.update_contact(handle, bodies, fixtures, linear_slop);
    }

    /// Recompute one contact's manifold, wake its bodies when the touching
    /// state flipped and fire the listener events. Returns false for a
    /// stale handle.
    pub(crate) fn update_contact(
        &mut self,
        handle: ContactHandle,
        bodies: &mut Arena<BodyHandle, Body>,
        fixtures: &Arena<FixtureHandle, Fixture>,
        linear_slop: FixedNum,
    ) -> bool {
        let Some(contact) = self.contacts.get_mut(handle) else {
            return false;
        };
        let (Some(fixture_a), Some(fixture_b)) = (fixtures.get(contact.fixture_a), fixtures.get(contact.fixture_b))
        else {
            return false;
        };
        let (body_handle_a, body_handle_b) = (contact.body_a, contact.body_b);
        let (Some(body_a), Some(body_b)) = (bodies.get(body_handle_a), bodies.get(body_handle_b)) else {
            return false;
        };

        let (xf_a, xf_b) = (body_a.xf, body_b.xf);
        let update = contact.update(fixture_a, fixture_b, &xf_a, &xf_b, linear_slop);

        if !update.sensor && update.touching != update.was_touching {
            bodies[body_handle_a].set_awake(true);
            bodies[body_handle_b].set_awake(true);
        }

        if let Some(listener) = self.contact_listener.as_deref_mut() {
            if !update.was_touching && update.touching {
                listener.begin_contact(contact);
            }
            if update.was_touching && !update.touching {
                listener.end_contact(contact);
            }
            if !update.sensor && update.touching {
                listener.pre_solve(contact, &update.old_manifold);
            }
        }
        true
    }
}
