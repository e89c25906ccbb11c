//! Currency pickups - fixed-size pool with respawn on collection

use std::collections::BTreeMap;

use rand::Rng;
use tracing::{debug, info};

use super::physics::{Bounds, PhysicsSystem, Vec2};
use super::placement::{place, Occupant};
use super::replicated::Outbox;
use super::StaleEntity;
use crate::ws::protocol::{PickupId, ServerMsg};

/// Pickup tuning
#[derive(Debug, Clone, Copy)]
pub struct PickupStats {
    /// Score credited on collection
    pub value: i64,
    /// Minimum separation from other entities at spawn time
    pub exclusion_radius: f32,
    /// Collision radius
    pub contact_radius: f32,
}

impl Default for PickupStats {
    fn default() -> Self {
        Self {
            value: 1,
            exclusion_radius: 0.1,
            contact_radius: 0.25,
        }
    }
}

/// An uncollected pickup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pickup {
    pub id: PickupId,
    pub value: i64,
    pub position: Vec2,
    pub exclusion_radius: f32,
    pub contact_radius: f32,
}

impl Pickup {
    pub fn spawned_msg(&self) -> ServerMsg {
        ServerMsg::PickupSpawned {
            pickup_id: self.id,
            position: self.position,
            value: self.value,
        }
    }
}

/// Result of an authoritative collection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collection {
    pub value: i64,
    pub replacement: PickupId,
}

/// Owns the pickup pool on the authoritative role
#[derive(Debug)]
pub struct CurrencyDirector {
    target_count: usize,
    stats: PickupStats,
    bounds: Bounds,
    pickups: BTreeMap<PickupId, Pickup>,
    next_id: PickupId,
    outbox: Outbox,
}

impl CurrencyDirector {
    pub fn new(target_count: usize, stats: PickupStats, bounds: Bounds, outbox: Outbox) -> Self {
        Self {
            target_count,
            stats,
            bounds,
            pickups: BTreeMap::new(),
            next_id: 1,
            outbox,
        }
    }

    pub fn target_count(&self) -> usize {
        self.target_count
    }

    pub fn len(&self) -> usize {
        self.pickups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pickups.is_empty()
    }

    pub fn pickups(&self) -> impl Iterator<Item = &Pickup> {
        self.pickups.values()
    }

    pub fn get(&self, id: PickupId) -> Option<&Pickup> {
        self.pickups.get(&id)
    }

    /// Pickups as placement occupants
    pub fn occupants(&self) -> Vec<Occupant> {
        self.pickups
            .values()
            .map(|p| Occupant::new(p.position, p.exclusion_radius))
            .collect()
    }

    /// Fill the pool up to the target count. Runs once at match start.
    pub fn initialize<R: Rng + ?Sized>(&mut self, rng: &mut R, combatants: &[Occupant]) {
        if !self.pickups.is_empty() {
            return;
        }

        for _ in 0..self.target_count {
            self.spawn_one(rng, combatants);
        }

        info!(count = self.pickups.len(), "Pickup pool initialized");
    }

    /// Pickups whose contact circle overlaps the given body
    pub fn contacts(&self, position: Vec2, radius: f32) -> Vec<PickupId> {
        self.pickups
            .values()
            .filter(|p| PhysicsSystem::circles_overlap(p.position, p.contact_radius, position, radius))
            .map(|p| p.id)
            .collect()
    }

    /// Authoritative collection: remove the pickup and spawn its replacement.
    /// A pickup that is already gone resolves to [`StaleEntity::Pickup`].
    pub fn collect<R: Rng + ?Sized>(
        &mut self,
        pickup_id: PickupId,
        rng: &mut R,
        combatants: &[Occupant],
    ) -> Result<Collection, StaleEntity> {
        let pickup = self
            .pickups
            .remove(&pickup_id)
            .ok_or(StaleEntity::Pickup(pickup_id))?;

        self.outbox.broadcast(ServerMsg::PickupRemoved { pickup_id });
        let replacement = self.spawn_one(rng, combatants);

        debug!(pickup_id, replacement, value = pickup.value, "Pickup collected");

        Ok(Collection {
            value: pickup.value,
            replacement,
        })
    }

    fn spawn_one<R: Rng + ?Sized>(&mut self, rng: &mut R, combatants: &[Occupant]) -> PickupId {
        let mut occupants = combatants.to_vec();
        occupants.extend(self.occupants());

        let placement = place(rng, &self.bounds, self.stats.exclusion_radius, &occupants);

        let id = self.next_id;
        self.next_id += 1;

        let pickup = Pickup {
            id,
            value: self.stats.value,
            position: placement.position,
            exclusion_radius: self.stats.exclusion_radius,
            contact_radius: self.stats.contact_radius,
        };
        self.outbox.broadcast(pickup.spawned_msg());
        self.pickups.insert(id, pickup);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn director(count: usize) -> CurrencyDirector {
        CurrencyDirector::new(count, PickupStats::default(), Bounds::square(10.0), Outbox::new(64))
    }

    #[test]
    fn initialize_fills_to_target_once() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut d = director(7);
        d.initialize(&mut rng, &[]);
        assert_eq!(d.len(), 7);
        d.initialize(&mut rng, &[]);
        assert_eq!(d.len(), 7);
    }

    #[test]
    fn initial_pickups_avoid_combatants() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut d = director(7);
        let combatants = [Occupant::new(Vec2::new(1.0, 1.0), 1.0)];
        d.initialize(&mut rng, &combatants);

        for p in d.pickups() {
            assert!(p.position.distance(Vec2::new(1.0, 1.0)) > 1.0 + p.exclusion_radius);
        }
    }

    #[test]
    fn pool_size_constant_after_collection() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut d = director(7);
        d.initialize(&mut rng, &[]);

        let ids: Vec<PickupId> = d.pickups().map(|p| p.id).collect();
        for id in ids {
            let collection = d.collect(id, &mut rng, &[]).expect("live pickup");
            assert_eq!(collection.value, 1);
            assert_eq!(d.len(), d.target_count());
            assert!(d.get(id).is_none());
            assert!(d.get(collection.replacement).is_some());
        }
    }

    #[test]
    fn double_collection_is_stale() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut d = director(3);
        d.initialize(&mut rng, &[]);
        let id = d.pickups().next().map(|p| p.id).expect("pickup");

        assert!(d.collect(id, &mut rng, &[]).is_ok());
        assert_eq!(d.collect(id, &mut rng, &[]), Err(StaleEntity::Pickup(id)));
        assert_eq!(d.len(), 3);
    }

    #[test]
    fn collection_broadcasts_removal_then_spawn() {
        let outbox = Outbox::new(64);
        let mut rx = outbox.subscribe();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut d = CurrencyDirector::new(1, PickupStats::default(), Bounds::square(10.0), outbox);
        d.initialize(&mut rng, &[]);
        let _ = rx.try_recv();

        let id = d.pickups().next().map(|p| p.id).expect("pickup");
        d.collect(id, &mut rng, &[]).expect("collect");

        assert_eq!(rx.try_recv().expect("removal").msg, ServerMsg::PickupRemoved { pickup_id: id });
        assert!(matches!(
            rx.try_recv().expect("spawn").msg,
            ServerMsg::PickupSpawned { .. }
        ));
    }

    #[test]
    fn contacts_find_overlapping_pickups() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut d = director(1);
        d.initialize(&mut rng, &[]);
        let pickup = *d.pickups().next().expect("pickup");

        assert_eq!(d.contacts(pickup.position, 0.5), vec![pickup.id]);
        assert!(d.contacts(pickup.position + Vec2::new(5.0, 0.0), 0.5).is_empty());
    }
}
