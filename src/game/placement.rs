//! Rejection-sampling spawn placement
//!
//! Shared by combatant spawn and pickup spawn. Samples uniformly inside a
//! region and accepts the first point that keeps every occupant farther than
//! the sum of both exclusion radii. After [`MAX_PLACEMENT_ATTEMPTS`] samples
//! the last one is accepted anyway, so placement never fails but may overlap
//! in crowded configurations.

use rand::Rng;
use tracing::warn;

use super::physics::{Bounds, Vec2};

/// Upper bound on samples per placement
pub const MAX_PLACEMENT_ATTEMPTS: usize = 100;

/// An existing entity the new one has to keep clear of
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Occupant {
    pub position: Vec2,
    pub exclusion_radius: f32,
}

impl Occupant {
    pub fn new(position: Vec2, exclusion_radius: f32) -> Self {
        Self {
            position,
            exclusion_radius,
        }
    }
}

/// Result of a placement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub position: Vec2,
    /// Samples drawn, including the accepted one
    pub attempts: usize,
    /// True when no sample satisfied the separation rule
    pub exhausted: bool,
}

/// True when `candidate` is strictly farther than the combined radii from every occupant
pub fn is_clear(candidate: Vec2, exclusion_radius: f32, occupants: &[Occupant]) -> bool {
    occupants
        .iter()
        .all(|o| candidate.distance(o.position) > o.exclusion_radius + exclusion_radius)
}

/// Find a spawn point for an entity with `exclusion_radius` inside `bounds`.
pub fn place<R: Rng + ?Sized>(
    rng: &mut R,
    bounds: &Bounds,
    exclusion_radius: f32,
    occupants: &[Occupant],
) -> Placement {
    let mut candidate = bounds.clamp(Vec2::ZERO);

    for attempt in 1..=MAX_PLACEMENT_ATTEMPTS {
        candidate = bounds.random_point(rng);
        if is_clear(candidate, exclusion_radius, occupants) {
            return Placement {
                position: candidate,
                attempts: attempt,
                exhausted: false,
            };
        }
    }

    warn!(
        x = candidate.x,
        y = candidate.y,
        occupants = occupants.len(),
        "Placement exhausted, accepting last sample"
    );

    Placement {
        position: candidate,
        attempts: MAX_PLACEMENT_ATTEMPTS,
        exhausted: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn accepted_point_respects_combined_radius() {
        let bounds = Bounds::square(5.0);
        let occupants = [Occupant::new(Vec2::ZERO, 1.0)];

        for seed in 0..200 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let placement = place(&mut rng, &bounds, 1.0, &occupants);
            assert!(!placement.exhausted);
            assert!(placement.position.distance(Vec2::ZERO) > 2.0);
            assert!(bounds.contains(placement.position));
        }
    }

    #[test]
    fn empty_arena_accepts_first_sample() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let placement = place(&mut rng, &Bounds::square(5.0), 1.0, &[]);
        assert_eq!(placement.attempts, 1);
        assert!(!placement.exhausted);
    }

    #[test]
    fn crowded_arena_falls_back_to_last_sample() {
        // One occupant covering the whole region: nothing can ever be clear.
        let bounds = Bounds::square(1.0);
        let occupants = [Occupant::new(Vec2::ZERO, 10.0)];
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let placement = place(&mut rng, &bounds, 1.0, &occupants);
        assert!(placement.exhausted);
        assert_eq!(placement.attempts, MAX_PLACEMENT_ATTEMPTS);
        assert!(bounds.contains(placement.position));
    }

    #[test]
    fn touching_exactly_is_not_clear() {
        let occupants = [Occupant::new(Vec2::ZERO, 1.0)];
        assert!(!is_clear(Vec2::new(2.0, 0.0), 1.0, &occupants));
        assert!(is_clear(Vec2::new(2.01, 0.0), 1.0, &occupants));
    }
}
