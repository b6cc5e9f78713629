//! Per-instance simulation record.

use bevy::prelude::*;

/// A single live particle. `N` is the scene node it renders through.
#[derive(Clone, Debug)]
pub struct Particle<N> {
    pub id: u64,
    pub position: Vec3,
    /// `w` is always 0.
    pub velocity: Vec4,
    /// Emission time in milliseconds.
    pub start_time: f64,
    /// Seconds.
    pub lifetime: f32,
    pub start_size: f32,
    pub start_color: LinearRgba,
    pub render_handle: Option<N>,
    /// Fixed random fraction so lifetime modifiers in random modes stay
    /// stable across ticks.
    pub random: f32,
    /// Normalized age as of the last update.
    pub age: f32,
    /// Rendered size as of the last update.
    pub size: f32,
    /// Rendered color as of the last update.
    pub color: LinearRgba,
}

impl<N> Particle<N> {
    /// Normalized age at `now` (milliseconds). Zero or negative lifetimes are
    /// reported as already expired.
    pub fn age_at(&self, now: f64) -> f32 {
        if self.lifetime <= 0.0 {
            return f32::INFINITY;
        }
        ((now - self.start_time) / (self.lifetime as f64 * 1000.0)) as f32
    }

    pub fn is_expired(&self, now: f64) -> bool {
        self.age_at(now) > 1.0
    }

    /// Collision radius.
    pub fn radius(&self) -> f32 {
        self.start_size / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn particle(lifetime: f32) -> Particle<()> {
        Particle {
            id: 0,
            position: Vec3::ZERO,
            velocity: Vec4::ZERO,
            start_time: 1000.0,
            lifetime,
            start_size: 1.0,
            start_color: LinearRgba::WHITE,
            render_handle: None,
            random: 0.5,
            age: 0.0,
            size: 1.0,
            color: LinearRgba::WHITE,
        }
    }

    #[test]
    fn age_is_normalized_by_lifetime() {
        let p = particle(2.0);
        assert_eq!(p.age_at(1000.0), 0.0);
        assert_eq!(p.age_at(2000.0), 0.5);
        assert!(!p.is_expired(3000.0));
        assert!(p.is_expired(3001.0));
    }

    #[test]
    fn non_positive_lifetime_expires_immediately() {
        assert!(particle(0.0).is_expired(1000.0));
        assert!(particle(-1.0).is_expired(1000.0));
    }
}
