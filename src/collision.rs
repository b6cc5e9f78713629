//! Moving-sphere versus plane collision.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Ray directions closer to parallel than this are treated as missing the plane.
pub const PARALLEL_EPSILON: f32 = 1e-6;

/// Infinite plane through `origin`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CollisionPlane {
    pub origin: Vec3,
    /// Unit normal.
    pub normal: Vec3,
}

impl CollisionPlane {
    /// The `y = 0` ground plane facing up.
    pub const GROUND: Self = Self {
        origin: Vec3::ZERO,
        normal: Vec3::Y,
    };

    /// Intersection of the line through `origin` along `direction` with the
    /// plane. Hits behind the origin are returned too, so an already embedded
    /// sphere still finds the surface it must be pushed back onto.
    pub fn intersect_ray(&self, origin: Vec3, direction: Vec3) -> Option<Vec3> {
        let denom = direction.dot(self.normal);
        if denom.abs() <= PARALLEL_EPSILON {
            return None;
        }
        let distance = (self.origin - origin).dot(self.normal) / denom;
        Some(origin + direction * distance)
    }
}

/// Response parameters of the collision module.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Reflect)]
pub struct CollisionSettings {
    /// Restitution; 1 reflects the normal component fully.
    pub bounce: f32,
    /// Fraction of speed lost on every hit.
    pub dampen: f32,
}

impl Default for CollisionSettings {
    fn default() -> Self {
        Self {
            bounce: 1.0,
            dampen: 0.0,
        }
    }
}

/// Advance a sphere of `radius` by one step of `dt`, resolving a hit against `plane`.
///
/// Returns `true` when a collision was handled; the position has then already
/// been integrated for this step and the caller must not integrate it again.
pub fn collide_with_plane(
    position: &mut Vec3,
    velocity: &mut Vec4,
    radius: f32,
    dt: f32,
    plane: &CollisionPlane,
    settings: CollisionSettings,
) -> bool {
    let normal = plane.normal;
    let motion = velocity.truncate();
    if motion.dot(normal) > 0.0 {
        return false;
    }

    let sphere_point = *position - normal * radius;
    let Some(plane_hit) = plane.intersect_ray(sphere_point, motion.normalize_or_zero()) else {
        return false;
    };

    let distance_to_collision = sphere_point.distance(plane_hit);
    let distance_to_destination = (motion * dt).length();
    let origin_to_collision = position.distance(plane_hit);

    if distance_to_collision >= distance_to_destination && origin_to_collision >= radius {
        return false;
    }

    let reflected =
        (motion - normal * (1.0 + settings.bounce) * motion.dot(normal)) * (1.0 - settings.dampen);
    let remaining = if distance_to_destination > 0.0 {
        (1.0 - distance_to_collision / distance_to_destination).clamp(0.0, 1.0)
    } else {
        0.0
    };

    *position = plane_hit + normal * radius + reflected * dt * remaining;
    *velocity = reflected.extend(0.0);
    true
}
