//! Emission shapes: where a particle is born and which way it starts moving.

use std::f32::consts::TAU;

use bevy::prelude::*;
use bevy_prefab_props::{GroupBuilder, Prop, PropertyGraph};
use serde::{Deserialize, Serialize};

/// Hemisphere emission currently draws from the full sphere, exactly like
/// [`ShapeKind::Sphere`]. Kept as observed behavior until a hemispherical
/// constraint is confirmed as intended.
pub const HEMISPHERE_SAMPLES_FULL_SPHERE: bool = true;

pub const DEFAULT_CONE_ANGLE: f32 = 25.0;
pub const DEFAULT_CONE_RADIUS: f32 = 1.0;
pub const DEFAULT_SPHERE_RADIUS: f32 = 1.0;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Reflect)]
pub enum ShapeKind {
    #[default]
    Cone,
    Sphere,
    Hemisphere,
    Box,
}

impl ShapeKind {
    pub const ALL: [Self; 4] = [Self::Cone, Self::Sphere, Self::Hemisphere, Self::Box];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Cone => "Cone",
            Self::Sphere => "Sphere",
            Self::Hemisphere => "Hemisphere",
            Self::Box => "Box",
        }
    }
}

/// One emission sample in emitter-local space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ShapeSample {
    pub position: Vec3,
    /// Not normalized: its magnitude scales the start velocity.
    pub direction: Vec3,
}

/// Resolved emission shape.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EmitterShape {
    Disabled,
    Cone {
        /// Tilt of the emission direction away from the cone axis, in degrees.
        angle_deg: f32,
        /// Distance of the emission ring from the axis.
        origin_radius: f32,
    },
    Sphere { radius: f32 },
    Hemisphere { radius: f32 },
    Box { size: Vec3 },
}

impl Default for EmitterShape {
    fn default() -> Self {
        Self::Cone {
            angle_deg: DEFAULT_CONE_ANGLE,
            origin_radius: DEFAULT_CONE_RADIUS,
        }
    }
}

impl EmitterShape {
    pub fn sample(&self) -> ShapeSample {
        match *self {
            Self::Disabled => ShapeSample::default(),
            Self::Cone {
                angle_deg,
                origin_radius,
            } => sample_cone(angle_deg, origin_radius),
            // see HEMISPHERE_SAMPLES_FULL_SPHERE
            Self::Sphere { radius } | Self::Hemisphere { radius } => sample_sphere(radius),
            Self::Box { size } => sample_box(size),
        }
    }
}

fn sample_cone(angle_deg: f32, origin_radius: f32) -> ShapeSample {
    let azimuth = Quat::from_rotation_y(fastrand::f32() * TAU);
    let tilt = Quat::from_rotation_x(angle_deg.to_radians());

    let origin = azimuth * Vec3::new(0.0, 0.0, origin_radius);
    let target = azimuth * tilt * Vec3::new(0.0, 1.0, origin_radius);
    ShapeSample {
        position: origin,
        direction: target - origin,
    }
}

fn sample_sphere(radius: f32) -> ShapeSample {
    let theta = TAU * fastrand::f32();
    let phi = (2.0 * fastrand::f32() - 1.0).clamp(-1.0, 1.0).acos();
    let point = radius
        * Vec3::new(
            phi.sin() * theta.cos(),
            phi.sin() * theta.sin(),
            phi.cos(),
        );
    ShapeSample {
        position: point,
        direction: point,
    }
}

fn sample_box(size: Vec3) -> ShapeSample {
    let r = Vec3::new(fastrand::f32(), fastrand::f32(), fastrand::f32());
    ShapeSample {
        position: (r - Vec3::splat(0.5)) * size,
        direction: Vec3::Y,
    }
}

// ---------------------------------------------------------------------------
// Property-backed config
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ConeDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_radius: Option<f32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RadiusDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct BoxDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Vec3>,
}

/// Persisted form of a [`ShapeConfig`].
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ShapeDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ShapeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cone: Option<ConeDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sphere: Option<RadiusDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hemisphere: Option<RadiusDescriptor>,
    #[serde(rename = "box", default, skip_serializing_if = "Option::is_none")]
    pub box_shape: Option<BoxDescriptor>,
}

impl ShapeDescriptor {
    pub fn cone(angle: f32, origin_radius: f32) -> Self {
        Self {
            kind: Some(ShapeKind::Cone),
            cone: Some(ConeDescriptor {
                angle: Some(angle),
                origin_radius: Some(origin_radius),
            }),
            ..default()
        }
    }

    pub fn sphere(radius: f32) -> Self {
        Self {
            kind: Some(ShapeKind::Sphere),
            sphere: Some(RadiusDescriptor {
                radius: Some(radius),
            }),
            ..default()
        }
    }

    pub fn hemisphere(radius: f32) -> Self {
        Self {
            kind: Some(ShapeKind::Hemisphere),
            hemisphere: Some(RadiusDescriptor {
                radius: Some(radius),
            }),
            ..default()
        }
    }

    pub fn box_shape(size: Vec3) -> Self {
        Self {
            kind: Some(ShapeKind::Box),
            box_shape: Some(BoxDescriptor { size: Some(size) }),
            ..default()
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ShapeConfig {
    pub enabled: Prop<bool>,
    pub kind: Prop<ShapeKind>,
    pub cone_angle: Prop<f32>,
    pub cone_radius: Prop<f32>,
    pub sphere_radius: Prop<f32>,
    pub hemisphere_radius: Prop<f32>,
    pub box_size: Prop<Vec3>,
}

impl ShapeConfig {
    pub fn build(
        builder: &mut GroupBuilder,
        desc: Option<&ShapeDescriptor>,
        base: Option<&ShapeConfig>,
    ) -> Self {
        let cone = desc.and_then(|d| d.cone.as_ref());
        let sphere = desc.and_then(|d| d.sphere.as_ref());
        let hemisphere = desc.and_then(|d| d.hemisphere.as_ref());
        let box_shape = desc.and_then(|d| d.box_shape.as_ref());
        Self {
            enabled: builder.prop(
                "enabled",
                desc.and_then(|d| d.enabled),
                base.map(|b| b.enabled),
                true,
            ),
            kind: builder.prop(
                "type",
                desc.and_then(|d| d.kind),
                base.map(|b| b.kind),
                ShapeKind::Cone,
            ),
            cone_angle: builder.prop(
                "cone.angle",
                cone.and_then(|c| c.angle),
                base.map(|b| b.cone_angle),
                DEFAULT_CONE_ANGLE,
            ),
            cone_radius: builder.prop(
                "cone.origin_radius",
                cone.and_then(|c| c.origin_radius),
                base.map(|b| b.cone_radius),
                DEFAULT_CONE_RADIUS,
            ),
            sphere_radius: builder.prop(
                "sphere.radius",
                sphere.and_then(|s| s.radius),
                base.map(|b| b.sphere_radius),
                DEFAULT_SPHERE_RADIUS,
            ),
            hemisphere_radius: builder.prop(
                "hemisphere.radius",
                hemisphere.and_then(|s| s.radius),
                base.map(|b| b.hemisphere_radius),
                DEFAULT_SPHERE_RADIUS,
            ),
            box_size: builder.prop(
                "box.size",
                box_shape.and_then(|b| b.size),
                base.map(|b| b.box_size),
                Vec3::ONE,
            ),
        }
    }

    pub fn resolve(&self, graph: &PropertyGraph) -> EmitterShape {
        if !graph.value(self.enabled) {
            return EmitterShape::Disabled;
        }
        match graph.value(self.kind) {
            ShapeKind::Cone => EmitterShape::Cone {
                angle_deg: graph.value(self.cone_angle),
                origin_radius: graph.value(self.cone_radius),
            },
            ShapeKind::Sphere => EmitterShape::Sphere {
                radius: graph.value(self.sphere_radius),
            },
            ShapeKind::Hemisphere => EmitterShape::Hemisphere {
                radius: graph.value(self.hemisphere_radius),
            },
            ShapeKind::Box => EmitterShape::Box {
                size: graph.value(self.box_size),
            },
        }
    }

    pub fn descriptor(&self, graph: &PropertyGraph, overrides_only: bool) -> Option<ShapeDescriptor> {
        let cone = ConeDescriptor {
            angle: graph.descriptor(self.cone_angle, overrides_only),
            origin_radius: graph.descriptor(self.cone_radius, overrides_only),
        };
        let sphere = RadiusDescriptor {
            radius: graph.descriptor(self.sphere_radius, overrides_only),
        };
        let hemisphere = RadiusDescriptor {
            radius: graph.descriptor(self.hemisphere_radius, overrides_only),
        };
        let box_shape = BoxDescriptor {
            size: graph.descriptor(self.box_size, overrides_only),
        };
        let desc = ShapeDescriptor {
            enabled: graph.descriptor(self.enabled, overrides_only),
            kind: graph.descriptor(self.kind, overrides_only),
            cone: (cone != ConeDescriptor::default()).then_some(cone),
            sphere: sphere.radius.is_some().then_some(sphere),
            hemisphere: hemisphere.radius.is_some().then_some(hemisphere),
            box_shape: box_shape.size.is_some().then_some(box_shape),
        };
        (desc != ShapeDescriptor::default()).then_some(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn disabled_shape_emits_from_origin_without_direction() {
        let sample = EmitterShape::Disabled.sample();
        assert_eq!(sample.position, Vec3::ZERO);
        assert_eq!(sample.direction, Vec3::ZERO);
    }

    #[test]
    fn cone_origin_sits_on_fixed_radius_ring() {
        let shape = EmitterShape::Cone {
            angle_deg: 30.0,
            origin_radius: 2.0,
        };
        for _ in 0..50 {
            let sample = shape.sample();
            assert!((sample.position.length() - 2.0).abs() < EPS);
            assert!(sample.position.y.abs() < EPS);
            // the tilted ring point minus the origin; not unit length
            let angle = 30f32.to_radians();
            let expected = Vec3::new(0.0, angle.cos() - 2.0 * angle.sin(), angle.sin() + 2.0 * angle.cos() - 2.0);
            assert!((sample.direction.length() - expected.length()).abs() < EPS);
            assert!((sample.direction.y - expected.y).abs() < EPS);
        }
    }

    #[test]
    fn straight_cone_points_up() {
        let shape = EmitterShape::Cone {
            angle_deg: 0.0,
            origin_radius: 0.0,
        };
        let sample = shape.sample();
        assert!(sample.position.length() < EPS);
        assert!((sample.direction - Vec3::Y).length() < EPS);
    }

    #[test]
    fn sphere_emits_radially_on_surface() {
        let shape = EmitterShape::Sphere { radius: 3.0 };
        for _ in 0..50 {
            let sample = shape.sample();
            assert!((sample.position.length() - 3.0).abs() < 1e-4);
            assert_eq!(sample.position, sample.direction);
        }
    }

    #[test]
    fn hemisphere_matches_full_sphere_sampler() {
        assert!(HEMISPHERE_SAMPLES_FULL_SPHERE);
        let shape = EmitterShape::Hemisphere { radius: 1.0 };
        let below = (0..500)
            .map(|_| shape.sample())
            .filter(|s| s.position.y < 0.0 || s.position.z < 0.0)
            .count();
        assert!(below > 0);
    }

    #[test]
    fn box_stays_inside_extent() {
        let size = Vec3::new(2.0, 4.0, 6.0);
        let shape = EmitterShape::Box { size };
        for _ in 0..50 {
            let sample = shape.sample();
            assert!(sample.position.abs().cmple(size / 2.0).all());
            assert_eq!(sample.direction, Vec3::Y);
        }
    }

    #[test]
    fn config_resolves_and_diffs() {
        let mut graph = PropertyGraph::new();
        let mut builder = GroupBuilder::new(&mut graph, "shape");
        let base = ShapeConfig::build(&mut builder, None, None);
        let desc = ShapeDescriptor::sphere(4.0);
        let variation = ShapeConfig::build(&mut builder, Some(&desc), Some(&base));

        assert_eq!(base.resolve(&graph), EmitterShape::default());
        assert_eq!(variation.resolve(&graph), EmitterShape::Sphere { radius: 4.0 });
        assert_eq!(variation.descriptor(&graph, true), Some(desc));

        graph.set(base.enabled, false, false);
        assert_eq!(variation.resolve(&graph), EmitterShape::Disabled);
    }

    #[test]
    fn descriptor_uses_type_key() {
        let text = ron::to_string(&ShapeDescriptor::sphere(1.0)).unwrap();
        assert!(text.contains("type:"));
        let back: ShapeDescriptor = ron::from_str(&text).unwrap();
        assert_eq!(back.kind, Some(ShapeKind::Sphere));
    }
}
