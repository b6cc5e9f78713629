//! Built-in particle configs, usable as prefab roots.

use bevy::prelude::*;

use crate::collision::CollisionSettings;
use crate::config::ConfigDescriptor;
use crate::curve::Curve;
use crate::gradient::Gradient;
use crate::modules::{
    CollisionDescriptor, LifetimeColorDescriptor, LifetimeSizeDescriptor,
    LifetimeVelocityDescriptor, RendererDescriptor, RendererMode, fade_out,
};
use crate::shape::ShapeDescriptor;
use crate::value::{ColorDescriptor, ScalarDescriptor, Vector3Descriptor};

pub fn default_presets() -> Vec<(&'static str, ConfigDescriptor)> {
    vec![
        ("Fire", fire()),
        ("Fountain", fountain()),
        ("Snow", snow()),
        ("Sparks", sparks()),
        ("Bouncing Debris", bouncing_debris()),
    ]
}

fn fire() -> ConfigDescriptor {
    ConfigDescriptor {
        rate: Some(40.0),
        max_points: Some(200),
        shape: Some(ShapeDescriptor::cone(10.0, 0.3)),
        lifetime: Some(ScalarDescriptor::random(0.6, 1.2)),
        start_velocity: Some(ScalarDescriptor::random(0.8, 1.6)),
        start_size: Some(ScalarDescriptor::random(0.3, 0.6)),
        gravity_modifier: Some(ScalarDescriptor::constant(-0.2)),
        lifetime_size: Some(LifetimeSizeDescriptor {
            enabled: Some(true),
            size: Some(ScalarDescriptor::curve(Curve::linear(1.0, 0.2), [0.0, 1.0])),
        }),
        lifetime_color: Some(LifetimeColorDescriptor {
            enabled: Some(true),
            color: Some(ColorDescriptor::gradient(Gradient::two_stop(
                [1.0, 0.9, 0.4, 1.0],
                [0.8, 0.1, 0.0, 0.0],
            ))),
        }),
        ..default()
    }
}

fn fountain() -> ConfigDescriptor {
    ConfigDescriptor {
        rate: Some(30.0),
        max_points: Some(150),
        shape: Some(ShapeDescriptor::cone(15.0, 0.1)),
        lifetime: Some(ScalarDescriptor::constant(2.0)),
        start_velocity: Some(ScalarDescriptor::random(6.0, 8.0)),
        start_size: Some(ScalarDescriptor::constant(0.15)),
        start_color: Some(ColorDescriptor::random(
            [0.3, 0.6, 1.0, 1.0],
            [0.7, 0.9, 1.0, 1.0],
        )),
        lifetime_color: Some(LifetimeColorDescriptor {
            enabled: Some(true),
            color: Some(fade_out()),
        }),
        ..default()
    }
}

fn snow() -> ConfigDescriptor {
    ConfigDescriptor {
        duration: Some(10.0),
        rate: Some(20.0),
        max_points: Some(300),
        shape: Some(ShapeDescriptor::box_shape(Vec3::new(20.0, 0.0, 20.0))),
        lifetime: Some(ScalarDescriptor::random(6.0, 9.0)),
        start_velocity: Some(ScalarDescriptor::constant(0.0)),
        start_size: Some(ScalarDescriptor::random(0.05, 0.12)),
        gravity_modifier: Some(ScalarDescriptor::constant(0.05)),
        lifetime_velocity: Some(LifetimeVelocityDescriptor {
            enabled: Some(true),
            force: Some(Vector3Descriptor::random(
                Vec3::new(-0.2, 0.0, -0.2),
                Vec3::new(0.2, 0.0, 0.2),
            )),
            ..default()
        }),
        ..default()
    }
}

fn sparks() -> ConfigDescriptor {
    ConfigDescriptor {
        duration: Some(1.0),
        rate: Some(60.0),
        max_points: Some(120),
        shape: Some(ShapeDescriptor::sphere(0.1)),
        lifetime: Some(ScalarDescriptor::random(0.3, 0.8)),
        start_velocity: Some(ScalarDescriptor::random(3.0, 7.0)),
        start_size: Some(ScalarDescriptor::constant(0.05)),
        start_color: Some(ColorDescriptor::constant([1.0, 0.8, 0.3, 1.0])),
        lifetime_velocity: Some(LifetimeVelocityDescriptor {
            enabled: Some(true),
            speed_modifier: Some(ScalarDescriptor::constant(0.97)),
            ..default()
        }),
        lifetime_color: Some(LifetimeColorDescriptor {
            enabled: Some(true),
            color: Some(fade_out()),
        }),
        renderer: Some(RendererDescriptor {
            mode: Some(RendererMode::Billboard),
            material_id: Some("spark".into()),
            ..default()
        }),
        ..default()
    }
}

fn bouncing_debris() -> ConfigDescriptor {
    let settings = CollisionSettings {
        bounce: 0.6,
        dampen: 0.3,
    };
    ConfigDescriptor {
        rate: Some(5.0),
        max_points: Some(40),
        shape: Some(ShapeDescriptor::hemisphere(0.5)),
        lifetime: Some(ScalarDescriptor::constant(4.0)),
        start_velocity: Some(ScalarDescriptor::random(3.0, 5.0)),
        start_size: Some(ScalarDescriptor::random(0.1, 0.3)),
        start_color: Some(ColorDescriptor::constant([0.45, 0.35, 0.25, 1.0])),
        collision: Some(CollisionDescriptor {
            enabled: Some(true),
            bounce: Some(settings.bounce),
            dampen: Some(settings.dampen),
        }),
        renderer: Some(RendererDescriptor {
            mode: Some(RendererMode::Mesh),
            mesh_id: Some("pebble".into()),
            ..default()
        }),
        ..default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParticleSystemConfig;
    use bevy_prefab_props::PropertyGraph;

    #[test]
    fn presets_have_unique_names() {
        let presets = default_presets();
        let mut names: Vec<_> = presets.iter().map(|(n, _)| *n).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), presets.len());
    }

    #[test]
    fn presets_build_as_roots_and_variations() {
        let mut graph = PropertyGraph::new();
        for (name, desc) in default_presets() {
            let root = ParticleSystemConfig::from_descriptor(&mut graph, &desc, None);
            let variation = ParticleSystemConfig::derive(&mut graph, &root);
            assert_eq!(
                root.snapshot(&graph),
                variation.snapshot(&graph),
                "{name}"
            );
            assert!(root.snapshot(&graph).max_points > 0, "{name}");
        }
    }

    #[test]
    fn debris_collides_with_ground() {
        let mut graph = PropertyGraph::new();
        let config = ParticleSystemConfig::from_descriptor(&mut graph, &bouncing_debris(), None);
        let collision = config.snapshot(&graph).collision.unwrap();
        assert_eq!(collision.bounce, 0.6);
        assert_eq!(collision.dampen, 0.3);
    }
}
