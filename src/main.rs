//! Headless demo: two instances of one preset, logging pool sizes.

use std::time::Duration;

use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;
use bevy_prefab_particles::{
    ConfigDescriptor, ParticleEmitter, ParticleLibrary, ParticlePlugin, PropertyGraph,
};

const REPORT_INTERVAL: f32 = 1.0;
const RUN_SECONDS: f32 = 10.0;

fn main() {
    App::new()
        .add_plugins(
            MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(
                1.0 / 60.0,
            ))),
        )
        .add_plugins(LogPlugin::default())
        .add_plugins(ParticlePlugin::default())
        .add_systems(Startup, spawn_emitters)
        .add_systems(Update, (report_pools, boost_base_rate, exit_after_run))
        .run();
}

fn spawn_emitters(
    mut commands: Commands,
    mut graph: ResMut<PropertyGraph>,
    library: Res<ParticleLibrary>,
) {
    info!("Available presets: {}", library.names().join(", "));

    let Some(fountain) = ParticleEmitter::from_library(
        &mut graph,
        &library,
        "Fountain",
        "Demo Fountain",
        &ConfigDescriptor::default(),
    ) else {
        return;
    };
    commands.spawn((Name::new("Fountain"), Transform::default(), fountain));

    if let Some(variation) = ParticleEmitter::from_library(
        &mut graph,
        &library,
        "Fountain",
        "Demo Fountain (wide)",
        &ConfigDescriptor {
            rate: Some(90.0),
            max_points: Some(400),
            ..default()
        },
    ) {
        commands.spawn((
            Name::new("Fountain (wide)"),
            Transform::from_xyz(4.0, 0.0, 0.0),
            variation,
        ));
    }

    // instances saved by earlier runs, other than the two above
    for (i, name) in library.instance_names().into_iter().enumerate() {
        if name.starts_with("Demo Fountain") {
            continue;
        }
        if let Some(emitter) = ParticleEmitter::restore(&mut graph, &library, name) {
            info!("Restored saved emitter '{}'", name);
            commands.spawn((
                Name::new(name.to_string()),
                Transform::from_xyz(-4.0 * (i as f32 + 1.0), 0.0, 0.0),
                emitter,
            ));
        }
    }
}

fn report_pools(
    time: Res<Time>,
    mut timer: Local<f32>,
    emitters: Query<(&Name, &ParticleEmitter)>,
) {
    *timer += time.delta_secs();
    if *timer < REPORT_INTERVAL {
        return;
    }
    *timer = 0.0;

    for (name, emitter) in &emitters {
        let snapshot = emitter.snapshot();
        info!(
            "{}: {} live particles (rate {}, max {})",
            name,
            emitter.system().len(),
            snapshot.rate,
            snapshot.max_points
        );
    }
}

/// Halfway through, edit the shared preset: the plain instance follows, the
/// variation keeps its own rate.
fn boost_base_rate(
    time: Res<Time>,
    mut done: Local<bool>,
    mut graph: ResMut<PropertyGraph>,
    library: Res<ParticleLibrary>,
) {
    if *done || time.elapsed_secs() < RUN_SECONDS / 2.0 {
        return;
    }
    *done = true;
    if let Some(fountain) = library.get("Fountain") {
        graph.set(fountain.rate, 60.0, false);
        info!("Raised the Fountain preset rate to 60");
    }
}

fn exit_after_run(time: Res<Time>, mut exit: MessageWriter<AppExit>) {
    if time.elapsed_secs() >= RUN_SECONDS {
        exit.write(AppExit::Success);
    }
}
