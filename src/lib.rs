//! # Bevy Prefab Particles
//!
//! CPU particle systems whose authored settings live in a prefab-style
//! property graph. A config derived from another inherits every value it does
//! not override, and base edits flow into every instance.
//!
//! ## Quick Start
//!
//! ```no_run
//! use bevy::prelude::*;
//! use bevy_prefab_particles::ParticlePlugin;
//!
//! fn main() {
//!     App::new()
//!         .add_plugins(DefaultPlugins)
//!         .add_plugins(ParticlePlugin::default())
//!         .run();
//! }
//! ```
//!
//! ## Spawning an Emitter
//!
//! Derive a config from a library preset and override what differs:
//!
//! ```ignore
//! let emitter = ParticleEmitter::from_library(
//!     &mut graph,
//!     &library,
//!     "Fire",
//!     "Campfire",
//!     &ConfigDescriptor { rate: Some(80.0), ..default() },
//! );
//! ```
//!
//! Particles are spawned as [`ParticleNode`] children of the emitter with a
//! `Transform`, a [`ParticleTint`] and the emitter's [`ParticleDrawable`].
//! Drawing them is up to the host app.

pub mod collision;
pub mod config;
pub mod curve;
pub mod eval;
pub mod gradient;
pub mod modules;
pub mod particle;
pub mod persist;
pub mod plugin;
pub mod presets;
pub mod scene;
pub mod shape;
pub mod system;
pub mod value;

// Re-export the main plugin and components
pub use plugin::{
    DrawableSpawner, EntityScene, ParticleDrawable, ParticleEmitter, ParticleLibrary,
    ParticleNode, ParticlePlugin, ParticleStore, ParticleTint, PendingSaves, SaveStatus,
};

// Re-export commonly used types
pub use bevy_prefab_props::{GroupBuilder, Prop, PropertyGraph, PropertyGroup};
pub use config::{ConfigDescriptor, ConfigSnapshot, ParticleSystemConfig};
pub use curve::{Curve, CurvePoint};
pub use eval::{ColorEval, ColorMode, ScalarEval, ScalarMode, Vector3Eval};
pub use gradient::{AlphaKey, ColorKey, Gradient};
pub use persist::{ConfigStore, LoadError, RonConfigStore, SaveError, SavedConfig};
pub use scene::{DrawableFactory, DrawableRequest, SceneNode};
pub use shape::{EmitterShape, ShapeKind};
pub use system::ParticleSystem;
