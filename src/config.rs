//! Authored state of one particle system.
//!
//! A [`ParticleSystemConfig`] is a set of property handles into the shared
//! [`PropertyGraph`]. Building it from a [`ConfigDescriptor`] with an
//! ancestor config makes it a prefab instance: fields the descriptor leaves
//! out inherit from the ancestor, fields it names become local overrides.

use bevy::prelude::*;
use bevy_prefab_props::{GroupBuilder, Prop, PropertyGraph, PropertyGroup};
use serde::{Deserialize, Serialize};

use crate::collision::CollisionSettings;
use crate::eval::{ColorEval, ColorMode, ScalarEval};
use crate::modules::{
    CollisionDescriptor, CollisionModule, LifetimeColorDescriptor, LifetimeColorModule,
    LifetimeSizeDescriptor, LifetimeSizeModule, LifetimeVelocity, LifetimeVelocityDescriptor,
    LifetimeVelocityModule, Module, RendererDescriptor, RendererModule,
};
use crate::scene::DrawableRequest;
use crate::shape::{EmitterShape, ShapeConfig, ShapeDescriptor};
use crate::value::{ColorDescriptor, ColorValue, ScalarDefaults, ScalarDescriptor, ScalarValue};

pub const DEFAULT_DURATION: f32 = 5.0;
pub const DEFAULT_RATE: f32 = 2.0;
pub const DEFAULT_MAX_POINTS: u32 = 50;
pub const DEFAULT_LIFETIME: f32 = 5.0;
pub const DEFAULT_START_VELOCITY: f32 = 5.0;
pub const DEFAULT_START_SIZE: f32 = 1.0;
pub const DEFAULT_GRAVITY_MODIFIER: f32 = 1.0;

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Persisted config. Every field may be absent when it is inherited unchanged.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ConfigDescriptor {
    /// Seconds per emission cycle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f32>,
    /// Particles per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_points: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<ShapeDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifetime: Option<ScalarDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_velocity: Option<ScalarDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_size: Option<ScalarDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_color: Option<ColorDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gravity_modifier: Option<ScalarDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifetime_size: Option<LifetimeSizeDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifetime_velocity: Option<LifetimeVelocityDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifetime_color: Option<LifetimeColorDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collision: Option<CollisionDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renderer: Option<RendererDescriptor>,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Plain values of a config, resolved once and read by every particle of a tick.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigSnapshot {
    pub duration: f32,
    pub rate: f32,
    pub max_points: usize,
    pub shape: EmitterShape,
    pub lifetime: ScalarEval,
    pub start_velocity: ScalarEval,
    pub start_size: ScalarEval,
    pub start_color: ColorEval,
    pub gravity_modifier: ScalarEval,
    pub lifetime_size: Option<ScalarEval>,
    pub lifetime_velocity: Option<LifetimeVelocity>,
    pub lifetime_color: Option<ColorEval>,
    pub collision: Option<CollisionSettings>,
    /// `None` when the renderer module is disabled.
    pub renderer: Option<DrawableRequest>,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            duration: DEFAULT_DURATION,
            rate: DEFAULT_RATE,
            max_points: DEFAULT_MAX_POINTS as usize,
            shape: EmitterShape::default(),
            lifetime: ScalarEval::Constant(DEFAULT_LIFETIME),
            start_velocity: ScalarEval::Constant(DEFAULT_START_VELOCITY),
            start_size: ScalarEval::Constant(DEFAULT_START_SIZE),
            start_color: ColorEval::Constant(LinearRgba::WHITE),
            gravity_modifier: ScalarEval::Constant(DEFAULT_GRAVITY_MODIFIER),
            lifetime_size: None,
            lifetime_velocity: None,
            lifetime_color: None,
            collision: None,
            renderer: Some(DrawableRequest::default()),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct ParticleSystemConfig {
    group: PropertyGroup,
    shape_group: PropertyGroup,
    pub duration: Prop<f32>,
    pub rate: Prop<f32>,
    pub max_points: Prop<u32>,
    pub lifetime: ScalarValue,
    pub start_velocity: ScalarValue,
    pub start_size: ScalarValue,
    pub start_color: ColorValue,
    pub gravity_modifier: ScalarValue,
    pub shape: ShapeConfig,
    pub lifetime_size: LifetimeSizeModule,
    pub lifetime_velocity: LifetimeVelocityModule,
    pub lifetime_color: LifetimeColorModule,
    pub collision: CollisionModule,
    pub renderer: RendererModule,
}

impl ParticleSystemConfig {
    /// Build a config. With an `ancestor`, leaves the descriptor omits are
    /// inherited and the ones it names are local overrides.
    pub fn from_descriptor(
        graph: &mut PropertyGraph,
        desc: &ConfigDescriptor,
        ancestor: Option<&ParticleSystemConfig>,
    ) -> Self {
        let mut builder = GroupBuilder::new(graph, "system");
        let duration = builder.prop(
            "duration",
            desc.duration,
            ancestor.map(|a| a.duration),
            DEFAULT_DURATION,
        );
        let rate = builder.prop("rate", desc.rate, ancestor.map(|a| a.rate), DEFAULT_RATE);
        let max_points = builder.prop(
            "max_points",
            desc.max_points,
            ancestor.map(|a| a.max_points),
            DEFAULT_MAX_POINTS,
        );
        let lifetime = ScalarValue::build(
            &mut builder,
            "lifetime",
            desc.lifetime.as_ref(),
            ancestor.map(|a| &a.lifetime),
            &ScalarDefaults::constant(DEFAULT_LIFETIME),
        );
        let start_velocity = ScalarValue::build(
            &mut builder,
            "start_velocity",
            desc.start_velocity.as_ref(),
            ancestor.map(|a| &a.start_velocity),
            &ScalarDefaults::constant(DEFAULT_START_VELOCITY),
        );
        let start_size = ScalarValue::build(
            &mut builder,
            "start_size",
            desc.start_size.as_ref(),
            ancestor.map(|a| &a.start_size),
            &ScalarDefaults::constant(DEFAULT_START_SIZE),
        );
        let start_color = ColorValue::build(
            &mut builder,
            "start_color",
            desc.start_color.as_ref(),
            ancestor.map(|a| &a.start_color),
            ColorMode::Constant,
            [1.0; 4],
        );
        let gravity_modifier = ScalarValue::build(
            &mut builder,
            "gravity_modifier",
            desc.gravity_modifier.as_ref(),
            ancestor.map(|a| &a.gravity_modifier),
            &ScalarDefaults::constant(DEFAULT_GRAVITY_MODIFIER),
        );
        let group = builder.finish();

        let mut builder = GroupBuilder::new(graph, "shape");
        let shape = ShapeConfig::build(
            &mut builder,
            desc.shape.as_ref(),
            ancestor.map(|a| &a.shape),
        );
        let shape_group = builder.finish();

        Self {
            group,
            shape_group,
            duration,
            rate,
            max_points,
            lifetime,
            start_velocity,
            start_size,
            start_color,
            gravity_modifier,
            shape,
            lifetime_size: LifetimeSizeModule::build(
                graph,
                desc.lifetime_size.as_ref(),
                ancestor.map(|a| &a.lifetime_size),
            ),
            lifetime_velocity: LifetimeVelocityModule::build(
                graph,
                desc.lifetime_velocity.as_ref(),
                ancestor.map(|a| &a.lifetime_velocity),
            ),
            lifetime_color: LifetimeColorModule::build(
                graph,
                desc.lifetime_color.as_ref(),
                ancestor.map(|a| &a.lifetime_color),
            ),
            collision: CollisionModule::build(
                graph,
                desc.collision.as_ref(),
                ancestor.map(|a| &a.collision),
            ),
            renderer: RendererModule::build(
                graph,
                desc.renderer.as_ref(),
                ancestor.map(|a| &a.renderer),
            ),
        }
    }

    /// Pure prefab instance of `ancestor` with no local values.
    pub fn derive(graph: &mut PropertyGraph, ancestor: &ParticleSystemConfig) -> Self {
        Self::from_descriptor(graph, &ConfigDescriptor::default(), Some(ancestor))
    }

    /// Every property group of the config, top-level fields first.
    pub fn groups(&self) -> [&PropertyGroup; 7] {
        [
            &self.group,
            &self.shape_group,
            self.lifetime_size.group(),
            self.lifetime_velocity.group(),
            self.lifetime_color.group(),
            self.collision.group(),
            self.renderer.group(),
        ]
    }

    pub fn has_overrides(&self, graph: &PropertyGraph) -> bool {
        self.groups().iter().any(|g| g.has_overrides(graph))
    }

    /// Names of every overridden property, for conflict display.
    pub fn overridden_names<'g>(&self, graph: &'g PropertyGraph) -> Vec<&'g str> {
        self.groups()
            .iter()
            .flat_map(|g| g.overridden_names(graph))
            .collect()
    }

    /// Push every local override into the ancestor. Returns how many were applied.
    pub fn apply_overrides(&self, graph: &mut PropertyGraph) -> usize {
        let applied: usize = self.groups().iter().map(|g| g.apply_all(graph)).sum();
        if applied > 0 {
            info!("Applied {} particle overrides to the base config", applied);
        }
        applied
    }

    /// Discard every local override. Returns how many were reverted.
    pub fn revert_overrides(&self, graph: &mut PropertyGraph) -> usize {
        let reverted: usize = self.groups().iter().map(|g| g.revert_all(graph)).sum();
        if reverted > 0 {
            info!("Reverted {} particle overrides", reverted);
        }
        reverted
    }

    /// Remove every property of this config. Instances derived from it
    /// become roots holding their current values.
    pub fn remove(self, graph: &mut PropertyGraph) {
        for group in self.groups() {
            group.clone().remove_all(graph);
        }
    }

    /// Persisted form. With `overrides_only`, only roots and overridden leaves
    /// are emitted; `None` means there is nothing to persist.
    pub fn to_descriptor(
        &self,
        graph: &PropertyGraph,
        overrides_only: bool,
    ) -> Option<ConfigDescriptor> {
        let desc = ConfigDescriptor {
            duration: graph.descriptor(self.duration, overrides_only),
            rate: graph.descriptor(self.rate, overrides_only),
            max_points: graph.descriptor(self.max_points, overrides_only),
            shape: self.shape.descriptor(graph, overrides_only),
            lifetime: self.lifetime.descriptor(graph, overrides_only),
            start_velocity: self.start_velocity.descriptor(graph, overrides_only),
            start_size: self.start_size.descriptor(graph, overrides_only),
            start_color: self.start_color.descriptor(graph, overrides_only),
            gravity_modifier: self.gravity_modifier.descriptor(graph, overrides_only),
            lifetime_size: self.lifetime_size.descriptor(graph, overrides_only),
            lifetime_velocity: self.lifetime_velocity.descriptor(graph, overrides_only),
            lifetime_color: self.lifetime_color.descriptor(graph, overrides_only),
            collision: self.collision.descriptor(graph, overrides_only),
            renderer: self.renderer.descriptor(graph, overrides_only),
        };
        (desc != ConfigDescriptor::default()).then_some(desc)
    }

    pub fn snapshot(&self, graph: &PropertyGraph) -> ConfigSnapshot {
        ConfigSnapshot {
            duration: graph.value(self.duration),
            rate: graph.value(self.rate),
            max_points: graph.value(self.max_points) as usize,
            shape: self.shape.resolve(graph),
            lifetime: self.lifetime.resolve(graph),
            start_velocity: self.start_velocity.resolve(graph),
            start_size: self.start_size.resolve(graph),
            start_color: self.start_color.resolve(graph),
            gravity_modifier: self.gravity_modifier.resolve(graph),
            lifetime_size: self.lifetime_size.resolve(graph),
            lifetime_velocity: self.lifetime_velocity.resolve(graph),
            lifetime_color: self.lifetime_color.resolve(graph),
            collision: self.collision.resolve(graph),
            renderer: self.renderer.resolve(graph),
        }
    }
}
