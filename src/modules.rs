//! Togglable simulation modules.
//!
//! Each module owns a [`PropertyGroup`] so the host can ask per module
//! whether an instance diverges from its prefab base.

use bevy::prelude::*;
use bevy_prefab_props::{GroupBuilder, Prop, PropertyGraph, PropertyGroup};
use serde::{Deserialize, Serialize};

use crate::collision::CollisionSettings;
use crate::curve::Curve;
use crate::eval::{ColorEval, ColorMode, ScalarEval, Vector3Eval};
use crate::gradient::Gradient;
use crate::scene::DrawableRequest;
use crate::value::{
    ColorDescriptor, ColorValue, ScalarDefaults, ScalarDescriptor, ScalarValue,
    Vector3Descriptor, Vector3Value,
};

pub const DEFAULT_BOUNCE: f32 = 1.0;
pub const DEFAULT_DAMPEN: f32 = 0.0;

/// Access to the property group a module records its members in.
pub trait Module {
    fn group(&self) -> &PropertyGroup;

    fn has_overrides(&self, graph: &PropertyGraph) -> bool {
        self.group().has_overrides(graph)
    }
}

fn enabled_prop(
    builder: &mut GroupBuilder,
    explicit: Option<bool>,
    base: Option<Prop<bool>>,
    default: bool,
) -> Prop<bool> {
    builder.prop("enabled", explicit, base, default)
}

// ---------------------------------------------------------------------------
// Collision
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct CollisionDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounce: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dampen: Option<f32>,
}

/// Ground-plane collision for every particle.
#[derive(Clone, Debug)]
pub struct CollisionModule {
    group: PropertyGroup,
    pub enabled: Prop<bool>,
    pub bounce: Prop<f32>,
    pub dampen: Prop<f32>,
}

impl CollisionModule {
    pub fn build(
        graph: &mut PropertyGraph,
        desc: Option<&CollisionDescriptor>,
        base: Option<&CollisionModule>,
    ) -> Self {
        let mut builder = GroupBuilder::new(graph, "collision");
        let enabled = enabled_prop(
            &mut builder,
            desc.and_then(|d| d.enabled),
            base.map(|b| b.enabled),
            false,
        );
        let bounce = builder.prop(
            "bounce",
            desc.and_then(|d| d.bounce),
            base.map(|b| b.bounce),
            DEFAULT_BOUNCE,
        );
        let dampen = builder.prop(
            "dampen",
            desc.and_then(|d| d.dampen),
            base.map(|b| b.dampen),
            DEFAULT_DAMPEN,
        );
        Self {
            group: builder.finish(),
            enabled,
            bounce,
            dampen,
        }
    }

    /// Settings for this tick, or `None` when disabled.
    pub fn resolve(&self, graph: &PropertyGraph) -> Option<CollisionSettings> {
        graph.value(self.enabled).then(|| CollisionSettings {
            bounce: graph.value(self.bounce),
            dampen: graph.value(self.dampen),
        })
    }

    pub fn descriptor(
        &self,
        graph: &PropertyGraph,
        overrides_only: bool,
    ) -> Option<CollisionDescriptor> {
        let desc = CollisionDescriptor {
            enabled: graph.descriptor(self.enabled, overrides_only),
            bounce: graph.descriptor(self.bounce, overrides_only),
            dampen: graph.descriptor(self.dampen, overrides_only),
        };
        (desc != CollisionDescriptor::default()).then_some(desc)
    }
}

impl Module for CollisionModule {
    fn group(&self) -> &PropertyGroup {
        &self.group
    }
}

// ---------------------------------------------------------------------------
// Size over lifetime
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct LifetimeSizeDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<ScalarDescriptor>,
}

/// Multiplies the start size by a value of the particle's age.
#[derive(Clone, Debug)]
pub struct LifetimeSizeModule {
    group: PropertyGroup,
    pub enabled: Prop<bool>,
    pub size: ScalarValue,
}

impl LifetimeSizeModule {
    pub fn build(
        graph: &mut PropertyGraph,
        desc: Option<&LifetimeSizeDescriptor>,
        base: Option<&LifetimeSizeModule>,
    ) -> Self {
        let mut builder = GroupBuilder::new(graph, "lifetime_size");
        let enabled = enabled_prop(
            &mut builder,
            desc.and_then(|d| d.enabled),
            base.map(|b| b.enabled),
            false,
        );
        let size = ScalarValue::build(
            &mut builder,
            "size",
            desc.and_then(|d| d.size.as_ref()),
            base.map(|b| &b.size),
            &ScalarDefaults::curve(Curve::linear(1.0, 0.0), [0.0, 1.0]),
        );
        Self {
            group: builder.finish(),
            enabled,
            size,
        }
    }

    pub fn resolve(&self, graph: &PropertyGraph) -> Option<ScalarEval> {
        graph.value(self.enabled).then(|| self.size.resolve(graph))
    }

    pub fn descriptor(
        &self,
        graph: &PropertyGraph,
        overrides_only: bool,
    ) -> Option<LifetimeSizeDescriptor> {
        let desc = LifetimeSizeDescriptor {
            enabled: graph.descriptor(self.enabled, overrides_only),
            size: self.size.descriptor(graph, overrides_only),
        };
        (desc != LifetimeSizeDescriptor::default()).then_some(desc)
    }
}

impl Module for LifetimeSizeModule {
    fn group(&self) -> &PropertyGroup {
        &self.group
    }
}

// ---------------------------------------------------------------------------
// Velocity over lifetime
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct LifetimeVelocityDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_modifier: Option<ScalarDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force: Option<Vector3Descriptor>,
}

/// Per-tick values of an enabled [`LifetimeVelocityModule`].
#[derive(Clone, Debug, PartialEq)]
pub struct LifetimeVelocity {
    pub speed_modifier: ScalarEval,
    pub force: Vector3Eval,
}

/// Adds a force and scales velocity as the particle ages.
#[derive(Clone, Debug)]
pub struct LifetimeVelocityModule {
    group: PropertyGroup,
    pub enabled: Prop<bool>,
    pub speed_modifier: ScalarValue,
    pub force: Vector3Value,
}

impl LifetimeVelocityModule {
    pub fn build(
        graph: &mut PropertyGraph,
        desc: Option<&LifetimeVelocityDescriptor>,
        base: Option<&LifetimeVelocityModule>,
    ) -> Self {
        let mut builder = GroupBuilder::new(graph, "lifetime_velocity");
        let enabled = enabled_prop(
            &mut builder,
            desc.and_then(|d| d.enabled),
            base.map(|b| b.enabled),
            false,
        );
        let speed_modifier = ScalarValue::build(
            &mut builder,
            "speed_modifier",
            desc.and_then(|d| d.speed_modifier.as_ref()),
            base.map(|b| &b.speed_modifier),
            &ScalarDefaults::constant(1.0),
        );
        let force = Vector3Value::build(
            &mut builder,
            "force",
            desc.and_then(|d| d.force.as_ref()),
            base.map(|b| &b.force),
            Vec3::ZERO,
        );
        Self {
            group: builder.finish(),
            enabled,
            speed_modifier,
            force,
        }
    }

    pub fn resolve(&self, graph: &PropertyGraph) -> Option<LifetimeVelocity> {
        graph.value(self.enabled).then(|| LifetimeVelocity {
            speed_modifier: self.speed_modifier.resolve(graph),
            force: self.force.resolve(graph),
        })
    }

    pub fn descriptor(
        &self,
        graph: &PropertyGraph,
        overrides_only: bool,
    ) -> Option<LifetimeVelocityDescriptor> {
        let desc = LifetimeVelocityDescriptor {
            enabled: graph.descriptor(self.enabled, overrides_only),
            speed_modifier: self.speed_modifier.descriptor(graph, overrides_only),
            force: self.force.descriptor(graph, overrides_only),
        };
        (desc != LifetimeVelocityDescriptor::default()).then_some(desc)
    }
}

impl Module for LifetimeVelocityModule {
    fn group(&self) -> &PropertyGroup {
        &self.group
    }
}

// ---------------------------------------------------------------------------
// Color over lifetime
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct LifetimeColorDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<ColorDescriptor>,
}

/// Tints the start color as the particle ages (multiplied, never replaced).
#[derive(Clone, Debug)]
pub struct LifetimeColorModule {
    group: PropertyGroup,
    pub enabled: Prop<bool>,
    pub color: ColorValue,
}

impl LifetimeColorModule {
    pub fn build(
        graph: &mut PropertyGraph,
        desc: Option<&LifetimeColorDescriptor>,
        base: Option<&LifetimeColorModule>,
    ) -> Self {
        let mut builder = GroupBuilder::new(graph, "lifetime_color");
        let enabled = enabled_prop(
            &mut builder,
            desc.and_then(|d| d.enabled),
            base.map(|b| b.enabled),
            false,
        );
        let color = ColorValue::build(
            &mut builder,
            "color",
            desc.and_then(|d| d.color.as_ref()),
            base.map(|b| &b.color),
            ColorMode::Gradient,
            [1.0; 4],
        );
        Self {
            group: builder.finish(),
            enabled,
            color,
        }
    }

    pub fn resolve(&self, graph: &PropertyGraph) -> Option<ColorEval> {
        graph.value(self.enabled).then(|| self.color.resolve(graph))
    }

    pub fn descriptor(
        &self,
        graph: &PropertyGraph,
        overrides_only: bool,
    ) -> Option<LifetimeColorDescriptor> {
        let desc = LifetimeColorDescriptor {
            enabled: graph.descriptor(self.enabled, overrides_only),
            color: self.color.descriptor(graph, overrides_only),
        };
        (desc != LifetimeColorDescriptor::default()).then_some(desc)
    }
}

impl Module for LifetimeColorModule {
    fn group(&self) -> &PropertyGroup {
        &self.group
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// How each particle is drawn.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Reflect)]
pub enum RendererMode {
    /// Camera-facing quad.
    #[default]
    Billboard,
    /// Quad lying in the ground plane.
    FlatBillboard,
    /// Instanced mesh, selected by `mesh_id`.
    Mesh,
}

impl RendererMode {
    pub const ALL: [Self; 3] = [Self::Billboard, Self::FlatBillboard, Self::Mesh];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Billboard => "Billboard",
            Self::FlatBillboard => "Flat Billboard",
            Self::Mesh => "Mesh",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RendererDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<RendererMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_id: Option<String>,
}

/// Drawable selection for every particle of the system.
#[derive(Clone, Debug)]
pub struct RendererModule {
    group: PropertyGroup,
    pub enabled: Prop<bool>,
    pub mode: Prop<RendererMode>,
    pub material_id: Prop<Option<String>>,
    pub mesh_id: Prop<Option<String>>,
}

impl RendererModule {
    pub fn build(
        graph: &mut PropertyGraph,
        desc: Option<&RendererDescriptor>,
        base: Option<&RendererModule>,
    ) -> Self {
        let mut builder = GroupBuilder::new(graph, "renderer");
        let enabled = enabled_prop(
            &mut builder,
            desc.and_then(|d| d.enabled),
            base.map(|b| b.enabled),
            true,
        );
        let mode = builder.prop(
            "mode",
            desc.and_then(|d| d.mode),
            base.map(|b| b.mode),
            RendererMode::Billboard,
        );
        // an absent id inherits; ids cannot be cleared through a diff
        let material_id = builder.prop(
            "material_id",
            desc.and_then(|d| d.material_id.clone()).map(Some),
            base.map(|b| b.material_id),
            None,
        );
        let mesh_id = builder.prop(
            "mesh_id",
            desc.and_then(|d| d.mesh_id.clone()).map(Some),
            base.map(|b| b.mesh_id),
            None,
        );
        Self {
            group: builder.finish(),
            enabled,
            mode,
            material_id,
            mesh_id,
        }
    }

    pub fn resolve(&self, graph: &PropertyGraph) -> Option<DrawableRequest> {
        graph.value(self.enabled).then(|| DrawableRequest {
            kind: graph.value(self.mode),
            material_id: graph.value(self.material_id),
            mesh_id: graph.value(self.mesh_id),
        })
    }

    pub fn descriptor(
        &self,
        graph: &PropertyGraph,
        overrides_only: bool,
    ) -> Option<RendererDescriptor> {
        let desc = RendererDescriptor {
            enabled: graph.descriptor(self.enabled, overrides_only),
            mode: graph.descriptor(self.mode, overrides_only),
            material_id: graph.descriptor(self.material_id, overrides_only).flatten(),
            mesh_id: graph.descriptor(self.mesh_id, overrides_only).flatten(),
        };
        (desc != RendererDescriptor::default()).then_some(desc)
    }
}

impl Module for RendererModule {
    fn group(&self) -> &PropertyGroup {
        &self.group
    }
}

/// Default lifetime tint used by presets that fade out.
pub fn fade_out() -> ColorDescriptor {
    ColorDescriptor::gradient(Gradient::white_to_transparent())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collision_defaults() {
        let mut graph = PropertyGraph::new();
        let module = CollisionModule::build(&mut graph, None, None);
        assert_eq!(module.resolve(&graph), None);

        graph.set(module.enabled, true, false);
        assert_eq!(
            module.resolve(&graph),
            Some(CollisionSettings {
                bounce: 1.0,
                dampen: 0.0
            })
        );
    }

    #[test]
    fn module_group_tracks_overrides() {
        let mut graph = PropertyGraph::new();
        let base = CollisionModule::build(&mut graph, None, None);
        let variation = CollisionModule::build(&mut graph, None, Some(&base));
        assert!(!variation.has_overrides(&graph));
        assert_eq!(variation.descriptor(&graph, true), None);

        graph.set(variation.dampen, 0.3, true);
        assert!(variation.has_overrides(&graph));
        assert_eq!(
            variation.descriptor(&graph, true),
            Some(CollisionDescriptor {
                dampen: Some(0.3),
                ..default()
            })
        );
    }

    #[test]
    fn renderer_ids_inherit_and_override() {
        let mut graph = PropertyGraph::new();
        let base = RendererModule::build(
            &mut graph,
            Some(&RendererDescriptor {
                material_id: Some("spark".into()),
                ..default()
            }),
            None,
        );
        let variation = RendererModule::build(
            &mut graph,
            Some(&RendererDescriptor {
                mode: Some(RendererMode::Mesh),
                mesh_id: Some("rock".into()),
                ..default()
            }),
            Some(&base),
        );

        let request = variation.resolve(&graph).unwrap();
        assert_eq!(request.kind, RendererMode::Mesh);
        assert_eq!(request.material_id.as_deref(), Some("spark"));
        assert_eq!(request.mesh_id.as_deref(), Some("rock"));

        let diff = variation.descriptor(&graph, true).unwrap();
        assert_eq!(diff.material_id, None);
        assert_eq!(diff.mesh_id.as_deref(), Some("rock"));
    }

    #[test]
    fn disabled_lifetime_modules_resolve_to_none() {
        let mut graph = PropertyGraph::new();
        let size = LifetimeSizeModule::build(&mut graph, None, None);
        let velocity = LifetimeVelocityModule::build(&mut graph, None, None);
        let color = LifetimeColorModule::build(
            &mut graph,
            Some(&LifetimeColorDescriptor {
                enabled: Some(true),
                color: Some(fade_out()),
            }),
            None,
        );
        assert_eq!(size.resolve(&graph), None);
        assert_eq!(velocity.resolve(&graph), None);
        let tint = color.resolve(&graph).unwrap();
        assert_eq!(tint.sample(1.0).alpha, 0.0);
    }
}
