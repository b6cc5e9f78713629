//! Collaborator traits the simulation draws through.
//!
//! The simulation never touches a renderer or an ECS directly. It asks a
//! [`DrawableFactory`] for one shared drawable per system and places one node
//! per particle through [`SceneNode`].

use bevy::prelude::*;

use crate::modules::RendererMode;

/// What a system wants to be drawn with.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Reflect)]
pub struct DrawableRequest {
    pub kind: RendererMode,
    pub material_id: Option<String>,
    pub mesh_id: Option<String>,
}

/// Turns a drawable request into a render handle.
pub trait DrawableFactory {
    type Drawable: Clone;

    fn create(&mut self, request: &DrawableRequest) -> Self::Drawable;
}

/// Scene graph the particles live in.
pub trait SceneNode {
    type Node: Copy;
    type Drawable;

    fn add_node(&mut self) -> Self::Node;
    fn remove_node(&mut self, node: Self::Node);
    /// Place a node with a uniform `scale`.
    fn set_transform(&mut self, node: Self::Node, position: Vec3, scale: f32);
    fn set_color(&mut self, node: Self::Node, color: LinearRgba);
    fn add_component(&mut self, node: Self::Node, drawable: &Self::Drawable);
    fn remove_component(&mut self, node: Self::Node);
}
