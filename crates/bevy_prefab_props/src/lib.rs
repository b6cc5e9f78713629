//! # bevy_prefab_props
//!
//! Prefab-style overridable properties.
//!
//! A property created from a base inherits the base's value until it is
//! overridden locally. Edits to a base flow down to every variation that has
//! not been overridden; overridden variations are islands that stop the flow.
//! Local overrides can be pushed back upstream with
//! [`PropertyGraph::apply_override`] or discarded with
//! [`PropertyGraph::revert_override`].
//!
//! ```
//! use bevy_prefab_props::PropertyGraph;
//!
//! let mut graph = PropertyGraph::new();
//! let base = graph.create("rate", 2.0f32);
//! let instance = graph.derive("rate", base, None);
//!
//! graph.set(base, 10.0, false);
//! assert_eq!(graph.value(instance), 10.0);
//! ```

mod graph;
mod group;

pub use graph::{ErasedProp, Prop, PropertyGraph, PropertyValue};
pub use group::{GroupBuilder, PropertyGroup};
