//! Named bundles of properties belonging to one component instance.

use crate::graph::{ErasedProp, Prop, PropertyGraph, PropertyValue};

/// Properties owned by one component instance (a module, a shape, a config).
#[derive(Clone, Debug, Default)]
pub struct PropertyGroup {
    name: String,
    members: Vec<ErasedProp>,
}

impl PropertyGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push(&mut self, prop: ErasedProp) {
        self.members.push(prop);
    }

    pub fn members(&self) -> &[ErasedProp] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether any member diverges from its base.
    pub fn has_overrides(&self, graph: &PropertyGraph) -> bool {
        self.members
            .iter()
            .any(|&prop| graph.is_overridden_erased(prop))
    }

    /// Whether serializing this group would emit anything.
    ///
    /// Roots always persist; variations persist only when overridden.
    pub fn needs_persist(&self, graph: &PropertyGraph, overrides_only: bool) -> bool {
        !overrides_only
            || self
                .members
                .iter()
                .any(|&prop| graph.emits_descriptor_erased(prop))
    }

    /// Names of the overridden members, for conflict display.
    pub fn overridden_names<'g>(&self, graph: &'g PropertyGraph) -> Vec<&'g str> {
        self.members
            .iter()
            .filter(|&&prop| graph.is_overridden_erased(prop))
            .filter_map(|&prop| graph.name_erased(prop))
            .collect()
    }

    /// Push every overridden member up into its direct base. Returns how many were applied.
    pub fn apply_all(&self, graph: &mut PropertyGraph) -> usize {
        self.members
            .iter()
            .filter(|&&prop| graph.apply_to_base_erased(prop))
            .count()
    }

    /// Revert every overridden member to its base. Returns how many were reverted.
    pub fn revert_all(&self, graph: &mut PropertyGraph) -> usize {
        self.members
            .iter()
            .filter(|&&prop| graph.revert_erased(prop))
            .count()
    }

    /// Remove every member from the graph, consuming the group.
    pub fn remove_all(self, graph: &mut PropertyGraph) {
        for prop in self.members {
            graph.remove_erased(prop);
        }
    }
}

/// Creates properties and records them into a [`PropertyGroup`] in one pass.
///
/// Each property is derived from its counterpart in the ancestor when one is
/// given, otherwise created as a root holding the explicit value or default.
pub struct GroupBuilder<'a> {
    graph: &'a mut PropertyGraph,
    group: PropertyGroup,
}

impl<'a> GroupBuilder<'a> {
    pub fn new(graph: &'a mut PropertyGraph, name: impl Into<String>) -> Self {
        Self {
            graph,
            group: PropertyGroup::new(name),
        }
    }

    pub fn prop<T: PropertyValue>(
        &mut self,
        name: &str,
        explicit: Option<T>,
        base: Option<Prop<T>>,
        default: T,
    ) -> Prop<T> {
        let full_name = format!("{}.{}", self.group.name, name);
        let prop = match base {
            Some(base) => self.graph.derive(full_name, base, explicit),
            None => self.graph.create(full_name, explicit.unwrap_or(default)),
        };
        self.group.push(prop.erase());
        prop
    }

    pub fn graph(&self) -> &PropertyGraph {
        self.graph
    }

    pub fn finish(self) -> PropertyGroup {
        self.group
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collision_group(
        graph: &mut PropertyGraph,
        base: Option<(Prop<bool>, Prop<f32>)>,
        bounce: Option<f32>,
    ) -> (PropertyGroup, Prop<bool>, Prop<f32>) {
        let mut builder = GroupBuilder::new(graph, "collision");
        let enabled = builder.prop("enabled", None, base.map(|b| b.0), false);
        let bounce = builder.prop("bounce", bounce, base.map(|b| b.1), 1.0);
        (builder.finish(), enabled, bounce)
    }

    #[test]
    fn builder_records_members_with_qualified_names() {
        let mut graph = PropertyGraph::new();
        let (group, enabled, bounce) = collision_group(&mut graph, None, None);

        assert_eq!(group.len(), 2);
        assert_eq!(graph.name(enabled), Some("collision.enabled"));
        assert_eq!(graph.value(bounce), 1.0);
    }

    #[test]
    fn group_override_queries() {
        let mut graph = PropertyGraph::new();
        let (root, enabled, bounce) = collision_group(&mut graph, None, None);
        let (plain, _, _) = collision_group(&mut graph, Some((enabled, bounce)), None);
        let (custom, _, custom_bounce) =
            collision_group(&mut graph, Some((enabled, bounce)), Some(0.25));

        assert!(!root.has_overrides(&graph));
        assert!(root.needs_persist(&graph, true));
        assert!(!plain.has_overrides(&graph));
        assert!(!plain.needs_persist(&graph, true));
        assert!(plain.needs_persist(&graph, false));
        assert!(custom.has_overrides(&graph));
        assert_eq!(custom.overridden_names(&graph), vec!["collision.bounce"]);

        assert_eq!(custom.apply_all(&mut graph), 1);
        assert_eq!(graph.value(bounce), 0.25);
        assert!(!graph.is_overridden(custom_bounce));
    }

    #[test]
    fn revert_all_and_remove_all() {
        let mut graph = PropertyGraph::new();
        let (_, enabled, bounce) = collision_group(&mut graph, None, None);
        let (custom, _, custom_bounce) =
            collision_group(&mut graph, Some((enabled, bounce)), Some(0.5));

        assert_eq!(custom.revert_all(&mut graph), 1);
        assert_eq!(graph.value(custom_bounce), 1.0);
        assert_eq!(custom.revert_all(&mut graph), 0);

        custom.remove_all(&mut graph);
        assert!(!graph.contains(custom_bounce));
        assert!(graph.variations_of(bounce).is_empty());
    }
}
