//! Arena-backed storage for overridable properties.
//!
//! Every property lives in a typed arena owned by [`PropertyGraph`]. A
//! property may point at a `base` (the ancestor it was cloned from) and keeps
//! the list of `variations` cloned from it. Links are plain arena indices, so
//! the graph never forms ownership cycles; propagation walks child indices
//! breadth-first and visits each node at most once.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use bevy::prelude::*;

/// Values that can be stored in the graph.
pub trait PropertyValue: Clone + PartialEq + Default + Send + Sync + 'static {}

impl<T: Clone + PartialEq + Default + Send + Sync + 'static> PropertyValue for T {}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Typed handle to a property stored in a [`PropertyGraph`].
///
/// Handles are cheap to copy. A handle whose property was removed is stale and
/// resolves to `None` everywhere.
pub struct Prop<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Prop<T> {
    fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Handle that never resolves.
    fn dangling() -> Self {
        Self::new(u32::MAX, u32::MAX)
    }

    /// Arena slot of this property.
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl<T: PropertyValue> Prop<T> {
    /// Forget the value type so the handle can live in a [`PropertyGroup`](crate::PropertyGroup).
    pub fn erase(self) -> ErasedProp {
        ErasedProp {
            type_id: TypeId::of::<T>(),
            index: self.index,
            generation: self.generation,
        }
    }
}

impl<T> Clone for Prop<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Prop<T> {}

impl<T> PartialEq for Prop<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Prop<T> {}

impl<T> Hash for Prop<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Prop<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Prop({}v{})", self.index, self.generation)
    }
}

/// Type-erased property handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ErasedProp {
    type_id: TypeId,
    index: u32,
    generation: u32,
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

struct Property<T> {
    name: String,
    value: T,
    overridden: bool,
    base: Option<u32>,
    variations: Vec<u32>,
}

struct Slot<T> {
    generation: u32,
    property: Option<Property<T>>,
}

struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T: PropertyValue> Arena<T> {
    fn insert(&mut self, property: Property<T>) -> Prop<T> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.property = Some(property);
            return Prop::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            property: Some(property),
        });
        Prop::new(index, 0)
    }

    fn get(&self, index: u32, generation: u32) -> Option<&Property<T>> {
        self.slots
            .get(index as usize)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.property.as_ref())
    }

    fn get_mut(&mut self, index: u32, generation: u32) -> Option<&mut Property<T>> {
        self.slots
            .get_mut(index as usize)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.property.as_mut())
    }

    /// Link-following access: `base`/`variations` indices always refer to live slots.
    fn at(&self, index: u32) -> Option<&Property<T>> {
        self.slots
            .get(index as usize)
            .and_then(|slot| slot.property.as_ref())
    }

    fn at_mut(&mut self, index: u32) -> Option<&mut Property<T>> {
        self.slots
            .get_mut(index as usize)
            .and_then(|slot| slot.property.as_mut())
    }

    fn handle(&self, index: u32) -> Option<Prop<T>> {
        let slot = self.slots.get(index as usize)?;
        slot.property.as_ref()?;
        Some(Prop::new(index, slot.generation))
    }

    /// Push the value at `root` into every non-overridden descendant.
    ///
    /// Overridden variations are skipped and not descended into.
    fn propagate(&mut self, root: u32) -> usize {
        let mut visited = HashSet::from([root]);
        let mut queue = VecDeque::from([root]);
        let mut updated = 0;

        while let Some(current) = queue.pop_front() {
            let Some(parent) = self.at(current) else {
                continue;
            };
            let value = parent.value.clone();
            let children = parent.variations.clone();

            for child in children {
                if !visited.insert(child) {
                    warn!(
                        "Property variation {} reached twice during propagation; skipping",
                        child
                    );
                    continue;
                }
                let Some(variation) = self.at_mut(child) else {
                    continue;
                };
                if variation.overridden {
                    continue;
                }
                variation.value = value.clone();
                updated += 1;
                queue.push_back(child);
            }
        }

        updated
    }

    fn apply_override(&mut self, source: u32, target: u32) -> bool {
        let Some(value) = self.at(source).map(|p| p.value.clone()) else {
            return false;
        };
        let Some(ancestor) = self.at_mut(target) else {
            return false;
        };
        ancestor.value = value;
        ancestor.overridden = ancestor.base.is_some();
        if let Some(property) = self.at_mut(source) {
            property.overridden = false;
        }
        self.propagate(target);
        true
    }

    fn revert(&mut self, index: u32) -> bool {
        let Some(base) = self.at(index).and_then(|p| p.base) else {
            return false;
        };
        let Some(value) = self.at(base).map(|p| p.value.clone()) else {
            return false;
        };
        if let Some(property) = self.at_mut(index) {
            property.value = value;
            property.overridden = false;
        }
        self.propagate(index);
        true
    }

    fn remove(&mut self, index: u32, generation: u32) -> bool {
        let Some(slot) = self.slots.get_mut(index as usize) else {
            return false;
        };
        if slot.generation != generation {
            return false;
        }
        let Some(property) = slot.property.take() else {
            return false;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);

        if let Some(base) = property.base.and_then(|b| self.at_mut(b)) {
            base.variations.retain(|&v| v != index);
        }
        for child in property.variations {
            if let Some(variation) = self.at_mut(child) {
                debug!(
                    "Property '{}' lost its base '{}'; it is now a root",
                    variation.name, property.name
                );
                variation.base = None;
                variation.overridden = false;
            }
        }
        true
    }
}

/// Operations the graph needs without knowing the value type.
trait ErasedArena: Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn is_overridden(&self, index: u32, generation: u32) -> bool;
    fn emits_descriptor(&self, index: u32, generation: u32) -> bool;
    fn apply_to_base(&mut self, index: u32, generation: u32) -> bool;
    fn revert(&mut self, index: u32, generation: u32) -> bool;
    fn remove(&mut self, index: u32, generation: u32) -> bool;
    fn name(&self, index: u32, generation: u32) -> Option<&str>;
}

impl<T: PropertyValue> ErasedArena for Arena<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn is_overridden(&self, index: u32, generation: u32) -> bool {
        self.get(index, generation).is_some_and(|p| p.overridden)
    }

    fn emits_descriptor(&self, index: u32, generation: u32) -> bool {
        self.get(index, generation)
            .is_some_and(|p| p.base.is_none() || p.overridden)
    }

    fn apply_to_base(&mut self, index: u32, generation: u32) -> bool {
        let Some((overridden, base)) = self
            .get(index, generation)
            .map(|p| (p.overridden, p.base))
        else {
            return false;
        };
        match base {
            Some(base) if overridden => self.apply_override(index, base),
            _ => false,
        }
    }

    fn revert(&mut self, index: u32, generation: u32) -> bool {
        if !self.is_overridden(index, generation) {
            return false;
        }
        Arena::revert(self, index)
    }

    fn remove(&mut self, index: u32, generation: u32) -> bool {
        Arena::remove(self, index, generation)
    }

    fn name(&self, index: u32, generation: u32) -> Option<&str> {
        self.get(index, generation).map(|p| p.name.as_str())
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// Owner of every overridable property in the world.
///
/// Mutations mark the graph dirty and bump its revision. Hosts drain the dirty
/// flag with [`take_dirty`](Self::take_dirty) to schedule persistence, and
/// compare [`revision`](Self::revision) to know when cached reads are stale.
#[derive(Resource, Default)]
pub struct PropertyGraph {
    arenas: HashMap<TypeId, Box<dyn ErasedArena>>,
    dirty: bool,
    revision: u64,
}

impl PropertyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn arena<T: PropertyValue>(&self) -> Option<&Arena<T>> {
        self.arenas
            .get(&TypeId::of::<T>())
            .and_then(|arena| arena.as_any().downcast_ref())
    }

    /// Arena for `T`, created on first use. Arenas are keyed by their own
    /// value type, so the downcast only fails if that invariant is broken.
    fn arena_mut<T: PropertyValue>(&mut self) -> Option<&mut Arena<T>> {
        self.arenas
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Arena::<T>::default()))
            .as_any_mut()
            .downcast_mut()
    }

    fn existing_arena_mut<T: PropertyValue>(&mut self) -> Option<&mut Arena<T>> {
        self.arenas
            .get_mut(&TypeId::of::<T>())
            .and_then(|arena| arena.as_any_mut().downcast_mut())
    }

    fn touch(&mut self) {
        self.dirty = true;
        self.revision = self.revision.wrapping_add(1);
    }

    // -- construction --

    /// Create a root property (no base).
    pub fn create<T: PropertyValue>(&mut self, name: impl Into<String>, value: T) -> Prop<T> {
        let name = name.into();
        let Some(arena) = self.arena_mut::<T>() else {
            error!("No arena for property '{}'; returning a stale handle", name);
            return Prop::dangling();
        };
        let prop = arena.insert(Property {
            name,
            value,
            overridden: false,
            base: None,
            variations: Vec::new(),
        });
        self.touch();
        prop
    }

    /// Create a variation of `base`.
    ///
    /// An explicit value makes the variation overridden immediately; without
    /// one it adopts the base's current value. A stale base yields a root.
    pub fn derive<T: PropertyValue>(
        &mut self,
        name: impl Into<String>,
        base: Prop<T>,
        explicit: Option<T>,
    ) -> Prop<T> {
        let name = name.into();
        let Some(base_value) = self.get(base).cloned() else {
            warn!("Deriving '{}' from a stale property; creating a root", name);
            return self.create(name, explicit.unwrap_or_default());
        };

        let overridden = explicit.is_some();
        let Some(arena) = self.arena_mut::<T>() else {
            error!("No arena for property '{}'; returning a stale handle", name);
            return Prop::dangling();
        };
        let prop = arena.insert(Property {
            name,
            value: explicit.unwrap_or(base_value),
            overridden,
            base: Some(base.index),
            variations: Vec::new(),
        });
        if let Some(parent) = arena.get_mut(base.index, base.generation) {
            parent.variations.push(prop.index);
        }
        self.touch();
        prop
    }

    // -- reads --

    pub fn contains<T: PropertyValue>(&self, prop: Prop<T>) -> bool {
        self.get(prop).is_some()
    }

    pub fn get<T: PropertyValue>(&self, prop: Prop<T>) -> Option<&T> {
        self.arena::<T>()?
            .get(prop.index, prop.generation)
            .map(|p| &p.value)
    }

    /// Current value, or the type's default for a stale handle.
    pub fn value<T: PropertyValue>(&self, prop: Prop<T>) -> T {
        match self.get(prop) {
            Some(value) => value.clone(),
            None => {
                warn!("Read of stale property {:?}; using default", prop);
                T::default()
            }
        }
    }

    pub fn name<T: PropertyValue>(&self, prop: Prop<T>) -> Option<&str> {
        self.arena::<T>()?
            .get(prop.index, prop.generation)
            .map(|p| p.name.as_str())
    }

    /// Whether the property diverges from its base. Roots always report `false`.
    pub fn is_overridden<T: PropertyValue>(&self, prop: Prop<T>) -> bool {
        self.arena::<T>()
            .and_then(|arena| arena.get(prop.index, prop.generation))
            .is_some_and(|p| p.overridden)
    }

    pub fn base_of<T: PropertyValue>(&self, prop: Prop<T>) -> Option<Prop<T>> {
        let arena = self.arena::<T>()?;
        let base = arena.get(prop.index, prop.generation)?.base?;
        arena.handle(base)
    }

    pub fn variations_of<T: PropertyValue>(&self, prop: Prop<T>) -> Vec<Prop<T>> {
        let Some(arena) = self.arena::<T>() else {
            return Vec::new();
        };
        arena
            .get(prop.index, prop.generation)
            .map(|p| {
                p.variations
                    .iter()
                    .filter_map(|&index| arena.handle(index))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ancestors of `prop`, nearest first and root-most last.
    pub fn lineage<T: PropertyValue>(&self, prop: Prop<T>) -> Vec<Prop<T>> {
        let mut lineage = Vec::new();
        let mut seen = HashSet::from([prop.index]);
        let mut current = self.base_of(prop);
        while let Some(ancestor) = current {
            if !seen.insert(ancestor.index) {
                warn!("Property lineage of {:?} loops; truncating", prop);
                break;
            }
            lineage.push(ancestor);
            current = self.base_of(ancestor);
        }
        lineage
    }

    /// Value to persist for `prop`.
    ///
    /// With `overrides_only`, only roots and overridden variations emit a
    /// value, so serialized instances store just their diff from the base.
    pub fn descriptor<T: PropertyValue>(&self, prop: Prop<T>, overrides_only: bool) -> Option<T> {
        let property = self.arena::<T>()?.get(prop.index, prop.generation)?;
        if !overrides_only || property.base.is_none() || property.overridden {
            Some(property.value.clone())
        } else {
            None
        }
    }

    // -- mutation --

    /// Assign a local value and push it to non-overridden variations.
    ///
    /// `overridden` is forced to `false` on roots.
    pub fn set<T: PropertyValue>(&mut self, prop: Prop<T>, value: T, overridden: bool) -> bool {
        let Some(arena) = self.existing_arena_mut::<T>() else {
            return false;
        };
        let Some(property) = arena.get_mut(prop.index, prop.generation) else {
            warn!("Write to stale property {:?} ignored", prop);
            return false;
        };
        property.value = value;
        property.overridden = overridden && property.base.is_some();
        arena.propagate(prop.index);
        self.touch();
        true
    }

    /// Copy this property's value into `ancestor`, clear the local override
    /// and propagate from the ancestor.
    pub fn apply_override<T: PropertyValue>(&mut self, prop: Prop<T>, ancestor: Prop<T>) -> bool {
        let Some(arena) = self.existing_arena_mut::<T>() else {
            return false;
        };
        if arena.get(prop.index, prop.generation).is_none()
            || arena.get(ancestor.index, ancestor.generation).is_none()
        {
            return false;
        }
        let applied = arena.apply_override(prop.index, ancestor.index);
        if applied {
            self.touch();
        }
        applied
    }

    /// [`apply_override`](Self::apply_override) targeting the direct base.
    pub fn apply_to_base<T: PropertyValue>(&mut self, prop: Prop<T>) -> bool {
        match self.base_of(prop) {
            Some(base) => self.apply_override(prop, base),
            None => false,
        }
    }

    /// Copy the base's value back down and clear the override. No-op on roots.
    pub fn revert_override<T: PropertyValue>(&mut self, prop: Prop<T>) -> bool {
        let Some(arena) = self.existing_arena_mut::<T>() else {
            return false;
        };
        if arena.get(prop.index, prop.generation).is_none() {
            return false;
        }
        let reverted = arena.revert(prop.index);
        if reverted {
            self.touch();
        }
        reverted
    }

    /// Push the current value into non-overridden descendants. Returns the
    /// number of variations updated.
    pub fn propagate<T: PropertyValue>(&mut self, prop: Prop<T>) -> usize {
        let Some(arena) = self.existing_arena_mut::<T>() else {
            return 0;
        };
        if arena.get(prop.index, prop.generation).is_none() {
            return 0;
        }
        let updated = arena.propagate(prop.index);
        if updated > 0 {
            self.touch();
        }
        updated
    }

    /// Remove a property. Its variations become roots and keep their values.
    pub fn remove<T: PropertyValue>(&mut self, prop: Prop<T>) -> bool {
        let removed = self
            .existing_arena_mut::<T>()
            .is_some_and(|arena| arena.remove(prop.index, prop.generation));
        if removed {
            self.touch();
        }
        removed
    }

    // -- erased access (used by groups) --

    pub fn is_overridden_erased(&self, prop: ErasedProp) -> bool {
        self.arenas
            .get(&prop.type_id)
            .is_some_and(|arena| arena.is_overridden(prop.index, prop.generation))
    }

    pub fn emits_descriptor_erased(&self, prop: ErasedProp) -> bool {
        self.arenas
            .get(&prop.type_id)
            .is_some_and(|arena| arena.emits_descriptor(prop.index, prop.generation))
    }

    pub fn name_erased(&self, prop: ErasedProp) -> Option<&str> {
        self.arenas
            .get(&prop.type_id)?
            .name(prop.index, prop.generation)
    }

    pub fn apply_to_base_erased(&mut self, prop: ErasedProp) -> bool {
        let applied = self
            .arenas
            .get_mut(&prop.type_id)
            .is_some_and(|arena| arena.apply_to_base(prop.index, prop.generation));
        if applied {
            self.touch();
        }
        applied
    }

    pub fn revert_erased(&mut self, prop: ErasedProp) -> bool {
        let reverted = self
            .arenas
            .get_mut(&prop.type_id)
            .is_some_and(|arena| arena.revert(prop.index, prop.generation));
        if reverted {
            self.touch();
        }
        reverted
    }

    pub fn remove_erased(&mut self, prop: ErasedProp) -> bool {
        let removed = self
            .arenas
            .get_mut(&prop.type_id)
            .is_some_and(|arena| arena.remove(prop.index, prop.generation));
        if removed {
            self.touch();
        }
        removed
    }

    // -- change tracking --

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Drain the dirty flag. Returns whether anything changed since the last drain.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Re-arm the dirty flag, e.g. after a failed save that must be retried.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Monotonic counter bumped on every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}
