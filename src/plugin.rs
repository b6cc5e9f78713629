//! Bevy integration: emitter components, per-frame simulation and auto-save.
//!
//! Each [`ParticleEmitter`] owns a config in the shared [`PropertyGraph`] and
//! a [`ParticleSystem`] whose particles are child entities of the emitter.
//! Rendering is left to the host app, which reads [`ParticleDrawable`],
//! [`ParticleTint`] and `Transform` off the [`ParticleNode`] children.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use bevy::prelude::*;
use bevy::tasks::futures_lite::future;
use bevy::tasks::{IoTaskPool, Task, block_on};
use bevy_prefab_props::PropertyGraph;

use crate::collision::CollisionSettings;
use crate::config::{ConfigDescriptor, ConfigSnapshot, ParticleSystemConfig};
use crate::curve::{Curve, CurvePoint};
use crate::eval::{ColorMode, ScalarMode};
use crate::gradient::{AlphaKey, ColorKey, Gradient};
use crate::modules::RendererMode;
use crate::persist::{
    ConfigStore, DEFAULT_SAVE_DIR, RonConfigStore, SaveError, SavedConfig, to_ron,
};
use crate::presets;
use crate::scene::{DrawableFactory, DrawableRequest, SceneNode};
use crate::shape::ShapeKind;
use crate::system::ParticleSystem;

/// Seconds to wait before retrying after a failed save.
pub const SAVE_RETRY_DELAY: f64 = 2.0;

pub struct ParticlePlugin {
    /// Where configs are persisted unless a [`ParticleStore`] is inserted first.
    pub save_directory: PathBuf,
}

impl Default for ParticlePlugin {
    fn default() -> Self {
        Self {
            save_directory: PathBuf::from(DEFAULT_SAVE_DIR),
        }
    }
}

impl Plugin for ParticlePlugin {
    fn build(&self, app: &mut App) {
        if !app.world().contains_resource::<ParticleStore>() {
            app.insert_resource(ParticleStore::new(RonConfigStore::new(
                self.save_directory.clone(),
            )));
        }

        app.register_type::<Curve>()
            .register_type::<CurvePoint>()
            .register_type::<Gradient>()
            .register_type::<ColorKey>()
            .register_type::<AlphaKey>()
            .register_type::<ScalarMode>()
            .register_type::<ColorMode>()
            .register_type::<ShapeKind>()
            .register_type::<CollisionSettings>()
            .register_type::<RendererMode>()
            .register_type::<DrawableRequest>();

        app.init_resource::<PropertyGraph>()
            .init_resource::<ParticleLibrary>()
            .init_resource::<SaveStatus>()
            .init_resource::<PendingSaves>()
            .init_resource::<DrawableSpawner>()
            .add_observer(remove_emitter_config)
            .add_systems(PreStartup, init_particle_library)
            .add_systems(
                Update,
                (
                    refresh_snapshots,
                    tick_emitters.run_if(any_with_component::<ParticleEmitter>),
                )
                    .chain(),
            )
            .add_systems(Last, (poll_pending_saves, auto_save_configs).chain());
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// Persistence backend used by the auto-save systems.
#[derive(Resource, Clone)]
pub struct ParticleStore(pub Arc<dyn ConfigStore>);

impl ParticleStore {
    pub fn new(store: impl ConfigStore) -> Self {
        Self(Arc::new(store))
    }
}

/// Named root configs that emitters can be derived from, plus the saved
/// prefab instances found on disk.
#[derive(Resource, Default)]
pub struct ParticleLibrary {
    configs: HashMap<String, ParticleSystemConfig>,
    instances: HashMap<String, SavedConfig>,
}

impl ParticleLibrary {
    pub fn get(&self, name: &str) -> Option<&ParticleSystemConfig> {
        self.configs.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, config: ParticleSystemConfig) {
        self.configs.insert(name.into(), config);
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.configs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParticleSystemConfig)> {
        self.configs.iter().map(|(name, config)| (name.as_str(), config))
    }

    /// A saved prefab instance, restorable with [`ParticleEmitter::restore`].
    pub fn instance(&self, name: &str) -> Option<&SavedConfig> {
        self.instances.get(name)
    }

    pub fn instance_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.instances.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Outcome of background saves. In-memory state is never rolled back on failure.
#[derive(Resource, Default, Debug)]
pub struct SaveStatus {
    pub saved: u64,
    pub failed: u64,
    pub last_error: Option<String>,
    retry_after: Option<f64>,
}

struct SaveTask {
    name: String,
    ron: String,
    task: Task<Result<(), SaveError>>,
}

/// In-flight saves and the last persisted text of every config.
#[derive(Resource, Default)]
pub struct PendingSaves {
    tasks: Vec<SaveTask>,
    saved: HashMap<String, String>,
}

impl PendingSaves {
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// A running particle system bound to one config.
///
/// The emitter owns its config: despawning it removes the config's
/// properties from the graph.
#[derive(Component)]
pub struct ParticleEmitter {
    name: String,
    base: Option<String>,
    config: ParticleSystemConfig,
    system: ParticleSystem<Entity, ParticleDrawable>,
    snapshot: ConfigSnapshot,
    revision: Option<u64>,
}

impl ParticleEmitter {
    /// `name` is the key the config is persisted under.
    pub fn new(name: impl Into<String>, config: ParticleSystemConfig) -> Self {
        Self {
            name: name.into(),
            base: None,
            config,
            system: ParticleSystem::new(),
            snapshot: ConfigSnapshot::default(),
            revision: None,
        }
    }

    /// Prefab instance of a library config, with `overrides` as local values.
    pub fn from_library(
        graph: &mut PropertyGraph,
        library: &ParticleLibrary,
        preset: &str,
        name: impl Into<String>,
        overrides: &ConfigDescriptor,
    ) -> Option<Self> {
        let Some(base) = library.get(preset) else {
            warn!("Unknown particle preset '{}'", preset);
            return None;
        };
        let config = ParticleSystemConfig::from_descriptor(graph, overrides, Some(base));
        Some(Self {
            base: Some(preset.to_string()),
            ..Self::new(name, config)
        })
    }

    /// Rebuild a config saved by an earlier run. Instances are derived from
    /// their library base again; roots are rebuilt from their full values.
    pub fn restore(
        graph: &mut PropertyGraph,
        library: &ParticleLibrary,
        name: &str,
    ) -> Option<Self> {
        let Some(saved) = library.instance(name) else {
            warn!("No saved particle config '{}'", name);
            return None;
        };
        match &saved.base {
            Some(base) => Self::from_library(graph, library, base, name, &saved.config),
            None => {
                let config = ParticleSystemConfig::from_descriptor(graph, &saved.config, None);
                Some(Self::new(name, config))
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Library config this emitter was derived from.
    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    /// What the auto-save hook writes for this emitter.
    fn saved_config(&self, graph: &PropertyGraph) -> Option<SavedConfig> {
        match &self.base {
            Some(base) => Some(SavedConfig::instance(
                base.as_str(),
                self.config.to_descriptor(graph, true).unwrap_or_default(),
            )),
            None => self
                .config
                .to_descriptor(graph, false)
                .map(SavedConfig::root),
        }
    }

    pub fn config(&self) -> &ParticleSystemConfig {
        &self.config
    }

    pub fn system(&self) -> &ParticleSystem<Entity, ParticleDrawable> {
        &self.system
    }

    pub fn snapshot(&self) -> &ConfigSnapshot {
        &self.snapshot
    }
}

/// Marker on the child entity of one live particle.
#[derive(Component, Debug, Default)]
pub struct ParticleNode;

/// Current particle color, for the host renderer.
#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub struct ParticleTint(pub LinearRgba);

/// Drawable shared by every particle of one emitter.
#[derive(Component, Clone, Debug, PartialEq)]
pub struct ParticleDrawable {
    pub id: u32,
    pub request: DrawableRequest,
}

// ---------------------------------------------------------------------------
// Scene collaborators
// ---------------------------------------------------------------------------

/// Places particle nodes as children of one emitter entity.
pub struct EntityScene<'a, 'w, 's> {
    commands: &'a mut Commands<'w, 's>,
    parent: Entity,
}

impl<'a, 'w, 's> EntityScene<'a, 'w, 's> {
    pub fn new(commands: &'a mut Commands<'w, 's>, parent: Entity) -> Self {
        Self { commands, parent }
    }
}

impl SceneNode for EntityScene<'_, '_, '_> {
    type Node = Entity;
    type Drawable = ParticleDrawable;

    fn add_node(&mut self) -> Entity {
        self.commands
            .spawn((
                ParticleNode,
                Transform::default(),
                ParticleTint(LinearRgba::WHITE),
                ChildOf(self.parent),
            ))
            .id()
    }

    fn remove_node(&mut self, node: Entity) {
        self.commands.entity(node).try_despawn();
    }

    fn set_transform(&mut self, node: Entity, position: Vec3, scale: f32) {
        self.commands.entity(node).try_insert(
            Transform::from_translation(position).with_scale(Vec3::splat(scale)),
        );
    }

    fn set_color(&mut self, node: Entity, color: LinearRgba) {
        self.commands.entity(node).try_insert(ParticleTint(color));
    }

    fn add_component(&mut self, node: Entity, drawable: &ParticleDrawable) {
        self.commands.entity(node).try_insert(drawable.clone());
    }

    fn remove_component(&mut self, node: Entity) {
        self.commands.entity(node).try_remove::<ParticleDrawable>();
    }
}

/// Hands out numbered [`ParticleDrawable`]s.
#[derive(Resource, Default, Debug)]
pub struct DrawableSpawner {
    next_id: u32,
}

impl DrawableFactory for DrawableSpawner {
    type Drawable = ParticleDrawable;

    fn create(&mut self, request: &DrawableRequest) -> ParticleDrawable {
        self.next_id += 1;
        ParticleDrawable {
            id: self.next_id,
            request: request.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

fn init_particle_library(
    mut graph: ResMut<PropertyGraph>,
    mut library: ResMut<ParticleLibrary>,
    mut pending: ResMut<PendingSaves>,
    store: Res<ParticleStore>,
) {
    let mut descriptors: HashMap<String, ConfigDescriptor> = presets::default_presets()
        .into_iter()
        .map(|(name, desc)| (name.to_string(), desc))
        .collect();

    for (name, saved) in store.0.load_all() {
        if saved.is_instance() {
            if let Ok(ron) = to_ron(&name, &saved) {
                pending.saved.insert(name.clone(), ron);
            }
            library.instances.insert(name, saved);
        } else {
            // disk copies replace the built-in ones
            descriptors.insert(name, saved.config);
        }
    }

    for (name, desc) in descriptors {
        let config = ParticleSystemConfig::from_descriptor(&mut graph, &desc, None);
        if let Some(ron) = config
            .to_descriptor(&graph, true)
            .and_then(|d| to_ron(&name, &SavedConfig::root(d)).ok())
        {
            pending.saved.insert(name.clone(), ron);
        }
        library.insert(name, config);
    }

    for (name, saved) in &library.instances {
        let Some(base) = &saved.base else { continue };
        if !library.configs.contains_key(base) {
            warn!(
                "Saved particle config '{}' derives from unknown config '{}'",
                name, base
            );
        }
    }
    info!(
        "Particle library ready ({} configs, {} saved instances)",
        library.configs.len(),
        library.instances.len()
    );
}

/// Drop the config of a despawned emitter so its properties stop being
/// variations of the library config.
fn remove_emitter_config(
    remove: On<Remove, ParticleEmitter>,
    emitters: Query<&ParticleEmitter>,
    mut graph: ResMut<PropertyGraph>,
) {
    let Ok(emitter) = emitters.get(remove.event().entity) else {
        return;
    };
    debug!("Removing particle config '{}'", emitter.name);
    emitter.config.clone().remove(&mut graph);
}

fn refresh_snapshots(graph: Res<PropertyGraph>, mut emitters: Query<&mut ParticleEmitter>) {
    let revision = graph.revision();
    for mut emitter in &mut emitters {
        if emitter.revision == Some(revision) {
            continue;
        }
        emitter.snapshot = emitter.config.snapshot(&graph);
        emitter.revision = Some(revision);
    }
}

fn tick_emitters(
    mut commands: Commands,
    time: Res<Time>,
    mut spawner: ResMut<DrawableSpawner>,
    mut emitters: Query<(Entity, &mut ParticleEmitter)>,
) {
    let now = time.elapsed_secs_f64() * 1000.0;
    let dt = time.delta_secs();

    for (entity, emitter) in &mut emitters {
        let emitter = emitter.into_inner();
        let mut scene = EntityScene::new(&mut commands, entity);
        emitter
            .system
            .update(now, dt, &emitter.snapshot, &mut scene, &mut *spawner);
    }
}

/// Collect finished saves. Failures re-arm the dirty flag so the next
/// auto-save pass retries them.
fn poll_pending_saves(
    mut pending: ResMut<PendingSaves>,
    mut status: ResMut<SaveStatus>,
    mut graph: ResMut<PropertyGraph>,
    time: Res<Time>,
) {
    let now = time.elapsed_secs_f64();
    let PendingSaves { tasks, saved } = &mut *pending;

    tasks.retain_mut(|save| {
        let Some(result) = block_on(future::poll_once(&mut save.task)) else {
            return true;
        };
        match result {
            Ok(()) => {
                debug!("Saved particle config '{}'", save.name);
                saved.insert(std::mem::take(&mut save.name), std::mem::take(&mut save.ron));
                status.saved += 1;
            }
            Err(e) => {
                error!("Failed to save particle config '{}': {}", save.name, e);
                status.failed += 1;
                status.last_error = Some(e.to_string());
                status.retry_after = Some(now + SAVE_RETRY_DELAY);
                graph.mark_dirty();
            }
        }
        false
    });
}

fn auto_save_configs(
    mut graph: ResMut<PropertyGraph>,
    library: Res<ParticleLibrary>,
    emitters: Query<&ParticleEmitter>,
    store: Res<ParticleStore>,
    mut pending: ResMut<PendingSaves>,
    status: Res<SaveStatus>,
    time: Res<Time>,
) {
    if status
        .retry_after
        .is_some_and(|at| time.elapsed_secs_f64() < at)
    {
        return;
    }
    if !graph.take_dirty() {
        return;
    }

    let roots = library.iter().filter_map(|(name, config)| {
        let descriptor = config.to_descriptor(&graph, true)?;
        Some((name, SavedConfig::root(descriptor)))
    });
    let instances = emitters
        .iter()
        .filter_map(|e| Some((e.name.as_str(), e.saved_config(&graph)?)));
    let configs: Vec<(&str, SavedConfig)> = roots.chain(instances).collect();

    let pool = IoTaskPool::get();
    for (name, saved) in configs {
        let ron = match to_ron(name, &saved) {
            Ok(ron) => ron,
            Err(e) => {
                error!("{}", e);
                continue;
            }
        };
        if pending.saved.get(name) == Some(&ron)
            || pending.tasks.iter().any(|t| t.name == name && t.ron == ron)
        {
            continue;
        }

        let store = store.0.clone();
        let owned = name.to_string();
        let task = pool.spawn(async move { store.save(&owned, &saved) });
        pending.tasks.push(SaveTask {
            name: name.to_string(),
            ron,
            task,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::persist::LoadError;

    #[derive(Default)]
    struct MemoryStore {
        saved: Mutex<HashMap<String, SavedConfig>>,
    }

    impl ConfigStore for MemoryStore {
        fn save(&self, name: &str, saved: &SavedConfig) -> Result<(), SaveError> {
            self.saved
                .lock()
                .unwrap()
                .insert(name.to_string(), saved.clone());
            Ok(())
        }

        fn load(&self, name: &str) -> Result<SavedConfig, LoadError> {
            self.saved
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .ok_or_else(|| LoadError::Read {
                    path: PathBuf::from(name),
                    source: std::io::ErrorKind::NotFound.into(),
                })
        }
    }

    struct FailingStore;

    impl ConfigStore for FailingStore {
        fn save(&self, _name: &str, _saved: &SavedConfig) -> Result<(), SaveError> {
            Err(SaveError::Write {
                path: PathBuf::from("readonly"),
                source: std::io::ErrorKind::PermissionDenied.into(),
            })
        }

        fn load(&self, name: &str) -> Result<SavedConfig, LoadError> {
            Err(LoadError::Read {
                path: PathBuf::from(name),
                source: std::io::ErrorKind::NotFound.into(),
            })
        }
    }

    fn app_with_store(store: Arc<dyn ConfigStore>) -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .insert_resource(ParticleStore(store))
            .add_plugins(ParticlePlugin::default());
        app.finish();
        app.cleanup();
        app
    }

    fn spawn_variation(app: &mut App, rate: f32) -> Entity {
        let world = app.world_mut();
        let emitter = world.resource_scope(|world, mut graph: Mut<PropertyGraph>| {
            let library = world.resource::<ParticleLibrary>();
            ParticleEmitter::from_library(
                &mut graph,
                library,
                "Fire",
                "Fire (fast)",
                &ConfigDescriptor {
                    rate: Some(rate),
                    ..default()
                },
            )
        });
        world.spawn(emitter.unwrap()).id()
    }

    fn run_until(app: &mut App, mut done: impl FnMut(&mut App) -> bool) -> bool {
        for _ in 0..200 {
            app.update();
            if done(app) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn library_holds_builtin_presets() {
        let mut app = app_with_store(Arc::new(MemoryStore::default()));
        app.update();
        let library = app.world().resource::<ParticleLibrary>();
        assert!(library.get("Fire").is_some());
        assert_eq!(library.names().len(), presets::default_presets().len());
    }

    #[test]
    fn emitter_spawns_particle_children() {
        let mut app = app_with_store(Arc::new(MemoryStore::default()));
        app.update();
        let emitter = spawn_variation(&mut app, 120.0);
        app.update();
        app.update();

        let world = app.world();
        let state = world.get::<ParticleEmitter>(emitter).unwrap();
        assert_eq!(state.snapshot().rate, 120.0);
        assert!(!state.system().is_empty());

        let children = world.get::<Children>(emitter).unwrap();
        assert_eq!(children.len(), state.system().len());
        for child in children.iter() {
            assert!(world.get::<ParticleNode>(child).is_some());
            assert!(world.get::<ParticleDrawable>(child).is_some());
        }
    }

    #[test]
    fn graph_edits_refresh_snapshots() {
        let mut app = app_with_store(Arc::new(MemoryStore::default()));
        app.update();
        let emitter = spawn_variation(&mut app, 120.0);
        app.update();

        let fire = app
            .world()
            .resource::<ParticleLibrary>()
            .get("Fire")
            .unwrap()
            .max_points;
        app.world_mut()
            .resource_mut::<PropertyGraph>()
            .set(fire, 3, false);
        app.update();

        let state = app.world().get::<ParticleEmitter>(emitter).unwrap();
        assert_eq!(state.snapshot().max_points, 3);
        assert_eq!(state.snapshot().rate, 120.0);
    }

    #[test]
    fn variations_are_saved_as_diffs() {
        let store = Arc::new(MemoryStore::default());
        let mut app = app_with_store(store.clone());
        app.update();
        spawn_variation(&mut app, 75.0);

        let saved = run_until(&mut app, |_| {
            store.saved.lock().unwrap().contains_key("Fire (fast)")
        });
        assert!(saved);

        let saved = store.load("Fire (fast)").unwrap();
        assert_eq!(
            saved,
            SavedConfig::instance(
                "Fire",
                ConfigDescriptor {
                    rate: Some(75.0),
                    ..default()
                }
            )
        );
        // untouched presets are not rewritten
        assert!(!store.saved.lock().unwrap().contains_key("Fire"));
    }

    #[test]
    fn failed_saves_are_reported_and_retried() {
        let mut app = app_with_store(Arc::new(FailingStore));
        app.update();
        spawn_variation(&mut app, 75.0);

        let failed = run_until(&mut app, |app| {
            app.world().resource::<SaveStatus>().failed > 0
        });
        assert!(failed);

        let status = app.world().resource::<SaveStatus>();
        assert!(status.last_error.is_some());
        assert_eq!(status.saved, 0);
        assert!(app.world().resource::<PropertyGraph>().is_dirty());
    }

    #[test]
    fn saved_instances_are_restored_from_their_base() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ConfigStore> = Arc::new(RonConfigStore::new(dir.path()));

        let mut first = app_with_store(store.clone());
        first.update();
        spawn_variation(&mut first, 75.0);
        let saved = run_until(&mut first, |app| {
            app.world().resource::<SaveStatus>().saved > 0
        });
        assert!(saved);

        let mut second = app_with_store(store);
        second.update();
        {
            let library = second.world().resource::<ParticleLibrary>();
            // the instance did not turn into a default-filled root
            assert!(library.get("Fire (fast)").is_none());
            assert_eq!(library.names().len(), presets::default_presets().len());
            assert_eq!(library.instance_names(), vec!["Fire (fast)"]);
        }

        let world = second.world_mut();
        let emitter = world.resource_scope(|world, mut graph: Mut<PropertyGraph>| {
            let library = world.resource::<ParticleLibrary>();
            ParticleEmitter::restore(&mut graph, library, "Fire (fast)")
        });
        let emitter = world.spawn(emitter.unwrap()).id();
        second.update();

        let world = second.world();
        let state = world.get::<ParticleEmitter>(emitter).unwrap();
        assert_eq!(state.base(), Some("Fire"));
        assert_eq!(state.snapshot().rate, 75.0);
        assert_eq!(state.snapshot().max_points, 200);

        let fire = world.resource::<ParticleLibrary>().get("Fire").unwrap();
        let graph = world.resource::<PropertyGraph>();
        assert_eq!(graph.base_of(state.config().rate), Some(fire.rate));
        assert_eq!(graph.base_of(state.config().max_points), Some(fire.max_points));
    }

    #[test]
    fn despawned_emitters_release_their_config() {
        let mut app = app_with_store(Arc::new(MemoryStore::default()));
        app.update();
        let emitters: Vec<Entity> = (0..3)
            .map(|i| spawn_variation(&mut app, 50.0 + i as f32))
            .collect();
        app.update();

        let fire_rate = app
            .world()
            .resource::<ParticleLibrary>()
            .get("Fire")
            .unwrap()
            .rate;
        let variations = |app: &App| {
            app.world()
                .resource::<PropertyGraph>()
                .variations_of(fire_rate)
                .len()
        };
        assert_eq!(variations(&app), 3);

        for emitter in emitters {
            app.world_mut().despawn(emitter);
        }
        app.update();
        assert_eq!(variations(&app), 0);
    }

    #[test]
    fn config_value_types_are_registered() {
        use std::any::TypeId;

        let app = app_with_store(Arc::new(MemoryStore::default()));
        let registry = app.world().resource::<AppTypeRegistry>().read();
        for type_id in [
            TypeId::of::<Curve>(),
            TypeId::of::<Gradient>(),
            TypeId::of::<ScalarMode>(),
            TypeId::of::<ShapeKind>(),
            TypeId::of::<CollisionSettings>(),
            TypeId::of::<DrawableRequest>(),
        ] {
            assert!(registry.get(type_id).is_some());
        }
    }
}
