//! Particle simulation: emission, integration, collision and render-state push.

use bevy::prelude::*;

use crate::collision::{CollisionPlane, collide_with_plane};
use crate::config::ConfigSnapshot;
use crate::particle::Particle;
use crate::scene::{DrawableFactory, DrawableRequest, SceneNode};

/// Downward acceleration in m/s², scaled by the gravity modifier.
pub const GRAVITY: f32 = -9.81;

/// Live state of one particle system.
///
/// `N` is the scene node type and `D` the drawable type of the collaborators
/// passed to [`update`](Self::update).
pub struct ParticleSystem<N, D> {
    particles: Vec<Particle<N>>,
    /// Milliseconds; `None` until the first tick.
    start_time: Option<f64>,
    last_emit_time: Option<f64>,
    next_id: u64,
    drawable: Option<(DrawableRequest, D)>,
    plane: CollisionPlane,
}

impl<N, D> Default for ParticleSystem<N, D> {
    fn default() -> Self {
        Self {
            particles: Vec::new(),
            start_time: None,
            last_emit_time: None,
            next_id: 0,
            drawable: None,
            plane: CollisionPlane::GROUND,
        }
    }
}

impl<N: Copy, D: Clone> ParticleSystem<N, D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn particles(&self) -> &[Particle<N>] {
        &self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.start_time.is_some()
    }

    pub fn drawable(&self) -> Option<&D> {
        self.drawable.as_ref().map(|(_, drawable)| drawable)
    }

    /// Normalized progress through the current emission cycle.
    pub fn cycle_t(&self, now: f64, duration: f32) -> f32 {
        let Some(start) = self.start_time else {
            return 0.0;
        };
        if duration <= 0.0 {
            return 0.0;
        }
        let duration = duration as f64;
        ((((now - start) / 1000.0).rem_euclid(duration)) / duration) as f32
    }

    /// Advance the system to `now` (milliseconds) by `dt` seconds.
    pub fn update<S, F>(
        &mut self,
        now: f64,
        dt: f32,
        config: &ConfigSnapshot,
        scene: &mut S,
        factory: &mut F,
    ) where
        S: SceneNode<Node = N, Drawable = D>,
        F: DrawableFactory<Drawable = D>,
    {
        self.resolve_drawable(config.renderer.as_ref(), scene, factory);

        let start = *self.start_time.get_or_insert(now);
        let cycle_t = self.cycle_t(now, config.duration);

        match self.last_emit_time {
            None => {
                debug!("Particle system started at {:.0}ms", start);
                if config.max_points > 0 {
                    self.spawn(1, now, cycle_t, config, scene);
                }
                self.last_emit_time = Some(now);
            }
            Some(_) => {
                self.update_particles(now, dt, config, scene);
                self.emit(now, cycle_t, config, scene);
            }
        }

        self.push_render_state(scene);
    }

    /// Drop every particle and return to the not-started state.
    pub fn reset<S>(&mut self, scene: &mut S)
    where
        S: SceneNode<Node = N, Drawable = D>,
    {
        let removed = self.particles.len();
        for particle in self.particles.drain(..) {
            if let Some(node) = particle.render_handle {
                scene.remove_node(node);
            }
        }
        self.start_time = None;
        self.last_emit_time = None;
        debug!("Particle system reset ({} particles removed)", removed);
    }

    // -- tick stages --

    fn resolve_drawable<S, F>(
        &mut self,
        request: Option<&DrawableRequest>,
        scene: &mut S,
        factory: &mut F,
    ) where
        S: SceneNode<Node = N, Drawable = D>,
        F: DrawableFactory<Drawable = D>,
    {
        let current = self.drawable.as_ref().map(|(req, _)| req);
        if current == request {
            return;
        }

        let Some(request) = request else {
            debug!("Particle renderer disabled; detaching drawables");
            self.drawable = None;
            for node in self.particles.iter().filter_map(|p| p.render_handle) {
                scene.remove_component(node);
            }
            return;
        };

        debug!("Creating particle drawable {:?}", request);
        let drawable = factory.create(request);
        let had_drawable = self.drawable.is_some();
        for node in self.particles.iter().filter_map(|p| p.render_handle) {
            if had_drawable {
                scene.remove_component(node);
            }
            scene.add_component(node, &drawable);
        }
        self.drawable = Some((request.clone(), drawable));
    }

    fn update_particles<S>(&mut self, now: f64, dt: f32, config: &ConfigSnapshot, scene: &mut S)
    where
        S: SceneNode<Node = N, Drawable = D>,
    {
        let plane = self.plane;
        self.particles.retain_mut(|particle| {
            let t = particle.age_at(now);
            if t > 1.0 {
                if let Some(node) = particle.render_handle.take() {
                    scene.remove_node(node);
                }
                return false;
            }

            let gravity = config.gravity_modifier.sample_with(t, particle.random);
            particle.velocity += Vec4::Y * gravity * GRAVITY * dt;

            if let Some(modifier) = &config.lifetime_velocity {
                let force = modifier.force.sample_with(t, particle.random);
                particle.velocity += (force * dt).extend(0.0);
                particle.velocity *= modifier.speed_modifier.sample_with(t, particle.random);
            }

            let radius = particle.radius();
            let collided = config.collision.is_some_and(|settings| {
                collide_with_plane(
                    &mut particle.position,
                    &mut particle.velocity,
                    radius,
                    dt,
                    &plane,
                    settings,
                )
            });
            if !collided {
                particle.position += particle.velocity.truncate() * dt;
            }

            Self::refresh_appearance(particle, t, config);
            true
        });
    }

    fn emit<S>(&mut self, now: f64, cycle_t: f32, config: &ConfigSnapshot, scene: &mut S)
    where
        S: SceneNode<Node = N, Drawable = D>,
    {
        let Some(last) = self.last_emit_time else {
            return;
        };
        let capacity = config.max_points.saturating_sub(self.particles.len());
        if capacity == 0 {
            return;
        }

        let due = (config.rate.max(0.0) as f64 * (now - last) / 1000.0).floor();
        let count = (due as usize).min(capacity);
        if count > 0 {
            self.last_emit_time = Some(now);
            self.spawn(count, now, cycle_t, config, scene);
        }
    }

    fn spawn<S>(
        &mut self,
        count: usize,
        now: f64,
        cycle_t: f32,
        config: &ConfigSnapshot,
        scene: &mut S,
    ) where
        S: SceneNode<Node = N, Drawable = D>,
    {
        // start values depend only on the cycle, so narrow them once per batch
        let lifetime = config.lifetime.span(cycle_t);
        let speed = config.start_velocity.span(cycle_t);
        let size = config.start_size.span(cycle_t);
        let color = config.start_color.span(cycle_t);

        for _ in 0..count {
            let sample = config.shape.sample();
            let node = scene.add_node();
            if let Some((_, drawable)) = &self.drawable {
                scene.add_component(node, drawable);
            }

            let start_size = size.draw();
            let start_color = color.draw();
            let mut particle = Particle {
                id: self.next_id,
                position: sample.position,
                velocity: (sample.direction * speed.draw()).extend(0.0),
                start_time: now,
                lifetime: lifetime.draw(),
                start_size,
                start_color,
                render_handle: Some(node),
                random: fastrand::f32(),
                age: 0.0,
                size: start_size,
                color: start_color,
            };
            Self::refresh_appearance(&mut particle, 0.0, config);
            self.next_id += 1;
            self.particles.push(particle);
        }
    }

    /// Size and color for age `t`. Lifetime color is an overlay on the start color.
    fn refresh_appearance(particle: &mut Particle<N>, t: f32, config: &ConfigSnapshot) {
        particle.age = t;
        let size_scale = config
            .lifetime_size
            .as_ref()
            .map_or(1.0, |size| size.sample_with(t, particle.random));
        let tint = config
            .lifetime_color
            .as_ref()
            .map_or(LinearRgba::WHITE, |color| color.sample_with(t, particle.random));

        particle.size = particle.start_size * size_scale;
        let start = particle.start_color;
        particle.color = LinearRgba::new(
            start.red * tint.red,
            start.green * tint.green,
            start.blue * tint.blue,
            start.alpha * tint.alpha,
        );
    }

    fn push_render_state<S>(&self, scene: &mut S)
    where
        S: SceneNode<Node = N, Drawable = D>,
    {
        for particle in &self.particles {
            if let Some(node) = particle.render_handle {
                scene.set_transform(node, particle.position, particle.size);
                scene.set_color(node, particle.color);
            }
        }
    }
}
