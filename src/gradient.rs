//! Two-track color gradients (RGB and alpha keyed independently).

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// RGB key on the color track.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Reflect)]
pub struct ColorKey {
    pub position: f32,
    pub color: [f32; 3],
}

/// Key on the alpha track.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Reflect)]
pub struct AlphaKey {
    pub position: f32,
    pub alpha: f32,
}

/// Shared behavior of gradient keys, so both tracks use one set of editing rules.
trait Key: Copy {
    type Value: Copy;

    fn position(&self) -> f32;
    fn set_position(&mut self, position: f32);
    fn value(&self) -> Self::Value;
    fn set_value(&mut self, value: Self::Value);
    fn lerp(a: Self::Value, b: Self::Value, f: f32) -> Self::Value;
}

impl Key for ColorKey {
    type Value = [f32; 3];

    fn position(&self) -> f32 {
        self.position
    }

    fn set_position(&mut self, position: f32) {
        self.position = position;
    }

    fn value(&self) -> [f32; 3] {
        self.color
    }

    fn set_value(&mut self, value: [f32; 3]) {
        self.color = value;
    }

    fn lerp(a: [f32; 3], b: [f32; 3], f: f32) -> [f32; 3] {
        std::array::from_fn(|i| a[i] * (1.0 - f) + b[i] * f)
    }
}

impl Key for AlphaKey {
    type Value = f32;

    fn position(&self) -> f32 {
        self.position
    }

    fn set_position(&mut self, position: f32) {
        self.position = position;
    }

    fn value(&self) -> f32 {
        self.alpha
    }

    fn set_value(&mut self, value: f32) {
        self.alpha = value;
    }

    fn lerp(a: f32, b: f32, f: f32) -> f32 {
        a * (1.0 - f) + b * f
    }
}

// -- track helpers --

fn sample<K: Key>(keys: &[K], t: f32) -> Option<K::Value> {
    let Some(next_index) = keys.iter().position(|k| k.position() >= t) else {
        return keys.last().map(K::value);
    };
    let next = keys[next_index];
    if next_index == 0 {
        return Some(next.value());
    }
    let prev = keys[next_index - 1];
    let span = next.position() - prev.position();
    if span <= f32::EPSILON {
        return Some(next.value());
    }
    let f = (t - prev.position()) / span;
    Some(K::lerp(prev.value(), next.value(), f))
}

fn is_boundary<K>(keys: &[K], index: usize) -> bool {
    index == 0 || index + 1 >= keys.len()
}

fn interior(position: f32) -> f32 {
    position.clamp(f32::EPSILON, 1.0 - f32::EPSILON)
}

fn sort<K: Key>(keys: &mut [K]) {
    // stable, so keys sharing a position keep their insertion order
    keys.sort_by(|a, b| a.position().total_cmp(&b.position()));
}

fn insert<K: Key>(keys: &mut Vec<K>, mut key: K) -> bool {
    if keys.len() < 2 {
        return false;
    }
    key.set_position(interior(key.position()));
    keys.insert(keys.len() - 1, key);
    sort(keys);
    true
}

fn delete<K: Key>(keys: &mut Vec<K>, index: usize) -> bool {
    if is_boundary(keys, index) {
        return false;
    }
    keys.remove(index);
    true
}

fn relocate<K: Key>(keys: &mut [K], index: usize, position: f32) -> bool {
    if is_boundary(keys, index) {
        return false;
    }
    keys[index].set_position(interior(position));
    sort(keys);
    true
}

fn assign<K: Key>(keys: &mut [K], index: usize, value: K::Value) -> bool {
    match keys.get_mut(index) {
        Some(key) => {
            key.set_value(value);
            true
        }
        None => false,
    }
}

/// Restore the fixed keys at 0 and 1 and the position ordering.
fn normalize<K: Key>(keys: &mut Vec<K>, fallback: K::Value, make: fn(f32, K::Value) -> K) {
    for key in keys.iter_mut() {
        let position = key.position();
        key.set_position(if position.is_nan() { 0.0 } else { position.clamp(0.0, 1.0) });
    }
    sort(keys);
    if keys.first().is_none_or(|k| k.position() != 0.0) {
        let value = keys.first().map_or(fallback, K::value);
        keys.insert(0, make(0.0, value));
    }
    if keys.last().is_none_or(|k| k.position() != 1.0) {
        let value = keys.last().map_or(fallback, K::value);
        keys.push(make(1.0, value));
    }
}

// ---------------------------------------------------------------------------
// Gradient
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawGradient {
    #[serde(default)]
    color_keys: Vec<ColorKey>,
    #[serde(default)]
    alpha_keys: Vec<AlphaKey>,
}

impl From<RawGradient> for Gradient {
    fn from(raw: RawGradient) -> Self {
        Gradient::from_keys(raw.color_keys, raw.alpha_keys)
    }
}

/// Piecewise-linear color over `[0..1]`.
///
/// Both tracks always hold a key at position 0 and a key at position 1. Those
/// keys can be recolored but never moved or deleted.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Reflect)]
#[serde(from = "RawGradient")]
pub struct Gradient {
    color_keys: Vec<ColorKey>,
    alpha_keys: Vec<AlphaKey>,
}

impl Default for Gradient {
    fn default() -> Self {
        Self::white_to_transparent()
    }
}

impl Gradient {
    /// Build from arbitrary keys; missing boundary keys are synthesized.
    pub fn from_keys(mut color_keys: Vec<ColorKey>, mut alpha_keys: Vec<AlphaKey>) -> Self {
        normalize(&mut color_keys, [1.0; 3], |position, color| ColorKey { position, color });
        normalize(&mut alpha_keys, 1.0, |position, alpha| AlphaKey { position, alpha });
        Self {
            color_keys,
            alpha_keys,
        }
    }

    /// Two-key gradient between `start` and `end` (RGBA).
    pub fn two_stop(start: [f32; 4], end: [f32; 4]) -> Self {
        Self::from_keys(
            vec![
                ColorKey { position: 0.0, color: [start[0], start[1], start[2]] },
                ColorKey { position: 1.0, color: [end[0], end[1], end[2]] },
            ],
            vec![
                AlphaKey { position: 0.0, alpha: start[3] },
                AlphaKey { position: 1.0, alpha: end[3] },
            ],
        )
    }

    pub fn white_to_transparent() -> Self {
        Self::two_stop([1.0, 1.0, 1.0, 1.0], [1.0, 1.0, 1.0, 0.0])
    }

    pub fn color_keys(&self) -> &[ColorKey] {
        &self.color_keys
    }

    pub fn alpha_keys(&self) -> &[AlphaKey] {
        &self.alpha_keys
    }

    /// Evaluate both tracks at `t`.
    pub fn get_color(&self, t: f32) -> LinearRgba {
        let [r, g, b] = sample(&self.color_keys, t).unwrap_or([1.0; 3]);
        let a = sample(&self.alpha_keys, t).unwrap_or(1.0);
        LinearRgba::new(r, g, b, a)
    }

    // -- color track --

    pub fn add_color_key(&mut self, position: f32, color: [f32; 3]) -> bool {
        insert(&mut self.color_keys, ColorKey { position, color })
    }

    pub fn delete_color_key(&mut self, index: usize) -> bool {
        delete(&mut self.color_keys, index)
    }

    pub fn move_color_key(&mut self, index: usize, position: f32) -> bool {
        relocate(&mut self.color_keys, index, position)
    }

    pub fn set_color_key_value(&mut self, index: usize, color: [f32; 3]) -> bool {
        assign(&mut self.color_keys, index, color)
    }

    // -- alpha track --

    pub fn add_alpha_key(&mut self, position: f32, alpha: f32) -> bool {
        insert(&mut self.alpha_keys, AlphaKey { position, alpha })
    }

    pub fn delete_alpha_key(&mut self, index: usize) -> bool {
        delete(&mut self.alpha_keys, index)
    }

    pub fn move_alpha_key(&mut self, index: usize, position: f32) -> bool {
        relocate(&mut self.alpha_keys, index, position)
    }

    pub fn set_alpha_key_value(&mut self, index: usize, alpha: f32) -> bool {
        assign(&mut self.alpha_keys, index, alpha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn red_to_green() -> Gradient {
        Gradient::two_stop([1.0, 0.0, 0.0, 1.0], [0.0, 1.0, 0.0, 1.0])
    }

    #[test]
    fn midpoint_is_componentwise_average() {
        let gradient = red_to_green();
        let mid = gradient.get_color(0.5);
        assert!((mid.red - 0.5).abs() < 1e-6);
        assert!((mid.green - 0.5).abs() < 1e-6);
        assert_eq!(mid.blue, 0.0);
        assert_eq!(gradient.get_color(0.0), LinearRgba::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(gradient.get_color(1.0), LinearRgba::new(0.0, 1.0, 0.0, 1.0));
    }

    #[test]
    fn tracks_are_independent() {
        let mut gradient = Gradient::white_to_transparent();
        gradient.add_alpha_key(0.25, 0.0);
        let color = gradient.get_color(0.25);
        assert_eq!(color.alpha, 0.0);
        assert_eq!(color.red, 1.0);
        assert_eq!(gradient.color_keys().len(), 2);
    }

    #[test]
    fn boundary_keys_cannot_be_deleted_or_moved() {
        let mut gradient = red_to_green();
        gradient.add_color_key(0.5, [0.0, 0.0, 1.0]);
        let before = gradient.clone();

        assert!(!gradient.delete_color_key(0));
        assert!(!gradient.delete_color_key(2));
        assert!(!gradient.move_color_key(0, 0.3));
        assert!(!gradient.move_alpha_key(1, 0.3));
        assert!(!gradient.delete_alpha_key(0));
        assert_eq!(gradient, before);
        assert_eq!(gradient.color_keys().len(), 3);
    }

    #[test]
    fn boundary_keys_can_be_recolored() {
        let mut gradient = red_to_green();
        assert!(gradient.set_color_key_value(0, [0.0, 0.0, 1.0]));
        assert_eq!(gradient.get_color(0.0).blue, 1.0);
        assert!(!gradient.set_alpha_key_value(9, 0.5));
    }

    #[test]
    fn moved_keys_are_resorted_and_stay_interior() {
        let mut gradient = red_to_green();
        gradient.add_color_key(0.2, [0.0, 0.0, 1.0]);
        gradient.add_color_key(0.8, [1.0, 1.0, 1.0]);

        assert!(gradient.move_color_key(1, 0.9));
        let positions: Vec<f32> = gradient.color_keys().iter().map(|k| k.position).collect();
        assert_eq!(positions[0], 0.0);
        assert_eq!(positions[3], 1.0);
        assert_eq!(gradient.color_keys()[2].color, [0.0, 0.0, 1.0]);

        assert!(gradient.move_color_key(2, 5.0));
        let last_interior = gradient.color_keys()[2].position;
        assert!(last_interior < 1.0);
        assert_eq!(gradient.color_keys()[3].position, 1.0);
    }

    #[test]
    fn deleting_an_interior_key() {
        let mut gradient = red_to_green();
        gradient.add_alpha_key(0.5, 0.2);
        assert!(gradient.delete_alpha_key(1));
        assert_eq!(gradient.alpha_keys().len(), 2);
    }

    #[test]
    fn deserialization_restores_fixed_keys() {
        let gradient: Gradient =
            ron::from_str("(color_keys: [(position: 0.5, color: (0.2, 0.4, 0.6))])").unwrap();
        assert_eq!(gradient.color_keys().len(), 3);
        assert_eq!(gradient.alpha_keys().len(), 2);
        assert_eq!(gradient.get_color(0.0).green, 0.4);
        assert_eq!(gradient.get_color(1.0).alpha, 1.0);
    }
}
