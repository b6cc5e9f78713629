//! Cubic Bezier curves over a normalized parameter `[0..1]`.
//!
//! A curve is an ordered list of knots, each with a left and right handle.
//! Handle `y` values are offsets added to the knot's own `y`, not absolute
//! control-point ordinates.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Horizontal reach of handles on knots created without explicit handles.
pub const DEFAULT_HANDLE_WIDTH: f32 = 0.1;

/// Single knot of a [`Curve`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Reflect)]
pub struct CurvePoint {
    /// Stable identifier within the owning curve (used by editors).
    pub id: u32,
    pub x: f32,
    pub y: f32,
    /// Left handle offset. `x` is kept `<= 0`.
    pub left: Vec2,
    /// Right handle offset. `x` is kept `>= 0`.
    pub right: Vec2,
}

impl CurvePoint {
    /// Knot with flat default handles.
    pub fn new(id: u32, x: f32, y: f32) -> Self {
        Self {
            id,
            x,
            y,
            left: Vec2::new(-DEFAULT_HANDLE_WIDTH, 0.0),
            right: Vec2::new(DEFAULT_HANDLE_WIDTH, 0.0),
        }
    }

    pub fn with_handles(mut self, left: Vec2, right: Vec2) -> Self {
        self.left = left;
        self.right = right;
        self
    }
}

/// Unsanitized wire form; every deserialized curve goes through [`Curve::from_points`].
#[derive(Deserialize)]
struct RawCurve {
    #[serde(default)]
    points: Vec<CurvePoint>,
}

impl From<RawCurve> for Curve {
    fn from(raw: RawCurve) -> Self {
        Curve::from_points(raw.points)
    }
}

/// A 1-D spline that always spans `x = 0` to `x = 1`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Reflect)]
#[serde(from = "RawCurve")]
pub struct Curve {
    points: Vec<CurvePoint>,
}

impl Default for Curve {
    fn default() -> Self {
        Self::constant(1.0)
    }
}

impl Curve {
    /// Build a curve from arbitrary knots, sanitizing them.
    pub fn from_points(points: Vec<CurvePoint>) -> Self {
        let mut curve = Self { points };
        curve.sanitize();
        curve
    }

    /// Flat curve at `y`.
    pub fn constant(y: f32) -> Self {
        Self::from_points(vec![CurvePoint::new(0, 0.0, y), CurvePoint::new(1, 1.0, y)])
    }

    /// Straight ramp from `start` to `end`.
    pub fn linear(start: f32, end: f32) -> Self {
        let delta = end - start;
        let reach = DEFAULT_HANDLE_WIDTH;
        Self::from_points(vec![
            CurvePoint::new(0, 0.0, start)
                .with_handles(Vec2::new(-reach, -delta * reach), Vec2::new(reach, delta * reach)),
            CurvePoint::new(1, 1.0, end)
                .with_handles(Vec2::new(-reach, -delta * reach), Vec2::new(reach, delta * reach)),
        ])
    }

    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    /// Replace all knots and re-sanitize.
    pub fn set_points(&mut self, points: Vec<CurvePoint>) {
        self.points = points;
        self.sanitize();
    }

    fn next_id(&self) -> u32 {
        self.points
            .iter()
            .map(|p| p.id + 1)
            .max()
            .unwrap_or(0)
    }

    /// Insert a knot and return its id.
    pub fn add_point(&mut self, x: f32, y: f32) -> u32 {
        let id = self.next_id();
        self.points.push(CurvePoint::new(id, x, y));
        self.sanitize();
        id
    }

    /// Remove an interior knot. Boundary knots are kept.
    pub fn remove_point(&mut self, id: u32) -> bool {
        let Some(index) = self.points.iter().position(|p| p.id == id) else {
            return false;
        };
        if index == 0 || index == self.points.len() - 1 {
            return false;
        }
        self.points.remove(index);
        self.sanitize();
        true
    }

    /// Move a knot. Boundary knots only move vertically.
    pub fn move_point(&mut self, id: u32, x: f32, y: f32) -> bool {
        let last = self.points.len().saturating_sub(1);
        let Some(index) = self.points.iter().position(|p| p.id == id) else {
            return false;
        };
        let point = &mut self.points[index];
        point.y = y;
        if index != 0 && index != last {
            // keep interior knots off the boundaries so they are not collapsed away
            point.x = x.clamp(f32::EPSILON, 1.0 - f32::EPSILON);
        }
        self.sanitize();
        true
    }

    /// Replace a knot's handles.
    pub fn set_handles(&mut self, id: u32, left: Vec2, right: Vec2) -> bool {
        let Some(point) = self.points.iter_mut().find(|p| p.id == id) else {
            return false;
        };
        point.left = left;
        point.right = right;
        self.sanitize();
        true
    }

    /// Restore the curve invariants.
    ///
    /// Knots are clamped into `[0..1]` and sorted; missing boundary knots are
    /// synthesized from the nearest knot's `y`; duplicate boundary knots are
    /// dropped; handle x-signs are clamped.
    pub fn sanitize(&mut self) {
        for point in &mut self.points {
            point.x = if point.x.is_nan() { 0.0 } else { point.x.clamp(0.0, 1.0) };
        }
        self.points.sort_by(|a, b| a.x.total_cmp(&b.x));

        if self.points.first().is_none_or(|p| p.x != 0.0) {
            let y = self.points.first().map_or(0.0, |p| p.y);
            let id = self.next_id();
            self.points.insert(0, CurvePoint::new(id, 0.0, y));
        }
        if self.points.last().is_none_or(|p| p.x != 1.0) {
            let y = self.points.last().map_or(0.0, |p| p.y);
            let id = self.next_id();
            self.points.push(CurvePoint::new(id, 1.0, y));
        }

        // Keep the first knot at 0 and the last knot at 1.
        let mut seen_start = false;
        self.points.retain(|p| {
            if p.x == 0.0 {
                !std::mem::replace(&mut seen_start, true)
            } else {
                true
            }
        });
        let last_end = self.points.iter().rposition(|p| p.x == 1.0);
        let mut index = 0;
        self.points.retain(|p| {
            let keep = p.x != 1.0 || Some(index) == last_end;
            index += 1;
            keep
        });

        for point in &mut self.points {
            point.left.x = point.left.x.min(0.0);
            point.right.x = point.right.x.max(0.0);
        }
    }

    /// Evaluate the curve at `t`. Values outside `[0..1]` extrapolate flat.
    pub fn get_value(&self, t: f32) -> f32 {
        let Some(next_index) = self.points.iter().position(|p| p.x >= t) else {
            return self.points.last().map_or(0.0, |p| p.y);
        };
        let next = &self.points[next_index];
        if next_index == 0 {
            return next.y;
        }
        let prev = &self.points[next_index - 1];

        let u = (t - prev.x) / (next.x - prev.x);
        let inv = 1.0 - u;
        inv * inv * inv * prev.y
            + 3.0 * inv * inv * u * (prev.y + prev.right.y)
            + 3.0 * inv * u * u * (next.y + next.left.y)
            + u * u * u * next.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariants(curve: &Curve) {
        let points = curve.points();
        assert!(points.len() >= 2);
        assert_eq!(points[0].x, 0.0);
        assert_eq!(points[points.len() - 1].x, 1.0);
        for interior in &points[1..points.len() - 1] {
            assert!(interior.x > 0.0 && interior.x < 1.0, "{:?}", points);
        }
        for pair in points.windows(2) {
            assert!(pair[0].x <= pair[1].x);
        }
        for point in points {
            assert!(point.left.x <= 0.0);
            assert!(point.right.x >= 0.0);
        }
    }

    #[test]
    fn sanitize_holds_for_random_point_sets() {
        for _ in 0..200 {
            let count = fastrand::usize(0..8);
            let points = (0..count)
                .map(|i| {
                    // bias some knots onto the boundaries and outside the range
                    let x = match fastrand::u8(0..4) {
                        0 => 0.0,
                        1 => 1.0,
                        2 => fastrand::f32() * 3.0 - 1.0,
                        _ => fastrand::f32(),
                    };
                    CurvePoint::new(i as u32, x, fastrand::f32()).with_handles(
                        Vec2::new(fastrand::f32() - 0.5, 0.0),
                        Vec2::new(fastrand::f32() - 0.5, 0.0),
                    )
                })
                .collect();
            assert_invariants(&Curve::from_points(points));
        }
    }

    #[test]
    fn empty_curve_gets_both_boundaries() {
        let curve = Curve::from_points(Vec::new());
        assert_eq!(curve.points().len(), 2);
        assert_eq!(curve.get_value(0.5), 0.0);
    }

    #[test]
    fn synthesized_boundaries_copy_nearest_y() {
        let curve = Curve::from_points(vec![CurvePoint::new(0, 0.5, 0.7)]);
        assert_eq!(curve.points().len(), 3);
        assert_eq!(curve.points()[0].y, 0.7);
        assert_eq!(curve.points()[2].y, 0.7);
        assert_eq!(curve.points()[0].right.x, DEFAULT_HANDLE_WIDTH);
    }

    #[test]
    fn duplicate_boundaries_are_collapsed() {
        let curve = Curve::from_points(vec![
            CurvePoint::new(0, 0.0, 0.1),
            CurvePoint::new(1, 0.0, 0.2),
            CurvePoint::new(2, 1.0, 0.3),
            CurvePoint::new(3, 1.0, 0.4),
        ]);
        assert_eq!(curve.points().len(), 2);
        assert_eq!(curve.points()[0].y, 0.1);
        assert_eq!(curve.points()[1].y, 0.4);
    }

    #[test]
    fn endpoints_evaluate_exactly() {
        let curve = Curve::linear(2.0, 6.0);
        assert_eq!(curve.get_value(0.0), 2.0);
        assert_eq!(curve.get_value(1.0), 6.0);
        assert_eq!(curve.get_value(-1.0), 2.0);
        assert_eq!(curve.get_value(2.0), 6.0);
    }

    #[test]
    fn handle_y_is_an_offset_from_the_knot() {
        let curve = Curve::from_points(vec![
            CurvePoint::new(0, 0.0, 0.0).with_handles(Vec2::ZERO, Vec2::new(0.3, 1.0)),
            CurvePoint::new(1, 1.0, 0.0).with_handles(Vec2::new(-0.3, 1.0), Vec2::ZERO),
        ]);
        // 3·(1/4)·(1/2)·1 + 3·(1/2)·(1/4)·1
        assert!((curve.get_value(0.5) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn constant_curve_is_flat() {
        let curve = Curve::constant(0.4);
        for i in 0..=10 {
            assert!((curve.get_value(i as f32 / 10.0) - 0.4).abs() < 1e-6);
        }
    }

    #[test]
    fn editing_keeps_boundaries() {
        let mut curve = Curve::constant(1.0);
        let first = curve.points()[0].id;
        let added = curve.add_point(0.5, 0.2);
        assert_eq!(curve.points().len(), 3);

        assert!(!curve.remove_point(first));
        assert!(curve.move_point(first, 0.7, 0.5));
        assert_eq!(curve.points()[0].x, 0.0);
        assert_eq!(curve.points()[0].y, 0.5);

        assert!(curve.move_point(added, 1.5, 0.2));
        assert_invariants(&curve);
        assert_eq!(curve.points().len(), 3);

        assert!(curve.set_handles(added, Vec2::new(0.5, 0.0), Vec2::new(-0.5, 0.0)));
        assert_invariants(&curve);

        assert!(curve.remove_point(added));
        assert_eq!(curve.points().len(), 2);
    }

    #[test]
    fn deserialized_curves_are_sanitized() {
        let curve: Curve =
            ron::from_str("(points: [(id: 4, x: 0.5, y: 2.0, left: (-0.1, 0.0), right: (0.1, 0.0))])")
                .unwrap();
        assert_eq!(curve.points().len(), 3);
        assert_eq!(curve.get_value(0.0), 2.0);
    }
}
