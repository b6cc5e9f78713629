//! Plain evaluators resolved from property-backed values.
//!
//! Evaluation is split in two steps so one tick can snapshot the values that
//! only depend on the cycle parameter: [`ScalarEval::span`] narrows a value to
//! a `[lo, hi]` range at `t`, and [`Span::draw`] picks per particle.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::curve::Curve;
use crate::gradient::Gradient;

/// How a scalar or vector value is produced.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Reflect)]
pub enum ScalarMode {
    #[default]
    Constant,
    /// Uniformly between two constants.
    Random,
    /// One curve remapped through the curve range.
    Curve,
    /// Uniformly between two remapped curves.
    RandomCurve,
}

impl ScalarMode {
    pub const ALL: [Self; 4] = [Self::Constant, Self::Random, Self::Curve, Self::RandomCurve];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Constant => "Constant",
            Self::Random => "Random Between Two Constants",
            Self::Curve => "Curve",
            Self::RandomCurve => "Random Between Two Curves",
        }
    }
}

/// How a color value is produced.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Reflect)]
pub enum ColorMode {
    #[default]
    Constant,
    Random,
    Gradient,
    RandomGradient,
}

impl ColorMode {
    pub const ALL: [Self; 4] = [
        Self::Constant,
        Self::Random,
        Self::Gradient,
        Self::RandomGradient,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Constant => "Color",
            Self::Random => "Random Between Two Colors",
            Self::Gradient => "Gradient",
            Self::RandomGradient => "Random Between Two Gradients",
        }
    }
}

/// Map a curve output in `[0..1]` onto `[lo, hi]`.
fn remap(range: [f32; 2], y: f32) -> f32 {
    range[0] + (range[1] - range[0]) * y
}

// ---------------------------------------------------------------------------
// Spans
// ---------------------------------------------------------------------------

/// Range a scalar can take at one `t`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Span {
    pub lo: f32,
    pub hi: f32,
}

impl Span {
    pub fn fixed(value: f32) -> Self {
        Self {
            lo: value,
            hi: value,
        }
    }

    /// Value at fraction `r` of the span.
    pub fn at(&self, r: f32) -> f32 {
        self.lo + (self.hi - self.lo) * r
    }

    /// Uniform pick inside the span.
    pub fn draw(&self) -> f32 {
        if self.lo == self.hi {
            self.lo
        } else {
            self.at(fastrand::f32())
        }
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::fixed(0.0)
    }
}

/// Per-axis range a vector can take at one `t`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3Span {
    pub lo: Vec3,
    pub hi: Vec3,
}

impl Vec3Span {
    pub fn fixed(value: Vec3) -> Self {
        Self {
            lo: value,
            hi: value,
        }
    }

    /// Independent uniform pick per axis.
    pub fn draw(&self) -> Vec3 {
        if self.lo == self.hi {
            return self.lo;
        }
        let r = Vec3::new(fastrand::f32(), fastrand::f32(), fastrand::f32());
        self.lo + (self.hi - self.lo) * r
    }
}

/// Color range at one `t`; draws blend both ends with one factor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorSpan {
    pub lo: LinearRgba,
    pub hi: LinearRgba,
}

impl ColorSpan {
    pub fn fixed(color: LinearRgba) -> Self {
        Self { lo: color, hi: color }
    }

    pub fn at(&self, r: f32) -> LinearRgba {
        if self.lo == self.hi {
            return self.lo;
        }
        self.lo * (1.0 - r) + self.hi * r
    }

    pub fn draw(&self) -> LinearRgba {
        self.at(fastrand::f32())
    }
}

impl Default for ColorSpan {
    fn default() -> Self {
        Self::fixed(LinearRgba::WHITE)
    }
}

// ---------------------------------------------------------------------------
// Evaluators
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub enum ScalarEval {
    Constant(f32),
    Random { min: f32, max: f32 },
    Curve { curve: Curve, range: [f32; 2] },
    RandomCurve { curves: [Curve; 2], range: [f32; 2] },
}

impl Default for ScalarEval {
    fn default() -> Self {
        Self::Constant(0.0)
    }
}

impl ScalarEval {
    pub fn span(&self, t: f32) -> Span {
        match self {
            Self::Constant(value) => Span::fixed(*value),
            Self::Random { min, max } => Span { lo: *min, hi: *max },
            Self::Curve { curve, range } => Span::fixed(remap(*range, curve.get_value(t))),
            Self::RandomCurve { curves, range } => Span {
                lo: remap(*range, curves[0].get_value(t)),
                hi: remap(*range, curves[1].get_value(t)),
            },
        }
    }

    pub fn sample(&self, t: f32) -> f32 {
        self.span(t).draw()
    }

    /// Deterministic evaluation with a fixed random fraction, for per-particle
    /// lifetime modifiers that must stay stable across ticks.
    pub fn sample_with(&self, t: f32, r: f32) -> f32 {
        self.span(t).at(r)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Vector3Eval {
    Constant(Vec3),
    Random { min: Vec3, max: Vec3 },
    Curve { curves: [Curve; 3], range: [f32; 2] },
    RandomCurve { curves: [[Curve; 3]; 2], range: [f32; 2] },
}

impl Default for Vector3Eval {
    fn default() -> Self {
        Self::Constant(Vec3::ZERO)
    }
}

fn curve3(curves: &[Curve; 3], range: [f32; 2], t: f32) -> Vec3 {
    Vec3::new(
        remap(range, curves[0].get_value(t)),
        remap(range, curves[1].get_value(t)),
        remap(range, curves[2].get_value(t)),
    )
}

impl Vector3Eval {
    pub fn span(&self, t: f32) -> Vec3Span {
        match self {
            Self::Constant(value) => Vec3Span::fixed(*value),
            Self::Random { min, max } => Vec3Span { lo: *min, hi: *max },
            Self::Curve { curves, range } => Vec3Span::fixed(curve3(curves, *range, t)),
            Self::RandomCurve { curves, range } => Vec3Span {
                lo: curve3(&curves[0], *range, t),
                hi: curve3(&curves[1], *range, t),
            },
        }
    }

    pub fn sample(&self, t: f32) -> Vec3 {
        self.span(t).draw()
    }

    pub fn sample_with(&self, t: f32, r: f32) -> Vec3 {
        let span = self.span(t);
        span.lo + (span.hi - span.lo) * r
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ColorEval {
    Constant(LinearRgba),
    Random([LinearRgba; 2]),
    Gradient(Gradient),
    RandomGradient([Gradient; 2]),
}

impl Default for ColorEval {
    fn default() -> Self {
        Self::Constant(LinearRgba::WHITE)
    }
}

impl ColorEval {
    pub fn span(&self, t: f32) -> ColorSpan {
        match self {
            Self::Constant(color) => ColorSpan::fixed(*color),
            Self::Random([a, b]) => ColorSpan { lo: *a, hi: *b },
            Self::Gradient(gradient) => ColorSpan::fixed(gradient.get_color(t)),
            Self::RandomGradient([a, b]) => ColorSpan {
                lo: a.get_color(t),
                hi: b.get_color(t),
            },
        }
    }

    pub fn sample(&self, t: f32) -> LinearRgba {
        self.span(t).draw()
    }

    pub fn sample_with(&self, t: f32, r: f32) -> LinearRgba {
        self.span(t).at(r)
    }
}
