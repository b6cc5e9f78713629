//! Property-backed evaluator values.
//!
//! Every leaf of a value (mode, the two constants, the two curves or
//! gradients, the curve range) is its own property, so an instance can
//! override e.g. just the upper bound of a random range and keep inheriting
//! the rest.

use bevy::prelude::*;
use bevy_prefab_props::{GroupBuilder, Prop, PropertyGraph, PropertyValue};
use serde::{Deserialize, Serialize};

use crate::curve::Curve;
use crate::eval::{ColorEval, ColorMode, ScalarEval, ScalarMode, Vector3Eval};
use crate::gradient::Gradient;

/// Two optional leaves, persisted only when at least one is present.
pub type Pair<T> = [Option<T>; 2];

pub(crate) fn pair_is_empty<T>(pair: &Pair<T>) -> bool {
    pair.iter().all(Option::is_none)
}

fn pick<T: Clone>(pair: Option<&Pair<T>>, index: usize) -> Option<T> {
    pair.and_then(|p| p[index].clone())
}

fn pair_descriptor<T: PropertyValue>(
    graph: &PropertyGraph,
    props: &[Prop<T>; 2],
    overrides_only: bool,
) -> Pair<T> {
    [
        graph.descriptor(props[0], overrides_only),
        graph.descriptor(props[1], overrides_only),
    ]
}

fn build_pair<T: PropertyValue>(
    builder: &mut GroupBuilder,
    name: &str,
    explicit: Option<&Pair<T>>,
    base: Option<&[Prop<T>; 2]>,
    defaults: [T; 2],
) -> [Prop<T>; 2] {
    let [first, second] = defaults;
    [
        builder.prop(&format!("{name}[0]"), pick(explicit, 0), base.map(|b| b[0]), first),
        builder.prop(&format!("{name}[1]"), pick(explicit, 1), base.map(|b| b[1]), second),
    ]
}

// ---------------------------------------------------------------------------
// Scalar
// ---------------------------------------------------------------------------

/// Persisted form of a [`ScalarValue`]. Absent leaves inherit from the base.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ScalarDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ScalarMode>,
    #[serde(default, skip_serializing_if = "pair_is_empty")]
    pub value: Pair<f32>,
    #[serde(default, skip_serializing_if = "pair_is_empty")]
    pub curve: Pair<Curve>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curve_range: Option<[f32; 2]>,
}

impl ScalarDescriptor {
    pub fn constant(value: f32) -> Self {
        Self {
            mode: Some(ScalarMode::Constant),
            value: [Some(value), None],
            ..default()
        }
    }

    pub fn random(min: f32, max: f32) -> Self {
        Self {
            mode: Some(ScalarMode::Random),
            value: [Some(min), Some(max)],
            ..default()
        }
    }

    pub fn curve(curve: Curve, range: [f32; 2]) -> Self {
        Self {
            mode: Some(ScalarMode::Curve),
            curve: [Some(curve), None],
            curve_range: Some(range),
            ..default()
        }
    }

    pub fn random_curve(lower: Curve, upper: Curve, range: [f32; 2]) -> Self {
        Self {
            mode: Some(ScalarMode::RandomCurve),
            curve: [Some(lower), Some(upper)],
            curve_range: Some(range),
            ..default()
        }
    }

    fn is_empty(&self) -> bool {
        self.mode.is_none()
            && pair_is_empty(&self.value)
            && pair_is_empty(&self.curve)
            && self.curve_range.is_none()
    }
}

/// Fallbacks for leaves that neither the descriptor nor a base provide.
#[derive(Clone, Debug)]
pub struct ScalarDefaults {
    pub mode: ScalarMode,
    pub values: [f32; 2],
    pub curves: [Curve; 2],
    pub curve_range: [f32; 2],
}

impl ScalarDefaults {
    pub fn constant(value: f32) -> Self {
        Self {
            mode: ScalarMode::Constant,
            values: [value, value],
            curves: [Curve::constant(1.0), Curve::constant(1.0)],
            curve_range: [0.0, value.max(1.0)],
        }
    }

    pub fn random(min: f32, max: f32) -> Self {
        Self {
            mode: ScalarMode::Random,
            values: [min, max],
            ..Self::constant(max)
        }
    }

    pub fn curve(curve: Curve, range: [f32; 2]) -> Self {
        Self {
            mode: ScalarMode::Curve,
            values: [range[1], range[1]],
            curves: [curve.clone(), curve],
            curve_range: range,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ScalarValue {
    pub mode: Prop<ScalarMode>,
    pub values: [Prop<f32>; 2],
    pub curves: [Prop<Curve>; 2],
    pub curve_range: Prop<[f32; 2]>,
}

impl ScalarValue {
    pub fn build(
        builder: &mut GroupBuilder,
        name: &str,
        desc: Option<&ScalarDescriptor>,
        base: Option<&ScalarValue>,
        defaults: &ScalarDefaults,
    ) -> Self {
        Self {
            mode: builder.prop(
                &format!("{name}.mode"),
                desc.and_then(|d| d.mode),
                base.map(|b| b.mode),
                defaults.mode,
            ),
            values: build_pair(
                builder,
                &format!("{name}.value"),
                desc.map(|d| &d.value),
                base.map(|b| &b.values),
                defaults.values,
            ),
            curves: build_pair(
                builder,
                &format!("{name}.curve"),
                desc.map(|d| &d.curve),
                base.map(|b| &b.curves),
                defaults.curves.clone(),
            ),
            curve_range: builder.prop(
                &format!("{name}.curve_range"),
                desc.and_then(|d| d.curve_range),
                base.map(|b| b.curve_range),
                defaults.curve_range,
            ),
        }
    }

    pub fn resolve(&self, graph: &PropertyGraph) -> ScalarEval {
        match graph.value(self.mode) {
            ScalarMode::Constant => ScalarEval::Constant(graph.value(self.values[0])),
            ScalarMode::Random => ScalarEval::Random {
                min: graph.value(self.values[0]),
                max: graph.value(self.values[1]),
            },
            ScalarMode::Curve => ScalarEval::Curve {
                curve: graph.value(self.curves[0]),
                range: graph.value(self.curve_range),
            },
            ScalarMode::RandomCurve => ScalarEval::RandomCurve {
                curves: [graph.value(self.curves[0]), graph.value(self.curves[1])],
                range: graph.value(self.curve_range),
            },
        }
    }

    pub fn descriptor(&self, graph: &PropertyGraph, overrides_only: bool) -> Option<ScalarDescriptor> {
        let desc = ScalarDescriptor {
            mode: graph.descriptor(self.mode, overrides_only),
            value: pair_descriptor(graph, &self.values, overrides_only),
            curve: pair_descriptor(graph, &self.curves, overrides_only),
            curve_range: graph.descriptor(self.curve_range, overrides_only),
        };
        (!desc.is_empty()).then_some(desc)
    }
}

// ---------------------------------------------------------------------------
// Vector3
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Vector3Descriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ScalarMode>,
    #[serde(default, skip_serializing_if = "pair_is_empty")]
    pub value: Pair<Vec3>,
    #[serde(default, skip_serializing_if = "pair_is_empty")]
    pub curve: Pair<[Curve; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curve_range: Option<[f32; 2]>,
}

impl Vector3Descriptor {
    pub fn constant(value: Vec3) -> Self {
        Self {
            mode: Some(ScalarMode::Constant),
            value: [Some(value), None],
            ..default()
        }
    }

    pub fn random(min: Vec3, max: Vec3) -> Self {
        Self {
            mode: Some(ScalarMode::Random),
            value: [Some(min), Some(max)],
            ..default()
        }
    }

    fn is_empty(&self) -> bool {
        self.mode.is_none()
            && pair_is_empty(&self.value)
            && pair_is_empty(&self.curve)
            && self.curve_range.is_none()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Vector3Value {
    pub mode: Prop<ScalarMode>,
    pub values: [Prop<Vec3>; 2],
    pub curves: [Prop<[Curve; 3]>; 2],
    pub curve_range: Prop<[f32; 2]>,
}

impl Vector3Value {
    /// Build with a constant `default` fallback.
    pub fn build(
        builder: &mut GroupBuilder,
        name: &str,
        desc: Option<&Vector3Descriptor>,
        base: Option<&Vector3Value>,
        default: Vec3,
    ) -> Self {
        let flat = || std::array::from_fn(|_| Curve::constant(0.5));
        Self {
            mode: builder.prop(
                &format!("{name}.mode"),
                desc.and_then(|d| d.mode),
                base.map(|b| b.mode),
                ScalarMode::Constant,
            ),
            values: build_pair(
                builder,
                &format!("{name}.value"),
                desc.map(|d| &d.value),
                base.map(|b| &b.values),
                [default, default],
            ),
            curves: build_pair(
                builder,
                &format!("{name}.curve"),
                desc.map(|d| &d.curve),
                base.map(|b| &b.curves),
                [flat(), flat()],
            ),
            curve_range: builder.prop(
                &format!("{name}.curve_range"),
                desc.and_then(|d| d.curve_range),
                base.map(|b| b.curve_range),
                [-1.0, 1.0],
            ),
        }
    }

    pub fn resolve(&self, graph: &PropertyGraph) -> Vector3Eval {
        match graph.value(self.mode) {
            ScalarMode::Constant => Vector3Eval::Constant(graph.value(self.values[0])),
            ScalarMode::Random => Vector3Eval::Random {
                min: graph.value(self.values[0]),
                max: graph.value(self.values[1]),
            },
            ScalarMode::Curve => Vector3Eval::Curve {
                curves: graph.value(self.curves[0]),
                range: graph.value(self.curve_range),
            },
            ScalarMode::RandomCurve => Vector3Eval::RandomCurve {
                curves: [graph.value(self.curves[0]), graph.value(self.curves[1])],
                range: graph.value(self.curve_range),
            },
        }
    }

    pub fn descriptor(
        &self,
        graph: &PropertyGraph,
        overrides_only: bool,
    ) -> Option<Vector3Descriptor> {
        let desc = Vector3Descriptor {
            mode: graph.descriptor(self.mode, overrides_only),
            value: pair_descriptor(graph, &self.values, overrides_only),
            curve: pair_descriptor(graph, &self.curves, overrides_only),
            curve_range: graph.descriptor(self.curve_range, overrides_only),
        };
        (!desc.is_empty()).then_some(desc)
    }
}

// ---------------------------------------------------------------------------
// Color
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ColorDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ColorMode>,
    /// Linear RGBA.
    #[serde(default, skip_serializing_if = "pair_is_empty")]
    pub color: Pair<[f32; 4]>,
    #[serde(default, skip_serializing_if = "pair_is_empty")]
    pub gradients: Pair<Gradient>,
}

impl ColorDescriptor {
    pub fn constant(color: [f32; 4]) -> Self {
        Self {
            mode: Some(ColorMode::Constant),
            color: [Some(color), None],
            ..default()
        }
    }

    pub fn random(a: [f32; 4], b: [f32; 4]) -> Self {
        Self {
            mode: Some(ColorMode::Random),
            color: [Some(a), Some(b)],
            ..default()
        }
    }

    pub fn gradient(gradient: Gradient) -> Self {
        Self {
            mode: Some(ColorMode::Gradient),
            gradients: [Some(gradient), None],
            ..default()
        }
    }

    fn is_empty(&self) -> bool {
        self.mode.is_none() && pair_is_empty(&self.color) && pair_is_empty(&self.gradients)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ColorValue {
    pub mode: Prop<ColorMode>,
    pub colors: [Prop<[f32; 4]>; 2],
    pub gradients: [Prop<Gradient>; 2],
}

fn rgba(color: [f32; 4]) -> LinearRgba {
    let [r, g, b, a] = color;
    LinearRgba::new(r, g, b, a)
}

impl ColorValue {
    /// Build with `default_mode` and RGBA `default` fallbacks.
    pub fn build(
        builder: &mut GroupBuilder,
        name: &str,
        desc: Option<&ColorDescriptor>,
        base: Option<&ColorValue>,
        default_mode: ColorMode,
        default: [f32; 4],
    ) -> Self {
        Self {
            mode: builder.prop(
                &format!("{name}.mode"),
                desc.and_then(|d| d.mode),
                base.map(|b| b.mode),
                default_mode,
            ),
            colors: build_pair(
                builder,
                &format!("{name}.color"),
                desc.map(|d| &d.color),
                base.map(|b| &b.colors),
                [default, default],
            ),
            gradients: build_pair(
                builder,
                &format!("{name}.gradient"),
                desc.map(|d| &d.gradients),
                base.map(|b| &b.gradients),
                [Gradient::white_to_transparent(), Gradient::white_to_transparent()],
            ),
        }
    }

    pub fn resolve(&self, graph: &PropertyGraph) -> ColorEval {
        match graph.value(self.mode) {
            ColorMode::Constant => ColorEval::Constant(rgba(graph.value(self.colors[0]))),
            ColorMode::Random => ColorEval::Random([
                rgba(graph.value(self.colors[0])),
                rgba(graph.value(self.colors[1])),
            ]),
            ColorMode::Gradient => ColorEval::Gradient(graph.value(self.gradients[0])),
            ColorMode::RandomGradient => ColorEval::RandomGradient([
                graph.value(self.gradients[0]),
                graph.value(self.gradients[1]),
            ]),
        }
    }

    pub fn descriptor(&self, graph: &PropertyGraph, overrides_only: bool) -> Option<ColorDescriptor> {
        let desc = ColorDescriptor {
            mode: graph.descriptor(self.mode, overrides_only),
            color: pair_descriptor(graph, &self.colors, overrides_only),
            gradients: pair_descriptor(graph, &self.gradients, overrides_only),
        };
        (!desc.is_empty()).then_some(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(
        graph: &mut PropertyGraph,
        desc: Option<&ScalarDescriptor>,
        base: Option<&ScalarValue>,
    ) -> ScalarValue {
        let mut builder = GroupBuilder::new(graph, "test");
        ScalarValue::build(&mut builder, "rate", desc, base, &ScalarDefaults::constant(2.0))
    }

    #[test]
    fn missing_leaves_fall_back_to_defaults() {
        let mut graph = PropertyGraph::new();
        let value = scalar(&mut graph, None, None);
        assert_eq!(value.resolve(&graph), ScalarEval::Constant(2.0));
    }

    #[test]
    fn variation_overrides_only_named_leaf() {
        let mut graph = PropertyGraph::new();
        let base = scalar(&mut graph, Some(&ScalarDescriptor::random(1.0, 3.0)), None);
        let desc = ScalarDescriptor {
            value: [None, Some(9.0)],
            ..default()
        };
        let variation = scalar(&mut graph, Some(&desc), Some(&base));

        assert_eq!(variation.resolve(&graph), ScalarEval::Random { min: 1.0, max: 9.0 });

        graph.set(base.values[0], 0.5, false);
        assert_eq!(variation.resolve(&graph), ScalarEval::Random { min: 0.5, max: 9.0 });

        let diff = variation.descriptor(&graph, true).unwrap();
        assert_eq!(diff, desc);
    }

    #[test]
    fn plain_variation_has_no_diff() {
        let mut graph = PropertyGraph::new();
        let base = scalar(&mut graph, None, None);
        let variation = scalar(&mut graph, None, Some(&base));
        assert_eq!(variation.descriptor(&graph, true), None);
        assert!(variation.descriptor(&graph, false).is_some());
    }

    #[test]
    fn full_descriptor_reproduces_output() {
        let mut graph = PropertyGraph::new();
        let authored = scalar(
            &mut graph,
            Some(&ScalarDescriptor::curve(Curve::linear(0.0, 1.0), [2.0, 4.0])),
            None,
        );
        let full = authored.descriptor(&graph, false).unwrap();
        let copy = scalar(&mut graph, Some(&full), None);
        for i in 0..=4 {
            let t = i as f32 / 4.0;
            assert_eq!(
                authored.resolve(&graph).sample(t),
                copy.resolve(&graph).sample(t)
            );
        }
    }

    #[test]
    fn color_value_resolves_modes() {
        let mut graph = PropertyGraph::new();
        let mut builder = GroupBuilder::new(&mut graph, "test");
        let color = ColorValue::build(
            &mut builder,
            "start_color",
            Some(&ColorDescriptor::constant([1.0, 0.5, 0.0, 1.0])),
            None,
            ColorMode::Constant,
            [1.0; 4],
        );
        assert_eq!(
            color.resolve(&graph),
            ColorEval::Constant(LinearRgba::new(1.0, 0.5, 0.0, 1.0))
        );

        graph.set(color.mode, ColorMode::Gradient, false);
        assert_eq!(
            color.resolve(&graph),
            ColorEval::Gradient(Gradient::white_to_transparent())
        );
    }

    #[test]
    fn vector_value_resolves_constant() {
        let mut graph = PropertyGraph::new();
        let mut builder = GroupBuilder::new(&mut graph, "test");
        let force = Vector3Value::build(
            &mut builder,
            "force",
            Some(&Vector3Descriptor::constant(Vec3::Y)),
            None,
            Vec3::ZERO,
        );
        assert_eq!(force.resolve(&graph), Vector3Eval::Constant(Vec3::Y));
        assert!(force.descriptor(&graph, true).is_some());
    }
}
