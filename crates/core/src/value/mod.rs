//! The temporal value model.
//!
//! A [`Value`] is "a quantity that may change over time". Two operations
//! matter:
//!
//! - [`Value::get`] pulls the concrete value for the next fixture. Ranges and
//!   sequences are generators and advance an internal cursor on every call,
//!   so a single value fanned out across a selection must be pulled exactly
//!   once per fixture, in fixture order.
//! - [`Value::run`] / [`Value::sample`] are pure functions of elapsed time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fx::Dynamic;
use crate::{LuxError, Result};

mod transition;

pub use transition::{Delay, Fade};

/// Inclusive numeric bounds of a parameter, used to scale percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn scale_percent(&self, percent: f64) -> f64 {
        self.min + (self.max - self.min) * (percent / 100.0)
    }
}

/// Key of a tuple entry: either a name (`red`) or a position (`_0`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TupleKey {
    Named(String),
    Index(usize),
}

impl TupleKey {
    /// Parses a raw key as written in scripts; `_<n>` is positional.
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix('_').map(str::parse::<usize>) {
            Some(Ok(index)) => Self::Index(index),
            _ => Self::Named(raw.to_string()),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn is_named(&self) -> bool {
        matches!(self, Self::Named(_))
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            Self::Index(_) => None,
        }
    }
}

impl fmt::Display for TupleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Index(index) => write!(f, "_{index}"),
        }
    }
}

/// Ordered map of key to value. A tuple is either fully named or fully
/// positional; the constructor rejects mixtures.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    entries: Vec<(TupleKey, Value)>,
}

impl Tuple {
    pub fn new(entries: Vec<(TupleKey, Value)>) -> Result<Self> {
        let named = entries.iter().filter(|(key, _)| key.is_named()).count();
        if named != 0 && named != entries.len() {
            return Err(LuxError::MixedTupleKind);
        }

        let mut entries = entries;
        if named == 0 {
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        }
        Ok(Self { entries })
    }

    pub fn named<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(key, value)| (TupleKey::Named(key.into()), value))
                .collect(),
        }
    }

    pub fn positional(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            entries: values
                .into_iter()
                .enumerate()
                .map(|(index, value)| (TupleKey::Index(index), value))
                .collect(),
        }
    }

    /// Empty tuples count as named.
    pub fn is_named(&self) -> bool {
        self.entries.iter().all(|(key, _)| key.is_named())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(TupleKey, Value)] {
        &self.entries
    }

    pub fn keys(&self) -> impl Iterator<Item = &TupleKey> {
        self.entries.iter().map(|(key, _)| key)
    }

    pub fn get(&self, key: &TupleKey) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Value> {
        self.entries.iter_mut().map(|(_, value)| value)
    }

    pub fn into_entries(self) -> Vec<(TupleKey, Value)> {
        self.entries
    }

    /// Renames a positional tuple using `template`'s key order. Named tuples
    /// are returned unchanged; `None` when the arities differ.
    pub fn name_as(self, template: &Tuple) -> Option<Tuple> {
        if self.is_named() {
            return Some(self);
        }
        if self.len() != template.len() {
            return None;
        }

        let entries = template
            .keys()
            .cloned()
            .zip(self.entries.into_iter().map(|(_, value)| value))
            .collect();
        Some(Tuple { entries })
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Tuple{")?;
        for (key, value) in &self.entries {
            write!(f, " {key}: {value}")?;
        }
        f.write_str(" }")
    }
}

/// Materialised value at an instant, produced by [`Value::run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Sample {
    Scalar(f64),
    Tuple(Vec<(TupleKey, f64)>),
}

impl Sample {
    pub fn scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(value) => Some(*value),
            Self::Tuple(_) => None,
        }
    }

    /// Linear blend of two samples of the same shape. Tuples are blended
    /// entry by entry in order and keep `start`'s keys.
    pub fn blend(start: &Sample, finish: &Sample, factor: f64) -> Option<Sample> {
        fn lerp(a: f64, b: f64, t: f64) -> f64 {
            a + (b - a) * t
        }

        match (start, finish) {
            (Self::Scalar(a), Self::Scalar(b)) => Some(Self::Scalar(lerp(*a, *b, factor))),
            (Self::Tuple(a), Self::Tuple(b)) if a.len() == b.len() => Some(Self::Tuple(
                a.iter()
                    .zip(b)
                    .map(|((key, a), (_, b))| (key.clone(), lerp(*a, *b, factor)))
                    .collect(),
            )),
            _ => None,
        }
    }
}

/// Linear generator over `count` samples from `start` to `finish`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRange {
    start: f64,
    finish: f64,
    count: usize,
    percent: bool,
    cursor: usize,
}

impl ValueRange {
    pub fn new(start: f64, finish: f64, count: usize) -> Self {
        Self {
            start,
            finish,
            count,
            percent: false,
            cursor: 0,
        }
    }

    /// A range whose samples are percentages of the target parameter.
    pub fn percent(start: f64, finish: f64, count: usize) -> Self {
        Self {
            percent: true,
            ..Self::new(start, finish, count)
        }
    }

    fn wrap(&self, value: f64) -> Value {
        if self.percent {
            Value::Percent(value)
        } else {
            Value::Static(value)
        }
    }

    /// Returns the next step; the last call lands exactly on `finish` and
    /// every later call repeats it.
    pub fn next_value(&mut self) -> Value {
        let last = self.count.saturating_sub(1);
        if self.cursor >= last {
            return self.wrap(self.finish);
        }

        let step = (self.finish - self.start) / last as f64;
        let value = self.start + step * self.cursor as f64;
        self.cursor += 1;
        self.wrap((value * 100.0).round() / 100.0)
    }
}

/// Round-robin generator over a fixed list of values.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSequence {
    items: Vec<Value>,
    cursor: usize,
}

impl ValueSequence {
    pub fn new(items: Vec<Value>) -> Result<Self> {
        if items.is_empty() {
            return Err(LuxError::invalid_argument("a sequence needs at least one value"));
        }
        Ok(Self { items, cursor: 0 })
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn next_value(&mut self) -> Value {
        let index = self.cursor;
        self.cursor = (self.cursor + 1) % self.items.len();
        self.items[index].get()
    }
}

/// A quantity that may change over time.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Static(f64),
    Percent(f64),
    Tuple(Tuple),
    Range(ValueRange),
    Sequence(ValueSequence),
    Dynamic(Dynamic),
    Fade(Fade),
    Delay(Delay),
}

impl Value {
    /// Pulls the concrete value for the next target fixture.
    pub fn get(&mut self) -> Value {
        match self {
            Self::Range(range) => range.next_value(),
            Self::Sequence(sequence) => sequence.next_value(),
            Self::Tuple(tuple) => Self::Tuple(Tuple {
                entries: tuple
                    .entries
                    .iter_mut()
                    .map(|(key, value)| (key.clone(), value.get()))
                    .collect(),
            }),
            Self::Dynamic(dynamic) => Self::Dynamic(dynamic.generate()),
            Self::Static(_) | Self::Percent(_) | Self::Fade(_) | Self::Delay(_) => self.clone(),
        }
    }

    /// Samples the value at `elapsed` seconds with percentages left raw.
    pub fn run(&self, elapsed: f64) -> Sample {
        self.sample(elapsed, None)
    }

    /// Samples the value at `elapsed` seconds. When `bounds` is given,
    /// percentages are mapped onto it.
    pub fn sample(&self, elapsed: f64, bounds: Option<Bounds>) -> Sample {
        match self {
            Self::Static(value) => Sample::Scalar(*value),
            Self::Percent(percent) => Sample::Scalar(
                bounds.map_or(*percent, |bounds| bounds.scale_percent(*percent)),
            ),
            Self::Tuple(tuple) => Sample::Tuple(
                tuple
                    .entries
                    .iter()
                    .map(|(key, value)| {
                        let sampled = value.sample(elapsed, None).scalar().unwrap_or(0.0);
                        (key.clone(), sampled)
                    })
                    .collect(),
            ),
            // Unconsumed generators sample as their first element.
            Self::Range(range) => range.clone().next_value().sample(elapsed, bounds),
            Self::Sequence(sequence) => sequence.items[0].sample(elapsed, bounds),
            Self::Dynamic(dynamic) => dynamic.sample(elapsed, bounds),
            Self::Fade(fade) => fade.sample(elapsed, bounds),
            Self::Delay(delay) => delay.sample(elapsed, bounds),
        }
    }

    /// Magnitude used to decide whether a transition goes up or down.
    /// Transitions report their destination.
    pub fn level(&self) -> Option<f64> {
        match self {
            Self::Static(value) | Self::Percent(value) => Some(*value),
            Self::Fade(fade) => fade.finish().level(),
            Self::Delay(delay) => delay.finish().level(),
            Self::Tuple(_) | Self::Range(_) | Self::Sequence(_) | Self::Dynamic(_) => None,
        }
    }

    pub fn is_transition(&self) -> bool {
        matches!(self, Self::Fade(_) | Self::Delay(_))
    }

    /// Collapses every transition whose duration has elapsed into its
    /// terminal branch. Called once per frame tick.
    pub fn resolve(&mut self, elapsed: f64) {
        let finished = match self {
            Self::Fade(fade) => fade.finished_at(elapsed),
            Self::Delay(delay) => delay.finished_at(elapsed),
            Self::Tuple(tuple) => {
                tuple.values_mut().for_each(|value| value.resolve(elapsed));
                return;
            }
            _ => return,
        };
        if !finished {
            return;
        }

        let mut terminal = match std::mem::replace(self, Self::Static(0.0)) {
            Self::Fade(fade) => fade.into_terminal(),
            Self::Delay(delay) => delay.into_terminal(),
            other => other,
        };
        terminal.resolve(elapsed);
        *self = terminal;
    }

    /// Anchors in-flight transitions and generators at `elapsed` so they keep
    /// their progress when the cue clock restarts from zero.
    pub fn restart_from(&mut self, elapsed: f64) {
        self.offset_by(elapsed);
    }

    pub(crate) fn offset_by(&mut self, offset: f64) {
        match self {
            Self::Fade(fade) => fade.offset_by(offset),
            Self::Delay(delay) => delay.offset_by(offset),
            Self::Dynamic(dynamic) => dynamic.offset_by(offset),
            Self::Tuple(tuple) => tuple.values_mut().for_each(|value| value.offset_by(offset)),
            Self::Static(_) | Self::Percent(_) | Self::Range(_) | Self::Sequence(_) => {}
        }
    }

    /// Jumps every transition to its end state immediately.
    pub fn fast_forward(&mut self) {
        match self {
            Self::Fade(_) | Self::Delay(_) => {
                let mut terminal = match std::mem::replace(self, Self::Static(0.0)) {
                    Self::Fade(fade) => fade.into_finish(),
                    Self::Delay(delay) => delay.into_finish(),
                    other => other,
                };
                terminal.fast_forward();
                *self = terminal;
            }
            Self::Tuple(tuple) => tuple.values_mut().for_each(Value::fast_forward),
            _ => {}
        }
    }

    /// Replaces unresolved generator arguments with `current`.
    pub fn resolve_nil_values(&mut self, current: &Value) {
        if let Self::Dynamic(dynamic) = self {
            dynamic.resolve_nil_values(current);
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Static(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => write!(f, "Static({value})"),
            Self::Percent(value) => write!(f, "Percent({value}%)"),
            Self::Tuple(tuple) => tuple.fmt(f),
            Self::Range(range) => write!(
                f,
                "Range({} -> {} / {})",
                range.start, range.finish, range.count
            ),
            Self::Sequence(sequence) => {
                f.write_str("Sequence[")?;
                for (index, item) in sequence.items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    item.fmt(f)?;
                }
                f.write_str("]")
            }
            Self::Dynamic(dynamic) => dynamic.fmt(f),
            Self::Fade(fade) => fade.fmt(f),
            Self::Delay(delay) => delay.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_steps_and_lands_on_finish() {
        let mut range = Value::Range(ValueRange::new(0.0, 100.0, 5));
        let pulled: Vec<Value> = (0..5).map(|_| range.get()).collect();
        assert_eq!(
            pulled,
            vec![
                Value::Static(0.0),
                Value::Static(25.0),
                Value::Static(50.0),
                Value::Static(75.0),
                Value::Static(100.0),
            ]
        );
        assert_eq!(range.get(), Value::Static(100.0));
    }

    #[test]
    fn range_rounds_intermediate_steps_and_keeps_percent_kind() {
        let mut range = ValueRange::percent(0.0, 100.0, 4);
        assert_eq!(range.next_value(), Value::Percent(0.0));
        assert_eq!(range.next_value(), Value::Percent(33.33));
        assert_eq!(range.next_value(), Value::Percent(66.67));
        assert_eq!(range.next_value(), Value::Percent(100.0));
    }

    #[test]
    fn single_fixture_range_yields_finish() {
        let mut range = ValueRange::new(10.0, 90.0, 1);
        assert_eq!(range.next_value(), Value::Static(90.0));
    }

    #[test]
    fn sequence_wraps_round_robin() {
        let items = vec![Value::Static(1.0), Value::Static(2.0), Value::Static(3.0)];
        let mut sequence = Value::Sequence(ValueSequence::new(items).unwrap());
        let pulled: Vec<f64> = (0..7)
            .map(|_| sequence.get().level().unwrap())
            .collect();
        assert_eq!(pulled, vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn empty_sequence_is_rejected() {
        assert!(ValueSequence::new(Vec::new()).is_err());
    }

    #[test]
    fn tuple_rejects_mixed_keys() {
        let err = Tuple::new(vec![
            (TupleKey::parse("red"), Value::Static(1.0)),
            (TupleKey::parse("_1"), Value::Static(2.0)),
        ])
        .unwrap_err();
        assert!(matches!(err, LuxError::MixedTupleKind));
    }

    #[test]
    fn positional_tuple_is_ordered_and_renamed() {
        let tuple = Tuple::new(vec![
            (TupleKey::parse("_1"), Value::Static(2.0)),
            (TupleKey::parse("_0"), Value::Static(1.0)),
        ])
        .unwrap();
        assert!(!tuple.is_named());
        assert_eq!(tuple.entries()[0].1, Value::Static(1.0));

        let template = Tuple::named([("pan", Value::Static(0.0)), ("tilt", Value::Static(0.0))]);
        let renamed = tuple.name_as(&template).unwrap();
        assert_eq!(renamed.get(&TupleKey::named("tilt")), Some(&Value::Static(2.0)));
    }

    #[test]
    fn tuple_get_pulls_each_entry() {
        let mut tuple = Value::Tuple(Tuple::named([
            ("red", Value::Range(ValueRange::new(0.0, 100.0, 3))),
            ("green", Value::Static(10.0)),
        ]));
        let _ = tuple.get();
        let second = tuple.get();
        assert_eq!(
            second.run(0.0),
            Sample::Tuple(vec![
                (TupleKey::named("red"), 50.0),
                (TupleKey::named("green"), 10.0),
            ])
        );
    }

    #[test]
    fn percent_scales_only_with_bounds() {
        let value = Value::Percent(50.0);
        assert_eq!(value.run(3.0), Sample::Scalar(50.0));
        assert_eq!(
            value.sample(3.0, Some(Bounds::new(0.0, 540.0))),
            Sample::Scalar(270.0)
        );
    }

    #[test]
    fn display_is_readable() {
        let tuple = Value::Tuple(Tuple::named([("red", Value::Static(100.0))]));
        assert_eq!(tuple.to_string(), "Tuple{ red: Static(100) }");
        assert_eq!(Value::Percent(20.0).to_string(), "Percent(20%)");
    }
}
