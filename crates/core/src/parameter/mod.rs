//! Per-fixture parameter state and the mapping onto DMX channels.

use crate::color::ColorSpace;
use crate::timing::TimeContext;
use crate::value::{Bounds, Delay, Fade, Sample, Tuple, TupleKey, Value};
use crate::{LuxError, Result};

/// Immutable description of one controllable channel (or channel pair).
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub id: String,
    pub default: f64,
    /// Offset from the fixture's start address.
    pub offset: usize,
    pub min: f64,
    pub max: f64,
    /// 16-bit parameter spanning two channels (coarse, fine).
    pub fine: bool,
}

impl Parameter {
    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.min, self.max)
    }

    /// Number of DMX channels the parameter occupies.
    pub fn width(&self) -> usize {
        if self.fine {
            2
        } else {
            1
        }
    }

    fn factor(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if span <= 0.0 {
            return 0.0;
        }
        ((value - self.min) / span).clamp(0.0, 1.0)
    }

    /// Maps a value in `[min, max]` onto DMX, clamping anything outside.
    pub fn to_dmx(&self, value: f64) -> DmxValue {
        if self.fine {
            let steps = (self.factor(value) * 65535.0).round() as u16;
            let [coarse, fine] = steps.to_be_bytes();
            return DmxValue::Fine(coarse, fine);
        }

        if value >= self.max {
            DmxValue::Coarse(255)
        } else if value <= self.min {
            DmxValue::Coarse(0)
        } else {
            DmxValue::Coarse((self.factor(value) * 255.0).round() as u8)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmxValue {
    Coarse(u8),
    Fine(u8, u8),
}

impl DmxValue {
    /// Writes into `data` at `offset`; bytes past the end are dropped.
    pub fn write(&self, data: &mut [u8], offset: usize) {
        let (bytes, width) = match *self {
            Self::Coarse(value) => ([value, 0], 1),
            Self::Fine(coarse, fine) => ([coarse, fine], 2),
        };
        for (index, byte) in bytes[..width].iter().enumerate() {
            if let Some(slot) = data.get_mut(offset + index) {
                *slot = *byte;
            }
        }
    }
}

/// Composite control such as `color` or `position`. Child offsets are
/// relative to the fixture, not the group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupParameter {
    pub id: String,
    pub offset: usize,
    pub children: Vec<Parameter>,
}

impl GroupParameter {
    fn child_names(&self) -> Vec<&str> {
        self.children.iter().map(|child| child.id.as_str()).collect()
    }

    fn default_tuple(&self) -> Tuple {
        Tuple::named(
            self.children
                .iter()
                .map(|child| (child.id.clone(), Value::Static(child.default))),
        )
    }
}

/// Live value tree for one single-channel parameter of one fixture.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterInstance {
    parameter: Parameter,
    value: Value,
}

impl ParameterInstance {
    pub fn new(parameter: Parameter) -> Self {
        let value = Value::Static(parameter.default);
        Self { parameter, value }
    }

    pub fn id(&self) -> &str {
        &self.parameter.id
    }

    pub fn parameter(&self) -> &Parameter {
        &self.parameter
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Replaces the value, wrapping it in the fades and delays the context
    /// asks for. `None` leaves the parameter untouched.
    pub fn apply(&mut self, value: Option<Value>, context: &TimeContext) -> Result<()> {
        let Some(mut value) = value else {
            return Ok(());
        };
        if let Value::Tuple(tuple) = &value {
            return Err(LuxError::InvalidValue {
                parameter: self.parameter.id.clone(),
                reason: format!("expected a single value but found {tuple}"),
            });
        }

        value.resolve_nil_values(&self.value);
        let faded = Fade::from_context(&self.value, Some(value), context);
        self.value = Delay::from_context(&self.value, Some(faded), context);
        Ok(())
    }

    pub fn sample(&self, elapsed: f64) -> f64 {
        match self.value.sample(elapsed, Some(self.parameter.bounds())) {
            Sample::Scalar(value) => value,
            Sample::Tuple(entries) => entries.first().map_or(self.parameter.min, |(_, v)| *v),
        }
    }

    pub fn run(&self, elapsed: f64) -> DmxValue {
        self.parameter.to_dmx(self.sample(elapsed))
    }

    pub fn reset(&mut self) {
        self.value = Value::Static(self.parameter.default);
    }

    pub fn resolve(&mut self, elapsed: f64) {
        self.value.resolve(elapsed);
    }

    pub fn fast_forward(&mut self) {
        self.value.fast_forward();
    }

    pub fn restart_from(&mut self, elapsed: f64) {
        self.value.restart_from(elapsed);
    }
}

/// Live value tree for a group parameter, fanned out to its children.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupParameterInstance {
    parameter: GroupParameter,
    color_space: Option<ColorSpace>,
    value: Value,
}

impl GroupParameterInstance {
    pub fn new(parameter: GroupParameter, color_space: Option<ColorSpace>) -> Self {
        let value = Value::Tuple(parameter.default_tuple());
        Self {
            parameter,
            color_space,
            value,
        }
    }

    pub fn id(&self) -> &str {
        &self.parameter.id
    }

    pub fn parameter(&self) -> &GroupParameter {
        &self.parameter
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn apply(&mut self, value: Option<Value>, context: &TimeContext) -> Result<()> {
        let Some(value) = value else {
            return Ok(());
        };

        let mut value = match value {
            Value::Tuple(tuple) => Value::Tuple(self.conform(tuple)?),
            other if other.sample(0.0, None).scalar().is_some() => {
                Value::Tuple(self.broadcast(other))
            }
            other => other,
        };
        self.resolve_nil_values(&mut value);

        let faded = Fade::from_context(&self.value, Some(value), context);
        self.value = Delay::from_context(&self.value, Some(faded), context);
        Ok(())
    }

    /// One copy of a scalar-shaped value per child, so each child scales it
    /// into its own bounds and fades on its own.
    fn broadcast(&self, value: Value) -> Tuple {
        Tuple::named(
            self.parameter
                .children
                .iter()
                .map(|child| (child.id.as_str(), value.clone())),
        )
    }

    /// Brings a tuple into the group's own key order, converting color
    /// spaces and naming positional entries on the way.
    fn conform(&self, tuple: Tuple) -> Result<Tuple> {
        let tuple = match self.foreign_color_space(&tuple) {
            Some((from, to)) => ColorSpace::convert(tuple, from, to)?,
            None => tuple,
        };

        let names = self.parameter.child_names();
        let mismatch = |found: &Tuple| LuxError::TupleArityMismatch {
            parameter: self.parameter.id.clone(),
            expected: names.join(", "),
            found: found.keys().map(ToString::to_string).collect::<Vec<_>>().join(", "),
        };

        if tuple.len() != names.len() {
            return Err(mismatch(&tuple));
        }

        if !tuple.is_named() {
            let values = tuple.into_entries().into_iter().map(|(_, value)| value);
            return Ok(Tuple::named(names.iter().copied().zip(values)));
        }

        let mut ordered = Vec::with_capacity(names.len());
        for name in &names {
            match tuple.get(&TupleKey::named(*name)) {
                Some(value) => ordered.push((*name, value.clone())),
                None => return Err(mismatch(&tuple)),
            }
        }
        Ok(Tuple::named(ordered))
    }

    fn foreign_color_space(&self, tuple: &Tuple) -> Option<(ColorSpace, ColorSpace)> {
        let own = self.color_space?;
        if !tuple.is_named() {
            return None;
        }
        let supplied = ColorSpace::detect(tuple.keys())?;
        (supplied != own).then_some((supplied, own))
    }

    fn resolve_nil_values(&self, value: &mut Value) {
        match (value, &self.value) {
            (Value::Tuple(target), Value::Tuple(current)) => {
                let keys: Vec<TupleKey> = target.keys().cloned().collect();
                for (key, entry) in keys.iter().zip(target.values_mut()) {
                    if let Some(current) = current.get(key) {
                        entry.resolve_nil_values(current);
                    }
                }
            }
            (value, current) => value.resolve_nil_values(current),
        }
    }

    /// Child values at `elapsed`, in declaration order. Children the value
    /// does not mention stay at their default.
    pub fn sample(&self, elapsed: f64) -> Vec<f64> {
        let children = &self.parameter.children;
        if let Value::Tuple(tuple) = &self.value {
            return children
                .iter()
                .map(|child| {
                    tuple
                        .get(&TupleKey::named(child.id.as_str()))
                        .and_then(|value| value.sample(elapsed, Some(child.bounds())).scalar())
                        .unwrap_or(child.default)
                })
                .collect();
        }

        match self.value.run(elapsed) {
            Sample::Scalar(value) => vec![value; children.len()],
            Sample::Tuple(entries) => children
                .iter()
                .enumerate()
                .map(|(index, child)| {
                    entries
                        .iter()
                        .find(|(key, _)| match key {
                            TupleKey::Named(name) => *name == child.id,
                            TupleKey::Index(position) => *position == index,
                        })
                        .map_or(child.default, |(_, value)| *value)
                })
                .collect(),
        }
    }

    /// DMX output per child as `(offset, value)` pairs.
    pub fn run(&self, elapsed: f64) -> Vec<(usize, DmxValue)> {
        self.parameter
            .children
            .iter()
            .zip(self.sample(elapsed))
            .map(|(child, value)| (child.offset, child.to_dmx(value)))
            .collect()
    }

    pub fn reset(&mut self) {
        self.value = Value::Tuple(self.parameter.default_tuple());
    }

    pub fn resolve(&mut self, elapsed: f64) {
        self.value.resolve(elapsed);
    }

    pub fn fast_forward(&mut self) {
        self.value.fast_forward();
    }

    pub fn restart_from(&mut self, elapsed: f64) {
        self.value.restart_from(elapsed);
    }
}

/// A fixture's parameter slot.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterSlot {
    Single(ParameterInstance),
    Group(GroupParameterInstance),
}

impl ParameterSlot {
    pub fn id(&self) -> &str {
        match self {
            Self::Single(instance) => instance.id(),
            Self::Group(instance) => instance.id(),
        }
    }

    pub fn value(&self) -> &Value {
        match self {
            Self::Single(instance) => instance.value(),
            Self::Group(instance) => instance.value(),
        }
    }

    pub fn apply(&mut self, value: Option<Value>, context: &TimeContext) -> Result<()> {
        match self {
            Self::Single(instance) => instance.apply(value, context),
            Self::Group(instance) => instance.apply(value, context),
        }
    }

    /// Writes this slot's channels into a fixture-sized buffer.
    pub fn write(&self, elapsed: f64, data: &mut [u8]) {
        match self {
            Self::Single(instance) => {
                instance.run(elapsed).write(data, instance.parameter().offset)
            }
            Self::Group(instance) => {
                for (offset, value) in instance.run(elapsed) {
                    value.write(data, offset);
                }
            }
        }
    }

    pub fn reset(&mut self) {
        match self {
            Self::Single(instance) => instance.reset(),
            Self::Group(instance) => instance.reset(),
        }
    }

    pub fn resolve(&mut self, elapsed: f64) {
        match self {
            Self::Single(instance) => instance.resolve(elapsed),
            Self::Group(instance) => instance.resolve(elapsed),
        }
    }

    pub fn fast_forward(&mut self) {
        match self {
            Self::Single(instance) => instance.fast_forward(),
            Self::Group(instance) => instance.fast_forward(),
        }
    }

    pub fn restart_from(&mut self, elapsed: f64) {
        match self {
            Self::Single(instance) => instance.restart_from(elapsed),
            Self::Group(instance) => instance.restart_from(elapsed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::TimeKeyword;

    fn dimmer() -> Parameter {
        Parameter {
            id: "intensity".to_string(),
            default: 0.0,
            offset: 0,
            min: 0.0,
            max: 100.0,
            fine: false,
        }
    }

    fn color_group() -> GroupParameter {
        let child = |id: &str, offset| Parameter {
            id: id.to_string(),
            offset,
            ..dimmer()
        };
        GroupParameter {
            id: "color".to_string(),
            offset: 2,
            children: vec![child("red", 2), child("green", 3), child("blue", 4)],
        }
    }

    #[test]
    fn to_dmx_maps_and_clamps_coarse_values() {
        let parameter = dimmer();
        assert_eq!(parameter.to_dmx(0.0), DmxValue::Coarse(0));
        assert_eq!(parameter.to_dmx(100.0), DmxValue::Coarse(255));
        assert_eq!(parameter.to_dmx(50.0), DmxValue::Coarse(128));
        assert_eq!(parameter.to_dmx(140.0), DmxValue::Coarse(255));
        assert_eq!(parameter.to_dmx(-3.0), DmxValue::Coarse(0));
    }

    #[test]
    fn to_dmx_splits_fine_values() {
        let parameter = Parameter {
            fine: true,
            min: 0.0,
            max: 540.0,
            ..dimmer()
        };
        assert_eq!(parameter.to_dmx(0.0), DmxValue::Fine(0, 0));
        assert_eq!(parameter.to_dmx(540.0), DmxValue::Fine(255, 255));
        assert_eq!(parameter.to_dmx(270.0), DmxValue::Fine(128, 0));
    }

    #[test]
    fn write_never_leaves_the_buffer() {
        let mut data = [0u8; 2];
        DmxValue::Fine(1, 2).write(&mut data, 1);
        assert_eq!(data, [0, 1]);
    }

    #[test]
    fn percent_values_scale_into_bounds() {
        let mut instance = ParameterInstance::new(Parameter {
            min: 0.0,
            max: 540.0,
            ..dimmer()
        });
        instance
            .apply(Some(Value::Percent(50.0)), &TimeContext::new())
            .unwrap();
        assert_eq!(instance.sample(0.0), 270.0);
    }

    #[test]
    fn apply_fades_from_current_value() {
        let mut context = TimeContext::new();
        context.push();
        context.set(TimeKeyword::Fade, 2.0);

        let mut instance = ParameterInstance::new(dimmer());
        instance.apply(Some(Value::Static(100.0)), &context).unwrap();
        assert_eq!(instance.run(1.0), DmxValue::Coarse(128));
        assert_eq!(instance.run(2.0), DmxValue::Coarse(255));

        instance.resolve(2.0);
        assert_eq!(instance.value(), &Value::Static(100.0));
        instance.reset();
        assert_eq!(instance.value(), &Value::Static(0.0));
    }

    #[test]
    fn single_parameter_rejects_tuples() {
        let mut instance = ParameterInstance::new(dimmer());
        let tuple = Value::Tuple(Tuple::positional([Value::Static(1.0)]));
        let err = instance.apply(Some(tuple), &TimeContext::new()).unwrap_err();
        assert!(matches!(err, LuxError::InvalidValue { .. }));
    }

    #[test]
    fn group_names_positional_tuples() {
        let mut group = GroupParameterInstance::new(color_group(), Some(ColorSpace::Rgb));
        let tuple = Tuple::positional([
            Value::Static(100.0),
            Value::Static(50.0),
            Value::Static(0.0),
        ]);
        group.apply(Some(Value::Tuple(tuple)), &TimeContext::new()).unwrap();
        assert_eq!(
            group.run(0.0),
            vec![
                (2, DmxValue::Coarse(255)),
                (3, DmxValue::Coarse(128)),
                (4, DmxValue::Coarse(0)),
            ]
        );
    }

    #[test]
    fn group_rejects_wrong_arity_and_unknown_keys() {
        let mut group = GroupParameterInstance::new(color_group(), Some(ColorSpace::Rgb));
        let short = Tuple::positional([Value::Static(1.0), Value::Static(2.0)]);
        let err = group
            .apply(Some(Value::Tuple(short)), &TimeContext::new())
            .unwrap_err();
        assert!(matches!(err, LuxError::TupleArityMismatch { .. }));

        let wrong = Tuple::named([
            ("red", Value::Static(1.0)),
            ("green", Value::Static(2.0)),
            ("amber", Value::Static(3.0)),
        ]);
        let err = group
            .apply(Some(Value::Tuple(wrong)), &TimeContext::new())
            .unwrap_err();
        assert!(matches!(err, LuxError::TupleArityMismatch { .. }));
    }

    #[test]
    fn group_converts_foreign_color_space() {
        let mut group = GroupParameterInstance::new(color_group(), Some(ColorSpace::Rgb));
        let cmy = Tuple::named([
            ("cyan", Value::Static(0.0)),
            ("magenta", Value::Static(100.0)),
            ("yellow", Value::Static(100.0)),
        ]);
        group.apply(Some(Value::Tuple(cmy)), &TimeContext::new()).unwrap();
        assert_eq!(group.sample(0.0), vec![100.0, 0.0, 0.0]);
    }

    #[test]
    fn group_broadcasts_scalars() {
        let mut group = GroupParameterInstance::new(color_group(), None);
        group
            .apply(Some(Value::Static(40.0)), &TimeContext::new())
            .unwrap();
        assert_eq!(group.sample(0.0), vec![40.0, 40.0, 40.0]);
    }

    fn position_group() -> GroupParameter {
        let child = |id: &str, offset, max| Parameter {
            id: id.to_string(),
            offset,
            fine: true,
            max,
            ..dimmer()
        };
        GroupParameter {
            id: "position".to_string(),
            offset: 1,
            children: vec![child("pan", 1, 540.0), child("tilt", 3, 270.0)],
        }
    }

    #[test]
    fn group_percent_scales_into_each_child() {
        let mut group = GroupParameterInstance::new(position_group(), None);
        group
            .apply(Some(Value::Percent(50.0)), &TimeContext::new())
            .unwrap();
        assert_eq!(group.sample(0.0), vec![270.0, 135.0]);
        assert_eq!(
            group.run(0.0),
            vec![(1, DmxValue::Fine(128, 0)), (3, DmxValue::Fine(128, 0))]
        );
    }

    #[test]
    fn group_fades_from_a_broadcast_scalar_to_a_tuple() {
        let mut group = GroupParameterInstance::new(position_group(), None);
        group
            .apply(Some(Value::Static(100.0)), &TimeContext::new())
            .unwrap();

        let mut context = TimeContext::new();
        context.push();
        context.set(TimeKeyword::Fade, 2.0);
        let target = Tuple::named([("pan", Value::Static(200.0)), ("tilt", Value::Static(200.0))]);
        group.apply(Some(Value::Tuple(target)), &context).unwrap();

        assert_eq!(group.sample(0.0), vec![100.0, 100.0]);
        assert_eq!(group.sample(1.0), vec![150.0, 150.0]);
        assert_eq!(group.sample(2.0), vec![200.0, 200.0]);
    }

    #[test]
    fn group_fades_each_channel() {
        let mut context = TimeContext::new();
        context.push();
        context.set(TimeKeyword::Fade, 2.0);

        let mut group = GroupParameterInstance::new(color_group(), Some(ColorSpace::Rgb));
        let tuple = Tuple::named([
            ("red", Value::Static(100.0)),
            ("green", Value::Static(0.0)),
            ("blue", Value::Static(50.0)),
        ]);
        group.apply(Some(Value::Tuple(tuple)), &context).unwrap();
        assert_eq!(group.sample(1.0), vec![50.0, 0.0, 25.0]);

        group.fast_forward();
        assert_eq!(group.sample(0.0), vec![100.0, 0.0, 50.0]);
    }
}
