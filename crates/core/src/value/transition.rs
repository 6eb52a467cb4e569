use std::fmt;

use super::{Bounds, Sample, Tuple, Value};
use crate::timing::TimeContext;

/// Continuous blend from `start` to `finish` over `duration` seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Fade {
    start: Box<Value>,
    finish: Box<Value>,
    duration: f64,
    run_from: Option<f64>,
}

impl Fade {
    pub fn new(start: Value, finish: Value, duration: f64) -> Self {
        Self {
            start: Box::new(start),
            finish: Box::new(finish),
            duration,
            run_from: None,
        }
    }

    pub fn start(&self) -> &Value {
        &self.start
    }

    pub fn finish(&self) -> &Value {
        &self.finish
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Wraps `target` in a fade from `current` when the context asks for one.
    ///
    /// A missing target means "no change". Equal levels never fade. Tuples
    /// fade key by key after an anonymous target is named after `current`.
    pub fn from_context(current: &Value, target: Option<Value>, context: &TimeContext) -> Value {
        let Some(target) = target else {
            return current.clone();
        };
        if !context.any_fade() {
            return target;
        }

        if let (Value::Tuple(from), Value::Tuple(to)) = (current, &target) {
            return match to.clone().name_as(from) {
                Some(to) => per_key(from, to, |from, to| Self::from_context(from, Some(to), context)),
                None => target,
            };
        }

        match pick_duration(
            current.level(),
            target.level(),
            context.fade_up(),
            context.fade_down(),
            context.fade(),
        ) {
            Some(duration) if duration > 0.0 => Value::Fade(Self::new(current.clone(), target, duration)),
            _ => target,
        }
    }

    pub(crate) fn sample(&self, elapsed: f64, bounds: Option<Bounds>) -> Sample {
        let local = elapsed + self.run_from.unwrap_or(0.0);
        if local <= 0.0 {
            return self.start.sample(local, bounds);
        }

        let finish = self.finish.sample(local, bounds);
        if local >= self.duration {
            return finish;
        }

        let start = self.start.sample(local, bounds);
        Sample::blend(&start, &finish, local / self.duration).unwrap_or(finish)
    }

    pub(crate) fn finished_at(&self, elapsed: f64) -> bool {
        elapsed + self.run_from.unwrap_or(0.0) >= self.duration
    }

    pub(crate) fn offset_by(&mut self, offset: f64) {
        self.run_from = Some(self.run_from.unwrap_or(0.0) + offset);
    }

    /// The finish branch, re-anchored so it keeps sampling the same instant.
    pub(crate) fn into_terminal(self) -> Value {
        let anchor = self.run_from.unwrap_or(0.0);
        let mut finish = *self.finish;
        finish.offset_by(anchor);
        finish
    }

    pub(crate) fn into_finish(self) -> Value {
        *self.finish
    }
}

impl fmt::Display for Fade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}s -> {}", self.start, self.duration, self.finish)
    }
}

/// Holds `start` for `duration` seconds, then switches to `finish` with the
/// finish branch's clock starting at zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Delay {
    start: Box<Value>,
    finish: Box<Value>,
    duration: f64,
    run_from: Option<f64>,
}

impl Delay {
    pub fn new(start: Value, finish: Value, duration: f64) -> Self {
        Self {
            start: Box::new(start),
            finish: Box::new(finish),
            duration,
            run_from: None,
        }
    }

    pub fn start(&self) -> &Value {
        &self.start
    }

    pub fn finish(&self) -> &Value {
        &self.finish
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Wraps `target` in a delay from `current` when the context asks for
    /// one. Same direction and tuple rules as [`Fade::from_context`].
    pub fn from_context(current: &Value, target: Option<Value>, context: &TimeContext) -> Value {
        let Some(target) = target else {
            return current.clone();
        };
        if !context.any_delay() {
            return target;
        }

        if let (Value::Tuple(from), Value::Tuple(to)) = (current, &target) {
            return match to.clone().name_as(from) {
                Some(to) => per_key(from, to, |from, to| Self::from_context(from, Some(to), context)),
                None => target,
            };
        }

        match pick_duration(
            current.level(),
            target.level(),
            context.delay_up(),
            context.delay_down(),
            context.delay(),
        ) {
            Some(duration) if duration > 0.0 => {
                Value::Delay(Self::new(current.clone(), target, duration))
            }
            _ => target,
        }
    }

    pub(crate) fn sample(&self, elapsed: f64, bounds: Option<Bounds>) -> Sample {
        let local = elapsed + self.run_from.unwrap_or(0.0);
        if local < self.duration {
            return self.start.sample(local, bounds);
        }
        self.finish.sample(local - self.duration, bounds)
    }

    pub(crate) fn finished_at(&self, elapsed: f64) -> bool {
        elapsed + self.run_from.unwrap_or(0.0) >= self.duration
    }

    pub(crate) fn offset_by(&mut self, offset: f64) {
        self.run_from = Some(self.run_from.unwrap_or(0.0) + offset);
    }

    pub(crate) fn into_terminal(self) -> Value {
        let anchor = self.run_from.unwrap_or(0.0) - self.duration;
        let mut finish = *self.finish;
        finish.offset_by(anchor);
        finish
    }

    pub(crate) fn into_finish(self) -> Value {
        *self.finish
    }
}

impl fmt::Display for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @{}s {}", self.start, self.duration, self.finish)
    }
}

/// Chooses the duration for a change from `current` to `target`: the "up"
/// duration when increasing, "down" when decreasing, otherwise symmetric.
/// Equal levels produce no transition.
fn pick_duration(
    current: Option<f64>,
    target: Option<f64>,
    up: Option<f64>,
    down: Option<f64>,
    symmetric: Option<f64>,
) -> Option<f64> {
    match (current, target) {
        (Some(current), Some(target)) if current == target => None,
        (Some(current), Some(target)) if target > current => up.or(symmetric),
        (Some(_), Some(_)) => down.or(symmetric),
        _ => symmetric.or(up),
    }
}

fn per_key(from: &Tuple, to: Tuple, wrap: impl Fn(&Value, Value) -> Value) -> Value {
    let entries = to
        .into_entries()
        .into_iter()
        .map(|(key, target)| {
            let value = match from.get(&key) {
                Some(current) => wrap(current, target),
                None => target,
            };
            (key, value)
        })
        .collect();
    Value::Tuple(Tuple { entries })
}
