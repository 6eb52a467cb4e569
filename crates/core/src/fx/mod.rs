//! Procedural generators backing [`Value::Dynamic`].

use std::f64::consts::PI;
use std::fmt;

use crate::value::{Bounds, Sample, Value};

/// Inputs every generator receives besides its own arguments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FxContext {
    pub time: f64,
    pub fixture_count: usize,
}

/// Named wave/step functions callable from scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generator {
    Sin,
    Cos,
    Square,
    Pulse,
    Cycle,
    Chase,
}

impl Generator {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sin" => Some(Self::Sin),
            "cos" => Some(Self::Cos),
            "square" => Some(Self::Square),
            "pulse" => Some(Self::Pulse),
            "cycle" => Some(Self::Cycle),
            "chase" => Some(Self::Chase),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Square => "square",
            Self::Pulse => "pulse",
            Self::Cycle => "cycle",
            Self::Chase => "chase",
        }
    }

    /// Evaluates the generator. Missing or non-scalar arguments fall back to
    /// their defaults.
    pub fn call(&self, context: &FxContext, args: &[Option<Sample>]) -> Sample {
        let time = context.time;
        match self {
            Self::Sin | Self::Cos => {
                let (min, max) = (number(args, 0, 0.0), number(args, 1, 100.0));
                let (period, phase) = (number(args, 2, 1.0), number(args, 3, 0.0));
                if period <= 0.0 {
                    return Sample::Scalar(min);
                }

                let angle = time * (2.0 * PI / period) - phase * PI;
                let wave = if *self == Self::Sin { angle.sin() } else { angle.cos() };
                let factor = (wave + 1.0) / 2.0;
                Sample::Scalar(min + (max - min) * factor)
            }
            Self::Square => {
                let (min, max) = (number(args, 0, 0.0), number(args, 1, 100.0));
                let (period, phase) = (number(args, 2, 1.0), number(args, 3, 0.0));
                if period <= 0.0 {
                    return Sample::Scalar(min);
                }

                let wave = (time * (2.0 * PI / period) - phase * PI).sin();
                Sample::Scalar(if wave >= 0.0 { max } else { min })
            }
            Self::Pulse => {
                let (min, max) = (number(args, 0, 0.0), number(args, 1, 100.0));
                let on = number(args, 2, 1.0);
                let total = number(args, 3, 5.0);
                let phase = number(args, 4, 0.0);
                if total <= 0.0 {
                    return Sample::Scalar(min);
                }

                let local = (time - phase).rem_euclid(total);
                Sample::Scalar(if local <= on { max } else { min })
            }
            Self::Cycle => {
                let period = number(args, 0, 1.0);
                let values: Vec<&Sample> = args.iter().skip(1).flatten().collect();
                if values.is_empty() {
                    return Sample::Scalar(0.0);
                }
                if period <= 0.0 {
                    return values[0].clone();
                }

                let index = ((time / period).rem_euclid(values.len() as f64)).floor() as usize;
                values[index.min(values.len() - 1)].clone()
            }
            Self::Chase => {
                let (min, max) = (number(args, 0, 0.0), number(args, 1, 100.0));
                let period = number(args, 2, 1.0);
                let position = number(args, 3, 0.0).round();
                if period <= 0.0 || context.fixture_count == 0 {
                    return Sample::Scalar(min);
                }

                let step = (time / period).floor().rem_euclid(context.fixture_count as f64);
                Sample::Scalar(if step == position { max } else { min })
            }
        }
    }
}

fn number(args: &[Option<Sample>], index: usize, default: f64) -> f64 {
    args.get(index)
        .and_then(Option::as_ref)
        .and_then(Sample::scalar)
        .unwrap_or(default)
}

/// A generator bound to its arguments. `None` arguments are placeholders
/// filled with the parameter's current value at apply time.
#[derive(Debug, Clone, PartialEq)]
pub struct Dynamic {
    generator: Generator,
    fixture_count: usize,
    args: Vec<Option<Value>>,
    run_from: Option<f64>,
}

impl Dynamic {
    pub fn new(generator: Generator, fixture_count: usize, args: Vec<Option<Value>>) -> Self {
        Self {
            generator,
            fixture_count,
            args,
            run_from: None,
        }
    }

    pub fn generator(&self) -> Generator {
        self.generator
    }

    pub fn args(&self) -> &[Option<Value>] {
        &self.args
    }

    /// Pulls every argument once, so range arguments spread across fixtures.
    pub fn generate(&mut self) -> Dynamic {
        Dynamic {
            generator: self.generator,
            fixture_count: self.fixture_count,
            args: self
                .args
                .iter_mut()
                .map(|arg| arg.as_mut().map(Value::get))
                .collect(),
            run_from: self.run_from,
        }
    }

    pub fn sample(&self, elapsed: f64, bounds: Option<Bounds>) -> Sample {
        let time = elapsed + self.run_from.unwrap_or(0.0);
        let args: Vec<Option<Sample>> = self
            .args
            .iter()
            .map(|arg| arg.as_ref().map(|value| value.sample(time, bounds)))
            .collect();
        let context = FxContext {
            time,
            fixture_count: self.fixture_count,
        };
        self.generator.call(&context, &args)
    }

    /// Arguments are sampled at the generator's own local time, so only
    /// the generator itself is re-anchored.
    pub(crate) fn offset_by(&mut self, offset: f64) {
        self.run_from = Some(self.run_from.unwrap_or(0.0) + offset);
    }

    pub fn resolve_nil_values(&mut self, current: &Value) {
        for arg in &mut self.args {
            if arg.is_none() {
                *arg = Some(current.clone());
            }
        }
    }

    pub fn has_nil_values(&self) -> bool {
        self.args.iter().any(Option::is_none)
    }
}

impl fmt::Display for Dynamic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "< {}(", self.generator.name())?;
        for (index, arg) in self.args.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            match arg {
                Some(value) => write!(f, "{value}")?,
                None => f.write_str("_")?,
            }
        }
        f.write_str(") >")
    }
}
