use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::color::ColorSpace;
use crate::parameter::{
    GroupParameter, GroupParameterInstance, Parameter, ParameterInstance, ParameterSlot,
};
use crate::timing::TimeContext;
use crate::value::Value;
use crate::{LuxError, Result};

/// Highest DMX channel in a universe.
pub const UNIVERSE_SIZE: usize = 512;

/// Declarative fixture profile as loaded from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_space: Option<ColorSpace>,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterSpec {
    Group(GroupSpec),
    Single(ChannelSpec),
}

/// A group of channels. Child offsets are relative to the group start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    pub children: Vec<ChannelSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub id: String,
    #[serde(default)]
    pub default: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    #[serde(default)]
    pub min: f64,
    #[serde(default = "default_max")]
    pub max: f64,
    #[serde(default)]
    pub fine: bool,
}

fn default_max() -> f64 {
    100.0
}

impl ChannelSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            default: 0.0,
            offset: None,
            min: 0.0,
            max: default_max(),
            fine: false,
        }
    }

    pub fn fine(mut self, min: f64, max: f64) -> Self {
        self.fine = true;
        self.min = min;
        self.max = max;
        self
    }
}

/// Tracks occupied channels while laying out a descriptor. Only
/// auto-placed channels advance the cursor.
#[derive(Default)]
struct Layout {
    cursor: usize,
    occupied: BTreeSet<usize>,
}

impl Layout {
    fn place(&mut self, name: &str, spec: &ChannelSpec, base: usize) -> Result<Parameter> {
        if spec.min >= spec.max {
            return Err(LuxError::invalid_fixture(format!(
                "{name}: parameter `{}` has min {} >= max {}",
                spec.id, spec.min, spec.max
            )));
        }

        let offset = spec.offset.map_or(self.cursor, |offset| base + offset);
        let parameter = Parameter {
            id: spec.id.clone(),
            default: spec.default,
            offset,
            min: spec.min,
            max: spec.max,
            fine: spec.fine,
        };

        for channel in offset..offset + parameter.width() {
            if !self.occupied.insert(channel) {
                return Err(LuxError::invalid_fixture(format!(
                    "{name}: parameter `{}` overlaps channel {}",
                    spec.id,
                    channel + 1
                )));
            }
        }
        if spec.offset.is_none() {
            self.cursor = offset + parameter.width();
        }
        Ok(parameter)
    }

    fn footprint(&self) -> usize {
        self.occupied.last().map_or(0, |last| last + 1)
    }
}

impl FixtureDescriptor {
    /// Specs with the implicit color group appended when the profile
    /// declares a color space without one.
    fn specs(&self) -> Vec<ParameterSpec> {
        let mut specs = self.parameters.clone();
        let has_color = specs.iter().any(|spec| spec.id() == "color");
        if let (Some(space), false) = (self.color_space, has_color) {
            specs.push(ParameterSpec::Group(GroupSpec {
                id: "color".to_string(),
                offset: None,
                children: space.channels().into_iter().map(ChannelSpec::new).collect(),
            }));
        }
        specs
    }

    /// Lays the profile out and patches it at `address` (1-indexed).
    pub fn instantiate(&self, id: u32, universe: u16, address: u16) -> Result<Fixture> {
        let mut layout = Layout::default();
        let mut ids = BTreeSet::new();
        let mut params = Vec::new();

        for spec in self.specs() {
            if !ids.insert(spec.id().to_string()) {
                return Err(LuxError::invalid_fixture(format!(
                    "{}: duplicate parameter `{}`",
                    self.name,
                    spec.id()
                )));
            }

            match spec {
                ParameterSpec::Single(spec) => {
                    let parameter = layout.place(&self.name, &spec, 0)?;
                    params.push(ParameterSlot::Single(ParameterInstance::new(parameter)));
                }
                ParameterSpec::Group(group) => {
                    let saved = layout.cursor;
                    let base = group.offset.unwrap_or(saved);
                    layout.cursor = base;

                    let mut children: Vec<Parameter> = Vec::with_capacity(group.children.len());
                    for child in &group.children {
                        if children.iter().any(|existing| existing.id == child.id) {
                            return Err(LuxError::invalid_fixture(format!(
                                "{}: duplicate child `{}` in group `{}`",
                                self.name, child.id, group.id
                            )));
                        }
                        children.push(layout.place(&self.name, child, base)?);
                    }
                    if group.offset.is_some() {
                        layout.cursor = saved;
                    }

                    let color_space = self.color_space.filter(|_| group.id == "color");
                    let group = GroupParameter {
                        id: group.id,
                        offset: base,
                        children,
                    };
                    params.push(ParameterSlot::Group(GroupParameterInstance::new(
                        group,
                        color_space,
                    )));
                }
            }
        }

        let footprint = layout.footprint();
        let end = usize::from(address) + footprint.saturating_sub(1);
        if address == 0 || end > UNIVERSE_SIZE {
            return Err(LuxError::invalid_fixture(format!(
                "fixture {id} ({}) does not fit at address {address}",
                self.name
            )));
        }

        Ok(Fixture {
            id,
            name: self.name.clone(),
            universe,
            address,
            color_space: self.color_space,
            params,
            footprint,
        })
    }
}

impl ParameterSpec {
    pub fn id(&self) -> &str {
        match self {
            Self::Group(group) => &group.id,
            Self::Single(spec) => &spec.id,
        }
    }
}

/// An addressable device with its live parameter state.
#[derive(Debug, Clone, PartialEq)]
pub struct Fixture {
    id: u32,
    name: String,
    universe: u16,
    address: u16,
    color_space: Option<ColorSpace>,
    params: Vec<ParameterSlot>,
    footprint: usize,
}

impl Fixture {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn universe(&self) -> u16 {
        self.universe
    }

    /// 1-indexed start channel.
    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn footprint(&self) -> usize {
        self.footprint
    }

    pub fn color_space(&self) -> Option<ColorSpace> {
        self.color_space
    }

    pub fn parameters(&self) -> &[ParameterSlot] {
        &self.params
    }

    pub fn parameter(&self, id: &str) -> Option<&ParameterSlot> {
        self.params.iter().find(|slot| slot.id() == id)
    }

    pub fn has_parameter(&self, id: &str) -> bool {
        self.parameter(id).is_some()
    }

    pub fn apply(&mut self, parameter: &str, value: Option<Value>, context: &TimeContext) -> Result<()> {
        let fixture = self.id;
        let slot = self
            .params
            .iter_mut()
            .find(|slot| slot.id() == parameter)
            .ok_or_else(|| LuxError::InvalidParameter {
                fixture,
                parameter: parameter.to_string(),
            })?;
        slot.apply(value, context)
    }

    /// Footprint-sized channel data at `elapsed`; untouched offsets stay 0.
    pub fn run(&self, elapsed: f64) -> Vec<u8> {
        let mut data = vec![0; self.footprint];
        for slot in &self.params {
            slot.write(elapsed, &mut data);
        }
        data
    }

    pub fn reset(&mut self) {
        self.params.iter_mut().for_each(ParameterSlot::reset);
    }

    pub fn resolve(&mut self, elapsed: f64) {
        self.params.iter_mut().for_each(|slot| slot.resolve(elapsed));
    }

    pub fn fast_forward(&mut self) {
        self.params.iter_mut().for_each(ParameterSlot::fast_forward);
    }

    pub fn restart_from(&mut self, elapsed: f64) {
        self.params
            .iter_mut()
            .for_each(|slot| slot.restart_from(elapsed));
    }

    /// Multi-line listing of every parameter's current value tree.
    pub fn describe(&self) -> String {
        let mut out = format!(
            "Fixture {} - {} ({}/{})\n",
            self.id, self.name, self.universe, self.address
        );
        for slot in &self.params {
            let _ = writeln!(out, "  {}: {}", slot.id(), slot.value());
        }
        out
    }
}
