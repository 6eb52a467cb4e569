use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::{Tuple, TupleKey, Value};
use crate::{LuxError, Result};

/// Channel layouts a color group can be declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    Rgb,
    Cmy,
}

impl ColorSpace {
    pub fn channels(&self) -> [&'static str; 3] {
        match self {
            Self::Rgb => ["red", "green", "blue"],
            Self::Cmy => ["cyan", "magenta", "yellow"],
        }
    }

    /// Finds the space whose channel set matches `keys` exactly, in any order.
    pub fn detect<'a>(keys: impl IntoIterator<Item = &'a TupleKey>) -> Option<Self> {
        let mut names: Vec<&str> = keys.into_iter().filter_map(TupleKey::name).collect();
        names.sort_unstable();
        [Self::Rgb, Self::Cmy].into_iter().find(|space| {
            let mut channels = space.channels();
            channels.sort_unstable();
            names == channels
        })
    }

    /// Converts a named tuple between spaces. RGB and CMY are complements,
    /// so each channel maps to `100 - x`.
    pub fn convert(tuple: Tuple, from: ColorSpace, to: ColorSpace) -> Result<Tuple> {
        if from == to {
            return Ok(tuple);
        }

        let unsupported = || LuxError::UnsupportedColorConversion {
            from: from.to_string(),
            to: to.to_string(),
        };
        let source = from.channels();
        let target = to.channels();

        let mut entries = Vec::with_capacity(target.len());
        for (key, value) in tuple.into_entries() {
            let index = key
                .name()
                .and_then(|name| source.iter().position(|channel| *channel == name))
                .ok_or_else(unsupported)?;
            let inverted = match value {
                Value::Static(x) => Value::Static(100.0 - x),
                Value::Percent(x) => Value::Percent(100.0 - x),
                _ => return Err(unsupported()),
            };
            entries.push((TupleKey::named(target[index]), inverted));
        }
        Tuple::new(entries)
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rgb => f.write_str("rgb"),
            Self::Cmy => f.write_str("cmy"),
        }
    }
}
