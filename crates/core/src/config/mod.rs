use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::color::ColorSpace;
use crate::fixture::{ChannelSpec, FixtureDescriptor, GroupSpec, ParameterSpec};
use crate::world::World;
use crate::{LuxError, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub render: RenderConfig,
    /// Root holding one subdirectory per cue list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cues_dir: Option<PathBuf>,
    #[serde(default)]
    pub profiles: Vec<FixtureDescriptor>,
    #[serde(default)]
    pub patch: Vec<PatchEntry>,
}

/// Settings for the DMX render loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_rate")]
    pub rate_hz: f64,
    /// Universes emitted even when no fixture is patched into them.
    #[serde(default)]
    pub universes: Vec<u16>,
}

fn default_rate() -> f64 {
    20.0
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            rate_hz: default_rate(),
            universes: vec![1],
        }
    }
}

/// Places one fixture of a named profile at a universe address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchEntry {
    pub id: u32,
    pub profile: String,
    #[serde(default = "default_universe")]
    pub universe: u16,
    pub address: u16,
}

fn default_universe() -> u16 {
    1
}

impl Default for AppConfig {
    /// Demo rig: dimmers 1-18 at channels 1-18 and RGB moving lights
    /// 101-106 from channel 101.
    fn default() -> Self {
        let dimmer = FixtureDescriptor {
            name: "Dimmer".to_string(),
            color_space: None,
            parameters: vec![ParameterSpec::Single(ChannelSpec::new("intensity"))],
        };
        let mover = FixtureDescriptor {
            name: "Moving Light".to_string(),
            color_space: Some(ColorSpace::Rgb),
            parameters: vec![
                ParameterSpec::Single(ChannelSpec::new("intensity")),
                ParameterSpec::Group(GroupSpec {
                    id: "position".to_string(),
                    offset: None,
                    children: vec![
                        ChannelSpec::new("pan").fine(0.0, 540.0),
                        ChannelSpec::new("tilt").fine(0.0, 270.0),
                    ],
                }),
            ],
        };

        let mut patch: Vec<PatchEntry> = (1..=18)
            .map(|id| PatchEntry {
                id,
                profile: dimmer.name.clone(),
                universe: 1,
                address: id as u16,
            })
            .collect();
        patch.extend((0..6).map(|n| PatchEntry {
            id: 101 + n,
            profile: mover.name.clone(),
            universe: 1,
            address: 101 + 8 * n as u16,
        }));

        Self {
            render: RenderConfig::default(),
            cues_dir: None,
            profiles: vec![dimmer, mover],
            patch,
        }
    }
}

impl AppConfig {
    /// Reads a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&source)?)
    }

    pub fn profile(&self, name: &str) -> Option<&FixtureDescriptor> {
        self.profiles.iter().find(|profile| profile.name == name)
    }

    /// Instantiates every patch entry. Any bad entry is fatal.
    pub fn build_world(&self) -> Result<World> {
        let fixtures = self
            .patch
            .iter()
            .map(|entry| {
                let profile = self.profile(&entry.profile).ok_or_else(|| {
                    LuxError::invalid_fixture(format!(
                        "fixture {} uses unknown profile `{}`",
                        entry.id, entry.profile
                    ))
                })?;
                profile.instantiate(entry.id, entry.universe, entry.address)
            })
            .collect::<Result<Vec<_>>>()?;
        World::new(fixtures)
    }

    /// Configured universes plus every universe the patch uses.
    pub fn universes(&self) -> Vec<u16> {
        let mut universes = self.render.universes.clone();
        universes.extend(self.patch.iter().map(|entry| entry.universe));
        universes.sort_unstable();
        universes.dedup();
        universes
    }
}
