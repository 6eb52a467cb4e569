//! DMX frame assembly and the paced render loop.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::fixture::UNIVERSE_SIZE;
use crate::show::{lock_show, SharedShow};
use crate::timeline::TickPacer;
use crate::world::World;
use crate::Result;

/// One 512-channel DMX frame.
#[derive(Clone, PartialEq, Eq)]
pub struct Universe {
    number: u16,
    data: [u8; UNIVERSE_SIZE],
}

impl Universe {
    pub fn new(number: u16) -> Self {
        Self {
            number,
            data: [0; UNIVERSE_SIZE],
        }
    }

    pub fn number(&self) -> u16 {
        self.number
    }

    pub fn data(&self) -> &[u8; UNIVERSE_SIZE] {
        &self.data
    }

    /// Value of a 1-indexed DMX channel.
    pub fn channel(&self, channel: usize) -> Option<u8> {
        channel
            .checked_sub(1)
            .and_then(|index| self.data.get(index))
            .copied()
    }

    /// Copies `bytes` starting at the 1-indexed `address`. Anything past
    /// channel 512 is dropped.
    pub fn apply(&mut self, address: u16, bytes: &[u8]) {
        let Some(start) = (address as usize).checked_sub(1) else {
            return;
        };
        if start >= UNIVERSE_SIZE {
            return;
        }
        let len = bytes.len().min(UNIVERSE_SIZE - start);
        self.data[start..start + len].copy_from_slice(&bytes[..len]);
    }

    pub fn clear(&mut self) {
        self.data = [0; UNIVERSE_SIZE];
    }
}

impl fmt::Debug for Universe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let active = self.data.iter().filter(|value| **value > 0).count();
        f.debug_struct("Universe")
            .field("number", &self.number)
            .field("active_channels", &active)
            .finish()
    }
}

impl fmt::Display for Universe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Universe {}", self.number)?;
        for row in self.data.chunks(32) {
            for value in row {
                write!(f, "{value:03} ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Every universe produced by one render pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    universes: BTreeMap<u16, Universe>,
}

impl Frame {
    pub fn universe(&self, number: u16) -> Option<&Universe> {
        self.universes.get(&number)
    }

    pub fn universe_mut(&mut self, number: u16) -> &mut Universe {
        self.universes
            .entry(number)
            .or_insert_with(|| Universe::new(number))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Universe> {
        self.universes.values()
    }

    pub fn len(&self) -> usize {
        self.universes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.universes.is_empty()
    }

    fn clear(&mut self) {
        self.universes.values_mut().for_each(Universe::clear);
    }
}

/// Turns the World's fixtures into universe data.
#[derive(Debug, Default)]
pub struct LightingEngine {
    frame: Frame,
}

impl LightingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-creates universes so they are emitted even while dark.
    pub fn with_universes(numbers: &[u16]) -> Self {
        let mut engine = Self::new();
        for number in numbers {
            engine.frame.universe_mut(*number);
        }
        engine
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Runs every fixture at `elapsed` and writes its footprint at its
    /// address. Channels outside every footprint stay 0.
    pub fn render(&mut self, world: &World, elapsed: f64) -> &Frame {
        self.frame.clear();
        for fixture in world.fixtures() {
            let data = fixture.run(elapsed);
            self.frame
                .universe_mut(fixture.universe())
                .apply(fixture.address(), &data);
        }
        &self.frame
    }
}

/// Output side of the render loop, e.g. an Art-Net or sACN encoder.
pub trait DmxSink: Send {
    fn send(&mut self, frame: &Frame) -> Result<()>;
}

/// Renders a shared show at a fixed rate until stopped.
#[derive(Debug, Clone)]
pub struct RenderLoop {
    show: SharedShow,
    rate_hz: f64,
    stop: Arc<AtomicBool>,
}

impl RenderLoop {
    pub fn new(show: SharedShow, rate_hz: f64) -> Self {
        Self {
            show,
            rate_hz,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Setting the returned flag ends the loop after the current tick.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Ticks until the stop flag is set. The show lock is held only while
    /// the frame is rendered, never while sending or sleeping. Sink errors
    /// are logged and the loop carries on.
    pub fn run(&self, sink: &mut dyn DmxSink) -> Result<()> {
        let mut pacer = TickPacer::new(self.rate_hz);
        info!(period = ?pacer.period(), "render loop started");

        while !self.stop.load(Ordering::Relaxed) {
            pacer.start_tick();

            let frame = {
                let mut show = lock_show(&self.show)?;
                show.render_frame().clone()
            };

            if let Err(err) = sink.send(&frame) {
                warn!(error = %err, "dmx sink rejected frame");
            }

            match pacer.remaining() {
                Some(left) => thread::sleep(left),
                None => debug!("render tick overran its budget"),
            }
        }

        info!("render loop stopped");
        Ok(())
    }

    /// Runs the loop on its own thread.
    pub fn spawn<S>(self, mut sink: S) -> JoinHandle<Result<()>>
    where
        S: DmxSink + 'static,
    {
        thread::spawn(move || self.run(&mut sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{ChannelSpec, FixtureDescriptor, ParameterSpec};
    use crate::value::Value;

    fn world() -> World {
        let dimmer = FixtureDescriptor {
            name: "Dimmer".to_string(),
            color_space: None,
            parameters: vec![ParameterSpec::Single(ChannelSpec::new("intensity"))],
        };
        let fixtures = vec![
            dimmer.instantiate(1, 1, 1).unwrap(),
            dimmer.instantiate(2, 1, 512).unwrap(),
            dimmer.instantiate(3, 2, 10).unwrap(),
        ];
        World::new(fixtures).unwrap()
    }

    #[test]
    fn universe_channels_are_one_indexed() {
        let mut universe = Universe::new(1);
        universe.apply(1, &[10, 20]);
        assert_eq!(universe.channel(0), None);
        assert_eq!(universe.channel(1), Some(10));
        assert_eq!(universe.channel(2), Some(20));
        assert_eq!(universe.channel(513), None);
    }

    #[test]
    fn writes_past_the_end_are_clipped() {
        let mut universe = Universe::new(1);
        universe.apply(511, &[1, 2, 3, 4]);
        assert_eq!(universe.channel(511), Some(1));
        assert_eq!(universe.channel(512), Some(2));
        universe.apply(0, &[9]);
        universe.apply(600, &[9]);
        assert_eq!(universe.data().iter().filter(|v| **v == 9).count(), 0);
    }

    #[test]
    fn display_prints_rows_of_32() {
        let mut universe = Universe::new(3);
        universe.apply(2, &[7]);
        let text = universe.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Universe 3");
        assert_eq!(lines.len(), 1 + UNIVERSE_SIZE / 32);
        assert!(lines[1].starts_with("000 007 000 "));
    }

    #[test]
    fn engine_writes_each_fixture_at_its_address() {
        let mut world = world();
        world
            .for_each_selected(|fixture, time| {
                fixture.apply("intensity", Some(Value::Static(100.0)), time)
            })
            .unwrap();

        let mut engine = LightingEngine::with_universes(&[1, 4]);
        let frame = engine.render(&world, 0.0);
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.universe(1).unwrap().channel(1), Some(255));
        assert_eq!(frame.universe(1).unwrap().channel(2), Some(0));
        assert_eq!(frame.universe(1).unwrap().channel(512), Some(255));
        assert_eq!(frame.universe(2).unwrap().channel(10), Some(255));
        assert!(frame.universe(4).unwrap().data().iter().all(|v| *v == 0));
    }

    #[test]
    fn reset_fixtures_clear_the_next_frame() {
        let mut world = world();
        world
            .for_each_selected(|fixture, time| {
                fixture.apply("intensity", Some(Value::Static(50.0)), time)
            })
            .unwrap();

        let mut engine = LightingEngine::new();
        assert_eq!(engine.render(&world, 0.0).universe(1).unwrap().channel(1), Some(128));
        world.reset();
        assert_eq!(engine.render(&world, 0.0).universe(1).unwrap().channel(1), Some(0));
    }
}
