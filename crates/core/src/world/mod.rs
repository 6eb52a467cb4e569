//! The addressable fixture collection, selection scoping and the timing
//! stack.

use std::collections::HashSet;

use crate::fixture::Fixture;
use crate::timing::TimeContext;
use crate::{LuxError, Result};

/// One term of a selection query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    Single(u32),
    /// Inclusive. A descending range selects in descending id order.
    Range { start: u32, end: u32 },
}

impl Predicate {
    fn matches(&self, id: u32) -> bool {
        match *self {
            Self::Single(single) => id == single,
            Self::Range { start, end } => id >= start.min(end) && id <= start.max(end),
        }
    }

    fn descending(&self) -> bool {
        matches!(*self, Self::Range { start, end } if start > end)
    }
}

/// Every patched fixture plus the stack of active selections.
///
/// Selections are stored as index lists into the fixture list, so a nested
/// selection narrows its parent's view while mutations still land on the
/// one shared fixture.
#[derive(Debug, Clone)]
pub struct World {
    fixtures: Vec<Fixture>,
    selections: Vec<Vec<usize>>,
    time: TimeContext,
}

impl World {
    pub fn new(fixtures: Vec<Fixture>) -> Result<Self> {
        let mut seen = HashSet::new();
        for fixture in &fixtures {
            if !seen.insert(fixture.id()) {
                return Err(LuxError::invalid_fixture(format!(
                    "duplicate fixture id {}",
                    fixture.id()
                )));
            }
        }

        Ok(Self {
            fixtures,
            selections: Vec::new(),
            time: TimeContext::new(),
        })
    }

    fn current(&self) -> Vec<usize> {
        match self.selections.last() {
            Some(selection) => selection.clone(),
            None => (0..self.fixtures.len()).collect(),
        }
    }

    /// Narrows the current view. Matches are gathered predicate by predicate
    /// in the parent's order; a fixture matched twice is kept once. Zero
    /// matches yield an empty selection.
    fn select(&mut self, query: &[Predicate]) {
        let parent = self.current();
        let mut seen = HashSet::new();
        let mut selection = Vec::new();

        for predicate in query {
            let mut matched: Vec<usize> = parent
                .iter()
                .copied()
                .filter(|&index| predicate.matches(self.fixtures[index].id()))
                .collect();
            if predicate.descending() {
                matched.reverse();
            }
            selection.extend(matched.into_iter().filter(|index| seen.insert(*index)));
        }
        self.selections.push(selection);
    }

    fn deselect(&mut self) {
        debug_assert!(!self.selections.is_empty(), "deselect without select");
        self.selections.pop();
    }

    /// Runs `body` against the narrowed view and always restores the parent
    /// view afterwards.
    pub fn with_selection<R>(&mut self, query: &[Predicate], body: impl FnOnce(&mut World) -> R) -> R {
        self.select(query);
        let result = body(self);
        self.deselect();
        result
    }

    /// Runs `body` inside a fresh timing scope.
    pub fn with_time_scope<R>(&mut self, body: impl FnOnce(&mut World) -> R) -> R {
        self.time.push();
        let result = body(self);
        self.time.pop();
        result
    }

    pub fn selection_depth(&self) -> usize {
        self.selections.len()
    }

    pub fn selection_len(&self) -> usize {
        self.selections
            .last()
            .map_or(self.fixtures.len(), Vec::len)
    }

    pub fn selected_ids(&self) -> Vec<u32> {
        self.current()
            .into_iter()
            .map(|index| self.fixtures[index].id())
            .collect()
    }

    /// Calls `apply` on each selected fixture in selection order, stopping at
    /// the first error.
    pub fn for_each_selected(
        &mut self,
        mut apply: impl FnMut(&mut Fixture, &TimeContext) -> Result<()>,
    ) -> Result<()> {
        let selection = self.current();
        for index in selection {
            apply(&mut self.fixtures[index], &self.time)?;
        }
        Ok(())
    }

    pub fn time(&self) -> &TimeContext {
        &self.time
    }

    pub fn time_mut(&mut self) -> &mut TimeContext {
        &mut self.time
    }

    pub fn fixtures(&self) -> &[Fixture] {
        &self.fixtures
    }

    pub fn fixture_count(&self) -> usize {
        self.fixtures.len()
    }

    pub fn fixture(&self, id: u32) -> Option<&Fixture> {
        self.fixtures.iter().find(|fixture| fixture.id() == id)
    }

    /// Restores every fixture to its defaults.
    pub fn reset(&mut self) {
        self.fixtures.iter_mut().for_each(Fixture::reset);
    }

    pub fn resolve(&mut self, elapsed: f64) {
        self.fixtures
            .iter_mut()
            .for_each(|fixture| fixture.resolve(elapsed));
    }

    pub fn fast_forward(&mut self) {
        self.fixtures.iter_mut().for_each(Fixture::fast_forward);
    }

    pub fn restart_from(&mut self, elapsed: f64) {
        self.fixtures
            .iter_mut()
            .for_each(|fixture| fixture.restart_from(elapsed));
    }

    pub fn dump_state(&self) -> String {
        self.fixtures.iter().map(Fixture::describe).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{ChannelSpec, FixtureDescriptor, ParameterSpec};
    use crate::timing::TimeKeyword;
    use crate::value::Value;

    fn world(count: u32) -> World {
        let dimmer = FixtureDescriptor {
            name: "Dimmer".to_string(),
            color_space: None,
            parameters: vec![ParameterSpec::Single(ChannelSpec::new("intensity"))],
        };
        let fixtures = (1..=count)
            .map(|id| dimmer.instantiate(id, 1, id as u16).unwrap())
            .collect();
        World::new(fixtures).unwrap()
    }

    fn apply_all(world: &mut World, level: f64) -> Result<()> {
        world.for_each_selected(|fixture, time| {
            fixture.apply("intensity", Some(Value::Static(level)), time)
        })
    }

    #[test]
    fn selection_round_trip_restores_view_and_timing() {
        let mut world = world(6);
        let time_before = world.time().clone();

        world
            .with_selection(&[Predicate::Range { start: 2, end: 4 }], |world| {
                assert_eq!(world.selected_ids(), vec![2, 3, 4]);
                world.with_time_scope(|world| {
                    world.time_mut().set(TimeKeyword::Fade, 1.0);
                    apply_all(world, 100.0)
                })
            })
            .unwrap();

        assert_eq!(world.selected_ids(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(world.time(), &time_before);
        assert_eq!(world.selection_depth(), 0);

        let levels: Vec<u8> = world.fixtures().iter().map(|f| f.run(1.0)[0]).collect();
        assert_eq!(levels, vec![0, 255, 255, 255, 0, 0]);
    }

    #[test]
    fn nested_selections_narrow_the_parent() {
        let mut world = world(6);
        world.with_selection(&[Predicate::Range { start: 2, end: 5 }], |world| {
            world.with_selection(&[Predicate::Single(1), Predicate::Single(3)], |world| {
                assert_eq!(world.selected_ids(), vec![3]);
            });
            assert_eq!(world.selection_len(), 4);
        });
    }

    #[test]
    fn query_order_and_dedupe() {
        let mut world = world(6);
        let query = [
            Predicate::Single(5),
            Predicate::Range { start: 3, end: 1 },
            Predicate::Single(3),
        ];
        world.with_selection(&query, |world| {
            assert_eq!(world.selected_ids(), vec![5, 3, 2, 1]);
        });
    }

    #[test]
    fn empty_selection_applies_nothing() {
        let mut world = world(3);
        world
            .with_selection(&[Predicate::Single(42)], |world| {
                assert_eq!(world.selection_len(), 0);
                apply_all(world, 100.0)
            })
            .unwrap();
        assert!(world.fixtures().iter().all(|f| f.run(0.0) == vec![0]));
    }

    #[test]
    fn duplicate_ids_are_fatal() {
        let world = world(2);
        let mut fixtures = world.fixtures().to_vec();
        fixtures.push(fixtures[0].clone());
        let err = World::new(fixtures).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn reset_restores_defaults() {
        let mut world = world(2);
        apply_all(&mut world, 50.0).unwrap();
        assert!(world.dump_state().contains("intensity: Static(50)"));
        world.reset();
        assert!(world.fixtures().iter().all(|f| f.run(0.0) == vec![0]));
    }
}
