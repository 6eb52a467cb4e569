use serde::{Deserialize, Serialize};

/// Duration keywords accepted by time directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeKeyword {
    Fade,
    FadeUp,
    FadeDown,
    Delay,
    DelayUp,
    DelayDown,
    /// Zeroes every duration in the current scope.
    Snap,
}

impl TimeKeyword {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fade => "fade",
            Self::FadeUp => "fade_up",
            Self::FadeDown => "fade_down",
            Self::Delay => "delay",
            Self::DelayUp => "delay_up",
            Self::DelayDown => "delay_down",
            Self::Snap => "snap",
        }
    }
}

/// One level of the timing stack. `None` defers to the enclosing scope.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeScope {
    pub fade: Option<f64>,
    pub fade_up: Option<f64>,
    pub fade_down: Option<f64>,
    pub delay: Option<f64>,
    pub delay_up: Option<f64>,
    pub delay_down: Option<f64>,
}

/// Lexically scoped fade/delay durations.
///
/// The root scope is created empty and can never be popped, so a lookup that
/// reaches it without a hit yields `None`: apply instantly.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeContext {
    scopes: Vec<TimeScope>,
}

impl Default for TimeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeContext {
    pub fn new() -> Self {
        Self {
            scopes: vec![TimeScope::default()],
        }
    }

    pub fn push(&mut self) {
        self.scopes.push(TimeScope::default());
    }

    /// Drops the innermost scope; the root scope survives.
    pub fn pop(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    fn top(&mut self) -> &mut TimeScope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    /// Writes one duration into the innermost scope.
    pub fn set(&mut self, keyword: TimeKeyword, seconds: f64) {
        if keyword == TimeKeyword::Snap {
            return self.set_to_snap();
        }

        let scope = self.top();
        match keyword {
            TimeKeyword::Fade => scope.fade = Some(seconds),
            TimeKeyword::FadeUp => scope.fade_up = Some(seconds),
            TimeKeyword::FadeDown => scope.fade_down = Some(seconds),
            TimeKeyword::Delay => scope.delay = Some(seconds),
            TimeKeyword::DelayUp => scope.delay_up = Some(seconds),
            TimeKeyword::DelayDown => scope.delay_down = Some(seconds),
            TimeKeyword::Snap => {}
        }
    }

    pub fn set_to_snap(&mut self) {
        *self.top() = TimeScope {
            fade: Some(0.0),
            fade_up: Some(0.0),
            fade_down: Some(0.0),
            delay: Some(0.0),
            delay_up: Some(0.0),
            delay_down: Some(0.0),
        };
    }

    fn lookup(&self, field: impl Fn(&TimeScope) -> Option<f64>) -> Option<f64> {
        self.scopes.iter().rev().find_map(field)
    }

    pub fn fade(&self) -> Option<f64> {
        self.lookup(|scope| scope.fade)
    }

    pub fn fade_up(&self) -> Option<f64> {
        self.lookup(|scope| scope.fade_up)
    }

    pub fn fade_down(&self) -> Option<f64> {
        self.lookup(|scope| scope.fade_down)
    }

    pub fn delay(&self) -> Option<f64> {
        self.lookup(|scope| scope.delay)
    }

    pub fn delay_up(&self) -> Option<f64> {
        self.lookup(|scope| scope.delay_up)
    }

    pub fn delay_down(&self) -> Option<f64> {
        self.lookup(|scope| scope.delay_down)
    }

    pub fn any_fade(&self) -> bool {
        [self.fade(), self.fade_up(), self.fade_down()]
            .into_iter()
            .flatten()
            .any(|seconds| seconds > 0.0)
    }

    pub fn any_delay(&self) -> bool {
        [self.delay(), self.delay_up(), self.delay_down()]
            .into_iter()
            .flatten()
            .any(|seconds| seconds > 0.0)
    }
}
