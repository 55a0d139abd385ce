//! Per-tick execution context and the durable per-group state it owns.
//!
//! Output buffers are rebuilt every tick. Group state (flags, numbers,
//! timers, last activations) lives until the group is reset or forgotten.

use std::collections::HashMap;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::effects::{BridgeCall, GraphicRequest, ProgressBarRequest, TextRequest};
use crate::group::GroupId;
use crate::key::Key;
use crate::rule::RuleId;

/// Monster query radius used until the agent configures one.
pub const DEFAULT_MONSTER_RANGE: f32 = 200.0;

/// Visibility of UI panels reported by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelVisibility {
    pub chat: bool,
    pub left: bool,
    pub right: bool,
    pub fullscreen: bool,
    pub large: bool,
}

/// Output accumulated by side effects during one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutputBuffers {
    pub key_to_press: Option<Key>,
    pub keys_to_hold: Vec<Key>,
    pub keys_to_release: Vec<Key>,
    pub texts: Vec<TextRequest>,
    pub graphics: Vec<GraphicRequest>,
    pub progress_bars: Vec<ProgressBarRequest>,
    pub bridge_calls: Vec<BridgeCall>,
}

/// Stopwatch driven by caller-supplied instants so ticks stay deterministic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stopwatch {
    accumulated: Duration,
    started_at: Option<Instant>,
}

impl Stopwatch {
    /// A zeroed stopwatch running since `now`.
    pub fn started(now: Instant) -> Self {
        Self {
            accumulated: Duration::ZERO,
            started_at: Some(now),
        }
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        let running = self
            .started_at
            .map_or(Duration::ZERO, |started| now.saturating_duration_since(started));
        self.accumulated + running
    }

    /// Start counting. Returns `false` when already running.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.started_at.is_some() {
            return false;
        }
        self.started_at = Some(now);
        true
    }

    /// Stop counting, keeping the elapsed time. Returns `false` when already stopped.
    pub fn stop(&mut self, now: Instant) -> bool {
        match self.started_at.take() {
            Some(started) => {
                self.accumulated += now.saturating_duration_since(started);
                true
            }
            None => false,
        }
    }

    /// Zero and start. Returns `false` when it was already restarted at `now`.
    pub fn restart(&mut self, now: Instant) -> bool {
        let fresh = Self::started(now);
        if *self == fresh {
            return false;
        }
        *self = fresh;
        true
    }
}

/// Durable state of one rule group.
///
/// Mutating methods return `true` when they changed something, which side
/// effects translate into unique versus duplicate application.
#[derive(Debug, Clone, Default)]
pub struct PerGroupState {
    current_rule: Option<RuleId>,
    timers: HashMap<String, Stopwatch>,
    flags: HashMap<String, bool>,
    numbers: HashMap<String, f32>,
    last_activation: HashMap<RuleId, Instant>,
}

impl PerGroupState {
    /// Rule currently being evaluated inside this group, if any.
    pub fn current_rule(&self) -> Option<RuleId> {
        self.current_rule
    }

    pub fn is_flag_set(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    pub fn flags(&self) -> impl Iterator<Item = (&str, bool)> {
        self.flags.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn set_flag(&mut self, name: &str) -> bool {
        self.flags.insert(name.to_string(), true) != Some(true)
    }

    pub fn reset_flag(&mut self, name: &str) -> bool {
        self.flags.remove(name).is_some()
    }

    pub fn number(&self, name: &str) -> Option<f32> {
        self.numbers.get(name).copied()
    }

    pub fn numbers(&self) -> impl Iterator<Item = (&str, f32)> {
        self.numbers.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// NaN counts as equal to NaN here, so storing it twice is not a change.
    pub fn set_number(&mut self, name: &str, value: f32) -> bool {
        match self.numbers.insert(name.to_string(), value) {
            Some(previous) => previous != value && !(previous.is_nan() && value.is_nan()),
            None => true,
        }
    }

    pub fn reset_number(&mut self, name: &str) -> bool {
        self.numbers.remove(name).is_some()
    }

    pub fn timer(&self, name: &str) -> Option<&Stopwatch> {
        self.timers.get(name)
    }

    pub fn timers(&self) -> impl Iterator<Item = (&str, &Stopwatch)> {
        self.timers.iter().map(|(name, timer)| (name.as_str(), timer))
    }

    pub fn start_timer(&mut self, name: &str, now: Instant) -> bool {
        self.timers.entry(name.to_string()).or_default().start(now)
    }

    pub fn stop_timer(&mut self, name: &str, now: Instant) -> bool {
        self.timers
            .get_mut(name)
            .map_or(false, |timer| timer.stop(now))
    }

    pub fn restart_timer(&mut self, name: &str, now: Instant) -> bool {
        self.timers.entry(name.to_string()).or_default().restart(now)
    }

    pub fn reset_timer(&mut self, name: &str) -> bool {
        self.timers.remove(name).is_some()
    }

    pub fn last_activation(&self, rule: RuleId) -> Option<Instant> {
        self.last_activation.get(&rule).copied()
    }

    pub(crate) fn record_activation(&mut self, rule: RuleId, now: Instant) {
        self.last_activation.insert(rule, now);
    }

    /// Drop all flags, numbers and timers. Activation history is kept.
    pub fn clear(&mut self) {
        self.flags.clear();
        self.numbers.clear();
        self.timers.clear();
    }
}

/// Shared "a rule function is running" marker.
///
/// Cloned into script hosts so accessors created for a call can observe
/// the guard without borrowing the context.
#[derive(Debug, Clone, Default)]
pub struct AccessFlag(Arc<AtomicBool>);

impl AccessFlag {
    pub fn is_forbidden(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Forbid access until the returned scope is dropped.
    pub fn forbid(&self) -> ForbiddenScope {
        let previous = self.0.swap(true, Ordering::SeqCst);
        ForbiddenScope {
            flag: Arc::clone(&self.0),
            previous,
        }
    }
}

/// Restores the previous access state when dropped, including on unwind.
#[must_use = "access is restored as soon as the scope is dropped"]
#[derive(Debug)]
pub struct ForbiddenScope {
    flag: Arc<AtomicBool>,
    previous: bool,
}

impl Drop for ForbiddenScope {
    fn drop(&mut self) {
        self.flag.store(self.previous, Ordering::SeqCst);
    }
}

/// Mutable state shared by every rule and side effect during a tick.
#[derive(Debug)]
pub struct ExecutionContext {
    now: Instant,
    can_press_key: bool,
    panels: PanelVisibility,
    max_monster_range: f32,
    output: OutputBuffers,
    current_group: Option<GroupId>,
    access: AccessFlag,
    group_states: HashMap<GroupId, PerGroupState>,
}

impl ExecutionContext {
    pub fn new(now: Instant) -> Self {
        Self {
            now,
            can_press_key: true,
            panels: PanelVisibility::default(),
            max_monster_range: DEFAULT_MONSTER_RANGE,
            output: OutputBuffers::default(),
            current_group: None,
            access: AccessFlag::default(),
            group_states: HashMap::new(),
        }
    }

    /// Reset the transient buffers for a new tick. Group state is untouched.
    pub fn begin_tick(&mut self, now: Instant, panels: PanelVisibility, can_press_key: bool) {
        self.now = now;
        self.panels = panels;
        self.can_press_key = can_press_key;
        self.output = OutputBuffers::default();
    }

    /// Instant of the current tick.
    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn can_press_key(&self) -> bool {
        self.can_press_key
    }

    pub fn panels(&self) -> PanelVisibility {
        self.panels
    }

    pub fn is_chat_open(&self) -> bool {
        self.panels.chat
    }

    pub fn max_monster_range(&self) -> f32 {
        self.max_monster_range
    }

    pub fn set_max_monster_range(&mut self, range: f32) {
        self.max_monster_range = range;
    }

    pub fn output(&self) -> &OutputBuffers {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut OutputBuffers {
        &mut self.output
    }

    pub fn take_output(&mut self) -> OutputBuffers {
        mem::take(&mut self.output)
    }

    pub fn access(&self) -> &AccessFlag {
        &self.access
    }

    pub fn current_group(&self) -> Option<GroupId> {
        self.current_group
    }

    pub(crate) fn replace_current_group(&mut self, group: Option<GroupId>) -> Option<GroupId> {
        mem::replace(&mut self.current_group, group)
    }

    /// Set the current rule of the current group. No-op without a group.
    pub(crate) fn replace_current_rule(&mut self, rule: Option<RuleId>) -> Option<RuleId> {
        match self.current_group_state_mut() {
            Some(state) => mem::replace(&mut state.current_rule, rule),
            None => None,
        }
    }

    /// Run `f` with `group` as the current group, restoring the previous one after.
    pub fn with_current_group<R>(&mut self, group: GroupId, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = self.replace_current_group(Some(group));
        let result = f(self);
        self.replace_current_group(previous);
        result
    }

    /// Run `f` with `rule` as the current group's rule, restoring the previous one after.
    pub fn with_current_rule<R>(&mut self, rule: RuleId, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = self.replace_current_rule(Some(rule));
        let result = f(self);
        self.replace_current_rule(previous);
        result
    }

    pub fn current_group_state(&self) -> Option<&PerGroupState> {
        self.current_group
            .and_then(|group| self.group_states.get(&group))
    }

    /// State of the current group, created on first access.
    pub fn current_group_state_mut(&mut self) -> Option<&mut PerGroupState> {
        let group = self.current_group?;
        Some(self.group_states.entry(group).or_default())
    }

    pub fn group_state(&self, group: GroupId) -> Option<&PerGroupState> {
        self.group_states.get(&group)
    }

    /// Clear flags, numbers and timers of one group.
    pub fn reset_group_state(&mut self, group: GroupId) {
        if let Some(state) = self.group_states.get_mut(&group) {
            state.clear();
        }
    }

    /// Drop everything known about a deleted group.
    pub fn forget_group(&mut self, group: GroupId) {
        self.group_states.remove(&group);
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopwatch_accumulates_between_runs() {
        let t0 = Instant::now();
        let mut watch = Stopwatch::default();
        assert!(watch.start(t0));
        assert!(!watch.start(t0 + Duration::from_secs(1)));
        assert!(watch.stop(t0 + Duration::from_secs(2)));
        assert!(!watch.stop(t0 + Duration::from_secs(3)));
        assert_eq!(watch.elapsed(t0 + Duration::from_secs(10)), Duration::from_secs(2));

        assert!(watch.start(t0 + Duration::from_secs(10)));
        assert_eq!(watch.elapsed(t0 + Duration::from_secs(11)), Duration::from_secs(3));
    }

    #[test]
    fn test_stopwatch_restart_is_idempotent_within_an_instant() {
        let t0 = Instant::now();
        let mut watch = Stopwatch::started(t0);
        assert!(!watch.restart(t0));
        assert!(watch.restart(t0 + Duration::from_millis(5)));
        assert_eq!(watch.elapsed(t0 + Duration::from_millis(5)), Duration::ZERO);
    }

    #[test]
    fn test_group_state_reports_changes() {
        let mut state = PerGroupState::default();
        assert!(state.set_flag("ready"));
        assert!(!state.set_flag("ready"));
        assert!(state.is_flag_set("ready"));
        assert!(state.reset_flag("ready"));
        assert!(!state.reset_flag("ready"));

        assert!(state.set_number("stacks", 3.0));
        assert!(!state.set_number("stacks", 3.0));
        assert_eq!(state.number("stacks"), Some(3.0));
        assert!(state.reset_number("stacks"));
        assert_eq!(state.number("stacks"), None);
    }

    #[test]
    fn test_nan_number_is_stored_once() {
        let mut state = PerGroupState::default();
        assert!(state.set_number("ratio", f32::NAN));
        assert!(!state.set_number("ratio", f32::NAN));
        assert!(state.number("ratio").is_some_and(f32::is_nan));
        assert!(state.set_number("ratio", 1.0));
    }

    #[test]
    fn test_group_state_is_created_on_first_access() {
        let mut ctx = ExecutionContext::default();
        assert!(ctx.current_group_state_mut().is_none());

        let group = GroupId::new();
        ctx.with_current_group(group, |ctx| {
            ctx.current_group_state_mut().unwrap().set_flag("seen");
        });
        assert!(ctx.group_state(group).unwrap().is_flag_set("seen"));

        ctx.reset_group_state(group);
        assert!(!ctx.group_state(group).unwrap().is_flag_set("seen"));
        ctx.forget_group(group);
        assert!(ctx.group_state(group).is_none());
    }

    #[test]
    fn test_scoped_registration_nests_and_restores() {
        let mut ctx = ExecutionContext::default();
        let outer = GroupId::new();
        let inner = GroupId::new();
        let first = RuleId::new();
        let second = RuleId::new();

        ctx.with_current_group(outer, |ctx| {
            ctx.with_current_rule(first, |ctx| {
                ctx.with_current_group(inner, |ctx| {
                    assert_eq!(ctx.current_group(), Some(inner));
                    assert_eq!(ctx.current_group_state().and_then(|s| s.current_rule()), None);
                    ctx.with_current_rule(second, |ctx| {
                        assert_eq!(ctx.current_group_state().unwrap().current_rule(), Some(second));
                    });
                });
                assert_eq!(ctx.current_group(), Some(outer));
                assert_eq!(ctx.current_group_state().unwrap().current_rule(), Some(first));
            });
            assert_eq!(ctx.current_group_state().unwrap().current_rule(), None);
        });
        assert_eq!(ctx.current_group(), None);
    }

    #[test]
    fn test_forbidden_scope_restores_previous_value() {
        let flag = AccessFlag::default();
        {
            let _outer = flag.forbid();
            {
                let _inner = flag.forbid();
                assert!(flag.is_forbidden());
            }
            assert!(flag.is_forbidden());
        }
        assert!(!flag.is_forbidden());
    }

    #[test]
    fn test_begin_tick_clears_output_only() {
        let t0 = Instant::now();
        let mut ctx = ExecutionContext::new(t0);
        let group = GroupId::new();
        ctx.with_current_group(group, |ctx| {
            ctx.current_group_state_mut().unwrap().set_number("n", 1.0);
        });
        ctx.output_mut().key_to_press = Some(Key::new("Q").unwrap());

        let panels = PanelVisibility {
            chat: true,
            ..PanelVisibility::default()
        };
        ctx.begin_tick(t0 + Duration::from_secs(1), panels, false);

        assert_eq!(ctx.output(), &OutputBuffers::default());
        assert!(ctx.is_chat_open());
        assert!(!ctx.can_press_key());
        assert_eq!(ctx.group_state(group).unwrap().number("n"), Some(1.0));
    }
}
