//! The view a rule function gets of the world and the execution context.

use std::time::{Duration, Instant};

use thiserror::Error;

use super::context::{AccessFlag, ExecutionContext, ForbiddenScope, PanelVisibility, PerGroupState};
use super::world::WorldState;
use crate::group::GroupId;
use crate::rule::RuleId;

/// Raised when the execution context is requested while a rule is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Access denied: the internal state cannot be used while a rule is evaluated, return side effects instead")]
pub struct AccessDenied;

/// World snapshot plus the execution context of the current tick.
///
/// Group-scoped readers (`is_flag_set`, `timer_value`, ...) always work.
/// Direct access to the context through [`RuleState::internal_state`] is
/// refused while a rule function runs, so every mutation flows through
/// returned side effects.
pub struct RuleState<'a> {
    world: &'a WorldState,
    context: &'a mut ExecutionContext,
}

impl<'a> RuleState<'a> {
    pub fn new(world: &'a WorldState, context: &'a mut ExecutionContext) -> Self {
        Self { world, context }
    }

    pub fn world(&self) -> &WorldState {
        self.world
    }

    pub fn internal_state(&self) -> Result<&ExecutionContext, AccessDenied> {
        if self.context.access().is_forbidden() {
            return Err(AccessDenied);
        }
        Ok(&*self.context)
    }

    pub fn internal_state_mut(&mut self) -> Result<&mut ExecutionContext, AccessDenied> {
        if self.context.access().is_forbidden() {
            return Err(AccessDenied);
        }
        Ok(&mut *self.context)
    }

    /// Handle on the access guard, for hosts that build accessors per call.
    pub fn access(&self) -> AccessFlag {
        self.context.access().clone()
    }

    /// Context without the guard, for hosts capturing a snapshot up front.
    pub(crate) fn context_unchecked(&self) -> &ExecutionContext {
        self.context
    }

    pub(crate) fn forbid_access(&self) -> ForbiddenScope {
        self.context.access().forbid()
    }

    pub fn now(&self) -> Instant {
        self.context.now()
    }

    pub fn panels(&self) -> PanelVisibility {
        self.context.panels()
    }

    pub fn is_chat_open(&self) -> bool {
        self.context.is_chat_open()
    }

    pub fn max_monster_range(&self) -> f32 {
        self.context.max_monster_range()
    }

    pub fn current_group(&self) -> Option<GroupId> {
        self.context.current_group()
    }

    /// Read-only state of the current group, if it has been touched yet.
    pub fn group_state(&self) -> Option<&PerGroupState> {
        self.context.current_group_state()
    }

    pub fn is_flag_set(&self, name: &str) -> bool {
        self.group_state().map_or(false, |state| state.is_flag_set(name))
    }

    pub fn number_value(&self, name: &str) -> f32 {
        self.group_state()
            .and_then(|state| state.number(name))
            .unwrap_or(0.0)
    }

    /// Elapsed time of a timer; zero when the timer does not exist.
    pub fn timer_value(&self, name: &str) -> Duration {
        let now = self.now();
        self.group_state()
            .and_then(|state| state.timer(name))
            .map_or(Duration::ZERO, |timer| timer.elapsed(now))
    }

    pub fn is_timer_running(&self, name: &str) -> bool {
        self.group_state()
            .and_then(|state| state.timer(name))
            .map_or(false, |timer| timer.is_running())
    }

    /// Time since the current rule last finished applying all its effects.
    pub fn last_activation_elapsed(&self) -> Option<Duration> {
        let state = self.group_state()?;
        let rule = state.current_rule()?;
        let at = state.last_activation(rule)?;
        Some(self.now().saturating_duration_since(at))
    }

    /// `true` when the current rule never activated or did so at least `min` ago.
    pub fn since_last_activation(&self, min: Duration) -> bool {
        self.last_activation_elapsed()
            .map_or(true, |elapsed| elapsed >= min)
    }

    /// Run `f` with `group` as the current group.
    pub fn with_current_group<R>(&mut self, group: GroupId, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = self.context.replace_current_group(Some(group));
        let result = f(self);
        self.context.replace_current_group(previous);
        result
    }

    /// Run `f` with `rule` as the current group's rule.
    pub fn with_current_rule<R>(&mut self, rule: RuleId, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = self.context.replace_current_rule(Some(rule));
        let result = f(self);
        self.context.replace_current_rule(previous);
        result
    }
}
