//! Side effects bound to the rule and group that produced them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{ApplyResult, SideEffect};
use crate::group::GroupId;
use crate::rule::RuleId;
use crate::state::ExecutionContext;

/// Number of a rule's effects that have not reached a terminal result.
///
/// Shared between the rule and every container it produced.
#[derive(Debug, Clone, Default)]
pub struct PendingCounter(Arc<AtomicUsize>);

impl PendingCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn increment(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement without going below zero, returning the new value.
    pub(crate) fn decrement(&self) -> usize {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map_or(0, |previous| previous - 1)
    }

    pub(crate) fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}

/// A side effect together with its origin.
#[derive(Debug, Clone)]
pub struct SideEffectContainer {
    effect: SideEffect,
    group: GroupId,
    rule: RuleId,
    pending: PendingCounter,
}

impl SideEffectContainer {
    pub fn new(effect: SideEffect, group: GroupId, rule: RuleId, pending: PendingCounter) -> Self {
        Self {
            effect,
            group,
            rule,
            pending,
        }
    }

    pub fn effect(&self) -> &SideEffect {
        &self.effect
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    pub fn rule(&self) -> RuleId {
        self.rule
    }

    /// Count this effect against its rule until it reaches a terminal result.
    pub fn set_pending(&self) {
        self.pending.increment();
    }

    pub fn pending(&self) -> &PendingCounter {
        &self.pending
    }

    /// Apply the effect with its group and rule as the current scope.
    pub fn apply(&mut self, ctx: &mut ExecutionContext) -> ApplyResult {
        let effect = &mut self.effect;
        let rule = self.rule;
        ctx.with_current_group(self.group, |ctx| {
            ctx.with_current_rule(rule, |ctx| effect.apply(ctx))
        })
    }

    /// Release this effect from its rule's pending count. When the count
    /// reaches zero the rule's activation time is recorded in its group.
    pub fn set_executed(&self, ctx: &mut ExecutionContext) {
        if self.pending.decrement() > 0 {
            return;
        }
        let now = ctx.now();
        let rule = self.rule;
        ctx.with_current_group(self.group, |ctx| {
            if let Some(state) = ctx.current_group_state_mut() {
                state.record_activation(rule, now);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;

    #[test]
    fn test_pending_counter_saturates_at_zero() {
        let counter = PendingCounter::default();
        assert_eq!(counter.decrement(), 0);
        counter.increment();
        counter.increment();
        assert_eq!(counter.get(), 2);
        assert_eq!(counter.decrement(), 1);
        assert_eq!(counter.decrement(), 0);
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn test_activation_recorded_when_last_sibling_finishes() {
        let mut ctx = ExecutionContext::default();
        let group = GroupId::new();
        let rule = RuleId::new();
        let pending = PendingCounter::default();
        let mut first = SideEffectContainer::new(
            SideEffect::SetFlag("a".to_string()),
            group,
            rule,
            pending.clone(),
        );
        let second = SideEffectContainer::new(
            SideEffect::PressKey(Key::new("Q").unwrap()),
            group,
            rule,
            pending.clone(),
        );
        first.set_pending();
        second.set_pending();

        assert_eq!(first.apply(&mut ctx), ApplyResult::AppliedUnique);
        first.set_executed(&mut ctx);
        assert_eq!(pending.get(), 1);
        assert_eq!(ctx.group_state(group).unwrap().last_activation(rule), None);

        second.set_executed(&mut ctx);
        assert_eq!(pending.get(), 0);
        assert_eq!(
            ctx.group_state(group).unwrap().last_activation(rule),
            Some(ctx.now())
        );
    }

    #[test]
    fn test_apply_binds_origin_scope() {
        let mut ctx = ExecutionContext::default();
        let group = GroupId::new();
        let mut container = SideEffectContainer::new(
            SideEffect::StartTimer("t".to_string()),
            group,
            RuleId::new(),
            PendingCounter::default(),
        );
        assert_eq!(container.apply(&mut ctx), ApplyResult::AppliedUnique);
        assert_eq!(ctx.current_group(), None);
        assert!(ctx.group_state(group).unwrap().timer("t").unwrap().is_running());
    }
}
