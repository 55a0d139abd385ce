//! Applies pending side effects and remembers what was done recently.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::effects::{ApplyResult, SideEffectContainer};
use crate::state::ExecutionContext;

/// One applied action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionRecord {
    pub timestamp: DateTime<Utc>,
    pub description: String,
    #[serde(skip)]
    at: Instant,
}

/// Descriptions of unique applications, kept for a retention window.
#[derive(Debug, Default)]
pub struct ActionHistory {
    retention: Duration,
    records: VecDeque<ActionRecord>,
}

impl ActionHistory {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            records: VecDeque::new(),
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn set_retention(&mut self, retention: Duration) {
        self.retention = retention;
    }

    pub fn record(&mut self, at: Instant, description: String) {
        self.records.push_back(ActionRecord {
            timestamp: Utc::now(),
            description,
            at,
        });
    }

    /// Drop records older than the retention window.
    pub fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.records.front() {
            if now.saturating_duration_since(oldest.at) <= self.retention {
                break;
            }
            self.records.pop_front();
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &ActionRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Queue of containers that have not reached a terminal result yet.
#[derive(Debug, Default)]
pub struct Scheduler {
    pending: Vec<SideEffectContainer>,
    history: ActionHistory,
}

impl Scheduler {
    pub fn new(retention: Duration) -> Self {
        Self {
            pending: Vec::new(),
            history: ActionHistory::new(retention),
        }
    }

    pub fn history(&self) -> &ActionHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut ActionHistory {
        &mut self.history
    }

    pub fn pending(&self) -> &[SideEffectContainer] {
        &self.pending
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Queue freshly produced containers, counting each against its rule.
    pub fn enqueue(&mut self, containers: impl IntoIterator<Item = SideEffectContainer>) {
        for container in containers {
            container.set_pending();
            self.pending.push(container);
        }
    }

    /// Try every pending container once. Returns how many reached a terminal result.
    pub fn apply_pending(&mut self, ctx: &mut ExecutionContext) -> usize {
        let mut still_pending = Vec::with_capacity(self.pending.len());
        let mut finished = 0;

        for mut container in self.pending.drain(..) {
            let result = container.apply(ctx);
            debug!(target: "effects", effect = %container.effect(), ?result, "Applied side effect");

            match result {
                ApplyResult::UnableToApply => still_pending.push(container),
                ApplyResult::AppliedUnique => {
                    let description = container.effect().to_string();
                    info!(target: "effects", "{description}");
                    self.history.record(ctx.now(), description);
                    container.set_executed(ctx);
                    finished += 1;
                }
                ApplyResult::AppliedDuplicate => {
                    container.set_executed(ctx);
                    finished += 1;
                }
            }
        }

        self.pending = still_pending;
        finished
    }

    pub fn prune(&mut self, now: Instant) {
        self.history.prune(now);
    }

    /// Drop every pending container and release the rules they block.
    pub fn clear(&mut self) {
        for container in self.pending.drain(..) {
            container.pending().reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{PendingCounter, SideEffect};
    use crate::group::GroupId;
    use crate::key::Key;
    use crate::rule::RuleId;
    use crate::state::PanelVisibility;

    fn container(effect: SideEffect, group: GroupId, rule: RuleId, pending: &PendingCounter) -> SideEffectContainer {
        SideEffectContainer::new(effect, group, rule, pending.clone())
    }

    #[test]
    fn test_enqueue_counts_pending_before_apply() {
        let mut scheduler = Scheduler::new(Duration::from_secs(60));
        let pending = PendingCounter::default();
        let (group, rule) = (GroupId::new(), RuleId::new());
        scheduler.enqueue([
            container(SideEffect::SetFlag("a".into()), group, rule, &pending),
            container(SideEffect::SetFlag("b".into()), group, rule, &pending),
        ]);
        assert_eq!(pending.get(), 2);
        assert_eq!(scheduler.pending_len(), 2);
    }

    #[test]
    fn test_terminal_results_release_the_rule() {
        let t0 = Instant::now();
        let mut ctx = ExecutionContext::new(t0);
        let mut scheduler = Scheduler::new(Duration::from_secs(60));
        let pending = PendingCounter::default();
        let (group, rule) = (GroupId::new(), RuleId::new());

        scheduler.enqueue([
            container(SideEffect::SetFlag("a".into()), group, rule, &pending),
            container(SideEffect::SetFlag("a".into()), group, rule, &pending),
        ]);
        assert_eq!(scheduler.apply_pending(&mut ctx), 2);
        assert_eq!(pending.get(), 0);
        assert_eq!(scheduler.pending_len(), 0);
        // Second SetFlag was a duplicate, so only one history entry.
        assert_eq!(scheduler.history().len(), 1);
        assert_eq!(
            ctx.group_state(group).unwrap().last_activation(rule),
            Some(t0)
        );
    }

    #[test]
    fn test_unable_containers_stay_pending() {
        let t0 = Instant::now();
        let mut ctx = ExecutionContext::new(t0);
        let mut scheduler = Scheduler::new(Duration::from_secs(60));
        let pending = PendingCounter::default();
        let (group, rule) = (GroupId::new(), RuleId::new());

        scheduler.enqueue([container(
            SideEffect::PressKey(Key::new("Q").unwrap()),
            group,
            rule,
            &pending,
        )]);
        let press_q = SideEffect::PressKey(Key::new("Q").unwrap());

        // Key presses stay blocked for several ticks in a row.
        for tick in 0..5 {
            ctx.begin_tick(t0 + Duration::from_millis(tick * 50), PanelVisibility::default(), false);
            assert_eq!(scheduler.apply_pending(&mut ctx), 0);
            assert_eq!(scheduler.apply_pending(&mut ctx), 0);
            assert_eq!(scheduler.pending_len(), 1);
            assert_eq!(pending.get(), 1);
            assert_eq!(scheduler.pending()[0].effect(), &press_q);
            assert!(scheduler.history().is_empty());
        }

        ctx.begin_tick(t0 + Duration::from_millis(250), PanelVisibility::default(), true);
        assert_eq!(scheduler.apply_pending(&mut ctx), 1);
        assert_eq!(scheduler.pending_len(), 0);
        assert_eq!(pending.get(), 0);
        assert_eq!(ctx.output().key_to_press, Some(Key::new("Q").unwrap()));
        assert_eq!(scheduler.history().len(), 1);
    }

    #[test]
    fn test_history_retention_over_ticks() {
        let t0 = Instant::now();
        let mut ctx = ExecutionContext::new(t0);
        let mut scheduler = Scheduler::new(Duration::from_secs(3));
        let pending = PendingCounter::default();
        let group = GroupId::new();

        for tick in 0..6u64 {
            let now = t0 + Duration::from_secs(tick);
            scheduler.prune(now);
            ctx.begin_tick(now, PanelVisibility::default(), true);
            scheduler.enqueue([container(
                SideEffect::DisplayText(crate::effects::TextRequest {
                    text: format!("tick {tick}"),
                    position: [0.0, 0.0],
                    color: "white".into(),
                }),
                group,
                RuleId::new(),
                &pending,
            )]);
            scheduler.apply_pending(&mut ctx);
        }

        // Ticks 2..=5 are within three seconds of tick 5.
        let kept: Vec<_> = scheduler
            .history()
            .records()
            .map(|r| r.description.clone())
            .collect();
        assert_eq!(kept.len(), 4);
        assert!(kept[0].contains("tick 2"));

        scheduler.prune(t0 + Duration::from_secs(20));
        assert!(scheduler.history().is_empty());
    }

    #[test]
    fn test_clear_releases_pending_rules() {
        let mut scheduler = Scheduler::default();
        let pending = PendingCounter::default();
        scheduler.enqueue([container(
            SideEffect::StartTimer("t".into()),
            GroupId::new(),
            RuleId::new(),
            &pending,
        )]);
        scheduler.clear();
        assert_eq!(pending.get(), 0);
        assert_eq!(scheduler.pending_len(), 0);
    }
}
