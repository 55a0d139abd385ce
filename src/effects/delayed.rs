//! Composite effect that waits before applying its nested effects.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use super::{ApplyResult, SideEffect};
use crate::state::ExecutionContext;

/// Produces the nested effects of a [`Delayed`] once its delay has passed.
pub trait DeferredEffects: Send + Sync {
    fn produce(&self) -> anyhow::Result<Vec<SideEffect>>;
}

impl<F> DeferredEffects for F
where
    F: Fn() -> anyhow::Result<Vec<SideEffect>> + Send + Sync,
{
    fn produce(&self) -> anyhow::Result<Vec<SideEffect>> {
        self()
    }
}

#[derive(Clone)]
enum Source {
    Ready(Vec<SideEffect>),
    Deferred(Arc<dyn DeferredEffects>),
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Ready(a), Self::Ready(b)) => a == b,
            (Self::Deferred(a), Self::Deferred(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(effects) => f.debug_tuple("Ready").field(effects).finish(),
            Self::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

/// Waits `delay` after its first application attempt, then applies nested
/// effects in order.
///
/// Nested effects are produced once. Progress is kept across ticks, so a
/// nested effect that already applied is never attempted again.
#[derive(Debug, Clone)]
pub struct Delayed {
    delay: Duration,
    source: Source,
    started_at: Option<Instant>,
    nested: Option<Vec<SideEffect>>,
    completed: Vec<bool>,
}

impl Delayed {
    pub fn new(delay: Duration, effects: Vec<SideEffect>) -> Self {
        Self::with_source(delay, Source::Ready(effects))
    }

    /// Nested effects are produced by `producer` when the delay has passed.
    pub fn deferred(delay: Duration, producer: Arc<dyn DeferredEffects>) -> Self {
        Self::with_source(delay, Source::Deferred(producer))
    }

    fn with_source(delay: Duration, source: Source) -> Self {
        Self {
            delay,
            source,
            started_at: None,
            nested: None,
            completed: Vec::new(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Nested effects, once produced.
    pub fn nested(&self) -> Option<&[SideEffect]> {
        self.nested.as_deref()
    }

    pub(super) fn apply(&mut self, ctx: &mut ExecutionContext) -> ApplyResult {
        let now = ctx.now();
        let Some(started_at) = self.started_at else {
            self.started_at = Some(now);
            return ApplyResult::UnableToApply;
        };
        if now.saturating_duration_since(started_at) < self.delay {
            return ApplyResult::UnableToApply;
        }

        let nested = match &mut self.nested {
            Some(nested) => nested,
            empty => {
                let effects = produce(&self.source);
                self.completed = vec![false; effects.len()];
                empty.insert(effects)
            }
        };

        for (effect, done) in nested.iter_mut().zip(self.completed.iter_mut()) {
            if *done {
                continue;
            }
            if !effect.apply(ctx).is_terminal() {
                return ApplyResult::UnableToApply;
            }
            *done = true;
        }

        // A failed or empty producer leaves nothing that was applied.
        if nested.is_empty() {
            ApplyResult::AppliedDuplicate
        } else {
            ApplyResult::AppliedUnique
        }
    }
}

fn produce(source: &Source) -> Vec<SideEffect> {
    match source {
        Source::Ready(effects) => effects.clone(),
        Source::Deferred(producer) => producer.produce().unwrap_or_else(|e| {
            warn!(target: "effects", "Delayed effect producer failed: {e:#}");
            Vec::new()
        }),
    }
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.delay == other.delay && self.source == other.source
    }
}

impl fmt::Display for Delayed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Delayed ({:.1}s) ", self.delay.as_secs_f64())?;
        let effects = match (&self.nested, &self.source) {
            (Some(effects), _) | (None, Source::Ready(effects)) => effects,
            (None, Source::Deferred(_)) => return f.write_str("deferred effects"),
        };
        f.write_str("[")?;
        for (index, effect) in effects.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{effect}")?;
        }
        f.write_str("]")
    }
}
