//! Side effects requested by rules.
//!
//! The catalog is closed: every action a rule can request is a variant of
//! [`SideEffect`], and applying one against the [`ExecutionContext`] reports
//! one of three outcomes. `UnableToApply` means "try again next tick".

mod container;
mod delayed;
mod output;

use std::fmt;
use std::time::Instant;

use tracing::debug;

use crate::key::Key;
use crate::state::{ExecutionContext, PerGroupState};

pub use container::{PendingCounter, SideEffectContainer};
pub use delayed::{DeferredEffects, Delayed};
pub use output::{BridgeCall, GraphicRequest, ProgressBarRequest, TextRequest};

/// Outcome of applying a side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
    /// Precondition unmet; the effect stays pending.
    UnableToApply,
    /// The effect changed something.
    AppliedUnique,
    /// The target already held the requested value.
    AppliedDuplicate,
}

impl ApplyResult {
    /// Unique when `changed`, duplicate otherwise.
    pub fn from_change(changed: bool) -> Self {
        if changed {
            Self::AppliedUnique
        } else {
            Self::AppliedDuplicate
        }
    }

    /// Terminal results end the retry cycle of a container.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::UnableToApply)
    }
}

/// An action a rule asks the agent to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    PressKey(Key),
    HoldKey(Key),
    ReleaseKey(Key),
    SetFlag(String),
    ResetFlag(String),
    SetNumber { name: String, value: f32 },
    ResetNumber(String),
    StartTimer(String),
    StopTimer(String),
    RestartTimer(String),
    ResetTimer(String),
    DisplayText(TextRequest),
    DisplayGraphic(GraphicRequest),
    ProgressBar(ProgressBarRequest),
    PluginBridge(BridgeCall),
    Delayed(Delayed),
}

impl SideEffect {
    /// Try to apply the effect. Only `Delayed` keeps state between calls.
    pub fn apply(&mut self, ctx: &mut ExecutionContext) -> ApplyResult {
        match self {
            Self::PressKey(key) => press_key(ctx, key),
            Self::HoldKey(key) => queue_key(&mut ctx.output_mut().keys_to_hold, key),
            Self::ReleaseKey(key) => queue_key(&mut ctx.output_mut().keys_to_release, key),
            Self::SetFlag(name) => with_group_state(ctx, |state, _| state.set_flag(name)),
            Self::ResetFlag(name) => with_group_state(ctx, |state, _| state.reset_flag(name)),
            Self::SetNumber { name, value } => {
                with_group_state(ctx, |state, _| state.set_number(name, *value))
            }
            Self::ResetNumber(name) => with_group_state(ctx, |state, _| state.reset_number(name)),
            Self::StartTimer(name) => with_group_state(ctx, |state, now| state.start_timer(name, now)),
            Self::StopTimer(name) => with_group_state(ctx, |state, now| state.stop_timer(name, now)),
            Self::RestartTimer(name) => {
                with_group_state(ctx, |state, now| state.restart_timer(name, now))
            }
            Self::ResetTimer(name) => with_group_state(ctx, |state, _| state.reset_timer(name)),
            Self::DisplayText(request) => {
                ctx.output_mut().texts.push(request.clone());
                ApplyResult::AppliedUnique
            }
            Self::DisplayGraphic(request) => {
                ctx.output_mut().graphics.push(request.clone());
                ApplyResult::AppliedUnique
            }
            Self::ProgressBar(request) => {
                ctx.output_mut().progress_bars.push(request.clone());
                ApplyResult::AppliedUnique
            }
            Self::PluginBridge(call) => {
                ctx.output_mut().bridge_calls.push(call.clone());
                ApplyResult::AppliedUnique
            }
            Self::Delayed(delayed) => delayed.apply(ctx),
        }
    }
}

fn press_key(ctx: &mut ExecutionContext, key: &Key) -> ApplyResult {
    if !ctx.can_press_key() || ctx.is_chat_open() {
        return ApplyResult::UnableToApply;
    }
    let slot = &mut ctx.output_mut().key_to_press;
    if let Some(pending) = slot {
        return if *pending == *key {
            ApplyResult::AppliedDuplicate
        } else {
            ApplyResult::UnableToApply
        };
    }
    *slot = Some(key.clone());
    ApplyResult::AppliedUnique
}

fn queue_key(queue: &mut Vec<Key>, key: &Key) -> ApplyResult {
    if queue.contains(key) {
        return ApplyResult::AppliedDuplicate;
    }
    queue.push(key.clone());
    ApplyResult::AppliedUnique
}

fn with_group_state(
    ctx: &mut ExecutionContext,
    change: impl FnOnce(&mut PerGroupState, Instant) -> bool,
) -> ApplyResult {
    let now = ctx.now();
    match ctx.current_group_state_mut() {
        Some(state) => ApplyResult::from_change(change(state, now)),
        None => {
            debug!(target: "effects", "No current group bound, cannot touch group state");
            ApplyResult::UnableToApply
        }
    }
}

impl fmt::Display for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PressKey(key) => write!(f, "Press key {key}"),
            Self::HoldKey(key) => write!(f, "Hold key {key}"),
            Self::ReleaseKey(key) => write!(f, "Release key {key}"),
            Self::SetFlag(name) => write!(f, "Set flag '{name}'"),
            Self::ResetFlag(name) => write!(f, "Reset flag '{name}'"),
            Self::SetNumber { name, value } => write!(f, "Set number '{name}' to {value}"),
            Self::ResetNumber(name) => write!(f, "Reset number '{name}'"),
            Self::StartTimer(name) => write!(f, "Start timer '{name}'"),
            Self::StopTimer(name) => write!(f, "Stop timer '{name}'"),
            Self::RestartTimer(name) => write!(f, "Restart timer '{name}'"),
            Self::ResetTimer(name) => write!(f, "Reset timer '{name}'"),
            Self::DisplayText(request) => write!(f, "Display text '{}'", request.text),
            Self::DisplayGraphic(request) => write!(f, "Display graphic '{}'", request.path),
            Self::ProgressBar(request) => write!(f, "Display progress bar '{}'", request.text),
            Self::PluginBridge(call) => write!(f, "Invoke plugin bridge method '{}'", call.method),
            Self::Delayed(delayed) => write!(f, "{delayed}"),
        }
    }
}
