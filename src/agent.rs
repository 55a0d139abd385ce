//! Tick orchestration: readiness, evaluation of every group, application.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::group::GroupId;
use crate::profile::Profile;
use crate::scheduler::Scheduler;
use crate::script::ExpressionHost;
use crate::state::{
    ExecutionContext, OutputBuffers, PanelVisibility, RuleState, WorldState,
    DEFAULT_MONSTER_RANGE, GRACE_PERIOD_BUFF,
};

/// Runtime knobs derived from [`crate::config::Settings`].
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub enabled: bool,
    pub key_press_cooldown: Duration,
    pub max_monster_range: f32,
    pub history_retention: Duration,
    /// Relative `DisplayGraphic` paths are resolved against this.
    pub image_directory: PathBuf,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            key_press_cooldown: Duration::from_millis(200),
            max_monster_range: DEFAULT_MONSTER_RANGE,
            history_retention: Duration::from_secs(60),
            image_directory: PathBuf::new(),
        }
    }
}

/// Why a tick did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Disabled,
    WindowUnfocused,
    PlayerDead,
    GracePeriod,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Disabled => "agent is disabled",
            Self::WindowUnfocused => "game window is not focused",
            Self::PlayerDead => "player is dead",
            Self::GracePeriod => "grace period is active",
        };
        f.write_str(reason)
    }
}

/// Host inputs that are not part of the world snapshot.
#[derive(Debug, Clone, Copy)]
pub struct TickInput {
    pub now: Instant,
    pub panels: PanelVisibility,
}

impl TickInput {
    pub fn at(now: Instant) -> Self {
        Self {
            now,
            panels: PanelVisibility::default(),
        }
    }
}

/// Everything one tick asks the host to do.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
    #[serde(flatten)]
    pub output: OutputBuffers,
    /// Containers still waiting to apply.
    pub pending: usize,
}

/// Drives ticks for one profile at a time.
pub struct Agent<H> {
    host: H,
    settings: AgentSettings,
    context: ExecutionContext,
    scheduler: Scheduler,
    last_key_press: Option<Instant>,
}

impl<H: ExpressionHost> Agent<H> {
    pub fn new(host: H, settings: AgentSettings) -> Self {
        let mut context = ExecutionContext::new(Instant::now());
        context.set_max_monster_range(settings.max_monster_range);
        Self {
            host,
            scheduler: Scheduler::new(settings.history_retention),
            settings,
            context,
            last_key_press: None,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn update_settings(&mut self, settings: AgentSettings) {
        self.context.set_max_monster_range(settings.max_monster_range);
        self.scheduler
            .history_mut()
            .set_retention(settings.history_retention);
        self.settings = settings;
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Clear flags, numbers and timers of a group.
    pub fn reset_group_state(&mut self, group: GroupId) {
        self.context.reset_group_state(group);
    }

    /// Drop all state of a group that was deleted.
    pub fn forget_group(&mut self, group: GroupId) {
        self.context.forget_group(group);
    }

    /// Drop pending effects, e.g. when switching profiles.
    pub fn clear_pending(&mut self) {
        self.scheduler.clear();
    }

    pub fn readiness(&self, world: &WorldState) -> Result<(), SkipReason> {
        if !self.settings.enabled {
            return Err(SkipReason::Disabled);
        }
        if !world.window_focused {
            return Err(SkipReason::WindowUnfocused);
        }
        if !world.player.is_alive {
            return Err(SkipReason::PlayerDead);
        }
        if world.has_buff(GRACE_PERIOD_BUFF) {
            return Err(SkipReason::GracePeriod);
        }
        Ok(())
    }

    fn resolve_graphics(&self, output: &mut OutputBuffers) {
        for graphic in &mut output.graphics {
            graphic.path = self
                .settings
                .image_directory
                .join(&graphic.path)
                .to_string_lossy()
                .into_owned();
        }
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        self.last_key_press.map_or(true, |at| {
            now.saturating_duration_since(at) >= self.settings.key_press_cooldown
        })
    }

    /// Run one evaluate/apply cycle of `profile` against `world`.
    pub fn tick(&mut self, profile: &mut Profile, world: &WorldState, input: TickInput) -> TickOutput {
        self.scheduler.prune(input.now);

        if let Err(reason) = self.readiness(world) {
            debug!(target: "rules", %reason, "Skipping tick");
            return TickOutput {
                skipped: Some(reason),
                output: OutputBuffers::default(),
                pending: self.scheduler.pending_len(),
            };
        }

        let can_press_key = self.cooldown_elapsed(input.now) && !input.panels.chat;
        self.context.begin_tick(input.now, input.panels, can_press_key);

        self.scheduler.apply_pending(&mut self.context);

        let mut produced = Vec::new();
        let mut state = RuleState::new(world, &mut self.context);
        for group in profile.groups_mut() {
            produced.extend(group.evaluate(&self.host, &mut state));
        }
        self.scheduler.enqueue(produced);

        self.scheduler.apply_pending(&mut self.context);

        let mut output = self.context.take_output();
        self.resolve_graphics(&mut output);
        if output.key_to_press.is_some() {
            self.last_key_press = Some(input.now);
        }

        TickOutput {
            skipped: None,
            output,
            pending: self.scheduler.pending_len(),
        }
    }
}
