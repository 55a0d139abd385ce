//! State visible to rules: the world snapshot and the execution context.

mod context;
mod rule_state;
mod world;

pub use context::{
    AccessFlag, ExecutionContext, ForbiddenScope, OutputBuffers, PanelVisibility, PerGroupState,
    Stopwatch, DEFAULT_MONSTER_RANGE,
};
pub use rule_state::{AccessDenied, RuleState};
pub use world::{
    AreaInfo, FlaskInfo, MonsterInfo, MonsterRarity, PlayerInfo, SkillInfo, StatusEffect, Vital,
    Vitals, WorldState, GRACE_PERIOD_BUFF,
};
