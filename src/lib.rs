//! reagent library - rule-driven control loop for game automation.
//!
//! Each tick the [`agent::Agent`] evaluates the rule groups of a
//! [`profile::Profile`] against a [`state::WorldState`] snapshot. Rules are
//! Lua expressions or scripts that request [`effects::SideEffect`]s; effects
//! are applied with idempotency tracking, and a rule is not evaluated again
//! until everything it requested has applied.

pub mod agent;
pub mod cli;
pub mod config;
pub mod effects;
pub mod group;
pub mod key;
pub mod lua;
pub mod profile;
pub mod rule;
pub mod scheduler;
pub mod script;
pub mod state;
