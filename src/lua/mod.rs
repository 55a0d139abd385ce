//! Lua rules engine module.
//!
//! Embedded Lua runtime compiling rule expressions and scripts. Rules see the
//! world snapshot as `state`, build side effects with constructor globals
//! such as `PressKey` and `SetFlag`, and run inside a sandbox.

pub mod api;
mod compiler;
pub mod engine;
pub mod sandbox;

pub use api::register_api;
pub use engine::LuaEngine;
