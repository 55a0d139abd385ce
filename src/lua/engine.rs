//! Lua engine hosting rule expressions and scripts.

use std::sync::Arc;

use anyhow::{Context, Result};
use mlua::{Function, Lua, Table};
use tracing::debug;

use super::api::register_api;
use super::compiler;
use super::sandbox::apply_sandbox;
use crate::rule::{ActionShape, Dialect};
use crate::script::{CompileError, CompiledRule, ExpressionHost};

const PRELUDE: &str = include_str!("prelude.lua");

/// Hooks exported by the prelude chunk.
#[derive(Clone)]
pub(super) struct Prelude {
    pub(super) bind: Function,
    pub(super) current: Function,
    pub(super) decorate: Function,
    pub(super) environment: Function,
}

impl Prelude {
    fn load(lua: &Lua) -> Result<Self> {
        let host: Table = lua
            .load(PRELUDE)
            .set_name("=prelude")
            .eval()
            .context("Failed to load rule prelude")?;

        Ok(Self {
            bind: host.get("bind")?,
            current: host.get("current")?,
            decorate: host.get("decorate")?,
            environment: host.get("environment")?,
        })
    }
}

/// Lua engine compiling rules against a shared, sandboxed state.
pub struct LuaEngine {
    lua: Arc<Lua>,
    prelude: Prelude,
}

impl LuaEngine {
    /// Create a new Lua engine with sandbox applied.
    pub fn new() -> Result<Self> {
        let engine = Self::new_unsandboxed()?;
        apply_sandbox(&engine.lua)?;
        Ok(engine)
    }

    /// Create a new Lua engine without sandbox (for testing only).
    pub(crate) fn new_unsandboxed() -> Result<Self> {
        let lua = Lua::new();
        let prelude = Prelude::load(&lua)?;
        // `Delayed` reads it to capture the snapshot of the calling rule.
        lua.set_app_data(prelude.clone());
        register_api(&lua)?;
        Ok(Self {
            lua: Arc::new(lua),
            prelude,
        })
    }

    /// Get access to the underlying Lua state.
    pub fn lua(&self) -> &Lua {
        &self.lua
    }
}

impl ExpressionHost for LuaEngine {
    fn compile(
        &self,
        source: &str,
        shape: ActionShape,
        dialect: Dialect,
    ) -> Result<CompiledRule, CompileError> {
        debug!(target: "rules", ?shape, ?dialect, "Compiling rule");
        compiler::compile(&self.lua, &self.prelude, source, shape, dialect)
    }
}
