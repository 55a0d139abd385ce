//! Compiling rule source into callable Lua functions.
//!
//! Each rule gets its own environment table, so globals a script assigns
//! stay private to that rule. The world snapshot is converted to a Lua table
//! on every call and bound for the duration of the call, and again while a
//! `Delayed` function created by that call runs.

use std::sync::Arc;

use anyhow::{bail, Context};
use mlua::{AnyUserData, Function, Lua, LuaSerdeExt, SerializeOptions, Table, Value};
use serde::Serialize;

use super::engine::Prelude;
use crate::effects::{DeferredEffects, SideEffect};
use crate::key::Key;
use crate::rule::{ActionShape, Dialect};
use crate::script::{CompileError, CompiledRule, RuleFunction, ScriptOutput};
use crate::state::{AccessDenied, RuleState};

/// Compile `source` into a rule function returning `shape`.
pub(super) fn compile(
    lua: &Arc<Lua>,
    prelude: &Prelude,
    source: &str,
    shape: ActionShape,
    dialect: Dialect,
) -> Result<CompiledRule, CompileError> {
    let code = match dialect {
        Dialect::Expression => format!("return (\n{source}\n)"),
        Dialect::Script => source.to_string(),
    };

    let environment: Table = prelude
        .environment
        .call(lua.globals())
        .map_err(|e| CompileError::new(format!("cannot create rule environment: {e}")))?;

    let function = lua
        .load(code)
        .set_name(chunk_name(shape, dialect))
        .set_environment(environment)
        .into_function()
        .map_err(|e| CompileError::new(e.to_string()))?;

    Ok(Arc::new(LuaRule {
        lua: Arc::clone(lua),
        prelude: prelude.clone(),
        function,
        shape,
    }))
}

fn chunk_name(shape: ActionShape, dialect: Dialect) -> &'static str {
    match (dialect, shape) {
        (Dialect::Expression, ActionShape::Key) => "=key rule",
        (Dialect::Expression, ActionShape::SingleEffect) => "=effect rule",
        (Dialect::Expression, ActionShape::MultipleEffects) => "=effects rule",
        (Dialect::Script, _) => "=script rule",
    }
}

/// A compiled rule bound to the engine it was compiled in.
struct LuaRule {
    lua: Arc<Lua>,
    prelude: Prelude,
    function: Function,
    shape: ActionShape,
}

impl RuleFunction for LuaRule {
    fn call(&self, state: &RuleState<'_>) -> anyhow::Result<ScriptOutput> {
        let snapshot = state_table(&self.lua, state).context("Failed to convert rule state")?;
        let snapshot: Table = self.prelude.decorate.call(snapshot)?;

        let previous: Value = self.prelude.bind.call(snapshot)?;
        let result = self.function.call::<Value>(());
        self.prelude.bind.call::<()>(previous)?;

        output_from(result?, self.shape)
    }
}

/// Lua function handed to `Delayed`, called once the delay has passed.
///
/// When created during a rule call it keeps that call's snapshot and
/// rebinds it while running, so the function sees the same `state` and
/// helpers as the rule that scheduled it.
pub(super) struct LuaThunk {
    function: Function,
    captured: Option<Captured>,
}

struct Captured {
    bind: Function,
    snapshot: Table,
}

impl LuaThunk {
    pub(super) fn capture(lua: &Lua, function: Function) -> mlua::Result<Self> {
        let Some(prelude) = lua.app_data_ref::<Prelude>().map(|p| Prelude::clone(&p)) else {
            return Ok(Self {
                function,
                captured: None,
            });
        };

        let captured = match prelude.current.call::<Value>(())? {
            Value::Table(snapshot) => Some(Captured {
                bind: prelude.bind,
                snapshot,
            }),
            _ => None,
        };
        Ok(Self { function, captured })
    }
}

impl DeferredEffects for LuaThunk {
    fn produce(&self) -> anyhow::Result<Vec<SideEffect>> {
        let result = match &self.captured {
            Some(captured) => {
                let previous: Value = captured.bind.call(captured.snapshot.clone())?;
                let result = self.function.call::<Value>(());
                captured.bind.call::<()>(previous)?;
                result
            }
            None => self.function.call::<Value>(()),
        };
        let value = result.context("Delayed effect function failed")?;
        effects_from_value(value)
    }
}

fn output_from(value: Value, shape: ActionShape) -> anyhow::Result<ScriptOutput> {
    match shape {
        ActionShape::Key => match value {
            Value::Boolean(pressed) => Ok(ScriptOutput::Condition(pressed)),
            Value::Nil => Ok(ScriptOutput::Condition(false)),
            other => bail!("Key rule must return a boolean, got {}", other.type_name()),
        },
        ActionShape::SingleEffect => match value {
            Value::Nil | Value::Boolean(false) => Ok(ScriptOutput::Effects(Vec::new())),
            Value::UserData(data) => Ok(ScriptOutput::Effects(vec![effect_from(&data)?])),
            other => bail!(
                "Rule must return a side effect, got {}",
                other.type_name()
            ),
        },
        ActionShape::MultipleEffects => match value {
            Value::Nil | Value::Boolean(false) | Value::Table(_) => {
                Ok(ScriptOutput::Effects(effects_from_value(value)?))
            }
            other => bail!(
                "Rule must return a list of side effects, got {}",
                other.type_name()
            ),
        },
    }
}

/// Accepts `nil`/`false`, a single effect, or a list of effects.
pub(super) fn effects_from_value(value: Value) -> anyhow::Result<Vec<SideEffect>> {
    match value {
        Value::Nil | Value::Boolean(false) => Ok(Vec::new()),
        Value::UserData(data) => Ok(vec![effect_from(&data)?]),
        Value::Table(list) => {
            let mut effects = Vec::new();
            for (index, item) in list.sequence_values::<Value>().enumerate() {
                match item? {
                    Value::UserData(data) => effects.push(effect_from(&data)?),
                    other => bail!(
                        "Item {} is not a side effect, got {}",
                        index + 1,
                        other.type_name()
                    ),
                }
            }
            Ok(effects)
        }
        other => bail!("Expected side effects, got {}", other.type_name()),
    }
}

fn effect_from(data: &AnyUserData) -> anyhow::Result<SideEffect> {
    let effect = data
        .borrow::<SideEffect>()
        .context("Userdata is not a side effect")?;
    Ok(effect.clone())
}

/// Execution context values visible through `internal_state()` outside rule calls.
#[derive(Serialize)]
struct InternalView {
    can_press_key: bool,
    key_to_press: Option<Key>,
    keys_to_hold: Vec<Key>,
    keys_to_release: Vec<Key>,
}

fn serialize_options() -> SerializeOptions {
    SerializeOptions::new()
        .serialize_none_to_null(false)
        .serialize_unit_to_null(false)
}

/// The table rules see as `state`.
fn state_table(lua: &Lua, state: &RuleState<'_>) -> mlua::Result<Table> {
    let table = match lua.to_value_with(state.world(), serialize_options())? {
        Value::Table(table) => table,
        other => {
            return Err(mlua::Error::runtime(format!(
                "world snapshot converted to {}",
                other.type_name()
            )))
        }
    };

    let panels = state.panels();
    table.set("is_chat_open", panels.chat)?;
    table.set("is_left_panel_open", panels.left)?;
    table.set("is_right_panel_open", panels.right)?;
    table.set("is_fullscreen_panel_open", panels.fullscreen)?;
    table.set("is_large_panel_open", panels.large)?;
    table.set("max_monster_range", state.max_monster_range())?;
    table.set("_group", group_table(lua, state)?)?;
    table.set("internal_state", internal_state_accessor(lua, state)?)?;

    Ok(table)
}

fn group_table(lua: &Lua, state: &RuleState<'_>) -> mlua::Result<Table> {
    let flags = lua.create_table()?;
    let numbers = lua.create_table()?;
    let timers = lua.create_table()?;

    if let Some(group) = state.group_state() {
        let now = state.now();
        for (name, set) in group.flags() {
            flags.set(name, set)?;
        }
        for (name, value) in group.numbers() {
            numbers.set(name, value)?;
        }
        for (name, timer) in group.timers() {
            let entry = lua.create_table()?;
            entry.set("elapsed", timer.elapsed(now).as_secs_f64())?;
            entry.set("running", timer.is_running())?;
            timers.set(name, entry)?;
        }
    }

    let table = lua.create_table()?;
    table.set("flags", flags)?;
    table.set("numbers", numbers)?;
    table.set("timers", timers)?;
    table.set(
        "last_activation",
        state.last_activation_elapsed().map(|elapsed| elapsed.as_secs_f64()),
    )?;
    Ok(table)
}

/// `state.internal_state()` refuses while the guard is up, which is always
/// the case during a rule call.
fn internal_state_accessor(lua: &Lua, state: &RuleState<'_>) -> mlua::Result<Function> {
    let access = state.access();
    let context = state.context_unchecked();
    let view = InternalView {
        can_press_key: context.can_press_key(),
        key_to_press: context.output().key_to_press.clone(),
        keys_to_hold: context.output().keys_to_hold.clone(),
        keys_to_release: context.output().keys_to_release.clone(),
    };

    lua.create_function(move |lua, ()| {
        if access.is_forbidden() {
            return Err(mlua::Error::runtime(AccessDenied.to_string()));
        }
        lua.to_value_with(&view, serialize_options())
    })
}
