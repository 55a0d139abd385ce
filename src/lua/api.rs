//! Globals rules use to build side effects, plus the `reagent` utility table.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use mlua::{AnyUserData, Function, Lua, LuaSerdeExt, MetaMethod, UserData, UserDataMethods, Value};
use tracing::{debug, error, info, trace, warn};

use super::compiler::{effects_from_value, LuaThunk};
use crate::effects::{
    BridgeCall, Delayed, GraphicRequest, ProgressBarRequest, SideEffect, TextRequest,
};
use crate::key::Key;

const DEFAULT_TEXT_COLOR: &str = "white";
const DEFAULT_TINT: &str = "white";
const DEFAULT_BAR_COLOR: &str = "green";
const DEFAULT_BAR_BACKGROUND: &str = "black";

impl UserData for SideEffect {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| Ok(this.to_string()));
        methods.add_meta_method(MetaMethod::Eq, |_, this, other: AnyUserData| {
            Ok(other
                .borrow::<SideEffect>()
                .map_or(false, |other| *this == *other))
        });
    }
}

/// Register effect constructors and the `reagent` table in the Lua globals.
pub fn register_api(lua: &Lua) -> Result<()> {
    let globals = lua.globals();

    globals.set("PressKey", create_key_effect(lua, SideEffect::PressKey)?)?;
    globals.set("HoldKey", create_key_effect(lua, SideEffect::HoldKey)?)?;
    globals.set("ReleaseKey", create_key_effect(lua, SideEffect::ReleaseKey)?)?;
    globals.set("SetFlag", create_named_effect(lua, SideEffect::SetFlag)?)?;
    globals.set("ResetFlag", create_named_effect(lua, SideEffect::ResetFlag)?)?;
    globals.set("SetNumber", create_set_number(lua)?)?;
    globals.set("ResetNumber", create_named_effect(lua, SideEffect::ResetNumber)?)?;
    globals.set("StartTimer", create_named_effect(lua, SideEffect::StartTimer)?)?;
    globals.set("StopTimer", create_named_effect(lua, SideEffect::StopTimer)?)?;
    globals.set("RestartTimer", create_named_effect(lua, SideEffect::RestartTimer)?)?;
    globals.set("ResetTimer", create_named_effect(lua, SideEffect::ResetTimer)?)?;
    globals.set("DisplayText", create_display_text(lua)?)?;
    globals.set("DisplayGraphic", create_display_graphic(lua)?)?;
    globals.set("ProgressBar", create_progress_bar(lua)?)?;
    globals.set("PluginBridge", create_plugin_bridge(lua)?)?;
    globals.set("Delayed", create_delayed(lua)?)?;

    let reagent = lua.create_table()?;
    reagent.set("log", create_log(lua)?)?;
    reagent.set("version", env!("CARGO_PKG_VERSION"))?;
    globals.set("reagent", reagent)?;

    Ok(())
}

fn create_key_effect(lua: &Lua, make: fn(Key) -> SideEffect) -> Result<Function> {
    let func = lua.create_function(move |_lua, name: String| {
        let key = Key::new(&name).map_err(mlua::Error::external)?;
        Ok(make(key))
    })?;
    Ok(func)
}

fn create_named_effect(lua: &Lua, make: fn(String) -> SideEffect) -> Result<Function> {
    let func = lua.create_function(move |_lua, name: String| Ok(make(name)))?;
    Ok(func)
}

fn create_set_number(lua: &Lua) -> Result<Function> {
    let func = lua.create_function(|_lua, (name, value): (String, f32)| {
        Ok(SideEffect::SetNumber { name, value })
    })?;
    Ok(func)
}

fn create_display_text(lua: &Lua) -> Result<Function> {
    let func = lua.create_function(
        |_lua, (text, x, y, color): (String, f32, f32, Option<String>)| {
            Ok(SideEffect::DisplayText(TextRequest {
                text,
                position: [x, y],
                color: color.unwrap_or_else(|| DEFAULT_TEXT_COLOR.to_string()),
            }))
        },
    )?;
    Ok(func)
}

fn create_display_graphic(lua: &Lua) -> Result<Function> {
    let func = lua.create_function(
        |_lua, (path, x, y, width, height, tint): (String, f32, f32, f32, f32, Option<String>)| {
            Ok(SideEffect::DisplayGraphic(GraphicRequest {
                path,
                position: [x, y],
                size: [width, height],
                tint: tint.unwrap_or_else(|| DEFAULT_TINT.to_string()),
            }))
        },
    )?;
    Ok(func)
}

type ProgressBarArgs = (
    String,
    f32,
    f32,
    f32,
    f32,
    f32,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn create_progress_bar(lua: &Lua) -> Result<Function> {
    let func = lua.create_function(|_lua, args: ProgressBarArgs| {
        let (text, x, y, width, height, fraction, color, background, text_color) = args;
        let request = ProgressBarRequest {
            text,
            position: [x, y],
            size: [width, height],
            fraction,
            color: color.unwrap_or_else(|| DEFAULT_BAR_COLOR.to_string()),
            background_color: background.unwrap_or_else(|| DEFAULT_BAR_BACKGROUND.to_string()),
            text_color: text_color.unwrap_or_else(|| DEFAULT_TEXT_COLOR.to_string()),
        };
        Ok(SideEffect::ProgressBar(request.normalized()))
    })?;
    Ok(func)
}

fn create_plugin_bridge(lua: &Lua) -> Result<Function> {
    let func = lua.create_function(|lua, (method, payload): (String, Value)| {
        let payload: serde_json::Value = lua.from_value(payload)?;
        Ok(SideEffect::PluginBridge(BridgeCall { method, payload }))
    })?;
    Ok(func)
}

/// `Delayed(seconds, effects)` where `effects` is a list, a single effect,
/// or a function producing either once the delay has passed.
fn create_delayed(lua: &Lua) -> Result<Function> {
    let func = lua.create_function(|lua, (seconds, effects): (f64, Value)| {
        let delay = Duration::try_from_secs_f64(seconds.max(0.0))
            .map_err(|e| mlua::Error::runtime(format!("invalid delay {seconds}: {e}")))?;

        let delayed = match effects {
            Value::Function(function) => {
                Delayed::deferred(delay, Arc::new(LuaThunk::capture(lua, function)?))
            }
            other => {
                let effects = effects_from_value(other).map_err(|e| {
                    mlua::Error::runtime(format!("Delayed expects side effects: {e:#}"))
                })?;
                Delayed::new(delay, effects)
            }
        };
        Ok(SideEffect::Delayed(delayed))
    })?;
    Ok(func)
}

fn create_log(lua: &Lua) -> Result<Function> {
    let func = lua.create_function(|_lua, (level, message): (String, String)| {
        log_message(&level, &message);
        Ok(())
    })?;
    Ok(func)
}

/// Log a message from a rule at the specified level.
fn log_message(level: &str, message: &str) {
    match level.to_lowercase().as_str() {
        "trace" => trace!(target: "rules::script", "{}", message),
        "debug" => debug!(target: "rules::script", "{}", message),
        "warn" | "warning" => warn!(target: "rules::script", "{}", message),
        "error" => error!(target: "rules::script", "{}", message),
        _ => info!(target: "rules::script", "{}", message),
    }
}
