//! Lua sandbox configuration.
//!
//! Rules only see pure helpers: no I/O, no code loading, no raw table or
//! metatable access.

use anyhow::Result;
use mlua::{Lua, Value};

/// Globals removed before any rule is compiled.
const BLOCKED_GLOBALS: &[&str] = &[
    "os",
    "io",
    "debug",
    "package",
    "loadfile",
    "dofile",
    "load",
    "loadstring",
    "rawget",
    "rawset",
    "rawequal",
    "rawlen",
    "collectgarbage",
    "getfenv",
    "setfenv",
    "newproxy",
    "getmetatable",
    "setmetatable",
];

/// Apply sandbox restrictions to a Lua state.
pub fn apply_sandbox(lua: &Lua) -> Result<()> {
    let globals = lua.globals();

    for name in BLOCKED_GLOBALS {
        globals.set(*name, Value::Nil)?;
    }

    // Rules are self-contained; nothing can be required.
    let deny_require = lua.create_function(|_lua, module: String| -> mlua::Result<()> {
        Err(mlua::Error::runtime(format!(
            "require '{}' is not allowed in rules",
            module
        )))
    })?;
    globals.set("require", deny_require)?;

    Ok(())
}

/// Check if a Lua state has sandbox applied.
pub fn is_sandboxed(lua: &Lua) -> bool {
    let globals = lua.globals();

    BLOCKED_GLOBALS
        .iter()
        .all(|name| matches!(globals.get::<Value>(*name), Ok(Value::Nil)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandboxed() -> Lua {
        let lua = Lua::new();
        apply_sandbox(&lua).unwrap();
        lua
    }

    #[test]
    fn test_sandbox_blocks_system_access() {
        let lua = sandboxed();
        for name in ["os", "io", "debug", "package", "load"] {
            let value: Value = lua.globals().get(name).unwrap();
            assert!(matches!(value, Value::Nil), "{name} should be removed");
        }
    }

    #[test]
    fn test_sandbox_blocks_metatables() {
        let lua = sandboxed();
        let result = lua.load("return setmetatable({}, {})").exec();
        assert!(result.is_err());
    }

    #[test]
    fn test_sandbox_allows_string_table_math() {
        let lua = sandboxed();

        let upper: String = lua.load("return string.upper('hello')").eval().unwrap();
        assert_eq!(upper, "HELLO");

        let len: i32 = lua.load("local t = {1,2,3}; return #t").eval().unwrap();
        assert_eq!(len, 3);

        let root: f64 = lua.load("return math.sqrt(16)").eval().unwrap();
        assert_eq!(root, 4.0);
    }

    #[test]
    fn test_require_is_denied() {
        let lua = sandboxed();
        let err = lua.load("require('socket')").exec().unwrap_err();
        assert!(err.to_string().contains("not allowed in rules"));
    }

    #[test]
    fn test_is_sandboxed() {
        let lua = Lua::new();
        assert!(!is_sandboxed(&lua));

        apply_sandbox(&lua).unwrap();
        assert!(is_sandboxed(&lua));
    }
}
