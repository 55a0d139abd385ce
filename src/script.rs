//! Boundary between rules and whatever compiles their source.
//!
//! Rules only depend on [`ExpressionHost::compile`] and the resulting
//! [`RuleFunction`]. The shipped host is [`crate::lua::LuaEngine`].

use std::sync::Arc;

use thiserror::Error;

use crate::effects::SideEffect;
use crate::rule::{ActionShape, Dialect};
use crate::state::RuleState;

/// Value produced by one call of a compiled rule.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptOutput {
    /// Result of a key-shaped rule: `true` presses the rule's key.
    Condition(bool),
    /// Effects requested by single- and multi-effect rules.
    Effects(Vec<SideEffect>),
}

/// A compiled rule, callable once per tick.
pub trait RuleFunction: Send + Sync {
    fn call(&self, state: &RuleState<'_>) -> anyhow::Result<ScriptOutput>;
}

impl<F> RuleFunction for F
where
    F: Fn(&RuleState<'_>) -> anyhow::Result<ScriptOutput> + Send + Sync,
{
    fn call(&self, state: &RuleState<'_>) -> anyhow::Result<ScriptOutput> {
        self(state)
    }
}

pub type CompiledRule = Arc<dyn RuleFunction>;

/// Compilation failure, kept as text so it can be cached and shown every tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Expression compilation failed: {message}")]
pub struct CompileError {
    message: String,
}

impl CompileError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Compiles rule source for a given result shape and dialect.
pub trait ExpressionHost {
    fn compile(
        &self,
        source: &str,
        shape: ActionShape,
        dialect: Dialect,
    ) -> Result<CompiledRule, CompileError>;
}
