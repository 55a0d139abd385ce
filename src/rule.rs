//! A single user-authored rule: source, result shape, compile cache and
//! fault bookkeeping.

use std::fmt;

use anyhow::bail;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::effects::{PendingCounter, SideEffect};
use crate::key::Key;
use crate::script::{CompileError, CompiledRule, ExpressionHost, ScriptOutput};
use crate::state::RuleState;

/// Source of a freshly created rule: never fires.
pub const DEFAULT_RULE_SOURCE: &str = "false";

/// Runtime identity of a rule. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId(Uuid);

impl RuleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RuleId {
    fn default() -> Self {
        Self::new()
    }
}

/// What a rule's source evaluates to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionShape {
    /// A condition; `true` presses the rule's key.
    #[default]
    Key,
    /// One side effect, or nothing.
    SingleEffect,
    /// A list of side effects.
    MultipleEffects,
}

/// How the source text is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// A single expression.
    #[default]
    Expression,
    /// A statement block that `return`s its result.
    Script,
}

/// What a rule is doing right now, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleActivity {
    Faulted(String),
    /// Effects from the last evaluation are still being applied.
    Requesting { effects: Vec<String>, pending: usize },
    Waiting(usize),
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleStatus {
    pub activity: RuleActivity,
    pub fault_count: u64,
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.activity {
            RuleActivity::Faulted(message) => f.write_str(message)?,
            RuleActivity::Requesting { effects, pending } => write!(
                f,
                "Rule is requesting: {} ({pending} pending)",
                effects.join(", ")
            )?,
            RuleActivity::Waiting(1) => f.write_str("Rule is waiting for 1 side effect to apply")?,
            RuleActivity::Waiting(n) => write!(f, "Rule is waiting for {n} side effects to apply")?,
            RuleActivity::Idle => f.write_str("Rule is idle")?,
        }
        match self.fault_count {
            0 => Ok(()),
            1 => f.write_str(" (1 fault occurred before)"),
            n => write!(f, " ({n} faults occurred before)"),
        }
    }
}

/// A rule owned by a [`crate::group::RuleGroup`].
///
/// Only `source`, `action_shape`, `dialect` and `key` are persisted; the
/// compiled function, faults and pending count are rebuilt at runtime.
#[derive(Serialize, Deserialize)]
pub struct Rule {
    #[serde(skip)]
    id: RuleId,
    source: String,
    #[serde(default, rename = "action_shape")]
    shape: ActionShape,
    #[serde(default)]
    dialect: Dialect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<Key>,
    #[serde(skip)]
    compiled: Option<Result<CompiledRule, CompileError>>,
    #[serde(skip)]
    fault: Option<String>,
    #[serde(skip)]
    fault_count: u64,
    #[serde(skip)]
    requested: Vec<String>,
    #[serde(skip)]
    pending: PendingCounter,
}

impl Rule {
    /// A key-shaped expression rule bound to the default key.
    pub fn new(source: impl Into<String>) -> Self {
        Self::with_shape(source, ActionShape::Key)
    }

    pub fn with_shape(source: impl Into<String>, shape: ActionShape) -> Self {
        Self {
            id: RuleId::new(),
            source: source.into(),
            shape,
            dialect: Dialect::default(),
            key: (shape == ActionShape::Key).then(Key::default_binding),
            compiled: None,
            fault: None,
            fault_count: 0,
            requested: Vec::new(),
            pending: PendingCounter::default(),
        }
    }

    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn shape(&self) -> ActionShape {
        self.shape
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    pub fn set_source(&mut self, source: impl Into<String>) {
        let source = source.into();
        if source != self.source {
            self.source = source;
            self.invalidate();
        }
    }

    /// Switching to the key shape binds the default key; switching away drops it.
    pub fn set_shape(&mut self, shape: ActionShape) {
        if shape == self.shape {
            return;
        }
        self.key = match shape {
            ActionShape::Key => self.key.take().or_else(|| Some(Key::default_binding())),
            _ => None,
        };
        self.shape = shape;
        self.invalidate();
    }

    pub fn set_dialect(&mut self, dialect: Dialect) {
        if dialect != self.dialect {
            self.dialect = dialect;
            self.invalidate();
        }
    }

    /// The key is read at evaluation time, so this keeps the compiled function.
    pub fn set_key(&mut self, key: Option<Key>) {
        self.key = key;
    }

    /// Drop the compiled function and fault bookkeeping after an edit.
    fn invalidate(&mut self) {
        self.compiled = None;
        self.fault = None;
        self.fault_count = 0;
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    /// Compile now if needed and return the cached compile error, if any.
    pub fn compile(&mut self, host: &dyn ExpressionHost) -> Option<&CompileError> {
        let _ = self.compiled_function(host);
        self.compile_error()
    }

    pub fn compile_error(&self) -> Option<&CompileError> {
        match &self.compiled {
            Some(Err(e)) => Some(e),
            _ => None,
        }
    }

    fn compiled_function(&mut self, host: &dyn ExpressionHost) -> Result<CompiledRule, CompileError> {
        let compiled = self.compiled.get_or_insert_with(|| {
            debug!(target: "rules", "Compiling rule ({:?}, {:?})", self.shape, self.dialect);
            host.compile(&self.source, self.shape, self.dialect)
        });
        compiled.clone()
    }

    /// Last compile or runtime fault, cleared by a successful evaluation.
    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    /// Number of runtime faults since the last edit.
    pub fn fault_count(&self) -> u64 {
        self.fault_count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.get()
    }

    /// Counter shared with the containers of this rule's effects.
    pub fn pending(&self) -> &PendingCounter {
        &self.pending
    }

    /// Forget in-flight effects, e.g. after the pending queue was dropped.
    pub fn clear_pending(&self) {
        self.pending.reset();
    }

    pub fn status(&self) -> RuleStatus {
        let activity = match (&self.fault, self.pending.get()) {
            (Some(message), _) => RuleActivity::Faulted(message.clone()),
            (None, 0) => RuleActivity::Idle,
            (None, n) if !self.requested.is_empty() => RuleActivity::Requesting {
                effects: self.requested.clone(),
                pending: n,
            },
            (None, n) => RuleActivity::Waiting(n),
        };
        RuleStatus {
            activity,
            fault_count: self.fault_count,
        }
    }

    /// Evaluate the rule against `state`.
    ///
    /// Returns nothing while the rule still has pending effects, when it does
    /// not compile, or when the function fails. Failures are recorded as the
    /// rule's fault.
    pub fn evaluate(&mut self, host: &dyn ExpressionHost, state: &mut RuleState<'_>) -> Vec<SideEffect> {
        let function = match self.compiled_function(host) {
            Ok(function) => function,
            Err(e) => {
                self.fault = Some(e.to_string());
                return Vec::new();
            }
        };

        if self.pending.get() > 0 {
            return Vec::new();
        }

        let output = state.with_current_rule(self.id, |state| {
            let _forbidden = state.forbid_access();
            function.call(state)
        });

        match output.and_then(|output| self.effects_for(output)) {
            Ok(effects) => {
                self.fault = None;
                self.requested = effects.iter().map(ToString::to_string).collect();
                effects
            }
            Err(e) => {
                let message = format!("Exception while evaluating ({}): {e:#}", self.fault_count);
                warn!(target: "rules", "{message}");
                self.fault = Some(message);
                self.fault_count += 1;
                Vec::new()
            }
        }
    }

    fn effects_for(&self, output: ScriptOutput) -> anyhow::Result<Vec<SideEffect>> {
        match output {
            ScriptOutput::Condition(false) => Ok(Vec::new()),
            ScriptOutput::Condition(true) => match &self.key {
                Some(key) => Ok(vec![SideEffect::PressKey(key.clone())]),
                None => bail!("Key is not assigned"),
            },
            ScriptOutput::Effects(effects) => Ok(effects),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("source", &self.source)
            .field("shape", &self.shape)
            .field("dialect", &self.dialect)
            .field("key", &self.key)
            .field("compiled", &self.is_compiled())
            .field("fault", &self.fault)
            .field("fault_count", &self.fault_count)
            .field("pending", &self.pending.get())
            .finish()
    }
}
