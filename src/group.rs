//! Ordered rule collections gated by where the player currently is.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::effects::SideEffectContainer;
use crate::rule::{Rule, DEFAULT_RULE_SOURCE};
use crate::script::ExpressionHost;
use crate::state::{AreaInfo, RuleState};

/// Runtime identity of a group. Keys the group's durable state; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(Uuid);

impl GroupId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

/// A named, ordered list of rules with an enable matrix.
#[derive(Debug, Serialize, Deserialize)]
pub struct RuleGroup {
    #[serde(skip)]
    id: GroupId,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub enabled_in_town: bool,
    #[serde(default)]
    pub enabled_in_hideout: bool,
    #[serde(default)]
    pub enabled_in_peaceful_area: bool,
    #[serde(default = "default_true")]
    pub enabled_in_maps: bool,
    #[serde(default)]
    rules: Vec<Rule>,
}

fn default_true() -> bool {
    true
}

impl RuleGroup {
    /// A disabled group that, once enabled, runs in maps only.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: GroupId::new(),
            name: name.into(),
            enabled: false,
            enabled_in_town: false,
            enabled_in_hideout: false,
            enabled_in_peaceful_area: false,
            enabled_in_maps: true,
            rules: Vec::new(),
        }
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rules_mut(&mut self) -> &mut [Rule] {
        &mut self.rules
    }

    pub fn push_rule(&mut self, rule: Rule) -> &mut Rule {
        self.rules.push(rule);
        let last = self.rules.len() - 1;
        &mut self.rules[last]
    }

    /// Append a rule that never fires, ready to be edited.
    pub fn add_rule(&mut self) -> &mut Rule {
        self.push_rule(Rule::new(DEFAULT_RULE_SOURCE))
    }

    pub fn remove_rule(&mut self, index: usize) -> Option<Rule> {
        (index < self.rules.len()).then(|| self.rules.remove(index))
    }

    /// Move the rule at `from` so it ends up at `to`. Out-of-range indices are ignored.
    pub fn move_rule(&mut self, from: usize, to: usize) -> bool {
        if from >= self.rules.len() || to >= self.rules.len() {
            return false;
        }
        let rule = self.rules.remove(from);
        self.rules.insert(to, rule);
        true
    }

    /// Whether the group runs in `area`. Hideout wins over town, town over
    /// peaceful areas, and anything else counts as a map.
    pub fn is_applicable(&self, area: &AreaInfo) -> bool {
        if !self.enabled {
            return false;
        }
        if area.is_in_hideout {
            self.enabled_in_hideout
        } else if area.is_in_town {
            self.enabled_in_town
        } else if area.is_in_peaceful_area {
            self.enabled_in_peaceful_area
        } else {
            self.enabled_in_maps
        }
    }

    /// Short "[MTHP]" marker of the areas the group runs in.
    pub fn area_marker(&self) -> String {
        let mut marker = String::from("[");
        for (enabled, letter) in [
            (self.enabled_in_maps, 'M'),
            (self.enabled_in_town, 'T'),
            (self.enabled_in_hideout, 'H'),
            (self.enabled_in_peaceful_area, 'P'),
        ] {
            if enabled {
                marker.push(letter);
            }
        }
        marker.push(']');
        marker
    }

    /// Evaluate every rule in order, tagging each effect with its origin.
    pub fn evaluate(
        &mut self,
        host: &dyn ExpressionHost,
        state: &mut RuleState<'_>,
    ) -> Vec<SideEffectContainer> {
        if !self.is_applicable(&state.world().area) {
            return Vec::new();
        }

        let group = self.id;
        let rules = &mut self.rules;
        state.with_current_group(group, |state| {
            let mut containers = Vec::new();
            for rule in rules.iter_mut() {
                for effect in rule.evaluate(host, state) {
                    containers.push(SideEffectContainer::new(
                        effect,
                        group,
                        rule.id(),
                        rule.pending().clone(),
                    ));
                }
            }
            containers
        })
    }
}
