//! A profile is the ordered list of rule groups the agent evaluates.

use serde::{Deserialize, Serialize};

use crate::group::{GroupId, RuleGroup};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    groups: Vec<RuleGroup>,
}

impl Profile {
    pub fn new() -> Self {
        Self::default()
    }

    /// A profile holding one empty group, as created for new users.
    pub fn create_with_default_group() -> Self {
        let mut profile = Self::new();
        profile.add_group();
        profile
    }

    pub fn groups(&self) -> &[RuleGroup] {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> &mut [RuleGroup] {
        &mut self.groups
    }

    pub fn group(&self, id: GroupId) -> Option<&RuleGroup> {
        self.groups.iter().find(|group| group.id() == id)
    }

    pub fn group_mut(&mut self, id: GroupId) -> Option<&mut RuleGroup> {
        self.groups.iter_mut().find(|group| group.id() == id)
    }

    /// First free "New rule group N" name.
    pub fn new_group_name(&self) -> String {
        let mut n = 1;
        loop {
            let name = format!("New rule group {n}");
            if !self.groups.iter().any(|group| group.name == name) {
                return name;
            }
            n += 1;
        }
    }

    pub fn push_group(&mut self, group: RuleGroup) -> &mut RuleGroup {
        self.groups.push(group);
        let last = self.groups.len() - 1;
        &mut self.groups[last]
    }

    /// Append an empty group with a fresh name.
    pub fn add_group(&mut self) -> &mut RuleGroup {
        let name = self.new_group_name();
        self.push_group(RuleGroup::new(name))
    }

    pub fn remove_group(&mut self, index: usize) -> Option<RuleGroup> {
        (index < self.groups.len()).then(|| self.groups.remove(index))
    }

    pub fn move_group(&mut self, from: usize, to: usize) -> bool {
        if from >= self.groups.len() || to >= self.groups.len() {
            return false;
        }
        let group = self.groups.remove(from);
        self.groups.insert(to, group);
        true
    }

    pub fn rule_count(&self) -> usize {
        self.groups.iter().map(|group| group.rules().len()).sum()
    }
}
