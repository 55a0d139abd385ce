//! Read-only snapshot of the environment, supplied by the host once per tick.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::key::Key;

/// Buff whose presence pauses the agent entirely.
pub const GRACE_PERIOD_BUFF: &str = "grace_period";

/// Everything a rule can observe about the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldState {
    pub window_focused: bool,
    pub area: AreaInfo,
    pub player: PlayerInfo,
    pub vitals: Vitals,
    pub buffs: BTreeMap<String, StatusEffect>,
    pub ailments: Vec<String>,
    pub skills: BTreeMap<String, SkillInfo>,
    pub flasks: Vec<FlaskInfo>,
    pub monsters: Vec<MonsterInfo>,
    pub keys_down: Vec<Key>,
}

impl Default for WorldState {
    fn default() -> Self {
        Self {
            window_focused: true,
            area: AreaInfo::default(),
            player: PlayerInfo::default(),
            vitals: Vitals::default(),
            buffs: BTreeMap::new(),
            ailments: Vec::new(),
            skills: BTreeMap::new(),
            flasks: Vec::new(),
            monsters: Vec::new(),
            keys_down: Vec::new(),
        }
    }
}

impl WorldState {
    pub fn has_buff(&self, name: &str) -> bool {
        self.buffs.contains_key(name)
    }

    pub fn is_key_down(&self, key: &Key) -> bool {
        self.keys_down.contains(key)
    }
}

/// Classification of the current area.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AreaInfo {
    pub name: String,
    pub is_in_town: bool,
    pub is_in_hideout: bool,
    pub is_in_peaceful_area: bool,
    pub is_in_escape_menu: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerInfo {
    pub is_alive: bool,
    pub is_moving: bool,
    pub animation: String,
    pub active_weapon_set: u8,
}

impl Default for PlayerInfo {
    fn default() -> Self {
        Self {
            is_alive: true,
            is_moving: false,
            animation: String::new(),
            active_weapon_set: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vitals {
    pub hp: Vital,
    pub es: Vital,
    pub mana: Vital,
}

/// A pool with a current and maximum value. Serialized with its percentage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, into = "VitalRecord")]
pub struct Vital {
    pub current: f32,
    pub max: f32,
}

impl Vital {
    pub fn percent(&self) -> f32 {
        if self.max > 0.0 {
            self.current / self.max * 100.0
        } else {
            0.0
        }
    }
}

#[derive(Serialize)]
struct VitalRecord {
    current: f32,
    max: f32,
    percent: f32,
}

impl From<Vital> for VitalRecord {
    fn from(vital: Vital) -> Self {
        Self {
            current: vital.current,
            max: vital.max,
            percent: vital.percent(),
        }
    }
}

/// An active buff or debuff. A `total_time` of zero means it does not expire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, into = "StatusEffectRecord")]
pub struct StatusEffect {
    pub time_left: f32,
    pub total_time: f32,
    pub charges: u32,
}

impl StatusEffect {
    pub fn percent_time_left(&self) -> f32 {
        if self.total_time > 0.0 {
            (self.time_left / self.total_time * 100.0).clamp(0.0, 100.0)
        } else {
            100.0
        }
    }
}

#[derive(Serialize)]
struct StatusEffectRecord {
    time_left: f32,
    total_time: f32,
    charges: u32,
    percent_time_left: f32,
}

impl From<StatusEffect> for StatusEffectRecord {
    fn from(effect: StatusEffect) -> Self {
        Self {
            time_left: effect.time_left,
            total_time: effect.total_time,
            charges: effect.charges,
            percent_time_left: effect.percent_time_left(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillInfo {
    pub can_be_used: bool,
    pub is_using: bool,
    pub cooldown: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlaskInfo {
    pub active: bool,
    pub can_be_used: bool,
    pub charges: u32,
    pub max_charges: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonsterRarity {
    #[default]
    Normal,
    Magic,
    Rare,
    Unique,
}

/// A hostile monster near the player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonsterInfo {
    pub rarity: MonsterRarity,
    pub distance: f32,
    pub is_invincible: bool,
    pub buffs: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_ready_to_play() {
        let world: WorldState = serde_json::from_str("{}").unwrap();
        assert!(world.window_focused);
        assert!(world.player.is_alive);
        assert!(!world.area.is_in_town);
    }

    #[test]
    fn test_vitals_serialize_with_percent() {
        let vital = Vital {
            current: 25.0,
            max: 200.0,
        };
        let json = serde_json::to_value(vital).unwrap();
        assert_eq!(json["percent"], 12.5);

        let back: Vital = serde_json::from_value(json).unwrap();
        assert_eq!(back, vital);
        assert_eq!(Vital::default().percent(), 0.0);
    }

    #[test]
    fn test_status_effect_percent() {
        let buff = StatusEffect {
            time_left: 3.0,
            total_time: 4.0,
            charges: 0,
        };
        assert_eq!(buff.percent_time_left(), 75.0);
        assert_eq!(StatusEffect::default().percent_time_left(), 100.0);
    }

    #[test]
    fn test_snapshot_parses_from_json() {
        let world: WorldState = serde_json::from_str(
            r#"{
                "area": { "name": "Hideout", "is_in_hideout": true },
                "vitals": { "hp": { "current": 25, "max": 100 } },
                "buffs": { "onslaught": { "time_left": 2.5, "total_time": 5 } },
                "monsters": [ { "rarity": "rare", "distance": 40 } ],
                "keys_down": ["shift"]
            }"#,
        )
        .unwrap();
        assert!(world.area.is_in_hideout);
        assert_eq!(world.vitals.hp.percent(), 25.0);
        assert!(world.has_buff("onslaught"));
        assert_eq!(world.monsters[0].rarity, MonsterRarity::Rare);
        assert!(world.is_key_down(&Key::new("SHIFT").unwrap()));
    }
}
