use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    domain::SKILLS,
    state::{Count, map_or_default, or_default},
};

/// A character as persisted in the container.
///
/// Only the fields the migrations and the roster care about are typed; the
/// rest of the record round-trips through `extra` untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    #[serde(default, deserialize_with = "or_default")]
    pub name: String,
    #[serde(default, deserialize_with = "or_default")]
    pub class: String,
    #[serde(default)]
    pub level: Count,
    #[serde(default, deserialize_with = "map_or_default")]
    pub skills: BTreeMap<String, Count>,
    #[serde(default, deserialize_with = "map_or_default")]
    pub constellations: BTreeMap<String, bool>,
    #[serde(default, deserialize_with = "map_or_default")]
    pub star_signs: BTreeMap<String, bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Character {
    pub fn skill_level(&self, skill: &str) -> u64 {
        self.skills.get(skill).map_or(0, Count::as_u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterView {
    pub name: String,
    pub class: String,
    pub level: u64,
    pub total_skill_levels: u64,
    pub star_signs_equipped: usize,
    pub constellations_completed: usize,
}

impl CharacterView {
    fn from_raw(raw: &Character) -> Self {
        Self {
            name: raw.name.clone(),
            class: raw.class.clone(),
            level: raw.level.as_u64(),
            total_skill_levels: SKILLS
                .iter()
                .map(|skill| raw.skill_level(skill))
                .fold(0, u64::saturating_add),
            star_signs_equipped: raw.star_signs.values().filter(|on| **on).count(),
            constellations_completed: raw.constellations.values().filter(|done| **done).count(),
        }
    }
}

/// Derived views of the stored characters, rebuilt whenever the container is
/// replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    characters: Vec<CharacterView>,
}

impl Roster {
    pub fn from_raw(chars: &[Character]) -> Self {
        Self {
            characters: chars.iter().map(CharacterView::from_raw).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CharacterView> {
        self.characters.iter()
    }

    pub fn get(&self, name: &str) -> Option<&CharacterView> {
        self.characters.iter().find(|c| c.name == name)
    }
}
