//! Quest and item definitions from the project database.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::node::null_as_default;
use super::{ItemId, NodeId, QuestId};

/// Rewards granted when a completed quest is handed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QuestLoot {
    #[serde(default, deserialize_with = "null_as_default")]
    pub xp: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub gold: i64,
    /// Item id -> quantity.
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: BTreeMap<ItemId, i64>,
}

/// A quest definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quest {
    pub id: QuestId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    /// Textual objectives, indexed by the quest step counter.
    #[serde(default, deserialize_with = "null_as_default")]
    pub steps: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub loot: QuestLoot,
    /// Node where the quest is handed in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_scene_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_text: Option<String>,
    #[serde(default)]
    pub is_main_quest: bool,
}

impl Quest {
    pub fn new(id: impl Into<QuestId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            steps: Vec::new(),
            loot: QuestLoot::default(),
            return_scene_id: None,
            presentation_text: None,
            is_main_quest: false,
        }
    }

    pub fn with_loot(mut self, xp: i64, gold: i64) -> Self {
        self.loot.xp = xp;
        self.loot.gold = gold;
        self
    }

    pub fn with_loot_item(mut self, item: impl Into<ItemId>, qty: i64) -> Self {
        self.loot.items.insert(item.into(), qty);
        self
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.steps.push(step.into());
        self
    }

    pub fn returned_at(mut self, node: impl Into<NodeId>) -> Self {
        self.return_scene_id = Some(node.into());
        self
    }

    /// Objective text for a step counter; past the end stays on the last step.
    pub fn step_text(&self, step: usize) -> Option<&str> {
        self.steps
            .get(step)
            .or_else(|| self.steps.last())
            .map(String::as_str)
    }
}

/// An item definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// weapon, armor, potion, quest, misc.
    #[serde(rename = "type", default = "default_item_kind")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default = "default_item_kind")]
    pub icon: String,
    #[serde(default = "default_true")]
    pub stackable: bool,
    /// Stat bonuses granted while equipped, e.g. `{"strength": 5}`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub bonuses: BTreeMap<String, f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub properties: Map<String, Value>,
}

fn default_item_kind() -> String {
    "misc".to_string()
}

fn default_true() -> bool {
    true
}

impl Item {
    pub fn new(id: impl Into<ItemId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: default_item_kind(),
            description: String::new(),
            icon: default_item_kind(),
            stackable: true,
            bonuses: BTreeMap::new(),
            properties: Map::new(),
        }
    }
}
