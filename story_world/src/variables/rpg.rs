//! Typed helpers over the raw variable map: inventory, quests, progression,
//! one-shot bookkeeping.
//!
//! Each helper copies the collection it touches, edits the copy and writes it
//! back through [`VariableStore::set`], so observers see every change and no
//! caller ever holds an alias into the store. Malformed values read as empty.

use serde_json::{json, Value};

use super::{keys, value_as_i64, VariableStore};
use crate::graph::{ChoiceId, ItemId, NodeId, QuestId};

/// Where a quest currently sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestStatus {
    Unknown,
    Active,
    Completed,
    Returned,
}

impl VariableStore {
    // --- Inventory ---

    /// Add `qty` of an item. The count never drops below zero; zero removes the entry.
    pub fn add_item(&mut self, item_id: &ItemId, qty: i64) {
        let mut inventory = self.get_object(keys::INVENTORY);
        let current = inventory.get(item_id.as_str()).map(value_as_i64).unwrap_or(0);
        let updated = current.saturating_add(qty).max(0);
        if updated == 0 {
            inventory.remove(item_id.as_str());
        } else {
            inventory.insert(item_id.to_string(), json!(updated));
        }
        self.set(keys::INVENTORY, inventory);
        tracing::debug!("Added item {} x{} (now {})", item_id, qty, updated);
    }

    /// Remove `qty` of an item if present.
    pub fn remove_item(&mut self, item_id: &ItemId, qty: i64) {
        let mut inventory = self.get_object(keys::INVENTORY);
        let Some(current) = inventory.get(item_id.as_str()).map(value_as_i64) else {
            return;
        };
        let updated = current.saturating_sub(qty).max(0);
        if updated == 0 {
            inventory.remove(item_id.as_str());
        } else {
            inventory.insert(item_id.to_string(), json!(updated));
        }
        self.set(keys::INVENTORY, inventory);
        tracing::debug!("Removed item {} x{} (now {})", item_id, qty, updated);
    }

    pub fn item_count(&self, item_id: &ItemId) -> i64 {
        self.get_object(keys::INVENTORY)
            .get(item_id.as_str())
            .map(value_as_i64)
            .unwrap_or(0)
    }

    /// Equip an owned item into a slot. Returns `false` if the item is not in the inventory.
    pub fn equip_item(&mut self, item_id: &ItemId, slot: &str) -> bool {
        if self.item_count(item_id) <= 0 {
            tracing::warn!("Cannot equip {}: not in inventory", item_id);
            return false;
        }
        let mut equipped = self.get_object(keys::EQUIPPED);
        equipped.insert(slot.to_string(), json!(item_id.as_str()));
        self.set(keys::EQUIPPED, equipped);
        true
    }

    /// Empty a slot, returning the item that was in it.
    pub fn unequip_item(&mut self, slot: &str) -> Option<ItemId> {
        let mut equipped = self.get_object(keys::EQUIPPED);
        let removed = equipped.remove(slot)?;
        self.set(keys::EQUIPPED, equipped);
        removed.as_str().map(ItemId::from)
    }

    // --- Progression ---

    /// Gain experience, levelling up (and healing) as thresholds are crossed.
    pub fn add_xp(&mut self, amount: i64) {
        if amount <= 0 {
            return;
        }
        let mut xp = self.get_i64(keys::XP).saturating_add(amount);
        let mut level = self.get_i64(keys::LEVEL).max(1);
        let mut needed = self.get_i64(keys::XP_TO_NEXT_LEVEL);
        if needed <= 0 {
            needed = level.saturating_mul(100);
        }
        let mut levelled = false;
        while xp >= needed {
            xp -= needed;
            level = level.saturating_add(1);
            needed = level.saturating_mul(100);
            levelled = true;
        }
        self.set(keys::XP, xp);
        self.set(keys::LEVEL, level);
        self.set(keys::XP_TO_NEXT_LEVEL, needed);
        if levelled {
            let max_health = self.get_i64(keys::MAX_HEALTH);
            self.set(keys::HEALTH, max_health);
            tracing::info!("Level up: now level {}", level);
        }
    }

    /// Add (or with a negative amount, spend) gold; never below zero.
    pub fn add_gold(&mut self, amount: i64) {
        let gold = self.get_i64(keys::GOLD).saturating_add(amount).max(0);
        self.set(keys::GOLD, gold);
    }

    // --- Quests ---

    pub fn quest_status(&self, quest_id: &QuestId) -> QuestStatus {
        let id = quest_id.as_str();
        if self.list_contains(keys::RETURNED_QUESTS, id) {
            QuestStatus::Returned
        } else if self.list_contains(keys::COMPLETED_QUESTS, id) {
            QuestStatus::Completed
        } else if self.list_contains(keys::ACTIVE_QUESTS, id) {
            QuestStatus::Active
        } else {
            QuestStatus::Unknown
        }
    }

    /// Whether the quest is in any of the active/completed/returned lists.
    pub fn is_quest_known(&self, quest_id: &QuestId) -> bool {
        self.quest_status(quest_id) != QuestStatus::Unknown
    }

    /// Start a quest. No-op if it was ever started.
    pub fn start_quest(&mut self, quest_id: &QuestId) -> bool {
        if self.is_quest_known(quest_id) {
            return false;
        }
        let mut active = self.get_list(keys::ACTIVE_QUESTS);
        active.push(json!(quest_id.as_str()));
        self.set(keys::ACTIVE_QUESTS, active);

        let mut steps = self.get_object(keys::QUEST_STEPS);
        steps.insert(quest_id.to_string(), json!(0));
        self.set(keys::QUEST_STEPS, steps);

        tracing::info!("Quest started: {}", quest_id);
        true
    }

    /// Advance an active quest's step counter.
    pub fn advance_quest_step(&mut self, quest_id: &QuestId) -> bool {
        if !self.list_contains(keys::ACTIVE_QUESTS, quest_id.as_str()) {
            return false;
        }
        let mut steps = self.get_object(keys::QUEST_STEPS);
        let current = steps.get(quest_id.as_str()).map(value_as_i64).unwrap_or(0);
        steps.insert(quest_id.to_string(), json!(current.saturating_add(1)));
        self.set(keys::QUEST_STEPS, steps);
        true
    }

    pub fn quest_step(&self, quest_id: &QuestId) -> Option<i64> {
        self.get_object(keys::QUEST_STEPS)
            .get(quest_id.as_str())
            .map(value_as_i64)
    }

    /// Move an active quest to completed.
    pub fn complete_quest(&mut self, quest_id: &QuestId) -> bool {
        if !self.move_quest(quest_id, keys::ACTIVE_QUESTS, keys::COMPLETED_QUESTS) {
            return false;
        }
        tracing::info!("Quest completed: {}", quest_id);
        true
    }

    /// Move a completed quest to returned.
    pub fn return_quest(&mut self, quest_id: &QuestId) -> bool {
        if !self.move_quest(quest_id, keys::COMPLETED_QUESTS, keys::RETURNED_QUESTS) {
            return false;
        }
        tracing::info!("Quest returned: {}", quest_id);
        true
    }

    fn move_quest(&mut self, quest_id: &QuestId, from: &str, to: &str) -> bool {
        let id = quest_id.as_str();
        if !self.list_contains(from, id) {
            return false;
        }
        let mut source = self.get_list(from);
        source.retain(|v| v.as_str() != Some(id));
        self.set(from, source);

        let mut target = self.get_list(to);
        if !target.iter().any(|v| v.as_str() == Some(id)) {
            target.push(json!(id));
            self.set(to, target);
        }
        true
    }

    /// Offer a quest to the player (the UI shows the offer panel).
    pub fn show_quest_offer(&mut self, quest_id: &QuestId) {
        self.set(keys::ACTIVE_QUEST_OFFER, quest_id.as_str());
    }

    pub fn hide_quest_offer(&mut self) {
        self.set(keys::ACTIVE_QUEST_OFFER, Value::Null);
    }

    // --- One-shot and visit bookkeeping ---

    pub fn mark_choice_used(&mut self, choice_id: &ChoiceId) {
        if self.is_choice_used(choice_id) {
            return;
        }
        let mut used = self.get_list(keys::USED_CHOICES);
        used.push(json!(choice_id.as_str()));
        self.set(keys::USED_CHOICES, used);
    }

    pub fn is_choice_used(&self, choice_id: &ChoiceId) -> bool {
        self.list_contains(keys::USED_CHOICES, choice_id.as_str())
    }

    /// Override a node's text for the rest of the playthrough.
    pub fn set_node_text(&mut self, node_id: &NodeId, text: &str) {
        let mut overrides = self.get_object(keys::NODE_TEXT_OVERRIDES);
        overrides.insert(node_id.to_string(), json!(text));
        self.set(keys::NODE_TEXT_OVERRIDES, overrides);
    }

    pub fn get_node_text(&self, node_id: &NodeId) -> Option<String> {
        self.get_object(keys::NODE_TEXT_OVERRIDES)
            .get(node_id.as_str())
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn clear_node_text(&mut self, node_id: &NodeId) {
        let mut overrides = self.get_object(keys::NODE_TEXT_OVERRIDES);
        if overrides.remove(node_id.as_str()).is_some() {
            self.set(keys::NODE_TEXT_OVERRIDES, overrides);
        }
    }

    /// Count a visit and return the new total.
    pub fn increment_visit_count(&mut self, node_id: &NodeId) -> i64 {
        let mut visits = self.get_object(keys::VISIT_COUNTS);
        let count = visits
            .get(node_id.as_str())
            .map(value_as_i64)
            .unwrap_or(0)
            .saturating_add(1);
        visits.insert(node_id.to_string(), json!(count));
        self.set(keys::VISIT_COUNTS, visits);
        count
    }

    pub fn get_visit_count(&self, node_id: &NodeId) -> i64 {
        self.get_object(keys::VISIT_COUNTS)
            .get(node_id.as_str())
            .map(value_as_i64)
            .unwrap_or(0)
    }

    // --- Position ---

    pub fn set_player_coordinates(&mut self, x: f64, y: f64, continent: &str) {
        self.set(
            keys::PLAYER_COORDINATES,
            json!({"x": x, "y": y, "continent": continent}),
        );
    }
}
