//! Variable store - the mutable game state read and written by story scripts.
//!
//! Values are plain JSON so that scripts, conditions and save files all share
//! one representation. Every successful [`VariableStore::set`] notifies the
//! registered observers.

mod rpg;

pub use rpg::*;

use serde_json::{json, Map, Value};
use std::fmt;

/// The variable namespace: name -> value.
pub type Variables = Map<String, Value>;

/// Result returned by observers; failures are logged, never propagated.
pub type ObserverResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type Observer = Box<dyn FnMut(&str, &Value) -> ObserverResult>;

/// Well-known variable names.
pub mod keys {
    pub const HEALTH: &str = "health";
    pub const MAX_HEALTH: &str = "max_health";
    pub const GOLD: &str = "gold";
    pub const XP: &str = "xp";
    pub const LEVEL: &str = "level";
    pub const XP_TO_NEXT_LEVEL: &str = "xp_to_next_level";
    pub const INVENTORY: &str = "inventory";
    pub const EQUIPPED: &str = "equipped";
    pub const COMPANIONS: &str = "companions";
    pub const ACTIVE_QUESTS: &str = "active_quests";
    pub const COMPLETED_QUESTS: &str = "completed_quests";
    pub const RETURNED_QUESTS: &str = "returned_quests";
    pub const QUEST_STEPS: &str = "quest_steps";
    pub const ACTIVE_QUEST_OFFER: &str = "active_quest_offer";
    pub const USED_CHOICES: &str = "used_choices";
    pub const NODE_TEXT_OVERRIDES: &str = "node_text_overrides";
    pub const VISIT_COUNTS: &str = "visit_counts";
    pub const PLAYER_COORDINATES: &str = "player_coordinates";
    pub const CURRENT_LOCATION: &str = "current_location";
}

/// Handle returned by [`VariableStore::add_observer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Mutable key/value game state with change notification.
pub struct VariableStore {
    variables: Variables,
    observers: Vec<(ObserverId, Observer)>,
    next_observer: u64,
}

impl fmt::Debug for VariableStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableStore")
            .field("variables", &self.variables)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Default for VariableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableStore {
    /// Create a store seeded with the default game variables.
    pub fn new() -> Self {
        Self {
            variables: Self::default_variables(),
            observers: Vec::new(),
            next_observer: 0,
        }
    }

    /// The fixed default variable set every game starts from.
    pub fn default_variables() -> Variables {
        let defaults = [
            (keys::HEALTH, json!(10)),
            (keys::MAX_HEALTH, json!(10)),
            ("strength", json!(0)),
            ("dexterity", json!(0)),
            ("resistance", json!(0)),
            (keys::GOLD, json!(0)),
            (keys::XP, json!(0)),
            (keys::LEVEL, json!(1)),
            (keys::XP_TO_NEXT_LEVEL, json!(100)),
            (keys::INVENTORY, json!({})),
            (keys::EQUIPPED, json!({})),
            (keys::COMPANIONS, json!([])),
            (keys::ACTIVE_QUESTS, json!([])),
            (keys::COMPLETED_QUESTS, json!([])),
            (keys::RETURNED_QUESTS, json!([])),
            (keys::QUEST_STEPS, json!({})),
            (keys::ACTIVE_QUEST_OFFER, Value::Null),
            (keys::USED_CHOICES, json!([])),
            (keys::NODE_TEXT_OVERRIDES, json!({})),
            (keys::VISIT_COUNTS, json!({})),
            (
                keys::PLAYER_COORDINATES,
                json!({"x": 0.0, "y": 0.0, "continent": "Eldaron"}),
            ),
            (keys::CURRENT_LOCATION, json!("")),
        ];
        defaults
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }

    /// Replace every variable (save loading) and notify observers of each one.
    pub fn load_state(&mut self, variables: Variables) {
        self.variables = variables;
        self.notify_all();
    }

    /// Reset to the defaults overlaid with project-supplied values.
    pub fn merge_defaults(&mut self, overrides: &Variables) {
        let mut variables = Self::default_variables();
        for (name, value) in overrides {
            variables.insert(name.clone(), value.clone());
        }
        self.load_state(variables);
    }

    /// Get a variable.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Get a variable or a fallback value.
    pub fn get_or(&self, name: &str, default: Value) -> Value {
        self.variables.get(name).cloned().unwrap_or(default)
    }

    /// A copy of every variable.
    pub fn get_all(&self) -> Variables {
        self.variables.clone()
    }

    /// Read-only view of the namespace.
    pub fn as_map(&self) -> &Variables {
        &self.variables
    }

    /// Set a variable. Returns `false` (and notifies nobody) when the value is unchanged.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        if self.variables.get(name) == Some(&value) {
            return false;
        }
        self.variables.insert(name.to_string(), value.clone());
        Self::notify(&mut self.observers, name, &value);
        true
    }

    /// Subscribe to variable changes.
    pub fn add_observer<F>(&mut self, observer: F) -> ObserverId
    where
        F: FnMut(&str, &Value) -> ObserverResult + 'static,
    {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Unsubscribe. Returns whether the observer was registered.
    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Notify observers of every current variable.
    pub fn notify_all(&mut self) {
        for (name, value) in &self.variables {
            Self::notify(&mut self.observers, name, value);
        }
    }

    fn notify(observers: &mut [(ObserverId, Observer)], name: &str, value: &Value) {
        for (id, observer) in observers.iter_mut() {
            if let Err(e) = observer(name, value) {
                tracing::warn!("Observer {:?} failed on '{}': {}", id, name, e);
            }
        }
    }

    /// Integer view of a variable; anything non-numeric reads as zero.
    pub fn get_i64(&self, name: &str) -> i64 {
        self.variables.get(name).map(value_as_i64).unwrap_or(0)
    }

    /// Copy of a list variable; anything else reads as empty.
    pub fn get_list(&self, name: &str) -> Vec<Value> {
        match self.variables.get(name) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    }

    /// Copy of an object variable; anything else reads as empty.
    pub fn get_object(&self, name: &str) -> Map<String, Value> {
        match self.variables.get(name) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }

    pub(crate) fn list_contains(&self, name: &str, id: &str) -> bool {
        matches!(
            self.variables.get(name),
            Some(Value::Array(items)) if items.iter().any(|v| v.as_str() == Some(id))
        )
    }
}

/// Numeric coercion used by the helpers: floats truncate, everything else is zero.
pub fn value_as_i64(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording_store() -> (VariableStore, Rc<RefCell<Vec<(String, Value)>>>) {
        let mut store = VariableStore::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        store.add_observer(move |name, value| {
            sink.borrow_mut().push((name.to_string(), value.clone()));
            Ok(())
        });
        (store, log)
    }

    #[test]
    fn test_defaults_present() {
        let store = VariableStore::new();
        assert_eq!(store.get_i64(keys::HEALTH), 10);
        assert_eq!(store.get_i64(keys::LEVEL), 1);
        assert!(store.get_list(keys::ACTIVE_QUESTS).is_empty());
        assert!(store.get_object(keys::INVENTORY).is_empty());
    }

    #[test]
    fn test_set_then_get() {
        let mut store = VariableStore::new();
        assert!(store.set("gold", 42));
        assert_eq!(store.get("gold"), Some(&json!(42)));
        assert_eq!(store.get_or("missing", json!("x")), json!("x"));
    }

    #[test]
    fn test_equal_value_does_not_notify() {
        let (mut store, log) = recording_store();

        store.set("gold", 5);
        assert_eq!(log.borrow().len(), 1);

        assert!(!store.set("gold", 5));
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_failing_observer_is_contained() {
        let (mut store, log) = recording_store();
        store.add_observer(|_, _| Err("boom".into()));

        assert!(store.set("gold", 1));
        assert_eq!(store.get_i64("gold"), 1);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_remove_observer() {
        let (mut store, log) = recording_store();
        let extra = store.add_observer(|_, _| Ok(()));
        assert_eq!(store.observer_count(), 2);
        assert!(store.remove_observer(extra));
        assert!(!store.remove_observer(extra));

        store.set("gold", 3);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_get_all_is_a_copy() {
        let mut store = VariableStore::new();
        let mut snapshot = store.get_all();
        snapshot.insert("gold".to_string(), json!(999));
        assert_eq!(store.get_i64("gold"), 0);

        store.set("gold", 1);
        assert_eq!(snapshot.get("gold"), Some(&json!(999)));
    }

    #[test]
    fn test_load_state_notifies_every_variable() {
        let (mut store, log) = recording_store();
        let mut state = Variables::new();
        state.insert("a".to_string(), json!(1));
        state.insert("b".to_string(), json!(2));

        store.load_state(state);
        assert_eq!(log.borrow().len(), 2);
        assert!(store.get(keys::HEALTH).is_none());
    }

    #[test]
    fn test_merge_defaults_overlays_project_values() {
        let mut store = VariableStore::new();
        store.set("gold", 77);

        let mut overrides = Variables::new();
        overrides.insert("health".to_string(), json!(25));
        overrides.insert("player_name".to_string(), json!("Arthur"));
        store.merge_defaults(&overrides);

        assert_eq!(store.get_i64("health"), 25);
        assert_eq!(store.get_i64("gold"), 0);
        assert_eq!(store.get("player_name"), Some(&json!("Arthur")));
    }

    #[test]
    fn test_value_as_i64() {
        assert_eq!(value_as_i64(&json!(3)), 3);
        assert_eq!(value_as_i64(&json!(3.9)), 3);
        assert_eq!(value_as_i64(&json!("3")), 0);
        assert_eq!(value_as_i64(&json!(true)), 1);
    }
}
