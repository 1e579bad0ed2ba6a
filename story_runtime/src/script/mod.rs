//! Script/condition engine.
//!
//! Interpolates `${name}` references into text, evaluates conditions with the
//! restricted grammar in [`expr`], and applies [`StoryEvent`]s to a
//! [`VariableStore`]. Nothing here fails loudly: malformed conditions read as
//! `false`, malformed or unknown events are logged and skipped.

mod events;
pub mod expr;
pub mod macros;

pub use events::*;
pub use expr::{is_truthy, Namespace};
pub use macros::MacroCall;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{json, Value};
use story_world::{keys, EventSpec, Project, QuestId, ScriptEntry, VariableStore, Variables};
use thiserror::Error;

/// Errors raised while parsing or running scripts.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("unknown event type: {0}")]
    UnknownEvent(String),

    #[error("event '{event}' is missing parameter '{parameter}'")]
    MissingParameter { event: String, parameter: String },

    #[error("event '{event}' has invalid '{parameter}': {value}")]
    InvalidParameter {
        event: String,
        parameter: String,
        value: String,
    },

    #[error("malformed macro: {0}")]
    MalformedMacro(String),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

static INTERPOLATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{\s*([A-Za-z_]\w*)\s*\}").expect("interpolation pattern is valid")
});

/// A quoted literal, or a `${name}` / `$name` reference outside one.
static SIGIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"'(?:[^'\\]|\\.)*'|"(?:[^"\\]|\\.)*"|\$\{\s*([A-Za-z_]\w*)\s*\}|\$([A-Za-z_]\w*)"#,
    )
    .expect("sigil pattern is valid")
});

/// `${gold}` and `$gold` both become `gold`; quoted literals are left alone.
pub fn strip_sigils(condition: &str) -> String {
    SIGIL
        .replace_all(condition, |caps: &Captures| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .map_or(&caps[0], |name| name.as_str())
                .to_string()
        })
        .into_owned()
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Stateless interpreter over a borrowed store.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptEngine;

impl ScriptEngine {
    pub fn new() -> Self {
        Self
    }

    /// Replace every `${name}`; `extra` wins over store variables and
    /// unresolved names render as `ERR:<name>`.
    pub fn parse_text(&self, store: &VariableStore, text: &str, extra: Option<&Variables>) -> String {
        let namespace = Namespace::new(store.as_map(), extra);
        INTERPOLATION
            .replace_all(text, |caps: &Captures| match namespace.lookup(&caps[1]) {
                Some(value) => render(value),
                None => format!("ERR:{}", &caps[1]),
            })
            .into_owned()
    }

    /// Evaluate a condition, failing closed. Blank conditions are `true`.
    pub fn evaluate_condition(
        &self,
        store: &VariableStore,
        condition: &str,
        extra: Option<&Variables>,
    ) -> bool {
        match self.try_evaluate(store, condition, extra) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Condition '{}' evaluated as false: {}", condition, e);
                false
            }
        }
    }

    /// Like [`evaluate_condition`](Self::evaluate_condition) but reports why evaluation failed.
    pub fn try_evaluate(
        &self,
        store: &VariableStore,
        condition: &str,
        extra: Option<&Variables>,
    ) -> Result<bool, ScriptError> {
        if condition.trim().is_empty() {
            return Ok(true);
        }
        let normalized = strip_sigils(condition);
        let value = expr::evaluate(&normalized, &Namespace::new(store.as_map(), extra))?;
        Ok(is_truthy(&value))
    }

    /// Run structured events in order, skipping the ones that fail.
    pub fn execute_events(
        &self,
        store: &mut VariableStore,
        project: Option<&Project>,
        events: &[EventSpec],
    ) {
        for spec in events {
            let result = StoryEvent::from_spec(spec).and_then(|event| self.apply(store, project, &event));
            if let Err(e) = result {
                tracing::warn!("Skipping event '{}': {}", spec.kind, e);
            }
        }
    }

    /// Run an `on_enter` / `on_exit` array of mixed entry shapes.
    pub fn execute_entries(
        &self,
        store: &mut VariableStore,
        project: Option<&Project>,
        entries: &[ScriptEntry],
    ) {
        for entry in entries {
            match entry {
                ScriptEntry::Event(spec) => {
                    self.execute_events(store, project, std::slice::from_ref(spec))
                }
                ScriptEntry::Command(command) => {
                    let result = StoryEvent::from_command(command)
                        .and_then(|event| self.apply(store, project, &event));
                    if let Err(e) = result {
                        tracing::warn!("Skipping command '{}': {}", command.command, e);
                    }
                }
                ScriptEntry::Line(line) => self.execute_line(store, project, line),
                ScriptEntry::Unknown(value) => {
                    tracing::warn!("Ignoring unrecognised script entry: {}", value);
                }
            }
        }
    }

    /// Run legacy `<<command "arg" arg2>>` lines.
    pub fn execute_script<S: AsRef<str>>(
        &self,
        store: &mut VariableStore,
        project: Option<&Project>,
        lines: &[S],
    ) {
        for line in lines {
            self.execute_line(store, project, line.as_ref());
        }
    }

    fn execute_line(&self, store: &mut VariableStore, project: Option<&Project>, line: &str) {
        let calls = match macros::parse_line(line) {
            Ok(calls) => calls,
            Err(e) => {
                tracing::warn!("Skipping script line '{}': {}", line, e);
                return;
            }
        };
        for call in &calls {
            let result = StoryEvent::from_macro(call).and_then(|event| self.apply(store, project, &event));
            if let Err(e) = result {
                tracing::warn!("Skipping macro '{}': {}", call.name, e);
            }
        }
    }

    /// Apply one event to the store.
    pub fn apply(
        &self,
        store: &mut VariableStore,
        project: Option<&Project>,
        event: &StoryEvent,
    ) -> Result<(), ScriptError> {
        tracing::debug!("Applying {:?}", event);
        match event {
            StoryEvent::Set { name, value } => {
                store.set(name, value.clone());
            }
            StoryEvent::Adjust { name, delta } => {
                let current = store.get_or(name, json!(0));
                let sum = expr::add_values(current, delta.clone())?;
                store.set(name, sum);
            }
            StoryEvent::Toggle { name } => {
                let current = store.get(name).is_some_and(is_truthy);
                store.set(name, !current);
            }
            StoryEvent::AddItem { item_id, qty } => store.add_item(item_id, *qty),
            StoryEvent::RemoveItem { item_id, qty } => store.remove_item(item_id, *qty),
            StoryEvent::StartQuest(id) => {
                store.start_quest(id);
                if store.get(keys::ACTIVE_QUEST_OFFER).and_then(Value::as_str) == Some(id.as_str()) {
                    store.hide_quest_offer();
                }
            }
            StoryEvent::AdvanceQuest(id) => {
                store.advance_quest_step(id);
            }
            StoryEvent::CompleteQuest(id) => {
                store.complete_quest(id);
            }
            StoryEvent::ShowQuest(id) => store.show_quest_offer(id),
            StoryEvent::ReturnQuest(id) => self.return_quest(store, project, id),
            StoryEvent::AddXp(amount) => store.add_xp(*amount),
            StoryEvent::AddGold(amount) => store.add_gold(*amount),
            StoryEvent::SetCoordinates { x, y, continent } => {
                let continent = continent.clone().unwrap_or_else(|| {
                    store
                        .get_object(keys::PLAYER_COORDINATES)
                        .get("continent")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                });
                store.set_player_coordinates(*x, *y, &continent);
            }
        }
        Ok(())
    }

    /// Hand in a quest, then grant its loot.
    ///
    /// XP is written straight to the `xp` variable without levelling.
    fn return_quest(&self, store: &mut VariableStore, project: Option<&Project>, id: &QuestId) {
        if !store.return_quest(id) {
            tracing::debug!("Quest {} is not completed; nothing to return", id);
            return;
        }
        let Some(quest) = project.and_then(|p| p.quest(id)) else {
            tracing::debug!("No loot table for quest {}", id);
            return;
        };

        let loot = &quest.loot;
        if loot.xp != 0 {
            let xp = store.get_i64(keys::XP).saturating_add(loot.xp);
            store.set(keys::XP, xp);
        }
        if loot.gold != 0 {
            store.add_gold(loot.gold);
        }
        for (item_id, qty) in &loot.items {
            store.add_item(item_id, *qty);
        }
        tracing::info!(
            "Granted loot for '{}': {} xp, {} gold, {} item kinds",
            quest.title,
            loot.xp,
            loot.gold,
            loot.items.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use story_world::{CommandSpec, ItemId, Quest, QuestStatus};

    fn engine_and_store() -> (ScriptEngine, VariableStore) {
        (ScriptEngine::new(), VariableStore::new())
    }

    #[test]
    fn test_parse_text() {
        let (engine, mut store) = engine_and_store();
        store.set("player_name", "Arthur");

        let extra: Variables = [("visits".to_string(), json!(2))].into_iter().collect();
        let text = engine.parse_text(
            &store,
            "Hello ${player_name}, gold: ${gold}, visit ${ visits }, ${missing}",
            Some(&extra),
        );
        assert_eq!(text, "Hello Arthur, gold: 0, visit 2, ERR:missing");
    }

    #[test]
    fn test_extra_context_wins() {
        let (engine, store) = engine_and_store();
        let extra: Variables = [("gold".to_string(), json!(99))].into_iter().collect();
        assert_eq!(engine.parse_text(&store, "${gold}", Some(&extra)), "99");
        assert!(engine.evaluate_condition(&store, "gold > 50", Some(&extra)));
    }

    #[test]
    fn test_condition_with_sigils() {
        let (engine, mut store) = engine_and_store();
        store.set("gold", 5);
        assert!(!engine.evaluate_condition(&store, "$gold >= 10", None));

        store.set("gold", 10);
        assert!(engine.evaluate_condition(&store, "$gold >= 10", None));
        assert!(engine.evaluate_condition(&store, "${gold} >= 10", None));
        assert!(engine.evaluate_condition(&store, "gold >= 10", None));
    }

    #[test]
    fn test_condition_fails_closed() {
        let (engine, store) = engine_and_store();
        assert!(engine.evaluate_condition(&store, "", None));
        assert!(engine.evaluate_condition(&store, "   ", None));
        assert!(!engine.evaluate_condition(&store, "undefined_flag", None));
        assert!(!engine.evaluate_condition(&store, "__import__('os').system('ls')", None));
        assert!(matches!(
            engine.try_evaluate(&store, "gold >=", None),
            Err(ScriptError::Syntax(_))
        ));
    }

    #[test]
    fn test_execute_events_skips_unknown() {
        let (engine, mut store) = engine_and_store();
        let events = vec![
            EventSpec::new("teleport"),
            EventSpec::new("add_item").with_param("item_id", "sword"),
            EventSpec::new("startQuest").with_param("quest_id", "q1"),
            EventSpec::new("advance_quest").with_param("id", "q1"),
        ];

        engine.execute_events(&mut store, None, &events);

        assert_eq!(store.item_count(&ItemId::from("sword")), 1);
        assert_eq!(store.quest_step(&QuestId::from("q1")), Some(1));
    }

    #[test]
    fn test_mixed_entries() {
        let (engine, mut store) = engine_and_store();
        store.set("gold", 10);
        let entries = vec![
            ScriptEntry::Command(CommandSpec {
                command: "sub".to_string(),
                var: "gold".to_string(),
                value: json!(3),
            }),
            ScriptEntry::Command(CommandSpec {
                command: "toggle".to_string(),
                var: "is_night".to_string(),
                value: Value::Null,
            }),
            ScriptEntry::Line(r#"<<addItem "healing potion" 2>> <<addGold 5>>"#.to_string()),
            ScriptEntry::Line("<<unknownMacro 1>>".to_string()),
            ScriptEntry::Unknown(json!(42)),
        ];

        engine.execute_entries(&mut store, None, &entries);

        assert_eq!(store.get_i64("gold"), 12);
        assert_eq!(store.get("is_night"), Some(&json!(true)));
        assert_eq!(store.item_count(&ItemId::from("healing potion")), 2);
    }

    #[test]
    fn test_adjust_non_numeric_is_an_error() {
        let (engine, mut store) = engine_and_store();
        store.set("title", "Sir");
        let event = StoryEvent::Adjust {
            name: "title".to_string(),
            delta: json!(1),
        };
        assert!(engine.apply(&mut store, None, &event).is_err());
        assert_eq!(store.get("title"), Some(&json!("Sir")));
    }

    #[test]
    fn test_show_and_start_quest_offer() {
        let (engine, mut store) = engine_and_store();
        engine.execute_script(&mut store, None, &[r#"<<showQuest "q1">>"#]);
        assert_eq!(store.get(keys::ACTIVE_QUEST_OFFER), Some(&json!("q1")));

        engine.execute_script(&mut store, None, &[r#"<<startQuest "q1">>"#]);
        assert_eq!(store.get(keys::ACTIVE_QUEST_OFFER), Some(&Value::Null));
        assert_eq!(store.quest_status(&QuestId::from("q1")), QuestStatus::Active);
    }

    #[test]
    fn test_return_quest_grants_loot_once() {
        let (engine, mut store) = engine_and_store();
        let mut project = Project::new();
        project.add_quest(
            Quest::new("q1", "Lost Ring")
                .with_loot(150, 25)
                .with_loot_item("ring", 1),
        );
        let id = QuestId::from("q1");
        let hand_in = StoryEvent::ReturnQuest(id.clone());

        // Not completed yet: nothing happens.
        engine.apply(&mut store, Some(&project), &hand_in).unwrap();
        assert_eq!(store.get_i64(keys::GOLD), 0);

        store.start_quest(&id);
        store.complete_quest(&id);
        engine.apply(&mut store, Some(&project), &hand_in).unwrap();
        engine.apply(&mut store, Some(&project), &hand_in).unwrap();

        assert_eq!(store.quest_status(&id), QuestStatus::Returned);
        assert_eq!(store.get_i64(keys::XP), 150);
        assert_eq!(store.get_i64(keys::LEVEL), 1);
        assert_eq!(store.get_i64(keys::GOLD), 25);
        assert_eq!(store.item_count(&ItemId::from("ring")), 1);
    }

    #[test]
    fn test_return_quest_loot_saturates() {
        let (engine, mut store) = engine_and_store();
        let mut project = Project::new();
        project.add_quest(Quest::new("q1", "Dragon Hoard").with_loot(i64::MAX, i64::MAX));
        let id = QuestId::from("q1");
        store.set(keys::XP, 10);
        store.start_quest(&id);
        store.complete_quest(&id);

        engine.apply(&mut store, Some(&project), &StoryEvent::ReturnQuest(id)).unwrap();
        assert_eq!(store.get_i64(keys::XP), i64::MAX);
        assert_eq!(store.get_i64(keys::GOLD), i64::MAX);
    }

    #[test]
    fn test_return_quest_without_project() {
        let (engine, mut store) = engine_and_store();
        let id = QuestId::from("q1");
        store.start_quest(&id);
        store.complete_quest(&id);

        engine.apply(&mut store, None, &StoryEvent::ReturnQuest(id.clone())).unwrap();
        assert_eq!(store.quest_status(&id), QuestStatus::Returned);
        assert_eq!(store.get_i64(keys::XP), 0);
    }

    #[test]
    fn test_set_coordinates_keeps_continent() {
        let (engine, mut store) = engine_and_store();
        engine.execute_script(&mut store, None, &["<<setcoords 3 4>>"]);
        assert_eq!(
            store.get(keys::PLAYER_COORDINATES),
            Some(&json!({"x": 3.0, "y": 4.0, "continent": "Eldaron"}))
        );
    }

    proptest! {
        #[test]
        fn prop_any_condition_yields_a_bool(condition in "\\PC{0,40}") {
            let (engine, store) = engine_and_store();
            // Must never panic, whatever the author typed.
            let _ = engine.evaluate_condition(&store, &condition, None);
        }

        #[test]
        fn prop_integer_comparisons_match_rust(a in -1000i64..1000, b in -1000i64..1000) {
            let (engine, mut store) = engine_and_store();
            store.set("a", a);
            store.set("b", b);
            prop_assert_eq!(engine.evaluate_condition(&store, "$a < $b", None), a < b);
            prop_assert_eq!(
                engine.evaluate_condition(&store, &format!("a + b == {}", a + b), None),
                true
            );
        }
    }

    #[test]
    fn test_strip_sigils() {
        assert_eq!(strip_sigils("$gold >= ${min_gold}"), "gold >= min_gold");
        assert_eq!(strip_sigils("$has_key and not $is_dead"), "has_key and not is_dead");
        assert_eq!(strip_sigils("'$5' in prices"), "'$5' in prices");
        assert_eq!(strip_sigils("$title == '$boss'"), "title == '$boss'");
        assert_eq!(strip_sigils(r#"$a + "${b}""#), r#"a + "${b}""#);
    }

    #[test]
    fn test_quoted_sigil_is_compared_literally() {
        let (engine, mut store) = engine_and_store();
        store.set("title", "$boss");
        assert!(engine.evaluate_condition(&store, "$title == '$boss'", None));

        store.set("title", "boss");
        assert!(!engine.evaluate_condition(&store, "$title == '$boss'", None));
    }
}
