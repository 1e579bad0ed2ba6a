//! The closed set of story events.
//!
//! Authored data reaches the engine in three shapes: structured
//! `{type, parameters}` events, `{command, var, value}` objects and legacy
//! `<<macro>>` lines. All three are normalized here, so aliases such as
//! `add_item` / `addItem` are resolved once and dispatch only ever sees a
//! [`StoryEvent`].

use serde_json::{Map, Value};
use story_world::{value_as_i64, CommandSpec, EventSpec, ItemId, QuestId};

use super::macros::MacroCall;
use super::ScriptError;

/// A side effect on the variable store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoryEvent {
    /// Assign a raw value.
    Set { name: String, value: Value },
    /// Add a numeric delta (`sub` commands arrive negated).
    Adjust { name: String, delta: Value },
    /// Flip a flag.
    Toggle { name: String },
    AddItem { item_id: ItemId, qty: i64 },
    RemoveItem { item_id: ItemId, qty: i64 },
    StartQuest(QuestId),
    AdvanceQuest(QuestId),
    CompleteQuest(QuestId),
    ShowQuest(QuestId),
    /// Hand in a completed quest and grant its loot.
    ReturnQuest(QuestId),
    AddXp(i64),
    AddGold(i64),
    SetCoordinates {
        x: f64,
        y: f64,
        continent: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Set,
    AddItem,
    RemoveItem,
    StartQuest,
    AdvanceQuest,
    CompleteQuest,
    ShowQuest,
    ReturnQuest,
    AddXp,
    AddGold,
    SetCoordinates,
}

impl Kind {
    /// camelCase and snake_case spellings resolve to the same kind.
    fn from_name(name: &str) -> Option<Self> {
        let key: String = name
            .chars()
            .filter(|c| *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        Some(match key.as_str() {
            "set" | "setvar" => Kind::Set,
            "additem" => Kind::AddItem,
            "removeitem" => Kind::RemoveItem,
            "startquest" => Kind::StartQuest,
            "advancequest" => Kind::AdvanceQuest,
            "completequest" => Kind::CompleteQuest,
            "showquest" => Kind::ShowQuest,
            "returnquest" => Kind::ReturnQuest,
            "addxp" | "addexp" => Kind::AddXp,
            "addgold" => Kind::AddGold,
            "setcoords" | "setcoordinates" => Kind::SetCoordinates,
            _ => return None,
        })
    }

    /// Parameter names for positional macro arguments.
    fn positional(self) -> &'static [&'static str] {
        match self {
            Kind::Set => &["name", "value"],
            Kind::AddItem | Kind::RemoveItem => &["item_id", "qty"],
            Kind::StartQuest
            | Kind::AdvanceQuest
            | Kind::CompleteQuest
            | Kind::ShowQuest
            | Kind::ReturnQuest => &["quest_id"],
            Kind::AddXp | Kind::AddGold => &["amount"],
            Kind::SetCoordinates => &["x", "y", "continent"],
        }
    }
}

/// Named-parameter lookup with aliases.
struct Params<'a> {
    event: &'a str,
    map: &'a Map<String, Value>,
}

impl<'a> Params<'a> {
    fn find(&self, names: &[&str]) -> Option<&'a Value> {
        names
            .iter()
            .filter_map(|name| self.map.get(*name))
            .find(|value| !value.is_null())
    }

    fn missing(&self, names: &[&str]) -> ScriptError {
        ScriptError::MissingParameter {
            event: self.event.to_string(),
            parameter: names[0].to_string(),
        }
    }

    fn invalid(&self, names: &[&str], value: &Value) -> ScriptError {
        ScriptError::InvalidParameter {
            event: self.event.to_string(),
            parameter: names[0].to_string(),
            value: value.to_string(),
        }
    }

    /// A non-blank identifier; numbers are accepted and stringified.
    fn id(&self, names: &[&str]) -> Result<String, ScriptError> {
        let value = self.find(names).ok_or_else(|| self.missing(names))?;
        let id = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return Err(self.invalid(names, value)),
        };
        if id.is_empty() {
            return Err(self.missing(names));
        }
        Ok(id)
    }

    fn int_or(&self, names: &[&str], default: i64) -> Result<i64, ScriptError> {
        match self.find(names) {
            None => Ok(default),
            Some(value) => as_int(value).ok_or_else(|| self.invalid(names, value)),
        }
    }

    fn int(&self, names: &[&str]) -> Result<i64, ScriptError> {
        let value = self.find(names).ok_or_else(|| self.missing(names))?;
        as_int(value).ok_or_else(|| self.invalid(names, value))
    }

    fn float(&self, names: &[&str]) -> Result<f64, ScriptError> {
        let value = self.find(names).ok_or_else(|| self.missing(names))?;
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| self.invalid(names, value))
    }

    fn text(&self, names: &[&str]) -> Option<String> {
        self.find(names).and_then(Value::as_str).map(str::to_string)
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(_) | Value::Bool(_) => Some(value_as_i64(value)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

const ITEM: &[&str] = &["item_id", "item", "id"];
const QTY: &[&str] = &["qty", "quantity"];
const QUEST: &[&str] = &["quest_id", "quest", "id"];
const NAME: &[&str] = &["name", "var", "variable"];
const AMOUNT: &[&str] = &["amount", "value", "xp", "gold"];

impl StoryEvent {
    /// Normalize a `{type, parameters}` pair.
    pub fn parse(kind: &str, parameters: &Map<String, Value>) -> Result<Self, ScriptError> {
        let kind_tag =
            Kind::from_name(kind).ok_or_else(|| ScriptError::UnknownEvent(kind.to_string()))?;
        let params = Params {
            event: kind,
            map: parameters,
        };

        Ok(match kind_tag {
            Kind::Set => StoryEvent::Set {
                name: params.id(NAME)?,
                value: params.find(&["value"]).cloned().unwrap_or(Value::Null),
            },
            Kind::AddItem => StoryEvent::AddItem {
                item_id: ItemId::new(params.id(ITEM)?),
                qty: params.int_or(QTY, 1)?,
            },
            Kind::RemoveItem => StoryEvent::RemoveItem {
                item_id: ItemId::new(params.id(ITEM)?),
                qty: params.int_or(QTY, 1)?,
            },
            Kind::StartQuest => StoryEvent::StartQuest(QuestId::new(params.id(QUEST)?)),
            Kind::AdvanceQuest => StoryEvent::AdvanceQuest(QuestId::new(params.id(QUEST)?)),
            Kind::CompleteQuest => StoryEvent::CompleteQuest(QuestId::new(params.id(QUEST)?)),
            Kind::ShowQuest => StoryEvent::ShowQuest(QuestId::new(params.id(QUEST)?)),
            Kind::ReturnQuest => StoryEvent::ReturnQuest(QuestId::new(params.id(QUEST)?)),
            Kind::AddXp => StoryEvent::AddXp(params.int(AMOUNT)?),
            Kind::AddGold => StoryEvent::AddGold(params.int(AMOUNT)?),
            Kind::SetCoordinates => StoryEvent::SetCoordinates {
                x: params.float(&["x"])?,
                y: params.float(&["y"])?,
                continent: params.text(&["continent"]),
            },
        })
    }

    pub fn from_spec(spec: &EventSpec) -> Result<Self, ScriptError> {
        Self::parse(&spec.kind, &spec.parameters)
    }

    /// Normalize the `{command: set|add|sub|toggle, var, value}` object form.
    pub fn from_command(command: &CommandSpec) -> Result<Self, ScriptError> {
        let name = command.var.trim().to_string();
        if name.is_empty() {
            return Err(ScriptError::MissingParameter {
                event: command.command.clone(),
                parameter: "var".to_string(),
            });
        }

        let numeric = |negate: bool| {
            let delta = match &command.value {
                Value::Number(n) if negate => match n.as_i64() {
                    Some(i) => i.checked_neg().map(Value::from),
                    None => n.as_f64().and_then(|f| serde_json::Number::from_f64(-f)).map(Value::Number),
                },
                Value::Number(_) => Some(command.value.clone()),
                _ => None,
            };
            delta.ok_or_else(|| ScriptError::InvalidParameter {
                event: command.command.clone(),
                parameter: "value".to_string(),
                value: command.value.to_string(),
            })
        };

        Ok(match command.command.as_str() {
            "set" => StoryEvent::Set {
                name,
                value: command.value.clone(),
            },
            "add" => StoryEvent::Adjust {
                name,
                delta: numeric(false)?,
            },
            "sub" => StoryEvent::Adjust {
                name,
                delta: numeric(true)?,
            },
            "toggle" => StoryEvent::Toggle { name },
            other => return Err(ScriptError::UnknownEvent(other.to_string())),
        })
    }

    /// Normalize a legacy macro by naming its positional arguments.
    pub fn from_macro(call: &MacroCall) -> Result<Self, ScriptError> {
        let kind = Kind::from_name(&call.name)
            .ok_or_else(|| ScriptError::UnknownEvent(call.name.clone()))?;
        let parameters: Map<String, Value> = kind
            .positional()
            .iter()
            .zip(&call.args)
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        Self::parse(&call.name, &parameters)
    }

    /// The quest this event would start, if any.
    pub fn started_quest(&self) -> Option<&QuestId> {
        match self {
            StoryEvent::StartQuest(id) => Some(id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_aliases_normalize() {
        for kind in ["addItem", "add_item", "AddItem"] {
            let event = StoryEvent::parse(kind, &params(json!({"item": "sword", "quantity": 2}))).unwrap();
            assert_eq!(
                event,
                StoryEvent::AddItem {
                    item_id: ItemId::from("sword"),
                    qty: 2
                }
            );
        }

        let event = StoryEvent::parse("set_var", &params(json!({"var": "gold", "value": 10}))).unwrap();
        assert_eq!(
            event,
            StoryEvent::Set {
                name: "gold".to_string(),
                value: json!(10)
            }
        );

        let event = StoryEvent::parse("addExp", &params(json!({"amount": "40"}))).unwrap();
        assert_eq!(event, StoryEvent::AddXp(40));
    }

    #[test]
    fn test_quest_events_accept_id_alias() {
        let event = StoryEvent::parse("return_quest", &params(json!({"id": "q1"}))).unwrap();
        assert_eq!(event, StoryEvent::ReturnQuest(QuestId::from("q1")));
        assert_eq!(
            StoryEvent::parse("startQuest", &params(json!({"quest_id": "q2"})))
                .unwrap()
                .started_quest(),
            Some(&QuestId::from("q2"))
        );
    }

    #[test]
    fn test_defaults_and_errors() {
        let event = StoryEvent::parse("removeItem", &params(json!({"item_id": "torch"}))).unwrap();
        assert_eq!(
            event,
            StoryEvent::RemoveItem {
                item_id: ItemId::from("torch"),
                qty: 1
            }
        );

        assert!(matches!(
            StoryEvent::parse("teleport", &Map::new()),
            Err(ScriptError::UnknownEvent(kind)) if kind == "teleport"
        ));
        assert!(matches!(
            StoryEvent::parse("startQuest", &params(json!({"quest_id": "  "}))),
            Err(ScriptError::MissingParameter { .. })
        ));
        assert!(matches!(
            StoryEvent::parse("addItem", &params(json!({"item_id": "a", "qty": "lots"}))),
            Err(ScriptError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_commands() {
        let command = |cmd: &str, value: Value| CommandSpec {
            command: cmd.to_string(),
            var: "gold".to_string(),
            value,
        };

        assert_eq!(
            StoryEvent::from_command(&command("sub", json!(3))).unwrap(),
            StoryEvent::Adjust {
                name: "gold".to_string(),
                delta: json!(-3)
            }
        );
        assert_eq!(
            StoryEvent::from_command(&command("toggle", Value::Null)).unwrap(),
            StoryEvent::Toggle {
                name: "gold".to_string()
            }
        );
        assert!(StoryEvent::from_command(&command("add", json!("x"))).is_err());
        assert!(StoryEvent::from_command(&command("explode", json!(1))).is_err());
    }

    #[test]
    fn test_macro_positional_arguments() {
        let call = MacroCall {
            name: "setcoords".to_string(),
            args: vec![json!(12), json!(-4.5), json!("Velkarum")],
        };
        assert_eq!(
            StoryEvent::from_macro(&call).unwrap(),
            StoryEvent::SetCoordinates {
                x: 12.0,
                y: -4.5,
                continent: Some("Velkarum".to_string())
            }
        );

        let call = MacroCall {
            name: "addItem".to_string(),
            args: vec![json!("healing potion")],
        };
        assert_eq!(
            StoryEvent::from_macro(&call).unwrap(),
            StoryEvent::AddItem {
                item_id: ItemId::from("healing potion"),
                qty: 1
            }
        );
    }
}
