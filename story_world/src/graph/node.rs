//! Node definitions - the authored scenes of a story graph.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::{ChoiceId, EdgeId, NodeId};

/// Treat an explicit `null` the same as a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Kinds of nodes the editor can place on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Text plus choices.
    #[default]
    #[serde(alias = "DIALOGUE")]
    Dialogue,
    /// Pure branching node.
    #[serde(alias = "CHOICE")]
    Choice,
    /// No UI, changes variables.
    #[serde(alias = "EVENT")]
    Event,
    /// If/else routing.
    #[serde(alias = "CONDITION")]
    Condition,
    /// Entry point of the graph.
    #[serde(alias = "START")]
    Start,
    #[serde(alias = "END")]
    End,
}

/// A single authored scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: NodeKind,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default)]
    pub pos_x: f64,
    #[serde(default)]
    pub pos_y: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: NodeContent,
    #[serde(default, deserialize_with = "null_as_default")]
    pub logic: NodeLogic,
    /// Editor-only properties (tags, colors).
    #[serde(default, deserialize_with = "null_as_default")]
    pub properties: Map<String, Value>,
}

impl Node {
    /// Create a dialogue node with the given id and title.
    pub fn new(id: impl Into<NodeId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Dialogue,
            title: title.into(),
            pos_x: 0.0,
            pos_y: 0.0,
            content: NodeContent::default(),
            logic: NodeLogic::default(),
            properties: Map::new(),
        }
    }

    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.content.text = text.into();
        self
    }

    pub fn with_choice(mut self, choice: Choice) -> Self {
        self.content.choices.push(choice);
        self
    }

    pub fn with_variant(mut self, condition: impl Into<String>, text: impl Into<String>) -> Self {
        self.content.text_variants.push(TextVariant {
            condition: condition.into(),
            text: text.into(),
        });
        self
    }

    pub fn with_on_enter(mut self, entry: ScriptEntry) -> Self {
        self.logic.on_enter.push(entry);
        self
    }

    pub fn with_on_exit(mut self, entry: ScriptEntry) -> Self {
        self.logic.on_exit.push(entry);
        self
    }

    /// Place the node on the map.
    pub fn with_coordinates(mut self, x: f64, y: f64, continent: impl Into<String>) -> Self {
        self.content.coordinates = Some(NodeCoordinates {
            x,
            y,
            continent: continent.into(),
            ..Default::default()
        });
        self
    }
}

/// Narrative content of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NodeContent {
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub choices: Vec<Choice>,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub text_variants: Vec<TextVariant>,
    /// Map placement chosen in the editor's location dialog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<NodeCoordinates>,
    /// Everything else the editor stores (image, audio, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Where a node sits on the world map, in world units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NodeCoordinates {
    #[serde(default, deserialize_with = "null_as_default")]
    pub continent: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub x: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub y: f64,
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

impl NodeCoordinates {
    /// Explicit naming picked by the author: `"{city} - {location_name}"`,
    /// or just the location name when there is no city.
    pub fn label(&self) -> Option<String> {
        let non_blank = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let name = non_blank(&self.location_name)?;
        Some(match non_blank(&self.city) {
            Some(city) => format!("{} - {}", city, name),
            None => name,
        })
    }
}

/// Alternative text shown when its condition holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TextVariant {
    #[serde(default, deserialize_with = "null_as_default")]
    pub condition: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
}

/// What happens to a one-shot choice once it has been used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AfterUse {
    /// Remove it from the list.
    Delete,
    /// Show `replacement_data` instead.
    Replace,
    /// Keep it visible but not selectable.
    Disable,
    /// Behave as if never used. Unknown legacy policies land here too.
    #[default]
    #[serde(other)]
    None,
}

/// Text and target shown in place of a used `Replace` choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReplacementData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default)]
    pub target_node_id: Option<NodeId>,
}

/// A player-selectable option on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Choice {
    #[serde(default)]
    pub id: Option<ChoiceId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default)]
    pub target_node_id: Option<NodeId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub condition: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_one_shot: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub after_use: AfterUse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement_data: Option<ReplacementData>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub modify_text_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_scene_text: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub events: Vec<EventSpec>,
}

impl Choice {
    /// Create a choice leading to `target`.
    pub fn new(id: impl Into<ChoiceId>, text: impl Into<String>, target: impl Into<NodeId>) -> Self {
        Self {
            id: Some(id.into()),
            text: text.into(),
            target_node_id: Some(target.into()),
            ..Default::default()
        }
    }

    /// Mark as one-shot with the given post-use policy.
    pub fn one_shot(mut self, after_use: AfterUse) -> Self {
        self.is_one_shot = true;
        self.after_use = after_use;
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = condition.into();
        self
    }

    pub fn with_replacement(mut self, text: impl Into<String>, target: impl Into<NodeId>) -> Self {
        self.replacement_data = Some(ReplacementData {
            text: text.into(),
            target_node_id: Some(target.into()),
        });
        self
    }

    pub fn with_new_scene_text(mut self, text: impl Into<String>) -> Self {
        self.modify_text_enabled = true;
        self.new_scene_text = Some(text.into());
        self
    }

    pub fn with_event(mut self, event: EventSpec) -> Self {
        self.events.push(event);
        self
    }

    /// The id used for one-shot bookkeeping; blank ids count as none.
    pub fn tracked_id(&self) -> Option<&ChoiceId> {
        self.id.as_ref().filter(|id| !id.is_empty())
    }

    /// The authored target, ignoring blank ids.
    pub fn target(&self) -> Option<&NodeId> {
        self.target_node_id.as_ref().filter(|id| !id.is_empty())
    }
}

/// A structured macro call, e.g. `{"type": "addItem", "parameters": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parameters: Map<String, Value>,
}

impl EventSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            parameters: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// Older object form: `{"command": "add", "var": "gold", "value": 5}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub command: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub var: String,
    #[serde(default)]
    pub value: Value,
}

/// One entry of an `on_enter` / `on_exit` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScriptEntry {
    Event(EventSpec),
    Command(CommandSpec),
    /// Bracketed macro text such as `<<addItem "sword" 1>>`.
    Line(String),
    /// Anything unrecognised; kept for round-tripping and ignored at runtime.
    Unknown(Value),
}

/// Scripts run when entering and leaving a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NodeLogic {
    #[serde(default, deserialize_with = "null_as_default")]
    pub on_enter: Vec<ScriptEntry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub on_exit: Vec<ScriptEntry>,
}

/// A connection between two nodes (legacy navigation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub start_node_id: NodeId,
    pub end_node_id: NodeId,
    /// Which output socket (choice index) the edge leaves from.
    #[serde(default)]
    pub start_socket_index: usize,
    #[serde(default)]
    pub end_socket_index: usize,
    #[serde(default = "EdgeId::generate")]
    pub id: EdgeId,
}

impl Edge {
    pub fn new(from: impl Into<NodeId>, to: impl Into<NodeId>, socket: usize) -> Self {
        Self {
            start_node_id: from.into(),
            end_node_id: to.into(),
            start_socket_index: socket,
            end_socket_index: 0,
            id: EdgeId::generate(),
        }
    }
}
