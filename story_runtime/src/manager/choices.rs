//! Choice resolution results.

use serde::{Deserialize, Serialize};
use story_world::{Choice, EdgeId, NodeId, QuestId};

/// Where an available choice came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChoiceSource {
    /// An authored choice, shown as written.
    Authored(Choice),
    /// A used `replace` choice showing its replacement text/target.
    Replacement(Choice),
    /// Derived from an outgoing edge when the node has no authored choices.
    Edge(EdgeId),
    /// Injected hand-in option for a completed quest.
    ReturnQuest(QuestId),
}

/// A choice as the player sees it right now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableChoice {
    pub text: String,
    /// `None` for disabled choices and for choices that stay on the node.
    pub target_id: Option<NodeId>,
    pub disabled: bool,
    pub is_replacement: bool,
    pub source: ChoiceSource,
}

impl AvailableChoice {
    pub(crate) fn authored(text: String, target_id: Option<NodeId>, choice: &Choice) -> Self {
        Self {
            text,
            target_id,
            disabled: false,
            is_replacement: false,
            source: ChoiceSource::Authored(choice.clone()),
        }
    }

    pub(crate) fn replacement(text: String, target_id: Option<NodeId>, choice: &Choice) -> Self {
        Self {
            text,
            target_id,
            disabled: false,
            is_replacement: true,
            source: ChoiceSource::Replacement(choice.clone()),
        }
    }

    pub(crate) fn disabled(text: String, choice: &Choice) -> Self {
        Self {
            text,
            target_id: None,
            disabled: true,
            is_replacement: false,
            source: ChoiceSource::Authored(choice.clone()),
        }
    }

    pub(crate) fn edge(text: String, target_id: NodeId, edge_id: EdgeId) -> Self {
        Self {
            text,
            target_id: Some(target_id),
            disabled: false,
            is_replacement: false,
            source: ChoiceSource::Edge(edge_id),
        }
    }

    pub(crate) fn return_quest(text: String, quest_id: QuestId) -> Self {
        Self {
            text,
            target_id: None,
            disabled: false,
            is_replacement: false,
            source: ChoiceSource::ReturnQuest(quest_id),
        }
    }

    /// The authored choice backing this entry, if any.
    pub fn choice(&self) -> Option<&Choice> {
        match &self.source {
            ChoiceSource::Authored(choice) | ChoiceSource::Replacement(choice) => Some(choice),
            ChoiceSource::Edge(_) | ChoiceSource::ReturnQuest(_) => None,
        }
    }
}

/// What `make_choice` changed, so the caller knows what to redraw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChoiceOutcome {
    pub navigated: bool,
    pub text_modified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backing_choice() {
        let choice = Choice::new("c1", "Open the door", "hall");
        let normal = AvailableChoice::authored(choice.text.clone(), choice.target().cloned(), &choice);
        assert_eq!(normal.choice(), Some(&choice));
        assert_eq!(normal.target_id, Some(NodeId::from("hall")));

        let disabled = AvailableChoice::disabled(choice.text.clone(), &choice);
        assert!(disabled.disabled);
        assert!(disabled.target_id.is_none());

        let quest = AvailableChoice::return_quest("Return".to_string(), QuestId::from("q1"));
        assert!(quest.choice().is_none());
        assert!(quest.target_id.is_none());
    }
}
