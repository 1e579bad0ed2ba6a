//! Story Manager - the central state machine.
//!
//! Holds the current node and the history stack, and drives the two
//! protocols everything else hangs off:
//!
//! 1. **Transition**: run the old node's `on_exit`, push it to history,
//!    enter the target, count the visit, place the player on the map, run
//!    the target's `on_enter`.
//! 2. **Choice resolution**: list the choices legal right now (one-shot
//!    policies, conditions, quest awareness), then apply the selected one.
//!
//! Callers must re-fetch choices after every navigation: `make_choice`
//! resolves its index against a freshly computed list.

mod choices;

pub use choices::*;

use serde_json::json;
use story_world::{
    keys, AfterUse, Choice, LocationResolver, Node, NodeId, Project, QuestStatus, VariableStore,
    Variables,
};

use crate::config::{render_label, EngineConfig, LocationsConfig};
use crate::script::{ScriptEngine, StoryEvent};

/// Runtime session over one loaded project.
#[derive(Debug)]
pub struct StoryManager {
    config: EngineConfig,
    variables: VariableStore,
    script: ScriptEngine,
    locations: LocationResolver,
    project: Option<Project>,
    current_node_id: Option<NodeId>,
    history: Vec<NodeId>,
}

impl Default for StoryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StoryManager {
    /// Create a manager with default configuration and no location data.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            variables: VariableStore::new(),
            script: ScriptEngine::new(),
            locations: LocationResolver::new(),
            project: None,
            current_node_id: None,
            history: Vec::new(),
        }
    }

    /// Create a manager and load the location sources named in `config`.
    pub fn with_config(config: EngineConfig) -> Self {
        let locations = config.locations.resolver();
        Self {
            config,
            locations,
            ..Self::new()
        }
    }

    /// Replace the location data.
    pub fn with_locations(mut self, locations: LocationResolver) -> Self {
        self.locations = locations;
        self
    }

    /// Load a project: reset variables to defaults overlaid with the
    /// project's, and forget any position.
    pub fn load_project(&mut self, project: Project) {
        tracing::info!(
            "Loading project '{}' ({} nodes)",
            project.metadata.name,
            project.nodes().len()
        );
        self.variables.merge_defaults(&project.variables);
        self.project = Some(project);
        self.current_node_id = None;
        self.history.clear();
    }

    /// Enter the `START` node, or the first node if there is none.
    pub fn start_game(&mut self) -> bool {
        let start = self
            .project
            .as_ref()
            .and_then(Project::start_node)
            .map(|node| node.id.clone());
        match start {
            Some(id) => self.transition(&id),
            None => {
                tracing::error!("Cannot start: no project loaded or project has no nodes");
                false
            }
        }
    }

    /// Move to `target`. Unknown targets are logged and change nothing.
    pub fn transition(&mut self, target: &NodeId) -> bool {
        self.transition_inner(target, true)
    }

    /// Pop the history stack and return to the previous node.
    pub fn go_back(&mut self) -> bool {
        let Some(previous) = self.history.last().cloned() else {
            return false;
        };
        if !self.transition_inner(&previous, false) {
            return false;
        }
        self.history.pop();
        true
    }

    fn transition_inner(&mut self, target: &NodeId, record_history: bool) -> bool {
        let Some(project) = self.project.as_ref() else {
            tracing::error!("Cannot enter '{}': no project loaded", target);
            return false;
        };
        let Some(node) = project.node(target) else {
            tracing::error!("Cannot enter unknown node '{}'", target);
            return false;
        };

        if let Some(current) = self.current_node_id.take() {
            if let Some(old) = project.node(&current) {
                self.script
                    .execute_entries(&mut self.variables, Some(project), &old.logic.on_exit);
            }
            if record_history {
                self.history.push(current);
            }
        }

        tracing::debug!("Entering node '{}' ({})", node.id, node.title);
        self.current_node_id = Some(node.id.clone());
        self.variables.increment_visit_count(&node.id);
        update_location(&mut self.variables, &self.locations, &self.config.locations, node);
        self.script
            .execute_entries(&mut self.variables, Some(project), &node.logic.on_enter);
        true
    }

    /// Resolve the current node's text: override, then the first matching
    /// variant, then the default text, all interpolated.
    pub fn get_parsed_text(&self) -> String {
        let Some(node) = self.current_node() else {
            tracing::warn!("Text requested before the game started");
            return String::new();
        };
        let context = self.visit_context(&node.id);

        let raw = self.variables.get_node_text(&node.id).unwrap_or_else(|| {
            node.content
                .text_variants
                .iter()
                .find(|variant| {
                    self.script
                        .evaluate_condition(&self.variables, &variant.condition, Some(&context))
                })
                .map(|variant| variant.text.clone())
                .unwrap_or_else(|| node.content.text.clone())
        });

        self.script.parse_text(&self.variables, &raw, Some(&context))
    }

    /// Choices legal at the current node, in authored order.
    pub fn get_available_choices(&self) -> Vec<AvailableChoice> {
        let (Some(project), Some(node)) = (self.project.as_ref(), self.current_node()) else {
            return Vec::new();
        };
        let context = self.visit_context(&node.id);
        let mut available = Vec::new();

        if node.content.choices.is_empty() {
            for edge in project.outgoing_edges(&node.id) {
                let Some(target) = project.node(&edge.end_node_id) else {
                    tracing::warn!("Skipping edge '{}' to unknown node '{}'", edge.id, edge.end_node_id);
                    continue;
                };
                available.push(AvailableChoice::edge(
                    render_label(&self.config.edges.label, &target.title),
                    edge.end_node_id.clone(),
                    edge.id.clone(),
                ));
            }
        }

        for (index, choice) in node.content.choices.iter().enumerate() {
            let used = choice
                .tracked_id()
                .is_some_and(|id| self.variables.is_choice_used(id));

            if used {
                match choice.after_use {
                    AfterUse::Delete => continue,
                    AfterUse::Replace => {
                        match &choice.replacement_data {
                            Some(replacement) => available.push(AvailableChoice::replacement(
                                self.interpolate(&replacement.text, &context),
                                replacement.target_node_id.clone().filter(|id| !id.is_empty()),
                                choice,
                            )),
                            None => tracing::warn!(
                                "Choice '{}' is set to replace but has no replacement",
                                choice.text
                            ),
                        }
                        continue;
                    }
                    AfterUse::Disable => {
                        available.push(AvailableChoice::disabled(
                            self.interpolate(&choice.text, &context),
                            choice,
                        ));
                        continue;
                    }
                    AfterUse::None => {}
                }
            }

            if !self
                .script
                .evaluate_condition(&self.variables, &choice.condition, Some(&context))
            {
                continue;
            }
            if self.starts_known_quest(choice) {
                continue;
            }

            let target = choice.target().cloned().or_else(|| {
                project
                    .outgoing_edges(&node.id)
                    .into_iter()
                    .find(|edge| edge.start_socket_index == index)
                    .map(|edge| edge.end_node_id.clone())
            });
            available.push(AvailableChoice::authored(
                self.interpolate(&choice.text, &context),
                target,
                choice,
            ));
        }

        for quest in project.quests_returning_to(&node.id) {
            if self.variables.quest_status(&quest.id) == QuestStatus::Completed {
                available.push(AvailableChoice::return_quest(
                    render_label(&self.config.quests.return_label, &quest.title),
                    quest.id.clone(),
                ));
            }
        }

        available
    }

    /// Apply the choice at `index` of a freshly computed choice list.
    pub fn make_choice(&mut self, index: usize) -> ChoiceOutcome {
        let mut outcome = ChoiceOutcome::default();
        let Some(selected) = self.get_available_choices().into_iter().nth(index) else {
            tracing::warn!("No choice at index {}", index);
            return outcome;
        };
        if selected.disabled {
            tracing::debug!("Ignoring disabled choice '{}'", selected.text);
            return outcome;
        }

        match &selected.source {
            ChoiceSource::Authored(choice) => {
                self.script
                    .execute_events(&mut self.variables, self.project.as_ref(), &choice.events);

                if choice.is_one_shot {
                    match choice.tracked_id() {
                        Some(id) => self.variables.mark_choice_used(id),
                        None => tracing::warn!("One-shot choice '{}' has no id", choice.text),
                    }
                }

                if choice.modify_text_enabled {
                    if let (Some(text), Some(current)) =
                        (choice.new_scene_text.as_deref(), self.current_node_id.as_ref())
                    {
                        self.variables.set_node_text(current, text);
                        outcome.text_modified = true;
                    }
                }
            }
            ChoiceSource::ReturnQuest(quest_id) => {
                let event = StoryEvent::ReturnQuest(quest_id.clone());
                if let Err(e) = self
                    .script
                    .apply(&mut self.variables, self.project.as_ref(), &event)
                {
                    tracing::warn!("Return of quest '{}' failed: {}", quest_id, e);
                }
            }
            ChoiceSource::Replacement(_) | ChoiceSource::Edge(_) => {}
        }

        if let Some(target) = &selected.target_id {
            outcome.navigated = self.transition(target);
        }
        outcome
    }

    /// Clear the position, replace variables and history, then re-enter
    /// `node_id` (its `on_enter` runs again).
    pub(crate) fn resume(&mut self, variables: Variables, history: Vec<NodeId>, node_id: &NodeId) -> bool {
        self.current_node_id = None;
        self.variables.load_state(variables);
        self.history = history;
        self.transition(node_id)
    }

    fn starts_known_quest(&self, choice: &Choice) -> bool {
        choice
            .events
            .iter()
            .filter_map(|spec| StoryEvent::from_spec(spec).ok())
            .filter_map(|event| event.started_quest().cloned())
            .any(|quest_id| self.variables.is_quest_known(&quest_id))
    }

    fn visit_context(&self, node_id: &NodeId) -> Variables {
        let mut context = Variables::new();
        context.insert("visits".to_string(), json!(self.variables.get_visit_count(node_id)));
        context
    }

    fn interpolate(&self, text: &str, context: &Variables) -> String {
        self.script.parse_text(&self.variables, text, Some(context))
    }

    pub fn current_node(&self) -> Option<&Node> {
        let id = self.current_node_id.as_ref()?;
        self.project.as_ref()?.node(id)
    }

    pub fn current_node_id(&self) -> Option<&NodeId> {
        self.current_node_id.as_ref()
    }

    /// Previously visited nodes, oldest first.
    pub fn history(&self) -> &[NodeId] {
        &self.history
    }

    pub fn project(&self) -> Option<&Project> {
        self.project.as_ref()
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut VariableStore {
        &mut self.variables
    }

    pub fn locations(&self) -> &LocationResolver {
        &self.locations
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn script(&self) -> &ScriptEngine {
        &self.script
    }
}

/// Set `player_coordinates` and `current_location` for a node placed on the map.
fn update_location(
    variables: &mut VariableStore,
    locations: &LocationResolver,
    config: &LocationsConfig,
    node: &Node,
) {
    let Some(coords) = node.content.coordinates.as_ref() else {
        return;
    };
    let continent = match coords.continent.trim() {
        "" => config.default_continent.as_str(),
        named => named,
    };

    variables.set_player_coordinates(coords.x, coords.y, continent);
    let description = coords
        .label()
        .unwrap_or_else(|| describe_position(locations, config, coords.x, coords.y, continent));
    variables.set(keys::CURRENT_LOCATION, description);
}

/// Name the nearest point: exact, "Near <name>", or "Wilderness".
pub fn describe_position(
    locations: &LocationResolver,
    config: &LocationsConfig,
    x: f64,
    y: f64,
    continent: &str,
) -> String {
    if let Some(point) = locations.nearest_at(x, y, continent, config.tolerance) {
        return point.name.clone();
    }
    match locations.nearest(x, y, continent) {
        Some((point, distance)) if distance <= config.near_radius => format!("Near {}", point.name),
        _ => "Wilderness".to_string(),
    }
}
