//! Saving a session and resuming it in a fresh manager.

use serde_json::json;
use story_runtime::{SaveSystem, StoryManager};
use story_world::{keys, AfterUse, Choice, EventSpec, Node, NodeId, Project, QuestId, ScriptEntry};

fn project() -> Project {
    let mut project = Project::new();
    project.add_node(
        Node::new("camp", "Camp")
            .with_choice(
                Choice::new("scout", "Scout ahead", "ridge")
                    .one_shot(AfterUse::Delete)
                    .with_event(EventSpec::new("startQuest").with_param("quest_id", "wolves")),
            )
            .with_choice(Choice::new("ridge_again", "Climb the ridge", "ridge")),
    );
    project.add_node(
        Node::new("ridge", "Ridge")
            .with_text("Wind howls. Gold: ${gold}.")
            .with_on_enter(ScriptEntry::Event(
                EventSpec::new("addGold").with_param("amount", 1),
            ))
            .with_choice(Choice::new("down", "Head down", "camp")),
    );
    project
}

fn playing() -> StoryManager {
    let mut manager = StoryManager::new();
    manager.load_project(project());
    manager.start_game();
    manager.variables_mut().set("player_name", "Arthur");
    manager.make_choice(0);
    manager
}

#[test]
fn test_round_trip_restores_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("save.dat");

    let original = playing();
    assert!(SaveSystem::save_game(&original, &path));

    let mut resumed = StoryManager::new();
    resumed.load_project(project());
    assert!(SaveSystem::load_game(&mut resumed, &path));

    assert_eq!(resumed.current_node_id(), original.current_node_id());
    assert_eq!(resumed.history(), original.history());
    assert_eq!(resumed.variables().get("player_name"), Some(&json!("Arthur")));
    assert!(resumed.variables().is_choice_used(&"scout".into()));
    assert!(resumed.variables().is_quest_known(&QuestId::from("wolves")));

    // Re-entering the saved node runs its on_enter again.
    assert_eq!(original.variables().get_i64(keys::GOLD), 1);
    assert_eq!(resumed.variables().get_i64(keys::GOLD), 2);
    assert_eq!(
        resumed.variables().get_visit_count(&NodeId::from("ridge")),
        original.variables().get_visit_count(&NodeId::from("ridge")) + 1
    );

    let mut expected = original.variables().get_all();
    expected.insert(keys::GOLD.to_string(), json!(2));
    expected.insert(keys::VISIT_COUNTS.to_string(), json!({"camp": 1, "ridge": 2}));
    assert_eq!(resumed.variables().get_all(), expected);
}

#[test]
fn test_restore_does_not_run_exit_scripts_or_grow_history() {
    let mut original = playing();
    let data = SaveSystem::snapshot(&original).unwrap();

    original.make_choice(0);
    original.make_choice(0);
    assert_eq!(original.history().len(), 3);

    SaveSystem::apply(&mut original, data.clone()).unwrap();
    assert_eq!(original.current_node_id(), Some(&data.current_node_id));
    assert_eq!(original.history(), data.history.as_slice());
}

#[test]
fn test_resumed_session_keeps_playing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("save.dat");
    assert!(SaveSystem::save_game(&playing(), &path));

    let mut resumed = StoryManager::new();
    resumed.load_project(project());
    SaveSystem::restore(&mut resumed, &path).unwrap();

    assert_eq!(resumed.get_parsed_text(), "Wind howls. Gold: 2.");
    assert!(resumed.make_choice(0).navigated);

    // The one-shot scouting choice stays deleted after the load.
    let texts: Vec<_> = resumed
        .get_available_choices()
        .into_iter()
        .map(|c| c.text)
        .collect();
    assert_eq!(texts, vec!["Climb the ridge"]);
}

#[test]
fn test_save_file_is_base64() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("save.dat");
    assert!(SaveSystem::save_game(&playing(), &path));

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(!raw.contains('{'));
    let data = SaveSystem::decode(&raw).unwrap();
    assert_eq!(data.current_node_id, NodeId::from("ridge"));
    assert_eq!(data.history, vec![NodeId::from("camp")]);
}
