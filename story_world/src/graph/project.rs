//! The project container - everything the authoring tool exports.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use super::node::null_as_default;
use super::{Edge, Node, NodeId, NodeKind, Quest, QuestId};
use super::{Item, ItemId};

/// Errors raised while reading or writing project documents.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("project file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("project document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Project metadata block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default = "now_seconds")]
    pub created_at: f64,
    #[serde(default = "now_seconds")]
    pub last_modified: f64,
}

fn default_name() -> String {
    "Narrative RPG Project".to_string()
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl Default for ProjectMetadata {
    fn default() -> Self {
        let now = now_seconds();
        Self {
            name: default_name(),
            version: default_version(),
            author: String::new(),
            created_at: now,
            last_modified: now,
        }
    }
}

/// A visual group of nodes on the canvas (e.g. a region).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub pos_x: f64,
    #[serde(default)]
    pub pos_y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub color: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct GraphSection {
    #[serde(default, deserialize_with = "null_as_default")]
    nodes: Vec<Node>,
    #[serde(default, deserialize_with = "null_as_default")]
    edges: Vec<Edge>,
    #[serde(default, deserialize_with = "null_as_default")]
    groups: Vec<Group>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct DatabaseSection {
    #[serde(default, deserialize_with = "null_as_default")]
    variables: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    items: Vec<Item>,
    #[serde(default, deserialize_with = "null_as_default")]
    quests: Vec<Quest>,
    #[serde(default, deserialize_with = "null_as_default")]
    locations: Vec<Value>,
}

/// On-disk shape of a project.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ProjectDocument {
    #[serde(default)]
    metadata: ProjectMetadata,
    #[serde(default)]
    graph: GraphSection,
    #[serde(default)]
    database: DatabaseSection,
}

/// The root container of a story: graph, edges and RPG database.
///
/// Node insertion order is preserved; it decides which node starts the game
/// when no `START` node exists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "ProjectDocument", into = "ProjectDocument")]
pub struct Project {
    pub metadata: ProjectMetadata,
    nodes: Vec<Node>,
    node_index: HashMap<NodeId, usize>,
    pub edges: Vec<Edge>,
    pub groups: Vec<Group>,
    /// Default values for game variables.
    pub variables: Map<String, Value>,
    pub items: Vec<Item>,
    pub quests: Vec<Quest>,
    /// Editor location records, kept verbatim.
    pub locations: Vec<Value>,
}

impl From<ProjectDocument> for Project {
    fn from(doc: ProjectDocument) -> Self {
        let mut project = Project {
            metadata: doc.metadata,
            edges: doc.graph.edges,
            groups: doc.graph.groups,
            variables: doc.database.variables,
            items: doc.database.items,
            quests: doc.database.quests,
            locations: doc.database.locations,
            ..Default::default()
        };
        for node in doc.graph.nodes {
            project.insert_node(node);
        }
        project
    }
}

impl From<Project> for ProjectDocument {
    fn from(project: Project) -> Self {
        ProjectDocument {
            metadata: project.metadata,
            graph: GraphSection {
                nodes: project.nodes,
                edges: project.edges,
                groups: project.groups,
            },
            database: DatabaseSection {
                variables: project.variables,
                items: project.items,
                quests: project.quests,
                locations: project.locations,
            },
        }
    }
}

impl Project {
    /// Create a new empty project.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a project document.
    pub fn from_json_str(json: &str) -> Result<Self, ProjectError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to a pretty-printed project document.
    pub fn to_json_string(&self) -> Result<String, ProjectError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a project document from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let project = Self::from_json_str(&json)?;
        tracing::info!(
            "Loaded project '{}' (version {}) from {}",
            project.metadata.name,
            project.metadata.version,
            path.display()
        );
        Ok(project)
    }

    /// Write the project document to disk, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ProjectError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json_string()?)?;
        tracing::info!("Saved project to {}", path.display());
        Ok(())
    }

    fn insert_node(&mut self, node: Node) {
        match self.node_index.get(&node.id) {
            Some(&index) => self.nodes[index] = node,
            None => {
                self.node_index.insert(node.id.clone(), self.nodes.len());
                self.nodes.push(node);
            }
        }
    }

    /// Add a node (replacing any node with the same id).
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id.clone();
        self.insert_node(node);
        self.touch();
        id
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, id: &NodeId) -> Option<Node> {
        let index = self.node_index.remove(id)?;
        let node = self.nodes.remove(index);
        for slot in self.node_index.values_mut() {
            if *slot > index {
                *slot -= 1;
            }
        }
        self.edges
            .retain(|e| &e.start_node_id != id && &e.end_node_id != id);
        self.touch();
        Some(node)
    }

    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
        self.touch();
    }

    pub fn add_quest(&mut self, quest: Quest) {
        self.quests.retain(|q| q.id != quest.id);
        self.quests.push(quest);
        self.touch();
    }

    pub fn add_item(&mut self, item: Item) {
        self.items.retain(|i| i.id != item.id);
        self.items.push(item);
        self.touch();
    }

    fn touch(&mut self) {
        self.metadata.last_modified = now_seconds();
    }

    /// Get node by ID.
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.node_index.get(id).map(|&i| &self.nodes[i])
    }

    /// Get mutable node by ID.
    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.node_index.get(id).map(|&i| &mut self.nodes[i])
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.node_index.contains_key(id)
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The first `START` node, or else the first node.
    pub fn start_node(&self) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|n| n.kind == NodeKind::Start)
            .or_else(|| self.nodes.first())
    }

    /// Edges leaving a node, sorted by socket index.
    pub fn outgoing_edges(&self, id: &NodeId) -> Vec<&Edge> {
        let mut edges: Vec<_> = self
            .edges
            .iter()
            .filter(|e| &e.start_node_id == id)
            .collect();
        edges.sort_by_key(|e| e.start_socket_index);
        edges
    }

    pub fn quest(&self, id: &QuestId) -> Option<&Quest> {
        self.quests.iter().find(|q| &q.id == id)
    }

    pub fn item(&self, id: &ItemId) -> Option<&Item> {
        self.items.iter().find(|i| &i.id == id)
    }

    /// Quests handed in at the given node.
    pub fn quests_returning_to<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a Quest> + 'a {
        self.quests
            .iter()
            .filter(move |q| q.return_scene_id.as_ref() == Some(id))
    }
}
