//! Story graph definitions: nodes, choices, edges, quests and the project container.
//!
//! The graph is produced by the authoring tool and is read-only at runtime.

mod node;
mod project;
mod quest;

pub use node::*;
pub use project::*;
pub use quest::*;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create an id from any string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh random id (UUID v4).
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Authored data sometimes carries blank ids.
            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Unique identifier for story nodes.
    NodeId
);
string_id!(
    /// Unique identifier for choices embedded in a node.
    ChoiceId
);
string_id!(
    /// Unique identifier for edges.
    EdgeId
);
string_id!(
    /// Unique identifier for quests.
    QuestId
);
string_id!(
    /// Unique identifier for items.
    ItemId
);
