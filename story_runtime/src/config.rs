//! Engine configuration, loadable from TOML.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use story_world::{LocationResolver, DEFAULT_TOLERANCE};
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Top-level engine configuration.
///
/// Every section is optional in the TOML document; missing values fall back
/// to [`Default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub locations: LocationsConfig,
    pub quests: QuestsConfig,
    pub edges: EdgesConfig,
}

impl EngineConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }
}

/// Geography settings used when a node places the player on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationsConfig {
    /// Within this distance the nearest point's name is used as-is.
    /// Micro points win ties inside this radius.
    pub tolerance: f64,

    /// Within this distance the description reads "Near <name>".
    pub near_radius: f64,

    /// Continent assumed when a node gives coordinates without one.
    pub default_continent: String,

    pub macro_source: Option<PathBuf>,
    pub micro_sources: Vec<PathBuf>,
}

impl Default for LocationsConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            near_radius: 20.0,
            default_continent: "Eldaron".to_string(),
            macro_source: None,
            micro_sources: Vec::new(),
        }
    }
}

impl LocationsConfig {
    /// Load the configured location sources. Missing files are skipped.
    pub fn resolver(&self) -> LocationResolver {
        LocationResolver::load_sources(self.macro_source.as_deref(), &self.micro_sources)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestsConfig {
    /// Label of the injected hand-in choice; `{title}` is the quest title.
    pub return_label: String,
}

impl Default for QuestsConfig {
    fn default() -> Self {
        Self {
            return_label: "Return quest: {title}".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgesConfig {
    /// Label of edge-derived choices; `{title}` is the target node title.
    pub label: String,
}

impl Default for EdgesConfig {
    fn default() -> Self {
        Self {
            label: "Go to {title}".to_string(),
        }
    }
}

/// Fill a `{title}` label template.
pub(crate) fn render_label(template: &str, title: &str) -> String {
    template.replace("{title}", title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.locations.tolerance, 0.1);
        assert_eq!(config.locations.near_radius, 20.0);
        assert_eq!(config.locations.default_continent, "Eldaron");
        assert_eq!(render_label(&config.edges.label, "Tavern"), "Go to Tavern");
        assert_eq!(
            render_label(&config.quests.return_label, "Lost Ring"),
            "Return quest: Lost Ring"
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [locations]
            near_radius = 1.0
            micro_sources = ["data/lorn.json"]

            [edges]
            label = "Travel to {title}"
            "#,
        )
        .unwrap();

        assert_eq!(config.locations.near_radius, 1.0);
        assert_eq!(config.locations.tolerance, 0.1);
        assert_eq!(config.locations.micro_sources, vec![PathBuf::from("data/lorn.json")]);
        assert_eq!(config.edges.label, "Travel to {title}");
        assert_eq!(config.quests, QuestsConfig::default());
    }

    #[test]
    fn test_invalid_toml() {
        let result = EngineConfig::from_toml_str("[locations]\ntolerance = \"far\"");
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "[quests]\nreturn_label = \"Hand in {title}\"\n").unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.quests.return_label, "Hand in {title}");

        let missing = EngineConfig::from_file(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
