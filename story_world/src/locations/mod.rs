//! Location resolver - named map points and coordinate lookups.
//!
//! Points come from one "macro" (continental) source and any number of
//! "micro" (regional) sources. Curated micro points win ties against the
//! auto-generated macro placeholders at the same coordinates.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default search radius for [`LocationResolver::nearest_at`].
pub const DEFAULT_TOLERANCE: f64 = 0.1;

/// Distances closer than this to the best match count as a tie.
pub const TIE_BAND: f64 = 0.001;

/// Errors raised while loading location data.
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("location file I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("location data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Data granularity of a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    /// Continental, often generated.
    Macro,
    /// Regional, hand-curated.
    Micro,
}

/// A named point on the world map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPoint {
    pub id: String,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub continent: String,
    pub city: String,
    pub place: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub scale: Scale,
    pub main_location_name: Option<String>,
}

impl LocationPoint {
    /// Euclidean distance to a coordinate.
    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        ((self.x - x).powi(2) + (self.y - y).powi(2)).sqrt()
    }

    fn on_continent(&self, continent: &str) -> bool {
        self.continent.to_lowercase() == continent.to_lowercase()
    }

    /// Flatten one raw entry; entries without `x`, `y` or `continent` are dropped.
    fn from_entry(id: &str, entry: &Value, scale: Scale) -> Option<Self> {
        let x = coordinate(entry.get("x")?)?;
        let y = coordinate(entry.get("y")?)?;
        let continent = entry.get("continent")?.as_str()?.to_string();
        let text = |key: &str| {
            entry
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Some(Self {
            id: id.to_string(),
            name: text("name").unwrap_or_else(|| id.to_string()),
            x,
            y,
            continent,
            city: text("city").unwrap_or_default(),
            place: text("place").unwrap_or_default(),
            kind: text("type").unwrap_or_else(|| "Unknown".to_string()),
            scale,
            main_location_name: text("main_location_name"),
        })
    }
}

fn coordinate(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Loaded once, immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct LocationResolver {
    points: Vec<LocationPoint>,
}

impl LocationResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_points(points: Vec<LocationPoint>) -> Self {
        Self { points }
    }

    /// Load the macro source first, then every micro source.
    ///
    /// Unreadable sources are logged and skipped.
    pub fn load_sources(macro_source: Option<&Path>, micro_sources: &[PathBuf]) -> Self {
        let mut resolver = Self::new();
        let sources = macro_source
            .map(|p| (p, Scale::Macro))
            .into_iter()
            .chain(micro_sources.iter().map(|p| (p.as_path(), Scale::Micro)));

        for (path, scale) in sources {
            if let Err(e) = resolver.load_file(path, scale) {
                tracing::error!("Skipping location source: {}", e);
            }
        }
        resolver
    }

    /// Load a directory: `macro_file_name` is the macro source, every other
    /// `*.json` file is micro.
    pub fn load_directory(dir: impl AsRef<Path>, macro_file_name: &str) -> Result<Self, LocationError> {
        let dir = dir.as_ref();
        let io_error = |source| LocationError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut micro = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            let is_json = path.extension().is_some_and(|ext| ext == "json");
            let is_macro = path.file_name().is_some_and(|name| name == macro_file_name);
            if is_json && !is_macro {
                micro.push(path);
            }
        }
        micro.sort();

        let macro_path = dir.join(macro_file_name);
        let macro_source = macro_path.exists().then_some(macro_path.as_path());
        Ok(Self::load_sources(macro_source, &micro))
    }

    /// Load one file. Returns how many points it contributed.
    pub fn load_file(&mut self, path: &Path, scale: Scale) -> Result<usize, LocationError> {
        let json = std::fs::read_to_string(path).map_err(|source| LocationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let added = self.load_json_str(&json, scale)?;
        tracing::debug!("Loaded {} {:?} locations from {}", added, scale, path.display());
        Ok(added)
    }

    /// Load a document of the form `{"nodes": {id: {x, y, continent, ...}}}`.
    pub fn load_json_str(&mut self, json: &str, scale: Scale) -> Result<usize, LocationError> {
        let document: Value = serde_json::from_str(json)?;
        let Some(nodes) = document.get("nodes").and_then(Value::as_object) else {
            return Ok(0);
        };

        let before = self.points.len();
        self.points.extend(
            nodes
                .iter()
                .filter_map(|(id, entry)| LocationPoint::from_entry(id, entry, scale)),
        );
        Ok(self.points.len() - before)
    }

    pub fn points(&self) -> &[LocationPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Point at a coordinate, within `tolerance`, preferring micro data on ties.
    ///
    /// Among the candidates whose distance is within [`TIE_BAND`] of the
    /// closest one, the first micro point wins; if none is micro, the
    /// closest candidate is returned.
    pub fn nearest_at(&self, x: f64, y: f64, continent: &str, tolerance: f64) -> Option<&LocationPoint> {
        self.closest(x, y, continent, Some(tolerance))
            .map(|(point, _)| point)
    }

    /// Closest point on a continent regardless of distance, with the same
    /// micro-over-macro tie-break as [`nearest_at`](Self::nearest_at).
    pub fn nearest(&self, x: f64, y: f64, continent: &str) -> Option<(&LocationPoint, f64)> {
        self.closest(x, y, continent, None)
    }

    fn closest(
        &self,
        x: f64,
        y: f64,
        continent: &str,
        tolerance: Option<f64>,
    ) -> Option<(&LocationPoint, f64)> {
        let mut candidates: Vec<(f64, &LocationPoint)> = self
            .points
            .iter()
            .filter(|p| p.on_continent(continent))
            .map(|p| (p.distance_to(x, y), p))
            .filter(|(d, _)| tolerance.map_or(true, |t| *d <= t))
            .collect();

        candidates.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let best = *candidates.first()?;
        let chosen = candidates
            .iter()
            .take_while(|(d, _)| (d - best.0).abs() < TIE_BAND)
            .find(|(_, p)| p.scale == Scale::Micro)
            .copied()
            .unwrap_or(best);
        Some((chosen.1, chosen.0))
    }

    /// Sorted distinct continents.
    pub fn continents(&self) -> Vec<String> {
        self.points
            .iter()
            .map(|p| p.continent.clone())
            .filter(|c| !c.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Sorted distinct location types.
    pub fn location_types(&self) -> Vec<String> {
        self.points
            .iter()
            .map(|p| p.kind.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Points filtered by continent and type, sorted by city then place (or name).
    pub fn locations(&self, continent: Option<&str>, kind: Option<&str>) -> Vec<&LocationPoint> {
        let mut filtered: Vec<_> = self
            .points
            .iter()
            .filter(|p| continent.map_or(true, |c| p.on_continent(c)))
            .filter(|p| kind.map_or(true, |k| p.kind == k))
            .collect();

        filtered.sort_by(|a, b| {
            let label = |p: &LocationPoint| {
                if p.place.is_empty() {
                    p.name.clone()
                } else {
                    p.place.clone()
                }
            };
            (a.city.as_str(), label(a)).cmp(&(b.city.as_str(), label(b)))
        });
        filtered
    }
}
