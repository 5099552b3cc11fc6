//! On-disk project state.
//!
//! A project `NAME` in a directory is three JSON files:
//! `NAME_components.json`, `NAME_connections.json` and `NAME_nets.json`.
//! Saving rewrites all three, each through a temporary file that is renamed
//! over the target, so an interrupted save never leaves a truncated file.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::component::{Component, ComponentStore};
use crate::config::Settings;
use crate::error::{ProbeError, Result};
use crate::pin::{PinId, PinRegistry};
use crate::project::Project;

#[derive(Serialize)]
struct ComponentsFile<'a> {
    project: &'a str,
    timestamp: DateTime<Utc>,
    component_count: usize,
    components: &'a BTreeMap<String, Component>,
}

#[derive(Serialize)]
struct ConnectionsFile<'a> {
    project: &'a str,
    timestamp: DateTime<Utc>,
    connection_count: usize,
    connections: Vec<[String; 2]>,
}

#[derive(Serialize)]
struct NetsFile<'a> {
    project: &'a str,
    timestamp: DateTime<Utc>,
    name_count: usize,
    net_names: BTreeMap<String, &'a str>,
}

// Loading ignores the envelope fields, so files written by older tools
// (timestamps without a zone, missing counts) still load.

#[derive(Deserialize)]
struct SavedComponents {
    #[serde(default)]
    components: BTreeMap<String, Component>,
}

#[derive(Deserialize)]
struct SavedConnections {
    #[serde(default)]
    connections: Vec<(String, String)>,
}

#[derive(Deserialize)]
struct SavedNets {
    #[serde(default)]
    net_names: BTreeMap<String, String>,
}

/// Locations of one project's state files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFiles {
    dir: PathBuf,
    name: String,
}

impl ProjectFiles {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn components_path(&self) -> PathBuf {
        self.path_for("components.json")
    }

    pub fn connections_path(&self) -> PathBuf {
        self.path_for("connections.json")
    }

    pub fn nets_path(&self) -> PathBuf {
        self.path_for("nets.json")
    }

    /// `<dir>/<name>_<suffix>`, used for state and export files alike.
    pub fn path_for(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}_{}", self.name, suffix))
    }

    /// Whether any state file exists yet.
    pub fn exists(&self) -> bool {
        self.components_path().exists()
            || self.connections_path().exists()
            || self.nets_path().exists()
    }

    /// Load the project. Missing files count as empty state.
    pub fn load(&self, settings: Settings) -> Result<Project> {
        let registry = PinRegistry::new(&settings);

        let components_path = self.components_path();
        let components = read_json::<SavedComponents>(&components_path)?
            .map(|saved| saved.components)
            .unwrap_or_default();
        let components = ComponentStore::from_map(components);

        let connections_path = self.connections_path();
        let edges = read_json::<SavedConnections>(&connections_path)?
            .map(|saved| saved.connections)
            .unwrap_or_default()
            .into_iter()
            .map(|(a, b)| {
                Ok((
                    load_pin(&registry, &components, &connections_path, &a)?,
                    load_pin(&registry, &components, &connections_path, &b)?,
                ))
            })
            .collect::<Result<Vec<(PinId, PinId)>>>()?;

        let nets_path = self.nets_path();
        let bindings = read_json::<SavedNets>(&nets_path)?
            .map(|saved| saved.net_names)
            .unwrap_or_default()
            .into_iter()
            .map(|(pin, name)| Ok((load_pin(&registry, &components, &nets_path, &pin)?, name)))
            .collect::<Result<Vec<(PinId, String)>>>()?;

        tracing::info!(
            "Loaded {} components, {} connections, {} net names for '{}'",
            components.len(),
            edges.len(),
            bindings.len(),
            self.name
        );
        let mut project = Project::new(self.name.clone(), settings);
        project.restore(components, edges, bindings);
        Ok(project)
    }

    /// Write all three state files.
    pub fn save(&self, project: &Project) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let timestamp = Utc::now();

        write_json(
            &self.components_path(),
            &ComponentsFile {
                project: project.name(),
                timestamp,
                component_count: project.components().len(),
                components: project.components().as_map(),
            },
        )?;

        write_json(
            &self.connections_path(),
            &ConnectionsFile {
                project: project.name(),
                timestamp,
                connection_count: project.connections().len(),
                connections: project
                    .connections()
                    .iter()
                    .map(|c| [c.a().to_string(), c.b().to_string()])
                    .collect(),
            },
        )?;

        let net_names: BTreeMap<String, &str> = project
            .net_names()
            .iter()
            .map(|(pin, name)| (pin.to_string(), name))
            .collect();
        write_json(
            &self.nets_path(),
            &NetsFile {
                project: project.name(),
                timestamp,
                name_count: net_names.len(),
                net_names,
            },
        )?;

        tracing::info!(
            "Saved {} components, {} connections to {}",
            project.components().len(),
            project.connections().len(),
            self.dir.display()
        );
        Ok(())
    }
}

fn load_pin(
    registry: &PinRegistry,
    components: &ComponentStore,
    path: &Path,
    text: &str,
) -> Result<PinId> {
    registry
        .canonicalize(text, components)
        .map_err(|e| ProbeError::corrupt(path, e.to_string()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        tracing::debug!("{} not found, starting empty", path.display());
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)?;
    let value = serde_json::from_str(&text).map_err(|e| ProbeError::corrupt(path, e.to_string()))?;
    Ok(Some(value))
}

/// Serialize `value` next to `path`, then atomically rename it into place.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut file, value)?;
    file.write_all(b"\n")?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
