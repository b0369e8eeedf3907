//! Deployment manifest (`fabric.yaml`) model.
//!
//! The manifest groups relative resource paths by kind under a single
//! top-level `cortex` key (`fabric` is accepted as an alias). Unknown keys are
//! ignored. Loading is a structural parse only: entry order is preserved as
//! written and nothing is reordered here.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::utils::path;

pub const DEFAULT_MANIFEST_FILE: &str = "fabric.yaml";

/// Every resource kind a manifest can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Type,
    Dataset,
    Action,
    Skill,
    Agent,
    Snapshot,
    Campaign,
    Connection,
    Experiment,
    Model,
    ExperimentRun,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Type => "type",
            ResourceKind::Dataset => "dataset",
            ResourceKind::Action => "action",
            ResourceKind::Skill => "skill",
            ResourceKind::Agent => "agent",
            ResourceKind::Snapshot => "snapshot",
            ResourceKind::Campaign => "campaign",
            ResourceKind::Connection => "connection",
            ResourceKind::Experiment => "experiment",
            ResourceKind::Model => "model",
            ResourceKind::ExperimentRun => "experiment-run",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A manifest entry: the path as written plus its host-native form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub raw: String,
    pub path: PathBuf,
}

impl ResourceRef {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let path = path::normalize_separators(&raw);
        Self { raw, path }
    }

    pub fn resolve(&self, repo_dir: &Path) -> PathBuf {
        repo_dir.join(&self.path)
    }
}

/// Campaign entry: either a bare path or a path with import flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CampaignEntry {
    Path(String),
    Detailed {
        path: String,
        #[serde(default = "default_true")]
        deployable: bool,
        #[serde(default = "default_true")]
        overwrite: bool,
    },
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignRef {
    pub reference: ResourceRef,
    pub deployable: bool,
    pub overwrite: bool,
}

impl From<&CampaignEntry> for CampaignRef {
    fn from(entry: &CampaignEntry) -> Self {
        match entry {
            CampaignEntry::Path(path) => CampaignRef {
                reference: ResourceRef::new(path.as_str()),
                deployable: true,
                overwrite: true,
            },
            CampaignEntry::Detailed {
                path,
                deployable,
                overwrite,
            } => CampaignRef {
                reference: ResourceRef::new(path.as_str()),
                deployable: *deployable,
                overwrite: *overwrite,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub types: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub datasets: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub actions: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub skills: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub agents: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub snapshots: Vec<String>,
    #[serde(default, alias = "campaign", deserialize_with = "null_as_empty")]
    pub campaigns: Vec<CampaignEntry>,
    #[serde(default, alias = "connection", deserialize_with = "null_as_empty")]
    pub connections: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub experiments: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub models: Vec<String>,
    #[serde(default, alias = "runs", deserialize_with = "null_as_empty")]
    pub experiment_runs: Vec<String>,
    /// Informational only; never used to order or validate resources.
    #[serde(default)]
    pub dependencies: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
    #[serde(default, rename = "cortex", alias = "fabric")]
    resources: Option<Manifest>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Manifest {
    /// Entries for a single-file kind, in manifest order.
    ///
    /// Campaigns are directory-shaped and come from [`Manifest::campaigns`].
    pub fn resources(&self, kind: ResourceKind) -> Vec<ResourceRef> {
        let entries: &[String] = match kind {
            ResourceKind::Type => &self.types,
            ResourceKind::Dataset => &self.datasets,
            ResourceKind::Action => &self.actions,
            ResourceKind::Skill => &self.skills,
            ResourceKind::Agent => &self.agents,
            ResourceKind::Snapshot => &self.snapshots,
            ResourceKind::Connection => &self.connections,
            ResourceKind::Experiment => &self.experiments,
            ResourceKind::Model => &self.models,
            ResourceKind::ExperimentRun => &self.experiment_runs,
            ResourceKind::Campaign => &[],
        };
        entries.iter().map(|raw| ResourceRef::new(raw.as_str())).collect()
    }

    pub fn campaigns(&self) -> Vec<CampaignRef> {
        self.campaigns.iter().map(CampaignRef::from).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
            && self.datasets.is_empty()
            && self.actions.is_empty()
            && self.skills.is_empty()
            && self.agents.is_empty()
            && self.snapshots.is_empty()
            && self.campaigns.is_empty()
            && self.connections.is_empty()
            && self.experiments.is_empty()
            && self.models.is_empty()
            && self.experiment_runs.is_empty()
    }
}

/// Parse manifest text. `source` only labels errors.
pub fn parse(content: &str, source: &str) -> Result<Manifest> {
    if content.trim().is_empty() {
        return Ok(Manifest::default());
    }

    let file: ManifestFile =
        serde_yml::from_str(content).map_err(|e| Error::manifest_parse(source, e.to_string()))?;

    Ok(file.resources.unwrap_or_default())
}

pub fn load(manifest_path: &Path) -> Result<Manifest> {
    let display = manifest_path.display().to_string();
    if !manifest_path.is_file() {
        return Err(Error::manifest_read(display, "File not found"));
    }

    let content = std::fs::read_to_string(manifest_path)
        .map_err(|e| Error::manifest_read(display.clone(), e.to_string()))?;

    parse(&content, &display)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
cortex:
  actions:
    - actions/scorer/action.yaml
    - actions/loader/action.json
  skills:
    - skills/score.yaml
  snapshots:
    - snapshots\agent-snapshot.json
  campaign:
    - campaigns/campaignA
    - path: campaigns/campaignB
      deployable: false
  connection:
    - campaigns/campaignA/connections/c1.yaml
  dependencies:
    skills/score.yaml:
      - actions/scorer/action.yaml
  somethingNew: ignored
"#;

    #[test]
    fn parses_kinds_in_written_order() {
        let manifest = parse(SAMPLE, "fabric.yaml").unwrap();

        let actions = manifest.resources(ResourceKind::Action);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].raw, "actions/scorer/action.yaml");
        assert_eq!(actions[1].raw, "actions/loader/action.json");
        assert_eq!(manifest.resources(ResourceKind::Skill).len(), 1);
        assert!(manifest.resources(ResourceKind::Agent).is_empty());
        assert!(manifest.dependencies.is_some());
    }

    #[test]
    fn normalizes_separators_of_entries() {
        let manifest = parse(SAMPLE, "fabric.yaml").unwrap();
        let snapshot = &manifest.resources(ResourceKind::Snapshot)[0];

        assert_eq!(snapshot.raw, r"snapshots\agent-snapshot.json");
        assert_eq!(snapshot.path, Path::new("snapshots").join("agent-snapshot.json"));
    }

    #[test]
    fn campaign_entries_default_flags_to_true() {
        let manifest = parse(SAMPLE, "fabric.yaml").unwrap();
        let campaigns = manifest.campaigns();

        assert_eq!(campaigns.len(), 2);
        assert!(campaigns[0].deployable && campaigns[0].overwrite);
        assert!(!campaigns[1].deployable);
        assert!(campaigns[1].overwrite);
    }

    #[test]
    fn fabric_key_and_null_lists_are_accepted() {
        let manifest = parse("fabric:\n  actions:\n  agents: [agents/a.yaml]\n", "m").unwrap();
        assert!(manifest.actions.is_empty());
        assert_eq!(manifest.agents, vec!["agents/a.yaml".to_string()]);
    }

    #[test]
    fn wrong_shape_is_a_parse_error() {
        let err = parse("cortex:\n  actions: 42\n", "fabric.yaml").unwrap_err();
        assert_eq!(err.code.as_str(), "manifest.parse_error");
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        let err = parse("cortex: [unclosed", "fabric.yaml").unwrap_err();
        assert_eq!(err.code.as_str(), "manifest.parse_error");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = TempDir::new().unwrap();
        let err = load(&dir.path().join("fabric.yaml")).unwrap_err();
        assert_eq!(err.code.as_str(), "manifest.read_error");
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fabric.yaml");
        std::fs::write(&path, SAMPLE).unwrap();

        let manifest = load(&path).unwrap();
        assert_eq!(manifest.connections.len(), 1);
        assert!(!manifest.is_empty());
    }
}
