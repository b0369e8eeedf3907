//! Manifest-driven deployment.
//!
//! Resources are deployed one at a time in [`DEPLOY_ORDER`], so anything a
//! resource may reference already exists when it is created. Within a kind,
//! entries go out in manifest order. Every failure is fatal except a
//! campaign upload, which is recorded and skipped.

mod snapshot;

use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::campaign;
use crate::client::PlatformClient;
use crate::error::Result;
use crate::images::ActionImageMapping;
use crate::manifest::{self, Manifest, ResourceKind, ResourceRef};
use crate::resource::{self, str_field};
use crate::transform::{self, TransformContext, Transformer};
use crate::utils::{io, path};

/// Directory under the repo holding transformer scripts and run artifacts.
pub const FABRIC_DIR: &str = ".fabric";

pub const DEPLOY_ORDER: [ResourceKind; 11] = [
    ResourceKind::Type,
    ResourceKind::Dataset,
    ResourceKind::Action,
    ResourceKind::Skill,
    ResourceKind::Agent,
    ResourceKind::Snapshot,
    ResourceKind::Campaign,
    ResourceKind::Connection,
    ResourceKind::Experiment,
    ResourceKind::Model,
    ResourceKind::ExperimentRun,
];

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeployedResource {
    /// Manifest kind the entry was listed under.
    pub stage: ResourceKind,
    /// Kind actually created; differs from `stage` for snapshot parts.
    pub kind: ResourceKind,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailedCampaign {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploySummary {
    pub manifest: String,
    pub deployed: Vec<DeployedResource>,
    pub skipped_connections: Vec<String>,
    pub failed_campaigns: Vec<FailedCampaign>,
    pub warnings: Vec<String>,
}

impl DeploySummary {
    fn warn(&mut self, warning: String) {
        tracing::warn!("{}", warning);
        self.warnings.push(warning);
    }
}

/// Inputs of one deployment run.
#[derive(Debug, Clone, Copy)]
pub struct DeployRequest<'a> {
    pub repo_dir: &'a Path,
    /// Manifest location relative to `repo_dir`, as given on the command line.
    pub manifest_file: &'a str,
    pub images: &'a ActionImageMapping,
    pub environment: &'a [(String, String)],
}

pub struct Deployer<'a, 't> {
    client: &'a PlatformClient<'t>,
    transformer: &'a dyn Transformer,
}

impl<'a, 't> Deployer<'a, 't> {
    pub fn new(client: &'a PlatformClient<'t>, transformer: &'a dyn Transformer) -> Self {
        Self {
            client,
            transformer,
        }
    }

    /// Deploy everything the manifest lists.
    ///
    /// The transformer staging directory is removed afterwards whether or not
    /// the run succeeded.
    pub fn run(&self, request: &DeployRequest) -> Result<DeploySummary> {
        let manifest_path = request
            .repo_dir
            .join(path::normalize_separators(request.manifest_file));
        let manifest = manifest::load(&manifest_path)?;

        let mut summary = DeploySummary {
            manifest: manifest_path.display().to_string(),
            ..DeploySummary::default()
        };

        if manifest.is_empty() {
            summary.warn(format!("Manifest {} lists no resources", summary.manifest));
        }

        let outcome = self.deploy_manifest(&manifest, request, &mut summary);

        let staging = transform::staging_dir(request.repo_dir);
        if let Some(warning) = io::remove_dir_all_quietly(&staging) {
            summary.warn(warning);
        }

        outcome.map(|()| {
            tracing::info!(
                "Deployed {} resource(s) from manifest {}",
                summary.deployed.len(),
                summary.manifest
            );
            summary
        })
    }

    fn deploy_manifest(
        &self,
        manifest: &Manifest,
        request: &DeployRequest,
        summary: &mut DeploySummary,
    ) -> Result<()> {
        let mut campaign_prefixes: Vec<PathBuf> = Vec::new();

        for kind in DEPLOY_ORDER {
            match kind {
                ResourceKind::Campaign => {
                    campaign_prefixes = self.deploy_campaigns(manifest, request, summary)?;
                }
                ResourceKind::Snapshot => {
                    for entry in manifest.resources(kind) {
                        self.deploy_snapshot(&entry, request, summary)?;
                    }
                }
                _ => {
                    let entries = manifest.resources(kind);
                    if !entries.is_empty() {
                        self.client.scope().require(kind)?;
                    }
                    for entry in entries {
                        if kind == ResourceKind::Connection
                            && campaign_prefixes
                                .iter()
                                .any(|prefix| campaign::contains(prefix, &entry.raw))
                        {
                            tracing::info!("Skipping connection {} deployed with its campaign", entry.raw);
                            summary.skipped_connections.push(entry.raw.clone());
                            continue;
                        }
                        self.deploy_resource(kind, &entry, request, summary)?;
                    }
                }
            }
        }

        Ok(())
    }

    fn load(&self, kind: ResourceKind, entry: &ResourceRef, request: &DeployRequest) -> Result<Value> {
        let value = resource::read_resource(&entry.resolve(request.repo_dir))?;
        let context = TransformContext {
            kind,
            repo_dir: request.repo_dir,
            manifest_file: request.manifest_file,
            environment: request.environment,
        };
        self.transformer.transform(&entry.path, value, &context)
    }

    fn deploy_resource(
        &self,
        kind: ResourceKind,
        entry: &ResourceRef,
        request: &DeployRequest,
        summary: &mut DeploySummary,
    ) -> Result<()> {
        let payload = self.load(kind, entry, request)?;

        let result = if kind == ResourceKind::ExperimentRun {
            let artifacts_dir = request.repo_dir.join(FABRIC_DIR);
            self.client.deploy_experiment_run(&payload, &artifacts_dir)
        } else {
            self.client.deploy(kind, &payload)
        };
        let response = result.map_err(|e| e.for_resource(&entry.raw))?;

        tracing::info!("Deployed {} {}", kind, entry.raw);
        tracing::debug!("Response: {}", response);

        summary.deployed.push(DeployedResource {
            stage: kind,
            kind,
            path: entry.raw.clone(),
            name: str_field(&payload, "name").map(str::to_string),
        });
        Ok(())
    }

    fn deploy_snapshot(
        &self,
        entry: &ResourceRef,
        request: &DeployRequest,
        summary: &mut DeploySummary,
    ) -> Result<()> {
        let value = self.load(ResourceKind::Snapshot, entry, request)?;
        let parts = snapshot::deploy_snapshot(self.client, &value, request.images, &mut summary.warnings)
            .map_err(|e| e.for_resource(&entry.raw))?;

        tracing::info!("Deployed snapshot {}", entry.raw);
        summary
            .deployed
            .extend(parts.into_iter().map(|part| DeployedResource {
                stage: ResourceKind::Snapshot,
                kind: part.kind,
                path: entry.raw.clone(),
                name: part.name,
            }));
        Ok(())
    }

    /// Upload every campaign; returns the directories of those that succeeded.
    fn deploy_campaigns(
        &self,
        manifest: &Manifest,
        request: &DeployRequest,
        summary: &mut DeploySummary,
    ) -> Result<Vec<PathBuf>> {
        let campaigns = manifest.campaigns();
        if campaigns.is_empty() {
            return Ok(Vec::new());
        }
        self.client.scope().require(ResourceKind::Campaign)?;

        let mut deployed = Vec::new();
        for entry in campaigns {
            let raw = entry.reference.raw.clone();
            let dir = campaign::campaign_dir(request.repo_dir, &entry.reference);
            let archive = campaign::pack(&dir).map_err(|e| e.for_resource(&raw))?;

            let result = self
                .client
                .deploy_campaign(&archive, entry.deployable, entry.overwrite);

            if let Err(e) = std::fs::remove_file(&archive) {
                summary.warn(format!("Failed to remove {}: {}", archive.display(), e));
            }

            match result {
                Ok(_) => {
                    tracing::info!("Deployed campaign {}", raw);
                    deployed.push(campaign::campaign_prefix(request.repo_dir, &entry.reference));
                    summary.deployed.push(DeployedResource {
                        stage: ResourceKind::Campaign,
                        kind: ResourceKind::Campaign,
                        path: raw,
                        name: dir.file_name().map(|n| n.to_string_lossy().into_owned()),
                    });
                }
                Err(e) => {
                    let error = e.to_string();
                    summary.warn(format!("Campaign {} deployment failed: {}", raw, error));
                    summary.failed_campaigns.push(FailedCampaign { path: raw, error });
                }
            }
        }

        Ok(deployed)
    }
}
