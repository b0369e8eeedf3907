//! Platform API client.
//!
//! One client serves both API shapes: the account-scoped API reached with a
//! static token or password login, and the project-scoped API reached with a
//! signed access credential. The shape is fixed when the client is built and
//! decides both the URL layout and which resource kinds are available.

pub(crate) mod endpoints;

use serde_json::Value;
use std::path::Path;

use crate::error::{Error, Result};
use crate::http::{self, Body, HttpRequest, HttpResponse, Method, Transport};
use crate::manifest::ResourceKind;
use crate::resource::str_field;
use crate::utils::path;

const DRAFT_MODEL_STATUS: &str = "In development";
const PUBLISHED_MODEL_STATUS: &str = "published";
const CAMPAIGN_FORM_FIELD: &str = "file";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiScope {
    Account(String),
    Project(String),
}

impl ApiScope {
    pub fn label(&self) -> &'static str {
        match self {
            ApiScope::Account(_) => "account-scoped",
            ApiScope::Project(_) => "project-scoped",
        }
    }

    /// Account or project name; also the default image namespace.
    pub fn name(&self) -> &str {
        match self {
            ApiScope::Account(name) | ApiScope::Project(name) => name,
        }
    }

    pub fn supports(&self, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Type
            | ResourceKind::Dataset
            | ResourceKind::Action
            | ResourceKind::Skill
            | ResourceKind::Agent
            | ResourceKind::Snapshot
            | ResourceKind::Connection => true,
            ResourceKind::Campaign
            | ResourceKind::Experiment
            | ResourceKind::Model
            | ResourceKind::ExperimentRun => matches!(self, ApiScope::Project(_)),
        }
    }

    pub fn require(&self, kind: ResourceKind) -> Result<()> {
        if self.supports(kind) {
            Ok(())
        } else {
            Err(Error::unsupported_kind(kind.as_str(), self.label()))
        }
    }
}

pub struct PlatformClient<'t> {
    scope: ApiScope,
    base_url: String,
    token: String,
    transport: &'t dyn Transport,
}

impl std::fmt::Debug for PlatformClient<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformClient")
            .field("scope", &self.scope)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

fn encode(payload: &Value) -> Result<Vec<u8>> {
    serde_json::to_vec(payload)
        .map_err(|e| Error::internal_json(e.to_string(), Some("encode payload".to_string())))
}

fn response_value(response: HttpResponse) -> Value {
    response.json().unwrap_or(Value::String(response.body))
}

impl<'t> PlatformClient<'t> {
    pub fn new(
        scope: ApiScope,
        base_url: impl Into<String>,
        token: impl Into<String>,
        transport: &'t dyn Transport,
    ) -> Self {
        Self {
            scope,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            transport,
        }
    }

    pub fn scope(&self) -> &ApiScope {
        &self.scope
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    fn send(&self, method: Method, url: String, body: Body) -> Result<HttpResponse> {
        tracing::debug!("{} {}", method.as_str(), url);
        http::execute(
            self.transport,
            HttpRequest::new(method, url).bearer(&self.token).body(body),
        )
    }

    fn post_json(&self, url: String, payload: &Value) -> Result<Value> {
        let body = Body::Json(encode(payload)?);
        self.send(Method::Post, url, body).map(response_value)
    }

    fn project(&self, kind: ResourceKind) -> Result<&str> {
        match &self.scope {
            ApiScope::Project(project) => Ok(project),
            ApiScope::Account(_) => Err(Error::unsupported_kind(kind.as_str(), self.scope.label())),
        }
    }

    /// Private registry host for this account or project.
    pub fn docker_registry_url(&self) -> Result<String> {
        let response = self.send(
            Method::Get,
            endpoints::registry_config(&self.base_url),
            Body::Empty,
        )?;
        let registry = response
            .json()
            .as_ref()
            .and_then(|v| v.pointer("/config/dockerPrivateRegistryUrl"))
            .and_then(Value::as_str)
            .map(|url| url.trim_end_matches('/').to_string())
            .ok_or_else(|| {
                Error::internal_json(
                    "config.dockerPrivateRegistryUrl missing from registry config",
                    Some(endpoints::registry_config(&self.base_url)),
                )
            })?;

        Ok(format!("{}/{}", registry, self.scope.name()))
    }

    /// Create one resource of a single-request kind.
    ///
    /// Models go through the draft/promote sequence. Snapshots, campaigns and
    /// experiment runs need more than a payload and have their own entry points.
    pub fn deploy(&self, kind: ResourceKind, payload: &Value) -> Result<Value> {
        self.scope.require(kind)?;

        if kind == ResourceKind::Model {
            return self.deploy_model(payload);
        }

        let url = endpoints::collection(&self.base_url, &self.scope, kind).ok_or_else(|| {
            Error::validation_invalid_argument(
                "kind",
                format!("{} resources cannot be deployed from a single payload", kind),
                None,
            )
        })?;

        let url = if kind == ResourceKind::Action {
            let action_type = str_field(payload, "actionType").or_else(|| str_field(payload, "type"));
            endpoints::actions(url, action_type)
        } else {
            url
        };

        self.post_json(url, payload)
    }

    /// Published models are created as drafts first, then posted as given.
    pub fn deploy_model(&self, payload: &Value) -> Result<Value> {
        self.scope.require(ResourceKind::Model)?;
        let url = endpoints::collection(&self.base_url, &self.scope, ResourceKind::Model)
            .ok_or_else(|| Error::unsupported_kind("model", self.scope.label()))?;

        let published = str_field(payload, "status")
            .map(|status| status.eq_ignore_ascii_case(PUBLISHED_MODEL_STATUS))
            .unwrap_or(false);

        if published {
            let mut draft = payload.clone();
            draft["status"] = Value::String(DRAFT_MODEL_STATUS.to_string());
            self.post_json(url.clone(), &draft)?;
        }

        self.post_json(url, payload)
    }

    /// Replace an experiment run and upload its artifacts.
    ///
    /// `artifacts_dir` is the directory the run's `artifacts` filenames are
    /// relative to.
    pub fn deploy_experiment_run(&self, payload: &Value, artifacts_dir: &Path) -> Result<Value> {
        let project = self.project(ResourceKind::ExperimentRun)?;

        let experiment = str_field(payload, "experimentName").ok_or_else(|| {
            Error::validation_invalid_argument("experimentName", "Experiment run has no experimentName", None)
        })?;
        let run_id = str_field(payload, "runId").ok_or_else(|| {
            Error::validation_invalid_argument("runId", "Experiment run has no runId", None)
        })?;

        let existing = endpoints::run(&self.base_url, project, experiment, run_id);
        if let Err(e) = self.send(Method::Delete, existing, Body::Empty) {
            tracing::debug!("Ignoring failed delete of run {}: {}", run_id, e);
        }

        let created = self.post_json(endpoints::runs(&self.base_url, project, experiment), payload)?;

        if let Some(artifacts) = payload.get("artifacts").and_then(Value::as_object) {
            for (key, file) in artifacts {
                let file = file.as_str().ok_or_else(|| {
                    Error::artifact_io(key.clone(), "artifact filename must be a string")
                })?;
                let location = artifacts_dir.join(path::normalize_separators(file));
                let content = std::fs::read(&location)
                    .map_err(|e| Error::artifact_io(location.display().to_string(), e.to_string()))?;

                tracing::info!("Uploading artifact {} for run {}", key, run_id);
                self.send(
                    Method::Put,
                    endpoints::run_artifact(&self.base_url, project, experiment, run_id, key),
                    Body::Binary(content),
                )?;
            }
        }

        Ok(created)
    }

    /// Upload a packed campaign archive through the import endpoint.
    pub fn deploy_campaign(&self, archive: &Path, deployable: bool, overwrite: bool) -> Result<Value> {
        let project = self.project(ResourceKind::Campaign)?;

        let content = std::fs::read(archive)
            .map_err(|e| Error::archive_io(archive.display().to_string(), e.to_string()))?;
        let file_name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "campaign.zip".to_string());

        self.send(
            Method::Post,
            endpoints::campaign_import(&self.base_url, project, deployable, overwrite),
            Body::Multipart {
                field: CAMPAIGN_FORM_FIELD.to_string(),
                file_name,
                content,
            },
        )
        .map(response_value)
    }
}
