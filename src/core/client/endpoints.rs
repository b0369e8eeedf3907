//! URL layout of both platform API shapes.

use url::Url;

use super::ApiScope;
use crate::manifest::ResourceKind;

const PROJECTS_PREFIX: &str = "/fabric/v4/projects";
const REGISTRY_CONFIG: &str = "/v3/actions/_config";

/// Percent-encode one path segment (`/` included).
pub(crate) fn segment(raw: &str) -> String {
    let mut url = match Url::parse("http://localhost/") {
        Ok(url) => url,
        Err(_) => return raw.to_string(),
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.clear().push(raw);
    }
    url.path().trim_start_matches('/').to_string()
}

fn query_value(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

fn project_root(base_url: &str, project: &str) -> String {
    format!("{}{}/{}", base_url, PROJECTS_PREFIX, segment(project))
}

/// Collection endpoint that accepts a POST of `kind`, if the scope has one.
pub(crate) fn collection(base_url: &str, scope: &ApiScope, kind: ResourceKind) -> Option<String> {
    match scope {
        ApiScope::Account(_) => {
            let path = match kind {
                ResourceKind::Type => "/v3/catalog/types",
                ResourceKind::Dataset => "/v3/datasets",
                ResourceKind::Action => "/v3/actions",
                ResourceKind::Skill => "/v3/catalog/skills",
                ResourceKind::Agent => "/v3/catalog/agents",
                ResourceKind::Connection => "/v2/connections",
                _ => return None,
            };
            Some(format!("{}{}", base_url, path))
        }
        ApiScope::Project(project) => {
            let collection = match kind {
                ResourceKind::Type => "types",
                ResourceKind::Dataset => "datasets",
                ResourceKind::Action => "actions",
                ResourceKind::Skill => "skills",
                ResourceKind::Agent => "agents",
                ResourceKind::Connection => "connections",
                ResourceKind::Model => "models",
                ResourceKind::Experiment => "experiments",
                _ => return None,
            };
            Some(format!("{}/{}", project_root(base_url, project), collection))
        }
    }
}

/// Action collection with the optional `actionType` filter appended.
pub(crate) fn actions(base: String, action_type: Option<&str>) -> String {
    match action_type {
        Some(kind) => format!("{}?actionType={}", base, query_value(kind)),
        None => base,
    }
}

pub(crate) fn runs(base_url: &str, project: &str, experiment: &str) -> String {
    format!(
        "{}/experiments/{}/runs",
        project_root(base_url, project),
        segment(experiment)
    )
}

pub(crate) fn run(base_url: &str, project: &str, experiment: &str, run_id: &str) -> String {
    format!("{}/{}", runs(base_url, project, experiment), segment(run_id))
}

pub(crate) fn run_artifact(
    base_url: &str,
    project: &str,
    experiment: &str,
    run_id: &str,
    key: &str,
) -> String {
    format!(
        "{}/artifacts/{}",
        run(base_url, project, experiment, run_id),
        segment(key)
    )
}

pub(crate) fn campaign_import(base_url: &str, project: &str, deployable: bool, overwrite: bool) -> String {
    format!(
        "{}/campaigns/import?deployable={}&overwrite={}",
        project_root(base_url, project),
        deployable,
        overwrite
    )
}

pub(crate) fn registry_config(base_url: &str) -> String {
    format!("{}{}", base_url, REGISTRY_CONFIG)
}

pub(crate) fn login(base_url: &str, account: &str) -> String {
    format!("{}/v2/admin/{}/users/authenticate", base_url, segment(account))
}
