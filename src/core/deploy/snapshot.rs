//! Exported agent snapshots, deployed as their constituent resources.

use serde_json::Value;

use crate::client::PlatformClient;
use crate::error::{Error, Result};
use crate::images::{self, ActionImageMapping};
use crate::manifest::ResourceKind;
use crate::resource::str_field;

/// One resource created while deploying a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SnapshotPart {
    pub kind: ResourceKind,
    pub name: Option<String>,
}

fn dependency_list(snapshot: &Value, key: &str) -> Vec<Value> {
    match snapshot.pointer(&format!("/dependencies/{}", key)) {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Object(map)) => map.values().cloned().collect(),
        _ => Vec::new(),
    }
}

/// Deploy a snapshot's types, datasets, actions, skills and finally its agent.
///
/// Actions have their images pointed at this run's builds first; misses are
/// appended to `warnings`.
pub(crate) fn deploy_snapshot(
    client: &PlatformClient,
    snapshot: &Value,
    images: &ActionImageMapping,
    warnings: &mut Vec<String>,
) -> Result<Vec<SnapshotPart>> {
    let agent = snapshot
        .get("agent")
        .filter(|agent| !agent.is_null())
        .ok_or_else(|| Error::validation_invalid_argument("agent", "Snapshot has no agent", None))?;

    let (actions, misses) =
        images::resolve_action_images(&Value::Array(dependency_list(snapshot, "actions")), images);
    for warning in misses {
        tracing::warn!("{}", warning);
        warnings.push(warning);
    }
    let actions = match actions {
        Value::Array(items) => items,
        _ => Vec::new(),
    };

    let plan = [
        (ResourceKind::Type, dependency_list(snapshot, "types")),
        (ResourceKind::Dataset, dependency_list(snapshot, "datasets")),
        (ResourceKind::Action, actions),
        (ResourceKind::Skill, dependency_list(snapshot, "skills")),
        (ResourceKind::Agent, vec![agent.clone()]),
    ];

    let mut parts = Vec::new();
    for (kind, payloads) in plan {
        for payload in payloads {
            let name = str_field(&payload, "name").map(str::to_string);
            client.deploy(kind, &payload)?;
            tracing::info!(
                "Deployed snapshot {} {}",
                kind,
                name.as_deref().unwrap_or("<unnamed>")
            );
            parts.push(SnapshotPart { kind, name });
        }
    }

    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiScope;
    use crate::http::fake::RecordingTransport;
    use serde_json::json;

    fn snapshot() -> Value {
        json!({
            "agent": {"name": "agent-1"},
            "dependencies": {
                "skills": [{"name": "skill-1"}],
                "actions": [{
                    "name": "foo-action",
                    "type": "daemon",
                    "image": "old.example.com/x/foo:1",
                    "podSpec": "[{\"name\":\"c\"}]"
                }],
                "datasets": [{"name": "ds-1"}],
                "types": [{"name": "type-1"}]
            }
        })
    }

    #[test]
    fn parts_are_deployed_in_dependency_order() {
        let transport = RecordingTransport::ok();
        let client = PlatformClient::new(ApiScope::Account("acme".into()), "https://api", "t", &transport);
        let mapping = ActionImageMapping::from_references(["reg/acme/foo:abc123"]);
        let mut warnings = Vec::new();

        let parts = deploy_snapshot(&client, &snapshot(), &mapping, &mut warnings).unwrap();

        let kinds: Vec<ResourceKind> = parts.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::Type,
                ResourceKind::Dataset,
                ResourceKind::Action,
                ResourceKind::Skill,
                ResourceKind::Agent
            ]
        );
        assert!(warnings.is_empty());

        let requests = transport.requests.borrow();
        assert_eq!(requests[2].url, "https://api/v3/actions?actionType=daemon");
        let action = requests[2].json_body().unwrap();
        assert_eq!(action["image"], "reg/acme/foo:abc123");
        assert_eq!(action["podSpec"][0]["name"], "c");
    }

    #[test]
    fn unbuilt_image_is_kept_with_a_warning() {
        let transport = RecordingTransport::ok();
        let client = PlatformClient::new(ApiScope::Account("acme".into()), "https://api", "t", &transport);
        let mut warnings = Vec::new();

        deploy_snapshot(&client, &snapshot(), &ActionImageMapping::new(), &mut warnings).unwrap();

        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("foo"));
        let action = transport.requests.borrow()[2].json_body().unwrap();
        assert_eq!(action["image"], "old.example.com/x/foo:1");
    }

    #[test]
    fn snapshot_without_agent_is_rejected_before_any_call() {
        let transport = RecordingTransport::ok();
        let client = PlatformClient::new(ApiScope::Account("acme".into()), "https://api", "t", &transport);

        let err = deploy_snapshot(&client, &json!({"dependencies": {}}), &ActionImageMapping::new(), &mut Vec::new())
            .unwrap_err();

        assert_eq!(err.code.as_str(), "validation.invalid_argument");
        assert!(transport.calls().is_empty());
    }
}
