//! Run-scoped table of freshly published images and its use on exported
//! snapshot actions.

use serde_json::Value;
use std::collections::HashMap;

use crate::resource::str_field;

/// Short image name (no registry, namespace or tag).
///
/// `registry.example.com/acme/scorer:abc1234-main` becomes `scorer`.
pub fn docker_image_name(reference: &str) -> &str {
    let last = reference.rsplit('/').next().unwrap_or(reference);
    last.split(':').next().unwrap_or(last)
}

/// Short image name to fully qualified reference built in this run.
///
/// Keys are lowercased on insert and lookup, matching how image names are
/// normalized at build time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionImageMapping {
    images: HashMap<String, String>,
}

impl ActionImageMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_references<I, S>(references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut mapping = Self::new();
        for reference in references {
            mapping.insert(reference);
        }
        mapping
    }

    pub fn insert(&mut self, reference: impl Into<String>) {
        let reference = reference.into();
        self.images
            .insert(docker_image_name(&reference).to_lowercase(), reference);
    }

    pub fn get(&self, image: &str) -> Option<&str> {
        self.images
            .get(&docker_image_name(image).to_lowercase())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Outcome of substituting an exported action's image.
#[derive(Debug, Clone, PartialEq)]
pub enum Substitution {
    Replaced(Value),
    /// The image was not built in this run; carries the warning text.
    Missing(String),
}

/// Point an exported action at the image built in this run.
///
/// On a hit `image` is replaced and a string-encoded `podSpec` is parsed into
/// structured JSON so it is sent as an object. On a miss the action is left
/// untouched and a warning naming the image and action is returned.
pub fn substitute_action_image(action: &Value, mapping: &ActionImageMapping) -> Substitution {
    let image = str_field(action, "image").unwrap_or_default();

    let Some(reference) = mapping.get(image) else {
        return Substitution::Missing(format!(
            "Docker image {} used by action {} is not built in this run, make sure it exists in the docker registry",
            image,
            str_field(action, "name").unwrap_or("<unnamed>")
        ));
    };

    let mut updated = action.clone();
    updated["image"] = Value::String(reference.to_string());

    if let Some(pod_spec) = str_field(action, "podSpec") {
        match serde_json::from_str::<Value>(pod_spec) {
            Ok(parsed) => updated["podSpec"] = parsed,
            Err(e) => tracing::debug!("Leaving unparseable podSpec as a string: {}", e),
        }
    }

    Substitution::Replaced(updated)
}

/// Substitute images across a snapshot's action list.
///
/// Returns the rewritten list and one warning per action whose image was not
/// built in this run. Non-array input is returned unchanged.
pub fn resolve_action_images(actions: &Value, mapping: &ActionImageMapping) -> (Value, Vec<String>) {
    let Some(list) = actions.as_array() else {
        return (actions.clone(), Vec::new());
    };

    let mut warnings = Vec::new();
    let rewritten = list
        .iter()
        .map(|action| match substitute_action_image(action, mapping) {
            Substitution::Replaced(updated) => updated,
            Substitution::Missing(warning) => {
                warnings.push(warning);
                action.clone()
            }
        })
        .collect();

    (Value::Array(rewritten), warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn short_name_strips_registry_namespace_and_tag() {
        assert_eq!(docker_image_name("registry.example.com/acme/scorer:abc-main"), "scorer");
        assert_eq!(docker_image_name("scorer:1.0"), "scorer");
        assert_eq!(docker_image_name("scorer"), "scorer");
        assert_eq!(docker_image_name("host:5000/acme/loader"), "loader");
    }

    #[test]
    fn mapping_is_keyed_by_short_name() {
        let mapping =
            ActionImageMapping::from_references(["registry.example.com/acme/scorer:abc-main"]);
        assert_eq!(
            mapping.get("old.registry/other/scorer:latest"),
            Some("registry.example.com/acme/scorer:abc-main")
        );
        assert_eq!(mapping.len(), 1);
    }

    #[test]
    fn lookup_ignores_case_of_exported_image_name() {
        let mapping = ActionImageMapping::from_references(["registry.example.com/acme/scorer:abc-main"]);
        assert_eq!(
            mapping.get("Old/Scorer:1"),
            Some("registry.example.com/acme/scorer:abc-main")
        );

        let mapping = ActionImageMapping::from_references(["registry.example.com/acme/Loader:abc-main"]);
        assert!(mapping.get("old/loader:1").is_some());
    }

    #[test]
    fn hit_replaces_image_and_structures_pod_spec() {
        let mapping = ActionImageMapping::from_references(["r.example.com/acme/foo:abc-main"]);
        let action = json!({
            "name": "foo-action",
            "image": "old.example.com/other/foo:latest",
            "podSpec": "[{\"name\":\"c\",\"resources\":{\"limits\":{\"cpu\":\"1\"}}}]"
        });

        match substitute_action_image(&action, &mapping) {
            Substitution::Replaced(updated) => {
                assert_eq!(updated["image"], "r.example.com/acme/foo:abc-main");
                assert_eq!(updated["podSpec"][0]["resources"]["limits"]["cpu"], "1");
            }
            other => panic!("expected replacement, got {:?}", other),
        }
    }

    #[test]
    fn miss_leaves_action_and_warns() {
        let action = json!({"name": "bar-action", "image": "old/bar:1"});

        match substitute_action_image(&action, &ActionImageMapping::new()) {
            Substitution::Missing(warning) => {
                assert!(warning.contains("old/bar:1"));
                assert!(warning.contains("bar-action"));
            }
            other => panic!("expected miss, got {:?}", other),
        }
    }

    #[test]
    fn list_resolution_collects_one_warning_per_miss() {
        let mapping = ActionImageMapping::from_references(["r/ns/foo:abc123"]);
        let actions = json!([
            {"name": "a", "image": "old/foo:1"},
            {"name": "b", "image": "old/bar:1"},
        ]);

        let (rewritten, warnings) = resolve_action_images(&actions, &mapping);

        assert_eq!(rewritten[0]["image"], "r/ns/foo:abc123");
        assert_eq!(rewritten[1]["image"], "old/bar:1");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("bar"));
    }
}
