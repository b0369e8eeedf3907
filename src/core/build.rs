//! Container image builds for the actions in a repo.
//!
//! Every `Dockerfile` under the repo produces one image named after the
//! Dockerfile's directory. Images are built locally as `<namespace>/<name>:<tag>`,
//! tagged for the target registry and pushed. The pushed references feed the
//! [`ActionImageMapping`] used when deploying snapshots.

use glob::Pattern;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::client::PlatformClient;
use crate::config::RegistrySettings;
use crate::error::{Error, Result};
use crate::git;
use crate::images::ActionImageMapping;
use crate::utils::command;

pub const DOCKERFILE: &str = "Dockerfile";
const DOCKER_BIN: &str = "docker";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    pub namespace: String,
    pub name: String,
    pub tag: String,
    pub dockerfile: PathBuf,
    pub context: PathBuf,
    pub registry: String,
}

impl ImageSpec {
    pub fn local_ref(&self) -> String {
        format!("{}/{}:{}", self.namespace, self.name, self.tag)
    }

    pub fn remote_ref(&self) -> String {
        format!("{}/{}", self.registry, self.local_ref())
    }
}

/// Builds, tags and publishes images.
pub trait ImageBuilder {
    /// Build and push `spec`, returning the published reference.
    fn build_and_push(&self, spec: &ImageSpec) -> Result<String>;

    fn login(&self, registry: &str, user: &str, password: &str) -> Result<()>;
}

/// [`ImageBuilder`] backed by the docker CLI.
pub struct DockerCli {
    bin: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self {
            bin: DOCKER_BIN.to_string(),
        }
    }
}

impl DockerCli {
    fn run(&self, args: Vec<String>) -> Result<()> {
        let context = format!("{} {}", self.bin, args.first().map(String::as_str).unwrap_or(""));
        tracing::info!("Running: {} {}", self.bin, args.join(" "));

        let code = command::run_streaming(&self.bin, &args, &context)
            .map_err(|e| Error::build_failed(e.message.clone(), Some(context.clone())))?;
        if code != 0 {
            return Err(Error::build_failed(
                format!("{} exited with code {}", context, code),
                Some(context),
            ));
        }
        Ok(())
    }
}

impl ImageBuilder for DockerCli {
    fn build_and_push(&self, spec: &ImageSpec) -> Result<String> {
        let local = spec.local_ref();
        let remote = spec.remote_ref();

        self.run(vec![
            "build".to_string(),
            "-t".to_string(),
            local.clone(),
            "-f".to_string(),
            spec.dockerfile.display().to_string(),
            spec.context.display().to_string(),
        ])?;
        self.run(vec!["tag".to_string(), local, remote.clone()])?;

        tracing::info!("Pushing docker image {}", remote);
        self.run(vec!["push".to_string(), remote.clone()])?;

        Ok(remote)
    }

    fn login(&self, registry: &str, user: &str, password: &str) -> Result<()> {
        let context = format!("{} login {}", self.bin, registry);
        let mut child = Command::new(&self.bin)
            .args(["login", "-u", user, "--password-stdin", registry])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::build_failed(format!("Failed to run {}: {}", context, e), None))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(password.as_bytes())
                .map_err(|e| Error::build_failed(e.to_string(), Some(context.clone())))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| Error::build_failed(e.to_string(), Some(context.clone())))?;
        if !output.status.success() {
            return Err(Error::build_failed(
                format!("{} failed: {}", context, command::error_text(&output)),
                Some(context),
            ));
        }
        Ok(())
    }
}

/// Every file named `Dockerfile` under `repo_dir`, sorted.
pub fn find_dockerfiles(repo_dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/**/{}",
        Pattern::escape(&repo_dir.display().to_string()),
        DOCKERFILE
    );
    let entries = glob::glob(&pattern)
        .map_err(|e| Error::internal_unexpected(format!("Invalid Dockerfile pattern: {}", e)))?;

    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!("Skipping unreadable path while searching for Dockerfiles: {}", e);
                None
            }
        })
        .filter(|path| path.is_file())
        .collect();
    found.sort();
    Ok(found)
}

/// Image name: the Dockerfile's parent directory name.
pub fn image_name(dockerfile: &Path) -> Result<String> {
    dockerfile
        .parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().to_lowercase())
        .ok_or_else(|| {
            Error::build_failed(
                format!("Cannot derive an image name from {}", dockerfile.display()),
                None,
            )
        })
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSummary {
    pub tag: Option<String>,
    pub namespace: Option<String>,
    pub registry: Option<String>,
    pub images: Vec<String>,
    pub warnings: Vec<String>,
}

impl BuildSummary {
    pub fn image_mapping(&self) -> ActionImageMapping {
        ActionImageMapping::from_references(self.images.iter().cloned())
    }
}

/// Build and push every image in `repo_dir`.
///
/// Namespace and registry come from the registry overrides when set and
/// from the platform otherwise. No Dockerfiles means nothing is built and the
/// platform is not contacted.
pub fn build_images(
    repo_dir: &Path,
    registry: &RegistrySettings,
    client: &PlatformClient,
    builder: &dyn ImageBuilder,
) -> Result<BuildSummary> {
    let dockerfiles = find_dockerfiles(repo_dir)?;
    if dockerfiles.is_empty() {
        tracing::info!("No Dockerfiles found in {}", repo_dir.display());
        return Ok(BuildSummary::default());
    }

    let mut summary = BuildSummary::default();
    let (tag, warning) = git::version_tag(repo_dir);
    if let Some(warning) = warning {
        tracing::warn!("{}", warning);
        summary.warnings.push(warning);
    }

    let namespace = registry
        .namespace
        .clone()
        .unwrap_or_else(|| client.scope().name().to_string());
    let registry_url = match &registry.url {
        Some(url) => url.clone(),
        None => client.docker_registry_url()?,
    };

    tracing::info!(
        "Building {} image(s) with tag {} and namespace {}, pushing to {}",
        dockerfiles.len(),
        tag,
        namespace,
        registry_url
    );

    for dockerfile in dockerfiles {
        let spec = ImageSpec {
            namespace: namespace.clone(),
            name: image_name(&dockerfile)?,
            tag: tag.clone(),
            context: registry.build_context.resolve(repo_dir, &dockerfile),
            dockerfile,
            registry: registry_url.clone(),
        };
        tracing::info!("Building {}", spec.dockerfile.display());
        summary.images.push(builder.build_and_push(&spec)?);
    }

    summary.tag = Some(tag);
    summary.namespace = Some(namespace);
    summary.registry = Some(registry_url);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiScope;
    use crate::config::BuildContextMode;
    use crate::http::fake::RecordingTransport;
    use crate::http::HttpResponse;
    use std::cell::RefCell;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingBuilder {
        specs: RefCell<Vec<ImageSpec>>,
    }

    impl ImageBuilder for RecordingBuilder {
        fn build_and_push(&self, spec: &ImageSpec) -> Result<String> {
            self.specs.borrow_mut().push(spec.clone());
            Ok(spec.remote_ref())
        }

        fn login(&self, _registry: &str, _user: &str, _password: &str) -> Result<()> {
            Ok(())
        }
    }

    fn dockerfile(repo: &Path, dir: &str) {
        let path = repo.join(dir).join(DOCKERFILE);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "FROM scratch\n").unwrap();
    }

    #[test]
    fn image_refs_combine_registry_namespace_name_and_tag() {
        let spec = ImageSpec {
            namespace: "acme".into(),
            name: "scorer".into(),
            tag: "abc1234-main".into(),
            dockerfile: PathBuf::from("/repo/actions/scorer/Dockerfile"),
            context: PathBuf::from("/repo/actions/scorer"),
            registry: "registry.example.com".into(),
        };
        assert_eq!(spec.local_ref(), "acme/scorer:abc1234-main");
        assert_eq!(spec.remote_ref(), "registry.example.com/acme/scorer:abc1234-main");
    }

    #[test]
    fn finds_dockerfiles_recursively_and_names_by_directory() {
        let repo = TempDir::new().unwrap();
        dockerfile(repo.path(), "actions/scorer");
        dockerfile(repo.path(), "actions/nested/Loader");
        std::fs::write(repo.path().join("Dockerfile.bak"), "").unwrap();

        let found = find_dockerfiles(repo.path()).unwrap();
        assert_eq!(found.len(), 2);
        let names: Vec<String> = found.iter().map(|p| image_name(p).unwrap()).collect();
        assert!(names.contains(&"scorer".to_string()));
        assert!(names.contains(&"loader".to_string()));
    }

    #[test]
    fn no_dockerfiles_builds_nothing_and_skips_the_platform() {
        let repo = TempDir::new().unwrap();
        let transport = RecordingTransport::ok();
        let client = PlatformClient::new(ApiScope::Account("acme".into()), "https://api", "t", &transport);
        let builder = RecordingBuilder::default();

        let summary =
            build_images(repo.path(), &RegistrySettings::default(), &client, &builder).unwrap();

        assert!(summary.images.is_empty());
        assert!(transport.calls().is_empty());
        assert!(builder.specs.borrow().is_empty());
    }

    #[test]
    fn registry_and_namespace_default_to_the_platform() {
        let repo = TempDir::new().unwrap();
        dockerfile(repo.path(), "actions/scorer");
        let transport = RecordingTransport::with(|_| {
            Ok(HttpResponse::new(200, r#"{"config":{"dockerPrivateRegistryUrl":"reg.example.com"}}"#))
        });
        let client = PlatformClient::new(ApiScope::Project("demo".into()), "https://api", "t", &transport);
        let builder = RecordingBuilder::default();

        let summary =
            build_images(repo.path(), &RegistrySettings::default(), &client, &builder).unwrap();

        let specs = builder.specs.borrow();
        assert_eq!(specs[0].namespace, "demo");
        assert_eq!(specs[0].registry, "reg.example.com/demo");
        assert_eq!(specs[0].context, repo.path().join("actions").join("scorer"));
        assert_eq!(summary.images.len(), 1);
        assert!(summary
            .image_mapping()
            .get("scorer")
            .unwrap()
            .starts_with("reg.example.com/demo/demo/scorer:"));
    }

    #[test]
    fn registry_overrides_skip_the_platform_lookup() {
        let repo = TempDir::new().unwrap();
        dockerfile(repo.path(), "actions/scorer");
        let transport = RecordingTransport::ok();
        let client = PlatformClient::new(ApiScope::Account("acme".into()), "https://api", "t", &transport);
        let builder = RecordingBuilder::default();
        let registry = RegistrySettings {
            namespace: Some("team".into()),
            url: Some("reg.internal".into()),
            build_context: BuildContextMode::RepoRoot,
        };

        build_images(repo.path(), &registry, &client, &builder).unwrap();

        assert!(transport.calls().is_empty());
        let specs = builder.specs.borrow();
        assert_eq!(specs[0].local_ref().split(':').next().unwrap(), "team/scorer");
        assert_eq!(specs[0].registry, "reg.internal");
        assert_eq!(specs[0].context, repo.path());
    }
}
