//! Runtime configuration resolved once from the environment.
//!
//! Everything the run needs (platform location, credentials, registry
//! overrides, TLS trust) is read into a [`FabricConfig`] at startup and passed
//! down explicitly. Tests build one with [`FabricConfig::from_lookup`].

use std::path::{Path, PathBuf};

pub const ENV_URL: &str = "CORTEX_URL";
pub const ENV_ACCOUNT: &str = "CORTEX_ACCOUNT";
pub const ENV_PROJECT: &str = "CORTEX_PROJECT";
pub const ENV_TOKEN: &str = "CORTEX_TOKEN";
pub const ENV_USER: &str = "CORTEX_USER";
pub const ENV_PASSWORD: &str = "CORTEX_PASSWORD";
pub const ENV_ACCESS_TOKEN_PATH: &str = "CORTEX_ACCESS_TOKEN_PATH";
pub const ENV_ACCESS_TOKEN_VALUE: &str = "CORTEX_ACCESS_TOKEN_VALUE";
pub const ENV_PROFILE_PATH: &str = "FABRIC_PROFILE_PATH";
pub const ENV_REGISTRY_PREFIX: &str = "DOCKER_PREGISTRY_PREFIX";
pub const ENV_REGISTRY_URL: &str = "DOCKER_PREGISTRY_URL";
pub const ENV_BUILD_CONTEXT: &str = "DOCKER_BUILD_CONTEXT";
pub const ENV_IGNORE_INVALID_SSL_CERT: &str = "IGNORE_INVALID_SSL_CERT";
pub const ENV_SSL_CERTS_DIR: &str = "SSL_CERTS_DIR";
pub const ENV_LOG_JSON: &str = "FABRIC_LOG_JSON";

/// Secondary names read when the primary variable is unset.
const ALIASES: &[(&str, &str)] = &[
    (ENV_URL, "FABRIC_URL"),
    (ENV_ACCOUNT, "FABRIC_ACCOUNT"),
    (ENV_PROJECT, "FABRIC_PROJECT"),
    (ENV_TOKEN, "FABRIC_TOKEN"),
    (ENV_USER, "FABRIC_USER"),
    (ENV_PASSWORD, "FABRIC_PASSWORD"),
    (ENV_ACCESS_TOKEN_PATH, "FABRIC_ACCESS_TOKEN_PATH"),
    (ENV_ACCESS_TOKEN_VALUE, "FABRIC_ACCESS_TOKEN_VALUE"),
    (ENV_REGISTRY_PREFIX, "DOCKER_REGISTRY_PREFIX"),
    (ENV_REGISTRY_URL, "DOCKER_REGISTRY_URL"),
];

/// Profile written by cortex-cli.
const DEFAULT_PROFILE_PATH: &str = "~/.cortex/config";

/// Credential inputs as configured. Which one wins is decided in `auth`.
#[derive(Debug, Clone, Default)]
pub struct CredentialSettings {
    pub token: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub access_token_path: Option<PathBuf>,
    pub access_token_value: Option<String>,
    pub profile_path: PathBuf,
}

/// Where `docker build` runs relative to each Dockerfile.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BuildContextMode {
    #[default]
    DockerfileDir,
    DockerfileParentDir,
    RepoRoot,
    Path(PathBuf),
}

impl BuildContextMode {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            None | Some("") | Some("DOCKERFILE_CURRENT_DIR") => BuildContextMode::DockerfileDir,
            Some("DOCKERFILE_PARENT_DIR") => BuildContextMode::DockerfileParentDir,
            Some("REPO_ROOT") => BuildContextMode::RepoRoot,
            Some(path) => BuildContextMode::Path(PathBuf::from(path)),
        }
    }

    pub fn resolve(&self, repo_dir: &Path, dockerfile: &Path) -> PathBuf {
        let dockerfile_dir = dockerfile.parent().unwrap_or(repo_dir);
        match self {
            BuildContextMode::DockerfileDir => dockerfile_dir.to_path_buf(),
            BuildContextMode::DockerfileParentDir => dockerfile_dir
                .parent()
                .unwrap_or(dockerfile_dir)
                .to_path_buf(),
            BuildContextMode::RepoRoot => repo_dir.to_path_buf(),
            BuildContextMode::Path(path) => path.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegistrySettings {
    pub namespace: Option<String>,
    pub url: Option<String>,
    pub build_context: BuildContextMode,
}

#[derive(Debug, Clone, Default)]
pub struct TlsSettings {
    pub ignore_invalid_certs: bool,
    pub extra_ca_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FabricConfig {
    pub url: Option<String>,
    pub account: Option<String>,
    pub project: Option<String>,
    pub credentials: CredentialSettings,
    pub registry: RegistrySettings,
    pub tls: TlsSettings,
    /// Emit log lines as JSON instead of text.
    pub log_json: bool,
    /// Process environment handed to transformation scripts as external variables.
    pub environment: Vec<(String, String)>,
}

impl FabricConfig {
    pub fn from_env() -> Self {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok());
        config.environment = std::env::vars().collect();
        config
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let get = |key: &str| {
            read(key).or_else(|| {
                ALIASES
                    .iter()
                    .find(|(primary, _)| *primary == key)
                    .and_then(|(_, alias)| read(alias))
            })
        };

        let profile_path = get(ENV_PROFILE_PATH).unwrap_or_else(|| DEFAULT_PROFILE_PATH.to_string());

        Self {
            url: get(ENV_URL).map(|u| u.trim_end_matches('/').to_string()),
            account: get(ENV_ACCOUNT),
            project: get(ENV_PROJECT),
            credentials: CredentialSettings {
                token: get(ENV_TOKEN),
                user: get(ENV_USER),
                password: get(ENV_PASSWORD),
                access_token_path: get(ENV_ACCESS_TOKEN_PATH).map(|p| expand_path(&p)),
                access_token_value: get(ENV_ACCESS_TOKEN_VALUE),
                profile_path: expand_path(&profile_path),
            },
            registry: RegistrySettings {
                namespace: get(ENV_REGISTRY_PREFIX),
                url: get(ENV_REGISTRY_URL).map(|u| u.trim_matches('/').to_string()),
                build_context: BuildContextMode::parse(get(ENV_BUILD_CONTEXT).as_deref()),
            },
            tls: TlsSettings {
                ignore_invalid_certs: get(ENV_IGNORE_INVALID_SSL_CERT)
                    .map(|v| parse_bool(&v))
                    .unwrap_or(false),
                extra_ca_dir: get(ENV_SSL_CERTS_DIR).map(|p| expand_path(&p)),
            },
            log_json: get(ENV_LOG_JSON).map(|v| parse_bool(&v)).unwrap_or(false),
            environment: Vec::new(),
        }
    }
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "t" | "true" | "yes" | "on"
    )
}
