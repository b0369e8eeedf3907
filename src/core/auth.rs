//! Credential selection and session establishment.
//!
//! Exactly one credential source is used per run, picked in this order:
//! static token, user/password login, personal access credential (file path
//! or inline value), then the cached CLI profile. The first two talk to the
//! account-scoped API; the last two to the project-scoped API.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;

use crate::client::{ApiScope, PlatformClient};
use crate::config::{FabricConfig, ENV_ACCESS_TOKEN_VALUE, ENV_ACCOUNT, ENV_URL};
use crate::error::{Error, Result};
use crate::http::{self, Body, HttpRequest, Method, Transport};
use crate::jwt::{self, AccessCredential};

const SUPPORTED_PROFILE_VERSION: &str = "3";

/// The credential source chosen for this run.
#[derive(Debug, Clone)]
pub enum AuthCredential {
    StaticToken {
        url: String,
        account: String,
        token: String,
    },
    Password {
        url: String,
        account: String,
        user: String,
        password: String,
    },
    AccessCredential {
        credential: AccessCredential,
        project: String,
    },
    Profile {
        name: String,
        credential: AccessCredential,
        project: String,
    },
}

impl AuthCredential {
    pub fn describe(&self) -> &'static str {
        match self {
            AuthCredential::StaticToken { .. } => "static token",
            AuthCredential::Password { .. } => "user/password login",
            AuthCredential::AccessCredential { .. } => "personal access credential",
            AuthCredential::Profile { .. } => "cached profile",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileFile {
    version: Value,
    current_profile: String,
    #[serde(default)]
    profiles: HashMap<String, AccessCredential>,
}

fn required(value: Option<&String>, name: &str, reason: &str) -> Result<String> {
    value
        .cloned()
        .ok_or_else(|| Error::auth_configuration(format!("{} must be set {}", name, reason)))
}

fn legacy_endpoint(config: &FabricConfig, reason: &str) -> Result<(String, String)> {
    let url = required(config.url.as_ref(), ENV_URL, reason)?;
    let account = required(config.account.as_ref(), ENV_ACCOUNT, reason)?;
    Ok((url, account))
}

fn project_for(config: &FabricConfig, credential: &AccessCredential) -> Result<String> {
    config
        .project
        .clone()
        .or_else(|| credential.project.clone())
        .ok_or_else(|| {
            Error::auth_configuration(
                "CORTEX_PROJECT must be set when using a personal access credential",
            )
        })
}

fn load_access_credential(config: &FabricConfig) -> Result<Option<AccessCredential>> {
    let creds = &config.credentials;
    if let Some(path) = &creds.access_token_path {
        let content = std::fs::read(path).map_err(|e| {
            Error::auth_configuration(format!(
                "Failed to read access credential {}: {}",
                path.display(),
                e
            ))
        })?;
        return AccessCredential::parse(&content, &path.display().to_string()).map(Some);
    }

    if let Some(value) = &creds.access_token_value {
        return AccessCredential::parse(value.as_bytes(), ENV_ACCESS_TOKEN_VALUE).map(Some);
    }

    Ok(None)
}

fn load_profile(path: &Path) -> Result<Option<(String, AccessCredential)>> {
    if !path.is_file() {
        return Ok(None);
    }

    let content = std::fs::read(path).map_err(|e| {
        Error::auth_configuration(format!("Failed to read profile {}: {}", path.display(), e))
    })?;
    let file: ProfileFile = serde_json::from_slice(&content).map_err(|e| {
        Error::auth_configuration(format!("Invalid profile file {}: {}", path.display(), e))
    })?;

    let version = match &file.version {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if version != SUPPORTED_PROFILE_VERSION {
        return Err(Error::auth_configuration(format!(
            "Unsupported profile version {} in {}",
            version,
            path.display()
        )));
    }

    let credential = file
        .profiles
        .get(&file.current_profile)
        .cloned()
        .ok_or_else(|| {
            Error::auth_configuration(format!(
                "Current profile '{}' not found in {}",
                file.current_profile,
                path.display()
            ))
        })?;

    Ok(Some((file.current_profile, credential)))
}

/// Pick the credential source according to the configured precedence.
pub fn select_credential(config: &FabricConfig) -> Result<AuthCredential> {
    let creds = &config.credentials;

    if let Some(token) = &creds.token {
        let url = required(config.url.as_ref(), ENV_URL, "when CORTEX_TOKEN is used")?;
        return Ok(AuthCredential::StaticToken {
            url,
            account: config.account.clone().unwrap_or_default(),
            token: token.clone(),
        });
    }

    if let (Some(user), Some(password)) = (&creds.user, &creds.password) {
        let (url, account) = legacy_endpoint(config, "for user/password login")?;
        return Ok(AuthCredential::Password {
            url,
            account,
            user: user.clone(),
            password: password.clone(),
        });
    }

    if let Some(credential) = load_access_credential(config)? {
        let project = project_for(config, &credential)?;
        return Ok(AuthCredential::AccessCredential {
            credential,
            project,
        });
    }

    if let Some((name, credential)) = load_profile(&creds.profile_path)? {
        let project = project_for(config, &credential)?;
        return Ok(AuthCredential::Profile {
            name,
            credential,
            project,
        });
    }

    Err(Error::auth_configuration("No credentials configured"))
}

fn login(
    transport: &dyn Transport,
    url: &str,
    account: &str,
    user: &str,
    password: &str,
) -> Result<String> {
    let endpoint = crate::client::endpoints::login(url, account);
    let payload = json!({ "username": user, "password": password });
    let body = serde_json::to_vec(&payload)
        .map_err(|e| Error::internal_json(e.to_string(), Some("encode login".to_string())))?;

    let response = http::execute(
        transport,
        HttpRequest::new(Method::Post, endpoint).body(Body::Json(body)),
    )?;

    response
        .json()
        .as_ref()
        .and_then(|v| v.get("jwt"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::auth_configuration("Login response did not include a jwt"))
}

/// Resolve credentials and return a client bound to `transport`.
pub fn connect<'t>(config: &FabricConfig, transport: &'t dyn Transport) -> Result<PlatformClient<'t>> {
    let credential = select_credential(config)?;
    tracing::debug!("Authenticating with {}", credential.describe());

    let (scope, base_url, token) = match credential {
        AuthCredential::StaticToken {
            url,
            account,
            token,
        } => (ApiScope::Account(account), url, token),
        AuthCredential::Password {
            url,
            account,
            user,
            password,
        } => {
            let token = login(transport, &url, &account, &user, &password)?;
            (ApiScope::Account(account), url, token)
        }
        AuthCredential::AccessCredential {
            credential,
            project,
        }
        | AuthCredential::Profile {
            credential,
            project,
            ..
        } => {
            let token = jwt::mint_assertion(&credential, Utc::now())?;
            let url = config
                .url
                .clone()
                .unwrap_or_else(|| credential.url.trim_end_matches('/').to_string());
            (ApiScope::Project(project), url, token)
        }
    };

    Ok(PlatformClient::new(scope, base_url, token, transport))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ENV_ACCESS_TOKEN_PATH, ENV_PASSWORD, ENV_PROFILE_PATH, ENV_PROJECT, ENV_TOKEN, ENV_USER};
    use crate::http::fake::RecordingTransport;
    use crate::http::HttpResponse;
    use crate::jwt::tests::credential_json;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn config_from(pairs: &[(&str, String)]) -> FabricConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        let mut config = FabricConfig::from_lookup(|key| vars.get(key).cloned());
        if !vars.contains_key(ENV_PROFILE_PATH) {
            config.credentials.profile_path = PathBuf::from("/nonexistent/fabric/config");
        }
        config
    }

    #[test]
    fn static_token_wins_over_everything() {
        let config = config_from(&[
            (ENV_URL, "https://api.example.com".into()),
            (ENV_ACCOUNT, "acme".into()),
            (ENV_TOKEN, "tok".into()),
            (ENV_USER, "u".into()),
            (ENV_PASSWORD, "p".into()),
        ]);

        let transport = RecordingTransport::ok();
        let client = connect(&config, &transport).unwrap();

        assert_eq!(client.token(), "tok");
        assert_eq!(client.scope(), &ApiScope::Account("acme".to_string()));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn static_token_requires_url() {
        let config = config_from(&[(ENV_TOKEN, "tok".into()), (ENV_ACCOUNT, "acme".into())]);
        let err = select_credential(&config).unwrap_err();
        assert_eq!(err.code.as_str(), "auth.configuration");
        assert!(err.message.contains("CORTEX_URL"));
    }

    #[test]
    fn static_token_does_not_need_an_account() {
        let config = config_from(&[(ENV_URL, "https://api.example.com".into()), (ENV_TOKEN, "tok".into())]);

        match select_credential(&config).unwrap() {
            AuthCredential::StaticToken { account, .. } => assert!(account.is_empty()),
            other => panic!("unexpected credential {:?}", other.describe()),
        }
    }

    #[test]
    fn password_login_requires_an_account() {
        let config = config_from(&[
            (ENV_URL, "https://api.example.com".into()),
            (ENV_USER, "ci".into()),
            (ENV_PASSWORD, "secret".into()),
        ]);
        let err = select_credential(&config).unwrap_err();
        assert!(err.message.contains("CORTEX_ACCOUNT"));
    }

    #[test]
    fn password_login_exchanges_for_jwt() {
        let config = config_from(&[
            (ENV_URL, "https://api.example.com".into()),
            (ENV_ACCOUNT, "acme".into()),
            (ENV_USER, "ci".into()),
            (ENV_PASSWORD, "secret".into()),
        ]);
        let transport =
            RecordingTransport::with(|_| Ok(HttpResponse::new(200, r#"{"jwt":"issued"}"#)));

        let client = connect(&config, &transport).unwrap();

        assert_eq!(client.token(), "issued");
        let requests = transport.requests.borrow();
        assert_eq!(
            requests[0].url,
            "https://api.example.com/v2/admin/acme/users/authenticate"
        );
        let body = requests[0].json_body().unwrap();
        assert_eq!(body["username"], "ci");
        assert_eq!(body["password"], "secret");
    }

    #[test]
    fn rejected_login_is_fatal() {
        let config = config_from(&[
            (ENV_URL, "https://api.example.com".into()),
            (ENV_ACCOUNT, "acme".into()),
            (ENV_USER, "ci".into()),
            (ENV_PASSWORD, "wrong".into()),
        ]);
        let transport = RecordingTransport::with(|_| Ok(HttpResponse::new(401, "denied")));

        let err = connect(&config, &transport).unwrap_err();
        assert_eq!(err.code.as_str(), "remote.rejected");
    }

    #[test]
    fn access_credential_file_uses_project_scope() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pat.json");
        std::fs::write(
            &path,
            credential_json("https://fabric.example.com/").to_string(),
        )
        .unwrap();

        let config = config_from(&[
            (ENV_ACCESS_TOKEN_PATH, path.display().to_string()),
            (ENV_PROJECT, "demo".into()),
        ]);
        let transport = RecordingTransport::ok();
        let client = connect(&config, &transport).unwrap();

        assert_eq!(client.scope(), &ApiScope::Project("demo".to_string()));
        assert_eq!(client.base_url(), "https://fabric.example.com");
        assert_eq!(client.token().split('.').count(), 3);
    }

    #[test]
    fn access_credential_needs_a_project() {
        let config = config_from(&[(
            ENV_ACCESS_TOKEN_VALUE,
            credential_json("https://fabric.example.com").to_string(),
        )]);
        let err = select_credential(&config).unwrap_err();
        assert!(err.message.contains("CORTEX_PROJECT"));
    }

    #[test]
    fn cached_profile_is_the_last_resort() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        let mut profile = credential_json("https://fabric.example.com");
        profile["project"] = json!("from-profile");
        let file = json!({
            "version": "3",
            "currentProfile": "default",
            "profiles": { "default": profile },
        });
        std::fs::write(&path, file.to_string()).unwrap();

        let config = config_from(&[(ENV_PROFILE_PATH, path.display().to_string())]);
        match select_credential(&config).unwrap() {
            AuthCredential::Profile { name, project, .. } => {
                assert_eq!(name, "default");
                assert_eq!(project, "from-profile");
            }
            other => panic!("unexpected credential {:?}", other.describe()),
        }
    }

    #[test]
    fn old_profile_versions_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, r#"{"version":"2","currentProfile":"default","profiles":{}}"#).unwrap();

        let config = config_from(&[(ENV_PROFILE_PATH, path.display().to_string())]);
        let err = select_credential(&config).unwrap_err();
        assert!(err.message.contains("Unsupported profile version"));
    }

    #[test]
    fn nothing_configured_is_an_auth_error() {
        let err = select_credential(&config_from(&[])).unwrap_err();
        assert_eq!(err.code.as_str(), "auth.configuration");
        assert_eq!(err.message, "No credentials configured");
    }
}
