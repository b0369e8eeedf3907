use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ManifestReadError,
    ManifestParseError,
    ResourceReadError,

    TransformFailed,

    RemoteRejected,
    RemoteTransport,

    ArtifactIoError,
    ArchiveIoError,

    AuthConfiguration,
    ClientUnsupportedKind,

    BuildFailed,

    ValidationMissingArgument,
    ValidationInvalidArgument,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ManifestReadError => "manifest.read_error",
            ErrorCode::ManifestParseError => "manifest.parse_error",
            ErrorCode::ResourceReadError => "resource.read_error",

            ErrorCode::TransformFailed => "transform.failed",

            ErrorCode::RemoteRejected => "remote.rejected",
            ErrorCode::RemoteTransport => "remote.transport",

            ErrorCode::ArtifactIoError => "artifact.io",
            ErrorCode::ArchiveIoError => "archive.io",

            ErrorCode::AuthConfiguration => "auth.configuration",
            ErrorCode::ClientUnsupportedKind => "client.unsupported_kind",

            ErrorCode::BuildFailed => "build.failed",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathErrorDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRejectedDetails {
    pub method: String,
    pub url: String,
    pub status_code: u16,
    pub body: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformFailedDetails {
    pub kind: String,
    pub resource: String,
    pub script: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
        }
    }

    pub fn manifest_read(path: impl Into<String>, error: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ManifestReadError,
            format!("Failed to read manifest {}", path),
            to_details(PathErrorDetails {
                path,
                error: error.into(),
            }),
        )
        .with_hint("Pass the manifest location relative to the repo with -m <file>")
    }

    pub fn manifest_parse(path: impl Into<String>, error: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ManifestParseError,
            format!("Invalid manifest {}", path),
            to_details(PathErrorDetails {
                path,
                error: error.into(),
            }),
        )
    }

    pub fn resource_read(path: impl Into<String>, error: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ResourceReadError,
            format!("Failed to read resource {}", path),
            to_details(PathErrorDetails {
                path,
                error: error.into(),
            }),
        )
    }

    pub fn transform_failed(
        kind: impl Into<String>,
        resource: impl Into<String>,
        script: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let details = TransformFailedDetails {
            kind: kind.into(),
            resource: resource.into(),
            script: script.into(),
            error: error.into(),
        };
        Self::new(
            ErrorCode::TransformFailed,
            format!(
                "Failed to transform resource {} using {}",
                details.resource, details.script
            ),
            to_details(details),
        )
    }

    pub fn remote_rejected(details: RemoteRejectedDetails) -> Self {
        Self::new(
            ErrorCode::RemoteRejected,
            format!(
                "{} {} failed with status {}",
                details.method, details.url, details.status_code
            ),
            to_details(details),
        )
    }

    pub fn remote_transport(url: impl Into<String>, error: impl Into<String>) -> Self {
        let url = url.into();
        Self::new(
            ErrorCode::RemoteTransport,
            format!("Request to {} failed", url),
            to_details(PathErrorDetails {
                path: url,
                error: error.into(),
            }),
        )
    }

    pub fn artifact_io(path: impl Into<String>, error: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ArtifactIoError,
            format!("Failed to read artifact {}", path),
            to_details(PathErrorDetails {
                path,
                error: error.into(),
            }),
        )
    }

    pub fn archive_io(path: impl Into<String>, error: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ArchiveIoError,
            format!("Failed to archive {}", path),
            to_details(PathErrorDetails {
                path,
                error: error.into(),
            }),
        )
    }

    pub fn auth_configuration(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::AuthConfiguration,
            message,
            Value::Object(serde_json::Map::new()),
        )
        .with_hint("Set CORTEX_TOKEN, CORTEX_USER/CORTEX_PASSWORD or CORTEX_ACCESS_TOKEN_PATH")
    }

    pub fn unsupported_kind(kind: impl Into<String>, api: impl Into<String>) -> Self {
        let kind = kind.into();
        let api = api.into();
        Self::new(
            ErrorCode::ClientUnsupportedKind,
            format!("{} resources are not supported by the {} API", kind, api),
            serde_json::json!({ "kind": kind, "api": api }),
        )
        .with_hint("Use project-scoped credentials (CORTEX_ACCESS_TOKEN_PATH) for this resource kind")
    }

    pub fn build_failed(message: impl Into<String>, context: Option<String>) -> Self {
        let message = message.into();
        Self::new(
            ErrorCode::BuildFailed,
            message.clone(),
            to_details(InternalErrorDetails {
                error: message,
                context,
            }),
        )
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        Self::new(
            ErrorCode::ValidationMissingArgument,
            "Missing required argument",
            serde_json::json!({ "args": args }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
    ) -> Self {
        let problem = problem.into();
        Self::new(
            ErrorCode::ValidationInvalidArgument,
            problem.clone(),
            to_details(InvalidArgumentDetails {
                field: field.into(),
                problem,
                id,
            }),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalIoError,
            "IO error",
            to_details(InternalErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            to_details(InternalErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    /// Prefixes the message with the resource the failure belongs to.
    pub fn for_resource(mut self, resource: &str) -> Self {
        self.message = format!("{}: {}", resource, self.message);
        if let Value::Object(map) = &mut self.details {
            map.entry("resource")
                .or_insert_with(|| Value::String(resource.to_string()));
        }
        self
    }
}
