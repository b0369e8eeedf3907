//! HTTP request/response contract and the reqwest-backed transport.
//!
//! The platform client only speaks in [`HttpRequest`]/[`HttpResponse`]; the
//! [`Transport`] trait is the seam between it and the network. The real
//! transport is built once at startup with TLS trust resolved eagerly.

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::fs;

use crate::config::TlsSettings;
use crate::error::{Error, RemoteRejectedDetails, Result};

const JSON_CONTENT_TYPE: &str = "application/json";
const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(Vec<u8>),
    /// Raw octet stream.
    Binary(Vec<u8>),
    /// Multipart form with a single file part.
    Multipart {
        field: String,
        file_name: String,
        content: Vec<u8>,
    },
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub body: Body,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            bearer: None,
            body: Body::Empty,
        }
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_string());
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Body parsed as JSON, for inspecting recorded requests.
    pub fn json_body(&self) -> Option<serde_json::Value> {
        match &self.body {
            Body::Json(bytes) => serde_json::from_slice(bytes).ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Only 200 and 201 count as success; anything above 201 is a rejection.
    pub fn is_accepted(&self) -> bool {
        (200..=201).contains(&self.status)
    }

    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// Sends one request and returns whatever the remote answered.
///
/// Implementations return `Err` only for connection-level failures (DNS,
/// refused, TLS); HTTP status handling belongs to the caller.
pub trait Transport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Send a request and turn non-accepted statuses into `remote.rejected`.
pub fn execute(transport: &dyn Transport, request: HttpRequest) -> Result<HttpResponse> {
    let method = request.method;
    let url = request.url.clone();
    let response = transport.send(request)?;

    if !response.is_accepted() {
        return Err(Error::remote_rejected(RemoteRejectedDetails {
            method: method.as_str().to_string(),
            url,
            status_code: response.status,
            body: response.body,
        }));
    }

    Ok(response)
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(tls: &TlsSettings) -> Result<Self> {
        let mut builder = Client::builder().danger_accept_invalid_certs(tls.ignore_invalid_certs);

        if tls.ignore_invalid_certs {
            tracing::warn!("TLS certificate validation is disabled");
        }

        if let Some(dir) = &tls.extra_ca_dir {
            let entries = fs::read_dir(dir).map_err(|e| {
                Error::internal_io(
                    e.to_string(),
                    Some(format!("read certificates from {}", dir.display())),
                )
            })?;

            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    continue;
                }
                let pem = fs::read(&path).map_err(|e| {
                    Error::internal_io(e.to_string(), Some(format!("read certificate {}", path.display())))
                })?;
                match reqwest::Certificate::from_pem(&pem) {
                    Ok(cert) => {
                        tracing::info!("Adding SSL cert {} to trusted roots", path.display());
                        builder = builder.add_root_certificate(cert);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to add SSL cert {} to trusted roots: {}", path.display(), e);
                    }
                }
            }
        }

        let client = builder
            .build()
            .map_err(|e| Error::internal_unexpected(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Put => self.client.put(&request.url),
            Method::Delete => self.client.delete(&request.url),
        };

        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }

        builder = match request.body {
            Body::Empty => builder.header(CONTENT_TYPE, JSON_CONTENT_TYPE),
            Body::Json(bytes) => builder.header(CONTENT_TYPE, JSON_CONTENT_TYPE).body(bytes),
            Body::Binary(bytes) => builder.header(CONTENT_TYPE, BINARY_CONTENT_TYPE).body(bytes),
            Body::Multipart {
                field,
                file_name,
                content,
            } => {
                let part = Part::bytes(content).file_name(file_name);
                builder.multipart(Form::new().part(field, part))
            }
        };

        let response = builder
            .send()
            .map_err(|e| Error::remote_transport(request.url.clone(), e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| Error::remote_transport(request.url.clone(), e.to_string()))?;

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::cell::RefCell;

    type Responder = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse>>;

    /// Records every request and answers from a scripted responder.
    pub(crate) struct RecordingTransport {
        pub requests: RefCell<Vec<HttpRequest>>,
        responder: Responder,
    }

    impl RecordingTransport {
        pub fn ok() -> Self {
            Self::with(|_| Ok(HttpResponse::new(200, "{}")))
        }

        pub fn with<F>(responder: F) -> Self
        where
            F: Fn(&HttpRequest) -> Result<HttpResponse> + 'static,
        {
            Self {
                requests: RefCell::new(Vec::new()),
                responder: Box::new(responder),
            }
        }

        pub fn calls(&self) -> Vec<(Method, String)> {
            self.requests
                .borrow()
                .iter()
                .map(|r| (r.method, r.url.clone()))
                .collect()
        }
    }

    impl Transport for RecordingTransport {
        fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            let response = (self.responder)(&request);
            self.requests.borrow_mut().push(request);
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::RecordingTransport;
    use super::*;

    #[test]
    fn only_200_and_201_are_accepted() {
        assert!(HttpResponse::new(200, "").is_accepted());
        assert!(HttpResponse::new(201, "").is_accepted());
        assert!(!HttpResponse::new(202, "").is_accepted());
        assert!(!HttpResponse::new(204, "").is_accepted());
        assert!(!HttpResponse::new(404, "").is_accepted());
    }

    #[test]
    fn execute_maps_rejections_to_remote_rejected() {
        let transport = RecordingTransport::with(|_| Ok(HttpResponse::new(409, "exists")));
        let err = execute(
            &transport,
            HttpRequest::new(Method::Post, "https://api.example.com/v3/actions"),
        )
        .unwrap_err();

        assert_eq!(err.code.as_str(), "remote.rejected");
        assert_eq!(err.details["statusCode"], 409);
        assert_eq!(err.details["body"], "exists");
        assert_eq!(err.details["method"], "POST");
    }

    #[test]
    fn execute_passes_transport_errors_through() {
        let transport = RecordingTransport::with(|r| {
            Err(Error::remote_transport(r.url.clone(), "connection refused"))
        });
        let err = execute(&transport, HttpRequest::new(Method::Get, "https://down")).unwrap_err();
        assert_eq!(err.code.as_str(), "remote.transport");
    }

    #[test]
    fn reqwest_transport_fails_on_unreadable_ca_dir() {
        let tls = TlsSettings {
            ignore_invalid_certs: false,
            extra_ca_dir: Some("/nonexistent/certs".into()),
        };
        assert!(ReqwestTransport::new(&tls).is_err());
    }
}
