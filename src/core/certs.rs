//! Retrieve a server's TLS certificate chain without verifying it.
//!
//! Used to bootstrap trust for platforms that serve self-signed certificates:
//! the fetched PEM file can then be dropped into the certificate directory.

use std::io::Write;
use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, SignatureScheme};

use crate::error::{Error, Result};

const PEM_LINE_WIDTH: usize = 64;

/// Accepts any server certificate; handshake signatures are still checked.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Host part of `host:port`, with IPv6 brackets removed.
fn host_of(server: &str) -> &str {
    let host = match server.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => server,
    };
    host.trim_start_matches('[').trim_end_matches(']')
}

/// Complete a TLS handshake with `server` (`host:port`) and return the
/// certificates it presented, leaf first.
pub fn fetch_certificate_chain(server: &str) -> Result<Vec<CertificateDer<'static>>> {
    let transport_error = |e: String| Error::remote_transport(server, e);

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| transport_error(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
        .with_no_client_auth();

    let name = ServerName::try_from(host_of(server).to_string())
        .map_err(|e| transport_error(format!("invalid server name: {}", e)))?;
    let mut conn = ClientConnection::new(Arc::new(config), name)
        .map_err(|e| transport_error(e.to_string()))?;
    let mut socket = TcpStream::connect(server).map_err(|e| transport_error(e.to_string()))?;

    while conn.is_handshaking() {
        conn.complete_io(&mut socket)
            .map_err(|e| transport_error(format!("TLS handshake failed: {}", e)))?;
    }

    let chain: Vec<CertificateDer<'static>> = conn
        .peer_certificates()
        .map(|certs| certs.iter().map(|c| c.clone().into_owned()).collect())
        .unwrap_or_default();
    if chain.is_empty() {
        return Err(transport_error("server presented no certificates".to_string()));
    }

    conn.send_close_notify();
    let _ = conn.complete_io(&mut socket);

    Ok(chain)
}

/// PEM encoding of each certificate, concatenated.
pub fn pem_encode(chain: &[CertificateDer<'_>]) -> String {
    let mut pem = String::new();
    for cert in chain {
        pem.push_str("-----BEGIN CERTIFICATE-----\n");
        let encoded = STANDARD.encode(cert.as_ref());
        for line in encoded.as_bytes().chunks(PEM_LINE_WIDTH) {
            pem.push_str(&String::from_utf8_lossy(line));
            pem.push('\n');
        }
        pem.push_str("-----END CERTIFICATE-----\n");
    }
    pem
}

/// Write the PEM chain to `path`, read-only for the owner on unix.
pub fn write_pem(path: &Path, chain: &[CertificateDer<'_>]) -> Result<()> {
    let io_error = |e: std::io::Error| {
        Error::internal_io(e.to_string(), Some(format!("write {}", path.display())))
    };

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o400);
    }

    let mut file = options.open(path).map_err(io_error)?;
    file.write_all(pem_encode(chain).as_bytes()).map_err(io_error)
}
