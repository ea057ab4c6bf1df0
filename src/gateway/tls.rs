use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName};
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::{debug, warn};

use super::connection::GatewayStream;
use crate::certificate::{CertificateBundle, CertificateError};
use crate::config::ConfigError;
use crate::errors::PushError;

// -----------------------------------------------------------------------------
// ----- Handshake -------------------------------------------------------------

/// Upgrades a freshly dialed stream into the session the gateway talks over.
#[async_trait]
pub trait Handshake: Send + Sync + fmt::Debug {
    async fn handshake(&self, stream: GatewayStream) -> io::Result<GatewayStream>;
}

/// Hands the dialed stream back untouched. For gateways reached over an
/// already secured tunnel, and for in-process test gateways.
#[derive(Clone, Copy, Debug, Default)]
pub struct Passthrough;

#[async_trait]
impl Handshake for Passthrough {
    async fn handshake(&self, stream: GatewayStream) -> io::Result<GatewayStream> {
        Ok(stream)
    }
}

// -----------------------------------------------------------------------------
// ----- TlsHandshake ----------------------------------------------------------

/// Mutual TLS: presents the bundle's chain and key, verifies the gateway
/// against `roots` under `server_name`.
#[derive(Clone)]
pub struct TlsHandshake {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl TlsHandshake {
    pub fn new(
        bundle: &CertificateBundle,
        roots: RootCertStore,
        server_name: &str,
    ) -> Result<Self, PushError> {
        let server_name = ServerName::try_from(server_name.to_string())
            .map_err(|e| ConfigError::InvalidHost(format!("{server_name}: {e}")))?;

        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_client_auth_cert(bundle.chain().to_vec(), bundle.key_der())?;

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            server_name,
        })
    }
}

#[async_trait]
impl Handshake for TlsHandshake {
    async fn handshake(&self, stream: GatewayStream) -> io::Result<GatewayStream> {
        let tls = self
            .connector
            .connect(self.server_name.clone(), stream)
            .await?;
        debug!(server_name = ?self.server_name, "tls handshake complete");
        Ok(Box::new(tls))
    }
}

impl fmt::Debug for TlsHandshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsHandshake")
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// ----- Roots: Exported -------------------------------------------------------

/// Trust roots for verifying the gateway: the PEM file at `ca_file` when
/// given, otherwise the platform store.
pub fn load_roots(ca_file: Option<&Path>) -> Result<RootCertStore, CertificateError> {
    let certs = match ca_file {
        Some(path) => load_certs(path)?,
        None => rustls_native_certs::load_native_certs()
            .map_err(|e| CertificateError::RootStore(format!("platform roots: {e}")))?,
    };

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if ignored > 0 {
        warn!(ignored, "skipped unparsable trust roots");
    }
    if added == 0 {
        return Err(CertificateError::RootStore("no usable trust roots".into()));
    }

    Ok(roots)
}

// -----------------------------------------------------------------------------
// ----- Roots: Private helpers ------------------------------------------------

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, CertificateError> {
    let file = File::open(path).map_err(|e| CertificateError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CertificateError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

    if certs.is_empty() {
        return Err(CertificateError::RootStore(format!(
            "no certificates found in {}",
            path.display()
        )));
    }

    Ok(certs)
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
