//! client.rs
//!
//! `ApnsClient::send`: the bounded reconnect-and-resend loop over a shared
//! connection pool.
//!
//! The gateway never acknowledges a good notification. It answers a bad one
//! with a 6-byte error frame and then closes the connection. So an attempt
//! succeeds when nothing comes back within the read timeout.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::certificate;
use crate::config::ApnsConfig;
use crate::errors::PushError;
use crate::gateway::{
    ConnectionPool, ConnectionSettings, Dialer, Handshake, PoolStats, PooledConnection,
    ReadOutcome, TcpDialer, TlsHandshake, load_roots,
};
use crate::notification::{Payload, PushNotification};
use crate::wire_protocol::{self, ErrorResponse, ResponseStatus};

// -----------------------------------------------------------------------------
// ----- ApnsClient ------------------------------------------------------------

type PoolCell = OnceCell<Result<Arc<ConnectionPool>, Arc<PushError>>>;

#[derive(Debug)]
pub struct ApnsClient {
    config: ApnsConfig,
    dialer: Arc<dyn Dialer>,
    handshake: Option<Arc<dyn Handshake>>,
    pool: PoolCell,
}

// -----------------------------------------------------------------------------
// ----- ApnsClient: Static ----------------------------------------------------

impl ApnsClient {
    /// Nothing is loaded or dialed until the first send.
    pub fn new(config: ApnsConfig) -> Self {
        let dialer = TcpDialer::new(config.pool.connect_timeout);
        Self {
            config,
            dialer: Arc::new(dialer),
            handshake: None,
            pool: OnceCell::new(),
        }
    }

    pub fn with_dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = dialer;
        self
    }

    /// Replaces the TLS handshake built from the certificate file. The
    /// certificate file is then never read.
    pub fn with_handshake(mut self, handshake: Arc<dyn Handshake>) -> Self {
        self.handshake = Some(handshake);
        self
    }
}

// -----------------------------------------------------------------------------
// ----- ApnsClient: Public ----------------------------------------------------

impl ApnsClient {
    pub fn config(&self) -> &ApnsConfig {
        &self.config
    }

    /// A notification carrying the configured retry budget.
    pub fn notification(
        &self,
        device_token: impl Into<String>,
        payload: Payload,
    ) -> PushNotification {
        PushNotification::new(device_token, payload).with_retry_budget(self.config.pool.retries)
    }

    /// The shared pool, built on first use. A failed build is cached and
    /// every later call sees the same error.
    pub async fn pool(&self) -> Result<Arc<ConnectionPool>, PushError> {
        let cached = self
            .pool
            .get_or_init(|| async { self.build_pool().await.map(Arc::new).map_err(Arc::new) })
            .await;

        match cached {
            Ok(pool) => Ok(pool.clone()),
            Err(err) => Err(PushError::PoolUnavailable(err.clone())),
        }
    }

    pub fn stats(&self) -> Option<PoolStats> {
        match self.pool.get() {
            Some(Ok(pool)) => Some(pool.stats()),
            _ => None,
        }
    }

    /// Sends one notification, reconnecting and resending until the gateway
    /// stays silent or the notification's retry budget runs out.
    ///
    /// Connect, transport-read and encoding failures end the send at once
    /// and leave the remaining budget untouched. Write failures, dropped
    /// connections and error frames each cost one unit of budget.
    pub async fn send(&self, notification: &mut PushNotification) -> Result<(), PushError> {
        let pool = self.pool().await?;
        let format = self.config.pool.frame_format;
        let identifier = notification.identifier();

        // Held across retries so a reconnect reuses the same slot.
        let mut sticky: Option<PooledConnection> = None;

        loop {
            if !notification.consume_attempt() {
                let last = notification.shared_last_error();
                warn!(
                    identifier,
                    "giving up on notification: retry budget exhausted"
                );
                return Err(PushError::RetriesExhausted { last });
            }

            let guard = match sticky.take() {
                Some(guard) => guard,
                None => pool.acquire().await?,
            };
            let conn = sticky.insert(guard).connection();

            conn.connect().await.map_err(|e| {
                warn!(
                    identifier,
                    address = conn.address(),
                    "gateway connect failed: {e}"
                );
                PushError::Connect(e)
            })?;

            let frame = wire_protocol::encode_as(notification, format).map_err(|e| {
                info!(identifier, "cannot encode notification: {e}");
                e
            })?;

            if let Err(e) = conn.write_frame(&frame).await {
                warn!(identifier, "write failed, reconnecting: {e}");
                notification.record_error(PushError::Write(e));
                continue;
            }

            let response = match conn.read_response().await {
                ReadOutcome::Silent => {
                    debug!(identifier, "notification accepted");
                    return Ok(());
                }
                ReadOutcome::Closed => {
                    warn!(identifier, "gateway closed the connection, reconnecting");
                    notification.record_error(PushError::ConnectionClosed);
                    continue;
                }
                ReadOutcome::Failed(e) => {
                    warn!(identifier, "read failed: {e}");
                    return Err(PushError::Transport(e));
                }
                ReadOutcome::Frame(bytes) => ErrorResponse::decode(&bytes)?,
            };

            if response.status == ResponseStatus::NoError {
                return Ok(());
            }

            // The gateway hangs up after any error frame.
            conn.mark_disconnected();

            if response.identifier != identifier {
                warn!(
                    identifier,
                    reported = response.identifier,
                    "error frame refers to a different notification"
                );
            }

            let err = if response.status.is_protocol_error() {
                PushError::Rejected {
                    status: response.status,
                    identifier: response.identifier,
                }
            } else {
                PushError::UnknownStatus {
                    code: response.status.code(),
                    identifier: response.identifier,
                }
            };

            warn!(
                identifier,
                status = response.status.code(),
                "gateway rejected notification: {err}"
            );
            notification.record_error(err);
        }
    }

    /// Closes the pool and shuts down its idle connections. Later sends fail
    /// with `PoolClosed`.
    pub async fn close(&self) {
        if let Some(Ok(pool)) = self.pool.get() {
            pool.close().await;
        }
    }
}

// -----------------------------------------------------------------------------
// ----- ApnsClient: Private ---------------------------------------------------

impl ApnsClient {
    async fn build_pool(&self) -> Result<ConnectionPool, PushError> {
        self.config.validate()?;

        let gateway = &self.config.gateway;
        let handshake = match &self.handshake {
            Some(handshake) => handshake.clone(),
            None => {
                let bundle =
                    certificate::load_file(&gateway.pem_file, gateway.passphrase_exposed()).await?;
                let roots = load_roots(gateway.ca_file.as_deref())?;
                info!(
                    pem_file = %gateway.pem_file.display(),
                    chain = bundle.chain().len(),
                    "loaded client certificate"
                );
                Arc::new(TlsHandshake::new(&bundle, roots, &gateway.host)?) as Arc<dyn Handshake>
            }
        };

        let settings = Arc::new(ConnectionSettings {
            address: gateway.address(),
            read_timeout: self.config.pool.read_timeout,
            idle_timeout: self.config.pool.idle_timeout,
            dialer: self.dialer.clone(),
            handshake,
        });

        let pool = ConnectionPool::with_settings(self.config.pool.size, settings);
        info!(
            address = %gateway.address(),
            size = pool.capacity(),
            "gateway pool ready"
        );

        Ok(pool)
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
