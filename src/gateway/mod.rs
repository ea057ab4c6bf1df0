pub mod connection;
pub mod pool;
pub mod tls;

pub use connection::{
    AsyncStream, Connection, ConnectionSettings, ConnectionState, Dialer, GatewayStream,
    ReadOutcome, TcpDialer,
};
pub use pool::{ConnectionPool, PoolStats, PooledConnection};
pub use tls::{Handshake, Passthrough, TlsHandshake, load_roots};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const PRODUCTION_HOST: &str = "gateway.push.apple.com";
pub const SANDBOX_HOST: &str = "gateway.sandbox.push.apple.com";
pub const GATEWAY_PORT: u16 = 2195;
