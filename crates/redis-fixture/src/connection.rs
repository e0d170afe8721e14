use core::fmt;
use std::path::{Path, PathBuf};

use redis::aio::MultiplexedConnection;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisError};

/// Where a managed server listens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Endpoint {
    /// Filesystem socket.
    Unix(PathBuf),
}

impl Endpoint {
    /// Network name, as understood by most Redis clients (`"unix"`).
    pub fn network(&self) -> &'static str {
        match self {
            Endpoint::Unix(_) => "unix",
        }
    }

    pub fn address(&self) -> &Path {
        match self {
            Endpoint::Unix(path) => path,
        }
    }

    /// Connection parameters for the `redis` client, database 0 without credentials.
    pub fn connection_info(&self) -> ConnectionInfo {
        let addr = match self {
            Endpoint::Unix(path) => ConnectionAddr::Unix(path.clone()),
        };

        ConnectionInfo {
            addr,
            redis: RedisConnectionInfo::default(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Opens a new multiplexed connection to `endpoint`.
///
/// The connection is driven by a background task; commands may be cancelled at any point
/// without leaving unread replies behind.
pub(crate) async fn dial(endpoint: &Endpoint) -> Result<MultiplexedConnection, RedisError> {
    let client = redis::Client::open(endpoint.connection_info())?;
    client.get_multiplexed_async_connection().await
}

pub(crate) async fn ping(conn: &mut MultiplexedConnection) -> Result<(), RedisError> {
    let pong: String = redis::cmd("PING").query_async(conn).await?;

    if pong == "PONG" {
        Ok(())
    } else {
        Err(RedisError::from((
            redis::ErrorKind::ResponseError,
            "unexpected reply to PING",
            pong,
        )))
    }
}

/// [`bb8`] connection manager dialing a fixed endpoint.
#[derive(Debug, Clone)]
pub struct RedisConnectionManager {
    endpoint: Endpoint,
}

impl RedisConnectionManager {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl bb8::ManageConnection for RedisConnectionManager {
    type Connection = MultiplexedConnection;
    type Error = RedisError;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        dial(&self.endpoint).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        ping(conn).await
    }

    fn has_broken(&self, _: &mut Self::Connection) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_exposes_network_and_address() {
        let endpoint = Endpoint::Unix(PathBuf::from("/tmp/redistest/sock/redis.sock"));

        assert_eq!(endpoint.network(), "unix");
        assert_eq!(endpoint.address(), Path::new("/tmp/redistest/sock/redis.sock"));
        assert_eq!(endpoint.to_string(), "unix:///tmp/redistest/sock/redis.sock");
    }

    #[test]
    fn connection_info_targets_the_socket() {
        let endpoint = Endpoint::Unix(PathBuf::from("/tmp/redistest/sock/redis.sock"));

        let info = endpoint.connection_info();

        assert_eq!(info.addr, ConnectionAddr::Unix(PathBuf::from("/tmp/redistest/sock/redis.sock")));
        assert_eq!(info.redis.db, 0);
        assert!(info.redis.password.is_none());
    }

    #[tokio::test]
    async fn dial_fails_without_a_listener() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Endpoint::Unix(dir.path().join("redis.sock"));

        let error = dial(&endpoint).await.unwrap_err();

        assert!(error.is_io_error(), "{error}");
    }
}
