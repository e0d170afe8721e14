use std::path::PathBuf;

use typed_builder::TypedBuilder;

use crate::locator::{BinaryLocator, SearchPathLocator};
use crate::probe::RetryPolicy;

pub const DEFAULT_EXECUTABLE: &str = "redis-server";

/// How to start a [`RedisServer`](crate::RedisServer).
///
/// The defaults reproduce the plain [`RedisServer::start`](crate::RedisServer::start) behavior.
#[derive(Debug, TypedBuilder)]
pub struct FixtureConfig {
    /// File name of the server executable.
    #[builder(default = DEFAULT_EXECUTABLE.to_owned(), setter(into))]
    pub(crate) executable: String,
    /// Strategy resolving the directory holding the executable.
    #[builder(default = Box::new(SearchPathLocator::new()) as Box<dyn BinaryLocator>)]
    pub(crate) locator: Box<dyn BinaryLocator>,
    /// Parent directory for the temporary workspace, instead of the system temporary directory.
    #[builder(default, setter(strip_option, into))]
    pub(crate) workspace_root: Option<PathBuf>,
    /// Polling schedule used to wait for the server to accept connections.
    #[builder(default)]
    pub(crate) readiness: RetryPolicy,
    /// Size of the connection pool handed out to callers.
    #[builder(default = 10)]
    pub(crate) max_connections: u32,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::locator::FixedLocator;

    #[test]
    fn defaults() {
        let config = FixtureConfig::default();

        assert_eq!(config.executable, "redis-server");
        assert!(config.workspace_root.is_none());
        assert_eq!(config.readiness, RetryPolicy::default());
        assert_eq!(config.max_connections, 10);
    }

    #[test]
    fn overrides() {
        let config = FixtureConfig::builder()
            .executable("valkey-server")
            .locator(Box::new(FixedLocator::new("/opt/valkey/bin")))
            .workspace_root("/var/tmp")
            .readiness(RetryPolicy::new(10, Duration::from_millis(50)))
            .max_connections(2)
            .build();

        assert_eq!(config.executable, "valkey-server");
        assert_eq!(config.workspace_root, Some(PathBuf::from("/var/tmp")));
        assert_eq!(config.readiness.attempts, 10);
        assert_eq!(config.max_connections, 2);
        assert!(format!("{:?}", config.locator).contains("/opt/valkey/bin"));
    }
}
