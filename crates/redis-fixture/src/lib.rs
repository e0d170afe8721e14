//! Disposable Redis servers for tests.
//!
//! [`RedisServer::start`] provisions a private temporary directory, launches `redis-server` on a
//! Unix socket inside it with persistence disabled, and waits until the server answers `PING`.
//! The returned value hands out a [`bb8`] pool of [`redis`] connections and is torn down with
//! [`RedisServer::stop`], which also removes the directory. Every server gets its own directory and socket, so tests can
//! start as many as they need in parallel.
//!
//! ```no_run
//! use redis_fixture::redis::AsyncCommands as _;
//!
//! # async fn run() -> Result<(), redis_fixture::Error> {
//! let server = redis_fixture::RedisServer::start().await?;
//!
//! let mut conn = server.pool().get().await.expect("connection");
//! let () = conn.set("foo", "bar").await.expect("SET");
//! drop(conn);
//!
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Only Unix platforms are supported.

#[macro_use]
extern crate tracing;

mod config;
mod connection;
mod error;
mod locator;
mod probe;
mod process;
mod signal;
mod workspace;

use std::io;
use std::path::Path;

use redis::RedisError;
use redis::aio::MultiplexedConnection;

pub use crate::config::{DEFAULT_EXECUTABLE, FixtureConfig};
pub use crate::connection::{Endpoint, RedisConnectionManager};
pub use crate::error::{Error, ErrorKind, ShutdownError, StartupError, StartupPhase};
pub use crate::locator::{BinaryLocator, FixedLocator, SearchPathLocator};
pub use crate::probe::{ProbeError, RetryPolicy};
pub use redis;

use crate::process::ServerProcess;
use crate::signal::ControlSignal;
use crate::workspace::Workspace;

pub type RedisPool = bb8::Pool<RedisConnectionManager>;

/// A running, ready-to-serve Redis server owned by the caller.
///
/// Call [`RedisServer::stop`] once done with it. Dropping the value instead kills the process
/// without waiting for it, and removes the workspace.
#[derive(Debug)]
pub struct RedisServer {
    pool: RedisPool,
    frozen: bool,
    // Declared before the workspace so the process is gone before its directory is removed.
    process: ServerProcess,
    workspace: Workspace,
}

impl RedisServer {
    /// Starts `redis-server` found in `$PATH`.
    pub async fn start() -> Result<Self, Error> {
        Self::start_with(FixtureConfig::default()).await
    }

    /// Starts a server and waits until it accepts commands.
    ///
    /// Either a ready server is returned, or nothing is left behind: any spawned process is reaped
    /// and the workspace removed. Failures happening after the process was spawned carry
    /// everything it printed (see [`StartupError`]).
    #[instrument(skip_all, fields(executable = %config.executable))]
    pub async fn start_with(config: FixtureConfig) -> Result<Self, Error> {
        let FixtureConfig {
            executable,
            locator,
            workspace_root,
            readiness,
            max_connections,
        } = config;

        let workspace = Workspace::provision(workspace_root.as_deref())?;

        let bin_dir = locator.locate(&executable)?;

        let mut process = ServerProcess::spawn(&bin_dir.join(&executable), workspace.config_path()).await?;

        let manager = RedisConnectionManager::new(workspace.endpoint().clone());

        if let Err(error) = probe::wait_until_ready(&manager, readiness, || process.try_exit_status()).await {
            return Err(process
                .abort(StartupPhase::Readiness, "Failed to connect to Redis", error.into())
                .await);
        }

        let pool = bb8::Pool::builder().max_size(max_connections).build_unchecked(manager);

        info!(
            pid = process.pid(),
            endpoint = %workspace.endpoint(),
            workspace = %workspace.path().display(),
            "Redis server is ready"
        );

        Ok(Self {
            pool,
            frozen: false,
            process,
            workspace,
        })
    }

    /// Interrupts the server, waits for it to exit and removes its workspace.
    ///
    /// The workspace is removed even when shutting down failed. Connections still checked out
    /// from the pool are left for their owners to drop.
    #[instrument(skip_all, fields(pid = self.process.pid()))]
    pub async fn stop(self) -> Result<(), Error> {
        let Self {
            pool,
            frozen,
            process,
            workspace,
        } = self;

        drop(pool);

        // A suspended process would only handle the interrupt once resumed.
        if frozen {
            if let Err(error) = process.signal(ControlSignal::Resume) {
                warn!(%error, "Couldn't resume frozen server before stopping it");
            }
        }

        let result = process.shutdown().await;

        let path = workspace.path().to_owned();
        match workspace.remove() {
            Ok(()) => trace!(path = %path.display(), "Removed workspace"),
            Err(error) => warn!(%error, path = %path.display(), "Couldn't remove workspace"),
        }

        match &result {
            Ok(()) => debug!("Redis server stopped"),
            Err(error) => warn!(%error, "Redis server did not stop cleanly"),
        }

        result.map_err(Error::from)
    }

    /// Suspends the server without terminating it, e.g. to emulate a hung backend.
    ///
    /// This only delivers the signal; commands sent afterwards simply never get an answer.
    pub fn freeze(&mut self) -> io::Result<()> {
        self.process.signal(ControlSignal::Suspend)?;
        self.frozen = true;
        Ok(())
    }

    /// Resumes a server suspended by [`RedisServer::freeze`].
    pub fn resume(&mut self) -> io::Result<()> {
        self.process.signal(ControlSignal::Resume)?;
        self.frozen = false;
        Ok(())
    }

    pub fn pool(&self) -> &RedisPool {
        &self.pool
    }

    /// Opens a connection outside of the pool.
    pub async fn connect(&self) -> Result<MultiplexedConnection, RedisError> {
        connection::dial(self.endpoint()).await
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.workspace.endpoint()
    }

    pub fn workspace_dir(&self) -> &Path {
        self.workspace.path()
    }

    pub fn config_path(&self) -> &Path {
        self.workspace.config_path()
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

/// Stops `server` if there is one.
///
/// Handy for cleanup code running whether or not the server managed to start.
pub async fn stop_if_started(server: Option<RedisServer>) -> Result<(), Error> {
    match server {
        Some(server) => server.stop().await,
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt as _;
    use std::time::Duration;

    use super::*;

    fn install(dir: &Path, name: &str, body: &str, mode: u32) {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
    }

    fn is_empty_dir(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn stopping_nothing_is_a_no_op() {
        stop_if_started(None).await.unwrap();
    }

    #[tokio::test]
    async fn missing_executable_leaves_no_workspace() {
        let bin = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();

        let config = FixtureConfig::builder()
            .locator(Box::new(SearchPathLocator::with_paths(bin.path())))
            .workspace_root(root.path())
            .build();

        let error = RedisServer::start_with(config).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Environment);
        assert!(is_empty_dir(root.path()));
    }

    #[tokio::test]
    async fn unexecutable_binary_is_a_launch_error() {
        let bin = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        install(bin.path(), "redis-server", "#!/bin/sh\n", 0o644);

        let config = FixtureConfig::builder()
            .locator(Box::new(FixedLocator::new(bin.path())))
            .workspace_root(root.path())
            .build();

        let error = RedisServer::start_with(config).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Launch);
        assert!(is_empty_dir(root.path()));
    }

    #[tokio::test]
    async fn server_exiting_early_is_a_readiness_error() {
        let bin = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        install(
            bin.path(),
            "redis-server",
            "#!/bin/sh\necho 'Redis version=7.2.4'\necho '# Failed opening Unix socket: bind: Address already in use' >&2\nexit 1\n",
            0o755,
        );

        let config = FixtureConfig::builder()
            .locator(Box::new(FixedLocator::new(bin.path())))
            .workspace_root(root.path())
            .readiness(RetryPolicy::new(500, Duration::from_millis(10)))
            .build();

        let error = RedisServer::start_with(config).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Readiness);

        let startup = error.as_startup().unwrap();
        assert_eq!(startup.exit_status().and_then(|status| status.code()), Some(1));
        assert_eq!(startup.stdout(), b"Redis version=7.2.4\n");

        let message = error.to_string();
        assert!(message.starts_with("Failed to connect to Redis: server exited"), "{message}");
        assert!(message.contains("Failed opening Unix socket"), "{message}");

        assert!(is_empty_dir(root.path()));
    }
}
