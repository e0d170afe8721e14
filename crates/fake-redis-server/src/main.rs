//! Stand-in for `redis-server`, used by the test suite where Redis itself may not be installed.
//!
//! Usage: `fake-redis-server <config-file>`
//!
//! Only the Unix socket listener is supported. Logs go to stdout like Redis does, and the process
//! exits successfully on SIGINT or SIGTERM after removing its socket.

#[macro_use]
extern crate tracing;

mod commands;
mod config;
mod resp;

use std::io;
use std::path::Path;

use anyhow::Context as _;
use tokio::io::{AsyncWriteExt as _, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::signal::unix::{SignalKind, signal};

use crate::commands::Store;
use crate::config::ServerConfig;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stdout)
        .with_ansi(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("FAKE_REDIS_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args_os()
        .nth(1)
        .context("usage: fake-redis-server <config-file>")?;

    let config = ServerConfig::load(Path::new(&config_path))?;

    info!(pid = std::process::id(), "Server initialized");

    if config.appendonly {
        warn!("Append-only file requested, but nothing is ever persisted");
    }

    if let Some(port) = config.port.filter(|port| *port != 0) {
        warn!(port, "TCP listener is not supported");
    }

    let socket_path = config.unixsocket.context("no unixsocket configured")?;

    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("Failed opening Unix socket {}", socket_path.display()))?;

    info!(path = %socket_path.display(), "Ready to accept connections unix");

    let store = Store::default();

    let mut interrupt = signal(SignalKind::interrupt()).context("failed to register SIGINT handler")?;
    let mut terminate = signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        tokio::spawn(serve_client(stream, store.clone()));
                    }
                    Err(error) => warn!(%error, "Accept failed"),
                }
            }
            _ = interrupt.recv() => {
                info!("Received SIGINT scheduling shutdown...");
                break;
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM scheduling shutdown...");
                break;
            }
        }
    }

    drop(listener);

    if let Err(error) = tokio::fs::remove_file(&socket_path).await {
        warn!(%error, "Couldn't remove the Unix socket");
    }

    info!("Redis is now ready to exit, bye bye...");

    Ok(())
}

async fn serve_client(stream: UnixStream, store: Store) {
    let mut stream = BufReader::new(stream);

    loop {
        let request = match resp::read_value(&mut stream).await {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(error) => {
                debug!(%error, "Client connection failed");
                break;
            }
        };

        let mut reply = Vec::new();
        resp::encode_value(&store.execute(request), &mut reply);

        if let Err(error) = stream.get_mut().write_all(&reply).await {
            debug!(%error, "Couldn't write reply");
            break;
        }
    }
}
