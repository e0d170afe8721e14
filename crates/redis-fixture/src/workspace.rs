use std::fs::DirBuilder;
use std::io;
use std::os::unix::ffi::OsStrExt as _;
use std::os::unix::fs::DirBuilderExt as _;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::connection::Endpoint;
use crate::error::Error;

const WORKSPACE_PREFIX: &str = "redistest";
const SOCKET_DIR: &str = "sock";
const SOCKET_FILE: &str = "redis.sock";
const CONFIG_FILE: &str = "redis.conf";

/// Private temporary directory holding the server configuration and its listening socket.
///
/// The directory is removed when the value is dropped.
#[derive(Debug)]
pub(crate) struct Workspace {
    tempdir: TempDir,
    config_path: PathBuf,
    endpoint: Endpoint,
}

impl Workspace {
    /// Creates the workspace under `root`, or under the system temporary directory.
    pub(crate) fn provision(root: Option<&Path>) -> Result<Self, Error> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);

        let tempdir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(provision_error("create workspace directory"))?;

        let socket_dir = tempdir.path().join(SOCKET_DIR);
        DirBuilder::new()
            .recursive(true)
            .mode(0o711)
            .create(&socket_dir)
            .map_err(provision_error("create socket directory"))?;

        let endpoint = Endpoint::Unix(socket_dir.join(SOCKET_FILE));

        let config_path = tempdir.path().join(CONFIG_FILE);
        std::fs::write(&config_path, render_config(tempdir.path(), &endpoint))
            .map_err(provision_error("write server configuration"))?;

        trace!(path = %tempdir.path().display(), %endpoint, "Provisioned workspace");

        Ok(Self {
            tempdir,
            config_path,
            endpoint,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        self.tempdir.path()
    }

    pub(crate) fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub(crate) fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Removes the whole tree, reporting failures instead of silently ignoring them like drop does.
    pub(crate) fn remove(self) -> io::Result<()> {
        self.tempdir.close()
    }
}

fn provision_error(step: &'static str) -> impl FnOnce(io::Error) -> Error {
    move |source| Error::Provision { step, source }
}

/// Server configuration: no TCP listener, a private Unix socket, and no persistence at all.
///
/// Test data is disposable, so durability is traded for startup speed and a clean teardown.
fn render_config(dir: &Path, endpoint: &Endpoint) -> String {
    format!(
        "port 0\n\
         unixsocket {socket}\n\
         appendonly no\n\
         save \"\"\n\
         dir {dir}\n",
        socket = quote(endpoint.address()),
        dir = quote(dir),
    )
}

/// Renders `path` as a double-quoted configuration argument.
///
/// Anything outside printable ASCII is written as a `\xHH` escape, so any path survives the trip.
fn quote(path: &Path) -> String {
    let mut out = String::from("\"");

    for &byte in path.as_os_str().as_bytes() {
        match byte {
            b'"' | b'\\' => {
                out.push('\\');
                out.push(char::from(byte));
            }
            0x20..=0x7e => out.push(char::from(byte)),
            _ => out.push_str(&format!("\\x{byte:02x}")),
        }
    }

    out.push('"');
    out
}
