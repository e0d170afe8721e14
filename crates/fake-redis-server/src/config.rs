use std::ffi::OsString;
use std::os::unix::ffi::OsStringExt as _;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, bail};

/// The subset of `redis.conf` understood by the fake server.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ServerConfig {
    pub(crate) port: Option<u16>,
    pub(crate) unixsocket: Option<PathBuf>,
    pub(crate) appendonly: bool,
    pub(crate) dir: Option<PathBuf>,
}

impl ServerConfig {
    pub(crate) fn load(path: &Path) -> anyhow::Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&contents)
    }

    pub(crate) fn parse(contents: &str) -> anyhow::Result<Self> {
        let mut config = Self::default();

        for (idx, line) in contents.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let args = split_args(line).with_context(|| format!("line {}: unbalanced quotes", idx + 1))?;

            let Some((directive, values)) = args.split_first() else {
                continue;
            };

            let directive = String::from_utf8_lossy(directive).to_ascii_lowercase();

            match (directive.as_str(), values) {
                ("port", [value]) => {
                    config.port = Some(
                        String::from_utf8_lossy(value)
                            .parse()
                            .with_context(|| format!("line {}: invalid port", idx + 1))?,
                    );
                }
                ("unixsocket", [value]) => config.unixsocket = Some(to_path(value)),
                ("appendonly", [value]) => {
                    config.appendonly = match value.as_slice() {
                        b"yes" => true,
                        b"no" => false,
                        _ => bail!("line {}: appendonly must be yes or no", idx + 1),
                    }
                }
                ("dir", [value]) => config.dir = Some(to_path(value)),
                // Snapshots are never written anyway.
                ("save", _) => {}
                ("port" | "unixsocket" | "appendonly" | "dir", _) => {
                    bail!("line {}: wrong number of arguments for {directive}", idx + 1)
                }
                (other, _) => warn!(directive = other, "Ignoring unsupported directive"),
            }
        }

        Ok(config)
    }
}

fn to_path(bytes: &[u8]) -> PathBuf {
    PathBuf::from(OsString::from_vec(bytes.to_vec()))
}

/// Splits a configuration line into arguments the way Redis does.
///
/// Arguments are separated by whitespace and may be double-quoted (with `\"`, `\\`, `\n`, `\r`,
/// `\t` and `\xHH` escapes) or single-quoted (with `\'`). Returns `None` on unbalanced quotes.
fn split_args(line: &str) -> Option<Vec<Vec<u8>>> {
    let mut bytes = line.as_bytes().iter().copied().peekable();
    let mut args = Vec::new();

    loop {
        while bytes.next_if(u8::is_ascii_whitespace).is_some() {}

        let Some(first) = bytes.next() else {
            return Some(args);
        };

        let mut arg = Vec::new();

        match first {
            b'"' => loop {
                match bytes.next()? {
                    b'"' => break,
                    b'\\' => match bytes.next()? {
                        b'n' => arg.push(b'\n'),
                        b'r' => arg.push(b'\r'),
                        b't' => arg.push(b'\t'),
                        b'x' => {
                            let hi = bytes.next().and_then(hex_digit);
                            let lo = bytes.next().and_then(hex_digit);
                            arg.push((hi? << 4) | lo?);
                        }
                        other => arg.push(other),
                    },
                    other => arg.push(other),
                }
            },
            b'\'' => loop {
                match bytes.next()? {
                    b'\'' => break,
                    b'\\' if bytes.peek() == Some(&b'\'') => {
                        arg.push(b'\'');
                        bytes.next();
                    }
                    other => arg.push(other),
                }
            },
            other => {
                arg.push(other);
                while let Some(byte) = bytes.next_if(|byte| !byte.is_ascii_whitespace()) {
                    arg.push(byte);
                }
            }
        }

        args.push(arg);
    }
}

fn hex_digit(byte: u8) -> Option<u8> {
    char::from(byte)
        .to_digit(16)
        .and_then(|digit| u8::try_from(digit).ok())
}
