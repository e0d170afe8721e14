//! Server side of RESP2: decodes client requests and encodes replies.
//!
//! <https://redis.io/docs/latest/develop/reference/protocol-spec/>

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncReadExt as _};

/// Upper bound on bulk strings and arrays, as enforced by Redis itself (`proto-max-bulk-len`).
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Value {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
    Array(Option<Vec<Value>>),
}

impl Value {
    pub(crate) fn ok() -> Self {
        Self::Simple("OK".to_owned())
    }

    pub(crate) fn bulk(data: impl Into<Vec<u8>>) -> Self {
        Self::Bulk(Some(data.into()))
    }

    pub(crate) fn nil() -> Self {
        Self::Bulk(None)
    }

}

pub(crate) fn encode_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Simple(s) => {
            out.push(b'+');
            out.extend_from_slice(s.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Value::Error(s) => {
            out.push(b'-');
            out.extend_from_slice(s.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Value::Integer(i) => out.extend_from_slice(format!(":{i}\r\n").as_bytes()),
        Value::Bulk(None) => out.extend_from_slice(b"$-1\r\n"),
        Value::Bulk(Some(data)) => write_bulk(out, data),
        Value::Array(None) => out.extend_from_slice(b"*-1\r\n"),
        Value::Array(Some(items)) => {
            out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
            for item in items {
                encode_value(item, out);
            }
        }
    }
}

fn write_bulk(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(format!("${}\r\n", data.len()).as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

/// Reads one value.
///
/// Returns `Ok(None)` on a clean end of stream before the first byte of a value.
pub(crate) async fn read_value<R>(reader: &mut R) -> io::Result<Option<Value>>
where
    R: AsyncBufRead + Unpin + Send,
{
    let Some(line) = read_line(reader).await? else {
        return Ok(None);
    };

    // Arrays are read iteratively to keep the future unboxed.
    let mut stack: Vec<(Vec<Value>, usize)> = Vec::new();
    let mut current = line;

    loop {
        let mut value = match parse_header(&current)? {
            Header::Value(value) => value,
            Header::Bulk(len) => Value::Bulk(Some(read_bulk_payload(reader, len).await?)),
            Header::Array(0) => Value::Array(Some(Vec::new())),
            Header::Array(len) => {
                stack.push((Vec::with_capacity(len.min(1024)), len));
                current = expect_line(reader).await?;
                continue;
            }
        };

        loop {
            let Some((mut items, expected)) = stack.pop() else {
                return Ok(Some(value));
            };

            items.push(value);

            if items.len() < expected {
                stack.push((items, expected));
                break;
            }

            value = Value::Array(Some(items));
        }

        current = expect_line(reader).await?;
    }
}

enum Header {
    Value(Value),
    Bulk(usize),
    Array(usize),
}

fn parse_header(line: &[u8]) -> io::Result<Header> {
    let (&prefix, rest) = line.split_first().ok_or_else(|| protocol_error("empty line"))?;
    let text = core::str::from_utf8(rest).map_err(|_| protocol_error("non UTF-8 header"))?;

    match prefix {
        b'+' => Ok(Header::Value(Value::Simple(text.to_owned()))),
        b'-' => Ok(Header::Value(Value::Error(text.to_owned()))),
        b':' => text
            .parse()
            .map(|i| Header::Value(Value::Integer(i)))
            .map_err(|_| protocol_error("invalid integer")),
        b'$' => match parse_len(text)? {
            None => Ok(Header::Value(Value::Bulk(None))),
            Some(len) => Ok(Header::Bulk(len)),
        },
        b'*' => match parse_len(text)? {
            None => Ok(Header::Value(Value::Array(None))),
            Some(len) => Ok(Header::Array(len)),
        },
        _ => Err(protocol_error("unknown type prefix")),
    }
}

fn parse_len(text: &str) -> io::Result<Option<usize>> {
    let len: i64 = text.parse().map_err(|_| protocol_error("invalid length"))?;

    if len == -1 {
        return Ok(None);
    }

    let len = usize::try_from(len).map_err(|_| protocol_error("negative length"))?;

    if len > MAX_BULK_LEN {
        return Err(protocol_error("length too large"));
    }

    Ok(Some(len))
}

async fn read_bulk_payload<R>(reader: &mut R, len: usize) -> io::Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin + Send,
{
    let mut data = vec![0; len + 2];
    reader.read_exact(&mut data).await?;

    if !data.ends_with(b"\r\n") {
        return Err(protocol_error("bulk string not terminated by CRLF"));
    }

    data.truncate(len);

    Ok(data)
}

async fn expect_line<R>(reader: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin + Send,
{
    read_line(reader)
        .await?
        .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))
}

async fn read_line<R>(reader: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin + Send,
{
    let mut line = Vec::new();
    let n = reader.read_until(b'\n', &mut line).await?;

    if n == 0 {
        return Ok(None);
    }

    if !line.ends_with(b"\r\n") {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
    }

    line.truncate(line.len() - 2);

    Ok(Some(line))
}

fn protocol_error(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}
