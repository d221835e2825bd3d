// src/core/redis_client/resp.rs

//! Minimal RESP (REdis Serialization Protocol) encode/decode helpers for the
//! Redis protocol client. Supports the reply types the control plane
//! actually needs to parse: simple strings, errors, integers, bulk strings
//! and arrays of the above.

use crate::core::errors::RdsError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// A single RESP reply value.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Option<Vec<u8>>),
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// Renders a UTF-8 view of a bulk or simple string reply, if this value
    /// is one.
    pub fn as_str(&self) -> Option<String> {
        match self {
            RespValue::SimpleString(s) => Some(s.clone()),
            RespValue::BulkString(Some(bytes)) => String::from_utf8(bytes.clone()).ok(),
            _ => None,
        }
    }
}

/// Encodes a command as a RESP array of bulk strings, the wire format every
/// Redis client uses to send requests regardless of the command.
pub fn encode_command(args: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Reads and parses exactly one RESP reply from an async buffered reader.
pub async fn read_reply<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<RespValue, RdsError> {
    let mut line = String::new();
    let n = reader
        .read_line(&mut line)
        .await
        .map_err(|e| RdsError::Transient(format!("reading RESP line: {e}")))?;
    if n == 0 {
        return Err(RdsError::Transient(
            "connection closed while reading reply".to_string(),
        ));
    }
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return Err(RdsError::Transient("empty RESP line".to_string()));
    }

    let (prefix, rest) = line.split_at(1);
    match prefix {
        "+" => Ok(RespValue::SimpleString(rest.to_string())),
        "-" => Ok(RespValue::Error(rest.to_string())),
        ":" => {
            let n: i64 = rest
                .parse()
                .map_err(|_| RdsError::Transient(format!("invalid integer reply: {rest}")))?;
            Ok(RespValue::Integer(n))
        }
        "$" => {
            let len: i64 = rest
                .parse()
                .map_err(|_| RdsError::Transient(format!("invalid bulk length: {rest}")))?;
            if len < 0 {
                return Ok(RespValue::BulkString(None));
            }
            let mut buf = vec![0u8; len as usize + 2];
            reader
                .read_exact(&mut buf)
                .await
                .map_err(|e| RdsError::Transient(format!("reading bulk string: {e}")))?;
            buf.truncate(len as usize);
            Ok(RespValue::BulkString(Some(buf)))
        }
        "*" => {
            let len: i64 = rest
                .parse()
                .map_err(|_| RdsError::Transient(format!("invalid array length: {rest}")))?;
            if len < 0 {
                return Ok(RespValue::Array(None));
            }
            let mut items = Vec::with_capacity(len as usize);
            for _ in 0..len {
                items.push(Box::pin(read_reply(reader)).await?);
            }
            Ok(RespValue::Array(Some(items)))
        }
        other => Err(RdsError::Transient(format!(
            "unsupported RESP prefix '{other}'"
        ))),
    }
}
