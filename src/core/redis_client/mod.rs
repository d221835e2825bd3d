// src/core/redis_client/mod.rs

//! A small, synchronous-per-call async RESP client over a single
//! `TcpStream` per call site: connect, optional AUTH, send one command,
//! read one reply. No pipelining, pooling or pub/sub — the wire protocol is
//! an external collaborator with a simple interface (spec.md §1), this is
//! just enough of it to drive lifecycle and Sentinel operations.

pub mod resp;

use crate::core::errors::RdsError;
use resp::{RespValue, encode_command, read_reply};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Default per-command timeout, matching spec.md §5 ("Redis command: 1-3s
/// by call site").
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// A single connect-auth-command-disconnect session against a Redis (or
/// Sentinel) server bound to 127.0.0.1.
pub struct RedisClient {
    stream: BufReader<TcpStream>,
    timeout: Duration,
}

impl RedisClient {
    /// Connects to `127.0.0.1:port` and, if credentials are given, issues
    /// `AUTH user password`.
    pub async fn connect(port: u16, auth: Option<(&str, &str)>) -> Result<Self, RdsError> {
        Self::connect_with_timeout(port, auth, DEFAULT_TIMEOUT).await
    }

    pub async fn connect_with_timeout(
        port: u16,
        auth: Option<(&str, &str)>,
        call_timeout: Duration,
    ) -> Result<Self, RdsError> {
        let stream = timeout(call_timeout, TcpStream::connect(("127.0.0.1", port)))
            .await
            .map_err(|_| RdsError::Transient(format!("connect to port {port} timed out")))?
            .map_err(|e| RdsError::Transient(format!("connect to port {port}: {e}")))?;

        let mut client = RedisClient {
            stream: BufReader::new(stream),
            timeout: call_timeout,
        };

        if let Some((user, password)) = auth {
            client.call(&["AUTH", user, password]).await?;
        }

        Ok(client)
    }

    /// Sends one command and reads exactly one reply.
    pub async fn call(&mut self, args: &[&str]) -> Result<RespValue, RdsError> {
        let encoded = encode_command(args);
        timeout(self.timeout, async {
            self.stream.get_mut().write_all(&encoded).await?;
            self.stream.get_mut().flush().await?;
            read_reply(&mut self.stream).await
        })
        .await
        .map_err(|_| RdsError::Transient(format!("command {:?} timed out", args.first())))?
        .and_then(|reply| match reply {
            RespValue::Error(e) => Err(RdsError::Transient(format!("redis error: {e}"))),
            other => Ok(other),
        })
    }

    /// Issues `INFO` and parses the `field:value` lines into a map, the
    /// interface the lifecycle and sync-blocker code consumes.
    pub async fn info(&mut self) -> Result<HashMap<String, String>, RdsError> {
        let reply = self.call(&["INFO"]).await?;
        let text = reply
            .as_str()
            .ok_or_else(|| RdsError::Transient("INFO did not return a bulk string".to_string()))?;
        Ok(parse_info(&text))
    }

    pub async fn config_get(&mut self, key: &str) -> Result<Option<String>, RdsError> {
        let reply = self.call(&["CONFIG", "GET", key]).await?;
        match reply {
            RespValue::Array(Some(items)) if items.len() >= 2 => Ok(items[1].as_str()),
            _ => Ok(None),
        }
    }

    pub async fn config_set(&mut self, key: &str, value: &str) -> Result<(), RdsError> {
        self.call(&["CONFIG", "SET", key, value]).await?;
        Ok(())
    }

    pub async fn replicaof(&mut self, host: &str, port: u16) -> Result<(), RdsError> {
        let port_s = port.to_string();
        self.call(&["REPLICAOF", host, &port_s]).await?;
        Ok(())
    }

    pub async fn replicaof_no_one(&mut self) -> Result<(), RdsError> {
        self.call(&["REPLICAOF", "NO", "ONE"]).await?;
        Ok(())
    }

    pub async fn flushall_async(&mut self) -> Result<(), RdsError> {
        self.call(&["FLUSHALL", "ASYNC"]).await?;
        Ok(())
    }

    /// Issues `SHUTDOWN [NOSAVE]`. Redis closes the connection as part of
    /// shutting down, so a connection-reset error here is expected, not a
    /// failure.
    pub async fn shutdown(&mut self, save: bool) -> Result<(), RdsError> {
        let args: &[&str] = if save {
            &["SHUTDOWN"]
        } else {
            &["SHUTDOWN", "NOSAVE"]
        };
        match self.call(args).await {
            Ok(_) => Ok(()),
            Err(RdsError::Transient(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn sentinel_monitor(
        &mut self,
        name: &str,
        ip: &str,
        port: u16,
        quorum: u32,
    ) -> Result<(), RdsError> {
        let port_s = port.to_string();
        let quorum_s = quorum.to_string();
        self.call(&["SENTINEL", "MONITOR", name, ip, &port_s, &quorum_s])
            .await?;
        Ok(())
    }

    pub async fn sentinel_set(&mut self, name: &str, option: &str, value: &str) -> Result<(), RdsError> {
        self.call(&["SENTINEL", "SET", name, option, value]).await?;
        Ok(())
    }

    pub async fn sentinel_remove(&mut self, name: &str) -> Result<(), RdsError> {
        self.call(&["SENTINEL", "REMOVE", name]).await?;
        Ok(())
    }

    pub async fn sentinel_failover(&mut self, name: &str) -> Result<(), RdsError> {
        self.call(&["SENTINEL", "FAILOVER", name]).await?;
        Ok(())
    }
}

/// Parses Redis `INFO` output (`key:value` lines, `#` section headers and
/// blank lines ignored) into a flat map.
pub fn parse_info(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_info_key_value_lines() {
        let text = "# Replication\r\nrole:slave\r\nmaster_link_status:up\r\n\r\n# Other\r\nloading:0\r\n";
        let map = parse_info(text);
        assert_eq!(map.get("role").unwrap(), "slave");
        assert_eq!(map.get("master_link_status").unwrap(), "up");
        assert_eq!(map.get("loading").unwrap(), "0");
    }
}
