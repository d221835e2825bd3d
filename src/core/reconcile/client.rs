// src/core/reconcile/client.rs

//! A thin `reqwest`-based client for the master's control API (spec.md
//! §4.2), used by both the minion reconciliation loop and the Sentinel
//! node. Mirrors the teacher's use of `reqwest` for origin calls
//! (`CACHE.FETCH`) with a bearer token header and JSON bodies.

use crate::core::api::dto::*;
use crate::core::commandlog::NodeRole;
use crate::core::errors::RdsError;
use std::time::Duration;

/// Default HTTP read/write timeout, matching spec.md §5 ("HTTP server
/// read/write: 3s").
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone)]
pub struct MasterClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl MasterClient {
    pub fn new(master_ip: &str, api_port: u16, token: impl Into<String>) -> Result<Self, RdsError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(RdsError::from)?;
        Ok(Self {
            http,
            base_url: format!("http://{master_ip}:{api_port}"),
            token: token.into(),
        })
    }

    async fn post<Req: serde::Serialize, Resp: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, RdsError> {
        let resp = self
            .http
            .post(format!("{}/{}", self.base_url, path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| RdsError::Transient(format!("{path}: {e}")))?;
        decode(resp).await
    }

    async fn get<Resp: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Resp, RdsError> {
        let resp = self
            .http
            .get(format!("{}/{}", self.base_url, path))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| RdsError::Transient(format!("{path}: {e}")))?;
        decode(resp).await
    }

    pub async fn hello(&self, hostname: &str, role: NodeRole, version: &str) -> Result<HelloResponse, RdsError> {
        self.post(
            "hello",
            &HelloRequest {
                hostname: hostname.to_string(),
                role,
                version: version.to_string(),
            },
        )
        .await
    }

    pub async fn fetch(&self, cid: &str) -> Result<FetchResponse, RdsError> {
        self.post("fetch", &CidRequest { cid: cid.to_string() }).await
    }

    pub async fn pull(&self, cid: &str) -> Result<PullResponse, RdsError> {
        self.post("pull", &CidRequest { cid: cid.to_string() }).await
    }

    pub async fn info(&self, cid: &str, id: u32, uuid: &str) -> Result<InfoResponse, RdsError> {
        self.post(
            "info",
            &InfoRequest {
                cid: cid.to_string(),
                id,
                uuid: uuid.to_string(),
            },
        )
        .await
    }

    pub async fn bye(&self, cid: &str) -> Result<StatusResponse, RdsError> {
        self.post("bye", &CidRequest { cid: cid.to_string() }).await
    }

    pub async fn replication(&self) -> Result<ReplicationResponse, RdsError> {
        self.get("replication").await
    }

    pub async fn stats(&self) -> Result<StatsResponse, RdsError> {
        self.get("stats").await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, RdsError> {
    if resp.status().is_success() {
        resp.json().await.map_err(|e| RdsError::HttpClient(e.to_string()))
    } else {
        let status = resp.status();
        let body: StatusResponse = resp
            .json()
            .await
            .unwrap_or_else(|_| StatusResponse::error("unknown_error", "unparseable error body"));
        Err(match body.code.as_str() {
            "wrong_auth_token" => RdsError::WrongAuthToken,
            "incorrect_request" => RdsError::IpMismatch,
            "unknown_client" => RdsError::UnknownClient,
            "unknown_instance" => RdsError::InstanceNotFound(0),
            "incompatible_core_version" => RdsError::IncompatibleCoreVersion(body.desc),
            _ => RdsError::Transient(format!("{status}: {}", body.desc)),
        })
    }
}
