//! Remote mirror of the cell store.
//!
//! The remote copy is a best-effort, last-write-wins replica. Local state is
//! always committed first; a push only ever reports its outcome through
//! [`SyncStatus`] and never touches local data.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{LedgerError, Result};

const COMMIT_MESSAGE: &str = "update data.json";
const USER_AGENT: &str = concat!("prodboard/", env!("CARGO_PKG_VERSION"));

/// Where the mirrored blob lives.
#[async_trait]
pub trait MirrorTransport: Send + Sync {
    /// Read the whole blob.
    async fn fetch(&self) -> Result<Value>;

    /// Replace the whole blob, returning the host's acknowledgement.
    async fn push(&self, blob: &Value) -> Result<Value>;
}

/// Raw blob URL for reads, single-file update endpoint for writes.
pub struct EndpointTransport {
    client: reqwest::Client,
    fetch_url: String,
    save_url: Option<String>,
}

impl EndpointTransport {
    pub fn new(fetch_url: impl Into<String>, save_url: Option<String>) -> Self {
        EndpointTransport {
            client: reqwest::Client::new(),
            fetch_url: fetch_url.into(),
            save_url,
        }
    }
}

#[async_trait]
impl MirrorTransport for EndpointTransport {
    async fn fetch(&self) -> Result<Value> {
        let bust = chrono::Utc::now().timestamp_millis().to_string();
        let response = self
            .client
            .get(&self.fetch_url)
            .query(&[("t", bust.as_str())])
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LedgerError::Remote(format!(
                "fetch returned {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    async fn push(&self, blob: &Value) -> Result<Value> {
        let save_url = self
            .save_url
            .as_deref()
            .ok_or_else(|| LedgerError::Remote("no save endpoint configured".to_string()))?;

        let response = self
            .client
            .post(save_url)
            .json(&json!({ "content": blob }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LedgerError::Remote(format!(
                "save endpoint returned {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

/// Target object in a contents host (owner/repo/path).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentsTarget {
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    pub path: String,
}

impl ContentsTarget {
    pub fn url(&self) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base.trim_end_matches('/'),
            self.owner,
            self.repo,
            self.path
        )
    }
}

#[derive(Deserialize)]
struct ContentsMetadata {
    sha: Option<String>,
    content: Option<String>,
}

/// Versioned read-modify-write against a GitHub-style contents API with a
/// server-held token.
pub struct ContentsTransport {
    client: reqwest::Client,
    target: ContentsTarget,
    token: String,
}

impl ContentsTransport {
    pub fn new(target: ContentsTarget, token: impl Into<String>) -> Self {
        ContentsTransport {
            client: reqwest::Client::new(),
            target,
            token: token.into(),
        }
    }

    async fn metadata(&self) -> Result<ContentsMetadata> {
        let response = self
            .client
            .get(self.target.url())
            .header(reqwest::header::AUTHORIZATION, format!("token {}", self.token))
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LedgerError::Remote(format!(
                "metadata request returned {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl MirrorTransport for ContentsTransport {
    async fn fetch(&self) -> Result<Value> {
        let meta = self.metadata().await?;
        let encoded: String = meta
            .content
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| LedgerError::Remote(format!("undecodable content: {}", e)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Obtain the current version token, then overwrite with it. The host's
    /// raw response is returned whatever its status.
    async fn push(&self, blob: &Value) -> Result<Value> {
        let meta = self.metadata().await?;
        let pretty = serde_json::to_string_pretty(blob)?;

        let mut body = json!({
            "message": COMMIT_MESSAGE,
            "content": STANDARD.encode(pretty.as_bytes()),
        });
        if let Some(sha) = meta.sha {
            body["sha"] = Value::String(sha);
        }

        let response = self
            .client
            .put(self.target.url())
            .header(reqwest::header::AUTHORIZATION, format!("token {}", self.token))
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let reply: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(LedgerError::Remote(format!("write returned {}: {}", status, reply)));
        }
        Ok(reply)
    }
}

/// Bounded exponential backoff for pushes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            multiplier: 2,
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .max(1)
            .saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Pushing {
        attempt: u32,
    },
    Failed {
        message: String,
    },
}

pub struct RemoteMirror {
    transport: Arc<dyn MirrorTransport>,
    policy: RetryPolicy,
    status: Mutex<SyncStatus>,
    /// Latest snapshot not yet handed to the transport. Older ones are dropped.
    pending: Mutex<Option<Value>>,
    /// Held for the whole retry sequence so writes reach the host in order.
    writer: tokio::sync::Mutex<()>,
}

impl RemoteMirror {
    pub fn new(transport: Arc<dyn MirrorTransport>, policy: RetryPolicy) -> Self {
        RemoteMirror {
            transport,
            policy,
            status: Mutex::new(SyncStatus::Idle),
            pending: Mutex::new(None),
            writer: tokio::sync::Mutex::new(()),
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.status
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    fn set_status(&self, status: SyncStatus) {
        if let Ok(mut current) = self.status.lock() {
            *current = status;
        }
    }

    fn has_pending(&self) -> bool {
        self.pending.lock().map(|p| p.is_some()).unwrap_or(false)
    }

    fn take_pending(&self) -> Option<Value> {
        self.pending.lock().ok().and_then(|mut p| p.take())
    }

    /// Read the remote blob. Failures are logged and returned; callers keep
    /// their current data.
    pub async fn fetch(&self) -> Result<Value> {
        match self.transport.fetch().await {
            Ok(blob) => Ok(blob),
            Err(e) => {
                log::error!("remote fetch failed: {}", e);
                Err(e)
            }
        }
    }

    /// Push `blob`, retrying the whole read-then-write sequence per the policy.
    ///
    /// # Arguments
    /// * `blob` - The full cell store as JSON
    ///
    /// # Returns
    /// * `Result<Value>` - The host's acknowledgement, or the last error. A
    ///   push stops retrying once a newer snapshot is queued behind it.
    pub async fn push(&self, blob: &Value) -> Result<Value> {
        let _writer = self.writer.lock().await;
        self.push_locked(blob).await
    }

    async fn push_locked(&self, blob: &Value) -> Result<Value> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            self.set_status(SyncStatus::Pushing { attempt });
            match self.transport.push(blob).await {
                Ok(ack) => {
                    log::info!("remote push succeeded on attempt {}", attempt);
                    self.set_status(SyncStatus::Idle);
                    return Ok(ack);
                }
                Err(e) => {
                    log::warn!("remote push attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = Some(e);
                    if attempt < attempts {
                        let delay = self.policy.backoff_for(attempt);
                        log::debug!("retrying remote push in {:?}", delay);
                        tokio::time::sleep(delay).await;
                    }
                }
            }

            if self.has_pending() {
                log::debug!("remote push superseded by a newer snapshot");
                return Err(LedgerError::Remote("superseded by a newer snapshot".to_string()));
            }
        }

        let error = last_error
            .unwrap_or_else(|| LedgerError::Remote("push was not attempted".to_string()));
        log::error!("remote push gave up: {}", error);
        self.set_status(SyncStatus::Failed {
            message: error.to_string(),
        });
        Err(error)
    }

    /// Queue `blob` and push the newest queued snapshot on the tokio runtime
    /// without waiting for the outcome. Snapshots queued while a push is in
    /// flight replace each other, so only the latest one is written next.
    pub fn spawn_push(self: &Arc<Self>, blob: Value) -> tokio::task::JoinHandle<()> {
        if let Ok(mut pending) = self.pending.lock() {
            *pending = Some(blob);
        }
        let mirror = Arc::clone(self);
        tokio::spawn(async move {
            let _writer = mirror.writer.lock().await;
            // an earlier task may already have written it
            if let Some(latest) = mirror.take_pending() {
                let _ = mirror.push_locked(&latest).await;
            }
        })
    }
}
