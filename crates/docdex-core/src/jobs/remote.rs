//! Remote pipeline client and event proxy.
//!
//! [`RemoteClient`] implements [`JobDispatch`](super::JobDispatch) against a
//! remote manager over plain JSON HTTP: one POST per command, plus a
//! newline-delimited JSON event subscription. [`EventProxy`] bridges that
//! subscription onto the local [`EventBus`], so local consumers cannot tell
//! whether a job runs in-process or remotely.
//!
//! Payloads serialize with RFC3339 dates and explicit `null`s (no
//! skip-if-none shortcuts), preserving the null-versus-absent distinction
//! across the wire.

use super::events::{Event, EventBus};
use super::{Job, JobDispatch};
use crate::types::{JobStatus, ScraperOptions};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Ceiling for the event-stream reconnect backoff.
const RECONNECT_MAX: Duration = Duration::from_secs(30);

/// RPC response envelope: exactly one of `result`/`error` is set.
#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<String>,
}

#[derive(Serialize)]
struct JobRef<'a> {
    id: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    library: &'a str,
    version: Option<&'a str>,
}

#[derive(Serialize)]
struct JobsQuery {
    status: Option<JobStatus>,
}

/// Client for a remote pipeline manager.
pub struct RemoteClient {
    client: reqwest::Client,
    base_url: String,
    events: EventBus,
}

impl RemoteClient {
    /// Creates a client against `base_url` and starts its event proxy on
    /// the given local bus.
    pub fn connect(base_url: impl Into<String>, events: EventBus) -> Result<(Self, EventProxy)> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .build()
            .map_err(Error::Network)?;
        let proxy = EventProxy::start(client.clone(), base_url.clone(), events.clone());
        Ok((
            Self {
                client,
                base_url,
                events,
            },
            proxy,
        ))
    }

    /// The local bus remote events are re-emitted on.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    async fn call<Req: Serialize + Sync, Resp: DeserializeOwned>(
        &self,
        method: &str,
        request: &Req,
    ) -> Result<Resp> {
        let url = format!("{}/rpc/{method}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(Error::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Other(format!("rpc {method} returned {status}")));
        }

        let envelope: RpcResponse<Resp> = response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("malformed rpc response: {e}")))?;
        if let Some(error) = envelope.error {
            return Err(Error::Other(error));
        }
        envelope
            .result
            .ok_or_else(|| Error::Serialization(format!("rpc {method} returned no result")))
    }
}

#[async_trait]
impl JobDispatch for RemoteClient {
    async fn enqueue_scrape_job(&self, options: ScraperOptions) -> Result<String> {
        self.call("enqueue_scrape_job", &options).await
    }

    async fn enqueue_refresh_job(&self, library: &str, version: Option<&str>) -> Result<String> {
        self.call("enqueue_refresh_job", &RefreshRequest { library, version })
            .await
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        self.call("get_job", &JobRef { id }).await
    }

    async fn get_jobs(&self, status: Option<JobStatus>) -> Result<Vec<Job>> {
        self.call("get_jobs", &JobsQuery { status }).await
    }

    async fn cancel_job(&self, id: &str) -> Result<()> {
        let _: serde_json::Value = self.call("cancel_job", &JobRef { id }).await?;
        Ok(())
    }

    async fn clear_completed_jobs(&self) -> Result<usize> {
        self.call("clear_completed_jobs", &serde_json::json!({})).await
    }

    /// Event-driven completion: subscribes to the proxied stream for the
    /// job's terminal `JOB_STATUS_CHANGE`; no polling.
    async fn wait_for_job_completion(&self, id: &str) -> Result<JobStatus> {
        let mut receiver = self.events.subscribe();

        // One RPC to cover jobs that finished before we subscribed.
        if let Some(job) = self.get_job(id).await? {
            if job.status.is_terminal() {
                if job.status == JobStatus::Failed {
                    return Err(Error::Other(
                        job.error.unwrap_or_else(|| "job failed".to_string()),
                    ));
                }
                return Ok(job.status);
            }
        } else {
            return Err(Error::NotFound(format!("job '{id}' does not exist")));
        }

        loop {
            match receiver.recv().await {
                Ok(Event::JobStatusChange {
                    id: event_id,
                    status,
                    error,
                    ..
                }) if event_id == id && status.is_terminal() => {
                    if status == JobStatus::Failed {
                        return Err(Error::Other(
                            error.unwrap_or_else(|| "job failed".to_string()),
                        ));
                    }
                    return Ok(status);
                },
                Ok(_) => {},
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {},
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    return Err(Error::Other("event stream closed".to_string()));
                },
            }
        }
    }
}

/// Background task re-emitting the remote event stream on the local bus.
///
/// Startup is non-blocking: the proxy connects in the background and
/// reconnects with bounded exponential backoff whenever the stream drops.
pub struct EventProxy {
    stop: CancellationToken,
}

impl EventProxy {
    fn start(client: reqwest::Client, base_url: String, events: EventBus) -> Self {
        let stop = CancellationToken::new();
        let token = stop.clone();
        tokio::spawn(async move {
            let mut backoff = Duration::from_secs(1);
            loop {
                if token.is_cancelled() {
                    return;
                }
                match Self::pump(&client, &base_url, &events, &token).await {
                    Ok(()) => {
                        debug!("remote event stream ended cleanly, reconnecting");
                        backoff = Duration::from_secs(1);
                    },
                    Err(err) => {
                        warn!("remote event stream failed: {err}, retrying in {backoff:?}");
                    },
                }
                tokio::select! {
                    () = token.cancelled() => return,
                    () = tokio::time::sleep(backoff) => {},
                }
                backoff = (backoff * 2).min(RECONNECT_MAX);
            }
        });
        Self { stop }
    }

    /// Stops the proxy task.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    async fn pump(
        client: &reqwest::Client,
        base_url: &str,
        events: &EventBus,
        token: &CancellationToken,
    ) -> Result<()> {
        let url = format!("{base_url}/rpc/events");
        let response = client.get(&url).send().await.map_err(Error::Network)?;
        if !response.status().is_success() {
            return Err(Error::Other(format!(
                "event stream returned {}",
                response.status()
            )));
        }
        info!("connected to remote event stream");

        let mut stream = response.bytes_stream();
        let mut buffer = Vec::new();
        loop {
            let chunk = tokio::select! {
                () = token.cancelled() => return Ok(()),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else {
                return Ok(());
            };
            buffer.extend_from_slice(&chunk.map_err(Error::Network)?);

            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&line);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Event>(line) {
                    Ok(event) => events.emit(event),
                    Err(err) => warn!("unparseable remote event: {err}"),
                }
            }
        }
    }
}

impl Drop for EventProxy {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
