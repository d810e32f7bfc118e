//! Per-host FIFO dispatch with adaptive spacing, bounded concurrency and
//! jittered retry.
//!
//! State for a host (its stats, its pending queue, its active-request
//! count) lives together in one `HostState` behind one lock, per the
//! "unify the three maps" design note — three separate maps keyed by host
//! would otherwise open a window where they disagree about which hosts
//! exist.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, warn};
use serde_derive::Deserialize;
use tokio::sync::{oneshot, Mutex};

use crate::error::{DataImportError, ErrorKind};
use crate::host_stats::HostStats;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueManagerConfig {
    pub base_wait_on_retry_ms: u64,
    pub default_request_interval_ms: u64,
    pub max_concurrent_requests_per_domain: u32,
    pub max_request_interval_ms: u64,
    pub min_request_interval_ms: u64,
    pub max_retries: u32,
    pub min_expected_response_time_ms: u64,
    pub retryable_status_codes: Vec<u16>,
}

impl Default for QueueManagerConfig {
    fn default() -> Self {
        QueueManagerConfig {
            base_wait_on_retry_ms: 500,
            default_request_interval_ms: 1000,
            max_concurrent_requests_per_domain: 4,
            max_request_interval_ms: 30_000,
            min_request_interval_ms: 200,
            max_retries: 3,
            min_expected_response_time_ms: 500,
            retryable_status_codes: vec![429, 408, 502, 503, 504],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Option<reqwest::Method>,
    pub headers: Option<reqwest::header::HeaderMap>,
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: reqwest::header::HeaderMap,
    pub body: bytes::Bytes,
    pub final_url: String,
}

struct PendingRequest {
    url: String,
    options: RequestOptions,
    completion: oneshot::Sender<Result<FetchResponse, DataImportError>>,
}

struct HostState {
    stats: HostStats,
    queue: VecDeque<PendingRequest>,
    active_count: u32,
}

impl HostState {
    fn new(default_request_interval_ms: u64) -> Self {
        HostState {
            stats: HostStats::new(default_request_interval_ms),
            queue: VecDeque::new(),
            active_count: 0,
        }
    }
}

pub struct QueueManager {
    config: QueueManagerConfig,
    client: reqwest::Client,
    hosts: Mutex<HashMap<String, Arc<Mutex<HostState>>>>,
}

impl QueueManager {
    pub fn new(config: QueueManagerConfig) -> Arc<Self> {
        Arc::new(QueueManager {
            config,
            client: reqwest::Client::new(),
            hosts: Mutex::new(HashMap::new()),
        })
    }

    #[cfg(test)]
    pub fn with_client(config: QueueManagerConfig, client: reqwest::Client) -> Arc<Self> {
        Arc::new(QueueManager { config, client, hosts: Mutex::new(HashMap::new()) })
    }

    /// Enqueue `url` on its host's FIFO and resolve once it has finally
    /// succeeded or permanently failed.
    pub async fn queue_request(
        self: &Arc<Self>,
        url: &str,
        options: RequestOptions,
    ) -> Result<FetchResponse, DataImportError> {
        let host = extract_host(url).ok_or_else(|| DataImportError::invalid_url(url))?;
        let (tx, rx) = oneshot::channel();

        let host_state = self.host_state(&host).await;
        {
            let mut state = host_state.lock().await;
            state.queue.push_back(PendingRequest { url: url.to_string(), options, completion: tx });
        }
        self.trigger_dispatch(host);

        rx.await.unwrap_or_else(|_| {
            Err(DataImportError::new(ErrorKind::Transport, "completion sink dropped before resolving"))
        })
    }

    pub async fn are_all_queues_empty(&self) -> bool {
        let hosts = self.hosts.lock().await;
        for state in hosts.values() {
            if !state.lock().await.queue.is_empty() {
                return false;
            }
        }
        true
    }

    async fn all_active_counts_zero(&self) -> bool {
        let hosts = self.hosts.lock().await;
        for state in hosts.values() {
            if state.lock().await.active_count != 0 {
                return false;
            }
        }
        true
    }

    /// Poll every 100ms until every queue is empty and every host is idle.
    pub async fn wait_for_all_queues(&self) {
        loop {
            if self.are_all_queues_empty().await && self.all_active_counts_zero().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn host_state(&self, host: &str) -> Arc<Mutex<HostState>> {
        let mut hosts = self.hosts.lock().await;
        hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(HostState::new(self.config.default_request_interval_ms))))
            .clone()
    }

    fn trigger_dispatch(self: &Arc<Self>, host: String) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.dispatch(host).await;
        });
    }

    fn schedule_dispatch_after(self: &Arc<Self>, host: String, after: Duration) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            this.dispatch(host).await;
        });
    }

    /// One dispatch attempt for `host`: check concurrency and spacing,
    /// pop the head of the queue, execute it, adapt, repeat.
    async fn dispatch(self: Arc<Self>, host: String) {
        let host_state = self.host_state(&host).await;

        let popped = {
            let mut state = host_state.lock().await;

            if state.active_count >= self.config.max_concurrent_requests_per_domain {
                return;
            }

            let now = Instant::now();
            if let Some(last) = state.stats.last_request_time {
                let min_interval = Duration::from_millis(state.stats.min_request_interval_ms);
                let elapsed = now.duration_since(last);
                if elapsed < min_interval {
                    let remaining = min_interval - elapsed;
                    let jitter = 1.0 + 0.15 + rand::random::<f64>() * 0.35;
                    let wait = Duration::from_millis((remaining.as_millis() as f64 * jitter) as u64);
                    drop(state);
                    self.schedule_dispatch_after(host, wait);
                    return;
                }
            }

            let Some(pending) = state.queue.pop_front() else { return };
            state.active_count += 1;
            state.stats.requests_in_flight += 1;
            state.stats.last_request_time = Some(now);
            pending
        };

        let start = Instant::now();
        let result = self.make_request_with_retry(&popped.url, &popped.options, 0).await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        {
            let mut state = host_state.lock().await;
            state.active_count -= 1;
            state.stats.requests_in_flight = state.stats.requests_in_flight.saturating_sub(1);

            match &result {
                Ok(_) => {
                    let jitter2 = 1.0 + 0.15 + rand::random::<f64>() * 0.55;
                    state.stats.record_success(
                        response_time_ms,
                        self.config.min_expected_response_time_ms,
                        self.config.min_request_interval_ms,
                        self.config.max_request_interval_ms,
                        jitter2,
                    );
                }
                Err(err) => {
                    if err.kind.is_retryable() {
                        warn!("request to {} failed after retries: {}", popped.url, err);
                    } else {
                        error!("request to {} failed: {}", popped.url, err);
                    }
                    state.stats.record_error(
                        err.status_code(),
                        &self.config.retryable_status_codes,
                        self.config.max_request_interval_ms,
                    );
                }
            }
        }

        let _ = popped.completion.send(result);

        let jitter_ms = (rand::random::<f64>() * 1000.0) as u64;
        self.schedule_dispatch_after(host, Duration::from_millis(jitter_ms));
    }

    fn make_request_with_retry<'a>(
        self: &'a Arc<Self>,
        url: &'a str,
        options: &'a RequestOptions,
        attempt: u32,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<FetchResponse, DataImportError>> + Send + 'a>> {
        Box::pin(async move {
            match self.execute(url, options).await {
                Ok(response) => Ok(response),
                Err(err) => {
                    if err.kind.is_retryable() && attempt < self.config.max_retries {
                        let jitter = 1.0 + 0.15 + rand::random::<f64>() * 0.35;
                        let wait_ms =
                            (self.config.base_wait_on_retry_ms as f64 * (attempt as f64 + 1.0) * jitter).floor()
                                as u64;
                        tokio::time::sleep(Duration::from_millis(wait_ms)).await;
                        self.make_request_with_retry(url, options, attempt + 1).await
                    } else {
                        Err(err)
                    }
                }
            }
        })
    }

    async fn execute(&self, url: &str, options: &RequestOptions) -> Result<FetchResponse, DataImportError> {
        let method = options.method.clone().unwrap_or(reqwest::Method::GET);
        let mut builder = self.client.request(method, url);
        if let Some(headers) = &options.headers {
            builder = builder.headers(headers.clone());
        }

        let response = builder.send().await.map_err(DataImportError::transport)?;
        let status = response.status();
        let final_url = response.url().to_string();

        if status.is_success() {
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(DataImportError::transport)?;
            Ok(FetchResponse { status: status.as_u16(), headers, body, final_url })
        } else {
            Err(DataImportError::status(status.as_u16(), &self.config.retryable_status_codes))
        }
    }
}

fn extract_host(url: &str) -> Option<String> {
    url::Url::parse(url).ok()?.host_str().map(|h| h.to_string())
}
