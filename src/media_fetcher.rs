//! Thin façade over `QueueManager`: normalize the URL, request raw bytes,
//! and turn any failure into a log line plus a `None` result so the
//! orchestrator can move on to the next reference.

use std::sync::Arc;

use log::{error, warn};

use crate::queue_manager::{QueueManager, RequestOptions};
use crate::url_cache;

pub struct FetchedMedia {
    pub file_buffer: Vec<u8>,
    pub headers: reqwest::header::HeaderMap,
}

pub struct MediaFetcher {
    queue: Arc<QueueManager>,
}

impl MediaFetcher {
    pub fn new(queue: Arc<QueueManager>) -> Self {
        MediaFetcher { queue }
    }

    /// Rewrite a leading `//` to `http://`, percent-encode, and fetch the
    /// body through the queue manager. Returns `None` on any unrecoverable
    /// error so the caller can continue with the next URL.
    ///
    /// Reuses `url_cache::normalize` for both steps: it is the same
    /// `encodeURI(raw.replace(/^\/\//, 'http://'))` formula the spec names
    /// for the cache key, so fetching through it also guarantees the bytes
    /// on the wire are requested from exactly the URL the cache is keyed on.
    pub async fn fetch(&self, url: &str) -> Option<FetchedMedia> {
        let rewritten = url_cache::normalize(url);

        match self.queue.queue_request(&rewritten, RequestOptions::default()).await {
            Ok(response) => Some(FetchedMedia { file_buffer: response.body.to_vec(), headers: response.headers }),
            Err(e) => {
                if e.kind.is_retryable() {
                    warn!("could not fetch {}: {}", rewritten, e);
                } else {
                    error!("could not fetch {}: {}", rewritten, e);
                }
                None
            }
        }
    }
}
