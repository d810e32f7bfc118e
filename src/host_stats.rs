//! Per-host adaptive rate-limiting state.
//!
//! One `HostStats` exists per remote host seen by the queue manager, created
//! lazily on first sighting and kept for the duration of the job. All
//! mutation happens on the dispatcher timeline for that host (see
//! `queue_manager::HostState`), so no interior locking lives here — the
//! lock is one level up, around the whole `HostState`.

use std::time::Instant;

#[derive(Debug, Clone)]
pub struct HostStats {
    pub min_request_interval_ms: u64,
    pub last_request_time: Option<Instant>,
    pub requests_in_flight: u32,
    pub success_count: u64,
    pub error_count: u64,
    pub consecutive_errors: u64,
}

impl HostStats {
    pub fn new(default_request_interval_ms: u64) -> Self {
        HostStats {
            min_request_interval_ms: default_request_interval_ms,
            last_request_time: None,
            requests_in_flight: 0,
            success_count: 0,
            error_count: 0,
            consecutive_errors: 0,
        }
    }

    /// Adapt spacing after a successful dispatch.
    ///
    /// The `max(configured_min * jitter, current * 0.95)` branch is a floor,
    /// not a ceiling: when `jitter > 1`, `configured_min * jitter` can exceed
    /// `current * 0.95`, so spacing can tick *up* on a fast response. This
    /// mirrors the upstream design as specified rather than "fixing" it.
    pub fn record_success(
        &mut self,
        response_time_ms: u64,
        min_expected_response_time_ms: u64,
        configured_min_ms: u64,
        configured_max_ms: u64,
        jitter2: f64,
    ) {
        self.success_count += 1;
        self.consecutive_errors = self.consecutive_errors.saturating_sub(1);

        if response_time_ms <= min_expected_response_time_ms {
            let floor = (configured_min_ms as f64) * jitter2;
            let decayed = (self.min_request_interval_ms as f64) * 0.95;
            self.min_request_interval_ms = floor.max(decayed).round() as u64;
        } else {
            let ceiling = (configured_max_ms as f64) * jitter2;
            let grown = (self.min_request_interval_ms as f64) * 1.10;
            self.min_request_interval_ms = ceiling.min(grown).round() as u64;
        }
    }

    /// Adapt spacing after a failed dispatch.
    pub fn record_error(
        &mut self,
        status_code: Option<u16>,
        retryable_status_codes: &[u16],
        max_request_interval_ms: u64,
    ) {
        self.error_count += 1;
        self.consecutive_errors += 1;

        let is_retryable_status = status_code
            .map(|s| retryable_status_codes.contains(&s))
            .unwrap_or(false);

        if is_retryable_status {
            if self.success_count == 0 {
                self.min_request_interval_ms = 10_000;
            } else {
                self.min_request_interval_ms = 30_000.min(self.min_request_interval_ms * 3);
            }
        } else if self.consecutive_errors >= 2 {
            self.min_request_interval_ms = max_request_interval_ms.min(self.min_request_interval_ms * 2);
        } else if self.error_count > 0 && self.success_count == 0 {
            self.min_request_interval_ms =
                max_request_interval_ms.min((self.min_request_interval_ms as f64 * 1.5).round() as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stats_start_at_default_interval() {
        let stats = HostStats::new(1000);
        assert_eq!(stats.min_request_interval_ms, 1000);
        assert_eq!(stats.requests_in_flight, 0);
        assert!(stats.last_request_time.is_none());
    }

    #[test]
    fn first_contact_retryable_status_forces_ten_seconds() {
        let mut stats = HostStats::new(1000);
        stats.record_error(Some(429), &[429, 503], 30_000);
        assert_eq!(stats.min_request_interval_ms, 10_000);
        assert_eq!(stats.consecutive_errors, 1);
    }

    #[test]
    fn retryable_status_after_success_triples_up_to_thirty_seconds() {
        let mut stats = HostStats::new(1000);
        stats.success_count = 1;
        stats.min_request_interval_ms = 12_000;
        stats.record_error(Some(503), &[429, 503], 30_000);
        assert_eq!(stats.min_request_interval_ms, 30_000);
    }

    #[test]
    fn two_consecutive_non_retryable_errors_double_spacing() {
        let mut stats = HostStats::new(1000);
        stats.consecutive_errors = 1;
        stats.record_error(Some(404), &[429, 503], 30_000);
        assert_eq!(stats.min_request_interval_ms, 2000);
    }

    #[test]
    fn success_below_expected_response_time_decays_spacing() {
        let mut stats = HostStats::new(10_000);
        stats.record_success(50, 500, 200, 30_000, 1.0);
        assert_eq!(stats.min_request_interval_ms, 9_500);
    }

    #[test]
    fn success_above_expected_response_time_grows_spacing() {
        let mut stats = HostStats::new(1000);
        stats.record_success(2000, 500, 200, 30_000, 1.0);
        assert_eq!(stats.min_request_interval_ms, 1100);
    }
}
