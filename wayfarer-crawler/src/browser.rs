//! Browser automation boundary and the shared network call log.
//!
//! The crawler and the execution engine both drive a [`BrowserSurface`];
//! interception events append to an append-only [`CallLog`] that readers
//! (network correlator, triple-check verifier) only ever scan.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wayfarer_core::model::{CallDirection, CapturedCall};

pub type SharedCallLog = Arc<CallLog>;

/// Append-only log of intercepted network activity, keyed by timestamp.
/// Cleared only at session boundaries.
#[derive(Default)]
pub struct CallLog {
    calls: Mutex<Vec<CapturedCall>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: CapturedCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn snapshot(&self) -> Vec<CapturedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls whose timestamps fall on or after `since_ms`.
    pub fn calls_since(&self, since_ms: i64) -> Vec<CapturedCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.timestamp >= since_ms)
            .cloned()
            .collect()
    }

    /// Responses only, most recent first.
    pub fn responses_newest_first(&self) -> Vec<CapturedCall> {
        let mut responses: Vec<CapturedCall> = self
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.direction == CallDirection::Response)
            .cloned()
            .collect();
        responses.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        responses
    }

    /// Requests issued since `since_ms` that have no matching response yet.
    pub fn in_flight_since(&self, since_ms: i64) -> usize {
        let calls = self.calls.lock().unwrap();
        let requests = calls
            .iter()
            .filter(|c| c.direction == CallDirection::Request && c.timestamp >= since_ms)
            .count();
        let responses = calls
            .iter()
            .filter(|c| c.direction == CallDirection::Response && c.timestamp >= since_ms)
            .count();
        requests.saturating_sub(responses)
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

/// The browser automation surface this system drives. One active page per
/// session, one sequential stream of navigate/locate/interact calls.
#[async_trait]
pub trait BrowserSurface: Send + Sync {
    /// Navigate and wait for the load to settle.
    async fn goto(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Snapshot of the current DOM as HTML.
    async fn page_html(&self) -> Result<String>;

    /// Wait until the selector matches a visible element.
    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<()>;

    async fn is_visible(&self, selector: &str) -> Result<bool>;

    /// Click, scrolling the element into view first.
    async fn click(&self, selector: &str) -> Result<()>;

    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// Text content of the first matching element.
    async fn text_of(&self, selector: &str) -> Result<Option<String>>;

    /// The session's network call log.
    fn call_log(&self) -> SharedCallLog;
}

/// Poll the call log until requests tracked from `window_start_ms` have
/// drained. Expiry is a warning, not a failure: the page is simply still
/// chatty and the caller proceeds with what it has.
pub async fn drain_network(log: &CallLog, window_start_ms: i64, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if log.in_flight_since(window_start_ms) == 0 {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!(
                in_flight = log.in_flight_since(window_start_ms),
                "network did not drain before timeout, continuing"
            );
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_log_window_filtering() {
        let log = CallLog::new();
        log.record(CapturedCall::request("GET", "/api/a", 100));
        log.record(CapturedCall::request("GET", "/api/b", 200));
        assert_eq!(log.calls_since(150).len(), 1);
        assert_eq!(log.calls_since(0).len(), 2);
    }

    #[test]
    fn test_in_flight_counts_unmatched_requests() {
        let log = CallLog::new();
        log.record(CapturedCall::request("GET", "/api/a", 100));
        log.record(CapturedCall::request("GET", "/api/b", 110));
        log.record(CapturedCall::response("GET", "/api/a", 200, None, 150));
        assert_eq!(log.in_flight_since(0), 1);
        log.record(CapturedCall::response("GET", "/api/b", 200, None, 160));
        assert_eq!(log.in_flight_since(0), 0);
    }

    #[test]
    fn test_responses_newest_first() {
        let log = CallLog::new();
        log.record(CapturedCall::response("GET", "/api/old", 200, None, 100));
        log.record(CapturedCall::response("GET", "/api/new", 200, None, 900));
        let responses = log.responses_newest_first();
        assert_eq!(responses[0].url, "/api/new");
    }

    #[tokio::test]
    async fn test_drain_network_times_out_with_warning() {
        let log = CallLog::new();
        log.record(CapturedCall::request("GET", "/api/slow", now_ms()));
        let drained = drain_network(&log, 0, Duration::from_millis(60)).await;
        assert!(!drained);
    }
}
