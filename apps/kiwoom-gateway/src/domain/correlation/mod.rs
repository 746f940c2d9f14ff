//! Request Correlation
//!
//! Tracks in-flight TR requests keyed by (screen, request name) and matches
//! asynchronous response events back to them, including multi-page
//! continuation responses that arrive as a sequence of events for one
//! logical query.
//!
//! # Design
//!
//! A pending request owns a one-shot page waiter that the facade arms
//! before every submission. Each matched event fulfills the waiter exactly
//! once: either "more pages remain" (the facade re-issues the call with the
//! continuation flag and arms a fresh waiter for the SAME pending request)
//! or "done" with the accumulated result. Events that match nothing are
//! orphans: logged by the router, never an error, never a state mutation.
//!
//! Screens are exclusive for queries: a second `begin` for a busy
//! (screen, request-name) pair fails fast instead of queueing.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::domain::events::{Continuation, Record};
use crate::domain::screen::ScreenNo;
use crate::error::GatewayError;

// =============================================================================
// Keys and Handles
// =============================================================================

/// Correlation key of a pending request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    /// Screen the request was issued on.
    pub screen: ScreenNo,
    /// Caller-chosen request name.
    pub rq_name: String,
}

impl RequestKey {
    /// Create a correlation key.
    #[must_use]
    pub fn new(screen: ScreenNo, rq_name: impl Into<String>) -> Self {
        Self {
            screen,
            rq_name: rq_name.into(),
        }
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.screen, self.rq_name)
    }
}

/// Handle to a registered pending request.
///
/// Carries a lease id so a stale handle can never cancel a successor
/// request that reused the same key.
#[derive(Debug, Clone)]
pub struct RequestHandle {
    /// Correlation key of the request.
    pub key: RequestKey,
    /// Unique lease for this registration.
    pub lease: Uuid,
}

// =============================================================================
// Accumulation
// =============================================================================

/// How continuation pages combine into the accumulated result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccumulationPolicy {
    /// Concatenate pages in arrival order (list-shaped responses).
    #[default]
    Append,
    /// Keep only the latest page (scalar-shaped responses).
    Replace,
}

/// Accumulated result of a completed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    /// Operation code of the query.
    pub tr_code: String,
    /// Record name reported by the first response page.
    pub record_name: String,
    /// Accumulated rows.
    pub rows: Vec<Record>,
    /// Number of pages received.
    pub pages: u32,
}

/// Per-page resolution delivered through the armed waiter.
#[derive(Debug)]
pub enum PageOutcome {
    /// More pages remain; re-issue with the continuation flag.
    More,
    /// The query completed with the accumulated result.
    Done(QueryResult),
}

type PageWaiter = oneshot::Sender<Result<PageOutcome, GatewayError>>;

/// Receiver half of an armed page waiter.
pub type PageReceiver = oneshot::Receiver<Result<PageOutcome, GatewayError>>;

// =============================================================================
// Outcomes
// =============================================================================

/// Result of routing one response event through the correlator.
#[derive(Debug)]
pub enum CorrelationOutcome {
    /// A page was accumulated and further pages remain.
    MorePending {
        /// Key of the matched request.
        key: RequestKey,
        /// Pages accumulated so far.
        pages: u32,
    },
    /// The request completed and was removed.
    Completed {
        /// Key of the matched request.
        key: RequestKey,
        /// Total accumulated rows.
        rows: usize,
        /// Total pages received.
        pages: u32,
    },
    /// No pending request matched; the event was dropped.
    Orphan {
        /// Screen tag of the orphan event.
        screen: ScreenNo,
        /// Request name of the orphan event.
        rq_name: String,
    },
    /// The event was structurally inconsistent; the request was failed.
    ErrorSignaled {
        /// Key of the matched request.
        key: RequestKey,
        /// The error the waiter was resolved with.
        error: GatewayError,
    },
}

// =============================================================================
// Pending Requests
// =============================================================================

#[derive(Debug)]
struct PendingRequest {
    lease: Uuid,
    tr_code: String,
    policy: AccumulationPolicy,
    record_name: String,
    rows: Vec<Record>,
    pages: u32,
    created_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
    waiter: Option<PageWaiter>,
}

impl PendingRequest {
    fn resolve(&mut self, value: Result<PageOutcome, GatewayError>) {
        if let Some(waiter) = self.waiter.take() {
            // The receiver may have been dropped by a cancelled caller.
            let _ = waiter.send(value);
        }
    }
}

// =============================================================================
// Correlator
// =============================================================================

/// In-flight request table.
///
/// One lock, O(1) amortized mutations, safe to share between the facade
/// (caller tasks) and the single event-router task.
#[derive(Debug)]
pub struct Correlator {
    page_cap: u32,
    inner: Mutex<HashMap<RequestKey, PendingRequest>>,
}

impl Correlator {
    /// Create a correlator with a continuation sanity cap.
    #[must_use]
    pub fn new(page_cap: u32) -> Self {
        Self {
            page_cap,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Register a pending request.
    ///
    /// Fails with [`GatewayError::DuplicateRequest`] if the key is already
    /// pending; screens are exclusive for queries.
    pub fn begin(
        &self,
        screen: ScreenNo,
        rq_name: impl Into<String>,
        tr_code: impl Into<String>,
        policy: AccumulationPolicy,
        deadline: DateTime<Utc>,
    ) -> Result<RequestHandle, GatewayError> {
        let key = RequestKey::new(screen, rq_name);
        let mut inner = self.inner.lock();
        if inner.contains_key(&key) {
            return Err(GatewayError::DuplicateRequest {
                screen: Some(key.screen),
                rq_name: key.rq_name,
            });
        }

        let lease = Uuid::new_v4();
        inner.insert(
            key.clone(),
            PendingRequest {
                lease,
                tr_code: tr_code.into(),
                policy,
                record_name: String::new(),
                rows: Vec::new(),
                pages: 0,
                created_at: Utc::now(),
                deadline,
                waiter: None,
            },
        );
        Ok(RequestHandle { key, lease })
    }

    /// Arm the page waiter for the next submission.
    ///
    /// Fails with [`GatewayError::Cancelled`] if the request is no longer
    /// pending or the handle's lease is stale.
    pub fn arm(&self, handle: &RequestHandle) -> Result<PageReceiver, GatewayError> {
        let mut inner = self.inner.lock();
        let pending = inner
            .get_mut(&handle.key)
            .filter(|p| p.lease == handle.lease)
            .ok_or(GatewayError::Cancelled)?;

        let (tx, rx) = oneshot::channel();
        pending.waiter = Some(tx);
        Ok(rx)
    }

    /// Match one response event against the pending table.
    pub fn on_tr_data(
        &self,
        screen: ScreenNo,
        rq_name: &str,
        tr_code: &str,
        record_name: &str,
        prev_next: Continuation,
        rows: Vec<Record>,
    ) -> CorrelationOutcome {
        let key = RequestKey::new(screen, rq_name);
        let mut inner = self.inner.lock();

        let Some(pending) = inner.get_mut(&key) else {
            return CorrelationOutcome::Orphan {
                screen,
                rq_name: rq_name.to_string(),
            };
        };

        if pending.tr_code != tr_code {
            let error = GatewayError::protocol(format!(
                "response tr_code {tr_code:?} does not match pending {:?}",
                pending.tr_code
            ));
            if let Some(mut failed) = inner.remove(&key) {
                failed.resolve(Err(error.clone()));
            }
            return CorrelationOutcome::ErrorSignaled { key, error };
        }

        if pending.record_name.is_empty() {
            pending.record_name = record_name.to_string();
        }
        match pending.policy {
            AccumulationPolicy::Append => pending.rows.extend(rows),
            AccumulationPolicy::Replace => pending.rows = rows,
        }
        pending.pages += 1;

        if prev_next.has_more() {
            if pending.pages >= self.page_cap {
                let error = GatewayError::protocol(format!(
                    "continuation still flagged after {} pages",
                    pending.pages
                ));
                if let Some(mut failed) = inner.remove(&key) {
                    failed.resolve(Err(error.clone()));
                }
                return CorrelationOutcome::ErrorSignaled { key, error };
            }

            let pages = pending.pages;
            pending.resolve(Ok(PageOutcome::More));
            return CorrelationOutcome::MorePending { key, pages };
        }

        let Some(mut done) = inner.remove(&key) else {
            return CorrelationOutcome::Orphan {
                screen,
                rq_name: rq_name.to_string(),
            };
        };
        let result = QueryResult {
            tr_code: done.tr_code.clone(),
            record_name: done.record_name.clone(),
            rows: std::mem::take(&mut done.rows),
            pages: done.pages,
        };
        let rows = result.rows.len();
        let pages = result.pages;
        done.resolve(Ok(PageOutcome::Done(result)));
        CorrelationOutcome::Completed { key, rows, pages }
    }

    /// Remove a pending request, resolving its waiter with `error`.
    ///
    /// Returns whether the request was still pending under this handle's
    /// lease. Late events for a cancelled request become orphans.
    pub fn cancel(&self, handle: &RequestHandle, error: GatewayError) -> bool {
        let mut inner = self.inner.lock();
        let matches = inner
            .get(&handle.key)
            .is_some_and(|p| p.lease == handle.lease);
        if !matches {
            return false;
        }
        if let Some(mut pending) = inner.remove(&handle.key) {
            pending.resolve(Err(error));
        }
        true
    }

    /// Fail every outstanding request with `error` (connection loss).
    pub fn fail_all(&self, error: &GatewayError) -> usize {
        let drained: Vec<_> = self.inner.lock().drain().collect();
        let count = drained.len();
        for (_, mut pending) in drained {
            pending.resolve(Err(error.clone()));
        }
        count
    }

    /// Remove requests whose deadline has passed, resolving each waiter
    /// with [`GatewayError::Timeout`]. Returns the expired keys.
    pub fn expire_overdue(&self, now: DateTime<Utc>) -> Vec<RequestKey> {
        let mut inner = self.inner.lock();
        let expired: Vec<RequestKey> = inner
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(k, _)| k.clone())
            .collect();
        let mut keys = Vec::with_capacity(expired.len());
        for key in expired {
            if let Some(mut pending) = inner.remove(&key) {
                pending.resolve(Err(GatewayError::Timeout));
                keys.push(key);
            }
        }
        keys
    }

    /// Number of outstanding requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().len()
    }

    /// When the request was registered, if still pending.
    #[must_use]
    pub fn pending_since(&self, key: &RequestKey) -> Option<DateTime<Utc>> {
        self.inner.lock().get(key).map(|p| p.created_at)
    }

    /// Whether any query is pending on the screen.
    #[must_use]
    pub fn screen_busy(&self, screen: ScreenNo) -> bool {
        self.inner.lock().keys().any(|k| k.screen == screen)
    }
}

// =============================================================================
// Tests
// =============================================================================
