//! Gateway Session Facade
//!
//! The synchronous command surface callers talk to. Every command forwards
//! to the broker port and returns its immediate status; query-type
//! commands additionally register with the correlator BEFORE the call goes
//! out and roll that registration back on synchronous rejection, so the
//! asynchronous leg never starts for a rejected command.
//!
//! Queries drive the continuation loop themselves: while the broker flags
//! more pages, the facade re-issues the same request with the continuation
//! marker and the correlator accumulates into the same logical request.
//! TR submissions are paced to a minimum interval because the broker
//! rejects bursts outright.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::domain::condition::{self, ConditionId, SearchMode, parse_catalog};
use crate::domain::correlation::{
    AccumulationPolicy, Correlator, PageOutcome, QueryResult, RequestHandle,
};
use crate::domain::events::{ConnectionState, Continuation, RawCode};
use crate::domain::order::OrderTicket;
use crate::domain::realtime::{RealtimeRegistry, RegMode, RegistryStats, RemoveTarget};
use crate::domain::screen::{ScreenLease, ScreenNo, ScreenPool};
use crate::error::GatewayError;
use crate::application::ports::{LoginInfoTag, OpenApiPort};
use crate::infrastructure::config::{GatewayConfig, RequestSettings};
use crate::infrastructure::metrics;
use crate::infrastructure::push::{PushHub, SharedPushHub};
use crate::infrastructure::queue::{EventSink, event_channel};

use super::{EventRouter, SessionShared};

/// Operation code the broker reports for multi-instrument watchlist data.
const BULK_OP_CODE: &str = "OPTKWFID";

// =============================================================================
// Query Specification
// =============================================================================

/// One TR query to submit.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    /// Screen to issue the query on (exclusive while pending).
    pub screen: ScreenNo,
    /// Caller-chosen correlation key.
    pub rq_name: String,
    /// Operation code.
    pub tr_code: String,
    /// TR input values, re-staged before every continuation page.
    pub inputs: Vec<(String, String)>,
    /// How continuation pages accumulate.
    pub policy: AccumulationPolicy,
}

impl QuerySpec {
    /// Create a query spec with no inputs and append accumulation.
    #[must_use]
    pub fn new(screen: ScreenNo, rq_name: impl Into<String>, tr_code: impl Into<String>) -> Self {
        Self {
            screen,
            rq_name: rq_name.into(),
            tr_code: tr_code.into(),
            inputs: Vec::new(),
            policy: AccumulationPolicy::Append,
        }
    }

    /// Add one TR input value.
    #[must_use]
    pub fn input(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs.push((key.into(), value.into()));
        self
    }

    /// Override the accumulation policy (scalar-shaped responses).
    #[must_use]
    pub fn with_policy(mut self, policy: AccumulationPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Result of a condition search snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionSearchResult {
    /// The searched condition.
    pub condition: ConditionId,
    /// Matching instrument codes, in arrival order.
    pub codes: Vec<String>,
    /// Snapshot pages received.
    pub pages: u32,
}

// =============================================================================
// Gateway Session
// =============================================================================

/// The gateway facade.
///
/// Cheap to share (`Arc`); commands may be issued from any task while the
/// paired [`EventRouter`] drains the event queue.
pub struct GatewaySession {
    port: Arc<dyn OpenApiPort>,
    requests: RequestSettings,
    correlator: Arc<Correlator>,
    registry: Arc<RealtimeRegistry>,
    screens: Arc<ScreenPool>,
    hub: SharedPushHub,
    shared: Arc<SessionShared>,
    sink: EventSink,
    pacer: AsyncMutex<Option<Instant>>,
    shutdown: CancellationToken,
}

impl GatewaySession {
    /// Wire up a session and its event router.
    ///
    /// Spawn the returned router on the runtime before issuing commands;
    /// hand [`Self::event_sink`] to the broker bridge.
    #[must_use]
    pub fn new(port: Arc<dyn OpenApiPort>, config: GatewayConfig) -> (Self, EventRouter) {
        let correlator = Arc::new(Correlator::new(config.requests.page_cap));
        let registry = Arc::new(RealtimeRegistry::new(config.realtime.clone().into()));
        let screens = Arc::new(ScreenPool::new(config.screens.clone().into()));
        let hub: SharedPushHub = Arc::new(PushHub::new(config.push.clone().into()));
        let shared = Arc::new(SessionShared::default());
        let shutdown = CancellationToken::new();

        let (sink, stream) = event_channel();
        let router = EventRouter::new(
            stream,
            Arc::clone(&correlator),
            Arc::clone(&registry),
            Arc::clone(&hub),
            Arc::clone(&shared),
            shutdown.clone(),
        );

        let session = Self {
            port,
            requests: config.requests,
            correlator,
            registry,
            screens,
            hub,
            shared,
            sink,
            pacer: AsyncMutex::new(None),
            shutdown,
        };
        (session, router)
    }

    /// Producer handle for the broker bridge.
    #[must_use]
    pub fn event_sink(&self) -> EventSink {
        self.sink.clone()
    }

    /// The push hub carrying realtime, execution, and condition streams.
    #[must_use]
    pub fn push_hub(&self) -> SharedPushHub {
        Arc::clone(&self.hub)
    }

    /// Stop the paired event router.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    // =========================================================================
    // Connection
    // =========================================================================

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.connection.lock()
    }

    /// Open the broker login flow.
    ///
    /// Returns as soon as the broker accepts the command; the session is
    /// connected only once the connect-state event lands (see
    /// [`Self::await_connected`]).
    pub async fn connect(&self) -> Result<(), GatewayError> {
        {
            let mut connection = self.shared.connection.lock();
            if connection.is_connected() {
                return Ok(());
            }
            *connection = ConnectionState::Connecting;
        }

        let code = self.port.connect().await;
        if code.is_rejected() {
            *self.shared.connection.lock() = ConnectionState::Disconnected;
            return Err(GatewayError::RejectedBySystem(code));
        }
        tracing::info!("login flow opened");
        Ok(())
    }

    /// Wait until the connect-state event lands.
    pub async fn await_connected(&self, wait: Duration) -> Result<(), GatewayError> {
        let mut rx = self.hub.connection_rx();
        if self.connection_state().is_connected() {
            return Ok(());
        }

        let outcome = tokio::time::timeout(wait, async {
            loop {
                match rx.recv().await {
                    Ok(ConnectionState::Connected) => return Ok(()),
                    Ok(ConnectionState::DisconnectedWithReason(code)) => {
                        return Err(GatewayError::RejectedBySystem(code));
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => {
                        if self.connection_state().is_connected() {
                            return Ok(());
                        }
                    }
                    Err(RecvError::Closed) => return Err(GatewayError::ConnectionLost),
                }
            }
        })
        .await;

        match outcome {
            Err(_elapsed) => Err(GatewayError::Timeout),
            Ok(result) => result,
        }
    }

    /// Look up a session attribute.
    pub async fn login_info(&self, tag: LoginInfoTag) -> String {
        self.port.login_info(tag).await
    }

    /// Look up an instrument's display name.
    pub async fn master_code_name(&self, code: &str) -> String {
        self.port.master_code_name(code).await
    }

    // =========================================================================
    // Screens
    // =========================================================================

    /// Allocate a screen for queries or realtime registrations.
    pub fn allocate_screen(&self) -> Result<ScreenLease, GatewayError> {
        Ok(self.screens.allocate()?)
    }

    /// Tear a screen down and release it into quarantine.
    ///
    /// Realtime registrations and condition watches on the screen are
    /// removed first. Fails with [`GatewayError::ScreenBusy`] while a
    /// query is still pending on the screen.
    pub async fn close_screen(&self, screen: ScreenNo) -> Result<(), GatewayError> {
        if self.correlator.screen_busy(screen) {
            return Err(GatewayError::ScreenBusy(screen));
        }

        for cond in self.registry.conditions_for(screen) {
            self.port.send_condition_stop(screen, &cond).await;
            self.registry.unregister_condition(screen, &cond);
        }
        if self.registry.has_registrations(screen) {
            self.registry.unregister(screen, &RemoveTarget::All);
            self.port.set_real_remove(&screen.to_string(), "ALL").await;
        }

        self.screens.release(screen)?;
        metrics::set_realtime_screens(self.registry.stats().screens);
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Stage one TR input value for the next request.
    pub async fn set_input(&self, key: &str, value: &str) {
        self.port.set_input(key, value).await;
    }

    /// Submit a TR query and wait for its correlated, fully-paginated
    /// result.
    pub async fn submit_query(&self, spec: QuerySpec) -> Result<QueryResult, GatewayError> {
        self.ensure_connected()?;
        let handle = self.begin_request(spec.screen, &spec.rq_name, &spec.tr_code, spec.policy)?;

        self.drive_pages(&handle, |continuation| {
            let spec = spec.clone();
            async move {
                for (key, value) in &spec.inputs {
                    self.port.set_input(key, value).await;
                }
                self.port
                    .request_tr(&spec.rq_name, &spec.tr_code, continuation, spec.screen)
                    .await
            }
        })
        .await
    }

    /// Submit a multi-instrument watchlist query (up to 100 codes in one
    /// request) and wait for its correlated result.
    pub async fn submit_bulk_query(
        &self,
        screen: ScreenNo,
        rq_name: &str,
        codes: &[String],
        type_flag: i32,
    ) -> Result<QueryResult, GatewayError> {
        self.ensure_connected()?;
        let handle =
            self.begin_request(screen, rq_name, BULK_OP_CODE, AccumulationPolicy::Append)?;

        self.drive_pages(&handle, |continuation| async move {
            self.port
                .request_bulk_tr(codes, continuation, type_flag, rq_name, screen)
                .await
        })
        .await
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Submit an order. Fills and balance changes arrive on the
    /// execution push stream, not through correlation.
    pub async fn submit_order(
        &self,
        ticket: &OrderTicket,
        screen: ScreenNo,
    ) -> Result<(), GatewayError> {
        self.ensure_connected()?;
        if ticket.action.references_original() && ticket.original_order_no.is_none() {
            return Err(GatewayError::protocol(
                "cancel/amend order without original order number",
            ));
        }

        let code = self.port.send_order(ticket, screen).await;
        if code.is_rejected() {
            return Err(GatewayError::RejectedBySystem(code));
        }
        tracing::info!(rq_name = %ticket.rq_name, code = %ticket.code, "order accepted");
        Ok(())
    }

    // =========================================================================
    // Realtime
    // =========================================================================

    /// Register instrument codes and FIDs for realtime delivery.
    ///
    /// Registry bookkeeping happens first (cap check fails fast without a
    /// broker round-trip) and is rolled back if the broker rejects the
    /// registration.
    pub async fn register_realtime(
        &self,
        screen: ScreenNo,
        codes: &[String],
        fids: &[u32],
        mode: RegMode,
    ) -> Result<(), GatewayError> {
        self.ensure_connected()?;
        let previous = self.registry.register(screen, codes, fids, mode)?;

        let code = self.port.set_real_reg(screen, codes, fids, mode).await;
        if code.is_rejected() {
            self.registry.restore(screen, previous);
            return Err(GatewayError::RejectedBySystem(code));
        }
        metrics::set_realtime_screens(self.registry.stats().screens);
        Ok(())
    }

    /// Remove one code or every code from a screen's registration.
    pub async fn unregister_realtime(&self, screen: ScreenNo, target: &RemoveTarget) {
        let removed = self.registry.unregister(screen, target);
        let code_arg = match target {
            RemoveTarget::Code(code) => code.as_str(),
            RemoveTarget::All => "ALL",
        };
        self.port.set_real_remove(&screen.to_string(), code_arg).await;
        if !removed.is_empty() {
            tracing::debug!(%screen, count = removed.len(), "realtime registrations removed");
        }
        metrics::set_realtime_screens(self.registry.stats().screens);
    }

    /// Global teardown of every realtime registration on every screen.
    ///
    /// Privileged and rarely used; never implied by any other call.
    pub async fn unregister_all_realtime(&self) {
        let screens = self.registry.unregister_all();
        self.port.set_real_remove("ALL", "ALL").await;
        tracing::info!(screens, "all realtime registrations removed");
        metrics::set_realtime_screens(0);
    }

    /// Registration statistics.
    #[must_use]
    pub fn registry_stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    // =========================================================================
    // Condition Search
    // =========================================================================

    /// Load the server-stored condition catalog.
    pub async fn load_condition_list(&self) -> Result<Vec<ConditionId>, GatewayError> {
        self.ensure_connected()?;
        let rx = self.shared.catalog_load.begin()?;

        let code = self.port.load_conditions().await;
        if code.is_rejected() {
            self.shared.catalog_load.abort();
            return Err(GatewayError::RejectedBySystem(code));
        }

        match tokio::time::timeout(self.requests.response_timeout, rx).await {
            Err(_elapsed) => {
                self.shared.catalog_load.abort();
                Err(GatewayError::Timeout)
            }
            Ok(Err(_recv)) => Err(GatewayError::Cancelled),
            Ok(Ok(Err(error))) => Err(error),
            Ok(Ok(Ok(()))) => {
                let raw = self.port.condition_name_list().await;
                Ok(parse_catalog(&raw))
            }
        }
    }

    /// Run a one-shot condition search, following continuation pages.
    pub async fn search_condition(
        &self,
        screen: ScreenNo,
        cond: &ConditionId,
    ) -> Result<ConditionSearchResult, GatewayError> {
        self.run_condition_search(screen, cond, false).await
    }

    /// Start a realtime condition watch.
    ///
    /// Returns the initial snapshot; subsequent entries and exits stream
    /// through the push hub until [`Self::stop_condition`]. Watches draw
    /// from a pool of at most 10 screens system-wide.
    pub async fn watch_condition(
        &self,
        screen: ScreenNo,
        cond: &ConditionId,
    ) -> Result<ConditionSearchResult, GatewayError> {
        self.run_condition_search(screen, cond, true).await
    }

    /// Stop a realtime condition watch.
    pub async fn stop_condition(&self, screen: ScreenNo, cond: &ConditionId) {
        self.port.send_condition_stop(screen, cond).await;
        if self.registry.unregister_condition(screen, cond) {
            tracing::debug!(%screen, condition = %cond, "condition watch stopped");
        }
    }

    async fn run_condition_search(
        &self,
        screen: ScreenNo,
        cond: &ConditionId,
        realtime: bool,
    ) -> Result<ConditionSearchResult, GatewayError> {
        self.ensure_connected()?;
        if realtime {
            self.registry.register_condition(screen, cond)?;
        }

        let handle = match self.begin_request(
            screen,
            cond.rq_name(),
            condition::SEARCH_OP_CODE,
            AccumulationPolicy::Append,
        ) {
            Ok(handle) => handle,
            Err(error) => {
                if realtime {
                    self.registry.unregister_condition(screen, cond);
                }
                return Err(error);
            }
        };

        let first_mode = if realtime {
            SearchMode::Realtime
        } else {
            SearchMode::OneShot
        };
        let result = self
            .drive_pages(&handle, |continuation| async move {
                let mode = if continuation.has_more() {
                    SearchMode::Continuation
                } else {
                    first_mode
                };
                self.port.send_condition(screen, cond, mode).await
            })
            .await;

        match result {
            Ok(result) => Ok(ConditionSearchResult {
                condition: cond.clone(),
                codes: result
                    .rows
                    .iter()
                    .filter_map(|row| row.get(condition::CODE_FIELD).cloned())
                    .collect(),
                pages: result.pages,
            }),
            Err(error) => {
                if realtime {
                    self.registry.unregister_condition(screen, cond);
                }
                Err(error)
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn ensure_connected(&self) -> Result<(), GatewayError> {
        if self.connection_state().is_connected() {
            Ok(())
        } else {
            Err(GatewayError::NotConnected)
        }
    }

    fn begin_request(
        &self,
        screen: ScreenNo,
        rq_name: impl Into<String>,
        tr_code: impl Into<String>,
        policy: AccumulationPolicy,
    ) -> Result<RequestHandle, GatewayError> {
        let deadline = Utc::now()
            + chrono::Duration::from_std(self.requests.response_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(30));
        let handle = self
            .correlator
            .begin(screen, rq_name, tr_code, policy, deadline)?;
        metrics::set_pending_requests(self.correlator.pending_count());
        Ok(handle)
    }

    /// Drive the submit/await loop for one logical request, following
    /// continuation pages until the correlator reports completion.
    async fn drive_pages<F, Fut>(
        &self,
        handle: &RequestHandle,
        submit: F,
    ) -> Result<QueryResult, GatewayError>
    where
        F: Fn(Continuation) -> Fut,
        Fut: Future<Output = RawCode>,
    {
        let started = Instant::now();
        let mut continuation = Continuation::None;

        loop {
            let rx = self.correlator.arm(handle)?;

            self.pace().await;
            let code = submit(continuation).await;
            if code.is_rejected() {
                let error = GatewayError::RejectedBySystem(code);
                self.correlator.cancel(handle, error.clone());
                metrics::set_pending_requests(self.correlator.pending_count());
                return Err(error);
            }

            let remaining = self
                .requests
                .response_timeout
                .saturating_sub(started.elapsed());
            match tokio::time::timeout(remaining, rx).await {
                Err(_elapsed) => {
                    self.correlator.cancel(handle, GatewayError::Timeout);
                    metrics::set_pending_requests(self.correlator.pending_count());
                    return Err(GatewayError::Timeout);
                }
                Ok(Err(_recv)) => return Err(GatewayError::Cancelled),
                Ok(Ok(Err(error))) => return Err(error),
                Ok(Ok(Ok(PageOutcome::More))) => {
                    continuation = Continuation::More;
                }
                Ok(Ok(Ok(PageOutcome::Done(result)))) => {
                    metrics::record_query_duration(started.elapsed());
                    metrics::set_pending_requests(self.correlator.pending_count());
                    return Ok(result);
                }
            }
        }
    }

    /// Enforce the broker's request rate: concurrent callers serialize
    /// here and each submission waits out the minimum interval.
    async fn pace(&self) {
        let mut last = self.pacer.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.requests.pacing_interval {
                tokio::time::sleep(self.requests.pacing_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

// =============================================================================
// Tests
// =============================================================================
