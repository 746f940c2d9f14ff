//! Event Router
//!
//! The single dedicated consumer of the event queue. Dequeues inbound
//! events in order and dispatches them to the correlator, the realtime
//! registry, and the push hub. No dispatch path blocks and no single bad
//! event can take the router down: anything unmatched or inconsistent is
//! logged, counted, and dropped.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::domain::condition::{self, ConditionId};
use crate::domain::correlation::{CorrelationOutcome, Correlator};
use crate::domain::events::{ConnectionState, EntryKind, InboundEvent, RawCode, Record};
use crate::domain::realtime::RealtimeRegistry;
use crate::error::GatewayError;
use crate::infrastructure::metrics;
use crate::infrastructure::push::{
    ChejanUpdate, ConditionHit, Notice, RealtimeUpdate, SharedPushHub,
};
use crate::infrastructure::queue::EventStream;

use super::SessionShared;

/// Interval of the deadline backstop sweep.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Single consumer task for the inbound event path.
///
/// Constructed together with its [`super::GatewaySession`]; spawn
/// [`Self::run`] on the runtime before issuing commands.
pub struct EventRouter {
    events: EventStream,
    correlator: Arc<Correlator>,
    registry: Arc<RealtimeRegistry>,
    hub: SharedPushHub,
    shared: Arc<SessionShared>,
    shutdown: CancellationToken,
}

impl EventRouter {
    pub(crate) fn new(
        events: EventStream,
        correlator: Arc<Correlator>,
        registry: Arc<RealtimeRegistry>,
        hub: SharedPushHub,
        shared: Arc<SessionShared>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            events,
            correlator,
            registry,
            hub,
            shared,
            shutdown,
        }
    }

    /// Drain the queue until shutdown or until every sink is dropped.
    pub async fn run(mut self) {
        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!("event router started");
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    tracing::info!("event router shut down");
                    break;
                }
                _ = sweep.tick() => {
                    let expired = self.correlator.expire_overdue(Utc::now());
                    if !expired.is_empty() {
                        tracing::warn!(count = expired.len(), "expired overdue requests");
                    }
                    metrics::set_pending_requests(self.correlator.pending_count());
                }
                event = self.events.recv() => {
                    let Some(event) = event else {
                        tracing::info!("event queue closed, router stopping");
                        break;
                    };
                    metrics::set_queue_depth(self.events.depth());
                    metrics::record_event_routed(event.kind());
                    self.dispatch(event);
                }
            }
        }
    }

    /// Route one event. Total: never panics, never blocks.
    fn dispatch(&self, event: InboundEvent) {
        match event {
            InboundEvent::TrData {
                screen,
                rq_name,
                tr_code,
                record_name,
                prev_next,
                rows,
            } => {
                let outcome = self.correlator.on_tr_data(
                    screen,
                    &rq_name,
                    &tr_code,
                    &record_name,
                    prev_next,
                    rows,
                );
                Self::log_outcome("tr_data", &outcome);
            }
            InboundEvent::RealData {
                code,
                real_type,
                fields,
            } => self.route_realtime(code, real_type, fields),
            InboundEvent::Message {
                screen,
                rq_name,
                tr_code,
                text,
            } => {
                tracing::debug!(%screen, %rq_name, %tr_code, %text, "request notice");
                let _ = self.hub.send_notice(Notice {
                    screen,
                    rq_name,
                    tr_code,
                    text,
                });
            }
            InboundEvent::Chejan {
                kind,
                item_count,
                fids,
            } => {
                let _ = self.hub.send_chejan(ChejanUpdate {
                    kind,
                    item_count,
                    fids,
                });
            }
            InboundEvent::ConnectState { code } => self.apply_connect_state(code.is_ok(), code),
            InboundEvent::RealCondition {
                code,
                entry,
                condition,
            } => self.route_condition_hit(code, entry, condition),
            InboundEvent::TrCondition {
                screen,
                codes,
                condition,
                prev_next,
            } => {
                let rows: Vec<Record> = codes
                    .iter()
                    .map(|code| {
                        let mut record = Record::new();
                        record.insert(condition::CODE_FIELD.to_string(), code.clone());
                        record
                    })
                    .collect();
                let outcome = self.correlator.on_tr_data(
                    screen,
                    &condition.rq_name(),
                    condition::SEARCH_OP_CODE,
                    &condition.name,
                    prev_next,
                    rows,
                );
                Self::log_outcome("tr_condition", &outcome);
            }
            InboundEvent::ConditionListLoaded { ok, message } => {
                let result = if ok {
                    Ok(())
                } else {
                    Err(GatewayError::protocol(format!(
                        "condition catalog load failed: {message}"
                    )))
                };
                if !self.shared.catalog_load.resolve(result) {
                    metrics::record_orphan("condition_list_loaded");
                    tracing::warn!(ok, %message, "condition catalog event with no load in flight");
                }
            }
        }
    }

    fn route_realtime(&self, code: String, real_type: String, fields: Record) {
        let screens = self.registry.screens_for(&code);
        if screens.is_empty() {
            metrics::record_orphan("real_data");
            tracing::debug!(%code, %real_type, "realtime tick for unregistered code dropped");
            return;
        }
        let _ = self.hub.send_realtime(RealtimeUpdate {
            code,
            real_type,
            screens,
            fields,
        });
    }

    fn route_condition_hit(&self, code: String, entry: EntryKind, condition: ConditionId) {
        let screens = self.registry.screens_for_condition(&condition);
        if screens.is_empty() {
            metrics::record_orphan("real_condition");
            tracing::debug!(%code, %condition, "condition hit with no active watch dropped");
            return;
        }
        let _ = self.hub.send_condition_hit(ConditionHit {
            condition,
            code,
            entry,
            screens,
        });
    }

    fn apply_connect_state(&self, connected: bool, code: RawCode) {
        let state = if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::DisconnectedWithReason(code)
        };
        *self.shared.connection.lock() = state;
        metrics::set_connection_up(connected);

        if connected {
            tracing::info!("broker session connected");
        } else {
            tracing::warn!(reason = code.value(), "broker session disconnected");
            // Everything in flight resolves now rather than timing out.
            let failed = self.correlator.fail_all(&GatewayError::ConnectionLost);
            if failed > 0 {
                tracing::warn!(failed, "pending requests failed on connection loss");
            }
            self.shared.catalog_load.resolve(Err(GatewayError::ConnectionLost));
            metrics::set_pending_requests(0);
        }
        let _ = self.hub.send_connection(state);
    }

    fn log_outcome(kind: &'static str, outcome: &CorrelationOutcome) {
        match outcome {
            CorrelationOutcome::MorePending { key, pages } => {
                tracing::debug!(%key, pages, "continuation page accumulated");
            }
            CorrelationOutcome::Completed { key, rows, pages } => {
                tracing::debug!(%key, rows, pages, "request completed");
            }
            CorrelationOutcome::Orphan { screen, rq_name } => {
                metrics::record_orphan(kind);
                tracing::warn!(%screen, %rq_name, "orphan event dropped");
            }
            CorrelationOutcome::ErrorSignaled { key, error } => {
                tracing::error!(%key, %error, "request failed by inconsistent event");
            }
        }
    }
}
