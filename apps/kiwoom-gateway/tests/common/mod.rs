//! Shared test harness: a scripted in-process stand-in for the broker
//! control. Commands return scripted statuses and push the corresponding
//! events onto the gateway's queue, the way the real callback surface
//! would.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use kiwoom_gateway::{
    ConditionId, Continuation, EventSink, GatewayConfig, GatewaySession, InboundEvent,
    LoginInfoTag, OpenApiPort, OrderTicket, RawCode, Record, RegMode, RequestSettings, ScreenNo,
    SearchMode,
};

// =============================================================================
// Script Elements
// =============================================================================

/// One TR response page delivered for one submission.
pub struct TrPage {
    pub record_name: String,
    pub rows: Vec<Record>,
    pub more: bool,
}

/// One condition-search snapshot page.
pub struct CondPage {
    pub codes: Vec<String>,
    pub more: bool,
}

/// Scripted condition catalog load.
pub struct CatalogScript {
    pub ok: bool,
    pub message: String,
    pub names: String,
}

// =============================================================================
// Scripted Port
// =============================================================================

/// Scripted [`OpenApiPort`] implementation.
#[derive(Default)]
pub struct ScriptedPort {
    sink: Mutex<Option<EventSink>>,
    tr_pages: Mutex<VecDeque<TrPage>>,
    tr_statuses: Mutex<VecDeque<RawCode>>,
    cond_pages: Mutex<VecDeque<CondPage>>,
    cond_statuses: Mutex<VecDeque<RawCode>>,
    real_reg_statuses: Mutex<VecDeque<RawCode>>,
    catalog: Mutex<Option<CatalogScript>>,

    /// Observations for assertions.
    pub tr_submissions: Mutex<Vec<(String, Continuation, Instant)>>,
    pub inputs: Mutex<Vec<(String, String)>>,
    pub removals: Mutex<Vec<(String, String)>>,
    pub stopped: Mutex<Vec<(ScreenNo, ConditionId)>>,
}

impl ScriptedPort {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attach_sink(&self, sink: EventSink) {
        *self.sink.lock() = Some(sink);
    }

    fn deliver(&self, event: InboundEvent) {
        if let Some(sink) = self.sink.lock().as_ref() {
            sink.deliver(event).expect("event queue open");
        }
    }

    pub fn script_tr_page(&self, record_name: &str, rows: Vec<Record>, more: bool) {
        self.tr_pages.lock().push_back(TrPage {
            record_name: record_name.to_string(),
            rows,
            more,
        });
    }

    pub fn script_tr_status(&self, code: RawCode) {
        self.tr_statuses.lock().push_back(code);
    }

    pub fn script_cond_page(&self, codes: &[&str], more: bool) {
        self.cond_pages.lock().push_back(CondPage {
            codes: codes.iter().map(ToString::to_string).collect(),
            more,
        });
    }

    pub fn script_cond_status(&self, code: RawCode) {
        self.cond_statuses.lock().push_back(code);
    }

    pub fn script_real_reg_status(&self, code: RawCode) {
        self.real_reg_statuses.lock().push_back(code);
    }

    pub fn script_catalog(&self, ok: bool, message: &str, names: &str) {
        *self.catalog.lock() = Some(CatalogScript {
            ok,
            message: message.to_string(),
            names: names.to_string(),
        });
    }
}

#[async_trait]
impl OpenApiPort for ScriptedPort {
    async fn connect(&self) -> RawCode {
        RawCode::OK
    }

    async fn set_input(&self, key: &str, value: &str) {
        self.inputs.lock().push((key.to_string(), value.to_string()));
    }

    async fn request_tr(
        &self,
        rq_name: &str,
        tr_code: &str,
        continuation: Continuation,
        screen: ScreenNo,
    ) -> RawCode {
        self.tr_submissions
            .lock()
            .push((rq_name.to_string(), continuation, Instant::now()));

        if let Some(code) = self.tr_statuses.lock().pop_front()
            && code.is_rejected()
        {
            return code;
        }

        if let Some(page) = self.tr_pages.lock().pop_front() {
            self.deliver(InboundEvent::TrData {
                screen,
                rq_name: rq_name.to_string(),
                tr_code: tr_code.to_string(),
                record_name: page.record_name,
                prev_next: if page.more {
                    Continuation::More
                } else {
                    Continuation::None
                },
                rows: page.rows,
            });
        }
        RawCode::OK
    }

    async fn request_bulk_tr(
        &self,
        codes: &[String],
        continuation: Continuation,
        _type_flag: i32,
        rq_name: &str,
        screen: ScreenNo,
    ) -> RawCode {
        self.tr_submissions
            .lock()
            .push((rq_name.to_string(), continuation, Instant::now()));

        if let Some(page) = self.tr_pages.lock().pop_front() {
            self.deliver(InboundEvent::TrData {
                screen,
                rq_name: rq_name.to_string(),
                tr_code: "OPTKWFID".to_string(),
                record_name: page.record_name,
                prev_next: if page.more {
                    Continuation::More
                } else {
                    Continuation::None
                },
                rows: page.rows,
            });
        } else {
            // Default bulk behavior: one row per requested code.
            let rows = codes
                .iter()
                .map(|code| {
                    let mut row = Record::new();
                    row.insert("code".to_string(), code.clone());
                    row
                })
                .collect();
            self.deliver(InboundEvent::TrData {
                screen,
                rq_name: rq_name.to_string(),
                tr_code: "OPTKWFID".to_string(),
                record_name: "watchlist".to_string(),
                prev_next: Continuation::None,
                rows,
            });
        }
        RawCode::OK
    }

    async fn send_order(&self, _ticket: &OrderTicket, _screen: ScreenNo) -> RawCode {
        RawCode::OK
    }

    async fn set_real_reg(
        &self,
        _screen: ScreenNo,
        _codes: &[String],
        _fids: &[u32],
        _mode: RegMode,
    ) -> RawCode {
        self.real_reg_statuses
            .lock()
            .pop_front()
            .unwrap_or(RawCode::OK)
    }

    async fn set_real_remove(&self, screen: &str, code: &str) {
        self.removals
            .lock()
            .push((screen.to_string(), code.to_string()));
    }

    async fn load_conditions(&self) -> RawCode {
        if let Some(script) = self.catalog.lock().as_ref() {
            self.deliver(InboundEvent::ConditionListLoaded {
                ok: script.ok,
                message: script.message.clone(),
            });
        }
        RawCode::OK
    }

    async fn condition_name_list(&self) -> String {
        self.catalog
            .lock()
            .as_ref()
            .map(|script| script.names.clone())
            .unwrap_or_default()
    }

    async fn send_condition(
        &self,
        screen: ScreenNo,
        condition: &ConditionId,
        _mode: SearchMode,
    ) -> RawCode {
        if let Some(code) = self.cond_statuses.lock().pop_front()
            && code.is_rejected()
        {
            return code;
        }

        if let Some(page) = self.cond_pages.lock().pop_front() {
            self.deliver(InboundEvent::TrCondition {
                screen,
                codes: page.codes,
                condition: condition.clone(),
                prev_next: if page.more {
                    Continuation::More
                } else {
                    Continuation::None
                },
            });
        }
        RawCode::OK
    }

    async fn send_condition_stop(&self, screen: ScreenNo, condition: &ConditionId) {
        self.stopped.lock().push((screen, condition.clone()));
    }

    async fn login_info(&self, tag: LoginInfoTag) -> String {
        match tag {
            LoginInfoTag::AccountCount => "1".to_string(),
            LoginInfoTag::AccountList => "5015123410;".to_string(),
            LoginInfoTag::UserId => "user01".to_string(),
            LoginInfoTag::UserName => "홍길동".to_string(),
            LoginInfoTag::KeyboardSecurity | LoginInfoTag::Firewall => "0".to_string(),
        }
    }

    async fn master_code_name(&self, code: &str) -> String {
        match code {
            "005930" => "삼성전자".to_string(),
            "000660" => "SK하이닉스".to_string(),
            _ => String::new(),
        }
    }
}

// =============================================================================
// Harness Helpers
// =============================================================================

pub fn screen(value: u16) -> ScreenNo {
    ScreenNo::new(value).unwrap()
}

pub fn rows(count: usize, tag: &str) -> Vec<Record> {
    (0..count)
        .map(|i| {
            let mut row = Record::new();
            row.insert("field".to_string(), format!("{tag}-{i}"));
            row
        })
        .collect()
}

/// Test configuration: short deadlines, no pacing.
pub fn fast_config() -> GatewayConfig {
    GatewayConfig {
        requests: RequestSettings {
            response_timeout: Duration::from_millis(500),
            pacing_interval: Duration::ZERO,
            ..RequestSettings::default()
        },
        ..GatewayConfig::default()
    }
}

/// Wire a session to a scripted port, spawn its router, and bring the
/// connection up.
pub async fn connected_session(
    port: &Arc<ScriptedPort>,
    config: GatewayConfig,
) -> (GatewaySession, tokio::task::JoinHandle<()>) {
    let (session, router) = GatewaySession::new(
        Arc::clone(port) as Arc<dyn OpenApiPort>,
        config,
    );
    let router_handle = tokio::spawn(router.run());
    port.attach_sink(session.event_sink());

    session
        .event_sink()
        .deliver(InboundEvent::ConnectState { code: RawCode::OK })
        .unwrap();
    session
        .await_connected(Duration::from_secs(1))
        .await
        .unwrap();

    (session, router_handle)
}
