//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following the
//! Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`OpenApiPort`]: the broker control's synchronous command surface.
//!   Every command returns an immediate [`RawCode`]; the actual data
//!   arrives later through the event queue. The wire format behind these
//!   calls is opaque to the gateway.
//!
//! The inbound side has no trait: the bridge adapter owns an
//! [`crate::infrastructure::queue::EventSink`] and delivers
//! [`crate::domain::events::InboundEvent`]s, serialized on one logical
//! thread.

use async_trait::async_trait;

use crate::domain::condition::{ConditionId, SearchMode};
use crate::domain::events::{Continuation, RawCode};
use crate::domain::order::OrderTicket;
use crate::domain::realtime::RegMode;
use crate::domain::screen::ScreenNo;

// =============================================================================
// Login Info Tags
// =============================================================================

/// Session attribute tags understood by the broker's login-info call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginInfoTag {
    /// Number of accounts ("ACCOUNT_CNT").
    AccountCount,
    /// Semicolon-separated account list ("ACCNO").
    AccountList,
    /// User id ("USER_ID").
    UserId,
    /// User display name ("USER_NAME").
    UserName,
    /// Keyboard-security opt-out flag ("KEY_BSECGB").
    KeyboardSecurity,
    /// Firewall configuration flag ("FIREW_SECGB").
    Firewall,
}

impl LoginInfoTag {
    /// The broker's tag string.
    #[must_use]
    pub const fn as_tag(self) -> &'static str {
        match self {
            Self::AccountCount => "ACCOUNT_CNT",
            Self::AccountList => "ACCNO",
            Self::UserId => "USER_ID",
            Self::UserName => "USER_NAME",
            Self::KeyboardSecurity => "KEY_BSECGB",
            Self::Firewall => "FIREW_SECGB",
        }
    }
}

// =============================================================================
// OpenApi Port
// =============================================================================

/// The broker control's synchronous command surface.
///
/// Implementations wrap the actual session transport (the OCX bridge in
/// production, a scripted fake in tests). Calls must return quickly with
/// the broker's immediate status; they never deliver response data.
#[async_trait]
pub trait OpenApiPort: Send + Sync {
    /// Open the login flow. Completion arrives as a connect-state event.
    async fn connect(&self) -> RawCode;

    /// Stage one TR input value for the next request on this session.
    async fn set_input(&self, key: &str, value: &str);

    /// Submit a TR request.
    async fn request_tr(
        &self,
        rq_name: &str,
        tr_code: &str,
        continuation: Continuation,
        screen: ScreenNo,
    ) -> RawCode;

    /// Submit a multi-instrument watchlist request (up to 100 codes).
    async fn request_bulk_tr(
        &self,
        codes: &[String],
        continuation: Continuation,
        type_flag: i32,
        rq_name: &str,
        screen: ScreenNo,
    ) -> RawCode;

    /// Submit an order.
    async fn send_order(&self, ticket: &OrderTicket, screen: ScreenNo) -> RawCode;

    /// Register instrument codes and FIDs for realtime delivery.
    async fn set_real_reg(
        &self,
        screen: ScreenNo,
        codes: &[String],
        fids: &[u32],
        mode: RegMode,
    ) -> RawCode;

    /// Remove realtime registrations. Both parameters accept the broker's
    /// literal "ALL" wildcard, so they are plain strings here.
    async fn set_real_remove(&self, screen: &str, code: &str);

    /// Ask the server to load the stored condition catalog.
    async fn load_conditions(&self) -> RawCode;

    /// Fetch the loaded condition catalog ("index^name;…").
    async fn condition_name_list(&self) -> String;

    /// Start a condition search on a screen.
    async fn send_condition(
        &self,
        screen: ScreenNo,
        condition: &ConditionId,
        mode: SearchMode,
    ) -> RawCode;

    /// Stop a realtime condition search.
    async fn send_condition_stop(&self, screen: ScreenNo, condition: &ConditionId);

    /// Look up a session attribute.
    async fn login_info(&self, tag: LoginInfoTag) -> String;

    /// Look up an instrument's display name (field-dictionary collaborator).
    async fn master_code_name(&self, code: &str) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_tags_match_broker_strings() {
        assert_eq!(LoginInfoTag::AccountCount.as_tag(), "ACCOUNT_CNT");
        assert_eq!(LoginInfoTag::AccountList.as_tag(), "ACCNO");
        assert_eq!(LoginInfoTag::UserId.as_tag(), "USER_ID");
    }
}
