//! Wire envelope (spec §6 / §9).
//!
//! Every inter-party message shares the `{context, message}` shape. The
//! message body is a discriminated union keyed by `context.action`; any
//! field the matched variant doesn't recognize is preserved in `extra` so
//! the raw JSON round-trips into the event log even when this binary's
//! schema lags the wire's, per spec §9 ("unknown fields must be preserved
//! in the raw event log even if not parsed structurally").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Discover,
    OnDiscover,
    Select,
    OnSelect,
    Init,
    OnInit,
    Confirm,
    OnConfirm,
    Status,
    OnStatus,
    VerificationStart,
    SubmitProofs,
    AcceptVerification,
    RejectVerification,
    SettlementStart,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Discover => "discover",
            Action::OnDiscover => "on_discover",
            Action::Select => "select",
            Action::OnSelect => "on_select",
            Action::Init => "init",
            Action::OnInit => "on_init",
            Action::Confirm => "confirm",
            Action::OnConfirm => "on_confirm",
            Action::Status => "status",
            Action::OnStatus => "on_status",
            Action::VerificationStart => "verification_start",
            Action::SubmitProofs => "submit_proofs",
            Action::AcceptVerification => "accept_verification",
            Action::RejectVerification => "reject_verification",
            Action::SettlementStart => "settlement_start",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub version: String,
    pub action: Action,
    pub timestamp: DateTime<Utc>,
    pub message_id: String,
    pub transaction_id: String,
    pub bap_id: String,
    pub bap_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpp_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpp_uri: Option<String>,
    pub ttl: String,
    pub domain: String,
}

/// The full envelope. `message` stays a raw `serde_json::Value` at this
/// layer — each handler deserializes the concrete body it expects out of
/// it — so a field this binary doesn't know about is never dropped before
/// it reaches `db::events::record`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub context: Context,
    pub message: serde_json::Value,
}

impl Envelope {
    pub fn new(
        action: Action,
        transaction_id: &str,
        bap_id: &str,
        bap_uri: &str,
        domain: &str,
        message: serde_json::Value,
    ) -> Self {
        Self {
            context: Context {
                version: "1.1.0".to_string(),
                action,
                timestamp: Utc::now(),
                message_id: crate::clock::new_id().to_string(),
                transaction_id: transaction_id.to_string(),
                bap_id: bap_id.to_string(),
                bap_uri: bap_uri.to_string(),
                bpp_id: None,
                bpp_uri: None,
                ttl: "PT30S".to_string(),
                domain: domain.to_string(),
            },
            message,
        }
    }

    pub fn with_bpp(mut self, bpp_id: &str, bpp_uri: &str) -> Self {
        self.context.bpp_id = Some(bpp_id.to_string());
        self.context.bpp_uri = Some(bpp_uri.to_string());
        self
    }

    pub fn raw(&self) -> serde_json::Value {
        serde_json::json!({ "context": self.context, "message": self.message })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverMessage {
    pub requested_quantity: i64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_match: Option<bool>,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitMessage {
    pub offer_id: i64,
    pub quantity: i64,
    pub buyer_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmMessage {
    pub order_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusMessage {
    pub order_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_a_fresh_uuid_message_id() {
        let e1 = Envelope::new(Action::Discover, "txn-1", "bap", "http://bap", "energy", serde_json::json!({}));
        let e2 = Envelope::new(Action::Discover, "txn-1", "bap", "http://bap", "energy", serde_json::json!({}));
        assert_ne!(e1.context.message_id, e2.context.message_id);
    }

    #[test]
    fn action_strings_match_spec_vocabulary() {
        assert_eq!(Action::OnConfirm.as_str(), "on_confirm");
        assert_eq!(Action::VerificationStart.as_str(), "verification_start");
    }
}
