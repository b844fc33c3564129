use super::offer::{Amount, LoanOffer};
use crate::error::PaymentError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// User-visible state of a verification-fee payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    #[default]
    Idle,
    Pending,
    Success,
    Cancelled,
    Failed,
    Timeout,
}

impl PaymentState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PaymentState::Success
                | PaymentState::Cancelled
                | PaymentState::Failed
                | PaymentState::Timeout
        )
    }

    /// Returns true if `next` is an edge of the payment state machine.
    pub fn can_transition_to(self, next: PaymentState) -> bool {
        matches!(
            (self, next),
            (PaymentState::Idle, PaymentState::Pending)
                | (
                    PaymentState::Pending,
                    PaymentState::Success
                        | PaymentState::Cancelled
                        | PaymentState::Failed
                        | PaymentState::Timeout
                )
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentState::Idle => "idle",
            PaymentState::Pending => "pending",
            PaymentState::Success => "success",
            PaymentState::Cancelled => "cancelled",
            PaymentState::Failed => "failed",
            PaymentState::Timeout => "timeout",
        }
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status value reported by the remote payment status endpoint.
///
/// Gateways disagree on casing and on the success token ("success", "PAID"),
/// so parsing is case-insensitive and accepts the known synonyms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    Pending,
    Success,
    Cancelled,
    Failed,
    Unrecognized(String),
}

impl RemoteStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => RemoteStatus::Pending,
            "success" | "successful" | "paid" | "completed" => RemoteStatus::Success,
            "cancelled" | "canceled" => RemoteStatus::Cancelled,
            "failed" | "failure" => RemoteStatus::Failed,
            _ => RemoteStatus::Unrecognized(raw.to_string()),
        }
    }

    /// The terminal state this status settles the session into, if any.
    pub fn terminal_state(&self) -> Option<PaymentState> {
        match self {
            RemoteStatus::Success => Some(PaymentState::Success),
            RemoteStatus::Cancelled => Some(PaymentState::Cancelled),
            RemoteStatus::Failed => Some(PaymentState::Failed),
            RemoteStatus::Pending | RemoteStatus::Unrecognized(_) => None,
        }
    }
}

impl<'de> Deserialize<'de> for RemoteStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(RemoteStatus::parse(&raw))
    }
}

/// Body of a push-payment (STK prompt) request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub tracking_id: String,
    pub phone: String,
    pub amount: Amount,
    pub loan_amount: Amount,
    pub verification_fee: Amount,
}

impl PushRequest {
    /// Builds the request charging the offer's verification fee.
    pub fn for_offer(tracking_id: &str, phone: &str, offer: &LoanOffer) -> Self {
        Self {
            tracking_id: tracking_id.to_string(),
            phone: phone.to_string(),
            amount: offer.verification_fee,
            loan_amount: offer.amount,
            verification_fee: offer.verification_fee,
        }
    }
}

/// Successful push-payment response. The token may legitimately be absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "ReceiptBody")]
pub struct PushReceipt {
    pub correlation_token: Option<String>,
}

// Gateways spell the checkout request id differently, and some send more
// than one spelling in the same body.
#[derive(Deserialize)]
struct ReceiptBody {
    #[serde(rename = "checkoutRequestId", default)]
    checkout_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID", default)]
    checkout_request_id_upper: Option<String>,
    #[serde(rename = "correlationToken", default)]
    correlation_token: Option<String>,
    #[serde(rename = "requestId", default)]
    request_id: Option<String>,
}

impl From<ReceiptBody> for PushReceipt {
    fn from(body: ReceiptBody) -> Self {
        let correlation_token = [
            body.checkout_request_id,
            body.checkout_request_id_upper,
            body.correlation_token,
            body.request_id,
        ]
        .into_iter()
        .flatten()
        .find(|token| !token.trim().is_empty());
        Self { correlation_token }
    }
}

/// Who currently holds the polling guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollingGuard {
    #[default]
    Released,
    Initiating,
    Polling,
}

/// One verification-fee payment attempt, owned by a payment flow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentSession {
    epoch: u64,
    tracking_id: String,
    correlation_token: Option<String>,
    state: PaymentState,
    display: Option<PaymentState>,
    attempt_count: u32,
    guard: PollingGuard,
}

impl PaymentSession {
    /// Starts a fresh idle session with the guard held by the initiator.
    pub fn claimed(epoch: u64, tracking_id: &str) -> Self {
        Self {
            epoch,
            tracking_id: tracking_id.to_string(),
            guard: PollingGuard::Initiating,
            ..Self::default()
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn tracking_id(&self) -> &str {
        &self.tracking_id
    }

    pub fn correlation_token(&self) -> Option<&str> {
        self.correlation_token.as_deref()
    }

    pub fn state(&self) -> PaymentState {
        self.state
    }

    /// State shown to the user; `None` when idle or after auto-clear.
    pub fn display(&self) -> Option<PaymentState> {
        self.display
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn guard(&self) -> PollingGuard {
        self.guard
    }

    pub fn is_polling_active(&self) -> bool {
        self.guard != PollingGuard::Released
    }

    /// Records the correlation token and enters `pending`.
    pub fn attach_token(&mut self, token: String) -> Result<(), PaymentError> {
        if self.correlation_token.is_some() {
            return Err(PaymentError::ValidationError(
                "Correlation token already set for this session".to_string(),
            ));
        }
        if self.guard != PollingGuard::Initiating || self.state != PaymentState::Idle {
            return Err(PaymentError::ValidationError(
                "Session is not awaiting initiation".to_string(),
            ));
        }
        self.correlation_token = Some(token);
        self.state = PaymentState::Pending;
        self.display = Some(PaymentState::Pending);
        self.guard = PollingGuard::Polling;
        Ok(())
    }

    /// Gives the guard back after a failed initiation. Returns true if it was held.
    pub fn abandon(&mut self) -> bool {
        if self.guard == PollingGuard::Initiating {
            self.guard = PollingGuard::Released;
            true
        } else {
            false
        }
    }

    /// Counts one poll tick. Ignored unless polling is active.
    pub fn record_attempt(&mut self) -> bool {
        if self.guard == PollingGuard::Polling && self.state == PaymentState::Pending {
            self.attempt_count += 1;
            true
        } else {
            false
        }
    }

    /// Applies a state-machine edge while polling. Returns true if applied.
    pub fn transition(&mut self, next: PaymentState) -> bool {
        if self.guard != PollingGuard::Polling || !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        self.display = Some(next);
        if next.is_terminal() {
            self.guard = PollingGuard::Released;
        }
        true
    }

    /// Releases the polling guard on cancellation. Returns true if it was held.
    pub fn release(&mut self) -> bool {
        if self.guard == PollingGuard::Released {
            return false;
        }
        self.guard = PollingGuard::Released;
        true
    }

    /// Clears the displayed state of a finished session.
    pub fn clear_display(&mut self) -> bool {
        if self.state.is_terminal() && self.display.is_some() {
            self.display = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::offer::find_offer;

    const ALL_STATES: [PaymentState; 6] = [
        PaymentState::Idle,
        PaymentState::Pending,
        PaymentState::Success,
        PaymentState::Cancelled,
        PaymentState::Failed,
        PaymentState::Timeout,
    ];

    fn polling_session() -> PaymentSession {
        let mut session = PaymentSession::claimed(1, "TRK-1");
        session.attach_token("abc123".to_string()).unwrap();
        session
    }

    #[test]
    fn test_terminal_states_have_no_outgoing_edges() {
        for from in ALL_STATES.iter().filter(|state| state.is_terminal()) {
            for to in ALL_STATES {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_idle_only_reaches_pending() {
        for to in ALL_STATES {
            assert_eq!(
                PaymentState::Idle.can_transition_to(to),
                to == PaymentState::Pending
            );
        }
    }

    #[test]
    fn test_remote_status_normalization() {
        assert_eq!(RemoteStatus::parse("PENDING"), RemoteStatus::Pending);
        assert_eq!(RemoteStatus::parse("success"), RemoteStatus::Success);
        assert_eq!(RemoteStatus::parse("PAID"), RemoteStatus::Success);
        assert_eq!(RemoteStatus::parse(" Paid "), RemoteStatus::Success);
        assert_eq!(RemoteStatus::parse("CANCELLED"), RemoteStatus::Cancelled);
        assert_eq!(RemoteStatus::parse("canceled"), RemoteStatus::Cancelled);
        assert_eq!(RemoteStatus::parse("FAILED"), RemoteStatus::Failed);
        assert_eq!(
            RemoteStatus::parse("QUEUED"),
            RemoteStatus::Unrecognized("QUEUED".to_string())
        );
        assert_eq!(RemoteStatus::parse("QUEUED").terminal_state(), None);
    }

    #[test]
    fn test_push_request_charges_verification_fee() {
        let offer = find_offer(2).unwrap();
        let request = PushRequest::for_offer("TRK-1", "0712345678", &offer);
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["trackingId"], "TRK-1");
        assert_eq!(body["phone"], "0712345678");
        assert_eq!(body["amount"], serde_json::json!(250.0));
        assert_eq!(body["loanAmount"], serde_json::json!(5000.0));
        assert_eq!(request.amount, offer.verification_fee);
        assert_eq!(request.loan_amount, offer.amount);
    }

    #[test]
    fn test_push_receipt_token_aliases() {
        let receipt: PushReceipt =
            serde_json::from_str(r#"{"CheckoutRequestID": "ws_CO_1"}"#).unwrap();
        assert_eq!(receipt.correlation_token.as_deref(), Some("ws_CO_1"));

        let receipt: PushReceipt =
            serde_json::from_str(r#"{"checkoutRequestId": "ws_CO_2"}"#).unwrap();
        assert_eq!(receipt.correlation_token.as_deref(), Some("ws_CO_2"));

        let receipt: PushReceipt = serde_json::from_str(r#"{"message": "ok"}"#).unwrap();
        assert!(receipt.correlation_token.is_none());
    }

    #[test]
    fn test_push_receipt_with_several_spellings() {
        let receipt: PushReceipt = serde_json::from_str(
            r#"{"checkoutRequestId": "ws_CO_1", "CheckoutRequestID": "ws_CO_1"}"#,
        )
        .unwrap();
        assert_eq!(receipt.correlation_token.as_deref(), Some("ws_CO_1"));

        let receipt: PushReceipt =
            serde_json::from_str(r#"{"checkoutRequestId": "", "requestId": "ws_CO_3"}"#).unwrap();
        assert_eq!(receipt.correlation_token.as_deref(), Some("ws_CO_3"));

        let receipt: PushReceipt =
            serde_json::from_str(r#"{"CheckoutRequestID": null, "ResponseCode": "0"}"#).unwrap();
        assert!(receipt.correlation_token.is_none());
    }

    #[test]
    fn test_token_is_set_once() {
        let mut session = polling_session();
        assert_eq!(session.state(), PaymentState::Pending);
        assert!(session.is_polling_active());
        assert!(session.attach_token("other".to_string()).is_err());
        assert_eq!(session.correlation_token(), Some("abc123"));
    }

    #[test]
    fn test_session_without_token_never_pending() {
        let mut session = PaymentSession::claimed(1, "TRK-1");
        assert!(!session.record_attempt());
        assert!(!session.transition(PaymentState::Success));
        assert!(session.abandon());
        assert_eq!(session.state(), PaymentState::Idle);
        assert!(!session.is_polling_active());
    }

    #[test]
    fn test_terminal_transition_releases_guard() {
        let mut session = polling_session();
        assert!(session.record_attempt());
        assert!(session.transition(PaymentState::Success));
        assert!(!session.is_polling_active());

        // Late results are refused.
        assert!(!session.transition(PaymentState::Failed));
        assert!(!session.transition(PaymentState::Timeout));
        assert!(!session.record_attempt());
        assert_eq!(session.state(), PaymentState::Success);
        assert_eq!(session.attempt_count(), 1);
    }

    #[test]
    fn test_release_blocks_further_mutation() {
        let mut session = polling_session();
        assert!(session.release());
        assert!(!session.release());
        assert!(!session.record_attempt());
        assert!(!session.transition(PaymentState::Success));
        assert_eq!(session.state(), PaymentState::Pending);
    }

    #[test]
    fn test_clear_display_keeps_history() {
        let mut session = polling_session();
        session.record_attempt();
        session.record_attempt();
        assert!(!session.clear_display());
        session.transition(PaymentState::Success);

        assert!(session.clear_display());
        assert_eq!(session.display(), None);
        assert_eq!(session.state(), PaymentState::Success);
        assert_eq!(session.attempt_count(), 2);
    }
}
