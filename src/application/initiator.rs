use super::poller::SharedSession;
use crate::domain::offer::LoanOffer;
use crate::domain::payment::{PaymentSession, PushReceipt, PushRequest};
use crate::domain::ports::PaymentGatewayArc;
use crate::error::{PaymentError, Result};
use tracing::{info, warn};

const GENERIC_INITIATION_FAILURE: &str = "Failed to initiate payment";
pub(crate) const CANCELLED_DURING_INITIATION: &str =
    "Payment was cancelled before the gateway responded";

/// A push payment the gateway accepted, ready to be polled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Initiated {
    pub epoch: u64,
    pub correlation_token: String,
}

/// Sends the verification-fee STK push for a selected offer.
pub struct PaymentInitiator {
    gateway: PaymentGatewayArc,
    session: SharedSession,
}

impl PaymentInitiator {
    pub fn new(gateway: PaymentGatewayArc, session: SharedSession) -> Self {
        Self { gateway, session }
    }

    /// Validates the request, claims the polling guard and sends one push.
    ///
    /// # Errors
    ///
    /// * `ValidationError` - no offer selected, or missing identifiers. No request is sent.
    /// * `ConcurrentRequestError` - a session is still initiating or polling. No request is sent.
    /// * `InitiationError` - the gateway rejected the push or could not be reached.
    /// * `MissingTokenError` - the push was accepted without a checkout request id. Not retried.
    pub async fn initiate(
        &self,
        tracking_id: &str,
        phone: &str,
        offer: Option<&LoanOffer>,
    ) -> Result<Initiated> {
        let offer = offer.ok_or_else(|| {
            PaymentError::ValidationError("Please select a loan option first".to_string())
        })?;
        if tracking_id.trim().is_empty() {
            return Err(PaymentError::ValidationError(
                "Tracking id is required".to_string(),
            ));
        }
        if phone.trim().is_empty() {
            return Err(PaymentError::ValidationError(
                "Phone number is required".to_string(),
            ));
        }

        let epoch = self.claim(tracking_id)?;
        let request = PushRequest::for_offer(tracking_id, phone, offer);

        match self.gateway.push(&request).await {
            Err(e) => {
                self.abandon(epoch);
                let message = match e {
                    PaymentError::InitiationError(message) if !message.trim().is_empty() => {
                        message
                    }
                    PaymentError::InitiationError(_) => GENERIC_INITIATION_FAILURE.to_string(),
                    other => other.to_string(),
                };
                warn!(tracking_id, error = %message, "STK push rejected");
                Err(PaymentError::InitiationError(message))
            }
            Ok(PushReceipt {
                correlation_token: token,
            }) => match token.filter(|t| !t.trim().is_empty()) {
                None => {
                    self.abandon(epoch);
                    warn!(
                        tracking_id,
                        "STK push accepted without a checkout request id, not retrying"
                    );
                    Err(PaymentError::MissingTokenError)
                }
                Some(token) => {
                    self.attach(epoch, &token)?;
                    info!(
                        tracking_id,
                        correlation_token = %token,
                        "STK push sent, waiting for the customer to enter their M-Pesa PIN"
                    );
                    Ok(Initiated {
                        epoch,
                        correlation_token: token,
                    })
                }
            },
        }
    }

    /// Replaces a settled or idle session with a fresh claimed one.
    fn claim(&self, tracking_id: &str) -> Result<u64> {
        let mut claimed = None;
        self.session.send_if_modified(|s| {
            if s.is_polling_active() {
                return false;
            }
            let epoch = s.epoch() + 1;
            *s = PaymentSession::claimed(epoch, tracking_id);
            claimed = Some(epoch);
            true
        });
        claimed.ok_or(PaymentError::ConcurrentRequestError)
    }

    fn abandon(&self, epoch: u64) {
        self.session
            .send_if_modified(|s| s.epoch() == epoch && s.abandon());
    }

    fn attach(&self, epoch: u64, token: &str) -> Result<()> {
        let mut attached = Err(PaymentError::InitiationError(
            CANCELLED_DURING_INITIATION.to_string(),
        ));
        self.session.send_if_modified(|s| {
            if s.epoch() != epoch || !s.is_polling_active() {
                return false;
            }
            attached = s.attach_token(token.to_string());
            attached.is_ok()
        });
        attached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::offer::find_offer;
    use crate::domain::payment::PaymentState;
    use crate::infrastructure::in_memory::{GatewayScript, InMemoryPaymentGateway, PushOutcome};
    use std::sync::Arc;
    use tokio::sync::watch;

    fn initiator(gateway: &InMemoryPaymentGateway) -> (PaymentInitiator, SharedSession) {
        let (tx, _rx) = watch::channel(PaymentSession::default());
        let session = Arc::new(tx);
        (
            PaymentInitiator::new(Arc::new(gateway.clone()), session.clone()),
            session,
        )
    }

    #[tokio::test]
    async fn test_initiate_without_offer_sends_nothing() {
        let gateway = InMemoryPaymentGateway::new(GatewayScript::default());
        let (initiator, session) = initiator(&gateway);

        let result = initiator.initiate("TRK-1", "0712345678", None).await;

        assert!(matches!(result, Err(PaymentError::ValidationError(_))));
        assert!(gateway.push_calls().await.is_empty());
        assert!(!session.borrow().is_polling_active());
    }

    #[tokio::test]
    async fn test_initiate_records_token_and_enters_pending() {
        let gateway = InMemoryPaymentGateway::new(
            GatewayScript::default().with_push(PushOutcome::Token("abc123".to_string())),
        );
        let (initiator, session) = initiator(&gateway);
        let offer = find_offer(2).unwrap();

        let initiated = initiator
            .initiate("TRK-1", "0712345678", Some(&offer))
            .await
            .unwrap();

        assert_eq!(initiated.correlation_token, "abc123");
        let session = session.borrow();
        assert_eq!(session.state(), PaymentState::Pending);
        assert_eq!(session.correlation_token(), Some("abc123"));
        assert_eq!(session.epoch(), initiated.epoch);
        assert!(session.is_polling_active());
    }

    #[tokio::test]
    async fn test_rejected_push_keeps_idle() {
        let gateway = InMemoryPaymentGateway::new(
            GatewayScript::default().with_push(PushOutcome::Rejected("Invalid phone".to_string())),
        );
        let (initiator, session) = initiator(&gateway);
        let offer = find_offer(1).unwrap();

        let result = initiator.initiate("TRK-1", "07", Some(&offer)).await;

        match result {
            Err(PaymentError::InitiationError(message)) => assert_eq!(message, "Invalid phone"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(session.borrow().state(), PaymentState::Idle);
        assert!(!session.borrow().is_polling_active());
    }

    #[tokio::test]
    async fn test_rejected_push_without_message_uses_fallback() {
        let gateway = InMemoryPaymentGateway::new(
            GatewayScript::default().with_push(PushOutcome::Rejected(String::new())),
        );
        let (initiator, _session) = initiator(&gateway);
        let offer = find_offer(1).unwrap();

        let result = initiator.initiate("TRK-1", "0712345678", Some(&offer)).await;

        match result {
            Err(PaymentError::InitiationError(message)) => {
                assert_eq!(message, GENERIC_INITIATION_FAILURE)
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_token_is_not_retried() {
        let gateway = InMemoryPaymentGateway::new(
            GatewayScript::default().with_push(PushOutcome::MissingToken),
        );
        let (initiator, session) = initiator(&gateway);
        let offer = find_offer(3).unwrap();

        let result = initiator.initiate("TRK-1", "0712345678", Some(&offer)).await;

        assert!(matches!(result, Err(PaymentError::MissingTokenError)));
        assert_eq!(gateway.push_calls().await.len(), 1);
        assert_eq!(session.borrow().state(), PaymentState::Idle);
        assert!(!session.borrow().is_polling_active());
    }

    #[tokio::test]
    async fn test_second_initiation_rejected_while_active() {
        let gateway = InMemoryPaymentGateway::new(GatewayScript::default());
        let (initiator, _session) = initiator(&gateway);
        let offer = find_offer(2).unwrap();

        initiator
            .initiate("TRK-1", "0712345678", Some(&offer))
            .await
            .unwrap();
        let second = initiator.initiate("TRK-1", "0712345678", Some(&offer)).await;

        assert!(matches!(second, Err(PaymentError::ConcurrentRequestError)));
        assert_eq!(gateway.push_calls().await.len(), 1);
    }
}
