use super::initiator::{CANCELLED_DURING_INITIATION, PaymentInitiator};
use super::poller::{SharedSession, StatusPoller};
use super::schedule::PollSchedule;
use crate::domain::offer::LoanOffer;
use crate::domain::payment::{PaymentSession, PaymentState};
use crate::domain::ports::PaymentGatewayArc;
use crate::error::{PaymentError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Delay before a settled payment state is cleared from display.
pub const DEFAULT_AUTO_CLEAR: Duration = Duration::from_secs(5);

/// The verification-fee payment surface of a loan approval view.
///
/// Owns at most one live [`PaymentSession`]. Dropping the flow is teardown:
/// every timer and in-flight query it started is stopped.
pub struct PaymentFlow {
    initiator: PaymentInitiator,
    poller: StatusPoller,
    session: SharedSession,
}

impl PaymentFlow {
    pub fn new(gateway: PaymentGatewayArc, schedule: PollSchedule, auto_clear: Duration) -> Self {
        let (tx, _rx) = watch::channel(PaymentSession::default());
        let session = Arc::new(tx);
        Self {
            initiator: PaymentInitiator::new(gateway.clone(), session.clone()),
            poller: StatusPoller::new(gateway, schedule, auto_clear, session.clone()),
            session,
        }
    }

    /// Sends the STK push for `offer` and starts polling on success.
    ///
    /// Returns the gateway's checkout request id. See
    /// [`PaymentInitiator::initiate`] for the failure modes.
    pub async fn initiate(
        &self,
        tracking_id: &str,
        phone: &str,
        offer: Option<&LoanOffer>,
    ) -> Result<String> {
        let initiated = self.initiator.initiate(tracking_id, phone, offer).await?;
        if !self
            .poller
            .start(initiated.epoch, initiated.correlation_token.clone())
        {
            return Err(PaymentError::InitiationError(
                CANCELLED_DURING_INITIATION.to_string(),
            ));
        }
        Ok(initiated.correlation_token)
    }

    /// Stops polling and releases the guard. Called on navigate-away and on drop.
    pub fn cancel(&self) {
        self.poller.cancel();
    }

    pub fn snapshot(&self) -> PaymentSession {
        self.session.borrow().clone()
    }

    /// Receives every published session change.
    pub fn subscribe(&self) -> watch::Receiver<PaymentSession> {
        self.session.subscribe()
    }

    /// Waits until the current session stops polling.
    ///
    /// Returns the settled state, or `TimeoutExceeded` if neither the attempt
    /// ceiling nor the deadline produced a terminal status. A cancelled
    /// session reports the state it was left in.
    pub async fn wait_for_outcome(&self) -> Result<PaymentState> {
        let mut updates = self.session.subscribe();
        let (state, attempts) = {
            let session = updates
                .wait_for(|s| !s.is_polling_active())
                .await
                .map_err(|e| PaymentError::TransientPollError(e.to_string()))?;
            (session.state(), session.attempt_count())
        };
        match state {
            PaymentState::Timeout => Err(PaymentError::TimeoutExceeded { attempts }),
            state => Ok(state),
        }
    }
}

impl Drop for PaymentFlow {
    fn drop(&mut self) {
        self.cancel();
    }
}
