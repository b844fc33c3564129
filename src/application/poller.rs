use super::schedule::{PollSchedule, ScheduledTask, Tick, Ticker};
use crate::domain::payment::{PaymentSession, PaymentState, PollingGuard, RemoteStatus};
use crate::domain::ports::PaymentGatewayArc;
use crate::error::PaymentError;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Session state shared between the initiator, the poller and subscribers.
pub type SharedSession = Arc<watch::Sender<PaymentSession>>;

/// Polls the gateway's status endpoint until the session settles.
///
/// Each run is bound to one session epoch. Starting a new run, calling
/// [`StatusPoller::cancel`], or dropping the poller stops the interval, the
/// deadline, in-flight queries and the auto-clear delay of the previous run.
pub struct StatusPoller {
    gateway: PaymentGatewayArc,
    schedule: PollSchedule,
    auto_clear: Duration,
    session: SharedSession,
    active: Mutex<Option<ActivePoll>>,
}

struct ActivePoll {
    task: ScheduledTask,
}

impl StatusPoller {
    pub fn new(
        gateway: PaymentGatewayArc,
        schedule: PollSchedule,
        auto_clear: Duration,
        session: SharedSession,
    ) -> Self {
        Self {
            gateway,
            schedule,
            auto_clear,
            session,
            active: Mutex::new(None),
        }
    }

    /// Starts polling `correlation_token` on behalf of the session at `epoch`.
    ///
    /// Returns false, starting nothing, when that session is no longer
    /// waiting for confirmation, e.g. it was cancelled after its token was
    /// attached.
    pub fn start(&self, epoch: u64, correlation_token: String) -> bool {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        {
            let session = self.session.borrow();
            if session.epoch() != epoch
                || session.guard() != PollingGuard::Polling
                || session.state() != PaymentState::Pending
            {
                debug!(epoch, "Session no longer awaiting confirmation, not polling");
                return false;
            }
            debug!(epoch, tracking_id = session.tracking_id(), "Starting status poll");
        }

        let session_token = CancellationToken::new();
        let run = PollRun {
            gateway: self.gateway.clone(),
            session: self.session.clone(),
            epoch,
            correlation_token: Arc::from(correlation_token),
            settled: session_token.child_token(),
            session_token: session_token.clone(),
            auto_clear: self.auto_clear,
        };
        let schedule = self.schedule;
        let task = ScheduledTask::spawn(session_token, async move {
            let ticker = schedule.start();
            run.drive(ticker).await;
        });

        let previous = active.replace(ActivePoll { task });
        drop(previous);
        true
    }

    /// Stops the current run, if any, and releases whatever guard the current
    /// session holds, including one held by an initiation still in flight.
    ///
    /// Safe to call repeatedly. Holds the same lock as [`StatusPoller::start`],
    /// so a concurrent start is either stopped here or refuses to begin. No
    /// session mutation from the stopped run is applied once this returns.
    pub fn cancel(&self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(stopped) = active.take() {
            stopped.task.cancel();
        }
        if self.session.send_if_modified(|s| s.release()) {
            let epoch = self.session.borrow().epoch();
            info!(epoch, "Payment cancelled, polling guard released");
        }
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Everything one polling run needs, cloned into each status query task.
#[derive(Clone)]
struct PollRun {
    gateway: PaymentGatewayArc,
    session: SharedSession,
    epoch: u64,
    correlation_token: Arc<str>,
    session_token: CancellationToken,
    // Child of `session_token`; cancelled once the session reaches a terminal state.
    settled: CancellationToken,
    auto_clear: Duration,
}

impl PollRun {
    async fn drive(self, mut ticker: Ticker) {
        info!(
            epoch = self.epoch,
            correlation_token = %self.correlation_token,
            "Polling payment status"
        );

        let expiry = loop {
            tokio::select! {
                biased;
                _ = self.settled.cancelled() => break None,
                tick = ticker.next() => match tick {
                    Tick::Attempt(attempt) => self.dispatch(attempt),
                    Tick::Expired(expiry) => break Some(expiry),
                },
            }
        };
        drop(ticker);

        if let Some(expiry) = expiry
            && self.settle(PaymentState::Timeout)
        {
            let attempts = self.session.borrow().attempt_count();
            let timeout = PaymentError::TimeoutExceeded { attempts };
            warn!(epoch = self.epoch, ?expiry, error = %timeout, "Payment confirmation timed out");
        }
        self.settled.cancel();

        time::sleep(self.auto_clear).await;
        if self.mutate(|s| s.clear_display()) {
            debug!(epoch = self.epoch, "Cleared payment status display");
        }
    }

    /// Counts the attempt and issues its status query without waiting for it.
    fn dispatch(&self, attempt: u32) {
        if !self.mutate(|s| s.record_attempt()) {
            return;
        }
        debug!(epoch = self.epoch, attempt, "Querying payment status");

        let run = self.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = run.settled.cancelled() => return,
                result = run.gateway.status(&run.correlation_token) => result,
            };
            match result {
                Ok(status) => run.apply(attempt, status),
                Err(e) => {
                    let error = PaymentError::TransientPollError(e.to_string());
                    warn!(
                        epoch = run.epoch,
                        attempt,
                        error = %error,
                        "Ignoring failed status query, polling continues"
                    );
                }
            }
        });
    }

    fn apply(&self, attempt: u32, status: RemoteStatus) {
        match status.terminal_state() {
            Some(next) => {
                if self.settle(next) {
                    info!(epoch = self.epoch, attempt, state = %next, "Payment settled");
                    self.settled.cancel();
                } else {
                    debug!(epoch = self.epoch, attempt, state = %next, "Discarding late status");
                }
            }
            None => debug!(epoch = self.epoch, attempt, ?status, "Payment still pending"),
        }
    }

    fn settle(&self, next: PaymentState) -> bool {
        self.mutate(|s| s.transition(next))
    }

    /// Applies `f` to the session if this run still owns it.
    fn mutate(&self, f: impl FnOnce(&mut PaymentSession) -> bool) -> bool {
        self.session.send_if_modified(|s| {
            !self.session_token.is_cancelled() && s.epoch() == self.epoch && f(s)
        })
    }
}
