use crate::domain::loan::{LoanApplication, LoanRecord};
use crate::domain::payment::{PushReceipt, PushRequest, RemoteStatus};
use crate::domain::ports::{LoanRecords, PaymentGateway};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// How the scripted gateway answers push requests.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    Token(String),
    MissingToken,
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq)]
struct StatusReply {
    delay: Duration,
    outcome: std::result::Result<String, String>,
}

/// Replies handed out by [`InMemoryPaymentGateway`], in order.
///
/// Once the queued status replies run out, every query answers with the
/// fallback status (`PENDING` unless changed).
#[derive(Debug, Clone)]
pub struct GatewayScript {
    push: PushOutcome,
    push_delay: Duration,
    statuses: VecDeque<StatusReply>,
    fallback: String,
}

impl Default for GatewayScript {
    fn default() -> Self {
        Self {
            push: PushOutcome::Token("ws_CO_000000000001".to_string()),
            push_delay: Duration::ZERO,
            statuses: VecDeque::new(),
            fallback: "PENDING".to_string(),
        }
    }
}

impl GatewayScript {
    pub fn with_push(mut self, outcome: PushOutcome) -> Self {
        self.push = outcome;
        self
    }

    pub fn with_push_delay(mut self, delay: Duration) -> Self {
        self.push_delay = delay;
        self
    }

    pub fn queue_status(self, status: &str) -> Self {
        self.queue_delayed_status(Duration::ZERO, status)
    }

    pub fn queue_delayed_status(mut self, delay: Duration, status: &str) -> Self {
        self.statuses.push_back(StatusReply {
            delay,
            outcome: Ok(status.to_string()),
        });
        self
    }

    /// Queues a failed status query, as a gateway outage would produce.
    pub fn queue_error(mut self, message: &str) -> Self {
        self.statuses.push_back(StatusReply {
            delay: Duration::ZERO,
            outcome: Err(message.to_string()),
        });
        self
    }

    pub fn with_fallback_status(mut self, status: &str) -> Self {
        self.fallback = status.to_string();
        self
    }
}

#[derive(Debug, Default)]
struct GatewayState {
    script: GatewayScript,
    push_calls: Vec<PushRequest>,
    status_calls: u32,
}

/// A scripted, thread-safe payment gateway.
///
/// Uses `Arc<RwLock<..>>` so clones share the script and the call log, which
/// lets tests keep a handle while the flow owns another.
#[derive(Debug, Clone)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<GatewayState>>,
}

impl InMemoryPaymentGateway {
    pub fn new(script: GatewayScript) -> Self {
        Self {
            state: Arc::new(RwLock::new(GatewayState {
                script,
                ..GatewayState::default()
            })),
        }
    }

    /// Every push request received so far.
    pub async fn push_calls(&self) -> Vec<PushRequest> {
        self.state.read().await.push_calls.clone()
    }

    pub async fn status_calls(&self) -> u32 {
        self.state.read().await.status_calls
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn push(&self, request: &PushRequest) -> Result<PushReceipt> {
        let (outcome, delay) = {
            let mut state = self.state.write().await;
            state.push_calls.push(request.clone());
            (state.script.push.clone(), state.script.push_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match outcome {
            PushOutcome::Token(token) => Ok(PushReceipt {
                correlation_token: Some(token),
            }),
            PushOutcome::MissingToken => Ok(PushReceipt::default()),
            PushOutcome::Rejected(message) => Err(PaymentError::InitiationError(message)),
        }
    }

    async fn status(&self, _correlation_token: &str) -> Result<RemoteStatus> {
        let reply = {
            let mut state = self.state.write().await;
            state.status_calls += 1;
            let script = &mut state.script;
            script.statuses.pop_front().unwrap_or_else(|| StatusReply {
                delay: Duration::ZERO,
                outcome: Ok(script.fallback.clone()),
            })
        };
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }

        match reply.outcome {
            Ok(raw) => Ok(RemoteStatus::parse(&raw)),
            Err(message) => Err(PaymentError::ApiError {
                status: 503,
                message,
            }),
        }
    }
}

/// A thread-safe in-memory store of loan applications.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLoanRecords {
    records: Arc<RwLock<Vec<LoanRecord>>>,
}

impl InMemoryLoanRecords {
    /// Creates a new, empty in-memory loan store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<LoanRecord>) -> Self {
        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }
}

#[async_trait]
impl LoanRecords for InMemoryLoanRecords {
    async fn apply(&self, application: &LoanApplication) -> Result<LoanRecord> {
        let mut records = self.records.write().await;
        let id = records.iter().filter_map(|r| r.id).max().unwrap_or(0) + 1;
        let record = LoanRecord {
            id: Some(id),
            tracking_id: format!("TRK-{id:06}"),
            name: application.name.clone(),
            phone: application.phone.clone(),
            id_number: application.id_number.clone(),
            loan_amount: None,
            verification_fee: None,
            status: "PENDING".to_string(),
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn all(&self) -> Result<Vec<LoanRecord>> {
        Ok(self.records.read().await.clone())
    }

    async fn delete(&self, tracking_id: &str) -> Result<()> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.tracking_id != tracking_id);
        if records.len() == before {
            return Err(PaymentError::ApiError {
                status: 404,
                message: format!("Loan {tracking_id} not found"),
            });
        }
        Ok(())
    }
}
