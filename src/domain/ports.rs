use super::loan::{LoanApplication, LoanRecord};
use super::payment::{PushReceipt, PushRequest, RemoteStatus};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Mobile-money push-payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Sends one STK push. A rejected request is an `InitiationError`.
    async fn push(&self, request: &PushRequest) -> Result<PushReceipt>;
    async fn status(&self, correlation_token: &str) -> Result<RemoteStatus>;
}

/// Remote loan-records API used by the application and admin surfaces.
#[async_trait]
pub trait LoanRecords: Send + Sync {
    async fn apply(&self, application: &LoanApplication) -> Result<LoanRecord>;
    async fn all(&self) -> Result<Vec<LoanRecord>>;
    async fn delete(&self, tracking_id: &str) -> Result<()>;
}

pub type PaymentGatewayArc = Arc<dyn PaymentGateway>;
pub type LoanRecordsArc = Arc<dyn LoanRecords>;
