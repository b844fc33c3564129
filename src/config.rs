use crate::application::schedule::PollSchedule;
use crate::domain::ports::{LoanRecordsArc, PaymentGatewayArc};
use crate::error::Result;
use crate::infrastructure::http::{ApiClient, HttpLoanRecords, HttpPaymentGateway};
use clap::Args;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug, Clone)]
pub struct ApiConfig {
    #[arg(
        long = "api-base-url",
        env = "KOPESHA_API_BASE_URL",
        default_value = "https://kopesha-backend-3.onrender.com/api",
        help = "Base URL of the loans API"
    )]
    pub base_url: String,

    #[arg(
        long = "api-connect-timeout-secs",
        env = "KOPESHA_API_CONNECT_TIMEOUT_SECS",
        default_value = "10",
        help = "Loans API connection timeout in seconds"
    )]
    pub connect_timeout_secs: u64,

    #[arg(
        long = "api-request-timeout-secs",
        env = "KOPESHA_API_REQUEST_TIMEOUT_SECS",
        default_value = "30",
        help = "Loans API request timeout in seconds"
    )]
    pub request_timeout_secs: u64,
}

impl ApiConfig {
    fn client(&self) -> Result<ApiClient> {
        ApiClient::new(
            self.base_url.clone(),
            self.connect_timeout_secs,
            self.request_timeout_secs,
        )
    }

    pub fn payment_gateway(&self) -> Result<PaymentGatewayArc> {
        Ok(Arc::new(HttpPaymentGateway::new(self.client()?)))
    }

    pub fn loan_records(&self) -> Result<LoanRecordsArc> {
        Ok(Arc::new(HttpLoanRecords::new(self.client()?)))
    }
}

#[derive(Args, Debug, Clone)]
pub struct PollConfig {
    #[arg(
        long = "poll-interval-ms",
        env = "KOPESHA_POLL_INTERVAL_MS",
        default_value = "3000",
        help = "Delay between payment status checks in milliseconds"
    )]
    pub interval_ms: u64,

    #[arg(
        long = "max-polls",
        env = "KOPESHA_MAX_POLLS",
        default_value = "20",
        help = "Status checks before giving up on a payment"
    )]
    pub max_polls: u32,

    #[arg(
        long = "poll-deadline-secs",
        env = "KOPESHA_POLL_DEADLINE_SECS",
        default_value = "90",
        help = "Wall-clock limit for payment confirmation in seconds"
    )]
    pub deadline_secs: u64,

    #[arg(
        long = "auto-clear-secs",
        env = "KOPESHA_AUTO_CLEAR_SECS",
        default_value = "5",
        help = "Seconds a settled payment status stays displayed"
    )]
    pub auto_clear_secs: u64,
}

impl PollConfig {
    pub fn schedule(&self) -> Result<PollSchedule> {
        PollSchedule::new(
            Duration::from_millis(self.interval_ms),
            self.max_polls,
            Duration::from_secs(self.deadline_secs),
        )
    }

    pub fn auto_clear(&self) -> Duration {
        Duration::from_secs(self.auto_clear_secs)
    }
}
