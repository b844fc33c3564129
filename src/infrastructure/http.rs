use crate::domain::loan::{LoanApplication, LoanRecord};
use crate::domain::payment::{PushReceipt, PushRequest, RemoteStatus};
use crate::domain::ports::{LoanRecords, PaymentGateway};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use reqwest::Url;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: RemoteStatus,
}

/// Extracts the server-supplied message from an error body, if any.
fn error_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed
        .error
        .or(parsed.message)
        .filter(|message| !message.trim().is_empty())
}

fn api_error(status: reqwest::StatusCode, body: &str, fallback: &str) -> PaymentError {
    PaymentError::ApiError {
        status: status.as_u16(),
        message: error_message(body).unwrap_or_else(|| fallback.to_string()),
    }
}

/// Shared HTTP plumbing for the remote loans API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(
        base_url: String,
        connect_timeout_secs: u64,
        request_timeout_secs: u64,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(request_timeout_secs))
            .build()?;
        let base_url = Url::parse(&base_url).map_err(|e| {
            PaymentError::ValidationError(format!("Invalid API base URL '{base_url}': {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(PaymentError::ValidationError(format!(
                "API base URL '{base_url}' cannot carry a path"
            )));
        }
        Ok(Self { client, base_url })
    }

    /// Appends `segments` to the base path, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

/// M-Pesa STK push gateway fronted by the loans API.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    api: ApiClient,
}

impl HttpPaymentGateway {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn push(&self, request: &PushRequest) -> Result<PushReceipt> {
        let url = self.api.endpoint(&["mpesa", "stkpush"]);
        debug!(%url, method = "POST", tracking_id = %request.tracking_id, "Sending STK push");

        let response = self
            .api
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| PaymentError::InitiationError(e.to_string()))?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(PaymentError::InitiationError(
                error_message(&body).unwrap_or_default(),
            ));
        }

        // An accepted push with an unreadable body is treated like a missing
        // token: the prompt may already be on the customer's phone.
        Ok(serde_json::from_str(&body).unwrap_or_else(|e| {
            warn!(%body, error = %e, "Failed to parse STK push response");
            PushReceipt::default()
        }))
    }

    async fn status(&self, correlation_token: &str) -> Result<RemoteStatus> {
        let url = self
            .api
            .endpoint(&["mpesa", "status", correlation_token]);
        debug!(%url, method = "GET", "Polling payment status");

        let response = self.api.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(api_error(status, &body, "Failed to fetch payment status"));
        }

        let parsed: StatusBody = serde_json::from_str(&body).map_err(|e| {
            debug!(%body, error = %e, "Failed to parse payment status response");
            PaymentError::from(e)
        })?;
        Ok(parsed.status)
    }
}

/// Loan application records endpoints.
#[derive(Debug, Clone)]
pub struct HttpLoanRecords {
    api: ApiClient,
}

impl HttpLoanRecords {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl LoanRecords for HttpLoanRecords {
    async fn apply(&self, application: &LoanApplication) -> Result<LoanRecord> {
        let url = self.api.endpoint(&["loans", "apply"]);
        debug!(%url, method = "POST", "Submitting loan application");

        let response = self.api.client.post(url).json(application).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(api_error(status, &body, "Failed to submit loan application"));
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn all(&self) -> Result<Vec<LoanRecord>> {
        let url = self.api.endpoint(&["loans", "all"]);
        debug!(%url, method = "GET", "Fetching loan applications");

        let response = self.api.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(api_error(status, &body, "Failed to fetch loans"));
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn delete(&self, tracking_id: &str) -> Result<()> {
        let url = self.api.endpoint(&["loans", "delete", tracking_id]);
        debug!(%url, method = "DELETE", "Deleting loan application");

        let response = self.api.client.delete(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(api_error(status, &body, "Failed to delete loan"));
        }
        Ok(())
    }
}
