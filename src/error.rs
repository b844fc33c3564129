use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("A payment request is already in progress")]
    ConcurrentRequestError,
    #[error("Payment initiation failed: {0}")]
    InitiationError(String),
    #[error("Payment request was accepted but no checkout request id was returned")]
    MissingTokenError,
    #[error("Status query failed: {0}")]
    TransientPollError(String),
    #[error("Payment confirmation timed out after {attempts} status checks")]
    TimeoutExceeded { attempts: u32 },
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PaymentError>;
