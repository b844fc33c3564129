use kopesha::application::flow::{DEFAULT_AUTO_CLEAR, PaymentFlow};
use kopesha::application::schedule::PollSchedule;
use kopesha::domain::offer::{LoanOffer, find_offer};
use kopesha::infrastructure::in_memory::InMemoryPaymentGateway;
use std::sync::Arc;
use std::time::Duration;

pub const TRACKING_ID: &str = "TRK-000042";
pub const PHONE: &str = "0712345678";

pub fn schedule(interval_secs: u64, max_attempts: u32, deadline_secs: u64) -> PollSchedule {
    PollSchedule::new(
        Duration::from_secs(interval_secs),
        max_attempts,
        Duration::from_secs(deadline_secs),
    )
    .unwrap()
}

pub fn flow(gateway: &InMemoryPaymentGateway, schedule: PollSchedule) -> PaymentFlow {
    PaymentFlow::new(Arc::new(gateway.clone()), schedule, DEFAULT_AUTO_CLEAR)
}

/// The 5,000 shilling offer with a 250 shilling fee.
pub fn offer() -> LoanOffer {
    find_offer(2).unwrap()
}
