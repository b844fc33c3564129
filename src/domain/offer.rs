use crate::error::PaymentError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Represents a positive currency amount in Kenyan shillings.
///
/// Wraps `rust_decimal::Decimal` so that offer amounts and verification fees
/// can never be zero or negative once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "Decimal")]
pub struct Amount(Decimal);

// The loans API expects plain JSON numbers.
impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        rust_decimal::serde::float::serialize(&self.0, serializer)
    }
}

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ksh {}", self.0.normalize())
    }
}

/// A loan product the customer can pick before paying the verification fee.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoanOffer {
    pub id: u8,
    pub amount: Amount,
    pub verification_fee: Amount,
    pub duration_label: &'static str,
    pub interest_label: &'static str,
}

impl LoanOffer {
    fn fixed(
        id: u8,
        amount: Decimal,
        verification_fee: Decimal,
        duration_label: &'static str,
        interest_label: &'static str,
    ) -> Self {
        // Catalog values are literals above zero.
        Self {
            id,
            amount: Amount(amount),
            verification_fee: Amount(verification_fee),
            duration_label,
            interest_label,
        }
    }
}

/// Returns the offer catalog in display order.
pub fn catalog() -> Vec<LoanOffer> {
    vec![
        LoanOffer::fixed(1, dec!(2500), dec!(150), "2 months", "10%"),
        LoanOffer::fixed(2, dec!(5000), dec!(250), "2 months", "10%"),
        LoanOffer::fixed(3, dec!(10000), dec!(350), "2 months", "10%"),
        LoanOffer::fixed(4, dec!(20000), dec!(500), "2 months", "10%"),
        LoanOffer::fixed(5, dec!(30000), dec!(750), "2 months", "10%"),
        LoanOffer::fixed(6, dec!(40000), dec!(850), "3 months", "12%"),
        LoanOffer::fixed(7, dec!(50000), dec!(1000), "4 months", "15%"),
    ]
}

pub fn find_offer(id: u8) -> Option<LoanOffer> {
    catalog().into_iter().find(|offer| offer.id == id)
}
