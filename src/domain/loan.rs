use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanType {
    Emergency,
    Topup,
    Rental,
    Car,
}

impl FromStr for LoanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "emergency" => Ok(LoanType::Emergency),
            "topup" => Ok(LoanType::Topup),
            "rental" => Ok(LoanType::Rental),
            "car" => Ok(LoanType::Car),
            other => Err(format!("unknown loan type '{other}'")),
        }
    }
}

impl fmt::Display for LoanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LoanType::Emergency => "emergency",
            LoanType::Topup => "topup",
            LoanType::Rental => "rental",
            LoanType::Car => "car",
        };
        f.write_str(label)
    }
}

/// Eligibility request submitted by the customer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanApplication {
    pub name: String,
    pub phone: String,
    pub id_number: String,
    pub loan_type: LoanType,
}

/// An application record as held by the remote loans API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanRecord {
    #[serde(default)]
    pub id: Option<u64>,
    pub tracking_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub id_number: String,
    #[serde(default)]
    pub loan_amount: Option<Decimal>,
    #[serde(default)]
    pub verification_fee: Option<Decimal>,
    #[serde(default)]
    pub status: String,
}

impl LoanRecord {
    /// True once the verification fee has been collected.
    pub fn is_paid(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("paid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_record_deserialization_tolerates_missing_fields() {
        let record: LoanRecord =
            serde_json::from_str(r#"{"trackingId": "TRK-9", "status": "PENDING"}"#).unwrap();
        assert_eq!(record.tracking_id, "TRK-9");
        assert_eq!(record.loan_amount, None);
        assert!(!record.is_paid());
    }

    #[test]
    fn test_record_paid_status_is_case_insensitive() {
        let record: LoanRecord = serde_json::from_str(
            r#"{"id": 3, "trackingId": "TRK-3", "loanAmount": 5000, "verificationFee": 250, "status": "paid"}"#,
        )
        .unwrap();
        assert!(record.is_paid());
        assert_eq!(record.verification_fee, Some(dec!(250)));
    }

    #[test]
    fn test_application_serializes_camel_case() {
        let application = LoanApplication {
            name: "Jane Doe".to_string(),
            phone: "0712345678".to_string(),
            id_number: "12345678".to_string(),
            loan_type: "TopUp".parse().unwrap(),
        };
        let body = serde_json::to_value(&application).unwrap();
        assert_eq!(body["idNumber"], "12345678");
        assert_eq!(body["loanType"], "topup");
    }
}
