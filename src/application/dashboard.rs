use crate::domain::loan::LoanRecord;
use crate::domain::ports::LoanRecordsArc;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use tracing::info;

/// Totals shown at the top of the admin dashboard.
///
/// Fee and loan totals only count applications whose fee has been paid.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub total_applications: usize,
    pub successful_payments: usize,
    pub total_verification_fees: Decimal,
    pub total_loan_amount: Decimal,
}

impl DashboardSummary {
    pub fn from_records(records: &[LoanRecord]) -> Self {
        records.iter().filter(|record| record.is_paid()).fold(
            Self {
                total_applications: records.len(),
                ..Self::default()
            },
            |mut summary, record| {
                summary.successful_payments += 1;
                summary.total_verification_fees += record.verification_fee.unwrap_or_default();
                summary.total_loan_amount += record.loan_amount.unwrap_or_default();
                summary
            },
        )
    }
}

impl fmt::Display for DashboardSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total Applications: {}", self.total_applications)?;
        writeln!(f, "Successful Payments: {}", self.successful_payments)?;
        writeln!(
            f,
            "Total Verification Fees Paid: Ksh {}",
            self.total_verification_fees.normalize()
        )?;
        write!(
            f,
            "Total Loan Amount Qualified: Ksh {}",
            self.total_loan_amount.normalize()
        )
    }
}

/// Admin view over the loan applications held by the remote API.
pub struct Dashboard {
    records: LoanRecordsArc,
    loans: Vec<LoanRecord>,
}

impl Dashboard {
    /// Fetches the current application list.
    pub async fn load(records: LoanRecordsArc) -> Result<Self> {
        let loans = records.all().await?;
        info!(count = loans.len(), "Loaded loan applications");
        Ok(Self { records, loans })
    }

    pub fn loans(&self) -> &[LoanRecord] {
        &self.loans
    }

    pub fn summary(&self) -> DashboardSummary {
        DashboardSummary::from_records(&self.loans)
    }

    /// Deletes an application remotely, then drops it from the loaded list.
    pub async fn delete(&mut self, tracking_id: &str) -> Result<()> {
        let found = self.loans.iter().any(|loan| loan.tracking_id == tracking_id);
        info!(tracking_id, found, "Deleting loan application");

        self.records.delete(tracking_id).await?;
        self.loans.retain(|loan| loan.tracking_id != tracking_id);
        Ok(())
    }
}
