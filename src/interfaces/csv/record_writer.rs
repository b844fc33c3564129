use crate::domain::loan::LoanRecord;
use crate::domain::offer::LoanOffer;
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use std::io::Write;

const LOAN_HEADERS: [&str; 8] = [
    "id",
    "tracking_id",
    "name",
    "phone",
    "id_number",
    "loan_amount",
    "verification_fee",
    "status",
];

const OFFER_HEADERS: [&str; 5] = ["id", "amount", "verification_fee", "duration", "interest"];

fn decimal_cell(value: Option<Decimal>) -> String {
    value.map(|v| v.normalize().to_string()).unwrap_or_default()
}

/// Writes loan records and offers as CSV to any `Write` sink (e.g., Stdout).
///
/// The header row is always written, even for an empty list.
pub struct RecordWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(sink: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(sink);
        Self { writer }
    }

    pub fn write_loans(&mut self, loans: &[LoanRecord]) -> Result<()> {
        self.writer.write_record(LOAN_HEADERS)?;
        for loan in loans {
            self.writer.write_record([
                loan.id.map(|id| id.to_string()).unwrap_or_default(),
                loan.tracking_id.clone(),
                loan.name.clone(),
                loan.phone.clone(),
                loan.id_number.clone(),
                decimal_cell(loan.loan_amount),
                decimal_cell(loan.verification_fee),
                loan.status.clone(),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn write_offers(&mut self, offers: &[LoanOffer]) -> Result<()> {
        self.writer.write_record(OFFER_HEADERS)?;
        for offer in offers {
            self.writer.write_record([
                offer.id.to_string(),
                decimal_cell(Some(offer.amount.value())),
                decimal_cell(Some(offer.verification_fee.value())),
                offer.duration_label.to_string(),
                offer.interest_label.to_string(),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes and returns the underlying sink.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| PaymentError::IoError(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::offer::catalog;
    use rust_decimal_macros::dec;

    fn written(f: impl FnOnce(&mut RecordWriter<Vec<u8>>) -> Result<()>) -> String {
        let mut writer = RecordWriter::new(Vec::new());
        f(&mut writer).unwrap();
        String::from_utf8(writer.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn test_write_offers() {
        let output = written(|w| w.write_offers(&catalog()));
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines[0], "id,amount,verification_fee,duration,interest");
        assert_eq!(lines[2], "2,5000,250,2 months,10%");
        assert_eq!(lines.len(), 8);
    }

    #[test]
    fn test_write_loans_with_missing_amounts() {
        let loans = vec![LoanRecord {
            id: Some(7),
            tracking_id: "TRK-7".to_string(),
            name: "Jane Doe".to_string(),
            phone: "0712345678".to_string(),
            id_number: "12345678".to_string(),
            loan_amount: Some(dec!(5000.00)),
            verification_fee: None,
            status: "PENDING".to_string(),
        }];

        let output = written(|w| w.write_loans(&loans));

        assert!(output.contains("7,TRK-7,Jane Doe,0712345678,12345678,5000,,PENDING"));
    }

    #[test]
    fn test_write_empty_loans_keeps_header() {
        let output = written(|w| w.write_loans(&[]));
        assert_eq!(output.trim(), LOAN_HEADERS.join(","));
    }
}
