//! Bulk transaction import from point-of-sale CSV exports.
//!
//! Expected header: `customer_id,bill_amount,recorded_at`. `recorded_at` may be blank (the
//! import time is used), an RFC 3339 timestamp, or a `YYYY-MM-DD` date; anything else rejects
//! the row.

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use super::domain::{BusinessId, CustomerId, TransactionRequest};
use super::repository::{LoyaltyRepository, MissionRepository, NotificationPublisher};
use super::service::{LoyaltyService, LoyaltyServiceError};

#[derive(Debug)]
pub enum TransactionImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Service(LoyaltyServiceError),
}

impl std::fmt::Display for TransactionImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionImportError::Io(err) => {
                write!(f, "failed to read transaction export: {}", err)
            }
            TransactionImportError::Csv(err) => write!(f, "invalid transaction CSV data: {}", err),
            TransactionImportError::Service(err) => {
                write!(f, "could not apply imported transactions: {}", err)
            }
        }
    }
}

impl std::error::Error for TransactionImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransactionImportError::Io(err) => Some(err),
            TransactionImportError::Csv(err) => Some(err),
            TransactionImportError::Service(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for TransactionImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for TransactionImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<LoyaltyServiceError> for TransactionImportError {
    fn from(err: LoyaltyServiceError) -> Self {
        Self::Service(err)
    }
}

/// A row the importer skipped, keyed by its line in the file (header is line 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowRejection {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    /// Summed across customers, so wider than any single balance.
    pub points_awarded: u128,
    pub rejected: Vec<RowRejection>,
}

pub struct TransactionImporter;

impl TransactionImporter {
    pub fn from_path<P, R, M, N>(
        path: P,
        service: &LoyaltyService<R, M, N>,
        business_id: &BusinessId,
        now: DateTime<Utc>,
    ) -> Result<ImportSummary, TransactionImportError>
    where
        P: AsRef<Path>,
        R: LoyaltyRepository + 'static,
        M: MissionRepository + 'static,
        N: NotificationPublisher + 'static,
    {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, service, business_id, now)
    }

    /// Apply each row in file order. Row-level problems are collected; business-level ones abort.
    pub fn from_reader<In, R, M, N>(
        reader: In,
        service: &LoyaltyService<R, M, N>,
        business_id: &BusinessId,
        now: DateTime<Utc>,
    ) -> Result<ImportSummary, TransactionImportError>
    where
        In: Read,
        R: LoyaltyRepository + 'static,
        M: MissionRepository + 'static,
        N: NotificationPublisher + 'static,
    {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut summary = ImportSummary::default();

        for (index, record) in csv_reader.deserialize::<TransactionRow>().enumerate() {
            let line = index + 2;
            let row = record?;

            let request = match row.to_request() {
                Ok(request) => request,
                Err(reason) => {
                    summary.rejected.push(RowRejection { line, reason });
                    continue;
                }
            };
            let recorded_at = match row.recorded_at() {
                Ok(recorded_at) => recorded_at.unwrap_or(now),
                Err(reason) => {
                    summary.rejected.push(RowRejection { line, reason });
                    continue;
                }
            };

            match service.record_transaction(business_id, request, recorded_at) {
                Ok(receipt) => {
                    summary.imported += 1;
                    summary.points_awarded += u128::from(receipt.transaction.points_awarded);
                }
                Err(err) if is_row_level(&err) => {
                    warn!(business_id = %business_id, line, error = %err, "skipping imported row");
                    summary.rejected.push(RowRejection {
                        line,
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }

        info!(
            business_id = %business_id,
            imported = summary.imported,
            rejected = summary.rejected.len(),
            "transaction import finished"
        );
        Ok(summary)
    }
}

fn is_row_level(err: &LoyaltyServiceError) -> bool {
    matches!(
        err,
        LoyaltyServiceError::Points(_) | LoyaltyServiceError::Invalid(_)
    )
}

#[derive(Debug, Deserialize)]
struct TransactionRow {
    customer_id: String,
    bill_amount: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    recorded_at: Option<String>,
}

impl TransactionRow {
    fn to_request(&self) -> Result<TransactionRequest, String> {
        if self.customer_id.is_empty() {
            return Err("customer_id is blank".to_string());
        }
        let bill_amount = self
            .bill_amount
            .parse::<u64>()
            .map_err(|_| format!("bill_amount '{}' is not a whole number", self.bill_amount))?;

        Ok(TransactionRequest {
            customer_id: CustomerId(self.customer_id.clone()),
            bill_amount,
        })
    }

    /// `Ok(None)` for a blank cell; a non-blank value must parse.
    fn recorded_at(&self) -> Result<Option<DateTime<Utc>>, String> {
        match self.recorded_at.as_deref() {
            None => Ok(None),
            Some(raw) => parse_timestamp(raw).map(Some).ok_or_else(|| {
                format!("recorded_at '{raw}' is not an RFC 3339 timestamp or YYYY-MM-DD date")
            }),
        }
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
