use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Claim status of an inbound transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositStatus {
    /// Claimed, listener not finished (or crashed mid-way)
    Processing,
    Issued,
    Refunded,
    Ignored,
    Failed,
}

impl DepositStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositStatus::Processing => "processing",
            DepositStatus::Issued => "issued",
            DepositStatus::Refunded => "refunded",
            DepositStatus::Ignored => "ignored",
            DepositStatus::Failed => "failed",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "processing" => Some(DepositStatus::Processing),
            "issued" => Some(DepositStatus::Issued),
            "refunded" => Some(DepositStatus::Refunded),
            "ignored" => Some(DepositStatus::Ignored),
            "failed" => Some(DepositStatus::Failed),
            _ => None,
        }
    }

    /// Rows an operator has to look at
    pub fn needs_review(&self) -> bool {
        matches!(self, DepositStatus::Processing | DepositStatus::Failed)
    }
}

/// A claimed inbound transaction
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProcessedDeposit {
    pub id: i64,
    pub tx_hash: String,
    pub chain_id: i32,
    pub height: i64,
    pub depositor: String,
    pub amount: i64,
    pub status: String,
    pub response_tx_hash: Option<String>,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// For claiming a new inbound transaction
#[derive(Debug, Clone)]
pub struct NewDepositClaim {
    pub tx_hash: String,
    pub chain_id: i32,
    pub height: i64,
    pub depositor: String,
    pub amount: i64,
}

/// Redemption recorded on the ledger whose transfer did not go through
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UnpaidRedemption {
    pub id: i64,
    pub fingerprint: String,
    pub recipient: String,
    pub amount: i64,
    pub chain_id: i32,
    pub record_tx_hash: String,
    pub error: String,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUnpaidRedemption {
    pub fingerprint: String,
    pub recipient: String,
    pub amount: i64,
    pub chain_id: i32,
    pub record_tx_hash: String,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_labels() {
        for status in [
            DepositStatus::Processing,
            DepositStatus::Issued,
            DepositStatus::Refunded,
            DepositStatus::Ignored,
            DepositStatus::Failed,
        ] {
            assert_eq!(DepositStatus::from_label(status.as_str()), Some(status));
        }
        assert_eq!(DepositStatus::from_label("done"), None);
    }

    #[test]
    fn test_needs_review() {
        assert!(DepositStatus::Failed.needs_review());
        assert!(DepositStatus::Processing.needs_review());
        assert!(!DepositStatus::Issued.needs_review());
        assert!(!DepositStatus::Ignored.needs_review());
    }
}
