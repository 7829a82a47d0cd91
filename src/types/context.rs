//! Transaction context handed to the scoring core by the submission pipeline

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Final status of a past transaction on the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Approved,
    Declined,
    Pending,
}

/// One entry of the account's transaction history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountEvent {
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub merchant_name: String,
    pub status: TransactionStatus,
}

/// Behavioral context for the transaction being scored.
///
/// Feature engineering happens upstream; this carries only the fields the
/// risk booster and classifier consume directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionContext {
    /// Transaction amount in account currency.
    pub amount: f64,
    /// Whether the transaction originates outside the account's home country.
    pub is_foreign: bool,
    /// Local hour of day, 0-23.
    pub transaction_hour: u8,
    /// Merchant name, when known.
    pub merchant_name: Option<String>,
    /// Past transactions on the account, oldest first.
    pub account_history: Vec<AccountEvent>,
}

impl TransactionContext {
    /// Transactions per hour over the trailing 24 hours.
    pub fn velocity_per_hour(&self) -> f64 {
        let cutoff = Utc::now() - Duration::hours(24);
        let recent = self
            .account_history
            .iter()
            .filter(|e| e.timestamp > cutoff)
            .count();
        recent as f64 / 24.0
    }

    /// Number of transactions in the trailing 24 hours.
    pub fn events_last_24h(&self) -> usize {
        let cutoff = Utc::now() - Duration::hours(24);
        self.account_history
            .iter()
            .filter(|e| e.timestamp > cutoff)
            .count()
    }

    /// Historical average transaction amount, if any history exists.
    pub fn average_amount(&self) -> Option<f64> {
        if self.account_history.is_empty() {
            return None;
        }
        let sum: f64 = self.account_history.iter().map(|e| e.amount).sum();
        Some(sum / self.account_history.len() as f64)
    }

    /// Ratio of this transaction's amount to the historical average.
    pub fn amount_ratio(&self) -> f64 {
        match self.average_amount() {
            Some(avg) if avg > 0.0 => self.amount / avg,
            _ => 1.0,
        }
    }

    /// Whether the account has at least one approved transaction at the
    /// given merchant (case-insensitive).
    pub fn has_approved_at(&self, merchant: &str) -> bool {
        self.account_history.iter().any(|e| {
            e.status == TransactionStatus::Approved
                && e.merchant_name.eq_ignore_ascii_case(merchant)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(amount: f64, hours_ago: i64, merchant: &str, status: TransactionStatus) -> AccountEvent {
        AccountEvent {
            amount,
            timestamp: Utc::now() - Duration::hours(hours_ago),
            merchant_name: merchant.to_string(),
            status,
        }
    }

    #[test]
    fn test_velocity_counts_only_trailing_day() {
        let ctx = TransactionContext {
            amount: 100.0,
            is_foreign: false,
            transaction_hour: 12,
            merchant_name: None,
            account_history: vec![
                event(10.0, 1, "A", TransactionStatus::Approved),
                event(10.0, 2, "A", TransactionStatus::Approved),
                event(10.0, 48, "A", TransactionStatus::Approved),
            ],
        };
        assert!((ctx.velocity_per_hour() - 2.0 / 24.0).abs() < 1e-9);
        assert_eq!(ctx.events_last_24h(), 2);
    }

    #[test]
    fn test_amount_ratio_without_history_is_neutral() {
        let ctx = TransactionContext {
            amount: 500.0,
            is_foreign: false,
            transaction_hour: 12,
            merchant_name: None,
            account_history: Vec::new(),
        };
        assert_eq!(ctx.average_amount(), None);
        assert!((ctx.amount_ratio() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_approved_merchant_lookup_is_case_insensitive() {
        let ctx = TransactionContext {
            amount: 50.0,
            is_foreign: false,
            transaction_hour: 12,
            merchant_name: Some("Coffee Co".to_string()),
            account_history: vec![
                event(45.0, 24 * 7, "coffee co", TransactionStatus::Approved),
                event(45.0, 24 * 3, "Book Shop", TransactionStatus::Declined),
            ],
        };
        assert!(ctx.has_approved_at("Coffee Co"));
        assert!(!ctx.has_approved_at("Book Shop"));
    }
}
