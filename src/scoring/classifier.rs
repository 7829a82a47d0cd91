//! Three-tier risk classification with deterministic overrides
//!
//! Maps the final boosted score plus the transaction amount and account
//! history onto SAFE / SUSPICIOUS / FRAUD. Amount-aware override rules
//! take priority over the raw thresholds and are evaluated in a fixed
//! order, so the decision is fully deterministic and explainable.

use crate::config::ClassifierConfig;
use crate::types::context::TransactionContext;
use crate::types::result::RiskTier;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Severity of an individual risk factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// One human-readable contributing factor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    pub severity: Severity,
    pub description: String,
}

/// Maps final scores to decision tiers.
pub struct RiskClassifier {
    config: ClassifierConfig,
}

impl RiskClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Classify a transaction. Override rules run in priority order
    /// before the plain score thresholds:
    ///
    /// 1. small amount at a merchant with approved history -> SAFE
    /// 2. low amount and low score -> SAFE
    /// 3. amount above the hard fraud threshold -> FRAUD
    /// 4. score at or above the fraud threshold -> FRAUD
    /// 5. mid amount with elevated score -> SUSPICIOUS
    /// 6. plain thresholds
    pub fn classify(&self, risk_score: f64, context: &TransactionContext) -> RiskTier {
        let cfg = &self.config;
        let amount = context.amount;

        // Rule 1: trusted-merchant override beats the model outright.
        if amount < cfg.trusted_merchant_max_amount {
            if let Some(merchant) = context.merchant_name.as_deref() {
                if context.has_approved_at(merchant) {
                    debug!(amount, merchant, "Trusted merchant override -> SAFE");
                    return RiskTier::Safe;
                }
            }
        }

        // Rule 2: small amounts with low risk.
        if amount < cfg.low_amount_max && risk_score < cfg.safe_threshold {
            return RiskTier::Safe;
        }

        // Rule 3: very large amounts are blocked regardless of score.
        if amount > cfg.fraud_amount_threshold {
            debug!(amount, risk_score, "Amount override -> FRAUD");
            return RiskTier::Fraud;
        }

        // Rule 4: high score.
        if risk_score >= cfg.fraud_threshold {
            return RiskTier::Fraud;
        }

        // Rule 5: mid-range amounts with an elevated score need a human.
        if amount >= cfg.low_amount_max
            && amount <= cfg.suspicious_amount_max
            && risk_score >= cfg.safe_threshold
        {
            return RiskTier::Suspicious;
        }

        // Rule 6: plain thresholds.
        if risk_score < cfg.safe_threshold {
            RiskTier::Safe
        } else if risk_score < cfg.fraud_threshold {
            RiskTier::Suspicious
        } else {
            RiskTier::Fraud
        }
    }

    /// Structured contributing factors for the explanation layer.
    pub fn risk_factors(&self, risk_score: f64, context: &TransactionContext) -> Vec<RiskFactor> {
        let mut factors = Vec::new();

        let hour = context.transaction_hour;
        if hour < 6 || hour > 22 {
            let severity = if hour < 3 || hour > 23 {
                Severity::High
            } else {
                Severity::Medium
            };
            factors.push(RiskFactor {
                name: "unusual_transaction_time".to_string(),
                severity,
                description: format!("Transaction at {:02}:00 is outside normal hours", hour),
            });
        }

        if let Some(avg) = context.average_amount() {
            if avg > 0.0 && context.amount > avg * 2.0 {
                let severity = if context.amount > avg * 5.0 {
                    Severity::Critical
                } else {
                    Severity::High
                };
                factors.push(RiskFactor {
                    name: "abnormal_amount".to_string(),
                    severity,
                    description: format!(
                        "Amount ${:.2} is {:.0}% above the account average ${:.2}",
                        context.amount,
                        (context.amount - avg) / avg * 100.0,
                        avg
                    ),
                });
            } else if context.amount > 1000.0 {
                factors.push(RiskFactor {
                    name: "high_value_transaction".to_string(),
                    severity: Severity::Medium,
                    description: format!("Amount ${:.2} exceeds $1,000", context.amount),
                });
            }
        } else if context.amount > 1000.0 {
            factors.push(RiskFactor {
                name: "high_value_transaction".to_string(),
                severity: Severity::Medium,
                description: format!("Amount ${:.2} exceeds $1,000", context.amount),
            });
        }

        if context.is_foreign {
            factors.push(RiskFactor {
                name: "foreign_location".to_string(),
                severity: Severity::High,
                description: "Transaction originates outside the home country".to_string(),
            });
        }

        let events_24h = context.events_last_24h();
        if events_24h > 10 {
            factors.push(RiskFactor {
                name: "rapid_transaction_burst".to_string(),
                severity: Severity::Critical,
                description: format!("{} transactions in the last 24 hours", events_24h),
            });
        } else if events_24h > 5 {
            factors.push(RiskFactor {
                name: "high_transaction_frequency".to_string(),
                severity: Severity::High,
                description: format!("{} transactions in the last 24 hours", events_24h),
            });
        }

        if risk_score >= 0.9 {
            factors.push(RiskFactor {
                name: "model_confidence".to_string(),
                severity: Severity::Critical,
                description: format!("Ensemble fraud confidence {:.1}%", risk_score * 100.0),
            });
        } else if risk_score >= self.config.fraud_threshold {
            factors.push(RiskFactor {
                name: "model_confidence".to_string(),
                severity: Severity::High,
                description: format!("Ensemble fraud confidence {:.1}%", risk_score * 100.0),
            });
        } else if risk_score >= 0.5 {
            factors.push(RiskFactor {
                name: "model_confidence".to_string(),
                severity: Severity::Medium,
                description: format!("Ensemble fraud confidence {:.1}%", risk_score * 100.0),
            });
        }

        factors
    }

    /// Deterministic natural-language justification for the decision.
    pub fn generate_explanation(
        &self,
        tier: RiskTier,
        factors: &[RiskFactor],
        amount: f64,
        merchant: Option<&str>,
    ) -> String {
        let merchant = merchant.unwrap_or("this merchant");

        match tier {
            RiskTier::Safe => {
                if factors.is_empty() {
                    format!(
                        "This ${:.2} transaction at {} appears normal and matches typical spending patterns. No fraud indicators detected.",
                        amount, merchant
                    )
                } else {
                    format!(
                        "This ${:.2} transaction at {} has been approved. {} minor flag(s) were noted but overall risk is low.",
                        amount,
                        merchant,
                        factors.len()
                    )
                }
            }
            RiskTier::Suspicious => {
                let top: Vec<&str> = factors
                    .iter()
                    .filter(|f| f.severity >= Severity::High)
                    .take(3)
                    .map(|f| f.description.as_str())
                    .collect();
                if top.is_empty() {
                    format!(
                        "This ${:.2} transaction at {} shows unusual patterns and requires confirmation.",
                        amount, merchant
                    )
                } else {
                    format!(
                        "This ${:.2} transaction at {} requires verification because: {}. Please confirm this purchase.",
                        amount,
                        merchant,
                        top.join(" | ")
                    )
                }
            }
            RiskTier::Fraud => {
                let top: Vec<&str> = factors
                    .iter()
                    .filter(|f| f.severity >= Severity::High)
                    .take(3)
                    .map(|f| f.description.as_str())
                    .collect();
                if top.is_empty() {
                    format!(
                        "This ${:.2} transaction at {} has been blocked due to high fraud risk. Contact support if this was a legitimate purchase.",
                        amount, merchant
                    )
                } else {
                    format!(
                        "This ${:.2} transaction at {} has been blocked due to fraud indicators: {}. Contact support if this was a legitimate purchase.",
                        amount,
                        merchant,
                        top.join(" | ")
                    )
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::context::{AccountEvent, TransactionStatus};
    use chrono::{Duration, Utc};

    fn classifier() -> RiskClassifier {
        RiskClassifier::new(ClassifierConfig::default())
    }

    fn context(amount: f64) -> TransactionContext {
        TransactionContext {
            amount,
            is_foreign: false,
            transaction_hour: 12,
            merchant_name: None,
            account_history: Vec::new(),
        }
    }

    #[test]
    fn test_trusted_merchant_override_beats_high_score() {
        let mut ctx = context(50.0);
        ctx.merchant_name = Some("Coffee Co".to_string());
        ctx.account_history.push(AccountEvent {
            amount: 45.0,
            timestamp: Utc::now() - Duration::days(7),
            merchant_name: "Coffee Co".to_string(),
            status: TransactionStatus::Approved,
        });

        assert_eq!(classifier().classify(0.95, &ctx), RiskTier::Safe);
    }

    #[test]
    fn test_trusted_merchant_requires_approved_history() {
        let mut ctx = context(50.0);
        ctx.merchant_name = Some("Coffee Co".to_string());
        ctx.account_history.push(AccountEvent {
            amount: 45.0,
            timestamp: Utc::now() - Duration::days(7),
            merchant_name: "Coffee Co".to_string(),
            status: TransactionStatus::Declined,
        });

        assert_eq!(classifier().classify(0.95, &ctx), RiskTier::Fraud);
    }

    #[test]
    fn test_low_amount_low_score_is_safe() {
        assert_eq!(classifier().classify(0.25, &context(100.0)), RiskTier::Safe);
    }

    #[test]
    fn test_large_amount_overrides_low_score() {
        assert_eq!(classifier().classify(0.05, &context(3500.0)), RiskTier::Fraud);
    }

    #[test]
    fn test_high_score_is_fraud() {
        assert_eq!(classifier().classify(0.75, &context(200.0)), RiskTier::Fraud);
    }

    #[test]
    fn test_mid_amount_elevated_score_is_suspicious() {
        assert_eq!(
            classifier().classify(0.45, &context(800.0)),
            RiskTier::Suspicious
        );
    }

    #[test]
    fn test_plain_thresholds_as_fallback() {
        // Above the suspicious amount band, the score decides.
        assert_eq!(classifier().classify(0.2, &context(2500.0)), RiskTier::Safe);
        assert_eq!(
            classifier().classify(0.5, &context(2500.0)),
            RiskTier::Suspicious
        );
    }

    #[test]
    fn test_risk_factors_capture_signals() {
        let mut ctx = context(1500.0);
        ctx.is_foreign = true;
        ctx.transaction_hour = 2;

        let factors = classifier().risk_factors(0.8, &ctx);
        let names: Vec<&str> = factors.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"unusual_transaction_time"));
        assert!(names.contains(&"foreign_location"));
        assert!(names.contains(&"high_value_transaction"));
        assert!(names.contains(&"model_confidence"));
    }

    #[test]
    fn test_explanations_are_deterministic() {
        let c = classifier();
        let ctx = context(1500.0);
        let factors = c.risk_factors(0.8, &ctx);

        let a = c.generate_explanation(RiskTier::Fraud, &factors, 1500.0, Some("Web Store"));
        let b = c.generate_explanation(RiskTier::Fraud, &factors, 1500.0, Some("Web Store"));
        assert_eq!(a, b);
        assert!(a.contains("blocked"));
        assert!(a.contains("Web Store"));

        let safe = c.generate_explanation(RiskTier::Safe, &[], 4.5, None);
        assert!(safe.contains("appears normal"));
    }
}
