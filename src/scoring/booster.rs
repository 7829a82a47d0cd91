//! Contextual risk boosting
//!
//! Amplifies the ensemble score when transaction-level fraud signals are
//! present. Each tiered boost scales with the remaining headroom
//! `(1 - base_score)`, so an already-decided score cannot be pushed past
//! the cap, and every applied boost is accounted for by name in the
//! returned decision.

use crate::config::{BoostConfig, BoostTier};
use crate::types::context::TransactionContext;
use crate::types::result::BoostDecision;
use std::collections::HashMap;
use tracing::debug;

/// Applies contextual boosts on top of the ensemble score.
pub struct RiskBooster {
    config: BoostConfig,
}

impl RiskBooster {
    pub fn new(config: BoostConfig) -> Self {
        Self { config }
    }

    /// Boost the base score using the transaction context.
    pub fn boost(&self, base_score: f64, context: &TransactionContext) -> BoostDecision {
        let base_score = base_score.clamp(0.0, 1.0);
        let headroom = 1.0 - base_score;

        let mut factors: HashMap<String, f64> = HashMap::new();
        let mut reasons: Vec<String> = Vec::new();
        let mut total_boost = 0.0;

        // Foreign-origin boost, tiered by amount.
        if context.is_foreign {
            if let Some(tier) = pick_tier(&self.config.foreign_tiers, context.amount) {
                let boost = tier.boost * headroom;
                factors.insert("foreign_transaction".to_string(), boost);
                total_boost += boost;
                reasons.push(format!("Foreign transaction ${:.2}", context.amount));
            }
        }

        // Velocity boost, tiered by transactions/hour over the last 24h.
        let velocity = context.velocity_per_hour();
        if let Some(tier) = pick_tier(&self.config.velocity_tiers, velocity) {
            let boost = tier.boost * headroom;
            factors.insert("velocity".to_string(), boost);
            total_boost += boost;
            reasons.push(format!("High velocity ({:.1} txns/hour)", velocity));
        }

        // Amount spike relative to the account's historical average.
        let ratio = context.amount_ratio();
        if context.average_amount().is_some() {
            if let Some(tier) = pick_tier(&self.config.spike_tiers, ratio) {
                let boost = tier.boost * headroom;
                factors.insert("amount_spike".to_string(), boost);
                total_boost += boost;
                reasons.push(format!("Amount spike ({:.0}x account average)", ratio));
            }
        }

        // Large transaction during the off-hours window.
        if context.transaction_hour >= self.config.unusual_hour_start
            && context.transaction_hour <= self.config.unusual_hour_end
            && context.amount > self.config.unusual_hour_min_amount
        {
            let boost = self.config.unusual_hour_boost * headroom;
            factors.insert("unusual_hour".to_string(), boost);
            total_boost += boost;
            reasons.push(format!(
                "Large transaction at {:02}:00",
                context.transaction_hour
            ));
        }

        // Account novelty: absolute boosts, scaled down for small safe
        // transactions so a legitimate small first purchase is not
        // over-flagged.
        let na = &self.config.new_account;
        let history_len = context.account_history.len();
        if history_len == 0 {
            let boost = if let Some(tier) = pick_tier(&na.first_purchase_tiers, context.amount) {
                reasons.push(format!(
                    "New account making ${:.2} first purchase",
                    context.amount
                ));
                tier.boost
            } else if base_score > na.elevated_base_score {
                reasons.push("New account with elevated risk indicators".to_string());
                na.first_purchase_elevated_boost
            } else {
                reasons.push("New account".to_string());
                na.first_purchase_floor_boost
            };
            factors.insert("new_account".to_string(), boost);
            total_boost += boost;
        } else if history_len <= na.max_events {
            let boost = if let Some(tier) = pick_tier(&na.early_account_tiers, context.amount) {
                tier.boost
            } else if base_score > na.elevated_base_score {
                na.early_account_elevated_boost
            } else {
                na.early_account_floor_boost
            };
            factors.insert("new_account".to_string(), boost);
            total_boost += boost;
            reasons.push(format!("Very new account ({} transactions)", history_len));
        }

        let final_score = (base_score + total_boost).min(self.config.score_cap);

        if total_boost > 0.0 {
            debug!(
                base_score,
                final_score,
                total_boost,
                factors = ?factors.keys().collect::<Vec<_>>(),
                "Risk boosting applied"
            );
        }

        BoostDecision {
            factors,
            total_boost,
            reason: if reasons.is_empty() {
                "None".to_string()
            } else {
                reasons.join("; ")
            },
            base_score,
            final_score,
        }
    }
}

/// First tier whose threshold the value strictly exceeds; tiers are
/// ordered by descending threshold.
fn pick_tier(tiers: &[BoostTier], value: f64) -> Option<&BoostTier> {
    tiers.iter().find(|t| value > t.threshold)
}
