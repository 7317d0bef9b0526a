//! Trust engine (spec §4.10) — pure functions, no I/O.
//!
//! Maps a delivery outcome to a trust-score delta and a new allowed-trade
//! limit. Every numeric constant is configuration (`AppConfig`), never
//! hard-coded, so callers can tune the success bonus / penalty scale /
//! failure penalty without touching this module.

use crate::config::AppConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustUpdate {
    pub new_score: f64,
    pub new_limit: f64,
    pub trust_impact: f64,
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Piecewise-linear default: 10% at score 0.3, 50% at 0.7, 100% at 1.0,
/// 0% below 0.3 (spec §4.10's default curve).
pub fn allowed_trade_limit(score: f64) -> f64 {
    let score = clamp01(score);
    if score < 0.3 {
        0.0
    } else if score <= 0.7 {
        // 0.3 -> 10, 0.7 -> 50
        10.0 + (score - 0.3) / (0.7 - 0.3) * (50.0 - 10.0)
    } else {
        // 0.7 -> 50, 1.0 -> 100
        50.0 + (score - 0.7) / (1.0 - 0.7) * (100.0 - 50.0)
    }
}

/// Compute the new trust score and allowed-trade limit given a delivery
/// outcome. `delivered`/`expected` are in the same unit (blocks or kWh).
pub fn update_trust(config: &AppConfig, prev_score: f64, delivered: f64, expected: f64) -> TrustUpdate {
    let ratio = if expected > 0.0 { delivered / expected } else { 0.0 };

    let impact = if ratio >= 1.0 {
        config.trust_success_bonus
    } else if ratio > 0.0 {
        -config.trust_penalty_scale * (1.0 - ratio)
    } else {
        -config.trust_failure_penalty
    };

    let new_score = clamp01(prev_score + impact);
    TrustUpdate {
        new_score,
        new_limit: allowed_trade_limit(new_score),
        trust_impact: impact,
    }
}

/// Small buyer-side trust bonus applied on delivery completion, capped at 1.0
/// (spec §4.8 step 8: "+1% FULL, +0.5% PARTIAL").
pub fn buyer_bonus(prev_score: f64, full_delivery: bool) -> TrustUpdate {
    let bonus = if full_delivery { 0.01 } else { 0.005 };
    let new_score = clamp01(prev_score + bonus);
    TrustUpdate {
        new_score,
        new_limit: allowed_trade_limit(new_score),
        trust_impact: bonus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> AppConfig {
        AppConfig::default()
    }

    #[test]
    fn full_delivery_gives_bonus() {
        let u = update_trust(&cfg(), 0.5, 10.0, 10.0);
        assert!((u.trust_impact - 0.02).abs() < 1e-9);
        assert!((u.new_score - 0.52).abs() < 1e-9);
    }

    #[test]
    fn partial_delivery_scales_penalty() {
        // scenario 3 from spec §8: ratio=0.5 -> impact = -0.10*(1-0.5) = -0.05
        let u = update_trust(&cfg(), 0.6, 5.0, 10.0);
        assert!((u.trust_impact - (-0.05)).abs() < 1e-9);
        assert!((u.new_score - 0.55).abs() < 1e-9);
    }

    #[test]
    fn zero_delivery_applies_failure_penalty() {
        let u = update_trust(&cfg(), 0.4, 0.0, 10.0);
        assert!((u.trust_impact - (-0.15)).abs() < 1e-9);
        assert!((u.new_score - 0.25).abs() < 1e-9);
    }

    #[test]
    fn score_clamped_to_unit_interval() {
        let u = update_trust(&cfg(), 0.99, 10.0, 10.0);
        assert!(u.new_score <= 1.0);

        let u2 = update_trust(&cfg(), 0.05, 0.0, 10.0);
        assert!(u2.new_score >= 0.0);
    }

    #[test]
    fn limit_is_monotone_in_score() {
        let mut prev = allowed_trade_limit(0.0);
        for i in 1..=100 {
            let score = i as f64 / 100.0;
            let limit = allowed_trade_limit(score);
            assert!(limit >= prev, "limit must be non-decreasing");
            prev = limit;
        }
    }

    #[test]
    fn limit_matches_named_points() {
        assert!((allowed_trade_limit(0.3) - 10.0).abs() < 1e-9);
        assert!((allowed_trade_limit(0.7) - 50.0).abs() < 1e-9);
        assert!((allowed_trade_limit(1.0) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn buyer_bonus_respects_cap() {
        let u = buyer_bonus(0.999, true);
        assert!(u.new_score <= 1.0);
    }
}
