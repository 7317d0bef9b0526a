//! Matching algorithm (spec §4.6) — pure, no I/O.
//!
//! Filters offers by window overlap and quantity fit, scores the survivors
//! on price / trust / time-fit / delivery-latency, and returns the ranked
//! list plus a per-component breakdown for the winner, the way `trust.rs`
//! keeps its math separate from anything that touches the database.

use crate::config::MatchingWeights;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct OfferCandidate {
    pub offer_id: String,
    pub provider_id: String,
    pub price_per_unit: Decimal,
    pub max_qty: i64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MatchCriteria {
    pub requested_quantity: i64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Reference price used to normalize `price_score`; typically the
    /// median or max price among candidate offers.
    pub reference_price: Decimal,
    /// Horizon (seconds) used to normalize `delivery_latency`.
    pub horizon_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub price_score: f64,
    pub trust_score: f64,
    pub time_fit: f64,
    pub delivery_latency: f64,
    pub final_score: f64,
}

#[derive(Debug, Clone)]
pub struct RankedOffer {
    pub offer_id: String,
    pub provider_id: String,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone)]
pub struct MatchResult {
    pub best: Option<RankedOffer>,
    pub ranked: Vec<RankedOffer>,
}

fn overlap_secs(a_start: DateTime<Utc>, a_end: DateTime<Utc>, b_start: DateTime<Utc>, b_end: DateTime<Utc>) -> i64 {
    let start = a_start.max(b_start);
    let end = a_end.min(b_end);
    (end - start).num_seconds().max(0)
}

fn overlaps(a_start: DateTime<Utc>, a_end: DateTime<Utc>, b_start: DateTime<Utc>, b_end: DateTime<Utc>) -> bool {
    a_start < b_end && b_start < a_end
}

fn score_offer(
    offer: &OfferCandidate,
    provider_trust: f64,
    criteria: &MatchCriteria,
    weights: &MatchingWeights,
    now: DateTime<Utc>,
) -> ScoreBreakdown {
    let price_f = offer.price_per_unit.to_f64().unwrap_or(0.0);
    let reference_f = criteria.reference_price.to_f64().unwrap_or(1.0).max(f64::EPSILON);
    let price_score = (1.0 - (price_f / reference_f).min(1.0)).clamp(0.0, 1.0);

    let trust_score = provider_trust.clamp(0.0, 1.0);

    let requested_secs = (criteria.window_end - criteria.window_start).num_seconds().max(1) as f64;
    let overlap = overlap_secs(
        offer.window_start,
        offer.window_end,
        criteria.window_start,
        criteria.window_end,
    ) as f64;
    let time_fit = (overlap / requested_secs).clamp(0.0, 1.0);

    let horizon = criteria.horizon_secs.max(1) as f64;
    let until_start = (offer.window_start - now).num_seconds() as f64;
    let delivery_latency = (1.0 - (until_start / horizon).clamp(0.0, 1.0)).clamp(0.0, 1.0);

    let final_score = weights.price * price_score
        + weights.trust * trust_score
        + weights.time_fit * time_fit
        + weights.delivery_latency * delivery_latency;

    ScoreBreakdown {
        price_score,
        trust_score,
        time_fit,
        delivery_latency,
        final_score,
    }
}

/// Rank `offers` against `criteria`. `provider_trust` maps provider_id to
/// trust score; missing entries are treated as trust 0. Relaxes the
/// quantity filter to partial-fit offers if nothing satisfies the full
/// requested quantity (spec §4.6's filter step).
pub fn rank_offers(
    offers: &[OfferCandidate],
    provider_trust: impl Fn(&str) -> f64,
    criteria: &MatchCriteria,
    weights: &MatchingWeights,
    now: DateTime<Utc>,
) -> MatchResult {
    let windowed: Vec<&OfferCandidate> = offers
        .iter()
        .filter(|o| overlaps(o.window_start, o.window_end, criteria.window_start, criteria.window_end))
        .collect();

    let full_fit: Vec<&OfferCandidate> = windowed
        .iter()
        .copied()
        .filter(|o| o.max_qty >= criteria.requested_quantity)
        .collect();

    let survivors: Vec<&OfferCandidate> = if !full_fit.is_empty() { full_fit } else { windowed };

    let mut ranked: Vec<RankedOffer> = survivors
        .into_iter()
        .map(|offer| {
            let trust = provider_trust(&offer.provider_id);
            let breakdown = score_offer(offer, trust, criteria, weights, now);
            RankedOffer {
                offer_id: offer.offer_id.clone(),
                provider_id: offer.provider_id.clone(),
                breakdown,
            }
        })
        .collect();

    // Tie-break: higher trust, then lower price (via price_score desc since
    // price_score is monotone-decreasing in price), then earlier delivery
    // start (approximated by delivery_latency desc, since latency score is
    // monotone in start time within a horizon), then lexicographic offer id.
    ranked.sort_by(|a, b| {
        b.breakdown
            .final_score
            .partial_cmp(&a.breakdown.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.breakdown
                    .trust_score
                    .partial_cmp(&a.breakdown.trust_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| {
                b.breakdown
                    .price_score
                    .partial_cmp(&a.breakdown.price_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| {
                b.breakdown
                    .delivery_latency
                    .partial_cmp(&a.breakdown.delivery_latency)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.offer_id.cmp(&b.offer_id))
    });

    let best = ranked.first().cloned();
    MatchResult { best, ranked }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn offer(id: &str, provider: &str, price: &str, qty: i64, start_offset_h: i64, len_h: i64, now: DateTime<Utc>) -> OfferCandidate {
        OfferCandidate {
            offer_id: id.to_string(),
            provider_id: provider.to_string(),
            price_per_unit: price.parse().unwrap(),
            max_qty: qty,
            window_start: now + ChronoDuration::hours(start_offset_h),
            window_end: now + ChronoDuration::hours(start_offset_h + len_h),
        }
    }

    fn criteria(now: DateTime<Utc>) -> MatchCriteria {
        MatchCriteria {
            requested_quantity: 5,
            window_start: now + ChronoDuration::hours(1),
            window_end: now + ChronoDuration::hours(3),
            reference_price: "10".parse().unwrap(),
            horizon_secs: 24 * 3600,
        }
    }

    #[test]
    fn higher_trust_and_lower_price_wins() {
        let now = Utc::now();
        let offers = vec![
            offer("o1", "p1", "8", 10, 1, 2, now),
            offer("o2", "p2", "5", 10, 1, 2, now),
        ];
        let trust = |id: &str| if id == "p2" { 0.9 } else { 0.2 };
        let result = rank_offers(&offers, trust, &criteria(now), &MatchingWeights::default(), now);
        assert_eq!(result.best.unwrap().offer_id, "o2");
    }

    #[test]
    fn non_overlapping_offers_are_filtered_out() {
        let now = Utc::now();
        let offers = vec![offer("o1", "p1", "5", 10, 100, 2, now)];
        let result = rank_offers(&offers, |_| 0.5, &criteria(now), &MatchingWeights::default(), now);
        assert!(result.ranked.is_empty());
    }

    #[test]
    fn relaxes_to_partial_fit_when_no_full_fit_offer() {
        let now = Utc::now();
        let offers = vec![offer("o1", "p1", "5", 2, 1, 2, now)]; // max_qty < requested 5
        let result = rank_offers(&offers, |_| 0.5, &criteria(now), &MatchingWeights::default(), now);
        assert_eq!(result.ranked.len(), 1);
    }

    #[test]
    fn tie_break_is_lexicographic_on_id() {
        let now = Utc::now();
        let offers = vec![
            offer("b", "p1", "5", 10, 1, 2, now),
            offer("a", "p1", "5", 10, 1, 2, now),
        ];
        let result = rank_offers(&offers, |_| 0.5, &criteria(now), &MatchingWeights::default(), now);
        assert_eq!(result.best.unwrap().offer_id, "a");
    }
}
