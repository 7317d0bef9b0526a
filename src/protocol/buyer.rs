//! Buyer-side (BAP) handlers (spec §4.5): discover / select / init /
//! confirm / status, each deduped through `Coordinator::dispatch` before
//! any side effect.

use crate::config::MatchingWeights;
use crate::db::offers::{self, OfferRow};
use crate::db::providers;
use crate::error::{Error, Result};
use crate::matching::{self, MatchCriteria, OfferCandidate};
use crate::protocol::envelope::{Action, ConfirmMessage, DiscoverMessage, InitMessage, SelectMessage, StatusMessage};
use crate::protocol::seller;
use crate::protocol::txn_cache::TxnStatus;
use crate::protocol::{Coordinator, DispatchOutcome};
use rust_decimal::Decimal;
use std::collections::HashMap;

fn unwrap_response(outcome: DispatchOutcome) -> serde_json::Value {
    match outcome {
        DispatchOutcome::Processed { response } | DispatchOutcome::Replayed { response } => response,
    }
}

/// spec §4.5 `discover`: stage a cached transaction-state row and return
/// the current catalog.
pub async fn discover(
    coordinator: &Coordinator,
    transaction_id: &str,
    message_id: &str,
    msg: &DiscoverMessage,
    raw: &serde_json::Value,
) -> Result<serde_json::Value> {
    let msg = msg.clone();
    let now = coordinator.clock.now();
    let outcome = coordinator
        .dispatch(Action::Discover, transaction_id, message_id, raw, || async move {
            let catalog = offers::list_active(&coordinator.pool, now).await?;
            let catalog_json = serde_json::to_value(&catalog).map_err(|e| Error::Internal(e.to_string()))?;

            coordinator
                .txn_cache
                .start_discovery(
                    transaction_id,
                    serde_json::json!({
                        "requested_quantity": msg.requested_quantity,
                        "window_start": msg.window_start,
                        "window_end": msg.window_end,
                    }),
                    now,
                )
                .await;
            coordinator.txn_cache.record_catalog(transaction_id, catalog_json.clone(), now).await;

            Ok(serde_json::json!({ "status": "ok", "transaction_id": transaction_id, "catalog": catalog_json }))
        })
        .await?;
    Ok(unwrap_response(outcome))
}

fn reference_price(catalog: &[OfferRow]) -> Decimal {
    if catalog.is_empty() {
        return Decimal::ONE;
    }
    let sum: Decimal = catalog.iter().map(|o| o.price_per_unit).sum();
    sum / Decimal::from(catalog.len() as i64)
}

/// spec §4.5 `select`: either the caller names an `offer_id`, or the
/// matching algorithm (§4.6) picks one under `auto_match`.
pub async fn select(
    coordinator: &Coordinator,
    transaction_id: &str,
    message_id: &str,
    msg: &SelectMessage,
    raw: &serde_json::Value,
    weights: &MatchingWeights,
) -> Result<serde_json::Value> {
    let msg = msg.clone();
    let weights = *weights;
    let now = coordinator.clock.now();
    let outcome = coordinator
        .dispatch(Action::Select, transaction_id, message_id, raw, || async move {
            let state = coordinator
                .txn_cache
                .get(transaction_id)
                .await
                .ok_or_else(|| Error::NotFound(format!("no active discovery for transaction {transaction_id}")))?;

            let chosen_offer_id = if let Some(offer_id) = msg.offer_id {
                offer_id
            } else if msg.auto_match == Some(true) {
                let catalog: Vec<OfferRow> = state
                    .catalog
                    .as_ref()
                    .and_then(|c| serde_json::from_value(c.clone()).ok())
                    .ok_or_else(|| Error::Internal("cached catalog is unreadable".to_string()))?;

                let criteria_raw = state
                    .discovery_criteria
                    .clone()
                    .ok_or_else(|| Error::Internal("discovery criteria missing from transaction state".to_string()))?;
                let window_start = criteria_raw["window_start"]
                    .as_str()
                    .and_then(|s| s.parse::<chrono::DateTime<chrono::Utc>>().ok())
                    .ok_or_else(|| Error::Internal("window_start missing".to_string()))?;
                let window_end = criteria_raw["window_end"]
                    .as_str()
                    .and_then(|s| s.parse::<chrono::DateTime<chrono::Utc>>().ok())
                    .ok_or_else(|| Error::Internal("window_end missing".to_string()))?;

                let mut trust_by_provider: HashMap<i64, f64> = HashMap::new();
                for o in &catalog {
                    if !trust_by_provider.contains_key(&o.provider_id) {
                        let trust = providers::get(&coordinator.pool, o.provider_id)
                            .await?
                            .map(|p| p.trust_score)
                            .unwrap_or(0.0);
                        trust_by_provider.insert(o.provider_id, trust);
                    }
                }

                let candidates: Vec<OfferCandidate> = catalog
                    .iter()
                    .map(|o| OfferCandidate {
                        offer_id: o.id.to_string(),
                        provider_id: o.provider_id.to_string(),
                        price_per_unit: o.price_per_unit,
                        max_qty: o.max_qty,
                        window_start: o.window_start,
                        window_end: o.window_end,
                    })
                    .collect();

                let criteria = MatchCriteria {
                    requested_quantity: msg.quantity,
                    window_start,
                    window_end,
                    reference_price: reference_price(&catalog),
                    horizon_secs: 24 * 3600,
                };

                let result = matching::rank_offers(
                    &candidates,
                    |provider_id| {
                        provider_id
                            .parse::<i64>()
                            .ok()
                            .and_then(|id| trust_by_provider.get(&id).copied())
                            .unwrap_or(0.0)
                    },
                    &criteria,
                    &weights,
                    now,
                );

                let best = result.best.ok_or_else(|| Error::NotFound("no matching offer found".to_string()))?;
                best.offer_id
                    .parse::<i64>()
                    .map_err(|_| Error::Internal("matched offer id was not numeric".to_string()))?
            } else {
                return Err(Error::Validation("select requires offer_id or auto_match".to_string()));
            };

            seller::on_select(&coordinator, chosen_offer_id).await?;
            coordinator
                .txn_cache
                .record_selection(transaction_id, chosen_offer_id, msg.quantity, now)
                .await;

            Ok(serde_json::json!({ "status": "ok", "offer_id": chosen_offer_id, "quantity": msg.quantity }))
        })
        .await?;
    Ok(unwrap_response(outcome))
}

/// spec §4.5 `init`: seller side creates the draft order and reserves
/// blocks; response includes `order_id` and `quote`.
pub async fn init(
    coordinator: &Coordinator,
    transaction_id: &str,
    message_id: &str,
    msg: &InitMessage,
    raw: &serde_json::Value,
) -> Result<serde_json::Value> {
    let msg = msg.clone();
    let now = coordinator.clock.now();
    let outcome = coordinator
        .dispatch(Action::Init, transaction_id, message_id, raw, || async move {
            let response = seller::on_init(&coordinator, msg.offer_id, msg.quantity, transaction_id, msg.buyer_id).await?;
            let order_id = response["order_id"].as_i64().ok_or_else(|| Error::Internal("on_init returned no order_id".to_string()))?;
            coordinator
                .txn_cache
                .record_order(transaction_id, order_id, TxnStatus::Confirming, now)
                .await;
            Ok(serde_json::json!({ "status": "ok", "order_id": order_id, "quote": response["quote"] }))
        })
        .await?;
    Ok(unwrap_response(outcome))
}

/// spec §4.5 `confirm`: seller side performs the escrow-and-sell atomic
/// path (§4.7). Idempotent under `message_id` via `Coordinator::dispatch`.
pub async fn confirm(
    coordinator: &Coordinator,
    transaction_id: &str,
    message_id: &str,
    msg: &ConfirmMessage,
    raw: &serde_json::Value,
) -> Result<serde_json::Value> {
    let order_id = msg.order_id;
    let now = coordinator.clock.now();
    let outcome = coordinator
        .dispatch(Action::Confirm, transaction_id, message_id, raw, || async move {
            let response = seller::on_confirm(&coordinator, order_id).await?;
            coordinator
                .txn_cache
                .record_order(transaction_id, order_id, TxnStatus::Active, now)
                .await;
            Ok(response)
        })
        .await?;
    Ok(unwrap_response(outcome))
}

/// spec §4.5 `status`: pull current order status from the seller side.
pub async fn status(
    coordinator: &Coordinator,
    transaction_id: &str,
    message_id: &str,
    msg: &StatusMessage,
    raw: &serde_json::Value,
) -> Result<serde_json::Value> {
    let order_id = msg.order_id;
    let outcome = coordinator
        .dispatch(Action::Status, transaction_id, message_id, raw, || async move {
            seller::on_status(&coordinator, order_id).await
        })
        .await?;
    Ok(unwrap_response(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_price_is_mean_of_catalog() {
        let row = |price: &str| OfferRow {
            id: 1,
            item_id: 1,
            provider_id: 1,
            price_per_unit: price.parse().unwrap(),
            currency: "INR".to_string(),
            max_qty: 10,
            window_start: chrono::Utc::now(),
            window_end: chrono::Utc::now(),
            pricing_model: "FIXED".to_string(),
            settlement_type: "PHYSICAL".to_string(),
        };
        let catalog = vec![row("4"), row("6")];
        assert_eq!(reference_price(&catalog), "5".parse().unwrap());
    }

    #[test]
    fn reference_price_defaults_to_one_for_empty_catalog() {
        assert_eq!(reference_price(&[]), Decimal::ONE);
    }
}
