//! Seller-side (BPP) handlers (spec §4.5): symmetric inbound counterparts
//! to `buyer.rs`. Since the protocol permits co-located buyer/seller
//! actors (spec §1, "may be co-located or remote"), these are invoked as
//! plain async calls rather than routed over a transport — the wire
//! envelope still gets built and logged, the hop is just in-process.

use crate::db::orders::{self, OrderStatus};
use crate::error::{Error, Result};
use crate::inventory::ClaimOutcome;
use crate::order_lifecycle::OrderStatus as LifecycleStatus;
use crate::protocol::Coordinator;

/// on `select`: validate the named offer is still inside its delivery
/// window (spec §4.5 "validate offer active").
pub async fn on_select(coordinator: &Coordinator, offer_id: i64) -> Result<()> {
    let offer = crate::db::offers::get(&coordinator.pool, offer_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("offer {offer_id}")))?;
    if offer.window_end <= coordinator.clock.now() {
        return Err(Error::Expired(format!("offer {offer_id} window has closed")));
    }
    Ok(())
}

/// on `init`: reserve blocks (spec §4.3) and craft a quote.
pub async fn on_init(
    coordinator: &Coordinator,
    offer_id: i64,
    quantity: i64,
    transaction_id: &str,
    buyer_id: Option<i64>,
) -> Result<serde_json::Value> {
    let offer = crate::db::offers::get(&coordinator.pool, offer_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("offer {offer_id}")))?;

    let ClaimOutcome { order_id, block_ids } = coordinator
        .inventory
        .claim_blocks(offer_id, quantity, transaction_id, buyer_id)
        .await?;

    let quote = serde_json::json!({
        "offer_id": offer_id,
        "requested_qty": quantity,
        "reserved_qty": block_ids.len() as i64,
        "price_per_unit": offer.price_per_unit,
        "currency": offer.currency,
    });

    Ok(serde_json::json!({ "order_id": order_id, "quote": quote }))
}

/// on `confirm`: the escrow-and-sell atomic path (spec §4.5/§4.7).
/// `DRAFT -> PENDING` on receipt, escrow placed, blocks marked SOLD,
/// `PENDING -> ACTIVE` on success.
pub async fn on_confirm(coordinator: &Coordinator, order_id: i64) -> Result<serde_json::Value> {
    let order = orders::get(&coordinator.pool, order_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("order {order_id}")))?;

    let buyer_id = order
        .buyer_id
        .ok_or_else(|| Error::Validation(format!("order {order_id} has no buyer")))?;

    coordinator.lifecycle.transition(order_id, LifecycleStatus::Pending).await?;

    let placement = coordinator
        .escrow
        .on_trade_placed(order_id, buyer_id, order.provider_id, order.total_price)
        .await?;

    orders::mark_escrowed(&coordinator.pool, order_id).await?;
    coordinator.inventory.mark_sold(order_id).await?;
    coordinator.lifecycle.transition(order_id, LifecycleStatus::Active).await?;

    Ok(serde_json::json!({
        "order_id": order_id,
        "status": OrderStatus::Active.as_str(),
        "payment_status": "ESCROWED",
        "escrow": {
            "status": placement.status,
            "principal": placement.principal,
            "fee": placement.fee,
            "total_blocked": placement.total_blocked,
            "block_id": placement.receipt.block_id,
        },
    }))
}

/// on `status`: current order snapshot.
pub async fn on_status(coordinator: &Coordinator, order_id: i64) -> Result<serde_json::Value> {
    let order = orders::get(&coordinator.pool, order_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("order {order_id}")))?;
    Ok(serde_json::json!({
        "order_id": order.id,
        "status": order.status,
        "payment_status": order.payment_status,
        "discom_verified": order.discom_verified,
        "updated_at": coordinator.clock.now(),
    }))
}
