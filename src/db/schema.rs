//! Idempotent schema bring-up: `CREATE TABLE IF NOT EXISTS` plus
//! `ALTER TABLE ... ADD COLUMN IF NOT EXISTS` for any column added after a
//! table's initial creation. Runs once at process start; safe against an
//! already-populated database (spec §6's "runtime schema-check against an
//! ALTER TABLE fallback").

use sqlx::PgPool;

const STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS providers_tb (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        trust_score DOUBLE PRECISION NOT NULL DEFAULT 0.5,
        total_orders BIGINT NOT NULL DEFAULT 0,
        successful_orders BIGINT NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS users_tb (
        id BIGSERIAL PRIMARY KEY,
        trust_score DOUBLE PRECISION NOT NULL DEFAULT 0.5,
        allowed_trade_limit DOUBLE PRECISION NOT NULL DEFAULT 10.0,
        baseline_trust DOUBLE PRECISION NOT NULL DEFAULT 0.5,
        balance NUMERIC NOT NULL DEFAULT 0,
        installed_capacity DOUBLE PRECISION NOT NULL DEFAULT 0,
        sanctioned_load DOUBLE PRECISION NOT NULL DEFAULT 0,
        provider_id BIGINT NULL REFERENCES providers_tb(id),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS items_tb (
        id BIGSERIAL PRIMARY KEY,
        provider_id BIGINT NOT NULL REFERENCES providers_tb(id),
        source_type TEXT NOT NULL,
        delivery_mode TEXT NOT NULL,
        available_qty BIGINT NOT NULL,
        production_windows JSONB NOT NULL DEFAULT '[]',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS offers_tb (
        id BIGSERIAL PRIMARY KEY,
        item_id BIGINT NOT NULL REFERENCES items_tb(id),
        provider_id BIGINT NOT NULL REFERENCES providers_tb(id),
        price_per_unit NUMERIC NOT NULL,
        currency TEXT NOT NULL DEFAULT 'INR',
        max_qty BIGINT NOT NULL,
        window_start TIMESTAMPTZ NOT NULL,
        window_end TIMESTAMPTZ NOT NULL,
        pricing_model TEXT NOT NULL DEFAULT 'FIXED',
        settlement_type TEXT NOT NULL DEFAULT 'PHYSICAL',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS blocks_tb (
        id BIGSERIAL PRIMARY KEY,
        offer_id BIGINT NOT NULL REFERENCES offers_tb(id),
        item_id BIGINT NOT NULL,
        provider_id BIGINT NOT NULL,
        status TEXT NOT NULL DEFAULT 'AVAILABLE',
        order_id BIGINT NULL,
        transaction_id TEXT NULL,
        price NUMERIC NOT NULL,
        version INT NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        reserved_at TIMESTAMPTZ NULL,
        sold_at TIMESTAMPTZ NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS blocks_offer_status_idx ON blocks_tb (offer_id, status, created_at, id)",
    r#"CREATE TABLE IF NOT EXISTS orders_tb (
        id BIGSERIAL PRIMARY KEY,
        transaction_id TEXT NOT NULL UNIQUE,
        provider_id BIGINT NULL,
        selected_offer_id BIGINT NULL,
        buyer_id BIGINT NULL,
        status TEXT NOT NULL DEFAULT 'DRAFT',
        total_qty BIGINT NOT NULL,
        total_price NUMERIC NOT NULL,
        currency TEXT NOT NULL DEFAULT 'INR',
        items_snapshot JSONB NOT NULL DEFAULT '{}',
        quote_snapshot JSONB NOT NULL DEFAULT '{}',
        version INT NOT NULL DEFAULT 0,
        payment_status TEXT NOT NULL DEFAULT 'PENDING',
        escrowed_at TIMESTAMPTZ NULL,
        released_at TIMESTAMPTZ NULL,
        discom_verified BOOLEAN NOT NULL DEFAULT FALSE,
        cancel_at TIMESTAMPTZ NULL,
        cancel_by TEXT NULL,
        cancel_reason TEXT NULL,
        cancel_penalty NUMERIC NULL,
        cancel_refund NUMERIC NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS events_tb (
        id BIGSERIAL PRIMARY KEY,
        transaction_id TEXT NOT NULL,
        message_id TEXT NOT NULL,
        action TEXT NOT NULL,
        direction TEXT NOT NULL,
        raw_json JSONB NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (message_id, direction)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS escrow_tb (
        trade_id BIGINT PRIMARY KEY,
        buyer_id BIGINT NOT NULL,
        seller_id BIGINT NULL,
        principal NUMERIC NOT NULL,
        fee NUMERIC NOT NULL,
        total_blocked NUMERIC NOT NULL,
        status TEXT NOT NULL DEFAULT 'INITIATED',
        expires_at TIMESTAMPTZ NOT NULL,
        funded_receipt_id TEXT NULL,
        payout_receipt_id TEXT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    "CREATE INDEX IF NOT EXISTS escrow_status_expiry_idx ON escrow_tb (status, expires_at)",
    r#"CREATE TABLE IF NOT EXISTS transfers_tb (
        id BIGSERIAL PRIMARY KEY,
        transfer_id TEXT NOT NULL UNIQUE,
        trade_id BIGINT NOT NULL,
        kind TEXT NOT NULL,
        amount NUMERIC NOT NULL,
        status TEXT NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (trade_id, kind)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS feedback_tb (
        order_id BIGINT PRIMARY KEY,
        seller_id BIGINT NOT NULL,
        delivered_qty NUMERIC NOT NULL,
        expected_qty NUMERIC NOT NULL,
        ratio DOUBLE PRECISION NOT NULL,
        status TEXT NOT NULL,
        trust_impact DOUBLE PRECISION NOT NULL,
        verified_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS trust_history_tb (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL,
        prev_score DOUBLE PRECISION NOT NULL,
        new_score DOUBLE PRECISION NOT NULL,
        prev_limit DOUBLE PRECISION NOT NULL,
        new_limit DOUBLE PRECISION NOT NULL,
        reason TEXT NOT NULL,
        order_id BIGINT NULL,
        metadata JSONB NOT NULL DEFAULT '{}',
        timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS payments_tb (
        id BIGSERIAL PRIMARY KEY,
        order_id BIGINT NOT NULL,
        buyer_id BIGINT NULL,
        seller_id BIGINT NULL,
        type TEXT NOT NULL,
        total_amount NUMERIC NOT NULL,
        buyer_refund NUMERIC NULL,
        seller_amount NUMERIC NULL,
        platform_fee NUMERIC NULL,
        to_grid_amount NUMERIC NULL,
        status TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS agents_tb (
        id BIGSERIAL PRIMARY KEY,
        owner_id BIGINT NOT NULL,
        agent_type TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active',
        execution_mode TEXT NOT NULL DEFAULT 'approval',
        config JSONB NOT NULL DEFAULT '{}',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS proposals_tb (
        id BIGSERIAL PRIMARY KEY,
        agent_id BIGINT NOT NULL REFERENCES agents_tb(id),
        action TEXT NOT NULL,
        offer_id BIGINT NULL,
        qty BIGINT NOT NULL,
        price_per_unit NUMERIC NOT NULL,
        total_price NUMERIC NOT NULL,
        reasoning TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'pending',
        decided_at TIMESTAMPTZ NULL,
        executed_at TIMESTAMPTZ NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    // Columns added after initial release; ALTER TABLE fallback keeps an
    // existing database in sync without a migration tool.
    "ALTER TABLE orders_tb ADD COLUMN IF NOT EXISTS cancel_penalty NUMERIC NULL",
    "ALTER TABLE orders_tb ADD COLUMN IF NOT EXISTS cancel_refund NUMERIC NULL",
    "ALTER TABLE escrow_tb ADD COLUMN IF NOT EXISTS payout_receipt_id TEXT NULL",
    "ALTER TABLE payments_tb ADD COLUMN IF NOT EXISTS to_grid_amount NUMERIC NULL",
];

pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!("schema check complete");
    Ok(())
}
