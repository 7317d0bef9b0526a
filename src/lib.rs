//! Peer-to-peer energy trading exchange core.
//!
//! Inventory reservation, the discover/select/init/confirm trade protocol,
//! escrow orchestration, and delivery verification, built the way the
//! teacher builds its trading core: typed tables under `db/`, pure logic
//! modules unit-tested in isolation, I/O-bearing orchestrators exercised by
//! integration tests, and one capability bundle (`runtime::AppState`)
//! wiring it all together for the binaries under `src/bin/`.

pub mod agent;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod escrow;
pub mod idempotency;
pub mod inventory;
pub mod kv;
pub mod lock;
pub mod logging;
pub mod matching;
pub mod order_lifecycle;
pub mod protocol;
pub mod runtime;
pub mod trust;
pub mod verifier;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use runtime::AppState;
