//! Delivery verification (spec §4.8): the DISCOM oracle boundary and the
//! background worker that reconciles completed delivery windows.

pub mod oracle;
pub mod worker;
