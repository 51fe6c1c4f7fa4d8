//! rhm-reconcile
//!
//! Occupancy reconciliation between houses and leases.
//!
//! The invariant: a house is RENTED exactly when one in-force lease
//! (ACTIVE / TERMINATE_REQUESTED / TERMINATE_APPROVED) references it.
//!
//! - RENTED house with no in-force lease => repairable (release to APPROVED)
//! - In-force lease on a house that is not RENTED => report only
//! - Two in-force leases on one house => report only
//! - In-force lease on a house missing from the snapshot => report only
//!
//! Deterministic, pure logic. No IO. The repair itself is executed by
//! `rhm-lifecycle::jobs` under a row lock.

mod engine;
mod types;

pub use engine::{is_consistent, reconcile, repair_plan};
pub use types::*;
