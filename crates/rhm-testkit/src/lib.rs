//! Test support for the marketplace: an in-memory [`MarketStore`] and
//! fixtures for seeding houses and leases.
//!
//! `MemStore` runs the same planners as the Postgres store. One mutex guards
//! all state, so every call is serialized the way row locks serialize
//! conflicting calls in Postgres.
//!
//! [`MarketStore`]: rhm_lifecycle::MarketStore

mod fixtures;
mod mem_store;

pub use fixtures::*;
pub use mem_store::MemStore;
