//! Marketplace lifecycle: the rules that move orders, houses and viewing
//! appointments between statuses.
//!
//! The planners (`plan_lease`, `plan_house`, `plan_appointment`) are pure and
//! decide every transition. A [`MarketStore`] executes a plan atomically under
//! row locks. [`Market`] is the caller-facing surface used by the daemon and
//! the CLI, and [`jobs`] holds the maintenance sweeps.

pub mod appointment;
mod error;
pub mod house;
pub mod jobs;
pub mod lease;
mod policy;
mod service;
mod store;

pub use appointment::{plan_appointment, validate_appointment_request, AppointmentEvent, AppointmentPlan};
pub use error::{MarketError, TransitionError};
pub use house::{plan_house, validate_new_house, HouseAction, HousePlan};
pub use jobs::{ReconcileOutcome, SweepOutcome};
pub use lease::{
    check_replay, early_termination_penalty, lease_months, plan_booking, plan_lease,
    released_house_status, LeaseContext, LeaseEvent, LeasePlan,
};
pub use policy::{LeasePolicy, PenaltyPolicy};
pub use service::Market;
pub use store::{
    AppointmentTransition, HouseTransition, LeaseTransition, MarketResult, MarketStore,
    RequestMeta,
};
