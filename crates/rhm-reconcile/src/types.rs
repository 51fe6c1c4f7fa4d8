use std::collections::BTreeMap;

use rhm_schemas::{HouseId, HouseStatus, OrderId, OrderStatus};
use serde::{Deserialize, Serialize};

/// Minimal lease shape for reconciliation: only fields that can cause drift.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeaseSnapshot {
    pub order_id: OrderId,
    pub house_id: HouseId,
    pub status: OrderStatus,
}

impl LeaseSnapshot {
    pub fn new(order_id: OrderId, house_id: HouseId, status: OrderStatus) -> Self {
        Self {
            order_id,
            house_id,
            status,
        }
    }
}

/// Point-in-time view of house statuses and the leases that reference them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancySnapshot {
    /// house_id -> status.
    pub houses: BTreeMap<HouseId, HouseStatus>,

    /// Leases keyed by order_id. Callers may include every order or only the
    /// in-force ones; terminal and pending leases are ignored by the engine.
    pub leases: BTreeMap<OrderId, LeaseSnapshot>,
}

impl OccupancySnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_house(mut self, house_id: HouseId, status: HouseStatus) -> Self {
        self.houses.insert(house_id, status);
        self
    }

    pub fn with_lease(mut self, order_id: OrderId, house_id: HouseId, status: OrderStatus) -> Self {
        self.leases
            .insert(order_id, LeaseSnapshot::new(order_id, house_id, status));
        self
    }
}

/// What the engine tells the caller to do.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcileAction {
    Clean,
    /// Drift detected; see `diffs` for what can be repaired.
    Drift,
}

/// Why we flagged drift. Stable ordering enforced by engine.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReconcileReason {
    RentedWithoutLease,
    LeaseWithoutRentedHouse,
    MultipleLeasesOnHouse,
    LeaseOnUnknownHouse,
}

/// Evidence of a mismatch.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReconcileDiff {
    RentedWithoutLease {
        house_id: HouseId,
    },

    LeaseWithoutRentedHouse {
        order_id: OrderId,
        house_id: HouseId,
        order_status: OrderStatus,
        house_status: HouseStatus,
    },

    MultipleLeasesOnHouse {
        house_id: HouseId,
        order_ids: Vec<OrderId>,
    },

    LeaseOnUnknownHouse {
        order_id: OrderId,
        house_id: HouseId,
    },
}

impl ReconcileDiff {
    /// Only a RENTED house with nobody in it is safe to repair automatically.
    pub fn is_repairable(&self) -> bool {
        matches!(self, ReconcileDiff::RentedWithoutLease { .. })
    }
}

/// A corrective write the job may perform.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Repair {
    /// Set a RENTED house with no in-force lease back to APPROVED.
    ReleaseHouse { house_id: HouseId },
}

/// Full report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub action: ReconcileAction,
    pub reasons: Vec<ReconcileReason>,
    pub diffs: Vec<ReconcileDiff>,
}

impl ReconcileReport {
    pub fn clean() -> Self {
        Self {
            action: ReconcileAction::Clean,
            reasons: Vec::new(),
            diffs: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.action == ReconcileAction::Clean
    }

    /// Diffs that the job must leave for an operator.
    pub fn unresolved(&self) -> Vec<ReconcileDiff> {
        self.diffs
            .iter()
            .filter(|d| !d.is_repairable())
            .cloned()
            .collect()
    }
}
