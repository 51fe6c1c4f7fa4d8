use std::collections::BTreeMap;

use rhm_schemas::{HouseId, HouseStatus, OrderId};

use crate::{OccupancySnapshot, ReconcileAction, ReconcileDiff, ReconcileReason, ReconcileReport, Repair};

fn push_reason_once(reasons: &mut Vec<ReconcileReason>, r: ReconcileReason) {
    if !reasons.contains(&r) {
        reasons.push(r);
    }
}

/// Deterministic occupancy reconciliation:
/// - RENTED house, no in-force lease => `RentedWithoutLease`
/// - in-force lease, house not RENTED => `LeaseWithoutRentedHouse`
/// - more than one in-force lease per house => `MultipleLeasesOnHouse`
/// - in-force lease, house absent => `LeaseOnUnknownHouse`
pub fn reconcile(snapshot: &OccupancySnapshot) -> ReconcileReport {
    let mut reasons: Vec<ReconcileReason> = Vec::new();
    let mut diffs: Vec<ReconcileDiff> = Vec::new();

    // Group in-force leases by house (BTreeMap keeps the walk deterministic).
    let mut occupants: BTreeMap<HouseId, Vec<OrderId>> = BTreeMap::new();
    for lease in snapshot.leases.values() {
        if lease.status.is_in_force() {
            occupants
                .entry(lease.house_id)
                .or_default()
                .push(lease.order_id);
        }
    }

    // 1) Houses marked RENTED with nobody in them.
    for (house_id, status) in &snapshot.houses {
        if *status == HouseStatus::Rented && !occupants.contains_key(house_id) {
            diffs.push(ReconcileDiff::RentedWithoutLease {
                house_id: *house_id,
            });
            push_reason_once(&mut reasons, ReconcileReason::RentedWithoutLease);
        }
    }

    // 2) Leases whose house does not agree.
    for (house_id, order_ids) in &occupants {
        let Some(house_status) = snapshot.houses.get(house_id) else {
            for order_id in order_ids {
                diffs.push(ReconcileDiff::LeaseOnUnknownHouse {
                    order_id: *order_id,
                    house_id: *house_id,
                });
            }
            push_reason_once(&mut reasons, ReconcileReason::LeaseOnUnknownHouse);
            continue;
        };

        if *house_status != HouseStatus::Rented {
            for order_id in order_ids {
                let order_status = snapshot.leases[order_id].status;
                diffs.push(ReconcileDiff::LeaseWithoutRentedHouse {
                    order_id: *order_id,
                    house_id: *house_id,
                    order_status,
                    house_status: *house_status,
                });
            }
            push_reason_once(&mut reasons, ReconcileReason::LeaseWithoutRentedHouse);
        }

        if order_ids.len() > 1 {
            let mut ids = order_ids.clone();
            ids.sort();
            diffs.push(ReconcileDiff::MultipleLeasesOnHouse {
                house_id: *house_id,
                order_ids: ids,
            });
            push_reason_once(&mut reasons, ReconcileReason::MultipleLeasesOnHouse);
        }
    }

    // Stable ordering for reasons + diffs (deterministic output).
    reasons.sort();
    diffs.sort();

    if reasons.is_empty() {
        ReconcileReport::clean()
    } else {
        ReconcileReport {
            action: ReconcileAction::Drift,
            reasons,
            diffs,
        }
    }
}

/// Repairs the job may attempt for a report, in house-id order.
pub fn repair_plan(report: &ReconcileReport) -> Vec<Repair> {
    let mut out: Vec<Repair> = report
        .diffs
        .iter()
        .filter_map(|d| match d {
            ReconcileDiff::RentedWithoutLease { house_id } => Some(Repair::ReleaseHouse {
                house_id: *house_id,
            }),
            _ => None,
        })
        .collect();
    out.sort();
    out.dedup();
    out
}

pub fn is_consistent(snapshot: &OccupancySnapshot) -> bool {
    reconcile(snapshot).is_clean()
}

#[cfg(test)]
mod tests {
    use rhm_schemas::OrderStatus;

    use super::*;

    #[test]
    fn empty_snapshot_is_clean() {
        assert!(is_consistent(&OccupancySnapshot::empty()));
    }

    #[test]
    fn pending_and_terminal_leases_do_not_occupy() {
        let snap = OccupancySnapshot::empty()
            .with_house(1, HouseStatus::Approved)
            .with_lease(10, 1, OrderStatus::Pending)
            .with_lease(11, 1, OrderStatus::Terminated)
            .with_lease(12, 1, OrderStatus::Completed)
            .with_lease(13, 1, OrderStatus::Canceled);
        assert!(is_consistent(&snap));
    }

    #[test]
    fn terminate_substates_keep_the_house_occupied() {
        let snap = OccupancySnapshot::empty()
            .with_house(1, HouseStatus::Rented)
            .with_house(2, HouseStatus::Rented)
            .with_lease(10, 1, OrderStatus::TerminateRequested)
            .with_lease(11, 2, OrderStatus::TerminateApproved);
        assert!(is_consistent(&snap));
    }

    #[test]
    fn diffs_and_reasons_are_sorted() {
        let snap = OccupancySnapshot::empty()
            .with_house(9, HouseStatus::Rented)
            .with_house(3, HouseStatus::Rented)
            .with_house(5, HouseStatus::Approved)
            .with_lease(50, 5, OrderStatus::Active);
        let r = reconcile(&snap);
        assert_eq!(r.action, ReconcileAction::Drift);
        assert_eq!(
            r.reasons,
            vec![
                ReconcileReason::RentedWithoutLease,
                ReconcileReason::LeaseWithoutRentedHouse
            ]
        );
        assert_eq!(
            r.diffs[0],
            ReconcileDiff::RentedWithoutLease { house_id: 3 }
        );
        assert_eq!(
            r.diffs[1],
            ReconcileDiff::RentedWithoutLease { house_id: 9 }
        );
        assert_eq!(
            repair_plan(&r),
            vec![
                Repair::ReleaseHouse { house_id: 3 },
                Repair::ReleaseHouse { house_id: 9 }
            ]
        );
        assert_eq!(r.unresolved().len(), 1);
    }
}
