use rhm_reconcile::*;
use rhm_schemas::{HouseStatus, OrderStatus};

/// A house left RENTED behind a TERMINATED lease (the legacy
/// "terminated house status" drift) is flagged and scheduled for release.
#[test]
fn scenario_house_left_rented_after_termination_is_released() {
    let snap = OccupancySnapshot::empty()
        .with_house(42, HouseStatus::Rented)
        .with_lease(1, 42, OrderStatus::Terminated);

    let r = reconcile(&snap);
    assert_eq!(r.action, ReconcileAction::Drift);
    assert_eq!(r.reasons, vec![ReconcileReason::RentedWithoutLease]);
    assert_eq!(
        repair_plan(&r),
        vec![Repair::ReleaseHouse { house_id: 42 }]
    );
    assert!(r.unresolved().is_empty());
}

#[test]
fn scenario_house_rented_with_no_order_at_all_is_released() {
    let snap = OccupancySnapshot::empty().with_house(7, HouseStatus::Rented);
    let r = reconcile(&snap);
    assert_eq!(repair_plan(&r), vec![Repair::ReleaseHouse { house_id: 7 }]);
}

#[test]
fn scenario_consistent_marketplace_needs_no_repair() {
    let snap = OccupancySnapshot::empty()
        .with_house(1, HouseStatus::Rented)
        .with_house(2, HouseStatus::Approved)
        .with_house(3, HouseStatus::Offline)
        .with_lease(10, 1, OrderStatus::Active)
        .with_lease(11, 2, OrderStatus::Pending)
        .with_lease(12, 3, OrderStatus::Completed);

    let r = reconcile(&snap);
    assert!(r.is_clean());
    assert!(repair_plan(&r).is_empty());
}
