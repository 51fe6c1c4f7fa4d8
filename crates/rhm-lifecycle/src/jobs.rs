//! Maintenance sweeps: occupancy reconciliation and lease expiry.
//!
//! Both sweeps are safe to run at any time and in parallel with live
//! traffic. Each repair goes back through the store under row locks, so a
//! sweep never overwrites a transition that raced it.

use chrono::{DateTime, Utc};
use rhm_reconcile::{reconcile, repair_plan, ReconcileDiff, ReconcileReport, Repair};
use rhm_schemas::{Actor, OrderId, OrderStatus};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::MarketError;
use crate::lease::LeaseEvent;
use crate::policy::LeasePolicy;
use crate::store::{MarketStore, RequestMeta};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub dry_run: bool,
    pub scanned_houses: usize,
    pub scanned_leases: usize,
    /// Houses released back to APPROVED.
    pub fixed: usize,
    /// Repairs whose re-check under lock no longer applied.
    pub skipped: usize,
    pub failed: usize,
    pub report: ReconcileReport,
    /// Drift that is reported but never repaired automatically.
    pub unresolved: Vec<ReconcileDiff>,
}

/// Detect house/lease drift and release houses left RENTED with no lease.
///
/// With `dry_run` the report is computed and nothing is written.
pub async fn run_reconciliation(
    store: &dyn MarketStore,
    dry_run: bool,
    now: DateTime<Utc>,
) -> Result<ReconcileOutcome, MarketError> {
    let snapshot = store.occupancy_snapshot().await?;
    let report = reconcile(&snapshot);

    let mut out = ReconcileOutcome {
        dry_run,
        scanned_houses: snapshot.houses.len(),
        scanned_leases: snapshot.leases.len(),
        fixed: 0,
        skipped: 0,
        failed: 0,
        unresolved: report.unresolved(),
        report: report.clone(),
    };

    for diff in &out.unresolved {
        error!(?diff, "reconcile: unresolved drift");
    }

    if dry_run {
        info!(
            houses = out.scanned_houses,
            leases = out.scanned_leases,
            drift = report.diffs.len(),
            "reconcile: dry run"
        );
        return Ok(out);
    }

    let meta = RequestMeta::at(now);
    for repair in repair_plan(&report) {
        match repair {
            Repair::ReleaseHouse { house_id } => {
                match store.release_house_if_vacant(house_id, &meta).await {
                    Ok(true) => {
                        out.fixed += 1;
                        info!(house_id, "reconcile: released house RENTED -> APPROVED");
                    }
                    Ok(false) => {
                        out.skipped += 1;
                        info!(house_id, "reconcile: house changed under lock, skipped");
                    }
                    Err(e) => {
                        out.failed += 1;
                        error!(house_id, error = %e, "reconcile: release failed");
                    }
                }
            }
        }
    }

    info!(
        houses = out.scanned_houses,
        leases = out.scanned_leases,
        fixed = out.fixed,
        skipped = out.skipped,
        failed = out.failed,
        unresolved = out.unresolved.len(),
        "reconcile: done"
    );
    Ok(out)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepOutcome {
    pub due: usize,
    /// ACTIVE leases moved to COMPLETED.
    pub completed: Vec<OrderId>,
    /// Approved terminations confirmed on the tenant's behalf.
    pub confirmed: Vec<OrderId>,
    pub failed: Vec<OrderId>,
}

/// Close every lease that has run out as of `now`'s date.
///
/// ACTIVE leases past `end_date` are completed. Approved terminations whose
/// requested date (or `end_date`) has passed are confirmed, since the tenant
/// never came back to do it. Per-order failures are logged and counted;
/// they never abort the sweep.
pub async fn complete_due_leases(
    store: &dyn MarketStore,
    policy: &LeasePolicy,
    now: DateTime<Utc>,
) -> Result<SweepOutcome, MarketError> {
    let today = now.date_naive();
    let due = store.leases_due_for_completion(today).await?;
    let mut out = SweepOutcome {
        due: due.len(),
        ..SweepOutcome::default()
    };

    let actor = Actor::system();
    let meta = RequestMeta::at(now);
    for order in due {
        let order_id = order.id;
        let (event, done) = match order.status {
            OrderStatus::TerminateApproved => (LeaseEvent::ConfirmTermination, &mut out.confirmed),
            _ => (LeaseEvent::Complete, &mut out.completed),
        };
        match store
            .apply_lease_event(order_id, &actor, &event, policy, &meta)
            .await
        {
            Ok(t) => {
                info!(
                    order_id,
                    house_id = t.order.house_id,
                    status = t.order.status.as_str(),
                    "lease expiry: closed"
                );
                done.push(order_id);
            }
            Err(e) if e.is_invalid_state() => {
                // Moved on (e.g. a termination request) since the scan.
                warn!(order_id, error = %e, "lease expiry: skipped");
                out.failed.push(order_id);
            }
            Err(e) => {
                error!(order_id, error = %e, "lease expiry: failed");
                out.failed.push(order_id);
            }
        }
    }

    info!(
        %today,
        due = out.due,
        completed = out.completed.len(),
        confirmed = out.confirmed.len(),
        failed = out.failed.len(),
        "lease expiry: sweep done"
    );
    Ok(out)
}
