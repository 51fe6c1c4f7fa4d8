//! Shared runtime state for rhm-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The marketplace
//! service does the work; this module owns the event bus, the status
//! snapshot and the background sweeps.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rhm_lifecycle::{Market, MarketResult, ReconcileOutcome, SweepOutcome};
use rhm_schemas::{Actor, Notification};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

// ---------------------------------------------------------------------------
// BusMsg
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Status(StatusSnapshot),
    /// A persisted notification, pushed to live clients.
    Notice(Notification),
    LogLine { level: String, msg: String },
}

impl BusMsg {
    pub fn event_name(&self) -> &'static str {
        match self {
            BusMsg::Heartbeat { .. } => "heartbeat",
            BusMsg::Status(_) => "status",
            BusMsg::Notice(_) => "notice",
            BusMsg::LogLine { .. } => "log",
        }
    }
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// StatusSnapshot
// ---------------------------------------------------------------------------

/// Point-in-time daemon state, returned by GET /v1/status and carried inside
/// SSE `status` events.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    pub backend: String,
    pub last_reconcile_at: Option<DateTime<Utc>>,
    /// `None` until the first pass.
    pub reconcile_clean: Option<bool>,
    /// Drift the last pass could not repair.
    pub reconcile_unresolved: usize,
    pub last_expiry_sweep_at: Option<DateTime<Utc>>,
    pub leases_completed_total: u64,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub market: Market,
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub status: Arc<RwLock<StatusSnapshot>>,
}

impl AppState {
    pub fn new(market: Market, bus_capacity: usize) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(bus_capacity.max(1));
        let initial_status = StatusSnapshot {
            daemon_uptime_secs: uptime_secs(),
            backend: market.backend_name().to_string(),
            ..StatusSnapshot::default()
        };
        Self {
            market,
            bus,
            build: BuildInfo {
                service: "rhm-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            status: Arc::new(RwLock::new(initial_status)),
        }
    }

    /// Push freshly persisted notices to live subscribers. Nobody listening
    /// is fine; the notices are already stored.
    pub fn publish(&self, notices: &[Notification]) {
        for n in notices {
            let _ = self.bus.send(BusMsg::Notice(n.clone()));
        }
    }

    pub async fn record_reconcile(&self, out: &ReconcileOutcome, at: DateTime<Utc>) {
        if out.dry_run {
            return;
        }
        let snap = {
            let mut s = self.status.write().await;
            s.last_reconcile_at = Some(at);
            s.reconcile_clean = Some(out.report.is_clean());
            s.reconcile_unresolved = out.unresolved.len();
            s.daemon_uptime_secs = uptime_secs();
            s.clone()
        };
        if !out.unresolved.is_empty() {
            let _ = self.bus.send(BusMsg::LogLine {
                level: "ERROR".to_string(),
                msg: format!(
                    "reconcile: {} unresolved house/lease mismatches need an operator",
                    out.unresolved.len()
                ),
            });
        }
        let _ = self.bus.send(BusMsg::Status(snap));
    }

    pub async fn record_sweep(&self, out: &SweepOutcome, at: DateTime<Utc>) {
        let snap = {
            let mut s = self.status.write().await;
            s.last_expiry_sweep_at = Some(at);
            s.leases_completed_total += (out.completed.len() + out.confirmed.len()) as u64;
            s.daemon_uptime_secs = uptime_secs();
            s.clone()
        };
        if !out.failed.is_empty() {
            let _ = self.bus.send(BusMsg::LogLine {
                level: "WARN".to_string(),
                msg: format!("lease expiry: {} leases could not be completed", out.failed.len()),
            });
        }
        let _ = self.bus.send(BusMsg::Status(snap));
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Run one reconciliation pass on behalf of `actor` and record the result.
pub async fn reconcile_once_as(
    state: &AppState,
    actor: &Actor,
    dry_run: bool,
) -> MarketResult<ReconcileOutcome> {
    let now = Utc::now();
    let out = state.market.reconcile(actor, dry_run, now).await?;
    state.record_reconcile(&out, now).await;
    Ok(out)
}

/// Startup pass as the system actor. Failure is logged, never fatal.
pub async fn reconcile_once(state: &AppState, dry_run: bool) -> Option<ReconcileOutcome> {
    match reconcile_once_as(state, &Actor::system(), dry_run).await {
        Ok(out) => Some(out),
        Err(e) => {
            error!(error = %e, "reconcile: pass failed");
            None
        }
    }
}

/// Spawn a background task that completes due leases every `interval`.
///
/// The first tick fires immediately, so leases that ended while the daemon
/// was down are completed at boot.
pub fn spawn_lease_expiry_sweep(state: Arc<AppState>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let now = Utc::now();
            match state.market.complete_due_leases(&Actor::system(), now).await {
                Ok(out) => {
                    if out.due > 0 {
                        info!(
                            completed = out.completed.len(),
                            confirmed = out.confirmed.len(),
                            "lease expiry tick"
                        );
                    }
                    state.record_sweep(&out, now).await;
                }
                Err(e) => {
                    warn!(error = %e, "lease expiry tick failed; retrying next interval");
                }
            }
        }
    });
}
