//! Request and response types for the rhm-daemon HTTP endpoints.
//!
//! Plain `Serialize + Deserialize` shapes so tests can decode them. Status
//! tokens arrive as strings and are parsed in the handlers.

use chrono::{DateTime, NaiveDate, Utc};
use rhm_schemas::{Appointment, AppointmentStatus, House, HouseStatus, Order, OrderStatus};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
    /// `postgres` or `memory`.
    pub backend: String,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable machine-readable kind, e.g. `invalid_state`.
    pub kind: String,
}

// ---------------------------------------------------------------------------
// Houses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HouseListQuery {
    pub status: Option<String>,
    pub owner_id: Option<i64>,
    pub city: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseTransitionResponse {
    pub house: House,
    pub from: HouseStatus,
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<String>,
    pub house_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminateRequest {
    pub reason: String,
    #[serde(default)]
    pub requested_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerminateApproveRequest {
    #[serde(default)]
    pub penalty_cents: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseTransitionResponse {
    pub order: Order,
    pub from: OrderStatus,
    /// Intermediate status the event passed through, if any.
    pub via: Option<OrderStatus>,
    pub house_status: HouseStatus,
    /// The request id had already been applied; nothing changed.
    pub replayed: bool,
}

// ---------------------------------------------------------------------------
// Appointments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentListQuery {
    pub status: Option<String>,
    pub house_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentRejectRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentTransitionResponse {
    pub appointment: Appointment,
    pub from: AppointmentStatus,
}

// ---------------------------------------------------------------------------
// Notifications / admin
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileRequest {
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompleteDueRequest {
    /// Sweep as of this instant instead of now.
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
}
