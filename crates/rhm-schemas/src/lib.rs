//! Shared records for the rental marketplace.
//!
//! Plain data only: every type here is `Serialize + Deserialize` and carries
//! no behaviour beyond small status predicates. Transition rules live in
//! `rhm-lifecycle`; persistence lives in `rhm-db` / `rhm-testkit`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

mod status;

pub use status::{AppointmentStatus, HouseStatus, OrderStatus, UnknownStatus};

pub type UserId = i64;
pub type HouseId = i64;
pub type OrderId = i64;
pub type AppointmentId = i64;
pub type NotificationId = i64;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Caller role as asserted by the (external) authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Tenant,
    Landlord,
    Admin,
    /// Internal sweeps (lease expiry, reconciliation). Never accepted from HTTP.
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Tenant => "TENANT",
            Role::Landlord => "LANDLORD",
            Role::Admin => "ADMIN",
            Role::System => "SYSTEM",
        }
    }

    /// Parse a stored role token (including `SYSTEM`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SYSTEM" => Some(Role::System),
            other => Self::parse_external(other),
        }
    }

    /// Parse a role token supplied by a client. `SYSTEM` is not client-assertable.
    pub fn parse_external(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TENANT" | "USER" => Some(Role::Tenant),
            "LANDLORD" => Some(Role::Landlord),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Pre-verified caller identity. Passed explicitly into every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn tenant(user_id: UserId) -> Self {
        Self::new(user_id, Role::Tenant)
    }

    pub fn landlord(user_id: UserId) -> Self {
        Self::new(user_id, Role::Landlord)
    }

    pub fn admin(user_id: UserId) -> Self {
        Self::new(user_id, Role::Admin)
    }

    /// The actor used by internal sweeps.
    pub fn system() -> Self {
        Self::new(0, Role::System)
    }

    /// Admins and the system actor may act on any resource.
    pub fn is_privileged(&self) -> bool {
        matches!(self.role, Role::Admin | Role::System)
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.role.as_str(), self.user_id)
    }
}

// ---------------------------------------------------------------------------
// House
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct House {
    pub id: HouseId,
    pub owner_id: UserId,
    pub title: String,
    pub city: String,
    pub district: String,
    pub address: String,
    /// Monthly rent in minor currency units.
    pub price_cents: i64,
    pub area_sqm: i32,
    pub status: HouseStatus,
    pub reject_reason: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing submitted by a landlord.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewHouse {
    pub title: String,
    pub city: String,
    #[serde(default)]
    pub district: String,
    pub address: String,
    pub price_cents: i64,
    #[serde(default)]
    pub area_sqm: i32,
}

/// Partial listing edit. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HousePatch {
    pub title: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub address: Option<String>,
    pub price_cents: Option<i64>,
    pub area_sqm: Option<i32>,
}

impl HousePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.city.is_none()
            && self.district.is_none()
            && self.address.is_none()
            && self.price_cents.is_none()
            && self.area_sqm.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseFilter {
    pub status: Option<HouseStatus>,
    pub owner_id: Option<UserId>,
    pub city: Option<String>,
}

// ---------------------------------------------------------------------------
// Order / lease
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub house_id: HouseId,
    /// Tenant.
    pub user_id: UserId,
    pub landlord_id: UserId,
    pub status: OrderStatus,
    pub total_amount_cents: i64,
    pub deposit_amount_cents: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub paid_at: Option<DateTime<Utc>>,
    pub terminate_reason: Option<String>,
    pub requested_terminate_date: Option<NaiveDate>,
    pub actual_terminate_date: Option<NaiveDate>,
    pub penalty_amount_cents: Option<i64>,
    pub reject_reason: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Booking request from a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub house_id: HouseId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Fully priced order ready to be inserted (status PENDING).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub house_id: HouseId,
    pub user_id: UserId,
    pub landlord_id: UserId,
    pub total_amount_cents: i64,
    pub deposit_amount_cents: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// One applied lease transition (append-only history).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: OrderId,
    /// Event name, e.g. `pay`, `terminate-approve`.
    pub action: String,
    pub from_status: OrderStatus,
    pub to_status: OrderStatus,
    pub actor_id: UserId,
    pub actor_role: Role,
    /// Client idempotency key, when supplied.
    pub request_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilter {
    pub user_id: Option<UserId>,
    pub landlord_id: Option<UserId>,
    pub house_id: Option<HouseId>,
    pub status: Option<OrderStatus>,
}

// ---------------------------------------------------------------------------
// Appointment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub house_id: HouseId,
    pub user_id: UserId,
    pub landlord_id: UserId,
    pub appointment_time: DateTime<Utc>,
    pub note: Option<String>,
    pub status: AppointmentStatus,
    pub reject_reason: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAppointment {
    pub house_id: HouseId,
    pub appointment_time: DateTime<Utc>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentFilter {
    pub user_id: Option<UserId>,
    pub landlord_id: Option<UserId>,
    pub house_id: Option<HouseId>,
    pub status: Option<AppointmentStatus>,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Subject {
    Order,
    House,
    Appointment,
}

impl Subject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Order => "ORDER",
            Subject::House => "HOUSE",
            Subject::Appointment => "APPOINTMENT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ORDER" => Some(Subject::Order),
            "HOUSE" => Some(Subject::House),
            "APPOINTMENT" => Some(Subject::Appointment),
            _ => None,
        }
    }
}

/// A notice produced by a transition, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotice {
    pub recipient_id: UserId,
    /// Stable machine-readable event name, e.g. `order.terminate_requested`.
    pub kind: String,
    pub subject: Subject,
    pub subject_id: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_id: UserId,
    pub kind: String,
    pub subject: Subject,
    pub subject_id: i64,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Per-status counts across the marketplace (admin dashboard).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub houses: std::collections::BTreeMap<String, i64>,
    pub orders: std::collections::BTreeMap<String, i64>,
    pub appointments: std::collections::BTreeMap<String, i64>,
}
