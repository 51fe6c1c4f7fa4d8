//! Persistence seam.
//!
//! A `MarketStore` owns locking and atomicity; the pure planners own the
//! rules. Every mutating method must, inside one unit of work:
//!
//! 1. lock the rows it touches (order row before house row),
//! 2. call the matching planner on the locked state,
//! 3. write the planned records with a `version` bump and persist notices,
//! 4. commit, or write nothing at all when the planner refuses.

use chrono::{DateTime, NaiveDate, Utc};
use rhm_reconcile::OccupancySnapshot;
use rhm_schemas::{
    Actor, Appointment, AppointmentFilter, AppointmentId, AppointmentStatus, BookingRequest, House,
    HouseFilter, HouseId, HouseStatus, NewAppointment, NewHouse, Notification, NotificationId,
    Order, OrderEvent, OrderFilter, OrderId, OrderStatus, StatusCounts, UserId,
};

use crate::appointment::AppointmentEvent;
use crate::error::MarketError;
use crate::house::HouseAction;
use crate::lease::LeaseEvent;
use crate::policy::LeasePolicy;

pub type MarketResult<T> = Result<T, MarketError>;

/// Per-request facts the store records alongside a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMeta {
    pub now: DateTime<Utc>,
    /// Client idempotency key. A repeat for the same order is a no-op.
    pub request_id: Option<String>,
}

impl RequestMeta {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            request_id: None,
        }
    }

    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// Result of one applied (or replayed) lease event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseTransition {
    pub order: Order,
    pub house: House,
    pub from: OrderStatus,
    pub via: Option<OrderStatus>,
    pub notices: Vec<Notification>,
    /// True when the request id was already applied and nothing was written.
    pub replayed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HouseTransition {
    pub house: House,
    pub from: HouseStatus,
    pub notices: Vec<Notification>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentTransition {
    pub appointment: Appointment,
    pub from: AppointmentStatus,
    pub notices: Vec<Notification>,
}

#[async_trait::async_trait]
pub trait MarketStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    // -- houses ------------------------------------------------------------

    async fn create_house(
        &self,
        actor: &Actor,
        new: NewHouse,
        meta: &RequestMeta,
    ) -> MarketResult<House>;

    async fn get_house(&self, id: HouseId) -> MarketResult<House>;

    async fn list_houses(&self, filter: &HouseFilter) -> MarketResult<Vec<House>>;

    /// Lock the house row, plan with [`crate::plan_house`], write.
    async fn apply_house_action(
        &self,
        id: HouseId,
        actor: &Actor,
        action: &HouseAction,
        meta: &RequestMeta,
    ) -> MarketResult<HouseTransition>;

    // -- orders ------------------------------------------------------------

    /// Lock the house row, price with [`crate::plan_booking`], insert PENDING.
    async fn book_order(
        &self,
        actor: &Actor,
        req: &BookingRequest,
        policy: &LeasePolicy,
        meta: &RequestMeta,
    ) -> MarketResult<Order>;

    async fn get_order(&self, id: OrderId) -> MarketResult<Order>;

    async fn list_orders(&self, filter: &OrderFilter) -> MarketResult<Vec<Order>>;

    /// Lock order then house, plan with [`crate::plan_lease`], write both
    /// rows, the notices and the `order_events` entry in one unit of work.
    async fn apply_lease_event(
        &self,
        id: OrderId,
        actor: &Actor,
        event: &LeaseEvent,
        policy: &LeasePolicy,
        meta: &RequestMeta,
    ) -> MarketResult<LeaseTransition>;

    /// Applied transitions for one order, oldest first.
    async fn order_history(&self, id: OrderId) -> MarketResult<Vec<OrderEvent>>;

    // -- appointments ------------------------------------------------------

    async fn request_appointment(
        &self,
        actor: &Actor,
        req: &NewAppointment,
        meta: &RequestMeta,
    ) -> MarketResult<AppointmentTransition>;

    async fn get_appointment(&self, id: AppointmentId) -> MarketResult<Appointment>;

    async fn list_appointments(&self, filter: &AppointmentFilter) -> MarketResult<Vec<Appointment>>;

    async fn apply_appointment_event(
        &self,
        id: AppointmentId,
        actor: &Actor,
        event: &AppointmentEvent,
        meta: &RequestMeta,
    ) -> MarketResult<AppointmentTransition>;

    // -- notifications -----------------------------------------------------

    /// Newest first.
    async fn list_notifications(
        &self,
        recipient: UserId,
        unread_only: bool,
    ) -> MarketResult<Vec<Notification>>;

    /// Only the recipient may mark a notice read. Marking twice is harmless.
    async fn mark_notification_read(
        &self,
        id: NotificationId,
        actor: &Actor,
    ) -> MarketResult<Notification>;

    // -- maintenance -------------------------------------------------------

    /// House statuses plus every non-terminal lease, read in one snapshot.
    async fn occupancy_snapshot(&self) -> MarketResult<OccupancySnapshot>;

    /// Lock the house, re-check that it is RENTED with no in-force lease,
    /// then set it APPROVED. Returns `false` when the re-check no longer
    /// holds and nothing was written.
    async fn release_house_if_vacant(
        &self,
        house_id: HouseId,
        meta: &RequestMeta,
    ) -> MarketResult<bool>;

    /// Leases the expiry sweep should close, by id: ACTIVE orders with
    /// `end_date <= today`, and TERMINATE_APPROVED orders whose requested
    /// termination date (or `end_date` when none was given) is `<= today`.
    async fn leases_due_for_completion(&self, today: NaiveDate) -> MarketResult<Vec<Order>>;

    async fn status_counts(&self) -> MarketResult<StatusCounts>;
}
