//! Caller-facing operations.
//!
//! `Market` wraps a store with the lease policy, read scoping per actor and
//! transition logging. HTTP handlers and the CLI go through it; they never
//! call a store's mutating methods directly.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rhm_schemas::{
    Actor, Appointment, AppointmentFilter, AppointmentId, BookingRequest, House, HouseFilter,
    HouseId, HousePatch, NewAppointment, NewHouse, Notification, NotificationId, Order,
    OrderEvent, OrderFilter, OrderId, Role, StatusCounts,
};
use tracing::{error, info, warn};

use crate::appointment::AppointmentEvent;
use crate::error::MarketError;
use crate::house::HouseAction;
use crate::jobs::{self, ReconcileOutcome, SweepOutcome};
use crate::lease::LeaseEvent;
use crate::policy::LeasePolicy;
use crate::store::{
    AppointmentTransition, HouseTransition, LeaseTransition, MarketResult, MarketStore,
    RequestMeta,
};

#[derive(Clone)]
pub struct Market {
    store: Arc<dyn MarketStore>,
    policy: LeasePolicy,
}

impl std::fmt::Debug for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Market")
            .field("backend", &self.store.backend_name())
            .field("policy", &self.policy)
            .finish()
    }
}

impl Market {
    pub fn new(store: Arc<dyn MarketStore>, policy: LeasePolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Arc<dyn MarketStore> {
        &self.store
    }

    pub fn policy(&self) -> &LeasePolicy {
        &self.policy
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    // -----------------------------------------------------------------------
    // Houses
    // -----------------------------------------------------------------------

    pub async fn create_house(
        &self,
        actor: &Actor,
        new: NewHouse,
        meta: &RequestMeta,
    ) -> MarketResult<House> {
        let house = self.store.create_house(actor, new, meta).await?;
        info!(house_id = house.id, owner_id = house.owner_id, "house/create");
        Ok(house)
    }

    /// Anyone sees listed houses; owners and admins also see the rest.
    pub async fn get_house(&self, actor: &Actor, id: HouseId) -> MarketResult<House> {
        let house = self.store.get_house(id).await?;
        if can_see_house(actor, &house) {
            Ok(house)
        } else {
            Err(MarketError::not_found("house", id))
        }
    }

    pub async fn list_houses(
        &self,
        actor: &Actor,
        filter: &HouseFilter,
    ) -> MarketResult<Vec<House>> {
        let mut houses = self.store.list_houses(filter).await?;
        houses.retain(|h| can_see_house(actor, h));
        Ok(houses)
    }

    pub async fn approve_house(
        &self,
        actor: &Actor,
        id: HouseId,
        meta: &RequestMeta,
    ) -> MarketResult<HouseTransition> {
        self.house_action(actor, id, HouseAction::Approve, meta).await
    }

    pub async fn reject_house(
        &self,
        actor: &Actor,
        id: HouseId,
        reason: String,
        meta: &RequestMeta,
    ) -> MarketResult<HouseTransition> {
        self.house_action(actor, id, HouseAction::Reject { reason }, meta).await
    }

    pub async fn put_online(
        &self,
        actor: &Actor,
        id: HouseId,
        meta: &RequestMeta,
    ) -> MarketResult<HouseTransition> {
        self.house_action(actor, id, HouseAction::Online, meta).await
    }

    pub async fn take_offline(
        &self,
        actor: &Actor,
        id: HouseId,
        meta: &RequestMeta,
    ) -> MarketResult<HouseTransition> {
        self.house_action(actor, id, HouseAction::Offline, meta).await
    }

    pub async fn update_house(
        &self,
        actor: &Actor,
        id: HouseId,
        patch: HousePatch,
        meta: &RequestMeta,
    ) -> MarketResult<HouseTransition> {
        self.house_action(actor, id, HouseAction::Edit(patch), meta).await
    }

    pub async fn delete_house(
        &self,
        actor: &Actor,
        id: HouseId,
        meta: &RequestMeta,
    ) -> MarketResult<HouseTransition> {
        self.house_action(actor, id, HouseAction::Delete, meta).await
    }

    async fn house_action(
        &self,
        actor: &Actor,
        id: HouseId,
        action: HouseAction,
        meta: &RequestMeta,
    ) -> MarketResult<HouseTransition> {
        match self.store.apply_house_action(id, actor, &action, meta).await {
            Ok(t) => {
                info!(
                    house_id = id,
                    action = action.name(),
                    from = %t.from,
                    to = %t.house.status,
                    %actor,
                    "house/transition"
                );
                Ok(t)
            }
            Err(e) => Err(refused("house", id, action.name(), actor, e)),
        }
    }

    // -----------------------------------------------------------------------
    // Orders
    // -----------------------------------------------------------------------

    pub async fn book_order(
        &self,
        actor: &Actor,
        req: &BookingRequest,
        meta: &RequestMeta,
    ) -> MarketResult<Order> {
        match self.store.book_order(actor, req, &self.policy, meta).await {
            Ok(order) => {
                info!(
                    order_id = order.id,
                    house_id = order.house_id,
                    user_id = order.user_id,
                    total_cents = order.total_amount_cents,
                    "order/book"
                );
                Ok(order)
            }
            Err(e) => Err(refused("house", req.house_id, "book", actor, e)),
        }
    }

    pub async fn get_order(&self, actor: &Actor, id: OrderId) -> MarketResult<Order> {
        let order = self.store.get_order(id).await?;
        ensure_party(actor, &order)?;
        Ok(order)
    }

    /// Tenants see their own orders, landlords the orders on their houses.
    pub async fn list_orders(
        &self,
        actor: &Actor,
        filter: OrderFilter,
    ) -> MarketResult<Vec<Order>> {
        let mut filter = filter;
        match actor.role {
            Role::Tenant => filter.user_id = Some(actor.user_id),
            Role::Landlord => filter.landlord_id = Some(actor.user_id),
            Role::Admin | Role::System => {}
        }
        self.store.list_orders(&filter).await
    }

    pub async fn order_history(&self, actor: &Actor, id: OrderId) -> MarketResult<Vec<OrderEvent>> {
        self.get_order(actor, id).await?;
        self.store.order_history(id).await
    }

    pub async fn pay(
        &self,
        actor: &Actor,
        id: OrderId,
        meta: &RequestMeta,
    ) -> MarketResult<LeaseTransition> {
        self.lease_event(actor, id, LeaseEvent::Pay, meta).await
    }

    pub async fn cancel(
        &self,
        actor: &Actor,
        id: OrderId,
        meta: &RequestMeta,
    ) -> MarketResult<LeaseTransition> {
        self.lease_event(actor, id, LeaseEvent::Cancel, meta).await
    }

    pub async fn request_termination(
        &self,
        actor: &Actor,
        id: OrderId,
        reason: String,
        requested_date: Option<NaiveDate>,
        meta: &RequestMeta,
    ) -> MarketResult<LeaseTransition> {
        let event = LeaseEvent::RequestTermination {
            reason,
            requested_date,
        };
        self.lease_event(actor, id, event, meta).await
    }

    pub async fn approve_termination(
        &self,
        actor: &Actor,
        id: OrderId,
        penalty_cents: Option<i64>,
        meta: &RequestMeta,
    ) -> MarketResult<LeaseTransition> {
        self.lease_event(actor, id, LeaseEvent::ApproveTermination { penalty_cents }, meta)
            .await
    }

    pub async fn reject_termination(
        &self,
        actor: &Actor,
        id: OrderId,
        reason: String,
        meta: &RequestMeta,
    ) -> MarketResult<LeaseTransition> {
        self.lease_event(actor, id, LeaseEvent::RejectTermination { reason }, meta)
            .await
    }

    pub async fn confirm_termination(
        &self,
        actor: &Actor,
        id: OrderId,
        meta: &RequestMeta,
    ) -> MarketResult<LeaseTransition> {
        self.lease_event(actor, id, LeaseEvent::ConfirmTermination, meta).await
    }

    pub async fn complete(
        &self,
        actor: &Actor,
        id: OrderId,
        meta: &RequestMeta,
    ) -> MarketResult<LeaseTransition> {
        self.lease_event(actor, id, LeaseEvent::Complete, meta).await
    }

    async fn lease_event(
        &self,
        actor: &Actor,
        id: OrderId,
        event: LeaseEvent,
        meta: &RequestMeta,
    ) -> MarketResult<LeaseTransition> {
        match self
            .store
            .apply_lease_event(id, actor, &event, &self.policy, meta)
            .await
        {
            Ok(t) => {
                if t.replayed {
                    info!(
                        order_id = id,
                        action = event.name(),
                        request_id = ?meta.request_id,
                        "order/replay"
                    );
                } else {
                    info!(
                        order_id = id,
                        house_id = t.order.house_id,
                        action = event.name(),
                        from = %t.from,
                        to = %t.order.status,
                        house_status = %t.house.status,
                        %actor,
                        "order/transition"
                    );
                }
                Ok(t)
            }
            Err(e) => Err(refused("order", id, event.name(), actor, e)),
        }
    }

    // -----------------------------------------------------------------------
    // Appointments
    // -----------------------------------------------------------------------

    pub async fn request_appointment(
        &self,
        actor: &Actor,
        req: &NewAppointment,
        meta: &RequestMeta,
    ) -> MarketResult<AppointmentTransition> {
        match self.store.request_appointment(actor, req, meta).await {
            Ok(t) => {
                info!(
                    appointment_id = t.appointment.id,
                    house_id = t.appointment.house_id,
                    "appointment/request"
                );
                Ok(t)
            }
            Err(e) => Err(refused("house", req.house_id, "request-viewing", actor, e)),
        }
    }

    pub async fn get_appointment(
        &self,
        actor: &Actor,
        id: AppointmentId,
    ) -> MarketResult<Appointment> {
        let appt = self.store.get_appointment(id).await?;
        let party = actor.user_id == appt.user_id || actor.user_id == appt.landlord_id;
        if party || actor.is_privileged() {
            Ok(appt)
        } else {
            Err(MarketError::forbidden(actor, format!("not a party to appointment {id}")))
        }
    }

    pub async fn list_appointments(
        &self,
        actor: &Actor,
        filter: AppointmentFilter,
    ) -> MarketResult<Vec<Appointment>> {
        let mut filter = filter;
        match actor.role {
            Role::Tenant => filter.user_id = Some(actor.user_id),
            Role::Landlord => filter.landlord_id = Some(actor.user_id),
            Role::Admin | Role::System => {}
        }
        self.store.list_appointments(&filter).await
    }

    pub async fn appointment_event(
        &self,
        actor: &Actor,
        id: AppointmentId,
        event: AppointmentEvent,
        meta: &RequestMeta,
    ) -> MarketResult<AppointmentTransition> {
        match self.store.apply_appointment_event(id, actor, &event, meta).await {
            Ok(t) => {
                info!(
                    appointment_id = id,
                    action = event.name(),
                    from = %t.from,
                    to = %t.appointment.status,
                    "appointment/transition"
                );
                Ok(t)
            }
            Err(e) => Err(refused("appointment", id, event.name(), actor, e)),
        }
    }

    // -----------------------------------------------------------------------
    // Notifications
    // -----------------------------------------------------------------------

    pub async fn notifications(
        &self,
        actor: &Actor,
        unread_only: bool,
    ) -> MarketResult<Vec<Notification>> {
        self.store.list_notifications(actor.user_id, unread_only).await
    }

    pub async fn mark_read(&self, actor: &Actor, id: NotificationId) -> MarketResult<Notification> {
        self.store.mark_notification_read(id, actor).await
    }

    // -----------------------------------------------------------------------
    // Admin
    // -----------------------------------------------------------------------

    pub async fn reconcile(
        &self,
        actor: &Actor,
        dry_run: bool,
        now: DateTime<Utc>,
    ) -> MarketResult<ReconcileOutcome> {
        require_privileged(actor, "reconcile")?;
        jobs::run_reconciliation(self.store.as_ref(), dry_run, now).await
    }

    pub async fn complete_due_leases(
        &self,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> MarketResult<SweepOutcome> {
        require_privileged(actor, "complete due leases")?;
        jobs::complete_due_leases(self.store.as_ref(), &self.policy, now).await
    }

    /// Dashboard counts. A backend failure is logged and answered with zeros.
    pub async fn stats(&self, actor: &Actor) -> MarketResult<StatusCounts> {
        require_privileged(actor, "view stats")?;
        match self.store.status_counts().await {
            Ok(c) => Ok(c),
            Err(e) => {
                error!(error = %e, "stats: backend failure, returning zero counts");
                Ok(StatusCounts::default())
            }
        }
    }
}

fn can_see_house(actor: &Actor, house: &House) -> bool {
    house.status.is_listed() || actor.is_privileged() || actor.user_id == house.owner_id
}

fn ensure_party(actor: &Actor, order: &Order) -> MarketResult<()> {
    let party = actor.user_id == order.user_id || actor.user_id == order.landlord_id;
    if party || actor.is_privileged() {
        Ok(())
    } else {
        Err(MarketError::forbidden(actor, format!("not a party to order {}", order.id)))
    }
}

fn require_privileged(actor: &Actor, what: &str) -> MarketResult<()> {
    if actor.is_privileged() {
        Ok(())
    } else {
        Err(MarketError::forbidden(actor, format!("only admins may {what}")))
    }
}

/// Log a refused operation at the right level and hand the error back.
fn refused(entity: &str, id: i64, action: &str, actor: &Actor, e: MarketError) -> MarketError {
    match &e {
        MarketError::Backend(inner) => {
            error!(entity, id, action, %actor, error = %format!("{inner:#}"), "operation failed")
        }
        other => warn!(entity, id, action, %actor, kind = other.kind(), reason = %other, "refused"),
    }
    e
}
