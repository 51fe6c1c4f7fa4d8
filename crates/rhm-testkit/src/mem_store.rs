use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use rhm_lifecycle::{
    check_replay, plan_appointment, plan_booking, plan_house, plan_lease,
    validate_appointment_request, validate_new_house, AppointmentEvent, AppointmentTransition,
    HouseAction, HouseTransition, LeaseContext, LeaseEvent, LeasePolicy, LeaseTransition,
    MarketError, MarketResult, MarketStore, RequestMeta,
};
use rhm_reconcile::OccupancySnapshot;
use rhm_schemas::{
    Actor, Appointment, AppointmentFilter, AppointmentId, AppointmentStatus, BookingRequest, House,
    HouseFilter, HouseId, HouseStatus, NewAppointment, NewHouse, NewNotice, Notification,
    NotificationId, Order, OrderEvent, OrderFilter, OrderId, OrderStatus, StatusCounts, Subject,
    UserId,
};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct State {
    houses: BTreeMap<HouseId, House>,
    orders: BTreeMap<OrderId, Order>,
    events: Vec<OrderEvent>,
    appointments: BTreeMap<AppointmentId, Appointment>,
    notifications: BTreeMap<NotificationId, Notification>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn house(&self, id: HouseId) -> MarketResult<&House> {
        self.houses.get(&id).ok_or_else(|| MarketError::not_found("house", id))
    }

    fn order(&self, id: OrderId) -> MarketResult<&Order> {
        self.orders.get(&id).ok_or_else(|| MarketError::not_found("order", id))
    }

    fn appointment(&self, id: AppointmentId) -> MarketResult<&Appointment> {
        self.appointments
            .get(&id)
            .ok_or_else(|| MarketError::not_found("appointment", id))
    }

    fn in_force_on(&self, house_id: HouseId, except: Option<OrderId>) -> Vec<OrderId> {
        self.orders
            .values()
            .filter(|o| o.house_id == house_id && o.status.is_in_force() && Some(o.id) != except)
            .map(|o| o.id)
            .collect()
    }

    fn set_house_status(
        &mut self,
        id: HouseId,
        status: HouseStatus,
        now: DateTime<Utc>,
    ) -> MarketResult<House> {
        let house = self
            .houses
            .get_mut(&id)
            .ok_or_else(|| MarketError::not_found("house", id))?;
        house.status = status;
        house.updated_at = now;
        house.version += 1;
        Ok(house.clone())
    }

    fn push_notices(&mut self, notices: &[NewNotice], now: DateTime<Utc>) -> Vec<Notification> {
        notices
            .iter()
            .map(|n| {
                let id = self.next_id();
                let stored = Notification {
                    id,
                    recipient_id: n.recipient_id,
                    kind: n.kind.clone(),
                    subject: n.subject,
                    subject_id: n.subject_id,
                    message: n.message.clone(),
                    read: false,
                    created_at: now,
                };
                self.notifications.insert(id, stored.clone());
                stored
            })
            .collect()
    }
}

/// In-memory store for tests and local runs without Postgres.
#[derive(Debug, Default)]
pub struct MemStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every store call fails with a backend error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> MarketResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(anyhow!("memstore: backend unavailable").into());
        }
        Ok(())
    }

    /// Overwrite a house status without any checks, to simulate drift.
    pub async fn force_house_status(&self, id: HouseId, status: HouseStatus) -> MarketResult<()> {
        let mut st = self.state.lock().await;
        st.set_house_status(id, status, Utc::now())?;
        Ok(())
    }

    /// Overwrite an order status without any checks, to simulate drift.
    pub async fn force_order_status(&self, id: OrderId, status: OrderStatus) -> MarketResult<()> {
        let mut st = self.state.lock().await;
        let order = st
            .orders
            .get_mut(&id)
            .ok_or_else(|| MarketError::not_found("order", id))?;
        order.status = status;
        order.version += 1;
        Ok(())
    }
}

#[async_trait::async_trait]
impl MarketStore for MemStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn create_house(
        &self,
        actor: &Actor,
        new: NewHouse,
        meta: &RequestMeta,
    ) -> MarketResult<House> {
        self.check()?;
        validate_new_house(actor, &new)?;
        let mut st = self.state.lock().await;
        let id = st.next_id();
        let house = House {
            id,
            owner_id: actor.user_id,
            title: new.title.trim().to_string(),
            city: new.city.trim().to_string(),
            district: new.district.trim().to_string(),
            address: new.address.trim().to_string(),
            price_cents: new.price_cents,
            area_sqm: new.area_sqm,
            status: HouseStatus::Pending,
            reject_reason: None,
            version: 1,
            created_at: meta.now,
            updated_at: meta.now,
        };
        st.houses.insert(id, house.clone());
        Ok(house)
    }

    async fn get_house(&self, id: HouseId) -> MarketResult<House> {
        self.check()?;
        Ok(self.state.lock().await.house(id)?.clone())
    }

    async fn list_houses(&self, filter: &HouseFilter) -> MarketResult<Vec<House>> {
        self.check()?;
        let st = self.state.lock().await;
        Ok(st
            .houses
            .values()
            .filter(|h| filter.status.map_or(true, |s| h.status == s))
            .filter(|h| filter.owner_id.map_or(true, |o| h.owner_id == o))
            .filter(|h| filter.city.as_deref().map_or(true, |c| h.city == c))
            .cloned()
            .collect())
    }

    async fn apply_house_action(
        &self,
        id: HouseId,
        actor: &Actor,
        action: &HouseAction,
        meta: &RequestMeta,
    ) -> MarketResult<HouseTransition> {
        self.check()?;
        let mut st = self.state.lock().await;
        let plan = plan_house(st.house(id)?, actor, action, meta.now)?;
        let mut written = plan.house;
        written.version += 1;
        st.houses.insert(id, written.clone());
        let notices = st.push_notices(&plan.notices, meta.now);
        Ok(HouseTransition {
            house: written,
            from: plan.from,
            notices,
        })
    }

    async fn book_order(
        &self,
        actor: &Actor,
        req: &BookingRequest,
        policy: &LeasePolicy,
        meta: &RequestMeta,
    ) -> MarketResult<Order> {
        self.check()?;
        let mut st = self.state.lock().await;
        let new = plan_booking(st.house(req.house_id)?, actor, req, policy, meta.now.date_naive())?;
        let id = st.next_id();
        let order = Order {
            id,
            house_id: new.house_id,
            user_id: new.user_id,
            landlord_id: new.landlord_id,
            status: OrderStatus::Pending,
            total_amount_cents: new.total_amount_cents,
            deposit_amount_cents: new.deposit_amount_cents,
            start_date: new.start_date,
            end_date: new.end_date,
            paid_at: None,
            terminate_reason: None,
            requested_terminate_date: None,
            actual_terminate_date: None,
            penalty_amount_cents: None,
            reject_reason: None,
            version: 1,
            created_at: meta.now,
            updated_at: meta.now,
        };
        st.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> MarketResult<Order> {
        self.check()?;
        Ok(self.state.lock().await.order(id)?.clone())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> MarketResult<Vec<Order>> {
        self.check()?;
        let st = self.state.lock().await;
        Ok(st
            .orders
            .values()
            .filter(|o| filter.user_id.map_or(true, |u| o.user_id == u))
            .filter(|o| filter.landlord_id.map_or(true, |l| o.landlord_id == l))
            .filter(|o| filter.house_id.map_or(true, |h| o.house_id == h))
            .filter(|o| filter.status.map_or(true, |s| o.status == s))
            .cloned()
            .collect())
    }

    async fn apply_lease_event(
        &self,
        id: OrderId,
        actor: &Actor,
        event: &LeaseEvent,
        policy: &LeasePolicy,
        meta: &RequestMeta,
    ) -> MarketResult<LeaseTransition> {
        self.check()?;
        let mut st = self.state.lock().await;
        let order = st.order(id)?.clone();
        let house = st.house(order.house_id)?.clone();

        if let Some(rid) = meta.request_id.as_deref() {
            let prior = st
                .events
                .iter()
                .find(|e| e.order_id == id && e.request_id.as_deref() == Some(rid));
            if let Some(prior) = prior {
                check_replay(&order, prior, actor, event)?;
                return Ok(LeaseTransition {
                    from: order.status,
                    order,
                    house,
                    via: None,
                    notices: Vec::new(),
                    replayed: true,
                });
            }
        }

        let other_occupant = if matches!(event, LeaseEvent::Pay) {
            st.in_force_on(house.id, Some(id)).into_iter().next()
        } else {
            None
        };
        let ctx = LeaseContext {
            house: &house,
            other_occupant,
            now: meta.now,
        };
        let plan = plan_lease(&order, actor, event, &ctx, policy)?;

        let mut written = plan.order;
        written.version += 1;
        st.orders.insert(id, written.clone());
        let house = match plan.house_status {
            Some(status) => st.set_house_status(house.id, status, meta.now)?,
            None => house,
        };
        st.events.push(OrderEvent {
            order_id: id,
            action: event.name().to_string(),
            from_status: plan.from,
            to_status: written.status,
            actor_id: actor.user_id,
            actor_role: actor.role,
            request_id: meta.request_id.clone(),
            created_at: meta.now,
        });
        let notices = st.push_notices(&plan.notices, meta.now);

        Ok(LeaseTransition {
            order: written,
            house,
            from: plan.from,
            via: plan.via,
            notices,
            replayed: false,
        })
    }

    async fn order_history(&self, id: OrderId) -> MarketResult<Vec<OrderEvent>> {
        self.check()?;
        let st = self.state.lock().await;
        st.order(id)?;
        Ok(st.events.iter().filter(|e| e.order_id == id).cloned().collect())
    }

    async fn request_appointment(
        &self,
        actor: &Actor,
        req: &NewAppointment,
        meta: &RequestMeta,
    ) -> MarketResult<AppointmentTransition> {
        self.check()?;
        let mut st = self.state.lock().await;
        let house = st.house(req.house_id)?.clone();
        validate_appointment_request(&house, actor, req, meta.now)?;

        let id = st.next_id();
        let appointment = Appointment {
            id,
            house_id: house.id,
            user_id: actor.user_id,
            landlord_id: house.owner_id,
            appointment_time: req.appointment_time,
            note: req.note.clone(),
            status: AppointmentStatus::Pending,
            reject_reason: None,
            version: 1,
            created_at: meta.now,
            updated_at: meta.now,
        };
        st.appointments.insert(id, appointment.clone());
        let notice = NewNotice {
            recipient_id: house.owner_id,
            kind: "appointment.requested".to_string(),
            subject: Subject::Appointment,
            subject_id: id,
            message: format!("New viewing request for house {}", house.id),
        };
        let notices = st.push_notices(&[notice], meta.now);
        Ok(AppointmentTransition {
            appointment,
            from: AppointmentStatus::Pending,
            notices,
        })
    }

    async fn get_appointment(&self, id: AppointmentId) -> MarketResult<Appointment> {
        self.check()?;
        Ok(self.state.lock().await.appointment(id)?.clone())
    }

    async fn list_appointments(&self, filter: &AppointmentFilter) -> MarketResult<Vec<Appointment>> {
        self.check()?;
        let st = self.state.lock().await;
        let mut found: Vec<Appointment> = st
            .appointments
            .values()
            .filter(|a| filter.user_id.map_or(true, |u| a.user_id == u))
            .filter(|a| filter.landlord_id.map_or(true, |l| a.landlord_id == l))
            .filter(|a| filter.house_id.map_or(true, |h| a.house_id == h))
            .filter(|a| filter.status.map_or(true, |s| a.status == s))
            .cloned()
            .collect();
        found.sort_by_key(|a| (a.appointment_time, a.id));
        Ok(found)
    }

    async fn apply_appointment_event(
        &self,
        id: AppointmentId,
        actor: &Actor,
        event: &AppointmentEvent,
        meta: &RequestMeta,
    ) -> MarketResult<AppointmentTransition> {
        self.check()?;
        let mut st = self.state.lock().await;
        let plan = plan_appointment(st.appointment(id)?, actor, event, meta.now)?;
        let mut written = plan.appointment;
        written.updated_at = meta.now;
        written.version += 1;
        st.appointments.insert(id, written.clone());
        let notices = st.push_notices(&plan.notices, meta.now);
        Ok(AppointmentTransition {
            appointment: written,
            from: plan.from,
            notices,
        })
    }

    async fn list_notifications(
        &self,
        recipient: UserId,
        unread_only: bool,
    ) -> MarketResult<Vec<Notification>> {
        self.check()?;
        let st = self.state.lock().await;
        Ok(st
            .notifications
            .values()
            .rev()
            .filter(|n| n.recipient_id == recipient && (!unread_only || !n.read))
            .cloned()
            .collect())
    }

    async fn mark_notification_read(
        &self,
        id: NotificationId,
        actor: &Actor,
    ) -> MarketResult<Notification> {
        self.check()?;
        let mut st = self.state.lock().await;
        let n = st
            .notifications
            .get_mut(&id)
            .ok_or_else(|| MarketError::not_found("notification", id))?;
        if n.recipient_id != actor.user_id {
            return Err(MarketError::forbidden(actor, format!("notification {id} is not yours")));
        }
        n.read = true;
        Ok(n.clone())
    }

    async fn occupancy_snapshot(&self) -> MarketResult<OccupancySnapshot> {
        self.check()?;
        let st = self.state.lock().await;
        let mut snap = OccupancySnapshot::empty();
        for h in st.houses.values() {
            snap = snap.with_house(h.id, h.status);
        }
        for o in st.orders.values().filter(|o| !o.status.is_terminal()) {
            snap = snap.with_lease(o.id, o.house_id, o.status);
        }
        Ok(snap)
    }

    async fn release_house_if_vacant(
        &self,
        house_id: HouseId,
        meta: &RequestMeta,
    ) -> MarketResult<bool> {
        self.check()?;
        let mut st = self.state.lock().await;
        if st.house(house_id)?.status != HouseStatus::Rented {
            return Ok(false);
        }
        if !st.in_force_on(house_id, None).is_empty() {
            return Ok(false);
        }
        st.set_house_status(house_id, HouseStatus::Approved, meta.now)?;
        Ok(true)
    }

    async fn leases_due_for_completion(&self, today: NaiveDate) -> MarketResult<Vec<Order>> {
        self.check()?;
        let st = self.state.lock().await;
        Ok(st
            .orders
            .values()
            .filter(|o| match o.status {
                OrderStatus::Active => o.end_date <= today,
                OrderStatus::TerminateApproved => {
                    o.requested_terminate_date.unwrap_or(o.end_date) <= today
                }
                _ => false,
            })
            .cloned()
            .collect())
    }

    async fn status_counts(&self) -> MarketResult<StatusCounts> {
        self.check()?;
        let st = self.state.lock().await;
        let mut counts = StatusCounts::default();
        for h in st.houses.values() {
            *counts.houses.entry(h.status.as_str().to_string()).or_default() += 1;
        }
        for o in st.orders.values() {
            *counts.orders.entry(o.status.as_str().to_string()).or_default() += 1;
        }
        for a in st.appointments.values() {
            *counts.appointments.entry(a.status.as_str().to_string()).or_default() += 1;
        }
        Ok(counts)
    }
}
