use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use rhm_lifecycle::{
    check_replay, plan_appointment, plan_booking, plan_house, plan_lease, validate_appointment_request,
    validate_new_house, AppointmentEvent, AppointmentTransition, HouseAction, HouseTransition,
    LeaseContext, LeaseEvent, LeasePolicy, LeaseTransition, MarketError, MarketResult,
    MarketStore, RequestMeta,
};
use rhm_reconcile::OccupancySnapshot;
use rhm_schemas::{
    Actor, Appointment, AppointmentFilter, AppointmentId, AppointmentStatus, BookingRequest, House,
    HouseFilter, HouseId, HouseStatus, NewAppointment, NewHouse, NewNotice, Notification,
    NotificationId, Order, OrderEvent, OrderFilter, OrderId, OrderStatus, StatusCounts, Subject,
    UserId,
};
use sqlx::{PgConnection, PgPool};

use crate::rows::{self, APPOINTMENT_COLS, EVENT_COLS, HOUSE_COLS, NOTIFICATION_COLS, ORDER_COLS};

const IN_FORCE: &str = "('ACTIVE','TERMINATE_REQUESTED','TERMINATE_APPROVED')";

/// Postgres-backed store. Each mutating call is one transaction.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Row helpers (all run on a connection inside the caller's transaction)
// ---------------------------------------------------------------------------

async fn lock_house(conn: &mut PgConnection, id: HouseId) -> MarketResult<House> {
    let row = sqlx::query(&format!("select {HOUSE_COLS} from houses where id = $1 for update"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("lock house row")?;
    match row {
        Some(r) => Ok(rows::house(&r)?),
        None => Err(MarketError::not_found("house", id)),
    }
}

async fn lock_order(conn: &mut PgConnection, id: OrderId) -> MarketResult<Order> {
    let row = sqlx::query(&format!("select {ORDER_COLS} from orders where id = $1 for update"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("lock order row")?;
    match row {
        Some(r) => Ok(rows::order(&r)?),
        None => Err(MarketError::not_found("order", id)),
    }
}

async fn lock_appointment(conn: &mut PgConnection, id: AppointmentId) -> MarketResult<Appointment> {
    let row = sqlx::query(&format!(
        "select {APPOINTMENT_COLS} from appointments where id = $1 for update"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .context("lock appointment row")?;
    match row {
        Some(r) => Ok(rows::appointment(&r)?),
        None => Err(MarketError::not_found("appointment", id)),
    }
}

async fn write_house(conn: &mut PgConnection, h: &House) -> MarketResult<House> {
    let row = sqlx::query(&format!(
        r#"
        update houses
        set title = $2, city = $3, district = $4, address = $5, price_cents = $6,
            area_sqm = $7, status = $8, reject_reason = $9, updated_at = $10,
            version = version + 1
        where id = $1
        returning {HOUSE_COLS}
        "#
    ))
    .bind(h.id)
    .bind(&h.title)
    .bind(&h.city)
    .bind(&h.district)
    .bind(&h.address)
    .bind(h.price_cents)
    .bind(h.area_sqm)
    .bind(h.status.as_str())
    .bind(&h.reject_reason)
    .bind(h.updated_at)
    .fetch_one(&mut *conn)
    .await
    .context("update house row")?;
    Ok(rows::house(&row)?)
}

async fn set_house_status(
    conn: &mut PgConnection,
    id: HouseId,
    status: HouseStatus,
    now: DateTime<Utc>,
) -> MarketResult<House> {
    let row = sqlx::query(&format!(
        r#"
        update houses
        set status = $2, updated_at = $3, version = version + 1
        where id = $1
        returning {HOUSE_COLS}
        "#
    ))
    .bind(id)
    .bind(status.as_str())
    .bind(now)
    .fetch_one(&mut *conn)
    .await
    .context("update house status")?;
    Ok(rows::house(&row)?)
}

async fn write_order(conn: &mut PgConnection, o: &Order) -> MarketResult<Order> {
    let row = sqlx::query(&format!(
        r#"
        update orders
        set status = $2, paid_at = $3, terminate_reason = $4, requested_terminate_date = $5,
            actual_terminate_date = $6, penalty_amount_cents = $7, reject_reason = $8,
            updated_at = $9, version = version + 1
        where id = $1
        returning {ORDER_COLS}
        "#
    ))
    .bind(o.id)
    .bind(o.status.as_str())
    .bind(o.paid_at)
    .bind(&o.terminate_reason)
    .bind(o.requested_terminate_date)
    .bind(o.actual_terminate_date)
    .bind(o.penalty_amount_cents)
    .bind(&o.reject_reason)
    .bind(o.updated_at)
    .fetch_one(&mut *conn)
    .await
    .context("update order row")?;
    Ok(rows::order(&row)?)
}

async fn insert_notices(
    conn: &mut PgConnection,
    notices: &[NewNotice],
    now: DateTime<Utc>,
) -> MarketResult<Vec<Notification>> {
    let mut out = Vec::with_capacity(notices.len());
    for n in notices {
        let row = sqlx::query(&format!(
            r#"
            insert into notifications (recipient_id, kind, subject, subject_id, message, created_at)
            values ($1, $2, $3, $4, $5, $6)
            returning {NOTIFICATION_COLS}
            "#
        ))
        .bind(n.recipient_id)
        .bind(&n.kind)
        .bind(n.subject.as_str())
        .bind(n.subject_id)
        .bind(&n.message)
        .bind(now)
        .fetch_one(&mut *conn)
        .await
        .context("insert notification")?;
        out.push(rows::notification(&row)?);
    }
    Ok(out)
}

/// In-force orders on a house other than `except`.
async fn in_force_orders(
    conn: &mut PgConnection,
    house_id: HouseId,
    except: Option<OrderId>,
) -> MarketResult<Vec<OrderId>> {
    let ids: Vec<(i64,)> = sqlx::query_as(&format!(
        r#"
        select id from orders
        where house_id = $1
          and status in {IN_FORCE}
          and ($2::bigint is null or id <> $2)
        order by id
        "#
    ))
    .bind(house_id)
    .bind(except)
    .fetch_all(&mut *conn)
    .await
    .context("query in-force orders")?;
    Ok(ids.into_iter().map(|(id,)| id).collect())
}

/// The event already recorded under `request_id` for this order, if any.
async fn applied_event(
    conn: &mut PgConnection,
    order_id: OrderId,
    request_id: &str,
) -> MarketResult<Option<OrderEvent>> {
    let row = sqlx::query(&format!(
        "select {EVENT_COLS} from order_events where order_id = $1 and request_id = $2"
    ))
    .bind(order_id)
    .bind(request_id)
    .fetch_optional(&mut *conn)
    .await
    .context("look up request id")?;
    Ok(row.as_ref().map(rows::order_event).transpose()?)
}

async fn count_by_status(
    pool: &PgPool,
    table: &str,
) -> anyhow::Result<std::collections::BTreeMap<String, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(&format!(
        "select status, count(*)::bigint from {table} group by status"
    ))
    .fetch_all(pool)
    .await
    .with_context(|| format!("count {table} by status"))?;
    Ok(rows.into_iter().collect())
}

// ---------------------------------------------------------------------------
// MarketStore
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl MarketStore for PgStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn create_house(
        &self,
        actor: &Actor,
        new: NewHouse,
        meta: &RequestMeta,
    ) -> MarketResult<House> {
        validate_new_house(actor, &new)?;
        let row = sqlx::query(&format!(
            r#"
            insert into houses (owner_id, title, city, district, address, price_cents, area_sqm,
                                status, created_at, updated_at)
            values ($1, $2, $3, $4, $5, $6, $7, 'PENDING', $8, $8)
            returning {HOUSE_COLS}
            "#
        ))
        .bind(actor.user_id)
        .bind(new.title.trim())
        .bind(new.city.trim())
        .bind(new.district.trim())
        .bind(new.address.trim())
        .bind(new.price_cents)
        .bind(new.area_sqm)
        .bind(meta.now)
        .fetch_one(&self.pool)
        .await
        .context("insert house")?;
        Ok(rows::house(&row)?)
    }

    async fn get_house(&self, id: HouseId) -> MarketResult<House> {
        let row = sqlx::query(&format!("select {HOUSE_COLS} from houses where id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("fetch house")?;
        match row {
            Some(r) => Ok(rows::house(&r)?),
            None => Err(MarketError::not_found("house", id)),
        }
    }

    async fn list_houses(&self, filter: &HouseFilter) -> MarketResult<Vec<House>> {
        let found = sqlx::query(&format!(
            r#"
            select {HOUSE_COLS} from houses
            where ($1::text is null or status = $1)
              and ($2::bigint is null or owner_id = $2)
              and ($3::text is null or city = $3)
            order by id
            "#
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.owner_id)
        .bind(filter.city.as_deref())
        .fetch_all(&self.pool)
        .await
        .context("list houses")?;
        Ok(found.iter().map(rows::house).collect::<anyhow::Result<Vec<_>>>()?)
    }

    async fn apply_house_action(
        &self,
        id: HouseId,
        actor: &Actor,
        action: &HouseAction,
        meta: &RequestMeta,
    ) -> MarketResult<HouseTransition> {
        let mut tx = self.pool.begin().await.context("begin house tx")?;
        let house = lock_house(&mut tx, id).await?;
        let plan = plan_house(&house, actor, action, meta.now)?;
        let written = write_house(&mut tx, &plan.house).await?;
        let notices = insert_notices(&mut tx, &plan.notices, meta.now).await?;
        tx.commit().await.context("commit house tx")?;
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
        let mut tx = self.pool.begin().await.context("begin booking tx")?;
        let house = lock_house(&mut tx, req.house_id).await?;
        let new = plan_booking(&house, actor, req, policy, meta.now.date_naive())?;
        let row = sqlx::query(&format!(
            r#"
            insert into orders (house_id, user_id, landlord_id, status, total_amount_cents,
                                deposit_amount_cents, start_date, end_date, created_at, updated_at)
            values ($1, $2, $3, 'PENDING', $4, $5, $6, $7, $8, $8)
            returning {ORDER_COLS}
            "#
        ))
        .bind(new.house_id)
        .bind(new.user_id)
        .bind(new.landlord_id)
        .bind(new.total_amount_cents)
        .bind(new.deposit_amount_cents)
        .bind(new.start_date)
        .bind(new.end_date)
        .bind(meta.now)
        .fetch_one(&mut *tx)
        .await
        .context("insert order")?;
        let order = rows::order(&row)?;
        tx.commit().await.context("commit booking tx")?;
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> MarketResult<Order> {
        let row = sqlx::query(&format!("select {ORDER_COLS} from orders where id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("fetch order")?;
        match row {
            Some(r) => Ok(rows::order(&r)?),
            None => Err(MarketError::not_found("order", id)),
        }
    }

    async fn list_orders(&self, filter: &OrderFilter) -> MarketResult<Vec<Order>> {
        let found = sqlx::query(&format!(
            r#"
            select {ORDER_COLS} from orders
            where ($1::bigint is null or user_id = $1)
              and ($2::bigint is null or landlord_id = $2)
              and ($3::bigint is null or house_id = $3)
              and ($4::text is null or status = $4)
            order by id
            "#
        ))
        .bind(filter.user_id)
        .bind(filter.landlord_id)
        .bind(filter.house_id)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .context("list orders")?;
        Ok(found.iter().map(rows::order).collect::<anyhow::Result<Vec<_>>>()?)
    }

    async fn apply_lease_event(
        &self,
        id: OrderId,
        actor: &Actor,
        event: &LeaseEvent,
        policy: &LeasePolicy,
        meta: &RequestMeta,
    ) -> MarketResult<LeaseTransition> {
        let mut tx = self.pool.begin().await.context("begin lease tx")?;

        // Lock order: order row, then house row.
        let order = lock_order(&mut tx, id).await?;

        if let Some(rid) = meta.request_id.as_deref() {
            if let Some(prior) = applied_event(&mut tx, id, rid).await? {
                // A refused replay drops `tx`, which rolls back.
                check_replay(&order, &prior, actor, event)?;
                let house = lock_house(&mut tx, order.house_id).await?;
                tx.commit().await.context("commit replay tx")?;
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

        let house = lock_house(&mut tx, order.house_id).await?;
        let other_occupant = if matches!(event, LeaseEvent::Pay) {
            in_force_orders(&mut tx, house.id, Some(order.id))
                .await?
                .into_iter()
                .next()
        } else {
            None
        };

        let ctx = LeaseContext {
            house: &house,
            other_occupant,
            now: meta.now,
        };
        // A refused plan drops `tx`, which rolls back.
        let plan = plan_lease(&order, actor, event, &ctx, policy)?;

        let written = write_order(&mut tx, &plan.order).await?;
        let house = match plan.house_status {
            Some(status) => set_house_status(&mut tx, house.id, status, meta.now).await?,
            None => house,
        };

        sqlx::query(
            r#"
            insert into order_events (order_id, action, from_status, to_status, actor_id,
                                      actor_role, request_id, created_at)
            values ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(event.name())
        .bind(plan.from.as_str())
        .bind(written.status.as_str())
        .bind(actor.user_id)
        .bind(actor.role.as_str())
        .bind(meta.request_id.as_deref())
        .bind(meta.now)
        .execute(&mut *tx)
        .await
        .context("insert order event")?;

        let notices = insert_notices(&mut tx, &plan.notices, meta.now).await?;
        tx.commit().await.context("commit lease tx")?;

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
        self.get_order(id).await?;
        let found = sqlx::query(&format!(
            "select {EVENT_COLS} from order_events where order_id = $1 order by id"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .context("list order events")?;
        Ok(found.iter().map(rows::order_event).collect::<anyhow::Result<Vec<_>>>()?)
    }

    async fn request_appointment(
        &self,
        actor: &Actor,
        req: &NewAppointment,
        meta: &RequestMeta,
    ) -> MarketResult<AppointmentTransition> {
        let mut tx = self.pool.begin().await.context("begin appointment tx")?;
        let house = lock_house(&mut tx, req.house_id).await?;
        validate_appointment_request(&house, actor, req, meta.now)?;

        let row = sqlx::query(&format!(
            r#"
            insert into appointments (house_id, user_id, landlord_id, appointment_time, note,
                                      status, created_at, updated_at)
            values ($1, $2, $3, $4, $5, 'PENDING', $6, $6)
            returning {APPOINTMENT_COLS}
            "#
        ))
        .bind(house.id)
        .bind(actor.user_id)
        .bind(house.owner_id)
        .bind(req.appointment_time)
        .bind(req.note.as_deref())
        .bind(meta.now)
        .fetch_one(&mut *tx)
        .await
        .context("insert appointment")?;
        let appointment = rows::appointment(&row)?;

        let notice = NewNotice {
            recipient_id: house.owner_id,
            kind: "appointment.requested".to_string(),
            subject: Subject::Appointment,
            subject_id: appointment.id,
            message: format!("New viewing request for house {}", house.id),
        };
        let notices = insert_notices(&mut tx, &[notice], meta.now).await?;
        tx.commit().await.context("commit appointment tx")?;

        Ok(AppointmentTransition {
            appointment,
            from: AppointmentStatus::Pending,
            notices,
        })
    }

    async fn get_appointment(&self, id: AppointmentId) -> MarketResult<Appointment> {
        let row = sqlx::query(&format!(
            "select {APPOINTMENT_COLS} from appointments where id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("fetch appointment")?;
        match row {
            Some(r) => Ok(rows::appointment(&r)?),
            None => Err(MarketError::not_found("appointment", id)),
        }
    }

    async fn list_appointments(&self, filter: &AppointmentFilter) -> MarketResult<Vec<Appointment>> {
        let found = sqlx::query(&format!(
            r#"
            select {APPOINTMENT_COLS} from appointments
            where ($1::bigint is null or user_id = $1)
              and ($2::bigint is null or landlord_id = $2)
              and ($3::bigint is null or house_id = $3)
              and ($4::text is null or status = $4)
            order by appointment_time, id
            "#
        ))
        .bind(filter.user_id)
        .bind(filter.landlord_id)
        .bind(filter.house_id)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .context("list appointments")?;
        Ok(found.iter().map(rows::appointment).collect::<anyhow::Result<Vec<_>>>()?)
    }

    async fn apply_appointment_event(
        &self,
        id: AppointmentId,
        actor: &Actor,
        event: &AppointmentEvent,
        meta: &RequestMeta,
    ) -> MarketResult<AppointmentTransition> {
        let mut tx = self.pool.begin().await.context("begin appointment tx")?;
        let appt = lock_appointment(&mut tx, id).await?;
        let plan = plan_appointment(&appt, actor, event, meta.now)?;

        let row = sqlx::query(&format!(
            r#"
            update appointments
            set status = $2, reject_reason = $3, updated_at = $4, version = version + 1
            where id = $1
            returning {APPOINTMENT_COLS}
            "#
        ))
        .bind(id)
        .bind(plan.appointment.status.as_str())
        .bind(plan.appointment.reject_reason.as_deref())
        .bind(meta.now)
        .fetch_one(&mut *tx)
        .await
        .context("update appointment row")?;
        let appointment = rows::appointment(&row)?;

        let notices = insert_notices(&mut tx, &plan.notices, meta.now).await?;
        tx.commit().await.context("commit appointment tx")?;
        Ok(AppointmentTransition {
            appointment,
            from: plan.from,
            notices,
        })
    }

    async fn list_notifications(
        &self,
        recipient: UserId,
        unread_only: bool,
    ) -> MarketResult<Vec<Notification>> {
        let found = sqlx::query(&format!(
            r#"
            select {NOTIFICATION_COLS} from notifications
            where recipient_id = $1 and (not $2 or read = false)
            order by id desc
            "#
        ))
        .bind(recipient)
        .bind(unread_only)
        .fetch_all(&self.pool)
        .await
        .context("list notifications")?;
        Ok(found.iter().map(rows::notification).collect::<anyhow::Result<Vec<_>>>()?)
    }

    async fn mark_notification_read(
        &self,
        id: NotificationId,
        actor: &Actor,
    ) -> MarketResult<Notification> {
        let row = sqlx::query(&format!(
            "select {NOTIFICATION_COLS} from notifications where id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("fetch notification")?;
        let current = match row {
            Some(r) => rows::notification(&r)?,
            None => return Err(MarketError::not_found("notification", id)),
        };
        if current.recipient_id != actor.user_id {
            return Err(MarketError::forbidden(actor, format!("notification {id} is not yours")));
        }

        let row = sqlx::query(&format!(
            "update notifications set read = true where id = $1 returning {NOTIFICATION_COLS}"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .context("mark notification read")?;
        Ok(rows::notification(&row)?)
    }

    async fn occupancy_snapshot(&self) -> MarketResult<OccupancySnapshot> {
        let mut tx = self.pool.begin().await.context("begin snapshot tx")?;
        sqlx::query("set transaction isolation level repeatable read, read only")
            .execute(&mut *tx)
            .await
            .context("set snapshot isolation")?;

        let houses: Vec<(i64, String)> = sqlx::query_as("select id, status from houses")
            .fetch_all(&mut *tx)
            .await
            .context("snapshot houses")?;
        let leases: Vec<(i64, i64, String)> = sqlx::query_as(
            "select id, house_id, status from orders \
             where status not in ('CANCELED','TERMINATED','COMPLETED')",
        )
        .fetch_all(&mut *tx)
        .await
        .context("snapshot orders")?;
        tx.commit().await.context("end snapshot tx")?;

        let mut snap = OccupancySnapshot::empty();
        for (id, status) in houses {
            snap = snap.with_house(id, HouseStatus::parse(&status).context("snapshot house status")?);
        }
        for (order_id, house_id, status) in leases {
            let status = OrderStatus::parse(&status).context("snapshot order status")?;
            snap = snap.with_lease(order_id, house_id, status);
        }
        Ok(snap)
    }

    async fn release_house_if_vacant(
        &self,
        house_id: HouseId,
        meta: &RequestMeta,
    ) -> MarketResult<bool> {
        let mut tx = self.pool.begin().await.context("begin release tx")?;
        let house = lock_house(&mut tx, house_id).await?;
        if house.status != HouseStatus::Rented {
            return Ok(false);
        }
        // Re-read leases with the house lock held.
        if !in_force_orders(&mut tx, house_id, None).await?.is_empty() {
            return Ok(false);
        }
        set_house_status(&mut tx, house_id, HouseStatus::Approved, meta.now).await?;
        tx.commit().await.context("commit release tx")?;
        Ok(true)
    }

    async fn leases_due_for_completion(&self, today: NaiveDate) -> MarketResult<Vec<Order>> {
        let found = sqlx::query(&format!(
            r#"
            select {ORDER_COLS} from orders
            where (status = 'ACTIVE' and end_date <= $1)
               or (status = 'TERMINATE_APPROVED'
                   and coalesce(requested_terminate_date, end_date) <= $1)
            order by id
            "#
        ))
        .bind(today)
        .fetch_all(&self.pool)
        .await
        .context("query due leases")?;
        Ok(found.iter().map(rows::order).collect::<anyhow::Result<Vec<_>>>()?)
    }

    async fn status_counts(&self) -> MarketResult<StatusCounts> {
        Ok(StatusCounts {
            houses: count_by_status(&self.pool, "houses").await?,
            orders: count_by_status(&self.pool, "orders").await?,
            appointments: count_by_status(&self.pool, "appointments").await?,
        })
    }
}
