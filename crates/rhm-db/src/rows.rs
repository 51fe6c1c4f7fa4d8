//! Row mapping. Status columns are parsed strictly; an unknown token in the
//! database is an error, not a default.

use anyhow::{anyhow, Result};
use rhm_schemas::{
    Appointment, AppointmentStatus, House, HouseStatus, Notification, Order, OrderEvent,
    OrderStatus, Role, Subject,
};
use sqlx::postgres::PgRow;
use sqlx::Row;

pub(crate) const HOUSE_COLS: &str = "id, owner_id, title, city, district, address, price_cents, \
     area_sqm, status, reject_reason, version, created_at, updated_at";

pub(crate) const ORDER_COLS: &str = "id, house_id, user_id, landlord_id, status, \
     total_amount_cents, deposit_amount_cents, start_date, end_date, paid_at, terminate_reason, \
     requested_terminate_date, actual_terminate_date, penalty_amount_cents, reject_reason, \
     version, created_at, updated_at";

pub(crate) const APPOINTMENT_COLS: &str = "id, house_id, user_id, landlord_id, appointment_time, \
     note, status, reject_reason, version, created_at, updated_at";

pub(crate) const NOTIFICATION_COLS: &str =
    "id, recipient_id, kind, subject, subject_id, message, read, created_at";

pub(crate) const EVENT_COLS: &str =
    "order_id, action, from_status, to_status, actor_id, actor_role, request_id, created_at";

pub(crate) fn house(row: &PgRow) -> Result<House> {
    Ok(House {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        title: row.try_get("title")?,
        city: row.try_get("city")?,
        district: row.try_get("district")?,
        address: row.try_get("address")?,
        price_cents: row.try_get("price_cents")?,
        area_sqm: row.try_get("area_sqm")?,
        status: HouseStatus::parse(&row.try_get::<String, _>("status")?)?,
        reject_reason: row.try_get("reject_reason")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) fn order(row: &PgRow) -> Result<Order> {
    Ok(Order {
        id: row.try_get("id")?,
        house_id: row.try_get("house_id")?,
        user_id: row.try_get("user_id")?,
        landlord_id: row.try_get("landlord_id")?,
        status: OrderStatus::parse(&row.try_get::<String, _>("status")?)?,
        total_amount_cents: row.try_get("total_amount_cents")?,
        deposit_amount_cents: row.try_get("deposit_amount_cents")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        paid_at: row.try_get("paid_at")?,
        terminate_reason: row.try_get("terminate_reason")?,
        requested_terminate_date: row.try_get("requested_terminate_date")?,
        actual_terminate_date: row.try_get("actual_terminate_date")?,
        penalty_amount_cents: row.try_get("penalty_amount_cents")?,
        reject_reason: row.try_get("reject_reason")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) fn appointment(row: &PgRow) -> Result<Appointment> {
    Ok(Appointment {
        id: row.try_get("id")?,
        house_id: row.try_get("house_id")?,
        user_id: row.try_get("user_id")?,
        landlord_id: row.try_get("landlord_id")?,
        appointment_time: row.try_get("appointment_time")?,
        note: row.try_get("note")?,
        status: AppointmentStatus::parse(&row.try_get::<String, _>("status")?)?,
        reject_reason: row.try_get("reject_reason")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) fn notification(row: &PgRow) -> Result<Notification> {
    let subject: String = row.try_get("subject")?;
    Ok(Notification {
        id: row.try_get("id")?,
        recipient_id: row.try_get("recipient_id")?,
        kind: row.try_get("kind")?,
        subject: Subject::parse(&subject).ok_or_else(|| anyhow!("invalid subject: {subject:?}"))?,
        subject_id: row.try_get("subject_id")?,
        message: row.try_get("message")?,
        read: row.try_get("read")?,
        created_at: row.try_get("created_at")?,
    })
}

pub(crate) fn order_event(row: &PgRow) -> Result<OrderEvent> {
    let role: String = row.try_get("actor_role")?;
    Ok(OrderEvent {
        order_id: row.try_get("order_id")?,
        action: row.try_get("action")?,
        from_status: OrderStatus::parse(&row.try_get::<String, _>("from_status")?)?,
        to_status: OrderStatus::parse(&row.try_get::<String, _>("to_status")?)?,
        actor_id: row.try_get("actor_id")?,
        actor_role: Role::parse(&role).ok_or_else(|| anyhow!("invalid actor role: {role:?}"))?,
        request_id: row.try_get("request_id")?,
        created_at: row.try_get("created_at")?,
    })
}
