use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rhm_lifecycle::{HouseAction, LeaseEvent, LeasePolicy, Market, MarketStore, RequestMeta};
use rhm_schemas::{Actor, BookingRequest, House, NewHouse, Order, UserId};

use crate::MemStore;

pub const ADMIN_ID: UserId = 1;
pub const LANDLORD_ID: UserId = 3;
pub const TENANT_ID: UserId = 7;

/// Clock used by scenario tests: 2026-03-01 12:00 UTC.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

pub fn tenant() -> Actor {
    Actor::tenant(TENANT_ID)
}

pub fn landlord() -> Actor {
    Actor::landlord(LANDLORD_ID)
}

pub fn admin() -> Actor {
    Actor::admin(ADMIN_ID)
}

/// A valid listing at 1000.00 per month.
pub fn listing(title: &str) -> NewHouse {
    NewHouse {
        title: title.to_string(),
        city: "Lisbon".to_string(),
        district: "Alfama".to_string(),
        address: "Rua das Flores 12".to_string(),
        price_cents: 100_000,
        area_sqm: 70,
    }
}

/// A fresh in-memory store and a service over it with the default policy.
pub fn mem_market() -> (Arc<MemStore>, Market) {
    let store = Arc::new(MemStore::new());
    let market = Market::new(store.clone(), LeasePolicy::default());
    (store, market)
}

/// Create a listing owned by `owner` and approve it.
pub async fn seed_approved_house(
    store: &dyn MarketStore,
    owner: UserId,
    now: DateTime<Utc>,
) -> Result<House> {
    let meta = RequestMeta::at(now);
    let house = store
        .create_house(&Actor::landlord(owner), listing("Seeded flat"), &meta)
        .await?;
    let t = store
        .apply_house_action(house.id, &admin(), &HouseAction::Approve, &meta)
        .await?;
    Ok(t.house)
}

/// Book `[start, end)` for `tenant_id` and pay, as of `now`.
pub async fn seed_active_lease(
    store: &dyn MarketStore,
    house_id: i64,
    tenant_id: UserId,
    start: NaiveDate,
    end: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Order> {
    let meta = RequestMeta::at(now);
    let policy = LeasePolicy::default();
    let tenant = Actor::tenant(tenant_id);
    let order = store
        .book_order(
            &tenant,
            &BookingRequest {
                house_id,
                start_date: start,
                end_date: end,
            },
            &policy,
            &meta,
        )
        .await?;
    let t = store
        .apply_lease_event(order.id, &tenant, &LeaseEvent::Pay, &policy, &meta)
        .await?;
    Ok(t.order)
}
