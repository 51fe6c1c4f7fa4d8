//! Lease state machine.
//!
//! # Design
//!
//! Every lease event is planned by [`plan_lease`], a pure function over the
//! current order, its house and the acting caller. The plan carries the new
//! order record, the house status to write (if any) and the notices to emit.
//! Stores execute a plan inside one transaction that holds both row locks,
//! which makes the planner the only writer of order and house status.
//!
//! Two invariants hold for every plan:
//!
//! 1. **Legal transitions only.** Illegal events return
//!    [`MarketError::InvalidState`] and nothing is written.
//! 2. **House follows lease.** A transition ending in ACTIVE writes RENTED;
//!    a transition into a terminal state releases the house to APPROVED
//!    unless it was independently taken OFFLINE or DELETED.
//!
//! # State diagram
//!
//! ```text
//!   book ──► Pending ──pay──► Active ◄────────────── reject (via TerminateRejected)
//!               │               │  │                          │
//!            cancel             │  terminate-request           │
//!               ▼               │  ▼                           │
//!          Canceled (term.)     │ TerminateRequested ─────────┘
//!                               │  │
//!                 complete      │  approve
//!                 (end reached) │  ▼
//!                               │ TerminateApproved ──confirm──► Terminated (term.)
//!                               ▼
//!                          Completed (term.)
//! ```

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rhm_schemas::{
    Actor, BookingRequest, House, HouseStatus, NewNotice, NewOrder, Order, OrderEvent, OrderId,
    OrderStatus, Role, Subject,
};
use serde::{Deserialize, Serialize};

use crate::error::MarketError;
use crate::policy::{LeasePolicy, PenaltyPolicy};

const MAX_REASON_LEN: usize = 500;

// ---------------------------------------------------------------------------
// LeaseEvent
// ---------------------------------------------------------------------------

/// Events that drive an order through its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LeaseEvent {
    /// Tenant paid (PENDING → ACTIVE).
    Pay,
    /// Tenant or admin abandoned an unpaid booking (PENDING → CANCELED).
    Cancel,
    /// Tenant asks to leave early (ACTIVE → TERMINATE_REQUESTED).
    RequestTermination {
        reason: String,
        /// Move-out date; defaults to the day of the request.
        requested_date: Option<NaiveDate>,
    },
    /// Landlord accepts the early end, optionally naming a penalty.
    ApproveTermination { penalty_cents: Option<i64> },
    /// Landlord refuses the early end; the lease continues.
    RejectTermination { reason: String },
    /// Move-out confirmed (TERMINATE_APPROVED → TERMINATED).
    ConfirmTermination,
    /// Contractual end reached (ACTIVE → COMPLETED).
    Complete,
}

impl LeaseEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LeaseEvent::Pay => "pay",
            LeaseEvent::Cancel => "cancel",
            LeaseEvent::RequestTermination { .. } => "terminate-request",
            LeaseEvent::ApproveTermination { .. } => "terminate-approve",
            LeaseEvent::RejectTermination { .. } => "terminate-reject",
            LeaseEvent::ConfirmTermination => "terminate-confirm",
            LeaseEvent::Complete => "complete",
        }
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Everything the planner needs besides the order itself.
#[derive(Debug, Clone, Copy)]
pub struct LeaseContext<'a> {
    pub house: &'a House,
    /// Another in-force order on the same house, if the store found one.
    pub other_occupant: Option<OrderId>,
    pub now: DateTime<Utc>,
}

impl LeaseContext<'_> {
    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }
}

/// The writes a store must perform atomically for one lease event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeasePlan {
    /// Updated order. `version` is left for the store to bump.
    pub order: Order,
    pub from: OrderStatus,
    /// Intermediate status recorded for the event but not persisted
    /// (TERMINATE_REJECTED on a rejection).
    pub via: Option<OrderStatus>,
    /// New house status, when the house changes.
    pub house_status: Option<HouseStatus>,
    pub notices: Vec<NewNotice>,
}

/// Plan one lease event. Pure: `order` and `ctx` are never mutated.
///
/// # Errors
/// `Forbidden` when the actor may not perform the event on this order,
/// `InvalidState` when the order's status does not permit it,
/// `Validation` / `Conflict` for bad input or an unavailable house.
pub fn plan_lease(
    order: &Order,
    actor: &Actor,
    event: &LeaseEvent,
    ctx: &LeaseContext<'_>,
    policy: &LeasePolicy,
) -> Result<LeasePlan, MarketError> {
    authorize(order, actor, event)?;

    use LeaseEvent::*;
    use OrderStatus::*;

    let from = order.status;
    let mut next = order.clone();
    let mut house_status = None;
    let mut via = None;
    let mut notices = Vec::new();

    match (from, event) {
        (Pending, Pay) => {
            if !ctx.house.status.is_rentable() {
                return Err(MarketError::conflict(format!(
                    "house {} is not available for rent (status {})",
                    ctx.house.id, ctx.house.status
                )));
            }
            if ctx.today() >= order.end_date {
                return Err(MarketError::validation(format!(
                    "lease period ended on {}; book again",
                    order.end_date
                )));
            }
            if let Some(other) = ctx.other_occupant {
                return Err(MarketError::conflict(format!(
                    "house {} is already let under order {other}",
                    ctx.house.id
                )));
            }
            next.status = Active;
            next.paid_at = Some(ctx.now);
            house_status = Some(HouseStatus::Rented);
            notices.push(notice(
                order.landlord_id,
                "order.paid",
                order,
                format!("Order {} for house {} has been paid", order.id, order.house_id),
            ));
        }

        (Pending, Cancel) => {
            next.status = Canceled;
            let recipient = if actor.user_id == order.user_id {
                order.landlord_id
            } else {
                order.user_id
            };
            notices.push(notice(
                recipient,
                "order.canceled",
                order,
                format!("Order {} was canceled", order.id),
            ));
        }

        (Active, RequestTermination { reason, requested_date }) => {
            let reason = required_text("reason", reason)?;
            let requested = requested_date.unwrap_or_else(|| ctx.today());
            if requested < ctx.today() {
                return Err(MarketError::validation(
                    "requested_date must not be in the past",
                ));
            }
            if requested >= order.end_date {
                return Err(MarketError::validation(format!(
                    "requested_date {requested} is not before the lease end {}; the lease completes on its own",
                    order.end_date
                )));
            }
            next.status = TerminateRequested;
            next.terminate_reason = Some(reason);
            next.requested_terminate_date = Some(requested);
            next.reject_reason = None;
            next.penalty_amount_cents = None;
            notices.push(notice(
                order.landlord_id,
                "order.terminate_requested",
                order,
                format!(
                    "Tenant asked to end order {} early on {requested}",
                    order.id
                ),
            ));
        }

        (TerminateRequested, ApproveTermination { penalty_cents }) => {
            if let Some(p) = penalty_cents {
                if *p < 0 {
                    return Err(MarketError::validation("penalty_cents must be >= 0"));
                }
            }
            next.status = TerminateApproved;
            next.penalty_amount_cents = *penalty_cents;
            notices.push(notice(
                order.user_id,
                "order.terminate_approved",
                order,
                format!("Early termination of order {} was approved", order.id),
            ));
        }

        (TerminateRequested, RejectTermination { reason }) => {
            let reason = required_text("reason", reason)?;
            next.status = Active;
            via = Some(TerminateRejected);
            next.reject_reason = Some(reason);
            next.requested_terminate_date = None;
            next.penalty_amount_cents = None;
            notices.push(notice(
                order.user_id,
                "order.terminate_rejected",
                order,
                format!("Early termination of order {} was rejected", order.id),
            ));
        }

        (TerminateApproved, ConfirmTermination) => {
            let actual = order.requested_terminate_date.unwrap_or_else(|| ctx.today());
            next.status = Terminated;
            next.actual_terminate_date = Some(actual);
            next.penalty_amount_cents = Some(early_termination_penalty(order, actual, policy));
            house_status = released_house_status(ctx.house);
            for recipient in counterparts(order, actor) {
                notices.push(notice(
                    recipient,
                    "order.terminated",
                    order,
                    format!("Order {} terminated on {actual}", order.id),
                ));
            }
        }

        (Active, Complete) => {
            if ctx.today() < order.end_date {
                return Err(MarketError::validation(format!(
                    "lease end {} not reached",
                    order.end_date
                )));
            }
            next.status = Completed;
            house_status = released_house_status(ctx.house);
            for recipient in [order.user_id, order.landlord_id] {
                notices.push(notice(
                    recipient,
                    "order.completed",
                    order,
                    format!("Order {} completed on {}", order.id, order.end_date),
                ));
            }
        }

        (state, ev) => {
            return Err(MarketError::invalid_state("order", order.id, state, ev.name()));
        }
    }

    next.updated_at = ctx.now;

    Ok(LeasePlan {
        order: next,
        from,
        via,
        house_status,
        notices,
    })
}

fn authorize(order: &Order, actor: &Actor, event: &LeaseEvent) -> Result<(), MarketError> {
    let is_tenant = actor.role == Role::Tenant && actor.user_id == order.user_id;
    let is_landlord = actor.role == Role::Landlord && actor.user_id == order.landlord_id;
    let privileged = actor.is_privileged();

    let allowed = match event {
        LeaseEvent::Pay | LeaseEvent::RequestTermination { .. } => is_tenant,
        LeaseEvent::Cancel => is_tenant || privileged,
        LeaseEvent::ApproveTermination { .. } | LeaseEvent::RejectTermination { .. } => {
            is_landlord || privileged
        }
        LeaseEvent::ConfirmTermination => is_tenant || is_landlord || privileged,
        LeaseEvent::Complete => is_landlord || privileged,
    };

    if allowed {
        Ok(())
    } else {
        Err(MarketError::forbidden(
            actor,
            format!("may not {} order {}", event.name(), order.id),
        ))
    }
}

/// Accept a repeated request id only as a retry of the same call.
///
/// `prior` is the event already recorded under the id. The caller must be
/// allowed to send `event` at all, and must be the same caller sending the
/// same event; anything else reusing the key is a `Conflict`.
pub fn check_replay(
    order: &Order,
    prior: &OrderEvent,
    actor: &Actor,
    event: &LeaseEvent,
) -> Result<(), MarketError> {
    authorize(order, actor, event)?;
    let same_caller = prior.actor_id == actor.user_id && prior.actor_role == actor.role;
    if prior.action != event.name() || !same_caller {
        return Err(MarketError::conflict(format!(
            "idempotency key reused for a different request on order {} (recorded {} by {}#{})",
            order.id,
            prior.action,
            prior.actor_role.as_str(),
            prior.actor_id
        )));
    }
    Ok(())
}

/// House status after the lease leaves the house, or `None` to leave it as is.
pub fn released_house_status(house: &House) -> Option<HouseStatus> {
    match house.status {
        HouseStatus::Offline | HouseStatus::Deleted | HouseStatus::Approved => None,
        _ => Some(HouseStatus::Approved),
    }
}

/// Parties to notify about an event, excluding whoever caused it.
fn counterparts(order: &Order, actor: &Actor) -> Vec<i64> {
    [order.user_id, order.landlord_id]
        .into_iter()
        .filter(|id| *id != actor.user_id || actor.is_privileged())
        .collect()
}

fn notice(recipient_id: i64, kind: &str, order: &Order, message: String) -> NewNotice {
    NewNotice {
        recipient_id,
        kind: kind.to_string(),
        subject: Subject::Order,
        subject_id: order.id,
        message,
    }
}

pub(crate) fn required_text(field: &str, value: &str) -> Result<String, MarketError> {
    let v = value.trim();
    if v.is_empty() {
        return Err(MarketError::validation(format!("{field} is required")));
    }
    if v.chars().count() > MAX_REASON_LEN {
        return Err(MarketError::validation(format!(
            "{field} exceeds {MAX_REASON_LEN} characters"
        )));
    }
    Ok(v.to_string())
}

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

/// Whole months covered by `[start, end)`, rounding a partial month up.
pub fn lease_months(start: NaiveDate, end: NaiveDate) -> i64 {
    let mut months = i64::from(end.year() - start.year()) * 12 + i64::from(end.month())
        - i64::from(start.month());
    if end.day() > start.day() {
        months += 1;
    }
    months.max(1)
}

/// Monthly rent implied by an order's total.
pub fn monthly_rent(order: &Order) -> i64 {
    order.total_amount_cents / lease_months(order.start_date, order.end_date)
}

/// Informational penalty for a lease ending on `actual`.
///
/// Zero unless `actual` falls before the contractual end. The landlord's
/// figure from the approval wins; otherwise the policy default applies.
pub fn early_termination_penalty(order: &Order, actual: NaiveDate, policy: &LeasePolicy) -> i64 {
    if actual >= order.end_date {
        return 0;
    }
    if let Some(p) = order.penalty_amount_cents {
        return p;
    }
    match policy.default_penalty {
        PenaltyPolicy::None => 0,
        PenaltyPolicy::Deposit => order.deposit_amount_cents,
        PenaltyPolicy::MonthsOfRent { months } => monthly_rent(order).saturating_mul(months),
    }
}

/// Validate and price a booking. The order starts PENDING; the house is untouched.
pub fn plan_booking(
    house: &House,
    actor: &Actor,
    req: &BookingRequest,
    policy: &LeasePolicy,
    today: NaiveDate,
) -> Result<NewOrder, MarketError> {
    if actor.role != Role::Tenant {
        return Err(MarketError::forbidden(actor, "only tenants can book a house"));
    }
    if actor.user_id == house.owner_id {
        return Err(MarketError::validation("cannot book your own house"));
    }
    if !house.status.is_rentable() {
        return Err(MarketError::conflict(format!(
            "house {} is not available for rent (status {})",
            house.id, house.status
        )));
    }
    if req.start_date < today {
        return Err(MarketError::validation("start_date must not be in the past"));
    }
    if req.end_date <= req.start_date {
        return Err(MarketError::validation("end_date must be after start_date"));
    }

    let months = lease_months(req.start_date, req.end_date);
    if months > policy.max_lease_months {
        return Err(MarketError::validation(format!(
            "lease of {months} months exceeds the maximum of {}",
            policy.max_lease_months
        )));
    }

    let total = house
        .price_cents
        .checked_mul(months)
        .ok_or_else(|| MarketError::validation("total amount overflows"))?;
    let deposit = house
        .price_cents
        .checked_mul(policy.deposit_months)
        .ok_or_else(|| MarketError::validation("deposit amount overflows"))?;

    Ok(NewOrder {
        house_id: house.id,
        user_id: actor.user_id,
        landlord_id: house.owner_id,
        total_amount_cents: total,
        deposit_amount_cents: deposit,
        start_date: req.start_date,
        end_date: req.end_date,
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const TENANT: i64 = 7;
    const LANDLORD: i64 = 3;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn house(status: HouseStatus) -> House {
        House {
            id: 42,
            owner_id: LANDLORD,
            title: "Two-bed flat".to_string(),
            city: "Lisbon".to_string(),
            district: "Alfama".to_string(),
            address: "Rua 1".to_string(),
            price_cents: 100_000,
            area_sqm: 70,
            status,
            reject_reason: None,
            version: 1,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn order(status: OrderStatus) -> Order {
        Order {
            id: 1,
            house_id: 42,
            user_id: TENANT,
            landlord_id: LANDLORD,
            status,
            total_amount_cents: 1_200_000,
            deposit_amount_cents: 100_000,
            start_date: date(2026, 1, 1),
            end_date: date(2027, 1, 1),
            paid_at: None,
            terminate_reason: None,
            requested_terminate_date: None,
            actual_terminate_date: None,
            penalty_amount_cents: None,
            reject_reason: None,
            version: 1,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn plan(
        o: &Order,
        h: &House,
        actor: Actor,
        ev: LeaseEvent,
    ) -> Result<LeasePlan, MarketError> {
        let ctx = LeaseContext {
            house: h,
            other_occupant: None,
            now: now(),
        };
        plan_lease(o, &actor, &ev, &ctx, &LeasePolicy::default())
    }

    #[test]
    fn pay_activates_and_rents_the_house() {
        let p = plan(
            &order(OrderStatus::Pending),
            &house(HouseStatus::Approved),
            Actor::tenant(TENANT),
            LeaseEvent::Pay,
        )
        .unwrap();
        assert_eq!(p.from, OrderStatus::Pending);
        assert_eq!(p.order.status, OrderStatus::Active);
        assert_eq!(p.order.paid_at, Some(now()));
        assert_eq!(p.house_status, Some(HouseStatus::Rented));
        assert_eq!(p.notices[0].recipient_id, LANDLORD);
    }

    #[test]
    fn pay_after_the_lease_period_is_refused() {
        let mut o = order(OrderStatus::Pending);
        o.start_date = date(2025, 6, 1);
        o.end_date = date(2026, 3, 1);
        let err = plan(&o, &house(HouseStatus::Approved), Actor::tenant(TENANT), LeaseEvent::Pay)
            .unwrap_err();
        assert_eq!(err.kind(), "validation", "{err}");
    }

    fn recorded(action: &str, actor: Actor) -> OrderEvent {
        OrderEvent {
            order_id: 1,
            action: action.to_string(),
            from_status: OrderStatus::TerminateRequested,
            to_status: OrderStatus::TerminateApproved,
            actor_id: actor.user_id,
            actor_role: actor.role,
            request_id: Some("k1".to_string()),
            created_at: now(),
        }
    }

    #[test]
    fn replay_requires_same_caller_and_same_event() {
        let o = order(OrderStatus::TerminateApproved);
        let approve = LeaseEvent::ApproveTermination { penalty_cents: None };
        let prior = recorded("terminate-approve", Actor::landlord(LANDLORD));

        assert!(check_replay(&o, &prior, &Actor::landlord(LANDLORD), &approve).is_ok());

        let err = check_replay(&o, &prior, &Actor::tenant(TENANT), &LeaseEvent::ConfirmTermination)
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");

        // Admin may approve, but did not send the recorded request.
        let err = check_replay(&o, &prior, &Actor::admin(1), &approve).unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn replay_by_outsider_is_forbidden_not_answered() {
        let o = order(OrderStatus::Canceled);
        let prior = recorded("cancel", Actor::tenant(TENANT));
        let err = check_replay(&o, &prior, &Actor::tenant(999), &LeaseEvent::Cancel).unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[test]
    fn pay_on_non_pending_order_is_invalid_state() {
        for st in [OrderStatus::Active, OrderStatus::Canceled, OrderStatus::Terminated] {
            let err = plan(
                &order(st),
                &house(HouseStatus::Rented),
                Actor::tenant(TENANT),
                LeaseEvent::Pay,
            )
            .unwrap_err();
            assert!(err.is_invalid_state(), "{st}: {err}");
        }
    }

    #[test]
    fn pay_requires_available_house_and_no_other_occupant() {
        let o = order(OrderStatus::Pending);
        let err = plan(&o, &house(HouseStatus::Offline), Actor::tenant(TENANT), LeaseEvent::Pay)
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");

        let h = house(HouseStatus::Online);
        let ctx = LeaseContext {
            house: &h,
            other_occupant: Some(99),
            now: now(),
        };
        let err = plan_lease(
            &o,
            &Actor::tenant(TENANT),
            &LeaseEvent::Pay,
            &ctx,
            &LeasePolicy::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("order 99"));
    }

    #[test]
    fn only_the_tenant_may_pay() {
        let o = order(OrderStatus::Pending);
        let h = house(HouseStatus::Approved);
        for actor in [Actor::tenant(8), Actor::landlord(LANDLORD), Actor::admin(1)] {
            let err = plan(&o, &h, actor, LeaseEvent::Pay).unwrap_err();
            assert_eq!(err.kind(), "forbidden");
        }
    }

    #[test]
    fn terminate_approve_only_from_terminate_requested() {
        let h = house(HouseStatus::Rented);
        for st in [OrderStatus::Active, OrderStatus::Terminated, OrderStatus::Pending] {
            let err = plan(
                &order(st),
                &h,
                Actor::landlord(LANDLORD),
                LeaseEvent::ApproveTermination {
                    penalty_cents: Some(500),
                },
            )
            .unwrap_err();
            assert!(err.is_invalid_state());
        }
    }

    #[test]
    fn reject_returns_to_active_via_terminate_rejected() {
        let mut o = order(OrderStatus::TerminateRequested);
        o.requested_terminate_date = Some(date(2026, 6, 1));
        let p = plan(
            &o,
            &house(HouseStatus::Rented),
            Actor::landlord(LANDLORD),
            LeaseEvent::RejectTermination {
                reason: "contract is binding".to_string(),
            },
        )
        .unwrap();
        assert_eq!(p.order.status, OrderStatus::Active);
        assert_eq!(p.via, Some(OrderStatus::TerminateRejected));
        assert_eq!(p.order.reject_reason.as_deref(), Some("contract is binding"));
        assert_eq!(p.order.requested_terminate_date, None);
        assert_eq!(p.house_status, None);
    }

    #[test]
    fn request_termination_validates_reason_and_date() {
        let o = order(OrderStatus::Active);
        let h = house(HouseStatus::Rented);
        let err = plan(
            &o,
            &h,
            Actor::tenant(TENANT),
            LeaseEvent::RequestTermination {
                reason: "   ".to_string(),
                requested_date: None,
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), "validation");

        let err = plan(
            &o,
            &h,
            Actor::tenant(TENANT),
            LeaseEvent::RequestTermination {
                reason: "moving".to_string(),
                requested_date: Some(date(2027, 2, 1)),
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("not before the lease end"));

        let p = plan(
            &o,
            &h,
            Actor::tenant(TENANT),
            LeaseEvent::RequestTermination {
                reason: "moving".to_string(),
                requested_date: None,
            },
        )
        .unwrap();
        assert_eq!(p.order.requested_terminate_date, Some(date(2026, 3, 1)));
    }

    #[test]
    fn confirm_releases_house_and_keeps_landlord_penalty_when_early() {
        let mut o = order(OrderStatus::TerminateApproved);
        o.requested_terminate_date = Some(date(2026, 6, 1));
        o.penalty_amount_cents = Some(500);
        let p = plan(
            &o,
            &house(HouseStatus::Rented),
            Actor::tenant(TENANT),
            LeaseEvent::ConfirmTermination,
        )
        .unwrap();
        assert_eq!(p.order.status, OrderStatus::Terminated);
        assert_eq!(p.order.actual_terminate_date, Some(date(2026, 6, 1)));
        assert_eq!(p.order.penalty_amount_cents, Some(500));
        assert_eq!(p.house_status, Some(HouseStatus::Approved));
        assert_eq!(p.notices.len(), 1);
        assert_eq!(p.notices[0].recipient_id, LANDLORD);
    }

    #[test]
    fn confirm_does_not_touch_withdrawn_house() {
        let o = order(OrderStatus::TerminateApproved);
        for st in [HouseStatus::Offline, HouseStatus::Deleted] {
            let p = plan(&o, &house(st), Actor::admin(1), LeaseEvent::ConfirmTermination).unwrap();
            assert_eq!(p.house_status, None);
            assert_eq!(p.notices.len(), 2);
        }
    }

    #[test]
    fn default_penalty_policy_applies_when_landlord_names_none() {
        let o = order(OrderStatus::TerminateApproved);
        let mut policy = LeasePolicy::default();
        assert_eq!(early_termination_penalty(&o, date(2026, 6, 1), &policy), 100_000);

        policy.default_penalty = PenaltyPolicy::MonthsOfRent { months: 2 };
        assert_eq!(early_termination_penalty(&o, date(2026, 6, 1), &policy), 200_000);

        policy.default_penalty = PenaltyPolicy::None;
        assert_eq!(early_termination_penalty(&o, date(2026, 6, 1), &policy), 0);
    }

    #[test]
    fn no_penalty_when_termination_is_not_early() {
        let mut o = order(OrderStatus::TerminateApproved);
        o.penalty_amount_cents = Some(500);
        assert_eq!(
            early_termination_penalty(&o, o.end_date, &LeasePolicy::default()),
            0
        );
    }

    #[test]
    fn complete_requires_lease_end() {
        let o = order(OrderStatus::Active);
        let h = house(HouseStatus::Rented);
        let err = plan(&o, &h, Actor::system(), LeaseEvent::Complete).unwrap_err();
        assert_eq!(err.kind(), "validation");

        let mut ended = o.clone();
        ended.end_date = date(2026, 3, 1);
        let p = plan(&ended, &h, Actor::system(), LeaseEvent::Complete).unwrap();
        assert_eq!(p.order.status, OrderStatus::Completed);
        assert_eq!(p.house_status, Some(HouseStatus::Approved));
    }

    #[test]
    fn failed_plan_leaves_input_untouched() {
        let o = order(OrderStatus::Active);
        let before = o.clone();
        let _ = plan(&o, &house(HouseStatus::Rented), Actor::tenant(TENANT), LeaseEvent::Pay);
        assert_eq!(o, before);
    }

    #[test]
    fn lease_months_rounds_partial_months_up() {
        assert_eq!(lease_months(date(2026, 1, 1), date(2026, 7, 1)), 6);
        assert_eq!(lease_months(date(2026, 1, 1), date(2026, 1, 15)), 1);
        assert_eq!(lease_months(date(2026, 1, 31), date(2026, 2, 28)), 1);
        assert_eq!(lease_months(date(2026, 1, 10), date(2027, 1, 11)), 13);
    }

    #[test]
    fn booking_prices_rent_and_deposit() {
        let h = house(HouseStatus::Online);
        let req = BookingRequest {
            house_id: 42,
            start_date: date(2026, 4, 1),
            end_date: date(2026, 10, 1),
        };
        let o = plan_booking(&h, &Actor::tenant(TENANT), &req, &LeasePolicy::default(), date(2026, 3, 1))
            .unwrap();
        assert_eq!(o.total_amount_cents, 600_000);
        assert_eq!(o.deposit_amount_cents, 100_000);
        assert_eq!(o.landlord_id, LANDLORD);
    }

    #[test]
    fn booking_rejects_own_house_and_bad_periods() {
        let h = house(HouseStatus::Approved);
        let today = date(2026, 3, 1);
        let policy = LeasePolicy::default();
        let good = BookingRequest {
            house_id: 42,
            start_date: date(2026, 4, 1),
            end_date: date(2026, 5, 1),
        };

        let err = plan_booking(&h, &Actor::new(LANDLORD, Role::Tenant), &good, &policy, today)
            .unwrap_err();
        assert_eq!(err.kind(), "validation");

        let backwards = BookingRequest {
            end_date: date(2026, 3, 15),
            ..good.clone()
        };
        assert!(plan_booking(&h, &Actor::tenant(TENANT), &backwards, &policy, today).is_err());

        let err = plan_booking(&house(HouseStatus::Pending), &Actor::tenant(TENANT), &good, &policy, today)
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");

        let err = plan_booking(&h, &Actor::landlord(9), &good, &policy, today).unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }
}
