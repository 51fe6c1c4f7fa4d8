//! Scenario: an event that is illegal in the current status, or that the
//! caller may not perform, changes nothing: order, house, history and
//! notifications are all left as they were.

use rhm_lifecycle::{LeaseEvent, LeasePolicy, MarketStore, RequestMeta};
use rhm_schemas::{Actor, BookingRequest, HouseStatus, OrderId, OrderStatus};
use rhm_testkit::{
    date, fixed_now, landlord, seed_active_lease, seed_approved_house, tenant, MemStore,
    LANDLORD_ID, TENANT_ID,
};

fn all_events() -> Vec<LeaseEvent> {
    vec![
        LeaseEvent::Pay,
        LeaseEvent::Cancel,
        request_termination(),
        LeaseEvent::ApproveTermination {
            penalty_cents: Some(500),
        },
        LeaseEvent::RejectTermination {
            reason: "no".to_string(),
        },
        LeaseEvent::ConfirmTermination,
        LeaseEvent::Complete,
    ]
}

/// An actor that passes authorization for `event`, so only the status decides.
fn authorized_actor(event: &LeaseEvent) -> Actor {
    match event {
        LeaseEvent::ApproveTermination { .. }
        | LeaseEvent::RejectTermination { .. }
        | LeaseEvent::Complete => landlord(),
        _ => tenant(),
    }
}

fn legal(status: OrderStatus, event: &LeaseEvent) -> bool {
    use OrderStatus::*;
    matches!(
        (status, event),
        (Pending, LeaseEvent::Pay)
            | (Pending, LeaseEvent::Cancel)
            | (Active, LeaseEvent::RequestTermination { .. })
            | (Active, LeaseEvent::Complete)
            | (TerminateRequested, LeaseEvent::ApproveTermination { .. })
            | (TerminateRequested, LeaseEvent::RejectTermination { .. })
            | (TerminateApproved, LeaseEvent::ConfirmTermination)
    )
}

async fn assert_rejected_without_writes(
    store: &MemStore,
    order_id: OrderId,
    actor: &Actor,
    event: &LeaseEvent,
) -> anyhow::Result<()> {
    let policy = LeasePolicy::default();
    let meta = RequestMeta::at(fixed_now());
    let order = store.get_order(order_id).await?;
    let house = store.get_house(order.house_id).await?;
    let history = store.order_history(order_id).await?;
    let landlord_inbox = store.list_notifications(LANDLORD_ID, false).await?;
    let tenant_inbox = store.list_notifications(TENANT_ID, false).await?;

    let res = store
        .apply_lease_event(order_id, actor, event, &policy, &meta)
        .await;
    assert!(res.is_err(), "{} from {} should be refused", event.name(), order.status);

    assert_eq!(store.get_order(order_id).await?, order);
    assert_eq!(store.get_house(order.house_id).await?, house);
    assert_eq!(store.order_history(order_id).await?, history);
    assert_eq!(store.list_notifications(LANDLORD_ID, false).await?, landlord_inbox);
    assert_eq!(store.list_notifications(TENANT_ID, false).await?, tenant_inbox);
    Ok(())
}

/// Drive a fresh lease on a fresh house into `target`.
async fn park(store: &MemStore, target: OrderStatus) -> anyhow::Result<OrderId> {
    let policy = LeasePolicy::default();
    let meta = RequestMeta::at(fixed_now());
    let house = seed_approved_house(store, LANDLORD_ID, fixed_now()).await?;

    let steps: Vec<(Actor, LeaseEvent)> = match target {
        OrderStatus::Pending => vec![],
        OrderStatus::Canceled => vec![(tenant(), LeaseEvent::Cancel)],
        OrderStatus::Active => vec![(tenant(), LeaseEvent::Pay)],
        OrderStatus::TerminateRequested => vec![
            (tenant(), LeaseEvent::Pay),
            (tenant(), request_termination()),
        ],
        OrderStatus::TerminateApproved => vec![
            (tenant(), LeaseEvent::Pay),
            (tenant(), request_termination()),
            (landlord(), LeaseEvent::ApproveTermination { penalty_cents: None }),
        ],
        _ => vec![
            (tenant(), LeaseEvent::Pay),
            (tenant(), request_termination()),
            (landlord(), LeaseEvent::ApproveTermination { penalty_cents: None }),
            (tenant(), LeaseEvent::ConfirmTermination),
        ],
    };

    let order = store
        .book_order(
            &tenant(),
            &BookingRequest {
                house_id: house.id,
                start_date: date(2026, 3, 1),
                end_date: date(2027, 3, 1),
            },
            &policy,
            &meta,
        )
        .await?;
    for (actor, event) in &steps {
        store
            .apply_lease_event(order.id, actor, event, &policy, &meta)
            .await?;
    }
    Ok(order.id)
}

fn request_termination() -> LeaseEvent {
    LeaseEvent::RequestTermination {
        reason: "moving".to_string(),
        requested_date: None,
    }
}

#[tokio::test]
async fn every_illegal_event_is_invalid_state_and_writes_nothing() -> anyhow::Result<()> {
    let store = MemStore::new();
    let policy = LeasePolicy::default();
    let meta = RequestMeta::at(fixed_now());

    let mut parked = Vec::new();
    for target in [
        OrderStatus::Pending,
        OrderStatus::Active,
        OrderStatus::TerminateRequested,
        OrderStatus::TerminateApproved,
        OrderStatus::Terminated,
        OrderStatus::Canceled,
    ] {
        let order_id = park(&store, target).await?;
        assert_eq!(store.get_order(order_id).await?.status, target);
        parked.push((target, order_id));
    }

    for (status, order_id) in parked {
        for event in all_events() {
            if legal(status, &event) {
                continue;
            }
            let actor = authorized_actor(&event);
            let err = store
                .apply_lease_event(order_id, &actor, &event, &policy, &meta)
                .await
                .unwrap_err();
            assert!(
                err.is_invalid_state(),
                "{} from {status}: expected invalid_state, got {err}",
                event.name()
            );
            assert_rejected_without_writes(&store, order_id, &actor, &event).await?;
        }
    }
    Ok(())
}

#[tokio::test]
async fn strangers_and_wrong_roles_are_forbidden_without_writes() -> anyhow::Result<()> {
    let store = MemStore::new();
    let house = seed_approved_house(&store, LANDLORD_ID, fixed_now()).await?;
    let order = seed_active_lease(
        &store,
        house.id,
        TENANT_ID,
        date(2026, 3, 1),
        date(2027, 3, 1),
        fixed_now(),
    )
    .await?;

    let stranger = Actor::tenant(99);
    let request = request_termination();
    assert_rejected_without_writes(&store, order.id, &stranger, &request).await?;
    // The landlord cannot ask to leave on the tenant's behalf.
    assert_rejected_without_writes(&store, order.id, &landlord(), &request).await?;
    // Another landlord cannot complete someone else's lease.
    assert_rejected_without_writes(&store, order.id, &Actor::landlord(98), &LeaseEvent::Complete)
        .await?;

    let err = store
        .apply_lease_event(
            order.id,
            &stranger,
            &request,
            &LeasePolicy::default(),
            &RequestMeta::at(fixed_now()),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "forbidden");
    Ok(())
}

#[tokio::test]
async fn pay_on_withdrawn_house_is_conflict() -> anyhow::Result<()> {
    let store = MemStore::new();
    let policy = LeasePolicy::default();
    let meta = RequestMeta::at(fixed_now());
    let house = seed_approved_house(&store, LANDLORD_ID, fixed_now()).await?;
    let order = store
        .book_order(
            &tenant(),
            &BookingRequest {
                house_id: house.id,
                start_date: date(2026, 3, 1),
                end_date: date(2026, 6, 1),
            },
            &policy,
            &meta,
        )
        .await?;
    store
        .apply_house_action(house.id, &landlord(), &rhm_lifecycle::HouseAction::Offline, &meta)
        .await?;

    let err = store
        .apply_lease_event(order.id, &tenant(), &LeaseEvent::Pay, &policy, &meta)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "conflict");
    assert_eq!(store.get_order(order.id).await?.status, OrderStatus::Pending);
    assert_eq!(store.get_house(house.id).await?.status, HouseStatus::Offline);
    Ok(())
}
