//! Scenario: a lease runs book -> pay -> terminate-request -> approve ->
//! confirm, and the house follows the lease at every step.

use rhm_lifecycle::RequestMeta;
use rhm_schemas::{BookingRequest, HouseStatus, OrderStatus};
use rhm_testkit::{
    admin, date, fixed_now, landlord, listing, mem_market, tenant, LANDLORD_ID, TENANT_ID,
};

#[tokio::test]
async fn early_termination_releases_house() -> anyhow::Result<()> {
    let (_store, market) = mem_market();
    let meta = RequestMeta::at(fixed_now());

    let house = market.create_house(&landlord(), listing("Flat"), &meta).await?;
    assert_eq!(house.status, HouseStatus::Pending);
    market.approve_house(&admin(), house.id, &meta).await?;

    let order = market
        .book_order(
            &tenant(),
            &BookingRequest {
                house_id: house.id,
                start_date: date(2026, 3, 1),
                end_date: date(2027, 3, 1),
            },
            &meta,
        )
        .await?;
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.user_id, TENANT_ID);
    assert_eq!(order.landlord_id, LANDLORD_ID);
    assert_eq!(order.total_amount_cents, 12 * 100_000);
    assert_eq!(order.deposit_amount_cents, 100_000);
    // Booking alone does not take the house.
    assert_eq!(
        market.get_house(&tenant(), house.id).await?.status,
        HouseStatus::Approved
    );

    let paid = market.pay(&tenant(), order.id, &meta).await?;
    assert_eq!(paid.order.status, OrderStatus::Active);
    assert_eq!(paid.order.paid_at, Some(fixed_now()));
    assert_eq!(paid.house.status, HouseStatus::Rented);

    let requested = market
        .request_termination(
            &tenant(),
            order.id,
            "moving".to_string(),
            Some(date(2026, 6, 1)),
            &meta,
        )
        .await?;
    assert_eq!(requested.order.status, OrderStatus::TerminateRequested);
    assert_eq!(requested.order.terminate_reason.as_deref(), Some("moving"));
    assert_eq!(requested.house.status, HouseStatus::Rented);

    let approved = market
        .approve_termination(&landlord(), order.id, Some(500), &meta)
        .await?;
    assert_eq!(approved.order.status, OrderStatus::TerminateApproved);
    assert_eq!(approved.house.status, HouseStatus::Rented);

    let done = market.confirm_termination(&tenant(), order.id, &meta).await?;
    assert_eq!(done.order.status, OrderStatus::Terminated);
    assert_eq!(done.order.penalty_amount_cents, Some(500));
    assert_eq!(done.order.actual_terminate_date, Some(date(2026, 6, 1)));
    assert_eq!(done.house.status, HouseStatus::Approved);

    let history = market.order_history(&tenant(), order.id).await?;
    let steps: Vec<(&str, OrderStatus, OrderStatus)> = history
        .iter()
        .map(|e| (e.action.as_str(), e.from_status, e.to_status))
        .collect();
    assert_eq!(
        steps,
        vec![
            ("pay", OrderStatus::Pending, OrderStatus::Active),
            ("terminate-request", OrderStatus::Active, OrderStatus::TerminateRequested),
            (
                "terminate-approve",
                OrderStatus::TerminateRequested,
                OrderStatus::TerminateApproved
            ),
            (
                "terminate-confirm",
                OrderStatus::TerminateApproved,
                OrderStatus::Terminated
            ),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn rejected_termination_keeps_lease_until_it_completes() -> anyhow::Result<()> {
    let (_store, market) = mem_market();
    let meta = RequestMeta::at(fixed_now());

    let house = market.create_house(&landlord(), listing("Loft"), &meta).await?;
    market.approve_house(&admin(), house.id, &meta).await?;
    let order = market
        .book_order(
            &tenant(),
            &BookingRequest {
                house_id: house.id,
                start_date: date(2026, 3, 1),
                end_date: date(2026, 9, 1),
            },
            &meta,
        )
        .await?;
    market.pay(&tenant(), order.id, &meta).await?;
    market
        .request_termination(&tenant(), order.id, "new job".to_string(), None, &meta)
        .await?;

    let rejected = market
        .reject_termination(&landlord(), order.id, "lease is binding".to_string(), &meta)
        .await?;
    assert_eq!(rejected.order.status, OrderStatus::Active);
    assert_eq!(rejected.via, Some(OrderStatus::TerminateRejected));
    assert_eq!(rejected.order.reject_reason.as_deref(), Some("lease is binding"));
    assert_eq!(rejected.house.status, HouseStatus::Rented);

    // Too early to complete.
    let err = market.complete(&landlord(), order.id, &meta).await.unwrap_err();
    assert_eq!(err.kind(), "validation");

    let at_end = RequestMeta::at(fixed_now() + chrono::Duration::days(184));
    let completed = market.complete(&landlord(), order.id, &at_end).await?;
    assert_eq!(completed.order.status, OrderStatus::Completed);
    assert_eq!(completed.house.status, HouseStatus::Approved);
    Ok(())
}

#[tokio::test]
async fn penalty_defaults_to_deposit_when_landlord_names_none() -> anyhow::Result<()> {
    let (_store, market) = mem_market();
    let meta = RequestMeta::at(fixed_now());

    let house = market.create_house(&landlord(), listing("Studio"), &meta).await?;
    market.approve_house(&admin(), house.id, &meta).await?;
    let order = market
        .book_order(
            &tenant(),
            &BookingRequest {
                house_id: house.id,
                start_date: date(2026, 3, 1),
                end_date: date(2027, 3, 1),
            },
            &meta,
        )
        .await?;
    market.pay(&tenant(), order.id, &meta).await?;
    market
        .request_termination(&tenant(), order.id, "moving".to_string(), None, &meta)
        .await?;
    market.approve_termination(&landlord(), order.id, None, &meta).await?;
    let done = market.confirm_termination(&landlord(), order.id, &meta).await?;

    assert_eq!(done.order.actual_terminate_date, Some(date(2026, 3, 1)));
    assert_eq!(done.order.penalty_amount_cents, Some(order.deposit_amount_cents));
    Ok(())
}

#[tokio::test]
async fn canceled_booking_never_touches_house() -> anyhow::Result<()> {
    let (_store, market) = mem_market();
    let meta = RequestMeta::at(fixed_now());

    let house = market.create_house(&landlord(), listing("Room"), &meta).await?;
    market.approve_house(&admin(), house.id, &meta).await?;
    let order = market
        .book_order(
            &tenant(),
            &BookingRequest {
                house_id: house.id,
                start_date: date(2026, 4, 1),
                end_date: date(2026, 10, 1),
            },
            &meta,
        )
        .await?;

    let canceled = market.cancel(&tenant(), order.id, &meta).await?;
    assert_eq!(canceled.order.status, OrderStatus::Canceled);
    assert_eq!(canceled.house.status, HouseStatus::Approved);
    assert_eq!(market.order_history(&tenant(), order.id).await?.len(), 1);
    Ok(())
}
