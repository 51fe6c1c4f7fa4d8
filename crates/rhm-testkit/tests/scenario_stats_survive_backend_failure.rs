//! Scenario: the admin dashboard counts degrade to zeros when the backend
//! is down, while every other operation reports the failure.

use rhm_lifecycle::RequestMeta;
use rhm_schemas::HouseStatus;
use rhm_testkit::{
    admin, fixed_now, landlord, listing, mem_market, seed_approved_house, tenant, LANDLORD_ID,
};

#[tokio::test]
async fn stats_count_by_status_and_default_on_failure() -> anyhow::Result<()> {
    let (store, market) = mem_market();
    seed_approved_house(store.as_ref(), LANDLORD_ID, fixed_now()).await?;
    market
        .create_house(&landlord(), listing("Waiting"), &RequestMeta::at(fixed_now()))
        .await?;

    let counts = market.stats(&admin()).await?;
    assert_eq!(counts.houses.get(HouseStatus::Approved.as_str()), Some(&1));
    assert_eq!(counts.houses.get(HouseStatus::Pending.as_str()), Some(&1));
    assert!(counts.orders.is_empty());

    assert_eq!(market.stats(&tenant()).await.unwrap_err().kind(), "forbidden");

    store.set_unavailable(true);
    let counts = market.stats(&admin()).await?;
    assert_eq!(counts, rhm_schemas::StatusCounts::default());

    let err = market
        .list_houses(&admin(), &rhm_schemas::HouseFilter::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "backend");
    Ok(())
}
