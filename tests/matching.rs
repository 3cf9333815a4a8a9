mod common;

use std::sync::Arc;

use freightline::api::{BidAPI, LoadAPI, MatchingAPI, MessageAPI, NotificationAPI, TripAPI};
use freightline::entities::{
    BidScope, BidStatus, LoadStatus, NewMessage, NotificationKind, NotificationQuery, ReadTarget,
    TripStatus,
};

use common::{bid, carrier, engine, new_bid, post_load, shipper};

#[tokio::test]
async fn shipper_accepts_one_of_two_bids_and_the_trip_runs() {
    let engine = engine();
    let shipper = shipper();
    let carrier_a = carrier();
    let carrier_b = carrier();

    let load = post_load(&engine, &shipper).await;
    assert_eq!(load.status, LoadStatus::Open);

    let bid_a = engine
        .submit_bid(carrier_a.clone(), load.id, new_bid(50_000, 5))
        .await
        .unwrap();
    let bid_b = engine
        .submit_bid(carrier_b.clone(), load.id, new_bid(45_000, 6))
        .await
        .unwrap();

    let bidding = engine.find_load(shipper.clone(), load.id).await.unwrap();
    assert_eq!(bidding.status, LoadStatus::Bidding);

    let trip = engine
        .accept_bid(shipper.clone(), load.id, bid_a.id)
        .await
        .unwrap();
    assert_eq!(trip.carrier_id, carrier_a.id);
    assert_eq!(trip.shipper_id, shipper.id);
    assert_eq!(trip.agreed_amount, 50_000);
    assert_eq!(trip.status, TripStatus::Pending);

    let bids = engine
        .list_bids(shipper.clone(), BidScope::Load(load.id), None)
        .await
        .unwrap();
    let status_of = |id| bids.iter().find(|b| b.id == id).unwrap().status;
    assert_eq!(status_of(bid_a.id), BidStatus::Accepted);
    assert_eq!(status_of(bid_b.id), BidStatus::Rejected);

    let assigned = engine.find_load(shipper.clone(), load.id).await.unwrap();
    assert_eq!(assigned.status, LoadStatus::Assigned);

    engine
        .advance_status(carrier_a.clone(), trip.id, TripStatus::Confirmed)
        .await
        .unwrap();
    engine
        .advance_status(carrier_a.clone(), trip.id, TripStatus::InTransit)
        .await
        .unwrap();

    // only the carrier may deliver
    let err = engine
        .advance_status(shipper.clone(), trip.id, TripStatus::Delivered)
        .await
        .unwrap_err();
    assert!(err.is_forbidden_error());

    let body = NewMessage {
        body: "on the expressway, ETA two hours".into(),
        attachment_url: None,
    };
    engine
        .send_message(carrier_a.clone(), trip.id, body)
        .await
        .unwrap();

    let summary = engine.unread_summary(shipper.clone()).await.unwrap();
    assert_eq!(summary.trips.get(&trip.id), Some(&1));
    assert_eq!(summary.total, 1);

    let marked = engine
        .mark_messages_read(shipper.clone(), trip.id, ReadTarget::All)
        .await
        .unwrap();
    assert_eq!(marked, 1);

    let summary = engine.unread_summary(shipper.clone()).await.unwrap();
    assert_eq!(summary.trips.get(&trip.id), Some(&0));
    assert_eq!(summary.total, 0);
}

#[tokio::test]
async fn acceptance_notifies_winner_and_rejected_bidders() {
    let engine = engine();
    let shipper = shipper();
    let winner = carrier();
    let loser = carrier();

    let load = post_load(&engine, &shipper).await;
    let winning_bid = bid(&engine, &winner, &load, 48_000).await;
    let losing_bid = bid(&engine, &loser, &load, 47_000).await;

    let owner_page = engine
        .list_notifications(shipper.clone(), NotificationQuery::default())
        .await
        .unwrap();
    assert_eq!(owner_page.unread_count, 2);
    assert!(owner_page
        .notifications
        .iter()
        .all(|n| n.kind == NotificationKind::BidReceived));

    engine
        .accept_bid(shipper.clone(), load.id, winning_bid.id)
        .await
        .unwrap();

    let page = engine
        .list_notifications(winner.clone(), NotificationQuery::default())
        .await
        .unwrap();
    assert_eq!(page.notifications.len(), 1);
    assert_eq!(page.notifications[0].kind, NotificationKind::BidAccepted);

    let page = engine
        .list_notifications(loser.clone(), NotificationQuery::default())
        .await
        .unwrap();
    assert_eq!(page.notifications.len(), 1);
    assert_eq!(page.notifications[0].kind, NotificationKind::BidRejected);
    assert_eq!(
        page.notifications[0].payload["bid_id"],
        serde_json::json!(losing_bid.id)
    );
}

#[tokio::test]
async fn only_the_owner_may_accept() {
    let engine = engine();
    let owner = shipper();
    let stranger = shipper();
    let bidder = carrier();

    let load = post_load(&engine, &owner).await;
    let bid = bid(&engine, &bidder, &load, 40_000).await;

    let err = engine
        .accept_bid(stranger, load.id, bid.id)
        .await
        .unwrap_err();
    assert!(err.is_forbidden_error());

    let err = engine
        .accept_bid(bidder.clone(), load.id, bid.id)
        .await
        .unwrap_err();
    assert!(err.is_forbidden_error());

    let untouched = engine.find_load(owner, load.id).await.unwrap();
    assert_eq!(untouched.status, LoadStatus::Bidding);
}

#[tokio::test]
async fn accepting_requires_a_pending_bid_on_that_load() {
    let engine = engine();
    let owner = shipper();
    let bidder = carrier();

    let load = post_load(&engine, &owner).await;
    let other_load = post_load(&engine, &owner).await;
    let withdrawn = bid(&engine, &bidder, &load, 40_000).await;
    let elsewhere = bid(&engine, &bidder, &other_load, 41_000).await;

    engine
        .withdraw_bid(bidder.clone(), withdrawn.id)
        .await
        .unwrap();

    let err = engine
        .accept_bid(owner.clone(), load.id, withdrawn.id)
        .await
        .unwrap_err();
    assert!(err.is_invalid_state_error());

    let err = engine
        .accept_bid(owner.clone(), load.id, elsewhere.id)
        .await
        .unwrap_err();
    assert!(err.is_invalid_state_error());

    let err = engine
        .accept_bid(owner.clone(), load.id, uuid::Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(err.is_not_found_error());
}

#[tokio::test]
async fn a_load_is_assigned_only_once() {
    let engine = engine();
    let owner = shipper();
    let first = carrier();
    let second = carrier();

    let load = post_load(&engine, &owner).await;
    let first_bid = bid(&engine, &first, &load, 40_000).await;
    let second_bid = bid(&engine, &second, &load, 39_000).await;

    engine
        .accept_bid(owner.clone(), load.id, first_bid.id)
        .await
        .unwrap();

    let err = engine
        .accept_bid(owner.clone(), load.id, second_bid.id)
        .await
        .unwrap_err();
    assert!(err.is_invalid_state_error());

    // bidding is closed too
    let late = carrier();
    let err = engine
        .submit_bid(late, load.id, new_bid(30_000, 4))
        .await
        .unwrap_err();
    assert!(err.is_invalid_state_error());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acceptances_create_exactly_one_trip() {
    let engine = Arc::new(engine());
    let owner = shipper();

    let load = post_load(&engine, &owner).await;

    let mut bids = Vec::new();
    for amount in [50_000, 49_000, 48_000, 47_000, 46_000, 45_000] {
        bids.push(bid(&engine, &carrier(), &load, amount).await);
    }

    let handles: Vec<_> = bids
        .iter()
        .map(|bid| {
            let engine = engine.clone();
            let owner = owner.clone();
            let (load_id, bid_id) = (load.id, bid.id);

            tokio::spawn(async move { engine.accept_bid(owner, load_id, bid_id).await })
        })
        .collect();

    let mut trips = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(trip) => trips.push(trip),
            Err(err) => assert!(
                err.is_conflict_error() || err.is_invalid_state_error(),
                "unexpected error {}",
                err
            ),
        }
    }

    assert_eq!(trips.len(), 1);

    let all_trips = engine.list_trips(owner.clone()).await.unwrap();
    assert_eq!(all_trips.len(), 1);
    assert_eq!(all_trips[0].id, trips[0].id);

    let ledger = engine
        .list_bids(owner.clone(), BidScope::Load(load.id), None)
        .await
        .unwrap();
    let accepted: Vec<_> = ledger
        .iter()
        .filter(|b| b.status == BidStatus::Accepted)
        .collect();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].id, trips[0].bid_id);
    assert!(ledger
        .iter()
        .filter(|b| b.id != trips[0].bid_id)
        .all(|b| b.status == BidStatus::Rejected));

    let assigned = engine.find_load(owner, load.id).await.unwrap();
    assert_eq!(assigned.status, LoadStatus::Assigned);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_loads_never_contend() {
    // no retries: any conflict here would surface as an error
    let engine = Arc::new(engine().with_max_retries(0));
    let owner = shipper();

    let mut loads = Vec::new();
    for _ in 0..8 {
        loads.push(post_load(&engine, &owner).await);
    }

    let bidding: Vec<_> = loads
        .iter()
        .map(|load| {
            let engine = engine.clone();
            let load_id = load.id;

            tokio::spawn(async move {
                engine
                    .submit_bid(carrier(), load_id, new_bid(40_000, 5))
                    .await
            })
        })
        .collect();

    let mut bids = Vec::new();
    for handle in bidding {
        bids.push(handle.await.unwrap().unwrap());
    }

    let accepting: Vec<_> = bids
        .iter()
        .map(|bid| {
            let engine = engine.clone();
            let owner = owner.clone();
            let (load_id, bid_id) = (bid.load_id, bid.id);

            tokio::spawn(async move { engine.accept_bid(owner, load_id, bid_id).await })
        })
        .collect();

    for handle in accepting {
        handle.await.unwrap().unwrap();
    }

    let trips = engine.list_trips(owner.clone()).await.unwrap();
    assert_eq!(trips.len(), loads.len());

    let open = engine
        .list_loads(owner.clone(), freightline::db::LoadFilter::Shipper(owner.id))
        .await
        .unwrap();
    assert!(open.iter().all(|load| load.status == LoadStatus::Assigned));
}
