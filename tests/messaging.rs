mod common;

use freightline::api::{MessageAPI, NotificationAPI, TripAPI};
use freightline::auth::{Role, User};
use freightline::entities::{
    NewMessage, NotificationKind, NotificationQuery, ReadTarget, TripStatus,
};

use common::{carrier, engine, open_trip, shipper};

fn text(body: &str) -> NewMessage {
    NewMessage {
        body: body.into(),
        attachment_url: None,
    }
}

#[tokio::test]
async fn mark_read_is_idempotent() {
    let engine = engine();
    let shipper = shipper();
    let carrier = carrier();
    let trip = open_trip(&engine, &shipper, &carrier).await;

    let message = engine
        .send_message(carrier.clone(), trip.id, text("arrived at the warehouse"))
        .await
        .unwrap();

    let marked = engine
        .mark_messages_read(shipper.clone(), trip.id, ReadTarget::One(message.id))
        .await
        .unwrap();
    assert_eq!(marked, 1);

    let first_read_at = engine
        .list_messages(shipper.clone(), trip.id)
        .await
        .unwrap()[0]
        .read_at;
    assert!(first_read_at.is_some());

    let marked = engine
        .mark_messages_read(shipper.clone(), trip.id, ReadTarget::One(message.id))
        .await
        .unwrap();
    assert_eq!(marked, 0);

    let marked = engine
        .mark_messages_read(shipper.clone(), trip.id, ReadTarget::All)
        .await
        .unwrap();
    assert_eq!(marked, 0);

    let second_read_at = engine
        .list_messages(shipper.clone(), trip.id)
        .await
        .unwrap()[0]
        .read_at;
    assert_eq!(first_read_at, second_read_at);
}

#[tokio::test]
async fn senders_never_mark_their_own_messages() {
    let engine = engine();
    let shipper = shipper();
    let carrier = carrier();
    let trip = open_trip(&engine, &shipper, &carrier).await;

    engine
        .send_message(carrier.clone(), trip.id, text("loading now"))
        .await
        .unwrap();

    let marked = engine
        .mark_messages_read(carrier.clone(), trip.id, ReadTarget::All)
        .await
        .unwrap();
    assert_eq!(marked, 0);

    let summary = engine.unread_summary(shipper.clone()).await.unwrap();
    assert_eq!(summary.total, 1);

    let summary = engine.unread_summary(carrier.clone()).await.unwrap();
    assert_eq!(summary.total, 0);
}

#[tokio::test]
async fn unread_summary_is_per_trip_and_sums_to_total() {
    let engine = engine();
    let shipper = shipper();
    let carrier_a = carrier();
    let carrier_b = carrier();

    let trip_a = open_trip(&engine, &shipper, &carrier_a).await;
    let trip_b = open_trip(&engine, &shipper, &carrier_b).await;

    for body in ["one", "two"] {
        engine
            .send_message(carrier_a.clone(), trip_a.id, text(body))
            .await
            .unwrap();
    }
    engine
        .send_message(carrier_b.clone(), trip_b.id, text("three"))
        .await
        .unwrap();
    engine
        .send_message(shipper.clone(), trip_b.id, text("noted"))
        .await
        .unwrap();

    let summary = engine.unread_summary(shipper.clone()).await.unwrap();
    assert_eq!(summary.trips.get(&trip_a.id), Some(&2));
    assert_eq!(summary.trips.get(&trip_b.id), Some(&1));
    assert_eq!(summary.total, summary.trips.values().sum::<i64>());
    assert_eq!(summary.total, 3);

    let summary = engine.unread_summary(carrier_b.clone()).await.unwrap();
    assert_eq!(summary.trips.len(), 1);
    assert_eq!(summary.total, 1);

    let nobody = common::carrier();
    let summary = engine.unread_summary(nobody).await.unwrap();
    assert!(summary.trips.is_empty());
    assert_eq!(summary.total, 0);
}

#[tokio::test]
async fn one_user_in_both_roles_is_summed_per_trip() {
    let engine = engine();
    let id = uuid::Uuid::new_v4();
    let as_shipper = User::new(id, Role::Shipper);
    let as_carrier = User::new(id, Role::Carrier);
    let their_carrier = carrier();
    let their_shipper = shipper();

    let shipping = open_trip(&engine, &as_shipper, &their_carrier).await;
    let hauling = open_trip(&engine, &their_shipper, &as_carrier).await;

    for body in ["at the gate", "loaded"] {
        engine
            .send_message(their_carrier.clone(), shipping.id, text(body))
            .await
            .unwrap();
    }
    for body in ["dock 4", "ask for Tunde", "bring straps"] {
        engine
            .send_message(their_shipper.clone(), hauling.id, text(body))
            .await
            .unwrap();
    }
    engine
        .send_message(as_shipper.clone(), shipping.id, text("thanks"))
        .await
        .unwrap();

    for user in [as_shipper.clone(), as_carrier.clone()] {
        let summary = engine.unread_summary(user).await.unwrap();
        assert_eq!(summary.trips.len(), 2);
        assert_eq!(summary.trips.get(&shipping.id), Some(&2));
        assert_eq!(summary.trips.get(&hauling.id), Some(&3));
        assert_eq!(summary.total, 5);
    }

    let marked = engine
        .mark_messages_read(as_shipper.clone(), shipping.id, ReadTarget::All)
        .await
        .unwrap();
    assert_eq!(marked, 2);

    let summary = engine.unread_summary(as_carrier.clone()).await.unwrap();
    assert_eq!(summary.trips.get(&shipping.id), Some(&0));
    assert_eq!(summary.trips.get(&hauling.id), Some(&3));
    assert_eq!(summary.total, 3);

    // the shipper role is no party to the trip hauled as a carrier
    let err = engine
        .mark_messages_read(as_shipper, hauling.id, ReadTarget::All)
        .await
        .unwrap_err();
    assert!(err.is_forbidden_error());

    let marked = engine
        .mark_messages_read(as_carrier.clone(), hauling.id, ReadTarget::All)
        .await
        .unwrap();
    assert_eq!(marked, 3);

    let summary = engine.unread_summary(as_carrier).await.unwrap();
    assert_eq!(summary.total, 0);
}

#[tokio::test]
async fn messaging_rules() {
    let engine = engine();
    let shipper = shipper();
    let carrier = carrier();
    let trip = open_trip(&engine, &shipper, &carrier).await;

    let err = engine
        .send_message(common::carrier(), trip.id, text("hello?"))
        .await
        .unwrap_err();
    assert!(err.is_forbidden_error());

    let err = engine
        .send_message(carrier.clone(), trip.id, text("   "))
        .await
        .unwrap_err();
    assert!(err.is_invalid_input_error());

    let photo = NewMessage {
        body: String::new(),
        attachment_url: Some("https://files.test/waybill.jpg".into()),
    };
    engine
        .send_message(carrier.clone(), trip.id, photo)
        .await
        .unwrap();

    let page = engine
        .list_notifications(shipper.clone(), NotificationQuery::default())
        .await
        .unwrap();
    assert_eq!(page.notifications[0].kind, NotificationKind::NewMessage);

    // a message id from another trip is not on this one
    let other = open_trip(&engine, &shipper, &carrier).await;
    let stray = engine
        .send_message(carrier.clone(), other.id, text("wrong thread"))
        .await
        .unwrap();
    let err = engine
        .mark_messages_read(shipper.clone(), trip.id, ReadTarget::One(stray.id))
        .await
        .unwrap_err();
    assert!(err.is_not_found_error());

    let err = engine
        .list_messages(common::shipper(), trip.id)
        .await
        .unwrap_err();
    assert!(err.is_forbidden_error());

    engine
        .advance_status(shipper.clone(), trip.id, TripStatus::Cancelled)
        .await
        .unwrap();

    let err = engine
        .send_message(carrier.clone(), trip.id, text("still there?"))
        .await
        .unwrap_err();
    assert!(err.is_invalid_state_error());
}

#[tokio::test]
async fn messaging_stays_open_after_completion() {
    let engine = engine();
    let shipper = shipper();
    let carrier = carrier();
    let trip = open_trip(&engine, &shipper, &carrier).await;

    for status in [
        TripStatus::Confirmed,
        TripStatus::InTransit,
        TripStatus::Delivered,
    ] {
        engine
            .advance_status(carrier.clone(), trip.id, status)
            .await
            .unwrap();
    }
    engine
        .advance_status(shipper.clone(), trip.id, TripStatus::Completed)
        .await
        .unwrap();

    engine
        .send_message(shipper.clone(), trip.id, text("two bags were torn"))
        .await
        .unwrap();

    let messages = engine.list_messages(carrier, trip.id).await.unwrap();
    assert_eq!(messages.len(), 1);
}
