mod common;

use freightline::api::{LoadAPI, NotificationAPI, TripAPI};
use freightline::entities::{
    Coordinates, LoadStatus, NewTrackingEvent, NotificationKind, NotificationQuery,
    TrackingEventType, TripStatus,
};

use common::{carrier, engine, engine_with_gateway, open_trip, shipper, RecordingGateway};

fn checkpoint() -> NewTrackingEvent {
    NewTrackingEvent {
        event_type: TrackingEventType::Checkpoint,
        coordinates: Some(Coordinates {
            lat: 7.3775,
            lng: 3.947,
        }),
        photo_url: None,
        description: Some("Ibadan toll gate".into()),
    }
}

#[tokio::test]
async fn trip_runs_to_completion_and_settles_once() {
    let gateway = RecordingGateway::default();
    let engine = engine_with_gateway(gateway.clone());
    let shipper = shipper();
    let carrier = carrier();

    let trip = open_trip(&engine, &shipper, &carrier).await;

    for status in [
        TripStatus::Confirmed,
        TripStatus::InTransit,
        TripStatus::Delivered,
    ] {
        let advanced = engine
            .advance_status(carrier.clone(), trip.id, status)
            .await
            .unwrap();
        assert_eq!(advanced.status, status);
    }

    // carriers cannot sign off their own delivery
    let err = engine
        .advance_status(carrier.clone(), trip.id, TripStatus::Completed)
        .await
        .unwrap_err();
    assert!(err.is_forbidden_error());
    assert!(gateway.calls.lock().unwrap().is_empty());

    let completed = engine
        .advance_status(shipper.clone(), trip.id, TripStatus::Completed)
        .await
        .unwrap();
    assert_eq!(completed.status, TripStatus::Completed);

    let load = engine.find_load(shipper.clone(), trip.load_id).await.unwrap();
    assert_eq!(load.status, LoadStatus::Completed);

    let calls = gateway.calls.lock().unwrap().clone();
    assert_eq!(calls, vec![(50_000, trip.settlement_reference())]);

    let page = engine
        .list_notifications(shipper.clone(), NotificationQuery::default())
        .await
        .unwrap();
    let payment = page
        .notifications
        .iter()
        .find(|n| n.kind == NotificationKind::PaymentInitialized)
        .unwrap();
    assert_eq!(
        payment.payload["authorization_url"],
        format!("https://checkout.test/{}", trip.settlement_reference())
    );
}

#[tokio::test]
async fn failed_settlement_keeps_the_trip_completed() {
    let gateway = RecordingGateway {
        failing: true,
        ..Default::default()
    };
    let engine = engine_with_gateway(gateway.clone());
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

    let completed = engine
        .advance_status(shipper.clone(), trip.id, TripStatus::Completed)
        .await
        .unwrap();
    assert_eq!(completed.status, TripStatus::Completed);
    assert_eq!(gateway.calls.lock().unwrap().len(), 1);

    let found = engine.find_trip(shipper, trip.id).await.unwrap();
    assert_eq!(found.status, TripStatus::Completed);
}

#[tokio::test]
async fn illegal_edges_are_invalid_transitions() {
    let engine = engine();
    let shipper = shipper();
    let carrier = carrier();

    let trip = open_trip(&engine, &shipper, &carrier).await;

    let err = engine
        .advance_status(carrier.clone(), trip.id, TripStatus::InTransit)
        .await
        .unwrap_err();
    assert!(err.is_invalid_transition_error());

    let err = engine
        .advance_status(shipper.clone(), trip.id, TripStatus::Disputed)
        .await
        .unwrap_err();
    assert!(err.is_invalid_transition_error());

    // a carrier may not cancel before confirming
    let err = engine
        .advance_status(carrier.clone(), trip.id, TripStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(err.is_forbidden_error());

    let outsider = common::carrier();
    let err = engine
        .advance_status(outsider, trip.id, TripStatus::Confirmed)
        .await
        .unwrap_err();
    assert!(err.is_forbidden_error());
}

#[tokio::test]
async fn cancelling_a_trip_cancels_its_load_and_notifies_the_other_side() {
    let engine = engine();
    let shipper = shipper();
    let carrier = carrier();

    let trip = open_trip(&engine, &shipper, &carrier).await;

    engine
        .advance_status(shipper.clone(), trip.id, TripStatus::Cancelled)
        .await
        .unwrap();

    let load = engine.find_load(shipper.clone(), trip.load_id).await.unwrap();
    assert_eq!(load.status, LoadStatus::Cancelled);

    let page = engine
        .list_notifications(carrier.clone(), NotificationQuery::default())
        .await
        .unwrap();
    let latest = &page.notifications[0];
    assert_eq!(latest.kind, NotificationKind::TripStatusChanged);
    assert_eq!(latest.payload["status"], "cancelled");
}

#[tokio::test]
async fn either_party_may_dispute_in_transit() {
    let engine = engine();
    let shipper = shipper();
    let carrier = carrier();

    let trip = open_trip(&engine, &shipper, &carrier).await;
    engine
        .advance_status(carrier.clone(), trip.id, TripStatus::Confirmed)
        .await
        .unwrap();
    engine
        .advance_status(carrier.clone(), trip.id, TripStatus::InTransit)
        .await
        .unwrap();

    let disputed = engine
        .advance_status(shipper.clone(), trip.id, TripStatus::Disputed)
        .await
        .unwrap();
    assert_eq!(disputed.status, TripStatus::Disputed);

    // disputed is terminal
    let err = engine
        .advance_status(carrier.clone(), trip.id, TripStatus::Delivered)
        .await
        .unwrap_err();
    assert!(err.is_invalid_transition_error());
}

#[tokio::test]
async fn tracking_events_append_until_the_trip_closes() {
    let engine = engine();
    let shipper = shipper();
    let carrier = carrier();

    let trip = open_trip(&engine, &shipper, &carrier).await;

    let first = engine
        .record_tracking_event(carrier.clone(), trip.id, checkpoint())
        .await
        .unwrap();
    assert_eq!(first.author_id, carrier.id);

    let note = NewTrackingEvent {
        event_type: TrackingEventType::Note,
        coordinates: None,
        photo_url: None,
        description: Some("gate pass collected".into()),
    };
    let second = engine
        .record_tracking_event(shipper.clone(), trip.id, note)
        .await
        .unwrap();

    // status is only ever changed explicitly
    let unchanged = engine.find_trip(shipper.clone(), trip.id).await.unwrap();
    assert_eq!(unchanged.status, TripStatus::Pending);

    let events = engine
        .list_tracking_events(shipper.clone(), trip.id)
        .await
        .unwrap();
    let ids: Vec<_> = events.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![first.id, second.id]);

    let outsider = common::shipper();
    let err = engine
        .record_tracking_event(outsider.clone(), trip.id, checkpoint())
        .await
        .unwrap_err();
    assert!(err.is_forbidden_error());
    let err = engine
        .list_tracking_events(outsider, trip.id)
        .await
        .unwrap_err();
    assert!(err.is_forbidden_error());

    let bad_fix = NewTrackingEvent {
        coordinates: Some(Coordinates { lat: 91.0, lng: 0.0 }),
        ..checkpoint()
    };
    let err = engine
        .record_tracking_event(carrier.clone(), trip.id, bad_fix)
        .await
        .unwrap_err();
    assert!(err.is_invalid_input_error());

    engine
        .advance_status(shipper.clone(), trip.id, TripStatus::Cancelled)
        .await
        .unwrap();

    let err = engine
        .record_tracking_event(carrier.clone(), trip.id, checkpoint())
        .await
        .unwrap_err();
    assert!(err.is_invalid_state_error());

    // reads stay available
    let events = engine.list_tracking_events(carrier, trip.id).await.unwrap();
    assert_eq!(events.len(), 2);
}

#[tokio::test]
async fn trips_are_listed_for_both_parties_only() {
    let engine = engine();
    let shipper = shipper();
    let carrier = carrier();

    let older = open_trip(&engine, &shipper, &carrier).await;
    let newer = open_trip(&engine, &shipper, &carrier).await;

    for user in [shipper.clone(), carrier.clone()] {
        let ids: Vec<_> = engine
            .list_trips(user)
            .await
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    assert!(engine.list_trips(common::carrier()).await.unwrap().is_empty());

    let err = engine
        .find_trip(carrier.clone(), uuid::Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(err.is_not_found_error());
}
