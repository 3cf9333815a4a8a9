use oso::{Oso, OsoError, PolarClass};

use crate::auth::{Platform, User};
use crate::entities::{Bid, Load, Notification, Trip};

/// Builds the authorizor from the static rule table in `rules.polar`.
pub fn new() -> Result<Oso, OsoError> {
    let mut o = Oso::new();

    o.register_class(Platform::get_polar_class())?;
    o.register_class(User::get_polar_class())?;
    o.register_class(Load::get_polar_class())?;
    o.register_class(Bid::get_polar_class())?;
    o.register_class(Trip::get_polar_class())?;
    o.register_class(Notification::get_polar_class())?;

    o.load_str(include_str!("rules.polar"))?;

    Ok(o)
}


#[test]
fn platform_role_test() {
    use crate::auth::Role;

    let authorizor = new().unwrap();

    let shipper = fixtures::user(Role::Shipper);
    let carrier = fixtures::user(Role::Carrier);

    let result = authorizor.is_allowed(shipper.clone(), "post_load", Platform::default());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(carrier.clone(), "post_load", Platform::default());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(carrier.clone(), "list_own_bids", Platform::default());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(shipper.clone(), "list_own_bids", Platform::default());
    assert_eq!(result.unwrap(), false);

    for user in [shipper, carrier] {
        let result = authorizor.is_allowed(user.clone(), "browse_loads", Platform::default());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(user, "list_own_trips", Platform::default());
        assert_eq!(result.unwrap(), true);
    }
}

#[test]
fn load_owner_and_carrier_roles_test() {
    use crate::auth::Role;

    let authorizor = new().unwrap();

    let owner = fixtures::user(Role::Shipper);
    let other_shipper = fixtures::user(Role::Shipper);
    let carrier = fixtures::user(Role::Carrier);
    let load = fixtures::load(&owner);

    for action in ["read", "list_bids", "accept_bid", "cancel"] {
        let result = authorizor.is_allowed(owner.clone(), action, load.clone());
        assert_eq!(result.unwrap(), true, "owner should be allowed to {}", action);

        let result = authorizor.is_allowed(other_shipper.clone(), action, load.clone());
        assert_eq!(result.unwrap(), false, "stranger should not {}", action);
    }

    let result = authorizor.is_allowed(owner.clone(), "submit_bid", load.clone());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(carrier.clone(), "submit_bid", load.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(carrier.clone(), "read", load.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(carrier.clone(), "accept_bid", load.clone());
    assert_eq!(result.unwrap(), false);

    // a carrier identity carrying the shipper's id is still not the owner
    let spoofed = crate::auth::User::new(owner.id, Role::Carrier);
    let result = authorizor.is_allowed(spoofed, "accept_bid", load.clone());
    assert_eq!(result.unwrap(), false);
}

#[test]
fn bid_bidder_role_test() {
    use crate::auth::Role;

    let authorizor = new().unwrap();

    let shipper = fixtures::user(Role::Shipper);
    let bidder = fixtures::user(Role::Carrier);
    let rival = fixtures::user(Role::Carrier);
    let load = fixtures::load(&shipper);
    let bid = fixtures::bid(&load, &bidder);

    let result = authorizor.is_allowed(bidder.clone(), "withdraw", bid.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(rival.clone(), "withdraw", bid.clone());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(shipper.clone(), "withdraw", bid.clone());
    assert_eq!(result.unwrap(), false);
}

#[test]
fn trip_participant_roles_test() {
    use crate::auth::Role;

    let authorizor = new().unwrap();

    let shipper = fixtures::user(Role::Shipper);
    let carrier = fixtures::user(Role::Carrier);
    let outsider = fixtures::user(Role::Carrier);
    let trip = fixtures::trip(&shipper, &carrier);

    let actions = [
        "read",
        "advance_status",
        "record_tracking_event",
        "send_message",
        "read_messages",
    ];

    for action in actions {
        let result = authorizor.is_allowed(shipper.clone(), action, trip.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(carrier.clone(), action, trip.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(outsider.clone(), action, trip.clone());
        assert_eq!(result.unwrap(), false);
    }

    let result = authorizor.query_rule("has_role", (carrier.clone(), "carrier", trip.clone()));
    assert!(result.unwrap().next().unwrap().is_ok());

    let result = authorizor.query_rule("has_role", (carrier.clone(), "shipper", trip.clone()));
    assert!(result.unwrap().next().is_none());
}

#[test]
fn notification_recipient_role_test() {
    use crate::auth::Role;
    use crate::entities::NotificationKind;

    let authorizor = new().unwrap();

    let recipient = fixtures::user(Role::Carrier);
    let other = fixtures::user(Role::Carrier);
    let notification = Notification::new(
        recipient.id,
        NotificationKind::BidAccepted,
        serde_json::json!({}),
    );

    let result = authorizor.is_allowed(recipient, "mark_read", notification.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(other, "mark_read", notification);
    assert_eq!(result.unwrap(), false);
}
