use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{LoadFilter, Store, Tx};
use crate::{
    entities::{
        Bid, BidScope, BidStatus, Load, Notification, TrackingEvent, Trip, TripMessage,
        TripStatus,
    },
    error::{conflict_error, duplicate_bid_error, not_found_error, unexpected_error, Error},
};

/// In-process store with optimistic serializable transactions.
///
/// Every transaction works on a snapshot. Rows read `*_for_update` are
/// locked: a writing transaction bumps the version of every row it locked
/// when it commits, and a transaction whose locked rows moved on since its
/// snapshot is rejected with a conflict. Writes are replayed onto live state
/// at commit, re-checking the unique constraints the Postgres schema
/// enforces with partial indexes.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    /// Commit count per locked row id. Rows never locked are absent.
    versions: HashMap<Uuid, u64>,
    state: State,
}

/// Rows are kept in insertion order.
#[derive(Clone, Default)]
struct State {
    loads: Vec<Load>,
    bids: Vec<Bid>,
    trips: Vec<Trip>,
    tracking_events: Vec<TrackingEvent>,
    messages: Vec<TripMessage>,
    notifications: Vec<Notification>,
}

#[derive(Debug)]
enum Op {
    InsertLoad(Load),
    UpdateLoad(Load),
    InsertBid(Bid),
    UpdateBid(Bid),
    InsertTrip(Trip),
    UpdateTrip(Trip),
    InsertTrackingEvent(TrackingEvent),
    InsertMessage(TripMessage),
    MarkMessagesRead {
        trip_id: Uuid,
        recipient_id: Uuid,
        message_id: Option<Uuid>,
        at: DateTime<Utc>,
    },
    InsertNotification(Notification),
    MarkNotificationsRead {
        user_id: Uuid,
        notification_id: Option<Uuid>,
    },
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn replace<T, F>(rows: &mut [T], row: &T, same: F) -> Result<(), Error>
where
    T: Clone,
    F: Fn(&T) -> bool,
{
    let slot = rows.iter_mut().find(|r| same(r)).ok_or_else(not_found_error)?;
    *slot = row.clone();

    Ok(())
}

impl State {
    fn participates(&self, trip: &Trip, user_id: Uuid) -> bool {
        trip.carrier_id == user_id
            || self
                .loads
                .iter()
                .any(|load| load.id == trip.load_id && load.shipper_id == user_id)
    }

    /// Applies one write, enforcing the same uniqueness rules as the
    /// Postgres indexes. Returns the number of rows touched.
    fn apply(&mut self, op: &Op) -> Result<u64, Error> {
        match op {
            Op::InsertLoad(load) => {
                self.loads.push(load.clone());
                Ok(1)
            }
            Op::UpdateLoad(load) => {
                replace(&mut self.loads, load, |r| r.id == load.id)?;
                Ok(1)
            }
            Op::InsertBid(bid) => {
                let taken = self.bids.iter().any(|other| {
                    other.load_id == bid.load_id
                        && other.carrier_id == bid.carrier_id
                        && other.is_active()
                });
                if taken {
                    return Err(duplicate_bid_error());
                }

                self.bids.push(bid.clone());
                Ok(1)
            }
            Op::UpdateBid(bid) => {
                if bid.status == BidStatus::Accepted {
                    let accepted_elsewhere = self.bids.iter().any(|other| {
                        other.load_id == bid.load_id
                            && other.id != bid.id
                            && other.status == BidStatus::Accepted
                    });
                    if accepted_elsewhere {
                        return Err(conflict_error());
                    }
                }

                replace(&mut self.bids, bid, |r| r.id == bid.id)?;
                Ok(1)
            }
            Op::InsertTrip(trip) => {
                let live = self.trips.iter().any(|other| {
                    other.load_id == trip.load_id && other.status != TripStatus::Cancelled
                });
                if live {
                    return Err(conflict_error());
                }

                self.trips.push(trip.clone());
                Ok(1)
            }
            Op::UpdateTrip(trip) => {
                replace(&mut self.trips, trip, |r| r.id == trip.id)?;
                Ok(1)
            }
            Op::InsertTrackingEvent(event) => {
                self.tracking_events.push(event.clone());
                Ok(1)
            }
            Op::InsertMessage(message) => {
                self.messages.push(message.clone());
                Ok(1)
            }
            Op::MarkMessagesRead {
                trip_id,
                recipient_id,
                message_id,
                at,
            } => {
                let mut marked = 0;
                for message in self.messages.iter_mut().filter(|m| m.trip_id == *trip_id) {
                    if message_id.map_or(true, |id| message.id == id)
                        && message.mark_read(*recipient_id, *at)
                    {
                        marked += 1;
                    }
                }

                Ok(marked)
            }
            Op::InsertNotification(notification) => {
                self.notifications.push(notification.clone());
                Ok(1)
            }
            Op::MarkNotificationsRead {
                user_id,
                notification_id,
            } => {
                let mut marked = 0;
                for notification in self
                    .notifications
                    .iter_mut()
                    .filter(|n| n.user_id == *user_id && !n.is_read)
                    .filter(|n| notification_id.map_or(true, |id| n.id == id))
                {
                    notification.is_read = true;
                    marked += 1;
                }

                Ok(marked)
            }
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Tx>, Error> {
        let (versions, view) = {
            let inner = self.inner.lock().await;
            (inner.versions.clone(), inner.state.clone())
        };

        // let concurrent transactions take the same snapshot
        tokio::task::yield_now().await;

        Ok(Box::new(MemoryTx {
            inner: self.inner.clone(),
            versions,
            view,
            ops: Vec::new(),
            locked: HashMap::new(),
            committed: false,
        }))
    }

    async fn find_load(&self, id: Uuid) -> Result<Option<Load>, Error> {
        let inner = self.inner.lock().await;

        Ok(inner.state.loads.iter().find(|l| l.id == id).cloned())
    }

    async fn list_loads(&self, filter: LoadFilter) -> Result<Vec<Load>, Error> {
        let inner = self.inner.lock().await;

        let loads = inner
            .state
            .loads
            .iter()
            .rev()
            .filter(|load| match filter {
                LoadFilter::AcceptingBids => load.status.accepts_bids(),
                LoadFilter::Shipper(shipper_id) => load.shipper_id == shipper_id,
            })
            .cloned()
            .collect();

        Ok(loads)
    }

    async fn list_bids(
        &self,
        scope: BidScope,
        status: Option<BidStatus>,
    ) -> Result<Vec<Bid>, Error> {
        let inner = self.inner.lock().await;

        let bids = inner
            .state
            .bids
            .iter()
            .rev()
            .filter(|bid| match scope {
                BidScope::Carrier(carrier_id) => bid.carrier_id == carrier_id,
                BidScope::Load(load_id) => bid.load_id == load_id,
            })
            .filter(|bid| status.map_or(true, |status| bid.status == status))
            .cloned()
            .collect();

        Ok(bids)
    }

    async fn find_trip(&self, id: Uuid) -> Result<Option<Trip>, Error> {
        let inner = self.inner.lock().await;

        Ok(inner.state.trips.iter().find(|t| t.id == id).cloned())
    }

    async fn list_trips_for_user(&self, user_id: Uuid) -> Result<Vec<Trip>, Error> {
        let inner = self.inner.lock().await;
        let state = &inner.state;

        let trips = state
            .trips
            .iter()
            .rev()
            .filter(|trip| state.participates(trip, user_id))
            .cloned()
            .collect();

        Ok(trips)
    }

    async fn list_tracking_events(&self, trip_id: Uuid) -> Result<Vec<TrackingEvent>, Error> {
        let inner = self.inner.lock().await;

        let events = inner
            .state
            .tracking_events
            .iter()
            .filter(|e| e.trip_id == trip_id)
            .cloned()
            .collect();

        Ok(events)
    }

    async fn list_messages(&self, trip_id: Uuid) -> Result<Vec<TripMessage>, Error> {
        let inner = self.inner.lock().await;

        let messages = inner
            .state
            .messages
            .iter()
            .filter(|m| m.trip_id == trip_id)
            .cloned()
            .collect();

        Ok(messages)
    }

    async fn unread_counts(&self, user_id: Uuid) -> Result<Vec<(Uuid, i64)>, Error> {
        let inner = self.inner.lock().await;
        let state = &inner.state;

        let counts = state
            .trips
            .iter()
            .filter(|trip| state.participates(trip, user_id))
            .map(|trip| {
                let unread = state
                    .messages
                    .iter()
                    .filter(|m| m.trip_id == trip.id && m.is_unread_by(user_id))
                    .count();

                (trip.id, unread as i64)
            })
            .collect();

        Ok(counts)
    }

    async fn find_notification(&self, id: Uuid) -> Result<Option<Notification>, Error> {
        let inner = self.inner.lock().await;

        Ok(inner.state.notifications.iter().find(|n| n.id == id).cloned())
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Notification>, Error> {
        let inner = self.inner.lock().await;

        let notifications = inner
            .state
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .filter(|n| !unread_only || !n.is_read)
            .take(usize::try_from(limit).unwrap_or_default())
            .cloned()
            .collect();

        Ok(notifications)
    }

    async fn count_unread_notifications(&self, user_id: Uuid) -> Result<i64, Error> {
        let inner = self.inner.lock().await;

        let unread = inner
            .state
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count();

        Ok(unread as i64)
    }
}

pub struct MemoryTx {
    inner: Arc<Mutex<Inner>>,
    versions: HashMap<Uuid, u64>,
    view: State,
    ops: Vec<Op>,
    /// Row id to the version it had in this transaction's snapshot.
    locked: HashMap<Uuid, u64>,
    committed: bool,
}

impl MemoryTx {
    fn lock(&mut self, id: Uuid) {
        let version = self.versions.get(&id).copied().unwrap_or_default();
        self.locked.entry(id).or_insert(version);
    }

    fn write(&mut self, op: Op) -> Result<u64, Error> {
        let touched = self.view.apply(&op)?;
        self.ops.push(op);

        Ok(touched)
    }
}

#[async_trait]
impl Tx for MemoryTx {
    async fn fetch_load_for_update(&mut self, id: Uuid) -> Result<Load, Error> {
        self.lock(id);

        self.view
            .loads
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or_else(not_found_error)
    }

    async fn insert_load(&mut self, load: &Load) -> Result<(), Error> {
        self.write(Op::InsertLoad(load.clone()))?;
        Ok(())
    }

    async fn update_load(&mut self, load: &Load) -> Result<(), Error> {
        self.write(Op::UpdateLoad(load.clone()))?;
        Ok(())
    }

    async fn fetch_bid_for_update(&mut self, id: Uuid) -> Result<Bid, Error> {
        self.lock(id);

        self.view
            .bids
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or_else(not_found_error)
    }

    async fn fetch_bids_for_load_for_update(&mut self, load_id: Uuid) -> Result<Vec<Bid>, Error> {
        let bids: Vec<Bid> = self
            .view
            .bids
            .iter()
            .rev()
            .filter(|b| b.load_id == load_id)
            .cloned()
            .collect();

        for bid in &bids {
            self.lock(bid.id);
        }

        Ok(bids)
    }

    async fn find_active_bid(
        &mut self,
        load_id: Uuid,
        carrier_id: Uuid,
    ) -> Result<Option<Bid>, Error> {
        Ok(self
            .view
            .bids
            .iter()
            .find(|b| b.load_id == load_id && b.carrier_id == carrier_id && b.is_active())
            .cloned())
    }

    async fn insert_bid(&mut self, bid: &Bid) -> Result<(), Error> {
        self.write(Op::InsertBid(bid.clone()))?;
        Ok(())
    }

    async fn update_bid(&mut self, bid: &Bid) -> Result<(), Error> {
        self.write(Op::UpdateBid(bid.clone()))?;
        Ok(())
    }

    async fn fetch_trip(&mut self, id: Uuid) -> Result<Trip, Error> {
        self.view
            .trips
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(not_found_error)
    }

    async fn fetch_trip_for_update(&mut self, id: Uuid) -> Result<Trip, Error> {
        self.lock(id);
        self.fetch_trip(id).await
    }

    async fn insert_trip(&mut self, trip: &Trip) -> Result<(), Error> {
        self.write(Op::InsertTrip(trip.clone()))?;
        Ok(())
    }

    async fn update_trip(&mut self, trip: &Trip) -> Result<(), Error> {
        self.write(Op::UpdateTrip(trip.clone()))?;
        Ok(())
    }

    async fn insert_tracking_event(&mut self, event: &TrackingEvent) -> Result<(), Error> {
        self.write(Op::InsertTrackingEvent(event.clone()))?;
        Ok(())
    }

    async fn fetch_message(&mut self, id: Uuid) -> Result<TripMessage, Error> {
        self.view
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(not_found_error)
    }

    async fn insert_message(&mut self, message: &TripMessage) -> Result<(), Error> {
        self.write(Op::InsertMessage(message.clone()))?;
        Ok(())
    }

    async fn mark_messages_read(
        &mut self,
        trip_id: Uuid,
        recipient_id: Uuid,
        message_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<u64, Error> {
        self.write(Op::MarkMessagesRead {
            trip_id,
            recipient_id,
            message_id,
            at,
        })
    }

    async fn insert_notification(&mut self, notification: &Notification) -> Result<(), Error> {
        self.write(Op::InsertNotification(notification.clone()))?;
        Ok(())
    }

    async fn mark_notifications_read(
        &mut self,
        user_id: Uuid,
        notification_id: Option<Uuid>,
    ) -> Result<u64, Error> {
        self.write(Op::MarkNotificationsRead {
            user_id,
            notification_id,
        })
    }

    async fn commit(&mut self) -> Result<(), Error> {
        if self.committed {
            return Err(unexpected_error());
        }

        tokio::task::yield_now().await;

        let mut inner = self.inner.lock().await;

        let stale = self.locked.iter().find(|(id, version)| {
            inner.versions.get(id).copied().unwrap_or_default() != **version
        });
        if let Some((row_id, _)) = stale {
            tracing::debug!(%row_id, "serialization failure");
            return Err(conflict_error());
        }

        let mut next = inner.state.clone();
        for op in &self.ops {
            next.apply(op)?;
        }

        inner.state = next;
        if !self.ops.is_empty() {
            for id in self.locked.keys() {
                *inner.versions.entry(*id).or_default() += 1;
            }
        }
        self.committed = true;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{NewBid, NewLoad};

    fn load() -> Load {
        Load::new(Uuid::new_v4(), crate::entities::sample_new_load())
    }

    #[tokio::test]
    async fn stale_locking_commit_conflicts() {
        let store = MemoryStore::new();
        let load = load();

        let mut tx = store.begin().await.unwrap();
        tx.insert_load(&load).await.unwrap();
        tx.commit().await.unwrap();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();

        let mut a = first.fetch_load_for_update(load.id).await.unwrap();
        let mut b = second.fetch_load_for_update(load.id).await.unwrap();

        a.start_bidding().unwrap();
        b.start_bidding().unwrap();
        first.update_load(&a).await.unwrap();
        second.update_load(&b).await.unwrap();

        first.commit().await.unwrap();
        assert!(second.commit().await.unwrap_err().is_conflict_error());
    }

    #[tokio::test]
    async fn locks_on_different_loads_do_not_conflict() {
        let store = MemoryStore::new();
        let (one, two) = (load(), load());

        let mut tx = store.begin().await.unwrap();
        tx.insert_load(&one).await.unwrap();
        tx.insert_load(&two).await.unwrap();
        tx.commit().await.unwrap();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();

        let mut a = first.fetch_load_for_update(one.id).await.unwrap();
        let mut b = second.fetch_load_for_update(two.id).await.unwrap();

        a.start_bidding().unwrap();
        b.start_bidding().unwrap();
        first.update_load(&a).await.unwrap();
        second.update_load(&b).await.unwrap();

        first.commit().await.unwrap();
        second.commit().await.unwrap();

        let stored = store.list_loads(LoadFilter::AcceptingBids).await.unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn unrelated_writes_leave_locks_valid() {
        let store = MemoryStore::new();
        let load = load();

        let mut tx = store.begin().await.unwrap();
        tx.insert_load(&load).await.unwrap();
        tx.commit().await.unwrap();

        let mut locker = store.begin().await.unwrap();
        let mut locked = locker.fetch_load_for_update(load.id).await.unwrap();

        let notification = Notification::new(
            Uuid::new_v4(),
            crate::entities::NotificationKind::NewMessage,
            serde_json::json!({}),
        );
        let mut other = store.begin().await.unwrap();
        other.insert_notification(&notification).await.unwrap();
        other.commit().await.unwrap();

        locked.start_bidding().unwrap();
        locker.update_load(&locked).await.unwrap();
        locker.commit().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_active_bid_rejected_on_replay() {
        let store = MemoryStore::new();
        let load = load();
        let carrier_id = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        tx.insert_load(&load).await.unwrap();
        tx.commit().await.unwrap();

        let params = NewBid {
            amount: 10_000,
            estimated_hours: 4,
            message: None,
        };

        // neither transaction locks, so only the replay catches the second bid
        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first
            .insert_bid(&Bid::new(load.id, carrier_id, params.clone()))
            .await
            .unwrap();
        second
            .insert_bid(&Bid::new(load.id, carrier_id, params))
            .await
            .unwrap();

        first.commit().await.unwrap();
        assert!(second.commit().await.unwrap_err().is_duplicate_bid_error());

        let bids = store.list_bids(BidScope::Load(load.id), None).await.unwrap();
        assert_eq!(bids.len(), 1);
    }

    #[tokio::test]
    async fn uncommitted_tx_leaves_no_trace() {
        let store = MemoryStore::new();
        let load = load();

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_load(&load).await.unwrap();
        }

        assert!(store.find_load(load.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn listings_are_newest_first() {
        let store = MemoryStore::new();
        let shipper_id = Uuid::new_v4();
        let older = Load::new(shipper_id, crate::entities::sample_new_load());
        let newer = Load::new(
            shipper_id,
            NewLoad {
                cargo: "cement".into(),
                ..crate::entities::sample_new_load()
            },
        );

        let mut tx = store.begin().await.unwrap();
        tx.insert_load(&older).await.unwrap();
        tx.insert_load(&newer).await.unwrap();
        tx.commit().await.unwrap();

        let loads = store.list_loads(LoadFilter::Shipper(shipper_id)).await.unwrap();
        let ids: Vec<Uuid> = loads.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }
}
