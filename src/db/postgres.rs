use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geo_types::Geometry;
use geozero::wkb;
use serde::de::DeserializeOwned;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    types::Json,
    Executor, Pool, Postgres, Row, Transaction,
};
use uuid::Uuid;

use super::{LoadFilter, Store, Tx};
use crate::{
    entities::{
        Bid, BidScope, BidStatus, Load, Notification, TrackingEvent, Trip, TripMessage,
    },
    error::{
        conflict_error, duplicate_bid_error, not_found_error, unexpected_error, Error,
        UNIQUE_VIOLATION,
    },
};

type Database = Postgres;

const SCHEMA: &[&str] = &[
    "CREATE EXTENSION IF NOT EXISTS postgis",
    "CREATE TABLE IF NOT EXISTS loads (id UUID PRIMARY KEY, shipper_id UUID NOT NULL, status VARCHAR NOT NULL, created_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL)",
    "CREATE INDEX IF NOT EXISTS loads_by_shipper ON loads (shipper_id, created_at)",
    "CREATE TABLE IF NOT EXISTS bids (id UUID PRIMARY KEY, load_id UUID NOT NULL, carrier_id UUID NOT NULL, status VARCHAR NOT NULL, created_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL, CONSTRAINT fk_bid_load FOREIGN KEY(load_id) REFERENCES loads(id))",
    "CREATE UNIQUE INDEX IF NOT EXISTS bids_one_active_per_carrier ON bids (load_id, carrier_id) WHERE status <> 'withdrawn'",
    "CREATE UNIQUE INDEX IF NOT EXISTS bids_one_accepted_per_load ON bids (load_id) WHERE status = 'accepted'",
    "CREATE INDEX IF NOT EXISTS bids_by_carrier ON bids (carrier_id, created_at)",
    "CREATE TABLE IF NOT EXISTS trips (id UUID PRIMARY KEY, load_id UUID NOT NULL, carrier_id UUID NOT NULL, status VARCHAR NOT NULL, created_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL, CONSTRAINT fk_trip_load FOREIGN KEY(load_id) REFERENCES loads(id))",
    "CREATE UNIQUE INDEX IF NOT EXISTS trips_one_live_per_load ON trips (load_id) WHERE status <> 'cancelled'",
    "CREATE INDEX IF NOT EXISTS trips_by_carrier ON trips (carrier_id)",
    "CREATE TABLE IF NOT EXISTS tracking_events (id UUID PRIMARY KEY, trip_id UUID NOT NULL, author_id UUID NOT NULL, location geometry(Point, 4326), created_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL, CONSTRAINT fk_event_trip FOREIGN KEY(trip_id) REFERENCES trips(id))",
    "CREATE INDEX IF NOT EXISTS tracking_events_by_trip ON tracking_events (trip_id, created_at)",
    "CREATE TABLE IF NOT EXISTS trip_messages (id UUID PRIMARY KEY, trip_id UUID NOT NULL, sender_id UUID NOT NULL, body TEXT NOT NULL, attachment_url TEXT, read_at TIMESTAMPTZ, created_at TIMESTAMPTZ NOT NULL, CONSTRAINT fk_message_trip FOREIGN KEY(trip_id) REFERENCES trips(id))",
    "CREATE INDEX IF NOT EXISTS trip_messages_by_trip ON trip_messages (trip_id, created_at)",
    "CREATE TABLE IF NOT EXISTS notifications (id UUID PRIMARY KEY, user_id UUID NOT NULL, kind VARCHAR NOT NULL, payload JSONB NOT NULL, is_read BOOLEAN NOT NULL DEFAULT FALSE, created_at TIMESTAMPTZ NOT NULL)",
    "CREATE INDEX IF NOT EXISTS notifications_by_user ON notifications (user_id, created_at)",
];

pub struct PgStore {
    pool: Pool<Database>,
}

impl PgStore {
    #[tracing::instrument(name = "PgStore::new", skip_all)]
    pub async fn new(db_uri: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_uri)
            .await?;

        // TODO: move the schema to sqlx migrations once a second schema version exists
        for statement in SCHEMA {
            pool.execute(*statement).await?;
        }

        Ok(Self { pool })
    }
}

fn decode_data<T: DeserializeOwned>(row: &PgRow) -> Result<T, Error> {
    let Json(value): Json<T> = row.try_get("data")?;

    Ok(value)
}

fn decode_all<T: DeserializeOwned>(rows: &[PgRow]) -> Result<Vec<T>, Error> {
    rows.iter().map(decode_data).collect()
}

fn message_from_row(row: &PgRow) -> Result<TripMessage, Error> {
    Ok(TripMessage {
        id: row.try_get("id")?,
        trip_id: row.try_get("trip_id")?,
        sender_id: row.try_get("sender_id")?,
        body: row.try_get("body")?,
        attachment_url: row.try_get("attachment_url")?,
        read_at: row.try_get("read_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn notification_from_row(row: &PgRow) -> Result<Notification, Error> {
    let kind: String = row.try_get("kind")?;
    let Json(payload): Json<serde_json::Value> = row.try_get("payload")?;

    Ok(Notification {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        kind: kind.parse()?,
        payload,
        is_read: row.try_get("is_read")?,
        created_at: row.try_get("created_at")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db_err| db_err.code())
        .map_or(false, |code| code == UNIQUE_VIOLATION)
}

/// Unique-index violations become `on_violation()`, everything else goes through `From`.
fn on_unique_violation(err: sqlx::Error, on_violation: fn() -> Error) -> Error {
    if is_unique_violation(&err) {
        on_violation()
    } else {
        err.into()
    }
}

#[async_trait]
impl Store for PgStore {
    #[tracing::instrument(skip(self))]
    async fn begin(&self) -> Result<Box<dyn Tx>, Error> {
        let mut tx = self.pool.begin().await?;

        tx.execute("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .await?;

        Ok(Box::new(PgTx { tx: Some(tx) }))
    }

    #[tracing::instrument(skip(self))]
    async fn find_load(&self, id: Uuid) -> Result<Option<Load>, Error> {
        let mut conn = self.pool.acquire().await?;

        let maybe_result = conn
            .fetch_optional(sqlx::query("SELECT data FROM loads WHERE id = $1").bind(id))
            .await?;

        maybe_result.as_ref().map(decode_data).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn list_loads(&self, filter: LoadFilter) -> Result<Vec<Load>, Error> {
        let mut conn = self.pool.acquire().await?;

        let results = match filter {
            LoadFilter::AcceptingBids => {
                conn.fetch_all(sqlx::query(
                    "SELECT data FROM loads WHERE status IN ('open', 'bidding') ORDER BY created_at DESC",
                ))
                .await?
            }
            LoadFilter::Shipper(shipper_id) => {
                conn.fetch_all(
                    sqlx::query(
                        "SELECT data FROM loads WHERE shipper_id = $1 ORDER BY created_at DESC",
                    )
                    .bind(shipper_id),
                )
                .await?
            }
        };

        decode_all(&results)
    }

    #[tracing::instrument(skip(self))]
    async fn list_bids(
        &self,
        scope: BidScope,
        status: Option<BidStatus>,
    ) -> Result<Vec<Bid>, Error> {
        let (column, id) = match scope {
            BidScope::Carrier(id) => ("carrier_id", id),
            BidScope::Load(id) => ("load_id", id),
        };

        let query = format!(
            "SELECT data FROM bids WHERE {} = $1 AND ($2::VARCHAR IS NULL OR status = $2) ORDER BY created_at DESC",
            column
        );

        let mut conn = self.pool.acquire().await?;

        let results = conn
            .fetch_all(
                sqlx::query(&query)
                    .bind(id)
                    .bind(status.map(|status| status.name())),
            )
            .await?;

        decode_all(&results)
    }

    #[tracing::instrument(skip(self))]
    async fn find_trip(&self, id: Uuid) -> Result<Option<Trip>, Error> {
        let mut conn = self.pool.acquire().await?;

        let maybe_result = conn
            .fetch_optional(sqlx::query("SELECT data FROM trips WHERE id = $1").bind(id))
            .await?;

        maybe_result.as_ref().map(decode_data).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn list_trips_for_user(&self, user_id: Uuid) -> Result<Vec<Trip>, Error> {
        let query = "
            SELECT
                t.data AS data
            FROM
                trips t
                JOIN loads l ON l.id = t.load_id
            WHERE
                t.carrier_id = $1
                OR l.shipper_id = $1
            ORDER BY
                t.created_at DESC
        ";

        let mut conn = self.pool.acquire().await?;
        let results = conn.fetch_all(sqlx::query(query).bind(user_id)).await?;

        decode_all(&results)
    }

    #[tracing::instrument(skip(self))]
    async fn list_tracking_events(&self, trip_id: Uuid) -> Result<Vec<TrackingEvent>, Error> {
        let mut conn = self.pool.acquire().await?;

        let results = conn
            .fetch_all(
                sqlx::query(
                    "SELECT data FROM tracking_events WHERE trip_id = $1 ORDER BY created_at ASC",
                )
                .bind(trip_id),
            )
            .await?;

        decode_all(&results)
    }

    #[tracing::instrument(skip(self))]
    async fn list_messages(&self, trip_id: Uuid) -> Result<Vec<TripMessage>, Error> {
        let mut conn = self.pool.acquire().await?;

        let results = conn
            .fetch_all(
                sqlx::query("SELECT id, trip_id, sender_id, body, attachment_url, read_at, created_at FROM trip_messages WHERE trip_id = $1 ORDER BY created_at ASC")
                    .bind(trip_id),
            )
            .await?;

        results.iter().map(message_from_row).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn unread_counts(&self, user_id: Uuid) -> Result<Vec<(Uuid, i64)>, Error> {
        // grouped per trip so a user who ships on one trip and carries on
        // another is still counted trip by trip
        let query = "
            SELECT
                t.id AS trip_id,
                COUNT(m.id) FILTER (
                    WHERE m.read_at IS NULL AND m.sender_id <> $1
                ) AS unread
            FROM
                trips t
                JOIN loads l ON l.id = t.load_id
                LEFT JOIN trip_messages m ON m.trip_id = t.id
            WHERE
                t.carrier_id = $1
                OR l.shipper_id = $1
            GROUP BY
                t.id
        ";

        let mut conn = self.pool.acquire().await?;
        let results = conn.fetch_all(sqlx::query(query).bind(user_id)).await?;

        results
            .iter()
            .map(|row| Ok((row.try_get("trip_id")?, row.try_get("unread")?)))
            .collect()
    }

    #[tracing::instrument(skip(self))]
    async fn find_notification(&self, id: Uuid) -> Result<Option<Notification>, Error> {
        let mut conn = self.pool.acquire().await?;

        let maybe_result = conn
            .fetch_optional(
                sqlx::query("SELECT id, user_id, kind, payload, is_read, created_at FROM notifications WHERE id = $1")
                    .bind(id),
            )
            .await?;

        maybe_result.as_ref().map(notification_from_row).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Notification>, Error> {
        let query = "
            SELECT
                id, user_id, kind, payload, is_read, created_at
            FROM
                notifications
            WHERE
                user_id = $1
                AND (NOT $2 OR NOT is_read)
            ORDER BY
                created_at DESC
            LIMIT $3
        ";

        let mut conn = self.pool.acquire().await?;
        let results = conn
            .fetch_all(
                sqlx::query(query)
                    .bind(user_id)
                    .bind(unread_only)
                    .bind(limit),
            )
            .await?;

        results.iter().map(notification_from_row).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn count_unread_notifications(&self, user_id: Uuid) -> Result<i64, Error> {
        let mut conn = self.pool.acquire().await?;

        let unread: i64 = conn
            .fetch_one(
                sqlx::query(
                    "SELECT COUNT(*) AS unread FROM notifications WHERE user_id = $1 AND NOT is_read",
                )
                .bind(user_id),
            )
            .await?
            .try_get("unread")?;

        Ok(unread)
    }
}

pub struct PgTx {
    tx: Option<Transaction<'static, Database>>,
}

impl PgTx {
    fn conn(&mut self) -> Result<&mut Transaction<'static, Database>, Error> {
        self.tx.as_mut().ok_or_else(unexpected_error)
    }
}

#[async_trait]
impl Tx for PgTx {
    #[tracing::instrument(skip(self))]
    async fn fetch_load_for_update(&mut self, id: Uuid) -> Result<Load, Error> {
        let tx = self.conn()?;

        let result = tx
            .fetch_optional(sqlx::query("SELECT data FROM loads WHERE id = $1 FOR UPDATE").bind(id))
            .await?
            .ok_or_else(not_found_error)?;

        decode_data(&result)
    }

    #[tracing::instrument(skip(self, load), fields(load_id = %load.id))]
    async fn insert_load(&mut self, load: &Load) -> Result<(), Error> {
        let tx = self.conn()?;

        tx.execute(
            sqlx::query(
                "INSERT INTO loads (id, shipper_id, status, created_at, data) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(load.id)
            .bind(load.shipper_id)
            .bind(load.status.name())
            .bind(load.created_at)
            .bind(Json(load)),
        )
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self, load), fields(load_id = %load.id))]
    async fn update_load(&mut self, load: &Load) -> Result<(), Error> {
        let tx = self.conn()?;

        tx.execute(
            sqlx::query("UPDATE loads SET status = $2, data = $3 WHERE id = $1")
                .bind(load.id)
                .bind(load.status.name())
                .bind(Json(load)),
        )
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_bid_for_update(&mut self, id: Uuid) -> Result<Bid, Error> {
        let tx = self.conn()?;

        let result = tx
            .fetch_optional(sqlx::query("SELECT data FROM bids WHERE id = $1 FOR UPDATE").bind(id))
            .await?
            .ok_or_else(not_found_error)?;

        decode_data(&result)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_bids_for_load_for_update(&mut self, load_id: Uuid) -> Result<Vec<Bid>, Error> {
        let tx = self.conn()?;

        let results = tx
            .fetch_all(
                sqlx::query(
                    "SELECT data FROM bids WHERE load_id = $1 ORDER BY created_at DESC FOR UPDATE",
                )
                .bind(load_id),
            )
            .await?;

        decode_all(&results)
    }

    #[tracing::instrument(skip(self))]
    async fn find_active_bid(
        &mut self,
        load_id: Uuid,
        carrier_id: Uuid,
    ) -> Result<Option<Bid>, Error> {
        let tx = self.conn()?;

        let maybe_result = tx
            .fetch_optional(
                sqlx::query("SELECT data FROM bids WHERE load_id = $1 AND carrier_id = $2 AND status <> 'withdrawn'")
                    .bind(load_id)
                    .bind(carrier_id),
            )
            .await?;

        maybe_result.as_ref().map(decode_data).transpose()
    }

    #[tracing::instrument(skip(self, bid), fields(bid_id = %bid.id))]
    async fn insert_bid(&mut self, bid: &Bid) -> Result<(), Error> {
        let tx = self.conn()?;

        let result = tx
            .execute(
                sqlx::query("INSERT INTO bids (id, load_id, carrier_id, status, created_at, data) VALUES ($1, $2, $3, $4, $5, $6)")
                    .bind(bid.id)
                    .bind(bid.load_id)
                    .bind(bid.carrier_id)
                    .bind(bid.status.name())
                    .bind(bid.created_at)
                    .bind(Json(bid)),
            )
            .await;

        result
            .map(|_| ())
            .map_err(|err| on_unique_violation(err, duplicate_bid_error))
    }

    #[tracing::instrument(skip(self, bid), fields(bid_id = %bid.id))]
    async fn update_bid(&mut self, bid: &Bid) -> Result<(), Error> {
        let tx = self.conn()?;

        let result = tx
            .execute(
                sqlx::query("UPDATE bids SET status = $2, data = $3 WHERE id = $1")
                    .bind(bid.id)
                    .bind(bid.status.name())
                    .bind(Json(bid)),
            )
            .await;

        // a second accepted bid on the load trips bids_one_accepted_per_load
        result
            .map(|_| ())
            .map_err(|err| on_unique_violation(err, conflict_error))
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_trip(&mut self, id: Uuid) -> Result<Trip, Error> {
        let tx = self.conn()?;

        let result = tx
            .fetch_optional(sqlx::query("SELECT data FROM trips WHERE id = $1").bind(id))
            .await?
            .ok_or_else(not_found_error)?;

        decode_data(&result)
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_trip_for_update(&mut self, id: Uuid) -> Result<Trip, Error> {
        let tx = self.conn()?;

        let result = tx
            .fetch_optional(sqlx::query("SELECT data FROM trips WHERE id = $1 FOR UPDATE").bind(id))
            .await?
            .ok_or_else(not_found_error)?;

        decode_data(&result)
    }

    #[tracing::instrument(skip(self, trip), fields(trip_id = %trip.id))]
    async fn insert_trip(&mut self, trip: &Trip) -> Result<(), Error> {
        let tx = self.conn()?;

        let result = tx
            .execute(
                sqlx::query("INSERT INTO trips (id, load_id, carrier_id, status, created_at, data) VALUES ($1, $2, $3, $4, $5, $6)")
                    .bind(trip.id)
                    .bind(trip.load_id)
                    .bind(trip.carrier_id)
                    .bind(trip.status.name())
                    .bind(trip.created_at)
                    .bind(Json(trip)),
            )
            .await;

        result
            .map(|_| ())
            .map_err(|err| on_unique_violation(err, conflict_error))
    }

    #[tracing::instrument(skip(self, trip), fields(trip_id = %trip.id))]
    async fn update_trip(&mut self, trip: &Trip) -> Result<(), Error> {
        let tx = self.conn()?;

        tx.execute(
            sqlx::query("UPDATE trips SET status = $2, data = $3 WHERE id = $1")
                .bind(trip.id)
                .bind(trip.status.name())
                .bind(Json(trip)),
        )
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self, event), fields(trip_id = %event.trip_id))]
    async fn insert_tracking_event(&mut self, event: &TrackingEvent) -> Result<(), Error> {
        let location: Option<wkb::Encode<Geometry<f64>>> = event
            .coordinates
            .map(|coordinates| wkb::Encode(coordinates.into()));

        let tx = self.conn()?;

        tx.execute(
            sqlx::query("INSERT INTO tracking_events (id, trip_id, author_id, location, created_at, data) VALUES ($1, $2, $3, ST_SetSRID($4, 4326), $5, $6)")
                .bind(event.id)
                .bind(event.trip_id)
                .bind(event.author_id)
                .bind(location)
                .bind(event.created_at)
                .bind(Json(event)),
        )
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_message(&mut self, id: Uuid) -> Result<TripMessage, Error> {
        let tx = self.conn()?;

        let result = tx
            .fetch_optional(
                sqlx::query("SELECT id, trip_id, sender_id, body, attachment_url, read_at, created_at FROM trip_messages WHERE id = $1")
                    .bind(id),
            )
            .await?
            .ok_or_else(not_found_error)?;

        message_from_row(&result)
    }

    #[tracing::instrument(skip(self, message), fields(trip_id = %message.trip_id))]
    async fn insert_message(&mut self, message: &TripMessage) -> Result<(), Error> {
        let tx = self.conn()?;

        tx.execute(
            sqlx::query("INSERT INTO trip_messages (id, trip_id, sender_id, body, attachment_url, read_at, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)")
                .bind(message.id)
                .bind(message.trip_id)
                .bind(message.sender_id)
                .bind(&message.body)
                .bind(&message.attachment_url)
                .bind(message.read_at)
                .bind(message.created_at),
        )
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn mark_messages_read(
        &mut self,
        trip_id: Uuid,
        recipient_id: Uuid,
        message_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let query = "
            UPDATE
                trip_messages
            SET
                read_at = $3
            WHERE
                trip_id = $1
                AND sender_id <> $2
                AND read_at IS NULL
                AND ($4::UUID IS NULL OR id = $4)
        ";

        let tx = self.conn()?;

        let result = tx
            .execute(
                sqlx::query(query)
                    .bind(trip_id)
                    .bind(recipient_id)
                    .bind(at)
                    .bind(message_id),
            )
            .await?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self, notification), fields(user_id = %notification.user_id))]
    async fn insert_notification(&mut self, notification: &Notification) -> Result<(), Error> {
        let tx = self.conn()?;

        tx.execute(
            sqlx::query("INSERT INTO notifications (id, user_id, kind, payload, is_read, created_at) VALUES ($1, $2, $3, $4, $5, $6)")
                .bind(notification.id)
                .bind(notification.user_id)
                .bind(notification.kind.name())
                .bind(Json(&notification.payload))
                .bind(notification.is_read)
                .bind(notification.created_at),
        )
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn mark_notifications_read(
        &mut self,
        user_id: Uuid,
        notification_id: Option<Uuid>,
    ) -> Result<u64, Error> {
        let tx = self.conn()?;

        let result = tx
            .execute(
                sqlx::query("UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND NOT is_read AND ($2::UUID IS NULL OR id = $2)")
                    .bind(user_id)
                    .bind(notification_id),
            )
            .await?;

        Ok(result.rows_affected())
    }

    async fn commit(&mut self) -> Result<(), Error> {
        let tx = self.tx.take().ok_or_else(unexpected_error)?;
        tx.commit().await?;

        Ok(())
    }
}
