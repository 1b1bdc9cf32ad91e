//! Persistence gateway for canonical events.
//!
//! Each canonical event variant maps to exactly one table: access events to
//! `events`, heartbeats to `heartbeats`. Every accepted notification inserts
//! a new row inside a single transaction scoped to the inbound request;
//! there is no upsert or dedup (the device protocol carries no idempotency
//! key, so a redelivered notification produces a second row by design).
//!
//! The store is an enum over two backends: Postgres for production and an
//! in-memory map for dev mode and tests, both honoring the same contract.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use thiserror::Error;

use crate::types::{AccessEvent, CanonicalEvent, Heartbeat};

/// Maximum connections in the Postgres pool.
const MAX_POOL_CONNECTIONS: u32 = 5;

/// A stored access event, as returned by the database.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct EventRow {
    pub id: i64,
    pub date_time: DateTime<Utc>,
    pub device_id: String,
    pub event_type: String,
    pub event_state: Option<String>,
    pub event_description: Option<String>,
    pub employee_no: Option<String>,
    pub person_name: Option<String>,
    pub major_event_type: i64,
    pub sub_event_type: i64,
    pub serial_no: Option<i64>,
    pub verify_no: Option<i64>,
    pub purpose: String,
    pub zone_type: Option<i64>,
    pub card_no: Option<String>,
    pub card_type: Option<i64>,
    pub swipe_card_type: Option<i64>,
    pub user_type: Option<String>,
    pub current_verify_mode: Option<String>,
    pub attendance_status: Option<String>,
    pub pictures_number: Option<i64>,
    pub mask: Option<bool>,
    pub picture_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A stored heartbeat, as returned by the database.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct HeartbeatRow {
    pub id: i64,
    pub date_time: DateTime<Utc>,
    pub device_id: String,
    pub event_type: String,
    pub event_state: Option<String>,
    pub event_description: Option<String>,
    pub active_post_count: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// One durable row produced by a successful persist call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StoredRecord {
    Event(EventRow),
    Heartbeat(HeartbeatRow),
}

impl StoredRecord {
    /// The server-assigned identity of this record.
    #[must_use]
    pub fn id(&self) -> i64 {
        match self {
            Self::Event(row) => row.id,
            Self::Heartbeat(row) => row.id,
        }
    }

    /// When the server stored this record.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Event(row) => row.created_at,
            Self::Heartbeat(row) => row.created_at,
        }
    }
}

/// Infrastructure-level persistence failure. Surfaced as a 500; never
/// retried at this layer.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database failure: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failure: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Storage backend: Postgres in production, in-memory for dev mode and
/// tests. Enum dispatch keeps call sites free of trait objects.
#[derive(Clone)]
pub enum EventStore {
    Postgres(Database),
    InMemory(Arc<InMemoryStore>),
}

impl EventStore {
    /// Connects to Postgres and runs pending migrations.
    ///
    /// # Errors
    ///
    /// Fails if the pool cannot be established or a migration fails.
    pub async fn connect(database_url: &str) -> Result<Self, PersistenceError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_POOL_CONNECTIONS)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self::Postgres(Database::new(pool)))
    }

    /// Creates an in-memory store. All data is lost on restart.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::InMemory(Arc::new(InMemoryStore::new()))
    }

    /// Persists one canonical event, returning the stored record with its
    /// assigned identity and creation timestamp.
    ///
    /// `picture_ref` is the filename assigned to an attachment saved in the
    /// same request, if any; heartbeats never carry one.
    ///
    /// # Errors
    ///
    /// Any database-level failure rolls the transaction back and surfaces
    /// as a [`PersistenceError`].
    pub async fn persist(
        &self,
        event: &CanonicalEvent,
        picture_ref: Option<&str>,
    ) -> Result<StoredRecord, PersistenceError> {
        match (self, event) {
            (Self::Postgres(db), CanonicalEvent::Access(ev)) => {
                Ok(StoredRecord::Event(db.insert_access(ev, picture_ref).await?))
            }
            (Self::Postgres(db), CanonicalEvent::Heartbeat(hb)) => {
                Ok(StoredRecord::Heartbeat(db.insert_heartbeat(hb).await?))
            }
            (Self::InMemory(mem), CanonicalEvent::Access(ev)) => {
                Ok(StoredRecord::Event(mem.insert_access(ev, picture_ref)))
            }
            (Self::InMemory(mem), CanonicalEvent::Heartbeat(hb)) => {
                Ok(StoredRecord::Heartbeat(mem.insert_heartbeat(hb)))
            }
        }
    }
}

/// Postgres repository.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_access(
        &self,
        event: &AccessEvent,
        picture_ref: Option<&str>,
    ) -> Result<EventRow, PersistenceError> {
        let detail = &event.detail;
        // Dropping the transaction on an early return rolls it back.
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, EventRow>(
            r#"
            INSERT INTO events (
                date_time, device_id, event_type, event_state, event_description,
                employee_no, person_name, major_event_type, sub_event_type,
                serial_no, verify_no, purpose, zone_type, card_no, card_type,
                swipe_card_type, user_type, current_verify_mode,
                attendance_status, pictures_number, mask, picture_url
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21, $22)
            RETURNING id, date_time, device_id, event_type, event_state,
                      event_description, employee_no, person_name,
                      major_event_type, sub_event_type, serial_no, verify_no,
                      purpose, zone_type, card_no, card_type, swipe_card_type,
                      user_type, current_verify_mode, attendance_status,
                      pictures_number, mask, picture_url, created_at
            "#,
        )
        .bind(event.date_time)
        .bind(&event.device_id)
        .bind(&event.event_type)
        .bind(&event.event_state)
        .bind(&event.event_description)
        .bind(&detail.employee_no)
        .bind(&detail.person_name)
        .bind(detail.major_event_type)
        .bind(detail.sub_event_type)
        .bind(detail.serial_no)
        .bind(detail.verify_no)
        .bind(detail.purpose.as_str())
        .bind(detail.zone_type)
        .bind(&detail.card_no)
        .bind(detail.card_type)
        .bind(detail.swipe_card_type)
        .bind(&detail.user_type)
        .bind(&detail.current_verify_mode)
        .bind(&detail.attendance_status)
        .bind(detail.pictures_number)
        .bind(detail.mask)
        .bind(picture_ref)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(row)
    }

    async fn insert_heartbeat(&self, heartbeat: &Heartbeat) -> Result<HeartbeatRow, PersistenceError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, HeartbeatRow>(
            r#"
            INSERT INTO heartbeats (
                date_time, device_id, event_type, event_state,
                event_description, active_post_count
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, date_time, device_id, event_type, event_state,
                      event_description, active_post_count, created_at
            "#,
        )
        .bind(heartbeat.date_time)
        .bind(&heartbeat.device_id)
        .bind(&heartbeat.event_type)
        .bind(&heartbeat.event_state)
        .bind(&heartbeat.event_description)
        .bind(heartbeat.active_post_count)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(row)
    }
}

/// In-memory store for dev mode and tests.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    events: RwLock<Vec<EventRow>>,
    heartbeats: RwLock<Vec<HeartbeatRow>>,
    next_id: AtomicI64,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            heartbeats: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    fn assign_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn insert_access(&self, event: &AccessEvent, picture_ref: Option<&str>) -> EventRow {
        let detail = &event.detail;
        let row = EventRow {
            id: self.assign_id(),
            date_time: event.date_time,
            device_id: event.device_id.clone(),
            event_type: event.event_type.clone(),
            event_state: event.event_state.clone(),
            event_description: event.event_description.clone(),
            employee_no: detail.employee_no.clone(),
            person_name: detail.person_name.clone(),
            major_event_type: detail.major_event_type,
            sub_event_type: detail.sub_event_type,
            serial_no: detail.serial_no,
            verify_no: detail.verify_no,
            purpose: detail.purpose.as_str().to_string(),
            zone_type: detail.zone_type,
            card_no: detail.card_no.clone(),
            card_type: detail.card_type,
            swipe_card_type: detail.swipe_card_type,
            user_type: detail.user_type.clone(),
            current_verify_mode: detail.current_verify_mode.clone(),
            attendance_status: detail.attendance_status.clone(),
            pictures_number: detail.pictures_number,
            mask: detail.mask,
            picture_url: picture_ref.map(String::from),
            created_at: Utc::now(),
        };
        self.events.write().push(row.clone());
        row
    }

    fn insert_heartbeat(&self, heartbeat: &Heartbeat) -> HeartbeatRow {
        let row = HeartbeatRow {
            id: self.assign_id(),
            date_time: heartbeat.date_time,
            device_id: heartbeat.device_id.clone(),
            event_type: heartbeat.event_type.clone(),
            event_state: heartbeat.event_state.clone(),
            event_description: heartbeat.event_description.clone(),
            active_post_count: heartbeat.active_post_count,
            created_at: Utc::now(),
        };
        self.heartbeats.write().push(row.clone());
        row
    }

    /// Snapshot of the stored access events.
    #[must_use]
    pub fn events(&self) -> Vec<EventRow> {
        self.events.read().clone()
    }

    /// Snapshot of the stored heartbeats.
    #[must_use]
    pub fn heartbeats(&self) -> Vec<HeartbeatRow> {
        self.heartbeats.read().clone()
    }
}
