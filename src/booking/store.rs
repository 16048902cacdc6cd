//! Storage seams for the booking engine.
//!
//! The engine never talks to diesel directly; it goes through these traits
//! so tests can inject in-memory fakes per case. The Postgres
//! implementations follow the shared connection-pool conventions of the
//! rest of the server.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use log::warn;
use uuid::Uuid;

use crate::shared::schema::{appointments, booking_slots, clients, properties};
use crate::shared::utils::DbPool;

use super::{Appointment, BookingSlot, NewAppointment};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("column {0} is not present in the current schema")]
    MissingColumn(String),
}

/// Which optional linkage columns the current appointment schema carries.
///
/// Queried from the store instead of inferred from error messages, so the
/// writer can decide up front which fields to include and degrade
/// deterministically when the schema has drifted underneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaCapabilities {
    pub property_link: bool,
    pub client_link: bool,
}

impl SchemaCapabilities {
    pub fn full() -> Self {
        Self {
            property_link: true,
            client_link: true,
        }
    }
}

/// Optional linkage columns to include in a particular write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkColumns {
    pub property: bool,
    pub client: bool,
}

#[async_trait]
pub trait SlotStore: Send + Sync {
    async fn list_enabled_slots(
        &self,
        date: NaiveDate,
        agent_id: Uuid,
    ) -> Result<Vec<BookingSlot>, StoreError>;
    async fn get_slot(&self, id: Uuid) -> Result<Option<BookingSlot>, StoreError>;
    async fn set_booked(&self, id: Uuid, count: i32) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn insert(
        &self,
        record: &NewAppointment,
        links: LinkColumns,
    ) -> Result<Appointment, StoreError>;
    async fn update(
        &self,
        id: Uuid,
        record: &NewAppointment,
        links: LinkColumns,
    ) -> Result<Appointment, StoreError>;
    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, StoreError>;
    async fn set_status(&self, id: Uuid, status: &str) -> Result<Appointment, StoreError>;
    /// Count of appointments holding a seat on the slot (pending or
    /// confirmed). Authoritative over the cached `booked` counter.
    async fn count_active(&self, slot_id: Uuid) -> Result<i64, StoreError>;
    async fn capabilities(&self) -> SchemaCapabilities;
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn upsert_by_email(
        &self,
        email: &str,
        name: &str,
        phone: Option<&str>,
    ) -> Result<Uuid, StoreError>;
}

#[async_trait]
pub trait PropertyResolver: Send + Sync {
    /// Resolve an external property reference to an internal id. Failures
    /// of any kind yield `None`, never an error.
    async fn resolve(&self, external_ref: &str) -> Option<Uuid>;
}

pub const ACTIVE_STATUSES: [&str; 2] = ["pending", "confirmed"];

// ===== Postgres implementations =====

pub struct PgSlotStore {
    pool: DbPool,
}

impl PgSlotStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SlotStore for PgSlotStore {
    async fn list_enabled_slots(
        &self,
        date: NaiveDate,
        agent_id: Uuid,
    ) -> Result<Vec<BookingSlot>, StoreError> {
        let mut conn = get_conn(&self.pool)?;
        booking_slots::table
            .filter(booking_slots::slot_date.eq(date))
            .filter(booking_slots::agent_id.eq(agent_id))
            .filter(booking_slots::enabled.eq(true))
            .order(booking_slots::start_time.asc())
            .load(&mut conn)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn get_slot(&self, id: Uuid) -> Result<Option<BookingSlot>, StoreError> {
        let mut conn = get_conn(&self.pool)?;
        booking_slots::table
            .find(id)
            .first(&mut conn)
            .optional()
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn set_booked(&self, id: Uuid, count: i32) -> Result<(), StoreError> {
        let mut conn = get_conn(&self.pool)?;
        diesel::update(booking_slots::table.find(id))
            .set((
                booking_slots::booked.eq(Some(count)),
                booking_slots::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }
}

pub struct PgAppointmentStore {
    pool: DbPool,
    caps: Mutex<Option<SchemaCapabilities>>,
}

impl PgAppointmentStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            caps: Mutex::new(None),
        }
    }

    fn cached_caps(&self) -> Option<SchemaCapabilities> {
        self.caps.lock().ok().and_then(|guard| *guard)
    }

    fn store_caps(&self, caps: SchemaCapabilities) {
        if let Ok(mut guard) = self.caps.lock() {
            *guard = Some(caps);
        }
    }

    /// A write failed at the database. Re-probe the schema: if a linkage
    /// column we tried to write has disappeared, report it by name so the
    /// caller can retry without it.
    fn classify_write_error(
        &self,
        conn: &mut PgConnection,
        err: diesel::result::Error,
        links: LinkColumns,
    ) -> StoreError {
        if matches!(err, diesel::result::Error::DatabaseError(_, _)) {
            match probe_capabilities(conn) {
                Ok(caps) => {
                    self.store_caps(caps);
                    if links.property && !caps.property_link {
                        return StoreError::MissingColumn("property_id".to_string());
                    }
                    if links.client && !caps.client_link {
                        return StoreError::MissingColumn("client_id".to_string());
                    }
                }
                Err(probe_err) => {
                    warn!("schema capability probe failed: {}", probe_err);
                }
            }
        }
        StoreError::Database(err.to_string())
    }
}

fn probe_capabilities(
    conn: &mut PgConnection,
) -> Result<SchemaCapabilities, diesel::result::Error> {
    #[derive(QueryableByName)]
    struct ColumnRow {
        #[diesel(sql_type = diesel::sql_types::Text)]
        column_name: String,
    }

    let rows: Vec<ColumnRow> = diesel::sql_query(
        "SELECT column_name FROM information_schema.columns WHERE table_name = 'appointments'",
    )
    .load(conn)?;

    let mut caps = SchemaCapabilities {
        property_link: false,
        client_link: false,
    };
    for row in rows {
        match row.column_name.as_str() {
            "property_id" => caps.property_link = true,
            "client_id" => caps.client_link = true,
            _ => {}
        }
    }
    Ok(caps)
}

#[async_trait]
impl AppointmentStore for PgAppointmentStore {
    async fn insert(
        &self,
        record: &NewAppointment,
        links: LinkColumns,
    ) -> Result<Appointment, StoreError> {
        let mut conn = get_conn(&self.pool)?;
        let now = Utc::now();

        // Dropped linkage fields become None so diesel omits their columns
        // from the INSERT entirely.
        let stored = Appointment {
            id: Uuid::new_v4(),
            slot_id: record.slot_id,
            agent_id: record.agent_id,
            client_name: record.client_name.clone(),
            client_email: record.client_email.clone(),
            client_phone: record.client_phone.clone(),
            client_id: if links.client { record.client_id } else { None },
            property_id: if links.property {
                record.property_id
            } else {
                None
            },
            operation_type: record.operation_type.clone(),
            budget_range: record.budget_range.clone(),
            operation_details: record.operation_details.clone(),
            status: record.status.clone(),
            notes: record.notes.clone(),
            created_at: now,
            updated_at: now,
        };

        diesel::insert_into(appointments::table)
            .values(&stored)
            .execute(&mut conn)
            .map_err(|e| self.classify_write_error(&mut conn, e, links))?;

        Ok(stored)
    }

    async fn update(
        &self,
        id: Uuid,
        record: &NewAppointment,
        links: LinkColumns,
    ) -> Result<Appointment, StoreError> {
        let mut conn = get_conn(&self.pool)?;
        let now = Utc::now();

        let changes = (
            appointments::slot_id.eq(record.slot_id),
            appointments::agent_id.eq(record.agent_id),
            appointments::client_name.eq(&record.client_name),
            appointments::client_email.eq(&record.client_email),
            appointments::client_phone.eq(record.client_phone.as_deref()),
            links
                .client
                .then(|| appointments::client_id.eq(record.client_id)),
            links
                .property
                .then(|| appointments::property_id.eq(record.property_id)),
            appointments::operation_type.eq(&record.operation_type),
            appointments::budget_range.eq(record.budget_range.as_deref()),
            appointments::operation_details.eq(&record.operation_details),
            appointments::notes.eq(record.notes.as_deref()),
            appointments::updated_at.eq(now),
        );

        diesel::update(appointments::table.find(id))
            .set(changes)
            .execute(&mut conn)
            .map_err(|e| self.classify_write_error(&mut conn, e, links))?;

        appointments::table
            .find(id)
            .first(&mut conn)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let mut conn = get_conn(&self.pool)?;
        appointments::table
            .find(id)
            .first(&mut conn)
            .optional()
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn set_status(&self, id: Uuid, status: &str) -> Result<Appointment, StoreError> {
        let mut conn = get_conn(&self.pool)?;
        diesel::update(appointments::table.find(id))
            .set((
                appointments::status.eq(status),
                appointments::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        appointments::table
            .find(id)
            .first(&mut conn)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn count_active(&self, slot_id: Uuid) -> Result<i64, StoreError> {
        let mut conn = get_conn(&self.pool)?;
        appointments::table
            .filter(appointments::slot_id.eq(slot_id))
            .filter(appointments::status.eq_any(ACTIVE_STATUSES))
            .count()
            .get_result(&mut conn)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn capabilities(&self) -> SchemaCapabilities {
        if let Some(caps) = self.cached_caps() {
            return caps;
        }
        let Ok(mut conn) = self.pool.get() else {
            return SchemaCapabilities::full();
        };
        match probe_capabilities(&mut conn) {
            Ok(caps) => {
                self.store_caps(caps);
                caps
            }
            Err(err) => {
                warn!(
                    "schema capability probe failed, assuming full schema: {}",
                    err
                );
                SchemaCapabilities::full()
            }
        }
    }
}

pub struct PgClientStore {
    pool: DbPool,
}

impl PgClientStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClientStore for PgClientStore {
    async fn upsert_by_email(
        &self,
        email: &str,
        name: &str,
        phone: Option<&str>,
    ) -> Result<Uuid, StoreError> {
        let mut conn = get_conn(&self.pool)?;
        let now = Utc::now();

        let existing: Option<Uuid> = clients::table
            .filter(clients::email.eq(email))
            .select(clients::id)
            .first(&mut conn)
            .optional()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if let Some(id) = existing {
            diesel::update(clients::table.find(id))
                .set((
                    clients::name.eq(name),
                    phone.map(|p| clients::phone.eq(p)),
                    clients::updated_at.eq(now),
                ))
                .execute(&mut conn)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            return Ok(id);
        }

        let id = Uuid::new_v4();
        diesel::insert_into(clients::table)
            .values((
                clients::id.eq(id),
                clients::email.eq(email),
                clients::name.eq(name),
                clients::phone.eq(phone),
                clients::created_at.eq(now),
                clients::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(id)
    }
}

pub struct PgPropertyResolver {
    pool: DbPool,
}

impl PgPropertyResolver {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PropertyResolver for PgPropertyResolver {
    async fn resolve(&self, external_ref: &str) -> Option<Uuid> {
        let reference = external_ref.trim();
        if reference.is_empty() {
            return None;
        }
        let mut conn = self.pool.get().ok()?;

        if let Ok(id) = Uuid::parse_str(reference) {
            let by_id = properties::table
                .find(id)
                .filter(properties::is_active.eq(true))
                .select(properties::id)
                .first::<Uuid>(&mut conn)
                .optional()
                .ok()
                .flatten();
            if by_id.is_some() {
                return by_id;
            }
        }

        properties::table
            .filter(properties::external_ref.eq(reference))
            .filter(properties::is_active.eq(true))
            .select(properties::id)
            .first::<Uuid>(&mut conn)
            .optional()
            .ok()
            .flatten()
    }
}

fn get_conn(
    pool: &DbPool,
) -> Result<diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<PgConnection>>, StoreError>
{
    pool.get().map_err(|e| StoreError::Pool(e.to_string()))
}
