//! In-memory store doubles shared by the booking scenario tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use visitaserver::booking::store::{
    AppointmentStore, ClientStore, LinkColumns, PropertyResolver, SchemaCapabilities, SlotStore,
    StoreError,
};
use visitaserver::booking::{Appointment, BookingSlot, Client, NewAppointment};

#[derive(Default)]
pub struct InMemoryStore {
    slots: Mutex<Vec<BookingSlot>>,
    appointments: Mutex<Vec<Appointment>>,
    clients: Mutex<Vec<Client>>,
    properties: Mutex<HashMap<String, Uuid>>,
    missing_columns: Mutex<HashSet<&'static str>>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_slot(
        &self,
        date: &str,
        start_time: &str,
        capacity: i32,
        booked: Option<i32>,
    ) -> Uuid {
        let now = Utc::now();
        let slot = BookingSlot {
            id: Uuid::new_v4(),
            slot_date: date.parse().expect("test slot date"),
            start_time: start_time.to_string(),
            capacity,
            booked,
            enabled: true,
            agent_id: Uuid::nil(),
            created_at: now,
            updated_at: now,
        };
        let id = slot.id;
        self.slots.lock().unwrap().push(slot);
        id
    }

    pub fn add_property(&self, external_ref: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.properties
            .lock()
            .unwrap()
            .insert(external_ref.to_string(), id);
        id
    }

    /// Simulate schema drift: the named column no longer exists.
    pub fn drop_column(&self, column: &'static str) {
        self.missing_columns.lock().unwrap().insert(column);
    }

    pub fn booked_counter(&self, slot_id: Uuid) -> Option<i32> {
        self.slots
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == slot_id)
            .and_then(|s| s.booked)
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    fn check_links(&self, links: LinkColumns) -> Result<(), StoreError> {
        let missing = self.missing_columns.lock().unwrap();
        if links.property && missing.contains("property_id") {
            return Err(StoreError::MissingColumn("property_id".to_string()));
        }
        if links.client && missing.contains("client_id") {
            return Err(StoreError::MissingColumn("client_id".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SlotStore for InMemoryStore {
    async fn list_enabled_slots(
        &self,
        date: NaiveDate,
        agent_id: Uuid,
    ) -> Result<Vec<BookingSlot>, StoreError> {
        Ok(self
            .slots
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.slot_date == date && s.agent_id == agent_id && s.enabled)
            .cloned()
            .collect())
    }

    async fn get_slot(&self, id: Uuid) -> Result<Option<BookingSlot>, StoreError> {
        Ok(self
            .slots
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn set_booked(&self, id: Uuid, count: i32) -> Result<(), StoreError> {
        if let Some(slot) = self.slots.lock().unwrap().iter_mut().find(|s| s.id == id) {
            slot.booked = Some(count);
            slot.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl AppointmentStore for InMemoryStore {
    async fn insert(
        &self,
        record: &NewAppointment,
        links: LinkColumns,
    ) -> Result<Appointment, StoreError> {
        self.check_links(links)?;
        let now = Utc::now();
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
        self.appointments.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        id: Uuid,
        record: &NewAppointment,
        links: LinkColumns,
    ) -> Result<Appointment, StoreError> {
        self.check_links(links)?;
        let mut appointments = self.appointments.lock().unwrap();
        let stored = appointments
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StoreError::Database("no such appointment".to_string()))?;
        stored.slot_id = record.slot_id;
        stored.agent_id = record.agent_id;
        stored.client_name = record.client_name.clone();
        stored.client_email = record.client_email.clone();
        stored.client_phone = record.client_phone.clone();
        if links.client {
            stored.client_id = record.client_id;
        }
        if links.property {
            stored.property_id = record.property_id;
        }
        stored.operation_type = record.operation_type.clone();
        stored.budget_range = record.budget_range.clone();
        stored.operation_details = record.operation_details.clone();
        stored.notes = record.notes.clone();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self
            .appointments
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn set_status(&self, id: Uuid, status: &str) -> Result<Appointment, StoreError> {
        let mut appointments = self.appointments.lock().unwrap();
        let stored = appointments
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StoreError::Database("no such appointment".to_string()))?;
        stored.status = status.to_string();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn count_active(&self, slot_id: Uuid) -> Result<i64, StoreError> {
        Ok(self
            .appointments
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.slot_id == slot_id)
            .filter(|a| a.status == "pending" || a.status == "confirmed")
            .count() as i64)
    }

    async fn capabilities(&self) -> SchemaCapabilities {
        let missing = self.missing_columns.lock().unwrap();
        SchemaCapabilities {
            property_link: !missing.contains("property_id"),
            client_link: !missing.contains("client_id"),
        }
    }
}

#[async_trait]
impl ClientStore for InMemoryStore {
    async fn upsert_by_email(
        &self,
        email: &str,
        name: &str,
        phone: Option<&str>,
    ) -> Result<Uuid, StoreError> {
        let mut clients = self.clients.lock().unwrap();
        if let Some(existing) = clients.iter_mut().find(|c| c.email == email) {
            existing.name = name.to_string();
            if let Some(p) = phone {
                existing.phone = Some(p.to_string());
            }
            existing.updated_at = Utc::now();
            return Ok(existing.id);
        }
        let now = Utc::now();
        let client = Client {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: name.to_string(),
            phone: phone.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        let id = client.id;
        clients.push(client);
        Ok(id)
    }
}

#[async_trait]
impl PropertyResolver for InMemoryStore {
    async fn resolve(&self, external_ref: &str) -> Option<Uuid> {
        self.properties.lock().unwrap().get(external_ref).copied()
    }
}
