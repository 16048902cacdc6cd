//! The booking engine: slot resolution, capacity verification, appointment
//! writing and counter reconciliation.
//!
//! Stateless service over injected store handles. The capacity check here
//! is an application-level pre-check only; two concurrent requests can
//! both pass it for the last seat. The hard guarantee belongs to the
//! storage layer (row locking or a check constraint on active appointments
//! per slot).

use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use log::{info, warn};
use uuid::Uuid;

use super::error::BookingError;
use super::store::{
    AppointmentStore, ClientStore, LinkColumns, PropertyResolver, SlotStore, StoreError,
};
use super::time;
use super::{Appointment, AppointmentStatus, BookingRequest, BookingSlot, NewAppointment, Operation};

/// Bound on schema-degradation retries: one per optional linkage column.
const MAX_WRITE_ATTEMPTS: usize = 3;

pub struct BookingEngine {
    slots: Arc<dyn SlotStore>,
    appointments: Arc<dyn AppointmentStore>,
    clients: Arc<dyn ClientStore>,
    properties: Arc<dyn PropertyResolver>,
}

struct ParsedRequest {
    date: NaiveDate,
    agent_id: Uuid,
    name: String,
    email: String,
    operation: Operation,
}

impl BookingEngine {
    pub fn new(
        slots: Arc<dyn SlotStore>,
        appointments: Arc<dyn AppointmentStore>,
        clients: Arc<dyn ClientStore>,
        properties: Arc<dyn PropertyResolver>,
    ) -> Self {
        Self {
            slots,
            appointments,
            clients,
            properties,
        }
    }

    /// The full booking flow: normalize, resolve, verify capacity, write,
    /// reconcile.
    pub async fn book(&self, req: BookingRequest) -> Result<Appointment, BookingError> {
        let parsed = parse_request(&req)?;
        let slot = self
            .resolve_slot(parsed.date, &req.time, parsed.agent_id)
            .await?;
        self.verify_capacity(&slot).await?;

        let client_id = self.upsert_client(&parsed, req.phone.as_deref()).await;
        let property_id = self.resolve_property(req.property_id.as_deref()).await;

        let record = NewAppointment {
            slot_id: slot.id,
            agent_id: slot.agent_id,
            client_name: parsed.name.clone(),
            client_email: parsed.email.clone(),
            client_phone: req.phone.clone(),
            client_id,
            property_id,
            operation_type: parsed.operation.operation_type().to_string(),
            budget_range: parsed.operation.budget_range(),
            operation_details: parsed.operation.details_document(),
            status: AppointmentStatus::Pending.to_string(),
            notes: req.notes.clone(),
        };

        let stored = self.write_with_degradation(None, &record).await?;
        info!(
            "booked appointment {} on slot {} for {}",
            stored.id, slot.id, stored.client_email
        );
        self.reconcile_slot(slot.id).await;
        Ok(stored)
    }

    /// Update an existing appointment. Re-resolves the slot from the
    /// request; when the slot changes, both the previous and the new slot
    /// are reconciled after a successful write.
    pub async fn update(&self, id: Uuid, req: BookingRequest) -> Result<Appointment, BookingError> {
        let parsed = parse_request(&req)?;
        let existing = self
            .appointments
            .get(id)
            .await
            .map_err(persistence)?
            .ok_or(BookingError::AppointmentNotFound(id))?;

        let slot = self
            .resolve_slot(parsed.date, &req.time, parsed.agent_id)
            .await?;
        let slot_changed = slot.id != existing.slot_id;
        // The appointment already holds a seat on its own slot, so only a
        // reassignment needs a fresh capacity check.
        if slot_changed {
            self.verify_capacity(&slot).await?;
        }

        let client_id = self.upsert_client(&parsed, req.phone.as_deref()).await;
        let property_id = self.resolve_property(req.property_id.as_deref()).await;

        let record = NewAppointment {
            slot_id: slot.id,
            agent_id: slot.agent_id,
            client_name: parsed.name.clone(),
            client_email: parsed.email.clone(),
            client_phone: req.phone.clone(),
            client_id,
            property_id,
            operation_type: parsed.operation.operation_type().to_string(),
            budget_range: parsed.operation.budget_range(),
            operation_details: parsed.operation.details_document(),
            status: existing.status.clone(),
            notes: req.notes.clone(),
        };

        let stored = self.write_with_degradation(Some(id), &record).await?;
        if slot_changed {
            self.reconcile_slot(existing.slot_id).await;
        }
        self.reconcile_slot(slot.id).await;
        Ok(stored)
    }

    pub async fn get_appointment(&self, id: Uuid) -> Result<Appointment, BookingError> {
        self.appointments
            .get(id)
            .await
            .map_err(persistence)?
            .ok_or(BookingError::AppointmentNotFound(id))
    }

    /// Staff status transition. Transitions that release the seat
    /// reconcile the slot's counter.
    pub async fn transition_status(
        &self,
        id: Uuid,
        next: AppointmentStatus,
    ) -> Result<Appointment, BookingError> {
        let existing = self
            .appointments
            .get(id)
            .await
            .map_err(persistence)?
            .ok_or(BookingError::AppointmentNotFound(id))?;
        let current = AppointmentStatus::from_str(&existing.status).map_err(|_| {
            BookingError::Persistence(format!(
                "appointment {} has unrecognized stored status {:?}",
                id, existing.status
            ))
        })?;

        if !current.can_transition_to(next) {
            return Err(BookingError::Validation(format!(
                "cannot transition appointment from {current} to {next}"
            )));
        }

        let updated = self
            .appointments
            .set_status(id, &next.to_string())
            .await
            .map_err(persistence)?;
        if !next.is_active() {
            self.reconcile_slot(updated.slot_id).await;
        }
        Ok(updated)
    }

    /// Enabled slots for a date, with their advisory occupancy counters.
    pub async fn list_slots(
        &self,
        date: &str,
        agent_id: Option<Uuid>,
    ) -> Result<Vec<BookingSlot>, BookingError> {
        let date = parse_date(date)?;
        self.slots
            .list_enabled_slots(date, agent_id.unwrap_or_else(Uuid::nil))
            .await
            .map_err(persistence)
    }

    // ===== Slot Resolver =====

    async fn resolve_slot(
        &self,
        date: NaiveDate,
        raw_time: &str,
        agent_id: Uuid,
    ) -> Result<BookingSlot, BookingError> {
        let candidates = self
            .slots
            .list_enabled_slots(date, agent_id)
            .await
            .map_err(persistence)?;

        let wanted = time::normalize_hhmm(raw_time);
        let matching: Vec<&BookingSlot> = candidates
            .iter()
            .filter(|slot| time::normalize_hhmm(&slot.start_time) == wanted)
            .collect();

        match matching.as_slice() {
            [] => {
                let mut available: Vec<String> = candidates
                    .iter()
                    .map(|slot| time::normalize_hhmm(&slot.start_time))
                    .collect();
                available.sort();
                available.dedup();
                Err(BookingError::SlotNotFound {
                    date,
                    time: wanted,
                    available,
                })
            }
            [only] => Ok((*only).clone()),
            [first, rest @ ..] => {
                // Duplicate slot rows for one time are a data-integrity
                // problem owned by schedule configuration; the store's
                // first row wins.
                warn!(
                    "{} duplicate slots at {} on {} for agent {}; using {}",
                    rest.len() + 1,
                    wanted,
                    date,
                    agent_id,
                    first.id
                );
                Ok((*first).clone())
            }
        }
    }

    // ===== Capacity Verifier =====

    async fn verify_capacity(&self, slot: &BookingSlot) -> Result<(), BookingError> {
        match self.appointments.count_active(slot.id).await {
            Ok(live) => {
                if live < i64::from(slot.capacity) {
                    Ok(())
                } else {
                    Err(BookingError::CapacityExceeded {
                        capacity: slot.capacity,
                        booked_count: live,
                    })
                }
            }
            Err(err) => {
                warn!(
                    "live occupancy count failed for slot {}: {}; falling back to cached counter (low confidence)",
                    slot.id, err
                );
                match slot.booked {
                    Some(cached) if i64::from(cached) < i64::from(slot.capacity) => Ok(()),
                    Some(cached) => Err(BookingError::CapacityExceeded {
                        capacity: slot.capacity,
                        booked_count: i64::from(cached),
                    }),
                    // No usable signal at all; fail open rather than
                    // refuse the booking.
                    None => {
                        warn!(
                            "no occupancy signal for slot {}; treating as available",
                            slot.id
                        );
                        Ok(())
                    }
                }
            }
        }
    }

    // ===== Appointment Writer =====

    async fn write_with_degradation(
        &self,
        target: Option<Uuid>,
        record: &NewAppointment,
    ) -> Result<Appointment, BookingError> {
        let caps = self.appointments.capabilities().await;
        let mut links = LinkColumns {
            property: caps.property_link && record.property_id.is_some(),
            client: caps.client_link && record.client_id.is_some(),
        };

        for _ in 0..MAX_WRITE_ATTEMPTS {
            let result = match target {
                None => self.appointments.insert(record, links).await,
                Some(id) => self.appointments.update(id, record, links).await,
            };
            match result {
                Ok(stored) => return Ok(stored),
                Err(StoreError::MissingColumn(col)) if col == "property_id" && links.property => {
                    warn!("appointment store has no property_id column; retrying without property linkage");
                    links.property = false;
                }
                Err(StoreError::MissingColumn(col)) if col == "client_id" && links.client => {
                    warn!("appointment store has no client_id column; retrying without client linkage");
                    links.client = false;
                }
                Err(err) => return Err(persistence(err)),
            }
        }
        Err(BookingError::Persistence(
            "appointment write failed after dropping optional linkage fields".to_string(),
        ))
    }

    async fn upsert_client(&self, parsed: &ParsedRequest, phone: Option<&str>) -> Option<Uuid> {
        match self
            .clients
            .upsert_by_email(&parsed.email, &parsed.name, phone)
            .await
        {
            Ok(id) => Some(id),
            Err(err) => {
                // Non-fatal: the appointment keeps its denormalized
                // contact copy either way.
                warn!("client upsert failed for {}: {}", parsed.email, err);
                None
            }
        }
    }

    async fn resolve_property(&self, external_ref: Option<&str>) -> Option<Uuid> {
        match external_ref {
            Some(reference) => self.properties.resolve(reference).await,
            None => None,
        }
    }

    // ===== Counter Reconciler =====

    /// Recompute the slot's advisory `booked` counter from live data.
    /// Best-effort: failures are logged and swallowed, never propagated,
    /// and never undo an appointment write.
    pub async fn reconcile_slot(&self, slot_id: Uuid) {
        if let Err(err) = self.try_reconcile(slot_id).await {
            warn!(
                "counter reconciliation for slot {} failed (booking unaffected): {}",
                slot_id, err
            );
        }
    }

    async fn try_reconcile(&self, slot_id: Uuid) -> Result<(), StoreError> {
        let live = self.appointments.count_active(slot_id).await?;
        let Some(slot) = self.slots.get_slot(slot_id).await? else {
            return Ok(());
        };
        let booked = live.min(i64::from(slot.capacity)) as i32;
        self.slots.set_booked(slot_id, booked).await
    }
}

fn parse_request(req: &BookingRequest) -> Result<ParsedRequest, BookingError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(BookingError::Validation("name is required".to_string()));
    }
    let email = normalize_email(&req.email);
    if email.is_empty() || !email.contains('@') {
        return Err(BookingError::Validation(
            "a valid email is required".to_string(),
        ));
    }
    if req.time.trim().is_empty() {
        return Err(BookingError::Validation("time is required".to_string()));
    }
    let date = parse_date(&req.date)?;
    let operation = req.operation.to_operation()?;

    Ok(ParsedRequest {
        date,
        agent_id: req.agent_id.unwrap_or_else(Uuid::nil),
        name: name.to_string(),
        email,
        operation,
    })
}

fn parse_date(raw: &str) -> Result<NaiveDate, BookingError> {
    let normalized = time::normalize_date(raw);
    NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
        .map_err(|_| BookingError::Validation(format!("invalid date: {raw:?}")))
}

/// Client identity key: trimmed, lower-cased email.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn persistence(err: StoreError) -> BookingError {
    BookingError::Persistence(err.to_string())
}
