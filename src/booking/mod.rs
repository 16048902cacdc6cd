//! Property-viewing booking.
//!
//! Slot resolution and capacity-gated appointment creation: a client asks
//! for a date and time with an agent, the engine finds the matching
//! enabled slot, verifies remaining capacity against live appointment
//! counts, writes the appointment, and refreshes the slot's advisory
//! occupancy counter.

pub mod engine;
pub mod error;
pub mod store;
pub mod time;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::shared::schema::{appointments, booking_slots, clients};
use crate::shared::state::AppState;

use self::error::BookingError;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = booking_slots)]
pub struct BookingSlot {
    pub id: Uuid,
    pub slot_date: NaiveDate,
    pub start_time: String,
    pub capacity: i32,
    /// Advisory occupancy cache. May lag behind the live appointment
    /// count; never authoritative.
    pub booked: Option<i32>,
    pub enabled: bool,
    pub agent_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = appointments)]
pub struct Appointment {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub agent_id: Uuid,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub client_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub operation_type: String,
    pub budget_range: Option<String>,
    pub operation_details: serde_json::Value,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = clients)]
pub struct Client {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Appointment record as the engine hands it to the store; the store
/// assigns id and timestamps on insert.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub slot_id: Uuid,
    pub agent_id: Uuid,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub client_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub operation_type: String,
    pub budget_range: Option<String>,
    pub operation_details: serde_json::Value,
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "confirmed")]
    Confirmed,
    #[serde(rename = "cancelled")]
    Cancelled,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "no-show")]
    NoShow,
}

impl AppointmentStatus {
    /// Pending and confirmed appointments hold a seat on their slot.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }

    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed)
                | (Self::Pending, Self::Cancelled)
                | (Self::Confirmed, Self::Completed)
                | (Self::Confirmed, Self::NoShow)
        )
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Completed => write!(f, "completed"),
            Self::NoShow => write!(f, "no-show"),
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            "completed" => Ok(Self::Completed),
            "no-show" => Ok(Self::NoShow),
            other => Err(BookingError::Validation(format!(
                "unknown appointment status: {other}"
            ))),
        }
    }
}

// ===== Request payloads =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub date: String,
    pub time: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(flatten)]
    pub operation: OperationRequest,
    #[serde(default, rename = "propertyId")]
    pub property_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, rename = "agentId")]
    pub agent_id: Option<Uuid>,
}

/// Operation payload, tagged by `operationType` on the wire. The purchase
/// variant carries its financing fields flat, as the callers send them;
/// [`OperationRequest::to_operation`] lifts them into the typed
/// [`Operation`] the engine matches on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operationType")]
pub enum OperationRequest {
    #[serde(rename = "rentar")]
    Rentar {
        #[serde(default, rename = "budgetRentar")]
        budget: Option<String>,
        #[serde(default)]
        company: Option<String>,
    },
    #[serde(rename = "comprar")]
    Comprar {
        #[serde(default, rename = "budgetComprar")]
        budget: Option<String>,
        #[serde(default, rename = "resourceType")]
        resource_type: Option<String>,
        #[serde(default)]
        banco: Option<String>,
        #[serde(default, rename = "creditoPreaprobado")]
        credito_preaprobado: Option<bool>,
        #[serde(default, rename = "modalidadInfonavit")]
        modalidad_infonavit: Option<String>,
        #[serde(default, rename = "numeroTrabajadorInfonavit")]
        numero_trabajador_infonavit: Option<String>,
        #[serde(default, rename = "modalidadFovissste")]
        modalidad_fovissste: Option<String>,
        #[serde(default, rename = "numeroTrabajadorFovissste")]
        numero_trabajador_fovissste: Option<String>,
    },
}

impl OperationRequest {
    pub fn to_operation(&self) -> Result<Operation, BookingError> {
        match self {
            Self::Rentar { budget, company } => Ok(Operation::Rentar {
                budget: budget.clone(),
                company: company.clone(),
            }),
            Self::Comprar {
                budget,
                resource_type,
                banco,
                credito_preaprobado,
                modalidad_infonavit,
                numero_trabajador_infonavit,
                modalidad_fovissste,
                numero_trabajador_fovissste,
            } => {
                let financing = match resource_type.as_deref() {
                    None => None,
                    Some("credito_bancario") => Some(Financing::CreditoBancario {
                        banco: banco.clone(),
                        pre_approved: *credito_preaprobado,
                    }),
                    Some("infonavit") => Some(Financing::Infonavit {
                        modalidad: modalidad_infonavit.clone(),
                        worker_number: numero_trabajador_infonavit.clone(),
                    }),
                    Some("fovissste") => Some(Financing::Fovissste {
                        modalidad: modalidad_fovissste.clone(),
                        worker_number: numero_trabajador_fovissste.clone(),
                    }),
                    Some("contado") => Some(Financing::Contado),
                    Some(other) => {
                        return Err(BookingError::Validation(format!(
                            "unknown resourceType: {other}"
                        )))
                    }
                };
                Ok(Operation::Comprar {
                    budget: budget.clone(),
                    financing,
                })
            }
        }
    }
}

/// Typed operation the engine works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Rentar {
        budget: Option<String>,
        company: Option<String>,
    },
    Comprar {
        budget: Option<String>,
        financing: Option<Financing>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Financing {
    CreditoBancario {
        banco: Option<String>,
        pre_approved: Option<bool>,
    },
    Infonavit {
        modalidad: Option<String>,
        worker_number: Option<String>,
    },
    Fovissste {
        modalidad: Option<String>,
        worker_number: Option<String>,
    },
    Contado,
}

impl Operation {
    pub fn operation_type(&self) -> &'static str {
        match self {
            Self::Rentar { .. } => "rentar",
            Self::Comprar { .. } => "comprar",
        }
    }

    pub fn budget_range(&self) -> Option<String> {
        match self {
            Self::Rentar { budget, .. } | Self::Comprar { budget, .. } => budget.clone(),
        }
    }

    /// Operation-specific detail as one open document keyed by the
    /// operation type, the shape stored in `operation_details`.
    pub fn details_document(&self) -> serde_json::Value {
        match self {
            Self::Rentar { company, .. } => serde_json::json!({
                "rentar": { "company": company }
            }),
            Self::Comprar { financing, .. } => {
                let detail = match financing {
                    None => serde_json::json!({}),
                    Some(Financing::CreditoBancario {
                        banco,
                        pre_approved,
                    }) => serde_json::json!({
                        "resourceType": "credito_bancario",
                        "banco": banco,
                        "creditoPreaprobado": pre_approved,
                    }),
                    Some(Financing::Infonavit {
                        modalidad,
                        worker_number,
                    }) => serde_json::json!({
                        "resourceType": "infonavit",
                        "modalidad": modalidad,
                        "numeroTrabajador": worker_number,
                    }),
                    Some(Financing::Fovissste {
                        modalidad,
                        worker_number,
                    }) => serde_json::json!({
                        "resourceType": "fovissste",
                        "modalidad": modalidad,
                        "numeroTrabajador": worker_number,
                    }),
                    Some(Financing::Contado) => serde_json::json!({
                        "resourceType": "contado",
                    }),
                };
                serde_json::json!({ "comprar": detail })
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ListSlotsQuery {
    pub date: String,
    #[serde(default, rename = "agentId")]
    pub agent_id: Option<Uuid>,
}

// ===== HTTP handlers =====

pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BookingRequest>,
) -> Result<Json<Appointment>, BookingError> {
    let appointment = state.engine.book(req).await?;
    Ok(Json(appointment))
}

pub async fn get_appointment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Appointment>, BookingError> {
    let appointment = state.engine.get_appointment(id).await?;
    Ok(Json(appointment))
}

pub async fn update_appointment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<BookingRequest>,
) -> Result<Json<Appointment>, BookingError> {
    let appointment = state.engine.update(id, req).await?;
    Ok(Json(appointment))
}

pub async fn change_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangeStatusRequest>,
) -> Result<Json<Appointment>, BookingError> {
    let next = AppointmentStatus::from_str(&req.status)?;
    let appointment = state.engine.transition_status(id, next).await?;
    Ok(Json(appointment))
}

pub async fn list_slots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListSlotsQuery>,
) -> Result<Json<Vec<BookingSlot>>, BookingError> {
    let slots = state.engine.list_slots(&query.date, query.agent_id).await?;
    Ok(Json(slots))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/booking/appointments", post(create_appointment))
        .route(
            "/api/booking/appointments/{id}",
            get(get_appointment).put(update_appointment),
        )
        .route("/api/booking/appointments/{id}/status", post(change_status))
        .route("/api/booking/slots", get(list_slots))
}
