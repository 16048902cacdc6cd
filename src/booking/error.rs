use axum::{response::IntoResponse, Json};
use chrono::NaiveDate;
use uuid::Uuid;

/// Terminal, caller-visible failures of the booking flow.
///
/// Client-upsert and counter-reconciliation failures are deliberately not
/// represented here: they are logged and swallowed, and the booking still
/// succeeds.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("No bookable slot at {time} on {date}. Available times: {}", format_times(.available))]
    SlotNotFound {
        date: NaiveDate,
        time: String,
        available: Vec<String>,
    },
    #[error("Appointment {0} not found")]
    AppointmentNotFound(Uuid),
    #[error("Slot is fully booked ({booked_count}/{capacity})")]
    CapacityExceeded { capacity: i32, booked_count: i64 },
    #[error("Persistence error: {0}")]
    Persistence(String),
}

fn format_times(available: &[String]) -> String {
    if available.is_empty() {
        "none".to_string()
    } else {
        available.join(", ")
    }
}

impl BookingError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::SlotNotFound { .. } | Self::AppointmentNotFound(_) => "not_found",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::Persistence(_) => "persistence",
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::SlotNotFound { available, .. } => {
                Some(serde_json::json!({ "availableTimes": available }))
            }
            Self::CapacityExceeded {
                capacity,
                booked_count,
            } => Some(serde_json::json!({
                "capacity": capacity,
                "bookedCount": booked_count,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::SlotNotFound { .. } | Self::AppointmentNotFound(_) => StatusCode::NOT_FOUND,
            Self::CapacityExceeded { .. } => StatusCode::CONFLICT,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let mut body = serde_json::json!({
            "errorKind": self.kind(),
            "message": self.to_string(),
        });
        if let Some(details) = self.details() {
            body["details"] = details;
        }
        (status, Json(body)).into_response()
    }
}
