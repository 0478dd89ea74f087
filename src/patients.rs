use crate::errors::ApiError;
use crate::models::{PatientCreate, PatientResponse, PatientRow};
use crate::predictions::{clamp_limit, clamp_skip, ListParams};
use crate::SharedState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::info;

const PATIENT_COLUMNS: &str =
    "id, patient_id, age, gender, clinical_notes, created_at, updated_at";

#[derive(Debug, Deserialize)]
pub struct NotesUpdate {
    pub clinical_notes: Option<String>,
}

/// POST /patients - register a patient. Everything but the clinical notes
/// is immutable afterwards.
pub async fn create_patient(
    State(state): State<SharedState>,
    Json(request): Json<PatientCreate>,
) -> Result<(StatusCode, Json<PatientResponse>), ApiError> {
    if !(0..=150).contains(&request.age) {
        return Err(ApiError::bad_request("Age must be between 0 and 150"));
    }

    let query = format!(
        "INSERT INTO patients (patient_id, age, gender, clinical_notes) \
         VALUES ($1, $2, $3, $4) RETURNING {}",
        PATIENT_COLUMNS
    );
    let row: Result<PatientRow, sqlx::Error> = sqlx::query_as(&query)
        .bind(&request.patient_id)
        .bind(request.age)
        .bind(request.gender.as_str())
        .bind(&request.clinical_notes)
        .fetch_one(&state.pool)
        .await;

    match row {
        Ok(row) => {
            info!("Registered patient {}", row.patient_id);
            Ok((StatusCode::CREATED, Json(row.into_response())))
        }
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
            ApiError::conflict(format!("Patient {} already exists", request.patient_id)),
        ),
        Err(err) => Err(err.into()),
    }
}

/// GET /patients/{patient_id}
pub async fn get_patient(
    State(state): State<SharedState>,
    Path(patient_id): Path<String>,
) -> Result<Json<PatientResponse>, ApiError> {
    let query = format!(
        "SELECT {} FROM patients WHERE patient_id = $1",
        PATIENT_COLUMNS
    );
    let row: Option<PatientRow> = sqlx::query_as(&query)
        .bind(&patient_id)
        .fetch_optional(&state.pool)
        .await?;

    match row {
        Some(row) => Ok(Json(row.into_response())),
        None => Err(ApiError::not_found(format!(
            "Patient {} not found",
            patient_id
        ))),
    }
}

/// GET /patients?skip=&limit=
pub async fn list_patients(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<PatientResponse>>, ApiError> {
    let query = format!(
        "SELECT {} FROM patients ORDER BY created_at DESC OFFSET $1 LIMIT $2",
        PATIENT_COLUMNS
    );
    let rows: Vec<PatientRow> = sqlx::query_as(&query)
        .bind(clamp_skip(params.skip))
        .bind(clamp_limit(params.limit, 100))
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(rows.into_iter().map(PatientRow::into_response).collect()))
}

/// PUT /patients/{patient_id}/notes - the single mutable field; the
/// updated_at column is maintained by a database trigger.
pub async fn update_patient_notes(
    State(state): State<SharedState>,
    Path(patient_id): Path<String>,
    Json(update): Json<NotesUpdate>,
) -> Result<Json<PatientResponse>, ApiError> {
    let query = format!(
        "UPDATE patients SET clinical_notes = $1 WHERE patient_id = $2 RETURNING {}",
        PATIENT_COLUMNS
    );
    let row: Option<PatientRow> = sqlx::query_as(&query)
        .bind(&update.clinical_notes)
        .bind(&patient_id)
        .fetch_optional(&state.pool)
        .await?;

    match row {
        Some(row) => {
            info!("Updated clinical notes for patient {}", patient_id);
            Ok(Json(row.into_response()))
        }
        None => Err(ApiError::not_found(format!(
            "Patient {} not found",
            patient_id
        ))),
    }
}
