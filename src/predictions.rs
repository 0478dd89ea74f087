use crate::errors::ApiError;
use crate::ml::{PredictError, PredictionInput};
use crate::models::{
    PredictionRequest, PredictionResponse, PredictionResult, PredictionRow, PredictionStatus,
};
use crate::SharedState;
use anyhow::anyhow;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use tracing::{error, info};

const PREDICTION_COLUMNS: &str = "id, patient_id, status, has_alzheimer, confidence_score, \
     risk_level, processing_time, model_version, error_message, created_at, completed_at";

#[derive(Debug, Deserialize)]
pub struct PatientResultsParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

/// POST /predict - insert a processing row, run the model synchronously,
/// then settle the row exactly once as completed or failed. A row is never
/// left in processing once this handler returns.
pub async fn create_prediction(
    State(state): State<SharedState>,
    Json(request): Json<PredictionRequest>,
) -> Result<(StatusCode, Json<PredictionResponse>), ApiError> {
    let (id, created_at): (i32, DateTime<Utc>) = sqlx::query_as(
        "INSERT INTO predictions (patient_id, status, image_path) VALUES ($1, $2, $3) RETURNING id, created_at",
    )
    .bind(&request.patient_id)
    .bind(PredictionStatus::Processing.as_str())
    .bind(&request.image_path)
    .fetch_one(&state.pool)
    .await?;

    info!("Created prediction {} for patient {}", id, request.patient_id);

    let input = PredictionInput {
        patient_id: &request.patient_id,
        age: request.age,
        gender: request.gender,
        clinical_notes: request.clinical_notes.as_deref(),
    };

    let outcome = match state.model.predict(&input, request.image_path.as_deref()) {
        Ok(outcome) => outcome,
        Err(PredictError::InvalidInput(message)) => {
            mark_failed(&state.pool, id, &message).await;
            error!("Prediction {} failed: {}", id, message);
            return Err(ApiError::bad_request(message));
        }
        Err(err) => {
            mark_failed(&state.pool, id, &err.to_string()).await;
            return Err(ApiError::internal(anyhow!(err)));
        }
    };

    let completed_at = Utc::now();
    let result_json =
        serde_json::to_string(&outcome).map_err(|e| ApiError::internal(anyhow!(e)))?;

    let updated = sqlx::query(
        "UPDATE predictions SET status = $1, has_alzheimer = $2, confidence_score = $3, \
         risk_level = $4, processing_time = $5, model_version = $6, result_data = $7::jsonb, \
         completed_at = $8 WHERE id = $9",
    )
    .bind(PredictionStatus::Completed.as_str())
    .bind(i32::from(outcome.has_alzheimer))
    .bind(outcome.confidence_score)
    .bind(outcome.risk_level.as_str())
    .bind(outcome.processing_time)
    .bind(&outcome.model_version)
    .bind(&result_json)
    .bind(completed_at)
    .bind(id)
    .execute(&state.pool)
    .await;

    if let Err(e) = updated {
        mark_failed(&state.pool, id, "Prediction processing failed").await;
        return Err(ApiError::internal(anyhow!(e)));
    }

    info!("Prediction {} completed successfully", id);

    let response = PredictionResponse {
        id,
        patient_id: request.patient_id,
        status: PredictionStatus::Completed,
        result: Some(PredictionResult {
            has_alzheimer: outcome.has_alzheimer,
            confidence_score: outcome.confidence_score,
            risk_level: outcome.risk_level,
            processing_time: outcome.processing_time,
            model_version: outcome.model_version,
        }),
        error_message: None,
        created_at,
        completed_at: Some(completed_at),
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /results/{id}
pub async fn get_prediction_result(
    State(state): State<SharedState>,
    Path(prediction_id): Path<i32>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let query = format!("SELECT {} FROM predictions WHERE id = $1", PREDICTION_COLUMNS);
    let row: Option<PredictionRow> = sqlx::query_as(&query)
        .bind(prediction_id)
        .fetch_optional(&state.pool)
        .await?;

    match row {
        Some(row) => Ok(Json(row.into_response())),
        None => Err(ApiError::not_found(format!(
            "Prediction {} not found",
            prediction_id
        ))),
    }
}

/// GET /results/patient/{patient_id}?limit=
pub async fn get_patient_predictions(
    State(state): State<SharedState>,
    Path(patient_id): Path<String>,
    Query(params): Query<PatientResultsParams>,
) -> Result<Json<Vec<PredictionResponse>>, ApiError> {
    let query = format!(
        "SELECT {} FROM predictions WHERE patient_id = $1 ORDER BY created_at DESC LIMIT $2",
        PREDICTION_COLUMNS
    );
    let rows: Vec<PredictionRow> = sqlx::query_as(&query)
        .bind(&patient_id)
        .bind(clamp_limit(params.limit, 10))
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(rows.into_iter().map(PredictionRow::into_response).collect()))
}

/// GET /results?skip=&limit=
pub async fn list_predictions(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<PredictionResponse>>, ApiError> {
    let query = format!(
        "SELECT {} FROM predictions ORDER BY created_at DESC OFFSET $1 LIMIT $2",
        PREDICTION_COLUMNS
    );
    let rows: Vec<PredictionRow> = sqlx::query_as(&query)
        .bind(clamp_skip(params.skip))
        .bind(clamp_limit(params.limit, 100))
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(rows.into_iter().map(PredictionRow::into_response).collect()))
}

/// Best-effort terminal transition; an error here is logged but not
/// surfaced since the request is already failing.
async fn mark_failed(pool: &PgPool, id: i32, message: &str) {
    let result = sqlx::query("UPDATE predictions SET status = $1, error_message = $2 WHERE id = $3")
        .bind(PredictionStatus::Failed.as_str())
        .bind(message)
        .bind(id)
        .execute(pool)
        .await;

    if let Err(e) = result {
        error!("Failed to mark prediction {} as failed: {}", id, e);
    }
}

pub fn clamp_limit(limit: Option<i64>, default: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, 500)
}

pub fn clamp_skip(skip: Option<i64>) -> i64 {
    skip.unwrap_or(0).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_and_bounds() {
        assert_eq!(clamp_limit(None, 100), 100);
        assert_eq!(clamp_limit(Some(10), 100), 10);
        assert_eq!(clamp_limit(Some(0), 100), 1);
        assert_eq!(clamp_limit(Some(-5), 100), 1);
        assert_eq!(clamp_limit(Some(10_000), 100), 500);
    }

    #[test]
    fn skip_never_negative() {
        assert_eq!(clamp_skip(None), 0);
        assert_eq!(clamp_skip(Some(25)), 25);
        assert_eq!(clamp_skip(Some(-3)), 0);
    }
}
