use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            _ => Err(format!("unknown gender: {}", s)),
        }
    }
}

/// Lifecycle states of a prediction row. Rows are inserted as `Processing`
/// and updated in place exactly once to `Completed` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Processing,
    Completed,
    Failed,
}

impl PredictionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionStatus::Processing => "processing",
            PredictionStatus::Completed => "completed",
            PredictionStatus::Failed => "failed",
        }
    }
}

impl FromStr for PredictionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(PredictionStatus::Processing),
            "completed" => Ok(PredictionStatus::Completed),
            "failed" => Ok(PredictionStatus::Failed),
            _ => Err(format!("unknown prediction status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
        }
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(RiskLevel::Low),
            "moderate" => Ok(RiskLevel::Moderate),
            "high" => Ok(RiskLevel::High),
            _ => Err(format!("unknown risk level: {}", s)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PredictionRequest {
    pub patient_id: String,
    pub age: i32,
    pub gender: Gender,
    pub clinical_notes: Option<String>,
    pub image_path: Option<String>,
}

/// Result block of a completed prediction. Serialized into the response
/// only when the row reached `Completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub has_alzheimer: bool,
    pub confidence_score: f64,
    pub risk_level: RiskLevel,
    pub processing_time: f64,
    pub model_version: String,
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub id: i32,
    pub patient_id: String,
    pub status: PredictionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PredictionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One row of the predictions table. Enum-valued columns are stored as
/// text and converted when projecting into the response shape.
#[derive(Debug, sqlx::FromRow)]
pub struct PredictionRow {
    pub id: i32,
    pub patient_id: String,
    pub status: String,
    pub has_alzheimer: Option<i32>,
    pub confidence_score: Option<f64>,
    pub risk_level: Option<String>,
    pub processing_time: Option<f64>,
    pub model_version: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PredictionRow {
    /// Projects the row into the response shape. The result block is
    /// emitted only for completed rows; anything else keeps it absent
    /// even if stray result columns are populated.
    pub fn into_response(self) -> PredictionResponse {
        let status = PredictionStatus::from_str(&self.status).unwrap_or(PredictionStatus::Failed);

        let result = if status == PredictionStatus::Completed {
            match (
                self.has_alzheimer,
                self.confidence_score,
                self.risk_level.as_deref().and_then(|r| r.parse().ok()),
                self.processing_time,
                self.model_version,
            ) {
                (Some(has), Some(confidence), Some(risk), Some(elapsed), Some(version)) => {
                    Some(PredictionResult {
                        has_alzheimer: has != 0,
                        confidence_score: confidence,
                        risk_level: risk,
                        processing_time: elapsed,
                        model_version: version,
                    })
                }
                _ => None,
            }
        } else {
            None
        };

        PredictionResponse {
            id: self.id,
            patient_id: self.patient_id,
            status,
            result,
            error_message: self.error_message,
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PatientCreate {
    pub patient_id: String,
    pub age: i32,
    pub gender: Gender,
    pub clinical_notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PatientResponse {
    pub id: i32,
    pub patient_id: String,
    pub age: i32,
    pub gender: Gender,
    pub clinical_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct PatientRow {
    pub id: i32,
    pub patient_id: String,
    pub age: i32,
    pub gender: String,
    pub clinical_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PatientRow {
    pub fn into_response(self) -> PatientResponse {
        PatientResponse {
            id: self.id,
            patient_id: self.patient_id,
            age: self.age,
            gender: Gender::from_str(&self.gender).unwrap_or(Gender::Other),
            clinical_notes: self.clinical_notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> PredictionRow {
        PredictionRow {
            id: 7,
            patient_id: "P-001".to_string(),
            status: status.to_string(),
            has_alzheimer: Some(1),
            confidence_score: Some(0.82),
            risk_level: Some("high".to_string()),
            processing_time: Some(0.001),
            model_version: Some("v1.0.0".to_string()),
            error_message: None,
            created_at: Utc::now(),
            completed_at: Some(Utc::now()),
        }
    }

    #[test]
    fn enums_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&PredictionStatus::Processing).unwrap(), "\"processing\"");
        assert_eq!(serde_json::to_string(&RiskLevel::Moderate).unwrap(), "\"moderate\"");
        assert_eq!(serde_json::to_string(&Gender::Female).unwrap(), "\"female\"");
    }

    #[test]
    fn enums_round_trip_storage_form() {
        for status in [PredictionStatus::Processing, PredictionStatus::Completed, PredictionStatus::Failed] {
            assert_eq!(status.as_str().parse::<PredictionStatus>().unwrap(), status);
        }
        for risk in [RiskLevel::Low, RiskLevel::Moderate, RiskLevel::High] {
            assert_eq!(risk.as_str().parse::<RiskLevel>().unwrap(), risk);
        }
    }

    #[test]
    fn completed_row_projects_full_result() {
        let response = row("completed").into_response();
        assert_eq!(response.status, PredictionStatus::Completed);
        let result = response.result.expect("completed row must carry a result");
        assert!(result.has_alzheimer);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(result.model_version, "v1.0.0");
    }

    #[test]
    fn failed_row_hides_result_columns() {
        let mut failed = row("failed");
        failed.error_message = Some("age must be between 0 and 150".to_string());
        let response = failed.into_response();
        assert_eq!(response.status, PredictionStatus::Failed);
        assert!(response.result.is_none());
        assert!(response.error_message.is_some());
    }

    #[test]
    fn processing_row_has_no_result() {
        let mut processing = row("processing");
        processing.has_alzheimer = None;
        processing.confidence_score = None;
        let response = processing.into_response();
        assert_eq!(response.status, PredictionStatus::Processing);
        assert!(response.result.is_none());
    }

    #[test]
    fn result_absent_in_serialized_failed_response() {
        let mut failed = row("failed");
        failed.error_message = Some("boom".to_string());
        let value = serde_json::to_value(failed.into_response()).unwrap();
        assert!(value.get("result").is_none());
        assert_eq!(value["error_message"], "boom");
    }
}
