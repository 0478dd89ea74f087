use crate::models::{Gender, RiskLevel};
use rand::Rng;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PredictError {
    /// Caller-supplied data failed validation; maps to a 400 upstream.
    #[error("{0}")]
    InvalidInput(String),
    /// Anything else; maps to a 500 with the detail suppressed.
    #[error("prediction failed: {0}")]
    Internal(String),
}

#[derive(Debug)]
pub struct PredictionInput<'a> {
    pub patient_id: &'a str,
    pub age: i32,
    pub gender: Gender,
    pub clinical_notes: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionOutcome {
    pub has_alzheimer: bool,
    pub confidence_score: f64,
    pub risk_level: RiskLevel,
    pub processing_time: f64,
    pub model_version: String,
    pub is_placeholder: bool,
}

/// Stand-in for the real Alzheimer's classifier. Constructed explicitly at
/// startup and handed to the HTTP layer; `predict` is the only seam the
/// rest of the service knows about, so a real inference backend can replace
/// the random draw without touching handlers or persistence.
///
/// The outcome policy mirrors the placeholder it replaces: positive with
/// probability min(age/100, 0.9), confidence in [0.75, 0.95) when positive
/// and [0.85, 0.98) when negative, risk derived from confidence.
#[derive(Debug, Clone)]
pub struct ModelService {
    model_version: String,
    model_path: String,
    loaded: bool,
}

impl ModelService {
    pub fn new(model_path: &str, model_version: &str) -> Self {
        Self {
            model_version: model_version.to_string(),
            model_path: model_path.to_string(),
            loaded: false,
        }
    }

    /// Explicit initialization step. A real model file is not shipped yet,
    /// so this only records whether one exists; predictions stay flagged
    /// as placeholder output until it does.
    pub fn load(&mut self) {
        if Path::new(&self.model_path).exists() {
            info!("Model file found at {}", self.model_path);
            self.loaded = true;
        } else {
            warn!("Model not found at {}; using placeholder predictions", self.model_path);
            self.loaded = false;
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    pub fn predict(
        &self,
        input: &PredictionInput<'_>,
        _image_path: Option<&str>,
    ) -> Result<PredictionOutcome, PredictError> {
        let started = Instant::now();
        self.validate_input(input)?;

        let base_risk = (f64::from(input.age) / 100.0).min(0.9);
        let mut rng = rand::thread_rng();

        let (has_alzheimer, confidence_score, risk_level) = if rng.gen::<f64>() < base_risk {
            let confidence = rng.gen_range(0.75..0.95);
            (true, confidence, risk_from_confidence(confidence, true))
        } else {
            (false, rng.gen_range(0.85..0.98), RiskLevel::Low)
        };

        let outcome = PredictionOutcome {
            has_alzheimer,
            confidence_score: round3(confidence_score),
            risk_level,
            processing_time: round3(started.elapsed().as_secs_f64()),
            model_version: self.model_version.clone(),
            is_placeholder: !self.loaded,
        };

        info!("Prediction completed for patient {}", input.patient_id);
        Ok(outcome)
    }

    fn validate_input(&self, input: &PredictionInput<'_>) -> Result<(), PredictError> {
        if !(0..=150).contains(&input.age) {
            return Err(PredictError::InvalidInput(
                "Age must be between 0 and 150".to_string(),
            ));
        }
        Ok(())
    }
}

fn risk_from_confidence(confidence: f64, has_alzheimer: bool) -> RiskLevel {
    if !has_alzheimer {
        return RiskLevel::Low;
    }
    if confidence >= 0.8 {
        RiskLevel::High
    } else if confidence >= 0.6 {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ModelService {
        ModelService::new("models/nonexistent.onnx", "v1.0.0")
    }

    fn input(age: i32) -> PredictionInput<'static> {
        PredictionInput {
            patient_id: "P-001",
            age,
            gender: Gender::Female,
            clinical_notes: None,
        }
    }

    #[test]
    fn outcome_respects_confidence_and_risk_bounds() {
        let svc = service();
        for _ in 0..500 {
            let outcome = svc.predict(&input(80), None).unwrap();
            assert!((0.0..=1.0).contains(&outcome.confidence_score));
            assert!(outcome.processing_time >= 0.0);
            assert_eq!(outcome.model_version, "v1.0.0");
            assert!(outcome.is_placeholder);
            if outcome.has_alzheimer {
                assert!(outcome.confidence_score >= 0.75 && outcome.confidence_score < 0.951);
                assert_eq!(
                    outcome.risk_level,
                    risk_from_confidence(outcome.confidence_score, true)
                );
            } else {
                assert_eq!(outcome.risk_level, RiskLevel::Low);
                assert!(outcome.confidence_score >= 0.85);
            }
        }
    }

    #[test]
    fn age_zero_never_positive() {
        let svc = service();
        for _ in 0..100 {
            let outcome = svc.predict(&input(0), None).unwrap();
            assert!(!outcome.has_alzheimer);
            assert_eq!(outcome.risk_level, RiskLevel::Low);
        }
    }

    #[test]
    fn out_of_range_age_is_invalid_input() {
        let svc = service();
        for bad_age in [-1, 151, 999] {
            match svc.predict(&input(bad_age), None) {
                Err(PredictError::InvalidInput(msg)) => {
                    assert!(msg.contains("between 0 and 150"))
                }
                other => panic!("expected InvalidInput, got {:?}", other),
            }
        }
    }

    #[test]
    fn risk_derivation_thresholds() {
        assert_eq!(risk_from_confidence(0.95, true), RiskLevel::High);
        assert_eq!(risk_from_confidence(0.8, true), RiskLevel::High);
        assert_eq!(risk_from_confidence(0.79, true), RiskLevel::Moderate);
        assert_eq!(risk_from_confidence(0.6, true), RiskLevel::Moderate);
        assert_eq!(risk_from_confidence(0.59, true), RiskLevel::Low);
        assert_eq!(risk_from_confidence(0.99, false), RiskLevel::Low);
    }

    #[test]
    fn missing_model_file_stays_placeholder() {
        let mut svc = service();
        svc.load();
        assert!(!svc.is_loaded());
    }
}
