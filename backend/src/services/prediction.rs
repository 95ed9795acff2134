//! Emission prediction
//!
//! The AI engine is an external HTTP service. When it is unreachable the
//! activity is still logged with [`fallback_estimate`].

use crate::config::PredictorConfig;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const EMISSION_UNIT: &str = "kg CO2e";

/// Value assumed when a description carries no number
const FALLBACK_DEFAULT_VALUE: f64 = 10.0;
const DEFAULT_FACTOR: f64 = 0.3;

static FIRST_DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("decimal pattern is valid"));
static FIRST_INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("integer pattern is valid"));

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("AI engine request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("AI engine returned status {0}")]
    Status(u16),

    #[error("AI engine response missing predicted_emission")]
    MissingPrediction,
}

/// Body sent to the AI engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub activity: String,
    pub activity_type: String,
}

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    predicted_emission: Option<f64>,
}

/// Anything that can turn an activity description into kg CO2e
#[async_trait]
pub trait EmissionPredictor: Send + Sync {
    async fn predict(&self, request: &PredictionRequest) -> Result<f64, PredictionError>;
}

/// Client for the external AI engine
pub struct AiEngineClient {
    url: String,
    http: reqwest::Client,
}

impl AiEngineClient {
    pub fn new(config: &PredictorConfig) -> Result<Self, PredictionError> {
        let http = reqwest::Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            url: config.ai_engine_url.clone(),
            http,
        })
    }
}

#[async_trait]
impl EmissionPredictor for AiEngineClient {
    async fn predict(&self, request: &PredictionRequest) -> Result<f64, PredictionError> {
        let response = self.http.post(&self.url).json(request).send().await?;

        if !response.status().is_success() {
            return Err(PredictionError::Status(response.status().as_u16()));
        }

        let body: PredictionResponse = response.json().await?;
        let emission = body.predicted_emission.ok_or(PredictionError::MissingPrediction)?;
        debug!("AI prediction: {} {}", emission, EMISSION_UNIT);
        Ok(emission)
    }
}

/// The AI engine's own rules, usable in-process
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedPredictor;

impl RuleBasedPredictor {
    pub fn estimate(activity: &str) -> f64 {
        let text = activity.to_lowercase();
        let value = FIRST_INTEGER
            .find(&text)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(1.0);

        let factor = if text.contains("drive") {
            0.2
        } else if text.contains("flight") {
            0.5
        } else if text.contains("train") {
            0.1
        } else if text.contains("walk") || text.contains("cycle") {
            0.01
        } else {
            DEFAULT_FACTOR
        };

        value * factor
    }
}

#[async_trait]
impl EmissionPredictor for RuleBasedPredictor {
    async fn predict(&self, request: &PredictionRequest) -> Result<f64, PredictionError> {
        Ok(Self::estimate(&request.activity))
    }
}

/// kg CO2e per unit for each activity type
pub fn emission_factor(activity_type: &str) -> f64 {
    match activity_type {
        "driving" => 0.2,
        "flight" => 0.5,
        "home_energy" => 0.5,
        "heating" => 2.0,
        "cooking" => 0.3,
        "shopping" => 0.5,
        "waste" => 0.1,
        "transport" => 0.15,
        "electricity" => 0.4,
        "other" => 0.3,
        // offsets: CO2 saved per unit
        "tree_planting" => 20.0,
        "renewable_energy" => 0.5,
        "recycling" => 0.5,
        "carbon_offset" => 1.0,
        _ => DEFAULT_FACTOR,
    }
}

/// Estimate used when the AI engine cannot answer: the first number in the
/// description times the type's factor, rounded to 2 decimals
pub fn fallback_estimate(activity_type: &str, description: &str) -> f64 {
    let value = FIRST_DECIMAL
        .find(description)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(FALLBACK_DEFAULT_VALUE);

    round2(value * emission_factor(activity_type))
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_uses_first_number_and_type_factor() {
        assert_eq!(fallback_estimate("driving", "drove 20 km to work"), 4.0);
        assert_eq!(fallback_estimate("tree_planting", "Planted 3 trees"), 60.0);
        assert_eq!(fallback_estimate("electricity", "used 12.5 kWh then 3"), 5.0);
    }

    #[test]
    fn test_fallback_defaults() {
        // no number: 10 units
        assert_eq!(fallback_estimate("heating", "kept the heater on"), 20.0);
        // unknown type: 0.3
        assert_eq!(fallback_estimate("gardening", "2 hours"), 0.6);
        assert_eq!(fallback_estimate("unknown", ""), 3.0);
    }

    #[test]
    fn test_fallback_rounds_to_two_decimals() {
        assert_eq!(fallback_estimate("transport", "commuted 7 km"), 1.05);
        assert_eq!(fallback_estimate("other", "1.111"), 0.33);
    }

    #[test]
    fn test_rule_based_predictor() {
        assert_eq!(RuleBasedPredictor::estimate("Drive 50 km"), 10.0);
        assert_eq!(RuleBasedPredictor::estimate("flight of 1000 km"), 500.0);
        assert!((RuleBasedPredictor::estimate("train 30 km") - 3.0).abs() < 1e-9);
        assert_eq!(RuleBasedPredictor::estimate("walk to the shop"), 0.01);
        assert!((RuleBasedPredictor::estimate("something else") - 0.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unreachable_engine_errors() {
        let client = AiEngineClient::new(&PredictorConfig {
            ai_engine_url: "http://127.0.0.1:9/predict".to_string(),
            timeout_secs: 1,
        })
        .unwrap();

        let request = PredictionRequest {
            activity: "drove 20 km".to_string(),
            activity_type: "driving".to_string(),
        };
        assert!(client.predict(&request).await.is_err());
    }
}
