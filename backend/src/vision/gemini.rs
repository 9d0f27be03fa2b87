use std::future::Future;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};
use thiserror::Error;

use shared::{Severity, TreatmentPlan};

const GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Fallback for score-like fields that arrive in an uncoercible shape.
const DEFAULT_SCORE: i32 = 70;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("rate limited")]
    RateLimited,
    #[error("request failed: {0}")]
    Http(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Parsed structured output of the vision model. Deserialization fails
/// closed: any missing required key makes the whole analysis unusable, so
/// callers only ever see a complete object or nothing.
#[derive(Debug, Clone, Deserialize)]
pub struct VisionAnalysis {
    pub plant_name: String,
    pub disease_name: String,
    pub disease_id: String,
    pub severity: Severity,
    pub confidence: f32,
    #[serde(deserialize_with = "deserialize_lenient_score")]
    pub health_score: i32,
    #[serde(deserialize_with = "deserialize_lenient_score")]
    pub leaf_condition: i32,
    #[serde(deserialize_with = "deserialize_lenient_score")]
    pub infection_severity: i32,
    #[serde(deserialize_with = "deserialize_lenient_score")]
    pub color_analysis: i32,
    #[serde(default)]
    pub beginner_description: Option<String>,
    #[serde(default)]
    pub advanced_description: Option<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub treatment: Option<TreatmentPlan>,
}

// Score fields occasionally come back as strings like "85/100"; extract the
// digits rather than rejecting an otherwise valid analysis.
fn deserialize_lenient_score<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_score(&value, DEFAULT_SCORE))
}

pub(crate) fn coerce_score(value: &Value, default: i32) -> i32 {
    match value {
        Value::Number(n) => n.as_f64().map(|f| f.round() as i32).unwrap_or(default),
        Value::String(s) => {
            // "85/100" or "85.7" style strings: take the first run of digits
            // so a trailing denominator or fraction never inflates the value.
            let digits: String = s
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(char::is_ascii_digit)
                .collect();
            digits.parse().unwrap_or(default)
        }
        _ => default,
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

const ANALYSIS_PROMPT: &str = r#"You are an expert plant pathologist and agricultural scientist.
Analyze this plant/leaf image carefully and return ONLY valid JSON (no markdown, no explanation).

Your JSON must have EXACTLY these keys:

{
  "plant_name": "Common name of the plant (e.g. Tomato, Rose, Mango)",
  "disease_name": "Name of disease detected, or 'Healthy' if no disease",
  "disease_id": "kebab-case ID like 'tomato-early-blight' or 'rose-healthy'",
  "severity": "low" or "medium" or "high",
  "confidence": 0.0 to 1.0 (your confidence in the diagnosis),
  "health_score": 0 to 100 (overall plant health),
  "leaf_condition": 0 to 100 (how healthy the leaf tissue looks),
  "infection_severity": 0 to 100 (how severe the infection/damage is, 0 if healthy),
  "color_analysis": 0 to 100 (how normal the leaf coloring is),
  "beginner_description": "Simple 1-2 sentence explanation for a beginner gardener",
  "advanced_description": "Detailed pathological assessment for an expert",
  "recommendations": ["actionable step 1", "actionable step 2", "actionable step 3"],
  "treatment": {
    "immediate": ["step 1", "step 2", "step 3"],
    "organic": ["step 1", "step 2"],
    "chemical": ["step 1", "step 2"],
    "prevention": ["step 1", "step 2", "step 3"],
    "recoveryTimeline": "Expected recovery duration"
  }
}

Rules:
- If the plant is healthy, set severity to "low", infection_severity to 0, health_score to 90-100
- Be accurate about the plant species - look at leaf shape, color, texture, veins
- Provide realistic health scores based on what you actually see in the image
- Return ONLY the JSON object, nothing else"#;

fn treatment_prompt(disease_name: &str, confidence: f32) -> String {
    format!(
        r#"You are an expert plant pathologist. A classifier identified "{disease_name}" with confidence {confidence:.2}.
Return ONLY valid JSON (no markdown) describing a treatment plan with EXACTLY these keys:

{{
  "immediate": ["step 1", "step 2", "step 3"],
  "organic": ["step 1", "step 2"],
  "chemical": ["step 1", "step 2"],
  "prevention": ["step 1", "step 2", "step 3"],
  "recoveryTimeline": "Expected recovery duration"
}}"#
    )
}

/// Client for the external multimodal model. Holds the configured
/// credential; construction implies the credential exists, so "no key
/// configured" is represented by not constructing a client at all.
#[derive(Clone)]
pub struct GeminiClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
    max_retries: u32,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_key,
            base_url,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Sends the raw image with the structured-output prompt. `None` means
    /// "vision path unavailable" and always routes the caller to the local
    /// classifier, never to an error.
    pub async fn analyze(&self, image_bytes: &[u8]) -> Option<VisionAnalysis> {
        let text = with_rate_limit_retries(self.max_retries, |_| {
            self.generate(ANALYSIS_PROMPT, Some(image_bytes))
        })
        .await?;

        match parse_analysis(&text) {
            Ok(analysis) => {
                log::info!(
                    "vision model identified: {} - {} (confidence: {}, health: {})",
                    analysis.plant_name,
                    analysis.disease_name,
                    analysis.confidence,
                    analysis.health_score
                );
                Some(analysis)
            }
            Err(e) => {
                log::error!("vision model returned invalid analysis: {e}");
                None
            }
        }
    }

    /// Generates a treatment plan for a synthesized registry entry. `None`
    /// on any failure; the knowledge base substitutes its generic plan.
    pub async fn generate_treatment(
        &self,
        disease_name: &str,
        confidence: f32,
    ) -> Option<TreatmentPlan> {
        let prompt = treatment_prompt(disease_name, confidence);
        let text = with_rate_limit_retries(self.max_retries, |_| self.generate(&prompt, None)).await?;

        match serde_json::from_str(strip_code_fences(&text)) {
            Ok(plan) => Some(plan),
            Err(e) => {
                log::error!("generated treatment plan was not valid JSON: {e}");
                None
            }
        }
    }

    async fn generate(&self, prompt: &str, image: Option<&[u8]>) -> Result<String, VisionError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, GEMINI_MODEL, self.api_key
        );

        let mut parts = vec![json!({ "text": prompt })];
        if let Some(bytes) = image {
            parts.push(json!({
                "inline_data": {
                    "mime_type": "image/jpeg",
                    "data": BASE64.encode(bytes),
                }
            }));
        }
        let body = json!({ "contents": [{ "parts": parts }] });

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| VisionError::Http(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| VisionError::Http(e.to_string()))?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(VisionError::RateLimited);
        }
        if !status.is_success() {
            let lowered = text.to_lowercase();
            if lowered.contains("quota") || lowered.contains("rate") {
                return Err(VisionError::RateLimited);
            }
            return Err(VisionError::Http(format!("status {status}: {text}")));
        }

        extract_candidate_text(&text)
    }
}

fn extract_candidate_text(body: &str) -> Result<String, VisionError> {
    let parsed: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| VisionError::Malformed(e.to_string()))?;
    parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content.parts.into_iter().next())
        .map(|p| p.text)
        .ok_or_else(|| VisionError::Malformed("response contained no candidates".to_string()))
}

/// Parses the model's JSON answer after stripping optional code fences.
pub fn parse_analysis(text: &str) -> Result<VisionAnalysis, VisionError> {
    serde_json::from_str(strip_code_fences(text)).map_err(|e| VisionError::Malformed(e.to_string()))
}

pub(crate) fn strip_code_fences(text: &str) -> &str {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

/// Retry loop for the external model: rate-limit signals retry with a
/// linearly increasing backoff (5s, 10s, ...), sleeping only between
/// attempts; everything else gives up immediately. Exhaustion means
/// "fall back", never a hard error.
pub(crate) async fn with_rate_limit_retries<T, F, Fut>(max_retries: u32, mut attempt: F) -> Option<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, VisionError>>,
{
    for current in 0..=max_retries {
        match attempt(current).await {
            Ok(value) => return Some(value),
            Err(VisionError::RateLimited) => {
                if current < max_retries {
                    let wait = Duration::from_secs(((current + 1) * 5) as u64);
                    log::warn!(
                        "vision model rate limited (attempt {}/{}), retrying in {}s",
                        current + 1,
                        max_retries + 1,
                        wait.as_secs()
                    );
                    tokio::time::sleep(wait).await;
                } else {
                    log::error!(
                        "vision model rate limited after {} attempts, falling back",
                        max_retries + 1
                    );
                    return None;
                }
            }
            Err(e) => {
                log::error!("vision request failed: {e}");
                return None;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn complete_analysis_json() -> serde_json::Value {
        json!({
            "plant_name": "Tomato",
            "disease_name": "Tomato Early Blight",
            "disease_id": "tomato-early-blight",
            "severity": "medium",
            "confidence": 0.91,
            "health_score": 58,
            "leaf_condition": 55,
            "infection_severity": 40,
            "color_analysis": 60,
            "beginner_description": "Dark ringed spots on lower leaves.",
            "advanced_description": "Concentric lesions consistent with Alternaria solani.",
            "recommendations": ["Remove infected leaves"],
            "treatment": {
                "immediate": ["Remove affected foliage"],
                "organic": ["Neem oil spray"],
                "chemical": ["Chlorothalonil fungicide"],
                "prevention": ["Rotate crops"],
                "recoveryTimeline": "2-4 weeks"
            }
        })
    }

    #[test]
    fn parses_complete_analysis() {
        let analysis = parse_analysis(&complete_analysis_json().to_string()).unwrap();
        assert_eq!(analysis.disease_id, "tomato-early-blight");
        assert_eq!(analysis.severity, Severity::Medium);
        assert_eq!(analysis.health_score, 58);
        assert!(analysis.treatment.is_some());
    }

    #[test]
    fn parses_fenced_response() {
        let fenced = format!("```json\n{}\n```", complete_analysis_json());
        assert!(parse_analysis(&fenced).is_ok());
    }

    #[test]
    fn missing_required_key_fails_closed() {
        let mut value = complete_analysis_json();
        value.as_object_mut().unwrap().remove("color_analysis");
        assert!(parse_analysis(&value.to_string()).is_err());
    }

    #[test]
    fn score_strings_are_coerced_to_digits() {
        let mut value = complete_analysis_json();
        value["health_score"] = json!("85/100");
        let analysis = parse_analysis(&value.to_string()).unwrap();
        assert_eq!(analysis.health_score, 85);
    }

    #[test]
    fn decimal_score_strings_truncate_at_the_first_non_digit() {
        let mut value = complete_analysis_json();
        value["health_score"] = json!("85.7");
        let analysis = parse_analysis(&value.to_string()).unwrap();
        assert_eq!(analysis.health_score, 85);
    }

    #[test]
    fn uncoercible_scores_fall_back_to_default() {
        let mut value = complete_analysis_json();
        value["leaf_condition"] = json!({ "weird": true });
        let analysis = parse_analysis(&value.to_string()).unwrap();
        assert_eq!(analysis.leaf_condition, DEFAULT_SCORE);
    }

    #[test]
    fn strip_code_fences_handles_plain_and_fenced_text() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[tokio::test(start_paused = true)]
    async fn three_rate_limits_with_two_retries_make_three_attempts() {
        let attempts = Cell::new(0u32);
        let result: Option<String> = with_rate_limit_retries(2, |_| {
            attempts.set(attempts.get() + 1);
            async { Err(VisionError::RateLimited) }
        })
        .await;
        assert!(result.is_none());
        assert_eq!(attempts.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_then_success_returns_value() {
        let attempts = Cell::new(0u32);
        let result = with_rate_limit_retries(2, |_| {
            attempts.set(attempts.get() + 1);
            let first = attempts.get() == 1;
            async move {
                if first {
                    Err(VisionError::RateLimited)
                } else {
                    Ok("answer".to_string())
                }
            }
        })
        .await;
        assert_eq!(result.as_deref(), Some("answer"));
        assert_eq!(attempts.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_responses_are_not_retried() {
        let attempts = Cell::new(0u32);
        let result: Option<String> = with_rate_limit_retries(2, |_| {
            attempts.set(attempts.get() + 1);
            async { Err(VisionError::Malformed("bad json".to_string())) }
        })
        .await;
        assert!(result.is_none());
        assert_eq!(attempts.get(), 1);
    }
}
