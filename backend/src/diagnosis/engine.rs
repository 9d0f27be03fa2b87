use std::time::Instant;

use shared::{
    AlternativePrediction, AnalysisResponse, ConfidenceLevel, Disease, HealthScore,
    HealthScoreBreakdown, HeatmapRegion, id_denotes_healthy,
};

use crate::error::AnalysisError;
use crate::inference;
use crate::vision::{GeminiClient, VisionAnalysis};

use super::{health_score, knowledge_base};

/// Orchestrates one analysis request: vision model first, local classifier
/// as the fallback, both normalized into the canonical diagnosis shape.
/// The two paths are strict alternatives and never run concurrently for
/// the same request.
#[derive(Clone)]
pub struct DiagnosisEngine {
    vision: Option<GeminiClient>,
    model_path: String,
    hallucination_rejects: Vec<String>,
}

impl DiagnosisEngine {
    pub fn new(
        vision: Option<GeminiClient>,
        model_path: String,
        hallucination_rejects: Vec<String>,
    ) -> Self {
        Self {
            vision,
            model_path,
            hallucination_rejects,
        }
    }

    pub async fn analyze(
        &self,
        image_bytes: &[u8],
        content_type: &str,
        crop_hint: &str,
    ) -> Result<AnalysisResponse, AnalysisError> {
        validate_payload(image_bytes, content_type)?;
        let started = Instant::now();

        if let Some(client) = &self.vision {
            if let Some(analysis) = client.analyze(image_bytes).await {
                return Ok(self.respond_from_vision(analysis, started));
            }
            log::info!("vision analysis unavailable, falling back to local classifier");
        }

        self.respond_from_classifier(image_bytes, crop_hint).await
    }

    fn respond_from_vision(&self, analysis: VisionAnalysis, started: Instant) -> AnalysisResponse {
        let healthy = id_denotes_healthy(&analysis.disease_id);
        let confidence = analysis.confidence.clamp(0.0, 1.0);

        let treatment = analysis
            .treatment
            .unwrap_or_else(|| knowledge_base::generic_treatment(healthy));
        let recommendations = if analysis.recommendations.is_empty() {
            knowledge_base::healthy_fallback().recommendations
        } else {
            analysis.recommendations
        };

        let disease = Disease {
            id: analysis.disease_id.clone(),
            name: analysis.disease_name,
            scientific_name: None,
            pathogen_type: None,
            spread_mechanism: None,
            crop_family: analysis.plant_name.to_lowercase(),
            recommendations,
            severity: analysis.severity,
            treatment,
            beginner_description: analysis.beginner_description.unwrap_or_else(|| {
                format!("The image was identified as {}.", analysis.plant_name)
            }),
            advanced_description: analysis.advanced_description.unwrap_or_else(|| {
                format!(
                    "Vision analysis resolved '{}' without a detailed assessment.",
                    analysis.disease_id
                )
            }),
            common_regions: Vec::new(),
            seasonal_risk: Vec::new(),
            health_score_impact: (100 - analysis.health_score).clamp(0, 100),
        };

        let health_score = HealthScore {
            score: analysis.health_score.clamp(0, 100),
            breakdown: HealthScoreBreakdown {
                leaf_condition: analysis.leaf_condition.clamp(0, 100),
                infection_severity: if healthy {
                    0
                } else {
                    analysis.infection_severity.clamp(0, 100)
                },
                color_analysis: analysis.color_analysis.clamp(0, 100),
            },
        };

        let heatmap = if healthy {
            Vec::new()
        } else {
            inference::placeholder_heatmap()
        };

        build_response(
            disease,
            confidence,
            health_score,
            heatmap,
            started.elapsed().as_millis() as i64,
        )
    }

    async fn respond_from_classifier(
        &self,
        image_bytes: &[u8],
        crop_hint: &str,
    ) -> Result<AnalysisResponse, AnalysisError> {
        let outcome =
            inference::run_inference(image_bytes, &self.model_path, &self.hallucination_rejects)?;

        let mut disease =
            knowledge_base::resolve(&outcome.class_id, outcome.confidence, self.vision.as_ref())
                .await;

        if outcome.class_id == inference::classifier::UNKNOWN_CLASS {
            apply_crop_hint(&mut disease, crop_hint);
        }

        let health_score = health_score::score(&disease, outcome.confidence);

        Ok(build_response(
            disease,
            outcome.confidence,
            health_score,
            outcome.heatmap,
            outcome.processing_time,
        ))
    }
}

fn validate_payload(image_bytes: &[u8], content_type: &str) -> Result<(), AnalysisError> {
    if !content_type.starts_with("image/") {
        return Err(AnalysisError::InvalidInput(
            "file provided is not an image".to_string(),
        ));
    }
    if image_bytes.is_empty() {
        return Err(AnalysisError::InvalidInput(
            "uploaded image is empty".to_string(),
        ));
    }
    Ok(())
}

/// When the classifier could not resolve a class and the user told us what
/// they photographed, the healthy fallback references their crop instead
/// of a generic label.
fn apply_crop_hint(disease: &mut Disease, crop_hint: &str) {
    let hint = crop_hint.trim();
    if hint.is_empty() || hint.eq_ignore_ascii_case("auto") {
        return;
    }
    let crop = knowledge_base::format_disease_name(hint);
    disease.name = format!("Healthy {crop}");
    disease.crop_family = hint.to_lowercase();
    disease.beginner_description = format!(
        "We couldn't match a known disease on your {crop} leaf. It shows no strong disease signature, so it is treated as healthy - keep monitoring over the next few days."
    );
}

fn build_response(
    disease: Disease,
    confidence: f32,
    health_score: HealthScore,
    heatmap_regions: Vec<HeatmapRegion>,
    processing_time: i64,
) -> AnalysisResponse {
    // Heuristic placeholder for true top-k output: one healthy alternative
    // with the residual probability mass scaled down.
    let alternatives = vec![AlternativePrediction {
        disease: knowledge_base::healthy_fallback(),
        confidence: round2((1.0 - confidence) * 0.7),
    }];

    AnalysisResponse {
        disease,
        confidence,
        processing_time,
        alternatives,
        health_score,
        heatmap_regions,
        confidence_level: ConfidenceLevel::from_confidence(confidence),
        multi_disease_warning: false,
    }
}

fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::gemini::parse_analysis;
    use serde_json::json;

    fn engine_without_vision() -> DiagnosisEngine {
        // Nonexistent weights leave the classifier handle permanently
        // unavailable, exercising degraded mode.
        DiagnosisEngine::new(
            None,
            "weights/does-not-exist.onnx".to_string(),
            vec!["blueberry-healthy".to_string()],
        )
    }

    #[tokio::test]
    async fn rejects_non_image_content_type() {
        let err = engine_without_vision()
            .analyze(b"some bytes", "application/pdf", "auto")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn rejects_empty_payload() {
        let err = engine_without_vision()
            .analyze(b"", "image/png", "auto")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn no_vision_and_no_model_yields_degraded_healthy_diagnosis() {
        let response = engine_without_vision()
            .analyze(b"pretend image", "image/jpeg", "auto")
            .await
            .unwrap();
        assert_eq!(response.disease.id, "healthy");
        assert!((response.confidence - 0.5).abs() < 1e-6);
        assert!(response.heatmap_regions.is_empty());
        assert_eq!(response.confidence_level, ConfidenceLevel::Low);
        assert_eq!(response.alternatives.len(), 1);
        assert!((response.alternatives[0].confidence - 0.35).abs() < 1e-6);
        assert_eq!(response.health_score.breakdown.infection_severity, 0);
    }

    #[tokio::test]
    async fn failed_vision_request_falls_back_to_classifier_path() {
        // Nothing listens on the discard port, so the vision request fails
        // immediately and the classifier path must produce the response.
        let client = GeminiClient::with_base_url(
            "test-key".to_string(),
            "http://127.0.0.1:9".to_string(),
        );
        let engine = DiagnosisEngine::new(
            Some(client),
            "weights/does-not-exist.onnx".to_string(),
            Vec::new(),
        );

        let response = engine
            .analyze(b"pretend image", "image/jpeg", "auto")
            .await
            .unwrap();
        assert_eq!(response.disease.id, "healthy");
        assert!((response.confidence - 0.5).abs() < 1e-6);
        assert!(response.heatmap_regions.is_empty());
        assert_eq!(response.health_score.score, 100);
    }

    #[tokio::test]
    async fn crop_hint_overrides_unknown_resolution() {
        let mut disease = knowledge_base::healthy_fallback();
        apply_crop_hint(&mut disease, "tomato");
        assert_eq!(disease.name, "Healthy Tomato");
        assert_eq!(disease.crop_family, "tomato");
        assert!(disease.beginner_description.contains("Tomato"));

        let mut untouched = knowledge_base::healthy_fallback();
        apply_crop_hint(&mut untouched, "auto");
        assert_eq!(untouched.name, "Healthy Plant");
    }

    #[test]
    fn vision_response_is_normalized_into_canonical_shape() {
        let analysis = parse_analysis(
            &json!({
                "plant_name": "Grape",
                "disease_name": "Grape Black Rot",
                "disease_id": "grape-black-rot",
                "severity": "high",
                "confidence": 0.93,
                "health_score": "42/100",
                "leaf_condition": 40,
                "infection_severity": 120,
                "color_analysis": 45,
                "recommendations": ["Remove mummified berries"]
            })
            .to_string(),
        )
        .unwrap();

        let response = engine_without_vision().respond_from_vision(analysis, Instant::now());
        assert_eq!(response.disease.id, "grape-black-rot");
        assert_eq!(response.disease.crop_family, "grape");
        assert_eq!(response.health_score.score, 42);
        // out-of-range sub-score clamped
        assert_eq!(response.health_score.breakdown.infection_severity, 100);
        // missing treatment falls back to the generic plan
        assert!(!response.disease.treatment.immediate.is_empty());
        assert_eq!(response.confidence_level, ConfidenceLevel::High);
        assert_eq!(response.heatmap_regions.len(), 1);
    }

    #[test]
    fn healthy_vision_result_has_no_heatmap_and_zero_infection() {
        let analysis = parse_analysis(
            &json!({
                "plant_name": "Rose",
                "disease_name": "Healthy",
                "disease_id": "rose-healthy",
                "severity": "low",
                "confidence": 0.97,
                "health_score": 95,
                "leaf_condition": 96,
                "infection_severity": 3,
                "color_analysis": 94
            })
            .to_string(),
        )
        .unwrap();

        let response = engine_without_vision().respond_from_vision(analysis, Instant::now());
        assert!(response.heatmap_regions.is_empty());
        assert_eq!(response.health_score.breakdown.infection_severity, 0);
        assert_eq!(response.confidence_level, ConfidenceLevel::High);
    }
}
