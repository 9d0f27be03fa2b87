use serde::{Deserialize, Serialize};

/// Coarse condition severity used across the registry, the vision model
/// response and the synthesized entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Three-bucket user-facing confidence label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    /// `high` above 0.85, `medium` above 0.6, `low` otherwise.
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence > 0.85 {
            ConfidenceLevel::High
        } else if confidence > 0.6 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreatmentPlan {
    pub immediate: Vec<String>,
    pub organic: Vec<String>,
    pub chemical: Vec<String>,
    pub prevention: Vec<String>,
    pub recovery_timeline: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disease {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub scientific_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pathogen_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub spread_mechanism: Option<String>,
    pub crop_family: String,
    pub recommendations: Vec<String>,
    pub severity: Severity,
    pub treatment: TreatmentPlan,
    pub beginner_description: String,
    pub advanced_description: String,
    pub common_regions: Vec<String>,
    pub seasonal_risk: Vec<String>,
    /// 0-100, how much this condition depresses the overall health score.
    pub health_score_impact: i32,
}

impl Disease {
    /// True when the id denotes a healthy plant rather than a disease.
    pub fn denotes_healthy(&self) -> bool {
        id_denotes_healthy(&self.id)
    }
}

pub fn id_denotes_healthy(disease_id: &str) -> bool {
    disease_id.to_ascii_lowercase().contains("healthy")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativePrediction {
    pub disease: Disease,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthScoreBreakdown {
    pub leaf_condition: i32,
    pub infection_severity: i32,
    pub color_analysis: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthScore {
    pub score: i32,
    pub breakdown: HealthScoreBreakdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatmapRegion {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub intensity: Option<f32>,
}

/// Canonical diagnosis returned to callers and serialized as the JSON
/// response body. Always fully populated, on both resolution paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub disease: Disease,
    pub confidence: f32,
    pub processing_time: i64,
    pub alternatives: Vec<AlternativePrediction>,
    pub health_score: HealthScore,
    pub heatmap_regions: Vec<HeatmapRegion>,
    pub confidence_level: ConfidenceLevel,
    pub multi_disease_warning: bool,
}
