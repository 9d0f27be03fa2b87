use rand::Rng;

use shared::{Disease, HealthScore, HealthScoreBreakdown, Severity};

const SCORE_JITTER: i32 = 4;
const SUBSCORE_JITTER: i32 = 3;
const SCORE_FLOOR: i32 = 10;

/// Derives the 0-100 health score and sub-score breakdown from severity
/// and confidence, with a thread-local randomness source.
pub fn score(disease: &Disease, confidence: f32) -> HealthScore {
    score_with_rng(disease, confidence, &mut rand::rng())
}

/// Same policy with an injectable randomness source so tests can pin the
/// seed. Higher confidence in a serious diagnosis depresses the score
/// further; the jitter keeps repeated outputs from landing on suspiciously
/// round numbers and is bounded (main +-4, sub-scores +-3).
pub fn score_with_rng<R: Rng + ?Sized>(
    disease: &Disease,
    confidence: f32,
    rng: &mut R,
) -> HealthScore {
    let healthy = disease.denotes_healthy();

    let severity_drop = match disease.severity {
        Severity::High => 50.0 + confidence * 30.0,
        Severity::Medium => 25.0 + confidence * 35.0,
        Severity::Low => 0.0,
    };

    let score = if healthy {
        100 - disease.health_score_impact.clamp(0, 100)
    } else {
        let base = ((100.0 - severity_drop).round() as i32).max(SCORE_FLOOR);
        (base + rng.random_range(-SCORE_JITTER..=SCORE_JITTER)).clamp(0, 100)
    };

    let breakdown = if healthy {
        HealthScoreBreakdown {
            leaf_condition: (95 + rng.random_range(-SUBSCORE_JITTER..=SUBSCORE_JITTER))
                .clamp(0, 100),
            infection_severity: 0,
            color_analysis: (92 + rng.random_range(-SUBSCORE_JITTER..=SUBSCORE_JITTER))
                .clamp(0, 100),
        }
    } else {
        HealthScoreBreakdown {
            leaf_condition: (score - 10 + rng.random_range(-SUBSCORE_JITTER..=SUBSCORE_JITTER))
                .clamp(0, 100),
            infection_severity: (100 - score
                + 5
                + rng.random_range(-SUBSCORE_JITTER..=SUBSCORE_JITTER))
            .clamp(0, 100),
            color_analysis: (score - 5 + rng.random_range(-SUBSCORE_JITTER..=SUBSCORE_JITTER))
                .clamp(0, 100),
        }
    };

    HealthScore { score, breakdown }
}
