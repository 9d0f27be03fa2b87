pub mod classifier;
pub mod preprocess;

use std::time::Instant;

use shared::HeatmapRegion;
use thiserror::Error;

use preprocess::PreprocessError;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error(transparent)]
    Preprocessing(#[from] PreprocessError),
    #[error("model error: {0}")]
    Model(String),
}

/// Output of the local-classifier path, post-filtered and ready for the
/// knowledge-base mapper.
#[derive(Debug, Clone)]
pub struct InferenceOutcome {
    pub class_id: String,
    pub confidence: f32,
    pub heatmap: Vec<HeatmapRegion>,
    pub processing_time: i64,
}

/// Runs the full local path: lazy classifier handle, preprocessing, a
/// forward pass, and the threshold/hallucination post-filter. When no
/// classifier handle is available the request degrades to a fixed neutral
/// prediction instead of failing.
pub fn run_inference(
    image_bytes: &[u8],
    model_path: &str,
    rejects: &[String],
) -> Result<InferenceOutcome, InferenceError> {
    let start = Instant::now();

    let Some(model) = classifier::get_or_load(model_path) else {
        return Ok(InferenceOutcome {
            class_id: "healthy".to_string(),
            confidence: 0.5,
            heatmap: Vec::new(),
            processing_time: start.elapsed().as_millis() as i64,
        });
    };

    let tensor = preprocess::decode_and_preprocess(image_bytes)?;
    let probs = model.classify(&tensor)?;
    let (prediction, class_id) = classifier::resolve_prediction(&probs, rejects);

    log::info!(
        "predicted class index: {}, id mapped: {}, confidence: {}",
        prediction.class_index,
        class_id,
        prediction.confidence
    );

    Ok(InferenceOutcome {
        class_id,
        confidence: prediction.confidence,
        heatmap: placeholder_heatmap(),
        processing_time: start.elapsed().as_millis() as i64,
    })
}

/// Stand-in for Grad-CAM region extraction; a single fixed center region.
pub fn placeholder_heatmap() -> Vec<HeatmapRegion> {
    vec![HeatmapRegion {
        x: 0.5,
        y: 0.5,
        radius: 0.15,
        intensity: Some(0.8),
    }]
}
