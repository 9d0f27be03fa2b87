use std::sync::OnceLock;

use tract_onnx::prelude::*;

use super::InferenceError;
use super::preprocess::{ImageTensor, INPUT_SIZE};

/// Arg-max probability below this resolves to `unknown`.
pub const CONFIDENCE_THRESHOLD: f32 = 0.65;

/// Sentinel id for low-confidence or rejected predictions.
pub const UNKNOWN_CLASS: &str = "unknown";

/// The classifier was trained on the 38-class PlantVillage dataset. The
/// class index to id mapping is positional; this table must stay in the
/// training label order.
pub const PLANT_VILLAGE_CLASSES: [&str; 38] = [
    "apple-scab",                    // 0
    "apple-black-rot",               // 1
    "apple-cedar-rust",              // 2
    "apple-healthy",                 // 3
    "blueberry-healthy",             // 4
    "cherry-powdery-mildew",         // 5
    "cherry-healthy",                // 6
    "corn-cercospora-leaf-spot",     // 7
    "corn-rust",                     // 8
    "corn-northern-leaf-blight",     // 9
    "corn-healthy",                  // 10
    "grape-black-rot",               // 11
    "grape-esca",                    // 12
    "grape-leaf-blight",             // 13
    "grape-healthy",                 // 14
    "orange-haunglongbing",          // 15
    "peach-bacterial-spot",          // 16
    "peach-healthy",                 // 17
    "pepper-bell-bacterial-spot",    // 18
    "pepper-bell-healthy",           // 19
    "potato-early-blight",           // 20
    "potato-late-blight",            // 21
    "potato-healthy",                // 22
    "raspberry-healthy",             // 23
    "soybean-healthy",               // 24
    "squash-powdery-mildew",         // 25
    "strawberry-leaf-scorch",        // 26
    "strawberry-healthy",            // 27
    "tomato-bacterial-spot",         // 28
    "tomato-early-blight",           // 29
    "tomato-late-blight",            // 30
    "tomato-leaf-mold",              // 31
    "tomato-septoria-leaf-spot",     // 32
    "tomato-spider-mites",           // 33
    "tomato-target-spot",            // 34
    "tomato-yellow-leaf-curl-virus", // 35
    "tomato-mosaic-virus",           // 36
    "tomato-healthy",                // 37
];

/// Arg-max of the raw probability vector. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassPrediction {
    pub class_index: usize,
    pub label: String,
    pub confidence: f32,
}

pub struct Classifier {
    model: TypedRunnableModel<TypedModel>,
}

static CLASSIFIER: OnceLock<Option<Classifier>> = OnceLock::new();

/// Process-wide classifier handle. The first caller triggers the load; a
/// load failure is logged once and yields `None` for the rest of the
/// process lifetime. Callers treat `None` as degraded mode, not a crash.
pub fn get_or_load(model_path: &str) -> Option<&'static Classifier> {
    CLASSIFIER
        .get_or_init(|| match Classifier::load(model_path) {
            Ok(classifier) => {
                log::info!("classifier loaded from {model_path}");
                Some(classifier)
            }
            Err(e) => {
                log::error!("failed to load classifier from {model_path}: {e}");
                None
            }
        })
        .as_ref()
}

impl Classifier {
    pub fn load(model_path: &str) -> Result<Self, InferenceError> {
        let size = INPUT_SIZE as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .map_err(|e| InferenceError::Model(e.to_string()))?
            .with_input_fact(0, f32::fact([1, size, size, 3]).into())
            .map_err(|e| InferenceError::Model(e.to_string()))?
            .into_optimized()
            .map_err(|e| InferenceError::Model(e.to_string()))?
            .into_runnable()
            .map_err(|e| InferenceError::Model(e.to_string()))?;
        Ok(Self { model })
    }

    /// Single forward pass; returns the probability vector over the fixed
    /// label set (the exported model ends in softmax).
    pub fn classify(&self, tensor: &ImageTensor) -> Result<Vec<f32>, InferenceError> {
        let size = INPUT_SIZE as usize;
        let data: Vec<f32> = tensor.data().iter().copied().collect();
        let input = Tensor::from_shape(&[1, size, size, 3], &data)
            .map_err(|e| InferenceError::Model(e.to_string()))?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| InferenceError::Model(e.to_string()))?;
        let probs = outputs[0]
            .to_array_view::<f32>()
            .map_err(|e| InferenceError::Model(e.to_string()))?
            .iter()
            .copied()
            .collect();
        Ok(probs)
    }
}

/// Applies the post-filter policy to a raw probability vector: arg-max,
/// global confidence threshold, and the configured hallucination rejects.
/// Returns the arg-max prediction together with the resolved class id
/// (`unknown` when filtered out).
pub fn resolve_prediction(probs: &[f32], rejects: &[String]) -> (ClassPrediction, String) {
    let (class_index, confidence) = probs
        .iter()
        .enumerate()
        .fold((0usize, f32::MIN), |best, (i, &p)| {
            if p > best.1 { (i, p) } else { best }
        });

    let label = PLANT_VILLAGE_CLASSES
        .get(class_index)
        .map(|l| l.to_string())
        .unwrap_or_else(|| UNKNOWN_CLASS.to_string());

    let class_id = if class_index < PLANT_VILLAGE_CLASSES.len()
        && confidence >= CONFIDENCE_THRESHOLD
    {
        if rejects.iter().any(|r| r == &label) {
            // Softmax saturates to ~1.0 on generic classes for
            // out-of-distribution images; route these straight to unknown.
            log::info!(
                "targeted rejection of {label} hallucination (confidence {confidence})"
            );
            UNKNOWN_CLASS.to_string()
        } else {
            label.clone()
        }
    } else {
        UNKNOWN_CLASS.to_string()
    };

    (
        ClassPrediction {
            class_index,
            label,
            confidence: confidence.max(0.0),
        },
        class_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probs_with_peak(index: usize, confidence: f32) -> Vec<f32> {
        let rest = (1.0 - confidence) / 37.0;
        let mut probs = vec![rest; 38];
        probs[index] = confidence;
        probs
    }

    fn default_rejects() -> Vec<String> {
        vec!["blueberry-healthy".to_string()]
    }

    #[test]
    fn confident_prediction_resolves_to_its_label() {
        let probs = probs_with_peak(15, 0.70);
        let (prediction, class_id) = resolve_prediction(&probs, &default_rejects());
        assert_eq!(prediction.class_index, 15);
        assert_eq!(prediction.label, "orange-haunglongbing");
        assert_eq!(class_id, "orange-haunglongbing");
    }

    #[test]
    fn reject_listed_class_resolves_to_unknown_at_any_confidence() {
        let probs = probs_with_peak(4, 0.999);
        let (prediction, class_id) = resolve_prediction(&probs, &default_rejects());
        assert_eq!(prediction.label, "blueberry-healthy");
        assert_eq!(class_id, UNKNOWN_CLASS);
    }

    #[test]
    fn below_threshold_resolves_to_unknown() {
        let probs = probs_with_peak(29, 0.50);
        let (prediction, class_id) = resolve_prediction(&probs, &default_rejects());
        assert_eq!(prediction.label, "tomato-early-blight");
        assert!((prediction.confidence - 0.50).abs() < 1e-6);
        assert_eq!(class_id, UNKNOWN_CLASS);
    }

    #[test]
    fn empty_reject_list_keeps_the_hallucination_prone_class() {
        let probs = probs_with_peak(4, 0.95);
        let (_, class_id) = resolve_prediction(&probs, &[]);
        assert_eq!(class_id, "blueberry-healthy");
    }

    #[test]
    fn label_table_has_expected_anchors() {
        assert_eq!(PLANT_VILLAGE_CLASSES.len(), 38);
        assert_eq!(PLANT_VILLAGE_CLASSES[0], "apple-scab");
        assert_eq!(PLANT_VILLAGE_CLASSES[4], "blueberry-healthy");
        assert_eq!(PLANT_VILLAGE_CLASSES[15], "orange-haunglongbing");
        assert_eq!(PLANT_VILLAGE_CLASSES[37], "tomato-healthy");
    }
}
