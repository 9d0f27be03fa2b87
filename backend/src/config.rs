use std::env;

/// Runtime configuration collected from the environment (`.env` supported
/// via dotenv). Every field has a development default so the server starts
/// without any setup; missing optional credentials degrade features instead
/// of failing startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub model_path: String,
    pub gemini_api_key: Option<String>,
    pub upload_dir: String,
    pub history_path: String,
    /// Class ids the local classifier is known to hallucinate on
    /// out-of-distribution inputs; remapped to `unknown` unconditionally.
    pub hallucination_rejects: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8000);

        let gemini_api_key = env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        let hallucination_rejects = env::var("HALLUCINATION_REJECT_IDS")
            .unwrap_or_else(|_| "blueberry-healthy".to_string())
            .split(',')
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();

        Self {
            port,
            model_path: env::var("MODEL_PATH").unwrap_or_else(|_| "weights/model.onnx".to_string()),
            gemini_api_key,
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string()),
            history_path: env::var("HISTORY_PATH")
                .unwrap_or_else(|_| "data/history.jsonl".to_string()),
            hallucination_rejects,
        }
    }
}
