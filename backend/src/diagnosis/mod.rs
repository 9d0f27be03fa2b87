pub mod engine;
pub mod health_score;
pub mod knowledge_base;

pub use engine::DiagnosisEngine;
