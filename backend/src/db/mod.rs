pub mod diagnosis_repository;

pub use diagnosis_repository::{DiagnosisRecord, DiagnosisRepository};
