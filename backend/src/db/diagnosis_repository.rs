use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// One persisted analysis. Created once per request, never mutated.
/// `user_id` is nullable because anonymous scans are allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisRecord {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub crop_type: String,
    pub disease_id: String,
    pub confidence: f32,
    pub health_score: i32,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

impl DiagnosisRecord {
    pub fn new(
        user_id: Option<Uuid>,
        crop_type: String,
        disease_id: String,
        confidence: f32,
        health_score: i32,
        image_url: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            crop_type,
            disease_id,
            confidence,
            health_score,
            image_url,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("repository io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// JSONL-file-backed diagnosis history with an in-memory index. Each
/// insert appends one line; a failed append leaves the file untouched and
/// surfaces as a `RepositoryError` for the caller to map to a server
/// error.
#[derive(Clone)]
pub struct DiagnosisRepository {
    path: PathBuf,
    records: Arc<Mutex<Vec<DiagnosisRecord>>>,
}

impl DiagnosisRepository {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut records = Vec::new();
        if path.exists() {
            let reader = BufReader::new(fs::File::open(&path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str(&line) {
                    Ok(record) => records.push(record),
                    Err(e) => log::warn!("skipping malformed history line: {e}"),
                }
            }
        }

        Ok(Self {
            path,
            records: Arc::new(Mutex::new(records)),
        })
    }

    pub fn insert(&self, record: DiagnosisRecord) -> Result<(), RepositoryError> {
        let line = serde_json::to_string(&record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;

        self.records.lock().unwrap().push(record);
        Ok(())
    }

    /// History for one user, or the anonymous scans when no identity is
    /// supplied. Newest first.
    pub fn list(&self, user_id: Option<Uuid>) -> Vec<DiagnosisRecord> {
        let records = self.records.lock().unwrap();
        let mut matching: Vec<DiagnosisRecord> = records
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        matching.reverse();
        matching
    }
}
