//! Transcription and extraction record types returned by the API.

use crate::compress::MediaType;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate ISO8601 timestamp for current time.
pub fn now_iso8601() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format_iso8601(secs)
}

/// Format seconds since the Unix epoch as `YYYY-MM-DDTHH:MM:SSZ` (UTC).
pub fn format_iso8601(secs: u64) -> String {
    let days_since_epoch = secs / 86400;
    let time_of_day = secs % 86400;
    let hours = time_of_day / 3600;
    let minutes = (time_of_day % 3600) / 60;
    let seconds = time_of_day % 60;

    let mut year = 1970i32;
    let mut remaining_days = days_since_epoch as i32;

    loop {
        let days_in_year = if is_leap_year(year) { 366 } else { 365 };
        if remaining_days < days_in_year {
            break;
        }
        remaining_days -= days_in_year;
        year += 1;
    }

    let days_in_months: [i32; 12] = if is_leap_year(year) {
        [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    } else {
        [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    };

    let mut month = 1;
    for days in days_in_months {
        if remaining_days < days {
            break;
        }
        remaining_days -= days;
        month += 1;
    }
    let day = remaining_days + 1;

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year, month, day, hours, minutes, seconds
    )
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionStatus {
    Ok,
    Failed,
}

/// Result of transcribing one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    /// 1-based position in the batch.
    pub index: usize,
    pub source_name: String,
    pub status: TranscriptionStatus,
    /// Transcribed text, or the error message when `status` is `failed`.
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,
    pub original_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_bytes: Option<usize>,
}

/// One extraction run over a batch of images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extraction {
    pub id: String,
    pub created_at: String, // ISO8601 timestamp
    pub config: String,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub transcriptions: Vec<Transcription>,
}

impl Extraction {
    pub fn new(config: String, provider: String, transcriptions: Vec<Transcription>) -> Self {
        Self {
            id: format!("ext_{}", Uuid::new_v4().simple()),
            created_at: now_iso8601(),
            config,
            provider,
            session_id: None,
            transcriptions,
        }
    }

    /// Texts in batch order, as they go into the Word export.
    pub fn texts(&self) -> Vec<String> {
        self.transcriptions.iter().map(|t| t.text.clone()).collect()
    }

    pub fn failed_count(&self) -> usize {
        self.transcriptions
            .iter()
            .filter(|t| t.status == TranscriptionStatus::Failed)
            .count()
    }
}

#[derive(Debug, Default)]
struct ExtractionLog {
    by_id: HashMap<String, Extraction>,
    order: VecDeque<String>,
}

/// Finished extractions, bounded to the most recent `capacity` runs.
#[derive(Debug, Clone)]
pub struct ExtractionStore {
    inner: Arc<RwLock<ExtractionLog>>,
    capacity: usize,
}

impl ExtractionStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::default(),
            capacity: capacity.max(1),
        }
    }

    /// Store an extraction, evicting the oldest ones past capacity.
    pub fn insert(&self, extraction: Extraction) {
        let mut log = self.inner.write().unwrap();
        let id = extraction.id.clone();
        if log.by_id.insert(id.clone(), extraction).is_none() {
            log.order.push_back(id);
        }
        while log.order.len() > self.capacity {
            if let Some(oldest) = log.order.pop_front() {
                log.by_id.remove(&oldest);
                tracing::debug!("ExtractionStore: evicted {}", oldest);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Extraction> {
        self.inner.read().unwrap().by_id.get(id).cloned()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.read().unwrap().order.len()
    }
}
