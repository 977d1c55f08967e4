//! In-memory capture sessions for camera mode.
//!
//! A session accumulates photos one at a time. Resubmitting the photo that was
//! just captured is ignored, so a client retrying the same frame does not
//! duplicate it.

use crate::compress;
use crate::error::{ExtractorError, Result};
use crate::pipeline::SourceImage;
use crate::schema::now_iso8601;
use image::ImageFormat;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A captured image and what we know about it.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub filename: String,
    pub data: Vec<u8>,
    pub sha256: String,
    pub format: Option<ImageFormat>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl StoredImage {
    pub fn new(filename: String, data: Vec<u8>) -> Self {
        let sha256 = format!("{:x}", Sha256::digest(&data));
        let probe = compress::probe(&data).ok();
        Self {
            filename,
            sha256,
            format: probe.map(|p| p.format),
            width: probe.map(|p| p.width),
            height: probe.map(|p| p.height),
            data,
        }
    }

    /// MIME type for serving the raw bytes back as a preview.
    pub fn content_type(&self) -> &'static str {
        match self.format {
            Some(format) => match compress::MediaType::from_format(format) {
                Some(media_type) => media_type.as_str(),
                None => match format {
                    ImageFormat::Bmp => "image/bmp",
                    ImageFormat::Tiff => "image/tiff",
                    _ => "application/octet-stream",
                },
            },
            None => "application/octet-stream",
        }
    }

    fn summary(&self, index: usize) -> ImageSummary {
        ImageSummary {
            index,
            filename: self.filename.clone(),
            bytes: self.data.len(),
            sha256: self.sha256.clone(),
            format: self.format.map(|f| format!("{:?}", f).to_lowercase()),
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Debug, Clone)]
struct CaptureSession {
    created_at: String,
    images: Vec<StoredImage>,
    last_digest: Option<String>,
    /// Last create or change; idle sessions are swept.
    touched: Instant,
}

/// Preview metadata for one captured image (0-based index).
#[derive(Debug, Clone, Serialize)]
pub struct ImageSummary {
    pub index: usize,
    pub filename: String,
    pub bytes: usize,
    pub sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub created_at: String,
    pub images: Vec<ImageSummary>,
}

/// Outcome of adding one image to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOutcome {
    Added { index: usize },
    Duplicate,
}

/// Session map shared across handlers.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, CaptureSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty session, returns its id.
    pub fn create(&self) -> String {
        let id = format!("ses_{}", Uuid::new_v4().simple());
        let session = CaptureSession {
            created_at: now_iso8601(),
            images: Vec::new(),
            last_digest: None,
            touched: Instant::now(),
        };
        self.inner.write().unwrap().insert(id.clone(), session);
        tracing::debug!("SessionStore: created '{}'", id);
        id
    }

    pub fn delete(&self, id: &str) -> bool {
        self.inner.write().unwrap().remove(id).is_some()
    }

    pub fn exists(&self, id: &str) -> bool {
        self.inner.read().unwrap().contains_key(id)
    }

    /// Append a capture unless it repeats the last one.
    pub fn add_image(&self, id: &str, image: StoredImage) -> Result<AddOutcome> {
        let mut store = self.inner.write().unwrap();
        let session = store
            .get_mut(id)
            .ok_or_else(|| ExtractorError::SessionNotFound(id.to_string()))?;

        session.touched = Instant::now();
        if session.last_digest.as_deref() == Some(image.sha256.as_str()) {
            tracing::debug!("SessionStore: '{}' ignored repeat of {}", id, image.sha256);
            return Ok(AddOutcome::Duplicate);
        }

        session.last_digest = Some(image.sha256.clone());
        session.images.push(image);
        let index = session.images.len() - 1;
        tracing::debug!("SessionStore: '{}' now holds {} images", id, session.images.len());
        Ok(AddOutcome::Added { index })
    }

    pub fn summary(&self, id: &str) -> Result<SessionSummary> {
        let store = self.inner.read().unwrap();
        let session = store
            .get(id)
            .ok_or_else(|| ExtractorError::SessionNotFound(id.to_string()))?;

        Ok(SessionSummary {
            id: id.to_string(),
            created_at: session.created_at.clone(),
            images: session
                .images
                .iter()
                .enumerate()
                .map(|(i, img)| img.summary(i))
                .collect(),
        })
    }

    pub fn get_image(&self, id: &str, index: usize) -> Result<StoredImage> {
        let store = self.inner.read().unwrap();
        let session = store
            .get(id)
            .ok_or_else(|| ExtractorError::SessionNotFound(id.to_string()))?;
        session
            .images
            .get(index)
            .cloned()
            .ok_or(ExtractorError::ImageIndexOutOfRange {
                index,
                len: session.images.len(),
            })
    }

    /// Remove one image; later images shift down by one.
    pub fn remove_image(&self, id: &str, index: usize) -> Result<StoredImage> {
        let mut store = self.inner.write().unwrap();
        let session = store
            .get_mut(id)
            .ok_or_else(|| ExtractorError::SessionNotFound(id.to_string()))?;
        session.touched = Instant::now();
        if index >= session.images.len() {
            return Err(ExtractorError::ImageIndexOutOfRange {
                index,
                len: session.images.len(),
            });
        }
        Ok(session.images.remove(index))
    }

    /// Drop every image and forget the last capture.
    pub fn clear(&self, id: &str) -> Result<usize> {
        let mut store = self.inner.write().unwrap();
        let session = store
            .get_mut(id)
            .ok_or_else(|| ExtractorError::SessionNotFound(id.to_string()))?;
        session.touched = Instant::now();
        let removed = session.images.len();
        session.images.clear();
        session.last_digest = None;
        Ok(removed)
    }

    /// Drop sessions that have not changed within `max_idle`. Returns how many went.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        let mut store = self.inner.write().unwrap();
        let before = store.len();
        store.retain(|_, session| session.touched.elapsed() <= max_idle);
        let swept = before - store.len();
        if swept > 0 {
            tracing::debug!("SessionStore: swept {} idle sessions", swept);
        }
        swept
    }

    /// Snapshot of the session's images for a pipeline run.
    pub fn images(&self, id: &str) -> Result<Vec<SourceImage>> {
        let store = self.inner.read().unwrap();
        let session = store
            .get(id)
            .ok_or_else(|| ExtractorError::SessionNotFound(id.to_string()))?;
        Ok(session
            .images
            .iter()
            .map(|img| SourceImage {
                filename: img.filename.clone(),
                data: img.data.clone(),
            })
            .collect())
    }
}
