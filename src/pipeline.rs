//! Per-image transcription pipeline: normalize, send to the vision provider, collect text.

use crate::compress::{prepare_image, CompressionSettings};
use crate::config::PromptConfig;
use crate::ocr::OcrProvider;
use crate::schema::{Transcription, TranscriptionStatus};
use tracing::{error, info};

/// A raw image as uploaded or captured.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Transcribe one image. Failures are folded into the transcription text.
///
/// Compression runs on the blocking pool so large images do not stall the runtime.
pub async fn process_image(
    provider: &dyn OcrProvider,
    config: &PromptConfig,
    settings: &CompressionSettings,
    index: usize,
    image: &SourceImage,
) -> Transcription {
    let mut transcription = Transcription {
        index,
        source_name: image.filename.clone(),
        status: TranscriptionStatus::Ok,
        text: String::new(),
        media_type: None,
        original_bytes: image.data.len(),
        sent_bytes: None,
    };

    let data = image.data.clone();
    let job_settings = settings.clone();
    let prepared = tokio::task::spawn_blocking(move || prepare_image(&data, &job_settings))
        .await
        .map_err(anyhow::Error::from)
        .and_then(|result| result.map_err(anyhow::Error::from));

    let outcome = match prepared {
        Ok(prepared) => {
            transcription.media_type = Some(prepared.media_type);
            transcription.sent_bytes = Some(prepared.data.len());
            provider.transcribe(&prepared, config).await
        }
        Err(e) => Err(e),
    };

    match outcome {
        Ok(text) => transcription.text = text,
        Err(e) => {
            error!("Image {} ({}) failed: {:#}", index, image.filename, e);
            transcription.status = TranscriptionStatus::Failed;
            transcription.text = format!("Error processing image: {:#}", e);
        }
    }

    transcription
}

/// Transcribe a batch sequentially, in order.
pub async fn process_batch(
    provider: &dyn OcrProvider,
    config: &PromptConfig,
    settings: &CompressionSettings,
    images: &[SourceImage],
) -> Vec<Transcription> {
    let total = images.len();
    let mut transcriptions = Vec::with_capacity(total);

    for (idx, image) in images.iter().enumerate() {
        let index = idx + 1;
        info!(
            "Processing image {}/{}: {} ({} bytes) via {}",
            index,
            total,
            image.filename,
            image.data.len(),
            provider.name()
        );
        transcriptions.push(process_image(provider, config, settings, index, image).await);
    }

    transcriptions
}
