//! Image Text Extractor - upload or capture images, transcribe them with a hosted
//! vision model and download the combined text as a Word document.

mod compress;
mod config;
mod docx;
mod error;
mod ocr;
mod pipeline;
mod schema;
mod session;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use compress::CompressionSettings;
use config::{AppSettings, ConfigStore};
use error::ExtractorError;
use ocr::{OcrProviderKind, ProviderRegistry};
use pipeline::SourceImage;
use schema::{Extraction, ExtractionStore};
use session::{AddOutcome, SessionStore, SessionSummary, StoredImage};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// File extensions accepted for upload.
const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "heic", "heif", "webp", "bmp", "tiff"];

type ApiResult<T> = Result<T, (StatusCode, String)>;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    extractions: ExtractionStore,
    sessions: SessionStore,
    session_idle: Duration,
    providers: Arc<ProviderRegistry>,
    configs: Arc<ConfigStore>,
    compression: Arc<CompressionSettings>,
}

impl AppState {
    fn new(providers: ProviderRegistry, configs: ConfigStore, settings: &AppSettings) -> Self {
        Self {
            extractions: ExtractionStore::new(settings.max_extractions),
            sessions: SessionStore::new(),
            session_idle: settings.session_idle,
            providers: Arc::new(providers),
            configs: Arc::new(configs),
            compression: Arc::new(CompressionSettings::with_max_bytes(settings.max_image_bytes)),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "image_text_extractor=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = AppSettings::from_env()?;
    info!(
        "Settings: bind={}, max_image_bytes={}, max_upload_bytes={}",
        settings.bind_addr, settings.max_image_bytes, settings.max_upload_bytes
    );

    let configs = ConfigStore::load_or_default(&settings.config_dir);
    info!("Loaded {} prompt profiles: {:?}", configs.list().len(), configs.list());

    let providers = ProviderRegistry::from_env();
    if providers.is_empty() {
        warn!("No vision provider configured; set ANTHROPIC_API_KEY or OPENROUTER_API_KEY");
    }

    let state = AppState::new(providers, configs, &settings);
    let app = router(state, settings.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    info!("Server listening on http://{}", settings.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/configs", get(list_configs))
        .route(
            "/configs/:name",
            get(get_config).put(put_config).delete(delete_config),
        )
        .route("/extract", post(extract_upload))
        .route("/extractions/:id", get(get_extraction))
        .route("/extractions/:id/document", get(get_extraction_document))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route(
            "/sessions/:id/images",
            post(add_session_images).delete(clear_session_images),
        )
        .route(
            "/sessions/:id/images/:index",
            get(get_session_image).delete(delete_session_image),
        )
        .route("/sessions/:id/extract", post(extract_session))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Browser page for upload and camera capture.
async fn index() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// List available prompt profiles.
async fn list_configs(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.configs.list())
}

/// Get a specific prompt profile.
async fn get_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<config::PromptConfig>, StatusCode> {
    state.configs.get(&name).map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// Create or replace a prompt profile for this process.
async fn put_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(config): Json<config::PromptConfig>,
) -> ApiResult<(StatusCode, Json<config::PromptConfig>)> {
    if config.name != name {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Profile name '{}' does not match path '{}'", config.name, name),
        ));
    }

    let status = if state.configs.get(&name).is_some() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    state.configs.insert(config.clone());
    info!("Stored prompt profile {}", name);
    Ok((status, Json(config)))
}

async fn delete_config(State(state): State<AppState>, Path(name): Path<String>) -> StatusCode {
    if state.configs.remove(&name) {
        info!("Removed prompt profile {}", name);
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[derive(Debug, Default, serde::Deserialize)]
struct ExtractQuery {
    config: Option<String>,
    provider: Option<String>,
    format: Option<String>,
}

/// Upload one or more images and transcribe them.
async fn extract_upload(
    State(state): State<AppState>,
    Query(query): Query<ExtractQuery>,
    multipart: Multipart,
) -> ApiResult<Response> {
    let images = read_images(multipart).await?;
    if images.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No images uploaded".to_string()));
    }

    run_extraction(&state, &query, images, None).await
}

/// Get an extraction by ID.
async fn get_extraction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Extraction>, StatusCode> {
    state
        .extractions
        .get(&id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// Download an extraction as a Word document.
async fn get_extraction_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let extraction = state
        .extractions
        .get(&id)
        .ok_or((StatusCode::NOT_FOUND, format!("Extraction not found: {}", id)))?;

    docx_response(&extraction)
}

async fn create_session(State(state): State<AppState>) -> ApiResult<(StatusCode, Json<SessionSummary>)> {
    let swept = state.sessions.sweep_idle(state.session_idle);
    if swept > 0 {
        info!("Dropped {} idle capture sessions", swept);
    }

    let id = state.sessions.create();
    let summary = state.sessions.summary(&id)?;
    info!("Created capture session {}", id);
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionSummary>> {
    Ok(Json(state.sessions.summary(&id)?))
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    if state.sessions.delete(&id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[derive(Debug, serde::Serialize)]
struct AddImagesResponse {
    added: usize,
    duplicates: usize,
    session: SessionSummary,
}

/// Add captured images to a session.
async fn add_session_images(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult<Json<AddImagesResponse>> {
    if !state.sessions.exists(&id) {
        return Err(ExtractorError::SessionNotFound(id).into());
    }

    let images = read_images(multipart).await?;
    if images.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No images uploaded".to_string()));
    }

    let mut added = 0;
    let mut duplicates = 0;
    for image in images {
        match state
            .sessions
            .add_image(&id, StoredImage::new(image.filename, image.data))?
        {
            AddOutcome::Added { .. } => added += 1,
            AddOutcome::Duplicate => duplicates += 1,
        }
    }

    info!("Session {}: {} added, {} duplicates ignored", id, added, duplicates);
    Ok(Json(AddImagesResponse {
        added,
        duplicates,
        session: state.sessions.summary(&id)?,
    }))
}

async fn clear_session_images(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionSummary>> {
    let removed = state.sessions.clear(&id)?;
    info!("Session {}: cleared {} images", id, removed);
    Ok(Json(state.sessions.summary(&id)?))
}

/// Raw image bytes for previews.
async fn get_session_image(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
) -> ApiResult<Response> {
    let image = state.sessions.get_image(&id, index)?;
    Ok(([(header::CONTENT_TYPE, image.content_type())], image.data).into_response())
}

async fn delete_session_image(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
) -> ApiResult<Json<SessionSummary>> {
    let removed = state.sessions.remove_image(&id, index)?;
    info!("Session {}: removed image {} ({})", id, index, removed.filename);
    Ok(Json(state.sessions.summary(&id)?))
}

/// Transcribe every image captured in a session.
async fn extract_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ExtractQuery>,
) -> ApiResult<Response> {
    let images = state.sessions.images(&id)?;
    if images.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No images captured".to_string()));
    }

    run_extraction(&state, &query, images, Some(id)).await
}

// ============================================================================
// Helper functions
// ============================================================================

/// Resolve profile and provider, run the batch and store the result.
async fn run_extraction(
    state: &AppState,
    query: &ExtractQuery,
    images: Vec<SourceImage>,
    session_id: Option<String>,
) -> ApiResult<Response> {
    let config = state.configs.resolve(query.config.as_deref()).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!(
                "Unknown config: {}. Available: {:?}",
                query.config.as_deref().unwrap_or_default(),
                state.configs.list()
            ),
        )
    })?;

    let kind = match query.provider.as_deref() {
        None => OcrProviderKind::Anthropic,
        Some(name) => OcrProviderKind::from_str(name).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                format!("Unknown provider: {}. Expected anthropic or openrouter", name),
            )
        })?,
    };
    let provider = state.providers.get(kind).ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Provider not configured: {}", kind.as_str()),
        )
    })?;

    let wants_docx = match query.format.as_deref() {
        None | Some("json") => false,
        Some("docx") => true,
        Some(other) => {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("Unknown format: {}. Expected json or docx", other),
            ))
        }
    };

    info!(
        "Extracting {} images with config={} provider={}",
        images.len(),
        config.name,
        provider.name()
    );

    let transcriptions =
        pipeline::process_batch(provider.as_ref(), &config, &state.compression, &images).await;

    let mut extraction = Extraction::new(config.name.clone(), kind.as_str().to_string(), transcriptions);
    extraction.session_id = session_id;

    state.extractions.insert(extraction.clone());

    info!(
        "Extraction complete: {} ({} images, {} failed)",
        extraction.id,
        extraction.transcriptions.len(),
        extraction.failed_count()
    );

    if wants_docx {
        docx_response(&extraction)
    } else {
        Ok(Json(extraction).into_response())
    }
}

fn docx_response(extraction: &Extraction) -> ApiResult<Response> {
    let bytes = docx::build_docx(&extraction.texts())?;

    let headers = [
        (header::CONTENT_TYPE, docx::DOCX_MIME.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", docx::DOCX_FILENAME),
        ),
        (HeaderName::from_static("x-extraction-id"), extraction.id.clone()),
    ];

    Ok((headers, bytes).into_response())
}

/// Collect every file field of a multipart body as an image.
async fn read_images(mut multipart: Multipart) -> ApiResult<Vec<SourceImage>> {
    let mut images = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e))
    })? {
        let Some(filename) = field.file_name().map(|s| s.to_string()) else {
            continue;
        };

        let data = field.bytes().await.map_err(|e| {
            (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e))
        })?;

        // Browsers send an empty part when no file was picked.
        if filename.is_empty() && data.is_empty() {
            continue;
        }

        check_file_type(&filename, &data)?;
        info!("Received image: {} ({} bytes)", filename, data.len());
        images.push(SourceImage {
            filename,
            data: data.to_vec(),
        });
    }

    Ok(images)
}

/// Accept listed extensions; files without one must sniff as an image.
fn check_file_type(filename: &str, data: &[u8]) -> Result<(), ExtractorError> {
    let extension = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match extension {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        Some(ext) => Err(ExtractorError::UnsupportedFileType(format!(
            "{} (.{}); allowed: {}",
            filename,
            ext,
            ALLOWED_EXTENSIONS.join(", ")
        ))),
        None if compress::probe(data).is_ok() => Ok(()),
        None => Err(ExtractorError::UnsupportedFileType(filename.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use compress::PreparedImage;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use serde_json::Value;
    use std::io::Cursor;
    use tower::ServiceExt;

    const BOUNDARY: &str = "X-BOUNDARY";

    /// Answers with the payload size and media type instead of calling out.
    struct StubProvider;

    #[async_trait::async_trait]
    impl ocr::OcrProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn transcribe(
            &self,
            image: &PreparedImage,
            _config: &config::PromptConfig,
        ) -> anyhow::Result<String> {
            Ok(format!("{} bytes of {}\nsecond line", image.data.len(), image.media_type.as_str()))
        }
    }

    fn test_app() -> Router {
        let mut providers = ProviderRegistry::new();
        providers.register(OcrProviderKind::Anthropic, Arc::new(StubProvider));
        let settings = AppSettings::default();
        let state = AppState::new(providers, ConfigStore::builtin(), &settings);
        router(state, settings.max_upload_bytes)
    }

    fn png(width: u32, height: u32, shade: u8) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([shade, shade, 0])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn multipart_body(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (filename, data) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn multipart_request(uri: &str, files: &[(&str, &[u8])]) -> Request<Body> {
        let body = multipart_body(files);
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .header("content-length", body.len())
            .body(Body::from(body))
            .expect("Failed to build request")
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("Failed to build request")
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>, axum::http::HeaderMap) {
        let response = app.clone().oneshot(request).await.expect("Request failed");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), 10_000_000)
            .await
            .expect("Failed to read body");
        (status, bytes.to_vec(), headers)
    }

    async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body, _) = send(app, request).await;
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health_and_configs() {
        let app = test_app();

        let (status, body, _) = send(&app, empty_request("GET", "/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");

        let (status, value) = send_json(&app, empty_request("GET", "/configs")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value, serde_json::json!(["default"]));

        let (status, _, _) = send(&app, empty_request("GET", "/configs/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_config_profiles_can_be_replaced_and_removed() {
        let app = test_app();
        let profile = serde_json::json!({
            "name": "receipts",
            "description": "Till receipts",
            "prompt": "Transcribe the receipt."
        });
        let put = |uri: &str, body: &Value| {
            Request::builder()
                .method("PUT")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("Failed to build request")
        };

        let (status, stored) = send_json(&app, put("/configs/receipts", &profile)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(stored["max_tokens"], 4096);

        let (status, _) = send_json(&app, put("/configs/receipts", &profile)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send_json(&app, put("/configs/other", &profile)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, names) = send_json(&app, empty_request("GET", "/configs")).await;
        assert_eq!(names, serde_json::json!(["default", "receipts"]));

        let (status, value) = send_json(
            &app,
            multipart_request("/extract?config=receipts", &[("a.png", png(4, 4, 1).as_slice())]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["config"], "receipts");

        let (status, _, _) = send(&app, empty_request("DELETE", "/configs/receipts")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _, _) = send(&app, empty_request("DELETE", "/configs/receipts")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_index_page_served() {
        let app = test_app();
        let (status, body, headers) = send(&app, empty_request("GET", "/")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/html"));
        assert!(String::from_utf8(body).unwrap().contains("Image Text Extractor"));
    }

    #[tokio::test]
    async fn test_upload_extracts_in_order() {
        let app = test_app();
        let first = png(10, 10, 10);
        let second = png(20, 20, 200);

        let (status, value) = send_json(
            &app,
            multipart_request("/extract", &[("page1.png", first.as_slice()), ("page2.PNG", second.as_slice())]),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["config"], "default");
        assert_eq!(value["provider"], "anthropic");
        let transcriptions = value["transcriptions"].as_array().unwrap();
        assert_eq!(transcriptions.len(), 2);
        assert_eq!(transcriptions[0]["source_name"], "page1.png");
        assert_eq!(transcriptions[0]["index"], 1);
        assert_eq!(
            transcriptions[0]["text"],
            format!("{} bytes of image/png\nsecond line", first.len())
        );
        assert_eq!(transcriptions[1]["source_name"], "page2.PNG");

        // Stored for later retrieval.
        let id = value["id"].as_str().unwrap();
        let (status, stored) = send_json(&app, empty_request("GET", &format!("/extractions/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stored["id"], id);
    }

    #[tokio::test]
    async fn test_upload_rejects_bad_input() {
        let app = test_app();
        let image = png(4, 4, 0);

        let (status, _, _) = send(&app, multipart_request("/extract", &[("notes.pdf", &b"%PDF-1.4"[..])])).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let (status, _, _) = send(&app, multipart_request("/extract", &[])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, _) = send(
            &app,
            multipart_request("/extract?provider=tesseract", &[("a.png", image.as_slice())]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, _) = send(
            &app,
            multipart_request("/extract?provider=openrouter", &[("a.png", image.as_slice())]),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _, _) = send(
            &app,
            multipart_request("/extract?config=legal", &[("a.png", image.as_slice())]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_undecodable_image_fails_per_image() {
        let app = test_app();
        let image = png(4, 4, 0);

        let (status, value) = send_json(
            &app,
            multipart_request("/extract", &[("broken.heic", &b"not an image"[..]), ("ok.png", image.as_slice())]),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["transcriptions"][0]["status"], "failed");
        assert!(value["transcriptions"][0]["text"]
            .as_str()
            .unwrap()
            .starts_with("Error processing image:"));
        assert_eq!(value["transcriptions"][1]["status"], "ok");
    }

    #[tokio::test]
    async fn test_docx_download() {
        let app = test_app();
        let image = png(4, 4, 0);

        let (status, body, headers) = send(
            &app,
            multipart_request("/extract?format=docx", &[("a.png", image.as_slice())]),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], docx::DOCX_MIME);
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"extracted_text.docx\""
        );
        assert!(body.starts_with(b"PK"));

        let id = headers["x-extraction-id"].to_str().unwrap().to_string();
        let (status, again, _) = send(&app, empty_request("GET", &format!("/extractions/{}/document", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(again.starts_with(b"PK"));

        let (status, _, _) = send(&app, empty_request("GET", "/extractions/ext_missing/document")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_capture_session_flow() {
        let app = test_app();
        let photo_a = png(6, 6, 30);
        let photo_b = png(6, 6, 90);

        let (status, created) = send_json(&app, empty_request("POST", "/sessions")).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap().to_string();
        let base = format!("/sessions/{}", id);

        // Extracting an empty session is a client error.
        let (status, _, _) = send(&app, empty_request("POST", &format!("{}/extract", base))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, added) = send_json(
            &app,
            multipart_request(&format!("{}/images", base), &[("camera.jpg", photo_a.as_slice()), ("camera.jpg", photo_a.as_slice())]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(added["added"], 1);
        assert_eq!(added["duplicates"], 1);

        let (_, added) = send_json(
            &app,
            multipart_request(&format!("{}/images", base), &[("camera.jpg", photo_b.as_slice())]),
        )
        .await;
        assert_eq!(added["session"]["images"].as_array().unwrap().len(), 2);
        assert_eq!(added["session"]["images"][1]["width"], 6);

        let (status, preview, headers) = send(&app, empty_request("GET", &format!("{}/images/1", base))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "image/png");
        assert_eq!(preview, photo_b);

        let (status, after_remove) = send_json(&app, empty_request("DELETE", &format!("{}/images/0", base))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(after_remove["images"].as_array().unwrap().len(), 1);

        let (status, _, _) = send(&app, empty_request("DELETE", &format!("{}/images/7", base))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, extraction) = send_json(&app, empty_request("POST", &format!("{}/extract", base))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(extraction["session_id"], id.as_str());
        assert_eq!(extraction["transcriptions"].as_array().unwrap().len(), 1);

        let (status, cleared) = send_json(&app, empty_request("DELETE", &format!("{}/images", base))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(cleared["images"].as_array().unwrap().is_empty());

        let (status, _, _) = send(&app, empty_request("DELETE", &base)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _, _) = send(&app, empty_request("GET", &base)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_check_file_type() {
        let image = png(2, 2, 0);
        assert!(check_file_type("scan.JPEG", b"").is_ok());
        assert!(check_file_type("photo.heic", b"").is_ok());
        assert!(check_file_type("blob", image.as_slice()).is_ok());
        assert!(check_file_type("blob", b"plain text").is_err());
        assert!(matches!(
            check_file_type("archive.zip", b"PK"),
            Err(ExtractorError::UnsupportedFileType(_))
        ));
    }
}
