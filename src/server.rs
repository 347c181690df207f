use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    response::Html,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::ImageFormat;
use serde::Serialize;
use tokio::task;
use tower_http::trace::TraceLayer;

use crate::annotate::Annotator;
use crate::errors::{CropscanError, Result};
use crate::ingest;
use crate::predictions::{self, Prediction, TOP_K};
use crate::source::PredictionSource;

/// Uploads beyond this size are rejected before decoding.
const UPLOAD_LIMIT_BYTES: usize = 20 * 1024 * 1024;

/// Everything a request handler needs. Both backends sit behind the
/// `PredictionSource` trait so tests can swap in mocks.
#[derive(Clone)]
pub struct AppState {
    hosted: Arc<dyn PredictionSource>,
    local: Arc<dyn PredictionSource>,
    annotator: Option<Arc<Annotator>>,
    upload_dir: Option<PathBuf>,
    index_html: Arc<String>,
}

impl AppState {
    pub fn new(
        hosted: Arc<dyn PredictionSource>,
        local: Arc<dyn PredictionSource>,
        annotator: Option<Annotator>,
        background: Option<&[u8]>,
        upload_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            hosted,
            local,
            annotator: annotator.map(Arc::new),
            upload_dir,
            index_html: Arc::new(render_index(background)),
        }
    }
}

/// JSON body of a successful prediction round trip.
#[derive(Serialize)]
pub struct PredictResponse {
    pub backend: String,
    /// Display line for the top prediction, e.g. `healthy (Confidence: 0.91)`.
    pub summary: String,
    pub top: Prediction,
    pub predictions: Vec<Prediction>,
    /// Annotated copy of the upload, base64-encoded JPEG.
    pub annotated_image: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/predict/hosted", post(predict_hosted))
        .route("/api/predict/local", post(predict_local))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(state.index_html.as_ref().clone())
}

async fn predict_hosted(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PredictResponse>> {
    let bytes = read_image_field(multipart).await?;
    // The side file mirrors the hosted call's input; the local path never
    // touches disk.
    run_backend(
        state.hosted.clone(),
        state.annotator.clone(),
        state.upload_dir.clone(),
        bytes,
    )
    .await
    .map(Json)
}

async fn predict_local(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PredictResponse>> {
    let bytes = read_image_field(multipart).await?;
    run_backend(state.local.clone(), state.annotator.clone(), None, bytes)
        .await
        .map(Json)
}

/// Pull the `image` field out of a multipart upload.
async fn read_image_field(mut multipart: Multipart) -> Result<Vec<u8>> {
    while let Some(field) =
        multipart
            .next_field()
            .await
            .map_err(|e| CropscanError::ImageProcessing {
                operation: "multipart parsing".to_string(),
                source: Box::new(e),
            })?
    {
        if field.name() == Some("image") {
            let bytes = field.bytes().await.map_err(|e| CropscanError::ImageProcessing {
                operation: "upload read".to_string(),
                source: Box::new(e),
            })?;
            return Ok(bytes.to_vec());
        }
    }

    Err(CropscanError::ImageProcessing {
        operation: "upload extraction".to_string(),
        source: Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "multipart body has no `image` field",
        )),
    })
}

/// Decode, infer, rank, annotate. Inference and image work are synchronous, so
/// the whole round trip runs on a blocking worker thread.
async fn run_backend(
    source: Arc<dyn PredictionSource>,
    annotator: Option<Arc<Annotator>>,
    upload_dir: Option<PathBuf>,
    bytes: Vec<u8>,
) -> Result<PredictResponse> {
    task::spawn_blocking(move || {
        let upload = ingest::decode_upload(&bytes)?;
        if let Some(dir) = upload_dir.as_deref() {
            ingest::persist_upload(dir, &upload)?;
        }

        let ranked = predictions::top_k(source.predict(&upload)?, TOP_K);
        let top = ranked
            .first()
            .cloned()
            .ok_or_else(|| CropscanError::NoPredictions {
                backend: source.name().to_string(),
            })?;

        let annotated = match annotator.as_deref() {
            Some(annotator) => annotator.annotate(&upload.image, &ranked),
            None => upload.image.clone(),
        };
        let mut annotated_jpeg = Vec::new();
        annotated
            .to_rgb8()
            .write_to(&mut Cursor::new(&mut annotated_jpeg), ImageFormat::Jpeg)
            .map_err(|e| CropscanError::ImageProcessing {
                operation: "annotated image encoding".to_string(),
                source: Box::new(e),
            })?;

        tracing::info!(backend = source.name(), top = %top.summary(), "prediction complete");

        Ok(PredictResponse {
            backend: source.name().to_string(),
            summary: top.summary(),
            top,
            predictions: ranked,
            annotated_image: BASE64.encode(&annotated_jpeg),
        })
    })
    .await
    .map_err(|e| CropscanError::Configuration {
        message: format!("inference task failed: {e}"),
    })?
}

/// The single page: title, upload control, preview, one button per backend.
/// The background image, when configured, is inlined as a data URL the same way
/// for every render.
fn render_index(background: Option<&[u8]>) -> String {
    let background_css = background
        .map(|bytes| {
            format!(
                "body {{ background-image: url(\"data:image/jpg;base64,{}\"); \
                 background-size: cover; background-position: center; \
                 background-repeat: no-repeat; }}",
                BASE64.encode(bytes)
            )
        })
        .unwrap_or_default();

    INDEX_TEMPLATE.replace("/*BACKGROUND*/", &background_css)
}

const INDEX_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Image Disease Detection</title>
<style>
body { font-family: -apple-system, 'Segoe UI', Roboto, sans-serif; margin: 0; min-height: 100vh; }
/*BACKGROUND*/
.container { background: rgba(255,255,255,0.92); border-radius: 12px; max-width: 720px; margin: 40px auto; padding: 32px; box-shadow: 0 8px 30px rgba(0,0,0,0.25); }
h1 { margin-top: 0; }
button { margin: 8px 8px 8px 0; padding: 10px 18px; border: 0; border-radius: 6px; background: #2e7d32; color: white; cursor: pointer; }
button:disabled { background: #9e9e9e; }
img { max-width: 100%; border-radius: 6px; margin-top: 12px; }
#summary { font-weight: 600; margin-top: 16px; }
#error { color: #b71c1c; margin-top: 16px; }
</style>
</head>
<body>
<div class="container">
<h1>Image Disease Detection</h1>
<input type="file" id="upload" accept="image/jpeg,image/png">
<img id="preview" hidden>
<div>
<button id="hosted" disabled>Predict with hosted API</button>
<button id="local" disabled>Predict with local model</button>
</div>
<div id="summary"></div>
<div id="error"></div>
<img id="annotated" hidden>
</div>
<script>
const upload = document.getElementById('upload');
const buttons = ['hosted', 'local'].map(id => document.getElementById(id));
upload.addEventListener('change', () => {
  const file = upload.files[0];
  if (!file) return;
  document.getElementById('preview').src = URL.createObjectURL(file);
  document.getElementById('preview').hidden = false;
  buttons.forEach(b => b.disabled = false);
});
buttons.forEach(button => button.addEventListener('click', async () => {
  const body = new FormData();
  body.append('image', upload.files[0]);
  buttons.forEach(b => b.disabled = true);
  document.getElementById('error').textContent = '';
  try {
    const response = await fetch('/api/predict/' + button.id, { method: 'POST', body });
    const result = await response.json();
    if (!response.ok) throw new Error(result.error || response.statusText);
    document.getElementById('summary').textContent =
      (button.id === 'hosted' ? 'Hosted API Prediction: ' : 'Local Model Prediction: ') + result.summary;
    const annotated = document.getElementById('annotated');
    annotated.src = 'data:image/jpeg;base64,' + result.annotated_image;
    annotated.hidden = false;
  } catch (err) {
    document.getElementById('error').textContent = 'Error: ' + err.message;
  } finally {
    buttons.forEach(b => b.disabled = false);
  }
}));
</script>
</body>
</html>
"#;
