use std::io::Cursor;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;
use tower::ServiceExt;

use cropscan::mocks::MockPredictionSource;
use cropscan::{router, Annotator, AppState, Prediction};

const BOUNDARY: &str = "cropscan-test-boundary";

fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([30, 110, 30])));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
        .expect("jpeg encoding");
    out
}

fn multipart_request(uri: &str, payload: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; \
             filename=\"leaf.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request builds")
}

fn app(hosted: MockPredictionSource, local: MockPredictionSource) -> axum::Router {
    app_with_upload_dir(hosted, local, None)
}

fn app_with_upload_dir(
    hosted: MockPredictionSource,
    local: MockPredictionSource,
    upload_dir: Option<std::path::PathBuf>,
) -> axum::Router {
    let state = AppState::new(
        Arc::new(hosted),
        Arc::new(local),
        Annotator::discover().ok(),
        None,
        upload_dir,
    );
    router(state)
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is json")
}

#[tokio::test]
async fn hosted_backend_round_trip() {
    let hosted = MockPredictionSource::new(
        "hosted",
        vec![
            Prediction::new("blight", 0.05),
            Prediction::new("healthy", 0.91),
        ],
    );
    let app = app(hosted, MockPredictionSource::empty("local"));

    let response = app
        .oneshot(multipart_request("/api/predict/hosted", &jpeg_bytes(224, 224)))
        .await
        .expect("request completes");
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["backend"], "hosted");
    assert_eq!(json["summary"], "healthy (Confidence: 0.91)");
    assert_eq!(json["top"]["class"], "healthy");
    assert_eq!(json["predictions"].as_array().unwrap().len(), 2);
    // Response predictions come back sorted by confidence.
    assert_eq!(json["predictions"][0]["class"], "healthy");
    assert_eq!(json["predictions"][1]["class"], "blight");

    // The annotated image is a decodable JPEG with the upload's dimensions.
    let annotated = BASE64
        .decode(json["annotated_image"].as_str().unwrap())
        .expect("annotated image is base64");
    let annotated = image::load_from_memory(&annotated).expect("annotated image decodes");
    assert_eq!((annotated.width(), annotated.height()), (224, 224));
}

#[tokio::test]
async fn local_backend_top1_has_non_empty_label() {
    let local = MockPredictionSource::new(
        "local",
        vec![
            Prediction::new("leaf_spot", 0.62),
            Prediction::new("healthy", 0.30),
            Prediction::new("rust", 0.08),
        ],
    );
    let app = app(MockPredictionSource::empty("hosted"), local);

    let response = app
        .oneshot(multipart_request("/api/predict/local", &jpeg_bytes(640, 640)))
        .await
        .expect("request completes");
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["backend"], "local");
    let top_label = json["top"]["class"].as_str().unwrap();
    assert!(!top_label.is_empty());
    assert_eq!(json["summary"], "leaf_spot (Confidence: 0.62)");
}

#[tokio::test]
async fn more_than_five_predictions_are_truncated_sorted() {
    let hosted = MockPredictionSource::new(
        "hosted",
        (0..7)
            .map(|i| Prediction::new(format!("class_{i}"), i as f32 / 10.0))
            .collect(),
    );
    let app = app(hosted, MockPredictionSource::empty("local"));

    let response = app
        .oneshot(multipart_request("/api/predict/hosted", &jpeg_bytes(64, 64)))
        .await
        .expect("request completes");
    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    let predictions = json["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 5);
    let confidences: Vec<f64> = predictions
        .iter()
        .map(|p| p["confidence"].as_f64().unwrap())
        .collect();
    for pair in confidences.windows(2) {
        assert!(pair[0] >= pair[1]);
    }
}

#[tokio::test]
async fn empty_backend_result_is_unprocessable_not_a_panic() {
    let app = app(
        MockPredictionSource::empty("hosted"),
        MockPredictionSource::empty("local"),
    );

    let response = app
        .oneshot(multipart_request("/api/predict/hosted", &jpeg_bytes(32, 32)))
        .await
        .expect("request completes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let json = response_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("no predictions"));
}

#[tokio::test]
async fn malformed_upload_is_rejected() {
    let app = app(
        cropscan::mocks::create_mock_source(),
        MockPredictionSource::empty("local"),
    );

    let response = app
        .oneshot(multipart_request("/api/predict/hosted", b"not an image"))
        .await
        .expect("request completes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn hosted_call_persists_the_upload_side_file() {
    let dir = TempDir::new().expect("temp dir");
    let app = app_with_upload_dir(
        cropscan::mocks::create_mock_source(),
        MockPredictionSource::empty("local"),
        Some(dir.path().to_path_buf()),
    );

    let response = app
        .oneshot(multipart_request("/api/predict/hosted", &jpeg_bytes(48, 48)))
        .await
        .expect("request completes");
    assert_eq!(response.status(), StatusCode::OK);

    let side_file = dir.path().join("uploaded_image.jpg");
    let saved = std::fs::read(&side_file).expect("side file written");
    let saved = image::load_from_memory(&saved).expect("side file is a valid jpeg");
    assert_eq!((saved.width(), saved.height()), (48, 48));
}

#[tokio::test]
async fn index_page_is_served() {
    let app = app(
        MockPredictionSource::empty("hosted"),
        MockPredictionSource::empty("local"),
    );

    let response = app
        .oneshot(
            Request::builder()
                .uri("/")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("request completes");
    assert_eq!(response.status(), StatusCode::OK);

    let body = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    let html = String::from_utf8(body.to_vec()).expect("utf8 page");
    assert!(html.contains("Image Disease Detection"));
    assert!(html.contains("/api/predict/"));
}
