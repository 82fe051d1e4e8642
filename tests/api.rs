use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use image_remix::config::Config;
use image_remix::imaging::EncodedImage;
use image_remix::model::{ImageModel, MockImageModel, ModelInput, ModelOutput};
use image_remix::server::{self, AppState, GenerateResponse};
use image_remix::storage::Storage;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "image-remix-test-boundary";

struct TestApp {
    app: Router,
    model: MockImageModel,
    storage: Storage,
    _temp_dir: TempDir,
}

impl TestApp {
    async fn new(model: MockImageModel) -> Self {
        Self::with_settings(model.clone(), model, &[]).await
    }

    /// `backend` serves the requests; `model` is the mock kept for inspection.
    async fn with_settings(
        backend: impl ImageModel + 'static,
        model: MockImageModel,
        settings: &[(&str, &str)],
    ) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::from_lookup(|key: &str| {
            settings
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
                .or_else(|| match key {
                    "GEMINI_API_KEY" => Some("test-key".to_string()),
                    "DEFAULT_PROMPT" => Some("default remix".to_string()),
                    _ => None,
                })
        })
        .unwrap();
        config.upload_dir = temp_dir.path().join("uploads");
        config.output_dir = temp_dir.path().join("outputs");

        let storage = Storage::init(&config.upload_dir, &config.output_dir)
            .await
            .unwrap();
        let state = Arc::new(AppState::new(Arc::new(backend), storage.clone(), config));

        Self {
            app: server::router(state),
            model,
            storage,
            _temp_dir: temp_dir,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    async fn get(&self, uri: &str) -> (StatusCode, Vec<u8>) {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn generate(&self, image: Option<&[u8]>, prompt: Option<&str>) -> (StatusCode, serde_json::Value) {
        let (status, bytes) = self.send(multipart_request(image, prompt)).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }
}

fn multipart_request(image: Option<&[u8]>, prompt: Option<&str>) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(prompt) = prompt {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"prompt\"\r\n\r\n{prompt}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(image) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"in.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(image);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/api/generate")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn png(img: RgbaImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .unwrap();
    bytes
}

fn gradient(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 255 / width) as u8, (y * 255 / height) as u8, 90, 255])
    })
}

fn cutout(width: u32, height: u32) -> RgbaImage {
    let mut img = gradient(width, height);
    for (x, _, pixel) in img.enumerate_pixels_mut() {
        if x < width / 2 {
            pixel[3] = 0;
        }
    }
    img
}

fn model_image(bytes: Vec<u8>) -> EncodedImage {
    EncodedImage {
        bytes,
        mime_type: "image/png".to_string(),
    }
}

fn blank_png() -> Vec<u8> {
    png(RgbaImage::from_pixel(32, 32, Rgba([255, 255, 255, 255])))
}

#[tokio::test]
async fn test_health_reports_model() {
    let app = TestApp::new(MockImageModel::new()).await;

    let (status, body) = app.get("/health").await;
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model"], "mock-image-model");
}

#[tokio::test]
async fn test_index_serves_upload_page() {
    let app = TestApp::new(MockImageModel::new()).await;

    let (status, body) = app.get("/").await;

    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("/api/generate"));
}

#[tokio::test]
async fn test_generate_stores_and_serves_result() {
    let model = MockImageModel::new().with_output(ModelOutput {
        images: vec![model_image(png(gradient(48, 48)))],
        text: Some("A remixed picture.".to_string()),
    });
    let app = TestApp::new(model).await;

    let (status, body) = app
        .generate(Some(&png(gradient(64, 32))), Some("  make it pop  "))
        .await;
    assert_eq!(status, StatusCode::OK);

    let response: GenerateResponse = serde_json::from_value(body).unwrap();
    assert_eq!(response.images.len(), 1);
    assert_eq!(response.text.as_deref(), Some("A remixed picture."));
    assert!(!response.transparent);
    assert_eq!(response.blank_images_dropped, 0);
    assert_eq!(response.model, "mock-image-model");
    assert_eq!(app.model.prompts(), vec!["make it pop".to_string()]);

    let (status, served) = app.get(&response.images[0]).await;
    assert_eq!(status, StatusCode::OK);
    let decoded = image::load_from_memory(&served).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (48, 48));

    assert!(response.input.starts_with("/uploads/"));
    assert!(response.input.ends_with(".jpg"));
    let (status, _) = app.get(&response.input).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_transparent_upload_keeps_alpha_in_result() {
    let model = MockImageModel::new().with_output(ModelOutput {
        images: vec![model_image(png(gradient(80, 80)))],
        text: None,
    });
    let app = TestApp::new(model).await;

    let (status, body) = app.generate(Some(&png(cutout(40, 40))), Some("sticker")).await;
    assert_eq!(status, StatusCode::OK);

    let response: GenerateResponse = serde_json::from_value(body).unwrap();
    assert!(response.transparent);
    assert!(response.input.ends_with(".png"));

    let file_name = response.images[0].trim_start_matches("/outputs/");
    let saved = image::open(app.storage.output_dir().join(file_name))
        .unwrap()
        .to_rgba8();
    assert_eq!(saved.dimensions(), (80, 80));
    assert_eq!(saved.get_pixel(0, 40)[3], 0);
    assert_eq!(saved.get_pixel(79, 40)[3], 255);
}

#[tokio::test]
async fn test_missing_prompt_uses_default() {
    let model = MockImageModel::new().with_output(ModelOutput {
        images: vec![],
        text: Some("I can only describe it.".to_string()),
    });
    let app = TestApp::new(model).await;

    let (status, body) = app.generate(Some(&png(gradient(16, 16))), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["images"], serde_json::json!([]));
    assert_eq!(body["text"], "I can only describe it.");
    assert_eq!(app.model.prompts(), vec!["default remix".to_string()]);
}

#[tokio::test]
async fn test_all_blank_results_are_bad_gateway() {
    let model = MockImageModel::new().with_output(ModelOutput {
        images: vec![model_image(blank_png())],
        text: Some("done".to_string()),
    });
    let app = TestApp::new(model).await;

    let (status, body) = app.generate(Some(&png(gradient(16, 16))), Some("x")).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Model returned a blank image");
    assert_eq!(body["text"], "done");
}

#[tokio::test]
async fn test_blank_results_dropped_when_others_succeed() {
    let model = MockImageModel::new().with_output(ModelOutput {
        images: vec![
            model_image(blank_png()),
            model_image(png(gradient(20, 20))),
        ],
        text: None,
    });
    let app = TestApp::new(model).await;

    let (status, body) = app.generate(Some(&png(gradient(16, 16))), Some("x")).await;
    assert_eq!(status, StatusCode::OK);

    let response: GenerateResponse = serde_json::from_value(body).unwrap();
    assert_eq!(response.images.len(), 1);
    assert_eq!(response.blank_images_dropped, 1);
}

#[tokio::test]
async fn test_missing_image_is_bad_request() {
    let app = TestApp::new(MockImageModel::new()).await;

    let (status, body) = app.generate(None, Some("no file")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("image"));
    assert_eq!(app.model.call_count(), 0);
}

#[tokio::test]
async fn test_empty_image_is_bad_request() {
    let app = TestApp::new(MockImageModel::new()).await;

    let (status, _) = app.generate(Some(&[]), Some("empty")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_undecodable_upload_is_unsupported_media_type() {
    let app = TestApp::new(MockImageModel::new()).await;

    let (status, _) = app.generate(Some(b"not an image at all"), Some("x")).await;

    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(app.model.call_count(), 0);
}

#[tokio::test]
async fn test_model_failure_is_bad_gateway() {
    let app = TestApp::new(MockImageModel::new().with_failure(true)).await;

    let (status, body) = app.generate(Some(&png(gradient(16, 16))), Some("x")).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("Mock failure"));
}

#[tokio::test]
async fn test_undecodable_model_image_is_bad_gateway() {
    let model = MockImageModel::new().with_output(ModelOutput {
        images: vec![model_image(b"garbage".to_vec())],
        text: None,
    });
    let app = TestApp::new(model).await;

    let (status, body) = app.generate(Some(&png(gradient(16, 16))), Some("x")).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("undecodable"));
}

/// Sleeps inside every call and remembers the highest number of overlapping calls.
#[derive(Clone, Default)]
struct SlowModel {
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl ImageModel for SlowModel {
    async fn generate(&self, _input: &ModelInput) -> image_remix::Result<ModelOutput> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);

        Ok(ModelOutput {
            images: vec![],
            text: Some("slow answer".to_string()),
        })
    }

    fn name(&self) -> &str {
        "slow-model"
    }
}

#[tokio::test]
async fn test_generations_are_serialized() {
    let slow = SlowModel::default();
    let app = TestApp::with_settings(slow.clone(), MockImageModel::new(), &[]).await;
    let upload = png(gradient(16, 16));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let router = app.app.clone();
            let request = multipart_request(Some(&upload), Some("one at a time"));
            tokio::spawn(async move { router.oneshot(request).await.unwrap().status() })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    assert_eq!(slow.calls.load(Ordering::SeqCst), 4);
    assert_eq!(slow.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_oversized_upload_is_payload_too_large() {
    let model = MockImageModel::new();
    let app = TestApp::with_settings(model.clone(), model, &[("MAX_UPLOAD_BYTES", "100")]).await;

    let (status, body) = app.generate(Some(&png(gradient(8, 8))), Some("too big")).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["error"].as_str().unwrap().contains("100 byte limit"));
    assert_eq!(app.model.call_count(), 0);
}
