//! Common test utilities for API testing with a mock engine.
//!
//! This module provides a test fixture that builds the full router in-process
//! with a `MockTranscoder` behind the orchestrator, so conversions can be
//! driven end to end without an FFmpeg installation.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use makeitmp4_core::config::ServerConfig;
use makeitmp4_core::{
    Config, ConversionError, ConversionOrchestrator, ConversionStatus, EngineConfig,
    HostCapabilities, Phase, Transcoder,
};

/// Re-export fixtures for test convenience
pub use makeitmp4_core::testing::{fixtures, MockTranscoder};

const MULTIPART_BOUNDARY: &str = "makeitmp4-test-boundary";

/// Test fixture for API testing with a mock engine.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_upload() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture
///         .post_multipart("/api/v1/conversion", &[Part::webm("clip.webm")])
///         .await;
///
///     assert_eq!(response.status, 202);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock engine - control load, run and output
    pub transcoder: Arc<MockTranscoder>,
    /// Orchestrator behind the router, for waiting on phases
    pub orchestrator: Arc<ConversionOrchestrator>,
    /// Temporary directory holding the web root
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Raw response, for downloads and static files.
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// One part of a multipart upload.
#[derive(Debug, Clone)]
pub enum Part {
    File {
        name: String,
        file_name: Option<String>,
        content_type: Option<String>,
        data: Vec<u8>,
    },
    Text {
        name: String,
        value: String,
    },
}

impl Part {
    /// A `file` part with a WebM content type.
    pub fn webm(file_name: &str) -> Self {
        Self::file(file_name, Some("video/webm"), fixtures::WEBM_BYTES)
    }

    /// A `file` part with an arbitrary content type.
    pub fn file(file_name: &str, content_type: Option<&str>, data: &[u8]) -> Self {
        Self::File {
            name: "file".to_string(),
            file_name: Some(file_name.to_string()),
            content_type: content_type.map(str::to_string),
            data: data.to_vec(),
        }
    }

    /// A text part.
    pub fn text(name: &str, value: &str) -> Self {
        Self::Text {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// Encodes parts as a `multipart/form-data` body.
pub fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
        match part {
            Part::File {
                name,
                file_name,
                content_type,
                data,
            } => {
                let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", name);
                if let Some(file_name) = file_name {
                    disposition.push_str(&format!("; filename=\"{}\"", file_name));
                }
                body.extend_from_slice(disposition.as_bytes());
                body.extend_from_slice(b"\r\n");
                if let Some(content_type) = content_type {
                    body.extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
                }
                body.extend_from_slice(b"\r\n");
                body.extend_from_slice(data);
                body.extend_from_slice(b"\r\n");
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    body
}

impl TestFixture {
    /// Create a new test fixture with default settings.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let web_dir = temp_dir.path().join("web");
        std::fs::create_dir_all(&web_dir).expect("Failed to create web dir");
        std::fs::write(web_dir.join("index.html"), "<!doctype html><title>makeitmp4</title>")
            .expect("Failed to write index.html");

        let config = Config {
            server: ServerConfig {
                host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 0, // Not used for in-process testing
                web_dir,
                max_upload_bytes: test_config.max_upload_bytes,
            },
            engine: EngineConfig::default().with_work_root(temp_dir.path()),
        };

        let transcoder = Arc::new(MockTranscoder::new());
        let orchestrator = Arc::new(ConversionOrchestrator::new(
            Arc::clone(&transcoder) as Arc<dyn Transcoder>
        ));
        let capabilities = test_config
            .capabilities
            .unwrap_or_else(|| HostCapabilities::evaluate("linux", "x86_64"));

        let state = Arc::new(makeitmp4_server::state::AppState::new(
            config,
            Arc::clone(&orchestrator),
            capabilities,
        ));
        let router = makeitmp4_server::api::create_router(state);

        Self {
            router,
            transcoder,
            orchestrator,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, Body::empty()).await
    }

    /// Send a POST request without a body.
    pub async fn post(&self, path: &str) -> TestResponse {
        self.request("POST", path, None, Body::empty()).await
    }

    /// Send a POST request with a multipart body.
    pub async fn post_multipart(&self, path: &str, parts: &[Part]) -> TestResponse {
        let content_type = format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY);
        self.request(
            "POST",
            path,
            Some(&content_type),
            Body::from(multipart_body(parts)),
        )
        .await
    }

    /// Upload a WebM file named `file_name`.
    pub async fn upload_webm(&self, file_name: &str) -> TestResponse {
        self.post_multipart("/api/v1/conversion", &[Part::webm(file_name)])
            .await
    }

    /// Send a GET request and keep the raw body.
    pub async fn get_raw(&self, path: &str) -> RawResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        RawResponse {
            status,
            headers,
            body,
        }
    }

    /// Wait until the published status reaches `phase`.
    ///
    /// For terminal phases this also waits for the background task to release
    /// the in-flight slot, which happens just after the status is published.
    pub async fn wait_for_phase(&self, phase: Phase) -> ConversionStatus {
        let mut rx = self.orchestrator.subscribe();
        let status = tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|status| status.phase == phase),
        )
        .await
        .unwrap_or_else(|_| panic!("Timed out waiting for {:?}", phase))
        .expect("Status channel closed")
        .clone();

        if matches!(phase, Phase::Succeeded | Phase::Failed) {
            self.wait_for_idle_slot().await;
        }
        status
    }

    async fn wait_for_idle_slot(&self) {
        for _ in 0..500 {
            // Dropping a successful reservation changes nothing
            match self.orchestrator.reserve() {
                Err(ConversionError::Busy) => tokio::time::sleep(Duration::from_millis(10)).await,
                _ => return,
            }
        }
        panic!("In-flight slot was never released");
    }

    /// Send a request to the test server.
    async fn request(
        &self,
        method: &str,
        path: &str,
        content_type: Option<&str>,
        body: Body,
    ) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);
        if let Some(content_type) = content_type {
            request_builder = request_builder.header("Content-Type", content_type);
        }
        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Upload size limit
    pub max_upload_bytes: usize,
    /// Host report; a supported linux host when `None`
    pub capabilities: Option<HostCapabilities>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 16 * 1024 * 1024,
            capabilities: None,
        }
    }
}

impl TestConfig {
    /// Create config with a small upload limit.
    pub fn with_upload_limit(max_upload_bytes: usize) -> Self {
        Self {
            max_upload_bytes,
            ..Default::default()
        }
    }

    /// Create config reporting the given host.
    pub fn with_capabilities(capabilities: HostCapabilities) -> Self {
        Self {
            capabilities: Some(capabilities),
            ..Default::default()
        }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
