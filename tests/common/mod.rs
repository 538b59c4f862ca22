#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, header},
};
use cutout_backend::{AppConfig, AppState, EngineError, SegmentationEngine, build_app};

pub const BOUNDARY: &str = "cutout-test-boundary";

/// 记录调用次数与入参的假引擎
pub struct RecordingEngine {
    outcome: Result<Vec<u8>, EngineError>,
    delay: Duration,
    calls: AtomicUsize,
    inputs: Mutex<Vec<Vec<u8>>>,
}

impl RecordingEngine {
    pub fn returning(bytes: Vec<u8>) -> Arc<Self> {
        Self::build(Ok(bytes), Duration::ZERO)
    }

    pub fn failing(err: EngineError) -> Arc<Self> {
        Self::build(Err(err), Duration::ZERO)
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Self::build(Ok(b"late".to_vec()), delay)
    }

    fn build(outcome: Result<Vec<u8>, EngineError>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            delay,
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<Vec<u8>> {
        self.inputs.lock().unwrap().clone()
    }
}

impl SegmentationEngine for RecordingEngine {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn segment(&self, input: &[u8]) -> Result<Vec<u8>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(input.to_vec());
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.outcome.clone()
    }
}

/// 确定性的引擎：输出为输入的逆序
pub struct ReversingEngine;

impl SegmentationEngine for ReversingEngine {
    fn name(&self) -> &'static str {
        "reversing"
    }

    fn segment(&self, input: &[u8]) -> Result<Vec<u8>, EngineError> {
        Ok(input.iter().rev().copied().collect())
    }
}

/// 引擎内部 panic
pub struct PanickingEngine;

impl SegmentationEngine for PanickingEngine {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn segment(&self, _: &[u8]) -> Result<Vec<u8>, EngineError> {
        panic!("out of memory")
    }
}

pub fn app_with(config: &AppConfig, engine: Arc<dyn SegmentationEngine>) -> Router {
    build_app(config, AppState::from_config(config, engine))
}

pub fn app(engine: Arc<dyn SegmentationEngine>) -> Router {
    app_with(&AppConfig::default(), engine)
}

/// 一个 multipart part：字段名、可选的 Content-Type、内容
pub struct Part<'a> {
    pub name: &'a str,
    pub content_type: Option<&'a str>,
    pub data: &'a [u8],
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"upload.bin\"\r\n",
                part.name
            )
            .as_bytes(),
        );
        if let Some(ct) = part.content_type {
            body.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

/// 只含 `image` 字段的上传请求
pub fn image_request(content_type: &str, data: &[u8]) -> Request<Body> {
    upload_request(
        "/api/remove-bg",
        &[Part {
            name: "image",
            content_type: Some(content_type),
            data,
        }],
    )
}

pub async fn body_bytes(resp: Response<Body>) -> Vec<u8> {
    to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body")
        .to_vec()
}

pub async fn body_json(resp: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(resp).await).expect("parse json")
}
