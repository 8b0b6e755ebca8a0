//! Scripted transport for tests.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{Rgba, RgbaImage};
use tokio::sync::Notify;

use super::client::{ClientError, GenerateContent};
use super::model::{Candidate, Content, GenerateRequest, GenerateResponse, Part};

/// Replays canned responses in order and records every request.
///
/// With a hold set, each call waits for [`FakeTransport::release`] first.
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<Vec<Result<GenerateResponse, ClientError>>>,
    requests: Mutex<Vec<GenerateRequest>>,
    hold: Option<Notify>,
    panics: bool,
}

impl FakeTransport {
    pub fn with(responses: Vec<Result<GenerateResponse, ClientError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().rev().collect()),
            ..Default::default()
        })
    }

    pub fn held(responses: Vec<Result<GenerateResponse, ClientError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().rev().collect()),
            hold: Some(Notify::new()),
            ..Default::default()
        })
    }

    /// Panics inside every call.
    pub fn panicking() -> Arc<Self> {
        Arc::new(Self {
            panics: true,
            ..Default::default()
        })
    }

    pub fn release(&self) {
        if let Some(hold) = &self.hold {
            hold.notify_one();
        }
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl GenerateContent for FakeTransport {
    async fn generate_content(
        &self,
        _api_key: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, ClientError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.panics {
            panic!("transport panicked");
        }
        if let Some(hold) = &self.hold {
            hold.notified().await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Ok(GenerateResponse::default()))
    }
}

/// A response with one candidate carrying `parts`.
pub fn reply(parts: Vec<Part>) -> Result<GenerateResponse, ClientError> {
    Ok(GenerateResponse {
        candidates: Some(vec![Candidate {
            content: Some(Content {
                role: Some("model".to_string()),
                parts,
            }),
            finish_reason: Some("STOP".to_string()),
            safety_ratings: None,
        }]),
        ..Default::default()
    })
}

pub fn png_base64(w: u32, h: u32) -> String {
    let img = RgbaImage::from_pixel(w, h, Rgba([1, 2, 3, 255]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    STANDARD.encode(buf.into_inner())
}
