//! Turns a prompt and input images into one normalized [`GenerationResult`].
//!
//! Every failure is folded into the result text; `generate` cannot fail.

use std::fmt::Display;
use std::io::Cursor;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::buffer::ConvertBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::{RgbImage, RgbaImage};

use super::client::{ClientError, GenerateContent};
use super::model::{Candidate, GenerateRequest, GenerateResponse, GenerationConfig, ImageConfig, Part};
use super::route::{route, Route};
use crate::config::ApiConfig;
use crate::error::{BdrowError, BdrowResult};
use crate::ImageRef;

/// JPEG quality for uploaded images.
const UPLOAD_JPEG_QUALITY: u8 = 90;

/// Characters of each response text part kept in the debug trace.
const TRACE_TEXT_CHARS: usize = 100;

/// Outcome of one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub text: Option<String>,
    pub image: Option<ImageRef>,
    pub debug_info: Option<String>,
    pub route: Route,
}

#[derive(Debug, thiserror::Error)]
enum StageError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Encode(#[from] BdrowError),
}

/// Text and image pulled out of the first candidate.
#[derive(Debug, Default)]
struct Scanned {
    text: Option<String>,
    image: Option<RgbaImage>,
}

/// Plain-text trace attached to every result.
#[derive(Debug, Default)]
struct Trace(String);

impl Trace {
    fn line(&mut self, line: impl Display) {
        self.0.push_str(&line.to_string());
        self.0.push('\n');
    }

    fn section(&mut self, name: &str) {
        if !self.0.is_empty() {
            self.0.push('\n');
        }
        self.line(format_args!("[{}]", name));
    }

    fn finish(self) -> Option<String> {
        Some(self.0)
    }
}

pub struct Generator {
    transport: Arc<dyn GenerateContent>,
    config: ApiConfig,
    image_config: Option<ImageConfig>,
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("config", &self.config)
            .field("image_config", &self.image_config)
            .finish_non_exhaustive()
    }
}

impl Generator {
    pub fn new(transport: Arc<dyn GenerateContent>, config: ApiConfig) -> Self {
        Self {
            transport,
            config,
            image_config: None,
        }
    }

    /// Aspect ratio / size hints sent with image-producing requests.
    pub fn with_image_config(mut self, image_config: ImageConfig) -> Self {
        self.image_config = Some(image_config);
        self
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn route_for(&self, image_count: usize, prompt: &str) -> Route {
        route(image_count, prompt, &self.config.image_triggers)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(images = images.len()))]
    pub async fn generate(&self, images: &[ImageRef], prompt: &str, api_key: &str) -> GenerationResult {
        let route = self.route_for(images.len(), prompt);
        tracing::info!(event = "generation_started", route = %route, prompt_chars = prompt.chars().count());

        let result = match route {
            Route::ImageEdit => self.image_edit(images, prompt, api_key).await,
            Route::ImageGeneration => self.image_generation(prompt, api_key).await,
            Route::TextOnly => self.text_only(prompt, api_key).await,
        };

        tracing::info!(
            event = "generation_finished",
            route = %route,
            has_text = result.text.is_some(),
            has_image = result.image.is_some()
        );
        result
    }

    fn generation_config(&self) -> GenerationConfig {
        let config = GenerationConfig::image_generation();
        match &self.image_config {
            Some(image_config) => config.with_image_config(image_config.clone()),
            None => config,
        }
    }

    /// Asks the enhancer model for an English version of `prompt`.
    ///
    /// Any failure returns `prompt` unchanged.
    async fn translate(&self, prompt: &str, api_key: &str) -> String {
        if !self.config.translate_prompts || prompt.trim().is_empty() {
            return prompt.to_string();
        }

        let instruction = format!(
            "Translate the following text to English.\n\
             If it's already in English, return it as is.\n\
             \n\
             Text: \"{}\"\n\
             \n\
             Rules:\n\
             - Output ONLY the English translation\n\
             - Do not add any explanations\n\
             - Do not use quotes around the output\n\
             - Keep the translation simple and direct",
            prompt
        );
        let request = GenerateRequest::user(&self.config.enhancer_model, vec![Part::text(instruction)]);

        match self.transport.generate_content(api_key, &request).await {
            Ok(response) => response
                .first_candidate()
                .and_then(|c| c.parts().first())
                .and_then(|p| p.text.as_deref())
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| prompt.to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "prompt translation failed; using original prompt");
                prompt.to_string()
            }
        }
    }

    async fn image_edit(&self, images: &[ImageRef], prompt: &str, api_key: &str) -> GenerationResult {
        let mut trace = Trace::default();
        let first_input = images.first().cloned();

        trace.section("Two-Stage Processing");
        trace.line(format_args!("Original prompt: {}", prompt));
        let translated = self.translate(prompt, api_key).await;
        trace.line(format_args!("Translated prompt: {}", translated));
        let final_prompt = format!("generate image {}", translated);
        trace.line(format_args!("Final prompt: {}", final_prompt));

        let model = &self.config.image_generation_model;
        trace.section("Request");
        trace.line(format_args!("Model: {}", model));
        trace.line(format_args!("Images: {}", images.len()));
        for (i, img) in images.iter().enumerate() {
            trace.line(format_args!("  Image {}: {}x{}", i + 1, img.width(), img.height()));
        }

        let outcome: Result<GenerateResponse, StageError> = async {
            let mut parts = Vec::with_capacity(images.len() + 1);
            parts.push(Part::text(final_prompt.as_str()));
            for img in images {
                parts.push(Part::inline("image/jpeg", encode_jpeg_base64(img)?));
            }
            let request =
                GenerateRequest::user(model, parts).with_generation_config(self.generation_config());
            Ok(self.transport.generate_content(api_key, &request).await?)
        }
        .await;

        let response = match outcome {
            Ok(response) => response,
            Err(e) => return failure(Route::ImageEdit, e, first_input, trace),
        };

        let Some(candidate) = response.first_candidate() else {
            let text = empty_response_text(&response, "Empty response from API");
            trace.section("Error");
            trace.line("No candidates in response");
            return GenerationResult {
                text: Some(text),
                image: first_input,
                debug_info: trace.finish(),
                route: Route::ImageEdit,
            };
        };

        let scanned = scan_candidate(candidate, response.candidate_count(), &mut trace);
        let text = if scanned.image.is_some() {
            format!(
                "Generated image\nOriginal prompt: {}\nEnglish: {}",
                prompt, translated
            )
        } else {
            scanned
                .text
                .unwrap_or_else(|| "Processing completed".to_string())
        };

        GenerationResult {
            text: Some(text),
            image: scanned.image.map(Arc::new).or(first_input),
            debug_info: trace.finish(),
            route: Route::ImageEdit,
        }
    }

    async fn image_generation(&self, prompt: &str, api_key: &str) -> GenerationResult {
        let mut trace = Trace::default();
        let model = &self.config.image_generation_model;
        trace.section("Request");
        trace.line(format_args!("Model: {}", model));
        trace.line(format_args!("Text: {}", prompt));

        let request = GenerateRequest::user(model, vec![Part::text(prompt)])
            .with_generation_config(self.generation_config());
        let response = match self.transport.generate_content(api_key, &request).await {
            Ok(response) => response,
            Err(e) => return failure(Route::ImageGeneration, e.into(), None, trace),
        };

        let Some(candidate) = response.first_candidate() else {
            trace.section("Error");
            trace.line("No candidates in response");
            return GenerationResult {
                text: Some(empty_response_text(&response, "Image generation failed")),
                image: None,
                debug_info: trace.finish(),
                route: Route::ImageGeneration,
            };
        };

        let scanned = scan_candidate(candidate, response.candidate_count(), &mut trace);
        GenerationResult {
            text: Some(scanned.text.unwrap_or_else(|| "Generated image".to_string())),
            image: scanned.image.map(Arc::new),
            debug_info: trace.finish(),
            route: Route::ImageGeneration,
        }
    }

    async fn text_only(&self, prompt: &str, api_key: &str) -> GenerationResult {
        let mut trace = Trace::default();
        let model = &self.config.text_model;
        trace.section("Request");
        trace.line(format_args!("Model: {}", model));
        trace.line(format_args!("Text: {}", prompt));

        let request = GenerateRequest::user(model, vec![Part::text(prompt)]);
        let response = match self.transport.generate_content(api_key, &request).await {
            Ok(response) => response,
            Err(e) => return failure(Route::TextOnly, e.into(), None, trace),
        };

        let Some(candidate) = response.first_candidate() else {
            trace.section("Error");
            trace.line("No candidates in response");
            return GenerationResult {
                text: Some(empty_response_text(&response, "Empty response from API")),
                image: None,
                debug_info: trace.finish(),
                route: Route::TextOnly,
            };
        };

        let scanned = scan_candidate(candidate, response.candidate_count(), &mut trace);
        let text = match (&scanned.text, &scanned.image) {
            (Some(text), _) => text.clone(),
            (None, Some(img)) => format!(
                "Generated image\nPrompt: {}\nSize: {}x{}",
                prompt,
                img.width(),
                img.height()
            ),
            (None, None) => "No response".to_string(),
        };

        GenerationResult {
            text: Some(text),
            image: scanned.image.map(Arc::new),
            debug_info: trace.finish(),
            route: Route::TextOnly,
        }
    }
}

fn failure(route: Route, error: StageError, image: Option<ImageRef>, mut trace: Trace) -> GenerationResult {
    tracing::warn!(event = "generation_failed", route = %route, error = %error);
    trace.section("Exception");
    trace.line(&error);
    GenerationResult {
        text: Some(format!("API error: {}", error)),
        image,
        debug_info: trace.finish(),
        route,
    }
}

fn empty_response_text(response: &GenerateResponse, fallback: &str) -> String {
    response
        .error_message()
        .filter(|m| !m.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// Scans the first candidate's parts. The last text part wins; image decode
/// failures only reach the trace.
fn scan_candidate(candidate: &Candidate, candidate_count: usize, trace: &mut Trace) -> Scanned {
    trace.section("Response");
    trace.line(format_args!("Candidates: {}", candidate_count));
    trace.line(format_args!(
        "Finish Reason: {}",
        candidate.finish_reason.as_deref().unwrap_or("none")
    ));

    let mut scanned = Scanned::default();
    for (i, part) in candidate.parts().iter().enumerate() {
        trace.line(format_args!("Part {}:", i + 1));
        if let Some(text) = &part.text {
            let head: String = text.chars().take(TRACE_TEXT_CHARS).collect();
            trace.line(format_args!("  Text: {}...", head));
            scanned.text = Some(text.clone());
        } else if let Some(inline) = &part.inline_data {
            trace.line(format_args!("  InlineData: {}", inline.mime_type));
            match decode_inline_image(&inline.data) {
                Ok(img) => {
                    trace.line(format_args!("  Image decoded: {}x{}", img.width(), img.height()));
                    scanned.image = Some(img);
                }
                Err(e) => {
                    tracing::warn!(error = %e, mime_type = %inline.mime_type, "inline image decode failed");
                    trace.line(format_args!("  Image decode error: {}", e));
                }
            }
        }
    }

    trace.section("Result");
    trace.line(format_args!("Has Text: {}", scanned.text.is_some()));
    trace.line(format_args!("Has Generated Image: {}", scanned.image.is_some()));
    scanned
}

/// JPEG (quality 90), base64 standard alphabet, no line wrapping.
pub fn encode_jpeg_base64(img: &RgbaImage) -> BdrowResult<String> {
    let rgb: RgbImage = img.convert();
    let mut buf = Cursor::new(Vec::new());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, UPLOAD_JPEG_QUALITY))?;
    Ok(STANDARD.encode(buf.into_inner()))
}

pub fn decode_inline_image(data: &str) -> BdrowResult<RgbaImage> {
    let bytes = STANDARD.decode(data.trim())?;
    Ok(image::load_from_memory(&bytes)?.to_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::model::ErrorBody;
    use crate::gemini::testing::{png_base64, reply, FakeTransport};
    use image::Rgba;

    fn input(w: u32, h: u32) -> ImageRef {
        Arc::new(RgbaImage::from_pixel(w, h, Rgba([200, 100, 50, 255])))
    }

    fn generator(fake: Arc<FakeTransport>) -> Generator {
        Generator::new(fake, ApiConfig::default())
    }

    #[tokio::test]
    async fn test_image_edit_translates_then_generates() {
        let fake = FakeTransport::with(vec![
            reply(vec![Part::text("  a cat  ")]),
            reply(vec![Part::inline("image/png", png_base64(3, 2))]),
        ]);
        let result = generator(fake.clone())
            .generate(&[input(8, 8), input(4, 4)], "猫", "key")
            .await;

        assert_eq!(result.route, Route::ImageEdit);
        assert_eq!(
            result.text.as_deref(),
            Some("Generated image\nOriginal prompt: 猫\nEnglish: a cat")
        );
        let image = result.image.unwrap();
        assert_eq!((image.width(), image.height()), (3, 2));

        let requests = fake.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].model, "gemini-2.5-flash-lite");
        assert!(requests[0].generation_config.is_none());
        let parts = &requests[1].contents[0].parts;
        assert_eq!(requests[1].model, "gemini-2.5-flash-image-preview");
        assert_eq!(parts[0].text.as_deref(), Some("generate image a cat"));
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].inline_data.as_ref().unwrap().mime_type, "image/jpeg");
        assert_eq!(
            requests[1].generation_config,
            Some(GenerationConfig::image_generation())
        );

        let trace = result.debug_info.unwrap();
        assert!(trace.contains("[Two-Stage Processing]"));
        assert!(trace.contains("Image 2: 4x4"));
        assert!(trace.contains("Has Generated Image: true"));
    }

    #[tokio::test]
    async fn test_translation_failure_falls_back_to_prompt() {
        let fake = FakeTransport::with(vec![
            Err(ClientError::Api {
                status: 500,
                message: "boom".to_string(),
            }),
            reply(vec![Part::text("looks nice")]),
        ]);
        let src = input(2, 2);
        let result = generator(fake.clone())
            .generate(&[src.clone()], "make it blue", "key")
            .await;

        assert_eq!(result.text.as_deref(), Some("looks nice"));
        assert!(Arc::ptr_eq(&result.image.unwrap(), &src));
        assert_eq!(
            fake.requests()[1].contents[0].parts[0].text.as_deref(),
            Some("generate image make it blue")
        );
    }

    #[tokio::test]
    async fn test_translation_skipped_when_disabled() {
        let fake = FakeTransport::with(vec![reply(vec![])]);
        let config = ApiConfig {
            translate_prompts: false,
            ..ApiConfig::default()
        };
        let result = Generator::new(fake.clone(), config)
            .generate(&[input(2, 2)], "x", "key")
            .await;

        assert_eq!(fake.requests().len(), 1);
        assert_eq!(result.text.as_deref(), Some("Processing completed"));
    }

    #[tokio::test]
    async fn test_image_edit_transport_failure_keeps_first_input() {
        let fake = FakeTransport::with(vec![
            reply(vec![Part::text("hi")]),
            Err(ClientError::Api {
                status: 503,
                message: "unavailable".to_string(),
            }),
        ]);
        let src = input(2, 2);
        let result = generator(fake).generate(&[src.clone()], "hi", "key").await;

        assert_eq!(
            result.text.as_deref(),
            Some("API error: API error: 503 - unavailable")
        );
        assert!(Arc::ptr_eq(&result.image.unwrap(), &src));
        assert!(result.debug_info.unwrap().contains("[Exception]"));
    }

    #[tokio::test]
    async fn test_image_generation_paths() {
        let fake = FakeTransport::with(vec![reply(vec![Part::inline("image/png", png_base64(5, 5))])]);
        let result = generator(fake.clone())
            .generate(&[], "generate image of a cat", "key")
            .await;
        assert_eq!(result.route, Route::ImageGeneration);
        assert_eq!(result.text.as_deref(), Some("Generated image"));
        assert!(result.image.is_some());
        assert_eq!(fake.requests()[0].contents[0].parts.len(), 1);

        let empty = FakeTransport::with(vec![Ok(GenerateResponse::default())]);
        let result = generator(empty).generate(&[], "generate image of a cat", "key").await;
        assert_eq!(result.text.as_deref(), Some("Image generation failed"));
        assert!(result.image.is_none());
    }

    #[tokio::test]
    async fn test_image_config_is_sent() {
        let fake = FakeTransport::with(vec![reply(vec![Part::text("ok")])]);
        let image_config = ImageConfig {
            aspect_ratio: Some("16:9".to_string()),
            image_size: None,
        };
        generator(fake.clone())
            .with_image_config(image_config.clone())
            .generate(&[], "create image of a hill", "key")
            .await;

        let sent = fake.requests()[0].generation_config.clone().unwrap();
        assert_eq!(sent.image_config, Some(image_config));
    }

    #[tokio::test]
    async fn test_text_only_paths() {
        let fake = FakeTransport::with(vec![reply(vec![
            Part::text("first"),
            Part::text("second"),
        ])]);
        let result = generator(fake.clone()).generate(&[], "hello", "key").await;
        assert_eq!(result.route, Route::TextOnly);
        assert_eq!(result.text.as_deref(), Some("second"));
        assert!(fake.requests()[0].generation_config.is_none());

        let image_only = FakeTransport::with(vec![reply(vec![Part::inline("image/png", png_base64(7, 3))])]);
        let result = generator(image_only).generate(&[], "hello", "key").await;
        assert_eq!(
            result.text.as_deref(),
            Some("Generated image\nPrompt: hello\nSize: 7x3")
        );

        let nothing = FakeTransport::with(vec![reply(vec![])]);
        let result = generator(nothing).generate(&[], "hello", "key").await;
        assert_eq!(result.text.as_deref(), Some("No response"));
    }

    #[tokio::test]
    async fn test_text_takes_precedence_within_a_part() {
        let mut mixed = Part::text("caption");
        mixed.inline_data = Part::inline("image/png", png_base64(5, 5)).inline_data;
        let fake = FakeTransport::with(vec![reply(vec![mixed])]);

        let result = generator(fake).generate(&[], "hello", "key").await;
        assert_eq!(result.text.as_deref(), Some("caption"));
        assert!(result.image.is_none());
        assert!(result.debug_info.unwrap().contains("Has Generated Image: false"));
    }

    #[tokio::test]
    async fn test_empty_response_uses_remote_error() {
        let fake = FakeTransport::with(vec![Ok(GenerateResponse {
            error: Some(ErrorBody {
                code: 400,
                message: "API key not valid".to_string(),
                status: "INVALID_ARGUMENT".to_string(),
            }),
            ..Default::default()
        })]);
        let result = generator(fake).generate(&[], "hello", "key").await;
        assert_eq!(result.text.as_deref(), Some("API key not valid"));

        let bare = FakeTransport::with(vec![Ok(GenerateResponse::default())]);
        let result = generator(bare).generate(&[], "hello", "key").await;
        assert_eq!(result.text.as_deref(), Some("Empty response from API"));
    }

    #[tokio::test]
    async fn test_bad_inline_data_only_reaches_trace() {
        let fake = FakeTransport::with(vec![reply(vec![
            Part::inline("image/png", "not base64!!"),
            Part::text("caption"),
        ])]);
        let result = generator(fake).generate(&[], "hello", "key").await;
        assert_eq!(result.text.as_deref(), Some("caption"));
        assert!(result.image.is_none());
        assert!(result.debug_info.unwrap().contains("Image decode error"));
    }

    #[test]
    fn test_jpeg_encoding_is_base64_jpeg() {
        let encoded = encode_jpeg_base64(&RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 128]))).unwrap();
        assert!(!encoded.contains('\n'));
        let bytes = STANDARD.decode(encoded).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
