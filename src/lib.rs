//! bdrow - prompt-from-images client for Gemini image models.
//!
//! The crate is built around a single state container:
//!
//! - **Session**: [`SessionManager`] owns an immutable [`AppSnapshot`] and
//!   republishes a new one for every intent (add an image, edit the prompt,
//!   submit, pin a result to the timeline).
//! - **Generation**: [`Generator`] routes a submission to image editing,
//!   image generation or plain text, and folds every failure into the result.
//! - **Timeline**: results can be pinned to whole seconds and played back.
//! - **Raster**: a small touch-up editor (brush, eraser, text overlays).
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use bdrow::{Config, GeminiClient, Generator, MemoryCredentialStore, SessionManager};
//!
//! let config = Config::default();
//! let client = GeminiClient::from_config(&config.api).unwrap();
//! let generator = Generator::new(Arc::new(client), config.api.clone());
//! let session = SessionManager::new(generator, Arc::new(MemoryCredentialStore::new()))
//!     .with_max_seconds(config.timeline.max_seconds);
//!
//! session.set_prompt_text("generate image of a banana");
//! assert_eq!(session.snapshot().prompt_text, "generate image of a banana");
//!
//! // Nothing is pinned yet, so the timeline shows nothing.
//! session.set_time_position(3);
//! assert!(session.current_timeline_image().is_none());
//! ```

use std::sync::Arc;

pub mod config;
pub mod credential;
pub mod error;
pub mod export;
pub mod gemini;
pub mod raster;
pub mod session;
pub mod timeline;

/// Shared, immutable RGBA8 pixels.
pub type ImageRef = Arc<image::RgbaImage>;

// Re-exports for convenience
pub use config::Config;
pub use credential::{CredentialError, CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{BdrowError, BdrowResult};
pub use export::{ImageExporter, PictureExporter};
pub use gemini::{GeminiClient, GenerateContent, GenerationResult, Generator, Route};
pub use raster::{Brush, BrushMode, Density, DrawingSession, Rgba8, TextOverlay, TextRenderer};
pub use session::{AppSnapshot, InputImage, Notice, SessionManager, SubmitStatus};
pub use timeline::Playback;
