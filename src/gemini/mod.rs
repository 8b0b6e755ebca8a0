//! Gemini `generateContent` client: wire model, HTTP transport, routing,
//! and the prompt-to-result generator.

pub mod client;
pub mod generator;
pub mod model;
pub mod route;

pub use client::{ClientError, GeminiClient, GenerateContent};
pub use generator::{GenerationResult, Generator};
pub use model::{GenerateRequest, GenerateResponse, GenerationConfig, ImageConfig, Part};
pub use route::{route, Route};

#[cfg(test)]
pub(crate) mod testing;
