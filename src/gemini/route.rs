//! Picks the request shape for a submission.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Route {
    /// Images plus prompt, translated and sent to the image model.
    ImageEdit,
    /// Prompt only, asking for an image.
    ImageGeneration,
    /// Prompt only, text model.
    TextOnly,
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Route::ImageEdit => "image-edit",
            Route::ImageGeneration => "image-generation",
            Route::TextOnly => "text-only",
        };
        f.write_str(name)
    }
}

/// Any image wins; otherwise a trigger phrase (ASCII case-insensitive) asks for generation.
pub fn route<S: AsRef<str>>(image_count: usize, prompt: &str, triggers: &[S]) -> Route {
    if image_count > 0 {
        return Route::ImageEdit;
    }
    let prompt = prompt.to_ascii_lowercase();
    let wants_image = triggers
        .iter()
        .map(|t| t.as_ref().trim().to_ascii_lowercase())
        .any(|t| !t.is_empty() && prompt.contains(&t));
    if wants_image {
        Route::ImageGeneration
    } else {
        Route::TextOnly
    }
}
