//! Snapshot and event types published by the session manager.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::gemini::Route;
use crate::timeline::{self, Playback};
use crate::ImageRef;

/// Input slots available for a submission.
pub const MAX_INPUT_IMAGES: usize = 4;

/// One input slot.
#[derive(Debug, Clone, PartialEq)]
pub struct InputImage {
    /// Position in the input list; re-assigned on removal.
    pub id: usize,
    pub image: ImageRef,
    /// Set once the image has been touched up in the editor.
    pub is_edited: bool,
}

impl InputImage {
    pub fn new(id: usize, image: ImageRef) -> Self {
        Self {
            id,
            image,
            is_edited: false,
        }
    }
}

/// Everything the UI renders.
///
/// Published behind an `Arc`; a published snapshot never changes. Cloning
/// shares pixel buffers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppSnapshot {
    pub input_images: Vec<InputImage>,
    pub selected_image_index: Option<usize>,
    pub prompt_text: String,
    pub is_loading: bool,
    pub result_text: Option<String>,
    pub result_image: Option<ImageRef>,
    pub debug_info: Option<String>,
    pub error_message: Option<String>,

    /// Whole second -> pinned image.
    pub timeline: BTreeMap<u32, ImageRef>,
    pub playback: Playback,
    /// Show the timeline image instead of the result image.
    pub show_timeline_image: bool,
}

impl AppSnapshot {
    pub fn can_add_image(&self) -> bool {
        self.input_images.len() < MAX_INPUT_IMAGES
    }

    pub fn selected_image(&self) -> Option<&InputImage> {
        self.selected_image_index
            .and_then(|i| self.input_images.get(i))
    }

    /// Timeline image at the cursor, if the timeline view is active.
    pub fn current_timeline_image(&self) -> Option<&ImageRef> {
        if !self.show_timeline_image {
            return None;
        }
        timeline::resolve(self.playback.position, &self.timeline)
    }

    /// What the result pane shows: the timeline image when active, else the result.
    pub fn displayed_image(&self) -> Option<&ImageRef> {
        if self.show_timeline_image {
            self.current_timeline_image()
        } else {
            self.result_image.as_ref()
        }
    }
}

/// Outcome of [`SessionManager::submit`](super::SessionManager::submit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    Completed,
    /// Finished with `error_message` set.
    Failed,
    /// Another submission is in flight; nothing changed.
    Busy,
}

/// Transient, toast-style notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Completed { route: Route },
    Failed { message: String },
    Saved { path: PathBuf },
    SaveFailed { message: String },
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::Completed { .. } => write!(f, "Processing completed"),
            Notice::Failed { message } => write!(f, "Error: {}", message),
            Notice::Saved { path } => write!(f, "Image saved: {}", path.display()),
            Notice::SaveFailed { message } => write!(f, "Failed to save image: {}", message),
        }
    }
}
