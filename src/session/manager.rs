//! SessionManager: the single owner of UI state.
//!
//! Every intent derives a new [`AppSnapshot`] from the current one and
//! publishes it through a `watch` channel. Observers never see a partially
//! applied change. Only [`SessionManager::submit`] and
//! [`SessionManager::save_result_image`] perform I/O.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::credential::{CredentialError, CredentialStore};
use crate::export::ImageExporter;
use crate::gemini::Generator;
use crate::session::model::*;
use crate::timeline::{Playback, MAX_SECONDS};
use crate::ImageRef;

/// Error text when no API key is stored.
pub const MISSING_API_KEY: &str = "API key is not configured";

const NOTICE_CAPACITY: usize = 32;

/// Holds the single-flight flag for the lifetime of one submission.
///
/// Dropping it before [`InFlight::finish`] also clears `is_loading`.
struct InFlight<'a> {
    manager: &'a SessionManager,
    finished: bool,
}

impl<'a> InFlight<'a> {
    fn acquire(manager: &'a SessionManager) -> Option<Self> {
        manager
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                manager,
                finished: false,
            })
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(event = "submit_abandoned", "submission dropped before completion");
            self.manager.update_state(|s| s.is_loading = false);
        }
        self.manager.in_flight.store(false, Ordering::Release);
    }
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

/// State container for one editing/generation session.
///
/// `Send + Sync`; share it through an `Arc`.
pub struct SessionManager {
    state: watch::Sender<Arc<AppSnapshot>>,
    notices: broadcast::Sender<Notice>,
    generator: Arc<Generator>,
    credentials: Arc<dyn CredentialStore>,
    in_flight: AtomicBool,
    max_seconds: u32,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("max_seconds", &self.max_seconds)
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Creates a manager with an empty snapshot.
    pub fn new(generator: Generator, credentials: Arc<dyn CredentialStore>) -> Self {
        let (state, _) = watch::channel(Arc::new(AppSnapshot::default()));
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            state,
            notices,
            generator: Arc::new(generator),
            credentials,
            in_flight: AtomicBool::new(false),
            max_seconds: MAX_SECONDS,
        }
    }

    /// Sets the last addressable timeline second.
    pub fn with_max_seconds(mut self, max_seconds: u32) -> Self {
        self.max_seconds = max_seconds;
        self
    }

    pub fn max_seconds(&self) -> u32 {
        self.max_seconds
    }

    // =========================================================================
    // HIGH-LEVEL OPERATIONS
    // =========================================================================

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<AppSnapshot> {
        self.state.borrow().clone()
    }

    /// Receives every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<AppSnapshot>> {
        self.state.subscribe()
    }

    /// Receives transient notices emitted after this call.
    pub fn notifications(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Applies `f` to a private copy of the snapshot and publishes the result.
    pub fn update_state<F>(&self, f: F)
    where
        F: FnOnce(&mut AppSnapshot),
    {
        self.state.send_modify(|snapshot| f(Arc::make_mut(snapshot)));
    }

    fn notify(&self, notice: Notice) {
        tracing::debug!(notice = %notice, "notice");
        // No receivers is fine.
        let _ = self.notices.send(notice);
    }

    // =========================================================================
    // INPUT IMAGE OPERATIONS
    // =========================================================================

    /// Appends an input image. Ignored once four images are present.
    pub fn add_input_image(&self, image: ImageRef) {
        self.update_state(|s| {
            if !s.can_add_image() {
                tracing::debug!(count = s.input_images.len(), "input image limit reached");
                return;
            }
            let id = s.input_images.len();
            s.input_images.push(InputImage::new(id, image));
        });
    }

    /// Removes the image at `index` and re-numbers the rest.
    pub fn remove_input_image(&self, index: usize) {
        self.update_state(|s| {
            if index >= s.input_images.len() {
                return;
            }
            s.input_images.remove(index);
            for (i, slot) in s.input_images.iter_mut().enumerate() {
                slot.id = i;
            }
            if s.selected_image_index == Some(index) {
                s.selected_image_index = None;
            }
        });
    }

    /// Replaces the pixels at `index` with an edited version.
    pub fn update_input_image(&self, index: usize, image: ImageRef) {
        self.update_state(|s| {
            if let Some(slot) = s.input_images.get_mut(index) {
                slot.image = image;
                slot.is_edited = true;
            }
        });
    }

    pub fn select_image(&self, index: Option<usize>) {
        self.update_state(|s| s.selected_image_index = index);
    }

    pub fn set_prompt_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.update_state(|s| s.prompt_text = text);
    }

    /// Resets the whole snapshot, inputs and timeline included.
    pub fn clear_results(&self) {
        self.update_state(|s| *s = AppSnapshot::default());
    }

    pub fn clear_all_images(&self) {
        self.update_state(|s| {
            s.input_images.clear();
            s.selected_image_index = None;
        });
    }

    // =========================================================================
    // SUBMISSION
    // =========================================================================

    /// Sends the current prompt and input images for generation.
    ///
    /// At most one submission runs at a time; a concurrent call returns
    /// [`SubmitStatus::Busy`] without touching state. Failures end up in
    /// `error_message`, never as an `Err`.
    pub async fn submit(&self) -> SubmitStatus {
        let Some(mut in_flight) = InFlight::acquire(self) else {
            tracing::debug!(event = "submit_rejected", "submission already in flight");
            return SubmitStatus::Busy;
        };

        self.update_state(|s| {
            s.is_loading = true;
            s.error_message = None;
            s.show_timeline_image = false;
        });

        let api_key = match self.credentials.api_key() {
            Ok(Some(key)) if !key.trim().is_empty() => key,
            Ok(_) => {
                in_flight.finish();
                return self.fail(MISSING_API_KEY.to_string());
            }
            Err(e) => {
                tracing::warn!(error = %e, "credential store unreadable");
                in_flight.finish();
                return self.fail(MISSING_API_KEY.to_string());
            }
        };

        let snapshot = self.snapshot();
        let images: Vec<ImageRef> = snapshot
            .input_images
            .iter()
            .map(|slot| slot.image.clone())
            .collect();
        let prompt = snapshot.prompt_text.clone();
        let generator = Arc::clone(&self.generator);

        tracing::info!(event = "submit_started", images = images.len());
        let task = tokio::spawn(async move { generator.generate(&images, &prompt, &api_key).await });

        let outcome = task.await;
        in_flight.finish();
        match outcome {
            Ok(result) => {
                let route = result.route;
                self.update_state(|s| {
                    s.is_loading = false;
                    s.result_text = result.text;
                    s.result_image = result.image;
                    s.debug_info = result.debug_info;
                    s.error_message = None;
                });
                self.notify(Notice::Completed { route });
                SubmitStatus::Completed
            }
            Err(e) => {
                tracing::warn!(error = %e, "generation task failed");
                self.fail(format!("Generation task failed: {}", e))
            }
        }
    }

    fn fail(&self, message: String) -> SubmitStatus {
        tracing::warn!(event = "submit_failed", message = %message);
        let notice = Notice::Failed {
            message: message.clone(),
        };
        self.update_state(|s| {
            s.is_loading = false;
            s.result_text = None;
            s.result_image = None;
            s.debug_info = None;
            s.error_message = Some(message);
        });
        self.notify(notice);
        SubmitStatus::Failed
    }

    // =========================================================================
    // TIMELINE OPERATIONS
    // =========================================================================

    /// Pins the result image at `second`, or at the cursor when `None`.
    pub fn add_image_to_timeline(&self, second: Option<u32>) {
        let max = self.max_seconds;
        self.update_state(|s| {
            let at = second.unwrap_or(s.playback.position);
            if at > max {
                tracing::debug!(second = at, max, "timeline second out of range");
                return;
            }
            if let Some(image) = s.result_image.clone() {
                s.timeline.insert(at, image);
            }
        });
    }

    pub fn remove_image_from_timeline(&self, second: u32) {
        self.update_state(|s| {
            s.timeline.remove(&second);
        });
    }

    /// Moves the image at `from` to `to`, replacing whatever was at `to`.
    pub fn move_image_in_timeline(&self, from: u32, to: u32) {
        let max = self.max_seconds;
        self.update_state(|s| {
            if to > max || !s.timeline.contains_key(&from) {
                return;
            }
            if let Some(image) = s.timeline.remove(&from) {
                s.timeline.insert(to, image);
            }
        });
    }

    pub fn clear_timeline(&self) {
        self.update_state(|s| {
            s.timeline.clear();
            s.playback = s.playback.rewound();
        });
    }

    /// Moves the cursor (clamped) and switches the view to the timeline.
    pub fn set_time_position(&self, second: u32) {
        let max = self.max_seconds;
        self.update_state(|s| {
            s.playback.position = second.min(max);
            s.show_timeline_image = true;
        });
    }

    pub fn set_playing(&self, playing: bool) {
        self.update_state(|s| {
            s.playback.playing = playing;
            s.show_timeline_image = playing || s.show_timeline_image;
        });
    }

    /// Steps per second. Non-finite or non-positive values are ignored.
    pub fn set_playback_speed(&self, speed: f32) {
        if !speed.is_finite() || speed <= 0.0 {
            tracing::warn!(speed, "ignoring invalid playback speed");
            return;
        }
        self.update_state(|s| s.playback.speed = speed);
    }

    pub fn toggle_loop(&self) {
        self.update_state(|s| s.playback.looping = !s.playback.looping);
    }

    /// Cursor back to 0, stopped.
    pub fn reset_timeline(&self) {
        self.update_state(|s| s.playback = s.playback.rewound());
    }

    /// Advances playback by one second if it is playing.
    pub fn step_playback(&self) -> Playback {
        let max = self.max_seconds;
        self.update_state(|s| {
            if s.playback.playing {
                s.playback = s.playback.step(max);
            }
        });
        self.snapshot().playback
    }

    pub fn current_timeline_image(&self) -> Option<ImageRef> {
        self.snapshot().current_timeline_image().cloned()
    }

    // =========================================================================
    // EXPORT
    // =========================================================================

    /// Writes the result image through `exporter` on the blocking pool.
    ///
    /// Returns whether a file was written. A notice reports the outcome.
    pub async fn save_result_image(&self, exporter: Arc<dyn ImageExporter>) -> bool {
        let Some(image) = self.snapshot().result_image.clone() else {
            self.notify(Notice::SaveFailed {
                message: "no result image".to_string(),
            });
            return false;
        };

        let outcome = tokio::task::spawn_blocking(move || exporter.export(&image)).await;
        match outcome {
            Ok(Ok(path)) => {
                self.notify(Notice::Saved { path });
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "export failed");
                self.notify(Notice::SaveFailed {
                    message: e.to_string(),
                });
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "export task failed");
                self.notify(Notice::SaveFailed {
                    message: e.to_string(),
                });
                false
            }
        }
    }

    // =========================================================================
    // CREDENTIALS
    // =========================================================================

    pub fn save_api_key(&self, api_key: &str) -> Result<(), CredentialError> {
        self.credentials.save_api_key(api_key)
    }

    pub fn api_key(&self) -> Result<Option<String>, CredentialError> {
        self.credentials.api_key()
    }

    pub fn clear_api_key(&self) -> Result<(), CredentialError> {
        self.credentials.clear_api_key()
    }

    pub fn set_use_api_key(&self, enabled: bool) -> Result<(), CredentialError> {
        self.credentials.set_use_api_key(enabled)
    }

    /// A non-empty key is stored and the "use this key" flag is set.
    pub fn is_authenticated(&self) -> bool {
        let has_key = matches!(self.credentials.api_key(), Ok(Some(ref k)) if !k.trim().is_empty());
        let enabled = self.credentials.use_api_key().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "credential store unreadable");
            false
        });
        has_key && enabled
    }
}
