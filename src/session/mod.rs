//! Session state: the snapshot model and the manager that owns it.

pub mod manager;
pub mod model;

pub use manager::{SessionManager, MISSING_API_KEY};
pub use model::{AppSnapshot, InputImage, Notice, SubmitStatus, MAX_INPUT_IMAGES};
