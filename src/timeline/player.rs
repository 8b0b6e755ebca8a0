//! Async driver that advances the timeline cursor while playback is on.

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::Playback;
use crate::session::SessionManager;

/// Steps the cursor once per period until playback stops.
///
/// Returns immediately when not playing or when nothing is pinned. The
/// period is re-read each step, so speed changes apply on the next tick.
pub async fn run(session: &SessionManager) {
    loop {
        let snapshot = session.snapshot();
        if !snapshot.playback.playing || snapshot.timeline.is_empty() {
            break;
        }

        tokio::time::sleep(Playback::period(snapshot.playback.speed)).await;

        if !session.snapshot().playback.playing {
            break;
        }
        let playback = session.step_playback();
        tracing::trace!(position = playback.position, playing = playback.playing, "timeline tick");
        if !playback.playing {
            break;
        }
    }
    tracing::debug!(position = session.snapshot().playback.position, "playback stopped");
}

/// Runs [`run`] on its own task.
pub fn spawn(session: Arc<SessionManager>) -> JoinHandle<()> {
    tokio::spawn(async move { run(&session).await })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::credential::MemoryCredentialStore;
    use crate::gemini::testing::FakeTransport;
    use crate::gemini::Generator;
    use image::{Rgba, RgbaImage};
    use std::time::Duration;

    fn session() -> Arc<SessionManager> {
        let generator = Generator::new(FakeTransport::with(vec![]), ApiConfig::default());
        let session = SessionManager::new(generator, Arc::new(MemoryCredentialStore::new()));
        session.update_state(|s| {
            s.timeline
                .insert(0, Arc::new(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255]))));
        });
        Arc::new(session)
    }

    #[tokio::test(start_paused = true)]
    async fn test_plays_to_end_and_stops() {
        let session = session();
        session.set_time_position(13);
        session.set_playing(true);

        let started = tokio::time::Instant::now();
        run(&session).await;

        let playback = session.snapshot().playback;
        assert_eq!((playback.position, playback.playing), (15, false));
        // 13 -> 14 -> 15 -> stop: three periods.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_speed_shortens_period() {
        let session = session();
        session.set_time_position(14);
        session.set_playback_speed(4.0);
        session.set_playing(true);

        let started = tokio::time::Instant::now();
        run(&session).await;
        assert_eq!(started.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_wraps_until_stopped() {
        let session = session();
        session.set_time_position(14);
        session.toggle_loop();
        session.set_playing(true);

        let handle = spawn(Arc::clone(&session));
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(session.snapshot().playback.position, 0);

        session.set_playing(false);
        handle.await.unwrap();
        assert_eq!(session.snapshot().playback.position, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_timeline_returns_immediately() {
        let session = session();
        session.clear_timeline();
        session.set_playing(true);

        let started = tokio::time::Instant::now();
        run(&session).await;
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(session.snapshot().playback.position, 0);
    }
}
