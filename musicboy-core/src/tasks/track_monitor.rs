// musicboy-core/src/tasks/track_monitor.rs
//
// One polling task per opted-in user. Each tick fetches that user's
// currently-playing item and publishes a TrackChanged event when the item's
// identity differs from the last observed one. A failed poll is logged and
// the loop keeps going; only stop() or a replacing start() ends a task.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use musicboy_common::models::{CurrentlyPlaying, UserId};
use crate::auth::session::SpotifySessionManager;
use crate::eventbus::{BotEvent, EventBus};
use crate::Error;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_MONITORS: usize = 512;

/// Where a monitor gets "what is this user playing right now". The session
/// manager is the production source; tests script their own.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlaybackSource: Send + Sync {
    async fn currently_playing(&self, user_id: UserId)
    -> Result<Option<CurrentlyPlaying>, Error>;
}

#[async_trait]
impl PlaybackSource for SpotifySessionManager {
    async fn currently_playing(
        &self,
        user_id: UserId,
    ) -> Result<Option<CurrentlyPlaying>, Error> {
        let client = self.get_client(user_id).await?;
        client.currently_playing().await
    }
}

pub struct TrackMonitor {
    playback: Arc<dyn PlaybackSource>,
    event_bus: Arc<EventBus>,
    poll_interval: Duration,
    max_monitors: usize,

    tasks: DashMap<UserId, JoinHandle<()>>,
    last_tracks: Arc<DashMap<UserId, String>>,
}

impl TrackMonitor {
    pub fn new(playback: Arc<dyn PlaybackSource>, event_bus: Arc<EventBus>) -> Self {
        Self::with_settings(playback, event_bus, DEFAULT_POLL_INTERVAL, DEFAULT_MAX_MONITORS)
    }

    pub fn with_settings(
        playback: Arc<dyn PlaybackSource>,
        event_bus: Arc<EventBus>,
        poll_interval: Duration,
        max_monitors: usize,
    ) -> Self {
        Self {
            playback,
            event_bus,
            poll_interval,
            max_monitors,
            tasks: DashMap::new(),
            last_tracks: Arc::new(DashMap::new()),
        }
    }

    /// Start monitoring a user. Replace semantics: an already-running
    /// monitor for the same user is cancelled first, never stacked. The
    /// last-seen track id is reset, so the first poll re-announces whatever
    /// is playing; a track that began while the monitor was stopped is
    /// therefore never lost, at the cost of one possible duplicate.
    pub fn start(&self, user_id: UserId) -> Result<(), Error> {
        let replaced = self.tasks.remove(&user_id);
        if let Some((_, old)) = &replaced {
            old.abort();
        }
        if replaced.is_none() && self.tasks.len() >= self.max_monitors {
            warn!(
                "Refusing to start monitor for user {user_id}: {} monitors already running",
                self.tasks.len()
            );
            return Err(Error::MonitorLimit);
        }

        self.last_tracks.remove(&user_id);

        let playback = Arc::clone(&self.playback);
        let event_bus = Arc::clone(&self.event_bus);
        let last_tracks = Arc::clone(&self.last_tracks);
        let poll_interval = self.poll_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(poll_interval);
            loop {
                ticker.tick().await;
                match playback.currently_playing(user_id).await {
                    Ok(Some(playing)) => {
                        let track_id = playing.item.as_ref().and_then(|item| item.id.clone());
                        // Items without an id (local files) carry no usable
                        // identity; skip them.
                        let Some(track_id) = track_id else { continue };

                        let changed = last_tracks
                            .get(&user_id)
                            .map(|seen| *seen != track_id)
                            .unwrap_or(true);
                        if changed {
                            debug!("User {user_id} now playing track {track_id}");
                            last_tracks.insert(user_id, track_id);
                            event_bus
                                .publish(BotEvent::TrackChanged {
                                    user_id,
                                    playing: playing.clone(),
                                    at: Utc::now(),
                                })
                                .await;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        // A single failed poll must not kill the monitor;
                        // auth errors included (the user may fix them).
                        warn!("Track monitor poll failed for user {user_id}: {e}");
                    }
                }
            }
        });

        self.tasks.insert(user_id, handle);
        info!("Started track monitor for user {user_id}");
        Ok(())
    }

    /// Stop a user's monitor. No-op if none is running.
    pub fn stop(&self, user_id: UserId) -> bool {
        if let Some((_, handle)) = self.tasks.remove(&user_id) {
            handle.abort();
            info!("Stopped track monitor for user {user_id}");
            true
        } else {
            false
        }
    }

    /// Start if stopped, stop if running. Returns whether the monitor is
    /// running afterwards.
    pub fn toggle(&self, user_id: UserId) -> Result<bool, Error> {
        if self.is_running(user_id) {
            self.stop(user_id);
            Ok(false)
        } else {
            self.start(user_id)?;
            Ok(true)
        }
    }

    pub fn is_running(&self, user_id: UserId) -> bool {
        self.tasks
            .get(&user_id)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn monitor_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn stop_all(&self) {
        let users: Vec<UserId> = self.tasks.iter().map(|entry| *entry.key()).collect();
        for user_id in users {
            self.stop(user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use musicboy_common::models::{PlayingTrack, TrackAlbum, TrackArtist};
    use tokio::time::timeout;

    fn playing(track_id: &str) -> CurrentlyPlaying {
        CurrentlyPlaying {
            item: Some(PlayingTrack {
                id: Some(track_id.to_string()),
                name: format!("Song {track_id}"),
                artists: vec![TrackArtist {
                    name: "Artist".to_string(),
                }],
                album: TrackAlbum {
                    name: "Album".to_string(),
                    images: vec![],
                },
                duration_ms: 180_000,
                external_urls: Default::default(),
            }),
            is_playing: true,
            progress_ms: Some(1_000),
        }
    }

    fn steady_source(track_id: &'static str) -> MockPlaybackSource {
        let mut source = MockPlaybackSource::new();
        source
            .expect_currently_playing()
            .returning(move |_| Ok(Some(playing(track_id))));
        source
    }

    async fn next_track_change(
        rx: &mut tokio::sync::mpsc::Receiver<BotEvent>,
    ) -> Option<(UserId, String)> {
        loop {
            let event = timeout(Duration::from_millis(500), rx.recv())
                .await
                .ok()??;
            if let BotEvent::TrackChanged { user_id, playing, .. } = event {
                let id = playing.item.and_then(|item| item.id)?;
                return Some((user_id, id));
            }
        }
    }

    #[tokio::test]
    async fn emits_once_per_identity_change() {
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe(Some(16)).await;

        let monitor = TrackMonitor::with_settings(
            Arc::new(steady_source("track-a")),
            Arc::clone(&bus),
            Duration::from_millis(10),
            8,
        );
        monitor.start(UserId(1)).unwrap();

        let (user, track) = next_track_change(&mut rx).await.expect("first change");
        assert_eq!(user, UserId(1));
        assert_eq!(track, "track-a");

        // Repeated polls of the same track produce zero further events.
        assert!(
            timeout(Duration::from_millis(100), rx.recv()).await.is_err(),
            "same track must not re-announce"
        );

        monitor.stop(UserId(1));
    }

    #[tokio::test]
    async fn detects_change_in_sequence() {
        let responses: Arc<StdMutex<VecDeque<Option<CurrentlyPlaying>>>> =
            Arc::new(StdMutex::new(VecDeque::from(vec![
                Some(playing("first")),
                Some(playing("first")),
                None,
                Some(playing("second")),
            ])));
        let mut source = MockPlaybackSource::new();
        let responses_clone = Arc::clone(&responses);
        source.expect_currently_playing().returning(move |_| {
            let next = responses_clone.lock().unwrap().pop_front();
            Ok(next.unwrap_or_else(|| Some(playing("second"))))
        });

        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe(Some(16)).await;
        let monitor = TrackMonitor::with_settings(
            Arc::new(source),
            Arc::clone(&bus),
            Duration::from_millis(10),
            8,
        );
        monitor.start(UserId(7)).unwrap();

        let (_, first) = next_track_change(&mut rx).await.expect("first change");
        assert_eq!(first, "first");
        let (_, second) = next_track_change(&mut rx).await.expect("second change");
        assert_eq!(second, "second");

        monitor.stop(UserId(7));
    }

    #[tokio::test]
    async fn double_start_keeps_exactly_one_task() {
        let bus = Arc::new(EventBus::new());
        let monitor = TrackMonitor::with_settings(
            Arc::new(steady_source("track-a")),
            Arc::clone(&bus),
            Duration::from_millis(10),
            8,
        );

        monitor.start(UserId(2)).unwrap();
        monitor.start(UserId(2)).unwrap();

        assert_eq!(monitor.monitor_count(), 1);
        assert!(monitor.is_running(UserId(2)));

        monitor.stop(UserId(2));
        assert_eq!(monitor.monitor_count(), 0);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let bus = Arc::new(EventBus::new());
        let monitor = TrackMonitor::with_settings(
            Arc::new(steady_source("track-a")),
            Arc::clone(&bus),
            Duration::from_millis(10),
            8,
        );

        assert!(!monitor.stop(UserId(3)));
        monitor.start(UserId(3)).unwrap();
        assert!(monitor.stop(UserId(3)));
        assert!(!monitor.stop(UserId(3)));
        assert!(!monitor.is_running(UserId(3)));
    }

    #[tokio::test]
    async fn restart_reannounces_current_track() {
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe(Some(16)).await;
        let monitor = TrackMonitor::with_settings(
            Arc::new(steady_source("track-a")),
            Arc::clone(&bus),
            Duration::from_millis(10),
            8,
        );

        monitor.start(UserId(4)).unwrap();
        let (_, first) = next_track_change(&mut rx).await.expect("announce");
        assert_eq!(first, "track-a");

        monitor.stop(UserId(4));
        monitor.start(UserId(4)).unwrap();

        // The last-seen id was reset, so the same track announces again
        // rather than being silently lost.
        let (_, again) = next_track_change(&mut rx).await.expect("re-announce");
        assert_eq!(again, "track-a");

        monitor.stop(UserId(4));
    }

    #[tokio::test]
    async fn poll_errors_do_not_kill_the_loop() {
        let polls: Arc<StdMutex<u32>> = Arc::new(StdMutex::new(0));
        let polls_clone = Arc::clone(&polls);
        let mut source = MockPlaybackSource::new();
        source.expect_currently_playing().returning(move |_| {
            let mut count = polls_clone.lock().unwrap();
            *count += 1;
            if *count < 3 {
                Err(Error::SpotifyApi("rate limited".to_string()))
            } else {
                Ok(Some(playing("after-errors")))
            }
        });

        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe(Some(16)).await;
        let monitor = TrackMonitor::with_settings(
            Arc::new(source),
            Arc::clone(&bus),
            Duration::from_millis(10),
            8,
        );
        monitor.start(UserId(5)).unwrap();

        let (_, track) = next_track_change(&mut rx).await.expect("survives errors");
        assert_eq!(track, "after-errors");

        monitor.stop(UserId(5));
    }

    #[tokio::test]
    async fn monitor_cap_is_enforced() {
        let bus = Arc::new(EventBus::new());
        let monitor = TrackMonitor::with_settings(
            Arc::new(steady_source("track-a")),
            Arc::clone(&bus),
            Duration::from_millis(10),
            1,
        );

        monitor.start(UserId(10)).unwrap();
        let err = monitor.start(UserId(11)).unwrap_err();
        assert!(matches!(err, Error::MonitorLimit));

        // Replacing the existing monitor is always allowed.
        monitor.start(UserId(10)).unwrap();
        assert_eq!(monitor.monitor_count(), 1);

        monitor.stop_all();
        assert_eq!(monitor.monitor_count(), 0);
    }
}
