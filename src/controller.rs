// src/controller.rs
// Start/stop lifecycle, stop timer and the per-frame reveal loop

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::PlaybackError;
use crate::output::AudioBackend;
use crate::scheduler::AudioScheduler;
use crate::sequence::build_transcript;
use crate::settings::{MorseSettings, SettingsPatch};
use crate::timing::{Schedule, plan};

/// Extra time after the last tone before a session counts as finished,
/// so the final release can ring out.
pub const TRAILING_MARGIN: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
}

/// What one call to [`PlaybackController::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Idle,
    Unchanged,
    Revealed(usize),
    Finished,
}

#[derive(Debug)]
struct StopTimer {
    deadline: Instant,
}

impl StopTimer {
    fn after(now: Instant, delay: Duration) -> Self {
        Self {
            deadline: now + delay,
        }
    }

    fn is_due(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

// Reveal times are ordered, so each frame resumes from the last cursor.
#[derive(Debug)]
struct SyncLoop {
    schedule: Arc<Schedule>,
    cursor: usize,
}

impl SyncLoop {
    fn new(schedule: Arc<Schedule>) -> Self {
        Self {
            schedule,
            cursor: 0,
        }
    }

    fn frame(&mut self, now: f64) -> usize {
        let reveals = self.schedule.reveals();
        while self.cursor < reveals.len() && reveals[self.cursor].time <= now {
            self.cursor += 1;
        }
        self.cursor
    }
}

// Dropping a session cancels its stop timer and sync loop.
struct Session {
    schedule: Arc<Schedule>,
    stop_timer: StopTimer,
    sync_loop: SyncLoop,
}

/// Drives practice sessions, one at a time. Reveal progress is read off the
/// audio clock, never off wall time.
pub struct PlaybackController<B: AudioBackend> {
    settings: MorseSettings,
    scheduler: AudioScheduler<B>,
    rng: StdRng,
    generated_text: String,
    visible_chars: usize,
    session: Option<Session>,
}

impl<B: AudioBackend> PlaybackController<B> {
    pub fn new(backend: B, settings: MorseSettings) -> Self {
        Self::with_rng(backend, settings, StdRng::from_entropy())
    }

    pub fn with_seed(backend: B, settings: MorseSettings, seed: u64) -> Self {
        Self::with_rng(backend, settings, StdRng::seed_from_u64(seed))
    }

    fn with_rng(backend: B, settings: MorseSettings, rng: StdRng) -> Self {
        Self {
            settings,
            scheduler: AudioScheduler::new(backend),
            rng,
            generated_text: String::new(),
            visible_chars: 0,
            session: None,
        }
    }

    pub fn settings(&self) -> &MorseSettings {
        &self.settings
    }

    pub fn state(&self) -> PlaybackState {
        if self.session.is_some() {
            PlaybackState::Playing
        } else {
            PlaybackState::Idle
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    /// Body text of the current or last session.
    pub fn generated_text(&self) -> &str {
        &self.generated_text
    }

    pub fn visible_chars_count(&self) -> usize {
        self.visible_chars
    }

    pub fn schedule(&self) -> Option<Arc<Schedule>> {
        self.session.as_ref().map(|s| Arc::clone(&s.schedule))
    }

    /// Starts a session. `now` anchors the stop timer.
    ///
    /// An empty character set or transcript leaves the controller idle and is
    /// not an error. On failure nothing of the session is kept.
    pub fn start(&mut self, now: Instant) -> Result<(), PlaybackError> {
        if self.is_playing() {
            log::debug!("Start ignored, already playing");
            return Ok(());
        }

        self.generated_text.clear();
        self.visible_chars = 0;

        if self.settings.character_set.is_empty() {
            log::debug!("Character set is empty, nothing to play");
            return Ok(());
        }
        let transcript = build_transcript(&mut self.rng, &self.settings);
        if transcript.is_empty() {
            log::debug!("Transcript is empty, nothing to play");
            return Ok(());
        }

        let clock_start = match self
            .scheduler
            .ensure_graph(self.settings.tone, self.settings.volume)
        {
            Ok(handle) => handle.clock().now(),
            Err(err) => {
                log::error!("Could not start playback: {}", err);
                return Err(err);
            }
        };

        let schedule = Arc::new(plan(&transcript, &self.settings, clock_start));
        for tone in schedule.tones() {
            if let Err(err) = self.scheduler.commit_tone_event(tone) {
                log::error!("Could not schedule tones: {}", err);
                self.scheduler.stop_all();
                return Err(err);
            }
        }

        let run_time = Duration::from_secs_f64(schedule.duration().max(0.0)) + TRAILING_MARGIN;
        log::info!(
            "Playing {} characters ({} preamble) at {} WPM, {:.1}s",
            transcript.len(),
            transcript.preamble_len(),
            self.settings.wpm,
            schedule.duration()
        );

        self.generated_text = transcript.body().to_string();
        self.session = Some(Session {
            schedule: Arc::clone(&schedule),
            stop_timer: StopTimer::after(now, run_time),
            sync_loop: SyncLoop::new(schedule),
        });
        Ok(())
    }

    /// Stops the running session and silences anything still scheduled.
    /// Does nothing when idle.
    pub fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            self.scheduler.stop_all();
            log::info!(
                "Playback stopped after {} of {} characters",
                self.visible_chars,
                session.schedule.reveals().len()
            );
        }
    }

    /// Per-frame callback: publishes the visible count, then fires the stop
    /// timer if it is due.
    pub fn tick(&mut self, now: Instant) -> Frame {
        let Some(session) = self.session.as_mut() else {
            return Frame::Idle;
        };

        if !self.scheduler.is_ready() {
            log::warn!("Audio output went away, stopping playback");
            self.stop();
            return Frame::Finished;
        }

        let mut frame = Frame::Unchanged;
        if let Some(audio_now) = self.scheduler.now() {
            let count = session.sync_loop.frame(audio_now);
            if count != self.visible_chars {
                self.visible_chars = count;
                frame = Frame::Revealed(count);
            }
        }

        if session.stop_timer.is_due(now) {
            self.complete();
            return Frame::Finished;
        }
        frame
    }

    // Natural end: tones have already released, so no fade is needed.
    fn complete(&mut self) {
        if self.session.take().is_some() {
            log::info!(
                "Playback finished, {} characters revealed",
                self.visible_chars
            );
        }
    }

    /// Applies a partial update. While playing only volume and tone change;
    /// both are forwarded to the audio graph immediately.
    pub fn update_settings(&mut self, patch: SettingsPatch) {
        let applied = self.settings.apply(patch, self.is_playing());
        if applied.rejected {
            log::debug!("Ignoring schedule settings while playing");
        }
        if let Some(volume) = applied.volume {
            self.scheduler.set_volume(volume);
        }
        if let Some(tone) = applied.tone {
            self.scheduler.set_tone(tone);
        }
    }

    pub fn reset(&mut self) {
        if self.is_playing() {
            log::debug!("Reset ignored while playing");
            return;
        }
        self.settings = MorseSettings::default();
    }

    pub fn teardown(&mut self) {
        self.stop();
        self.scheduler.teardown();
    }
}

impl<B: AudioBackend> Drop for PlaybackController<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{OfflineBackend, UnavailableBackend};

    const RATE: u32 = 8000;

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    fn settings(character_set: &str, num_chars: usize, preamble: &str) -> MorseSettings {
        MorseSettings {
            wpm: 20,
            character_set: character_set.into(),
            num_chars,
            group_size: 0,
            char_spaces: 3,
            word_spaces: 7,
            preamble: preamble.into(),
            ..MorseSettings::default()
        }
    }

    fn controller(s: MorseSettings) -> (PlaybackController<OfflineBackend>, OfflineBackend) {
        let backend = OfflineBackend::new(RATE);
        (
            PlaybackController::with_seed(backend.clone(), s, 11),
            backend,
        )
    }

    #[test]
    fn stop_is_idempotent() {
        let (mut c, _backend) = controller(settings("A", 3, ""));
        c.stop();
        c.stop();
        assert_eq!(c.state(), PlaybackState::Idle);

        c.start(Instant::now()).unwrap();
        c.stop();
        c.stop();
        assert!(!c.is_playing());
        assert!(c.schedule().is_none());
    }

    #[test]
    fn empty_character_set_does_nothing() {
        let (mut c, backend) = controller(settings("", 10, "VVV"));
        c.start(Instant::now()).unwrap();
        assert!(!c.is_playing());
        assert_eq!(c.generated_text(), "");
        assert_eq!(backend.opened(), 0);
    }

    #[test]
    fn start_generates_body_only() {
        let (mut c, _backend) = controller(settings("AB", 8, "VVV"));
        c.start(Instant::now()).unwrap();
        assert!(c.is_playing());
        assert_eq!(c.generated_text().len(), 8);
        assert!(c.generated_text().chars().all(|ch| ch == 'A' || ch == 'B'));
        let schedule = c.schedule().unwrap();
        assert_eq!(schedule.reveals().len(), 8);
    }

    #[test]
    fn reveals_follow_the_audio_clock() {
        // "E" + "AAA" at 20 WPM: reveals at 0.24, 0.72, 1.20; ends at 1.50.
        let (mut c, backend) = controller(settings("A", 3, "E"));
        let t0 = Instant::now();
        c.start(t0).unwrap();
        assert_eq!(c.generated_text(), "AAA");

        backend.advance(0.1);
        assert_eq!(c.tick(t0), Frame::Unchanged);
        assert_eq!(c.visible_chars_count(), 0);

        backend.advance(0.15);
        assert_eq!(c.tick(t0), Frame::Revealed(1));

        backend.advance(0.5);
        assert_eq!(c.tick(t0), Frame::Revealed(2));
        assert_eq!(c.tick(t0), Frame::Unchanged);

        backend.advance(0.6);
        assert_eq!(c.tick(t0), Frame::Revealed(3));
        assert!(c.is_playing());

        // Wall time alone never reveals anything; the stop timer ends the session.
        let done = t0 + Duration::from_secs(2);
        assert_eq!(c.tick(done), Frame::Finished);
        assert!(!c.is_playing());
        assert_eq!(c.visible_chars_count(), 3);
        assert_eq!(c.generated_text(), "AAA");
        assert_eq!(c.tick(done), Frame::Idle);
    }

    #[test]
    fn stop_timer_waits_for_trailing_margin() {
        let (mut c, _backend) = controller(settings("A", 3, "E"));
        let t0 = Instant::now();
        c.start(t0).unwrap();
        let almost = t0 + Duration::from_secs_f64(1.5) + TRAILING_MARGIN / 2;
        assert_ne!(c.tick(almost), Frame::Finished);
        assert!(c.is_playing());
    }

    #[test]
    fn stopped_session_never_finishes() {
        let (mut c, backend) = controller(settings("A", 3, ""));
        let t0 = Instant::now();
        c.start(t0).unwrap();
        backend.advance(0.3);
        assert_eq!(c.tick(t0), Frame::Revealed(1));

        c.stop();
        backend.advance(5.0);
        let late = t0 + Duration::from_secs(10);
        assert_eq!(c.tick(late), Frame::Idle);
        assert_eq!(c.visible_chars_count(), 1);
    }

    #[test]
    fn stop_silences_scheduled_tones() {
        let (mut c, backend) = controller(settings("T", 20, ""));
        c.start(Instant::now()).unwrap();
        assert!(peak(&backend.advance(0.1)) > 0.1);

        c.stop();
        backend.advance(0.1);
        assert!(peak(&backend.advance(3.0)) < 1e-3);
        assert_eq!(c.tick(Instant::now()), Frame::Idle);
    }

    #[test]
    fn audio_unavailable_leaves_idle() {
        let mut c = PlaybackController::with_seed(
            UnavailableBackend::new("no device"),
            settings("ABC", 5, "VVV"),
            1,
        );
        let err = c.start(Instant::now()).err();
        assert!(matches!(err, Some(PlaybackError::AudioUnavailable(_))));
        assert!(!c.is_playing());
        assert_eq!(c.generated_text(), "");
        assert_eq!(c.tick(Instant::now()), Frame::Idle);
    }

    #[test]
    fn start_while_playing_keeps_session() {
        let (mut c, _backend) = controller(settings("AB", 5, ""));
        let t0 = Instant::now();
        c.start(t0).unwrap();
        let text = c.generated_text().to_string();
        let schedule = c.schedule().unwrap();
        c.start(t0).unwrap();
        assert_eq!(c.generated_text(), text);
        assert!(Arc::ptr_eq(&schedule, &c.schedule().unwrap()));
    }

    #[test]
    fn schedule_settings_lock_while_playing() {
        let (mut c, _backend) = controller(settings("AB", 5, ""));
        c.start(Instant::now()).unwrap();
        c.update_settings(SettingsPatch {
            wpm: Some(40),
            character_set: Some("XYZ".into()),
            volume: Some(0.3),
            ..Default::default()
        });
        assert_eq!(c.settings().wpm, 20);
        assert_eq!(c.settings().character_set, "AB");
        assert_eq!(c.settings().volume, 0.3);

        c.stop();
        c.update_settings(SettingsPatch {
            wpm: Some(40),
            ..Default::default()
        });
        assert_eq!(c.settings().wpm, 40);
    }

    #[test]
    fn volume_changes_apply_mid_session() {
        let s = MorseSettings {
            wpm: 5,
            tone: 1000.0,
            volume: 0.5,
            ..settings("T", 1, "")
        };
        let (mut c, backend) = controller(s);
        c.start(Instant::now()).unwrap();

        let loud = backend.advance(0.3);
        assert!((peak(&loud[1600..]) - 0.5).abs() < 0.02);

        c.update_settings(SettingsPatch::volume(0.1));
        backend.advance(0.1);
        let quiet = backend.advance(0.1);
        assert!((peak(&quiet) - 0.1).abs() < 0.02, "peak {}", peak(&quiet));
        assert!(c.is_playing());
    }

    #[test]
    fn reset_restores_defaults_when_idle() {
        let (mut c, _backend) = controller(settings("AB", 5, ""));
        c.start(Instant::now()).unwrap();
        c.reset();
        assert_eq!(c.settings().character_set, "AB");

        c.stop();
        c.reset();
        assert_eq!(c.settings(), &MorseSettings::default());
    }

    #[test]
    fn next_session_starts_fresh() {
        let (mut c, backend) = controller(settings("A", 2, ""));
        let t0 = Instant::now();
        c.start(t0).unwrap();
        backend.advance(2.0);
        c.tick(t0);
        assert_eq!(c.visible_chars_count(), 2);
        c.stop();

        c.start(t0).unwrap();
        assert_eq!(c.visible_chars_count(), 0);
        assert_eq!(backend.opened(), 1);
        // The new schedule is anchored at the current clock time.
        let schedule = c.schedule().unwrap();
        assert!((schedule.start_time() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn lost_output_ends_session() {
        let (mut c, backend) = controller(settings("A", 5, ""));
        c.start(Instant::now()).unwrap();
        backend.disconnect();
        assert_eq!(c.tick(Instant::now()), Frame::Finished);
        assert!(!c.is_playing());

        // The next start opens a new graph.
        c.start(Instant::now()).unwrap();
        assert_eq!(backend.opened(), 2);
    }

    #[test]
    fn teardown_releases_audio() {
        let (mut c, backend) = controller(settings("A", 5, ""));
        c.start(Instant::now()).unwrap();
        assert!(backend.is_running());
        c.teardown();
        assert!(!c.is_playing());
        assert!(!backend.is_running());
        c.teardown();
    }
}
