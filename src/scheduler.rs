// src/scheduler.rs
// Owns the synthesis graph and programs it ahead of playback

use crate::error::PlaybackError;
use crate::graph::{GraphHandle, Param, shape_tone};
use crate::output::{AudioBackend, LiveGraph};
use crate::timing::ToneEvent;

/// Sole owner of the audio graph.
///
/// The graph is opened lazily and reused across sessions until it is torn
/// down or its stream dies.
pub struct AudioScheduler<B: AudioBackend> {
    backend: B,
    live: Option<LiveGraph>,
}

impl<B: AudioBackend> AudioScheduler<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            live: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.live.as_ref().is_some_and(|live| !live.stream.is_closed())
    }

    pub fn now(&self) -> Option<f64> {
        self.live.as_ref().map(|live| live.handle.clock().now())
    }

    /// Makes sure a running graph exists and returns its handle.
    ///
    /// An existing graph is resumed and glided to `tone` and `volume`; a
    /// missing or dead one is rebuilt with them.
    pub fn ensure_graph(&mut self, tone: f32, volume: f32) -> Result<&GraphHandle, PlaybackError> {
        if self.live.as_ref().is_some_and(|live| live.stream.is_closed()) {
            log::warn!("Audio stream closed, rebuilding graph");
            self.live = None;
        }

        let live = match self.live.take() {
            Some(mut live) => {
                live.stream.resume()?;
                live.handle.glide(Param::Frequency, tone)?;
                live.handle.glide(Param::Master, volume)?;
                live
            }
            None => {
                let mut live = self.backend.open(tone, volume)?;
                live.stream.resume()?;
                log::debug!(
                    "Audio graph ready at {} Hz",
                    live.handle.clock().sample_rate()
                );
                live
            }
        };

        Ok(&self.live.insert(live).handle)
    }

    pub fn commit_tone_event(&mut self, event: &ToneEvent) -> Result<(), PlaybackError> {
        let live = self.live.as_ref().ok_or(PlaybackError::GraphClosed)?;
        for automation in shape_tone(event) {
            live.handle.automate(Param::Envelope, automation)?;
        }
        Ok(())
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.glide(Param::Master, volume);
    }

    pub fn set_tone(&mut self, tone: f32) {
        self.glide(Param::Frequency, tone);
    }

    fn glide(&mut self, param: Param, value: f32) {
        if let Some(live) = self.live.as_ref() {
            if let Err(err) = live.handle.glide(param, value) {
                log::warn!("Could not update {:?}: {}", param, err);
            }
        }
    }

    /// Cancels every pending envelope change and fades out. Safe without a graph.
    pub fn stop_all(&mut self) {
        if let Some(live) = self.live.as_ref() {
            if let Err(err) = live.handle.silence() {
                log::debug!("Silencing skipped: {}", err);
            }
        }
    }

    /// Releases the graph and its output. A later session calls
    /// [`AudioScheduler::ensure_graph`] again.
    pub fn teardown(&mut self) {
        if self.live.take().is_some() {
            log::debug!("Audio graph released");
        }
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

    #[test]
    fn ensure_graph_is_idempotent() {
        let backend = OfflineBackend::new(RATE);
        let mut scheduler = AudioScheduler::new(backend.clone());
        assert!(!scheduler.is_ready());
        assert_eq!(scheduler.now(), None);

        scheduler.ensure_graph(600.0, 0.5).unwrap();
        scheduler.ensure_graph(600.0, 0.5).unwrap();
        assert_eq!(backend.opened(), 1);
        assert!(scheduler.is_ready());
        assert_eq!(scheduler.now(), Some(0.0));
    }

    #[test]
    fn rebuilds_after_teardown_or_disconnect() {
        let backend = OfflineBackend::new(RATE);
        let mut scheduler = AudioScheduler::new(backend.clone());
        scheduler.ensure_graph(600.0, 0.5).unwrap();

        scheduler.teardown();
        assert!(!scheduler.is_ready());
        assert!(!backend.is_running());
        scheduler.ensure_graph(600.0, 0.5).unwrap();
        assert_eq!(backend.opened(), 2);

        backend.disconnect();
        assert!(!scheduler.is_ready());
        scheduler.ensure_graph(600.0, 0.5).unwrap();
        assert_eq!(backend.opened(), 3);
        assert!(backend.is_running());
    }

    #[test]
    fn unavailable_audio_is_reported() {
        let mut scheduler = AudioScheduler::new(UnavailableBackend::new("denied"));
        let err = scheduler.ensure_graph(600.0, 0.5).err();
        assert!(matches!(err, Some(PlaybackError::AudioUnavailable(_))));
        assert!(!scheduler.is_ready());
    }

    #[test]
    fn commit_needs_a_graph() {
        let mut scheduler = AudioScheduler::new(OfflineBackend::new(RATE));
        let tone = ToneEvent {
            start_time: 0.0,
            duration: 0.1,
        };
        assert!(matches!(
            scheduler.commit_tone_event(&tone),
            Err(PlaybackError::GraphClosed)
        ));
    }

    #[test]
    fn committed_tones_play_on_the_clock() {
        let backend = OfflineBackend::new(RATE);
        let mut scheduler = AudioScheduler::new(backend.clone());
        scheduler.ensure_graph(800.0, 1.0).unwrap();
        for start_time in [0.1, 0.3] {
            scheduler
                .commit_tone_event(&ToneEvent {
                    start_time,
                    duration: 0.1,
                })
                .unwrap();
        }

        let audio = backend.advance(0.5);
        let window = |from: f64, to: f64| {
            peak(&audio[(from * RATE as f64) as usize..(to * RATE as f64) as usize])
        };
        assert_eq!(window(0.0, 0.1), 0.0);
        assert!(window(0.12, 0.18) > 0.9);
        assert!(window(0.22, 0.28) < 1e-3);
        assert!(window(0.32, 0.38) > 0.9);
        assert!(window(0.42, 0.5) < 1e-3);
    }

    #[test]
    fn stop_all_silences_future_tones() {
        let backend = OfflineBackend::new(RATE);
        let mut scheduler = AudioScheduler::new(backend.clone());
        scheduler.stop_all();

        scheduler.ensure_graph(800.0, 1.0).unwrap();
        scheduler
            .commit_tone_event(&ToneEvent {
                start_time: 0.05,
                duration: 1.0,
            })
            .unwrap();
        backend.advance(0.1);
        scheduler.stop_all();
        scheduler.stop_all();
        backend.advance(0.1);
        assert!(peak(&backend.advance(1.0)) < 1e-3);
    }

    #[test]
    fn stop_all_fades_instead_of_cutting() {
        let backend = OfflineBackend::new(RATE);
        let mut scheduler = AudioScheduler::new(backend.clone());
        scheduler.ensure_graph(800.0, 1.0).unwrap();
        scheduler
            .commit_tone_event(&ToneEvent {
                start_time: 0.0,
                duration: 1.0,
            })
            .unwrap();
        backend.advance(0.1);

        scheduler.stop_all();
        assert!(peak(&backend.advance(0.002)) > 0.5);
        backend.advance(0.033);
        assert!(peak(&backend.advance(0.005)) < 0.05);
    }

    #[test]
    fn reused_graph_picks_up_new_settings() {
        let backend = OfflineBackend::new(RATE);
        let mut scheduler = AudioScheduler::new(backend.clone());
        scheduler.ensure_graph(600.0, 1.0).unwrap();
        backend.advance(0.1);
        scheduler.ensure_graph(600.0, 0.2).unwrap();
        let start = scheduler.now().unwrap();
        scheduler
            .commit_tone_event(&ToneEvent {
                start_time: start + 0.1,
                duration: 0.3,
            })
            .unwrap();
        let audio = backend.advance(0.3);
        let held = peak(&audio[(0.2 * RATE as f64) as usize..]);
        assert!((held - 0.2).abs() < 0.01, "peak {held}");
    }
}
