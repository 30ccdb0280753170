// src/wav.rs
// Renders a planned session to a WAV file

use anyhow::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;

use crate::controller::TRAILING_MARGIN;
use crate::graph::{Param, ToneGraph, shape_tone};
use crate::timing::Schedule;

const CHUNK_SIZE: usize = 1024;

/// Offline renderer using the same graph and envelope shaping as live playback.
pub struct WavRenderer {
    sample_rate: u32,
    tone: f32,
    volume: f32,
}

impl WavRenderer {
    pub fn new(sample_rate: u32, tone: f32, volume: f32) -> Self {
        Self {
            sample_rate,
            tone,
            volume,
        }
    }

    /// Renders `schedule` from clock zero through its end plus the trailing margin.
    pub fn render(&self, schedule: &Schedule) -> Result<Vec<f32>> {
        let (mut graph, handle) = ToneGraph::new(self.sample_rate, self.tone, self.volume);
        for tone in schedule.tones() {
            for automation in shape_tone(tone) {
                handle.automate(Param::Envelope, automation)?;
            }
        }

        let seconds = schedule.end_time().max(0.0) + TRAILING_MARGIN.as_secs_f64();
        let total = (seconds * self.sample_rate as f64).ceil() as usize;
        let mut samples = vec![0.0; total];
        for chunk in samples.chunks_mut(CHUNK_SIZE) {
            graph.render(chunk, 1);
        }
        Ok(samples)
    }

    /// Writes `schedule` as 16-bit mono PCM.
    pub fn write_wav_file<P: AsRef<Path>>(&self, schedule: &Schedule, path: P) -> Result<()> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let samples = self.render(schedule)?;
        let mut writer = WavWriter::create(path, spec)?;
        for sample in samples {
            writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
        log::info!(
            "Wrote {:.2}s of audio at {} Hz",
            schedule.end_time() + TRAILING_MARGIN.as_secs_f64(),
            self.sample_rate
        );
        Ok(())
    }
}
