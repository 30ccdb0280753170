// src/graph.rs
// Tone source -> envelope gain -> master gain, driven by commands over a channel

use std::f64::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

use crate::automation::{AudioParam, Automation};
use crate::error::PlaybackError;
use crate::timing::ToneEvent;

// --- Envelope Constants ---
/// Attack/release length of a keyed tone.
pub const RAMP_TIME: f64 = 0.005;
/// Time constant for live volume/tone changes and for silencing on stop.
pub const SMOOTHING: f64 = 0.01;

/// Which parameter of the graph a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Frequency,
    Envelope,
    Master,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GraphCommand {
    Automate { param: Param, automation: Automation },
    Cancel { param: Param, from: f64 },
}

/// Monotonic clock counting rendered frames.
///
/// The render side advances it, everyone else only reads.
#[derive(Debug, Clone)]
pub struct AudioClock {
    frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl AudioClock {
    fn new(sample_rate: u32) -> Self {
        Self {
            frames: Arc::new(AtomicU64::new(0)),
            sample_rate,
        }
    }

    /// Current time in seconds.
    pub fn now(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::Release);
    }
}

/// Control side of a [`ToneGraph`].
#[derive(Debug, Clone)]
pub struct GraphHandle {
    commands: Sender<GraphCommand>,
    clock: AudioClock,
}

impl GraphHandle {
    pub fn clock(&self) -> &AudioClock {
        &self.clock
    }

    pub fn send(&self, command: GraphCommand) -> Result<(), PlaybackError> {
        self.commands
            .send(command)
            .map_err(|_| PlaybackError::GraphClosed)
    }

    pub fn automate(&self, param: Param, automation: Automation) -> Result<(), PlaybackError> {
        self.send(GraphCommand::Automate { param, automation })
    }

    /// Smoothly moves `param` to `value` starting now.
    pub fn glide(&self, param: Param, value: f32) -> Result<(), PlaybackError> {
        self.automate(
            param,
            Automation::SetTarget {
                time: self.clock.now(),
                target: value,
                time_constant: SMOOTHING,
            },
        )
    }

    /// Drops everything pending on the envelope and fades it to silence.
    pub fn silence(&self) -> Result<(), PlaybackError> {
        let now = self.clock.now();
        self.send(GraphCommand::Cancel {
            param: Param::Envelope,
            from: now,
        })?;
        self.automate(
            Param::Envelope,
            Automation::SetTarget {
                time: now,
                target: 0.0,
                time_constant: SMOOTHING,
            },
        )
    }
}

/// Envelope automation that keys one tone without clicks.
///
/// Tones long enough to hold two ramps get exponential attack and release;
/// shorter ones are stepped.
pub fn shape_tone(event: &ToneEvent) -> [Automation; 2] {
    if event.duration > RAMP_TIME * 2.0 {
        [
            Automation::SetTarget {
                time: event.start_time,
                target: 1.0,
                time_constant: RAMP_TIME / 3.0,
            },
            Automation::SetTarget {
                time: event.end_time() - RAMP_TIME,
                target: 0.0,
                time_constant: RAMP_TIME / 3.0,
            },
        ]
    } else {
        [
            Automation::SetValue {
                time: event.start_time,
                value: 1.0,
            },
            Automation::SetValue {
                time: event.end_time(),
                value: 0.0,
            },
        ]
    }
}

/// The render side: a continuous sine whose output is gated by the envelope
/// and scaled by the master gain.
pub struct ToneGraph {
    phase: f64,
    frequency: AudioParam,
    envelope: AudioParam,
    master: AudioParam,
    commands: Receiver<GraphCommand>,
    clock: AudioClock,
}

impl ToneGraph {
    pub fn new(sample_rate: u32, tone: f32, volume: f32) -> (Self, GraphHandle) {
        let (tx, rx) = mpsc::channel();
        let clock = AudioClock::new(sample_rate);
        let graph = Self {
            phase: 0.0,
            frequency: AudioParam::new(tone, sample_rate),
            envelope: AudioParam::new(0.0, sample_rate),
            master: AudioParam::new(volume, sample_rate),
            commands: rx,
            clock: clock.clone(),
        };
        let handle = GraphHandle {
            commands: tx,
            clock,
        };
        (graph, handle)
    }

    pub fn sample_rate(&self) -> u32 {
        self.clock.sample_rate()
    }

    pub fn envelope(&self) -> f32 {
        self.envelope.value()
    }

    pub fn master(&self) -> f32 {
        self.master.value()
    }

    pub fn frequency(&self) -> f32 {
        self.frequency.value()
    }

    /// Applies everything queued on the command channel.
    pub fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                GraphCommand::Automate { param, automation } => {
                    self.param_mut(param).schedule(automation)
                }
                GraphCommand::Cancel { param, from } => {
                    self.param_mut(param).cancel_scheduled_values(from)
                }
            }
        }
    }

    fn param_mut(&mut self, param: Param) -> &mut AudioParam {
        match param {
            Param::Frequency => &mut self.frequency,
            Param::Envelope => &mut self.envelope,
            Param::Master => &mut self.master,
        }
    }

    /// Fills an interleaved buffer with `channels` copies of the mono signal
    /// and advances the clock by the number of frames written.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        self.drain_commands();

        let channels = channels.max(1);
        let rate = self.clock.sample_rate() as f64;
        let start = self.clock.frames();
        let mut frames = 0u64;

        for frame in out.chunks_mut(channels) {
            let t = (start + frames) as f64 / rate;
            let freq = self.frequency.tick(t) as f64;
            let envelope = self.envelope.tick(t);
            let gain = self.master.tick(t);

            let sample = (self.phase * TAU).sin() as f32 * envelope * gain;
            self.phase = (self.phase + freq / rate).fract();

            frame.fill(sample);
            frames += 1;
        }

        self.clock.advance(frames);
    }
}
