// src/output.rs
// Audio output backends that pull samples from a ToneGraph

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::PlaybackError;
use crate::graph::{GraphHandle, ToneGraph};

#[cfg(feature = "audio-cpal")]
pub use cpal_backend::CpalBackend;

/// A device (or stand-in) that runs a [`ToneGraph`] on its own clock.
pub trait AudioBackend {
    /// Builds a graph at the backend's sample rate and hooks it up to the output.
    fn open(&mut self, tone: f32, volume: f32) -> Result<LiveGraph, PlaybackError>;
}

/// Keeps an opened output alive. Dropping it releases the output.
pub trait OutputStream {
    fn resume(&mut self) -> Result<(), PlaybackError>;
    /// True once the stream has failed and a new one is needed.
    fn is_closed(&self) -> bool;
}

/// An opened graph: the control handle plus the stream that renders it.
pub struct LiveGraph {
    pub handle: GraphHandle,
    pub stream: Box<dyn OutputStream>,
}

/// Always fails to open, for builds without a device backend.
#[derive(Debug, Clone)]
pub struct UnavailableBackend {
    reason: String,
}

impl UnavailableBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl AudioBackend for UnavailableBackend {
    fn open(&mut self, _tone: f32, _volume: f32) -> Result<LiveGraph, PlaybackError> {
        Err(PlaybackError::AudioUnavailable(self.reason.clone()))
    }
}

// --- Offline Backend ---

#[derive(Default)]
struct OfflineState {
    graph: Option<ToneGraph>,
    generation: u64,
    closed: bool,
    resumed: bool,
}

/// Renders only when asked, on the caller's thread.
#[derive(Clone)]
pub struct OfflineBackend {
    sample_rate: u32,
    state: Rc<RefCell<OfflineState>>,
}

impl OfflineBackend {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            state: Rc::new(RefCell::new(OfflineState::default())),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn opened(&self) -> u64 {
        self.state.borrow().generation
    }

    pub fn is_running(&self) -> bool {
        let state = self.state.borrow();
        state.graph.is_some() && state.resumed && !state.closed
    }

    /// Renders `frames` mono samples. Silence without advancing the clock
    /// when nothing is attached or the stream is not running.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames];
        let mut state = self.state.borrow_mut();
        if state.resumed && !state.closed {
            if let Some(graph) = state.graph.as_mut() {
                graph.render(&mut out, 1);
            }
        }
        out
    }

    pub fn advance(&self, seconds: f64) -> Vec<f32> {
        self.render((seconds * self.sample_rate as f64).round() as usize)
    }

    /// Simulates losing the device: the stream reports closed and the graph is gone.
    pub fn disconnect(&self) {
        let mut state = self.state.borrow_mut();
        state.closed = true;
        state.graph = None;
    }
}

impl AudioBackend for OfflineBackend {
    fn open(&mut self, tone: f32, volume: f32) -> Result<LiveGraph, PlaybackError> {
        let (graph, handle) = ToneGraph::new(self.sample_rate, tone, volume);
        let generation = {
            let mut state = self.state.borrow_mut();
            state.graph = Some(graph);
            state.generation += 1;
            state.closed = false;
            state.resumed = false;
            state.generation
        };
        Ok(LiveGraph {
            handle,
            stream: Box::new(OfflineStream {
                state: Rc::clone(&self.state),
                generation,
            }),
        })
    }
}

struct OfflineStream {
    state: Rc<RefCell<OfflineState>>,
    generation: u64,
}

impl OutputStream for OfflineStream {
    fn resume(&mut self) -> Result<(), PlaybackError> {
        let mut state = self.state.borrow_mut();
        if state.closed || state.generation != self.generation {
            return Err(PlaybackError::GraphClosed);
        }
        state.resumed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        let state = self.state.borrow();
        state.closed || state.generation != self.generation
    }
}

impl Drop for OfflineStream {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        if state.generation == self.generation {
            state.graph = None;
            state.resumed = false;
        }
    }
}

// --- cpal Backend ---

#[cfg(feature = "audio-cpal")]
mod cpal_backend {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    use super::{AudioBackend, LiveGraph, OutputStream};
    use crate::error::PlaybackError;
    use crate::graph::ToneGraph;

    #[derive(Debug, Default)]
    pub struct CpalBackend;

    impl CpalBackend {
        pub fn new() -> Self {
            Self
        }
    }

    fn unavailable(err: impl std::fmt::Display) -> PlaybackError {
        PlaybackError::AudioUnavailable(err.to_string())
    }

    impl AudioBackend for CpalBackend {
        fn open(&mut self, tone: f32, volume: f32) -> Result<LiveGraph, PlaybackError> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| unavailable("no default output device"))?;
            let config = device.default_output_config().map_err(unavailable)?;
            let sample_format = config.sample_format();
            let config: cpal::StreamConfig = config.into();
            let channels = config.channels as usize;
            log::info!(
                "Opening output device {:?}: {} Hz, {} channel(s), {:?}",
                device.name().unwrap_or_default(),
                config.sample_rate.0,
                channels,
                sample_format
            );

            let (mut graph, handle) = ToneGraph::new(config.sample_rate.0, tone, volume);
            let closed = Arc::new(AtomicBool::new(false));
            let err_closed = Arc::clone(&closed);
            let err_fn = move |err: cpal::StreamError| {
                log::error!("Audio stream error: {}", err);
                err_closed.store(true, Ordering::Release);
            };

            let stream = match sample_format {
                cpal::SampleFormat::F32 => device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _| graph.render(data, channels),
                    err_fn,
                    None,
                ),
                cpal::SampleFormat::I16 => {
                    let mut scratch: Vec<f32> = Vec::new();
                    device.build_output_stream(
                        &config,
                        move |data: &mut [i16], _| {
                            scratch.resize(data.len(), 0.0);
                            graph.render(&mut scratch, channels);
                            for (out, sample) in data.iter_mut().zip(&scratch) {
                                *out = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                            }
                        },
                        err_fn,
                        None,
                    )
                }
                other => {
                    return Err(unavailable(format!(
                        "unsupported sample format {:?}",
                        other
                    )));
                }
            }
            .map_err(unavailable)?;

            Ok(LiveGraph {
                handle,
                stream: Box::new(CpalStream { stream, closed }),
            })
        }
    }

    struct CpalStream {
        stream: cpal::Stream,
        closed: Arc<AtomicBool>,
    }

    impl OutputStream for CpalStream {
        fn resume(&mut self) -> Result<(), PlaybackError> {
            self.stream.play().map_err(unavailable)
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::Acquire)
        }
    }
}
