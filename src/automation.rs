// src/automation.rs
// Sample-accurate parameter automation on the audio clock

use std::collections::VecDeque;

/// A scheduled change to an [`AudioParam`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Automation {
    /// Jump to `value` at `time`.
    SetValue { time: f64, value: f32 },
    /// From `time` on, approach `target` exponentially with `time_constant` seconds.
    SetTarget {
        time: f64,
        target: f32,
        time_constant: f64,
    },
}

impl Automation {
    pub fn time(&self) -> f64 {
        match *self {
            Automation::SetValue { time, .. } | Automation::SetTarget { time, .. } => time,
        }
    }
}

// Below this distance an approach snaps onto its target.
const SETTLE_EPSILON: f32 = 1.0e-6;

/// A parameter whose value follows a timeline of [`Automation`] events.
///
/// The owner calls [`AudioParam::tick`] once per sample with that sample's
/// clock time. Events fire on the first sample at or after their time, in
/// time order; events with equal times fire in insertion order.
#[derive(Debug, Clone)]
pub struct AudioParam {
    value: f32,
    sample_rate: f64,
    events: VecDeque<Automation>,
    // Active approach: target and per-sample coefficient.
    approach: Option<(f32, f32)>,
}

impl AudioParam {
    pub fn new(value: f32, sample_rate: u32) -> Self {
        Self {
            value,
            sample_rate: sample_rate as f64,
            events: VecDeque::new(),
            approach: None,
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// Number of events that have not fired yet.
    pub fn pending(&self) -> usize {
        self.events.len()
    }

    pub fn schedule(&mut self, automation: Automation) {
        let time = automation.time();
        let idx = self.events.partition_point(|e| e.time() <= time);
        self.events.insert(idx, automation);
    }

    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.schedule(Automation::SetValue { time, value });
    }

    pub fn set_target_at_time(&mut self, target: f32, time: f64, time_constant: f64) {
        self.schedule(Automation::SetTarget {
            time,
            target,
            time_constant,
        });
    }

    /// Drops every event scheduled at or after `from`. An approach that is
    /// already running keeps going.
    pub fn cancel_scheduled_values(&mut self, from: f64) {
        self.events.retain(|e| e.time() < from);
    }

    /// Advances to the sample at `time` and returns the value for it.
    pub fn tick(&mut self, time: f64) -> f32 {
        while self.events.front().is_some_and(|e| e.time() <= time) {
            if let Some(event) = self.events.pop_front() {
                self.fire(event);
            }
        }

        if let Some((target, coeff)) = self.approach {
            let next = self.value + (target - self.value) * coeff;
            // Snap once the step vanishes below f32 resolution as well.
            if next == self.value || (target - next).abs() < SETTLE_EPSILON {
                self.value = target;
                self.approach = None;
            } else {
                self.value = next;
            }
        }
        self.value
    }

    fn fire(&mut self, event: Automation) {
        match event {
            Automation::SetValue { value, .. } => {
                self.value = value;
                self.approach = None;
            }
            Automation::SetTarget {
                target,
                time_constant,
                ..
            } => {
                if time_constant <= 0.0 {
                    self.value = target;
                    self.approach = None;
                } else {
                    let coeff = 1.0 - (-1.0 / (time_constant * self.sample_rate)).exp();
                    self.approach = Some((target, coeff as f32));
                }
            }
        }
    }
}
