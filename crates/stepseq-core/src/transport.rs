//! Transport state machine and the authoritative step counter

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Transport playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlayStatus {
    #[default]
    Stopped,
    Playing,
    Paused,
    Recording,
}

impl PlayStatus {
    /// Whether ticks advance the tracks in this phase
    pub fn is_running(self) -> bool {
        matches!(self, Self::Playing | Self::Recording)
    }
}

/// Transport buttons exposed to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportButton {
    Play,
    Stop,
    Record,
}

/// Global play state and step position.
///
/// Button presses change `phase` immediately; each change is also queued as a
/// phase edge which the tick loop delivers to every track exactly once, in
/// order, before advancing.
#[derive(Debug, Clone)]
pub struct Transport {
    phase: PlayStatus,
    /// Last phase delivered to the tracks
    prior_phase: PlayStatus,
    pending_edges: VecDeque<PlayStatus>,
    current_step: usize,
    step_count: usize,
    /// Tempo in BPM
    bpm: f64,
    steps_per_beat: u32,
}

/// Accepted tempo range
pub const MIN_BPM: f64 = 1.0;
pub const MAX_BPM: f64 = 999.0;

impl Transport {
    /// `bpm` is clamped to `MIN_BPM..=MAX_BPM`; a non-finite value falls back to `MIN_BPM`
    pub fn new(step_count: usize, bpm: f64, steps_per_beat: u32) -> Self {
        Self {
            phase: PlayStatus::Stopped,
            prior_phase: PlayStatus::Stopped,
            pending_edges: VecDeque::new(),
            current_step: 0,
            step_count: step_count.max(1),
            bpm: if bpm.is_finite() { bpm.clamp(MIN_BPM, MAX_BPM) } else { MIN_BPM },
            steps_per_beat: steps_per_beat.max(1),
        }
    }

    pub fn phase(&self) -> PlayStatus {
        self.phase
    }

    pub fn prior_phase(&self) -> PlayStatus {
        self.prior_phase
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn steps_per_beat(&self) -> u32 {
        self.steps_per_beat
    }

    /// Apply a transport button. Returns the new phase if it changed.
    pub fn press(&mut self, button: TransportButton) -> Option<PlayStatus> {
        let next = match (button, self.phase) {
            (TransportButton::Play, PlayStatus::Playing) => PlayStatus::Paused,
            (TransportButton::Play, _) => PlayStatus::Playing,
            (TransportButton::Stop, _) => PlayStatus::Stopped,
            (TransportButton::Record, _) => PlayStatus::Recording,
        };
        if next == self.phase {
            return None;
        }
        self.phase = next;
        self.pending_edges.push_back(next);
        Some(next)
    }

    pub fn has_pending_edges(&self) -> bool {
        !self.pending_edges.is_empty()
    }

    /// Next undelivered phase edge. Delivering a Stopped edge rewinds the step counter.
    pub fn next_edge(&mut self) -> Option<PlayStatus> {
        let edge = self.pending_edges.pop_front()?;
        self.prior_phase = edge;
        if edge == PlayStatus::Stopped {
            self.current_step = 0;
        }
        Some(edge)
    }

    /// Return the step to play this tick and move the counter on
    pub fn advance_step(&mut self) -> usize {
        let step = self.current_step;
        self.current_step = (step + 1) % self.step_count;
        step
    }

    /// Clock period for one step: 60000 / (bpm * steps_per_beat) ms
    pub fn step_period(&self) -> Duration {
        let steps_per_minute = self.bpm * self.steps_per_beat as f64;
        Duration::from_secs_f64(60.0 / steps_per_minute)
    }

    /// Format position as beat.step (1-indexed)
    pub fn format_position(&self) -> String {
        let spb = self.steps_per_beat as usize;
        format!("{}.{}", self.current_step / spb + 1, self.current_step % spb + 1)
    }
}
