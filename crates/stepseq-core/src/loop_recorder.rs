//! Live note capture into a looper track's grid

use serde::Serialize;

use crate::midi::MidiMessage;
use crate::step_grid::StepGrid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RecorderState {
    #[default]
    Idle,
    Armed,
}

#[derive(Debug, Clone, Default)]
pub struct LoopRecorder {
    state: RecorderState,
    captured: usize,
}

impl LoopRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        self.state == RecorderState::Armed
    }

    /// Notes captured since the last arm
    pub fn captured(&self) -> usize {
        self.captured
    }

    pub fn arm(&mut self) {
        self.state = RecorderState::Armed;
        self.captured = 0;
    }

    /// Stop capturing, keeping what was written. Returns the capture count.
    pub fn finalize(&mut self) -> usize {
        self.state = RecorderState::Idle;
        self.captured
    }

    /// Write a note-on into `grid` at its cursor. Note-offs and zero-velocity
    /// note-ons are ignored. Returns the step written.
    pub fn capture(&mut self, grid: &mut StepGrid, msg: &MidiMessage) -> Option<usize> {
        if !self.is_armed() || !msg.starts_note() {
            return None;
        }
        let step = grid.cursor();
        grid.write(step, msg.pitch);
        self.captured += 1;
        Some(step)
    }
}
