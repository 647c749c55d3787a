//! Per-track step grid: lanes of note slots, loop length and cursor

use serde::{Deserialize, Serialize};

/// Maximum number of notes a single step can hold (one per lane)
pub const MAX_PARALLEL_NOTES: usize = 10;

/// All notes stored at one step, one slot per lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepSlot {
    notes: [Option<u8>; MAX_PARALLEL_NOTES],
}

impl StepSlot {
    pub fn is_active(&self) -> bool {
        self.notes.iter().any(Option::is_some)
    }

    pub fn note(&self, lane: usize) -> Option<u8> {
        self.notes.get(lane).copied().flatten()
    }

    /// Stored pitches in lane order
    pub fn notes(&self) -> impl Iterator<Item = u8> + '_ {
        self.notes.iter().flatten().copied()
    }
}

/// Fixed-capacity step table with a truncatable loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepGrid {
    steps: Vec<StepSlot>,
    steps_per_beat: usize,
    /// Steps at index >= active_length are skipped by the cursor
    active_length: usize,
    active_lane: usize,
    cursor: usize,
}

impl StepGrid {
    pub fn new(step_count: usize, steps_per_beat: usize) -> Self {
        let step_count = step_count.max(1);
        Self {
            steps: vec![StepSlot::default(); step_count],
            steps_per_beat: steps_per_beat.max(1),
            active_length: step_count,
            active_lane: 0,
            cursor: 0,
        }
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn steps_per_beat(&self) -> usize {
        self.steps_per_beat
    }

    pub fn active_length(&self) -> usize {
        self.active_length
    }

    pub fn active_lane(&self) -> usize {
        self.active_lane
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Toggle the active lane at `step`: empty becomes `note`, anything else is cleared.
    ///
    /// # Panics
    /// If `step >= step_count`. Callers validate indices coming from user input.
    pub fn toggle(&mut self, step: usize, note: u8) {
        let cell = &mut self.steps[step].notes[self.active_lane];
        *cell = if cell.is_some() { None } else { Some(note) };
    }

    /// Overwrite the active lane at `step` (last writer wins).
    ///
    /// # Panics
    /// If `step >= step_count`.
    pub fn write(&mut self, step: usize, note: u8) {
        self.steps[step].notes[self.active_lane] = Some(note);
    }

    /// Clamp `n` to `[1, step_count]`; a cursor beyond the new length restarts at 0.
    /// Returns the applied length.
    pub fn set_active_length(&mut self, n: usize) -> usize {
        self.active_length = n.clamp(1, self.steps.len());
        if self.cursor >= self.active_length {
            self.cursor = 0;
        }
        self.active_length
    }

    /// Select the lane that `toggle` and `write` edit (clamped)
    pub fn select_lane(&mut self, lane: usize) {
        self.active_lane = lane.min(MAX_PARALLEL_NOTES - 1);
    }

    /// Replace the pitch of every stored note with `new_note`
    pub fn rewrite_active_slots(&mut self, new_note: u8) {
        for note in self.steps.iter_mut().flat_map(|s| s.notes.iter_mut()).flatten() {
            *note = new_note;
        }
    }

    pub fn slot(&self, step: usize) -> Option<&StepSlot> {
        self.steps.get(step)
    }

    /// Slot under the cursor
    pub fn current_slot(&self) -> &StepSlot {
        &self.steps[self.cursor]
    }

    pub fn is_active(&self, step: usize) -> bool {
        self.slot(step).is_some_and(StepSlot::is_active)
    }

    pub fn is_cursor(&self, step: usize) -> bool {
        step == self.cursor
    }

    /// First step of a beat
    pub fn is_boundary(&self, step: usize) -> bool {
        step < self.steps.len() && step % self.steps_per_beat == 0
    }

    /// The first step past the loop end, drawn as the length marker
    pub fn is_max_step(&self, step: usize) -> bool {
        step == self.active_length
    }

    pub fn advance_cursor(&mut self) {
        self.cursor = (self.cursor + 1) % self.active_length;
    }

    pub fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    /// Per-step active flags for rendering
    pub fn active_flags(&self) -> Vec<bool> {
        self.steps.iter().map(StepSlot::is_active).collect()
    }
}
