//! The set of tracks driven by one transport

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::arpeggiator::Arpeggiator;
use crate::command::Command;
use crate::config::SequencerConfig;
use crate::error::{Result, SequencerError};
use crate::input_state::{GridEditGate, InputMode, InputState, InstrumentChoice, InstrumentSelectPress};
use crate::midi::MidiMessage;
use crate::note_lifetime::NoteLifetime;
use crate::sink::{DeviceId, NoteSink};
use crate::step_grid::StepGrid;
use crate::track::{TrackId, TrackModel, TrackRenderState};
use crate::transport::{PlayStatus, Transport, TransportButton};

/// Everything the UI needs for one frame, taken at a tick boundary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequencerSnapshot {
    pub phase: PlayStatus,
    pub current_step: usize,
    pub position: String,
    pub bpm: f64,
    pub input_mode: InputMode,
    pub tracks: Vec<TrackRenderState>,
}

#[derive(Debug, Clone)]
pub struct TracksModel {
    tracks: Vec<TrackModel>,
    /// Sounding voices of every track
    voices: NoteLifetime,
    transport: Transport,
    input: InputState,
}

impl TracksModel {
    pub fn new(tracks: Vec<TrackModel>, transport: Transport) -> Result<Self> {
        if tracks.is_empty() {
            return Err(SequencerError::config("at least one track is required"));
        }
        Ok(Self {
            tracks,
            voices: NoteLifetime::new(),
            transport,
            input: InputState::new(),
        })
    }

    /// Build the track set from configuration. Every track's device must be
    /// known to `sink`.
    pub fn from_config(config: &SequencerConfig, sink: &dyn NoteSink) -> Result<Self> {
        config.validate()?;

        let mut tracks = Vec::with_capacity(config.tracks.len());
        for (idx, tc) in config.tracks.iter().enumerate() {
            let device = DeviceId(tc.device);
            if !sink.has_device(device) {
                return Err(SequencerError::config(format!(
                    "track '{}': output device {device} is not available",
                    tc.name
                )));
            }

            let mut arp = Arpeggiator::new(tc.arpeggiator.offsets.clone());
            arp.set_enabled(tc.arpeggiator.enabled);

            let grid = StepGrid::new(config.steps, config.steps_per_beat as usize);
            let mut track = TrackModel::new(TrackId(idx), tc.name.clone(), grid)
                .with_arpeggiator(arp)
                .with_velocity(config.velocity);
            if tc.looper {
                track = track.with_recorder();
            }
            track.set_device(device);
            track.set_channel(tc.channel)?;
            track.set_note(tc.note)?;
            tracks.push(track);
        }

        info!(tracks = tracks.len(), steps = config.steps, bpm = config.bpm, "Track set created");
        let transport = Transport::new(config.steps, config.bpm, config.steps_per_beat);
        Self::new(tracks, transport)
    }

    pub fn tracks(&self) -> &[TrackModel] {
        &self.tracks
    }

    pub fn track(&self, id: TrackId) -> Option<&TrackModel> {
        self.tracks.get(id.0)
    }

    fn track_mut(&mut self, id: TrackId) -> Result<&mut TrackModel> {
        self.tracks.get_mut(id.0).ok_or(SequencerError::TrackNotFound(id.0))
    }

    pub fn voices(&self) -> &NoteLifetime {
        &self.voices
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn phase(&self) -> PlayStatus {
        self.transport.phase()
    }

    pub fn has_looper(&self) -> bool {
        self.tracks.iter().any(TrackModel::is_looper)
    }

    // ------------------------------------------------------------------
    // Clock entry points
    // ------------------------------------------------------------------

    /// One step of musical time
    pub fn tick(&mut self, sink: &mut dyn NoteSink) {
        self.deliver_edges(sink);
        if !self.transport.phase().is_running() {
            return;
        }
        let step = self.transport.advance_step();
        for track in &mut self.tracks {
            track.advance(step, &mut self.voices, sink);
        }
    }

    /// Arpeggiator sub-step
    pub fn arp_tick(&mut self, sink: &mut dyn NoteSink) {
        self.deliver_edges(sink);
        if !self.transport.phase().is_running() {
            return;
        }
        for track in &mut self.tracks {
            track.arp_tick(&mut self.voices, sink);
        }
    }

    fn deliver_edges(&mut self, sink: &mut dyn NoteSink) {
        while let Some(phase) = self.transport.next_edge() {
            info!(?phase, "Transport phase change");
            for track in &mut self.tracks {
                track.enter_phase(phase, &mut self.voices, sink);
            }
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Apply one user or MIDI-input action. Errors leave the model unchanged.
    pub fn apply(&mut self, command: Command, sink: &mut dyn NoteSink) -> Result<()> {
        if let Some(id) = command.track() {
            self.track_mut(id)?;
        }

        match command {
            Command::StepPressed { track, step } => match self.input.mode() {
                InputMode::StepLengthSelect => self.set_max_steps(track, step + 1),
                _ => self.toggle_step(track, step),
            },
            Command::ToggleStep { track, step } => self.toggle_step(track, step),
            Command::SetMaxSteps { track, steps } => self.set_max_steps(track, steps),
            Command::SetMute { track, muted } => {
                self.track_mut(track)?.set_mute(muted);
                Ok(())
            }
            Command::ToggleMute { track } => {
                let t = self.track_mut(track)?;
                let muted = !t.is_muted();
                t.set_mute(muted);
                debug!(track = track.0, muted, "Mute toggled");
                Ok(())
            }
            Command::SetNote { track, note } => {
                self.check_assignment_edit(track)?;
                self.track_mut(track)?.set_note(note)
            }
            Command::SetChannel { track, channel } => {
                self.check_assignment_edit(track)?;
                self.track_mut(track)?.set_channel(channel)
            }
            Command::SetDevice { track, device } => {
                self.check_assignment_edit(track)?;
                Self::check_device(sink, device)?;
                self.track_mut(track)?.set_device(device);
                Ok(())
            }
            Command::SetArpeggiator { track, enabled } => {
                self.track_mut(track)?.set_arp_enabled(enabled);
                Ok(())
            }
            Command::SelectLane { track, lane } => self.track_mut(track)?.select_lane(lane),
            Command::StepLengthSelect => {
                let mode = self.input.step_length_select_pressed()?;
                debug!(?mode, "Input mode");
                Ok(())
            }
            Command::SelectInstrument { track } => self.select_instrument(track),
            Command::ConfirmInstrument(choice) => self.confirm_instrument(choice, sink),
            Command::Transport(button) => self.press_transport(button),
            Command::ExternalNote(msg) => {
                self.receive_external(&msg, sink);
                Ok(())
            }
        }
    }

    fn check_grid_edit(&self, track: TrackId) -> Result<bool> {
        match self.input.grid_edit_gate(track) {
            GridEditGate::Allowed => Ok(true),
            GridEditGate::Suppressed => {
                debug!(track = track.0, "Grid edit ignored while selecting instrument");
                Ok(false)
            }
            GridEditGate::Rejected(pending) => Err(SequencerError::invalid(format!(
                "grid edit on track {} while instrument select is pending for track {}",
                track.0, pending.0
            ))),
        }
    }

    /// While a track's instrument is being selected, only the confirmation
    /// may change its device, channel or note
    fn check_assignment_edit(&self, track: TrackId) -> Result<()> {
        if self.input.pending_track() == Some(track) {
            return Err(SequencerError::invalid(format!(
                "track {} is selecting an instrument; confirm or cancel first",
                track.0
            )));
        }
        Ok(())
    }

    fn toggle_step(&mut self, track: TrackId, step: usize) -> Result<()> {
        if !self.check_grid_edit(track)? {
            return Ok(());
        }
        if self.input.mode() == InputMode::StepLengthSelect {
            return Err(SequencerError::invalid("step toggle during step length select"));
        }
        self.track_mut(track)?.toggle_step(step)
    }

    fn set_max_steps(&mut self, track: TrackId, steps: usize) -> Result<()> {
        if !self.check_grid_edit(track)? {
            return Ok(());
        }
        let applied = self.track_mut(track)?.set_max_steps(steps);
        self.input.max_steps_set();
        info!(track = track.0, steps = applied, "Loop length set");
        Ok(())
    }

    fn check_device(sink: &dyn NoteSink, device: DeviceId) -> Result<()> {
        if !sink.has_device(device) {
            return Err(SequencerError::invalid(format!("unknown output device {device}")));
        }
        Ok(())
    }

    fn select_instrument(&mut self, track: TrackId) -> Result<()> {
        match self.input.select_instrument_pressed(track)? {
            InstrumentSelectPress::Opened(id) => {
                self.track_mut(id)?.begin_note_learn();
                info!(track = id.0, "Instrument select opened");
            }
            InstrumentSelectPress::Cancelled(id) => {
                self.track_mut(id)?.end_note_learn();
                info!(track = id.0, "Instrument select cancelled");
            }
        }
        Ok(())
    }

    fn confirm_instrument(&mut self, choice: InstrumentChoice, sink: &mut dyn NoteSink) -> Result<()> {
        let Some(id) = self.input.pending_track() else {
            return Err(SequencerError::invalid("no instrument selection pending"));
        };
        if let Some(device) = choice.device {
            Self::check_device(sink, device)?;
        }

        let track = self.track_mut(id)?;
        let device = choice.device.unwrap_or(track.device());
        let channel = choice.channel.unwrap_or(track.channel());
        let note = choice.note.or(track.learned_note()).unwrap_or(track.note());

        let rewritten = track.assign_instrument(device, channel, note)?;
        track.end_note_learn();
        self.input.finish_instrument_select();

        info!(track = id.0, %device, channel, note, rewritten, "Instrument assigned");
        Ok(())
    }

    fn press_transport(&mut self, button: TransportButton) -> Result<()> {
        if button == TransportButton::Record && !self.has_looper() {
            return Err(SequencerError::invalid("record requires a looper track"));
        }
        if let Some(phase) = self.transport.press(button) {
            debug!(?button, ?phase, "Transport button");
        }
        Ok(())
    }

    fn receive_external(&mut self, msg: &MidiMessage, sink: &mut dyn NoteSink) {
        for track in &mut self.tracks {
            track.receive_external(msg, &mut self.voices, sink);
        }
    }

    /// Apply a command, logging rejections instead of propagating them
    pub fn apply_logged(&mut self, command: Command, sink: &mut dyn NoteSink) {
        if let Err(e) = self.apply(command, sink) {
            warn!(?command, "Command rejected: {e}");
        }
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    pub fn render_state(&self, id: TrackId) -> Option<TrackRenderState> {
        self.track(id).map(TrackModel::render_state)
    }

    pub fn snapshot(&self) -> SequencerSnapshot {
        SequencerSnapshot {
            phase: self.transport.phase(),
            current_step: self.transport.current_step(),
            position: self.transport.format_position(),
            bpm: self.transport.bpm(),
            input_mode: self.input.mode(),
            tracks: self.tracks.iter().map(TrackModel::render_state).collect(),
        }
    }
}
