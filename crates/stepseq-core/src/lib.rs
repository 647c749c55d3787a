//! stepseq-core: Domain model for the stepseq grid sequencer

mod arpeggiator;
mod command;
pub mod config;
mod error;
mod input_state;
mod loop_recorder;
pub mod midi;
mod note_lifetime;
pub mod sink;
mod step_grid;
mod track;
mod tracks;
mod transport;

pub use arpeggiator::{Arpeggiator, DEFAULT_ARP_OFFSETS};
pub use command::Command;
pub use config::{ArpConfig, SequencerConfig, TrackConfig};
pub use error::{Result, SequencerError};
pub use input_state::{GridEditGate, InputMode, InputState, InstrumentChoice, InstrumentSelectPress};
pub use loop_recorder::{LoopRecorder, RecorderState};
pub use midi::MidiMessage;
pub use note_lifetime::{NoteLifetime, OpenNote};
pub use sink::{CapturingSink, DeviceId, NoteSink, SinkError, SinkEvent};
pub use step_grid::{MAX_PARALLEL_NOTES, StepGrid, StepSlot};
pub use track::{InputRoute, TrackId, TrackModel, TrackRenderState};
pub use tracks::{SequencerSnapshot, TracksModel};
pub use transport::{MAX_BPM, MIN_BPM, PlayStatus, Transport, TransportButton};
