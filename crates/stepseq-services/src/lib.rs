//! stepseq-services: Clock, command queue, MIDI I/O and the engine around the core model

pub mod clock;
pub mod command_queue;
pub mod config;
pub mod engine;
pub mod midi_input;
pub mod midi_output;

pub use clock::{ClockError, ClockSource, ManualClock, ThreadClock, TickCallback};
pub use command_queue::{command_queue, CommandReceiver, CommandSender, QueueError};
pub use config::{config_path, load_config, parse_config, save_config, ConfigError};
pub use engine::{EngineError, EngineState, SequencerEngine};
pub use midi_input::{input_port_names, MidiInputListener};
pub use midi_output::{output_port_names, LoggingSink, MidiError, MidirSink};
