//! External MIDI input feeding note messages into the command queue

use midir::{Ignore, MidiInput, MidiInputConnection};
use stepseq_core::{Command, MidiMessage};
use tracing::{debug, info, warn};

use crate::command_queue::CommandSender;
use crate::midi_output::{MidiError, find_port};

const CLIENT_NAME: &str = "stepseq-input";

/// Names of the available input ports
pub fn input_port_names() -> Result<Vec<String>, MidiError> {
    let midi_in = MidiInput::new(CLIENT_NAME)?;
    midi_in
        .ports()
        .iter()
        .map(|p| midi_in.port_name(p).map_err(MidiError::from))
        .collect()
}

/// Only note messages are of interest; everything else is dropped
pub fn command_from_bytes(bytes: &[u8]) -> Option<Command> {
    MidiMessage::from_bytes(bytes).map(Command::ExternalNote)
}

/// Open input connection. Notes arrive on the driver's thread and are
/// queued for the clock thread.
pub struct MidiInputListener {
    connection: Option<MidiInputConnection<()>>,
    port_name: String,
}

impl MidiInputListener {
    /// Connect to the first port matching `pattern`, or the first port when
    /// no pattern is given
    pub fn connect(pattern: Option<&str>, commands: CommandSender) -> Result<Self, MidiError> {
        let mut midi_in = MidiInput::new(CLIENT_NAME)?;
        midi_in.ignore(Ignore::All);

        let ports = midi_in.ports();
        let names = ports
            .iter()
            .map(|p| midi_in.port_name(p))
            .collect::<Result<Vec<_>, _>>()?;
        if names.is_empty() {
            return Err(MidiError::NoPorts);
        }

        let idx = match pattern {
            Some(p) => find_port(&names, p).ok_or_else(|| MidiError::PortNotFound(p.to_string()))?,
            None => 0,
        };
        let port_name = names[idx].clone();

        let connection = midi_in
            .connect(
                &ports[idx],
                "stepseq-in",
                move |_timestamp, bytes, _| {
                    let Some(command) = command_from_bytes(bytes) else {
                        return;
                    };
                    debug!(?command, "MIDI input");
                    if commands.send(command).is_err() {
                        warn!("Command queue closed, dropping MIDI input");
                    }
                },
                (),
            )
            .map_err(|e| MidiError::Connect {
                port: port_name.clone(),
                reason: e.to_string(),
            })?;

        info!(port = %port_name, "MIDI input connected");
        Ok(Self {
            connection: Some(connection),
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn close(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
            info!(port = %self.port_name, "MIDI input closed");
        }
    }
}

impl Drop for MidiInputListener {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_bytes_become_commands() {
        assert_eq!(
            command_from_bytes(&[0x91, 50, 100]),
            Some(Command::ExternalNote(MidiMessage::note_on(1, 50, 100)))
        );
        assert_eq!(
            command_from_bytes(&[0x90, 50, 0]),
            Some(Command::ExternalNote(MidiMessage::note_off(0, 50)))
        );
    }

    #[test]
    fn test_other_messages_ignored() {
        assert_eq!(command_from_bytes(&[0xB0, 7, 100]), None);
        assert_eq!(command_from_bytes(&[0xF8]), None);
        assert_eq!(command_from_bytes(&[]), None);
    }
}
