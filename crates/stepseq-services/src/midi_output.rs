//! MIDI output devices backed by midir

use midir::{MidiOutput, MidiOutputConnection};
use stepseq_core::midi::note_name;
use stepseq_core::{DeviceId, MidiMessage, NoteSink, SinkError};
use thiserror::Error;
use tracing::{info, trace, warn};

const CLIENT_NAME: &str = "stepseq";

#[derive(Debug, Error)]
pub enum MidiError {
    #[error("Failed to initialise MIDI: {0}")]
    Init(#[from] midir::InitError),
    #[error("Failed to query MIDI port: {0}")]
    PortInfo(#[from] midir::PortInfoError),
    #[error("No MIDI ports available")]
    NoPorts,
    #[error("No MIDI port matches '{0}'")]
    PortNotFound(String),
    #[error("Failed to connect to '{port}': {reason}")]
    Connect { port: String, reason: String },
}

/// Index of the first port whose name contains `pattern`, ignoring case
pub fn find_port(names: &[String], pattern: &str) -> Option<usize> {
    let pattern = pattern.to_lowercase();
    names.iter().position(|name| name.to_lowercase().contains(&pattern))
}

/// Names of the available output ports
pub fn output_port_names() -> Result<Vec<String>, MidiError> {
    let midi_out = MidiOutput::new(CLIENT_NAME)?;
    midi_out
        .ports()
        .iter()
        .map(|p| midi_out.port_name(p).map_err(MidiError::from))
        .collect()
}

/// One output connection per device. Device N is the port matched by the
/// N-th pattern.
pub struct MidirSink {
    connections: Vec<Option<MidiOutputConnection>>,
    names: Vec<String>,
}

impl MidirSink {
    /// Open one port per pattern. With no patterns, the first available port
    /// becomes device 0.
    pub fn connect(patterns: &[String]) -> Result<Self, MidiError> {
        let available = output_port_names()?;
        if available.is_empty() {
            return Err(MidiError::NoPorts);
        }

        let indices: Vec<usize> = if patterns.is_empty() {
            vec![0]
        } else {
            patterns
                .iter()
                .map(|p| find_port(&available, p).ok_or_else(|| MidiError::PortNotFound(p.clone())))
                .collect::<Result<_, _>>()?
        };

        let mut connections = Vec::with_capacity(indices.len());
        let mut names = Vec::with_capacity(indices.len());
        for (device, idx) in indices.into_iter().enumerate() {
            // midir consumes the MidiOutput on connect
            let midi_out = MidiOutput::new(CLIENT_NAME)?;
            let ports = midi_out.ports();
            let port = ports.get(idx).ok_or(MidiError::NoPorts)?;
            let name = available[idx].clone();
            let conn = midi_out
                .connect(port, &format!("{CLIENT_NAME}-out-{device}"))
                .map_err(|e| MidiError::Connect {
                    port: name.clone(),
                    reason: e.to_string(),
                })?;
            info!(device, port = %name, "MIDI output connected");
            connections.push(Some(conn));
            names.push(name);
        }

        Ok(Self { connections, names })
    }

    pub fn port_names(&self) -> &[String] {
        &self.names
    }

    pub fn device_count(&self) -> usize {
        self.connections.len()
    }

    /// Close a device; later sends to it report `Unavailable`
    pub fn disconnect(&mut self, device: DeviceId) {
        if let Some(slot) = self.connections.get_mut(device.0) {
            if let Some(conn) = slot.take() {
                conn.close();
                info!(%device, "MIDI output disconnected");
            }
        }
    }

    fn send(&mut self, device: DeviceId, msg: MidiMessage) -> Result<(), SinkError> {
        let conn = self
            .connections
            .get_mut(device.0)
            .and_then(Option::as_mut)
            .ok_or(SinkError::Unavailable(device))?;
        conn.send(&msg.to_bytes()).map_err(|e| SinkError::Send {
            device,
            reason: e.to_string(),
        })
    }
}

impl NoteSink for MidirSink {
    fn send_note_on(&mut self, device: DeviceId, channel: u8, pitch: u8, velocity: u8) -> Result<(), SinkError> {
        self.send(device, MidiMessage::note_on(channel, pitch, velocity))
    }

    fn send_note_off(&mut self, device: DeviceId, channel: u8, pitch: u8) -> Result<(), SinkError> {
        self.send(device, MidiMessage::note_off(channel, pitch))
    }

    fn has_device(&self, device: DeviceId) -> bool {
        matches!(self.connections.get(device.0), Some(Some(_)))
    }
}

impl Drop for MidirSink {
    fn drop(&mut self) {
        for device in 0..self.connections.len() {
            self.disconnect(DeviceId(device));
        }
    }
}

/// Sink that only logs, for running without MIDI hardware
#[derive(Debug)]
pub struct LoggingSink {
    devices: usize,
}

impl LoggingSink {
    pub fn new(devices: usize) -> Self {
        if devices == 0 {
            warn!("Logging sink created with no devices");
        }
        Self { devices }
    }
}

impl NoteSink for LoggingSink {
    fn send_note_on(&mut self, device: DeviceId, channel: u8, pitch: u8, velocity: u8) -> Result<(), SinkError> {
        if !self.has_device(device) {
            return Err(SinkError::Unavailable(device));
        }
        trace!(%device, channel, pitch, note = %note_name(pitch), velocity, "note on");
        Ok(())
    }

    fn send_note_off(&mut self, device: DeviceId, channel: u8, pitch: u8) -> Result<(), SinkError> {
        if !self.has_device(device) {
            return Err(SinkError::Unavailable(device));
        }
        trace!(%device, channel, pitch, note = %note_name(pitch), "note off");
        Ok(())
    }

    fn has_device(&self, device: DeviceId) -> bool {
        device.0 < self.devices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_port_case_insensitive() {
        let names = vec!["Midi Through:0".to_string(), "FLUID Synth (1234)".to_string()];
        assert_eq!(find_port(&names, "fluid"), Some(1));
        assert_eq!(find_port(&names, "through"), Some(0));
        assert_eq!(find_port(&names, "hydrogen"), None);
    }

    #[test]
    fn test_logging_sink_devices() {
        let mut sink = LoggingSink::new(2);
        assert!(sink.has_device(DeviceId(1)));
        assert!(sink.send_note_on(DeviceId(1), 9, 36, 127).is_ok());
        assert_eq!(sink.send_note_off(DeviceId(2), 9, 36), Err(SinkError::Unavailable(DeviceId(2))));
    }
}
