//! Output abstraction: where note-on/note-off messages go

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Index of an output device owned by the hosting application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DeviceId(pub usize);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("Device {0} unavailable")]
    Unavailable(DeviceId),
    #[error("Failed to send to device {device}: {reason}")]
    Send { device: DeviceId, reason: String },
}

/// Trait for note outputs. Implementations must not block: a failed send is
/// reported once and never retried by the caller.
pub trait NoteSink: Send {
    fn send_note_on(&mut self, device: DeviceId, channel: u8, pitch: u8, velocity: u8) -> Result<(), SinkError>;
    fn send_note_off(&mut self, device: DeviceId, channel: u8, pitch: u8) -> Result<(), SinkError>;
    /// Whether `device` names an output this sink knows about
    fn has_device(&self, device: DeviceId) -> bool;
}

/// A single emitted note message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkEvent {
    NoteOn { device: DeviceId, channel: u8, pitch: u8, velocity: u8 },
    NoteOff { device: DeviceId, channel: u8, pitch: u8 },
}

impl SinkEvent {
    pub fn pitch(&self) -> u8 {
        match *self {
            Self::NoteOn { pitch, .. } | Self::NoteOff { pitch, .. } => pitch,
        }
    }

    pub fn is_note_on(&self) -> bool {
        matches!(self, Self::NoteOn { .. })
    }
}

/// In-memory sink that records everything sent to it. Devices can be marked
/// unavailable to simulate an unplugged port.
#[derive(Debug, Default)]
pub struct CapturingSink {
    devices: usize,
    unavailable: HashSet<DeviceId>,
    events: Vec<SinkEvent>,
}

impl CapturingSink {
    pub fn new(devices: usize) -> Self {
        Self { devices, ..Default::default() }
    }

    pub fn set_unavailable(&mut self, device: DeviceId, unavailable: bool) {
        if unavailable {
            self.unavailable.insert(device);
        } else {
            self.unavailable.remove(&device);
        }
    }

    pub fn events(&self) -> &[SinkEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<SinkEvent> {
        std::mem::take(&mut self.events)
    }

    fn check(&self, device: DeviceId) -> Result<(), SinkError> {
        if !self.has_device(device) || self.unavailable.contains(&device) {
            return Err(SinkError::Unavailable(device));
        }
        Ok(())
    }
}

impl NoteSink for CapturingSink {
    fn send_note_on(&mut self, device: DeviceId, channel: u8, pitch: u8, velocity: u8) -> Result<(), SinkError> {
        self.check(device)?;
        self.events.push(SinkEvent::NoteOn { device, channel, pitch, velocity });
        Ok(())
    }

    fn send_note_off(&mut self, device: DeviceId, channel: u8, pitch: u8) -> Result<(), SinkError> {
        self.check(device)?;
        self.events.push(SinkEvent::NoteOff { device, channel, pitch });
        Ok(())
    }

    fn has_device(&self, device: DeviceId) -> bool {
        device.0 < self.devices
    }
}
